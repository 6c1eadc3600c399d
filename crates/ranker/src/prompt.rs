use faultrank_chunker::render_evidence;
use faultrank_protocol::EvidenceChunk;

/// Answer layout the model is asked to follow.
pub const OUTPUT_FORMAT: &str = r#"```json
[
    {
        "method_id": int,
        "rank": int
    }
]
```"#;

const FIRST_INSTRUCTIONS: &str = "You will be given a failing test, stack_trace and the methods it covers. \
You have to rank the methods from most suspicious to least suspicious by analyzing this information. \
You should rank the top 5 most suspicious methods. \
The output must be in the following JSON format:\n{output_format}";

const CONTINUATION_INSTRUCTIONS: &str = "Now you will be given the remaining covered methods. \
Previously you have ranked some methods from most suspicious to least suspicious. \
Now analyze the rest of the coverage information given below. \
Then, based on your analysis before and now, you should rank the top 10 most suspicious methods. \
The output must be in the following JSON format:\n{output_format}";

const USER_TEMPLATE: &str = "Here are the remaining coverage information: {coverage_info}";

/// How a chunk is introduced to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkFraming {
    /// Chunk 0: opening analysis
    First,
    /// Later chunks: refine the earlier ranking
    Continuation,
}

impl ChunkFraming {
    #[must_use]
    pub const fn for_index(chunk_index: u32) -> Self {
        if chunk_index == 0 {
            Self::First
        } else {
            Self::Continuation
        }
    }

    /// Number of methods the instructions ask for.
    #[must_use]
    pub const fn top_n(self) -> usize {
        match self {
            Self::First => 5,
            Self::Continuation => 10,
        }
    }

    const fn template(self) -> &'static str {
        match self {
            Self::First => FIRST_INSTRUCTIONS,
            Self::Continuation => CONTINUATION_INSTRUCTIONS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub framing: ChunkFraming,
    pub system: String,
    pub user: String,
    /// Single-message form submitted to the model and measured by the
    /// budget guard
    pub text: String,
}

/// Renders evidence chunks into model prompts.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    output_format: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::with_output_format(OUTPUT_FORMAT)
    }

    pub fn with_output_format(output_format: impl Into<String>) -> Self {
        Self {
            output_format: output_format.into(),
        }
    }

    #[must_use]
    pub fn build(&self, chunk: &EvidenceChunk, chunk_index: u32) -> RenderedPrompt {
        let framing = ChunkFraming::for_index(chunk_index);
        let system = framing
            .template()
            .replace("{output_format}", &self.output_format);
        let user = USER_TEMPLATE.replace("{coverage_info}", &render_evidence(chunk));
        let text = format!("System: {system}\nHuman: {user}");
        RenderedPrompt {
            framing,
            system,
            user,
            text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultrank_protocol::CoveredMethod;

    fn chunk() -> EvidenceChunk {
        EvidenceChunk {
            test_name: "testAdd".into(),
            test_body: "assertEquals(2, add(1, 1));".into(),
            stack_trace: "AssertionFailedError".into(),
            covered_methods: vec![CoveredMethod {
                method_signature: "Calc#add(II)I".into(),
                method_body: "return a - b;".into(),
                method_id: 0,
            }],
        }
    }

    #[test]
    fn first_template_only_for_chunk_zero() {
        let builder = PromptBuilder::new();
        assert_eq!(builder.build(&chunk(), 0).framing, ChunkFraming::First);
        for index in [1, 2, 17] {
            assert_eq!(
                builder.build(&chunk(), index).framing,
                ChunkFraming::Continuation
            );
        }
    }

    #[test]
    fn framing_controls_requested_count() {
        let builder = PromptBuilder::new();
        let first = builder.build(&chunk(), 0);
        let next = builder.build(&chunk(), 1);
        assert!(first.system.contains("top 5"));
        assert!(next.system.contains("top 10"));
        assert_eq!(first.framing.top_n(), 5);
        assert_eq!(next.framing.top_n(), 10);
    }

    #[test]
    fn prompt_text_carries_format_and_evidence() {
        let prompt = PromptBuilder::new().build(&chunk(), 0);
        assert!(prompt.text.starts_with("System: "));
        assert!(prompt.text.contains("\nHuman: Here are the remaining coverage information: Test Name: testAdd\n"));
        assert!(prompt.text.contains("\"method_id\": int"));
        assert!(prompt.text.contains("    Method ID:\n0\n"));
        assert!(!prompt.text.contains("{output_format}"));
        assert!(!prompt.text.contains("{coverage_info}"));
    }
}
