use faultrank_protocol::{CoveredMethod, EvidenceChunk};
use std::fmt::Write;

/// Render the test header (name, body, stack trace) and the
/// `Covered Methods:` label.
#[must_use]
pub fn render_header(chunk: &EvidenceChunk) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "Test Name: {}", chunk.test_name);
    let _ = writeln!(text, "Test Body:\n{}", chunk.test_body);
    let _ = writeln!(text, "\nStackTrace:\n{}", chunk.stack_trace);
    text.push_str("\nCovered Methods:\n");
    text
}

/// Render one covered method as signature, body and id.
#[must_use]
pub fn render_method(method: &CoveredMethod) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "    Method Signature:\n{}", method.method_signature);
    let _ = writeln!(text, "    Method Body:\n{}", method.method_body);
    let _ = writeln!(text, "    Method ID:\n{}", method.method_id);
    text
}

/// Canonical evidence block submitted to the model for one chunk.
#[must_use]
pub fn render_evidence(chunk: &EvidenceChunk) -> String {
    let mut text = render_header(chunk);
    for method in &chunk.covered_methods {
        text.push_str(&render_method(method));
    }
    text.push('\n');
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn evidence_lists_methods_in_chunk_order() {
        let chunk = EvidenceChunk {
            test_name: "testParse".into(),
            test_body: "assertEquals(1, p.parse());".into(),
            stack_trace: "junit.framework.AssertionFailedError".into(),
            covered_methods: vec![
                CoveredMethod {
                    method_signature: "A#a()V".into(),
                    method_body: "void a() {}".into(),
                    method_id: 0,
                },
                CoveredMethod {
                    method_signature: "B#b()V".into(),
                    method_body: "void b() {}".into(),
                    method_id: 1,
                },
            ],
        };

        let expected = concat!(
            "Test Name: testParse\n",
            "Test Body:\nassertEquals(1, p.parse());\n",
            "\nStackTrace:\njunit.framework.AssertionFailedError\n",
            "\nCovered Methods:\n",
            "    Method Signature:\nA#a()V\n",
            "    Method Body:\nvoid a() {}\n",
            "    Method ID:\n0\n",
            "    Method Signature:\nB#b()V\n",
            "    Method Body:\nvoid b() {}\n",
            "    Method ID:\n1\n",
            "\n",
        );
        assert_eq!(render_evidence(&chunk), expected);
    }
}
