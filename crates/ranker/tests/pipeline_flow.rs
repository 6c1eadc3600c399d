use faultrank_chunker::TokenEncoding;
use faultrank_protocol::{CoveredMethod, EvidenceChunk, StudyLayout, TurnArtifact};
use faultrank_ranker::{
    read_artifact, read_combined, BugTarget, ErrorLog, ModelMode, Ranker, RankerConfig,
    ScriptedChatModel, ScriptedReply, StubChatModel,
};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn evidence(test_id: u32, ids: std::ops::Range<u32>, body_len: usize) -> EvidenceChunk {
    EvidenceChunk {
        test_name: format!("test{test_id}"),
        test_body: "assertTrue(subject.check());".into(),
        stack_trace: "java.lang.AssertionError".into(),
        covered_methods: ids
            .map(|id| CoveredMethod {
                method_signature: format!("org.pkg.Subject#m{id}()Z"),
                method_body: "x".repeat(body_len),
                method_id: id,
            })
            .collect(),
    }
}

fn write_chunk(dir: &Path, test_id: u32, index: u32, chunk: &EvidenceChunk) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(
        dir.join(format!("test_{test_id}_{index}.json")),
        serde_json::to_vec_pretty(chunk).unwrap(),
    )
    .unwrap();
}

fn config(ceiling: usize) -> RankerConfig {
    RankerConfig {
        mode: ModelMode::Stub,
        encoding: TokenEncoding::Approximate,
        input_ceiling: ceiling,
        ..RankerConfig::default()
    }
}

fn reply(ids: &[i64]) -> ScriptedReply {
    let body: Vec<String> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| format!("{{\"method_id\": {id}, \"rank\": {}}}", i + 1))
        .collect();
    ScriptedReply::Text(format!("Analysis.\n```json\n[{}]\n```\n", body.join(", ")))
}

#[tokio::test]
async fn stub_run_writes_chunk_final_and_combined_artifacts() {
    let temp = TempDir::new().unwrap();
    let layout = StudyLayout::new(temp.path(), "5");
    let target = BugTarget::from_layout(&layout, "Lang", "ochiai", "1");
    write_chunk(&target.chunks_dir, 0, 0, &evidence(0, 0..6, 20));
    write_chunk(&target.chunks_dir, 0, 1, &evidence(0, 6..18, 20));

    let combined = temp.path().join("combined.json");
    let config = RankerConfig {
        combined_artifact: Some(combined.clone()),
        ..config(10_000)
    };
    let ranker = Ranker::new(
        Arc::new(StubChatModel::new()),
        &config,
        ErrorLog::new(layout.error_log_path()),
    );

    let stats = ranker.rank_bug(&target).await;
    assert_eq!(stats.tests_completed, 1);
    assert_eq!(stats.tests_aborted, 0);
    assert_eq!(stats.chunks_processed, 2);

    let first = read_artifact(&target.outputs.chunk_artifact_path(0, 0))
        .await
        .unwrap();
    assert_eq!(
        first.ans.iter().map(|r| r.method_id).collect::<Vec<_>>(),
        vec![0, 1, 2, 3, 4]
    );
    let second = read_artifact(&target.outputs.chunk_artifact_path(0, 1))
        .await
        .unwrap();
    assert_eq!(second.ans.len(), 10);
    assert_eq!(second.ans[0].method_id, 6);

    let final_artifact = read_artifact(&target.outputs.final_artifact_path(0))
        .await
        .unwrap();
    assert_eq!(final_artifact, second);
    assert_eq!(final_artifact.project_name, "Lang");
    assert_eq!(final_artifact.bug_id, "1");

    let all: Vec<TurnArtifact> = read_combined(&combined).await.unwrap().combined_outputs;
    assert_eq!(all, vec![first, second]);
    assert!(!layout.error_log_path().exists());
}

#[tokio::test]
async fn budget_overflow_stops_the_test_before_calling_the_model() {
    let temp = TempDir::new().unwrap();
    let layout = StudyLayout::new(temp.path(), "5");
    let target = BugTarget::from_layout(&layout, "Math", "dstar", "7");
    write_chunk(&target.chunks_dir, 0, 0, &evidence(0, 0..2, 10));
    write_chunk(&target.chunks_dir, 0, 1, &evidence(0, 2..4, 20_000));
    write_chunk(&target.chunks_dir, 0, 2, &evidence(0, 4..6, 10));
    write_chunk(&target.chunks_dir, 1, 0, &evidence(1, 0..2, 10));

    let model = Arc::new(ScriptedChatModel::new([reply(&[1, 0]), reply(&[0])]));
    let ranker = Ranker::new(
        model.clone(),
        &config(2_000),
        ErrorLog::new(layout.error_log_path()),
    );
    let stats = ranker.rank_bug(&target).await;

    assert_eq!(model.call_count(), 2);
    let sessions: Vec<u32> = model.calls().iter().map(|c| c.session.test_id).collect();
    assert_eq!(sessions, vec![0, 1]);

    assert_eq!(stats.tests_aborted, 1);
    assert_eq!(stats.tests_completed, 1);
    assert!(target.outputs.chunk_artifact_path(0, 0).exists());
    assert!(!target.outputs.chunk_artifact_path(0, 1).exists());
    assert!(!target.outputs.chunk_artifact_path(0, 2).exists());
    assert!(!target.outputs.final_artifact_path(0).exists());
    assert!(target.outputs.final_artifact_path(1).exists());

    let log = std::fs::read_to_string(layout.error_log_path()).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("project=Math bug=7 test=0 - Input token size exceeded"));
}

#[tokio::test]
async fn transport_failure_does_not_block_the_next_test() {
    let temp = TempDir::new().unwrap();
    let layout = StudyLayout::new(temp.path(), "5");
    let target = BugTarget::from_layout(&layout, "Cli", "ochiai", "3");
    write_chunk(&target.chunks_dir, 0, 0, &evidence(0, 0..3, 10));
    write_chunk(&target.chunks_dir, 0, 1, &evidence(0, 3..6, 10));
    write_chunk(&target.chunks_dir, 2, 0, &evidence(2, 0..3, 10));

    let model = Arc::new(ScriptedChatModel::new([
        ScriptedReply::FailAfter(vec!["partial".into()], "connection reset".into()),
        reply(&[2, 1, 0]),
    ]));
    let ranker = Ranker::new(
        model.clone(),
        &config(10_000),
        ErrorLog::new(layout.error_log_path()),
    );
    let stats = ranker.rank_bug(&target).await;

    assert_eq!(model.call_count(), 2);
    assert_eq!(stats.tests_aborted, 1);
    assert_eq!(stats.tests_completed, 1);
    assert!(!target.outputs.chunk_artifact_path(0, 0).exists());

    let final_artifact = read_artifact(&target.outputs.final_artifact_path(2))
        .await
        .unwrap();
    assert_eq!(
        final_artifact.ans.iter().map(|r| r.method_id).collect::<Vec<_>>(),
        vec![2, 1, 0]
    );

    // The failed test's session never leaked into the next one.
    assert_eq!(model.calls()[1].turns.len(), 1);

    let log = std::fs::read_to_string(layout.error_log_path()).unwrap();
    assert!(log.contains("project=Cli bug=3 test=0 - Transport failure: connection reset"));
}

#[tokio::test]
async fn continuation_turn_sees_only_the_previous_exchange() {
    let temp = TempDir::new().unwrap();
    let layout = StudyLayout::new(temp.path(), "5");
    let target = BugTarget::from_layout(&layout, "Chart", "ochiai", "2");
    for index in 0..3 {
        write_chunk(&target.chunks_dir, 0, index, &evidence(0, index * 2..index * 2 + 2, 10));
    }

    let model = Arc::new(ScriptedChatModel::new([
        reply(&[0]),
        reply(&[2]),
        reply(&[4]),
    ]));
    let ranker = Ranker::new(
        model.clone(),
        &config(10_000),
        ErrorLog::new(layout.error_log_path()),
    );
    ranker.rank_bug(&target).await;

    let calls = model.calls();
    assert_eq!(
        calls.iter().map(|c| c.turns.len()).collect::<Vec<_>>(),
        vec![1, 3, 3]
    );
    assert!(calls[0].turns[0].content.contains("top 5"));
    assert!(calls[2].turns[0].content.contains("top 10"));
    assert!(calls[2].turns[1].content.contains("\"method_id\": 2"));
}

#[tokio::test]
async fn missing_chunk_directory_is_reported_not_fatal() {
    let temp = TempDir::new().unwrap();
    let layout = StudyLayout::new(temp.path(), "5");
    let present = BugTarget::from_layout(&layout, "Lang", "ochiai", "1");
    let absent = BugTarget::from_layout(&layout, "Lang", "ochiai", "99");
    write_chunk(&present.chunks_dir, 0, 0, &evidence(0, 0..3, 10));

    let ranker = Ranker::new(
        Arc::new(StubChatModel::new()),
        &config(10_000),
        ErrorLog::new(layout.error_log_path()),
    );
    let stats = ranker.rank_bugs(vec![absent, present.clone()], 2).await;

    assert_eq!(stats.bugs, 2);
    assert_eq!(stats.tests_completed, 1);
    assert_eq!(stats.errors.len(), 1);
    assert!(present.outputs.final_artifact_path(0).exists());
}

#[tokio::test]
async fn corrupt_middle_chunk_is_skipped_and_the_conversation_continues() {
    let temp = TempDir::new().unwrap();
    let layout = StudyLayout::new(temp.path(), "5");
    let target = BugTarget::from_layout(&layout, "Time", "ochiai", "4");
    write_chunk(&target.chunks_dir, 0, 0, &evidence(0, 0..2, 10));
    std::fs::write(target.chunks_dir.join("test_0_1.json"), b"{ truncated").unwrap();
    write_chunk(&target.chunks_dir, 0, 2, &evidence(0, 4..6, 10));

    let model = Arc::new(ScriptedChatModel::new([reply(&[1, 0]), reply(&[5, 1, 0])]));
    let ranker = Ranker::new(
        model.clone(),
        &config(10_000),
        ErrorLog::new(layout.error_log_path()),
    );
    let stats = ranker.rank_bug(&target).await;

    assert_eq!(stats.chunks_skipped, 1);
    assert_eq!(stats.chunks_processed, 2);
    assert_eq!(stats.tests_completed, 1);
    assert_eq!(stats.tests_aborted, 0);

    let calls = model.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].turns.len(), 3);
    assert!(calls[1].turns[2].content.contains("top 10"));
    assert!(!target.outputs.chunk_artifact_path(0, 1).exists());

    let final_artifact = read_artifact(&target.outputs.final_artifact_path(0))
        .await
        .unwrap();
    assert_eq!(
        final_artifact.ans.iter().map(|r| r.method_id).collect::<Vec<_>>(),
        vec![5, 1, 0]
    );
    assert!(!layout.error_log_path().exists());
}

#[tokio::test]
async fn skipped_last_chunk_keeps_the_previous_turn_as_final() {
    let temp = TempDir::new().unwrap();
    let layout = StudyLayout::new(temp.path(), "5");
    let target = BugTarget::from_layout(&layout, "Closure", "ochiai", "5");
    write_chunk(&target.chunks_dir, 0, 0, &evidence(0, 0..3, 10));
    std::fs::write(target.chunks_dir.join("test_0_1.json"), b"{ truncated").unwrap();
    std::fs::write(target.chunks_dir.join("test_1_0.json"), b"not json").unwrap();

    let model = Arc::new(ScriptedChatModel::new([reply(&[2, 0])]));
    let ranker = Ranker::new(
        model.clone(),
        &config(10_000),
        ErrorLog::new(layout.error_log_path()),
    );
    let stats = ranker.rank_bug(&target).await;

    assert_eq!(model.call_count(), 1);
    assert_eq!(stats.chunks_skipped, 2);
    assert_eq!(stats.tests_completed, 1);
    assert_eq!(stats.tests_aborted, 1);

    let chunk = read_artifact(&target.outputs.chunk_artifact_path(0, 0))
        .await
        .unwrap();
    let final_artifact = read_artifact(&target.outputs.final_artifact_path(0))
        .await
        .unwrap();
    assert_eq!(final_artifact, chunk);

    // A test where no chunk could be ranked has no final artifact and is
    // recorded in the error log.
    assert!(!target.outputs.final_artifact_path(1).exists());
    let log = std::fs::read_to_string(layout.error_log_path()).unwrap();
    assert!(log.contains("project=Closure bug=5 test=1 - no chunk of test 1 produced an artifact"));
}
