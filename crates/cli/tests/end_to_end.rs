use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

#[allow(deprecated)]
fn faultrank(workdir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("faultrank").expect("binary");
    cmd.current_dir(workdir)
        .env("FAULTRANK_MODEL_MODE", "stub")
        .env_remove("OPENAI_API_KEY")
        .env_remove("FAULTRANK_INPUT_CEILING");
    cmd
}

fn run_json(cmd: &mut Command) -> Value {
    let output = cmd.output().expect("command run");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid json")
}

fn write_coverage(path: &Path, methods: usize, body_len: usize) {
    let covered: Vec<Value> = (0..methods)
        .map(|id| {
            json!({
                "method_signature": format!("org.apache.commons.lang3.Util#m{id}()V"),
                "method_body": "x".repeat(body_len),
                "method_id": id,
            })
        })
        .collect();
    let coverage = json!({
        "test_name": "testUtil",
        "test_body": "assertEquals(1, Util.m2());",
        "stack_trace": "junit.framework.AssertionFailedError",
        "covered_methods": covered,
    });
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, serde_json::to_vec_pretty(&coverage).unwrap()).unwrap();
}

#[test]
fn split_rank_and_score_with_stub_model() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    let data = root.join("data");
    write_coverage(&data.join("RankedData/Lang/ochiai/1/test_0.json"), 8, 40);
    fs::create_dir_all(data.join("BuggyMethods/Lang")).unwrap();
    fs::write(
        data.join("BuggyMethods/Lang/1.txt"),
        "org.apache.commons.lang3.Util#m2()V\n",
    )
    .unwrap();

    let written = run_json(faultrank(root).args([
        "split",
        "--input",
        "data/RankedData/Lang/ochiai",
        "--out-dir",
        "data/RankedDataSplitChat/5/Lang/ochiai",
        "--encoding",
        "approximate",
        "--json",
    ]));
    assert_eq!(written.as_array().unwrap().len(), 1);
    assert!(data
        .join("RankedDataSplitChat/5/Lang/ochiai/1/test_0_0.json")
        .exists());

    let stats = run_json(faultrank(root).args([
        "rank",
        "--project",
        "Lang",
        "--technique",
        "ochiai",
        "--data-dir",
        "data",
        "--encoding",
        "approximate",
        "--json",
    ]));
    assert_eq!(stats["tests_completed"], 1);
    assert_eq!(stats["tests_aborted"], 0);
    assert_eq!(stats["records_extracted"], 5);

    let final_artifact: Value = serde_json::from_slice(
        &fs::read(data.join("Output/RankedDataSplitChat/5/Lang/ochiai/1/test_0.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(final_artifact["project_name"], "Lang");
    assert_eq!(final_artifact["ans"][2]["method_id"], 2);

    let rows = run_json(faultrank(root).args(["score", "--data-dir", "data", "--json"]));
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["Project"], "Lang");
    assert_eq!(rows[0]["Technique"], "ochiai");
    assert_eq!(rows[0]["Top-1"], 0);
    assert_eq!(rows[0]["Top-3"], 1);
    assert_eq!(rows[0]["MFR"], 3.0);
    assert_eq!(rows[1]["Project"], "Total");
    assert!(data.join("Results/Split/results.md").exists());
    assert!(data.join("Results/Split/topk.json").exists());
}

#[test]
fn split_bounds_chunks_by_tokens() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    write_coverage(&root.join("cov/test_4.json"), 6, 400);

    let written = run_json(faultrank(root).args([
        "split",
        "--input",
        "cov/test_4.json",
        "--out-dir",
        "chunks",
        "--max-chunk-tokens",
        "300",
        "--encoding",
        "approximate",
        "--json",
    ]));
    let names: Vec<String> = written
        .as_array()
        .unwrap()
        .iter()
        .map(|p| {
            Path::new(p.as_str().unwrap())
                .file_name()
                .unwrap()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    assert!(names.len() > 1);
    assert_eq!(names[0], "test_4_0.json");
    assert_eq!(names[1], "test_4_1.json");
}

#[test]
fn openai_mode_without_key_is_rejected() {
    let temp = tempdir().unwrap();
    faultrank(temp.path())
        .env("FAULTRANK_MODEL_MODE", "openai")
        .args(["rank", "--project", "Lang", "--technique", "ochiai", "--bug", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("OPENAI_API_KEY"));
}

#[test]
fn missing_bug_directory_is_reported_not_fatal() {
    let temp = tempdir().unwrap();
    let stats = run_json(faultrank(temp.path()).args([
        "rank",
        "--project",
        "Lang",
        "--technique",
        "ochiai",
        "--bug",
        "42",
        "--json",
    ]));
    assert_eq!(stats["bugs"], 1);
    assert_eq!(stats["tests_completed"], 0);
    assert_eq!(stats["errors"].as_array().unwrap().len(), 1);
}
