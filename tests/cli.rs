//! End-to-end tests for the `split-tests` binary.
//!
//! Each test builds a small Java project in a temp directory:
//!
//! | Class | Recorded time |
//! |-------|---------------|
//! | `a.SlowTest` | 90s |
//! | `a.MidTest` | 60s |
//! | `a.FastTest` | 10s |
//! | `a.NewTest` | none (median, 60s) |
//! | `a.AbstractBaseTest` | abstract, never scheduled |
//!
//! Two shards balance to `{Slow, Fast}` = 100s and `{Mid, New}` = 120s.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn java_test(root: &Path, class: &str, modifiers: &str) {
    write(
        root,
        &format!("src/test/java/a/{}.java", class),
        &format!(
            "package a;\n\nimport org.junit.jupiter.api.Test;\n\n{} class {} {{\n    @Test\n    void works() {{}}\n}}\n",
            modifiers, class
        ),
    );
}

fn junit_report(root: &Path, class: &str, seconds: f64) {
    write(
        root,
        &format!("build/test-results/test/TEST-a.{}.xml", class),
        &format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<testsuite name="a.{class}" tests="1" skipped="0" failures="0" errors="0" time="{seconds}">
  <testcase name="works()" classname="a.{class}" time="{seconds}"/>
</testsuite>
"#
        ),
    );
}

fn project() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    for class in ["SlowTest", "MidTest", "FastTest", "NewTest"] {
        java_test(root, class, "public");
    }
    java_test(root, "AbstractBaseTest", "public abstract");
    write(root, "src/main/java/a/Calculator.java", "package a;\npublic class Calculator {}\n");

    junit_report(root, "SlowTest", 90.0);
    junit_report(root, "MidTest", 60.0);
    junit_report(root, "FastTest", 10.0);

    temp_dir
}

fn split_tests(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("split-tests").unwrap();
    cmd.current_dir(dir.path());
    cmd
}

const JUNIT_GLOB: &str = "**/build/test-results/**/TEST-*.xml";

#[test]
fn test_split_prints_balanced_shards() {
    let dir = project();

    split_tests(&dir)
        .args(["split", "-i", "0", "-t", "2", "-j", JUNIT_GLOB])
        .assert()
        .success()
        .stdout("a.SlowTest a.FastTest\n");

    split_tests(&dir)
        .args(["split", "--split-index", "1", "--split-total", "2"])
        .args(["--junit-glob", JUNIT_GLOB])
        .assert()
        .success()
        .stdout("a.MidTest a.NewTest\n");
}

#[test]
fn test_split_gradle_format() {
    let dir = project();

    split_tests(&dir)
        .args(["split", "-i", "0", "-t", "2", "-j", JUNIT_GLOB, "-f", "gradle"])
        .assert()
        .success()
        .stdout("--tests a.SlowTest --tests a.FastTest\n");
}

#[test]
fn test_split_with_working_directory() {
    let dir = project();
    let elsewhere = TempDir::new().unwrap();

    Command::cargo_bin("split-tests")
        .unwrap()
        .current_dir(elsewhere.path())
        .arg("-w")
        .arg(dir.path())
        .args(["split", "-i", "1", "-t", "2", "-j", JUNIT_GLOB])
        .assert()
        .success()
        .stdout("a.MidTest a.NewTest\n");
}

#[test]
fn test_split_without_history_round_robins() {
    let dir = project();

    split_tests(&dir)
        .args(["split", "-i", "0", "-t", "2"])
        .assert()
        .success()
        .stdout("a.FastTest a.NewTest\n");
}

#[test]
fn test_split_more_shards_than_tests() {
    let dir = project();

    split_tests(&dir)
        .args(["split", "-i", "5", "-t", "6", "-j", JUNIT_GLOB])
        .assert()
        .success()
        .stdout("\n");
}

#[test]
fn test_split_index_out_of_range() {
    let dir = project();

    split_tests(&dir)
        .args(["split", "-i", "2", "-t", "2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must be lower than --split-total"));
}

#[test]
fn test_split_ignores_history_of_deleted_tests() {
    let dir = project();
    junit_report(dir.path(), "DeletedTest", 500.0);

    // a.NewTest still falls back to the median of 10, 60 and 90 seconds and
    // sorts after a.MidTest on the tie.
    split_tests(&dir)
        .args(["split", "-i", "0", "-t", "1", "-j", JUNIT_GLOB])
        .assert()
        .success()
        .stdout("a.SlowTest a.MidTest a.NewTest a.FastTest\n");
}

#[test]
fn test_split_zero_total_is_rejected() {
    let dir = project();

    split_tests(&dir)
        .args(["split", "-i", "0", "-t", "0"])
        .assert()
        .failure();
}

#[test]
fn test_split_requires_total() {
    let dir = project();

    split_tests(&dir)
        .args(["split", "-i", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--split-total is required"));
}

#[test]
fn test_split_total_from_config() {
    let dir = project();
    write(
        dir.path(),
        "split-tests.toml",
        &format!("[split]\ntotal = 2\n\n[history]\njunit_glob = \"{}\"\n", JUNIT_GLOB),
    );

    split_tests(&dir)
        .args(["split", "-i", "0"])
        .assert()
        .success()
        .stdout("a.SlowTest a.FastTest\n");
}

#[test]
fn test_split_malformed_report_fails() {
    let dir = project();
    write(
        dir.path(),
        "build/test-results/test/TEST-a.BrokenTest.xml",
        r#"<testsuite name="a.BrokenTest" time="-3"/>"#,
    );

    split_tests(&dir)
        .args(["split", "-i", "0", "-t", "2", "-j", JUNIT_GLOB])
        .assert()
        .failure()
        .stderr(predicate::str::contains("TEST-a.BrokenTest.xml"));
}

#[test]
fn test_split_excludes_by_glob() {
    let dir = project();

    split_tests(&dir)
        .args(["split", "-i", "0", "-t", "1", "-j", JUNIT_GLOB])
        .args(["-e", "**/SlowTest.java"])
        .assert()
        .success()
        .stdout("a.MidTest a.NewTest a.FastTest\n");
}

#[test]
fn test_split_optimal_total_warning() {
    let dir = project();

    split_tests(&dir)
        .args(["split", "-i", "0", "-t", "4", "-j", JUNIT_GLOB, "-c"])
        .assert()
        .success()
        .stderr(predicate::str::contains("optimal split total is 3"));
}

#[test]
fn test_plan_writes_shards_and_json() {
    let dir = project();

    split_tests(&dir)
        .args(["plan", "-t", "2", "-j", JUNIT_GLOB])
        .args(["--output-dir", "out", "--json", "out/plan.json"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Test Split Plan"));

    let shard0 = std::fs::read_to_string(dir.path().join("out/shard-00.txt")).unwrap();
    assert_eq!(shard0, "a.SlowTest\na.FastTest\n");
    let shard1 = std::fs::read_to_string(dir.path().join("out/shard-01.txt")).unwrap();
    assert_eq!(shard1, "a.MidTest\na.NewTest\n");

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("out/plan.json")).unwrap())
            .unwrap();
    assert_eq!(json["group_count"], 2);
    assert_eq!(json["test_count"], 4);
    assert_eq!(json["max_ms"], 120_000);
    assert_eq!(json["min_ms"], 100_000);
}

#[test]
fn test_collect_lists_schedulable_classes() {
    let dir = project();

    split_tests(&dir)
        .arg("collect")
        .assert()
        .success()
        .stdout("a.FastTest\na.MidTest\na.NewTest\na.SlowTest\n");
}

#[test]
fn test_collect_json() {
    let dir = project();

    let output = split_tests(&dir)
        .args(["collect", "--format", "json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let tests: Vec<String> = serde_json::from_slice(&output).unwrap();
    assert_eq!(tests.len(), 4);
    assert!(!tests.contains(&"a.AbstractBaseTest".to_string()));
}

#[test]
fn test_generic_discovery_from_config() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "tests.txt", "# all suites\nx.ATest\nx.BTest\nx.CTest\n");
    write(
        dir.path(),
        "split-tests.toml",
        "[discovery]\ntype = \"generic\"\ndiscover_command = \"cat tests.txt\"\n",
    );

    split_tests(&dir)
        .args(["split", "-i", "0", "-t", "2"])
        .assert()
        .success()
        .stdout("x.ATest x.CTest\n");
}

#[test]
fn test_init_then_validate() {
    let dir = TempDir::new().unwrap();

    split_tests(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created split-tests.toml"));
    assert!(dir.path().join("split-tests.toml").exists());

    split_tests(&dir)
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    split_tests(&dir)
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid!"));
}

#[test]
fn test_explicit_missing_config_fails() {
    let dir = project();

    split_tests(&dir)
        .args(["--config", "missing.toml", "split", "-i", "0", "-t", "2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.toml"));
}
