//! Integration tests for the vcr-orchestrator binary.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn vcr() -> Command {
    let mut cmd = cargo_bin_cmd!("vcr-orchestrator");
    cmd.env_clear();
    cmd
}

fn write_log(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_help() {
        vcr()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("vcr-test"))
            .stdout(predicate::str::contains("classify"));
    }

    #[test]
    fn test_version() {
        vcr()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("vcr-orchestrator"));
    }

    #[test]
    fn test_unknown_subcommand_fails() {
        vcr().arg("record-everything").assert().failure();
    }
}

// =============================================================================
// Classify
// =============================================================================

mod classify {
    use super::*;

    #[test]
    fn test_classify_pass_and_fail() {
        let dir = TempDir::new().unwrap();
        let log = write_log(
            &dir,
            "replaying_test.log",
            "=== RUN   TestAccComputeInstance_basic\n\
             --- PASS: TestAccComputeInstance_basic (12.34s)\n\
             === RUN   TestAccStorageBucket_update\n\
             --- FAIL: TestAccStorageBucket_update (3.10s)\n\
             --- SKIP: TestAccPubsubTopic_iam (0.00s)\n\
             FAIL\n",
        );

        vcr()
            .current_dir(dir.path())
            .arg("classify")
            .arg(&log)
            .assert()
            .success()
            .stdout(predicate::str::contains("\"phase\": \"replaying\""))
            .stdout(predicate::str::contains("TestAccComputeInstance_basic"))
            .stdout(predicate::str::contains("\"passed\": 1"))
            .stdout(predicate::str::contains("\"failed\": 1"))
            .stdout(predicate::str::contains("\"skipped\": 1"))
            .stdout(predicate::str::contains("\"build_failure\": false"))
            .stdout(predicate::str::contains("raw_panic_text").not());
    }

    #[test]
    fn test_classify_crash() {
        let dir = TempDir::new().unwrap();
        let log = write_log(
            &dir,
            "recording_test.log",
            "--- PASS: TestAccA (1.00s)\n\
             panic: runtime error: invalid memory address or nil pointer dereference\n\
             goroutine 42 [running]:\n\
             --- PASS: TestAccB (1.00s)\n",
        );

        vcr()
            .current_dir(dir.path())
            .args(["classify", "--phase", "recording"])
            .arg(&log)
            .assert()
            .success()
            .stdout(predicate::str::contains("\"phase\": \"recording\""))
            .stdout(predicate::str::contains("raw_panic_text"))
            .stdout(predicate::str::contains("nil pointer dereference"))
            .stdout(predicate::str::contains("\"test\": \"TestAccA\""))
            .stdout(predicate::str::contains("\"test\": \"TestAccB\"").not());
    }

    #[test]
    fn test_classify_build_failure() {
        let dir = TempDir::new().unwrap();
        let log = write_log(
            &dir,
            "replaying_test.log",
            "# example.com/provider/google\n\
             google/resource_foo.go:12:2: undefined: bar\n\
             FAIL\texample.com/provider/google [build failed]\n",
        );

        vcr()
            .current_dir(dir.path())
            .arg("classify")
            .arg(&log)
            .assert()
            .success()
            .stdout(predicate::str::contains("\"build_failure\": true"));
    }

    #[test]
    fn test_classify_rejects_unknown_phase() {
        let dir = TempDir::new().unwrap();
        let log = write_log(&dir, "x.log", "");

        vcr()
            .current_dir(dir.path())
            .args(["classify", "--phase", "rehearsing"])
            .arg(&log)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid phase"));
    }

    #[test]
    fn test_classify_missing_file() {
        let dir = TempDir::new().unwrap();

        vcr()
            .current_dir(dir.path())
            .args(["classify", "does-not-exist.log"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Failed to read log"));
    }
}

// =============================================================================
// vcr-test parameter validation
// =============================================================================

mod vcr_test {
    use super::*;

    #[test]
    fn test_missing_build_id_exits_one() {
        let dir = TempDir::new().unwrap();

        vcr()
            .current_dir(dir.path())
            .env("PR_NUMBER", "42")
            .env("COMMIT_SHA", "abc123")
            .env("GOPATH", dir.path())
            .arg("vcr-test")
            .assert()
            .code(1)
            .stderr(predicate::str::contains("BUILD_ID is required"));
    }

    #[test]
    fn test_orchestrator_log_written_under_gopath() {
        let dir = TempDir::new().unwrap();

        vcr()
            .current_dir(dir.path())
            .env("GOPATH", dir.path())
            .arg("vcr-test")
            .assert()
            .code(1);

        let log = fs::read_to_string(dir.path().join("orchestrator.log")).unwrap();
        assert!(log.contains("is required"));
    }

    #[test]
    fn test_invalid_policy_file_exits_one() {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("vcr.toml");
        fs::write(&config, "[execution]\nrecord_workers = 0\n").unwrap();

        vcr()
            .current_dir(dir.path())
            .env("BUILD_ID", "build-1")
            .env("PR_NUMBER", "42")
            .env("COMMIT_SHA", "abc123")
            .env("GOPATH", dir.path())
            .arg("--config")
            .arg(&config)
            .arg("vcr-test")
            .assert()
            .code(1)
            .stderr(predicate::str::contains("record_workers"));
    }

    #[test]
    fn test_unparseable_policy_file_exits_one() {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("vcr.toml");
        fs::write(&config, "[execution\n").unwrap();

        vcr()
            .current_dir(dir.path())
            .env("VCR_CONFIG", &config)
            .arg("vcr-test")
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Failed to parse vcr.toml"));
    }
}
