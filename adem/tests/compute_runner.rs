//! End-to-end tests for the subprocess runner and the pipeline on top of it.
//!
//! These spawn real `sh` processes, so they only run on unix.

#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use adem::core::types::{ExecutionOutcome, MALFORMED_QUERY, OVERFLOW_SUSPECTED};
use adem::io::config::ComputeConfig;
use adem::io::runner::{CommandRunner, ComputeRequest, ComputeRunner};
use adem::pipeline::run_query;

const TIME: &str = "Jan 2, 2006 15:04:05 UTC";

fn sh_config(workdir: &Path, script: &str, timeout_secs: u64) -> ComputeConfig {
    ComputeConfig {
        program: "sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        workdir: workdir.to_path_buf(),
        timeout_secs,
        ..ComputeConfig::default()
    }
}

/// True if `pid` names a live, non-zombie process.
#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    match fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => {
            // State follows the parenthesised command name.
            let state = stat
                .rsplit_once(')')
                .and_then(|(_, rest)| rest.trim_start().chars().next());
            !matches!(state, Some('Z') | Some('X') | None)
        }
        Err(_) => false,
    }
}

/// Verifies a computation that writes `42` and exits 0 is `Completed`.
#[test]
fn exit_zero_is_completed_with_stdout() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = sh_config(temp.path(), "printf 42", 5);
    let outcome = config.runner().run(&config.request(""));
    match outcome {
        ExecutionOutcome::Completed { stdout, elapsed } => {
            assert_eq!(stdout, b"42");
            assert!(elapsed > Duration::ZERO);
        }
        other => panic!("expected completed, got {other:?}"),
    }
}

/// Verifies the process runs in the configured working directory.
#[test]
fn runs_in_configured_workdir() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("adem.txt"), "support file").expect("write");
    let config = sh_config(temp.path(), "cat adem.txt", 5);
    let payload = run_query(&config.runner(), &config, "1", TIME);
    assert_eq!(payload.query_result[0], "Result: support file");
}

/// Verifies the validated query reaches the process as part of one argument.
#[test]
fn query_is_embedded_in_argument() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = sh_config(temp.path(), "printf '%s' '{query}'", 5);
    let payload = run_query(&config.runner(), &config, "6 4 2 + 2 10", TIME);
    assert_eq!(payload.query_input, "6 4 2 + 2 10");
    assert_eq!(payload.query_result[0], "Result: 6 4 2 + 2 10");
    assert!(payload.query_result[1].starts_with("Time elapsed: "));
}

/// Verifies exit 1 classifies as a suspected overflow with the echo cleared.
#[test]
fn exit_one_is_suspected_overflow() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = sh_config(temp.path(), "echo 'OverflowError' >&2; exit 1", 5);
    let outcome = config.runner().run(&config.request("6 4"));
    assert!(
        matches!(outcome, ExecutionOutcome::NonZeroExit { code: Some(1), .. }),
        "{outcome:?}"
    );

    let payload = run_query(&config.runner(), &config, "6 4", TIME);
    assert_eq!(payload.query_result, vec![OVERFLOW_SUSPECTED]);
    assert_eq!(payload.query_input, "");
}

/// Verifies a malformed query never starts a process.
///
/// The script would create a marker file if it ever ran.
#[test]
fn malformed_query_spawns_nothing() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = sh_config(temp.path(), "touch ran", 5);
    let payload = run_query(&config.runner(), &config, "rm -rf", TIME);
    assert_eq!(payload.query_result, vec![MALFORMED_QUERY]);
    assert!(!temp.path().join("ran").exists());
}

/// Verifies the time budget kills the computation and everything it forked.
///
/// The script records its own pid and a background child's pid, then blocks.
/// After `run` returns, neither may still be running.
#[cfg(target_os = "linux")]
#[test]
fn timeout_returns_within_budget_and_leaves_no_process() {
    let temp = tempfile::tempdir().expect("tempdir");
    let runner = CommandRunner::new(
        "sh",
        vec![
            "-c".to_string(),
            "echo $$ > pids; sleep 30 & echo $! >> pids; wait".to_string(),
        ],
    );
    let budget = Duration::from_millis(500);
    let request = ComputeRequest {
        query: String::new(),
        workdir: temp.path().to_path_buf(),
        budget,
        output_limit_bytes: 1000,
    };

    let start = Instant::now();
    let outcome = runner.run(&request);
    let took = start.elapsed();

    assert!(
        matches!(outcome, ExecutionOutcome::TimedOut { .. }),
        "{outcome:?}"
    );
    assert!(took >= budget, "returned before budget: {took:?}");
    assert!(took < budget + Duration::from_secs(2), "took {took:?}");

    let pids = fs::read_to_string(temp.path().join("pids")).expect("read pids");
    let pids: Vec<u32> = pids
        .lines()
        .map(|line| line.trim().parse().expect("pid"))
        .collect();
    assert_eq!(pids.len(), 2, "{pids:?}");

    // The orphaned sleep is reaped by init asynchronously; give it a moment.
    let deadline = Instant::now() + Duration::from_secs(2);
    while pids.iter().any(|pid| process_alive(*pid)) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    for pid in pids {
        assert!(!process_alive(pid), "process {pid} still running");
    }
}

/// Verifies a missing working directory is an infrastructure failure.
#[test]
fn missing_workdir_is_start_failure() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = sh_config(&temp.path().join("bin/adem"), "printf 1", 5);
    let outcome = config.runner().run(&config.request("1"));
    assert!(
        matches!(outcome, ExecutionOutcome::StartFailed { .. }),
        "{outcome:?}"
    );
}
