//! Orchestrates the `judge-sandbox` child process (spec §4.2): write the
//! request to its stdin, enforce the subprocess timeout, parse its stdout.

use std::process::Stdio;
use std::time::Duration;

use judge_common::model::{Submission, TestCaseVerdict};
use judge_sandbox::{SandboxRequest, SandboxResponse};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Failure modes a sandbox run can produce.
///
/// Only [`RunnerError::SpawnFailed`] is transient — every other variant is a
/// terminal, reportable outcome (spec §4.2, §7): a non-zero exit or
/// unparsable stdout means the child ran and failed, and a timeout means the
/// submission itself is the problem, not the broker round-trip.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("failed to spawn judge-sandbox: {0}")]
    SpawnFailed(#[source] std::io::Error),
    #[error("judge-sandbox exited with status {0}")]
    NonZeroExit(std::process::ExitStatus),
    #[error("judge-sandbox produced unparsable output: {0}")]
    MalformedOutput(#[source] serde_json::Error),
    #[error("judge-sandbox did not finish within {0:?}")]
    TimedOut(Duration),
    #[error("failed to write request to judge-sandbox stdin: {0}")]
    StdinWriteFailed(#[source] std::io::Error),
}

impl RunnerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RunnerError::SpawnFailed(_))
    }
}

/// Runs a validated [`Submission`] through the sandbox and returns its
/// ordered verdicts.
pub trait SandboxRunner {
    fn run(
        &self,
        submission: &Submission,
    ) -> impl std::future::Future<Output = Result<Vec<TestCaseVerdict>, RunnerError>> + Send;
}

/// Upper bound on how long one subprocess invocation may run (spec §4.2):
/// `ceil(testcases / P) * P * (timeLimit + 2) + 60`, capped at 300s.
pub fn subprocess_timeout(testcase_count: usize, max_parallel: u32, time_limit_sec: u32) -> Duration {
    let p = max_parallel.max(1) as u64;
    let batches = (testcase_count as u64).div_ceil(p);
    let seconds = batches * p * (time_limit_sec as u64 + 2) + 60;
    Duration::from_secs(seconds.min(300))
}

/// Spawns the real `judge-sandbox` binary per submission.
pub struct ChildProcessRunner {
    binary_path: String,
    max_parallel_testcases: u32,
}

impl ChildProcessRunner {
    pub fn new(binary_path: impl Into<String>, max_parallel_testcases: u32) -> Self {
        Self {
            binary_path: binary_path.into(),
            max_parallel_testcases,
        }
    }
}

impl SandboxRunner for ChildProcessRunner {
    async fn run(&self, submission: &Submission) -> Result<Vec<TestCaseVerdict>, RunnerError> {
        let request = SandboxRequest {
            language: submission.language,
            source_code: submission.source_code.clone(),
            testcases: submission.testcases.clone(),
            time_limit_sec: submission.time_limit_sec,
            memory_limit_kb: submission.memory_limit_kb,
        };
        let body = serde_json::to_vec(&request).expect("SandboxRequest always serialises");

        let timeout = subprocess_timeout(
            submission.testcases.len(),
            self.max_parallel_testcases,
            submission.time_limit_sec,
        );

        let mut child = Command::new(&self.binary_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(RunnerError::SpawnFailed)?;

        let mut stdin = child.stdin.take().expect("stdin was piped");
        let write = async {
            stdin.write_all(&body).await?;
            stdin.shutdown().await
        };

        let outcome = tokio::time::timeout(timeout, async {
            write.await.map_err(RunnerError::StdinWriteFailed)?;
            child.wait_with_output().await.map_err(RunnerError::SpawnFailed)
        })
        .await;

        let output = match outcome {
            Ok(result) => result?,
            Err(_) => return Err(RunnerError::TimedOut(timeout)),
        };

        if !output.status.success() {
            return Err(RunnerError::NonZeroExit(output.status));
        }

        let verdicts: SandboxResponse =
            serde_json::from_slice(&output.stdout).map_err(RunnerError::MalformedOutput)?;

        Ok(verdicts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_scales_with_batches_and_is_capped() {
        let small = subprocess_timeout(4, 4, 2);
        assert_eq!(small, Duration::from_secs(1 * 4 * 4 + 60));

        let huge = subprocess_timeout(1000, 4, 60);
        assert_eq!(huge, Duration::from_secs(300));
    }

    #[test]
    fn only_spawn_failure_is_transient() {
        use std::os::unix::process::ExitStatusExt;

        assert!(RunnerError::SpawnFailed(std::io::Error::other("x")).is_transient());
        assert!(!RunnerError::TimedOut(Duration::from_secs(1)).is_transient());
        assert!(!RunnerError::NonZeroExit(std::process::ExitStatus::from_raw(1 << 8)).is_transient());
    }
}
