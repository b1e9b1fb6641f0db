//! Top-level submission handling: validate, run, decide (spec §4.2).

use judge_common::model::SubmissionResult;
use judge_common::wire::ReplyMessage;

use crate::decision::Decision;
use crate::runner::{RunnerError, SandboxRunner};
use crate::validate::{validate, ValidationFailure};

/// Config the Handler needs that isn't per-submission.
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    pub max_retry: u32,
}

/// Build a reply for a submission that never made it into the sandbox.
fn submission_level_error(submission_id: String, error_code: &str, error_message: String) -> ReplyMessage {
    ReplyMessage::from(SubmissionResult {
        submission_id,
        compile_result: String::new(),
        total_time_ms: 0,
        total_memory_kb: 0,
        error_code: error_code.to_string(),
        error_message,
    })
}

impl From<ValidationFailure> for ReplyMessage {
    fn from(f: ValidationFailure) -> Self {
        submission_level_error(f.submission_id, f.error_code, f.error_message)
    }
}

/// Handle one delivery body end to end: validate, run through the sandbox,
/// and decide what the consumer should do with the delivery.
///
/// `retry_count` is read from the delivery's `x-retry-count` header by the
/// caller. A `MAX_RETRY_EXCEEDED` validation failure still produces an
/// `AckAndReply` (spec §7: the submitter is told, the delivery is not
/// requeued forever).
pub async fn handle<R: SandboxRunner>(
    runner: &R,
    config: &HandlerConfig,
    raw_body: &[u8],
    retry_count: u32,
) -> Decision {
    let submission = match validate(raw_body, retry_count, config.max_retry) {
        Ok(s) => s,
        Err(failure) => return Decision::AckAndReply(failure.into()),
    };

    match runner.run(&submission).await {
        Ok(verdicts) => {
            let result = SubmissionResult::from_verdicts(submission.submission_id, &verdicts);
            Decision::AckAndReply(result.into())
        }
        Err(err) if err.is_transient() => Decision::Requeue,
        Err(err) => Decision::AckAndReply(submission_level_error(
            submission.submission_id,
            runner_error_code(&err),
            err.to_string(),
        )),
    }
}

fn runner_error_code(err: &RunnerError) -> &'static str {
    match err {
        RunnerError::TimedOut(_) => "TimeLimitExceeded",
        RunnerError::SpawnFailed(_) => "InternalError",
        RunnerError::NonZeroExit(_) | RunnerError::MalformedOutput(_) | RunnerError::StdinWriteFailed(_) => {
            "InternalError"
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use judge_common::model::{Submission, TestCaseStatus, TestCaseVerdict};

    use super::*;

    struct FakeRunner<F> {
        f: F,
        calls: Arc<AtomicUsize>,
    }

    impl<F> SandboxRunner for FakeRunner<F>
    where
        F: Fn(&Submission) -> Result<Vec<TestCaseVerdict>, RunnerError> + Sync,
    {
        async fn run(&self, submission: &Submission) -> Result<Vec<TestCaseVerdict>, RunnerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.f)(submission)
        }
    }

    const VALID_BODY: &str = r#"{
        "SubmissionId": "sub-1", "Language": "python", "Code": "print(1)",
        "TimeLimit": 2000, "MemoryLimit": 131072,
        "Testcases": [{ "TestCaseId": "tc-0", "IndexNo": 0, "InputRef": "", "OutputRef": "1" }]
    }"#;

    fn config() -> HandlerConfig {
        HandlerConfig { max_retry: 3 }
    }

    #[tokio::test]
    async fn all_passed_yields_ack_and_reply_with_passed_code() {
        let runner = FakeRunner {
            calls: Arc::new(AtomicUsize::new(0)),
            f: |s: &Submission| {
                Ok(vec![TestCaseVerdict::passed(
                    s.testcases[0].testcase_id.clone(),
                    0,
                    30,
                    4096,
                    "1".into(),
                )])
            },
        };

        let decision = handle(&runner, &config(), VALID_BODY.as_bytes(), 0).await;
        match decision {
            Decision::AckAndReply(reply) => {
                assert_eq!(reply.compile_result, "0");
                assert_eq!(reply.error_code, "Passed");
            }
            other => panic!("expected AckAndReply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn validation_failure_never_reaches_the_runner() {
        let calls = Arc::new(AtomicUsize::new(0));
        let runner = FakeRunner {
            calls: calls.clone(),
            f: |_: &Submission| Ok(vec![]),
        };

        let decision = handle(&runner, &config(), b"not json", 0).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        match decision {
            Decision::AckAndReply(reply) => assert_eq!(reply.error_code, "INVALID_JSON"),
            other => panic!("expected AckAndReply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn retry_exhaustion_is_ack_and_reply_not_requeue() {
        let runner = FakeRunner {
            calls: Arc::new(AtomicUsize::new(0)),
            f: |_: &Submission| Ok(vec![]),
        };

        let decision = handle(&runner, &config(), VALID_BODY.as_bytes(), 3).await;
        match decision {
            Decision::AckAndReply(reply) => assert_eq!(reply.error_code, "MAX_RETRY_EXCEEDED"),
            other => panic!("expected AckAndReply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn spawn_failure_requeues() {
        let runner = FakeRunner {
            calls: Arc::new(AtomicUsize::new(0)),
            f: |_: &Submission| Err(RunnerError::SpawnFailed(std::io::Error::other("no such file"))),
        };

        let decision = handle(&runner, &config(), VALID_BODY.as_bytes(), 0).await;
        assert!(matches!(decision, Decision::Requeue));
    }

    #[tokio::test]
    async fn timeout_is_terminal_not_requeued() {
        let runner = FakeRunner {
            calls: Arc::new(AtomicUsize::new(0)),
            f: |_: &Submission| Err(RunnerError::TimedOut(std::time::Duration::from_secs(60))),
        };

        let decision = handle(&runner, &config(), VALID_BODY.as_bytes(), 0).await;
        match decision {
            Decision::AckAndReply(reply) => assert_eq!(reply.error_code, "TimeLimitExceeded"),
            other => panic!("expected AckAndReply, got {other:?}"),
        }
    }

    #[test]
    fn partial_failure_reports_first_failing_testcase() {
        let verdicts = vec![
            TestCaseVerdict::passed("t0".into(), 0, 10, 100, "ok".into()),
            TestCaseVerdict::failed(
                "t1".into(),
                1,
                TestCaseStatus::WrongAnswer,
                12,
                100,
                "bad".into(),
                "expected 3 got 4",
            ),
        ];
        let result = SubmissionResult::from_verdicts("sub-2".into(), &verdicts);
        assert_eq!(result.compile_result, "05");
        assert_eq!(result.error_code, "Failed");
    }
}
