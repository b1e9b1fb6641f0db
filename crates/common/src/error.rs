//! Error taxonomy for the judge worker, by layer (spec §7).

use thiserror::Error;

/// Errors surfaced across the validation, sandbox, and broker layers.
///
/// Each variant maps to one of the taxonomy codes the Handler puts in a
/// reply's `ErrorCode` field. Validation and submission-level variants are
/// terminal (Ack + Reply); `Broker` covers cases the caller should
/// retry/requeue; `BrokerFatal` is reserved for connection failures that
/// should bring the process down.
#[derive(Error, Debug)]
pub enum JudgeError {
    /// Delivery already exceeded the retry budget.
    #[error("max retry count exceeded")]
    MaxRetryExceeded,

    /// Message body did not parse as JSON.
    #[error("invalid JSON body: {0}")]
    InvalidJson(String),

    /// Required field(s) absent from an otherwise well-formed payload.
    #[error("missing required field(s): {0}")]
    MissingRequiredFields(String),

    /// `testcases` array was empty.
    #[error("submission has no test cases")]
    NoTestcases,

    /// The sandbox could not compile or syntax-check the submission.
    #[error("compilation failed: {0}")]
    Compilation(String),

    /// A pre-execution failure inside the sandbox (box init, isolate itself).
    #[error("internal sandbox error: {0}")]
    Internal(String),

    /// Spawning or communicating with the sandbox subprocess failed.
    #[error("sandbox subprocess error: {0}")]
    Subprocess(String),

    /// The sandbox subprocess exceeded its outer timeout and was killed.
    #[error("sandbox subprocess timed out")]
    SubprocessTimeout,

    /// Broker connect/publish/ack failure — caller should retry.
    #[error("broker error: {0}")]
    Broker(String),

    /// Repeated broker connect failures — unrecoverable, process should exit.
    #[error("broker connection exhausted retries: {0}")]
    BrokerFatal(String),
}

impl JudgeError {
    /// The taxonomy string placed in a reply's `ErrorCode` field (spec §7).
    pub fn error_code(&self) -> &'static str {
        match self {
            JudgeError::MaxRetryExceeded => "MAX_RETRY_EXCEEDED",
            JudgeError::InvalidJson(_) => "INVALID_JSON",
            JudgeError::MissingRequiredFields(_) => "MISSING_REQUIRED_FIELDS",
            JudgeError::NoTestcases => "NO_TESTCASES",
            JudgeError::Compilation(_) => "CompilationError",
            JudgeError::Internal(_) => "InternalError",
            JudgeError::Subprocess(_) => "InternalError",
            JudgeError::SubprocessTimeout => "TimeLimitExceeded",
            JudgeError::Broker(_) => "BROKER_ERROR",
            JudgeError::BrokerFatal(_) => "BROKER_FATAL",
        }
    }

    /// Whether this failure should be retried via requeue rather than
    /// answered with a terminal reply (spec §7, "Transient").
    pub fn is_transient(&self) -> bool {
        matches!(self, JudgeError::Subprocess(_) | JudgeError::Broker(_))
    }
}

/// Result type alias using [`JudgeError`].
pub type JudgeResult<T> = Result<T, JudgeError>;
