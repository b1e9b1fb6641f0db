//! Core data model (spec §3): submissions, test cases, and verdicts.

use serde::{Deserialize, Serialize};

/// Opaque submission identifier, carried verbatim from the inbound message.
pub type SubmissionId = String;

/// Opaque test-case identifier, carried verbatim from the inbound message.
pub type TestCaseId = String;

/// Language a submission is written in.
///
/// Closed variant per spec §9 ("Dynamic dispatch on language"): adding a
/// language means adding a variant plus its compile/run hook, not a new
/// trait implementor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Cpp,
}

impl Language {
    /// Parse a language tag from the wire payload, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "python" | "python3" | "py" => Some(Language::Python),
            "cpp" | "c++" | "cxx" => Some(Language::Cpp),
            _ => None,
        }
    }

    /// Whether this language needs a compile phase (vs. a syntax check).
    pub fn is_compiled(&self) -> bool {
        matches!(self, Language::Cpp)
    }
}

/// One test case: an input and the expected stdout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub testcase_id: TestCaseId,
    pub index_no: i64,
    pub input_ref: String,
    pub output_ref: String,
}

/// A validated, normalised submission, ready to be handed to the sandbox
/// (spec §3 `Submission`). Immutable once built.
#[derive(Debug, Clone)]
pub struct Submission {
    pub submission_id: SubmissionId,
    pub language: Language,
    pub source_code: String,
    /// Seconds, clamped to (0, 60] by the Handler's validation pipeline.
    pub time_limit_sec: u32,
    /// KB, clamped to (0, 2_097_152].
    pub memory_limit_kb: u64,
    pub testcases: Vec<TestCase>,
    pub retry_count: u32,
}

/// Status of a single test-case verdict (spec §3, §8 coding table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum TestCaseStatus {
    Passed,
    WrongAnswer,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    RuntimeError,
    CompilationError,
    InternalError,
    Skipped,
}

impl TestCaseStatus {
    /// The single-digit `CompileResult` code for this status (spec §3, §8).
    pub fn code(&self) -> char {
        match self {
            TestCaseStatus::Passed => '0',
            TestCaseStatus::TimeLimitExceeded => '1',
            TestCaseStatus::MemoryLimitExceeded => '2',
            TestCaseStatus::RuntimeError => '3',
            TestCaseStatus::InternalError => '4',
            TestCaseStatus::WrongAnswer => '5',
            TestCaseStatus::CompilationError => '6',
            TestCaseStatus::Skipped => '7',
        }
    }

    /// Whether this status represents a test case that did not pass.
    pub fn is_failure(&self) -> bool {
        !matches!(self, TestCaseStatus::Passed)
    }
}

impl std::fmt::Display for TestCaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Result of running one test case (spec §3 `TestCaseVerdict`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCaseVerdict {
    pub testcase_id: TestCaseId,
    pub index_no: i64,
    pub status: TestCaseStatus,
    pub time_ms: u64,
    pub memory_kb: u64,
    pub output: String,
    pub error: Option<String>,
}

impl TestCaseVerdict {
    pub fn passed(testcase_id: TestCaseId, index_no: i64, time_ms: u64, memory_kb: u64, output: String) -> Self {
        Self {
            testcase_id,
            index_no,
            status: TestCaseStatus::Passed,
            time_ms,
            memory_kb,
            output,
            error: None,
        }
    }

    pub fn failed(
        testcase_id: TestCaseId,
        index_no: i64,
        status: TestCaseStatus,
        time_ms: u64,
        memory_kb: u64,
        output: String,
        error: impl Into<String>,
    ) -> Self {
        debug_assert!(status != TestCaseStatus::Passed, "use TestCaseVerdict::passed for Passed");
        Self {
            testcase_id,
            index_no,
            status,
            time_ms,
            memory_kb,
            output,
            error: Some(error.into()),
        }
    }
}

/// Aggregated result for an entire submission (spec §3 `SubmissionResult`).
#[derive(Debug, Clone)]
pub struct SubmissionResult {
    pub submission_id: SubmissionId,
    pub compile_result: String,
    pub total_time_ms: u64,
    pub total_memory_kb: u64,
    pub error_code: String,
    pub error_message: String,
}

impl SubmissionResult {
    /// Build a `SubmissionResult` from ordered verdicts, per spec §4.2
    /// "Reply assembly".
    pub fn from_verdicts(submission_id: SubmissionId, verdicts: &[TestCaseVerdict]) -> Self {
        let compile_result: String = verdicts.iter().map(|v| v.status.code()).collect();
        let total_time_ms = verdicts.iter().map(|v| v.time_ms).sum();
        let total_memory_kb = verdicts.iter().map(|v| v.memory_kb).sum();

        let all_passed = verdicts.iter().all(|v| v.status == TestCaseStatus::Passed);

        let first_failure = verdicts.iter().find(|v| v.status.is_failure());

        let (error_code, error_message) = if all_passed {
            ("Passed".to_string(), String::new())
        } else {
            match first_failure {
                Some(v) if v.status == TestCaseStatus::CompilationError => (
                    "CompilationError".to_string(),
                    v.error.clone().unwrap_or_default(),
                ),
                Some(v) if v.status == TestCaseStatus::InternalError => (
                    "InternalError".to_string(),
                    v.error.clone().unwrap_or_default(),
                ),
                Some(v) => (
                    "Failed".to_string(),
                    format!("[{}] {}: {}", v.index_no, v.status, v.error.clone().unwrap_or_default()),
                ),
                None => ("Passed".to_string(), String::new()),
            }
        };

        Self {
            submission_id,
            compile_result,
            total_time_ms,
            total_memory_kb,
            error_code,
            error_message,
        }
    }
}
