//! Stdin/stdout JSON protocol the `judge-sandbox` binary speaks (spec §4.2:
//! the Handler "passes the validated payload on stdin and reads a JSON array
//! of verdicts from stdout").

use serde::{Deserialize, Serialize};

use judge_common::model::{Language, TestCase, TestCaseVerdict};

/// Request read from stdin by the `judge-sandbox` binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxRequest {
    pub language: Language,
    pub source_code: String,
    pub testcases: Vec<TestCase>,
    pub time_limit_sec: u32,
    pub memory_limit_kb: u64,
}

/// Response written to stdout: a bare JSON array of verdicts in `indexNo`
/// order, matching what `execute()` returns.
pub type SandboxResponse = Vec<TestCaseVerdict>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips_through_json() {
        let req = SandboxRequest {
            language: Language::Python,
            source_code: "print(1)".into(),
            testcases: vec![TestCase {
                testcase_id: "tc-0".into(),
                index_no: 0,
                input_ref: String::new(),
                output_ref: "1".into(),
            }],
            time_limit_sec: 2,
            memory_limit_kb: 131_072,
        };
        let json = serde_json::to_string(&req).unwrap();
        let back: SandboxRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.testcases.len(), 1);
        assert_eq!(back.time_limit_sec, 2);
    }
}
