//! JSON shapes exchanged over the broker (spec §6), decoupled from the
//! internal domain model in [`crate::model`].

use serde::{Deserialize, Serialize};

/// Inbound `submission_queue` message body.
///
/// `submission_id`/`language`/`code` are optional on the wire so a message
/// missing them still deserialises — the required-fields check (spec §4.2
/// step 3) runs as its own validation step, distinct from a JSON parse
/// failure (step 2).
#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionMessage {
    #[serde(rename = "SubmissionId", default)]
    pub submission_id: Option<String>,
    #[serde(rename = "Language", default)]
    pub language: Option<String>,
    #[serde(rename = "Code", default)]
    pub code: Option<String>,
    #[serde(rename = "TimeLimit")]
    pub time_limit: i64,
    #[serde(rename = "MemoryLimit")]
    pub memory_limit: i64,
    #[serde(rename = "Testcases", default)]
    pub testcases: Vec<TestCaseMessage>,
}

/// One entry of `SubmissionMessage::testcases`.
#[derive(Debug, Clone, Deserialize)]
pub struct TestCaseMessage {
    #[serde(rename = "TestCaseId")]
    pub testcase_id: String,
    #[serde(rename = "IndexNo")]
    pub index_no: i64,
    #[serde(rename = "InputRef")]
    pub input_ref: String,
    #[serde(rename = "OutputRef")]
    pub output_ref: String,
}

/// Outbound reply body, published to the incoming message's `replyTo`.
#[derive(Debug, Clone, Serialize)]
pub struct ReplyMessage {
    #[serde(rename = "SubmissionId")]
    pub submission_id: String,
    #[serde(rename = "CompileResult")]
    pub compile_result: String,
    #[serde(rename = "TotalTime")]
    pub total_time: u64,
    #[serde(rename = "TotalMemory")]
    pub total_memory: u64,
    #[serde(rename = "ErrorCode")]
    pub error_code: String,
    #[serde(rename = "ErrorMessage")]
    pub error_message: String,
}

impl From<crate::model::SubmissionResult> for ReplyMessage {
    fn from(r: crate::model::SubmissionResult) -> Self {
        ReplyMessage {
            submission_id: r.submission_id,
            compile_result: r.compile_result,
            total_time: r.total_time_ms,
            total_memory: r.total_memory_kb,
            error_code: r.error_code,
            error_message: r.error_message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_message_parses_pascal_case_json() {
        let body = r#"{
            "SubmissionId": "sub-1",
            "Language": "python",
            "Code": "print(1)",
            "TimeLimit": 2000,
            "MemoryLimit": 131072,
            "Testcases": [
                { "TestCaseId": "tc-0", "IndexNo": 0, "InputRef": "1 2", "OutputRef": "3" }
            ]
        }"#;
        let msg: SubmissionMessage = serde_json::from_str(body).unwrap();
        assert_eq!(msg.submission_id.as_deref(), Some("sub-1"));
        assert_eq!(msg.testcases.len(), 1);
        assert_eq!(msg.testcases[0].index_no, 0);
    }

    #[test]
    fn reply_message_serializes_pascal_case_json() {
        let reply = ReplyMessage {
            submission_id: "sub-1".into(),
            compile_result: "000".into(),
            total_time: 30,
            total_memory: 9_000,
            error_code: "Passed".into(),
            error_message: String::new(),
        };
        let json = serde_json::to_string(&reply).unwrap();
        assert!(json.contains("\"CompileResult\":\"000\""));
        assert!(json.contains("\"TotalTime\":30"));
    }
}
