//! Validation pipeline for an inbound message body (spec §4.2, steps 1-5).

use judge_common::limits::{normalize_memory_limit_kb, normalize_time_limit_ms};
use judge_common::model::{Language, Submission, TestCase};
use judge_common::wire::SubmissionMessage;

/// A terminal validation outcome: enough to build a reply, even when the
/// body never fully parsed into a [`Submission`].
#[derive(Debug, Clone)]
pub struct ValidationFailure {
    pub submission_id: String,
    pub error_code: &'static str,
    pub error_message: String,
}

/// Run the validation pipeline against a raw message body.
///
/// `retry_count` is the delivery's `x-retry-count` header, read by the
/// caller before this is invoked — it is never part of the JSON body.
pub fn validate(raw_body: &[u8], retry_count: u32, max_retry: u32) -> Result<Submission, ValidationFailure> {
    if retry_count >= max_retry {
        return Err(ValidationFailure {
            submission_id: String::new(),
            error_code: "MAX_RETRY_EXCEEDED",
            error_message: format!("retry count {retry_count} reached the maximum of {max_retry}"),
        });
    }

    let msg: SubmissionMessage = serde_json::from_slice(raw_body).map_err(|e| ValidationFailure {
        submission_id: String::new(),
        error_code: "INVALID_JSON",
        error_message: e.to_string(),
    })?;

    let submission_id = msg.submission_id.clone().unwrap_or_default();

    let mut missing = Vec::new();
    if msg.submission_id.as_deref().unwrap_or("").is_empty() {
        missing.push("SubmissionId");
    }
    if msg.language.as_deref().unwrap_or("").is_empty() {
        missing.push("Language");
    }
    if msg.code.as_deref().unwrap_or("").is_empty() {
        missing.push("Code");
    }
    if !missing.is_empty() {
        return Err(ValidationFailure {
            submission_id,
            error_code: "MISSING_REQUIRED_FIELDS",
            error_message: format!("missing required field(s): {}", missing.join(", ")),
        });
    }

    if msg.testcases.is_empty() {
        return Err(ValidationFailure {
            submission_id,
            error_code: "NO_TESTCASES",
            error_message: "submission has no test cases".to_string(),
        });
    }

    let language_tag = msg.language.as_deref().unwrap_or_default();
    let language = match Language::parse(language_tag) {
        Some(l) => l,
        None => {
            return Err(ValidationFailure {
                submission_id,
                error_code: "MISSING_REQUIRED_FIELDS",
                error_message: format!("unsupported language: {language_tag}"),
            })
        }
    };

    let time_limit_sec = normalize_time_limit_ms(msg.time_limit);
    let memory_limit_kb = normalize_memory_limit_kb(msg.memory_limit);

    let testcases = msg
        .testcases
        .into_iter()
        .map(|tc| TestCase {
            testcase_id: tc.testcase_id,
            index_no: tc.index_no,
            input_ref: tc.input_ref,
            output_ref: tc.output_ref,
        })
        .collect();

    Ok(Submission {
        submission_id,
        language,
        source_code: msg.code.unwrap_or_default(),
        time_limit_sec,
        memory_limit_kb,
        testcases,
        retry_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_BODY: &str = r#"{
        "SubmissionId": "sub-1", "Language": "python", "Code": "print(1)",
        "TimeLimit": 2000, "MemoryLimit": 131072,
        "Testcases": [{ "TestCaseId": "tc-0", "IndexNo": 0, "InputRef": "", "OutputRef": "1" }]
    }"#;

    #[test]
    fn max_retry_exceeded_checked_before_parsing() {
        let err = validate(b"not json at all", 3, 3).unwrap_err();
        assert_eq!(err.error_code, "MAX_RETRY_EXCEEDED");
    }

    #[test]
    fn invalid_json_is_reported() {
        let err = validate(b"{not json", 0, 3).unwrap_err();
        assert_eq!(err.error_code, "INVALID_JSON");
    }

    #[test]
    fn missing_required_fields_detected() {
        let body = r#"{"TimeLimit":1000,"MemoryLimit":1024,"Testcases":[]}"#;
        let err = validate(body.as_bytes(), 0, 3).unwrap_err();
        assert_eq!(err.error_code, "MISSING_REQUIRED_FIELDS");
    }

    #[test]
    fn empty_testcases_rejected() {
        let body = r#"{"SubmissionId":"s","Language":"python","Code":"x","TimeLimit":1000,"MemoryLimit":1024,"Testcases":[]}"#;
        let err = validate(body.as_bytes(), 0, 3).unwrap_err();
        assert_eq!(err.error_code, "NO_TESTCASES");
    }

    #[test]
    fn valid_body_normalises_limits() {
        let submission = validate(VALID_BODY.as_bytes(), 0, 3).unwrap();
        assert_eq!(submission.time_limit_sec, 2);
        assert_eq!(submission.memory_limit_kb, 131_072);
        assert_eq!(submission.testcases.len(), 1);
    }

    #[test]
    fn out_of_range_limits_fall_back_to_defaults() {
        let body = r#"{"SubmissionId":"s","Language":"cpp","Code":"x","TimeLimit":0,"MemoryLimit":0,
            "Testcases":[{"TestCaseId":"t","IndexNo":0,"InputRef":"","OutputRef":""}]}"#;
        let submission = validate(body.as_bytes(), 0, 3).unwrap();
        assert_eq!(submission.time_limit_sec, judge_common::limits::DEFAULT_TIME_LIMIT_SEC);
        assert_eq!(submission.memory_limit_kb, judge_common::limits::DEFAULT_MEMORY_LIMIT_KB);
    }
}
