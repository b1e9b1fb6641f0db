//! Configuration for the Olympus Judge worker.

use std::env;

/// Worker configuration loaded from environment variables (spec §6).
#[derive(Debug, Clone)]
pub struct Config {
    pub rabbitmq_host: String,
    pub rabbitmq_user: String,
    pub rabbitmq_pass: String,
    pub submission_queue: String,

    pub max_concurrent_submissions: u32,
    pub max_parallel_testcases: u32,
    pub max_retry_count: u32,
    pub default_time_limit_sec: u32,
    pub default_memory_limit_kb: u64,

    /// Whether the health sampler pauses/resumes the consumer (spec §9,
    /// Open Question 4).
    pub adaptive_mode: bool,
    pub memory_threshold_pct: f32,
    pub cpu_threshold_pct: f32,

    pub isolate_nice: Option<i32>,
    pub isolate_cpu_affinity: Option<String>,

    pub metrics_port: u16,
    pub sandbox_binary_path: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            rabbitmq_host: env::var("RABBITMQ_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            rabbitmq_user: env::var("RABBITMQ_USER").unwrap_or_else(|_| "guest".to_string()),
            rabbitmq_pass: env::var("RABBITMQ_PASS").unwrap_or_else(|_| "guest".to_string()),
            submission_queue: env::var("SUBMISSION_QUEUE").unwrap_or_else(|_| "submission_queue".to_string()),

            max_concurrent_submissions: env::var("MAX_CONCURRENT_SUBMISSIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1),
            max_parallel_testcases: env::var("MAX_PARALLEL_TESTCASES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4),
            max_retry_count: env::var("MAX_RETRY_COUNT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            default_time_limit_sec: env::var("DEFAULT_TIME_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(judge_common::limits::DEFAULT_TIME_LIMIT_SEC),
            default_memory_limit_kb: env::var("DEFAULT_MEMORY_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(judge_common::limits::DEFAULT_MEMORY_LIMIT_KB),

            adaptive_mode: env::var("ADAPTIVE_MODE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            memory_threshold_pct: env::var("MEMORY_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(85.0),
            cpu_threshold_pct: env::var("CPU_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(90.0),

            isolate_nice: env::var("ISOLATE_NICE").ok().and_then(|v| v.parse().ok()),
            isolate_cpu_affinity: env::var("ISOLATE_CPU_AFFINITY").ok(),

            metrics_port: env::var("METRICS_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(9091),
            sandbox_binary_path: env::var("SANDBOX_BINARY_PATH").unwrap_or_else(|_| "judge-sandbox".to_string()),
        }
    }

    pub fn amqp_url(&self) -> String {
        format!("amqp://{}:{}@{}:5672/%2f", self.rabbitmq_user, self.rabbitmq_pass, self.rabbitmq_host)
    }
}

/// Swap threshold (spec §4.3); kept separate from [`Config`] since it has
/// no dedicated env var in spec §6 and is fixed at the documented 10%.
pub const SWAP_THRESHOLD_PCT: f32 = 10.0;
