//! `judge-sandbox`: reads a [`judge_sandbox::SandboxRequest`] from stdin, runs
//! it through the executor against the real `isolate` binary, and writes the
//! ordered verdicts as a JSON array to stdout. The Handler spawns this as a
//! child process so a sandbox crash cannot take down the worker (spec §4.2).

use std::env;
use std::io::Read;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use judge_sandbox::executor::{self, ExecutorConfig};
use judge_sandbox::isolate::{parse_cpu_affinity, RealIsolate};
use judge_sandbox::{BoxPool, SandboxRequest};

fn config_from_env() -> ExecutorConfig {
    let mut cfg = ExecutorConfig::default();

    if let Some(p) = env::var("MAX_PARALLEL_TESTCASES").ok().and_then(|v| v.parse().ok()) {
        cfg.max_parallel_testcases = p;
    }
    if let Some(n) = env::var("ISOLATE_NICE").ok().and_then(|v| v.parse().ok()) {
        cfg.isolate_nice = Some(n);
    }
    if let Some(cores) = env::var("ISOLATE_CPU_AFFINITY")
        .ok()
        .map(|v| parse_cpu_affinity(&v))
        .filter(|cores| !cores.is_empty())
    {
        cfg.isolate_cpu_affinity = Some(cores);
    }
    if let Ok(dirs) = env::var("ISOLATE_EXTRA_DIRS") {
        cfg.extra_dirs = dirs.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
    }

    cfg
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "judge_sandbox=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut raw = String::new();
    std::io::stdin()
        .read_to_string(&mut raw)
        .context("failed to read request from stdin")?;

    let request: SandboxRequest =
        serde_json::from_str(&raw).context("failed to parse sandbox request")?;

    let cfg = config_from_env();
    let pool = BoxPool::new(cfg.max_parallel_testcases * 2);
    let sandbox = RealIsolate;

    let verdicts = executor::execute(
        &cfg,
        &pool,
        &sandbox,
        request.language,
        &request.source_code,
        &request.testcases,
        request.time_limit_sec,
        request.memory_limit_kb,
    )
    .await;

    serde_json::to_writer(std::io::stdout(), &verdicts).context("failed to write verdicts to stdout")?;

    Ok(())
}
