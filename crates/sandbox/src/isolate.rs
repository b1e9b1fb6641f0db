//! Abstraction over the `isolate` binary's init/run/cleanup invocations.
//!
//! [`IsolateOps`] lets the executor run against the real `isolate` tool
//! ([`RealIsolate`]) or a fake standing in for it in tests, since `isolate`
//! requires root and kernel cgroup support the test environment may lack.

use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{anyhow, Context, Result};
use tokio::process::Command;

/// Resource limits, redirections, and command line for one sandboxed run.
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub box_id: u32,
    pub time_limit_sec: f64,
    pub wall_time_limit_sec: f64,
    pub mem_limit_kb: u64,
    pub processes: u32,
    pub open_files: u32,
    pub fsize_kb: u32,
    pub stdin: Option<PathBuf>,
    pub stdout: PathBuf,
    pub meta_path: PathBuf,
    pub env: Vec<(String, String)>,
    pub extra_dirs: Vec<String>,
    pub argv: Vec<String>,
    pub nice: Option<i32>,
    pub cpu_affinity: Option<Vec<usize>>,
}

/// Operations the executor needs from a sandbox backend.
///
/// `run` is responsible for leaving `spec.stdout` and `spec.meta_path`
/// populated the way `isolate --run -o <stdout> -M <meta>` would, regardless
/// of backend; the executor only ever reads those files back.
pub trait IsolateOps: Clone + Send + Sync + 'static {
    fn init(&self, box_id: u32) -> impl Future<Output = Result<PathBuf>> + Send;
    fn run(&self, spec: &RunSpec) -> impl Future<Output = Result<()>> + Send;
    fn cleanup(&self, box_id: u32) -> impl Future<Output = Result<()>> + Send;
}

/// Backend that shells out to the real `isolate` binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealIsolate;

impl IsolateOps for RealIsolate {
    async fn init(&self, box_id: u32) -> Result<PathBuf> {
        let output = Command::new("isolate")
            .args(["-b", &box_id.to_string(), "--cg", "--init"])
            .output()
            .await
            .with_context(|| format!("failed to spawn isolate --init for box {box_id}"))?;

        if !output.status.success() {
            return Err(anyhow!(
                "isolate --init (box {box_id}) exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            ));
        }

        let root = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if root.is_empty() {
            return Err(anyhow!("isolate --init (box {box_id}) produced empty stdout"));
        }
        Ok(PathBuf::from(root).join("box"))
    }

    async fn run(&self, spec: &RunSpec) -> Result<()> {
        let box_id = spec.box_id.to_string();
        let mut args: Vec<String> = vec!["-b".into(), box_id, "--cg".into()];

        for dir in &spec.extra_dirs {
            args.push(format!("--dir={dir}"));
        }

        args.push("--run".into());
        args.push(format!("--time={}", spec.time_limit_sec));
        args.push(format!("--wall-time={}", spec.wall_time_limit_sec));
        args.push(format!("--cg-mem={}", spec.mem_limit_kb));
        args.push(format!("--processes={}", spec.processes));
        args.push(format!("--open-files={}", spec.open_files));
        args.push(format!("--fsize={}", spec.fsize_kb));

        for (key, value) in &spec.env {
            args.push("-E".into());
            args.push(format!("{key}={value}"));
        }

        args.push("-M".into());
        args.push(spec.meta_path.to_string_lossy().into_owned());

        if let Some(stdin) = &spec.stdin {
            args.push("-i".into());
            args.push(stdin.to_string_lossy().into_owned());
        }
        args.push("-o".into());
        args.push(spec.stdout.to_string_lossy().into_owned());
        args.push("--stderr-to-stdout".into());
        args.push("--silent".into());
        args.push("--".into());
        args.extend(spec.argv.iter().cloned());

        let mut child = Command::new("isolate")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn isolate --run for box {}", spec.box_id))?;

        if let Some(pid) = child.id() {
            apply_process_limits(pid, spec.nice, spec.cpu_affinity.as_deref());
        }

        child
            .wait()
            .await
            .with_context(|| format!("isolate --run for box {} failed while waiting", spec.box_id))?;
        Ok(())
    }

    async fn cleanup(&self, box_id: u32) -> Result<()> {
        let output = Command::new("isolate")
            .args(["-b", &box_id.to_string(), "--cg", "--cleanup"])
            .output()
            .await
            .with_context(|| format!("failed to spawn isolate --cleanup for box {box_id}"))?;

        if !output.status.success() {
            return Err(anyhow!(
                "isolate --cleanup (box {box_id}) exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            ));
        }
        Ok(())
    }
}

#[cfg(unix)]
fn apply_process_limits(pid: u32, nice: Option<i32>, cpu_affinity: Option<&[usize]>) {
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::unistd::Pid;

    let pid = Pid::from_raw(pid as i32);

    if let Some(nice) = nice {
        let res = unsafe { nix::libc::setpriority(nix::libc::PRIO_PROCESS, pid.as_raw() as u32, nice) };
        if res != 0 {
            let e = nix::errno::Errno::last();
            tracing::warn!(pid = pid.as_raw(), error = %e, "failed to set isolate child niceness");
        }
    }

    if let Some(cores) = cpu_affinity {
        let mut set = CpuSet::new();
        for &core in cores {
            if let Err(e) = set.set(core) {
                tracing::warn!(core, error = %e, "invalid CPU affinity core index");
            }
        }
        if let Err(e) = sched_setaffinity(pid, &set) {
            tracing::warn!(pid = pid.as_raw(), error = %e, "failed to set isolate child CPU affinity");
        }
    }
}

#[cfg(not(unix))]
fn apply_process_limits(_pid: u32, _nice: Option<i32>, _cpu_affinity: Option<&[usize]>) {}

/// Parse `ISOLATE_CPU_AFFINITY` values like `1-7` or `2,3,4` into core indices.
pub fn parse_cpu_affinity(raw: &str) -> Vec<usize> {
    let mut cores = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some((start, end)) = part.split_once('-') {
            if let (Ok(start), Ok(end)) = (start.trim().parse::<usize>(), end.trim().parse::<usize>()) {
                cores.extend(start..=end);
            }
        } else if let Ok(core) = part.parse::<usize>() {
            cores.push(core);
        }
    }
    cores
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_range_affinity() {
        assert_eq!(parse_cpu_affinity("1-7"), vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn parses_list_affinity() {
        assert_eq!(parse_cpu_affinity("2,3,4"), vec![2, 3, 4]);
    }
}
