//! Phase A (compile/syntax check once) and Phase B (batched parallel
//! testcase execution with early stop) of the Sandbox Executor contract.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use judge_common::model::{Language, TestCase, TestCaseStatus, TestCaseVerdict};

use crate::box_pool::BoxPool;
use crate::isolate::{IsolateOps, RunSpec};
use crate::meta::{self, IsolateStatus};

const DEFAULT_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";
const WA_DIAGNOSTIC_TRUNCATE: usize = 200;

/// Tunables for compile and run limits (spec §4.1, §5).
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// `P`: max testcases in flight at once.
    pub max_parallel_testcases: u32,
    pub compile_time_limit_sec: f64,
    pub compile_wall_time_sec: f64,
    pub compile_memory_kb: u64,
    pub compile_processes: u32,
    pub compile_open_files: u32,
    pub compile_fsize_kb: u32,
    pub runtime_processes: u32,
    pub runtime_open_files: u32,
    pub runtime_fsize_kb: u32,
    pub isolate_nice: Option<i32>,
    pub isolate_cpu_affinity: Option<Vec<usize>>,
    pub extra_dirs: Vec<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_parallel_testcases: 4,
            compile_time_limit_sec: 10.0,
            compile_wall_time_sec: 15.0,
            compile_memory_kb: 512 * 1024,
            compile_processes: 10,
            compile_open_files: 512,
            compile_fsize_kb: 65536,
            runtime_processes: 4,
            runtime_open_files: 30,
            runtime_fsize_kb: 16384,
            isolate_nice: Some(10),
            isolate_cpu_affinity: None,
            extra_dirs: Vec::new(),
        }
    }
}

#[derive(Debug)]
enum CompiledArtifact {
    Binary(Vec<u8>),
    Source(String),
}

enum CompileOutcome {
    Ready(CompiledArtifact),
    Failed { status: TestCaseStatus, message: String },
}

fn source_filename(language: Language) -> &'static str {
    match language {
        Language::Cpp => "main.cpp",
        Language::Python => "main.py",
    }
}

fn compile_argv(language: Language) -> Vec<String> {
    let shell_cmd = match language {
        Language::Cpp => "g++ -O2 -std=c++17 -o main main.cpp",
        Language::Python => "python3 -m py_compile main.py",
    };
    vec!["/bin/sh".into(), "-c".into(), shell_cmd.into()]
}

fn run_argv(artifact: &CompiledArtifact) -> Vec<String> {
    match artifact {
        CompiledArtifact::Binary(_) => vec!["./main".into()],
        CompiledArtifact::Source(_) => vec!["python3".into(), "main.py".into()],
    }
}

/// Release a box through the active sandbox backend, guaranteeing cleanup
/// runs before the handle goes out of scope (spec §3 invariant: every
/// acquired box is released exactly once).
async fn release<S: IsolateOps>(sandbox: &S, handle: &mut crate::box_pool::BoxHandle) {
    if let Err(e) = sandbox.cleanup(handle.id()).await {
        tracing::warn!(box_id = handle.id(), error = %e, "sandbox cleanup failed");
    }
    handle.mark_cleaned();
}

/// Run the full Sandbox Executor contract: compile/syntax-check once, then
/// execute testcases in bounded-parallel batches with early stop.
///
/// Never returns an error: every failure path is encoded as a verdict
/// status, per spec §4.1 "Failure semantics".
pub async fn execute<S: IsolateOps>(
    cfg: &ExecutorConfig,
    pool: &BoxPool,
    sandbox: &S,
    language: Language,
    source_code: &str,
    testcases: &[TestCase],
    time_limit_sec: u32,
    memory_limit_kb: u64,
) -> Vec<TestCaseVerdict> {
    let work_dir = match tempfile::tempdir() {
        Ok(d) => d,
        Err(e) => {
            return all_testcases_as(
                testcases,
                TestCaseStatus::InternalError,
                format!("failed to create sandbox scratch directory: {e}"),
            )
        }
    };

    match compile_once(cfg, pool, sandbox, language, source_code, work_dir.path()).await {
        CompileOutcome::Failed { status, message } => all_testcases_as(testcases, status, message),
        CompileOutcome::Ready(artifact) => {
            run_batches(
                cfg,
                pool,
                sandbox,
                Arc::new(artifact),
                language,
                testcases,
                time_limit_sec,
                memory_limit_kb,
                work_dir.path(),
            )
            .await
        }
    }
}

fn all_testcases_as(testcases: &[TestCase], status: TestCaseStatus, message: String) -> Vec<TestCaseVerdict> {
    let mut sorted: Vec<&TestCase> = testcases.iter().collect();
    sorted.sort_by_key(|t| t.index_no);
    sorted
        .into_iter()
        .map(|tc| TestCaseVerdict::failed(tc.testcase_id.clone(), tc.index_no, status, 0, 0, String::new(), message.clone()))
        .collect()
}

async fn compile_once<S: IsolateOps>(
    cfg: &ExecutorConfig,
    pool: &BoxPool,
    sandbox: &S,
    language: Language,
    source_code: &str,
    work_dir: &std::path::Path,
) -> CompileOutcome {
    let mut handle = pool.acquire().await;

    let box_dir = match sandbox.init(handle.id()).await {
        Ok(d) => d,
        Err(e) => {
            release(sandbox, &mut handle).await;
            return CompileOutcome::Failed {
                status: TestCaseStatus::InternalError,
                message: format!("sandbox init failed: {e}"),
            };
        }
    };

    if !language.is_compiled() {
        // Interpreted language: a syntax-validation pass, not a build.
        if let Err(e) = tokio::fs::write(box_dir.join(source_filename(language)), source_code).await {
            release(sandbox, &mut handle).await;
            return CompileOutcome::Failed {
                status: TestCaseStatus::InternalError,
                message: format!("failed to write source into sandbox: {e}"),
            };
        }

        let meta_path = work_dir.join("compile.meta");
        let spec = RunSpec {
            box_id: handle.id(),
            time_limit_sec: cfg.compile_time_limit_sec,
            wall_time_limit_sec: cfg.compile_wall_time_sec,
            mem_limit_kb: cfg.compile_memory_kb,
            processes: cfg.compile_processes,
            open_files: cfg.compile_open_files,
            fsize_kb: cfg.compile_fsize_kb,
            stdin: None,
            stdout: PathBuf::from("compile_stdout.txt"),
            meta_path: meta_path.clone(),
            env: vec![("PATH".into(), DEFAULT_PATH.into())],
            extra_dirs: cfg.extra_dirs.clone(),
            argv: compile_argv(language),
            nice: cfg.isolate_nice,
            cpu_affinity: cfg.isolate_cpu_affinity.clone(),
        };

        let run_result = sandbox.run(&spec).await;
        let diagnostic = read_to_string_lossy(&box_dir.join("compile_stdout.txt")).await;
        let meta = read_meta(&meta_path).await;
        release(sandbox, &mut handle).await;

        if run_result.is_err() || meta.status.is_some() || meta.exit_code.is_some_and(|c| c != 0) {
            return CompileOutcome::Failed {
                status: TestCaseStatus::CompilationError,
                message: diagnostic,
            };
        }

        return CompileOutcome::Ready(CompiledArtifact::Source(source_code.to_string()));
    }

    // Compiled language.
    if let Err(e) = tokio::fs::write(box_dir.join(source_filename(language)), source_code).await {
        release(sandbox, &mut handle).await;
        return CompileOutcome::Failed {
            status: TestCaseStatus::InternalError,
            message: format!("failed to write source into sandbox: {e}"),
        };
    }

    let meta_path = work_dir.join("compile.meta");
    let spec = RunSpec {
        box_id: handle.id(),
        time_limit_sec: cfg.compile_time_limit_sec,
        wall_time_limit_sec: cfg.compile_wall_time_sec,
        mem_limit_kb: cfg.compile_memory_kb,
        processes: cfg.compile_processes,
        open_files: cfg.compile_open_files,
        fsize_kb: cfg.compile_fsize_kb,
        stdin: None,
        stdout: PathBuf::from("compile_stdout.txt"),
        meta_path: meta_path.clone(),
        env: vec![("PATH".into(), DEFAULT_PATH.into())],
        extra_dirs: cfg.extra_dirs.clone(),
        argv: compile_argv(language),
        nice: cfg.isolate_nice,
        cpu_affinity: cfg.isolate_cpu_affinity.clone(),
    };

    let run_result = sandbox.run(&spec).await;
    let diagnostic = read_to_string_lossy(&box_dir.join("compile_stdout.txt")).await;
    let meta = read_meta(&meta_path).await;
    let binary_path = box_dir.join("main");
    let binary_exists = tokio::fs::metadata(&binary_path).await.is_ok();

    if run_result.is_err() || meta.status.is_some() || meta.exit_code.is_some_and(|c| c != 0) || !binary_exists {
        release(sandbox, &mut handle).await;
        return CompileOutcome::Failed {
            status: TestCaseStatus::CompilationError,
            message: diagnostic,
        };
    }

    let binary = match tokio::fs::read(&binary_path).await {
        Ok(b) => b,
        Err(e) => {
            release(sandbox, &mut handle).await;
            return CompileOutcome::Failed {
                status: TestCaseStatus::InternalError,
                message: format!("failed to read compiled artifact: {e}"),
            };
        }
    };

    release(sandbox, &mut handle).await;
    CompileOutcome::Ready(CompiledArtifact::Binary(binary))
}

#[allow(clippy::too_many_arguments)]
async fn run_batches<S: IsolateOps>(
    cfg: &ExecutorConfig,
    pool: &BoxPool,
    sandbox: &S,
    artifact: Arc<CompiledArtifact>,
    language: Language,
    testcases: &[TestCase],
    time_limit_sec: u32,
    memory_limit_kb: u64,
    work_dir: &std::path::Path,
) -> Vec<TestCaseVerdict> {
    let mut sorted = testcases.to_vec();
    sorted.sort_by_key(|t| t.index_no);

    let batch_size = cfg.max_parallel_testcases.max(1) as usize;
    let mut verdicts = Vec::with_capacity(sorted.len());
    let mut early_stopped = false;

    for batch in sorted.chunks(batch_size) {
        if early_stopped {
            for tc in batch {
                verdicts.push(TestCaseVerdict::failed(
                    tc.testcase_id.clone(),
                    tc.index_no,
                    TestCaseStatus::TimeLimitExceeded,
                    0,
                    0,
                    String::new(),
                    "Skipped due to early stopping",
                ));
            }
            continue;
        }

        let mut handles = Vec::with_capacity(batch.len());
        for tc in batch {
            let cfg = cfg.clone();
            let pool = pool.clone();
            let sandbox = sandbox.clone();
            let artifact = artifact.clone();
            let tc = tc.clone();
            let work_dir = work_dir.to_path_buf();
            handles.push(tokio::spawn(async move {
                run_one_testcase(&cfg, &pool, &sandbox, &artifact, language, &tc, time_limit_sec, memory_limit_kb, &work_dir).await
            }));
        }

        let mut batch_results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(verdict) => batch_results.push(verdict),
                Err(e) => batch_results.push(TestCaseVerdict::failed(
                    String::new(),
                    -1,
                    TestCaseStatus::InternalError,
                    0,
                    0,
                    String::new(),
                    format!("testcase task panicked: {e}"),
                )),
            }
        }

        early_stopped = !batch_results.is_empty()
            && batch_results.iter().all(|v| v.status == TestCaseStatus::TimeLimitExceeded);

        verdicts.extend(batch_results);
    }

    verdicts
}

#[allow(clippy::too_many_arguments)]
async fn run_one_testcase<S: IsolateOps>(
    cfg: &ExecutorConfig,
    pool: &BoxPool,
    sandbox: &S,
    artifact: &CompiledArtifact,
    language: Language,
    tc: &TestCase,
    time_limit_sec: u32,
    memory_limit_kb: u64,
    work_dir: &std::path::Path,
) -> TestCaseVerdict {
    let outer_budget = Duration::from_secs(time_limit_sec as u64 + 5);
    match tokio::time::timeout(
        outer_budget,
        run_one_testcase_inner(cfg, pool, sandbox, artifact, language, tc, time_limit_sec, memory_limit_kb, work_dir),
    )
    .await
    {
        Ok(verdict) => verdict,
        Err(_) => TestCaseVerdict::failed(
            tc.testcase_id.clone(),
            tc.index_no,
            TestCaseStatus::TimeLimitExceeded,
            (time_limit_sec as u64 + 5) * 1000,
            0,
            String::new(),
            "outer sandbox timeout exceeded",
        ),
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_one_testcase_inner<S: IsolateOps>(
    cfg: &ExecutorConfig,
    pool: &BoxPool,
    sandbox: &S,
    artifact: &CompiledArtifact,
    language: Language,
    tc: &TestCase,
    time_limit_sec: u32,
    memory_limit_kb: u64,
    work_dir: &std::path::Path,
) -> TestCaseVerdict {
    let mut handle = pool.acquire().await;

    let box_dir = match sandbox.init(handle.id()).await {
        Ok(d) => d,
        Err(e) => {
            release(sandbox, &mut handle).await;
            return TestCaseVerdict::failed(
                tc.testcase_id.clone(),
                tc.index_no,
                TestCaseStatus::InternalError,
                0,
                0,
                String::new(),
                format!("sandbox init failed: {e}"),
            );
        }
    };

    let write_result = match artifact {
        CompiledArtifact::Binary(bytes) => write_executable(&box_dir.join("main"), bytes).await,
        CompiledArtifact::Source(src) => tokio::fs::write(box_dir.join(source_filename(language)), src)
            .await
            .map_err(|e| e.to_string()),
    };
    if let Err(e) = write_result {
        release(sandbox, &mut handle).await;
        return TestCaseVerdict::failed(
            tc.testcase_id.clone(),
            tc.index_no,
            TestCaseStatus::InternalError,
            0,
            0,
            String::new(),
            format!("failed to stage artifact in sandbox: {e}"),
        );
    }

    if let Err(e) = tokio::fs::write(box_dir.join("input.txt"), &tc.input_ref).await {
        release(sandbox, &mut handle).await;
        return TestCaseVerdict::failed(
            tc.testcase_id.clone(),
            tc.index_no,
            TestCaseStatus::InternalError,
            0,
            0,
            String::new(),
            format!("failed to write testcase input: {e}"),
        );
    }

    let meta_path = work_dir.join(format!("meta_{}_{}.txt", handle.id(), tc.index_no));
    let spec = RunSpec {
        box_id: handle.id(),
        time_limit_sec: time_limit_sec as f64,
        wall_time_limit_sec: time_limit_sec as f64 + 2.0,
        mem_limit_kb: memory_limit_kb,
        processes: cfg.runtime_processes,
        open_files: cfg.runtime_open_files,
        fsize_kb: cfg.runtime_fsize_kb,
        stdin: Some(PathBuf::from("input.txt")),
        stdout: PathBuf::from("output.txt"),
        meta_path: meta_path.clone(),
        env: vec![("PATH".into(), DEFAULT_PATH.into())],
        extra_dirs: cfg.extra_dirs.clone(),
        argv: run_argv(artifact),
        nice: cfg.isolate_nice,
        cpu_affinity: cfg.isolate_cpu_affinity.clone(),
    };

    let run_result = sandbox.run(&spec).await;
    let meta = read_meta(&meta_path).await;
    let stdout = read_to_string_lossy(&box_dir.join("output.txt")).await;
    release(sandbox, &mut handle).await;

    if run_result.is_err() {
        return TestCaseVerdict::failed(
            tc.testcase_id.clone(),
            tc.index_no,
            TestCaseStatus::InternalError,
            0,
            0,
            String::new(),
            format!("isolate invocation failed: {}", run_result.unwrap_err()),
        );
    }

    classify(tc, &meta, &stdout, memory_limit_kb)
}

fn classify(tc: &TestCase, meta: &meta::RunMeta, stdout: &str, memory_limit_kb: u64) -> TestCaseVerdict {
    let time_ms = meta.time_wall_sec.map(|s| (s * 1000.0) as u64).unwrap_or(0);
    let memory_kb = meta.memory_kb.unwrap_or(0);

    if meta.oom_killed || memory_kb > memory_limit_kb {
        return TestCaseVerdict::failed(
            tc.testcase_id.clone(),
            tc.index_no,
            TestCaseStatus::MemoryLimitExceeded,
            time_ms,
            memory_kb,
            String::new(),
            meta.message.clone().unwrap_or_else(|| "memory limit exceeded".into()),
        );
    }

    if let Some(status) = meta.status {
        return match status {
            IsolateStatus::TimeLimit => TestCaseVerdict::failed(
                tc.testcase_id.clone(),
                tc.index_no,
                TestCaseStatus::TimeLimitExceeded,
                time_ms,
                memory_kb,
                String::new(),
                "time limit exceeded",
            ),
            IsolateStatus::RuntimeError | IsolateStatus::Signalled => TestCaseVerdict::failed(
                tc.testcase_id.clone(),
                tc.index_no,
                TestCaseStatus::RuntimeError,
                time_ms,
                memory_kb,
                String::new(),
                meta.message.clone().unwrap_or_else(|| "runtime error".into()),
            ),
            IsolateStatus::Internal => TestCaseVerdict::failed(
                tc.testcase_id.clone(),
                tc.index_no,
                TestCaseStatus::InternalError,
                time_ms,
                memory_kb,
                String::new(),
                meta.message.clone().unwrap_or_else(|| "sandbox internal error".into()),
            ),
        };
    }

    if let Some(code) = meta.exit_code {
        if code != 0 {
            return TestCaseVerdict::failed(
                tc.testcase_id.clone(),
                tc.index_no,
                TestCaseStatus::RuntimeError,
                time_ms,
                memory_kb,
                String::new(),
                format!("exited with code {code}"),
            );
        }
    }

    let actual = stdout.trim();
    let expected = tc.output_ref.trim();
    if actual == expected {
        TestCaseVerdict::passed(tc.testcase_id.clone(), tc.index_no, time_ms, memory_kb, stdout.to_string())
    } else {
        TestCaseVerdict::failed(
            tc.testcase_id.clone(),
            tc.index_no,
            TestCaseStatus::WrongAnswer,
            time_ms,
            memory_kb,
            stdout.to_string(),
            format!(
                "expected: {:.WA_DIAGNOSTIC_TRUNCATE$} actual: {:.WA_DIAGNOSTIC_TRUNCATE$}",
                expected, actual
            ),
        )
    }
}

async fn read_meta(path: &std::path::Path) -> meta::RunMeta {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => meta::parse_meta(&content),
        Err(_) => meta::RunMeta::default(),
    }
}

async fn read_to_string_lossy(path: &std::path::Path) -> String {
    tokio::fs::read(path)
        .await
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

#[cfg(unix)]
async fn write_executable(path: &std::path::Path, bytes: &[u8]) -> Result<(), String> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::write(path, bytes).await.map_err(|e| e.to_string())?;
    let mut perms = tokio::fs::metadata(path)
        .await
        .map_err(|e| e.to_string())?
        .permissions();
    perms.set_mode(0o755);
    tokio::fs::set_permissions(path, perms).await.map_err(|e| e.to_string())
}

#[cfg(not(unix))]
async fn write_executable(path: &std::path::Path, bytes: &[u8]) -> Result<(), String> {
    tokio::fs::write(path, bytes).await.map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use anyhow::Result;

    use super::*;

    /// Scripted outcome for one `isolate --run` invocation.
    struct FakeOutcome {
        meta: String,
        stdout: String,
    }

    /// `IsolateOps` double that writes scripted meta/stdout files instead of
    /// shelling out to the real `isolate` binary.
    ///
    /// The script is keyed off `spec.meta_path`'s filename: `compile.meta`
    /// for the compile/syntax-check step, `meta_<box>_<index>.txt` for a
    /// testcase run, letting a test answer differently per testcase despite
    /// every testcase sharing the same `argv`.
    #[derive(Clone)]
    struct FakeIsolate {
        dirs: Arc<Mutex<HashMap<u32, PathBuf>>>,
        script: Arc<dyn Fn(Option<i64>, &RunSpec) -> FakeOutcome + Send + Sync>,
        run_calls: Arc<AtomicUsize>,
        cleanup_calls: Arc<AtomicUsize>,
    }

    impl FakeIsolate {
        fn new(script: impl Fn(Option<i64>, &RunSpec) -> FakeOutcome + Send + Sync + 'static) -> Self {
            Self {
                dirs: Arc::new(Mutex::new(HashMap::new())),
                script: Arc::new(script),
                run_calls: Arc::new(AtomicUsize::new(0)),
                cleanup_calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    fn testcase_index(meta_path: &std::path::Path) -> Option<i64> {
        let name = meta_path.file_stem()?.to_str()?;
        let (_, index) = name.strip_prefix("meta_")?.split_once('_')?;
        index.parse().ok()
    }

    impl IsolateOps for FakeIsolate {
        async fn init(&self, box_id: u32) -> Result<PathBuf> {
            let dir = tempfile::tempdir().unwrap().keep();
            self.dirs.lock().unwrap().insert(box_id, dir.clone());
            Ok(dir)
        }

        async fn run(&self, spec: &RunSpec) -> Result<()> {
            self.run_calls.fetch_add(1, Ordering::SeqCst);
            let box_dir = self.dirs.lock().unwrap().get(&spec.box_id).unwrap().clone();
            let outcome = (self.script)(testcase_index(&spec.meta_path), spec);
            tokio::fs::write(&spec.meta_path, outcome.meta).await.unwrap();
            tokio::fs::write(box_dir.join(&spec.stdout), outcome.stdout).await.unwrap();
            Ok(())
        }

        async fn cleanup(&self, box_id: u32) -> Result<()> {
            self.cleanup_calls.fetch_add(1, Ordering::SeqCst);
            self.dirs.lock().unwrap().remove(&box_id);
            Ok(())
        }
    }

    fn tc(index_no: i64, input: &str, output: &str) -> TestCase {
        TestCase {
            testcase_id: format!("tc-{index_no}"),
            index_no,
            input_ref: input.to_string(),
            output_ref: output.to_string(),
        }
    }

    fn ok_exit_meta() -> String {
        "time-wall:0.01\ncg-mem:1000\nexitcode:0\n".to_string()
    }

    #[tokio::test]
    async fn all_testcases_pass_for_python() {
        let sandbox = FakeIsolate::new(|index, _spec| match index {
            None => FakeOutcome { meta: ok_exit_meta(), stdout: String::new() },
            Some(0) => FakeOutcome { meta: ok_exit_meta(), stdout: "3\n".into() },
            Some(1) => FakeOutcome { meta: ok_exit_meta(), stdout: "7\n".into() },
            Some(_) => unreachable!(),
        });
        let pool = BoxPool::new(8);
        let testcases = vec![tc(0, "1 2", "3"), tc(1, "3 4", "7")];

        let verdicts = execute(&ExecutorConfig::default(), &pool, &sandbox, Language::Python, "print(1)", &testcases, 2, 131072).await;

        assert_eq!(verdicts.len(), 2);
        assert!(verdicts.iter().all(|v| v.status == TestCaseStatus::Passed));
    }

    #[tokio::test]
    async fn mixed_verdicts_report_wrong_answer() {
        let sandbox = FakeIsolate::new(|index, _spec| match index {
            None => FakeOutcome { meta: ok_exit_meta(), stdout: String::new() },
            Some(0) => FakeOutcome { meta: ok_exit_meta(), stdout: "3\n".into() },
            Some(1) => FakeOutcome { meta: ok_exit_meta(), stdout: "wrong\n".into() },
            Some(_) => unreachable!(),
        });
        let pool = BoxPool::new(8);
        let testcases = vec![tc(0, "1 2", "3"), tc(1, "3 4", "7")];

        let verdicts = execute(&ExecutorConfig::default(), &pool, &sandbox, Language::Python, "print(1)", &testcases, 2, 131072).await;

        let mut by_index: Vec<_> = verdicts.into_iter().collect();
        by_index.sort_by_key(|v| v.index_no);
        assert_eq!(by_index[0].status, TestCaseStatus::Passed);
        assert_eq!(by_index[1].status, TestCaseStatus::WrongAnswer);
    }

    #[tokio::test]
    async fn cpp_compile_failure_skips_every_testcase() {
        let sandbox = FakeIsolate::new(|_index, _spec| FakeOutcome {
            meta: "status:RE\nexitcode:1\n".to_string(),
            stdout: "main.cpp:1: error: expected ';'".to_string(),
        });
        let pool = BoxPool::new(8);
        let testcases = vec![tc(0, "", ""), tc(1, "", "")];

        let verdicts = execute(&ExecutorConfig::default(), &pool, &sandbox, Language::Cpp, "int main() {", &testcases, 2, 131072).await;

        assert_eq!(verdicts.len(), 2);
        assert!(verdicts.iter().all(|v| v.status == TestCaseStatus::CompilationError));
        assert!(sandbox.run_calls.load(Ordering::SeqCst) == 1, "only the compile step should have run");
    }

    #[tokio::test]
    async fn all_time_limit_exceeded_stops_early() {
        let sandbox = FakeIsolate::new(|index, _spec| match index {
            None => FakeOutcome { meta: ok_exit_meta(), stdout: String::new() },
            Some(_) => FakeOutcome { meta: "status:TO\nmessage:time limit exceeded\n".to_string(), stdout: String::new() },
        });
        let pool = BoxPool::new(8);
        let testcases: Vec<TestCase> = (0..8).map(|i| tc(i, "", "")).collect();
        let mut cfg = ExecutorConfig::default();
        cfg.max_parallel_testcases = 4;

        let verdicts = execute(&cfg, &pool, &sandbox, Language::Python, "while True: pass", &testcases, 1, 131072).await;

        assert_eq!(verdicts.len(), 8);
        assert!(verdicts.iter().all(|v| v.status == TestCaseStatus::TimeLimitExceeded));
        // 1 compile run + 4 first-batch runs; the second batch is skipped by
        // early stop and never reaches the sandbox.
        assert_eq!(sandbox.run_calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn verdicts_are_returned_in_index_order_regardless_of_input_order() {
        let sandbox = FakeIsolate::new(|index, _spec| match index {
            None => FakeOutcome { meta: ok_exit_meta(), stdout: String::new() },
            Some(0) => FakeOutcome { meta: ok_exit_meta(), stdout: "a\n".into() },
            Some(1) => FakeOutcome { meta: ok_exit_meta(), stdout: "b\n".into() },
            Some(2) => FakeOutcome { meta: ok_exit_meta(), stdout: "c\n".into() },
            Some(_) => unreachable!(),
        });
        let pool = BoxPool::new(8);
        let testcases = vec![tc(2, "", "c"), tc(0, "", "a"), tc(1, "", "b")];

        let verdicts = execute(&ExecutorConfig::default(), &pool, &sandbox, Language::Python, "print(1)", &testcases, 2, 131072).await;

        let indices: Vec<i64> = verdicts.iter().map(|v| v.index_no).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn cleanup_runs_exactly_once_per_acquired_box() {
        let sandbox = FakeIsolate::new(|index, _spec| match index {
            None => FakeOutcome { meta: ok_exit_meta(), stdout: String::new() },
            Some(_) => FakeOutcome { meta: ok_exit_meta(), stdout: "x\n".into() },
        });
        let pool = BoxPool::new(8);
        let testcases = vec![tc(0, "", "x"), tc(1, "", "x"), tc(2, "", "x")];

        execute(&ExecutorConfig::default(), &pool, &sandbox, Language::Python, "print(1)", &testcases, 2, 131072).await;

        // One box per testcase run plus one for the compile/syntax-check step.
        assert_eq!(sandbox.cleanup_calls.load(Ordering::SeqCst), 4);
    }
}
