//! Parsing of `isolate`'s `--meta` run summary.

/// `isolate`'s terminal status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolateStatus {
    /// `TO` — wall or CPU time limit hit.
    TimeLimit,
    /// `RE` — the program exited with a runtime error.
    RuntimeError,
    /// `SG` — the program was killed by a signal.
    Signalled,
    /// `XX` — sandbox-internal failure, not the program's fault.
    Internal,
}

impl IsolateStatus {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "TO" => Some(IsolateStatus::TimeLimit),
            "RE" => Some(IsolateStatus::RuntimeError),
            "SG" => Some(IsolateStatus::Signalled),
            "XX" => Some(IsolateStatus::Internal),
            _ => None,
        }
    }
}

/// A parsed `isolate` meta file.
#[derive(Debug, Clone, Default)]
pub struct RunMeta {
    pub status: Option<IsolateStatus>,
    pub time_wall_sec: Option<f64>,
    pub memory_kb: Option<u64>,
    pub exit_code: Option<i32>,
    pub message: Option<String>,
    pub killed: bool,
    /// `cg-oom-killed:1` — the cgroup OOM killer terminated the process.
    pub oom_killed: bool,
}

/// Keys tried in order when reading a memory reading out of the meta file
/// (spec §4.1 step 6): different `isolate` builds/cgroup backends populate
/// different keys.
const MEMORY_KEYS: [&str; 6] = ["cg-mem", "max-rss", "measured", "memory", "mem", "rss"];

/// Parse `key:value` lines from an `isolate --meta` file.
pub fn parse_meta(content: &str) -> RunMeta {
    let mut fields = std::collections::HashMap::new();
    for line in content.lines() {
        if let Some((key, value)) = line.split_once(':') {
            fields.insert(key.trim(), value.trim());
        }
    }

    let memory_kb = MEMORY_KEYS
        .iter()
        .find_map(|key| fields.get(key).and_then(|v| parse_memory_kb(v)));

    RunMeta {
        status: fields.get("status").and_then(|v| IsolateStatus::parse(v)),
        time_wall_sec: fields.get("time-wall").and_then(|v| v.parse().ok()),
        memory_kb,
        exit_code: fields.get("exitcode").and_then(|v| v.parse().ok()),
        message: fields.get("message").map(|v| v.to_string()),
        killed: fields.get("killed").map(|v| v.trim() == "1").unwrap_or(false),
        oom_killed: fields
            .get("cg-oom-killed")
            .map(|v| v.trim() == "1")
            .unwrap_or(false),
    }
}

/// Normalise a memory reading to KB (spec §4.1 step 6).
///
/// Recognised suffixes: `K`/`KB`, `M`/`MB`, `B`. A bare number with no
/// suffix is assumed to already be in KB, unless it is implausibly large for
/// KB (`isolate` doesn't report single-digit-GB processes), in which case it
/// is assumed to be bytes.
pub fn parse_memory_kb(raw: &str) -> Option<u64> {
    let raw = raw.trim();

    if let Some(num) = raw.strip_suffix("KB").or_else(|| raw.strip_suffix('K')) {
        return num.trim().parse::<u64>().ok();
    }
    if let Some(num) = raw.strip_suffix("MB").or_else(|| raw.strip_suffix('M')) {
        return num.trim().parse::<u64>().ok().map(|mb| mb * 1024);
    }
    if let Some(num) = raw.strip_suffix('B') {
        return num.trim().parse::<u64>().ok().map(|bytes| bytes / 1024);
    }

    let bare: u64 = raw.parse().ok()?;
    const TEN_MB_IN_KB: u64 = 10 * 1024;
    if bare > TEN_MB_IN_KB {
        Some(bare / 1024)
    } else {
        Some(bare)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_suffixed_units() {
        assert_eq!(parse_memory_kb("2048K"), Some(2048));
        assert_eq!(parse_memory_kb("2048KB"), Some(2048));
        assert_eq!(parse_memory_kb("4M"), Some(4096));
        assert_eq!(parse_memory_kb("4MB"), Some(4096));
        assert_eq!(parse_memory_kb("10240B"), Some(10));
    }

    #[test]
    fn bare_small_number_is_kb() {
        assert_eq!(parse_memory_kb("4096"), Some(4096));
    }

    #[test]
    fn bare_large_number_is_bytes_heuristic() {
        // 20 MB expressed as a raw byte count with no suffix.
        let bytes = 20 * 1024 * 1024;
        assert_eq!(parse_memory_kb(&bytes.to_string()), Some((bytes / 1024) as u64));
    }

    #[test]
    fn parses_full_meta_file() {
        let content = "time-wall:1.2345\ncg-mem:40960\nexitcode:0\nmessage:done\n";
        let meta = parse_meta(content);
        assert_eq!(meta.time_wall_sec, Some(1.2345));
        assert_eq!(meta.memory_kb, Some(40960));
        assert_eq!(meta.exit_code, Some(0));
        assert_eq!(meta.message.as_deref(), Some("done"));
        assert!(meta.status.is_none());
    }

    #[test]
    fn parses_timeout_status() {
        let meta = parse_meta("status:TO\nmessage:time limit exceeded\n");
        assert_eq!(meta.status, Some(IsolateStatus::TimeLimit));
    }

    #[test]
    fn memory_key_priority_prefers_cg_mem() {
        let meta = parse_meta("cg-mem:100\nmax-rss:999\n");
        assert_eq!(meta.memory_kb, Some(100));
    }
}
