use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Execution configuration
/// Provides defaults with environment variable overrides
#[derive(Debug, Clone)]
pub struct Config {
    /// Parent directory for per-execution workspaces
    pub scratch_root: PathBuf,
    /// Directory holding `<language>/Dockerfile` build recipes
    pub dockerfiles_dir: PathBuf,
    pub compile_timeout_ms: u64,
    pub run_timeout_ms: u64,
    pub memory_limit_mb: u64,
    /// CPUs available to one sandbox; 0 disables the limit
    pub cpu_limit: f64,
    pub pids_limit: i64,
    pub max_source_bytes: usize,
    pub max_stdin_bytes: usize,
    pub max_output_bytes: usize,
    /// Largest file a sandboxed process may write (compiled binaries included)
    pub max_file_bytes: u64,
}

/// Parsed value for `key`, or `default` when unset or unparsable
fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup, falling back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            scratch_root: lookup("SCRATCH_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| env::temp_dir().join("coderun")),
            dockerfiles_dir: lookup("DOCKERFILES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("dockerfiles")),
            compile_timeout_ms: parse_or(&lookup, "COMPILE_TIMEOUT_MS", 30_000),
            run_timeout_ms: parse_or(&lookup, "RUN_TIMEOUT_MS", 30_000),
            memory_limit_mb: parse_or(&lookup, "MEMORY_LIMIT_MB", 512),
            cpu_limit: parse_or(&lookup, "CPU_LIMIT", 1.0),
            pids_limit: parse_or(&lookup, "PIDS_LIMIT", 128),
            max_source_bytes: parse_or(&lookup, "MAX_SOURCE_BYTES", 1024 * 1024),
            max_stdin_bytes: parse_or(&lookup, "MAX_STDIN_BYTES", 1024 * 1024),
            max_output_bytes: parse_or(&lookup, "MAX_OUTPUT_BYTES", 1024 * 1024),
            max_file_bytes: parse_or(&lookup, "MAX_FILE_BYTES", 64 * 1024 * 1024),
        }
    }

    pub fn new() -> Self {
        Self::from_env()
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_millis(self.compile_timeout_ms)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_millis(self.run_timeout_ms)
    }

    pub fn memory_limit_bytes(&self) -> i64 {
        (self.memory_limit_mb as i64) * 1024 * 1024
    }

    /// Per-file write ceiling inside the sandbox, never below what the
    /// output cap needs to detect truncation
    pub fn file_size_limit(&self) -> i64 {
        self.max_file_bytes.max(self.max_output_bytes as u64 + 1) as i64
    }

    /// CPU limit in the nano-CPU unit Docker expects
    pub fn nano_cpus(&self) -> Option<i64> {
        if self.cpu_limit > 0.0 {
            Some((self.cpu_limit * 1_000_000_000.0) as i64)
        } else {
            None
        }
    }
}

/// Built-in defaults, ignoring the environment
impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}
