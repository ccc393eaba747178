/// Isolation capability - the seam between the runner and the sandbox technology
///
/// **Core Responsibility:**
/// Launch a disposable, resource-limited execution context bound to one
/// workspace, wait for it with a hard deadline, kill it, tear it down.
///
/// **Critical Architectural Boundary:**
/// - The isolation layer knows HOW to isolate (Docker today)
/// - It does NOT know languages, compile/run sequencing or result shapes
/// - Resource ceilings are enforced here, never by in-process accounting
///
/// The runner's state machine only talks to this trait, so the container
/// backend can be swapped (jailed processes, VMs) without touching it.

use crate::error::Result;
use crate::workspace::{COMPILE_STDERR_FILE, STDERR_FILE, STDIN_FILE, STDOUT_FILE};
use async_trait::async_trait;
use coderun_common::Config;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Mount point of the workspace inside the sandbox
pub const SANDBOX_WORKDIR: &str = "/sandbox";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Compile,
    Run,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Compile => "compile",
            Phase::Run => "run",
        }
    }

    /// Where this phase writes its stdout, `None` meaning discarded
    pub fn stdout_file(&self) -> Option<&'static str> {
        match self {
            Phase::Compile => None,
            Phase::Run => Some(STDOUT_FILE),
        }
    }

    pub fn stderr_file(&self) -> &'static str {
        match self {
            Phase::Compile => COMPILE_STDERR_FILE,
            Phase::Run => STDERR_FILE,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hard ceilings applied by the isolation layer itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    pub memory_bytes: i64,
    /// Memory + swap; equal to `memory_bytes` so swapping can't evade the cap
    pub memory_swap_bytes: i64,
    pub nano_cpus: Option<i64>,
    pub pids_limit: Option<i64>,
    /// RLIMIT_FSIZE for every process in the sandbox
    pub file_size_bytes: i64,
}

impl ResourceLimits {
    pub fn from_config(config: &Config) -> Self {
        let memory = config.memory_limit_bytes();
        Self {
            memory_bytes: memory,
            memory_swap_bytes: memory,
            nano_cpus: config.nano_cpus(),
            pids_limit: (config.pids_limit > 0).then_some(config.pids_limit),
            file_size_bytes: config.file_size_limit(),
        }
    }
}

/// Everything needed to start one sandboxed phase
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub name: String,
    pub image: String,
    pub phase: Phase,
    /// Host directory bound to [`SANDBOX_WORKDIR`]
    pub workdir: PathBuf,
    pub argv: Vec<String>,
    /// Feed `stdin.txt` to the program; otherwise stdin is empty
    pub stdin_from_file: bool,
    pub limits: ResourceLimits,
}

impl LaunchSpec {
    /// Command that applies the stdio redirections and then execs `argv`.
    ///
    /// The script only ever contains the fixed capture file names; the
    /// program argv is passed as positional parameters, so nothing from the
    /// request is ever parsed by the shell.
    pub fn wrapped_command(&self) -> Vec<String> {
        let stdin = if self.stdin_from_file {
            STDIN_FILE
        } else {
            "/dev/null"
        };
        let stdout = self.phase.stdout_file().unwrap_or("/dev/null");
        let stderr = self.phase.stderr_file();

        let script = format!("exec \"$@\" <{} >{} 2>{}", stdin, stdout, stderr);

        let mut command = vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            script,
            "sh".to_string(),
        ];
        command.extend(self.argv.iter().cloned());
        command
    }
}

/// Opaque reference to a launched sandbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxHandle {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Exited { exit_code: i64, oom_killed: bool },
    DeadlineExpired,
}

/// Isolation capability
///
/// Any implementation must guarantee:
/// 1. Each launch is a fresh context bound only to its workspace
/// 2. No network access from inside the context
/// 3. `ResourceLimits` are enforced by the isolation layer
/// 4. `force_kill` is unconditional, never a polite request
/// 5. `dispose` is idempotent
#[async_trait]
pub trait Isolation: Send + Sync {
    /// Whether the sandbox image is already available locally
    async fn image_exists(&self, tag: &str) -> Result<bool>;

    /// Build the sandbox image from its recipe
    async fn build_image(&self, tag: &str, dockerfile: &Path, context: &Path) -> Result<()>;

    async fn launch(&self, spec: &LaunchSpec) -> Result<SandboxHandle>;

    /// Wait for the sandbox to exit, giving up once `deadline` has elapsed.
    /// Expiry does not kill the sandbox; the caller follows up with `force_kill`.
    async fn wait_with_deadline(
        &self,
        handle: &SandboxHandle,
        deadline: Duration,
    ) -> Result<WaitOutcome>;

    async fn force_kill(&self, handle: &SandboxHandle) -> Result<()>;

    async fn dispose(&self, handle: &SandboxHandle) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(phase: Phase, stdin_from_file: bool, argv: &[&str]) -> LaunchSpec {
        LaunchSpec {
            name: "coderun-test".to_string(),
            image: "coderun-c:v1".to_string(),
            phase,
            workdir: PathBuf::from("/tmp/exec-1"),
            argv: argv.iter().map(|s| s.to_string()).collect(),
            stdin_from_file,
            limits: ResourceLimits {
                memory_bytes: 1,
                memory_swap_bytes: 1,
                nano_cpus: None,
                pids_limit: None,
                file_size_bytes: 1,
            },
        }
    }

    #[test]
    fn test_run_command_redirects_to_capture_files() {
        let command = spec(Phase::Run, true, &["./main"]).wrapped_command();

        assert_eq!(
            command,
            vec![
                "/bin/sh",
                "-c",
                "exec \"$@\" <stdin.txt >stdout.txt 2>stderr.txt",
                "sh",
                "./main",
            ]
        );
    }

    #[test]
    fn test_run_without_stdin_reads_dev_null() {
        let command = spec(Phase::Run, false, &["python3", "main.py"]).wrapped_command();
        assert_eq!(command[2], "exec \"$@\" </dev/null >stdout.txt 2>stderr.txt");
        assert_eq!(&command[4..], &["python3", "main.py"]);
    }

    #[test]
    fn test_compile_discards_stdout() {
        let command = spec(Phase::Compile, false, &["gcc", "-o", "main", "main.c"]).wrapped_command();
        assert_eq!(
            command[2],
            "exec \"$@\" </dev/null >/dev/null 2>compile_stderr.txt"
        );
    }

    #[test]
    fn test_argv_is_never_part_of_the_script() {
        let hostile = "main.c; rm -rf /";
        let command = spec(Phase::Compile, false, &["gcc", hostile]).wrapped_command();

        assert!(!command[2].contains(hostile));
        assert_eq!(command.last().unwrap(), hostile);
    }

    #[test]
    fn test_limits_from_config() {
        let config = Config {
            memory_limit_mb: 512,
            cpu_limit: 1.0,
            pids_limit: 0,
            max_output_bytes: 1024,
            max_file_bytes: 4096,
            ..Config::default()
        };
        let limits = ResourceLimits::from_config(&config);
        assert_eq!(limits.file_size_bytes, 4096);

        assert_eq!(limits.memory_bytes, 512 * 1024 * 1024);
        assert_eq!(limits.memory_swap_bytes, limits.memory_bytes);
        assert_eq!(limits.nano_cpus, Some(1_000_000_000));
        assert_eq!(limits.pids_limit, None);
    }
}
