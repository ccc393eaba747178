/// Sandbox Runner - the compile/run state machine
///
/// ```text
/// Idle → Preparing → Compiling? → Running → Collecting → Done
///                        │            │
///                        └──> Killed <┘   (deadline or memory ceiling)
///                               │
///                               └──> Collecting
/// ```
///
/// **Rules:**
/// - Compile strictly precedes run; a non-zero compile exit skips the run
/// - Each phase gets its own fresh sandbox, disposed whatever happens
/// - Deadline expiry means SIGKILL, never a polite request
/// - Collecting always runs, so partial output of killed programs survives
/// - Infrastructure failures become `system_error`; guest failures don't

use crate::error::Result;
use crate::isolation::{Isolation, LaunchSpec, Phase, ResourceLimits, SandboxHandle, WaitOutcome};
use crate::provisioner::ImageProvisioner;
use crate::workspace::{
    read_capture_file, Capture, Workspace, COMPILE_STDERR_FILE, STDERR_FILE, STDOUT_FILE,
};
use coderun_common::{naming, Config, LanguageProfile};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Preparing,
    Compiling,
    Running,
    Killed,
    Collecting,
    Done,
}

/// Raw outcome of one sandboxed execution, before normalization
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRunOutcome {
    pub exit_code: Option<i64>,
    pub stdout: Option<Capture>,
    pub stderr: Option<Capture>,
    pub timed_out: bool,
    pub oom_killed: bool,
    pub compile_failed: bool,
    pub system_error: Option<String>,
    pub elapsed: Duration,
}

impl RawRunOutcome {
    /// Outcome for a run that never got to start
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            system_error: Some(message.into()),
            ..Default::default()
        }
    }

    fn record_system_error(&mut self, message: String) {
        // Keep the first failure; later ones are usually consequences of it
        if self.system_error.is_none() {
            self.system_error = Some(message);
        }
    }
}

/// Disposes the sandbox even if the owning future is dropped mid-phase
struct SandboxGuard {
    isolation: Arc<dyn Isolation>,
    handle: Option<SandboxHandle>,
}

impl SandboxGuard {
    fn new(isolation: Arc<dyn Isolation>, handle: SandboxHandle) -> Self {
        Self {
            isolation,
            handle: Some(handle),
        }
    }

    async fn dispose(mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = self.isolation.dispose(&handle).await {
                error!(sandbox = %handle.name, error = %e, "failed to dispose sandbox");
            }
        }
    }
}

impl Drop for SandboxGuard {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        warn!(sandbox = %handle.name, "sandbox abandoned mid-phase, removing");
        let isolation = self.isolation.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = isolation.dispose(&handle).await {
                        error!(sandbox = %handle.name, error = %e, "failed to dispose abandoned sandbox");
                    }
                });
            }
            Err(_) => {
                error!(sandbox = %handle.name, "no runtime to dispose abandoned sandbox");
            }
        }
    }
}

pub struct SandboxRunner {
    isolation: Arc<dyn Isolation>,
    provisioner: Arc<ImageProvisioner>,
    limits: ResourceLimits,
    compile_timeout: Duration,
    run_timeout: Duration,
    max_output_bytes: usize,
}

impl SandboxRunner {
    pub fn new(
        isolation: Arc<dyn Isolation>,
        provisioner: Arc<ImageProvisioner>,
        config: &Config,
    ) -> Self {
        Self {
            isolation,
            provisioner,
            limits: ResourceLimits::from_config(config),
            compile_timeout: config.compile_timeout(),
            run_timeout: config.run_timeout(),
            max_output_bytes: config.max_output_bytes,
        }
    }

    /// Compile (if needed) and run the workspace's program
    pub async fn run(
        &self,
        profile: &LanguageProfile,
        workspace: &Workspace,
        stdin_present: bool,
    ) -> RawRunOutcome {
        let started = Instant::now();
        let mut state = RunState::Idle;
        let mut outcome = RawRunOutcome::default();

        if let Err(e) = self
            .drive(profile, workspace, stdin_present, &mut state, &mut outcome)
            .await
        {
            error!(workspace = %workspace.id(), state = ?state, error = %e, "sandbox run failed");
            outcome.record_system_error(e.to_string());
        }

        self.transition(&mut state, RunState::Collecting, workspace);
        self.collect(workspace, &mut outcome).await;
        outcome.elapsed = started.elapsed();

        self.transition(&mut state, RunState::Done, workspace);
        outcome
    }

    async fn drive(
        &self,
        profile: &LanguageProfile,
        workspace: &Workspace,
        stdin_present: bool,
        state: &mut RunState,
        outcome: &mut RawRunOutcome,
    ) -> Result<()> {
        self.transition(state, RunState::Preparing, workspace);
        self.provisioner.ensure(profile.language).await?;

        if let Some(argv) = profile.compile_argv() {
            self.transition(state, RunState::Compiling, workspace);

            match self
                .phase(Phase::Compile, profile, workspace, argv, false, self.compile_timeout)
                .await?
            {
                WaitOutcome::Exited {
                    exit_code: 0,
                    oom_killed: false,
                } => {}
                WaitOutcome::Exited {
                    exit_code,
                    oom_killed,
                } => {
                    debug!(workspace = %workspace.id(), exit_code, "compilation failed");
                    outcome.compile_failed = true;
                    outcome.exit_code = Some(exit_code);
                    outcome.oom_killed = oom_killed;
                    return Ok(());
                }
                WaitOutcome::DeadlineExpired => {
                    self.transition(state, RunState::Killed, workspace);
                    outcome.compile_failed = true;
                    outcome.timed_out = true;
                    return Ok(());
                }
            }
        }

        self.transition(state, RunState::Running, workspace);
        match self
            .phase(
                Phase::Run,
                profile,
                workspace,
                profile.run_argv(),
                stdin_present,
                self.run_timeout,
            )
            .await?
        {
            WaitOutcome::Exited {
                exit_code,
                oom_killed,
            } => {
                if oom_killed {
                    self.transition(state, RunState::Killed, workspace);
                }
                outcome.exit_code = Some(exit_code);
                outcome.oom_killed = oom_killed;
            }
            WaitOutcome::DeadlineExpired => {
                self.transition(state, RunState::Killed, workspace);
                outcome.timed_out = true;
            }
        }

        Ok(())
    }

    /// Launch one phase in a fresh sandbox and wait for it with a hard deadline
    async fn phase(
        &self,
        phase: Phase,
        profile: &LanguageProfile,
        workspace: &Workspace,
        argv: Vec<String>,
        stdin_from_file: bool,
        deadline: Duration,
    ) -> Result<WaitOutcome> {
        let spec = LaunchSpec {
            name: naming::container_name(workspace.id(), phase.as_str()),
            image: profile.image_tag(),
            phase,
            workdir: workspace.path().to_path_buf(),
            argv,
            stdin_from_file,
            limits: self.limits,
        };

        let handle = self.isolation.launch(&spec).await?;
        let guard = SandboxGuard::new(self.isolation.clone(), handle.clone());

        let waited = match self.isolation.wait_with_deadline(&handle, deadline).await {
            Ok(WaitOutcome::DeadlineExpired) => {
                warn!(
                    sandbox = %handle.name,
                    phase = %phase,
                    deadline_ms = deadline.as_millis() as u64,
                    "deadline expired, killing sandbox"
                );
                if let Err(e) = self.isolation.force_kill(&handle).await {
                    // dispose() force-removes, which kills as well
                    error!(sandbox = %handle.name, error = %e, "failed to kill sandbox");
                }
                Ok(WaitOutcome::DeadlineExpired)
            }
            other => other,
        };

        guard.dispose().await;
        waited
    }

    /// Read back whatever the program managed to write
    async fn collect(&self, workspace: &Workspace, outcome: &mut RawRunOutcome) {
        let limit = self.max_output_bytes;
        let stdout_path = workspace.file(STDOUT_FILE);
        // Compiler diagnostics only matter when compilation failed
        let stderr_path = if outcome.compile_failed {
            workspace.file(COMPILE_STDERR_FILE)
        } else {
            workspace.file(STDERR_FILE)
        };

        let read = tokio::task::spawn_blocking(move || {
            (
                read_capture_file(&stdout_path, limit),
                read_capture_file(&stderr_path, limit),
            )
        })
        .await;

        let (stdout, stderr) = match read {
            Ok(captures) => captures,
            Err(e) => {
                outcome.record_system_error(format!("failed to collect output: {}", e));
                return;
            }
        };

        match stdout {
            Ok(capture) => outcome.stdout = capture,
            Err(e) => outcome.record_system_error(e.to_string()),
        }
        match stderr {
            Ok(capture) => outcome.stderr = capture,
            Err(e) => outcome.record_system_error(e.to_string()),
        }
    }

    fn transition(&self, state: &mut RunState, next: RunState, workspace: &Workspace) {
        debug!(workspace = %workspace.id(), from = ?*state, to = ?next, "sandbox state");
        *state = next;
    }
}
