/// Execution Orchestrator - the single entry point of the execution core
///
/// **Pipeline:**
/// ```text
/// validate → acquire workspace → write source/stdin → run → assemble → release
/// ```
///
/// **Guarantees:**
/// - Unknown languages and oversized input are rejected before anything is
///   allocated; these are the only `Err` returns
/// - Exactly one workspace per call, released before returning
/// - Concurrent calls share nothing but the provisioner's per-image cells;
///   isolation between them comes from distinct directories and containers
/// - Every failure after validation lands in `ExecutionResult::system_error`

use crate::assembler;
use crate::docker::DockerIsolation;
use crate::error::{ExecError, Result};
use crate::isolation::Isolation;
use crate::provisioner::ImageProvisioner;
use crate::runner::SandboxRunner;
use crate::workspace::Workspace;
use coderun_common::{language, Config, ExecutionRequest, ExecutionResult, LanguageProfile};
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};

pub struct Executor {
    config: Config,
    provisioner: Arc<ImageProvisioner>,
    runner: SandboxRunner,
}

impl Executor {
    pub fn new(config: Config, isolation: Arc<dyn Isolation>) -> Self {
        let provisioner = Arc::new(ImageProvisioner::new(
            isolation.clone(),
            config.dockerfiles_dir.clone(),
        ));
        let runner = SandboxRunner::new(isolation, provisioner.clone(), &config);

        Self {
            config,
            provisioner,
            runner,
        }
    }

    /// Executor backed by the local Docker daemon
    pub fn with_docker(config: Config) -> Result<Self> {
        let isolation = DockerIsolation::connect()?;
        Ok(Self::new(config, Arc::new(isolation)))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn provisioner(&self) -> &Arc<ImageProvisioner> {
        &self.provisioner
    }

    /// Reject requests that must never reach a workspace or a sandbox
    pub fn validate(&self, request: &ExecutionRequest) -> Result<&'static LanguageProfile> {
        let profile = language::resolve(&request.language)?;

        if request.code.len() > self.config.max_source_bytes {
            return Err(ExecError::InvalidRequest(format!(
                "source is {} bytes, limit is {}",
                request.code.len(),
                self.config.max_source_bytes
            )));
        }

        let stdin_len = request.stdin.as_ref().map_or(0, |s| s.len());
        if stdin_len > self.config.max_stdin_bytes {
            return Err(ExecError::InvalidRequest(format!(
                "stdin is {} bytes, limit is {}",
                stdin_len, self.config.max_stdin_bytes
            )));
        }

        Ok(profile)
    }

    pub async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult> {
        let profile = match self.validate(request) {
            Ok(profile) => profile,
            Err(e) => {
                warn!(language = %request.language, error = %e, "request rejected");
                return Err(e);
            }
        };

        let mut workspace = match Workspace::acquire(&self.config.scratch_root) {
            Ok(workspace) => workspace,
            Err(e) => {
                error!(language = %profile.language, error = %e, "failed to acquire workspace");
                return Ok(ExecutionResult::system_failure(e.to_string()));
            }
        };

        let span = info_span!(
            "execute",
            workspace = %workspace.id(),
            language = %profile.language
        );

        let result = self
            .run_in(profile, &workspace, request)
            .instrument(span.clone())
            .await;

        span.in_scope(|| {
            if let Err(e) = workspace.release() {
                // The result is still valid; only the scratch dir leaked
                error!(error = %e, "failed to release workspace");
            }

            info!(
                outcome = result.outcome(),
                exit_code = ?result.exit_code,
                duration_ms = result.execution_time_ms,
                "execution finished"
            );
        });

        Ok(result)
    }

    async fn run_in(
        &self,
        profile: &LanguageProfile,
        workspace: &Workspace,
        request: &ExecutionRequest,
    ) -> ExecutionResult {
        if let Err(e) = workspace.write_source(profile, &request.code) {
            error!(error = %e, "failed to write source");
            return ExecutionResult::system_failure(e.to_string());
        }

        let stdin = request.effective_stdin();
        if let Some(data) = stdin {
            if let Err(e) = workspace.write_stdin(data) {
                error!(error = %e, "failed to write stdin");
                return ExecutionResult::system_failure(e.to_string());
            }
        }

        let raw = self.runner.run(profile, workspace, stdin.is_some()).await;
        assembler::assemble(raw)
    }
}
