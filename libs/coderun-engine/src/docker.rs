/// Docker-based isolation backend
///
/// **Docker Isolation Rules:**
/// 1. One fresh container per phase, bound only to that execution's workspace
/// 2. Security constraints on every container:
///    - Network disabled
///    - Memory capped, with memory+swap equal to memory
///    - CPU share and pid count capped when configured
///    - File size capped (RLIMIT_FSIZE), so the workspace can't fill the disk
///    - `no-new-privileges`
/// 3. No auto-remove, so the OOM state can be inspected after exit
/// 4. Deadline expiry is followed by SIGKILL, then a forced removal
///
/// Images are checked through the Docker API and built with the `docker`
/// CLI from the per-language recipe directory.

use crate::error::{ExecError, Result};
use crate::isolation::{Isolation, LaunchSpec, SandboxHandle, WaitOutcome, SANDBOX_WORKDIR};
use async_trait::async_trait;
use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, InspectContainerOptions,
    KillContainerOptions, RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::models::{HostConfig, ResourcesUlimits};
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// How much of a failed `docker build` output is kept in the error
const BUILD_LOG_TAIL: usize = 2000;

pub struct DockerIsolation {
    docker: Docker,
}

/// Docker answers 404 for unknown objects and 409 for containers that are
/// already stopped or being removed; both mean "nothing left to do".
fn is_gone(err: &BollardError) -> bool {
    matches!(
        err,
        BollardError::DockerResponseServerError { status_code, .. }
            if *status_code == 404 || *status_code == 409
    )
}

fn tail(text: &str, max: usize) -> &str {
    let text = text.trim();
    if text.len() <= max {
        return text;
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

impl DockerIsolation {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Connect to the local Docker daemon (socket or DOCKER_HOST)
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self::new(docker))
    }

    fn host_config(spec: &LaunchSpec) -> HostConfig {
        HostConfig {
            binds: Some(vec![format!(
                "{}:{}",
                spec.workdir.display(),
                SANDBOX_WORKDIR
            )]),
            memory: Some(spec.limits.memory_bytes),
            memory_swap: Some(spec.limits.memory_swap_bytes),
            nano_cpus: spec.limits.nano_cpus,
            pids_limit: spec.limits.pids_limit,
            // Bounds what the guest can write into the host-backed workspace
            ulimits: Some(vec![ResourcesUlimits {
                name: Some("fsize".to_string()),
                soft: Some(spec.limits.file_size_bytes),
                hard: Some(spec.limits.file_size_bytes),
            }]),
            network_mode: Some("none".to_string()),
            security_opt: Some(vec!["no-new-privileges".to_string()]),
            auto_remove: Some(false),
            ..Default::default()
        }
    }

    async fn oom_killed(&self, handle: &SandboxHandle) -> Result<bool> {
        let inspect = self
            .docker
            .inspect_container(&handle.id, None::<InspectContainerOptions>)
            .await?;

        Ok(inspect
            .state
            .and_then(|state| state.oom_killed)
            .unwrap_or(false))
    }
}

#[async_trait]
impl Isolation for DockerIsolation {
    async fn image_exists(&self, tag: &str) -> Result<bool> {
        match self.docker.inspect_image(tag).await {
            Ok(_) => Ok(true),
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn build_image(&self, tag: &str, dockerfile: &Path, context: &Path) -> Result<()> {
        if !dockerfile.is_file() {
            return Err(ExecError::ImageBuild {
                tag: tag.to_string(),
                reason: format!("no build recipe at {}", dockerfile.display()),
            });
        }

        info!(image = tag, dockerfile = %dockerfile.display(), "building sandbox image");

        let output = Command::new("docker")
            .arg("build")
            .arg("-t")
            .arg(tag)
            .arg("-f")
            .arg(dockerfile)
            .arg(context)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ExecError::ImageBuild {
                tag: tag.to_string(),
                reason: format!("failed to execute docker build: {}", e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExecError::ImageBuild {
                tag: tag.to_string(),
                reason: format!(
                    "docker build exited with {:?}: {}",
                    output.status.code(),
                    tail(&stderr, BUILD_LOG_TAIL)
                ),
            });
        }

        info!(image = tag, "sandbox image built");
        Ok(())
    }

    async fn launch(&self, spec: &LaunchSpec) -> Result<SandboxHandle> {
        let config = ContainerConfig {
            image: Some(spec.image.clone()),
            cmd: Some(spec.wrapped_command()),
            working_dir: Some(SANDBOX_WORKDIR.to_string()),
            network_disabled: Some(true),
            attach_stdin: Some(false),
            attach_stdout: Some(false),
            attach_stderr: Some(false),
            tty: Some(false),
            host_config: Some(Self::host_config(spec)),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.as_str(),
            platform: None,
        };

        let created = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| ExecError::Launch(format!("create {}: {}", spec.name, e)))?;

        let handle = SandboxHandle {
            id: created.id,
            name: spec.name.clone(),
        };

        if let Err(e) = self
            .docker
            .start_container(&handle.id, None::<StartContainerOptions<String>>)
            .await
        {
            if let Err(cleanup) = self.dispose(&handle).await {
                warn!(container = %handle.name, error = %cleanup, "failed to remove unstarted container");
            }
            return Err(ExecError::Launch(format!("start {}: {}", spec.name, e)));
        }

        debug!(container = %handle.name, phase = %spec.phase, "container started");
        Ok(handle)
    }

    async fn wait_with_deadline(
        &self,
        handle: &SandboxHandle,
        deadline: Duration,
    ) -> Result<WaitOutcome> {
        let wait = async {
            let mut stream = self
                .docker
                .wait_container(&handle.id, None::<WaitContainerOptions<String>>);

            match stream.next().await {
                Some(Ok(response)) => Ok(response.status_code),
                // bollard reports a non-zero exit status as an error
                Some(Err(BollardError::DockerContainerWaitError { code, .. })) => Ok(code),
                Some(Err(e)) => Err(ExecError::from(e)),
                None => Err(ExecError::Launch(format!(
                    "wait stream for {} ended unexpectedly",
                    handle.name
                ))),
            }
        };

        match tokio::time::timeout(deadline, wait).await {
            Err(_) => Ok(WaitOutcome::DeadlineExpired),
            Ok(Err(e)) => Err(e),
            Ok(Ok(exit_code)) => {
                let oom_killed = self.oom_killed(handle).await?;
                Ok(WaitOutcome::Exited {
                    exit_code,
                    oom_killed,
                })
            }
        }
    }

    async fn force_kill(&self, handle: &SandboxHandle) -> Result<()> {
        let options = KillContainerOptions { signal: "SIGKILL" };
        match self.docker.kill_container(&handle.id, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) if is_gone(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn dispose(&self, handle: &SandboxHandle) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        match self.docker.remove_container(&handle.id, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) if is_gone(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
