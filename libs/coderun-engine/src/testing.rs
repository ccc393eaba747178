/// Scripted isolation backend for tests
///
/// **Scripted Execution Rules:**
/// 1. Each phase (compile/run) follows its `PhaseScript`
/// 2. Launch writes the scripted stdout/stderr into the workspace capture
///    files, exactly where a real sandbox would redirect them
/// 3. `echo_stdin` copies `stdin.txt` to stdout (cat semantics)
/// 4. `hang` never exits, so the deadline always expires
/// 5. Image builds are counted and can be delayed or made to fail
///
/// **Purpose:**
/// Exercise the runner state machine, the provisioner and the orchestrator
/// without a Docker daemon.

use crate::error::{ExecError, Result};
use crate::isolation::{Isolation, LaunchSpec, Phase, SandboxHandle, WaitOutcome};
use crate::workspace::STDIN_FILE;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct PhaseScript {
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub exit_code: i64,
    pub oom_killed: bool,
    pub hang: bool,
    pub echo_stdin: bool,
}

impl PhaseScript {
    pub fn ok(stdout: &str) -> Self {
        Self {
            stdout: Some(stdout.to_string()),
            stderr: Some(String::new()),
            ..Default::default()
        }
    }

    pub fn failing(stderr: &str, exit_code: i64) -> Self {
        Self {
            stdout: None,
            stderr: Some(stderr.to_string()),
            exit_code,
            ..Default::default()
        }
    }

    pub fn echo() -> Self {
        Self {
            stderr: Some(String::new()),
            echo_stdin: true,
            ..Default::default()
        }
    }

    pub fn hanging(partial_stdout: &str) -> Self {
        Self {
            stdout: Some(partial_stdout.to_string()),
            stderr: Some(String::new()),
            hang: true,
            ..Default::default()
        }
    }

    pub fn oom(partial_stdout: &str) -> Self {
        Self {
            stdout: Some(partial_stdout.to_string()),
            stderr: Some(String::new()),
            exit_code: 137,
            oom_killed: true,
            ..Default::default()
        }
    }
}

#[derive(Default)]
pub struct ScriptedIsolation {
    images: Mutex<HashSet<String>>,
    scripts: Mutex<HashMap<Phase, PhaseScript>>,
    running: Mutex<HashMap<String, Phase>>,
    launched: Mutex<Vec<LaunchSpec>>,
    built_recipes: Mutex<Vec<PathBuf>>,
    builds: AtomicUsize,
    kills: AtomicUsize,
    disposals: AtomicUsize,
    build_delay: Duration,
    fail_builds: bool,
    failing_launches: HashSet<Phase>,
}

impl ScriptedIsolation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(self, tag: &str) -> Self {
        self.images.lock().unwrap().insert(tag.to_string());
        self
    }

    pub fn with_build_delay(mut self, delay: Duration) -> Self {
        self.build_delay = delay;
        self
    }

    pub fn with_failing_builds(mut self) -> Self {
        self.fail_builds = true;
        self
    }

    /// Every launch fails, whatever the phase
    pub fn with_failing_launch(self) -> Self {
        self.with_failing_launch_in(Phase::Compile)
            .with_failing_launch_in(Phase::Run)
    }

    pub fn with_failing_launch_in(mut self, phase: Phase) -> Self {
        self.failing_launches.insert(phase);
        self
    }

    pub fn with_script(self, phase: Phase, script: PhaseScript) -> Self {
        self.scripts.lock().unwrap().insert(phase, script);
        self
    }

    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn kill_count(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    pub fn dispose_count(&self) -> usize {
        self.disposals.load(Ordering::SeqCst)
    }

    pub fn built_recipes(&self) -> Vec<PathBuf> {
        self.built_recipes.lock().unwrap().clone()
    }

    pub fn launched(&self) -> Vec<LaunchSpec> {
        self.launched.lock().unwrap().clone()
    }

    /// Containers launched but not yet disposed
    pub fn live_sandboxes(&self) -> usize {
        self.running.lock().unwrap().len()
    }

    fn script(&self, phase: Phase) -> PhaseScript {
        self.scripts
            .lock()
            .unwrap()
            .get(&phase)
            .cloned()
            .unwrap_or_else(|| PhaseScript::ok(""))
    }
}

fn write_capture(workdir: &Path, name: &str, contents: &str) -> Result<()> {
    let path = workdir.join(name);
    std::fs::write(&path, contents).map_err(|e| ExecError::workspace(&path, e))
}

#[async_trait]
impl Isolation for ScriptedIsolation {
    async fn image_exists(&self, tag: &str) -> Result<bool> {
        Ok(self.images.lock().unwrap().contains(tag))
    }

    async fn build_image(&self, tag: &str, dockerfile: &Path, _context: &Path) -> Result<()> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        self.built_recipes
            .lock()
            .unwrap()
            .push(dockerfile.to_path_buf());

        if !self.build_delay.is_zero() {
            tokio::time::sleep(self.build_delay).await;
        }

        if self.fail_builds {
            return Err(ExecError::ImageBuild {
                tag: tag.to_string(),
                reason: "scripted build failure".to_string(),
            });
        }

        self.images.lock().unwrap().insert(tag.to_string());
        Ok(())
    }

    async fn launch(&self, spec: &LaunchSpec) -> Result<SandboxHandle> {
        self.launched.lock().unwrap().push(spec.clone());

        if self.failing_launches.contains(&spec.phase) {
            return Err(ExecError::Launch("scripted launch failure".to_string()));
        }

        let script = self.script(spec.phase);

        let stdout = if script.echo_stdin && spec.stdin_from_file {
            let path = spec.workdir.join(STDIN_FILE);
            Some(std::fs::read_to_string(&path).map_err(|e| ExecError::workspace(&path, e))?)
        } else if script.echo_stdin {
            Some(String::new())
        } else {
            script.stdout.clone()
        };

        if let (Some(name), Some(contents)) = (spec.phase.stdout_file(), stdout) {
            write_capture(&spec.workdir, name, &contents)?;
        }
        if let Some(contents) = &script.stderr {
            write_capture(&spec.workdir, spec.phase.stderr_file(), contents)?;
        }

        self.running
            .lock()
            .unwrap()
            .insert(spec.name.clone(), spec.phase);

        Ok(SandboxHandle {
            id: spec.name.clone(),
            name: spec.name.clone(),
        })
    }

    async fn wait_with_deadline(
        &self,
        handle: &SandboxHandle,
        deadline: Duration,
    ) -> Result<WaitOutcome> {
        let phase = self
            .running
            .lock()
            .unwrap()
            .get(&handle.id)
            .copied()
            .ok_or_else(|| ExecError::Launch(format!("unknown sandbox {}", handle.id)))?;
        let script = self.script(phase);

        if script.hang {
            tokio::time::sleep(deadline).await;
            return Ok(WaitOutcome::DeadlineExpired);
        }

        Ok(WaitOutcome::Exited {
            exit_code: script.exit_code,
            oom_killed: script.oom_killed,
        })
    }

    async fn force_kill(&self, _handle: &SandboxHandle) -> Result<()> {
        self.kills.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn dispose(&self, handle: &SandboxHandle) -> Result<()> {
        if self.running.lock().unwrap().remove(&handle.id).is_some() {
            self.disposals.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
