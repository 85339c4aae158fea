//! Abstraction over the container runtime CLI, so the Step Runner, Preflight,
//! and Capability Probe can be exercised against a fake in tests without a
//! live daemon.

use std::path::Path;
use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::runner::model::Network;
use crate::runner::model::PullPolicy;

/// In-memory scratch area mounted at `/tmp` inside every step container.
const TMPFS_SIZE: &str = "size=256m";

/// Errors a container runtime operation can fail with.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The runtime's CLI binary could not be found on `PATH`.
    #[error("container runtime binary `{0}` not found")]
    BinaryNotFound(String),
    /// The process could not be spawned for a reason other than a missing
    /// binary.
    #[error("{0}")]
    Spawn(String),
    /// The step exceeded its wall-clock budget; the container has been
    /// killed.
    #[error("step timed out after {0}s")]
    Timeout(u64),
    /// Any other runtime failure (daemon unreachable, non-zero probe, ...).
    #[error("{0}")]
    Other(String),
}

/// Captured result of running a container to completion.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Process exit code.
    pub exit_code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl From<Output> for ProcessOutput {
    fn from(output: Output) -> Self {
        Self {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Everything the Step Runner needs to compose one container invocation.
#[derive(Debug, Clone)]
pub struct StepSpec<'a> {
    /// Unique name assigned to this step's container.
    pub container_name: &'a str,
    /// Sandbox image to run.
    pub image: &'a str,
    /// Host-visible workspace directory, mounted at `/workspace`.
    pub workspace_host: &'a Path,
    /// Host-visible output directory, mounted at `/output`.
    pub output_host: &'a Path,
    /// Fractional CPU cores available to the container.
    pub cpu_limit: f64,
    /// Memory limit, in megabytes.
    pub mem_limit_mb: u64,
    /// Maximum number of processes.
    pub pids_limit: u32,
    /// Networking policy.
    pub network: Network,
    /// Image pull policy.
    pub pull_policy: PullPolicy,
    /// Optional `--user` override.
    pub container_user: Option<&'a str>,
    /// Full shell script (preamble + user command) passed to `bash -lc`.
    pub script: &'a str,
}

/// Operations the Runner needs from a CLI-compatible container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync + std::fmt::Debug {
    /// The runtime's CLI binary name, e.g. `docker`.
    fn binary_name(&self) -> &str;

    /// Runs one step's container to completion or until `timeout` elapses.
    ///
    /// On timeout, the container is killed by name before this returns
    /// [`RuntimeError::Timeout`].
    async fn run_step(
        &self,
        spec: &StepSpec<'_>,
        timeout: Duration,
    ) -> Result<ProcessOutput, RuntimeError>;

    /// Forcefully kills a running container by name. Best-effort: callers
    /// generally do not treat failure here as fatal.
    async fn kill(&self, container_name: &str) -> Result<(), RuntimeError>;

    /// Whether an image is present in the local image store.
    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError>;

    /// Runs a short one-line sanity command inside `image` and returns its
    /// output, used by the Capability Probe.
    async fn probe_image(&self, image: &str, command: &str) -> Result<ProcessOutput, RuntimeError>;

    /// Reports the runtime's client/server version string.
    async fn version(&self) -> Result<String, RuntimeError>;

    /// Runs a no-op daemon query (`info`), used by Preflight.
    async fn info(&self) -> Result<(), RuntimeError>;
}

/// Real [`ContainerRuntime`] backed by invoking the runtime's CLI binary as
/// a subprocess.
#[derive(Debug, Clone)]
pub struct CliContainerRuntime {
    /// CLI binary name (`docker`, or a compatible drop-in).
    binary: String,
}

impl CliContainerRuntime {
    /// Creates a runtime that invokes `binary` as a subprocess.
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Builds the full `run` invocation for one step, per the container
    /// runtime contract.
    fn build_run_command(&self, spec: &StepSpec<'_>) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("run")
            .arg("--rm")
            .arg("--init")
            .arg("--read-only")
            .arg("--pids-limit")
            .arg(spec.pids_limit.to_string())
            .arg("--cpus")
            .arg(format!("{}", spec.cpu_limit))
            .arg("--memory")
            .arg(format!("{}m", spec.mem_limit_mb))
            .arg("--security-opt")
            .arg("no-new-privileges")
            .arg("--cap-drop")
            .arg("ALL")
            .arg("--ipc")
            .arg("none")
            .arg("--workdir")
            .arg("/workspace")
            .arg("-v")
            .arg(format!("{}:/workspace:rw", spec.workspace_host.display()))
            .arg("-v")
            .arg(format!("{}:/output:rw", spec.output_host.display()))
            .arg("--tmpfs")
            .arg(format!("/tmp:rw,noexec,nosuid,{TMPFS_SIZE}"))
            .arg("--network")
            .arg(match spec.network {
                Network::None => "none",
                Network::Egress => "bridge",
            })
            .arg("--pull")
            .arg(match spec.pull_policy {
                PullPolicy::Always => "always",
                PullPolicy::Missing => "missing",
                PullPolicy::Never => "never",
            })
            .arg("--name")
            .arg(spec.container_name);

        if let Some(user) = spec.container_user {
            cmd.arg("--user").arg(user);
        }

        cmd.arg(spec.image).arg("bash").arg("-lc").arg(spec.script);
        cmd
    }
}

#[async_trait]
impl ContainerRuntime for CliContainerRuntime {
    fn binary_name(&self) -> &str {
        &self.binary
    }

    async fn run_step(
        &self,
        spec: &StepSpec<'_>,
        timeout: Duration,
    ) -> Result<ProcessOutput, RuntimeError> {
        let mut cmd = self.build_run_command(spec);
        match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => Ok(ProcessOutput::from(output)),
            Ok(Err(io_err)) => {
                if io_err.kind() == std::io::ErrorKind::NotFound {
                    Err(RuntimeError::BinaryNotFound(self.binary.clone()))
                } else {
                    Err(RuntimeError::Spawn(io_err.to_string()))
                }
            }
            Err(_elapsed) => {
                let _ = self.kill(spec.container_name).await;
                Err(RuntimeError::Timeout(timeout.as_secs()))
            }
        }
    }

    async fn kill(&self, container_name: &str) -> Result<(), RuntimeError> {
        let output = Command::new(&self.binary)
            .arg("kill")
            .arg(container_name)
            .output()
            .await
            .map_err(|e| RuntimeError::Spawn(e.to_string()))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(RuntimeError::Other(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ))
        }
    }

    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError> {
        let output = Command::new(&self.binary)
            .arg("image")
            .arg("inspect")
            .arg(image)
            .output()
            .await
            .map_err(|e| RuntimeError::Spawn(e.to_string()))?;
        Ok(output.status.success())
    }

    async fn probe_image(&self, image: &str, command: &str) -> Result<ProcessOutput, RuntimeError> {
        let output = Command::new(&self.binary)
            .args(["run", "--rm", "--network", "none", image, "bash", "-lc", command])
            .output()
            .await
            .map_err(|e| RuntimeError::Spawn(e.to_string()))?;
        Ok(ProcessOutput::from(output))
    }

    async fn version(&self) -> Result<String, RuntimeError> {
        let output = Command::new(&self.binary)
            .arg("version")
            .output()
            .await
            .map_err(|e| RuntimeError::Spawn(e.to_string()))?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(RuntimeError::Other(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ))
        }
    }

    async fn info(&self) -> Result<(), RuntimeError> {
        let output = Command::new(&self.binary)
            .arg("info")
            .output()
            .await
            .map_err(|e| RuntimeError::Spawn(e.to_string()))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(RuntimeError::Other(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ))
        }
    }
}

#[cfg(test)]
pub use fake::FakeContainerRuntime;

#[cfg(test)]
mod fake {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// A scripted [`ContainerRuntime`] for unit tests; no subprocess is
    /// ever spawned.
    #[derive(Debug, Default)]
    pub struct FakeContainerRuntime {
        /// Responses returned by `run_step`, keyed by container name.
        responses: Mutex<HashMap<String, FakeResponse>>,
        /// Container names that `kill` was called with.
        killed: Mutex<Vec<String>>,
    }

    /// A scripted response for one container invocation.
    #[derive(Debug, Clone)]
    pub enum FakeResponse {
        /// Return this output immediately.
        Output(ProcessOutput),
        /// Behave as though the step ran past its timeout.
        Timeout,
    }

    impl FakeContainerRuntime {
        /// Creates an empty fake runtime.
        pub fn new() -> Self {
            Self::default()
        }

        /// Scripts the response for the next `run_step` call whose
        /// container name matches `name`.
        pub fn script(&self, name: impl Into<String>, response: FakeResponse) {
            self.responses.lock().unwrap().insert(name.into(), response);
        }

        /// Returns the container names `kill` was invoked with, in order.
        pub fn killed(&self) -> Vec<String> {
            self.killed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ContainerRuntime for FakeContainerRuntime {
        fn binary_name(&self) -> &str {
            "fake-runtime"
        }

        async fn run_step(
            &self,
            spec: &StepSpec<'_>,
            timeout: Duration,
        ) -> Result<ProcessOutput, RuntimeError> {
            let response = self
                .responses
                .lock()
                .unwrap()
                .remove(spec.container_name)
                .unwrap_or(FakeResponse::Output(ProcessOutput {
                    exit_code: 0,
                    stdout: String::new(),
                    stderr: String::new(),
                }));

            match response {
                FakeResponse::Output(output) => Ok(output),
                FakeResponse::Timeout => {
                    self.kill(spec.container_name).await.ok();
                    Err(RuntimeError::Timeout(timeout.as_secs()))
                }
            }
        }

        async fn kill(&self, container_name: &str) -> Result<(), RuntimeError> {
            self.killed.lock().unwrap().push(container_name.to_string());
            Ok(())
        }

        async fn image_exists(&self, _image: &str) -> Result<bool, RuntimeError> {
            Ok(true)
        }

        async fn probe_image(
            &self,
            _image: &str,
            _command: &str,
        ) -> Result<ProcessOutput, RuntimeError> {
            Ok(ProcessOutput {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
            })
        }

        async fn version(&self) -> Result<String, RuntimeError> {
            Ok("fake-runtime 0.0.0".to_string())
        }

        async fn info(&self) -> Result<(), RuntimeError> {
            Ok(())
        }
    }
}
