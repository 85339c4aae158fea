//! Start-up verification that the container runtime is present, reachable,
//! and operational.
//!
//! Runs once at process start-up (fatal if it fails) and is never invoked by
//! `/health`, which must stay a cheap liveness probe.

use std::path::Path;

use crate::runner::container::ContainerRuntime;
use crate::runner::error::RunnerError;

/// Well-known location of the Docker daemon's control socket on a typical
/// Linux host.
const DEFAULT_RUNTIME_SOCKET: &str = "/var/run/docker.sock";

/// Runs the three preflight checks in order, stopping at the first failure.
pub async fn run(runtime: &dyn ContainerRuntime, socket_path: &Path) -> Result<(), RunnerError> {
    check_binary(runtime.binary_name())?;
    check_socket(socket_path)?;
    check_daemon(runtime).await?;
    Ok(())
}

/// Verifies the container runtime's CLI binary is present and invokable.
fn check_binary(binary: &str) -> Result<(), RunnerError> {
    which::which(binary).map(|_| ()).map_err(|_| {
        RunnerError::Preflight(format!(
            "container runtime binary `{binary}` was not found on PATH"
        ))
    })
}

/// Verifies a runtime control socket exists at the configured location.
fn check_socket(socket_path: &Path) -> Result<(), RunnerError> {
    if socket_path.exists() {
        Ok(())
    } else {
        Err(RunnerError::Preflight(format!(
            "container runtime control socket not found at `{}`",
            socket_path.display()
        )))
    }
}

/// Verifies the daemon responds to a no-op query.
async fn check_daemon(runtime: &dyn ContainerRuntime) -> Result<(), RunnerError> {
    runtime.info().await.map_err(|err| {
        RunnerError::Preflight(format!("container runtime daemon is unreachable: {err}"))
    })
}

/// The default socket path checked by [`run`] when no override is
/// configured.
pub fn default_socket_path() -> &'static Path {
    Path::new(DEFAULT_RUNTIME_SOCKET)
}
