//! Read-only self-test of each declared sandbox image, exposed at
//! `/sandboxes/health` and separate from the `/run` request path.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::runner::container::ContainerRuntime;

/// One-line command run inside each sandbox image to confirm it starts and
/// executes correctly.
const SANITY_COMMAND: &str = "echo matrixlab-sandbox-ok";

/// Overall health reported by the probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Every declared sandbox responded successfully.
    Ok,
    /// At least one sandbox image is missing or failed its sanity command,
    /// but the container runtime itself is reachable.
    Degraded,
    /// At least one sandbox could not be checked at all because the
    /// container runtime failed to respond (daemon unreachable, spawn
    /// failure, ...), as distinct from a per-image problem.
    Error,
}

/// Per-sandbox outcome severity, used only to aggregate [`Status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Severity {
    Healthy,
    Degraded,
    Errored,
}

/// Per-sandbox probe outcome.
#[derive(Debug, Clone, Serialize)]
pub struct SandboxHealth {
    /// Whether the sandbox is usable.
    pub ok: bool,
    /// Exit code of the sanity command, or `None` if the image was missing.
    pub exit_code: Option<i32>,
    /// Truncated captured standard output.
    pub stdout: String,
    /// Truncated captured standard error.
    pub stderr: String,
    /// The image identifier probed.
    pub image: String,
    /// Present only when the image could not be found locally.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Full result of probing every declared sandbox.
#[derive(Debug, Clone, Serialize)]
pub struct CapabilityReport {
    /// Overall status across all declared sandboxes.
    pub status: Status,
    /// Per-sandbox results, keyed by the sandbox's declared name.
    pub sandboxes: BTreeMap<String, SandboxHealth>,
}

/// Maximum number of bytes of captured output retained per sandbox.
const MAX_CAPTURED_LEN: usize = 2048;

/// Probes every `(name, image)` pair in `sandboxes` and aggregates a report.
pub async fn probe(
    runtime: &dyn ContainerRuntime,
    sandboxes: &BTreeMap<String, String>,
) -> CapabilityReport {
    let mut results = BTreeMap::new();
    let mut worst = Severity::Healthy;

    for (name, image) in sandboxes {
        let (health, severity) = probe_one(runtime, image).await;
        if severity > worst {
            worst = severity;
        }
        results.insert(name.clone(), health);
    }

    CapabilityReport {
        status: match worst {
            Severity::Healthy => Status::Ok,
            Severity::Degraded => Status::Degraded,
            Severity::Errored => Status::Error,
        },
        sandboxes: results,
    }
}

impl PartialOrd for Severity {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Severity {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        fn rank(s: &Severity) -> u8 {
            match s {
                Severity::Healthy => 0,
                Severity::Degraded => 1,
                Severity::Errored => 2,
            }
        }
        rank(self).cmp(&rank(other))
    }
}

/// Probes a single sandbox image, classifying the outcome's severity for
/// aggregation into the overall [`Status`].
async fn probe_one(runtime: &dyn ContainerRuntime, image: &str) -> (SandboxHealth, Severity) {
    match runtime.image_exists(image).await {
        Ok(false) => (
            SandboxHealth {
                ok: false,
                exit_code: None,
                stdout: String::new(),
                stderr: String::new(),
                image: image.to_string(),
                error: Some("image not found".to_string()),
            },
            Severity::Degraded,
        ),
        Ok(true) => match runtime.probe_image(image, SANITY_COMMAND).await {
            Ok(output) => (
                SandboxHealth {
                    ok: output.exit_code == 0,
                    exit_code: Some(output.exit_code),
                    stdout: truncate(&output.stdout),
                    stderr: truncate(&output.stderr),
                    image: image.to_string(),
                    error: None,
                },
                if output.exit_code == 0 { Severity::Healthy } else { Severity::Degraded },
            ),
            // The sanity command could not even be run (daemon unreachable,
            // spawn failure): a runtime-level problem, not a per-image one.
            Err(err) => (
                SandboxHealth {
                    ok: false,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: String::new(),
                    image: image.to_string(),
                    error: Some(err.to_string()),
                },
                Severity::Errored,
            ),
        },
        // Likewise, failing to even ask whether the image exists means the
        // runtime itself did not respond.
        Err(err) => (
            SandboxHealth {
                ok: false,
                exit_code: None,
                stdout: String::new(),
                stderr: String::new(),
                image: image.to_string(),
                error: Some(err.to_string()),
            },
            Severity::Errored,
        ),
    }
}

/// Truncates captured output to at most [`MAX_CAPTURED_LEN`] bytes, on a
/// char boundary.
fn truncate(s: &str) -> String {
    if s.len() <= MAX_CAPTURED_LEN {
        return s.to_string();
    }
    let mut end = MAX_CAPTURED_LEN;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::runner::container::FakeContainerRuntime;
    use crate::runner::container::ProcessOutput;
    use crate::runner::container::RuntimeError;
    use crate::runner::container::StepSpec;

    #[tokio::test]
    async fn all_images_present_and_ok_yields_overall_ok() {
        let runtime = FakeContainerRuntime::new();
        let mut sandboxes = BTreeMap::new();
        sandboxes.insert("python".to_string(), "python:3.12".to_string());
        sandboxes.insert("node".to_string(), "node:22".to_string());

        let report = probe(&runtime, &sandboxes).await;
        assert_eq!(report.status, Status::Ok);
        assert!(report.sandboxes["python"].ok);
        assert!(report.sandboxes["node"].ok);
    }

    /// A runtime that cannot even answer whether an image exists, modeling
    /// a daemon that has gone unreachable mid-probe.
    struct UnreachableRuntime(FakeContainerRuntime);

    #[async_trait]
    impl ContainerRuntime for UnreachableRuntime {
        fn binary_name(&self) -> &str {
            self.0.binary_name()
        }
        async fn run_step(
            &self,
            spec: &StepSpec<'_>,
            timeout: Duration,
        ) -> Result<ProcessOutput, RuntimeError> {
            self.0.run_step(spec, timeout).await
        }
        async fn kill(&self, container_name: &str) -> Result<(), RuntimeError> {
            self.0.kill(container_name).await
        }
        async fn image_exists(&self, _image: &str) -> Result<bool, RuntimeError> {
            Err(RuntimeError::Other("daemon unreachable".to_string()))
        }
        async fn probe_image(
            &self,
            image: &str,
            command: &str,
        ) -> Result<ProcessOutput, RuntimeError> {
            self.0.probe_image(image, command).await
        }
        async fn version(&self) -> Result<String, RuntimeError> {
            self.0.version().await
        }
        async fn info(&self) -> Result<(), RuntimeError> {
            self.0.info().await
        }
    }

    #[tokio::test]
    async fn unreachable_runtime_yields_overall_error_not_degraded() {
        let runtime = UnreachableRuntime(FakeContainerRuntime::new());
        let mut sandboxes = BTreeMap::new();
        sandboxes.insert("python".to_string(), "python:3.12".to_string());

        let report = probe(&runtime, &sandboxes).await;
        assert_eq!(report.status, Status::Error);
        assert!(!report.sandboxes["python"].ok);
        assert_eq!(report.sandboxes["python"].error.as_deref(), Some("daemon unreachable"));
    }
}
