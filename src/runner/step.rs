//! Composes and executes a single step's container.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::runner::container::ContainerRuntime;
use crate::runner::container::ProcessOutput;
use crate::runner::container::RuntimeError;
use crate::runner::container::StepSpec;
use crate::runner::model::PullPolicy;
use crate::runner::model::RunRequest;
use crate::runner::model::Step;
use crate::runner::model::StepResult;
use crate::runner::names;

/// Marker appended to stderr when a step is killed for exceeding its
/// timeout.
const TIMEOUT_MARKER: &str = "TIMEOUT";

/// Exit code synthesized when a step's container exceeds its wall-clock
/// budget.
const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code synthesized when the container runtime binary is missing at
/// step time.
const SPAWN_FAILURE_EXIT_CODE: i32 = 999;

/// Executes one step to completion, translating runtime failures into a
/// `StepResult` rather than propagating them as errors. A failed step is
/// data the job loop inspects, not an exceptional return.
pub struct StepRunner {
    /// Container runtime used to run and kill step containers.
    runtime: Arc<dyn ContainerRuntime>,
    /// Image pull policy applied to every step.
    pull_policy: PullPolicy,
    /// `--user` override applied to every step's container, if configured.
    container_user: Option<String>,
    /// Image used when a request omits `sandbox_image`.
    default_sandbox_image: String,
}

impl StepRunner {
    /// Creates a step runner.
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        pull_policy: PullPolicy,
        container_user: Option<String>,
        default_sandbox_image: String,
    ) -> Self {
        Self {
            runtime,
            pull_policy,
            container_user,
            default_sandbox_image,
        }
    }

    /// Resolves the image a request's steps should run under: the request's
    /// own choice, or `runner.default_sandbox_image` from configuration.
    fn resolved_image<'a>(&'a self, request: &'a RunRequest) -> &'a str {
        request.sandbox_image.as_deref().unwrap_or(&self.default_sandbox_image)
    }

    /// Runs `step` inside a fresh container and returns its result.
    ///
    /// `workspace_host`/`output_host` are the host-visible mount sources
    /// (post Path Mapper translation); `job_id` seeds the container name.
    pub async fn run(
        &self,
        job_id: &str,
        request: &RunRequest,
        step: &Step,
        workspace_host: &Path,
        output_host: &Path,
    ) -> StepResult {
        let container_name = names::container_name(job_id, &step.name);
        let script = build_script(step);
        let image = self.resolved_image(request);

        let spec = StepSpec {
            container_name: &container_name,
            image,
            workspace_host,
            output_host,
            cpu_limit: request.cpu_limit,
            mem_limit_mb: request.mem_limit_mb,
            pids_limit: request.pids_limit,
            network: step.network,
            pull_policy: self.pull_policy,
            container_user: self.container_user.as_deref(),
            script: &script,
        };

        let timeout = Duration::from_secs(step.timeout_seconds);

        match self.runtime.run_step(&spec, timeout).await {
            Ok(output) => result_from_output(&step.name, output),
            Err(RuntimeError::Timeout(_)) => timeout_result(&step.name),
            Err(RuntimeError::BinaryNotFound(binary)) => spawn_failure_result(
                &step.name,
                format!("container runtime binary `{binary}` not found"),
            ),
            Err(err) => spawn_failure_result(&step.name, err.to_string()),
        }
    }
}

/// Builds the fixed shell preamble plus the step's own command.
fn build_script(step: &Step) -> String {
    let mut script = String::from("set -euo pipefail\nmkdir -p /output\nexport HOME=/workspace\nexport OUTPUT_DIR=/output\n");

    for (key, value) in &step.env {
        script.push_str("export ");
        script.push_str(key);
        script.push('=');
        script.push_str(&shlex::quote(value));
        script.push('\n');
    }

    script.push_str(&format!("echo \"== step: {} ==\"\n", step.name));
    script.push_str(&step.command);
    script
}

/// Builds a `StepResult` from a completed container's output.
fn result_from_output(name: &str, output: ProcessOutput) -> StepResult {
    StepResult {
        name: name.to_string(),
        exit_code: output.exit_code,
        stdout: output.stdout,
        stderr: output.stderr,
    }
}

/// Builds the synthesized `StepResult` for a timed-out step.
fn timeout_result(name: &str) -> StepResult {
    StepResult {
        name: name.to_string(),
        exit_code: TIMEOUT_EXIT_CODE,
        stdout: String::new(),
        stderr: format!("step exceeded its timeout\n{TIMEOUT_MARKER}"),
    }
}

/// Builds the synthesized `StepResult` for a spawn-time failure.
fn spawn_failure_result(name: &str, message: String) -> StepResult {
    StepResult {
        name: name.to_string(),
        exit_code: SPAWN_FAILURE_EXIT_CODE,
        stdout: String::new(),
        stderr: format!("Runner error: {message}"),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use nonempty::nonempty;

    use super::*;
    use crate::runner::container::FakeContainerRuntime;
    use crate::runner::model::Network;

    fn request_with(steps: nonempty::NonEmpty<Step>) -> RunRequest {
        RunRequest {
            repo_url: "https://example.com/repo.git".to_string(),
            r#ref: None,
            steps,
            cpu_limit: 1.0,
            mem_limit_mb: 512,
            pids_limit: 64,
            sandbox_image: None,
        }
    }

    fn step(name: &str, command: &str) -> Step {
        Step {
            name: name.to_string(),
            command: command.to_string(),
            timeout_seconds: 30,
            network: Network::None,
            env: Default::default(),
        }
    }

    #[tokio::test]
    async fn successful_step_reports_exit_code_and_output() {
        // Container names embed a random suffix, so scripting a response
        // keyed on a precomputed name can't match what `run` generates
        // internally; the fake's unscripted default (a clean success) is
        // exercised instead.
        let runtime = Arc::new(FakeContainerRuntime::new());
        let job = "job-aaaaaaaa-test";
        let s = step("echo", "echo hello");
        let request = request_with(nonempty![s.clone()]);

        let runner = StepRunner::new(runtime, PullPolicy::Missing, None, "ubuntu:22.04".to_string());
        let result = runner
            .run(job, &request, &s, &PathBuf::from("/tmp/ws"), &PathBuf::from("/tmp/out"))
            .await;

        assert_eq!(result.name, "echo");
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test]
    async fn request_omitting_sandbox_image_falls_back_to_configured_default() {
        let runtime = Arc::new(FakeContainerRuntime::new());
        let job = "job-cccccccc-test";
        let s = step("echo", "echo hello");
        let mut request = request_with(nonempty![s.clone()]);
        request.sandbox_image = None;

        let runner = StepRunner::new(runtime, PullPolicy::Missing, None, "alpine:3.20".to_string());
        let image = runner.resolved_image(&request);

        assert_eq!(image, "alpine:3.20");
    }

    #[tokio::test]
    async fn timeout_synthesizes_124_and_kills_container() {
        let runtime = Arc::new(FakeContainerRuntime::new());
        let job = "job-bbbbbbbb-test";
        let s = step("slow", "sleep 5");

        // Force every run_step call to behave as a timeout by scripting
        // nothing and instead asserting on the fallback path isn't viable
        // (names are randomized), so drive through a runtime that always
        // times out via a dedicated fake wrapper.
        struct AlwaysTimeout(FakeContainerRuntime);

        #[async_trait::async_trait]
        impl ContainerRuntime for AlwaysTimeout {
            fn binary_name(&self) -> &str {
                self.0.binary_name()
            }
            async fn run_step(
                &self,
                spec: &StepSpec<'_>,
                timeout: Duration,
            ) -> Result<ProcessOutput, RuntimeError> {
                self.0.kill(spec.container_name).await.ok();
                Err(RuntimeError::Timeout(timeout.as_secs()))
            }
            async fn kill(&self, container_name: &str) -> Result<(), RuntimeError> {
                self.0.kill(container_name).await
            }
            async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError> {
                self.0.image_exists(image).await
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

        let runtime = Arc::new(AlwaysTimeout(FakeContainerRuntime::new()));
        let request = request_with(nonempty![s.clone()]);
        let runner =
            StepRunner::new(runtime.clone(), PullPolicy::Missing, None, "ubuntu:22.04".to_string());
        let result = runner
            .run(job, &request, &s, &PathBuf::from("/tmp/ws"), &PathBuf::from("/tmp/out"))
            .await;

        assert_eq!(result.exit_code, 124);
        assert!(result.stderr.contains("TIMEOUT"));
        assert_eq!(runtime.0.killed().len(), 1);
    }

    #[test]
    fn script_includes_quoted_env_and_preamble() {
        let mut env = std::collections::BTreeMap::new();
        env.insert("FOO".to_string(), "bar baz".to_string());
        let s = Step {
            name: "with-env".to_string(),
            command: "echo \"$FOO\" > /output/r.txt".to_string(),
            timeout_seconds: 30,
            network: Network::None,
            env,
        };

        let script = build_script(&s);
        assert!(script.starts_with("set -euo pipefail\n"));
        assert!(script.contains("export FOO='bar baz'") || script.contains("export FOO=\"bar baz\""));
        assert!(script.contains("== step: with-env =="));
        assert!(script.ends_with("echo \"$FOO\" > /output/r.txt"));
    }
}
