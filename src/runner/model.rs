//! Wire types for the Runner's job requests and results.

use nonempty::NonEmpty;
use serde::Deserialize;
use serde::Serialize;
use strum::Display;
use strum::EnumString;

/// Default CPU limit, in fractional cores, applied when a request omits it.
pub const DEFAULT_CPU_LIMIT: f64 = 1.0;

/// Default memory limit in megabytes applied when a request omits it.
pub const DEFAULT_MEM_LIMIT_MB: u64 = 1024;

/// Default process count cap applied when a request omits it.
pub const DEFAULT_PIDS_LIMIT: u32 = 256;

/// Default per-step wall-clock timeout.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 120;

/// A request to run a sequence of steps inside fresh containers.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunRequest {
    /// Free-form identifier for the source tree; the Runner does not fetch
    /// it itself.
    pub repo_url: String,
    /// Optional version tag passed through as metadata.
    #[serde(default)]
    pub r#ref: Option<String>,
    /// Ordered, non-empty sequence of steps to execute.
    pub steps: NonEmpty<Step>,
    /// Fractional CPU cores made available to each step's container.
    #[serde(default = "default_cpu_limit")]
    pub cpu_limit: f64,
    /// Memory limit, in megabytes, applied to each step's container.
    #[serde(default = "default_mem_limit_mb")]
    pub mem_limit_mb: u64,
    /// Maximum number of processes permitted inside each step's container.
    #[serde(default = "default_pids_limit")]
    pub pids_limit: u32,
    /// Image identifier used for each step; when omitted the Step Runner
    /// falls back to `runner.default_sandbox_image` from configuration.
    #[serde(default)]
    pub sandbox_image: Option<String>,
}

/// Default for [`RunRequest::cpu_limit`].
fn default_cpu_limit() -> f64 {
    DEFAULT_CPU_LIMIT
}

/// Default for [`RunRequest::mem_limit_mb`].
fn default_mem_limit_mb() -> u64 {
    DEFAULT_MEM_LIMIT_MB
}

/// Default for [`RunRequest::pids_limit`].
fn default_pids_limit() -> u32 {
    DEFAULT_PIDS_LIMIT
}

impl RunRequest {
    /// Validates field-level constraints that `serde` defaults alone don't
    /// express: positive resource limits, and non-empty step names and
    /// commands.
    ///
    /// # Errors
    ///
    /// Returns a descriptive message naming the first invalid field found.
    pub fn validate(&self) -> Result<(), String> {
        if self.repo_url.trim().is_empty() {
            return Err("`repo_url` must not be empty".to_string());
        }
        if !(self.cpu_limit > 0.0) {
            return Err("`cpu_limit` must be greater than zero".to_string());
        }
        if self.mem_limit_mb == 0 {
            return Err("`mem_limit_mb` must be greater than zero".to_string());
        }
        if self.pids_limit == 0 {
            return Err("`pids_limit` must be greater than zero".to_string());
        }
        for (index, step) in self.steps.iter().enumerate() {
            step.validate().map_err(|e| format!("steps[{index}]: {e}"))?;
        }
        Ok(())
    }
}

impl Step {
    /// Validates one step's field-level constraints.
    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("`name` must not be empty".to_string());
        }
        if self.command.trim().is_empty() {
            return Err("`command` must not be empty".to_string());
        }
        if self.timeout_seconds == 0 {
            return Err("`timeout_seconds` must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// One shell command executed inside a single ephemeral container.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Step {
    /// Human-readable identifier, used in logs and artifact markers.
    pub name: String,
    /// Shell script text executed under `set -euo pipefail`.
    pub command: String,
    /// Per-step wall-clock cap, in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Networking policy for this step's container.
    #[serde(default)]
    pub network: Network,
    /// Environment variables shell-quoted into the step preamble.
    #[serde(default)]
    pub env: std::collections::BTreeMap<String, String>,
}

/// Default for [`Step::timeout_seconds`].
fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

/// Networking policy applied to a step's container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Network {
    /// All networking is disabled; the container never sees a host
    /// network namespace.
    #[default]
    None,
    /// Default outbound (egress) networking is enabled.
    Egress,
}

/// Image pull policy for a step's container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PullPolicy {
    /// Always pull the image before running.
    Always,
    /// Pull only if the image is not already present locally.
    #[default]
    Missing,
    /// Never pull; fail if the image is not already present.
    Never,
}

/// The outcome of executing a single step.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StepResult {
    /// The step's name, copied from the request.
    pub name: String,
    /// The container's exit code, or a synthesized code for Runner-level
    /// failures (`124` timeout, `999` spawn failure).
    pub exit_code: i32,
    /// Captured standard output, in full.
    pub stdout: String,
    /// Captured standard error, in full.
    pub stderr: String,
}

impl StepResult {
    /// Whether this step completed successfully.
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// The response returned once a job's steps have finished (or failed fast).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunResponse {
    /// Fresh unique identifier for this job.
    pub job_id: String,
    /// One entry per step actually executed, in execution order.
    pub results: Vec<StepResult>,
    /// Base64-encoded compressed archive of the job's output directory,
    /// present whenever that directory exists.
    pub artifacts_zip_base64: Option<String>,
}
