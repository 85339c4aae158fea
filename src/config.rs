//! Runner configuration: a TOML file overlaid with environment variables,
//! both optional, always resolving to a complete, validated [`Config`].

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use serde::Deserialize;

use crate::runner::model::PullPolicy;

/// Default HTTP bind host.
const DEFAULT_HOST: &str = "0.0.0.0";

/// Default HTTP bind port.
const DEFAULT_PORT: u16 = 8080;

/// Default base directory the Runner writes job data under.
const DEFAULT_LOCAL_JOBS_DIR: &str = "./runner_tmp";

/// Default container runtime CLI binary.
const DEFAULT_CONTAINER_RUNTIME: &str = "docker";

/// Default for [`RunnerConfig::retain_job_dirs`].
const DEFAULT_RETAIN_JOB_DIRS: bool = true;

/// Default image used when a request omits `sandbox_image`.
const DEFAULT_SANDBOX_IMAGE: &str = "ubuntu:22.04";

/// Top-level Runner configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Container execution settings.
    pub runner: RunnerConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to bind to.
    pub port: u16,
}

/// Container execution settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Base path where the Runner creates and writes job data.
    pub local_jobs_dir: PathBuf,
    /// Corresponding host-visible base path for volume mounts; defaults to
    /// `local_jobs_dir` (bare-host deployment) when unset.
    pub host_jobs_dir: Option<PathBuf>,
    /// Container runtime CLI binary name.
    pub container_runtime: String,
    /// `--user` passed to every step container; unset leaves the image
    /// default in effect.
    pub container_user: Option<String>,
    /// Image pull policy applied to every step.
    pub docker_pull: PullPolicy,
    /// Optional cap on the number of jobs executing at once.
    pub max_concurrent_jobs: Option<usize>,
    /// Whether job directories survive past artifact packing.
    pub retain_job_dirs: bool,
    /// Image used when a request omits `sandbox_image`.
    pub default_sandbox_image: String,
    /// Sandbox images probed by the Capability Probe, keyed by name.
    pub known_sandboxes: BTreeMap<String, String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            local_jobs_dir: PathBuf::from(DEFAULT_LOCAL_JOBS_DIR),
            host_jobs_dir: None,
            container_runtime: DEFAULT_CONTAINER_RUNTIME.to_string(),
            container_user: None,
            docker_pull: PullPolicy::Missing,
            max_concurrent_jobs: None,
            retain_job_dirs: DEFAULT_RETAIN_JOB_DIRS,
            default_sandbox_image: DEFAULT_SANDBOX_IMAGE.to_string(),
            known_sandboxes: BTreeMap::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            runner: RunnerConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from an optional TOML file, then overlays any
    /// recognized environment variables, then validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resolved configuration is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML configuration file. Missing fields fall back
    /// to their defaults.
    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file `{}`", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file `{}`", path.display()))
    }

    /// Overlays recognized `MATRIXLAB_*` environment variables on top of the
    /// currently loaded configuration. Environment variables take
    /// precedence over the file and over built-in defaults.
    fn apply_env_overrides(&mut self) {
        if let Some(v) = env::host() {
            self.server.host = v;
        }
        if let Some(v) = env::port() {
            self.server.port = v;
        }
        if let Some(v) = env::local_jobs_dir() {
            self.runner.local_jobs_dir = v;
        }
        if let Some(v) = env::host_jobs_dir() {
            self.runner.host_jobs_dir = Some(v);
        }
        if let Some(v) = env::container_runtime() {
            self.runner.container_runtime = v;
        }
        if let Some(v) = env::container_user() {
            self.runner.container_user = Some(v);
        }
        if let Some(v) = env::docker_pull() {
            self.runner.docker_pull = v;
        }
        if let Some(v) = env::max_concurrent_jobs() {
            self.runner.max_concurrent_jobs = Some(v);
        }
        if let Some(v) = env::retain_job_dirs() {
            self.runner.retain_job_dirs = v;
        }
    }

    /// Validates cross-field invariants not expressible through `serde`
    /// defaults alone.
    fn validate(&self) -> Result<()> {
        if self.runner.container_runtime.trim().is_empty() {
            anyhow::bail!("`runner.container_runtime` must not be empty");
        }
        if let Some(0) = self.runner.max_concurrent_jobs {
            anyhow::bail!("`runner.max_concurrent_jobs` must be greater than zero when set");
        }
        Ok(())
    }
}

/// Environment variable accessors, one per recognized `MATRIXLAB_*` setting.
mod env {
    use std::path::PathBuf;

    use crate::runner::model::PullPolicy;

    /// Parses an environment variable with a custom conversion, returning
    /// `None` when unset or unparsable.
    fn parse<T>(var: &str, f: impl FnOnce(String) -> Option<T>) -> Option<T> {
        std::env::var(var).ok().and_then(f)
    }

    /// `MATRIXLAB_HOST`.
    pub fn host() -> Option<String> {
        parse("MATRIXLAB_HOST", Some)
    }

    /// `MATRIXLAB_PORT`.
    pub fn port() -> Option<u16> {
        parse("MATRIXLAB_PORT", |s| s.parse().ok())
    }

    /// `MATRIXLAB_LOCAL_JOBS_DIR`.
    pub fn local_jobs_dir() -> Option<PathBuf> {
        parse("MATRIXLAB_LOCAL_JOBS_DIR", |s| Some(PathBuf::from(s)))
    }

    /// `MATRIXLAB_HOST_JOBS_DIR`.
    pub fn host_jobs_dir() -> Option<PathBuf> {
        parse("MATRIXLAB_HOST_JOBS_DIR", |s| Some(PathBuf::from(s)))
    }

    /// `MATRIXLAB_CONTAINER_RUNTIME`.
    pub fn container_runtime() -> Option<String> {
        parse("MATRIXLAB_CONTAINER_RUNTIME", Some)
    }

    /// `MATRIXLAB_CONTAINER_USER`.
    pub fn container_user() -> Option<String> {
        parse("MATRIXLAB_CONTAINER_USER", Some)
    }

    /// `MATRIXLAB_DOCKER_PULL`.
    pub fn docker_pull() -> Option<PullPolicy> {
        parse("MATRIXLAB_DOCKER_PULL", |s| s.parse().ok())
    }

    /// `MATRIXLAB_MAX_CONCURRENT_JOBS`.
    pub fn max_concurrent_jobs() -> Option<usize> {
        parse("MATRIXLAB_MAX_CONCURRENT_JOBS", |s| s.parse().ok())
    }

    /// `MATRIXLAB_RETAIN_JOB_DIRS`.
    pub fn retain_job_dirs() -> Option<bool> {
        parse("MATRIXLAB_RETAIN_JOB_DIRS", |s| s.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.runner.container_runtime, "docker");
        assert!(config.runner.retain_job_dirs);
        assert!(config.runner.host_jobs_dir.is_none());
    }

    #[test]
    fn rejects_zero_max_concurrent_jobs() {
        let mut config = Config::default();
        config.runner.max_concurrent_jobs = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_partial_toml_with_defaults_for_the_rest() {
        let toml = r#"
            [server]
            port = 9000

            [runner]
            container_runtime = "podman"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.runner.container_runtime, "podman");
        assert_eq!(config.runner.default_sandbox_image, "ubuntu:22.04");
    }
}
