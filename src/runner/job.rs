//! Orchestrates one job's step sequence: directory lifecycle, fail-fast
//! execution, and artifact packing.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use crate::runner::artifact;
use crate::runner::error::RunnerError;
use crate::runner::model::RunRequest;
use crate::runner::model::RunResponse;
use crate::runner::model::StepResult;
use crate::runner::names;
use crate::runner::path_map::PathMap;
use crate::runner::step::StepRunner;

/// Runner-emitted liveness marker written at job start.
const RUNNER_MARKER_FILE: &str = "_runner.txt";

/// Runner-emitted marker recording the most recently completed step.
const LAST_STEP_MARKER_FILE: &str = "_last_step.txt";

/// Owns job lifecycle directories and drives one request's steps to
/// completion (or to the first failing step).
pub struct JobRunner {
    /// Translates job-relative subpaths to `(local, host)` pairs.
    path_map: Arc<PathMap>,
    /// Executes each step's container in turn.
    step_runner: Arc<StepRunner>,
    /// Whether job directories survive past artifact packing.
    retain_job_dirs: bool,
}

impl JobRunner {
    /// Creates a job runner.
    pub fn new(path_map: Arc<PathMap>, step_runner: Arc<StepRunner>, retain_job_dirs: bool) -> Self {
        Self {
            path_map,
            step_runner,
            retain_job_dirs,
        }
    }

    /// Runs a request's steps in order, stopping at the first non-zero
    /// exit code, then always packs whatever the output directory holds.
    pub async fn run(&self, request: RunRequest) -> Result<RunResponse, RunnerError> {
        let job_id = names::job_id();
        tracing::info!(job_id = %job_id, step_count = request.steps.len(), "starting job");

        let ws = self.path_map.job_paths(format!("{job_id}/ws"));
        let out = self.path_map.job_paths(format!("{job_id}/out"));

        create_world_writable_dir(&ws.local).context("failed to create job workspace directory")?;
        create_world_writable_dir(&out.local).context("failed to create job output directory")?;

        write_marker(&out.local, RUNNER_MARKER_FILE, &format!("job {job_id} started\n"))
            .context("failed to write runner marker")?;

        let mut results: Vec<StepResult> = Vec::new();

        for step in request.steps.iter() {
            let result = self
                .step_runner
                .run(&job_id, &request, step, &ws.host, &out.host)
                .await;

            write_marker(
                &out.local,
                LAST_STEP_MARKER_FILE,
                &format!("{}\t{}\n", result.name, result.exit_code),
            )
            .context("failed to write last-step marker")?;

            let failed = !result.is_success();
            if failed {
                tracing::warn!(job_id = %job_id, step = %result.name, exit_code = result.exit_code, "step failed; stopping job");
            }
            results.push(result);
            if failed {
                break;
            }
        }

        let artifacts_zip_base64 = Some(
            artifact::pack(&out.local).map_err(|e| RunnerError::Pack(e.to_string()))?,
        );

        if !self.retain_job_dirs {
            if let Some(root) = ws.local.parent() {
                if let Err(err) = std::fs::remove_dir_all(root) {
                    tracing::warn!(job_id = %job_id, error = %err, "failed to remove job directory after packing");
                }
            }
        }

        tracing::info!(job_id = %job_id, steps_run = results.len(), "job finished");

        Ok(RunResponse {
            job_id,
            results,
            artifacts_zip_base64,
        })
    }
}

/// Creates `dir` (and its parents) and, on Unix, makes it world-writable so
/// containers running as any UID can write into it.
fn create_world_writable_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o777))?;
    }
    Ok(())
}

/// Writes (overwriting) one of the Runner's debug marker files under the
/// job's output directory.
fn write_marker(out_dir: &Path, file_name: &str, contents: &str) -> std::io::Result<()> {
    std::fs::write(PathBuf::from(out_dir).join(file_name), contents)
}
