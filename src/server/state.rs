//! Shared application state handed to every HTTP handler.

use std::collections::BTreeMap;
use std::sync::Arc;

use bon::Builder;
use tokio::sync::Semaphore;

use crate::runner::container::ContainerRuntime;
use crate::runner::job::JobRunner;

/// State shared across all HTTP handlers.
#[derive(Clone, Builder)]
pub struct AppState {
    /// Drives each job's step sequence to completion.
    pub job_runner: Arc<JobRunner>,
    /// Container runtime used directly by `/capabilities` and
    /// `/sandboxes/health`.
    pub runtime: Arc<dyn ContainerRuntime>,
    /// Sandbox images the Capability Probe checks, keyed by name.
    pub known_sandboxes: Arc<BTreeMap<String, String>>,
    /// Optional gate bounding how many jobs run at once.
    pub job_slots: Option<Arc<Semaphore>>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("known_sandboxes", &self.known_sandboxes.keys().collect::<Vec<_>>())
            .field("job_slots", &self.job_slots.as_ref().map(|s| s.available_permits()))
            .finish_non_exhaustive()
    }
}
