//! Translation between where the Runner writes job files and where the
//! container runtime's daemon sees those same files.
//!
//! Deployments where the Runner itself runs inside a container and shares a
//! control socket with its host's container runtime need this: a path the
//! Runner writes to is not the path the daemon must be told to mount. A
//! bare-host deployment collapses the two roots to the same value.

use std::path::Path;
use std::path::PathBuf;

/// A `(local, host)` root pair, and the per-job paths derived from it.
#[derive(Debug, Clone)]
pub struct PathMap {
    /// Root under which the Runner itself creates and writes job files.
    local_root: PathBuf,
    /// Root at which those same files appear to the container daemon.
    host_root: PathBuf,
}

/// The `(local, host)` paths for one job directory.
#[derive(Debug, Clone)]
pub struct JobPaths {
    /// Path the Runner reads and writes through.
    pub local: PathBuf,
    /// Path passed to the container runtime for volume mounts.
    pub host: PathBuf,
}

impl PathMap {
    /// Creates a path map. `host_root` defaults to `local_root` when `None`,
    /// matching a bare-host deployment.
    pub fn new(local_root: PathBuf, host_root: Option<PathBuf>) -> Self {
        let host_root = host_root.unwrap_or_else(|| local_root.clone());
        Self {
            local_root,
            host_root,
        }
    }

    /// Returns the `(local, host)` path pair for a job subdirectory,
    /// appending the same relative subpath onto each root.
    pub fn job_paths(&self, relative: impl AsRef<Path>) -> JobPaths {
        let relative = relative.as_ref();
        JobPaths {
            local: self.local_root.join(relative),
            host: self.host_root.join(relative),
        }
    }

    /// The root under which the Runner writes files.
    pub fn local_root(&self) -> &Path {
        &self.local_root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_collapses_roots() {
        let map = PathMap::new(PathBuf::from("/data/jobs"), None);
        let paths = map.job_paths("job-abc/ws");
        assert_eq!(paths.local, PathBuf::from("/data/jobs/job-abc/ws"));
        assert_eq!(paths.host, PathBuf::from("/data/jobs/job-abc/ws"));
    }

    #[test]
    fn nested_container_maps_distinct_roots() {
        let map = PathMap::new(
            PathBuf::from("/app/runner_tmp"),
            Some(PathBuf::from("/srv/matrixlab/jobs")),
        );
        let paths = map.job_paths("job-xyz/out");
        assert_eq!(paths.local, PathBuf::from("/app/runner_tmp/job-xyz/out"));
        assert_eq!(paths.host, PathBuf::from("/srv/matrixlab/jobs/job-xyz/out"));
    }
}
