//! Server setup and routing.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use axum::routing::post;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::runner::container::CliContainerRuntime;
use crate::runner::job::JobRunner;
use crate::runner::path_map::PathMap;
use crate::runner::preflight;
use crate::runner::step::StepRunner;
use crate::server::handlers;
use crate::server::state::AppState;

/// Creates the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/capabilities", get(handlers::capabilities))
        .route("/sandboxes/health", get(handlers::sandboxes_health))
        .route("/run", post(handlers::run))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Builds application state from configuration, running Preflight against
/// the real container runtime before accepting traffic.
///
/// # Errors
///
/// Returns an error if Preflight fails.
pub async fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let runtime: Arc<dyn crate::runner::container::ContainerRuntime> =
        Arc::new(CliContainerRuntime::new(config.runner.container_runtime.clone()));

    preflight::run(runtime.as_ref(), preflight::default_socket_path())
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    let path_map = Arc::new(PathMap::new(
        config.runner.local_jobs_dir.clone(),
        config.runner.host_jobs_dir.clone(),
    ));

    let step_runner = Arc::new(StepRunner::new(
        runtime.clone(),
        config.runner.docker_pull,
        config.runner.container_user.clone(),
        config.runner.default_sandbox_image.clone(),
    ));

    let job_runner = Arc::new(JobRunner::new(
        path_map,
        step_runner,
        config.runner.retain_job_dirs,
    ));

    let job_slots = config
        .runner
        .max_concurrent_jobs
        .map(|n| Arc::new(tokio::sync::Semaphore::new(n)));

    Ok(AppState::builder()
        .job_runner(job_runner)
        .runtime(runtime)
        .known_sandboxes(Arc::new(config.runner.known_sandboxes.clone()))
        .maybe_job_slots(job_slots)
        .build())
}

/// Runs the server: builds state, binds the configured address, and serves
/// requests until the process is terminated.
///
/// # Errors
///
/// Returns an error if Preflight fails or the server cannot bind its
/// address.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let state = build_state(&config).await?;
    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("listening on `{}`", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
