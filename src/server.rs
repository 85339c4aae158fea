//! HTTP surface for the Runner: `/health`, `/capabilities`,
//! `/sandboxes/health`, and `/run`.

pub mod handlers;
pub mod router;
pub mod state;

pub use router::build_state;
pub use router::create_router;
pub use router::run;
pub use state::AppState;
