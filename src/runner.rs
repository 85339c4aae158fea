//! The Runner: turns a [`model::RunRequest`] into a sequence of ephemeral,
//! resource-capped containers and assembles an artifact response.

pub mod artifact;
pub mod capability;
pub mod container;
pub mod error;
pub mod job;
pub mod model;
pub mod names;
pub mod path_map;
pub mod preflight;
pub mod step;
