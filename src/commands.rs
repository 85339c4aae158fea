//! Implementation of the Runner's CLI subcommands.

pub mod probe;
pub mod serve;
