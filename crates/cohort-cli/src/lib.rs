//! Library side of the `cohort-prep` command line.

pub mod config;
pub mod logging;
pub mod pipeline;
pub mod types;
