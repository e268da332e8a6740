//! Side-effecting parts of the pipeline: configuration, processes, templates.

pub mod config;
pub mod process;
pub mod runner;
pub mod templates;
