//! Pure logic for the query pipeline.
//!
//! Core modules are free of I/O side effects so they can be tested in
//! isolation.

pub mod classifier;
pub mod types;
pub mod validate;
