//! Tupelo integration runner.
//!
//! Brings up Tupelo backends in Docker, waits until they accept connections,
//! runs tester containers against them and reports an aggregate exit code.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod matrix;
pub mod model;
pub mod readiness;
pub mod testing;
