//! D&B Direct+ batch runner library
//!
//! Rate-limited batch orchestration against the D&B Direct+ and GLEIF APIs.
//! The binary in `src/main.rs` wires these modules into runnable jobs.

pub mod config;
pub mod error;
pub mod executor;
pub mod io;
pub mod jobs;
pub mod limiter;
pub mod orchestrator;
pub mod request;
