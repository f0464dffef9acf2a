//! SeqSynth Common Utilities
//!
//! Shared infrastructure for all SeqSynth crates:
//! - Error types and result aliases
//! - Tracing/logging initialization
//! - Configuration loading
//! - Asset path helpers for pipeline configs and post-process materials

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use config::*;
pub use error::*;
