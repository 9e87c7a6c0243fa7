//! Shared utilities for nvc.
//!
//! This crate provides common utilities used across the nvc workspace:
//! - Logging setup with tracing
//! - Path utilities (config locations, relative paths, component checks)

pub mod log;
pub mod path;

pub use log::{LogConfig, LogLevel};
