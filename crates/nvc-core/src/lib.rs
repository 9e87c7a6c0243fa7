//! Core logic for nvc.
//!
//! - [`Config`]: layered configuration (global file, environment, project file)
//! - [`Repository`]: the metadata directory of a working tree and the
//!   snapshot store operating on it

pub mod config;
pub mod error;
pub mod repository;

pub use config::Config;
pub use error::{ConfigError, CoreError, CoreResult};
pub use repository::Repository;
