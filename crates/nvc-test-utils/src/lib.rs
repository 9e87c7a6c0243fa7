//! Testing utilities and fixtures for nvc.
//!
//! This crate provides common testing infrastructure used across the nvc workspace:
//!
//! - **Fixtures**: temporary working trees built from a declarative description
//! - **Assertions**: file, permission and whole-tree comparisons
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use nvc_test_utils::{assertions::assert_tree_eq, TestProject};
//!
//! #[tokio::test]
//! async fn test_copy() {
//!     let project = TestProject::new()
//!         .with_file("src/main.rs", "fn main() {}")
//!         .with_dir(".nvc")
//!         .build();
//!
//!     // ... snapshot and restore into `out` ...
//!     assert_tree_eq(project.path(), out.path(), &[".nvc"]);
//! }
//! ```

pub mod assertions;
pub mod fixtures;

pub use fixtures::{BuiltTestProject, TestProject};
