//! Label Matcher Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging, and error handling for the label matcher workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`CommonError`] and the [`Result`] alias
//! - **Logging**: centralized `tracing` subscriber setup
//! - **Types**: the storage folder layout shared by the pipeline and operators
//!
//! # Example
//!
//! ```no_run
//! use label_common::types::Folder;
//!
//! let folder = Folder::of_key("processed/PO-100.pdf");
//! assert_eq!(folder, Some(Folder::Processed));
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{CommonError, Result};
pub use types::Folder;
