//! # input-vfs
//!
//! Resolves the named inputs of a job into a virtual file system.
//!
//! ## Design Philosophy
//!
//! input-vfs is designed to be:
//! - **Lazy** - Nothing is read or downloaded until an input is asked for
//! - **Deterministic** - The same declaration always yields the same names
//! - **Library-first** - No CLI, purely a Rust crate for embedding in job runtimes
//! - **Pluggable** - Transport and platform lookups sit behind traits
//!
//! ## Quick Start
//!
//! ```no_run
//! use input_vfs::{Config, DuplicateHandling, InputContext, VfsOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let context = InputContext::new(Config::from_env())?;
//!
//!     // Declared input from the job configuration
//!     let vfs = context.get_input_vfs("images", VfsOptions::default()).await?;
//!     for entry in vfs.entries() {
//!         println!("{}", entry.name);
//!     }
//!
//!     // Ad hoc input from literals
//!     context
//!         .register_literal(
//!             "extra",
//!             ["https://example.com/labels.csv", "/data/*.csv"],
//!             DuplicateHandling::AppendIndex,
//!         )
//!         .await?;
//!     let paths = context.input("extra").paths(VfsOptions::default()).await?;
//!     println!("{paths:?}");
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Download-need decision, fetching and platform lookups
pub mod download;
/// Error types
pub mod error;
/// Input and file records
pub mod input;
/// Job-facing entry point
pub mod inputs;
/// Duplicate name allocation
pub mod naming;
/// Registry of named inputs
pub mod registry;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types
pub mod types;
/// Helper functions for names, URIs and hashing
pub mod utils;
/// Virtual file system and archive expansion
pub mod vfs;

// Re-export commonly used types
pub use config::Config;
pub use download::{DatumResolver, DownloadCoordinator, DownloadUrlSource, Fetcher};
pub use error::{DownloadError, Error, InputError, Result, VfsError};
pub use input::{FileRecord, FileSource, InputRecord};
pub use inputs::{Input, InputContext, VfsOptions};
pub use registry::InputRegistry;
pub use types::{ArchiveType, DownloadPolicy, DownloadReport, DuplicateHandling, FileFailure};
pub use vfs::{Vfs, VfsEntry};
