//! Arbor common types, errors, and configuration.
//!
//! This crate provides shared definitions used across all Arbor components.

pub mod config;
pub mod error;
pub mod page;
pub mod types;

pub use config::{ArenaConfig, TreeConfig};
pub use error::{ArborError, Result};
pub use page::{PAGE_SIZE, PageHeader, PageId, PageInfo, PageKind};
pub use types::ValueKind;
