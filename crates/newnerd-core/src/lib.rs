//! # newnerd-core
//!
//! Core types, traits, and abstractions for the New Nerd document library.
//!
//! This crate provides the data structures and trait definitions that the
//! database, inference, search, and API crates depend on.

pub mod defaults;
pub mod error;
pub mod files;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use files::{sanitize_filename, ExtractionPlan, TypeFilter};
pub use models::*;
pub use traits::*;
