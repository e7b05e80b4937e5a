//! # Scribe Common Library
//!
//! Shared code for the Scribe relay service including:
//! - Error types (Error enum, Result alias)
//! - Event types (ScribeEvent enum) and EventBus
//! - Configuration file loading

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
