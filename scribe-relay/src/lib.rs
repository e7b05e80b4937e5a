//! scribe-relay library interface for testing
//!
//! Exposes public APIs for integration testing

pub mod auth;
pub mod config;
pub mod dispatch;
pub mod extract;
pub mod process;
pub mod services;
pub mod stream;
