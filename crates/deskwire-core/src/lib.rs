//! # deskwire-core
//!
//! Core crate for Deskwire. Contains configuration schemas, typed
//! identifiers, the session trait, and the unified error system.
//!
//! This crate has **no** internal dependencies on other Deskwire crates.

pub mod config;
pub mod error;
pub mod result;
pub mod session;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
