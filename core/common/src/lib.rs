//! Common utilities and types shared across StorageKit crates.
//!
//! This crate provides the error taxonomy and the opaque option values
//! that flow from configuration into backend construction.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{OptionMap, OptionValue};
