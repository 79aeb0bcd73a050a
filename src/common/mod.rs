//! Common types and utilities shared across the container engine.
//!
//! This module provides the crate-wide error type and the little-endian
//! helpers used by every on-disk codec.

// Submodule declarations
pub mod binary;
pub mod error;

// Re-exports for convenience
pub use error::{ChainFault, Error, Result};
