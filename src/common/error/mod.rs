//! Unified error types for compound-file operations.

// Submodule declarations
pub mod types;
pub mod conversions;

// Re-exports
pub use types::{ChainFault, Error, Result};
