//! poifs - Read and write OLE2 compound files
//!
//! OLE2 compound files (also called Compound File Binary or structured
//! storage) are the container behind legacy Microsoft Office formats such
//! as .doc, .xls, .ppt and .msg. A container is a small file system inside
//! one file: directories and documents addressed by path, stored in
//! fixed-size sectors linked through an allocation table, with small
//! documents packed into 64-byte mini sectors.
//!
//! # Features
//!
//! - **Read and write**: Open existing containers, edit them in place and
//!   save them, or build new ones from scratch
//! - **Both sector sizes**: 512-byte (version 3) and 4096-byte (version 4)
//! - **Streaming I/O**: Document handles implement `Read`, `Seek` and `Write`
//! - **Strict or lenient parsing**: Reject corrupt chains, or recover the
//!   readable prefix with a warning
//! - **Listener-driven reading**: Dispatch every document of a container
//!   to callbacks, one document in memory at a time
//!
//! # Example - Building a container
//!
//! ```
//! use poifs::ole::OleFile;
//!
//! # fn main() -> poifs::Result<()> {
//! let ole = OleFile::new();
//! ole.create_document("/", "WordDocument", b"Hello")?;
//! let pool = ole.create_directory("/", "ObjectPool")?;
//! ole.create_document(&pool, "Ole10Native", &[0u8; 5000])?;
//!
//! let bytes = ole.to_bytes()?;
//! assert!(poifs::ole::is_ole_file(&bytes));
//! # Ok(())
//! # }
//! ```
//!
//! # Example - Reading streams
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::Read;
//! use poifs::ole::OleFile;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ole = OleFile::open(File::open("document.doc")?)?;
//!
//! // List all documents
//! for path in ole.list_documents()? {
//!     println!("{}: {} bytes", path, ole.size(&path)?);
//! }
//!
//! // Read part of one
//! let mut stream = ole.open_document("/WordDocument")?;
//! let mut fib = [0u8; 32];
//! stream.read_exact(&mut fib)?;
//! # Ok(())
//! # }
//! ```

/// Shared error type and little-endian helpers
pub mod common;

/// OLE2 compound file container
///
/// Parsing, allocation, directory management and document streams.
pub mod ole;

// Re-export commonly used types for convenience
pub use common::{Error, Result};
pub use ole::{DocumentPath, OleFile, OleOptions};
