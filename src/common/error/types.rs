//! Unified error type for compound-file operations.
//!
//! The variants follow the container's failure taxonomy: format errors are
//! fatal at open time, chain corruption is fatal in strict paths and
//! recovered in lenient ones, lookup failures are ordinary caller-visible
//! results, and size/bounds violations always propagate.
use thiserror::Error;

/// Why a sector chain walk was abandoned.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainFault {
    /// The chain revisits a sector it already passed through.
    #[error("cycle detected")]
    Cycle,
    /// A next-pointer names a sector outside the allocation table.
    #[error("sector index out of range")]
    OutOfRange,
    /// The chain is longer than the declared stream size allows.
    #[error("chain longer than declared size")]
    TooLong,
    /// The chain ends before covering the declared stream size.
    #[error("chain shorter than declared size")]
    TooShort,
    /// A next-pointer holds a sentinel other than end-of-chain.
    #[error("unexpected sentinel in chain")]
    UnexpectedSentinel,
}

/// Main error type for compound-file operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error from the underlying byte source or sink
    #[error("IO error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Data does not start with the compound-file signature
    #[error("Not an OLE2 compound file")]
    NotOleFile,

    /// Header or structural fields are inconsistent
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// A field could not be decoded
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// An allocation chain is cyclic or out of range
    #[error("Corrupt chain starting at sector {start}: {reason} at sector {sector}")]
    CorruptChain {
        start: u32,
        sector: u32,
        reason: ChainFault,
    },

    /// No entry with the requested name or path
    #[error("Entry not found: {0}")]
    NotFound(String),

    /// A sibling with the same (case-insensitive) name already exists
    #[error("Duplicate entry name: {0}")]
    DuplicateName(String),

    /// Entry name violates the format's naming rules
    #[error("Invalid entry name: {0}")]
    InvalidName(String),

    /// Entry exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// Entry exists but is not a document
    #[error("Not a document: {0}")]
    NotADocument(String),

    /// Directory still has children
    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// Sector or block index past the end of storage
    #[error("Index {index} out of bounds (count {count})")]
    OutOfBounds { index: u64, count: u64 },

    /// Caller-supplied byte limit would be exceeded
    #[error("Write limit of {limit} bytes exceeded (attempted {attempted})")]
    LimitExceeded { limit: u64, attempted: u64 },

    /// `write` called on a closed output stream
    #[error("Write after close")]
    WriteAfterClose,

    /// Handle used after its container was closed or its entry replaced
    #[error("Stream handle is no longer valid")]
    HandleInvalid,
}

impl Error {
    /// Wrap an I/O error with the operation that produced it.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether this error means the bytes are not a usable container at all.
    pub fn is_format_error(&self) -> bool {
        matches!(self, Error::NotOleFile | Error::InvalidFormat(_))
    }
}

/// Result type for compound-file operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corrupt_chain_message_names_fault() {
        let err = Error::CorruptChain {
            start: 3,
            sector: 5,
            reason: ChainFault::Cycle,
        };
        assert_eq!(
            err.to_string(),
            "Corrupt chain starting at sector 3: cycle detected at sector 5"
        );
        assert_eq!(ChainFault::TooShort.to_string(), "chain shorter than declared size");
    }
}
