//! Error conversion implementations.
//!
//! Stream handles implement the `std::io` traits, so errors have to cross the
//! `io::Error` boundary in both directions without losing their variant.

use super::types::Error;
use crate::common::binary::BinaryError;

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        // Errors that were ours before crossing into `io::Error` come back intact.
        if err.get_ref().is_some_and(|inner| inner.is::<Error>()) {
            if let Some(inner) = err.into_inner()
                && let Ok(ours) = inner.downcast::<Error>()
            {
                return *ours;
            }
            return Error::InvalidData("unrecoverable wrapped error".to_string());
        }
        Error::io("accessing container data", err)
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io { source, .. } => source,
            other => std::io::Error::other(other),
        }
    }
}

impl From<BinaryError> for Error {
    fn from(err: BinaryError) -> Self {
        Error::InvalidData(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_io_error() {
        let io: std::io::Error = Error::WriteAfterClose.into();
        let back: Error = io.into();
        assert!(matches!(back, Error::WriteAfterClose));
    }

    #[test]
    fn test_plain_io_error_gets_context() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        match Error::from(io) {
            Error::Io { source, .. } => {
                assert_eq!(source.kind(), std::io::ErrorKind::UnexpectedEof)
            },
            other => panic!("unexpected: {other:?}"),
        }
    }
}
