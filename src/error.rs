//! Error types for pagestore operations.
//!
//! Every fallible operation in the crate returns [`Result`], and every
//! failure mode callers can react to has its own [`Error`] variant.
//! Validation happens before mutation, so an error never leaves the
//! cache in an intermediate state. Internal invariant violations
//! (a free-list count going negative, a header slice failing to parse)
//! are programming errors and abort via assertion instead of surfacing
//! here.

use std::io;

use thiserror::Error;

use crate::page::Addr;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The host file cannot be interpreted as a store of the configured
    /// page size.
    #[error("corrupt store file: {detail}")]
    CorruptFile { detail: String },

    /// A page was loaded with a kind other than the one the caller
    /// expected.
    #[error("page {addr} is {actual}, expected {expected}")]
    TypeMismatch {
        addr: Addr,
        expected: String,
        actual: String,
    },

    /// A caller-provided address lies beyond the in-memory page count.
    #[error("address {addr} out of bounds (page count {page_count})")]
    InvalidAddress { addr: Addr, page_count: u32 },

    /// An address inside the valid range names a page that was never
    /// created.
    #[error("page {addr} does not exist yet")]
    RangeExceeded { addr: Addr },

    /// A read or write ran past the logical length of a page chain.
    #[error("offset {offset} is outside the {len}-byte page")]
    OutOfRange { offset: usize, len: usize },

    /// The page handle was released or its page deleted.
    #[error("page {addr} handle used after release")]
    UseAfterRelease { addr: Addr },

    /// The store was closed.
    #[error("store is closed")]
    Closed,

    /// The configured page size is not one of the allowed powers of two.
    #[error("invalid page size {size}")]
    InvalidPageSize { size: usize },

    /// An entry subtype above the maximum of 251.
    #[error("subtype {subtype} exceeds the maximum of {max}")]
    SubtypeTooLarge { subtype: u8, max: u8 },

    /// An empty (freed) page was addressed as a live page.
    #[error("page {addr} is empty")]
    EmptyPageOp { addr: Addr },

    /// The host file reported a zero-length transfer on a non-empty
    /// request.
    #[error("host file returned no data for page {addr}")]
    UnexpectedIo { addr: Addr },

    /// The 16-bit address space is fully allocated.
    #[error("no addresses left: all {} pages allocated", u16::MAX as u32 + 1)]
    AddressSpaceExhausted,

    /// Host file I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn corrupt(detail: impl Into<String>) -> Self {
        Error::CorruptFile {
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_the_address() {
        let err = Error::TypeMismatch {
            addr: 7,
            expected: "Entry".into(),
            actual: "Data".into(),
        };
        assert_eq!(err.to_string(), "page 7 is Data, expected Entry");

        let err = Error::InvalidAddress {
            addr: 9,
            page_count: 4,
        };
        assert!(err.to_string().contains("address 9"));
        assert!(err.to_string().contains("page count 4"));
    }

    #[test]
    fn io_errors_convert() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
