//! Protocol error types.

use thiserror::Error;

use crate::types::MessageFamily;

/// Errors that can occur when encoding or decoding cube payloads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Payload is too short for its tag.
    #[error("payload too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Expected minimum length.
        expected: usize,
        /// Actual length received.
        actual: usize,
    },

    /// Payload carried no bytes at all.
    #[error("empty payload")]
    EmptyPayload,

    /// Leading tag byte is not known for the family.
    #[error("unknown {family} tag: 0x{tag:02X}")]
    UnknownTag {
        /// Characteristic family the payload came from.
        family: MessageFamily,
        /// Offending tag byte.
        tag: u8,
    },

    /// The family has no readable payloads.
    #[error("{0} payloads cannot be decoded")]
    NotReadable(MessageFamily),

    /// UTF-8 decoding error.
    #[error("invalid UTF-8 in string field")]
    InvalidUtf8,

    /// A decoded response was not the variant the caller asked for.
    #[error("unexpected response: expected {expected}, got {actual}")]
    UnexpectedVariant {
        /// Variant that was requested.
        expected: &'static str,
        /// Variant that was decoded.
        actual: &'static str,
    },

    /// Argument cannot be represented on the wire.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Checks that `frame` holds at least `expected` bytes.
pub(crate) fn require_len(frame: &[u8], expected: usize) -> Result<(), ProtocolError> {
    if frame.len() < expected {
        return Err(ProtocolError::FrameTooShort {
            expected,
            actual: frame.len(),
        });
    }
    Ok(())
}
