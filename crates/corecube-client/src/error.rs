//! Error types for the client.

use corecube_protocol::ProtocolError;
use thiserror::Error;

use crate::central::PeripheralId;
use crate::characteristic::CharacteristicId;

/// Opaque error reported by the platform BLE stack.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HardwareError(pub String);

impl HardwareError {
    /// Wraps a message from the BLE stack.
    pub fn new(message: impl Into<String>) -> Self {
        HardwareError(message.into())
    }
}

/// Errors delivered to callers of the client.
///
/// Cloneable so one hardware event can fail every waiter it resolves.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CubeError {
    /// No cube was found before the scan timeout elapsed.
    #[error("scan timed out")]
    ScanTimeout,

    /// The hardware connect did not complete in time.
    #[error("connection timed out")]
    ConnectionTimeout,

    /// The BLE stack reported a failed connect without a reason.
    #[error("connection failed with no reason")]
    ConnectionFailedNoReason,

    /// The link dropped, or `disconnect` was called, before the cube was ready.
    #[error("disconnected while connecting")]
    DisconnectedWhileConnecting,

    /// The link to a ready cube was lost.
    #[error("disconnected")]
    Disconnected,

    /// Discovery did not find the cube service or any of its characteristics.
    #[error("required service or characteristic not found")]
    RequiredServiceNotFound,

    /// The characteristic was not discovered on this cube.
    #[error("characteristic not supported: {0}")]
    CharacteristicNotSupported(CharacteristicId),

    /// Bytes arrived but could not be decoded.
    #[error("decode failure: {0}")]
    DecodeFailure(ProtocolError),

    /// The decoded response was not the variant the caller asked for.
    #[error("result type mismatch: expected {expected}, got {actual}")]
    ResultTypeMismatch {
        /// Variant that was requested.
        expected: &'static str,
        /// Variant that was decoded.
        actual: &'static str,
    },

    /// Error passed through from the BLE stack.
    #[error("hardware error: {0}")]
    Hardware(#[from] HardwareError),

    /// The registry does not know this peripheral.
    #[error("unknown cube: {0}")]
    UnknownCube(PeripheralId),

    /// A connection is already pending or established.
    #[error("connection already in progress or established")]
    AlreadyConnecting,

    /// The session was released by the registry and cannot be reused.
    #[error("session closed")]
    SessionClosed,
}

impl From<ProtocolError> for CubeError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::UnexpectedVariant { expected, actual } => {
                CubeError::ResultTypeMismatch { expected, actual }
            }
            other => CubeError::DecodeFailure(other),
        }
    }
}

/// Result type for client operations.
pub type CubeResult<T> = Result<T, CubeError>;
