//! Error type for APDU framing and session crypto
//!
//! Transport failures keep their own type ([`TransportError`]) so that card SDKs can surface
//! them as a distinguished error class.

use crate::transport::TransportError;

/// Result type for APDU operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for APDU framing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Transport related errors
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Response is shorter than the mandatory status word
    #[error("Response too short: {0} bytes")]
    ResponseTooShort(usize),

    /// Command payload does not fit the extended length field
    #[error("Command payload too long: {0} bytes")]
    PayloadTooLong(usize),

    /// Decrypted envelope failed validation
    #[error("Invalid response: {0}")]
    InvalidResponse(&'static str),

    /// Key material has the wrong size
    #[error("Invalid key length: {0}")]
    InvalidKeyLength(usize),
}
