//! Error types specific to card transport

/// Transport error type
///
/// Timeouts and link failures are reported as [`TransportError::TagLost`] so that callers see a
/// single distinguished error class.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The card left the field or the link timed out
    #[error("Tag lost")]
    TagLost,

    /// The reader cannot carry extended length APDUs
    #[error("Extended length APDUs are not supported by the reader")]
    ExtendedLengthNotSupported,

    /// The connected tag does not support the requested read path
    #[error("Unsupported tag type")]
    UnsupportedTag,

    /// Transport is not open
    #[error("Transport is not connected")]
    NotConnected,
}
