//! Core types for APDU (Application Protocol Data Unit) exchanges with tapcard smart cards
//!
//! This crate provides the wire-level building blocks shared by the card SDK:
//!
//! - Building and serializing command APDUs, including the optional session encryption
//!   envelope (`length | crc16 | body`, AES-256-CBC)
//! - Parsing response APDUs and their trailing status words
//! - The ISO 14443-A CRC16 used for envelope integrity
//! - The asynchronous transport trait implemented by NFC/USB readers
//!
//! It has no knowledge of TLV semantics or of individual card commands.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

pub mod command;
pub mod crc;
pub mod crypto;
pub mod error;
pub mod response;
pub mod transport;

pub use command::CommandApdu;
pub use crypto::{EncryptionMode, SessionKey};
pub use error::{Error, Result};
pub use response::ResponseApdu;
pub use response::status::StatusWord;
pub use transport::{CardTransport, TagType, TransportError};

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{Bytes, BytesMut, Error, Result};

    pub use crate::command::CommandApdu;
    pub use crate::response::ResponseApdu;
    pub use crate::response::status::StatusWord;

    pub use crate::crypto::{EncryptionMode, SessionKey};

    pub use crate::transport::{CardTransport, TagType, TransportError};
}
