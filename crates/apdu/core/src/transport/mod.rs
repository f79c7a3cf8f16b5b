//! Transport traits for APDU communication with cards
//!
//! A transport moves raw bytes between the host and a card (NFC, USB reader). It has no
//! knowledge of TLV payloads, encryption or command semantics.

pub mod error;

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
pub use error::TransportError;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{CommandApdu, ResponseApdu, Result};

/// Physical tag family reported by the transport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagType {
    /// ISO 14443-4 card speaking APDUs
    #[default]
    Nfc,
    /// Legacy ISO 15693 tag exposing a static card record
    Slix,
}

/// Trait for asynchronous card transports
///
/// `transceive` is the single suspension point of a session: it may wait indefinitely until a
/// tag is presented.
#[async_trait]
pub trait CardTransport: Send + Sync + fmt::Debug {
    /// Send raw APDU bytes to card and return response bytes
    ///
    /// This is the method that concrete implementations provide.
    async fn do_transmit_raw(&mut self, command: &[u8]) -> std::result::Result<Bytes, TransportError>;

    /// Send raw APDU bytes to card and return response bytes, with tracing
    async fn transmit_raw(&mut self, command: &[u8]) -> std::result::Result<Bytes, TransportError> {
        trace!(command = %hex::encode(command), "Transmitting raw command");
        let result = self.do_transmit_raw(command).await;
        match &result {
            Ok(response) => {
                trace!(response = %hex::encode(response), "Received raw response");
            }
            Err(e) => {
                debug!(error = ?e, "Transport error during transmission");
            }
        }
        result
    }

    /// Send a command APDU and parse the response APDU
    async fn transceive(&mut self, command: &CommandApdu) -> Result<ResponseApdu> {
        let raw = command.to_bytes()?;
        let response = self.transmit_raw(&raw).await?;
        ResponseApdu::from_bytes(&response)
    }

    /// Start listening for a tag
    async fn open(&mut self) -> std::result::Result<(), TransportError> {
        Ok(())
    }

    /// Temporarily stop polling, keeping the session alive
    async fn pause(&mut self) {}

    /// Resume polling after [`CardTransport::pause`]
    async fn resume(&mut self) {}

    /// Stop the transport; `cancel` is true when the user aborted the session
    async fn stop(&mut self, _cancel: bool) {}

    /// Family of the currently connected tag
    fn tag_type(&self) -> TagType {
        TagType::Nfc
    }

    /// Read the static card record of a legacy tag, returned as a response APDU
    async fn read_slix_tag(&mut self) -> Result<ResponseApdu> {
        Err(TransportError::UnsupportedTag.into())
    }
}
