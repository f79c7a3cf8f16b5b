//! Command APDU definition
//!
//! Cards in this family use a fixed header (`CLA = 00`, `P2 = 00`) and always send the payload
//! with an extended length field:
//!
//! ```text
//! CLA | INS | P1 | P2 | [00 | LEN_HI | LEN_LO | DATA]
//! ```
//!
//! P1 carries the [`EncryptionMode`] once the payload has been wrapped by [`CommandApdu::encrypt`].

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::crc::crc16;
use crate::crypto::{self, EncryptionMode, SessionKey};
use crate::{Error, Result};

/// Maximum payload carried by the extended length field
pub const MAX_PAYLOAD_LENGTH: usize = u16::MAX as usize;

/// Command APDU sent to the card
///
/// A command is immutable once built: [`CommandApdu::encrypt`] returns a new instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandApdu {
    /// Command class byte
    cla: u8,
    /// Instruction byte
    ins: u8,
    /// Parameter 1 (encryption mode)
    p1: u8,
    /// Parameter 2
    p2: u8,
    /// Serialized TLV payload
    data: Bytes,
}

impl CommandApdu {
    /// Class byte used by every command
    pub const DEFAULT_CLASS: u8 = 0x00;

    /// Create a new command for an instruction with a TLV payload
    pub fn new(ins: impl Into<u8>, data: impl Into<Bytes>) -> Self {
        Self {
            cla: Self::DEFAULT_CLASS,
            ins: ins.into(),
            p1: EncryptionMode::None.byte(),
            p2: 0x00,
            data: data.into(),
        }
    }

    /// Replace the P1/P2 parameters
    pub fn with_params(mut self, p1: u8, p2: u8) -> Self {
        self.p1 = p1;
        self.p2 = p2;
        self
    }

    /// Command class (CLA)
    pub const fn class(&self) -> u8 {
        self.cla
    }

    /// Instruction code (INS)
    pub const fn instruction(&self) -> u8 {
        self.ins
    }

    /// First parameter (P1)
    pub const fn p1(&self) -> u8 {
        self.p1
    }

    /// Second parameter (P2)
    pub const fn p2(&self) -> u8 {
        self.p2
    }

    /// Command payload
    pub const fn data(&self) -> &Bytes {
        &self.data
    }

    /// Whether the payload is wrapped in the encryption envelope
    pub const fn is_encrypted(&self) -> bool {
        self.p1 != EncryptionMode::None.byte()
    }

    /// Convert to raw APDU bytes
    pub fn to_bytes(&self) -> Result<Bytes> {
        if self.data.len() > MAX_PAYLOAD_LENGTH {
            return Err(Error::PayloadTooLong(self.data.len()));
        }

        let mut buffer = BytesMut::with_capacity(self.command_length());

        // Header: CLA, INS, P1, P2
        buffer.put_u8(self.cla);
        buffer.put_u8(self.ins);
        buffer.put_u8(self.p1);
        buffer.put_u8(self.p2);

        // Extended Lc and data, omitted for an empty payload
        if !self.data.is_empty() {
            buffer.put_u8(0x00);
            buffer.put_u16(self.data.len() as u16);
            buffer.put_slice(&self.data);
        }

        Ok(buffer.freeze())
    }

    /// Calculate length of serialized command
    pub fn command_length(&self) -> usize {
        if self.data.is_empty() {
            4
        } else {
            4 + 3 + self.data.len()
        }
    }

    /// Parse a command from raw APDU bytes
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let (header, rest) = raw
            .split_first_chunk::<4>()
            .ok_or(Error::InvalidResponse("Command header too short"))?;
        let [cla, ins, p1, p2] = *header;

        let data = match rest {
            [] => Bytes::new(),
            [0x00, hi, lo, data @ ..] => {
                let len = u16::from_be_bytes([*hi, *lo]) as usize;
                if data.len() != len {
                    return Err(Error::InvalidResponse("Command length mismatch"));
                }
                Bytes::copy_from_slice(data)
            }
            _ => return Err(Error::InvalidResponse("Invalid command length field")),
        };

        Ok(Self {
            cla,
            ins,
            p1,
            p2,
            data,
        })
    }

    /// Wrap the payload in the session encryption envelope.
    ///
    /// The envelope is `len_u16_be | crc16(payload) | payload`, encrypted with the session key.
    /// This is a no-op when there is no key, the mode is [`EncryptionMode::None`], or the
    /// command is already encrypted.
    ///
    /// # Arguments
    /// * `mode` - Negotiated encryption mode, written into P1.
    /// * `key` - Session key, if one has been established.
    ///
    /// # Returns
    /// A new command carrying the encrypted payload.
    pub fn encrypt(&self, mode: EncryptionMode, key: Option<&SessionKey>) -> Result<Self> {
        let Some(key) = key else {
            return Ok(self.clone());
        };
        if mode == EncryptionMode::None || self.is_encrypted() {
            return Ok(self.clone());
        }

        let len = u16::try_from(self.data.len()).map_err(|_| Error::PayloadTooLong(self.data.len()))?;

        let mut plaintext = BytesMut::with_capacity(self.data.len() + 4);
        plaintext.put_u16(len);
        plaintext.put_slice(&crc16(&self.data));
        plaintext.put_slice(&self.data);

        let ciphertext = crypto::encrypt(key, &plaintext);
        trace!(
            ins = format_args!("{:#04x}", self.ins),
            mode = %mode,
            plain_len = plaintext.len(),
            cipher_len = ciphertext.len(),
            "Encrypted command payload"
        );

        Ok(Self {
            cla: self.cla,
            ins: self.ins,
            p1: mode.byte(),
            p2: self.p2,
            data: Bytes::from(ciphertext),
        })
    }
}
