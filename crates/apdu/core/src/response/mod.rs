//! Response APDU definition
//!
//! A response is the card's reply body followed by a two byte status word. Encrypted bodies are
//! unwrapped explicitly with [`ResponseApdu::decrypt`].

pub mod status;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{trace, warn};

use crate::crc::crc16;
use crate::crypto::{self, SessionKey};
use crate::{Error, Result};
use status::StatusWord;

/// Response APDU received from the card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseApdu {
    /// Response body without the status word
    data: Bytes,
    /// Raw status word (SW1 | SW2)
    sw: u16,
}

impl ResponseApdu {
    /// Create a response from a body and a raw status word
    pub fn new(data: impl Into<Bytes>, sw: u16) -> Self {
        Self {
            data: data.into(),
            sw,
        }
    }

    /// Create a response carrying only a status word
    pub const fn from_status(status: StatusWord) -> Self {
        Self {
            data: Bytes::new(),
            sw: status.code(),
        }
    }

    /// Parse response from raw bytes (including status word)
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let Some((data, sw)) = raw.split_last_chunk::<2>() else {
            return Err(Error::ResponseTooShort(raw.len()));
        };

        let response = Self {
            data: Bytes::copy_from_slice(data),
            sw: u16::from_be_bytes(*sw),
        };

        trace!(
            sw = format_args!("{:#06x}", response.sw),
            data_len = response.data.len(),
            "Parsed APDU response"
        );

        Ok(response)
    }

    /// Response body
    pub const fn data(&self) -> &Bytes {
        &self.data
    }

    /// Raw status word
    pub const fn sw(&self) -> u16 {
        self.sw
    }

    /// Status word decoded from the trailing two bytes
    pub fn status_word(&self) -> StatusWord {
        StatusWord::from(self.sw)
    }

    /// Serialize back to raw bytes
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.data.len() + 2);
        buf.put_slice(&self.data);
        buf.put_u16(self.sw);
        buf.freeze()
    }

    /// Remove the session encryption envelope.
    ///
    /// A no-op without a key or when the body is shorter than one cipher block (status-only
    /// replies are never encrypted).
    ///
    /// # Arguments
    /// * `key` - Session key, if one has been established.
    ///
    /// # Returns
    /// A new response carrying the plaintext body, or [`Error::InvalidResponse`] when the
    /// declared length exceeds the decrypted buffer or the CRC does not match.
    pub fn decrypt(&self, key: Option<&SessionKey>) -> Result<Self> {
        let Some(key) = key else {
            return Ok(self.clone());
        };
        if self.data.len() < crypto::BLOCK_SIZE {
            return Ok(self.clone());
        }

        let decrypted = crypto::decrypt(key, &self.data)?;
        let Some((header, rest)) = decrypted.split_first_chunk::<4>() else {
            return Err(Error::InvalidResponse("Envelope too short"));
        };

        let length = u16::from_be_bytes([header[0], header[1]]) as usize;
        if length > rest.len() {
            warn!(length, available = rest.len(), "Declared envelope length exceeds buffer");
            return Err(Error::InvalidResponse("Envelope length exceeds buffer"));
        }

        let payload = &rest[..length];
        if crc16(payload) != [header[2], header[3]] {
            warn!("Envelope CRC mismatch");
            return Err(Error::InvalidResponse("CRC mismatch"));
        }

        Ok(Self {
            data: Bytes::copy_from_slice(payload),
            sw: self.sw,
        })
    }
}

impl TryFrom<&[u8]> for ResponseApdu {
    type Error = Error;

    fn try_from(data: &[u8]) -> Result<Self> {
        Self::from_bytes(data)
    }
}

impl From<StatusWord> for ResponseApdu {
    fn from(status: StatusWord) -> Self {
        Self::from_status(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CommandApdu, EncryptionMode};

    fn envelope(key: &SessionKey, payload: &[u8]) -> Bytes {
        CommandApdu::new(0xF2, Bytes::copy_from_slice(payload))
            .encrypt(EncryptionMode::Fast, Some(key))
            .unwrap()
            .data()
            .clone()
    }

    #[test]
    fn test_response_from_bytes() {
        let resp = ResponseApdu::from_bytes(&[0x01, 0x02, 0x03, 0x90, 0x00]).unwrap();
        assert_eq!(resp.data().as_ref(), &[0x01, 0x02, 0x03]);
        assert_eq!(resp.status_word(), StatusWord::ProcessCompleted);

        let resp = ResponseApdu::from_bytes(&[0x6A, 0x82]).unwrap();
        assert!(resp.data().is_empty());
        assert_eq!(resp.status_word(), StatusWord::FileNotFound);

        assert_eq!(
            ResponseApdu::from_bytes(&[0x01]),
            Err(Error::ResponseTooShort(1))
        );
    }

    #[test]
    fn test_response_to_bytes() {
        let resp = ResponseApdu::new(Bytes::from_static(&[0xAB]), 0x9789);
        assert_eq!(resp.to_bytes().as_ref(), &[0xAB, 0x97, 0x89]);
    }

    #[test]
    fn test_decrypt_without_key_or_short_body_is_noop() {
        let resp = ResponseApdu::new(Bytes::from_static(&[0x01, 0x01, 0x00]), 0x9000);
        assert_eq!(resp.decrypt(None).unwrap(), resp);
        assert_eq!(resp.decrypt(Some(&SessionKey::new([1; 32]))).unwrap(), resp);
    }

    #[test]
    fn test_decrypt_round_trip() {
        let key = SessionKey::new([0x11; 32]);
        let payload = hex::decode("01083bb3c19d0a8e5f2a0265000a").unwrap();
        let resp = ResponseApdu::new(envelope(&key, &payload), 0x9000);

        let plain = resp.decrypt(Some(&key)).unwrap();
        assert_eq!(plain.data().as_ref(), payload.as_slice());
        assert_eq!(plain.sw(), 0x9000);
    }

    #[test]
    fn test_decrypt_rejects_corrupted_ciphertext() {
        let key = SessionKey::new([0x22; 32]);
        let payload = hex::decode("0108cb22000000000231611048656c6c6f20776f726c64").unwrap();
        let ciphertext = envelope(&key, &payload);

        // Flip one bit in each byte of the first block, which carries the length and CRC
        for byte in 0..crypto::BLOCK_SIZE {
            let mut corrupted = ciphertext.to_vec();
            corrupted[byte] ^= 0x01;
            let resp = ResponseApdu::new(corrupted, 0x9000);
            assert!(
                matches!(resp.decrypt(Some(&key)), Err(Error::InvalidResponse(_))),
                "corruption at byte {byte} went undetected"
            );
        }
    }

    #[test]
    fn test_decrypt_with_wrong_key_fails() {
        let payload = hex::decode("0108cb220000000002316110").unwrap();
        let resp = ResponseApdu::new(envelope(&SessionKey::new([0x33; 32]), &payload), 0x9000);
        assert!(resp.decrypt(Some(&SessionKey::new([0x34; 32]))).is_err());
    }
}
