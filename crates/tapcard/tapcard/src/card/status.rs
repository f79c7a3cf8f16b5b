use serde::Serialize;

use crate::{
    Error, Result,
    tlv::{TlvDecode, TlvEncode, TlvTag, TlvValueType, decode_uint, ensure_decodable, ensure_encodable},
};

/// Lifecycle status of the card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CardStatus {
    /// Not yet personalized at the factory
    NotPersonalized = 0,
    /// No wallet created
    Empty = 1,
    /// Wallet created
    Loaded = 2,
    /// Wallet purged, card unusable
    Purged = 3,
}

/// Status of a wallet slot
///
/// Slots only move forward: `Empty -> Loaded -> Purged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum WalletStatus {
    /// Free slot
    Empty = 1,
    /// Key generated
    Loaded = 2,
    /// Key destroyed
    Purged = 3,
}

impl WalletStatus {
    /// Whether the slot holds a usable key
    pub const fn is_available(&self) -> bool {
        matches!(self, Self::Loaded)
    }

    /// Whether moving to `next` keeps the lifecycle order
    pub fn can_transition_to(&self, next: Self) -> bool {
        next >= *self
    }
}

impl From<CardStatus> for WalletStatus {
    fn from(status: CardStatus) -> Self {
        match status {
            CardStatus::NotPersonalized | CardStatus::Empty => Self::Empty,
            CardStatus::Loaded => Self::Loaded,
            CardStatus::Purged => Self::Purged,
        }
    }
}

fn status_code(tag: TlvTag, value: &[u8]) -> Result<u32> {
    ensure_decodable(tag, &[TlvValueType::Status])?;
    decode_uint(tag, value)
}

impl TlvDecode for CardStatus {
    fn decode(tag: TlvTag, value: &[u8]) -> Result<Self> {
        match status_code(tag, value)? {
            0 => Ok(Self::NotPersonalized),
            1 => Ok(Self::Empty),
            2 => Ok(Self::Loaded),
            3 => Ok(Self::Purged),
            other => Err(Error::DecodingFailed(format!("{tag}: unknown card status {other}"))),
        }
    }
}

impl TlvDecode for WalletStatus {
    fn decode(tag: TlvTag, value: &[u8]) -> Result<Self> {
        match status_code(tag, value)? {
            1 => Ok(Self::Empty),
            2 => Ok(Self::Loaded),
            3 => Ok(Self::Purged),
            other => Err(Error::DecodingFailed(format!(
                "{tag}: unknown wallet status {other}"
            ))),
        }
    }
}

impl TlvEncode for CardStatus {
    fn encode(&self, tag: TlvTag) -> Result<Vec<u8>> {
        ensure_encodable(tag, &[TlvValueType::Status])?;
        Ok(vec![*self as u8])
    }
}

impl TlvEncode for WalletStatus {
    fn encode(&self, tag: TlvTag) -> Result<Vec<u8>> {
        ensure_encodable(tag, &[TlvValueType::Status])?;
        Ok(vec![*self as u8])
    }
}
