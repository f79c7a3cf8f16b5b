//! Card commands
//!
//! Each type here describes one exchange (or a short loop of exchanges) with the card. Commands
//! that span several requests, such as signing in chunks or writing a file in parts, keep their
//! progress in explicit state and drive private single-exchange commands.

mod attest;
mod files;
mod open_session;
mod read;
mod sign;
mod user_codes;
mod user_settings;
mod wallet;

pub use attest::{AttestCardKey, AttestCardKeyResponse};
pub use files::{
    ChangeFileSettings, ChangeFileSettingsResponse, DeleteFile, DeleteFileResponse, File,
    FileSettings, FileToWrite, FileVisibility, MAX_FILE_SIZE, ReadFile, ReadFileChecksum,
    ReadFileChecksumResponse, ReadFileResponse, WRITE_PART_SIZE, WriteFile, WriteFileResponse,
};
pub use open_session::{OpenSession, OpenSessionResponse};
pub use read::{Read, ReadWallet, ReadWalletResponse, ReadWalletsList, ReadWalletsListResponse};
pub use sign::{Sign, SignResponse};
pub use user_codes::SetUserCode;
pub use user_settings::{SetUserSettings, SetUserSettingsResponse};
pub use wallet::{
    CheckWallet, CheckWalletResponse, CreateWallet, CreateWalletResponse, PurgeWallet,
    PurgeWalletResponse,
};

use crate::{
    Error, Result,
    tlv::{TlvDecode, TlvEncode, TlvTag, TlvValueType, decode_uint, ensure_decodable, ensure_encodable},
};

/// Instruction byte of each card command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Instruction {
    /// Card, wallet list and single wallet reads
    Read = 0xF2,
    /// Session key agreement
    OpenSession = 0xFF,
    /// Wallet creation
    CreateWallet = 0xF8,
    /// Wallet key check
    CheckWallet = 0xF9,
    /// Wallet removal
    PurgeWallet = 0xFC,
    /// Hash signing
    Sign = 0xFB,
    /// Proof of the card key
    AttestCardKey = 0xF3,
    /// Access code and passcode changes
    SetPin = 0xFA,
    /// User settings mask writes
    SetUserSettings = 0xE6,
    /// File writes, deletes and settings changes
    WriteFileData = 0xD0,
    /// File reads
    ReadFileData = 0xD1,
}

impl From<Instruction> for u8 {
    fn from(ins: Instruction) -> Self {
        ins as Self
    }
}

/// What a `Read` request returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum ReadMode {
    Card = 0x01,
    WalletsList = 0x02,
    Wallet = 0x03,
}

/// Step of a file data request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum FileDataMode {
    InitiateWritingFile = 0x01,
    WriteFile = 0x02,
    ConfirmWritingFile = 0x03,
    ReadFileHash = 0x04,
    DeleteFile = 0x05,
    ChangeFileSettings = 0x06,
}

macro_rules! impl_interaction_mode {
    ($ty:ty { $($variant:ident),* $(,)? }) => {
        impl TlvEncode for $ty {
            fn encode(&self, tag: TlvTag) -> Result<Vec<u8>> {
                ensure_encodable(tag, &[TlvValueType::InteractionMode])?;
                Ok(vec![*self as u8])
            }
        }

        impl TlvDecode for $ty {
            fn decode(tag: TlvTag, value: &[u8]) -> Result<Self> {
                ensure_decodable(tag, &[TlvValueType::InteractionMode])?;
                match decode_uint(tag, value)? {
                    $( raw if raw == Self::$variant as u32 => Ok(Self::$variant), )*
                    raw => Err(Error::DecodingFailed(format!("{tag}: unknown mode {raw}"))),
                }
            }
        }
    };
}

impl_interaction_mode!(ReadMode { Card, WalletsList, Wallet });
impl_interaction_mode!(FileDataMode {
    InitiateWritingFile,
    WriteFile,
    ConfirmWritingFile,
    ReadFileHash,
    DeleteFile,
    ChangeFileSettings,
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interaction_modes() {
        assert_eq!(ReadMode::WalletsList.encode(TlvTag::InteractionMode).unwrap(), vec![0x02]);
        assert_eq!(
            FileDataMode::decode(TlvTag::InteractionMode, &[0x05]).unwrap(),
            FileDataMode::DeleteFile
        );
        assert!(FileDataMode::decode(TlvTag::InteractionMode, &[0x04]).is_err());
        assert_eq!(
            ReadMode::Card.encode(TlvTag::WalletIndex),
            Err(Error::EncodingFailedTypeMismatch(TlvTag::WalletIndex))
        );
    }
}
