//! Files stored on the card
//!
//! Files are written in parts of [`WRITE_PART_SIZE`] bytes and read back by offset. Their
//! settings byte carries visibility and permanence; cards before 4.0 prefix it with a zero byte.

mod delete;
mod read;
mod write;

pub use delete::{ChangeFileSettings, ChangeFileSettingsResponse, DeleteFile, DeleteFileResponse};
pub use read::{ReadFile, ReadFileChecksum, ReadFileChecksumResponse, ReadFileResponse};
pub use write::{WriteFile, WriteFileResponse};

use serde::{Deserialize, Serialize};

use crate::card::Card;
use crate::{Error, FirmwareVersion, Result};

/// Bytes sent per write request
pub const WRITE_PART_SIZE: usize = 900;

/// Largest file the card accepts
pub const MAX_FILE_SIZE: usize = 48 * 1024;

const IS_PUBLIC: u8 = 0x01;
const IS_PERMANENT: u8 = 0x10;

/// Who may read a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileVisibility {
    /// Readable with the access code
    Public,
    /// Readable with the passcode only
    #[default]
    Private,
}

impl FileVisibility {
    const fn raw(self) -> u8 {
        match self {
            Self::Public => IS_PUBLIC,
            Self::Private => 0x00,
        }
    }

    /// Settings bytes for the card firmware
    pub fn serialize_value(self, firmware: &FirmwareVersion) -> Vec<u8> {
        if *firmware < FirmwareVersion::MULTI_WALLET_AVAILABLE {
            vec![0x00, self.raw()]
        } else {
            vec![self.raw()]
        }
    }
}

/// Settings of a stored file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSettings {
    /// File cannot be deleted
    pub is_permanent: bool,
    /// Who may read the file
    pub visibility: FileVisibility,
}

impl FileSettings {
    /// Decode the settings bytes
    ///
    /// Two bytes is the pre-4.0 layout, which has no permanence flag.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let Some(&raw) = data.last() else {
            return Err(Error::DecodingFailed("empty file settings".to_string()));
        };
        let visibility = if raw & IS_PUBLIC != 0 {
            FileVisibility::Public
        } else {
            FileVisibility::Private
        };
        Ok(Self {
            is_permanent: data.len() != 2 && raw & IS_PERMANENT != 0,
            visibility,
        })
    }
}

/// A file read from the card
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    /// Slot of the file
    pub file_index: u8,
    /// File settings, when the card reported them
    pub file_settings: Option<FileSettings>,
    /// File content
    #[serde(with = "hex")]
    pub file_data: Vec<u8>,
}

impl From<ReadFileResponse> for File {
    fn from(response: ReadFileResponse) -> Self {
        Self {
            file_index: response.file_index,
            file_settings: response.settings,
            file_data: response.file_data,
        }
    }
}

/// A file to write, authorized by the user's passcode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileToWrite {
    /// File content
    #[serde(with = "hex")]
    pub data: Vec<u8>,
    /// Visibility, firmware 4.0 and later
    #[serde(default)]
    pub visibility: Option<FileVisibility>,
    /// Wallet the file is attached to, firmware 4.0 and later
    #[serde(default, with = "crate::card::hex_option")]
    pub wallet_public_key: Option<Vec<u8>>,
}

impl FileToWrite {
    /// A private file not attached to any wallet
    pub const fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            visibility: None,
            wallet_public_key: None,
        }
    }

    /// Set the visibility
    pub const fn with_visibility(mut self, visibility: FileVisibility) -> Self {
        self.visibility = Some(visibility);
        self
    }

    /// Attach the file to a wallet
    pub fn with_wallet(mut self, public_key: Vec<u8>) -> Self {
        self.wallet_public_key = Some(public_key);
        self
    }
}

/// Checks shared by every file command
fn check_files_available(card: &Card) -> Result<()> {
    if card.firmware_version < FirmwareVersion::FILES_AVAILABLE {
        return Err(Error::NotSupportedFirmwareVersion);
    }
    if !card.settings.is_files_allowed() {
        return Err(Error::FilesDisabled);
    }
    Ok(())
}

/// Slot of the wallet with `public_key`, if one was given
fn owner_wallet_index(card: Option<&Card>, public_key: Option<&[u8]>) -> Result<Option<u8>> {
    let Some(public_key) = public_key else {
        return Ok(None);
    };
    card.and_then(|card| card.wallet(public_key))
        .map(|wallet| Some(wallet.index))
        .ok_or(Error::WalletNotFound)
}
