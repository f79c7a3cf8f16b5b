use async_trait::async_trait;
use serde::Serialize;
use tapcard_apdu_core::{CommandApdu, ResponseApdu};
use tracing::trace;

use super::{FileSettings, owner_wallet_index};
use crate::card::hex_option;
use crate::operations::{FileDataMode, Instruction};
use crate::tlv::{ResponseApduExt, TlvBuilder, TlvDecoder, TlvTag};
use crate::{
    Card, CardSession, CardSessionRunnable, Command, Error, FirmwareVersion, Result,
    SessionEnvironment,
};

/// A file read back from the card
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadFileResponse {
    /// Card that answered
    pub card_id: String,
    /// Total file size announced by the card
    pub size: Option<u16>,
    /// File content read so far
    #[serde(with = "hex")]
    pub file_data: Vec<u8>,
    /// Slot of the file
    pub file_index: u8,
    /// File settings
    pub settings: Option<FileSettings>,
    /// Index of the file owner
    pub owner_index: Option<u8>,
    /// Public key of the file owner
    #[serde(with = "hex_option")]
    pub owner_public_key: Option<Vec<u8>>,
    /// Wallet the file is attached to
    pub wallet_index: Option<u8>,
}

impl ReadFileResponse {
    fn is_complete(&self) -> bool {
        self.size
            .is_none_or(|size| self.file_data.len() >= usize::from(size))
    }

    /// Merge a part into the file read so far
    fn update(&mut self, part: Self) {
        self.card_id = part.card_id;
        self.file_index = part.file_index;
        self.size = part.size.or(self.size);
        self.settings = part.settings.or(self.settings);
        self.owner_index = part.owner_index.or(self.owner_index);
        if part.owner_public_key.is_some() {
            self.owner_public_key = part.owner_public_key;
        }
        self.wallet_index = part.wallet_index.or(self.wallet_index);
        self.file_data.extend(part.file_data);
    }
}

/// Read one file, following offsets until the announced size is reached
#[derive(Debug, Clone)]
pub struct ReadFile {
    file_index: u8,
    read_private: bool,
    wallet_public_key: Option<Vec<u8>>,
}

impl ReadFile {
    /// Read the file in slot `file_index`
    pub const fn new(file_index: u8) -> Self {
        Self {
            file_index,
            read_private: false,
            wallet_public_key: None,
        }
    }

    /// Read private files too; the card then checks the passcode
    pub const fn read_private(mut self, read_private: bool) -> Self {
        self.read_private = read_private;
        self
    }

    /// Only read files attached to the wallet with `public_key`
    pub fn with_wallet(mut self, public_key: Vec<u8>) -> Self {
        self.wallet_public_key = Some(public_key);
        self
    }
}

#[async_trait]
impl CardSessionRunnable for ReadFile {
    type Response = ReadFileResponse;

    async fn run(&mut self, session: &mut CardSession) -> Result<Self::Response> {
        let card = session.environment().card.as_ref();
        if card.is_none() {
            return Err(Error::MissingPreflightRead);
        }
        let wallet_index = owner_wallet_index(card, self.wallet_public_key.as_deref())?;

        let mut file = ReadFileResponse::default();
        loop {
            let part = ReadFilePart {
                file_index: self.file_index,
                read_private: self.read_private,
                wallet_index,
                offset: file.file_data.len(),
            }
            .transceive(session)
            .await?;

            let received = part.file_data.len();
            file.update(part);
            trace!(received, total = ?file.size, "File part read");
            if file.is_complete() {
                break;
            }
            if received == 0 {
                return Err(Error::InvalidResponse("file read made no progress".to_string()));
            }
        }
        if file.wallet_index.is_none() {
            file.wallet_index = wallet_index;
        }
        Ok(file)
    }
}

#[derive(Debug)]
struct ReadFilePart {
    file_index: u8,
    read_private: bool,
    wallet_index: Option<u8>,
    offset: usize,
}

impl Command for ReadFilePart {
    type Response = ReadFileResponse;

    fn requires_passcode(&self) -> bool {
        self.read_private
    }

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        if card.firmware_version < FirmwareVersion::FILES_AVAILABLE {
            return Err(Error::NotSupportedFirmwareVersion);
        }
        Ok(())
    }

    fn serialize(&self, env: &SessionEnvironment) -> Result<CommandApdu> {
        let card = env.card.as_ref().ok_or(Error::MissingPreflightRead)?;
        let offset = u16::try_from(self.offset).map_err(|_| Error::DataSizeTooLarge)?;

        let mut tlv = TlvBuilder::new();
        tlv.append(TlvTag::CardId, card.card_id.as_str())?
            .append(TlvTag::FileIndex, &self.file_index)?
            .append_optional(TlvTag::WalletIndex, self.wallet_index.as_ref())?
            .append(TlvTag::Offset, &offset)?;
        if self.read_private {
            tlv.append_optional(TlvTag::Pin, env.access_code.value().map(|v| v.as_slice()))?
                .append_optional(TlvTag::Pin2, env.passcode.value().map(|v| v.as_slice()))?;
        } else if card.firmware_version < FirmwareVersion::MULTI_WALLET_AVAILABLE {
            tlv.append_optional(TlvTag::Pin, env.access_code.value().map(|v| v.as_slice()))?;
        }
        Ok(CommandApdu::new(Instruction::ReadFileData, tlv.serialize()?))
    }

    fn deserialize(&self, _env: &SessionEnvironment, response: &ResponseApdu) -> Result<Self::Response> {
        let decoder = TlvDecoder::new(response.tlv_data()?);
        let settings = decoder
            .decode_optional::<Vec<u8>>(TlvTag::FileSettings)?
            .map(|raw| FileSettings::from_bytes(&raw))
            .transpose()?;

        Ok(ReadFileResponse {
            card_id: decoder.decode(TlvTag::CardId)?,
            size: decoder.decode_optional(TlvTag::Size)?,
            file_data: decoder.decode_optional(TlvTag::IssuerData)?.unwrap_or_default(),
            file_index: decoder.decode_optional(TlvTag::FileIndex)?.unwrap_or_default(),
            settings,
            owner_index: decoder.decode_optional(TlvTag::FileOwnerIndex)?,
            owner_public_key: decoder.decode_optional(TlvTag::IssuerPublicKey)?,
            wallet_index: decoder.decode_optional(TlvTag::WalletIndex)?,
        })
    }
}

/// SHA-256 of a stored file, as computed by the card
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadFileChecksumResponse {
    /// Card that answered
    pub card_id: String,
    /// Hash of the file data
    #[serde(with = "hex")]
    pub checksum: Vec<u8>,
    /// Slot of the file
    pub file_index: Option<u8>,
}

/// Ask the card for the hash of a file without reading it
#[derive(Debug, Clone)]
pub struct ReadFileChecksum {
    file_index: u8,
    read_private: bool,
}

impl ReadFileChecksum {
    /// Hash of the file in slot `file_index`
    pub const fn new(file_index: u8) -> Self {
        Self {
            file_index,
            read_private: false,
        }
    }

    /// Include private files; the card then checks the passcode
    pub const fn read_private(mut self, read_private: bool) -> Self {
        self.read_private = read_private;
        self
    }
}

impl Command for ReadFileChecksum {
    type Response = ReadFileChecksumResponse;

    fn requires_passcode(&self) -> bool {
        self.read_private
    }

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        if card.firmware_version < FirmwareVersion::FILES_AVAILABLE {
            return Err(Error::NotSupportedFirmwareVersion);
        }
        Ok(())
    }

    fn serialize(&self, env: &SessionEnvironment) -> Result<CommandApdu> {
        let mut tlv = TlvBuilder::new();
        tlv.append_optional(TlvTag::Pin, env.access_code.value().map(|v| v.as_slice()))?;
        if self.read_private {
            tlv.append_optional(TlvTag::Pin2, env.passcode.value().map(|v| v.as_slice()))?;
        }
        tlv.append_optional(TlvTag::CardId, env.card.as_ref().map(|c| c.card_id.as_str()))?
            .append(TlvTag::FileIndex, &self.file_index)?
            .append(TlvTag::InteractionMode, &FileDataMode::ReadFileHash)?;
        Ok(CommandApdu::new(Instruction::ReadFileData, tlv.serialize()?))
    }

    fn deserialize(&self, _env: &SessionEnvironment, response: &ResponseApdu) -> Result<Self::Response> {
        let decoder = TlvDecoder::new(response.tlv_data()?);
        Ok(ReadFileChecksumResponse {
            card_id: decoder.decode(TlvTag::CardId)?,
            checksum: decoder.decode(TlvTag::CodeHash)?,
            file_index: decoder.decode_optional(TlvTag::FileIndex)?,
        })
    }
}
