use async_trait::async_trait;
use serde::Serialize;
use tapcard_apdu_core::{CommandApdu, ResponseApdu};
use tracing::debug;

use super::{FileToWrite, MAX_FILE_SIZE, WRITE_PART_SIZE, check_files_available, owner_wallet_index};
use crate::crypto::sha256;
use crate::operations::{FileDataMode, Instruction};
use crate::tlv::{ResponseApduExt, TlvBuilder, TlvDecoder, TlvTag};
use crate::{
    Card, CardSession, CardSessionRunnable, Command, Error, FirmwareVersion, Result,
    SessionEnvironment,
};

const USER_FILES_AVAILABLE: FirmwareVersion = FirmwareVersion::new(3, 34);

/// File written to the card
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteFileResponse {
    /// Card the file was written to
    pub card_id: String,
    /// Slot the card assigned to the file
    pub file_index: Option<u8>,
}

/// Write one file: initiate, send the data in parts, confirm with its hash
///
/// Progress is reported through [`crate::SessionViewDelegate::on_delay`] before every part.
#[derive(Debug, Clone)]
pub struct WriteFile {
    file: FileToWrite,
}

impl WriteFile {
    /// Write `file`
    pub const fn new(file: FileToWrite) -> Self {
        Self { file }
    }
}

#[async_trait]
impl CardSessionRunnable for WriteFile {
    type Response = WriteFileResponse;

    async fn run(&mut self, session: &mut CardSession) -> Result<Self::Response> {
        let card = session.environment().card.as_ref();
        if card.is_none() {
            return Err(Error::MissingPreflightRead);
        }
        let wallet_index = owner_wallet_index(card, self.file.wallet_public_key.as_deref())?;

        let initiated = WriteFileStep {
            file: &self.file,
            stage: WriteStage::Initiate { wallet_index },
        }
        .transceive(session)
        .await?;
        let file_index = initiated.file_index.unwrap_or_default();
        debug!(file_index, size = self.file.data.len(), "File write initiated");

        let total = self.file.data.len();
        for offset in (0..total).step_by(WRITE_PART_SIZE) {
            session.delegate().on_delay(total, offset, WRITE_PART_SIZE).await;
            WriteFileStep {
                file: &self.file,
                stage: WriteStage::Part { file_index, offset },
            }
            .transceive(session)
            .await?;
        }

        let confirmed = WriteFileStep {
            file: &self.file,
            stage: WriteStage::Confirm { file_index },
        }
        .transceive(session)
        .await?;
        Ok(WriteFileResponse {
            card_id: confirmed.card_id,
            file_index: Some(file_index),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteStage {
    Initiate { wallet_index: Option<u8> },
    Part { file_index: u8, offset: usize },
    Confirm { file_index: u8 },
}

impl WriteStage {
    const fn mode(&self) -> FileDataMode {
        match self {
            Self::Initiate { .. } => FileDataMode::InitiateWritingFile,
            Self::Part { .. } => FileDataMode::WriteFile,
            Self::Confirm { .. } => FileDataMode::ConfirmWritingFile,
        }
    }
}

#[derive(Debug)]
struct WriteFileStep<'a> {
    file: &'a FileToWrite,
    stage: WriteStage,
}

impl Command for WriteFileStep<'_> {
    type Response = WriteFileResponse;

    fn requires_passcode(&self) -> bool {
        true
    }

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        check_files_available(card)?;
        let firmware = card.firmware_version;
        if firmware < USER_FILES_AVAILABLE {
            return Err(Error::NotSupportedFirmwareVersion);
        }
        let before_multi_wallet = firmware < FirmwareVersion::MULTI_WALLET_AVAILABLE;
        if before_multi_wallet
            && (self.file.visibility.is_some() || self.file.wallet_public_key.is_some())
        {
            return Err(Error::FileSettingsUnsupported);
        }
        if self.file.data.len() > MAX_FILE_SIZE {
            return Err(Error::DataSizeTooLarge);
        }
        Ok(())
    }

    fn serialize(&self, env: &SessionEnvironment) -> Result<CommandApdu> {
        let card = env.card.as_ref().ok_or(Error::MissingPreflightRead)?;
        let data = &self.file.data;

        let mut tlv = TlvBuilder::new();
        tlv.append(TlvTag::CardId, card.card_id.as_str())?
            .append_optional(TlvTag::Pin, env.access_code.value().map(|v| v.as_slice()))?
            .append(TlvTag::InteractionMode, &self.stage.mode())?;

        match self.stage {
            WriteStage::Initiate { wallet_index } => {
                let size = u16::try_from(data.len()).map_err(|_| Error::DataSizeTooLarge)?;
                tlv.append(TlvTag::Size, &size)?
                    .append_optional(TlvTag::Pin2, env.passcode.value().map(|v| v.as_slice()))?
                    .append_optional(TlvTag::WalletIndex, wallet_index.as_ref())?;
                if let Some(visibility) = self.file.visibility {
                    tlv.append(
                        TlvTag::FileSettings,
                        &visibility.serialize_value(&card.firmware_version),
                    )?;
                }
            }
            WriteStage::Part { file_index, offset } => {
                let end = data.len().min(offset + WRITE_PART_SIZE);
                let part = data.get(offset..end).ok_or(Error::DataSizeTooLarge)?;
                let offset = u16::try_from(offset).map_err(|_| Error::DataSizeTooLarge)?;
                tlv.append(TlvTag::IssuerData, part)?
                    .append(TlvTag::Offset, &offset)?
                    .append(TlvTag::FileIndex, &file_index)?;
            }
            WriteStage::Confirm { file_index } => {
                tlv.append(TlvTag::FileIndex, &file_index)?
                    .append(TlvTag::CodeHash, sha256(data).as_slice())?
                    .append_optional(TlvTag::Pin2, env.passcode.value().map(|v| v.as_slice()))?;
            }
        }
        Ok(CommandApdu::new(Instruction::WriteFileData, tlv.serialize()?))
    }

    fn deserialize(&self, _env: &SessionEnvironment, response: &ResponseApdu) -> Result<Self::Response> {
        let decoder = TlvDecoder::new(response.tlv_data()?);
        Ok(WriteFileResponse {
            card_id: decoder.decode(TlvTag::CardId)?,
            file_index: decoder.decode_optional(TlvTag::FileIndex)?,
        })
    }
}
