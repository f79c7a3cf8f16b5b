use serde::Serialize;
use tapcard_apdu_core::{CommandApdu, ResponseApdu};

use super::{FileVisibility, check_files_available};
use crate::operations::{FileDataMode, Instruction};
use crate::tlv::{ResponseApduExt, TlvBuilder, TlvDecoder, TlvTag};
use crate::{Card, Command, Error, Result, SessionEnvironment};

/// File removed from the card
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFileResponse {
    /// Card that answered
    pub card_id: String,
}

/// Delete the file in one slot
///
/// Files above the deleted slot move down by one.
#[derive(Debug, Clone, Copy)]
pub struct DeleteFile {
    file_index: u8,
}

impl DeleteFile {
    /// Delete the file in slot `file_index`
    pub const fn new(file_index: u8) -> Self {
        Self { file_index }
    }
}

impl Command for DeleteFile {
    type Response = DeleteFileResponse;

    fn requires_passcode(&self) -> bool {
        true
    }

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        check_files_available(card)
    }

    fn serialize(&self, env: &SessionEnvironment) -> Result<CommandApdu> {
        let card = env.card.as_ref().ok_or(Error::MissingPreflightRead)?;
        let mut tlv = TlvBuilder::new();
        tlv.append(TlvTag::CardId, card.card_id.as_str())?
            .append_optional(TlvTag::Pin, env.access_code.value().map(|v| v.as_slice()))?
            .append_optional(TlvTag::Pin2, env.passcode.value().map(|v| v.as_slice()))?
            .append(TlvTag::InteractionMode, &FileDataMode::DeleteFile)?
            .append(TlvTag::FileIndex, &self.file_index)?;
        Ok(CommandApdu::new(Instruction::WriteFileData, tlv.serialize()?))
    }

    fn deserialize(&self, _env: &SessionEnvironment, response: &ResponseApdu) -> Result<Self::Response> {
        let decoder = TlvDecoder::new(response.tlv_data()?);
        Ok(DeleteFileResponse {
            card_id: decoder.decode(TlvTag::CardId)?,
        })
    }
}

/// Settings change applied to a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeFileSettingsResponse {
    /// Card that answered
    pub card_id: String,
}

/// Change the visibility of one file
#[derive(Debug, Clone, Copy)]
pub struct ChangeFileSettings {
    file_index: u8,
    visibility: FileVisibility,
}

impl ChangeFileSettings {
    /// Set the visibility of the file in slot `file_index`
    pub const fn new(file_index: u8, visibility: FileVisibility) -> Self {
        Self {
            file_index,
            visibility,
        }
    }
}

impl Command for ChangeFileSettings {
    type Response = ChangeFileSettingsResponse;

    fn requires_passcode(&self) -> bool {
        true
    }

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        check_files_available(card)
    }

    fn serialize(&self, env: &SessionEnvironment) -> Result<CommandApdu> {
        let card = env.card.as_ref().ok_or(Error::MissingPreflightRead)?;
        let mut tlv = TlvBuilder::new();
        tlv.append(TlvTag::CardId, card.card_id.as_str())?
            .append_optional(TlvTag::Pin, env.access_code.value().map(|v| v.as_slice()))?
            .append_optional(TlvTag::Pin2, env.passcode.value().map(|v| v.as_slice()))?
            .append(TlvTag::InteractionMode, &FileDataMode::ChangeFileSettings)?
            .append(TlvTag::FileIndex, &self.file_index)?
            .append(
                TlvTag::FileSettings,
                &self.visibility.serialize_value(&card.firmware_version),
            )?;
        Ok(CommandApdu::new(Instruction::WriteFileData, tlv.serialize()?))
    }

    fn deserialize(&self, _env: &SessionEnvironment, response: &ResponseApdu) -> Result<Self::Response> {
        let decoder = TlvDecoder::new(response.tlv_data()?);
        Ok(ChangeFileSettingsResponse {
            card_id: decoder.decode(TlvTag::CardId)?,
        })
    }
}
