use serde::Serialize;
use tapcard_apdu_core::{CommandApdu, ResponseApdu};

use super::Instruction;
use crate::card::{UserSettings, UserSettingsMask};
use crate::tlv::{ResponseApduExt, TlvBuilder, TlvDecoder, TlvTag};
use crate::{Card, Command, Error, FirmwareVersion, PreflightReadMode, Result, SessionEnvironment};

/// Settings as stored by the card
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetUserSettingsResponse {
    /// Card that answered
    pub card_id: String,
    /// Settings the card now holds
    pub settings: UserSettings,
}

/// Write the whole user settings mask
#[derive(Debug, Clone)]
pub struct SetUserSettings {
    settings: UserSettings,
}

impl SetUserSettings {
    /// Replace the card user settings with `settings`
    pub const fn new(settings: UserSettings) -> Self {
        Self { settings }
    }
}

impl Command for SetUserSettings {
    type Response = SetUserSettingsResponse;

    fn preflight_read_mode(&self) -> PreflightReadMode {
        PreflightReadMode::ReadCardOnly
    }

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        if card.firmware_version < FirmwareVersion::USER_SETTINGS_AVAILABLE {
            return Err(Error::NotSupportedFirmwareVersion);
        }
        Ok(())
    }

    fn serialize(&self, env: &SessionEnvironment) -> Result<CommandApdu> {
        let mut tlv = TlvBuilder::new();
        tlv.append_optional(TlvTag::Pin, env.access_code.value().map(|v| v.as_slice()))?
            .append_optional(TlvTag::Pin2, env.passcode.value().map(|v| v.as_slice()))?
            .append_optional(TlvTag::CardId, env.card.as_ref().map(|c| c.card_id.as_str()))?
            .append(TlvTag::UserSettingsMask, &self.settings.mask())?;
        Ok(CommandApdu::new(Instruction::SetUserSettings, tlv.serialize()?))
    }

    fn deserialize(&self, _env: &SessionEnvironment, response: &ResponseApdu) -> Result<Self::Response> {
        let decoder = TlvDecoder::new(response.tlv_data()?);
        let mask: UserSettingsMask = decoder.decode(TlvTag::UserSettingsMask)?;
        Ok(SetUserSettingsResponse {
            card_id: decoder.decode(TlvTag::CardId)?,
            settings: mask.into(),
        })
    }

    fn update_environment(
        &self,
        env: &mut SessionEnvironment,
        response: &Self::Response,
    ) -> Result<()> {
        if let Some(card) = env.card.as_mut() {
            card.user_settings = response.settings;
        }
        Ok(())
    }
}
