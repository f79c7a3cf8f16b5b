use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::SuccessResponse;
use crate::card::UserSettings;
use crate::operations::{SetUserCode, SetUserSettings};
use crate::{
    CardSession, CardSessionRunnable, Command, Error, FirmwareVersion, PreflightReadMode, Result,
    UserCodeType,
};

/// Which user codes differ from the factory values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckUserCodesResponse {
    /// Access code is not the factory one
    pub is_access_code_set: bool,
    /// Passcode is not the factory one
    pub is_passcode_set: bool,
}

/// Find out whether the card still uses its factory codes
///
/// Re-sends the session codes as new codes. A card that rejects the passcode has one set.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckUserCodesTask;

impl CheckUserCodesTask {
    /// Create the task
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CardSessionRunnable for CheckUserCodesTask {
    type Response = CheckUserCodesResponse;

    fn preflight_read_mode(&self) -> PreflightReadMode {
        PreflightReadMode::ReadCardOnly
    }

    async fn run(&mut self, session: &mut CardSession) -> Result<Self::Response> {
        let mut command = SetUserCode::confirm_current(session.environment());
        let is_passcode_set = match command.run(session).await {
            Ok(_) => session.environment().is_user_code_set(UserCodeType::Passcode),
            Err(error) if error.kind() == &Error::InvalidParams => {
                debug!("Card rejected the session passcode");
                true
            }
            Err(error) => return Err(error),
        };
        Ok(CheckUserCodesResponse {
            is_access_code_set: session.environment().is_user_code_set(UserCodeType::AccessCode),
            is_passcode_set,
        })
    }
}

/// Change some user settings, keeping the others as read from the card
#[derive(Debug, Clone, Copy, Default)]
pub struct SetUserSettingsTask {
    is_user_code_recovery_allowed: Option<bool>,
    is_pin_required: Option<bool>,
    is_ndef_disabled: Option<bool>,
}

impl SetUserSettingsTask {
    /// Task that changes nothing until a setting is chosen
    pub const fn new() -> Self {
        Self {
            is_user_code_recovery_allowed: None,
            is_pin_required: None,
            is_ndef_disabled: None,
        }
    }

    /// Allow or forbid resetting forgotten user codes
    pub const fn with_user_code_recovery_allowed(mut self, allowed: bool) -> Self {
        self.is_user_code_recovery_allowed = Some(allowed);
        self
    }

    /// Require the access code for every command, firmware 7 and above
    pub const fn with_pin_required(mut self, required: bool) -> Self {
        self.is_pin_required = Some(required);
        self
    }

    /// Turn NDEF records off, firmware 7 and above
    pub const fn with_ndef_disabled(mut self, disabled: bool) -> Self {
        self.is_ndef_disabled = Some(disabled);
        self
    }
}

#[async_trait]
impl CardSessionRunnable for SetUserSettingsTask {
    type Response = SuccessResponse;

    fn preflight_read_mode(&self) -> PreflightReadMode {
        PreflightReadMode::ReadCardOnly
    }

    async fn run(&mut self, session: &mut CardSession) -> Result<Self::Response> {
        let card = session
            .environment()
            .card
            .as_ref()
            .ok_or(Error::MissingPreflightRead)?;
        let extended = self.is_pin_required.is_some() || self.is_ndef_disabled.is_some();
        if extended && card.firmware_version < FirmwareVersion::EXTENDED_USER_SETTINGS_AVAILABLE {
            return Err(Error::NotSupportedFirmwareVersion);
        }

        let current = card.user_settings;
        let settings = UserSettings {
            is_user_code_recovery_allowed: self
                .is_user_code_recovery_allowed
                .unwrap_or(current.is_user_code_recovery_allowed),
            is_pin_required: self.is_pin_required.unwrap_or(current.is_pin_required),
            is_ndef_disabled: self.is_ndef_disabled.unwrap_or(current.is_ndef_disabled),
        };
        let response = SetUserSettings::new(settings).transceive(session).await?;
        Ok(SuccessResponse {
            card_id: response.card_id,
        })
    }
}
