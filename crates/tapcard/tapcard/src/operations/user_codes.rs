use async_trait::async_trait;
use tapcard_apdu_core::{CommandApdu, ResponseApdu};
use tracing::debug;

use super::Instruction;
use crate::tasks::SuccessResponse;
use crate::tlv::{ResponseApduExt, TlvBuilder, TlvDecoder, TlvTag};
use crate::{
    CardSession, CardSessionRunnable, Command, Error, PreflightReadMode, Result,
    SessionEnvironment, UserCode, UserCodeType,
};

#[derive(Debug, Clone)]
enum NewCode {
    Keep,
    Ask,
    Set(UserCode),
}

impl NewCode {
    fn entered(kind: UserCodeType, code: Option<&str>) -> Self {
        code.map_or(Self::Ask, |code| Self::Set(UserCode::new(kind, code)))
    }
}

/// Change the access code, the passcode or both
///
/// A code passed as `None` is asked from the user through
/// [`SessionViewDelegate::request_user_code_change`](crate::SessionViewDelegate::request_user_code_change)
/// before anything is sent. Setting a code to its factory value fails with
/// [`Error::AccessCodeCannotBeChanged`] or [`Error::PasscodeCannotBeChanged`]; the `reset_*`
/// constructors are the only way back to the defaults.
#[derive(Debug, Clone)]
pub struct SetUserCode {
    access_code: NewCode,
    passcode: NewCode,
    restrict_default_codes: bool,
    requires_passcode: bool,
}

impl SetUserCode {
    const fn new(access_code: NewCode, passcode: NewCode) -> Self {
        Self {
            access_code,
            passcode,
            restrict_default_codes: true,
            requires_passcode: true,
        }
    }

    /// Change the access code, keeping the passcode
    pub fn change_access_code(access_code: Option<&str>) -> Self {
        Self::new(NewCode::entered(UserCodeType::AccessCode, access_code), NewCode::Keep)
    }

    /// Change the passcode, keeping the access code
    pub fn change_passcode(passcode: Option<&str>) -> Self {
        Self::new(NewCode::Keep, NewCode::entered(UserCodeType::Passcode, passcode))
    }

    /// Change both codes
    pub fn change(access_code: Option<&str>, passcode: Option<&str>) -> Self {
        Self::new(
            NewCode::entered(UserCodeType::AccessCode, access_code),
            NewCode::entered(UserCodeType::Passcode, passcode),
        )
    }

    /// Put the access code back to its factory value
    pub fn reset_access_code() -> Self {
        let access_code = NewCode::Set(UserCode::default_for(UserCodeType::AccessCode));
        Self {
            restrict_default_codes: false,
            ..Self::new(access_code, NewCode::Keep)
        }
    }

    /// Put the passcode back to its factory value
    pub fn reset_passcode() -> Self {
        let passcode = NewCode::Set(UserCode::default_for(UserCodeType::Passcode));
        Self {
            restrict_default_codes: false,
            ..Self::new(NewCode::Keep, passcode)
        }
    }

    /// Put both codes back to their factory values
    pub fn reset_user_codes() -> Self {
        Self {
            restrict_default_codes: false,
            ..Self::new(
                NewCode::Set(UserCode::default_for(UserCodeType::AccessCode)),
                NewCode::Set(UserCode::default_for(UserCodeType::Passcode)),
            )
        }
    }

    /// Send the session codes as their own replacement, without a passcode prompt
    pub(crate) fn confirm_current(env: &SessionEnvironment) -> Self {
        Self {
            access_code: NewCode::Set(env.access_code.clone()),
            passcode: NewCode::Set(env.passcode.clone()),
            restrict_default_codes: false,
            requires_passcode: false,
        }
    }

    async fn resolve(
        code: &NewCode,
        kind: UserCodeType,
        session: &mut CardSession,
    ) -> Result<Option<UserCode>> {
        match code {
            NewCode::Keep => Ok(None),
            NewCode::Ask => session.request_new_user_code(kind).await.map(Some),
            NewCode::Set(code) => Ok(Some(code.clone())),
        }
    }
}

#[async_trait]
impl CardSessionRunnable for SetUserCode {
    type Response = SuccessResponse;

    fn preflight_read_mode(&self) -> PreflightReadMode {
        PreflightReadMode::ReadCardOnly
    }

    async fn run(&mut self, session: &mut CardSession) -> Result<Self::Response> {
        let access_code = Self::resolve(&self.access_code, UserCodeType::AccessCode, session).await?;
        let passcode = Self::resolve(&self.passcode, UserCodeType::Passcode, session).await?;

        if self.restrict_default_codes {
            if access_code.as_ref().is_some_and(UserCode::is_default) {
                return Err(Error::AccessCodeCannotBeChanged);
            }
            if passcode.as_ref().is_some_and(UserCode::is_default) {
                return Err(Error::PasscodeCannotBeChanged);
            }
        }

        SetUserCodeRequest {
            access_code,
            passcode,
            requires_passcode: self.requires_passcode,
        }
        .transceive(session)
        .await
    }
}

/// Single `SetPin` exchange with the codes already known
#[derive(Debug)]
struct SetUserCodeRequest {
    access_code: Option<UserCode>,
    passcode: Option<UserCode>,
    requires_passcode: bool,
}

impl SetUserCodeRequest {
    fn new_value<'a>(new: Option<&'a UserCode>, current: &'a UserCode) -> Option<&'a [u8]> {
        new.unwrap_or(current).value().map(|v| v.as_slice())
    }
}

impl Command for SetUserCodeRequest {
    type Response = SuccessResponse;

    fn preflight_read_mode(&self) -> PreflightReadMode {
        PreflightReadMode::ReadCardOnly
    }

    fn requires_passcode(&self) -> bool {
        self.requires_passcode
    }

    fn serialize(&self, env: &SessionEnvironment) -> Result<CommandApdu> {
        let new_access_code = Self::new_value(self.access_code.as_ref(), &env.access_code);
        let new_passcode = Self::new_value(self.passcode.as_ref(), &env.passcode);

        let mut tlv = TlvBuilder::new();
        tlv.append_optional(TlvTag::Pin, env.access_code.value().map(|v| v.as_slice()))?
            .append_optional(TlvTag::Pin2, env.passcode.value().map(|v| v.as_slice()))?
            .append_optional(TlvTag::CardId, env.card.as_ref().map(|c| c.card_id.as_str()))?
            .append_optional(TlvTag::NewPin, new_access_code)?
            .append_optional(TlvTag::NewPin2, new_passcode)?;
        Ok(CommandApdu::new(Instruction::SetPin, tlv.serialize()?))
    }

    fn deserialize(&self, _env: &SessionEnvironment, response: &ResponseApdu) -> Result<Self::Response> {
        let decoder = TlvDecoder::new(response.tlv_data()?);
        Ok(SuccessResponse {
            card_id: decoder.decode(TlvTag::CardId)?,
        })
    }

    fn update_environment(
        &self,
        env: &mut SessionEnvironment,
        _response: &Self::Response,
    ) -> Result<()> {
        if let Some(code) = &self.access_code {
            if &env.access_code != code {
                debug!("Access code changed");
                env.set_user_code(code.clone());
                env.reset_encryption();
            }
            if let Some(card) = env.card.as_mut() {
                card.is_access_code_set = card.is_access_code_set.map(|_| !code.is_default());
            }
        }
        if let Some(code) = &self.passcode {
            if &env.passcode != code {
                debug!("Passcode changed");
                env.set_user_code(code.clone());
            }
            if let Some(card) = env.card.as_mut() {
                card.is_passcode_set = card.is_passcode_set.map(|_| !code.is_default());
            }
        }
        Ok(())
    }
}
