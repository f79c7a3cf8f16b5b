//! Single exchange state machine shared by every card command

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tapcard_apdu_core::{CommandApdu, ResponseApdu};
use tracing::{debug, trace, warn};

use crate::status::{StatusOutcome, status_outcome};
use crate::tlv::{Tlv, TlvTag};
use crate::{Card, CardSession, CardSessionRunnable, Error, Result, SessionEnvironment, UserCodeType};

/// Card snapshot a command needs before it runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreflightReadMode {
    /// No snapshot needed
    None,
    /// Card record only
    ReadCardOnly,
    /// Card record and one wallet
    ReadWallet(u8),
    /// Card record and every wallet
    #[default]
    FullCardRead,
}

/// One request/response exchange with the card
///
/// Implementors describe the payload and how to read the reply; [`Command::transceive`] drives
/// the exchange: pre-check, passcode prompt, security delay resends, encryption escalation,
/// error mapping and user code prompts. The environment is only written by
/// [`Command::update_environment`], after the reply has been deserialized.
#[async_trait]
pub trait Command: Send + Sync + fmt::Debug {
    /// Typed reply
    type Response: Send;

    /// Snapshot required before the exchange
    fn preflight_read_mode(&self) -> PreflightReadMode {
        PreflightReadMode::FullCardRead
    }

    /// Whether the card checks the passcode for this command
    fn requires_passcode(&self) -> bool {
        false
    }

    /// Validate the card state before any I/O
    fn perform_pre_check(&self, _card: &Card) -> Result<()> {
        Ok(())
    }

    /// Reinterpret an ambiguous card error for this command
    fn map_error(&self, _card: Option<&Card>, error: Error) -> Error {
        error
    }

    /// Build the request
    fn serialize(&self, env: &SessionEnvironment) -> Result<CommandApdu>;

    /// Decode a completed reply
    fn deserialize(&self, env: &SessionEnvironment, response: &ResponseApdu)
    -> Result<Self::Response>;

    /// Apply a decoded reply to the session state
    fn update_environment(
        &self,
        _env: &mut SessionEnvironment,
        _response: &Self::Response,
    ) -> Result<()> {
        Ok(())
    }

    /// Run the exchange on `session`
    async fn transceive(&self, session: &mut CardSession) -> Result<Self::Response> {
        let name = std::any::type_name::<Self>();
        debug!(command = name, "Command started");

        let env = session.environment();
        if self.preflight_read_mode() != PreflightReadMode::None && env.card.is_none() {
            return Err(Error::MissingPreflightRead);
        }
        if env.config.handle_errors {
            if let Some(card) = env.card.as_ref() {
                self.perform_pre_check(card)?;
            }
        }
        if self.requires_passcode() && !env.passcode.is_set() {
            session.request_user_code(UserCodeType::Passcode).await?;
        }

        loop {
            let error = match exchange(self, session).await {
                Ok(response) => {
                    let env = session.environment_mut();
                    let response = self.deserialize(env, &response)?;
                    self.update_environment(env, &response)?;
                    debug!(command = name, "Command finished");
                    return Ok(response);
                }
                Err(error) => error,
            };

            let env = session.environment_mut();
            if error == Error::ExtendedLengthNotSupported && env.terminal_keys.is_some() {
                warn!(command = name, "Reader rejected extended length, dropping terminal keys");
                env.terminal_keys = None;
                continue;
            }
            if !env.config.handle_errors {
                return Err(error);
            }

            let error = self.map_error(env.card.as_ref(), error);
            match self.code_to_request(env, &error) {
                Some(kind) => {
                    debug!(command = name, %error, %kind, "Card asks for a user code");
                    session.request_user_code(kind).await?;
                }
                None => return Err(error),
            }
        }
    }

    /// Code the user has to enter to get past `error`, if any
    fn code_to_request(&self, env: &SessionEnvironment, error: &Error) -> Option<UserCodeType> {
        match error.kind() {
            Error::AccessCodeRequired | Error::WrongAccessCode => Some(UserCodeType::AccessCode),
            Error::PasscodeRequired | Error::WrongPasscode if self.requires_passcode() => {
                Some(UserCodeType::Passcode)
            }
            Error::InvalidParams if self.requires_passcode() => {
                // A card on its factory passcode rejected the request for another reason
                let card_has_default = env.card.as_ref().and_then(|card| card.is_passcode_set)
                    == Some(false);
                if card_has_default && !env.is_user_code_set(UserCodeType::Passcode) {
                    None
                } else {
                    Some(UserCodeType::Passcode)
                }
            }
            _ => None,
        }
    }
}

/// Send the request until the card completes it or fails
async fn exchange<C: Command + ?Sized>(
    command: &C,
    session: &mut CardSession,
) -> Result<ResponseApdu> {
    let apdu = command.serialize(session.environment())?;
    trace!(ins = format_args!("{:#04x}", apdu.instruction()), "Request serialized");

    loop {
        let response = session.send_apdu(&apdu).await?;
        match status_outcome(response.status_word()) {
            StatusOutcome::Completed => return Ok(response),
            StatusOutcome::NeedPause => {
                let total = session
                    .environment()
                    .card
                    .as_ref()
                    .map_or(0, |card| card.settings.security_delay);
                if let Some(remaining) = remaining_security_delay(&response) {
                    session
                        .delegate()
                        .on_security_delay(remaining, Duration::from_millis(total.into()))
                        .await;
                }
                let interval = session.environment().config.need_pause_interval;
                if !interval.is_zero() {
                    tokio::time::sleep(interval).await;
                }
            }
            StatusOutcome::Failed(error) if error.kind() == &Error::NeedEncryption => {
                let env = session.environment_mut();
                let Some(next) = env.encryption_mode.escalate() else {
                    return Err(error);
                };
                warn!(from = %env.encryption_mode, to = %next, "Card demands stronger encryption");
                env.encryption_mode = next;
                env.reset_encryption();
            }
            StatusOutcome::Failed(error) => return Err(error),
        }
    }
}

/// Remaining delay carried by a `NeedPause` reply, in milliseconds
fn remaining_security_delay(response: &ResponseApdu) -> Option<Duration> {
    let tlvs = Tlv::deserialize(response.data()).ok()?;
    let pause = tlvs.iter().find(|tlv| tlv.tag() == TlvTag::Pause)?;
    if pause.value().is_empty() || pause.value().len() > 4 {
        return None;
    }
    let millis = pause
        .value()
        .iter()
        .fold(0u64, |acc, &byte| (acc << 8) | u64::from(byte));
    Some(Duration::from_millis(millis))
}

#[async_trait]
impl<C: Command> CardSessionRunnable for C {
    type Response = C::Response;

    fn preflight_read_mode(&self) -> PreflightReadMode {
        Command::preflight_read_mode(self)
    }

    async fn run(&mut self, session: &mut CardSession) -> Result<Self::Response> {
        self.transceive(session).await
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn test_remaining_security_delay() {
        let response = ResponseApdu::new(Bytes::from_static(&[0x1C, 0x02, 0x05, 0xDC]), 0x9789);
        assert_eq!(
            remaining_security_delay(&response),
            Some(Duration::from_millis(1500))
        );

        let empty = ResponseApdu::new(Bytes::new(), 0x9789);
        assert_eq!(remaining_security_delay(&empty), None);
    }
}
