use tapcard_apdu_core::{CommandApdu, EncryptionMode, ResponseApdu};

use super::Instruction;
use crate::tlv::{ResponseApduExt, TlvBuilder, TlvDecoder, TlvTag};
use crate::{Command, PreflightReadMode, Result, SessionEnvironment};

/// Card half of the session key agreement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenSessionResponse {
    /// Card key half
    pub session_key_b: Vec<u8>,
    /// Card UID, salt of the protocol key
    pub uid: Vec<u8>,
}

/// Start an encrypted session
///
/// Sent in plaintext with the requested mode in P1. The session derives the key from the reply;
/// this command never runs through the regular exchange loop.
#[derive(Debug, Clone)]
pub struct OpenSession {
    mode: EncryptionMode,
    session_key_a: Vec<u8>,
}

impl OpenSession {
    /// Request a session in `mode` with the terminal key half
    pub const fn new(mode: EncryptionMode, session_key_a: Vec<u8>) -> Self {
        Self {
            mode,
            session_key_a,
        }
    }
}

impl Command for OpenSession {
    type Response = OpenSessionResponse;

    fn preflight_read_mode(&self) -> PreflightReadMode {
        PreflightReadMode::None
    }

    fn serialize(&self, _env: &SessionEnvironment) -> Result<CommandApdu> {
        let mut tlv = TlvBuilder::new();
        tlv.append(TlvTag::SessionKeyA, &self.session_key_a)?;
        Ok(CommandApdu::new(Instruction::OpenSession, tlv.serialize()?)
            .with_params(self.mode.byte(), 0x00))
    }

    fn deserialize(
        &self,
        _env: &SessionEnvironment,
        response: &ResponseApdu,
    ) -> Result<Self::Response> {
        let decoder = TlvDecoder::new(response.tlv_data()?);
        Ok(OpenSessionResponse {
            session_key_b: decoder.decode(TlvTag::SessionKeyB)?,
            uid: decoder.decode(TlvTag::Uid)?,
        })
    }
}
