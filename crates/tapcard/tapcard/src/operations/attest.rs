use serde::Serialize;
use tapcard_apdu_core::{CommandApdu, ResponseApdu};
use tracing::warn;

use super::Instruction;
use crate::crypto::{random_bytes, verify_secp256k1};
use crate::tlv::{ResponseApduExt, TlvBuilder, TlvDecoder, TlvTag};
use crate::{Command, Error, Result, SessionEnvironment};

const CHALLENGE_SIZE: usize = 16;

/// Card key signature over the challenge and a card salt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestCardKeyResponse {
    /// Card that answered
    pub card_id: String,
    /// Salt chosen by the card
    #[serde(with = "hex")]
    pub salt: Vec<u8>,
    /// Signature of `challenge || salt` by the card key
    #[serde(with = "hex")]
    pub card_signature: Vec<u8>,
    /// Challenge that was sent
    #[serde(with = "hex")]
    pub challenge: Vec<u8>,
}

/// Prove the card holds the private half of its card key
#[derive(Debug, Clone)]
pub struct AttestCardKey {
    challenge: Vec<u8>,
}

impl AttestCardKey {
    /// Attest against a random challenge
    pub fn new() -> Self {
        Self {
            challenge: random_bytes(CHALLENGE_SIZE),
        }
    }

    /// Attest against a caller supplied challenge
    pub const fn with_challenge(challenge: Vec<u8>) -> Self {
        Self { challenge }
    }
}

impl Default for AttestCardKey {
    fn default() -> Self {
        Self::new()
    }
}

impl Command for AttestCardKey {
    type Response = AttestCardKeyResponse;

    fn serialize(&self, env: &SessionEnvironment) -> Result<CommandApdu> {
        let mut tlv = TlvBuilder::new();
        tlv.append_optional(TlvTag::Pin, env.access_code.value().map(|v| v.as_slice()))?
            .append_optional(TlvTag::CardId, env.card.as_ref().map(|c| c.card_id.as_str()))?
            .append(TlvTag::Challenge, &self.challenge)?;
        Ok(CommandApdu::new(Instruction::AttestCardKey, tlv.serialize()?))
    }

    fn deserialize(&self, env: &SessionEnvironment, response: &ResponseApdu) -> Result<Self::Response> {
        let card = env.card.as_ref().ok_or(Error::MissingPreflightRead)?;
        let decoder = TlvDecoder::new(response.tlv_data()?);
        let response = AttestCardKeyResponse {
            card_id: decoder.decode(TlvTag::CardId)?,
            salt: decoder.decode(TlvTag::Salt)?,
            card_signature: decoder.decode(TlvTag::CardSignature)?,
            challenge: self.challenge.clone(),
        };

        let message = [self.challenge.as_slice(), response.salt.as_slice()].concat();
        if !verify_secp256k1(&card.card_public_key, &message, &response.card_signature)? {
            warn!(card_id = %response.card_id, "Card key signature does not verify");
            return Err(Error::CardVerificationFailed);
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use k256::ecdsa::{Signature, SigningKey, signature::Signer};

    use super::*;
    use crate::Config;
    use crate::card::tests::test_card;

    fn reply(salt: &[u8], signature: &[u8]) -> ResponseApdu {
        let mut tlv = TlvBuilder::new();
        tlv.append(TlvTag::CardId, "CB79000000018201")
            .unwrap()
            .append(TlvTag::Salt, &salt.to_vec())
            .unwrap()
            .append(TlvTag::CardSignature, &signature.to_vec())
            .unwrap();
        ResponseApdu::new(tlv.serialize().unwrap(), 0x9000)
    }

    #[test]
    fn test_card_key_signature_is_verified() {
        let signing_key = SigningKey::from_slice(&[0x22; 32]).unwrap();
        let mut card = test_card("4.52r");
        card.card_public_key = signing_key.verifying_key().to_sec1_bytes().to_vec();
        let mut env = SessionEnvironment::new(Config::default());
        env.card = Some(card);

        let command = AttestCardKey::with_challenge(vec![0xA0; 16]);
        assert_eq!(command.serialize(&env).unwrap().instruction(), 0xF3);

        let salt = vec![0x5A; 16];
        let signature: Signature = signing_key.sign(&[[0xA0; 16].as_slice(), salt.as_slice()].concat());
        let attested = command.deserialize(&env, &reply(&salt, &signature.to_bytes())).unwrap();
        assert_eq!(attested.challenge, vec![0xA0; 16]);

        let other = AttestCardKey::with_challenge(vec![0xA1; 16]);
        assert_eq!(
            other.deserialize(&env, &reply(&salt, &signature.to_bytes())),
            Err(Error::CardVerificationFailed)
        );
    }

    #[test]
    fn test_random_challenges_differ() {
        assert_eq!(AttestCardKey::new().challenge.len(), CHALLENGE_SIZE);
        assert_ne!(AttestCardKey::new().challenge, AttestCardKey::new().challenge);
    }
}
