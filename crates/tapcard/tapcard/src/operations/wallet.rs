use serde::Serialize;
use tapcard_apdu_core::{CommandApdu, ResponseApdu};
use tracing::warn;

use super::Instruction;
use crate::card::{
    SigningMethod, SigningMethodCode, WalletSettings, WalletSettingsCode, WalletSettingsMask,
    WalletStatus,
};
use crate::crypto::{random_bytes, verify_secp256k1};
use crate::tlv::{ResponseApduExt, TlvBuilder, TlvDecoder, TlvTag};
use crate::{
    Card, CardWallet, Command, EllipticCurve, Error, FirmwareVersion, Result, SessionEnvironment,
};

const CHALLENGE_SIZE: usize = 16;

/// Access code, passcode and card id, the head of every wallet request
fn protected_request(env: &SessionEnvironment) -> Result<TlvBuilder> {
    let mut tlv = TlvBuilder::new();
    tlv.append_optional(TlvTag::Pin, env.access_code.value().map(|v| v.as_slice()))?
        .append_optional(TlvTag::Pin2, env.passcode.value().map(|v| v.as_slice()))?
        .append_optional(TlvTag::CardId, env.card.as_ref().map(|c| c.card_id.as_str()))?;
    Ok(tlv)
}

/// Lowest slot without a wallet
fn next_free_index(card: &Card) -> Result<u8> {
    let max = card.settings.max_wallets_count;
    (0..max)
        .find(|index| card.wallet_by_index(*index).is_none())
        .ok_or(if max == 1 {
            Error::AlreadyCreated
        } else {
            Error::MaxNumberOfWalletsCreated
        })
}

fn wallet_index(env: &SessionEnvironment, public_key: &[u8]) -> Result<u8> {
    env.card
        .as_ref()
        .and_then(|card| card.wallet(public_key))
        .map(|wallet| wallet.index)
        .ok_or(Error::WalletNotFound)
}

/// Wallet created on the card
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWalletResponse {
    /// Card the wallet was created on
    pub card_id: String,
    /// The new wallet
    pub wallet: CardWallet,
}

/// Generate a key pair in the lowest free slot
///
/// The private key never leaves the card. Cards before 4.0 have a single slot whose settings are
/// fixed at personalization, so the requested configuration has to match them.
#[derive(Debug, Clone)]
pub struct CreateWallet {
    curve: EllipticCurve,
    is_permanent: bool,
}

impl CreateWallet {
    /// Create a wallet on `curve`
    pub const fn new(curve: EllipticCurve) -> Self {
        Self {
            curve,
            is_permanent: false,
        }
    }

    /// Forbid purging the wallet
    pub const fn permanent(mut self, is_permanent: bool) -> Self {
        self.is_permanent = is_permanent;
        self
    }

    const fn signing_method() -> SigningMethodCode {
        SigningMethodCode::SignHash
    }
}

impl Command for CreateWallet {
    type Response = CreateWalletResponse;

    fn requires_passcode(&self) -> bool {
        true
    }

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        let multi_wallet = card.firmware_version >= FirmwareVersion::MULTI_WALLET_AVAILABLE;
        if multi_wallet && !card.settings.is_select_blockchain_allowed() {
            return Err(Error::WalletCannotBeCreated);
        }
        if !card.supported_curves.contains(&self.curve) {
            return Err(Error::UnsupportedCurve);
        }
        if !multi_wallet {
            if self.is_permanent != card.settings.is_permanent_wallet() {
                return Err(Error::UnsupportedWalletConfig);
            }
            if card
                .settings
                .default_signing_methods
                .is_some_and(|methods| !methods.contains(Self::signing_method()))
            {
                return Err(Error::UnsupportedWalletConfig);
            }
        }
        Ok(())
    }

    fn map_error(&self, card: Option<&Card>, error: Error) -> Error {
        match (error.kind(), card) {
            (Error::InvalidParams, Some(card))
                if card.firmware_version >= FirmwareVersion::IS_PASSCODE_STATUS_AVAILABLE
                    && card.is_passcode_set == Some(false) =>
            {
                error.with_kind(Error::AlreadyCreated)
            }
            _ => error,
        }
    }

    fn serialize(&self, env: &SessionEnvironment) -> Result<CommandApdu> {
        let card = env.card.as_ref().ok_or(Error::MissingPreflightRead)?;
        let index = next_free_index(card)?;

        let mut tlv = protected_request(env)?;
        tlv.append(TlvTag::WalletIndex, &index)?;
        if card.firmware_version >= FirmwareVersion::MULTI_WALLET_AVAILABLE {
            let mut codes = vec![WalletSettingsCode::IsReusable];
            if self.is_permanent {
                codes.push(WalletSettingsCode::IsPermanent);
            }
            tlv.append(TlvTag::SettingsMask, &WalletSettingsMask::new(&codes))?
                .append(TlvTag::CurveId, &self.curve)?
                .append(TlvTag::SigningMethod, &SigningMethod::new(&[Self::signing_method()]))?;
        }
        Ok(CommandApdu::new(Instruction::CreateWallet, tlv.serialize()?))
    }

    fn deserialize(&self, env: &SessionEnvironment, response: &ResponseApdu) -> Result<Self::Response> {
        let decoder = TlvDecoder::new(response.tlv_data()?);
        let card = env.card.as_ref().ok_or(Error::MissingPreflightRead)?;
        let index = match decoder.decode_optional(TlvTag::WalletIndex)? {
            Some(index) => index,
            None => next_free_index(card)?,
        };

        let mut wallet = CardWallet::new(index, decoder.decode(TlvTag::WalletPublicKey)?, self.curve)
            .with_settings(WalletSettings {
                is_permanent: self.is_permanent,
            });
        wallet.total_signed_hashes = Some(0);
        wallet.remaining_signatures = card.remaining_signatures;

        Ok(CreateWalletResponse {
            card_id: decoder.decode(TlvTag::CardId)?,
            wallet,
        })
    }

    fn update_environment(
        &self,
        env: &mut SessionEnvironment,
        response: &Self::Response,
    ) -> Result<()> {
        if let Some(card) = env.card.as_mut() {
            card.add_wallet(response.wallet.clone())?;
        }
        Ok(())
    }
}

/// Proof that the card holds the private key of a wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckWalletResponse {
    /// Card that answered
    pub card_id: String,
    /// Card salt appended to the challenge
    #[serde(with = "hex")]
    pub salt: Vec<u8>,
    /// Signature over `sha256(challenge || salt)`
    #[serde(with = "hex")]
    pub wallet_signature: Vec<u8>,
}

/// Ask the card to sign a fresh challenge with a wallet key and verify the signature
#[derive(Debug, Clone)]
pub struct CheckWallet {
    public_key: Vec<u8>,
    challenge: Vec<u8>,
}

impl CheckWallet {
    /// Check the wallet with `public_key` against a random challenge
    pub fn new(public_key: Vec<u8>) -> Self {
        Self {
            public_key,
            challenge: random_bytes(CHALLENGE_SIZE),
        }
    }

    /// Challenge sent to the card
    pub fn challenge(&self) -> &[u8] {
        &self.challenge
    }

    #[cfg(test)]
    fn with_challenge(mut self, challenge: Vec<u8>) -> Self {
        self.challenge = challenge;
        self
    }
}

impl Command for CheckWallet {
    type Response = CheckWalletResponse;

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        match card.wallet(&self.public_key) {
            Some(wallet) if wallet.status() == WalletStatus::Loaded => Ok(()),
            _ => Err(Error::WalletNotFound),
        }
    }

    fn serialize(&self, env: &SessionEnvironment) -> Result<CommandApdu> {
        let mut tlv = TlvBuilder::new();
        tlv.append_optional(TlvTag::Pin, env.access_code.value().map(|v| v.as_slice()))?
            .append_optional(TlvTag::CardId, env.card.as_ref().map(|c| c.card_id.as_str()))?
            .append(TlvTag::WalletIndex, &wallet_index(env, &self.public_key)?)?
            .append(TlvTag::Challenge, &self.challenge)?;
        Ok(CommandApdu::new(Instruction::CheckWallet, tlv.serialize()?))
    }

    fn deserialize(&self, env: &SessionEnvironment, response: &ResponseApdu) -> Result<Self::Response> {
        let decoder = TlvDecoder::new(response.tlv_data()?);
        let response = CheckWalletResponse {
            card_id: decoder.decode(TlvTag::CardId)?,
            salt: decoder.decode(TlvTag::Salt)?,
            wallet_signature: decoder.decode(TlvTag::WalletSignature)?,
        };

        let curve = env
            .card
            .as_ref()
            .and_then(|card| card.wallet(&self.public_key))
            .map(|wallet| wallet.curve);
        if curve == Some(EllipticCurve::Secp256k1) {
            let message = [self.challenge.as_slice(), response.salt.as_slice()].concat();
            if !verify_secp256k1(&self.public_key, &message, &response.wallet_signature)? {
                warn!(card_id = %response.card_id, "Wallet signature does not verify");
                return Err(Error::WalletVerificationFailed);
            }
        }
        Ok(response)
    }
}

/// Wallet purged from the card
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeWalletResponse {
    /// Card the wallet was purged from
    pub card_id: String,
}

/// Destroy a wallet key
#[derive(Debug, Clone)]
pub struct PurgeWallet {
    public_key: Vec<u8>,
}

impl PurgeWallet {
    /// Purge the wallet with `public_key`
    pub const fn new(public_key: Vec<u8>) -> Self {
        Self { public_key }
    }
}

impl Command for PurgeWallet {
    type Response = PurgeWalletResponse;

    fn requires_passcode(&self) -> bool {
        true
    }

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        let wallet = card.wallet(&self.public_key).ok_or(Error::WalletNotFound)?;
        if wallet.settings.is_permanent {
            return Err(Error::PurgeWalletProhibited);
        }
        Ok(())
    }

    fn serialize(&self, env: &SessionEnvironment) -> Result<CommandApdu> {
        let mut tlv = protected_request(env)?;
        tlv.append(TlvTag::WalletIndex, &wallet_index(env, &self.public_key)?)?;
        Ok(CommandApdu::new(Instruction::PurgeWallet, tlv.serialize()?))
    }

    fn deserialize(&self, _env: &SessionEnvironment, response: &ResponseApdu) -> Result<Self::Response> {
        let decoder = TlvDecoder::new(response.tlv_data()?);
        Ok(PurgeWalletResponse {
            card_id: decoder.decode(TlvTag::CardId)?,
        })
    }

    fn update_environment(
        &self,
        env: &mut SessionEnvironment,
        _response: &Self::Response,
    ) -> Result<()> {
        if let Some(card) = env.card.as_mut() {
            card.remove_wallet(&self.public_key)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use k256::ecdsa::{Signature, SigningKey, signature::Signer};

    use super::*;
    use crate::Config;
    use crate::card::tests::test_card;
    use crate::tlv::Tlv;

    fn env_with(card: Card) -> SessionEnvironment {
        let mut env = SessionEnvironment::new(Config::default());
        env.card = Some(card);
        env
    }

    #[test]
    fn test_create_wallet_takes_lowest_free_slot() {
        let mut card = test_card("4.52r");
        card.add_wallet(CardWallet::new(0, vec![0x02; 33], EllipticCurve::Secp256k1)).unwrap();
        card.add_wallet(CardWallet::new(2, vec![0x03; 33], EllipticCurve::Secp256k1)).unwrap();
        let env = env_with(card);

        let apdu = CreateWallet::new(EllipticCurve::Ed25519).serialize(&env).unwrap();
        assert_eq!(apdu.instruction(), 0xF8);
        let tlvs = Tlv::deserialize(apdu.data()).unwrap();
        let index = tlvs.iter().find(|t| t.tag() == TlvTag::WalletIndex).unwrap();
        assert_eq!(index.value(), &[0x01]);
        assert!(tlvs.iter().any(|t| t.tag() == TlvTag::CurveId));
    }

    #[test]
    fn test_create_wallet_slots_exhausted() {
        let mut card = test_card("4.52r");
        for index in 0..3 {
            card.add_wallet(CardWallet::new(index, vec![index; 33], EllipticCurve::Secp256k1)).unwrap();
        }
        assert_eq!(
            CreateWallet::new(EllipticCurve::Secp256k1).serialize(&env_with(card)).unwrap_err(),
            Error::MaxNumberOfWalletsCreated
        );

        let mut single = test_card("3.34r");
        single.settings.max_wallets_count = 1;
        single.add_wallet(CardWallet::new(0, vec![0x02; 33], EllipticCurve::Secp256k1)).unwrap();
        assert_eq!(
            CreateWallet::new(EllipticCurve::Secp256k1).serialize(&env_with(single)).unwrap_err(),
            Error::AlreadyCreated
        );
    }

    #[test]
    fn test_create_wallet_pre_checks() {
        let mut card = test_card("4.52r");
        card.supported_curves = vec![EllipticCurve::Secp256k1];
        assert_eq!(
            CreateWallet::new(EllipticCurve::Ed25519).perform_pre_check(&card),
            Err(Error::UnsupportedCurve)
        );

        let old = test_card("3.34r");
        assert_eq!(
            CreateWallet::new(EllipticCurve::Secp256k1)
                .permanent(true)
                .perform_pre_check(&old),
            Err(Error::UnsupportedWalletConfig)
        );
    }

    #[test]
    fn test_create_wallet_maps_invalid_params() {
        let card = test_card("4.52r");
        let command = CreateWallet::new(EllipticCurve::Secp256k1);
        assert_eq!(command.map_error(Some(&card), Error::InvalidParams), Error::AlreadyCreated);
        assert_eq!(command.map_error(None, Error::InvalidParams), Error::InvalidParams);
    }

    #[test]
    fn test_create_wallet_adds_wallet() {
        let mut env = env_with(test_card("4.52r"));
        let mut reply = TlvBuilder::new();
        reply
            .append(TlvTag::CardId, "CB79000000018201")
            .unwrap()
            .append(TlvTag::WalletIndex, &0u8)
            .unwrap()
            .append(TlvTag::WalletPublicKey, &vec![0x02; 33])
            .unwrap();
        let response = ResponseApdu::new(reply.serialize().unwrap(), 0x9000);

        let command = CreateWallet::new(EllipticCurve::Secp256k1).permanent(true);
        let created = command.deserialize(&env, &response).unwrap();
        command.update_environment(&mut env, &created).unwrap();

        let wallet = env.card.as_ref().unwrap().wallet_by_index(0).unwrap();
        assert!(wallet.settings.is_permanent);
        assert_eq!(wallet.total_signed_hashes, Some(0));
    }

    #[test]
    fn test_check_wallet_verifies_signature() {
        let signing_key = SigningKey::from_slice(&[0x11; 32]).unwrap();
        let public_key = signing_key.verifying_key().to_sec1_bytes().to_vec();

        let mut card = test_card("4.52r");
        card.add_wallet(CardWallet::new(1, public_key.clone(), EllipticCurve::Secp256k1)).unwrap();
        let env = env_with(card);

        let command = CheckWallet::new(public_key).with_challenge(vec![0xC0; 16]);
        let salt = vec![0x5A; 16];
        let signature: Signature = signing_key.sign(&[command.challenge(), salt.as_slice()].concat());

        let reply = |signature: &[u8]| {
            let mut tlv = TlvBuilder::new();
            tlv.append(TlvTag::CardId, "CB79000000018201")
                .unwrap()
                .append(TlvTag::Salt, &salt)
                .unwrap()
                .append(TlvTag::WalletSignature, signature)
                .unwrap();
            ResponseApdu::new(tlv.serialize().unwrap(), 0x9000)
        };

        let checked = command.deserialize(&env, &reply(signature.to_bytes().as_slice())).unwrap();
        assert_eq!(checked.salt, salt);

        let forged = command.with_challenge(vec![0xC1; 16]);
        assert_eq!(
            forged.deserialize(&env, &reply(signature.to_bytes().as_slice())),
            Err(Error::WalletVerificationFailed)
        );
    }

    #[test]
    fn test_purge_wallet() {
        let mut card = test_card("4.52r");
        card.add_wallet(CardWallet::new(0, vec![0x02; 33], EllipticCurve::Secp256k1)).unwrap();
        card.add_wallet(
            CardWallet::new(1, vec![0x03; 33], EllipticCurve::Secp256k1)
                .with_settings(WalletSettings { is_permanent: true }),
        )
        .unwrap();
        let mut env = env_with(card);

        assert_eq!(
            PurgeWallet::new(vec![0x03; 33]).perform_pre_check(env.card.as_ref().unwrap()),
            Err(Error::PurgeWalletProhibited)
        );
        assert_eq!(
            PurgeWallet::new(vec![0x04; 33]).perform_pre_check(env.card.as_ref().unwrap()),
            Err(Error::WalletNotFound)
        );

        let command = PurgeWallet::new(vec![0x02; 33]);
        let apdu = command.serialize(&env).unwrap();
        assert_eq!(apdu.instruction(), 0xFC);

        let response = PurgeWalletResponse {
            card_id: "CB79000000018201".to_string(),
        };
        command.update_environment(&mut env, &response).unwrap();
        assert!(env.card.as_ref().unwrap().wallet(&[0x02; 33]).is_none());
    }
}
