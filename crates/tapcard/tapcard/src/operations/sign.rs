use async_trait::async_trait;
use serde::{Serialize, Serializer};
use tapcard_apdu_core::{CommandApdu, ResponseApdu};
use tracing::debug;

use super::Instruction;
use crate::card::SigningMethodCode;
use crate::chunking::{Chunk, ChunkedHashesContainer, SignedChunk, SignedHash};
use crate::crypto::{TerminalKeys, normalize_secp256k1_signature};
use crate::hdwallet::DerivationPath;
use crate::tlv::{ResponseApduExt, TlvBuilder, TlvDecoder, TlvTag};
use crate::{
    Card, CardSession, CardSessionRunnable, Command, EllipticCurve, Error, FirmwareVersion, Result,
    SessionEnvironment,
};

fn serialize_hex_list<S: Serializer>(
    list: &[Vec<u8>],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_seq(list.iter().map(hex::encode))
}

/// Signatures produced by [`Sign`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignResponse {
    /// Card that signed
    pub card_id: String,
    /// One signature per input hash, in input order
    #[serde(serialize_with = "serialize_hex_list")]
    pub signatures: Vec<Vec<u8>>,
    /// Hashes signed by the wallet since its creation
    pub total_signed_hashes: Option<u32>,
}

/// Sign a batch of hashes with a wallet key
///
/// Hashes may differ in size; they are sent in chunks of one size each and the signatures come
/// back in input order. secp256k1 signatures are normalized to low-S when
/// [`crate::Config::canonize_secp256k1_signatures`] is set.
#[derive(Debug, Clone)]
pub struct Sign {
    hashes: Vec<Vec<u8>>,
    wallet_public_key: Vec<u8>,
    derivation_path: Option<DerivationPath>,
}

impl Sign {
    /// Sign `hashes` with the wallet identified by `wallet_public_key`
    pub const fn new(hashes: Vec<Vec<u8>>, wallet_public_key: Vec<u8>) -> Self {
        Self {
            hashes,
            wallet_public_key,
            derivation_path: None,
        }
    }

    /// Sign with the child key at `path`
    pub fn with_derivation_path(mut self, path: Option<DerivationPath>) -> Self {
        self.derivation_path = path;
        self
    }

    /// Terminal keys are only used by cards that honour them
    fn terminal_keys(card: &Card, env: &SessionEnvironment) -> Option<TerminalKeys> {
        if !card.settings.is_linked_terminal_enabled()
            || card.firmware_version >= FirmwareVersion::HD_WALLET_AVAILABLE
        {
            return None;
        }
        env.terminal_keys.clone()
    }

    fn finish(
        &self,
        env: &mut SessionEnvironment,
        signatures: Vec<Vec<u8>>,
        total_signed_hashes: Option<u32>,
    ) -> Result<Vec<Vec<u8>>> {
        let canonize = env.config.canonize_secp256k1_signatures;
        let Some(wallet) = env
            .card
            .as_mut()
            .and_then(|card| card.wallet_mut(&self.wallet_public_key))
        else {
            return Ok(signatures);
        };

        wallet.total_signed_hashes = total_signed_hashes;
        if let Some(remaining) = wallet.remaining_signatures.as_mut() {
            *remaining = remaining.saturating_sub(signatures.len() as u32);
        }

        if canonize && wallet.curve == EllipticCurve::Secp256k1 {
            signatures
                .iter()
                .map(|signature| normalize_secp256k1_signature(signature))
                .collect()
        } else {
            Ok(signatures)
        }
    }
}

#[async_trait]
impl CardSessionRunnable for Sign {
    type Response = SignResponse;

    async fn run(&mut self, session: &mut CardSession) -> Result<Self::Response> {
        let mut container = ChunkedHashesContainer::new(&self.hashes)?;
        let env = session.environment();
        let card = env.card.as_ref().ok_or(Error::MissingPreflightRead)?;
        let terminal_keys = Self::terminal_keys(card, env);

        let mut card_id = card.card_id.clone();
        let mut total_signed_hashes = None;
        while let Some(chunk) = container.current_chunk().cloned() {
            debug!(
                part = container.current_chunk_index() + 1,
                of = container.chunks_count(),
                hashes = chunk.hashes.len(),
                "Signing chunk"
            );
            let command = SignChunk {
                chunk,
                wallet_public_key: self.wallet_public_key.clone(),
                derivation_path: self.derivation_path.clone(),
                terminal_keys: terminal_keys.clone(),
            };
            let response = command.transceive(session).await?;
            card_id = response.card_id;
            total_signed_hashes = response.total_signed_hashes;
            container.add_signed_chunk(response.signed_chunk);
        }

        let signatures = container.signatures()?;
        let signatures = self.finish(session.environment_mut(), signatures, total_signed_hashes)?;
        Ok(SignResponse {
            card_id,
            signatures,
            total_signed_hashes,
        })
    }
}

#[derive(Debug)]
struct SignChunk {
    chunk: Chunk,
    wallet_public_key: Vec<u8>,
    derivation_path: Option<DerivationPath>,
    terminal_keys: Option<TerminalKeys>,
}

#[derive(Debug)]
struct SignChunkResponse {
    card_id: String,
    signed_chunk: SignedChunk,
    total_signed_hashes: Option<u32>,
}

impl SignChunk {
    /// Size prefix of the hashes: one byte, two past 255
    fn hash_size_bytes(&self) -> Vec<u8> {
        match u8::try_from(self.chunk.hash_size) {
            Ok(size) => vec![size],
            Err(_) => (self.chunk.hash_size as u16).to_be_bytes().to_vec(),
        }
    }
}

impl Command for SignChunk {
    type Response = SignChunkResponse;

    fn requires_passcode(&self) -> bool {
        true
    }

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        let wallet = card.wallet(&self.wallet_public_key).ok_or(Error::WalletNotFound)?;

        if self.derivation_path.is_some() {
            if card.firmware_version < FirmwareVersion::HD_WALLET_AVAILABLE {
                return Err(Error::NotSupportedFirmwareVersion);
            }
            if wallet.curve == EllipticCurve::Secp256r1 {
                return Err(Error::UnsupportedCurve);
            }
            if !card.settings.is_hd_wallet_allowed() {
                return Err(Error::HDWalletDisabled);
            }
        }
        if wallet.remaining_signatures == Some(0) {
            return Err(Error::NoRemainingSignatures);
        }
        if card
            .settings
            .default_signing_methods
            .is_some_and(|methods| !methods.contains(SigningMethodCode::SignHash))
        {
            return Err(Error::SignHashesNotAvailable);
        }
        Ok(())
    }

    fn serialize(&self, env: &SessionEnvironment) -> Result<CommandApdu> {
        let wallet_index = env
            .card
            .as_ref()
            .and_then(|card| card.wallet(&self.wallet_public_key))
            .map(|wallet| wallet.index)
            .ok_or(Error::WalletNotFound)?;
        let hashes = self.chunk.flattened();

        let mut tlv = TlvBuilder::new();
        tlv.append_optional(TlvTag::Pin, env.access_code.value().map(|v| v.as_slice()))?
            .append_optional(TlvTag::Pin2, env.passcode.value().map(|v| v.as_slice()))?
            .append_optional(TlvTag::CardId, env.card.as_ref().map(|c| c.card_id.as_str()))?
            .append(TlvTag::TransactionOutHashSize, &self.hash_size_bytes())?
            .append(TlvTag::TransactionOutHash, &hashes)?
            .append(TlvTag::WalletIndex, &wallet_index)?;
        if let Some(keys) = self.terminal_keys.as_ref() {
            tlv.append(TlvTag::TerminalTransactionSignature, &keys.sign(&hashes))?
                .append(TlvTag::TerminalPublicKey, &keys.public_key())?;
        }
        tlv.append_optional(TlvTag::WalletHDPath, self.derivation_path.as_ref())?;

        Ok(CommandApdu::new(Instruction::Sign, tlv.serialize()?))
    }

    fn deserialize(&self, env: &SessionEnvironment, response: &ResponseApdu) -> Result<Self::Response> {
        let decoder = TlvDecoder::new(response.tlv_data()?);
        let blob: Vec<u8> = decoder.decode(TlvTag::WalletSignature)?;

        let curve = env
            .card
            .as_ref()
            .and_then(|card| card.wallet(&self.wallet_public_key))
            .map(|wallet| wallet.curve)
            .ok_or(Error::WalletNotFound)?;
        let count = self.chunk.hashes.len();
        let signature_len = curve.signature_len();
        if count == 0 || blob.len() != count * signature_len {
            return Err(Error::InvalidResponse(format!(
                "{} signature bytes for {count} {curve} hashes",
                blob.len()
            )));
        }
        let signed_hashes = self
            .chunk
            .hashes
            .iter()
            .zip(blob.chunks(signature_len))
            .map(|(hash, signature)| SignedHash {
                index: hash.index,
                data: hash.data.clone(),
                signature: signature.to_vec(),
            })
            .collect();

        Ok(SignChunkResponse {
            card_id: decoder.decode(TlvTag::CardId)?,
            signed_chunk: SignedChunk { signed_hashes },
            total_signed_hashes: decoder.decode_optional(TlvTag::WalletSignedHashes)?,
        })
    }
}
