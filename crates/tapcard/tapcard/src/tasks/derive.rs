use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::debug;

use crate::hdwallet::{DerivationPath, ExtendedPublicKey};
use crate::operations::ReadWallet;
use crate::{CardSession, CardSessionRunnable, Command, EllipticCurve, Error, Result};

/// Ask the card for the child key of a wallet at one derivation path
///
/// The derived key is also recorded in the wallet's `derived_keys`.
#[derive(Debug, Clone)]
pub struct DeriveWalletPublicKeyTask {
    wallet_public_key: Vec<u8>,
    derivation_path: DerivationPath,
}

impl DeriveWalletPublicKeyTask {
    /// Derive `derivation_path` from the wallet with `wallet_public_key`
    pub const fn new(wallet_public_key: Vec<u8>, derivation_path: DerivationPath) -> Self {
        Self {
            wallet_public_key,
            derivation_path,
        }
    }
}

#[async_trait]
impl CardSessionRunnable for DeriveWalletPublicKeyTask {
    type Response = ExtendedPublicKey;

    async fn run(&mut self, session: &mut CardSession) -> Result<Self::Response> {
        derive(session, &self.wallet_public_key, &self.derivation_path).await
    }
}

/// Derive several paths of one wallet, in order
#[derive(Debug, Clone)]
pub struct DeriveWalletPublicKeysTask {
    wallet_public_key: Vec<u8>,
    derivation_paths: Vec<DerivationPath>,
}

impl DeriveWalletPublicKeysTask {
    /// Derive every path in `derivation_paths` from the wallet with `wallet_public_key`
    pub const fn new(wallet_public_key: Vec<u8>, derivation_paths: Vec<DerivationPath>) -> Self {
        Self {
            wallet_public_key,
            derivation_paths,
        }
    }
}

#[async_trait]
impl CardSessionRunnable for DeriveWalletPublicKeysTask {
    type Response = BTreeMap<DerivationPath, ExtendedPublicKey>;

    async fn run(&mut self, session: &mut CardSession) -> Result<Self::Response> {
        let mut keys = BTreeMap::new();
        for path in &self.derivation_paths {
            let key = derive(session, &self.wallet_public_key, path).await?;
            keys.insert(path.clone(), key);
        }
        Ok(keys)
    }
}

async fn derive(
    session: &mut CardSession,
    wallet_public_key: &[u8],
    path: &DerivationPath,
) -> Result<ExtendedPublicKey> {
    let (index, curve) = session
        .environment()
        .card
        .as_ref()
        .and_then(|card| card.wallet(wallet_public_key))
        .map(|wallet| (wallet.index, wallet.curve))
        .ok_or(Error::WalletNotFound)?;
    if !matches!(curve, EllipticCurve::Secp256k1 | EllipticCurve::Ed25519) {
        return Err(Error::UnsupportedCurve);
    }

    let response = ReadWallet::new(index)
        .with_derivation_path(path.clone())
        .transceive(session)
        .await?;
    let chain_code = response.wallet.chain_code.as_deref().ok_or(Error::CardError)?;
    let key = ExtendedPublicKey::from_card(&response.wallet.public_key, chain_code, path)?;
    debug!(%path, "Derived wallet key");

    if let Some(wallet) = session
        .environment_mut()
        .card
        .as_mut()
        .and_then(|card| card.wallet_mut(wallet_public_key))
    {
        wallet
            .derived_keys
            .entry(path.clone())
            .or_insert_with(|| key.clone());
    }
    Ok(key)
}
