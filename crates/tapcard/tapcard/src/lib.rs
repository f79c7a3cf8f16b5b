//! Command and task engine for tapcard hardware wallets
//!
//! This crate turns application intents (scan a card, create a wallet, sign hashes, manage
//! files) into APDU exchanges with the card and decodes the replies into typed values.
//!
//! - [`tlv`]: tag typed TLV codec used by every command payload
//! - [`CardSession`]: one logical session with a card, owning the [`SessionEnvironment`]
//! - [`Command`]: single exchange state machine (preflight read, pre-check, security delay,
//!   encryption escalation, error mapping)
//! - [`operations`] and [`tasks`]: concrete commands and multi-command orchestration
//! - [`chunking`]: splitting hash batches into uniform chunks and restoring the caller's order
//! - [`hdwallet`]: derivation paths and non-hardened public key derivation
//! - [`jsonrpc`]: static method table for JSON-RPC hosts
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]

pub mod card;
pub mod chunking;
mod command;
mod config;
pub mod crypto;
mod delegate;
mod environment;
mod error;
pub mod hdwallet;
pub mod jsonrpc;
pub mod operations;
mod session;
mod status;
mod storage;
pub mod tasks;
pub mod tlv;
mod user_code;

pub use card::{Card, CardWallet, EllipticCurve, FirmwareVersion};
pub use command::{Command, PreflightReadMode};
pub use config::Config;
pub use delegate::{SessionViewDelegate, SilentDelegate};
pub use environment::SessionEnvironment;
pub use error::{Error, Result};
pub use session::{CancellationHandle, CardSession, CardSessionRunnable};
pub use status::{StatusOutcome, status_outcome};
pub use storage::{InMemoryStorage, SecureStorage, StorageKey};
pub use user_code::{UserCode, UserCodeType};

pub use tapcard_apdu_core as apdu;

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{
        CancellationHandle, Card, CardSession, CardSessionRunnable, CardWallet, Command, Config,
        EllipticCurve, Error, FirmwareVersion, PreflightReadMode, Result, SecureStorage,
        SessionEnvironment, SessionViewDelegate, UserCode, UserCodeType,
    };

    pub use crate::hdwallet::{DerivationNode, DerivationPath, ExtendedPublicKey};
    pub use crate::tlv::{Tlv, TlvBuilder, TlvDecoder, TlvTag};

    pub use tapcard_apdu_core::{
        CardTransport, CommandApdu, EncryptionMode, ResponseApdu, StatusWord, TagType,
        TransportError,
    };
}
