//! BIP32 derivation paths and public key derivation
//!
//! The card derives hardened keys itself; the SDK only derives non-hardened children of an
//! extended public key the card returned.

mod extended_key;
mod path;

pub use extended_key::ExtendedPublicKey;
pub use path::{Bip44, Bip44Chain, DerivationNode, DerivationPath, HARDENED_OFFSET};
