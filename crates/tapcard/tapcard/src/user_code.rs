//! Access code and passcode values

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::sha256;

/// Kind of user code protecting a card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "camelCase")]
pub enum UserCodeType {
    /// Code required to talk to the card at all
    #[display("access code")]
    AccessCode,
    /// Code required for signing and other sensitive commands
    #[display("passcode")]
    Passcode,
}

impl UserCodeType {
    /// Factory value of this code
    pub const fn default_value(self) -> &'static str {
        match self {
            Self::AccessCode => "000000",
            Self::Passcode => "000",
        }
    }
}

/// A user code as sent to the card: the SHA-256 of the entered string
///
/// A code with no value means the session still has to ask the user for it.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct UserCode {
    #[zeroize(skip)]
    kind: UserCodeType,
    value: Option<[u8; 32]>,
}

impl UserCode {
    /// Hash the code entered by the user
    pub fn new(kind: UserCodeType, code: &str) -> Self {
        Self::from_hash(kind, sha256(code.as_bytes()))
    }

    /// Factory code of `kind`
    pub fn default_for(kind: UserCodeType) -> Self {
        Self::new(kind, kind.default_value())
    }

    /// Placeholder for a code that has not been entered yet
    pub const fn unset(kind: UserCodeType) -> Self {
        Self { kind, value: None }
    }

    /// Wrap an already hashed code
    pub const fn from_hash(kind: UserCodeType, hash: [u8; 32]) -> Self {
        Self {
            kind,
            value: Some(hash),
        }
    }

    /// Kind of this code
    pub const fn kind(&self) -> UserCodeType {
        self.kind
    }

    /// Hashed value, if entered
    pub const fn value(&self) -> Option<&[u8; 32]> {
        self.value.as_ref()
    }

    /// Whether a value is present
    pub const fn is_set(&self) -> bool {
        self.value.is_some()
    }

    /// Whether this is the factory code of its kind
    pub fn is_default(&self) -> bool {
        self.value
            .is_some_and(|value| value == sha256(self.kind.default_value().as_bytes()))
    }
}

impl fmt::Debug for UserCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match (&self.value, self.is_default()) {
            (None, _) => "unset",
            (Some(_), true) => "default",
            (Some(_), false) => "*****",
        };
        write!(f, "UserCode({}, {state})", self.kind)
    }
}
