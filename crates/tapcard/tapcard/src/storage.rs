//! Secure storage collaborator

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;

use crate::Result;

/// Key of a stored item
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StorageKey {
    /// Hashed access code saved for one card
    UserCode(String),
    /// Ids of the cards that have a saved access code
    CardsWithSavedUserCode,
    /// Private key of the linked terminal
    TerminalPrivateKey,
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserCode(card_id) => write!(f, "user_code_{card_id}"),
            Self::CardsWithSavedUserCode => f.write_str("cards_with_saved_user_code"),
            Self::TerminalPrivateKey => f.write_str("terminal_private_key"),
        }
    }
}

/// Platform secure storage (keychain, keystore)
///
/// Implementations serialize their own state; the session only calls them between exchanges.
pub trait SecureStorage: Send + Sync + fmt::Debug {
    /// Read an item
    fn get(&self, key: &StorageKey) -> Result<Option<Vec<u8>>>;

    /// Write an item, replacing any previous value
    fn store(&self, data: &[u8], key: &StorageKey) -> Result<()>;

    /// Remove an item; removing a missing item is not an error
    fn delete(&self, key: &StorageKey) -> Result<()>;
}

/// Process local storage, lost when dropped
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    items: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryStorage {
    /// Create an empty storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored items
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

impl SecureStorage for InMemoryStorage {
    fn get(&self, key: &StorageKey) -> Result<Option<Vec<u8>>> {
        Ok(self.items.read().get(&key.to_string()).cloned())
    }

    fn store(&self, data: &[u8], key: &StorageKey) -> Result<()> {
        self.items.write().insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn delete(&self, key: &StorageKey) -> Result<()> {
        self.items.write().remove(&key.to_string());
        Ok(())
    }
}
