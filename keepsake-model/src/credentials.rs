//! Secure credential store interface.
//!
//! The platform keychain is abstracted as an injected capability so that the
//! exporter/importer never touch process-global state and tests can swap in
//! an in-memory fake.

use std::collections::HashMap;
use std::sync::Mutex;
use zeroize::Zeroizing;

/// Well-known slot holding the media master key.
pub const MASTER_KEY_NAME: &str = "keepsake.master-key";

/// Opaque get/set of named secrets.
pub trait CredentialStore: Send + Sync {
    /// Returns the secret stored under `name`, if any.
    fn get(&self, name: &str) -> Option<Vec<u8>>;

    /// Stores `value` under `name`, replacing any previous value.
    /// Returns `false` if the platform refused the write.
    fn set(&self, name: &str, value: &[u8]) -> bool;
}

/// In-memory credential store.
#[derive(Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<String, Zeroizing<Vec<u8>>>>,
    read_only: bool,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that refuses every write, for exercising failure paths.
    pub fn read_only() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            read_only: true,
        }
    }

    /// Creates a store pre-populated with one secret.
    pub fn with_secret(name: &str, value: &[u8]) -> Self {
        let store = Self::new();
        store.set(name, value);
        store
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, name: &str) -> Option<Vec<u8>> {
        let entries = self.entries.lock().ok()?;
        entries.get(name).map(|v| v.to_vec())
    }

    fn set(&self, name: &str, value: &[u8]) -> bool {
        if self.read_only {
            return false;
        }
        match self.entries.lock() {
            Ok(mut entries) => {
                entries.insert(name.to_string(), Zeroizing::new(value.to_vec()));
                true
            }
            Err(_) => false,
        }
    }
}
