//! Master PIN hashing, creation and removal.

use crate::constants::{PREF_HINT, PREF_MASTER_PIN};
use crate::error::Result;
use crate::models::LockEntry;
use crate::store::EntryStore;
use crate::validation::{validate_hint, validate_pin};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::info;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// SHA-256 of the attempt, base64 encoded and trimmed.
pub fn hash_pin(attempt: &str) -> String {
    let digest = Sha256::digest(attempt.as_bytes());
    STANDARD.encode(digest).trim().to_string()
}

/// Hash `attempt` and compare it against `stored_hash` in constant time.
pub fn verify_pin(attempt: &str, stored_hash: &str) -> bool {
    let hashed = hash_pin(attempt);
    hashed.as_bytes().ct_eq(stored_hash.trim().as_bytes()).into()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinCreation {
    Created,
    Mismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinClear {
    Cleared,
    WrongPin,
}

#[derive(Clone)]
pub struct CredentialVerifier {
    store: EntryStore,
}

impl CredentialVerifier {
    pub fn new(store: EntryStore) -> Self {
        Self { store }
    }

    pub fn hash(&self, attempt: &str) -> String {
        hash_pin(attempt)
    }

    pub fn verify(&self, attempt: &str, stored_hash: &str) -> bool {
        verify_pin(attempt, stored_hash)
    }

    /// Store a new master PIN when both entries agree. Replaces any previous PIN and hint.
    pub fn create_master_pin(
        &self,
        attempt: &str,
        reentry: &str,
        hint: Option<&str>,
    ) -> Result<PinCreation> {
        let attempt = validate_pin(attempt)?;
        if attempt != reentry {
            return Ok(PinCreation::Mismatch);
        }
        let hint = validate_hint(hint)?;
        let hashed = hash_pin(attempt);
        self.store
            .write_preferences(&[(PREF_MASTER_PIN, Some(hashed.as_str())), (PREF_HINT, hint)])?;
        info!("Master PIN created (hint set: {})", hint.is_some());
        Ok(PinCreation::Created)
    }

    /// Erase the master PIN and hint if `attempt` matches. Wrong PINs change nothing.
    pub fn clear_master_pin(&self, attempt: &str) -> Result<PinClear> {
        let Some(stored) = self.master_pin_hash()? else {
            return Ok(PinClear::WrongPin);
        };
        if !verify_pin(attempt, &stored) {
            return Ok(PinClear::WrongPin);
        }
        self.store
            .write_preferences(&[(PREF_MASTER_PIN, None), (PREF_HINT, None)])?;
        info!("Master PIN cleared");
        Ok(PinClear::Cleared)
    }

    pub fn has_master_pin(&self) -> Result<bool> {
        Ok(self.master_pin_hash()?.is_some())
    }

    pub fn master_pin_hash(&self) -> Result<Option<String>> {
        self.store.preference(PREF_MASTER_PIN)
    }

    pub fn hint(&self) -> Result<Option<String>> {
        self.store.preference(PREF_HINT)
    }

    /// Check an unlock attempt against the entry's own code, or the master PIN.
    pub fn verify_for_entry(&self, entry: &LockEntry, attempt: &str) -> Result<bool> {
        if let Some(code) = entry.lock_code.as_deref() {
            return Ok(verify_pin(attempt, code));
        }
        Ok(self
            .master_pin_hash()?
            .is_some_and(|stored| verify_pin(attempt, &stored)))
    }
}
