pub mod config;
pub mod constants;
pub mod credential;
pub mod db;
pub mod engine;
pub mod error;
pub mod host;
pub mod lockout;
pub mod models;
pub mod store;
pub mod validation;
pub mod window;

#[cfg(test)]
mod test_utils;

pub use config::EngineConfig;
pub use credential::{CredentialVerifier, PinClear, PinCreation};
pub use engine::{
    Collaborators, Decision, EngineState, LockDecisionEngine, LockService, PostUnlock,
    SuppressReason, UnlockOutcome,
};
pub use error::{AppError, Result};
pub use models::LockEntry;
pub use store::EntryStore;
pub use window::WindowEvent;

use crate::db::{migrations, Database};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Shared handles built once at startup: the validated config and the
/// managers that sit on the single database connection.
#[derive(Clone)]
pub struct AppContext {
    config: EngineConfig,
    store: EntryStore,
    verifier: CredentialVerifier,
}

impl AppContext {
    pub fn new(db: Database, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        migrations::run(db.connection())?;
        let store = EntryStore::new(Arc::new(Mutex::new(db)));
        let verifier = CredentialVerifier::new(store.clone());
        Ok(Self {
            config,
            store,
            verifier,
        })
    }

    pub fn open(path: &Path, config: EngineConfig) -> Result<Self> {
        Self::new(Database::open(path)?, config)
    }

    pub fn in_memory(config: EngineConfig) -> Result<Self> {
        Self::new(Database::open_in_memory()?, config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &EntryStore {
        &self.store
    }

    pub fn verifier(&self) -> &CredentialVerifier {
        &self.verifier
    }

    /// Build a decision engine wired to the host's collaborators.
    pub fn engine(&self, collaborators: Collaborators) -> Result<LockDecisionEngine> {
        LockDecisionEngine::new(
            self.config.clone(),
            self.store.clone(),
            self.verifier.clone(),
            collaborators,
        )
    }
}
