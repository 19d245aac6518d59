use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{Context, Result};
use keyring::Entry;

const SERVICE_NAME: &str = "tinyfront";

/// Storage for per-account refresh tokens.
pub trait SecretStore: Send + Sync {
    fn store(&self, account_id: &str, secret: &str) -> Result<()>;

    /// Returns `Ok(None)` when nothing is stored for the account.
    fn get(&self, account_id: &str) -> Result<Option<String>>;

    fn delete(&self, account_id: &str) -> Result<()>;
}

/// Refresh tokens in the OS keychain.
pub struct CredentialStore;

impl SecretStore for CredentialStore {
    fn store(&self, account_id: &str, secret: &str) -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, account_id)
            .context("Failed to create keyring entry")?;
        entry
            .set_password(secret)
            .context("Failed to store refresh token in keychain")?;
        Ok(())
    }

    fn get(&self, account_id: &str) -> Result<Option<String>> {
        let entry = Entry::new(SERVICE_NAME, account_id)
            .context("Failed to create keyring entry")?;
        match entry.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve refresh token from keychain"),
        }
    }

    fn delete(&self, account_id: &str) -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, account_id)
            .context("Failed to create keyring entry")?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete refresh token from keychain"),
        }
    }
}

/// Process-local store, for tests and keychain-less environments.
#[derive(Default)]
pub struct MemorySecretStore {
    secrets: Mutex<HashMap<String, String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemorySecretStore {
    fn store(&self, account_id: &str, secret: &str) -> Result<()> {
        let mut secrets = self
            .secrets
            .lock()
            .map_err(|_| anyhow::anyhow!("Secret store lock poisoned"))?;
        secrets.insert(account_id.to_string(), secret.to_string());
        Ok(())
    }

    fn get(&self, account_id: &str) -> Result<Option<String>> {
        let secrets = self
            .secrets
            .lock()
            .map_err(|_| anyhow::anyhow!("Secret store lock poisoned"))?;
        Ok(secrets.get(account_id).cloned())
    }

    fn delete(&self, account_id: &str) -> Result<()> {
        let mut secrets = self
            .secrets
            .lock()
            .map_err(|_| anyhow::anyhow!("Secret store lock poisoned"))?;
        secrets.remove(account_id);
        Ok(())
    }
}
