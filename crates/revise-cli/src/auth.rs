//! Keychain-backed credential persistence for CLI profiles.

#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::{Mutex, OnceLock};

#[cfg(not(test))]
use keyring::Entry;

use revise_core::auth::{
    AuthError, AuthResult, Credential, CredentialPersistence, CredentialStore,
};

#[cfg(not(test))]
const KEYRING_SERVICE_NAME: &str = "revise-cli";

/// One keychain entry per profile.
#[derive(Clone)]
pub struct KeyringCredentials {
    username: String,
}

impl KeyringCredentials {
    pub fn for_profile(profile_name: &str) -> Self {
        Self {
            username: format!("credential:{profile_name}"),
        }
    }

    #[cfg(test)]
    fn test_store() -> &'static Mutex<HashMap<String, String>> {
        static STORE: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
        STORE.get_or_init(|| Mutex::new(HashMap::new()))
    }

    #[cfg(not(test))]
    fn entry(&self) -> AuthResult<Entry> {
        Entry::new(KEYRING_SERVICE_NAME, &self.username)
            .map_err(|error| AuthError::SecureStorage(error.to_string()))
    }
}

impl CredentialPersistence for KeyringCredentials {
    #[cfg(not(test))]
    fn load_credential(&self) -> AuthResult<Option<Credential>> {
        let entry = self.entry()?;
        match entry.get_password() {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(AuthError::SecureStorage(error.to_string())),
        }
    }

    #[cfg(test)]
    fn load_credential(&self) -> AuthResult<Option<Credential>> {
        let guard = Self::test_store()
            .lock()
            .map_err(|error| AuthError::SecureStorage(error.to_string()))?;
        guard
            .get(&self.username)
            .map(|raw| serde_json::from_str(raw))
            .transpose()
            .map_err(AuthError::from)
    }

    #[cfg(not(test))]
    fn save_credential(&self, credential: &Credential) -> AuthResult<()> {
        let raw = serde_json::to_string(credential)?;
        self.entry()?
            .set_password(&raw)
            .map_err(|error| AuthError::SecureStorage(error.to_string()))
    }

    #[cfg(test)]
    fn save_credential(&self, credential: &Credential) -> AuthResult<()> {
        let raw = serde_json::to_string(credential)?;
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| AuthError::SecureStorage(error.to_string()))?;
        guard.insert(self.username.clone(), raw);
        Ok(())
    }

    #[cfg(not(test))]
    fn clear_credential(&self) -> AuthResult<()> {
        let entry = self.entry()?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(AuthError::SecureStorage(error.to_string())),
        }
    }

    #[cfg(test)]
    fn clear_credential(&self) -> AuthResult<()> {
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| AuthError::SecureStorage(error.to_string()))?;
        guard.remove(&self.username);
        Ok(())
    }
}

/// Credential store for a profile, restored from the keychain.
pub fn credential_store(profile_name: &str) -> AuthResult<CredentialStore<KeyringCredentials>> {
    CredentialStore::restore(KeyringCredentials::for_profile(profile_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn profiles_keep_separate_credentials() {
        let work = credential_store("auth-test-work").unwrap();
        let home = credential_store("auth-test-home").unwrap();
        work.sign_in(Credential::new("token-w", "user-w", None).unwrap())
            .unwrap();

        assert!(!home.is_signed_in());
        let restored = credential_store("auth-test-work").unwrap();
        assert_eq!(restored.current().unwrap().user_id, "user-w");

        restored.sign_out().unwrap();
        assert!(!credential_store("auth-test-work").unwrap().is_signed_in());
    }

    #[test]
    fn clearing_missing_entry_is_ok() {
        let persistence = KeyringCredentials::for_profile("auth-test-never-saved");
        assert!(persistence.clear_credential().is_ok());
        assert!(persistence.load_credential().unwrap().is_none());
    }
}
