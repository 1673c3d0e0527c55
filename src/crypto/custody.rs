use keyring::Entry;

use super::VaultError;

pub const SERVICE_NAME: &str = "valo-accounts";
pub const KEY_NAME: &str = "encryption_key";

/// Long-term storage for the vault key, delegated to the host OS.
pub trait KeyCustody: Send + Sync {
    /// Returns `Ok(None)` only when no key has been stored yet.
    fn load(&self) -> Result<Option<String>, VaultError>;

    fn store(&self, secret: &str) -> Result<(), VaultError>;
}

/// Key custody backed by the OS credential store (Windows Credential Manager,
/// macOS Keychain, Linux kernel keyring).
#[derive(Debug, Clone)]
pub struct KeyringCustody {
    service: String,
    name: String,
}

impl KeyringCustody {
    pub fn new(service: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            name: name.into(),
        }
    }

    fn entry(&self) -> Result<Entry, VaultError> {
        Entry::new(&self.service, &self.name).map_err(|e| {
            VaultError::KeyUnavailable(format!("Failed to access OS credential store: {}", e))
        })
    }
}

impl Default for KeyringCustody {
    fn default() -> Self {
        Self::new(SERVICE_NAME, KEY_NAME)
    }
}

impl KeyCustody for KeyringCustody {
    fn load(&self) -> Result<Option<String>, VaultError> {
        match self.entry()?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(VaultError::KeyUnavailable(format!(
                "Failed to read encryption key: {}",
                e
            ))),
        }
    }

    fn store(&self, secret: &str) -> Result<(), VaultError> {
        self.entry()?
            .set_password(secret)
            .map_err(|e| VaultError::KeyUnavailable(format!("Failed to store encryption key: {}", e)))
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;

    /// In-process stand-in for the OS credential store.
    #[derive(Default)]
    pub(crate) struct MemoryCustody {
        pub(crate) slot: Mutex<Option<String>>,
        pub(crate) stores: AtomicUsize,
        pub(crate) unavailable: bool,
        pub(crate) read_delay: Option<Duration>,
    }

    impl MemoryCustody {
        pub(crate) fn unavailable() -> Self {
            Self {
                unavailable: true,
                ..Self::default()
            }
        }

        pub(crate) fn with_secret(secret: &str) -> Self {
            Self {
                slot: Mutex::new(Some(secret.to_string())),
                ..Self::default()
            }
        }

        pub(crate) fn secret(&self) -> Option<String> {
            self.slot.lock().unwrap().clone()
        }
    }

    impl KeyCustody for MemoryCustody {
        fn load(&self) -> Result<Option<String>, VaultError> {
            if self.unavailable {
                return Err(VaultError::KeyUnavailable("store offline".to_string()));
            }
            let value = self.slot.lock().unwrap().clone();
            if let Some(delay) = self.read_delay {
                std::thread::sleep(delay);
            }
            Ok(value)
        }

        fn store(&self, secret: &str) -> Result<(), VaultError> {
            if self.unavailable {
                return Err(VaultError::KeyUnavailable("store offline".to_string()));
            }
            self.stores.fetch_add(1, Ordering::SeqCst);
            *self.slot.lock().unwrap() = Some(secret.to_string());
            Ok(())
        }
    }
}
