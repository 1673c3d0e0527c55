use std::sync::{Arc, Mutex};

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose, Engine as _};
use once_cell::sync::OnceCell;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{ZeroizeOnDrop, Zeroizing};

use super::custody::{KeyCustody, KeyringCustody};
use super::VaultError;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Serializes get-or-create so only one key is ever provisioned per process.
static PROVISION_LOCK: Mutex<()> = Mutex::new(());

#[derive(ZeroizeOnDrop)]
struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    fn decode(encoded: &str) -> Result<Self, VaultError> {
        let bytes = Zeroizing::new(general_purpose::STANDARD.decode(encoded.trim()).map_err(
            |e| VaultError::KeyUnavailable(format!("Failed to decode encryption key: {}", e)),
        )?);
        if bytes.len() != KEY_LEN {
            return Err(VaultError::KeyUnavailable(format!(
                "Stored encryption key has {} bytes, expected {}",
                bytes.len(),
                KEY_LEN
            )));
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&bytes);
        Ok(Self(key))
    }

    fn encode(&self) -> Zeroizing<String> {
        Zeroizing::new(general_purpose::STANDARD.encode(self.0))
    }
}

/// Authenticated encryption for stored account passwords.
///
/// Blob layout: `nonce (12) || ciphertext || tag (16)`. The key lives in the
/// OS credential store and is fetched on first use, then kept in memory for
/// the lifetime of the vault.
pub struct CredentialVault {
    custody: Arc<dyn KeyCustody>,
    key: OnceCell<EncryptionKey>,
}

impl CredentialVault {
    pub fn new(custody: Arc<dyn KeyCustody>) -> Self {
        Self {
            custody,
            key: OnceCell::new(),
        }
    }

    pub fn with_os_keyring() -> Self {
        Self::new(Arc::new(KeyringCustody::default()))
    }

    fn key(&self) -> Result<&EncryptionKey, VaultError> {
        self.key
            .get_or_try_init(|| load_or_provision(self.custody.as_ref()))
    }

    fn cipher(&self) -> Result<Aes256Gcm, VaultError> {
        let key = self.key()?;
        Aes256Gcm::new_from_slice(&key.0)
            .map_err(|e| VaultError::Cipher(format!("Failed to create cipher: {}", e)))
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>, VaultError> {
        let cipher = self.cipher()?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let mut ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| VaultError::Cipher(format!("Encryption failed: {}", e)))?;

        let mut result = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.append(&mut ciphertext);
        Ok(result)
    }

    pub fn decrypt(&self, blob: &[u8]) -> Result<Zeroizing<String>, VaultError> {
        let cipher = self.cipher()?;

        if blob.len() < NONCE_LEN + TAG_LEN {
            return Err(VaultError::AuthenticationFailed);
        }

        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| VaultError::AuthenticationFailed)?;

        String::from_utf8(plaintext)
            .map(Zeroizing::new)
            .map_err(|_| VaultError::InvalidPlaintext)
    }
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault")
            .field("key_loaded", &self.key.get().is_some())
            .finish()
    }
}

fn load_or_provision(custody: &dyn KeyCustody) -> Result<EncryptionKey, VaultError> {
    let _guard = PROVISION_LOCK.lock().unwrap_or_else(|e| e.into_inner());

    if let Some(encoded) = custody.load()? {
        log::debug!("Loaded encryption key from credential store");
        return EncryptionKey::decode(&encoded);
    }

    log::info!("No encryption key found, provisioning a new one");
    let fresh = EncryptionKey::generate();
    custody.store(&fresh.encode())?;

    // Adopt whatever is persisted now, in case another writer won the race.
    match custody.load()? {
        Some(encoded) => EncryptionKey::decode(&encoded),
        None => Err(VaultError::KeyUnavailable(
            "Encryption key missing right after provisioning".to_string(),
        )),
    }
}
