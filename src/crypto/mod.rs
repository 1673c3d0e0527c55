mod custody;
mod vault;

pub use custody::{KeyCustody, KeyringCustody};
pub use vault::CredentialVault;

#[cfg(test)]
pub(crate) use custody::memory::MemoryCustody;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("Encryption key unavailable: {0}")]
    KeyUnavailable(String),

    #[error("Stored password failed authentication (corrupted or tampered)")]
    AuthenticationFailed,

    #[error("Decrypted password is not valid UTF-8")]
    InvalidPlaintext,

    #[error("Cipher error: {0}")]
    Cipher(String),
}
