pub mod accounts;
pub mod init;
pub mod models;
pub mod settings;

pub use accounts::{generate_data_folder_name, is_generated_folder_name, AccountStore};
pub use init::Database;
pub use models::{Account, NewAccount, Settings, UpdateAccount, UpdateSettings};

/// Store backed by a fresh database under `dir`, with its client paths
/// pointed at `dir/riot` (shared location) and `dir/accounts` (snapshots).
#[cfg(test)]
pub(crate) fn open_test_store(dir: &std::path::Path) -> AccountStore {
    use crate::crypto::{CredentialVault, MemoryCustody};
    use std::sync::Arc;

    let db = Database::open(dir.join("data.db")).unwrap();
    let vault = Arc::new(CredentialVault::new(Arc::new(MemoryCustody::default())));
    let store = AccountStore::new(db, vault);
    store
        .update_settings(&UpdateSettings {
            riot_client_data_path: Some(dir.join("riot").to_string_lossy().to_string()),
            account_data_path: Some(dir.join("accounts").to_string_lossy().to_string()),
            ..UpdateSettings::default()
        })
        .unwrap();
    store
}
