use std::sync::Arc;

use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{Connection, OptionalExtension, Row};
use zeroize::Zeroizing;

use super::init::Database;
use super::models::{Account, NewAccount, UpdateAccount};
use crate::crypto::CredentialVault;
use crate::error::{AppError, Result};

const ACCOUNT_COLUMNS: &str = "id, riot_id, tagline, username, encrypted_password, rank, is_active, data_folder, created_at, updated_at";

static DATA_FOLDER_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^\d{3,}_\d{14}$").ok());

pub fn generate_data_folder_name(account_id: i64) -> String {
    let now = Local::now();
    format!("{:03}_{}", account_id, now.format("%Y%m%d%H%M%S"))
}

/// True for names produced by [`generate_data_folder_name`].
pub fn is_generated_folder_name(name: &str) -> bool {
    DATA_FOLDER_PATTERN
        .as_ref()
        .is_some_and(|re| re.is_match(name))
}

/// Durable record of accounts and settings.
#[derive(Debug, Clone)]
pub struct AccountStore {
    db: Database,
    vault: Arc<CredentialVault>,
}

impl AccountStore {
    pub fn new(db: Database, vault: Arc<CredentialVault>) -> Self {
        Self { db, vault }
    }

    pub(crate) fn connection(&self) -> Result<Connection> {
        self.db.connection()
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn encrypt_optional(&self, password: Option<&str>) -> Result<Vec<u8>> {
        match password {
            Some(pw) if !pw.is_empty() => Ok(self.vault.encrypt(pw)?),
            _ => Ok(Vec::new()),
        }
    }

    pub fn create_account(&self, data: &NewAccount) -> Result<Account> {
        let riot_id = data.riot_id.trim();
        let tagline = data.tagline.trim();
        let username = normalize_username(data.username.as_deref());

        log::info!(
            "Creating new account: {}#{} (use_current_data: {})",
            riot_id,
            tagline,
            data.use_current_data
        );

        let encrypted_password = self.encrypt_optional(data.password.as_deref())?;

        let mut conn = self.connection()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO accounts (riot_id, tagline, username, encrypted_password, rank, data_folder)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL)",
            (riot_id, tagline, username, &encrypted_password, &data.rank),
        )
        .map_err(|e| unique_violation(e, riot_id, tagline, username))?;

        let id = tx.last_insert_rowid();
        let data_folder = generate_data_folder_name(id);
        log::debug!("Generated folder name: {}", data_folder);

        tx.execute(
            "UPDATE accounts SET data_folder = ?1 WHERE id = ?2",
            (&data_folder, id),
        )?;
        tx.commit()?;

        log::info!("Account created successfully with ID: {}", id);
        get_account_by_id(&conn, id)
    }

    pub fn get_account(&self, account_id: i64) -> Result<Account> {
        let conn = self.connection()?;
        get_account_by_id(&conn, account_id)
    }

    pub fn list_accounts(&self) -> Result<Vec<Account>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM accounts ORDER BY created_at ASC, id ASC",
            ACCOUNT_COLUMNS
        ))?;
        let accounts = stmt
            .query_map([], account_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(accounts)
    }

    pub fn update_account(&self, data: &UpdateAccount) -> Result<Account> {
        let riot_id = data.riot_id.trim();
        let tagline = data.tagline.trim();
        let username = normalize_username(data.username.as_deref());

        let conn = self.connection()?;
        get_account_by_id(&conn, data.id)?;

        let result = if let Some(ref pw) = data.password {
            let encrypted = self.encrypt_optional(Some(pw))?;
            conn.execute(
                "UPDATE accounts SET riot_id=?1, tagline=?2, username=?3, encrypted_password=?4, rank=?5, updated_at=datetime('now') WHERE id=?6",
                (riot_id, tagline, username, &encrypted, &data.rank, data.id),
            )
        } else {
            conn.execute(
                "UPDATE accounts SET riot_id=?1, tagline=?2, username=?3, rank=?4, updated_at=datetime('now') WHERE id=?5",
                (riot_id, tagline, username, &data.rank, data.id),
            )
        };
        result.map_err(|e| unique_violation(e, riot_id, tagline, username))?;

        get_account_by_id(&conn, data.id)
    }

    /// Remove the account row with its cache entry, clearing the settings
    /// pointer if it named the account. Databases migrated from older
    /// versions lack the foreign keys, so both are cleared explicitly.
    pub fn delete_account(&self, account_id: i64) -> Result<Account> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        let account = get_account_by_id(&tx, account_id)?;
        tx.execute(
            "UPDATE settings SET active_account_id = NULL, updated_at = datetime('now') WHERE active_account_id = ?1",
            [account_id],
        )?;
        tx.execute(
            "DELETE FROM storefront_cache WHERE account_id = ?1",
            [account_id],
        )?;
        tx.execute("DELETE FROM accounts WHERE id = ?1", [account_id])?;
        tx.commit()?;
        log::info!("Deleted account {} ({})", account_id, account.display_name());
        Ok(account)
    }

    pub fn set_rank(&self, account_id: i64, rank: Option<&str>) -> Result<Account> {
        let conn = self.connection()?;
        let changed = conn.execute(
            "UPDATE accounts SET rank = ?1, updated_at = datetime('now') WHERE id = ?2",
            (rank, account_id),
        )?;
        if changed == 0 {
            return Err(not_found(account_id));
        }
        get_account_by_id(&conn, account_id)
    }

    /// Decrypt the stored password. `None` when the account has none.
    pub fn reveal_password(&self, account_id: i64) -> Result<Option<Zeroizing<String>>> {
        let account = self.get_account(account_id)?;
        if account.encrypted_password.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.vault.decrypt(&account.encrypted_password)?))
    }

    /// Point the store at `account_id` (or at nobody) in one transaction.
    pub fn set_active(&self, account_id: Option<i64>) -> Result<()> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;

        if let Some(id) = account_id {
            let exists = tx
                .query_row("SELECT 1 FROM accounts WHERE id = ?1", [id], |_| Ok(()))
                .optional()?;
            if exists.is_none() {
                return Err(not_found(id));
            }
        }

        tx.execute("UPDATE accounts SET is_active = 0 WHERE is_active = 1", [])?;
        if let Some(id) = account_id {
            tx.execute("UPDATE accounts SET is_active = 1 WHERE id = ?1", [id])?;
        }
        tx.execute(
            "UPDATE settings SET active_account_id = ?1, updated_at = datetime('now') WHERE id = 1",
            [account_id],
        )?;
        tx.commit()?;

        log::debug!("Active account set to {:?}", account_id);
        Ok(())
    }

    /// The account the settings pointer names.
    pub fn active_account(&self) -> Result<Option<Account>> {
        let conn = self.connection()?;
        let active_id: Option<i64> = conn.query_row(
            "SELECT active_account_id FROM settings WHERE id = 1",
            [],
            |row| row.get(0),
        )?;
        active_id
            .map(|id| get_account_by_id(&conn, id))
            .transpose()
    }
}

fn normalize_username(username: Option<&str>) -> Option<&str> {
    username.map(str::trim).filter(|u| !u.is_empty())
}

fn not_found(account_id: i64) -> AppError {
    AppError::NotFound(format!("Account {} does not exist", account_id))
}

fn unique_violation(
    e: rusqlite::Error,
    riot_id: &str,
    tagline: &str,
    username: Option<&str>,
) -> AppError {
    if let rusqlite::Error::SqliteFailure(ref err, Some(ref msg)) = e {
        if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE {
            if msg.contains("accounts.username") {
                return AppError::Conflict(format!(
                    "Username {} is already registered",
                    username.unwrap_or_default()
                ));
            }
            if msg.contains("accounts.riot_id") {
                return AppError::Conflict(format!(
                    "Account {}#{} already exists",
                    riot_id, tagline
                ));
            }
            return AppError::Conflict(msg.clone());
        }
    }
    AppError::Database(e)
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    let encrypted_password: Vec<u8> = row.get(4)?;
    let has_password = !encrypted_password.is_empty();
    Ok(Account {
        id: row.get(0)?,
        riot_id: row.get(1)?,
        tagline: row.get(2)?,
        username: row.get(3)?,
        encrypted_password,
        has_password,
        rank: row.get(5)?,
        is_active: row.get(6)?,
        data_folder: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn get_account_by_id(conn: &Connection, id: i64) -> Result<Account> {
    conn.query_row(
        &format!("SELECT {} FROM accounts WHERE id = ?1", ACCOUNT_COLUMNS),
        [id],
        account_from_row,
    )
    .optional()?
    .ok_or_else(|| not_found(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::VaultError;
    use crate::db::open_test_store;
    use tempfile::TempDir;

    fn new_account(riot_id: &str, tagline: &str) -> NewAccount {
        NewAccount {
            riot_id: riot_id.to_string(),
            tagline: tagline.to_string(),
            ..NewAccount::default()
        }
    }

    fn active_flags(store: &AccountStore) -> Vec<(i64, bool)> {
        store
            .list_accounts()
            .unwrap()
            .into_iter()
            .map(|a| (a.id, a.is_active))
            .collect()
    }

    fn settings_pointer(store: &AccountStore) -> Option<i64> {
        store.get_settings().unwrap().active_account_id
    }

    #[test]
    fn test_generated_folder_name_pattern() {
        let name = generate_data_folder_name(7);
        assert!(name.starts_with("007_"));
        assert!(is_generated_folder_name(&name));
        assert!(is_generated_folder_name("1234_20240101120000"));
        assert!(!is_generated_folder_name("_unselected"));
        assert!(!is_generated_folder_name("007_2024"));
        assert!(!is_generated_folder_name("../007_20240101120000"));
    }

    #[test]
    fn test_create_and_list() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_test_store(temp_dir.path());

        let created = store
            .create_account(&NewAccount {
                password: Some("hunter2".to_string()),
                username: Some("player.one".to_string()),
                ..new_account("Player", "JP1")
            })
            .unwrap();
        let other = store.create_account(&new_account("Second", "KR2")).unwrap();

        assert!(created.has_password);
        assert!(!other.has_password);
        assert!(!created.is_active);
        assert!(is_generated_folder_name(&created.data_folder));
        assert_ne!(created.data_folder, other.data_folder);

        let listed = store.list_accounts().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].display_name(), "Player#JP1");

        let json = serde_json::to_value(&listed[0]).unwrap();
        assert!(json.get("encrypted_password").is_none());
        assert_eq!(json["has_password"], true);
    }

    #[test]
    fn test_duplicate_riot_id_is_conflict() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_test_store(temp_dir.path());
        store.create_account(&new_account("Player", "JP1")).unwrap();

        let err = store.create_account(&new_account("Player", "JP1")).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)), "{:?}", err);

        // Same name, different tagline is a different account.
        store.create_account(&new_account("Player", "JP2")).unwrap();
    }

    #[test]
    fn test_duplicate_username_is_conflict() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_test_store(temp_dir.path());
        let with_username = |riot_id: &str, username: Option<&str>| NewAccount {
            username: username.map(str::to_string),
            ..new_account(riot_id, "TAG")
        };

        store.create_account(&with_username("A", Some("login"))).unwrap();
        let err = store
            .create_account(&with_username("B", Some("login")))
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(ref m) if m.contains("login")));

        // Absent and blank usernames never collide.
        store.create_account(&with_username("C", None)).unwrap();
        store.create_account(&with_username("D", None)).unwrap();
        store.create_account(&with_username("E", Some("  "))).unwrap();
    }

    #[test]
    fn test_edit_conflict_leaves_row_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_test_store(temp_dir.path());
        store.create_account(&new_account("Taken", "TAG")).unwrap();
        let target = store.create_account(&new_account("Mine", "TAG")).unwrap();

        let err = store
            .update_account(&UpdateAccount {
                id: target.id,
                riot_id: "Taken".to_string(),
                tagline: "TAG".to_string(),
                username: None,
                password: None,
                rank: None,
            })
            .unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(store.get_account(target.id).unwrap().riot_id, "Mine");
    }

    #[test]
    fn test_update_password_semantics() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_test_store(temp_dir.path());
        let account = store
            .create_account(&NewAccount {
                password: Some("first".to_string()),
                ..new_account("Player", "JP1")
            })
            .unwrap();

        let edit = |password: Option<&str>| UpdateAccount {
            id: account.id,
            riot_id: "Player".to_string(),
            tagline: "JP1".to_string(),
            username: None,
            password: password.map(str::to_string),
            rank: Some("Gold 2".to_string()),
        };

        let kept = store.update_account(&edit(None)).unwrap();
        assert_eq!(kept.rank.as_deref(), Some("Gold 2"));
        assert_eq!(
            store.reveal_password(account.id).unwrap().unwrap().as_str(),
            "first"
        );

        store.update_account(&edit(Some("second"))).unwrap();
        assert_eq!(
            store.reveal_password(account.id).unwrap().unwrap().as_str(),
            "second"
        );

        let cleared = store.update_account(&edit(Some(""))).unwrap();
        assert!(!cleared.has_password);
        assert!(store.reveal_password(account.id).unwrap().is_none());
    }

    #[test]
    fn test_tampered_password_fails_authentication() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_test_store(temp_dir.path());
        let account = store
            .create_account(&NewAccount {
                password: Some("secret".to_string()),
                ..new_account("Player", "JP1")
            })
            .unwrap();

        let mut blob = account.encrypted_password.clone();
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        store
            .connection()
            .unwrap()
            .execute(
                "UPDATE accounts SET encrypted_password = ?1 WHERE id = ?2",
                (&blob, account.id),
            )
            .unwrap();

        let err = store.reveal_password(account.id).unwrap_err();
        assert!(matches!(err, AppError::Vault(VaultError::AuthenticationFailed)));
    }

    #[test]
    fn test_set_active_keeps_single_active() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_test_store(temp_dir.path());
        let a = store.create_account(&new_account("A", "1")).unwrap();
        let b = store.create_account(&new_account("B", "2")).unwrap();

        store.set_active(Some(a.id)).unwrap();
        assert_eq!(active_flags(&store), vec![(a.id, true), (b.id, false)]);
        assert_eq!(settings_pointer(&store), Some(a.id));

        store.set_active(Some(b.id)).unwrap();
        assert_eq!(active_flags(&store), vec![(a.id, false), (b.id, true)]);
        assert_eq!(settings_pointer(&store), Some(b.id));
        assert_eq!(store.active_account().unwrap().unwrap().id, b.id);

        store.set_active(None).unwrap();
        assert_eq!(active_flags(&store), vec![(a.id, false), (b.id, false)]);
        assert_eq!(settings_pointer(&store), None);
        assert!(store.active_account().unwrap().is_none());
    }

    #[test]
    fn test_set_active_unknown_account_changes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_test_store(temp_dir.path());
        let a = store.create_account(&new_account("A", "1")).unwrap();
        store.set_active(Some(a.id)).unwrap();

        let err = store.set_active(Some(999)).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(settings_pointer(&store), Some(a.id));
    }

    #[test]
    fn test_second_active_flag_rejected_by_index() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_test_store(temp_dir.path());
        store.create_account(&new_account("A", "1")).unwrap();
        store.create_account(&new_account("B", "2")).unwrap();

        let result = store
            .connection()
            .unwrap()
            .execute("UPDATE accounts SET is_active = 1", []);
        assert!(result.is_err());
    }

    #[test]
    fn test_delete_active_clears_pointer() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_test_store(temp_dir.path());
        let a = store.create_account(&new_account("A", "1")).unwrap();
        let b = store.create_account(&new_account("B", "2")).unwrap();

        store.set_active(Some(b.id)).unwrap();
        store.delete_account(a.id).unwrap();
        assert_eq!(settings_pointer(&store), Some(b.id));

        store.delete_account(b.id).unwrap();
        assert_eq!(settings_pointer(&store), None);
        assert!(store.list_accounts().unwrap().is_empty());
    }

    #[test]
    fn test_delete_active_clears_pointer_without_foreign_key() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("legacy.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE settings (
                     id INTEGER PRIMARY KEY CHECK (id = 1),
                     active_account_id INTEGER,
                     riot_client_path TEXT,
                     account_data_path TEXT,
                     henrikdev_api_key TEXT,
                     created_at TEXT NOT NULL DEFAULT (datetime('now')),
                     updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                 );
                 CREATE TABLE storefront_cache (
                     account_id INTEGER PRIMARY KEY,
                     daily_offers_json TEXT NOT NULL,
                     night_market_json TEXT,
                     expires_at INTEGER NOT NULL,
                     nm_expires_at INTEGER,
                     cached_at INTEGER NOT NULL
                 );
                 INSERT INTO settings (id) VALUES (1);",
            )
            .unwrap();
        }

        let db = Database::open(&path).unwrap();
        let vault = Arc::new(CredentialVault::new(Arc::new(
            crate::crypto::MemoryCustody::default(),
        )));
        let store = AccountStore::new(db, vault);
        let a = store.create_account(&new_account("A", "1")).unwrap();
        store.set_active(Some(a.id)).unwrap();
        store
            .connection()
            .unwrap()
            .execute(
                "INSERT INTO storefront_cache (account_id, daily_offers_json, expires_at, cached_at)
                 VALUES (?1, '[]', 0, 0)",
                [a.id],
            )
            .unwrap();

        store.delete_account(a.id).unwrap();

        assert_eq!(settings_pointer(&store), None);
        assert!(store.active_account().unwrap().is_none());
        let cached: i64 = store
            .connection()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM storefront_cache", [], |row| row.get(0))
            .unwrap();
        assert_eq!(cached, 0);
    }

    #[test]
    fn test_missing_account_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_test_store(temp_dir.path());

        assert!(matches!(store.get_account(42), Err(AppError::NotFound(_))));
        assert!(matches!(store.delete_account(42), Err(AppError::NotFound(_))));
        assert!(matches!(store.set_rank(42, Some("Iron 1")), Err(AppError::NotFound(_))));
        assert!(matches!(store.reveal_password(42), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_set_rank() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_test_store(temp_dir.path());
        let a = store.create_account(&new_account("A", "1")).unwrap();

        let ranked = store.set_rank(a.id, Some("Diamond 3")).unwrap();
        assert_eq!(ranked.rank.as_deref(), Some("Diamond 3"));

        let cleared = store.set_rank(a.id, None).unwrap();
        assert!(cleared.rank.is_none());
    }
}
