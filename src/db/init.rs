use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::Connection;

use super::accounts;
use crate::config;
use crate::error::{AppError, Result};

const SCHEMA_SQL: &str = include_str!("schema.sql");

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the SQLite file. Every operation opens its own connection.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    /// Open (creating if needed) the database at `path`, apply the schema and
    /// migrations, and fill in default client paths on first run.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let db = Self { path: path.into() };

        if let Some(parent) = db.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AppError::Config(format!(
                        "Failed to create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let conn = db.connection()?;
        conn.execute_batch(SCHEMA_SQL)?;
        run_migrations(&conn)?;
        apply_default_paths(&conn)?;

        log::info!("Database ready at {}", db.path.display());
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn connection(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(conn)
    }
}

fn apply_default_paths(conn: &Connection) -> Result<()> {
    let default_service_path = config::default_riot_client_service_path()
        .to_string_lossy()
        .to_string();
    let default_data_path = config::default_riot_client_data_path()
        .map(|p| p.to_string_lossy().to_string());

    conn.execute(
        "UPDATE settings
         SET riot_client_service_path = COALESCE(riot_client_service_path, ?1),
             riot_client_data_path = COALESCE(riot_client_data_path, ?2)
         WHERE id = 1",
        (default_service_path, default_data_path),
    )?;
    Ok(())
}

fn run_migrations(conn: &Connection) -> Result<()> {
    // Each statement fails harmlessly once it has been applied.
    let _ = conn.execute("ALTER TABLE accounts ADD COLUMN data_folder TEXT", []);
    let _ = conn.execute("ALTER TABLE accounts RENAME COLUMN email TO username", []);
    let _ = conn.execute(
        "ALTER TABLE settings RENAME COLUMN riot_client_path TO riot_client_service_path",
        [],
    );
    let _ = conn.execute("ALTER TABLE settings ADD COLUMN riot_client_data_path TEXT", []);
    let _ = conn.execute(
        "ALTER TABLE settings ADD COLUMN launched INTEGER NOT NULL DEFAULT 0",
        [],
    );
    let _ = conn.execute("ALTER TABLE settings ADD COLUMN region TEXT", []);
    let _ = conn.execute("ALTER TABLE storefront_cache ADD COLUMN bundles_json TEXT", []);

    assign_missing_data_folders(conn)?;
    create_indexes(conn);

    Ok(())
}

/// Older databases created accounts without a snapshot folder name.
fn assign_missing_data_folders(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare("SELECT id FROM accounts WHERE data_folder IS NULL")?;
    let account_ids: Vec<i64> = stmt
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    for id in account_ids {
        let data_folder = accounts::generate_data_folder_name(id);
        log::info!("Assigning data folder {} to account {}", data_folder, id);
        conn.execute(
            "UPDATE accounts SET data_folder = ?1 WHERE id = ?2",
            (&data_folder, id),
        )?;
    }
    Ok(())
}

fn create_indexes(conn: &Connection) {
    let indexes = [
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_accounts_riot_id ON accounts(riot_id, tagline)",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_accounts_username ON accounts(username)",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_accounts_data_folder ON accounts(data_folder)",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_accounts_single_active ON accounts(is_active) WHERE is_active = 1",
    ];
    for sql in indexes {
        if let Err(e) = conn.execute(sql, []) {
            log::warn!("Failed to create index ({}): {}", sql, e);
        }
    }
}
