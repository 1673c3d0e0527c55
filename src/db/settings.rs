use rusqlite::Connection;

use super::accounts::AccountStore;
use super::models::{Settings, UpdateSettings};
use crate::error::Result;

pub(crate) fn read_settings(conn: &Connection) -> Result<Settings> {
    let settings = conn.query_row(
        "SELECT id, active_account_id, riot_client_service_path, riot_client_data_path, account_data_path, henrikdev_api_key, region, launched, created_at, updated_at
         FROM settings
         WHERE id = 1",
        [],
        |row| {
            Ok(Settings {
                id: row.get(0)?,
                active_account_id: row.get(1)?,
                riot_client_service_path: row.get(2)?,
                riot_client_data_path: row.get(3)?,
                account_data_path: row.get(4)?,
                henrikdev_api_key: row.get(5)?,
                region: row.get(6)?,
                launched: row.get::<_, i64>(7)? != 0,
                created_at: row.get(8)?,
                updated_at: row.get(9)?,
            })
        },
    )?;
    Ok(settings)
}

impl AccountStore {
    pub fn get_settings(&self) -> Result<Settings> {
        let conn = self.connection()?;
        read_settings(&conn)
    }

    pub fn update_settings(&self, update: &UpdateSettings) -> Result<Settings> {
        let conn = self.connection()?;

        conn.execute(
            "UPDATE settings
             SET riot_client_service_path = COALESCE(?1, riot_client_service_path),
                 riot_client_data_path = COALESCE(?2, riot_client_data_path),
                 account_data_path = COALESCE(?3, account_data_path),
                 henrikdev_api_key = COALESCE(?4, henrikdev_api_key),
                 region = COALESCE(?5, region),
                 updated_at = datetime('now')
             WHERE id = 1",
            (
                &update.riot_client_service_path,
                &update.riot_client_data_path,
                &update.account_data_path,
                &update.henrikdev_api_key,
                &update.region,
            ),
        )?;

        read_settings(&conn)
    }

    pub fn mark_launched(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "UPDATE settings SET launched = 1, updated_at = datetime('now') WHERE id = 1",
            [],
        )?;
        Ok(())
    }
}
