use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub riot_id: String,
    pub tagline: String,
    pub username: Option<String>,
    #[serde(skip_serializing, default)]
    pub encrypted_password: Vec<u8>,
    pub has_password: bool,
    pub rank: Option<String>,
    pub is_active: bool,
    pub data_folder: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Account {
    pub fn display_name(&self) -> String {
        format!("{}#{}", self.riot_id, self.tagline)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewAccount {
    pub riot_id: String,
    pub tagline: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub rank: Option<String>,
    /// Import the unowned session currently in the client's data folder.
    #[serde(default)]
    pub use_current_data: bool,
}

/// `password: None` keeps the stored password, `Some("")` clears it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateAccount {
    pub id: i64,
    pub riot_id: String,
    pub tagline: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub rank: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub id: i64,
    pub active_account_id: Option<i64>,
    pub riot_client_service_path: Option<String>,
    pub riot_client_data_path: Option<String>,
    pub account_data_path: Option<String>,
    pub henrikdev_api_key: Option<String>,
    pub region: Option<String>,
    pub launched: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Partial update; `None` fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSettings {
    pub riot_client_service_path: Option<String>,
    pub riot_client_data_path: Option<String>,
    pub account_data_path: Option<String>,
    pub henrikdev_api_key: Option<String>,
    pub region: Option<String>,
}

impl UpdateSettings {
    pub fn changes_data_paths(&self) -> bool {
        self.riot_client_data_path.is_some() || self.account_data_path.is_some()
    }
}
