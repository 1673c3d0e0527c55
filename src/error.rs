use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use crate::crypto::VaultError;
use crate::fs::FsError;
use crate::shop::ShopError;

/// Switch phase in which an I/O failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchPhase {
    Deactivating,
    Activating,
    Vacating,
    Importing,
}

impl std::fmt::Display for SwitchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Deactivating => "deactivating",
            Self::Activating => "activating",
            Self::Vacating => "vacating",
            Self::Importing => "importing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error("Process busy: {0}")]
    ProcessBusy(String),

    #[error("Another account switch is already in progress")]
    SwitchInProgress,

    /// The shared session location may be partially written.
    #[error(
        "Account switch failed while {phase}: {source}. \
         The Riot Client data folder may be inconsistent and needs manual checking"
    )]
    SwitchFailed {
        phase: SwitchPhase,
        #[source]
        source: FsError,
    },

    #[error("Failed to launch Riot Client: {0}")]
    Launch(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Failed to read session cookies: {0}")]
    Cookies(String),

    #[error(transparent)]
    Shop(#[from] ShopError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Fs(#[from] FsError),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl AppError {
    /// Stable identifier for the UI to branch on.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Conflict(_) => "conflict",
            Self::NotFound(_) => "not_found",
            Self::Vault(VaultError::AuthenticationFailed) => "authentication_failure",
            Self::Vault(_) => "vault",
            Self::ProcessBusy(_) => "process_busy",
            Self::SwitchInProgress => "switch_in_progress",
            Self::SwitchFailed { .. } => "switch_failed",
            Self::Launch(_) => "launch_failed",
            Self::Process(_) => "process",
            Self::Cookies(_) => "cookies",
            Self::Shop(e) => e.kind(),
            Self::Database(_) => "database",
            Self::Config(_) => "config",
            Self::Fs(_) => "io",
            Self::Task(_) => "task",
        }
    }
}

impl Serialize for AppError {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("AppError", 2)?;
        state.serialize_field("kind", self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Task(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_kind_and_message() {
        let err = AppError::ProcessBusy("Riot Client is running".to_string());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "process_busy");
        assert_eq!(json["message"], "Process busy: Riot Client is running");
    }

    #[test]
    fn test_authentication_failure_kind() {
        let err = AppError::from(VaultError::AuthenticationFailed);
        assert_eq!(err.kind(), "authentication_failure");
    }
}
