use std::path::{Path, PathBuf};

use crate::db::{Account, Settings};
use crate::error::{AppError, Result};

const DB_FILE_NAME: &str = "data.db";
const ACCOUNT_DATA_DIR: &str = "Data";
const SWITCH_MARKER_FILE: &str = ".switch-in-progress.json";

const RIOT_CLIENT_INSTALL_PATHS: &[&str] = &[
    r"C:\Riot Games\Riot Client\RiotClientServices.exe",
    r"C:\Program Files\Riot Games\Riot Client\RiotClientServices.exe",
    r"C:\Program Files (x86)\Riot Games\Riot Client\RiotClientServices.exe",
];

fn exe_dir() -> Result<PathBuf> {
    let exe_path = std::env::current_exe()
        .map_err(|e| AppError::Config(format!("Failed to get executable path: {}", e)))?;
    exe_path
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| AppError::Config("Failed to get executable directory".to_string()))
}

pub fn default_db_path() -> Result<PathBuf> {
    Ok(exe_dir()?.join(DB_FILE_NAME))
}

pub fn default_account_data_path() -> Result<PathBuf> {
    Ok(exe_dir()?.join(ACCOUNT_DATA_DIR))
}

/// `%LOCALAPPDATA%\Riot Games\Riot Client\Data`, when the variable is set.
pub fn default_riot_client_data_path() -> Option<PathBuf> {
    let localappdata = std::env::var_os("LOCALAPPDATA")?;
    Some(
        PathBuf::from(localappdata)
            .join("Riot Games")
            .join("Riot Client")
            .join("Data"),
    )
}

pub fn default_riot_client_service_path() -> PathBuf {
    PathBuf::from(RIOT_CLIENT_INSTALL_PATHS[0])
}

fn non_empty(value: &Option<String>) -> Option<PathBuf> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Effective filesystem locations, resolved from [`Settings`] and defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientPaths {
    pub service_path: Option<PathBuf>,
    /// The location the client reads its session from.
    pub shared_data: PathBuf,
    /// Root of per-account snapshot folders.
    pub account_data: PathBuf,
}

impl ClientPaths {
    pub fn resolve(settings: &Settings) -> Result<Self> {
        let shared_data = non_empty(&settings.riot_client_data_path)
            .or_else(default_riot_client_data_path)
            .ok_or_else(|| {
                AppError::Config("Riot Client data path is not configured".to_string())
            })?;

        let account_data = match non_empty(&settings.account_data_path) {
            Some(path) => path,
            None => default_account_data_path()?,
        };

        if shared_data.starts_with(&account_data) || account_data.starts_with(&shared_data) {
            return Err(AppError::Config(format!(
                "Riot Client data path {} and account data path {} must not overlap",
                shared_data.display(),
                account_data.display()
            )));
        }

        Ok(Self {
            service_path: non_empty(&settings.riot_client_service_path),
            shared_data,
            account_data,
        })
    }

    pub fn account_folder(&self, account: &Account) -> PathBuf {
        self.account_data.join(&account.data_folder)
    }

    /// Records the phase of a running switch so an interrupted one can be
    /// repaired on the next start.
    pub fn switch_marker(&self) -> PathBuf {
        self.account_data.join(SWITCH_MARKER_FILE)
    }

    /// Executable locations to try, configured path first.
    pub fn launch_candidates(&self) -> Vec<PathBuf> {
        let mut candidates: Vec<PathBuf> = self.service_path.iter().cloned().collect();
        for path in RIOT_CLIENT_INSTALL_PATHS.iter().map(PathBuf::from) {
            if !candidates.contains(&path) {
                candidates.push(path);
            }
        }
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(data: Option<&str>, accounts: Option<&str>, service: Option<&str>) -> Settings {
        Settings {
            id: 1,
            active_account_id: None,
            riot_client_service_path: service.map(str::to_string),
            riot_client_data_path: data.map(str::to_string),
            account_data_path: accounts.map(str::to_string),
            henrikdev_api_key: None,
            region: None,
            launched: false,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_resolve_explicit_paths() {
        let paths =
            ClientPaths::resolve(&settings(Some("/riot/Data"), Some("/app/Data"), None)).unwrap();
        assert_eq!(paths.shared_data, PathBuf::from("/riot/Data"));
        assert_eq!(paths.account_data, PathBuf::from("/app/Data"));
        assert!(paths.service_path.is_none());
        assert_eq!(
            paths.switch_marker(),
            PathBuf::from("/app/Data").join(SWITCH_MARKER_FILE)
        );
    }

    #[test]
    fn test_default_account_data_path() {
        let paths = ClientPaths::resolve(&settings(Some("/riot/Data"), Some("  "), None)).unwrap();
        assert!(paths.account_data.ends_with(ACCOUNT_DATA_DIR));
    }

    #[test]
    fn test_overlapping_paths_rejected() {
        for (data, accounts) in [
            ("/riot/Data", "/riot/Data"),
            ("/riot/Data/inner", "/riot/Data"),
            ("/riot", "/riot/Data/accounts"),
        ] {
            let result = ClientPaths::resolve(&settings(Some(data), Some(accounts), None));
            assert!(matches!(result, Err(AppError::Config(_))), "{} {}", data, accounts);
        }
    }

    #[test]
    fn test_launch_candidates_prefer_configured_path() {
        let paths = ClientPaths::resolve(&settings(
            Some("/riot/Data"),
            Some("/app/Data"),
            Some(r"D:\Games\Riot Client\RiotClientServices.exe"),
        ))
        .unwrap();
        let candidates = paths.launch_candidates();
        assert_eq!(candidates.len(), 4);
        assert_eq!(
            candidates[0],
            PathBuf::from(r"D:\Games\Riot Client\RiotClientServices.exe")
        );
        assert_eq!(candidates[1], default_riot_client_service_path());
    }

    #[test]
    fn test_launch_candidates_skip_duplicate_default() {
        let default = default_riot_client_service_path();
        let paths = ClientPaths::resolve(&settings(
            Some("/riot/Data"),
            Some("/app/Data"),
            default.to_str(),
        ))
        .unwrap();
        assert_eq!(paths.launch_candidates().len(), RIOT_CLIENT_INSTALL_PATHS.len());
    }
}
