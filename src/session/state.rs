use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SwitchPhase;
use crate::fs::FsError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SwitchState {
    Idle,
    /// Saving the shared location into the current account's folder.
    Deactivating { account_id: i64 },
    /// Installing the target account's folder into the shared location.
    Activating { account_id: i64 },
    /// Resetting the shared location to the client's defaults.
    Vacating,
    Importing { account_id: i64 },
    Failed { phase: SwitchPhase, reason: String },
}

/// What a completed switch did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SwitchOutcome {
    Activated { account_id: i64 },
    LoggedOut { account_id: i64 },
    /// Nobody was active and nobody was requested.
    Unchanged,
}

/// On-disk record of the phase a switch is in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct SwitchMarker {
    pub(crate) phase: SwitchPhase,
    pub(crate) account_id: Option<i64>,
    pub(crate) started_at: i64,
}

impl SwitchMarker {
    pub(crate) fn new(phase: SwitchPhase, account_id: Option<i64>) -> Self {
        Self {
            phase,
            account_id,
            started_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Whether the shared location may have been partly replaced.
    pub(crate) fn touches_shared_location(&self) -> bool {
        matches!(self.phase, SwitchPhase::Activating | SwitchPhase::Vacating)
    }

    pub(crate) fn write(&self, path: &Path) -> Result<(), FsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| FsError::new("create directory", parent, e))?;
        }
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| FsError::new("encode switch marker", path, e.into()))?;
        std::fs::write(path, json).map_err(|e| FsError::new("write switch marker", path, e))
    }

    /// `Ok(None)` when no switch was interrupted. An unreadable marker is
    /// reported as an interrupted activation of an unknown account.
    pub(crate) fn read(path: &Path) -> Result<Option<Self>, FsError> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(FsError::new("read switch marker", path, e)),
        };
        match serde_json::from_slice(&bytes) {
            Ok(marker) => Ok(Some(marker)),
            Err(e) => {
                log::warn!("Unreadable switch marker {}: {}", path.display(), e);
                Ok(Some(Self::new(SwitchPhase::Activating, None)))
            }
        }
    }

    pub(crate) fn clear(path: &Path) -> Result<(), FsError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FsError::new("remove switch marker", path, e)),
        }
    }
}
