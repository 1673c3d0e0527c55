use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::state::{SwitchMarker, SwitchOutcome, SwitchState};
use crate::config::ClientPaths;
use crate::db::{is_generated_folder_name, Account, AccountStore};
use crate::error::{AppError, Result, SwitchPhase};
use crate::fs::{self as snapshot, FsError};
use crate::process::SwitchPermit;

/// Claim on the switcher. Only one exists at a time.
pub struct SwitchTicket {
    flag: Arc<AtomicBool>,
}

impl SwitchTicket {
    pub fn authorize(self, permit: SwitchPermit) -> SwitchGuard {
        SwitchGuard {
            _ticket: self,
            _permit: permit,
        }
    }
}

impl Drop for SwitchTicket {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Required by every operation that writes the shared location.
pub struct SwitchGuard {
    _ticket: SwitchTicket,
    _permit: SwitchPermit,
}

/// Owns the client's shared session location and swaps account snapshots
/// in and out of it.
pub struct SessionSwitcher {
    store: AccountStore,
    state: Mutex<SwitchState>,
    in_flight: Arc<AtomicBool>,
}

impl SessionSwitcher {
    pub fn new(store: AccountStore) -> Self {
        Self {
            store,
            state: Mutex::new(SwitchState::Idle),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> SwitchState {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_state(&self, state: SwitchState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Reject a second switch while one is in flight.
    pub fn begin(&self) -> Result<SwitchTicket> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| AppError::SwitchInProgress)?;
        Ok(SwitchTicket {
            flag: self.in_flight.clone(),
        })
    }

    fn paths(&self) -> Result<ClientPaths> {
        ClientPaths::resolve(&self.store.get_settings()?)
    }

    /// Switch to `target`. Re-selecting the active account, or passing
    /// `None`, logs the active account out.
    pub fn switch_to(&self, _guard: &SwitchGuard, target: Option<i64>) -> Result<SwitchOutcome> {
        let paths = self.paths()?;
        self.settle(&paths)?;
        let current = self.store.active_account()?;

        let target = match (target, &current) {
            (None, None) => {
                log::info!("No account is active, nothing to switch");
                return Ok(SwitchOutcome::Unchanged);
            }
            (None, Some(_)) => None,
            (Some(id), Some(active)) if active.id == id => None,
            (Some(id), _) => Some(self.store.get_account(id)?),
        };

        log::info!(
            "Starting account switch: {} -> {}",
            current
                .as_ref()
                .map(Account::display_name)
                .unwrap_or_else(|| "<none>".to_string()),
            target
                .as_ref()
                .map(Account::display_name)
                .unwrap_or_else(|| "<logged out>".to_string())
        );

        let result = self.run_switch(&paths, current.as_ref(), target.as_ref());
        self.finish(&paths, result)
    }

    fn run_switch(
        &self,
        paths: &ClientPaths,
        current: Option<&Account>,
        target: Option<&Account>,
    ) -> Result<SwitchOutcome> {
        if let Some(current) = current {
            self.run_phase(
                paths,
                SwitchPhase::Deactivating,
                SwitchState::Deactivating {
                    account_id: current.id,
                },
                Some(current.id),
                Some(&paths.shared_data),
                &paths.account_folder(current),
            )?;
        }

        match (target, current) {
            (Some(target), _) => {
                self.install(paths, target)?;
                self.store.set_active(Some(target.id))?;
                log::info!("Account switch completed: {} is active", target.display_name());
                Ok(SwitchOutcome::Activated {
                    account_id: target.id,
                })
            }
            (None, Some(current)) => {
                self.vacate(paths)?;
                self.store.set_active(None)?;
                log::info!("Logged out {}", current.display_name());
                Ok(SwitchOutcome::LoggedOut {
                    account_id: current.id,
                })
            }
            (None, None) => Ok(SwitchOutcome::Unchanged),
        }
    }

    /// Copy the account's saved snapshot into the shared location, or reset
    /// it when the account has never been saved.
    fn install(&self, paths: &ClientPaths, account: &Account) -> Result<()> {
        let folder = paths.account_folder(account);
        let source = folder.is_dir().then_some(folder.as_path());
        if source.is_none() {
            log::info!(
                "No saved session for {}, starting from client defaults",
                account.display_name()
            );
        }
        self.run_phase(
            paths,
            SwitchPhase::Activating,
            SwitchState::Activating {
                account_id: account.id,
            },
            Some(account.id),
            source,
            &paths.shared_data,
        )
    }

    fn vacate(&self, paths: &ClientPaths) -> Result<()> {
        self.run_phase(
            paths,
            SwitchPhase::Vacating,
            SwitchState::Vacating,
            None,
            None,
            &paths.shared_data,
        )
    }

    fn run_phase(
        &self,
        paths: &ClientPaths,
        phase: SwitchPhase,
        state: SwitchState,
        account_id: Option<i64>,
        source: Option<&Path>,
        dest: &Path,
    ) -> Result<()> {
        self.set_state(state);
        SwitchMarker::new(phase, account_id)
            .write(&paths.switch_marker())
            .and_then(|()| snapshot::snapshot_into(source, dest))
            .map_err(|e| self.fail(phase, source, dest, e))
    }

    fn fail(&self, phase: SwitchPhase, source: Option<&Path>, dest: &Path, e: FsError) -> AppError {
        log::error!(
            "Account switch failed while {}: {} (from: {}, to: {})",
            phase,
            e,
            source
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<client defaults>".to_string()),
            dest.display()
        );
        self.set_state(SwitchState::Failed {
            phase,
            reason: e.to_string(),
        });
        AppError::SwitchFailed { phase, source: e }
    }

    fn finish<T>(&self, paths: &ClientPaths, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => {
                if let Err(e) = SwitchMarker::clear(&paths.switch_marker()) {
                    log::warn!("{}", e);
                }
                self.set_state(SwitchState::Idle);
            }
            Err(AppError::SwitchFailed { .. }) => {}
            Err(_) => self.set_state(SwitchState::Idle),
        }
        result
    }

    /// Snapshot the unowned session in the shared location into `account_id`'s
    /// folder and make that account active.
    pub fn import_current(&self, _guard: &SwitchGuard, account_id: i64) -> Result<()> {
        let paths = self.paths()?;
        self.settle(&paths)?;
        if let Some(active) = self.store.active_account()? {
            return Err(AppError::Conflict(format!(
                "The current session belongs to {}",
                active.display_name()
            )));
        }
        if snapshot::is_empty_dir(&paths.shared_data) {
            return Err(AppError::NotFound(
                "No current session data to import".to_string(),
            ));
        }
        let account = self.store.get_account(account_id)?;

        log::info!("Importing current session into {}", account.display_name());
        let result = self
            .run_phase(
                &paths,
                SwitchPhase::Importing,
                SwitchState::Importing {
                    account_id: account.id,
                },
                Some(account.id),
                Some(&paths.shared_data),
                &paths.account_folder(&account),
            )
            .and_then(|()| self.store.set_active(Some(account.id)));
        self.finish(&paths, result)
    }

    /// Reset the shared location without saving it and clear the active
    /// pointer.
    pub fn release(&self, _guard: &SwitchGuard) -> Result<()> {
        let paths = self.paths()?;
        self.settle(&paths)?;
        log::info!("Releasing shared session location");
        let result = self
            .vacate(&paths)
            .and_then(|()| self.store.set_active(None));
        self.finish(&paths, result)
    }

    /// Repair the effects of a switch interrupted by a crash or power loss.
    /// Returns whether an interrupted switch was found.
    pub fn recover(&self, _guard: &SwitchGuard) -> Result<bool> {
        let paths = self.paths()?;
        self.recover_at(&paths)
    }

    /// Run recovery when a previous switch left a marker or failed. The
    /// shared location cannot be trusted until then.
    fn settle(&self, paths: &ClientPaths) -> Result<()> {
        let failed = matches!(self.state(), SwitchState::Failed { .. });
        if failed || paths.switch_marker().exists() {
            log::warn!("Previous account switch did not complete, recovering first");
            self.recover_at(paths)?;
        }
        Ok(())
    }

    fn recover_at(&self, paths: &ClientPaths) -> Result<bool> {
        snapshot::recover_snapshot(&paths.shared_data)?;
        for account in self.store.list_accounts()? {
            snapshot::recover_snapshot(&paths.account_folder(&account))?;
        }

        let marker_path = paths.switch_marker();
        let Some(marker) = SwitchMarker::read(&marker_path)? else {
            self.set_state(SwitchState::Idle);
            return Ok(false);
        };
        log::warn!(
            "Found interrupted switch while {} (account {:?}, started at {})",
            marker.phase,
            marker.account_id,
            marker.started_at
        );

        let result = if marker.touches_shared_location() {
            match self.store.active_account()? {
                Some(active) => {
                    log::info!("Reinstalling session of {}", active.display_name());
                    self.install(paths, &active)
                }
                None => self.vacate(paths),
            }
        } else {
            Ok(())
        };
        self.finish(paths, result).map(|()| true)
    }

    /// True when no account is active and the shared location holds a
    /// session that can be imported.
    pub fn current_data_available(&self) -> Result<bool> {
        let paths = self.paths()?;
        Ok(self.store.active_account()?.is_none() && !snapshot::is_empty_dir(&paths.shared_data))
    }

    /// Delete a removed account's snapshot folder. Only generated folder
    /// names directly under the account data root are ever deleted.
    pub fn remove_account_folder(&self, account: &Account) -> Result<()> {
        let paths = self.paths()?;
        let folder = paths.account_folder(account);

        if !is_generated_folder_name(&account.data_folder)
            || folder.parent() != Some(paths.account_data.as_path())
        {
            log::warn!(
                "Refusing to delete unexpected data folder {}",
                folder.display()
            );
            return Ok(());
        }

        snapshot::recover_snapshot(&folder)?;
        snapshot::remove_dir_if_exists(&folder)?;
        log::info!("Removed data folder {}", folder.display());
        Ok(())
    }
}
