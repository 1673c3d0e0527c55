use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use zeroize::Zeroizing;

use crate::config::{self, ClientPaths};
use crate::cookies::{self, RiotCookies};
use crate::crypto::CredentialVault;
use crate::db::{Account, AccountStore, Database, NewAccount, Settings, UpdateAccount, UpdateSettings};
use crate::error::{AppError, Result};
use crate::process::{ClientKind, MonitorHandle, ProcessCoordinator, ProcessEvent};
use crate::session::{SessionSwitcher, SwitchGuard, SwitchOutcome, SwitchState};
use crate::shop::{self, Storefront, StorefrontCache};

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

/// Result of [`Core::get_shop`].
#[derive(Debug, Clone, Serialize)]
pub struct ShopResponse {
    pub storefront: Storefront,
    /// Cookies after re-auth, for the caller to persist. `None` when served
    /// from cache.
    pub refreshed_cookies: Option<RiotCookies>,
    pub cached: bool,
}

/// Everything the UI calls into.
pub struct Core {
    store: AccountStore,
    switcher: Arc<SessionSwitcher>,
    coordinator: Arc<ProcessCoordinator>,
    cache: StorefrontCache,
}

impl Core {
    pub fn new(store: AccountStore, coordinator: ProcessCoordinator) -> Self {
        Self {
            cache: StorefrontCache::new(store.database().clone()),
            switcher: Arc::new(SessionSwitcher::new(store.clone())),
            coordinator: Arc::new(coordinator),
            store,
        }
    }

    /// Open the database at `db_path` with the OS keyring and the system
    /// process probe.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db = Database::open(db_path)?;
        let vault = Arc::new(CredentialVault::with_os_keyring());
        Ok(Self::new(
            AccountStore::new(db, vault),
            ProcessCoordinator::with_system_probe(),
        ))
    }

    /// [`Core::open`] on `data.db` next to the executable.
    pub fn open_default() -> Result<Self> {
        Self::open(config::default_db_path()?)
    }

    async fn acquire_switch(&self) -> Result<SwitchGuard> {
        let ticket = self.switcher.begin()?;
        let permit = self.coordinator.lock_for_switch().await?;
        Ok(ticket.authorize(permit))
    }

    // -- Accounts -------------------------------------------------------------

    pub async fn add_account(&self, account: NewAccount) -> Result<Account> {
        if !account.use_current_data {
            let store = self.store.clone();
            return blocking(move || store.create_account(&account)).await;
        }

        let guard = self.acquire_switch().await?;
        let store = self.store.clone();
        let switcher = self.switcher.clone();
        blocking(move || {
            if !switcher.current_data_available()? {
                return Err(AppError::NotFound(
                    "No unowned session data to import".to_string(),
                ));
            }
            let created = store.create_account(&account)?;

            log::info!("Auto-selecting account {} after current data import", created.id);
            if let Err(e) = switcher.import_current(&guard, created.id) {
                log::warn!("Import failed, removing account {}", created.id);
                if let Err(cleanup) = store
                    .delete_account(created.id)
                    .and_then(|removed| switcher.remove_account_folder(&removed))
                {
                    log::error!("Failed to remove account {}: {}", created.id, cleanup);
                }
                return Err(e);
            }
            store.get_account(created.id)
        })
        .await
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        let store = self.store.clone();
        blocking(move || store.list_accounts()).await
    }

    pub async fn edit_account(&self, account: UpdateAccount) -> Result<Account> {
        let store = self.store.clone();
        blocking(move || store.update_account(&account)).await
    }

    /// Delete an account and its snapshot folder. The active account's
    /// session is vacated first.
    pub async fn delete_account(&self, account_id: i64) -> Result<Account> {
        let ticket = self.switcher.begin()?;
        let store = self.store.clone();
        let is_active = {
            let store = store.clone();
            blocking(move || Ok(store.get_account(account_id)?.is_active)).await?
        };

        // An inactive account only needs the ticket, so it cannot be
        // switched to while its folder is removed.
        let (guard, ticket) = if is_active {
            let permit = self.coordinator.lock_for_switch().await?;
            (Some(ticket.authorize(permit)), None)
        } else {
            (None, Some(ticket))
        };

        let switcher = self.switcher.clone();
        blocking(move || {
            let _ticket = ticket;
            if let Some(guard) = &guard {
                log::info!("Deleting active account {}, vacating session", account_id);
                switcher.release(guard)?;
            }
            let account = store.delete_account(account_id)?;
            switcher.remove_account_folder(&account)?;
            log::info!("Deleted account {}", account.display_name());
            Ok(account)
        })
        .await
    }

    pub async fn set_account_rank(&self, account_id: i64, rank: Option<String>) -> Result<Account> {
        let store = self.store.clone();
        blocking(move || store.set_rank(account_id, rank.as_deref())).await
    }

    /// The stored password in plaintext, `None` if none is stored.
    pub async fn reveal_password(&self, account_id: i64) -> Result<Option<Zeroizing<String>>> {
        let store = self.store.clone();
        blocking(move || store.reveal_password(account_id)).await
    }

    // -- Settings -------------------------------------------------------------

    pub async fn get_settings(&self) -> Result<Settings> {
        let store = self.store.clone();
        blocking(move || store.get_settings()).await
    }

    /// Data paths can only move while nobody is active; the resulting
    /// locations must not overlap.
    pub async fn update_settings(&self, update: UpdateSettings) -> Result<Settings> {
        let store = self.store.clone();
        blocking(move || {
            if update.changes_data_paths() {
                if let Some(active) = store.active_account()? {
                    return Err(AppError::Conflict(format!(
                        "Log out {} before changing data paths",
                        active.display_name()
                    )));
                }
                let mut next = store.get_settings()?;
                if let Some(path) = &update.riot_client_data_path {
                    next.riot_client_data_path = Some(path.clone());
                }
                if let Some(path) = &update.account_data_path {
                    next.account_data_path = Some(path.clone());
                }
                ClientPaths::resolve(&next)?;
            }
            store.update_settings(&update)
        })
        .await
    }

    pub async fn mark_launched(&self) -> Result<()> {
        let store = self.store.clone();
        blocking(move || store.mark_launched()).await
    }

    // -- Switching ------------------------------------------------------------

    pub async fn check_current_data_available(&self) -> Result<bool> {
        let switcher = self.switcher.clone();
        blocking(move || switcher.current_data_available()).await
    }

    /// Switch to `account_id`, or log out with `None` or the active id.
    pub async fn switch_account(&self, account_id: Option<i64>) -> Result<SwitchOutcome> {
        let guard = self.acquire_switch().await?;
        let switcher = self.switcher.clone();
        blocking(move || switcher.switch_to(&guard, account_id)).await
    }

    pub fn switch_state(&self) -> SwitchState {
        self.switcher.state()
    }

    /// Repair an interrupted switch. Call once at startup.
    pub async fn recover(&self) -> Result<bool> {
        let guard = self.acquire_switch().await?;
        let switcher = self.switcher.clone();
        blocking(move || switcher.recover(&guard)).await
    }

    // -- Processes ------------------------------------------------------------

    pub async fn get_process_status(&self, kind: ClientKind) -> Result<bool> {
        self.coordinator.is_running(kind).await
    }

    pub async fn kill_process(&self, kind: ClientKind) -> Result<()> {
        self.coordinator.kill(kind).await
    }

    /// Returns the executable that was started.
    pub async fn launch_client(&self) -> Result<PathBuf> {
        let settings = self.get_settings().await?;
        let paths = ClientPaths::resolve(&settings)?;
        self.coordinator.launch(&paths).await
    }

    pub fn subscribe_process_events(&self) -> broadcast::Receiver<ProcessEvent> {
        self.coordinator.subscribe()
    }

    pub fn start_process_monitor(&self) -> MonitorHandle {
        self.coordinator.start_monitor()
    }

    // -- Shop -----------------------------------------------------------------

    /// Cookies of the installed session. `None` unless `account_id` is the
    /// active account.
    pub async fn get_account_cookies(&self, account_id: i64) -> Result<Option<RiotCookies>> {
        let store = self.store.clone();
        blocking(move || {
            let account = store.get_account(account_id)?;
            let active = store.active_account()?;
            if active.map(|a| a.id) != Some(account.id) {
                log::debug!("{} is not active, no cookies to read", account.display_name());
                return Ok(None);
            }
            let paths = ClientPaths::resolve(&store.get_settings()?)?;
            cookies::read_session_cookies(&paths.shared_data)
        })
        .await
    }

    /// Cached storefront, or a fresh fetch with `cookies` on a miss.
    pub async fn get_shop(&self, account_id: i64, cookies: RiotCookies) -> Result<ShopResponse> {
        let store = self.store.clone();
        let cache = self.cache.clone();
        let cached = blocking(move || {
            store.get_account(account_id)?;
            Ok(cache.load(account_id).unwrap_or_else(|e| {
                log::warn!("Cache: lookup failed for account {}: {}", account_id, e);
                None
            }))
        })
        .await?;

        if let Some(storefront) = cached {
            return Ok(ShopResponse {
                storefront,
                refreshed_cookies: None,
                cached: true,
            });
        }

        let (storefront, refreshed) = shop::fetch_storefront(&cookies).await?;

        let cache = self.cache.clone();
        let to_save = storefront.clone();
        blocking(move || {
            if let Err(e) = cache.save(account_id, &to_save) {
                log::warn!("Cache: failed to save for account {}: {}", account_id, e);
            }
            Ok(())
        })
        .await?;

        Ok(ShopResponse {
            storefront,
            refreshed_cookies: Some(refreshed),
            cached: false,
        })
    }
}
