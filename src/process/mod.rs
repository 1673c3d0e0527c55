mod probe;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex, OwnedMutexGuard};

#[cfg(test)]
pub(crate) use probe::fake::FakeProbe;
pub use probe::{ProcessProbe, SystemProbe};

use crate::config::ClientPaths;
use crate::error::{AppError, Result};

const MONITOR_INTERVAL: Duration = Duration::from_secs(2);
const KILL_TIMEOUT: Duration = Duration::from_secs(10);
const KILL_POLL: Duration = Duration::from_millis(100);
const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientKind {
    RiotClient,
    Valorant,
}

impl ClientKind {
    pub const ALL: [ClientKind; 2] = [ClientKind::RiotClient, ClientKind::Valorant];

    pub fn process_name(self) -> &'static str {
        match self {
            Self::RiotClient => "RiotClientServices.exe",
            Self::Valorant => "VALORANT-Win64-Shipping.exe",
        }
    }
}

impl fmt::Display for ClientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RiotClient => f.write_str("Riot Client"),
            Self::Valorant => f.write_str("VALORANT"),
        }
    }
}

/// Published by the monitor whenever a client starts or stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProcessEvent {
    pub kind: ClientKind,
    pub running: bool,
}

/// Proof that both clients were stopped when the gate was taken. Kill and
/// launch are refused until it is dropped.
pub struct SwitchPermit {
    _gate: OwnedMutexGuard<()>,
}

impl fmt::Debug for SwitchPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SwitchPermit")
    }
}

pub struct ProcessCoordinator {
    probe: Arc<dyn ProcessProbe>,
    gate: Arc<Mutex<()>>,
    events: broadcast::Sender<ProcessEvent>,
    kill_timeout: Duration,
}

impl ProcessCoordinator {
    pub fn new(probe: Arc<dyn ProcessProbe>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            probe,
            gate: Arc::new(Mutex::new(())),
            events,
            kill_timeout: KILL_TIMEOUT,
        }
    }

    pub fn with_system_probe() -> Self {
        Self::new(Arc::new(SystemProbe))
    }

    #[cfg(test)]
    fn with_kill_timeout(mut self, timeout: Duration) -> Self {
        self.kill_timeout = timeout;
        self
    }

    /// Live probe, never a cached snapshot.
    pub async fn is_running(&self, kind: ClientKind) -> Result<bool> {
        let probe = self.probe.clone();
        tokio::task::spawn_blocking(move || probe.is_running(kind.process_name())).await?
    }

    /// Wait for any in-flight kill or launch, then confirm both clients are
    /// stopped.
    pub async fn lock_for_switch(&self) -> Result<SwitchPermit> {
        let guard = self.gate.clone().lock_owned().await;

        for kind in ClientKind::ALL {
            if self.is_running(kind).await? {
                log::warn!("Cannot switch accounts: {} is running", kind);
                return Err(AppError::ProcessBusy(format!(
                    "Cannot switch accounts while {} is running",
                    kind
                )));
            }
        }

        Ok(SwitchPermit { _gate: guard })
    }

    fn try_gate(&self, action: impl fmt::Display) -> Result<OwnedMutexGuard<()>> {
        self.gate.clone().try_lock_owned().map_err(|_| {
            AppError::ProcessBusy(format!(
                "Cannot {} while another process operation is in progress",
                action
            ))
        })
    }

    /// Force-stop `kind` and hold the gate until it is confirmed gone.
    pub async fn kill(&self, kind: ClientKind) -> Result<()> {
        let _gate = self.try_gate(format_args!("stop {}", kind))?;
        let probe = self.probe.clone();
        let timeout = self.kill_timeout;
        tokio::task::spawn_blocking(move || kill_and_wait(probe.as_ref(), kind, timeout)).await?
    }

    /// Start the Riot Client from the first candidate path that exists.
    pub async fn launch(&self, paths: &ClientPaths) -> Result<PathBuf> {
        let _gate = self.try_gate("launch the Riot Client")?;
        let probe = self.probe.clone();
        let candidates = paths.launch_candidates();
        tokio::task::spawn_blocking(move || launch_first(probe.as_ref(), &candidates)).await?
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProcessEvent> {
        self.events.subscribe()
    }

    pub fn start_monitor(&self) -> MonitorHandle {
        self.start_monitor_every(MONITOR_INTERVAL)
    }

    pub fn start_monitor_every(&self, interval: Duration) -> MonitorHandle {
        let probe = self.probe.clone();
        let events = self.events.clone();
        let stop = Arc::new(AtomicBool::new(false));

        let mut states: Vec<(ClientKind, bool)> = ClientKind::ALL
            .iter()
            .map(|&kind| (kind, probe.is_running(kind.process_name()).unwrap_or(false)))
            .collect();

        let stop_flag = stop.clone();
        let thread = std::thread::spawn(move || {
            log::debug!("Process monitor started ({:?} interval)", interval);
            while sleep_unless_stopped(&stop_flag, interval) {
                for (kind, previous) in states.iter_mut() {
                    let now = match probe.is_running(kind.process_name()) {
                        Ok(now) => now,
                        Err(e) => {
                            log::debug!("Process probe for {} failed: {}", kind, e);
                            continue;
                        }
                    };
                    if now != *previous {
                        *previous = now;
                        log::info!(
                            "{} {}",
                            kind,
                            if now { "started" } else { "stopped" }
                        );
                        // No subscribers is fine.
                        let _ = events.send(ProcessEvent {
                            kind: *kind,
                            running: now,
                        });
                    }
                }
            }
            log::debug!("Process monitor stopped");
        });

        MonitorHandle {
            stop,
            thread: Some(thread),
        }
    }
}

/// Sleeps for `interval`; false once a stop was requested.
fn sleep_unless_stopped(stop: &AtomicBool, interval: Duration) -> bool {
    let slice = interval.min(Duration::from_millis(50));
    let deadline = Instant::now() + interval;
    while Instant::now() < deadline {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        std::thread::sleep(slice);
    }
    !stop.load(Ordering::Relaxed)
}

fn kill_and_wait(probe: &dyn ProcessProbe, kind: ClientKind, timeout: Duration) -> Result<()> {
    let name = kind.process_name();
    if !probe.is_running(name)? {
        log::debug!("{} is not running, nothing to stop", kind);
        return Ok(());
    }

    log::info!("Stopping {}", kind);
    let kill_result = probe.kill(name);
    let deadline = Instant::now() + timeout;

    loop {
        if !probe.is_running(name)? {
            log::info!("{} stopped", kind);
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(match kill_result {
                Err(e) => e,
                Ok(()) => AppError::Process(format!(
                    "{} is still running after {:?}",
                    kind, timeout
                )),
            });
        }
        std::thread::sleep(KILL_POLL);
    }
}

fn launch_first(probe: &dyn ProcessProbe, candidates: &[PathBuf]) -> Result<PathBuf> {
    let Some(path) = candidates.iter().find(|p| p.exists()) else {
        let tried: Vec<String> = candidates
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        return Err(AppError::Launch(format!(
            "Riot Client executable not found (tried: {})",
            tried.join(", ")
        )));
    };

    log::info!("Launching Riot Client: {}", path.display());
    probe
        .spawn(path)
        .map_err(|e| launch_error(path, e))?;
    Ok(path.clone())
}

fn launch_error(path: &Path, e: io::Error) -> AppError {
    let reason = match e.kind() {
        io::ErrorKind::NotFound => "executable not found".to_string(),
        io::ErrorKind::PermissionDenied => "permission denied".to_string(),
        _ => e.to_string(),
    };
    log::error!("Failed to launch {}: {}", path.display(), reason);
    AppError::Launch(format!("{}: {}", path.display(), reason))
}

/// Stops the monitor thread when dropped.
pub struct MonitorHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}
