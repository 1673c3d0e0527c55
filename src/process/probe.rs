use std::io;
use std::path::Path;
use std::process::Command;

use crate::error::{AppError, Result};

/// OS access used by the coordinator. Swapped for a scripted fake in tests.
pub trait ProcessProbe: Send + Sync {
    fn is_running(&self, process_name: &str) -> Result<bool>;

    fn kill(&self, process_name: &str) -> Result<()>;

    fn spawn(&self, executable: &Path) -> io::Result<()> {
        Command::new(executable).spawn().map(|_| ())
    }
}

/// WMI on Windows, `pgrep`/`pkill` elsewhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

#[cfg(windows)]
mod imp {
    use std::collections::HashMap;

    use wmi::{COMLibrary, Variant, WMIConnection};

    use super::*;

    fn connect() -> Result<WMIConnection> {
        let com_lib = COMLibrary::new()
            .map_err(|e| AppError::Process(format!("Failed to initialize COM: {}", e)))?;
        WMIConnection::new(com_lib)
            .map_err(|e| AppError::Process(format!("Failed to connect to WMI: {}", e)))
    }

    pub(super) fn is_running(process_name: &str) -> Result<bool> {
        let wmi_con = connect()?;
        let query = format!(
            "SELECT Name FROM Win32_Process WHERE Name = '{}'",
            process_name
        );
        let results = wmi_con
            .raw_query::<HashMap<String, Variant>>(&query)
            .map_err(|e| AppError::Process(format!("WMI query failed: {}", e)))?;
        Ok(!results.is_empty())
    }

    pub(super) fn kill(process_name: &str) -> Result<()> {
        let output = Command::new("taskkill")
            .args(["/F", "/IM", process_name])
            .output()
            .map_err(|e| AppError::Process(format!("Failed to run taskkill: {}", e)))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(AppError::Process(format!("taskkill failed: {}", stderr.trim())))
        }
    }
}

#[cfg(not(windows))]
mod imp {
    use super::*;

    // Full command line match: the kernel truncates process names to 15 bytes.
    pub(super) fn is_running(process_name: &str) -> Result<bool> {
        let status = Command::new("pgrep")
            .args(["-f", process_name])
            .output()
            .map_err(|e| AppError::Process(format!("Failed to run pgrep: {}", e)))?
            .status;

        match status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(AppError::Process(format!("pgrep exited with {}", status))),
        }
    }

    pub(super) fn kill(process_name: &str) -> Result<()> {
        let output = Command::new("pkill")
            .args(["-KILL", "-f", process_name])
            .output()
            .map_err(|e| AppError::Process(format!("Failed to run pkill: {}", e)))?;

        match output.status.code() {
            Some(0) | Some(1) => Ok(()),
            _ => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(AppError::Process(format!("pkill failed: {}", stderr.trim())))
            }
        }
    }
}

impl ProcessProbe for SystemProbe {
    fn is_running(&self, process_name: &str) -> Result<bool> {
        imp::is_running(process_name)
    }

    fn kill(&self, process_name: &str) -> Result<()> {
        imp::kill(process_name)
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;

    /// Scripted process table.
    #[derive(Default)]
    pub(crate) struct FakeProbe {
        pub(crate) running: Mutex<HashSet<String>>,
        pub(crate) spawned: Mutex<Vec<PathBuf>>,
        pub(crate) probes: AtomicUsize,
        /// Process names that survive `kill`.
        pub(crate) unkillable: Mutex<HashSet<String>>,
        pub(crate) kill_delay: Option<Duration>,
        pub(crate) spawn_error: Option<io::ErrorKind>,
    }

    impl FakeProbe {
        pub(crate) fn set_running(&self, process_name: &str, running: bool) {
            let mut table = self.running.lock().unwrap();
            if running {
                table.insert(process_name.to_string());
            } else {
                table.remove(process_name);
            }
        }
    }

    impl ProcessProbe for FakeProbe {
        fn is_running(&self, process_name: &str) -> Result<bool> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            Ok(self.running.lock().unwrap().contains(process_name))
        }

        fn kill(&self, process_name: &str) -> Result<()> {
            if let Some(delay) = self.kill_delay {
                std::thread::sleep(delay);
            }
            if !self.unkillable.lock().unwrap().contains(process_name) {
                self.set_running(process_name, false);
            }
            Ok(())
        }

        fn spawn(&self, executable: &Path) -> io::Result<()> {
            if let Some(kind) = self.spawn_error {
                return Err(io::Error::from(kind));
            }
            self.spawned.lock().unwrap().push(executable.to_path_buf());
            Ok(())
        }
    }
}
