pub mod commands;
pub mod config;
pub mod cookies;
pub mod crypto;
pub mod db;
pub mod error;
pub mod fs;
pub mod process;
pub mod session;
pub mod shop;

pub use commands::{Core, ShopResponse};
pub use error::{AppError, Result, SwitchPhase};

/// Log to stderr, filtered by `RUST_LOG` (default `info`).
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}
