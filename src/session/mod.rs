mod state;
mod switcher;

pub use state::{SwitchOutcome, SwitchState};
pub use switcher::{SessionSwitcher, SwitchGuard, SwitchTicket};
