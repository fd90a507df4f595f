//! Hedge cycle engine.
//!
//! - **Config**: `CycleConfig` sizing, grid and timing parameters
//! - **Ladder**: stop distance, take-profit grid and quantity split
//! - **Cycle**: owned per-cycle state with per-side latches
//! - **Engine**: the IDLE → ENTERING → ACTIVE → CLOSING state machine
//! - **Reactor**: single consumer that feeds stream events and timers to the engine
//! - **Notifier**: operator-facing notifications

mod config;
mod cycle;
mod engine;
mod error;
mod ladder;
mod notifier;
mod reactor;

#[cfg(test)]
mod sim;

pub use config::{CycleConfig, TakeProfitLayout};
pub use cycle::{Cycle, Phase, Position};
pub use engine::{CycleEngine, Deadline, RestartHook};
pub use error::{ConfigError, EngineError};
pub use ladder::{split_quantity, CyclePlan};
pub use notifier::{Notifier, TracingNotifier};
pub use reactor::run_reactor;
