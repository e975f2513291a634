//! Executor and Exit Monitor: the only crate that submits
//! broker orders. Everything upstream (Signal Engine, Risk Gate) only ever
//! decides *whether* to trade; this crate decides *how* the order reaches
//! the broker and what happens to local state once it fills.

pub mod executor;
pub mod exit_monitor;
pub mod pending;

pub use executor::{check_pending_orders, execute_entry, execute_exit, ExecutionOutcome};
pub use exit_monitor::{check_forced_preclose, check_strategy_exits, check_stop_losses, ExitEvent, PreCloseOutcome};
pub use pending::PendingMap;
