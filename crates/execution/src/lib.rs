//! Risk-gated order execution and multi-account synchronization.
//!
//! [`ExecutionEngine`] turns a [`smm_core::SignalEvent`] into at most one
//! bracket order per account. [`AccountSyncManager`] decides which accounts
//! take part in a round and fans the signal out to them concurrently.

pub mod brackets;
pub mod engine;
pub mod error;
pub mod exits;
pub mod paper;
pub mod risk;
pub mod store;
pub mod sync;

pub use brackets::{calculate_bracket, Bracket, BracketMode};
pub use engine::{
    AccountExecutor, AccountSnapshot, ActivePosition, ExecutionEngine, ExecutionOutcome,
    ExecutionSettings, ExitSignal, IntentStatus, OrderIntent, ReconcileReport,
};
pub use error::{ExecutionError, SyncError};
pub use exits::{check_exit_conditions, ExitReason, ExitTracking};
pub use paper::PaperBroker;
pub use risk::{AccountRisk, DrawdownLatch, OrderRateLimiter, RejectReason, RiskGate};
pub use store::MemoryAccountStore;
pub use sync::{
    AccountPatch, AccountPositionSummary, AccountState, AccountSyncManager, SyncCheck,
    SyncStatistics, SyncStatus,
};
