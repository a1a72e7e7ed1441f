use smm_core::{BrokerError, StoreError};
use thiserror::Error;

/// Failures while turning a signal into a broker order for one account.
///
/// Risk-gate rejections are not errors; they come back as
/// [`crate::ExecutionOutcome::Rejected`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutionError {
    /// The account was never registered with the engine.
    #[error("unknown account: {0}")]
    UnknownAccount(String),

    /// Fill or update referenced an order the engine does not track.
    #[error("unknown order {client_order_id} for account {account_id}")]
    UnknownOrder {
        /// Account the lookup ran against.
        account_id: String,
        /// Client order id that was not found.
        client_order_id: String,
    },

    /// Broker refused or failed the submission. The intent stays pending.
    #[error("submission failed for {account_id}: {source}")]
    Submission {
        /// Account whose order failed.
        account_id: String,
        /// Broker-side failure.
        #[source]
        source: BrokerError,
    },

    /// Broker listing failed during reconciliation.
    #[error("reconciliation failed: {0}")]
    Reconcile(#[source] BrokerError),
}

/// Failures from account and sync-group management.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("sync group not found: {0}")]
    GroupNotFound(String),

    /// None of the requested members exist.
    #[error("sync group {0} has no known accounts")]
    EmptyGroup(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
