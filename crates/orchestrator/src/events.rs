use crate::dispatcher::DispatchRejection;
use chrono::{DateTime, Utc};
use serde::Serialize;
use smm_core::{Bar, FillEvent, SignalEvent};
use smm_execution::{ExitSignal, ReconcileReport};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize)]
pub enum TraderEvent {
    /// A bar source closed a bar
    BarClosed {
        source: String,
        bar: Bar,
        reason: String,
    },

    /// The signal layer produced a trade decision
    SignalGenerated(SignalEvent),

    /// Signal fanned out; `true` per account that placed an order
    SignalDispatched {
        signal: SignalEvent,
        results: BTreeMap<String, bool>,
    },

    /// Signal stopped by the dispatcher
    SignalRejected {
        signal: SignalEvent,
        reason: DispatchRejection,
    },

    /// Order filled by the broker
    OrderFilled(FillEvent),

    /// An exit condition fired for an open position
    ExitTriggered(ExitSignal),

    /// Daily drawdown breached; the account stays off until reset
    KillSwitchTripped { account_id: String },

    /// Local order tables replaced from broker listings
    Reconciled(ReconcileReport),

    /// Error occurred
    Error {
        message: String,
        timestamp: DateTime<Utc>,
    },
}
