use crate::dispatcher::{DispatchOutcome, DispatchStats};
use crate::events::TraderEvent;
use crate::pipeline::PipelineStatus;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use smm_core::{DepthUpdate, ExecutionMode, SignalEvent, SignalFilters, StoreError, Tick};
use smm_execution::{
    AccountSnapshot, ActivePosition, ExecutionError, ReconcileReport, SyncError, SyncStatistics,
};
use tokio::sync::oneshot;

#[derive(Debug)]
pub enum TraderCommand {
    Tick(Tick),
    Depth(DepthUpdate),
    /// A signal produced outside the bar pipeline, e.g. a webhook.
    Signal(Box<SignalEvent>, oneshot::Sender<DispatchOutcome>),
    Reconcile(oneshot::Sender<Result<ReconcileReport, ExecutionError>>),
    SetFilters(SignalFilters, oneshot::Sender<Result<(), StoreError>>),
    AddAccount {
        account_id: String,
        enabled: bool,
        reply: oneshot::Sender<Result<(), SyncError>>,
    },
    SetAccountEnabled {
        account_id: String,
        enabled: bool,
        reply: oneshot::Sender<Result<(), SyncError>>,
    },
    /// Broker-reported P&L for one account.
    UpdatePnl {
        account_id: String,
        realized: Option<Decimal>,
        unrealized: Option<Decimal>,
    },
    ResetKillSwitch(String),
    /// Clear an `error` sync status; `None` clears every account.
    ResetSyncStatus(Option<String>),
    GetStatus(oneshot::Sender<TraderStatus>),
    Shutdown,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
pub enum TraderState {
    Running,
    #[default]
    Stopped,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct TraderStatus {
    pub symbol: String,
    pub state: TraderState,
    pub execution_mode: ExecutionMode,
    pub last_heartbeat: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub pipeline: PipelineStatus,
    pub dispatch: DispatchStats,
    pub sync: SyncStatistics,
    pub accounts: Vec<AccountSnapshot>,
    pub open_positions: Vec<ActivePosition>,

    // Recent events (last 10)
    pub recent_events: Vec<TraderEvent>,
}
