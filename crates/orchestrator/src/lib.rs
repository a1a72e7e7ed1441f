pub mod commands;
pub mod dispatcher;
pub mod events;
pub mod pipeline;
pub mod trader_actor;
pub mod trader_handle;
pub mod venue;

pub use commands::{TraderCommand, TraderState, TraderStatus};
pub use dispatcher::{DispatchOutcome, DispatchRejection, DispatchStats, SignalDispatcher};
pub use events::TraderEvent;
pub use pipeline::{InstrumentPipeline, PipelineStatus, TickOutcome};
pub use trader_actor::{spawn_trader, TraderActor};
pub use trader_handle::TraderHandle;
pub use venue::ExecutionVenue;
