//! Signal engines, leaf to root: baseline, main, enhanced, background trend,
//! and the combined layer that arms and confirms across them.

pub mod background;
pub mod baseline;
pub mod combined;
pub mod enhanced;
pub mod main_engine;

pub use background::{BackgroundTrend, TrendMode, TrendState};
pub use baseline::{BaselineDecision, BaselineEngine};
pub use combined::{CombinedDecision, CombinedEngine, CrossSourceOutcome, SourceActivity};
pub use enhanced::{DebounceGate, EnhancedEngine, EnhancedResult, GateOutput};
pub use main_engine::{MainDecision, MainEngine};
