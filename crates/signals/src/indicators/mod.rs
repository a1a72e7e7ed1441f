//! Streaming technical indicators.
//!
//! Every indicator is constructed once with its period (zero is a
//! `ConfigError`) and then folded forward one sample at a time. After
//! construction none of them can fail.

pub mod atr;
pub mod directional;
pub mod ema;
pub mod heiken_ashi;
pub mod mfi;

pub use atr::{true_range, AverageTrueRange};
pub use directional::{wilder_directional_index, DirectionalIndex, DirectionalMovement};
pub use ema::ExponentialMa;
pub use heiken_ashi::{update_heiken_ashi, HeikenAshiBar, HeikenAshiState};
pub use mfi::MoneyFlowIndex;
