mod check_config;
mod replay;

pub use check_config::{run_check_config, run_front_month, CheckConfigArgs, FrontMonthArgs};
pub use replay::{run_replay, ReplayArgs};
