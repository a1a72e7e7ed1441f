//! Configuration inspection commands.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use smm_core::{resolve_front_month, ConfigLoader};

/// Arguments for the check-config command.
#[derive(Args, Debug, Clone)]
pub struct CheckConfigArgs {
    /// Config file path
    #[arg(short, long, default_value = "config/Config.toml")]
    pub config: String,
}

/// Arguments for the front-month command.
#[derive(Args, Debug, Clone)]
pub struct FrontMonthArgs {
    /// Futures root (e.g., "NQ", "ES")
    #[arg(long, default_value = "NQ")]
    pub root: String,

    /// Reference time in ISO 8601 format (defaults to now)
    #[arg(long)]
    pub at: Option<String>,
}

/// Prints the merged configuration as JSON after validation.
///
/// # Errors
/// Returns an error if the configuration cannot be loaded or is invalid.
pub fn run_check_config(args: &CheckConfigArgs) -> Result<()> {
    let config = ConfigLoader::load_from(&args.config)?;
    let contract = config
        .symbol
        .contract
        .clone()
        .unwrap_or_else(|| resolve_front_month(&config.symbol.root, Utc::now()));
    tracing::info!(
        contract = %contract,
        sources = config.bars.sources.len(),
        mode = ?config.execution_mode,
        "Configuration valid"
    );
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// # Errors
/// Returns an error if `--at` is not a valid RFC 3339 timestamp.
pub fn run_front_month(args: &FrontMonthArgs) -> Result<()> {
    let at = parse_time(args.at.as_deref())?;
    println!("{}", resolve_front_month(&args.root, at));
    Ok(())
}

fn parse_time(value: Option<&str>) -> Result<DateTime<Utc>> {
    match value {
        Some(s) => Ok(DateTime::parse_from_rfc3339(s)
            .with_context(|| format!("Invalid timestamp: {s}"))?
            .with_timezone(&Utc)),
        None => Ok(Utc::now()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_time() {
        let parsed = parse_time(Some("2025-11-03T15:00:00Z")).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 11, 3, 15, 0, 0).unwrap());
        assert_eq!(resolve_front_month("NQ", parsed), "NQZ5");
        assert!(parse_time(Some("yesterday")).is_err());
    }
}
