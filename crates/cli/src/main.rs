use clap::{Parser, Subcommand};

mod commands;

use commands::{CheckConfigArgs, FrontMonthArgs, ReplayArgs};

#[derive(Parser)]
#[command(name = "smm-trader")]
#[command(about = "Multi-account futures trader driven by bar-level order flow", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a tick CSV through the trader against the paper broker
    Replay(ReplayArgs),
    /// Load, validate and print the effective configuration
    CheckConfig(CheckConfigArgs),
    /// Print the front-month contract for a futures root
    FrontMonth(FrontMonthArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Replay(args) => commands::run_replay(args).await?,
        Commands::CheckConfig(args) => commands::run_check_config(&args)?,
        Commands::FrontMonth(args) => commands::run_front_month(&args)?,
    }

    Ok(())
}
