use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "pcsc")]
mod card_worker;
mod commands;
mod formatters;
#[cfg_attr(not(feature = "pcsc"), allow(dead_code))]
mod ppse;

use formatters::FormatMode;

#[derive(Parser)]
#[command(name = "emv-entry")]
#[command(about = "EMV contactless entry point - pre-processing and card polling diagnostics")]
#[command(version)]
struct Args {
    /// Output format mode
    #[arg(short, long, value_enum, default_value_t = FormatMode::Human, global = true)]
    format: FormatMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run pre-processing for a transaction and print the indicators
    Preprocess(commands::TransactionArgs),

    /// Run a transaction against the card on the first PC/SC reader
    #[cfg(feature = "pcsc")]
    Poll(commands::poll::PollArgs),
}

fn main() {
    // Initialize tracing subscriber with environment-based filtering
    // Set RUST_LOG=debug for state changes and outcome dumps
    // Default: info level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();

    match &args.command {
        Command::Preprocess(tx) => commands::preprocess::cmd_preprocess(tx, args.format),
        #[cfg(feature = "pcsc")]
        Command::Poll(poll) => commands::poll::cmd_poll(poll, args.format),
    }
}
