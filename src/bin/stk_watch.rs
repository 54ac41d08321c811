//! Command-line client: triggers an STK push through a running relay and
//! follows it to a terminal status.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use stk_relay::models::payment::PaymentStatus;
use stk_relay::watcher::{ApiClient, FilePersistence, PaymentWatcher, WatchPersistence};

#[derive(Debug, Parser)]
#[command(name = "stk-watch", version, about = "Send an M-Pesa STK push and watch its outcome")]
struct Cli {
    /// Base URL of the relay.
    #[arg(long, env = "STK_RELAY_URL", default_value = "http://localhost:3000")]
    api: String,

    /// File remembering the payment being watched.
    #[arg(long, default_value = ".stk-watch")]
    state_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start a payment and wait for the result.
    Pay {
        #[arg(long)]
        phone: String,
        #[arg(long)]
        amount: u64,
    },
    /// Resume watching a payment left unfinished by an earlier run.
    Resume,
}

fn report(status: PaymentStatus) {
    match status {
        PaymentStatus::Pending => println!("Waiting for payment..."),
        PaymentStatus::Success => println!("Payment successful"),
        PaymentStatus::Failed => println!("Payment failed"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();
    let watcher = PaymentWatcher::new(
        ApiClient::new(&cli.api)?,
        FilePersistence::new(&cli.state_file),
    );

    let outcome = match cli.command {
        Command::Pay { phone, amount } => {
            if let Some(previous) = watcher.persistence().get() {
                tracing::warn!(public_id = %previous, "replacing an unfinished payment");
            }
            let public_id = watcher.feed().initiate(&phone, amount).await?;
            println!("STK Push sent! Check your phone ({})", public_id);
            watcher.track(&public_id, report).await?
        }
        Command::Resume => match watcher.resume(report).await? {
            Some(status) => status,
            None => {
                println!("No payment to resume");
                return Ok(());
            }
        },
    };

    if outcome == PaymentStatus::Failed {
        std::process::exit(1);
    }
    Ok(())
}
