//! # billing-demo
//!
//! Hosts a small billing service on the replay runtime:
//! - `billing.charge`: charges once per session, however often it replays
//! - `billing.refund`: waits for an approval signal, then refunds under a lock

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};

use replay::{App, TaskContext, TaskDef, TaskError, TaskRegistry, load_settings, load_settings_from_path};

/// Billing demo app.
#[derive(Parser, Debug)]
#[command(name = "billing-demo", about = "Billing tasks on the replay runtime")]
struct Cli {
    /// JSON settings file (defaults to `REPLAY_CONFIG` when set).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Port to bind, overriding settings.
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct Charge {
    amount: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Receipt {
    charged: u64,
    fee: u64,
}

#[derive(Debug, Deserialize)]
struct Refund {
    receipt_id: String,
    amount: u64,
}

async fn charge(ctx: TaskContext, input: Charge) -> Result<Receipt, TaskError> {
    let fee = ctx
        .memo(|| async move {
            tracing::info!(amount = input.amount, "charging card");
            Ok::<_, TaskError>(input.amount / 100 + 30)
        })
        .await?
        .get::<u64>()?;
    Ok(Receipt {
        charged: input.amount + fee,
        fee,
    })
}

async fn refund(ctx: TaskContext, input: Refund) -> Result<String, TaskError> {
    let approval = ctx.signal("refund-approved").wait().await?;
    if let Some(error) = approval.error() {
        return Err(TaskError::Application(error.clone()));
    }

    let lock = ctx.lock(format!("receipt:{}", input.receipt_id));
    lock.acquire(Duration::from_secs(30)).await?;
    let refunded = ctx
        .memo(|| async move { Ok::<_, TaskError>(input.amount) })
        .await?
        .get::<u64>()?;
    lock.release().await?;
    Ok(format!("refunded {refunded}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => load_settings_from_path(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => load_settings().context("loading settings")?,
    };
    if cli.port.is_some() {
        settings.app.port = cli.port;
    }

    let mut registry = TaskRegistry::builder();
    let _ = registry
        .register("billing", "charge", TaskDef::handler(charge).describe("charge a card once"))?
        .register("billing", "refund", TaskDef::workflow(refund).describe("approved refund"))?
        .collection::<Receipt>("billing", "receipts")?;

    App::builder()
        .registry(registry.build())
        .settings(settings)
        .build()?
        .run()
        .await?;
    Ok(())
}
