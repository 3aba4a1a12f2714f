//! koth-payment-poller: TON payment sweeper
//!
//! Periodically syncs open purchases against the chain so payments settle
//! even when the player never comes back to confirm them.
//!
//! ## Architecture
//! ```text
//! [purchases (created|pending)] --> [ActionEngine::sync_open_purchases]
//!                                          |            |
//!                                          v            v
//!                                   [TON indexer]  [Telegram notify]
//! ```
//!
//! ## Configuration
//! - `--config <path>` or KOTH_CONFIG: YAML configuration file
//! - KOTH_POLLER__INTERVAL_SECS: delay between sweeps (default: 15)
//! - KOTH_LOG: tracing filter (default: info)

use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use tracing::{error, info, warn};

use koth_ledger::clients::{TelegramClient, TonHttpOracle};
use koth_ledger::config::Config;
use koth_ledger::services::ActionEngine;
use koth_ledger::storage::init_storage;
use koth_ledger::utils::bootstrap::{init_tracing, parse_config_path};
use koth_ledger::utils::retry::storage_backoff;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = parse_config_path(std::env::args().skip(1));
    let config = Config::load(config_path.as_deref())?;

    let stores = (|| init_storage(&config.storage, &config.economy))
        .retry(storage_backoff())
        .notify(|err, dur: Duration| {
            warn!(error = %err, delay = ?dur, "Storage unavailable, retrying");
        })
        .await?;

    let chain = Arc::new(TonHttpOracle::new(config.ton.clone())?);
    let telegram = Arc::new(TelegramClient::new(config.telegram.clone())?);
    if !config.telegram.is_enabled() {
        warn!("telegram.bot_token not set - payment notifications disabled");
    }

    let engine = ActionEngine::builder(stores, chain, telegram.clone())
        .with_notifier(telegram)
        .with_ton_config(config.ton.clone())
        .with_telegram_config(config.telegram.clone())
        .build();

    let poller = config.poller.clone();
    info!(
        interval_secs = poller.interval_secs,
        batch_size = poller.batch_size,
        concurrency = poller.concurrency,
        "koth-payment-poller started"
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(poller.interval_secs.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match engine
                    .sync_open_purchases(poller.batch_size, poller.concurrency)
                    .await
                {
                    Ok(report) if report.checked > 0 => info!(
                        checked = report.checked,
                        paid = report.paid,
                        failed = report.failed,
                        errors = report.errors,
                        "Payment sweep finished"
                    ),
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "Payment sweep failed"),
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Shutting down...");
                break;
            }
        }
    }

    Ok(())
}
