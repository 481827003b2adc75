use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use orders_relay::channels::{Channel, CliChannel, DiscordChannel};
use orders_relay::config::{BotConfig, ChannelMode};
use orders_relay::relay::{Dispatcher, Relay, Router, RouterSettings};
use orders_relay::sheets::{GoogleSheetsLog, OrderLog};
use orders_relay::store::{LibSqlPreferenceStore, PreferenceStore};

/// Console logging, plus a daily-rolling file when `log_dir` is set. The
/// returned guard flushes the file writer and must outlive the relay.
fn init_tracing(log_dir: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "ordersbot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let config = BotConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    let _log_guard = init_tracing(config.log_dir.as_deref());

    eprintln!("📜 Orders relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!(
        "   Sheet log: {}",
        if config.sheet.is_some() { "enabled" } else { "disabled" }
    );

    // ── Database ─────────────────────────────────────────────────────────
    let store: Arc<dyn PreferenceStore> = Arc::new(
        LibSqlPreferenceStore::new_local(&config.db_path)
            .await
            .with_context(|| format!("opening database at {}", config.db_path.display()))?,
    );

    // ── Channel ──────────────────────────────────────────────────────────
    let channel: Arc<dyn Channel> = match config.mode {
        ChannelMode::Discord => {
            let discord = config
                .discord
                .as_ref()
                .context("Discord mode without Discord settings")?;
            let channel = DiscordChannel::new(discord);
            channel
                .health_check()
                .await
                .context("Discord credentials were rejected")?;
            eprintln!("   Channel: discord (orders → {})", discord.orders_channel_id);
            Arc::new(channel)
        }
        ChannelMode::Cli => {
            eprintln!("   Channel: cli. Type a command and press Enter.\n");
            Arc::new(CliChannel::new())
        }
    };

    // ── Order log ────────────────────────────────────────────────────────
    let log: Option<Arc<dyn OrderLog>> = config
        .sheet
        .as_ref()
        .map(|sheet| Arc::new(GoogleSheetsLog::new(sheet)) as Arc<dyn OrderLog>);

    let router = Router::new(
        store,
        RouterSettings {
            prefixes: config.prefixes.clone(),
            log_orders: log.is_some(),
        },
    );
    let dispatcher = Dispatcher::new(Arc::clone(&channel), log);

    Relay::new(channel, router, dispatcher).run().await?;
    Ok(())
}
