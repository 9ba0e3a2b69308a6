//! annotations-bot: relays Grafana annotations to Telegram.
//!
//! Startup checks the template, Grafana, the bot token and the store, in
//! that order, and exits non-zero if any of them fails. After that the
//! scraper, fanout and command loop run until a shutdown signal arrives or
//! one of them fails.

mod cli;
mod config;
mod logging;

use std::process::ExitCode;
use std::sync::Arc;

use anno_relay::telegram::{CommandHandler, TelegramBot, TelegramClient};
use anno_relay::{
    event_queue, AnnotationSource, Fanout, GrafanaClient, MessageTemplate, Scraper, Supervisor,
};
use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use crate::cli::Cli;
use crate::config::Settings;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.log_level, cli.log_json) {
        eprintln!("Failed to initialise logging: {e}");
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to create async runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "annotations bot failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::try_from(cli).context("invalid configuration")?;
    info!(
        grafana = %settings.grafana.url,
        interval = ?settings.scrape_interval,
        admins = settings.admins.len(),
        log_level = ?settings.log_level,
        json_logs = settings.log_json,
        "starting annotations bot"
    );

    let template = MessageTemplate::from_file(&settings.template_path)
        .with_context(|| format!("loading template {}", settings.template_path.display()))?;

    let grafana = Arc::new(GrafanaClient::new(&settings.grafana).context("configuring grafana client")?);
    let health = grafana.health().await.context("grafana is unreachable")?;
    info!(
        version = %health.version,
        database = %health.database,
        commit = %health.commit,
        "grafana reachable"
    );

    let telegram = Arc::new(TelegramClient::new(&settings.telegram_token).context("configuring telegram client")?);
    let me = telegram.get_me().await.context("telegram rejected the bot token")?;
    info!(bot_id = me.id, username = ?me.username, "telegram bot authorized");

    let store = settings.store.open().await.context("opening subscription store")?;

    let (events_tx, events_rx) = event_queue();
    let scraper = Scraper::new(grafana.clone(), events_tx, settings.scrape_interval);
    let fanout = Fanout::new(store.clone(), telegram.clone(), template);
    let handler = CommandHandler::new(store, grafana, settings.admins.iter().copied());
    let bot = TelegramBot::new(telegram.clone(), telegram, handler);

    let mut supervisor = Supervisor::new().with_shutdown_signal();
    supervisor.spawn("scraper", move |cancel| scraper.run(cancel));
    supervisor.spawn("fanout", move |cancel| fanout.run(events_rx, cancel));
    supervisor.spawn("telegram-bot", move |cancel| bot.run(cancel));

    supervisor.run().await?;
    info!("annotations bot stopped");
    Ok(())
}
