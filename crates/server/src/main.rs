mod bootstrap;
mod health;
mod signature;
mod webhook;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use henry_core::config::{AppConfig, LoadOptions};
use henry_core::{Bot, BotError};
use tracing_subscriber::EnvFilter;

fn init_logging(config: &AppConfig) {
    use henry_core::config::LogFormat::*;

    let filter = EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default()).map_err(BotError::from)?;
    init_logging(&config);

    let app = match bootstrap::bootstrap_with_config(config).await {
        Ok(app) => app,
        Err(error) => {
            let error = BotError::from(error);
            tracing::error!(
                event_name = "system.startup_failed",
                correlation_id = "bootstrap",
                error_kind = ?error.kind(),
                fatal = error.is_fatal(),
                error = %error,
                "henry-server could not start"
            );
            return Err(error.into());
        }
    };

    webhook::spawn(
        &app.config.server.bind_address,
        app.config.server.port,
        webhook::WebhookState::new(
            app.webhook_dispatcher.clone(),
            app.config.slack.events_enabled().then(|| app.config.slack.signing_secret.clone()),
        ),
    )
    .await?;

    spawn_sweeper(app.bot.clone(), Duration::from_secs(app.config.conversation.sweep_interval_secs));

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bot_user_id = %app.identity.user_id,
        "henry-server started"
    );

    let outcome = tokio::select! {
        result = app.slack_runner.start() => result.map_err(anyhow::Error::from),
        signal = tokio::signal::ctrl_c() => signal.map_err(anyhow::Error::from),
    };

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "henry-server stopping"
    );
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    if tokio::time::timeout(grace, app.lanes.shutdown()).await.is_err() {
        tracing::warn!(
            event_name = "system.server.shutdown_timeout",
            correlation_id = "shutdown",
            grace_secs = grace.as_secs(),
            "conversation lanes did not drain in time"
        );
    }

    outcome
}

fn spawn_sweeper(bot: Arc<Bot>, interval: Duration) {
    if interval.is_zero() {
        return;
    }

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            bot.sweep_expired(Utc::now()).await;
        }
    });
}
