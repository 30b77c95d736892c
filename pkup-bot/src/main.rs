use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use pkup_sdk::client::Connection;
use tracing_subscriber::EnvFilter;

mod config;
mod poll;

use config::BotConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("pkup_bot=info".parse()?)
                .add_directive("pkup_sdk=info".parse()?),
        )
        .init();

    let config = BotConfig::parse();
    let servers = config.game_servers()?;
    tracing::info!("Polling {} game server(s) every {}s", servers.len(), config.poll_secs);
    tokio::spawn(poll::poll_loop(servers, Duration::from_secs(config.poll_secs)));

    tracing::info!("Connecting to {} as {}", config.server, config.nick);
    let (conn, mut inbound) = Connection::dial(config.connect_config()).await?;

    loop {
        tokio::select! {
            Some(ev) = inbound.events.recv() => {
                if ev.cmd == "welcome" {
                    conn.join(&config.channel).await?;
                }
                if ev.from_user() {
                    tracing::info!(cmd = %ev.cmd, nick = %ev.nick, args = ?ev.args, "{}", ev.msg);
                } else {
                    tracing::debug!(cmd = %ev.cmd, src = %ev.src, args = ?ev.args, "{}", ev.msg);
                }
            }
            Some(err) = inbound.errors.recv() => {
                tracing::error!("Connection lost: {err}");
                conn.close();
                return Err(err.into());
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                conn.close();
                return Ok(());
            }
        }
    }
}
