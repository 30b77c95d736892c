//! Periodic game server polling.

use std::time::Duration;

use pkup_sdk::query::{GameServer, ServerQuery};

/// Query every server in turn, once per `every`, forever. Runs on its own
/// task so slow or dead servers never hold up the chat connection.
pub async fn poll_loop(mut servers: Vec<GameServer>, every: Duration) {
    let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
    loop {
        ticker.tick().await;
        for srv in &mut servers {
            match srv.query().await {
                Ok(()) => {
                    tracing::info!(alias = %srv.alias(), "{}", summary(&*srv));
                    if let Some(details) = reflex_details(srv) {
                        tracing::debug!(alias = %srv.alias(), "{details}");
                    }
                }
                Err(e) => {
                    tracing::warn!(alias = %srv.alias(), online = srv.online(), "Query failed: {e}")
                }
            }
        }
    }
}

/// One-line status, e.g. `Roboty Arena on cpm22 (ctf) 6/8 players, 31 ms`.
pub fn summary(srv: &impl ServerQuery) -> String {
    if !srv.online() {
        return format!("{} ({}:{}) is offline", srv.alias(), srv.host(), srv.port());
    }
    format!(
        "{} on {} ({}) {}/{} players, {} ms",
        srv.hostname(),
        srv.mapname(),
        srv.gametype(),
        srv.clients().len(),
        srv.maxclients(),
        srv.ping().as_millis()
    )
}

/// App id and spectator relay from the last Reflex info response.
pub fn reflex_details(srv: &GameServer) -> Option<String> {
    let GameServer::Reflex(reflex) = srv else {
        return None;
    };
    let info = reflex.info();
    Some(format!(
        "app {}, spectators {}",
        info.app_id,
        info.spectator.as_deref().unwrap_or("none")
    ))
}
