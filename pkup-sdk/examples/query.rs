//! Query one game server and print what it reports.
//!
//! Usage:
//!   cargo run --example query -- cpma cpmpickup.de:27960
//!   cargo run --example query -- reflex reflex.example.org --alias duel

use anyhow::Result;
use clap::Parser;
use pkup_sdk::query::{GameServer, ServerQuery};

#[derive(Parser)]
#[command(name = "query", about = "Query a game server's status")]
struct Args {
    /// Game name (q3, quake, cpm, cpma, wsw, warsow, reflex)
    game: String,

    /// Server address (host[:port])
    addr: String,

    /// Name to show for the server
    #[arg(long, default_value = "server")]
    alias: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut srv = GameServer::new(&args.game, &args.alias, &args.addr, "")?;
    srv.query().await?;

    let status = srv.status();
    println!("{} ({}:{})", status.hostname, status.host, status.port);
    println!("  map:      {}", status.mapname);
    println!("  gametype: {}", status.gametype);
    println!("  players:  {}/{}", status.clients.len(), status.maxclients);
    println!("  ping:     {} ms", status.ping.as_millis());
    if status.timelimit > 0 {
        println!("  timelimit: {}", status.timelimit);
    }
    for client in &status.clients {
        println!("    {:>5}  {}", client.score, client.name);
    }
    Ok(())
}
