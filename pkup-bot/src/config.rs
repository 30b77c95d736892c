use anyhow::{bail, Context, Result};
use clap::Parser;
use pkup_sdk::client::ConnectConfig;
use pkup_sdk::query::GameServer;

/// pkup pickup bot: sits in a chat channel and keeps an eye on game servers.
#[derive(Parser, Debug, Clone)]
#[command(name = "pkup-bot", version, about)]
pub struct BotConfig {
    /// Chat server address (host:port).
    #[arg(long, default_value = "127.0.0.1:6667")]
    pub server: String,

    /// Channel to join once registered.
    #[arg(long, default_value = "#pickup")]
    pub channel: String,

    #[arg(long, default_value = "pkup")]
    pub nick: String,

    /// Username (ident).
    #[arg(long, default_value = "pkup")]
    pub user: String,

    #[arg(long, default_value = "pkup pickup bot")]
    pub realname: String,

    /// Chat server password. Sent as PASS after NICK and USER.
    #[arg(long)]
    pub password: Option<String>,

    /// Game server to poll, as `game,alias,host[:port][,password]`.
    /// Games: q3, quake, cpm, cpma, wsw, warsow, reflex.
    /// Can be specified multiple times.
    #[arg(long = "game-server", value_name = "SPEC")]
    pub game_servers: Vec<String>,

    /// Seconds between game server polls.
    #[arg(long, default_value = "60")]
    pub poll_secs: u64,
}

impl BotConfig {
    pub fn connect_config(&self) -> ConnectConfig {
        ConnectConfig {
            server_addr: self.server.clone(),
            nick: self.nick.clone(),
            user: self.user.clone(),
            realname: self.realname.clone(),
            password: self.password.clone(),
            channel: self.channel.clone(),
            ..Default::default()
        }
    }

    pub fn game_servers(&self) -> Result<Vec<GameServer>> {
        self.game_servers
            .iter()
            .map(|spec| parse_game_server(spec))
            .collect()
    }
}

/// Parse one `--game-server` value.
pub fn parse_game_server(spec: &str) -> Result<GameServer> {
    let mut parts = spec.splitn(4, ',');
    let (Some(game), Some(alias), Some(addr)) = (parts.next(), parts.next(), parts.next()) else {
        bail!("game server {spec:?}: expected game,alias,host[:port][,password]");
    };
    let password = parts.next().unwrap_or_default();
    GameServer::new(game, alias, addr, password).with_context(|| format!("game server {spec:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkup_sdk::query::ServerQuery;

    #[test]
    fn defaults() {
        let config = BotConfig::try_parse_from(["pkup-bot"]).unwrap();
        assert_eq!(config.server, "127.0.0.1:6667");
        assert_eq!(config.channel, "#pickup");
        assert_eq!(config.poll_secs, 60);
        assert!(config.password.is_none());
        assert!(config.game_servers().unwrap().is_empty());
    }

    #[test]
    fn connect_config_carries_identity() {
        let config = BotConfig::try_parse_from([
            "pkup-bot",
            "--server",
            "irc.quakenet.org:6667",
            "--nick",
            "pkupbot",
            "--password",
            "hunter2",
            "--channel",
            "#cpma.pickup",
        ])
        .unwrap();
        let cc = config.connect_config();
        assert_eq!(cc.server_addr, "irc.quakenet.org:6667");
        assert_eq!(cc.nick, "pkupbot");
        assert_eq!(cc.password.as_deref(), Some("hunter2"));
        assert_eq!(cc.channel, "#cpma.pickup");
        assert_eq!(cc.version, "pkup");
    }

    #[test]
    fn game_server_specs() {
        let config = BotConfig::try_parse_from([
            "pkup-bot",
            "--game-server",
            "cpma,ctf1,cpmpickup.de:27961",
            "--game-server",
            "reflex,duel,reflex.example.org,letmein",
        ])
        .unwrap();
        let servers = config.game_servers().unwrap();
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].alias(), "ctf1");
        assert_eq!(servers[0].port(), 27961);
        assert_eq!(servers[1].alias(), "duel");
        assert_eq!(servers[1].password(), "letmein");
    }

    #[test]
    fn bad_game_server_specs() {
        assert!(parse_game_server("cpma,ctf1").is_err());
        assert!(parse_game_server("tetris,t,example.org").is_err());
        assert!(parse_game_server("q3,ffa,example.org:notaport").is_err());
    }
}
