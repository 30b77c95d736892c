//! Game-server status queries over UDP.
//!
//! Two wire protocols are supported: the text `getstatus` protocol of
//! Quake 3 derived games ([`quake`]) and the binary Source-style info and
//! player protocol spoken by Reflex ([`reflex`]). Both sit behind the
//! [`ServerQuery`] trait; [`GameServer::new`] picks one from a game name.
//!
//! Every call to `query()` opens its own socket and runs under a single
//! deadline covering connect and all round trips. Nothing is retried here;
//! callers poll on their own schedule.

pub mod cursor;
pub mod quake;
pub mod reflex;

use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::Instant;

use crate::error::QueryError;

pub use self::quake::QuakeServer;
pub use self::reflex::ReflexServer;

/// Deadline for one whole query call.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(1);

/// Receive buffer size. Larger than any status response we expect.
const MAX_RESPONSE: usize = 8192;

/// A player on a game server. `name` may contain game color codes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClientInfo {
    pub name: String,
    pub score: i32,
}

/// Snapshot of everything a [`ServerQuery`] knows about its server.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServerStatus {
    pub alias: String,
    pub host: String,
    pub port: u16,
    pub password: String,
    pub hostname: String,
    pub mapname: String,
    pub gametype: String,
    pub clients: Vec<ClientInfo>,
    pub maxclients: i32,
    pub ping: Duration,
    pub online: bool,
    pub timelimit: i32,
    pub fraglimit: i32,
    pub capturelimit: i32,
}

/// Status query capability shared by all supported game protocols.
///
/// Accessors return whatever the last successful query cached. Limits a
/// protocol does not expose read as zero.
pub trait ServerQuery {
    /// Query the server and refresh the cached status.
    fn query(&mut self) -> impl Future<Output = Result<(), QueryError>> + Send;

    /// Name the bot knows this server by.
    fn alias(&self) -> &str;
    fn host(&self) -> &str;
    fn port(&self) -> u16;
    /// Join password handed to players. Empty if none.
    fn password(&self) -> &str;
    /// The server's own name, as it advertises it.
    fn hostname(&self) -> &str;
    fn mapname(&self) -> &str;
    fn gametype(&self) -> &str;
    fn clients(&self) -> &[ClientInfo];
    fn maxclients(&self) -> i32;
    fn timelimit(&self) -> i32;
    fn fraglimit(&self) -> i32;
    fn capturelimit(&self) -> i32;
    /// Round-trip time of the last status request.
    fn ping(&self) -> Duration;
    /// Whether the last query got a valid status response.
    fn online(&self) -> bool;

    fn status(&self) -> ServerStatus {
        ServerStatus {
            alias: self.alias().to_string(),
            host: self.host().to_string(),
            port: self.port(),
            password: self.password().to_string(),
            hostname: self.hostname().to_string(),
            mapname: self.mapname().to_string(),
            gametype: self.gametype().to_string(),
            clients: self.clients().to_vec(),
            maxclients: self.maxclients(),
            ping: self.ping(),
            online: self.online(),
            timelimit: self.timelimit(),
            fraglimit: self.fraglimit(),
            capturelimit: self.capturelimit(),
        }
    }
}

/// A configured game server of one of the supported protocols.
#[derive(Debug, Clone)]
pub enum GameServer {
    Quake(QuakeServer),
    Reflex(ReflexServer),
}

impl GameServer {
    /// Build a server handle from a game name. `addr` is `host[:port]`;
    /// the protocol's default port is used when none is given.
    pub fn new(game: &str, alias: &str, addr: &str, password: &str) -> Result<Self, QueryError> {
        match game.to_ascii_lowercase().as_str() {
            "q3" | "quake" | "cpm" | "cpma" | "wsw" | "warsow" => {
                Ok(GameServer::Quake(QuakeServer::new(alias, addr, password)?))
            }
            "reflex" => Ok(GameServer::Reflex(ReflexServer::new(alias, addr, password)?)),
            _ => Err(QueryError::UnknownGame(game.to_string())),
        }
    }
}

macro_rules! delegate {
    ($self:ident, $s:ident => $e:expr) => {
        match $self {
            GameServer::Quake($s) => $e,
            GameServer::Reflex($s) => $e,
        }
    };
}

impl ServerQuery for GameServer {
    async fn query(&mut self) -> Result<(), QueryError> {
        delegate!(self, s => s.query().await)
    }

    fn alias(&self) -> &str {
        delegate!(self, s => s.alias())
    }

    fn host(&self) -> &str {
        delegate!(self, s => s.host())
    }

    fn port(&self) -> u16 {
        delegate!(self, s => s.port())
    }

    fn password(&self) -> &str {
        delegate!(self, s => s.password())
    }

    fn hostname(&self) -> &str {
        delegate!(self, s => s.hostname())
    }

    fn mapname(&self) -> &str {
        delegate!(self, s => s.mapname())
    }

    fn gametype(&self) -> &str {
        delegate!(self, s => s.gametype())
    }

    fn clients(&self) -> &[ClientInfo] {
        delegate!(self, s => s.clients())
    }

    fn maxclients(&self) -> i32 {
        delegate!(self, s => s.maxclients())
    }

    fn timelimit(&self) -> i32 {
        delegate!(self, s => s.timelimit())
    }

    fn fraglimit(&self) -> i32 {
        delegate!(self, s => s.fraglimit())
    }

    fn capturelimit(&self) -> i32 {
        delegate!(self, s => s.capturelimit())
    }

    fn ping(&self) -> Duration {
        delegate!(self, s => s.ping())
    }

    fn online(&self) -> bool {
        delegate!(self, s => s.online())
    }
}

/// Split `host[:port]`, accepting `[v6addr]:port` as well.
fn split_host_port(addr: &str, default_port: u16) -> Result<(String, u16), QueryError> {
    let invalid = || QueryError::InvalidAddress(addr.to_string());
    let parse_port = |p: &str| p.parse::<u16>().map_err(|_| invalid());

    if let Some(rest) = addr.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
        let port = match tail.strip_prefix(':') {
            Some(p) => parse_port(p)?,
            None if tail.is_empty() => default_port,
            None => return Err(invalid()),
        };
        if host.is_empty() {
            return Err(invalid());
        }
        return Ok((host.to_string(), port));
    }

    match addr.split_once(':') {
        _ if addr.is_empty() => Err(invalid()),
        None => Ok((addr.to_string(), default_port)),
        Some((host, port)) if !host.is_empty() => Ok((host.to_string(), parse_port(port)?)),
        Some(_) => Err(invalid()),
    }
}

/// Run `fut`, failing with [`QueryError::Timeout`] once `deadline` passes.
async fn within<T, F>(deadline: Instant, fut: F) -> Result<T, QueryError>
where
    F: Future<Output = Result<T, QueryError>>,
{
    tokio::time::timeout_at(deadline, fut)
        .await
        .unwrap_or_else(|_| Err(QueryError::Timeout))
}

/// Resolve `host` and connect a fresh UDP socket to it.
async fn connect_udp(host: &str, port: u16) -> Result<UdpSocket, QueryError> {
    let addr = tokio::net::lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no address for {host}")))?;
    let local: SocketAddr = if addr.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(local).await?;
    socket.connect(addr).await?;
    Ok(socket)
}

/// Send one datagram and wait for one back.
async fn exchange(socket: &UdpSocket, request: &[u8], buf: &mut [u8]) -> Result<usize, QueryError> {
    socket.send(request).await?;
    Ok(socket.recv(buf).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_picks_protocol_by_game_name() {
        for game in ["q3", "quake", "cpm", "CPMA", "wsw", "warsow"] {
            let srv = GameServer::new(game, "ctf1", "example.org", "").unwrap();
            assert!(matches!(srv, GameServer::Quake(_)), "{game}");
        }
        let srv = GameServer::new("reflex", "rfx", "example.org:25800", "secret").unwrap();
        assert!(matches!(srv, GameServer::Reflex(_)));
        assert_eq!(srv.alias(), "rfx");
        assert_eq!(srv.password(), "secret");
        assert_eq!(srv.gametype(), "(Reflex)");
    }

    #[test]
    fn factory_rejects_unknown_game() {
        let err = GameServer::new("tetris", "t", "example.org", "").unwrap_err();
        assert!(matches!(err, QueryError::UnknownGame(ref g) if g == "tetris"));
    }

    #[test]
    fn host_port_splitting() {
        assert_eq!(
            split_host_port("example.org", 27960).unwrap(),
            ("example.org".to_string(), 27960)
        );
        assert_eq!(
            split_host_port("example.org:27961", 27960).unwrap(),
            ("example.org".to_string(), 27961)
        );
        assert_eq!(
            split_host_port("[::1]:25797", 1).unwrap(),
            ("::1".to_string(), 25797)
        );
        assert_eq!(split_host_port("[::1]", 7).unwrap(), ("::1".to_string(), 7));
        for bad in ["", ":27960", "example.org:port", "example.org:70000", "[::1"] {
            assert!(
                matches!(split_host_port(bad, 1), Err(QueryError::InvalidAddress(_))),
                "{bad}"
            );
        }
    }

    #[test]
    fn fresh_status_snapshot_is_offline() {
        let srv = GameServer::new("cpma", "ctf1", "example.org:27961", "pw").unwrap();
        let status = srv.status();
        assert_eq!(status.alias, "ctf1");
        assert_eq!(status.host, "example.org");
        assert_eq!(status.port, 27961);
        assert_eq!(status.password, "pw");
        assert!(!status.online);
        assert!(status.clients.is_empty());
        assert_eq!(status.maxclients, 0);
    }
}
