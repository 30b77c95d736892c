//! Reflex status queries, which use the Source engine server query
//! protocol: an info request, then a challenge/response player request.
//!
//! Reflex answers on its Steam query port, which is not always the one
//! players connect to, so a short list of likely ports is tried.

use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::Instant;

use super::cursor::Cursor;
use super::{connect_udp, exchange, split_host_port, within, ClientInfo, ServerQuery};
use super::{MAX_RESPONSE, QUERY_TIMEOUT};
use crate::error::{DecodeError, QueryError};

pub const DEFAULT_STEAM_PORT: u16 = 25797;

/// Tried in order after the configured Steam port.
const FALLBACK_PORTS: [u16; 7] = [25798, 25799, 25800, 25801, 25803, 25805, 25807];

pub const INFO_REQUEST: &[u8] = b"\xFF\xFF\xFF\xFFTSource Engine Query\0";

/// Player request with the challenge placeholder at bytes 5..9.
pub const CHALLENGE_REQUEST: [u8; 9] = [0xFF, 0xFF, 0xFF, 0xFF, 0x55, 0xFF, 0xFF, 0xFF, 0xFF];

/// Marker plus response type and protocol version.
const INFO_HEADER_LEN: usize = 6;
const PLAYER_RESPONSE: u8 = 0x44;

// Extra data flags.
const EDF_PORT: u8 = 0x80;
const EDF_STEAM_ID: u8 = 0x10;
const EDF_SPECTATOR: u8 = 0x40;

const GAMETYPE: &str = "(Reflex)";

/// Decoded info response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Info {
    pub hostname: String,
    pub map: String,
    pub folder: String,
    pub game: String,
    pub app_id: u16,
    pub players: u8,
    pub max_players: u8,
    /// Port players connect to, if the server advertises it.
    pub game_port: Option<u16>,
    /// Spectator relay as `host:port`.
    pub spectator: Option<String>,
}

/// Decode an info response datagram, header included.
pub fn decode_info(buf: &[u8]) -> Result<Info, DecodeError> {
    if buf.len() <= INFO_HEADER_LEN {
        return Err(DecodeError::ShortResponse {
            len: buf.len(),
            min: INFO_HEADER_LEN + 1,
        });
    }
    let mut cur = Cursor::new(&buf[INFO_HEADER_LEN..]);

    let hostname = cur.read_cstr()?;
    let map = cur.read_cstr()?;
    let folder = cur.read_cstr()?;
    let game = cur.read_cstr()?;
    let app_id = cur.read_u16_le()?;
    let players = cur.read_u8()?;
    let max_players = cur.read_u8()?;
    // Bots, server type, environment, visibility, VAC.
    cur.skip(5)?;
    let _version = cur.read_cstr()?;

    let mut info = Info {
        hostname,
        map,
        folder,
        game,
        app_id,
        players,
        max_players,
        ..Default::default()
    };

    // Older servers stop before the flags byte.
    if cur.is_empty() {
        return Ok(info);
    }
    let flags = cur.read_u8()?;
    if flags & EDF_PORT != 0 {
        info.game_port = Some(cur.read_u16_le()?);
    }
    if flags & EDF_STEAM_ID != 0 {
        cur.skip(8)?;
    }
    if flags & EDF_SPECTATOR != 0 {
        let port = cur.read_u16_le()?;
        let host = cur.read_cstr()?;
        info.spectator = Some(format!("{host}:{port}"));
    }
    Ok(info)
}

/// Build the second player request by echoing the challenge token found
/// at bytes 5..9 of the server's reply.
pub fn challenge_request(reply: &[u8]) -> Result<[u8; 9], DecodeError> {
    let token = reply.get(5..9).ok_or(DecodeError::ShortResponse {
        len: reply.len(),
        min: 9,
    })?;
    let mut request = CHALLENGE_REQUEST;
    request[5..9].copy_from_slice(token);
    Ok(request)
}

/// Decode a player response datagram.
pub fn decode_players(buf: &[u8]) -> Result<Vec<ClientInfo>, DecodeError> {
    if buf.len() < 6 {
        return Err(DecodeError::ShortResponse {
            len: buf.len(),
            min: 6,
        });
    }
    if buf[4] != PLAYER_RESPONSE {
        return Err(DecodeError::BadSentinel {
            expected: PLAYER_RESPONSE,
            found: buf[4],
        });
    }
    let count = usize::from(buf[5]);
    let mut cur = Cursor::new(&buf[6..]);
    let mut clients = Vec::with_capacity(count);
    for _ in 0..count {
        let _index = cur.read_u8()?;
        let name = cur.read_cstr()?;
        let score = cur.read_i32_le()?;
        let _duration = cur.read_f32_le()?;
        clients.push(ClientInfo { name, score });
    }
    Ok(clients)
}

#[derive(Debug, Clone)]
pub struct ReflexServer {
    alias: String,
    host: String,
    steam_port: u16,
    password: String,
    timeout: Duration,
    info: Info,
    clients: Vec<ClientInfo>,
    ping: Duration,
    online: bool,
}

impl ReflexServer {
    /// `addr` is `host[:steam_port]`, port defaulting to 25797.
    pub fn new(alias: &str, addr: &str, password: &str) -> Result<Self, QueryError> {
        let (host, steam_port) = split_host_port(addr, DEFAULT_STEAM_PORT)?;
        Ok(Self {
            alias: alias.to_string(),
            host,
            steam_port,
            password: password.to_string(),
            timeout: QUERY_TIMEOUT,
            info: Info::default(),
            clients: Vec::new(),
            ping: Duration::ZERO,
            online: false,
        })
    }

    /// Override the per-call deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The last decoded info response.
    pub fn info(&self) -> &Info {
        &self.info
    }

    fn candidate_ports(&self) -> impl Iterator<Item = u16> {
        std::iter::once(self.steam_port).chain(FALLBACK_PORTS)
    }

    async fn connect(&self) -> Result<UdpSocket, QueryError> {
        let mut last_err = None;
        for port in self.candidate_ports() {
            match connect_udp(&self.host, port).await {
                Ok(socket) => return Ok(socket),
                Err(e) => {
                    tracing::debug!(alias = %self.alias, port, "Connect failed: {e}");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or(QueryError::Timeout))
    }
}

impl ServerQuery for ReflexServer {
    /// A failed player request leaves `online` as set by the info request
    /// and keeps the previous player list.
    async fn query(&mut self) -> Result<(), QueryError> {
        self.online = false;
        let deadline = Instant::now() + self.timeout;
        let socket = within(deadline, self.connect()).await?;
        let mut buf = vec![0u8; MAX_RESPONSE];

        let start = Instant::now();
        let n = within(deadline, exchange(&socket, INFO_REQUEST, &mut buf)).await?;
        self.ping = start.elapsed();
        self.info = decode_info(&buf[..n])?;
        self.online = true;

        let n = within(deadline, exchange(&socket, &CHALLENGE_REQUEST, &mut buf)).await?;
        let request = challenge_request(&buf[..n])?;
        let n = within(deadline, exchange(&socket, &request, &mut buf)).await?;
        self.clients = decode_players(&buf[..n])?;
        Ok(())
    }

    fn alias(&self) -> &str {
        &self.alias
    }

    fn host(&self) -> &str {
        &self.host
    }

    /// The advertised game port, or the Steam query port until one is known.
    fn port(&self) -> u16 {
        self.info.game_port.unwrap_or(self.steam_port)
    }

    fn password(&self) -> &str {
        &self.password
    }

    fn hostname(&self) -> &str {
        &self.info.hostname
    }

    fn mapname(&self) -> &str {
        &self.info.map
    }

    // The protocol carries no game mode or limits.
    fn gametype(&self) -> &str {
        GAMETYPE
    }

    fn clients(&self) -> &[ClientInfo] {
        &self.clients
    }

    fn maxclients(&self) -> i32 {
        i32::from(self.info.max_players)
    }

    fn timelimit(&self) -> i32 {
        0
    }

    fn fraglimit(&self) -> i32 {
        0
    }

    fn capturelimit(&self) -> i32 {
        0
    }

    fn ping(&self) -> Duration {
        self.ping
    }

    fn online(&self) -> bool {
        self.online
    }
}
