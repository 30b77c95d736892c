//! Quake 3 style `getstatus` queries (Quake 3, CPMA, Warsow).
//!
//! Request: `\xFF\xFF\xFF\xFFgetstatus\n`. Response: the same marker,
//! `statusResponse\n`, one line of `\key\value` server variables, then one
//! `score ping "name"` line per player.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use super::{connect_udp, exchange, split_host_port, within, ClientInfo, ServerQuery};
use super::{MAX_RESPONSE, QUERY_TIMEOUT};
use crate::error::{DecodeError, QueryError};

pub const DEFAULT_PORT: u16 = 27960;
pub const STATUS_REQUEST: &[u8] = b"\xFF\xFF\xFF\xFFgetstatus\n";
pub const STATUS_HEADER: &[u8] = b"\xFF\xFF\xFF\xFFstatusResponse\n";

/// `g_gametype` codes as used by CPMA and baseq3.
const GAMETYPES: &[(&str, &str)] = &[
    ("-1", "hoonymode"),
    ("0", "ffa"),
    ("1", "1v1"),
    ("3", "tdm"),
    ("4", "ctf"),
    ("5", "va"),
    ("6", "freeze"),
    ("7", "ctfs"),
    ("8", "ntf"),
];

const UNKNOWN_GAMETYPE: &str = "Unknown gametype";

/// A decoded `statusResponse` packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusResponse {
    /// Server variables, keys lowercased.
    pub vars: HashMap<String, String>,
    pub clients: Vec<ClientInfo>,
}

/// Parse a full `statusResponse` datagram, marker included.
pub fn parse_status(buf: &[u8]) -> Result<StatusResponse, DecodeError> {
    let body = buf
        .strip_prefix(STATUS_HEADER)
        .ok_or(DecodeError::BadHeader)?;
    let text = String::from_utf8_lossy(body);
    let mut lines = text.split('\n');

    let mut status = StatusResponse::default();
    let vars_line = lines.next().unwrap_or_default();
    let tokens: Vec<&str> = vars_line
        .strip_prefix('\\')
        .unwrap_or(vars_line)
        .split('\\')
        .collect();
    for pair in tokens.chunks_exact(2) {
        status.vars.insert(pair[0].to_lowercase(), pair[1].to_string());
    }

    for line in lines {
        let mut fields = line.splitn(3, ' ');
        let (Some(score), Some(_ping), Some(name)) = (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        status.clients.push(ClientInfo {
            name: name.trim_matches('"').to_string(),
            score: score.parse().unwrap_or(0),
        });
    }
    Ok(status)
}

#[derive(Debug, Clone)]
pub struct QuakeServer {
    alias: String,
    host: String,
    port: u16,
    password: String,
    timeout: Duration,
    vars: HashMap<String, String>,
    clients: Vec<ClientInfo>,
    ping: Duration,
    online: bool,
}

impl QuakeServer {
    /// `addr` is `host[:port]`, port defaulting to 27960.
    pub fn new(alias: &str, addr: &str, password: &str) -> Result<Self, QueryError> {
        let (host, port) = split_host_port(addr, DEFAULT_PORT)?;
        Ok(Self {
            alias: alias.to_string(),
            host,
            port,
            password: password.to_string(),
            timeout: QUERY_TIMEOUT,
            vars: HashMap::new(),
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

    /// A cached server variable, by case-insensitive name.
    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(&key.to_lowercase()).map(String::as_str)
    }

    fn int_var(&self, key: &str) -> i32 {
        self.var(key).and_then(|v| v.trim().parse().ok()).unwrap_or(0)
    }

    /// Merge a decoded response into the cache. Variables from earlier
    /// responses that are absent from this one are kept.
    fn apply(&mut self, status: StatusResponse) {
        self.vars.extend(status.vars);
        self.clients = status.clients;
        self.online = true;
    }
}

impl ServerQuery for QuakeServer {
    async fn query(&mut self) -> Result<(), QueryError> {
        self.online = false;
        let deadline = Instant::now() + self.timeout;

        let socket = within(deadline, connect_udp(&self.host, self.port)).await?;
        let mut buf = vec![0u8; MAX_RESPONSE];
        let start = Instant::now();
        let n = within(deadline, exchange(&socket, STATUS_REQUEST, &mut buf)).await?;
        self.ping = start.elapsed();

        let status = parse_status(&buf[..n]).map_err(|e| {
            tracing::debug!(alias = %self.alias, "Bad status response: {e}");
            e
        })?;
        self.apply(status);
        Ok(())
    }

    fn alias(&self) -> &str {
        &self.alias
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn password(&self) -> &str {
        &self.password
    }

    fn hostname(&self) -> &str {
        self.var("sv_hostname").unwrap_or_default()
    }

    fn mapname(&self) -> &str {
        self.var("mapname").unwrap_or_default()
    }

    /// CPMA/baseq3 codes map to short labels; other games (Warsow) put a
    /// readable name in `g_gametype` or `gametype` directly.
    fn gametype(&self) -> &str {
        let raw = self.var("g_gametype");
        if let Some(label) = raw.and_then(|code| {
            GAMETYPES
                .iter()
                .find(|(c, _)| *c == code)
                .map(|(_, label)| *label)
        }) {
            return label;
        }
        raw.or_else(|| self.var("gametype"))
            .unwrap_or(UNKNOWN_GAMETYPE)
    }

    fn clients(&self) -> &[ClientInfo] {
        &self.clients
    }

    fn maxclients(&self) -> i32 {
        self.int_var("sv_maxclients")
    }

    fn timelimit(&self) -> i32 {
        self.int_var("timelimit")
    }

    fn fraglimit(&self) -> i32 {
        self.int_var("fraglimit")
    }

    fn capturelimit(&self) -> i32 {
        self.int_var("capturelimit")
    }

    fn ping(&self) -> Duration {
        self.ping
    }

    fn online(&self) -> bool {
        self.online
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(body: &str) -> Vec<u8> {
        let mut buf = STATUS_HEADER.to_vec();
        buf.extend_from_slice(body.as_bytes());
        buf
    }

    fn server() -> QuakeServer {
        QuakeServer::new("ctf1", "example.org", "").unwrap()
    }

    #[test]
    fn parses_vars_and_players() {
        let status = parse_status(&packet("\\mapname\\q3dm6\\sv_maxclients\\16\n10 5 \"Bob\"\n")).unwrap();
        assert_eq!(status.vars.get("mapname").map(String::as_str), Some("q3dm6"));
        assert_eq!(status.vars.get("sv_maxclients").map(String::as_str), Some("16"));
        assert_eq!(
            status.clients,
            vec![ClientInfo {
                name: "Bob".to_string(),
                score: 10
            }]
        );

        let mut srv = server();
        srv.apply(status);
        assert!(srv.online());
        assert_eq!(srv.mapname(), "q3dm6");
        assert_eq!(srv.maxclients(), 16);
        assert_eq!(srv.clients().len(), 1);
    }

    #[test]
    fn missing_marker_is_bad_header() {
        let err = parse_status(b"\xFF\xFF\xFF\xFFprint\nbanned\n").unwrap_err();
        assert_eq!(err, DecodeError::BadHeader);
        assert!(!err.is_truncation());
        assert_eq!(parse_status(b"\xFF\xFF"), Err(DecodeError::BadHeader));
    }

    #[test]
    fn keys_are_case_insensitive_and_odd_token_ignored() {
        let status = parse_status(&packet("\\MapName\\q3dm17\\dangling")).unwrap();
        assert_eq!(status.vars.len(), 1);
        assert_eq!(status.vars.get("mapname").map(String::as_str), Some("q3dm17"));
        assert!(status.clients.is_empty());
    }

    #[test]
    fn short_player_lines_are_skipped() {
        let status =
            parse_status(&packet("\\a\\b\n3 40\n\n-2 12 \"^1Dark Angel\"\nx 0 \"Who\"\n")).unwrap();
        assert_eq!(
            status.clients,
            vec![
                ClientInfo {
                    name: "^1Dark Angel".to_string(),
                    score: -2
                },
                ClientInfo {
                    name: "Who".to_string(),
                    score: 0
                },
            ]
        );
    }

    #[test]
    fn gametype_labels() {
        let mut srv = server();
        assert_eq!(srv.gametype(), "Unknown gametype");

        srv.apply(parse_status(&packet("\\gametype\\bomb")).unwrap());
        assert_eq!(srv.gametype(), "bomb");

        srv.apply(parse_status(&packet("\\g_gametype\\4")).unwrap());
        assert_eq!(srv.gametype(), "ctf");

        srv.apply(parse_status(&packet("\\g_gametype\\ca")).unwrap());
        assert_eq!(srv.gametype(), "ca");
    }

    #[test]
    fn numeric_vars_default_to_zero() {
        let mut srv = server();
        srv.apply(
            parse_status(&packet("\\timelimit\\20\\fraglimit\\lots\\capturelimit\\8")).unwrap(),
        );
        assert_eq!(srv.timelimit(), 20);
        assert_eq!(srv.fraglimit(), 0);
        assert_eq!(srv.capturelimit(), 8);
        assert_eq!(srv.maxclients(), 0);
    }

    #[test]
    fn later_responses_merge_over_cached_vars() {
        let mut srv = server();
        srv.apply(parse_status(&packet("\\sv_hostname\\Roboty Arena\\mapname\\cpm22")).unwrap());
        srv.apply(parse_status(&packet("\\mapname\\cpm3a")).unwrap());
        assert_eq!(srv.hostname(), "Roboty Arena");
        assert_eq!(srv.mapname(), "cpm3a");
        assert_eq!(srv.var("SV_HOSTNAME"), Some("Roboty Arena"));
    }
}
