//! Chat connection: registration, keepalive, line routing and operator
//! tracking.
//!
//! A dialed [`Connection`] runs three tasks over the socket:
//!
//! - a reader that parses each line into an [`Event`], keeps protocol
//!   bookkeeping (PING, CTCP, operator membership) and forwards everything
//!   else to the consumer;
//! - a writer that drains the outbound queue, one line per command;
//! - a keepalive ticker that pings the server after a quiet spell.
//!
//! Both queues are bounded and sends wait when they are full, so nothing is
//! dropped. A consumer that stops reading events stalls the reader.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{ConnectionError, ParseError};
use crate::event::{strip_user_host, Event, CTCP_DELIM};
use crate::operators::Operators;

/// Capacity of both the outbound command queue and the inbound event queue.
pub const QUEUE_CAPACITY: usize = 64;

/// Longest inbound line accepted, terminator included. Longer lines are
/// discarded up to their newline.
pub const MAX_LINE_LEN: usize = 8192;

/// Configuration for connecting to a chat server.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Server address (host:port).
    pub server_addr: String,
    pub nick: String,
    /// Username (ident).
    pub user: String,
    pub realname: String,
    /// Server password. PASS is only sent when this is set.
    pub password: Option<String>,
    /// Channel whose NAMES list is requested once registration completes.
    pub channel: String,
    /// Reply to CTCP VERSION.
    pub version: String,
    /// Reply to CTCP FINGER.
    pub finger: String,
    /// How often the keepalive ticker wakes up.
    pub keepalive_interval: Duration,
    /// Quiet time after which the ticker sends a PING.
    pub idle_timeout: Duration,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:6667".to_string(),
            nick: "pkup".to_string(),
            user: "pkup".to_string(),
            realname: "pkup pickup bot".to_string(),
            password: None,
            channel: "#pickup".to_string(),
            version: "pkup".to_string(),
            finger: "pkup pickup bot".to_string(),
            keepalive_interval: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(180),
        }
    }
}

/// Receiving ends handed to the consumer on dial.
#[derive(Debug)]
pub struct Inbound {
    /// Events not consumed by the connection's own bookkeeping.
    pub events: mpsc::Receiver<Event>,
    /// Fatal reader/writer failures, at most one per task.
    pub errors: mpsc::Receiver<ConnectionError>,
}

/// State shared by the connection's tasks and the handle.
#[derive(Debug)]
struct Shared {
    operators: Mutex<Operators>,
    last_message: Mutex<Instant>,
}

impl Shared {
    fn new() -> Self {
        Self {
            operators: Mutex::new(Operators::new()),
            last_message: Mutex::new(Instant::now()),
        }
    }

    fn operators(&self) -> MutexGuard<'_, Operators> {
        self.operators.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn touch(&self) {
        *self.last_message.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_message
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }
}

/// Handle to a running chat connection.
///
/// Dropping the handle (or calling [`Connection::close`]) stops all three
/// tasks and closes the socket.
#[derive(Debug)]
pub struct Connection {
    nick: String,
    out_tx: mpsc::Sender<String>,
    shared: Arc<Shared>,
    tasks: Vec<JoinHandle<()>>,
}

impl Connection {
    /// Open a TCP connection to `config.server_addr`, start the connection
    /// tasks and queue registration.
    pub async fn dial(config: ConnectConfig) -> Result<(Self, Inbound), ConnectionError> {
        let tcp = TcpStream::connect(&config.server_addr)
            .await
            .map_err(|source| ConnectionError::Dial {
                addr: config.server_addr.clone(),
                source,
            })?;
        tracing::info!(addr = %config.server_addr, "Connected");
        Self::with_stream(tcp, config).await
    }

    /// Run the connection over an already established stream.
    pub async fn with_stream<S>(
        stream: S,
        config: ConnectConfig,
    ) -> Result<(Self, Inbound), ConnectionError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);

        let (out_tx, out_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (event_tx, events) = mpsc::channel(QUEUE_CAPACITY);
        // One slot each for the reader and the writer.
        let (err_tx, errors) = mpsc::channel(2);

        let shared = Arc::new(Shared::new());
        let config = Arc::new(config);
        let router = Router {
            config: config.clone(),
            shared: shared.clone(),
        };

        let tasks = vec![
            tokio::spawn(write_loop(writer, out_rx, err_tx.clone())),
            tokio::spawn(read_loop(
                BufReader::new(reader),
                router,
                out_tx.clone(),
                event_tx,
                err_tx,
            )),
            tokio::spawn(keepalive_loop(
                shared.clone(),
                out_tx.clone(),
                config.keepalive_interval,
                config.idle_timeout,
            )),
        ];

        let conn = Connection {
            nick: config.nick.clone(),
            out_tx,
            shared,
            tasks,
        };
        conn.register(&config).await?;
        Ok((conn, Inbound { events, errors }))
    }

    /// Queue NICK, USER and (if configured) PASS, in that order.
    async fn register(&self, config: &ConnectConfig) -> Result<(), ConnectionError> {
        tracing::info!(nick = %config.nick, "Registering");
        self.send(format!("NICK {}", config.nick)).await?;
        self.send(format!(
            "USER {} 0.0.0.0 0.0.0.0 :{}",
            config.user, config.realname
        ))
        .await?;
        if let Some(ref pass) = config.password {
            self.send(format!("PASS {pass}")).await?;
        }
        Ok(())
    }

    /// The nick we registered with.
    pub fn nick(&self) -> &str {
        &self.nick
    }

    pub async fn privmsg(&self, who: &str, msg: &str) -> Result<(), ConnectionError> {
        self.send(format!("PRIVMSG {who} :{msg}")).await
    }

    pub async fn notice(&self, who: &str, msg: &str) -> Result<(), ConnectionError> {
        self.send(format!("NOTICE {who} :{msg}")).await
    }

    pub async fn topic(&self, channel: &str, topic: &str) -> Result<(), ConnectionError> {
        self.send(format!("TOPIC {channel} :{topic}")).await
    }

    pub async fn join(&self, channel: &str) -> Result<(), ConnectionError> {
        tracing::info!(%channel, "Joining");
        self.send(format!("JOIN {channel}")).await
    }

    pub async fn part(&self, channel: &str) -> Result<(), ConnectionError> {
        self.send(format!("PART {channel}")).await
    }

    /// Queue a line verbatim (without the CRLF terminator).
    pub async fn raw(&self, line: &str) -> Result<(), ConnectionError> {
        self.send(line.to_string()).await
    }

    /// Whether `user` (a bare nick or `nick!user@host`) holds operator
    /// status. Membership is tracked per connection; `channel` is ignored.
    pub fn is_operator(&self, user: &str, _channel: &str) -> bool {
        self.shared.operators().contains(strip_user_host(user))
    }

    /// True once the writer has stopped and commands can no longer be sent.
    pub fn is_closed(&self) -> bool {
        self.out_tx.is_closed()
    }

    /// Stop all tasks and close the socket.
    pub fn close(self) {
        drop(self);
    }

    /// Enqueue one line, waiting for room if the queue is full.
    async fn send(&self, line: String) -> Result<(), ConnectionError> {
        self.out_tx
            .send(line)
            .await
            .map_err(|_| ConnectionError::Closed)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Outcome of routing one event.
#[derive(Debug, Default, PartialEq, Eq)]
struct Routed {
    /// Lines to send in response.
    replies: Vec<String>,
    /// Whether the event goes on to the consumer.
    forward: bool,
}

/// Protocol bookkeeping run by the reader for every parsed event.
struct Router {
    config: Arc<ConnectConfig>,
    shared: Arc<Shared>,
}

impl Router {
    fn route(&self, ev: &Event) -> Routed {
        let mut routed = Routed::default();
        match ev.cmd.as_str() {
            "welcome" => {
                tracing::info!("Registration complete");
                routed.replies.push(format!("NAMES {}", self.config.channel));
                routed.forward = true;
            }
            "rpl_namreply" => {
                let mut ops = self.shared.operators();
                ops.apply_names(&ev.msg);
                tracing::debug!(operators = ops.len(), "Names");
            }
            "mode" => self.shared.operators().apply_mode(&ev.args),
            "nick" => {
                // Some servers omit the colon on the new nick.
                let to = if ev.msg.is_empty() {
                    ev.args.first().map(String::as_str).unwrap_or_default()
                } else {
                    ev.msg.as_str()
                };
                if !to.is_empty() {
                    self.shared.operators().rename(&ev.nick, to);
                }
            }
            "part" | "quit" => self.shared.operators().remove(&ev.nick),
            "ping" => {
                let token = if ev.msg.is_empty() {
                    ev.args.first().map(String::as_str).unwrap_or_default()
                } else {
                    ev.msg.as_str()
                };
                routed.replies.push(format!("PONG :{token}"));
            }
            "version" => routed.replies.push(ctcp_notice(
                &ev.nick,
                &format!("VERSION {}", self.config.version),
            )),
            "time" => {
                let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S %z");
                routed
                    .replies
                    .push(ctcp_notice(&ev.nick, &format!("TIME {now}")));
            }
            "ctcp-ping" => routed.replies.push(format!("NOTICE {} :{}", ev.nick, ev.msg)),
            "finger" => routed
                .replies
                .push(ctcp_notice(&ev.nick, &self.config.finger)),
            _ => routed.forward = true,
        }
        routed
    }
}

fn ctcp_notice(to: &str, body: &str) -> String {
    format!("NOTICE {to} :{CTCP_DELIM}{body}{CTCP_DELIM}")
}

async fn read_loop<R>(
    mut reader: R,
    router: Router,
    out_tx: mpsc::Sender<String>,
    event_tx: mpsc::Sender<Event>,
    err_tx: mpsc::Sender<ConnectionError>,
) where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::with_capacity(512);
    // Set while the tail of an overlong line is being thrown away.
    let mut skipping = false;
    let err = loop {
        buf.clear();
        let read = (&mut reader)
            .take(MAX_LINE_LEN as u64)
            .read_until(b'\n', &mut buf)
            .await;
        match read {
            Ok(0) => break ConnectionError::Eof,
            Ok(_) => {}
            Err(e) => break ConnectionError::Read(e),
        }
        router.shared.touch();

        let complete = buf.ends_with(b"\n");
        if skipping {
            skipping = !complete;
            continue;
        }
        if !complete && buf.len() >= MAX_LINE_LEN {
            tracing::warn!("Dropping malformed line: {}", ParseError::TooLong(MAX_LINE_LEN));
            skipping = true;
            continue;
        }

        let line = String::from_utf8_lossy(&buf);
        tracing::debug!("<- {}", line.trim_end());
        let ev = match Event::parse(&line) {
            Ok(ev) => ev,
            Err(e) => {
                tracing::warn!("Dropping malformed line: {e}");
                continue;
            }
        };

        let routed = router.route(&ev);
        for reply in routed.replies {
            if out_tx.send(reply).await.is_err() {
                // The writer is gone and has reported why.
                return;
            }
        }
        if routed.forward {
            // A consumer that dropped its receiver still gets bookkeeping.
            let _ = event_tx.send(ev).await;
        }
    };
    tracing::warn!("Reader stopped: {err}");
    let _ = err_tx.send(err).await;
}

async fn write_loop<W>(
    mut writer: W,
    mut out_rx: mpsc::Receiver<String>,
    err_tx: mpsc::Sender<ConnectionError>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = out_rx.recv().await {
        if line.starts_with("PASS ") {
            tracing::debug!("-> PASS ****");
        } else {
            tracing::debug!("-> {line}");
        }
        if let Err(e) = write_line(&mut writer, &line).await {
            tracing::warn!("Write error: {e}");
            let _ = err_tx.send(ConnectionError::Write(e)).await;
            return;
        }
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\r\n").await?;
    writer.flush().await
}

/// Ping the server whenever nothing has been received for `idle`. The
/// token is the current time; replies are not checked.
async fn keepalive_loop(
    shared: Arc<Shared>,
    out_tx: mpsc::Sender<String>,
    interval: Duration,
    idle: Duration,
) {
    let interval = interval.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    loop {
        ticker.tick().await;
        if shared.idle_for() < idle {
            continue;
        }
        let token = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        if out_tx.send(format!("PING {token}")).await.is_err() {
            return;
        }
    }
}
