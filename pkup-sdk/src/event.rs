//! Parsed chat-protocol lines.
//!
//! Grammar: `[":" prefix " "] command [" " args...] [" :" trailing]`.
//! Numeric replies we care about are renamed (`001` becomes `welcome`) and
//! CTCP queries carried in a PRIVMSG are lifted into their own command tag,
//! so consumers can match on `cmd` alone.

use crate::error::ParseError;

/// CTCP payloads are wrapped in this byte.
pub const CTCP_DELIM: char = '\x01';

/// Numeric replies that get a readable name. Anything else keeps its digits.
const NUMERICS: &[(&str, &str)] = &[
    ("001", "welcome"),
    ("002", "rpl_yourhost"),
    ("003", "rpl_created"),
    ("004", "rpl_myinfo"),
    ("332", "rpl_topic"),
    ("353", "rpl_namreply"),
    ("366", "rpl_endofnames"),
    ("372", "rpl_motd"),
    ("375", "rpl_motdstart"),
    ("376", "rpl_endofmotd"),
    ("433", "err_nicknameinuse"),
];

/// One inbound line, split into its protocol parts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Event {
    /// Lowercase command tag, e.g. `privmsg`, `welcome`, `ctcp-ping`.
    pub cmd: String,
    /// Raw prefix without the leading colon. Empty if the line had none.
    pub src: String,
    pub nick: String,
    pub user: String,
    pub host: String,
    /// Middle parameters, excluding the trailing one.
    pub args: Vec<String>,
    /// Trailing parameter (after `" :"`), possibly empty.
    pub msg: String,
    /// The normalized line.
    pub raw: String,
}

impl Event {
    /// Parse one line. Line terminators are stripped, runs of spaces are
    /// collapsed and the edges trimmed before splitting.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = normalize(line.trim_end_matches(['\r', '\n']));
        if line.is_empty() {
            return Err(ParseError::Empty);
        }

        let mut ev = Event {
            raw: line.clone(),
            ..Default::default()
        };

        let mut rest = line.as_str();
        if let Some(stripped) = rest.strip_prefix(':') {
            let Some((src, tail)) = stripped.split_once(' ') else {
                return Err(ParseError::MissingCommand(line.clone()));
            };
            ev.src = src.to_string();
            if let Some((nick, user, host)) = split_user_string(src) {
                ev.nick = nick.to_string();
                ev.user = user.to_string();
                ev.host = host.to_string();
            }
            rest = tail;
        }

        let head = match rest.split_once(" :") {
            Some((head, trailing)) => {
                ev.msg = trailing.to_string();
                head
            }
            None => rest,
        };

        let mut tokens = head.split(' ');
        let cmd = tokens.next().unwrap_or_default().to_ascii_lowercase();
        if cmd.is_empty() {
            return Err(ParseError::MissingCommand(line.clone()));
        }
        ev.args = tokens.map(str::to_string).collect();
        ev.cmd = cmd;

        ev.lift_ctcp();
        if let Some(name) = numeric_name(&ev.cmd) {
            ev.cmd = name.to_string();
        }
        Ok(ev)
    }

    /// Turn a CTCP query (`PRIVMSG x :\x01VERSION\x01`) into a command tag
    /// of its own. Any query starting with "ping" becomes `ctcp-ping` so it
    /// cannot be confused with a server PING.
    fn lift_ctcp(&mut self) {
        if self.cmd != "privmsg" || !self.msg.starts_with(CTCP_DELIM) {
            return;
        }
        let query = self.msg.trim_matches(CTCP_DELIM).to_lowercase();
        if query.is_empty() {
            return;
        }
        self.cmd = if query.starts_with("ping") {
            "ctcp-ping".to_string()
        } else {
            query
        };
    }

    /// True if this event came from a user rather than a server.
    pub fn from_user(&self) -> bool {
        !self.nick.is_empty()
    }
}

/// Readable name for a three-digit numeric reply, if it has one.
pub fn numeric_name(cmd: &str) -> Option<&'static str> {
    NUMERICS
        .iter()
        .find(|(code, _)| *code == cmd)
        .map(|(_, name)| *name)
}

/// Split `nick!user@host` into its parts. Returns `None` unless both
/// separators are present in the right order.
pub fn split_user_string(s: &str) -> Option<(&str, &str, &str)> {
    let bang = s.find('!')?;
    let at = s.find('@')?;
    if at < bang {
        return None;
    }
    Some((&s[..bang], &s[bang + 1..at], &s[at + 1..]))
}

/// The nick part of a `nick!user@host` string, or the whole string if it
/// carries no user/host suffix.
pub fn strip_user_host(s: &str) -> &str {
    match s.find('!') {
        Some(bang) => &s[..bang],
        None => s,
    }
}

fn normalize(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut last_space = false;
    for c in line.chars() {
        if c == ' ' {
            if !last_space {
                out.push(c);
            }
            last_space = true;
        } else {
            out.push(c);
            last_space = false;
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_privmsg_with_full_prefix() {
        let ev = Event::parse(":nick!user@host PRIVMSG #chan :hello").unwrap();
        assert_eq!(ev.nick, "nick");
        assert_eq!(ev.user, "user");
        assert_eq!(ev.host, "host");
        assert_eq!(ev.src, "nick!user@host");
        assert_eq!(ev.cmd, "privmsg");
        assert_eq!(ev.args, vec!["#chan"]);
        assert_eq!(ev.msg, "hello");
        assert!(ev.from_user());
    }

    #[test]
    fn numeric_welcome_is_renamed() {
        let ev = Event::parse(":server.example 001 me :Welcome").unwrap();
        assert_eq!(ev.cmd, "welcome");
        assert_eq!(ev.src, "server.example");
        assert!(ev.nick.is_empty());
        assert_eq!(ev.args, vec!["me"]);
        assert_eq!(ev.msg, "Welcome");
    }

    #[test]
    fn unmapped_numeric_keeps_digits() {
        let ev = Event::parse(":server.example 999 me :whatever").unwrap();
        assert_eq!(ev.cmd, "999");
    }

    #[test]
    fn names_reply_args_and_trailing() {
        let ev = Event::parse(":irc.example 353 bot = #pickup :@alice +bob carol\r\n").unwrap();
        assert_eq!(ev.cmd, "rpl_namreply");
        assert_eq!(ev.args, vec!["bot", "=", "#pickup"]);
        assert_eq!(ev.msg, "@alice +bob carol");
    }

    #[test]
    fn spaces_are_collapsed_and_trimmed() {
        let ev = Event::parse("  PING    :irc.example   ").unwrap();
        assert_eq!(ev.raw, "PING :irc.example");
        assert_eq!(ev.cmd, "ping");
        assert!(ev.args.is_empty());
        assert_eq!(ev.msg, "irc.example");
    }

    #[test]
    fn trailing_splits_only_once() {
        let ev = Event::parse(":a!b@c PRIVMSG #chan :one :two").unwrap();
        assert_eq!(ev.msg, "one :two");
    }

    #[test]
    fn ctcp_version_becomes_command() {
        let ev = Event::parse(":a!b@c PRIVMSG bot :\x01VERSION\x01").unwrap();
        assert_eq!(ev.cmd, "version");
        assert_eq!(ev.nick, "a");
    }

    #[test]
    fn ctcp_ping_gets_distinct_tag() {
        let ev = Event::parse(":a!b@c PRIVMSG bot :\x01PING 12345\x01").unwrap();
        assert_eq!(ev.cmd, "ctcp-ping");
        assert_eq!(ev.msg, "\x01PING 12345\x01");
    }

    #[test]
    fn server_prefix_without_user_host() {
        let ev = Event::parse(":irc.example NOTICE * :*** Looking up your hostname").unwrap();
        assert_eq!(ev.src, "irc.example");
        assert!(ev.nick.is_empty() && ev.user.is_empty() && ev.host.is_empty());
        assert_eq!(ev.cmd, "notice");
        assert_eq!(ev.args, vec!["*"]);
    }

    #[test]
    fn malformed_lines_are_rejected() {
        assert_eq!(Event::parse("\r\n"), Err(ParseError::Empty));
        assert_eq!(Event::parse("   "), Err(ParseError::Empty));
        assert!(matches!(Event::parse(":prefixonly"), Err(ParseError::MissingCommand(_))));
    }

    #[test]
    fn user_string_helpers() {
        assert_eq!(split_user_string("n!u@h"), Some(("n", "u", "h")));
        assert_eq!(split_user_string("server.example"), None);
        assert_eq!(strip_user_host("alice!~a@example.org"), "alice");
        assert_eq!(strip_user_host("alice"), "alice");
    }
}
