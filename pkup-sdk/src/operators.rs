//! Channel operator membership, as observed from NAMES replies, MODE
//! changes, nick changes and departures.
//!
//! Membership is tracked per connection, not per channel: the bot sits in a
//! single channel.

use std::collections::HashSet;

#[derive(Debug, Default, Clone)]
pub struct Operators {
    nicks: HashSet<String>,
}

impl Operators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, nick: &str) -> bool {
        self.nicks.contains(nick)
    }

    pub fn len(&self) -> usize {
        self.nicks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nicks.is_empty()
    }

    /// Apply the nick list of an RPL_NAMREPLY trailing parameter.
    /// `@nick` marks an operator; anything else (including `+nick`) clears
    /// a stale entry for that nick.
    pub fn apply_names(&mut self, names: &str) {
        for token in names.split(' ') {
            if token.len() < 2 {
                continue;
            }
            if let Some(nick) = token.strip_prefix('@') {
                self.nicks.insert(nick.to_string());
            } else {
                let nick = token.strip_prefix('+').unwrap_or(token);
                self.nicks.remove(nick);
            }
        }
    }

    /// Apply MODE arguments: `[target, flag, nick, flag, nick, ...]`.
    /// Only `+o` and `-o` pairs have an effect.
    pub fn apply_mode(&mut self, args: &[String]) {
        let Some(pairs) = args.get(1..) else {
            return;
        };
        for pair in pairs.chunks_exact(2) {
            match pair[0].as_str() {
                "+o" => {
                    self.nicks.insert(pair[1].clone());
                }
                "-o" => {
                    self.nicks.remove(&pair[1]);
                }
                _ => {}
            }
        }
    }

    /// Carry operator status over a nick change. No-op for non-operators.
    pub fn rename(&mut self, from: &str, to: &str) {
        if self.nicks.remove(from) {
            self.nicks.insert(to.to_string());
        }
    }

    pub fn remove(&mut self, nick: &str) {
        self.nicks.remove(nick);
    }
}
