//! pkup SDK
//!
//! Protocol layer of the pkup pickup bot: a long-lived chat connection and
//! UDP status queries for the game servers the bot hands out.
//!
//! # Modules
//!
//! - [`client`] — Chat connection with reader, writer and keepalive tasks
//! - [`event`] — Parsed chat lines
//! - [`operators`] — Channel operator tracking
//! - [`query`] — Game-server status queries (Quake 3 style and Reflex)
//! - [`error`] — Error types

pub mod client;
pub mod error;
pub mod event;
pub mod operators;
pub mod query;

pub use client::{ConnectConfig, Connection, Inbound};
pub use error::{ConnectionError, DecodeError, ParseError, QueryError};
pub use event::Event;
pub use query::{ClientInfo, GameServer, ServerQuery, ServerStatus};
