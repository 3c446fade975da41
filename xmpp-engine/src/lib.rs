//! Client-side [XMPP](https://xmpp.org/) engine with asynchronous I/O using [tokio](https://tokio.rs/).
//!
//! The engine negotiates an XMPP stream up to the point where stanzas flow:
//! TCP connect with SRV failover, optional STARTTLS, SASL authentication
//! (PLAIN, EXTERNAL, SCRAM-SHA-1/-256/-512 with and without channel binding),
//! resource binding and legacy session establishment. After that it
//! correlates IQ requests with their responses and hands everything else to
//! [`ConnectionDelegate`]s.
//!
//! # Getting started
//!
//! ```no_run
//! use std::sync::Arc;
//! use xmpp_engine::connection::{Connection, ConnectionConfig, ConnectionDelegate};
//! use xmpp_engine::stanza::Message;
//! use xmpp_engine::Client;
//!
//! struct Echo;
//!
//! impl ConnectionDelegate for Echo {
//!     fn connection_did_receive_message(&self, connection: &mut Connection, message: &Message) {
//!         if let (Some(from), Some(body)) = (message.from.clone(), message.body()) {
//!             let _ = connection.send(Message::chat(from, &body));
//!         }
//!     }
//! }
//!
//! # async fn run() -> Result<(), xmpp_engine::Error> {
//! let config = ConnectionConfig::new("bot@example.com/echo")?.with_password("secret");
//! let mut client = Client::new(config)?;
//! client.connection_mut().add_delegate(Arc::new(Echo));
//! client.run().await
//! # }
//! ```
//!
//! # Structure
//!
//! - [`connection::Connection`] is the protocol state machine. It performs no
//!   I/O and can be driven by hand, which is how its tests work.
//! - [`Client`] drives a connection over a [`connect::ServerConnector`]
//!   transport on tokio.
//! - [`xmlstream`] turns bytes into stream packets and back.
//! - [`connect`] resolves and opens transports, ordering SRV records per
//!   RFC 2782.
//!
//! Supported transports:
//! - [x] StartTLS TCP (IPv4/IPv6 with [happy eyeballs](https://en.wikipedia.org/wiki/Happy_Eyeballs) support)
//! - [x] Custom connectors via the [`connect::ServerConnector`] trait
//! - [ ] Direct TLS
//! - [ ] Websockets

#![deny(unsafe_code, missing_docs, bare_trait_objects)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod connect;
pub mod connection;
pub mod ns;
pub mod stanza;
pub mod storage;
pub mod xmlstream;

mod client;
pub use client::{Client, ClientHandle};

/// Detailed error types
pub mod error;

#[doc(inline)]
/// Generic xmpp-engine Error
pub use crate::error::Error;

pub use connection::{Connection, ConnectionConfig, ConnectionDelegate};
pub use stanza::Stanza;

// Re-exports
pub use jid;
pub use minidom;
pub use sasl;
