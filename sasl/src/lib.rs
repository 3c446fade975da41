//! Client-side SASL mechanisms, as used during XMPP stream negotiation.
//!
//! Every mechanism implements [`client::Mechanism`]: construct it from a set of
//! [`common::Credentials`], send its [`initial`](client::Mechanism::initial)
//! payload, feed each server challenge to
//! [`response`](client::Mechanism::response) and finally hand the additional
//! data of the server's success message to
//! [`success`](client::Mechanism::success).
//!
//! ```rust
//! use sasl::client::Mechanism;
//! use sasl::client::mechanisms::Plain;
//! use sasl::common::Credentials;
//!
//! let creds = Credentials::default()
//!     .with_username("juliet")
//!     .with_password("r0m30");
//! let mut mechanism = Plain::from_credentials(creds).unwrap();
//! assert_eq!(mechanism.initial(), Some(b"\0juliet\0r0m30".to_vec()));
//! ```
//!
//! A single mechanism instance covers a single authentication attempt. Create
//! a fresh one for every attempt; SCRAM nonces are generated at construction
//! time and must never be reused.

#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod client;
pub mod common;
