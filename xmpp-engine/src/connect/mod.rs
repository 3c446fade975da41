//! `ServerConnector` provides transports for XMPP clients

use core::future::Future;

use sasl::common::ChannelBinding;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::Error;

#[cfg(feature = "starttls")]
pub mod starttls;
#[cfg(feature = "starttls")]
pub use starttls::{StartTlsServerConnector, TlsConfig};

#[cfg(feature = "dns")]
mod dns;
#[cfg(feature = "dns")]
pub use dns::{DnsConfig, Resolver, DEFAULT_CLIENT_PORT};

pub mod srv;

/// Byte transport a [`ServerConnector`] produces.
pub trait AsyncReadAndWrite: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncReadAndWrite for T {}

/// What a completed TLS handshake offers to authentication.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TlsSession {
    /// Channel binding data for the SCRAM `-PLUS` mechanisms
    pub channel_binding: ChannelBinding,
    /// Whether a client certificate was presented, which SASL EXTERNAL
    /// relies on
    pub client_certificate: bool,
}

/// Trait that must be extended by the implementation of ServerConnector
pub trait ServerConnectorError: core::error::Error + Sync + Send {}

/// Opens and upgrades transports to an XMPP server. Called once per
/// connection attempt.
pub trait ServerConnector: Send + Sync + 'static {
    /// The type of Stream this ServerConnector produces
    type Stream: AsyncReadAndWrite;

    /// Open a transport to the server of `domain`.
    ///
    /// Implementations try alternative endpoints on their own and only
    /// fail once none of them could be reached. No XMPP data is exchanged.
    fn connect(&self, domain: &str) -> impl Future<Output = Result<Self::Stream, Error>> + Send;

    /// Upgrade `stream` to TLS in place after `<proceed/>`, verifying the
    /// server certificate for `domain`.
    ///
    /// Returns the upgraded stream along with its channel binding data and
    /// whether a client certificate took part in the handshake.
    fn starttls(
        &self,
        stream: Self::Stream,
        domain: &str,
    ) -> impl Future<Output = Result<(Self::Stream, TlsSession), Error>> + Send;
}
