//! `starttls::StartTlsServerConnector` provides a `ServerConnector` for
//! TCP connections upgraded with STARTTLS

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use sasl::common::ChannelBinding;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::{
    client::TlsStream,
    rustls::pki_types::{CertificateDer, InvalidDnsNameError, PrivateKeyDer, ServerName},
    rustls::{ClientConfig, Error as TlsError, ProtocolVersion, RootCertStore},
    TlsConnector,
};

use crate::{
    connect::{DnsConfig, Resolver, ServerConnector, ServerConnectorError, TlsSession},
    connection::ConnectionConfig,
    Error,
};

/// Certificates used for the TLS upgrade.
///
/// Roots come from the platform store (`rustls-native-certs` feature) and/or
/// the Mozilla set (`webpki-roots` feature), plus any added here.
#[derive(Default)]
pub struct TlsConfig {
    extra_roots: Vec<CertificateDer<'static>>,
    client_auth: Option<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)>,
}

impl fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TlsConfig")
            .field("extra_roots", &self.extra_roots.len())
            .field("client_auth", &self.client_auth.is_some())
            .finish()
    }
}

impl TlsConfig {
    /// Also trust `root`.
    pub fn with_root_certificate(mut self, root: CertificateDer<'static>) -> Self {
        self.extra_roots.push(root);
        self
    }

    /// Present `chain` during the handshake, e.g. for SASL EXTERNAL.
    pub fn with_client_certificate(
        mut self,
        chain: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
    ) -> Self {
        self.client_auth = Some((chain, key));
        self
    }

    /// Whether a client certificate is configured.
    pub fn has_client_certificate(&self) -> bool {
        self.client_auth.is_some()
    }

    fn build(self) -> Result<ClientConfig, Error> {
        let mut root_store = RootCertStore::empty();
        #[cfg(feature = "webpki-roots")]
        {
            root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }
        #[cfg(feature = "rustls-native-certs")]
        {
            root_store.add_parsable_certificates(rustls_native_certs::load_native_certs()?);
        }
        root_store.add_parsable_certificates(self.extra_roots);
        let builder = ClientConfig::builder().with_root_certificates(root_store);
        Ok(match self.client_auth {
            Some((chain, key)) => builder
                .with_client_auth_cert(chain, key)
                .map_err(StartTlsError::Tls)?,
            None => builder.with_no_client_auth(),
        })
    }
}

/// A TCP connection, before or after the TLS upgrade.
pub enum TcpTransport {
    /// Not yet upgraded
    Plain(TcpStream),
    /// Upgraded with STARTTLS
    Tls(Box<TlsStream<TcpStream>>),
}

impl fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TcpTransport::Plain(_) => f.write_str("TcpTransport::Plain"),
            TcpTransport::Tls(_) => f.write_str("TcpTransport::Tls"),
        }
    }
}

impl AsyncRead for TcpTransport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TcpTransport::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            TcpTransport::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for TcpTransport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            TcpTransport::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            TcpTransport::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TcpTransport::Plain(stream) => Pin::new(stream).poll_flush(cx),
            TcpTransport::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TcpTransport::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            TcpTransport::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Connect via TCP+StartTLS to an XMPP server
#[derive(Debug, Clone)]
pub struct StartTlsServerConnector {
    dns: DnsConfig,
    tls: Arc<ClientConfig>,
    client_certificate: bool,
    resolver: Option<Resolver>,
}

impl StartTlsServerConnector {
    /// Connect as `dns` says, upgrading with `tls`.
    pub fn new(dns: DnsConfig, tls: TlsConfig) -> Result<Self, Error> {
        let client_certificate = tls.has_client_certificate();
        Ok(StartTlsServerConnector {
            dns,
            tls: Arc::new(tls.build()?),
            client_certificate,
            resolver: None,
        })
    }

    /// The connector for `config`, trusting the default roots.
    pub fn from_config(config: &ConnectionConfig) -> Result<Self, Error> {
        Self::new(DnsConfig::from_config(config), TlsConfig::default())
    }

    /// Share `resolver` instead of creating one per connection.
    pub fn with_resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = Some(resolver);
        self
    }
}

impl ServerConnector for StartTlsServerConnector {
    type Stream = TcpTransport;

    async fn connect(&self, domain: &str) -> Result<Self::Stream, Error> {
        log::debug!("Connecting to {} via {}", domain, self.dns);
        let stream = self.dns.resolve(self.resolver.as_ref()).await?;
        stream.set_nodelay(true)?;
        Ok(TcpTransport::Plain(stream))
    }

    async fn starttls(
        &self,
        stream: Self::Stream,
        domain: &str,
    ) -> Result<(Self::Stream, TlsSession), Error> {
        let stream = match stream {
            TcpTransport::Plain(stream) => stream,
            TcpTransport::Tls(_) => return Err(Error::InvalidState),
        };
        let server_name =
            ServerName::try_from(domain.to_owned()).map_err(StartTlsError::DnsNameError)?;
        let tls_stream = TlsConnector::from(self.tls.clone())
            .connect(server_name, stream)
            .await?;
        let session = TlsSession {
            channel_binding: channel_binding(&tls_stream)?,
            client_certificate: self.client_certificate,
        };
        Ok((TcpTransport::Tls(Box::new(tls_stream)), session))
    }
}

fn channel_binding(stream: &TlsStream<TcpStream>) -> Result<ChannelBinding, Error> {
    let (_, connection) = stream.get_ref();
    Ok(match connection.protocol_version() {
        // TODO: Add support for TLS 1.2 and earlier.
        Some(ProtocolVersion::TLSv1_3) => {
            let data = vec![0u8; 32];
            let data = connection
                .export_keying_material(data, b"EXPORTER-Channel-Binding", None)
                .map_err(StartTlsError::Tls)?;
            ChannelBinding::TlsExporter(data)
        }
        _ => ChannelBinding::None,
    })
}

/// StartTLS ServerConnector Error
#[derive(Debug)]
pub enum StartTlsError {
    /// TLS error
    Tls(TlsError),
    /// DNS name parsing error
    DnsNameError(InvalidDnsNameError),
}

impl ServerConnectorError for StartTlsError {}

impl fmt::Display for StartTlsError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Tls(e) => write!(fmt, "TLS error: {}", e),
            Self::DnsNameError(e) => write!(fmt, "DNS name error: {}", e),
        }
    }
}

impl StdError for StartTlsError {}

impl From<TlsError> for StartTlsError {
    fn from(e: TlsError) -> Self {
        Self::Tls(e)
    }
}

impl From<InvalidDnsNameError> for StartTlsError {
    fn from(e: InvalidDnsNameError) -> Self {
        Self::DnsNameError(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_server_name() {
        assert!(matches!(
            ServerName::try_from("not a hostname!".to_owned()).map_err(StartTlsError::from),
            Err(StartTlsError::DnsNameError(_))
        ));
    }

    #[tokio::test]
    async fn plain_tcp_before_upgrade() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connector =
            StartTlsServerConnector::new(DnsConfig::addr(&addr.to_string()), TlsConfig::default())
                .unwrap();
        let transport = connector.connect("example.com").await.unwrap();
        assert!(matches!(transport, TcpTransport::Plain(_)));
    }
}
