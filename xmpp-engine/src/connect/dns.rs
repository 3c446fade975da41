use futures::{future::select_ok, FutureExt};
use hickory_resolver::{
    config::LookupIpStrategy, name_server::TokioConnectionProvider, IntoName, TokioAsyncResolver,
};
use log::{debug, warn};
use rand::Rng;
use std::io;
use std::net::{IpAddr, SocketAddr};
use tokio::net::TcpStream;

use super::srv::{SrvCandidate, SrvCandidates};
use crate::connection::ConnectionConfig;
use crate::Error;

/// Port used when neither SRV nor the configuration name one.
pub const DEFAULT_CLIENT_PORT: u16 = 5222;

/// StartTLS XMPP server connection configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DnsConfig {
    /// Use SRV record to find server host
    UseSrv {
        /// Hostname to resolve
        host: String,
        /// TXT field eg. _xmpp-client._tcp
        srv: String,
        /// When no SRV record exists, what port to use
        fallback_port: u16,
    },

    /// Manually define server host and port
    NoSrv {
        /// Server host name
        host: String,
        /// Server port
        port: u16,
    },

    /// Manually define IP:port
    Addr {
        /// IP:port
        addr: String,
    },
}

impl std::fmt::Display for DnsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UseSrv { host, .. } => write!(f, "{}", host),
            Self::NoSrv { host, port } => write!(f, "{}:{}", host, port),
            Self::Addr { addr } => write!(f, "{}", addr),
        }
    }
}

impl DnsConfig {
    /// Constructor for DnsConfig::UseSrv variant
    pub fn srv(host: &str, srv: &str, fallback_port: u16) -> Self {
        Self::UseSrv {
            host: host.to_string(),
            srv: srv.to_string(),
            fallback_port,
        }
    }

    /// Constructor for the default SRV resolution strategy for clients
    pub fn srv_default_client(host: &str) -> Self {
        Self::srv(host, "_xmpp-client._tcp", DEFAULT_CLIENT_PORT)
    }

    /// Constructor for DnsConfig::NoSrv variant
    pub fn no_srv(host: &str, port: u16) -> Self {
        Self::NoSrv {
            host: host.to_string(),
            port,
        }
    }

    /// Constructor for DnsConfig::Addr variant
    pub fn addr(addr: &str) -> Self {
        Self::Addr {
            addr: addr.to_string(),
        }
    }

    /// The strategy for a connection: an explicit server or port skips SRV.
    pub fn from_config(config: &ConnectionConfig) -> Self {
        match (config.server(), config.port()) {
            (None, None) => Self::srv_default_client(config.domain()),
            (server, port) => Self::no_srv(
                server.unwrap_or(config.domain()),
                port.unwrap_or(DEFAULT_CLIENT_PORT),
            ),
        }
    }

    /// Try resolve the DnsConfig to a TcpStream, using `resolver` or a
    /// system configured one.
    pub async fn resolve(&self, resolver: Option<&Resolver>) -> Result<TcpStream, Error> {
        match self {
            Self::UseSrv {
                host,
                srv,
                fallback_port,
            } => {
                Resolver::or_system(resolver)?
                    .connect_srv(host, srv, *fallback_port)
                    .await
            }
            Self::NoSrv { host, port } => {
                Resolver::or_system(resolver)?
                    .connect_host(host, *port)
                    .await
            }
            Self::Addr { addr } => {
                let addr: SocketAddr = addr.parse()?;
                debug!("Attempting connection to {addr}");
                Ok(TcpStream::connect(addr).await?)
            }
        }
    }
}

/// A DNS resolver that may be shared between connections.
#[derive(Clone)]
pub struct Resolver {
    inner: TokioAsyncResolver,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Resolver")
    }
}

impl Resolver {
    /// A resolver configured from the system (`/etc/resolv.conf` or the
    /// platform equivalent), looking up both A and AAAA records.
    pub fn from_system_conf() -> Result<Self, Error> {
        let (config, mut options) = hickory_resolver::system_conf::read_system_conf()?;
        options.ip_strategy = LookupIpStrategy::Ipv4AndIpv6;
        Ok(Resolver {
            inner: TokioAsyncResolver::new(config, options, TokioConnectionProvider::default()),
        })
    }

    fn or_system(resolver: Option<&Resolver>) -> Result<Resolver, Error> {
        match resolver {
            Some(resolver) => Ok(resolver.clone()),
            None => Self::from_system_conf(),
        }
    }

    /// Wrap an existing resolver.
    pub fn new(inner: TokioAsyncResolver) -> Self {
        Resolver { inner }
    }

    /// SRV records for `srv.domain`. An empty list means there are none.
    pub async fn lookup_srv(&self, srv: &str, domain: &str) -> Result<Vec<SrvCandidate>, Error> {
        let ascii_domain = idna::domain_to_ascii(domain)?;
        let srv_domain = format!("{}.{}.", srv, ascii_domain).into_name()?;
        let lookup = match self.inner.srv_lookup(srv_domain.clone()).await {
            Ok(lookup) => lookup,
            Err(e) => {
                debug!("No SRV records for {srv_domain}: {e}");
                return Ok(Vec::new());
            }
        };
        let records: Vec<SrvCandidate> = lookup
            .iter()
            .map(|srv| SrvCandidate {
                priority: srv.priority(),
                weight: srv.weight(),
                port: srv.port(),
                target: srv.target().to_ascii().trim_end_matches('.').to_owned(),
            })
            .collect();
        if let [record] = &records[..] {
            if record.target.is_empty() {
                // RFC 2782: a lone "." target means the service is
                // decidedly not available.
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no XMPP service at {}", domain),
                )
                .into());
            }
        }
        Ok(records)
    }

    async fn connect_srv(&self, host: &str, srv: &str, fallback_port: u16) -> Result<TcpStream, Error> {
        let ascii_domain = idna::domain_to_ascii(host)?;

        if let Ok(ip) = ascii_domain.parse::<IpAddr>() {
            debug!("Attempting connection to {ip}:{fallback_port}");
            return Ok(TcpStream::connect(&SocketAddr::new(ip, fallback_port)).await?);
        }

        let records = self.lookup_srv(srv, &ascii_domain).await?;
        if records.is_empty() {
            debug!("Attempting connection to {host}:{fallback_port}");
            return self.connect_host(host, fallback_port).await;
        }

        self.connect_candidates(SrvCandidates::new(records)).await
    }

    /// Connect to the first reachable candidate, in the order `candidates`
    /// yields them.
    pub async fn connect_candidates<R: Rng>(
        &self,
        candidates: SrvCandidates<R>,
    ) -> Result<TcpStream, Error> {
        let mut last_error = None;
        for candidate in candidates {
            debug!(
                "Attempting connection to {}:{} (priority {}, weight {})",
                candidate.target, candidate.port, candidate.priority, candidate.weight
            );
            match self.connect_host(&candidate.target, candidate.port).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    warn!("Connection to {}:{} failed: {}", candidate.target, candidate.port, e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or(Error::Disconnected))
    }

    /// Connect to `host`, trying all of its addresses at once.
    pub async fn connect_host(&self, host: &str, port: u16) -> Result<TcpStream, Error> {
        let ascii_domain = idna::domain_to_ascii(host)?;

        if let Ok(ip) = ascii_domain.parse::<IpAddr>() {
            return Ok(TcpStream::connect(&SocketAddr::new(ip, port)).await?);
        }

        let ips: Vec<IpAddr> = self.inner.lookup_ip(ascii_domain).await?.into_iter().collect();
        if ips.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses for {}", host),
            )
            .into());
        }

        // Happy Eyeballs: connect to all records in parallel, return the
        // first to succeed
        select_ok(
            ips.into_iter()
                .map(|ip| TcpStream::connect(SocketAddr::new(ip, port)).boxed()),
        )
        .await
        .map(|(result, _)| result)
        .map_err(Error::from)
    }
}
