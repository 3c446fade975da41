use std::str::FromStr;

use jid::Jid;

use super::mechanisms::MechanismKind;
use crate::Error;

/// Whether and when to upgrade the stream with STARTTLS.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TlsPolicy {
    /// Fail unless the server offers STARTTLS.
    Required,
    /// Use STARTTLS when offered, continue in plain text otherwise.
    IfOffered,
    /// Never upgrade. Servers which require TLS will be refused.
    Disabled,
}

/// Everything a [`Connection`](super::Connection) needs to know up front.
///
/// ```rust
/// use xmpp_engine::connection::{ConnectionConfig, TlsPolicy};
///
/// let config = ConnectionConfig::new("juliet@example.com")
///     .unwrap()
///     .with_password("r0m30")
///     .with_resource("balcony")
///     .with_tls_policy(TlsPolicy::Required);
/// assert_eq!(config.domain(), "example.com");
/// ```
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    pub(crate) jid: Jid,
    pub(crate) password: Option<String>,
    pub(crate) authzid: Option<String>,
    pub(crate) resource: Option<String>,
    pub(crate) server: Option<String>,
    pub(crate) port: Option<u16>,
    pub(crate) tls_policy: TlsPolicy,
    pub(crate) mechanisms: Vec<MechanismKind>,
    pub(crate) external: bool,
    pub(crate) lang: Option<String>,
}

impl ConnectionConfig {
    /// Configuration for the account `jid`. A resource in `jid` is used as
    /// the requested resource.
    pub fn new(jid: &str) -> Result<ConnectionConfig, Error> {
        let jid = Jid::from_str(jid)?;
        let resource = jid.resource().map(|r| r.as_str().to_owned());
        Ok(ConnectionConfig {
            jid: Jid::from(jid.to_bare()),
            password: None,
            authzid: None,
            resource,
            server: None,
            port: None,
            tls_policy: TlsPolicy::Required,
            mechanisms: MechanismKind::DEFAULT_PREFERENCE.to_vec(),
            external: false,
            lang: None,
        })
    }

    /// Password for the password based mechanisms.
    pub fn with_password<P: Into<String>>(mut self, password: P) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Authorization identity to request.
    pub fn with_authzid<A: Into<String>>(mut self, authzid: A) -> Self {
        self.authzid = Some(authzid.into());
        self
    }

    /// Resource to request during binding. The server assigns one otherwise.
    pub fn with_resource<R: Into<String>>(mut self, resource: R) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Connect to this host instead of resolving the domain's SRV records.
    pub fn with_server<S: Into<String>>(mut self, server: S) -> Self {
        self.server = Some(server.into());
        self
    }

    /// Connect to this port instead of resolving the domain's SRV records.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// STARTTLS policy, [`TlsPolicy::Required`] by default.
    pub fn with_tls_policy(mut self, policy: TlsPolicy) -> Self {
        self.tls_policy = policy;
        self
    }

    /// Replace the SASL mechanism preference list, most preferred first.
    pub fn with_mechanisms(mut self, mechanisms: Vec<MechanismKind>) -> Self {
        self.mechanisms = mechanisms;
        self
    }

    /// Allow SASL EXTERNAL.
    ///
    /// EXTERNAL is still only chosen on a TLS stream whose handshake
    /// presented a client certificate, see
    /// [`TlsSession::client_certificate`](crate::connect::TlsSession::client_certificate).
    pub fn with_external_auth(mut self, enabled: bool) -> Self {
        self.external = enabled;
        self
    }

    /// Default language of our stream.
    pub fn with_language<L: Into<String>>(mut self, lang: L) -> Self {
        self.lang = Some(lang.into());
        self
    }

    /// The bare account JID.
    pub fn jid(&self) -> &Jid {
        &self.jid
    }

    /// The account's domain.
    pub fn domain(&self) -> &str {
        self.jid.domain().as_str()
    }

    /// The authentication identity, i.e. the local part of the JID.
    pub fn username(&self) -> Option<&str> {
        self.jid.node().map(|node| node.as_str())
    }

    /// The explicit server override.
    pub fn server(&self) -> Option<&str> {
        self.server.as_deref()
    }

    /// The explicit port override.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// The configured STARTTLS policy.
    pub fn tls_policy(&self) -> TlsPolicy {
        self.tls_policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_from_jid() {
        let config = ConnectionConfig::new("juliet@example.com/balcony").unwrap();
        assert_eq!(config.jid().to_string(), "juliet@example.com");
        assert_eq!(config.resource.as_deref(), Some("balcony"));
        assert_eq!(config.username(), Some("juliet"));
    }

    #[test]
    fn invalid_jid() {
        assert!(matches!(
            ConnectionConfig::new("@example.com"),
            Err(Error::JidParse(_))
        ));
    }
}
