//! Types shared by every mechanism.

use std::collections::HashMap;
use std::fmt;

#[cfg(feature = "scram")]
pub mod scram;

/// The identity a mechanism authenticates as.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Identity {
    /// No identity, e.g. for EXTERNAL where the TLS certificate speaks for us.
    None,

    /// The authentication identity (`authcid`), usually the local part of
    /// the account JID.
    Username(String),
}

impl From<String> for Identity {
    fn from(s: String) -> Identity {
        Identity::Username(s)
    }
}

impl<'a> From<&'a str> for Identity {
    fn from(s: &'a str) -> Identity {
        Identity::Username(s.to_owned())
    }
}

/// The secret used to prove the identity.
#[derive(Clone, PartialEq, Eq)]
pub enum Secret {
    /// No secret at all.
    None,

    /// A plain text password.
    Password(String),
}

impl fmt::Debug for Secret {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Secret::None => write!(fmt, "Secret::None"),
            Secret::Password(_) => write!(fmt, "Secret::Password(..)"),
        }
    }
}

/// Channel binding data of the underlying transport.
///
/// The variant selects the GS2 header flag sent by SCRAM:
///
/// | variant          | header              |
/// |------------------|---------------------|
/// | `None`           | `n,,`               |
/// | `Unsupported`    | `y,,`               |
/// | `TlsUnique`      | `p=tls-unique,,`    |
/// | `TlsExporter`    | `p=tls-exporter,,`  |
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelBinding {
    /// The client doesn't support channel binding, or the channel carries no
    /// binding data (e.g. plain TCP).
    None,

    /// The client supports channel binding but believes the server does not.
    Unsupported,

    /// `tls-unique` (RFC 5929) binding data, for TLS 1.2 and older.
    TlsUnique(Vec<u8>),

    /// `tls-exporter` (RFC 9266) binding data, for TLS 1.3.
    TlsExporter(Vec<u8>),
}

impl ChannelBinding {
    /// The GS2 header for this binding mode.
    pub fn header(&self) -> &[u8] {
        match self {
            ChannelBinding::None => b"n,,",
            ChannelBinding::Unsupported => b"y,,",
            ChannelBinding::TlsUnique(_) => b"p=tls-unique,,",
            ChannelBinding::TlsExporter(_) => b"p=tls-exporter,,",
        }
    }

    /// The GS2 header flag without the trailing authzid separator.
    pub(crate) fn gs2_flag(&self) -> &str {
        match self {
            ChannelBinding::None => "n",
            ChannelBinding::Unsupported => "y",
            ChannelBinding::TlsUnique(_) => "p=tls-unique",
            ChannelBinding::TlsExporter(_) => "p=tls-exporter",
        }
    }

    /// The raw binding data, empty unless the channel is actually bound.
    pub fn data(&self) -> &[u8] {
        match self {
            ChannelBinding::None | ChannelBinding::Unsupported => &[],
            ChannelBinding::TlsUnique(data) | ChannelBinding::TlsExporter(data) => data,
        }
    }

    /// Whether there is binding data that a `-PLUS` mechanism could use.
    pub fn is_available(&self) -> bool {
        matches!(
            self,
            ChannelBinding::TlsUnique(_) | ChannelBinding::TlsExporter(_)
        )
    }
}

/// Everything a mechanism may need to authenticate.
///
/// ```rust
/// use sasl::common::{ChannelBinding, Credentials};
///
/// let creds = Credentials::default()
///     .with_username("user")
///     .with_password("pencil")
///     .with_channel_binding(ChannelBinding::Unsupported);
/// assert!(!creds.channel_binding.is_available());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    /// Authentication identity.
    pub identity: Identity,
    /// Proof of the identity.
    pub secret: Secret,
    /// Optional authorization identity to act as.
    pub authzid: Option<String>,
    /// Binding to the underlying TLS channel.
    pub channel_binding: ChannelBinding,
}

impl Default for Credentials {
    fn default() -> Credentials {
        Credentials {
            identity: Identity::None,
            secret: Secret::None,
            authzid: None,
            channel_binding: ChannelBinding::None,
        }
    }
}

impl Credentials {
    /// Sets the authentication identity.
    pub fn with_username<N: Into<String>>(mut self, username: N) -> Credentials {
        self.identity = Identity::Username(username.into());
        self
    }

    /// Sets the password.
    pub fn with_password<P: Into<String>>(mut self, password: P) -> Credentials {
        self.secret = Secret::Password(password.into());
        self
    }

    /// Sets the authorization identity.
    pub fn with_authzid<A: Into<String>>(mut self, authzid: A) -> Credentials {
        self.authzid = Some(authzid.into());
        self
    }

    /// Sets the channel binding.
    pub fn with_channel_binding(mut self, channel_binding: ChannelBinding) -> Credentials {
        self.channel_binding = channel_binding;
        self
    }
}

/// Where a mechanism is in its exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExchangeState {
    /// Nothing was sent yet.
    NotStarted,
    /// The initial message was produced.
    InitialSent,
    /// The first server challenge was answered.
    ChallengeProcessed,
    /// The server's final data was verified.
    Completed,
    /// The exchange failed and the instance must be discarded.
    Failed,
}

/// Splits a `k=v,k=v` SASL frame into its attributes.
///
/// Keys are single characters; values may contain `=` (base64 padding).
pub fn parse_frame(frame: &[u8]) -> Result<HashMap<char, String>, ()> {
    let inner = std::str::from_utf8(frame).map_err(|_| ())?;
    let mut ret = HashMap::new();
    for s in inner.split(',') {
        let (key, value) = s.split_once('=').ok_or(())?;
        let mut chars = key.chars();
        let key = chars.next().ok_or(())?;
        if chars.next().is_some() {
            return Err(());
        }
        ret.insert(key, value.to_owned());
    }
    Ok(ret)
}

/// Bytewise exclusive or of two equally long slices.
pub fn xor(a: &[u8], b: &[u8]) -> Vec<u8> {
    assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(a, b)| a ^ b).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_with_padding() {
        let frame = parse_frame(b"r=abc,s=QSXCR+Q6sek8bf92==,i=4096").unwrap();
        assert_eq!(frame.get(&'r').map(String::as_str), Some("abc"));
        assert_eq!(
            frame.get(&'s').map(String::as_str),
            Some("QSXCR+Q6sek8bf92==")
        );
        assert_eq!(frame.get(&'i').map(String::as_str), Some("4096"));
    }

    #[test]
    fn frame_rejects_garbage() {
        assert!(parse_frame(b"nonsense").is_err());
        assert!(parse_frame(b"rr=1").is_err());
        assert!(parse_frame(&[0xff, b'=', b'1']).is_err());
    }

    #[test]
    fn gs2_headers() {
        assert_eq!(ChannelBinding::None.header(), b"n,,");
        assert_eq!(ChannelBinding::Unsupported.header(), b"y,,");
        assert_eq!(
            ChannelBinding::TlsExporter(vec![1, 2]).header(),
            b"p=tls-exporter,,"
        );
        assert!(ChannelBinding::TlsUnique(vec![0]).is_available());
        assert!(ChannelBinding::Unsupported.data().is_empty());
    }

    #[test]
    fn password_is_not_debug_printed() {
        let creds = Credentials::default().with_password("hunter2");
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }
}
