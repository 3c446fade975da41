#[cfg(feature = "dns")]
use hickory_resolver::{
    error::ResolveError as DnsResolveError, proto::error::ProtoError as DnsProtoError,
};
use sasl::client::MechanismError as SaslMechanismError;
use std::error::Error as StdError;
use std::fmt;
use std::io::Error as IoError;
use std::net::AddrParseError;

use crate::connect::ServerConnectorError;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(IoError),
    /// Error parsing Jabber-Id
    JidParse(jid::Error),
    /// Protocol-level error
    Protocol(ProtocolError),
    /// Authentication error
    Auth(AuthError),
    /// The peer closed the stream with a `<stream:error/>`
    Stream(StreamError),
    /// Connection closed
    Disconnected,
    /// Operation not allowed in the current connection state
    InvalidState,
    /// Error specific to ServerConnector impl
    Connection(Box<dyn ServerConnectorError>),
    /// DNS protocol error
    #[cfg(feature = "dns")]
    Dns(DnsProtoError),
    /// DNS resolution error
    #[cfg(feature = "dns")]
    Resolve(DnsResolveError),
    /// DNS label conversion error, no details available from module
    /// `idna`
    #[cfg(feature = "dns")]
    Idna,
    /// Invalid IP/Port address
    Addr(AddrParseError),
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(e) => write!(fmt, "IO error: {}", e),
            Error::Connection(e) => write!(fmt, "connection error: {}", e),
            Error::JidParse(e) => write!(fmt, "jid parse error: {}", e),
            Error::Protocol(e) => write!(fmt, "protocol error: {}", e),
            Error::Auth(e) => write!(fmt, "authentication error: {}", e),
            Error::Stream(e) => write!(fmt, "stream error: {}", e),
            Error::Disconnected => write!(fmt, "disconnected"),
            Error::InvalidState => write!(fmt, "invalid state"),
            #[cfg(feature = "dns")]
            Error::Dns(e) => write!(fmt, "{:?}", e),
            #[cfg(feature = "dns")]
            Error::Resolve(e) => write!(fmt, "{:?}", e),
            #[cfg(feature = "dns")]
            Error::Idna => write!(fmt, "IDNA error"),
            Error::Addr(e) => write!(fmt, "Wrong network address: {e}"),
        }
    }
}

impl StdError for Error {}

impl From<IoError> for Error {
    fn from(e: IoError) -> Self {
        Error::Io(e)
    }
}

impl<T: ServerConnectorError + 'static> From<T> for Error {
    fn from(e: T) -> Self {
        Error::Connection(Box::new(e))
    }
}

impl From<jid::Error> for Error {
    fn from(e: jid::Error) -> Self {
        Error::JidParse(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

impl From<AuthError> for Error {
    fn from(e: AuthError) -> Self {
        Error::Auth(e)
    }
}

impl From<StreamError> for Error {
    fn from(e: StreamError) -> Self {
        Error::Stream(e)
    }
}

#[cfg(feature = "dns")]
impl From<idna::Errors> for Error {
    fn from(_e: idna::Errors) -> Self {
        Error::Idna
    }
}

#[cfg(feature = "dns")]
impl From<DnsResolveError> for Error {
    fn from(e: DnsResolveError) -> Error {
        Error::Resolve(e)
    }
}

#[cfg(feature = "dns")]
impl From<DnsProtoError> for Error {
    fn from(e: DnsProtoError) -> Error {
        Error::Dns(e)
    }
}

impl From<AddrParseError> for Error {
    fn from(e: AddrParseError) -> Error {
        Error::Addr(e)
    }
}

/// XMPP protocol-level error
#[derive(Debug)]
pub enum ProtocolError {
    /// The incoming byte stream is not well-formed XML
    NotWellFormed(rxml::Error),
    /// Serialising an outgoing element failed
    Serialize(minidom::Error),
    /// The server doesn't offer TLS but the configuration requires it
    NoTls,
    /// The server answered `<starttls/>` with `<failure/>`
    TlsRefused,
    /// The server doesn't offer resource binding after authentication
    NoBind,
    /// Invalid response to resource binding
    InvalidBindResponse,
    /// Session establishment was refused
    SessionFailed,
    /// No or wrong xmlns in <stream:stream>
    NoStreamNamespace,
    /// Missing or unsupported `version` in <stream:stream>
    UnsupportedStreamVersion(Option<String>),
    /// Encountered an unexpected XML token
    InvalidToken,
    /// Unexpected <stream:stream> (shouldn't occur)
    InvalidStreamStart,
    /// An element that has no meaning in the current negotiation state
    UnexpectedElement {
        /// Namespace of the element
        ns: String,
        /// Local name of the element
        name: String,
    },
    /// A stanza missing required attributes or carrying invalid ones
    InvalidStanza(&'static str),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProtocolError::NotWellFormed(e) => write!(fmt, "XML parser error: {}", e),
            ProtocolError::Serialize(e) => write!(fmt, "XML serialisation error: {}", e),
            ProtocolError::NoTls => write!(fmt, "no TLS available"),
            ProtocolError::TlsRefused => write!(fmt, "server refused STARTTLS"),
            ProtocolError::NoBind => write!(fmt, "server doesn't offer resource binding"),
            ProtocolError::InvalidBindResponse => {
                write!(fmt, "invalid response to resource binding")
            }
            ProtocolError::SessionFailed => write!(fmt, "session establishment failed"),
            ProtocolError::NoStreamNamespace => {
                write!(fmt, "no xmlns attribute in <stream:stream>")
            }
            ProtocolError::UnsupportedStreamVersion(Some(v)) => {
                write!(fmt, "unsupported stream version: {}", v)
            }
            ProtocolError::UnsupportedStreamVersion(None) => {
                write!(fmt, "required `version` attribute missing")
            }
            ProtocolError::InvalidToken => write!(fmt, "encountered an unexpected XML token"),
            ProtocolError::InvalidStreamStart => write!(fmt, "unexpected <stream:stream>"),
            ProtocolError::UnexpectedElement { ns, name } => {
                write!(fmt, "unexpected element {{{}}}{}", ns, name)
            }
            ProtocolError::InvalidStanza(e) => write!(fmt, "invalid stanza: {}", e),
        }
    }
}

impl StdError for ProtocolError {}

impl From<minidom::Error> for ProtocolError {
    fn from(e: minidom::Error) -> Self {
        ProtocolError::Serialize(e)
    }
}

impl From<minidom::Error> for Error {
    fn from(e: minidom::Error) -> Self {
        ProtocolError::Serialize(e).into()
    }
}

/// Authentication error
#[derive(Debug)]
pub enum AuthError {
    /// No matching SASL mechanism available
    NoMechanism,
    /// Local SASL implementation error
    Sasl(SaslMechanismError),
    /// The server sent a payload which isn't valid base64
    InvalidPayload,
    /// Failure from server
    Fail {
        /// The defined condition, e.g. `not-authorized`
        condition: String,
        /// Optional human-readable text
        text: Option<String>,
    },
}

impl StdError for AuthError {}

impl fmt::Display for AuthError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AuthError::NoMechanism => write!(fmt, "no matching SASL mechanism available"),
            AuthError::Sasl(s) => write!(fmt, "local SASL implementation error: {}", s),
            AuthError::InvalidPayload => write!(fmt, "invalid base64 in SASL payload"),
            AuthError::Fail {
                condition,
                text: Some(text),
            } => write!(fmt, "failure from the server: {} ({})", condition, text),
            AuthError::Fail {
                condition,
                text: None,
            } => write!(fmt, "failure from the server: {}", condition),
        }
    }
}

impl From<SaslMechanismError> for AuthError {
    fn from(e: SaslMechanismError) -> Self {
        AuthError::Sasl(e)
    }
}

/// A stream-level error, as carried by `<stream:error/>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamError {
    /// The defined condition, e.g. `host-unknown`
    pub condition: String,
    /// Optional human-readable text
    pub text: Option<String>,
}

impl fmt::Display for StreamError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self.text {
            Some(ref text) => write!(fmt, "{} ({})", self.condition, text),
            None => write!(fmt, "{}", self.condition),
        }
    }
}

impl StdError for StreamError {}
