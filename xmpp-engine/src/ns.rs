//! XML namespaces used on the client stream.

/// RFC 6120: `jabber:client`
pub const JABBER_CLIENT: &str = "jabber:client";
/// RFC 6120: stream envelope
pub const STREAM: &str = "http://etherx.jabber.org/streams";
/// RFC 6120: stream error conditions
pub const XMPP_STREAMS: &str = "urn:ietf:params:xml:ns:xmpp-streams";
/// RFC 6120: STARTTLS
pub const TLS: &str = "urn:ietf:params:xml:ns:xmpp-tls";
/// RFC 6120: SASL
pub const SASL: &str = "urn:ietf:params:xml:ns:xmpp-sasl";
/// RFC 6120: resource binding
pub const BIND: &str = "urn:ietf:params:xml:ns:xmpp-bind";
/// RFC 3921: session establishment
pub const SESSION: &str = "urn:ietf:params:xml:ns:xmpp-session";
/// RFC 6120: stanza error conditions
pub const XMPP_STANZAS: &str = "urn:ietf:params:xml:ns:xmpp-stanzas";
/// XEP-0198: Stream Management
pub const SM: &str = "urn:xmpp:sm:3";
/// RFC 6121: roster versioning stream feature
pub const ROSTER_VER: &str = "urn:xmpp:features:rosterver";
/// The implicit `xml:` prefix
pub const XML: &str = "http://www.w3.org/XML/1998/namespace";
