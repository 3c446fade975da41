//! Thin typed views of the three stanza kinds.
//!
//! Only addressing and the IQ payload are interpreted; everything else stays
//! available as the underlying [`Element`].

use std::str::FromStr;

use jid::Jid;
use minidom::Element;

use crate::error::ProtocolError;
use crate::ns;

fn parse_jid(element: &Element, attr: &str) -> Result<Option<Jid>, ProtocolError> {
    match element.attr(attr) {
        None => Ok(None),
        Some(value) => Jid::from_str(value)
            .map(Some)
            .map_err(|_| ProtocolError::InvalidStanza("invalid JID in addressing")),
    }
}

fn addressing(
    mut builder: minidom::ElementBuilder,
    from: &Option<Jid>,
    to: &Option<Jid>,
    id: Option<&str>,
) -> minidom::ElementBuilder {
    if let Some(from) = from {
        builder = builder.attr("from", from.to_string());
    }
    if let Some(to) = to {
        builder = builder.attr("to", to.to_string());
    }
    if let Some(id) = id {
        builder = builder.attr("id", id);
    }
    builder
}

/// The payload of an IQ, by type.
#[derive(Debug, Clone, PartialEq)]
pub enum IqType {
    /// `type="get"`
    Get(Element),
    /// `type="set"`
    Set(Element),
    /// `type="result"`, optionally with a payload
    Result(Option<Element>),
    /// `type="error"`, carrying the `<error/>` element
    Error(Element),
}

/// An `<iq/>` stanza.
#[derive(Debug, Clone, PartialEq)]
pub struct Iq {
    /// Sender
    pub from: Option<Jid>,
    /// Recipient
    pub to: Option<Jid>,
    /// Request/response correlation id
    pub id: String,
    /// Type and payload
    pub payload: IqType,
}

impl Iq {
    /// A `get` request. Pass an empty id to have one assigned on sending.
    pub fn from_get<S: Into<String>>(id: S, payload: Element) -> Iq {
        Iq {
            from: None,
            to: None,
            id: id.into(),
            payload: IqType::Get(payload),
        }
    }

    /// A `set` request. Pass an empty id to have one assigned on sending.
    pub fn from_set<S: Into<String>>(id: S, payload: Element) -> Iq {
        Iq {
            from: None,
            to: None,
            id: id.into(),
            payload: IqType::Set(payload),
        }
    }

    /// A `result` response.
    pub fn from_result<S: Into<String>>(id: S, payload: Option<Element>) -> Iq {
        Iq {
            from: None,
            to: None,
            id: id.into(),
            payload: IqType::Result(payload),
        }
    }

    /// An `error` response with the given stanza error condition.
    pub fn from_error<S: Into<String>>(id: S, error_type: &str, condition: &str) -> Iq {
        let error = Element::builder("error", ns::JABBER_CLIENT)
            .attr("type", error_type)
            .append(Element::builder(condition, ns::XMPP_STANZAS).build())
            .build();
        Iq {
            from: None,
            to: None,
            id: id.into(),
            payload: IqType::Error(error),
        }
    }

    /// Sets the recipient.
    pub fn with_to(mut self, to: Jid) -> Iq {
        self.to = Some(to);
        self
    }

    /// Whether this is a `get` or `set`, which must always be answered.
    pub fn is_request(&self) -> bool {
        matches!(self.payload, IqType::Get(_) | IqType::Set(_))
    }

    /// The defined condition of an `error` response.
    pub fn error_condition(&self) -> Option<String> {
        match self.payload {
            IqType::Error(ref error) => error
                .children()
                .find(|child| child.ns() == ns::XMPP_STANZAS && child.name() != "text")
                .map(|child| child.name().to_owned()),
            _ => None,
        }
    }
}

impl TryFrom<Element> for Iq {
    type Error = ProtocolError;

    fn try_from(root: Element) -> Result<Iq, ProtocolError> {
        if !root.is("iq", ns::JABBER_CLIENT) {
            return Err(ProtocolError::InvalidStanza("not an iq"));
        }
        let from = parse_jid(&root, "from")?;
        let to = parse_jid(&root, "to")?;
        let id = root
            .attr("id")
            .ok_or(ProtocolError::InvalidStanza("iq without id"))?
            .to_owned();
        let type_ = root
            .attr("type")
            .ok_or(ProtocolError::InvalidStanza("iq without type"))?
            .to_owned();
        let mut payload = None;
        let mut error = None;
        for child in root.children() {
            if child.is("error", ns::JABBER_CLIENT) {
                error = Some(child.clone());
            } else if payload.is_none() {
                payload = Some(child.clone());
            }
        }
        let payload = match type_.as_str() {
            "get" => IqType::Get(payload.ok_or(ProtocolError::InvalidStanza("iq get without payload"))?),
            "set" => IqType::Set(payload.ok_or(ProtocolError::InvalidStanza("iq set without payload"))?),
            "result" => IqType::Result(payload),
            "error" => IqType::Error(error.ok_or(ProtocolError::InvalidStanza("iq error without error"))?),
            _ => return Err(ProtocolError::InvalidStanza("unknown iq type")),
        };
        Ok(Iq {
            from,
            to,
            id,
            payload,
        })
    }
}

impl From<Iq> for Element {
    fn from(iq: Iq) -> Element {
        let (type_, payload) = match iq.payload {
            IqType::Get(payload) => ("get", Some(payload)),
            IqType::Set(payload) => ("set", Some(payload)),
            IqType::Result(payload) => ("result", payload),
            IqType::Error(error) => ("error", Some(error)),
        };
        let builder = Element::builder("iq", ns::JABBER_CLIENT).attr("type", type_);
        addressing(builder, &iq.from, &iq.to, Some(&iq.id))
            .append_all(payload)
            .build()
    }
}

/// A `<message/>` stanza.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Sender
    pub from: Option<Jid>,
    /// Recipient
    pub to: Option<Jid>,
    /// Optional id
    pub id: Option<String>,
    /// The full element, for everything beyond addressing
    pub element: Element,
}

impl Message {
    /// A chat message with a body.
    pub fn chat(to: Jid, body: &str) -> Message {
        let element = Element::builder("message", ns::JABBER_CLIENT)
            .attr("type", "chat")
            .attr("to", to.to_string())
            .append(
                Element::builder("body", ns::JABBER_CLIENT)
                    .append(body)
                    .build(),
            )
            .build();
        Message {
            from: None,
            to: Some(to),
            id: None,
            element,
        }
    }

    /// The `type` attribute, `normal` when absent.
    pub fn type_(&self) -> &str {
        self.element.attr("type").unwrap_or("normal")
    }

    /// The text of the first `<body/>`.
    pub fn body(&self) -> Option<String> {
        self.element
            .get_child("body", ns::JABBER_CLIENT)
            .map(Element::text)
    }
}

/// A `<presence/>` stanza.
#[derive(Debug, Clone, PartialEq)]
pub struct Presence {
    /// Sender
    pub from: Option<Jid>,
    /// Recipient
    pub to: Option<Jid>,
    /// Optional id
    pub id: Option<String>,
    /// The full element, for everything beyond addressing
    pub element: Element,
}

impl Presence {
    /// Initial available presence.
    pub fn available() -> Presence {
        Presence {
            from: None,
            to: None,
            id: None,
            element: Element::builder("presence", ns::JABBER_CLIENT).build(),
        }
    }

    /// The `type` attribute, `None` for available presence.
    pub fn type_(&self) -> Option<&str> {
        self.element.attr("type")
    }
}

macro_rules! element_stanza {
    ($type:ident, $name:tt) => {
        impl TryFrom<Element> for $type {
            type Error = ProtocolError;

            fn try_from(element: Element) -> Result<$type, ProtocolError> {
                if !element.is($name, ns::JABBER_CLIENT) {
                    return Err(ProtocolError::InvalidStanza(concat!("not a ", $name)));
                }
                Ok($type {
                    from: parse_jid(&element, "from")?,
                    to: parse_jid(&element, "to")?,
                    id: element.attr("id").map(str::to_owned),
                    element,
                })
            }
        }

        impl From<$type> for Element {
            fn from(stanza: $type) -> Element {
                let mut element = stanza.element;
                element.set_attr("from", stanza.from.map(|jid| jid.to_string()));
                element.set_attr("to", stanza.to.map(|jid| jid.to_string()));
                element.set_attr("id", stanza.id);
                element
            }
        }
    };
}

element_stanza!(Message, "message");
element_stanza!(Presence, "presence");

/// Any of the three stanza kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Stanza {
    /// IQ stanza
    Iq(Iq),
    /// Message stanza
    Message(Message),
    /// Presence stanza
    Presence(Presence),
}

impl Stanza {
    /// Whether `element` is a stanza at all, regardless of validity.
    pub fn is_stanza(element: &Element) -> bool {
        element.ns() == ns::JABBER_CLIENT
            && matches!(element.name(), "iq" | "message" | "presence")
    }
}

impl TryFrom<Element> for Stanza {
    type Error = ProtocolError;

    fn try_from(element: Element) -> Result<Stanza, ProtocolError> {
        match element.name() {
            "iq" => Iq::try_from(element).map(Stanza::Iq),
            "message" => Message::try_from(element).map(Stanza::Message),
            "presence" => Presence::try_from(element).map(Stanza::Presence),
            _ => Err(ProtocolError::InvalidStanza("not a stanza")),
        }
    }
}

impl From<Stanza> for Element {
    fn from(stanza: Stanza) -> Element {
        match stanza {
            Stanza::Iq(iq) => iq.into(),
            Stanza::Message(message) => message.into(),
            Stanza::Presence(presence) => presence.into(),
        }
    }
}

impl From<Iq> for Stanza {
    fn from(iq: Iq) -> Stanza {
        Stanza::Iq(iq)
    }
}

impl From<Message> for Stanza {
    fn from(message: Message) -> Stanza {
        Stanza::Message(message)
    }
}

impl From<Presence> for Stanza {
    fn from(presence: Presence) -> Stanza {
        Stanza::Presence(presence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iq_error_condition() {
        let element: Element = "<iq xmlns='jabber:client' type='error' id='a1' from='example.com'><ping xmlns='urn:xmpp:ping'/><error type='cancel'><service-unavailable xmlns='urn:ietf:params:xml:ns:xmpp-stanzas'/></error></iq>"
            .parse()
            .unwrap();
        let iq = Iq::try_from(element).unwrap();
        assert_eq!(iq.id, "a1");
        assert_eq!(iq.from, Some(Jid::from_str("example.com").unwrap()));
        assert_eq!(
            iq.error_condition().as_deref(),
            Some("service-unavailable")
        );
        assert!(!iq.is_request());
    }

    #[test]
    fn iq_requires_id() {
        let element: Element = "<iq xmlns='jabber:client' type='get'><ping xmlns='urn:xmpp:ping'/></iq>"
            .parse()
            .unwrap();
        assert!(Iq::try_from(element).is_err());
    }

    #[test]
    fn iq_get_requires_payload() {
        let element: Element = "<iq xmlns='jabber:client' type='get' id='x'/>"
            .parse()
            .unwrap();
        assert!(Iq::try_from(element).is_err());
    }

    #[test]
    fn message_body_and_addressing() {
        let element: Element = "<message xmlns='jabber:client' from='romeo@example.net/orchard' type='chat'><body>Art thou not Romeo?</body></message>"
            .parse()
            .unwrap();
        let message = Message::try_from(element).unwrap();
        assert_eq!(message.type_(), "chat");
        assert_eq!(message.body().as_deref(), Some("Art thou not Romeo?"));
        assert_eq!(
            message.from.map(|jid| jid.to_string()).as_deref(),
            Some("romeo@example.net/orchard")
        );
    }

    #[test]
    fn classify() {
        let presence: Element = "<presence xmlns='jabber:client' type='unavailable'/>"
            .parse()
            .unwrap();
        assert!(Stanza::is_stanza(&presence));
        match Stanza::try_from(presence).unwrap() {
            Stanza::Presence(p) => assert_eq!(p.type_(), Some("unavailable")),
            other => panic!("unexpected {:?}", other),
        }
        let other: Element = "<r xmlns='urn:xmpp:sm:3'/>".parse().unwrap();
        assert!(!Stanza::is_stanza(&other));
    }

    #[test]
    fn iq_serialises_type_and_id() {
        let iq = Iq::from_get("q1", Element::builder("ping", "urn:xmpp:ping").build())
            .with_to(Jid::from_str("example.com").unwrap());
        let element = Element::from(iq);
        assert_eq!(element.attr("type"), Some("get"));
        assert_eq!(element.attr("id"), Some("q1"));
        assert_eq!(element.attr("to"), Some("example.com"));
        assert!(element.has_child("ping", "urn:xmpp:ping"));
    }
}
