use minidom::Element;

use crate::ns;

/// What a `<stream:features/>` element offers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamFeatures {
    /// `Some(required)` when STARTTLS is offered
    pub starttls: Option<bool>,
    /// Advertised SASL mechanisms, in server order
    pub mechanisms: Vec<String>,
    /// Resource binding is offered
    pub bind: bool,
    /// `Some(required)` when legacy session establishment is offered
    pub session: Option<bool>,
    /// XEP-0198 is offered
    pub stream_management: bool,
    /// Roster versioning is offered
    pub roster_versioning: bool,
}

impl StreamFeatures {
    /// Interpret a `<stream:features/>` element. Unknown features are
    /// ignored.
    pub fn parse(element: &Element) -> StreamFeatures {
        let mut features = StreamFeatures::default();
        for child in element.children() {
            if child.is("starttls", ns::TLS) {
                features.starttls = Some(child.has_child("required", ns::TLS));
            } else if child.is("mechanisms", ns::SASL) {
                features.mechanisms = child
                    .children()
                    .filter(|m| m.is("mechanism", ns::SASL))
                    .map(|m| m.text().trim().to_owned())
                    .collect();
            } else if child.is("bind", ns::BIND) {
                features.bind = true;
            } else if child.is("session", ns::SESSION) {
                features.session = Some(!child.has_child("optional", ns::SESSION));
            } else if child.is("sm", ns::SM) {
                features.stream_management = true;
            } else if child.is("ver", ns::ROSTER_VER) {
                features.roster_versioning = true;
            }
        }
        features
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_tls() {
        let element: Element = "<stream:features xmlns:stream='http://etherx.jabber.org/streams'><starttls xmlns='urn:ietf:params:xml:ns:xmpp-tls'><required/></starttls><mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'><mechanism>SCRAM-SHA-1</mechanism><mechanism>PLAIN</mechanism></mechanisms></stream:features>"
            .parse()
            .unwrap();
        let features = StreamFeatures::parse(&element);
        assert_eq!(features.starttls, Some(true));
        assert_eq!(features.mechanisms, vec!["SCRAM-SHA-1", "PLAIN"]);
        assert!(!features.bind);
    }

    #[test]
    fn post_auth() {
        let element: Element = "<stream:features xmlns:stream='http://etherx.jabber.org/streams'><bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'/><session xmlns='urn:ietf:params:xml:ns:xmpp-session'><optional/></session><sm xmlns='urn:xmpp:sm:3'/><ver xmlns='urn:xmpp:features:rosterver'/></stream:features>"
            .parse()
            .unwrap();
        let features = StreamFeatures::parse(&element);
        assert!(features.bind);
        assert_eq!(features.session, Some(false));
        assert!(features.stream_management);
        assert!(features.roster_versioning);
        assert_eq!(features.starttls, None);
    }
}
