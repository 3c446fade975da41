use jid::Jid;
use minidom::Element;

use super::Connection;
use crate::stanza::{Iq, Message, Presence};
use crate::Error;

/// Why a connection ended.
#[derive(Debug)]
pub enum CloseReason {
    /// [`Connection::close`] was called.
    Requested,
    /// The server closed the stream without an error.
    PeerClosed,
    /// A fatal error ended the connection.
    Error(Error),
}

/// Observer of connection events.
///
/// Every method has an empty default, so implementors only override what
/// they care about. Methods taking a `&mut Connection` may send stanzas in
/// response.
pub trait ConnectionDelegate: Send + Sync {
    /// The stream was upgraded with STARTTLS.
    fn connection_did_upgrade_to_tls(&self, _connection: &mut Connection) {}

    /// SASL succeeded.
    fn connection_did_authenticate(&self, _connection: &mut Connection) {}

    /// Resource binding assigned `jid`.
    fn connection_did_bind(&self, _connection: &mut Connection, _jid: &Jid) {}

    /// Negotiation finished; stanzas flow from now on.
    fn connection_did_establish(&self, _connection: &mut Connection) {}

    /// An IQ that is not the response to a pending request.
    ///
    /// Return `true` if this delegate answered it. A request no delegate
    /// handles is answered with `service-unavailable`.
    fn connection_did_receive_iq(&self, _connection: &mut Connection, _iq: &Iq) -> bool {
        false
    }

    /// A message stanza.
    fn connection_did_receive_message(&self, _connection: &mut Connection, _message: &Message) {}

    /// A presence stanza.
    fn connection_did_receive_presence(
        &self,
        _connection: &mut Connection,
        _presence: &Presence,
    ) {
    }

    /// Any top-level element, before it is interpreted.
    fn connection_did_receive_element(&self, _element: &Element) {}

    /// Any top-level element, as it is queued for writing.
    fn connection_did_send_element(&self, _element: &Element) {}

    /// The connection ended. Called exactly once per session.
    fn connection_was_closed(&self, _connection: &mut Connection, _reason: &CloseReason) {}
}
