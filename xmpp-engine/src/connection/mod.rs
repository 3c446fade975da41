// Copyright (c) 2025 The xmpp-engine contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! # Client connection state machine
//!
//! [`Connection`] performs no I/O. A driver (see [`Client`](crate::Client))
//! feeds it transport events and received bytes, and drains [`Output`]s to
//! execute:
//!
//! ```text
//! Idle -> TcpConnecting -> StreamOpening -> (TlsUpgrading -> StreamOpening)
//!      -> SaslAuthenticating -> StreamReopening -> ResourceBinding
//!      -> (SessionEstablishing) -> Established -> Closing -> Closed
//! ```
//!
//! Any fatal protocol violation moves the connection to [`State::Failed`].
//! Either way, pending IQ callbacks are flushed with
//! [`IqFailure::ConnectionClosed`] and every delegate sees exactly one
//! [`ConnectionDelegate::connection_was_closed`].

use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as Base64, Engine};
use jid::Jid;
use minidom::Element;
use sasl::client::Mechanism;
use sasl::common::{ChannelBinding, Credentials};

use crate::connect::TlsSession;
use crate::error::{AuthError, Error, ProtocolError, StreamError};
use crate::ns;
use crate::stanza::{Iq, IqType, Stanza};
use crate::storage::{Storage, BOUND_JID_KEY};
use crate::xmlstream::{Packet, StreamHeader, StreamParser};

mod config;
mod delegate;
mod features;
mod iq;
mod mechanisms;

pub use self::config::{ConnectionConfig, TlsPolicy};
pub use self::delegate::{CloseReason, ConnectionDelegate};
pub use self::features::StreamFeatures;
pub use self::iq::{IqCallback, IqFailure};
pub use self::mechanisms::MechanismKind;

use self::iq::PendingIqs;
use self::mechanisms::Selection;

/// Negotiation progress of a [`Connection`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// Not connected.
    Idle,
    /// The driver is opening the transport.
    TcpConnecting,
    /// Our stream header is out; waiting for the server's header and
    /// features.
    StreamOpening,
    /// `<starttls/>` is out; waiting for `<proceed/>` and the handshake.
    TlsUpgrading,
    /// SASL exchange in progress.
    SaslAuthenticating,
    /// Stream restarted after authentication.
    StreamReopening,
    /// Bind request is out.
    ResourceBinding,
    /// Session request is out.
    SessionEstablishing,
    /// Stanzas flow.
    Established,
    /// Our footer is out; the transport is being shut down.
    Closing,
    /// Closed without error.
    Closed,
    /// Closed by a fatal error.
    Failed,
}

/// Work for the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// Write a fresh stream header.
    StreamHeader(StreamHeader),
    /// Write a top-level element.
    Element(Element),
    /// Write the stream footer.
    StreamFooter,
    /// Flush, then upgrade the transport to TLS in place and report back
    /// through [`Connection::tls_established`].
    StartTls,
    /// Flush and shut down the transport, then call
    /// [`Connection::transport_closed`].
    Close,
}

#[derive(Clone, Copy, Debug, Default)]
struct FeatureFlags {
    stream_management: bool,
    roster_versioning: bool,
}

/// The stream error condition we send for a locally detected violation.
fn stream_error_condition(error: &Error) -> Option<&'static str> {
    match error {
        Error::Protocol(ProtocolError::NotWellFormed(_))
        | Error::Protocol(ProtocolError::InvalidToken) => Some("not-well-formed"),
        Error::Protocol(ProtocolError::NoStreamNamespace) => Some("invalid-namespace"),
        Error::Protocol(ProtocolError::UnsupportedStreamVersion(_)) => Some("unsupported-version"),
        Error::Protocol(ProtocolError::InvalidStreamStart)
        | Error::Protocol(ProtocolError::InvalidStanza(_)) => Some("bad-format"),
        Error::Protocol(ProtocolError::UnexpectedElement { .. }) => Some("unsupported-stanza-type"),
        Error::Protocol(ProtocolError::InvalidBindResponse)
        | Error::Protocol(ProtocolError::NoBind)
        | Error::Protocol(ProtocolError::SessionFailed) => Some("policy-violation"),
        _ => None,
    }
}

/// Whether `jid` is our account, our bound resource or our server, which
/// all may answer requests sent without a `to`.
fn is_own_address(account: &Jid, bound: Option<&Jid>, jid: &Jid) -> bool {
    bound == Some(jid)
        || Jid::from(jid.to_bare()) == *account
        || (jid.node().is_none() && jid.resource().is_none() && jid.domain() == account.domain())
}

fn unexpected(element: &Element) -> Error {
    ProtocolError::UnexpectedElement {
        ns: element.ns(),
        name: element.name().to_owned(),
    }
    .into()
}

fn decode_sasl_payload(element: &Element) -> Result<Vec<u8>, AuthError> {
    let text = element.text();
    let text = text.trim();
    if text.is_empty() || text == "=" {
        return Ok(Vec::new());
    }
    Base64.decode(text).map_err(|_| AuthError::InvalidPayload)
}

/// Condition and text of a `<failure/>` or `<stream:error/>`.
fn defined_condition(element: &Element, condition_ns: &str) -> (String, Option<String>) {
    let condition = element
        .children()
        .find(|child| child.ns() == condition_ns && child.name() != "text")
        .map(|child| child.name().to_owned())
        .unwrap_or_else(|| "undefined-condition".to_owned());
    let text = element
        .get_child("text", condition_ns)
        .map(Element::text);
    (condition, text)
}

/// An XMPP client connection, without I/O.
pub struct Connection {
    config: ConnectionConfig,
    state: State,
    parser: StreamParser,
    outputs: VecDeque<Output>,
    encrypted: bool,
    channel_binding: ChannelBinding,
    client_certificate: bool,
    features: FeatureFlags,
    stream_id: Option<String>,
    header_received: bool,
    awaiting_handshake: bool,
    mechanism: Option<Box<dyn Mechanism + Send>>,
    bound_jid: Option<Jid>,
    negotiation_iq: Option<String>,
    session_required: bool,
    id_prefix: String,
    id_counter: u64,
    pending: PendingIqs,
    queued: Vec<Element>,
    delegates: Vec<Arc<dyn ConnectionDelegate>>,
    storage: Option<Box<dyn Storage>>,
    transport_open: bool,
    footer_sent: bool,
    torn_down: bool,
    close_reason: Option<CloseReason>,
}

impl Connection {
    /// A new, idle connection.
    pub fn new(config: ConnectionConfig) -> Connection {
        Connection {
            config,
            state: State::Idle,
            parser: StreamParser::new(),
            outputs: VecDeque::new(),
            encrypted: false,
            channel_binding: ChannelBinding::None,
            client_certificate: false,
            features: FeatureFlags::default(),
            stream_id: None,
            header_received: false,
            awaiting_handshake: false,
            mechanism: None,
            bound_jid: None,
            negotiation_iq: None,
            session_required: false,
            id_prefix: format!("{:08x}", rand::random::<u32>()),
            id_counter: 0,
            pending: PendingIqs::default(),
            queued: Vec::new(),
            delegates: Vec::new(),
            storage: None,
            transport_open: false,
            footer_sent: false,
            torn_down: false,
            close_reason: None,
        }
    }

    /// The configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// The current state.
    pub fn state(&self) -> State {
        self.state
    }

    /// Whether the stream runs over TLS.
    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// The full JID assigned by resource binding.
    pub fn bound_jid(&self) -> Option<&Jid> {
        self.bound_jid.as_ref()
    }

    /// The server's id for the current stream.
    pub fn stream_id(&self) -> Option<&str> {
        self.stream_id.as_deref()
    }

    /// The server advertised XEP-0198 Stream Management.
    pub fn supports_stream_management(&self) -> bool {
        self.features.stream_management
    }

    /// The server advertised roster versioning.
    pub fn supports_roster_versioning(&self) -> bool {
        self.features.roster_versioning
    }

    /// Why the connection ended, once it did.
    pub fn close_reason(&self) -> Option<&CloseReason> {
        self.close_reason.as_ref()
    }

    /// Take the close reason, e.g. to return it from a driver.
    pub fn take_close_reason(&mut self) -> Option<CloseReason> {
        self.close_reason.take()
    }

    /// Whether the connection reached [`State::Closed`] or [`State::Failed`].
    pub fn is_terminated(&self) -> bool {
        matches!(self.state, State::Closed | State::Failed)
    }

    /// Number of IQ requests still waiting for a response.
    pub fn pending_iq_count(&self) -> usize {
        self.pending.len()
    }

    /// Register an observer. Delegates are called in registration order.
    pub fn add_delegate(&mut self, delegate: Arc<dyn ConnectionDelegate>) {
        self.delegates.push(delegate);
    }

    /// Unregister an observer. Returns whether it was registered.
    pub fn remove_delegate(&mut self, delegate: &Arc<dyn ConnectionDelegate>) -> bool {
        let target = Arc::as_ptr(delegate) as *const ();
        let before = self.delegates.len();
        self.delegates
            .retain(|d| Arc::as_ptr(d) as *const () != target);
        self.delegates.len() != before
    }

    /// Attach the application's store.
    pub fn set_storage(&mut self, storage: Box<dyn Storage>) {
        self.storage = Some(storage);
    }

    /// The attached store.
    pub fn storage(&self) -> Option<&dyn Storage> {
        self.storage.as_deref()
    }

    /// The attached store, mutably.
    pub fn storage_mut(&mut self) -> Option<&mut (dyn Storage + 'static)> {
        self.storage.as_deref_mut()
    }

    /// A fresh stanza id, never handed out before by this connection.
    pub fn generate_stanza_id(&mut self) -> String {
        self.id_counter += 1;
        format!("{}-{}", self.id_prefix, self.id_counter)
    }

    /// Next piece of work for the driver.
    pub fn poll_output(&mut self) -> Option<Output> {
        self.outputs.pop_front()
    }

    fn broadcast<F>(&mut self, mut f: F)
    where
        F: FnMut(&dyn ConnectionDelegate, &mut Connection),
    {
        let delegates = self.delegates.clone();
        for delegate in delegates.iter() {
            f(delegate.as_ref(), self);
        }
    }

    // Driver events.

    /// The driver starts opening the transport.
    pub fn begin_connect(&mut self) -> Result<(), Error> {
        if self.state != State::Idle {
            return Err(Error::InvalidState);
        }
        log::debug!("connecting to {}", self.config.domain());
        self.state = State::TcpConnecting;
        Ok(())
    }

    /// The transport is open.
    pub fn transport_connected(&mut self) {
        if self.state != State::TcpConnecting {
            log::warn!("transport connected in state {:?}, ignoring", self.state);
            return;
        }
        self.transport_open = true;
        self.open_stream(State::StreamOpening);
    }

    /// The TLS handshake requested by [`Output::StartTls`] completed.
    pub fn tls_established(&mut self, session: TlsSession) -> Result<(), Error> {
        if self.state != State::TlsUpgrading || !self.awaiting_handshake {
            return Err(Error::InvalidState);
        }
        log::debug!(
            "TLS established, channel binding available: {}, client certificate: {}",
            session.channel_binding.is_available(),
            session.client_certificate
        );
        self.awaiting_handshake = false;
        self.encrypted = true;
        self.channel_binding = session.channel_binding;
        self.client_certificate = session.client_certificate;
        self.broadcast(|d, conn| d.connection_did_upgrade_to_tls(conn));
        if self.state == State::TlsUpgrading {
            self.open_stream(State::StreamOpening);
        }
        Ok(())
    }

    /// The transport failed, either while connecting or later.
    pub fn transport_failed(&mut self, error: Error) {
        self.transport_open = false;
        match self.state {
            State::Closing => self.state = State::Closed,
            State::Closed | State::Failed => (),
            _ => self.fail(error),
        }
    }

    /// The transport reached EOF or was shut down after [`Output::Close`].
    pub fn transport_closed(&mut self) {
        self.transport_open = false;
        match self.state {
            State::Closing => self.state = State::Closed,
            State::Closed | State::Failed => (),
            _ => self.fail(Error::Disconnected),
        }
    }

    /// Bytes arrived on the transport.
    pub fn receive(&mut self, data: &[u8]) {
        if !self.transport_open || self.footer_sent || self.awaiting_handshake {
            log::trace!("dropping {} received bytes in state {:?}", data.len(), self.state);
            return;
        }
        self.parser.feed(data);
        while !self.footer_sent {
            match self.parser.next_packet() {
                Ok(Some(packet)) => self.handle_packet(packet),
                Ok(None) => break,
                Err(e) => {
                    self.fail(e.into());
                    break;
                }
            }
        }
    }

    /// Process one parsed packet.
    pub fn handle_packet(&mut self, packet: Packet) {
        let result = match packet {
            Packet::StreamStart(header) => self.handle_stream_start(header),
            Packet::StreamEnd => self.handle_stream_end(),
            Packet::Element(element) => {
                log::trace!("received {:?}", element);
                for delegate in self.delegates.iter() {
                    delegate.connection_did_receive_element(&element);
                }
                self.handle_element(element)
            }
        };
        if let Err(e) = result {
            self.fail(e);
        }
    }

    // Application API.

    /// Send a stanza. IQs without an id get one assigned.
    ///
    /// Before the connection is established, stanzas are queued and sent
    /// in order once it is.
    pub fn send<S: Into<Stanza>>(&mut self, stanza: S) -> Result<(), Error> {
        let mut stanza = stanza.into();
        if let Stanza::Iq(ref mut iq) = stanza {
            if iq.id.is_empty() {
                iq.id = self.generate_stanza_id();
            }
        }
        self.submit(stanza.into())
    }

    /// Send an IQ request and call `callback` with its response.
    ///
    /// The callback runs exactly once: with the response (which may be of
    /// type `error`), or with [`IqFailure::ConnectionClosed`] on teardown.
    /// Returns the request's id.
    pub fn send_iq<F>(&mut self, mut iq: Iq, callback: F) -> Result<String, Error>
    where
        F: FnOnce(&mut Connection, Result<Iq, IqFailure>) + Send + 'static,
    {
        if !iq.is_request() {
            return Err(ProtocolError::InvalidStanza("only get and set expect a response").into());
        }
        if matches!(self.state, State::Closing | State::Closed | State::Failed) {
            return Err(Error::Disconnected);
        }
        if iq.id.is_empty() {
            iq.id = self.generate_stanza_id();
        } else if self.pending.contains(&iq.id) {
            return Err(Error::InvalidState);
        }
        let id = iq.id.clone();
        self.pending.insert(id.clone(), iq.to.clone(), Box::new(callback));
        self.submit(iq.into())?;
        Ok(id)
    }

    /// Close the stream. Calling it again, or after a failure, does nothing.
    pub fn close(&mut self) {
        match self.state {
            State::Closing | State::Closed | State::Failed => return,
            State::Idle => {
                self.state = State::Closed;
                self.teardown(CloseReason::Requested);
                return;
            }
            _ => (),
        }
        log::debug!("closing connection in state {:?}", self.state);
        self.send_footer();
        self.state = State::Closing;
        self.outputs.push_back(Output::Close);
        self.teardown(CloseReason::Requested);
    }

    /// Bring a closed or failed connection back to [`State::Idle`] for a
    /// new session. Delegates, storage and the id counter are kept.
    pub fn reset(&mut self) -> Result<(), Error> {
        if !self.is_terminated() {
            return Err(Error::InvalidState);
        }
        self.state = State::Idle;
        self.parser.reset();
        self.outputs.clear();
        self.encrypted = false;
        self.channel_binding = ChannelBinding::None;
        self.client_certificate = false;
        self.features = FeatureFlags::default();
        self.stream_id = None;
        self.header_received = false;
        self.awaiting_handshake = false;
        self.mechanism = None;
        self.bound_jid = None;
        self.negotiation_iq = None;
        self.session_required = false;
        self.transport_open = false;
        self.footer_sent = false;
        self.torn_down = false;
        self.close_reason = None;
        Ok(())
    }

    // Output helpers.

    fn submit(&mut self, element: Element) -> Result<(), Error> {
        match self.state {
            State::Established => {
                self.send_element(element);
                Ok(())
            }
            State::Closing | State::Closed | State::Failed => Err(Error::Disconnected),
            _ => {
                self.queued.push(element);
                Ok(())
            }
        }
    }

    fn send_element(&mut self, element: Element) {
        if !self.transport_open || self.footer_sent {
            log::warn!("not sending {}: stream is closed", element.name());
            return;
        }
        log::trace!("sending {:?}", element);
        for delegate in self.delegates.iter() {
            delegate.connection_did_send_element(&element);
        }
        self.outputs.push_back(Output::Element(element));
    }

    fn send_footer(&mut self) {
        if self.transport_open && !self.footer_sent {
            self.outputs.push_back(Output::StreamFooter);
        }
        self.footer_sent = true;
    }

    fn send_stream_error(&mut self, condition: &str) {
        let error = Element::builder("error", ns::STREAM)
            .append(Element::builder(condition, ns::XMPP_STREAMS).build())
            .build();
        self.send_element(error);
    }

    fn open_stream(&mut self, next: State) {
        self.parser.reset();
        self.header_received = false;
        self.state = next;
        self.outputs.push_back(Output::StreamHeader(StreamHeader {
            to: Some(self.config.domain().to_owned()),
            from: None,
            id: None,
            lang: self.config.lang.clone(),
        }));
    }

    // Teardown.

    fn fail(&mut self, error: Error) {
        if self.torn_down {
            log::debug!("ignoring error after teardown: {}", error);
            return;
        }
        log::warn!("connection failed in state {:?}: {}", self.state, error);
        if let Some(condition) = stream_error_condition(&error) {
            self.send_stream_error(condition);
        }
        self.send_footer();
        self.state = State::Failed;
        self.outputs.push_back(Output::Close);
        self.teardown(CloseReason::Error(error));
    }

    fn teardown(&mut self, reason: CloseReason) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.mechanism = None;
        self.negotiation_iq = None;
        if !self.queued.is_empty() {
            log::debug!("dropping {} queued stanzas", self.queued.len());
            self.queued.clear();
        }
        for (id, callback) in self.pending.drain() {
            log::debug!("failing pending IQ {}", id);
            callback(self, Err(IqFailure::ConnectionClosed));
        }
        if let Some(storage) = self.storage.as_mut() {
            if let Err(e) = storage.save() {
                log::warn!("failed to save storage: {}", e);
            }
        }
        self.broadcast(|d, conn| d.connection_was_closed(conn, &reason));
        self.close_reason = Some(reason);
    }

    // Incoming data by state.

    fn handle_stream_start(&mut self, header: StreamHeader) -> Result<(), Error> {
        match self.state {
            State::StreamOpening | State::StreamReopening if !self.header_received => {
                log::debug!("stream {:?} opened by {:?}", header.id, header.from);
                self.header_received = true;
                self.stream_id = header.id;
                Ok(())
            }
            _ => Err(ProtocolError::InvalidStreamStart.into()),
        }
    }

    fn handle_stream_end(&mut self) -> Result<(), Error> {
        match self.state {
            State::Established => {
                log::debug!("server closed the stream");
                self.send_footer();
                self.state = State::Closing;
                self.outputs.push_back(Output::Close);
                self.teardown(CloseReason::PeerClosed);
                Ok(())
            }
            State::Closing | State::Closed | State::Failed => Ok(()),
            _ => Err(Error::Disconnected),
        }
    }

    fn handle_element(&mut self, element: Element) -> Result<(), Error> {
        if element.is("error", ns::STREAM) {
            let (condition, text) = defined_condition(&element, ns::XMPP_STREAMS);
            return Err(StreamError { condition, text }.into());
        }
        match self.state {
            State::StreamOpening | State::StreamReopening if !self.header_received => {
                Err(unexpected(&element))
            }
            State::StreamOpening => {
                if !element.is("features", ns::STREAM) {
                    return Err(unexpected(&element));
                }
                self.handle_initial_features(StreamFeatures::parse(&element))
            }
            State::TlsUpgrading => self.handle_starttls_response(element),
            State::SaslAuthenticating => self.handle_sasl(element),
            State::StreamReopening => {
                if !element.is("features", ns::STREAM) {
                    return Err(unexpected(&element));
                }
                self.handle_bound_features(StreamFeatures::parse(&element))
            }
            State::ResourceBinding => self.handle_bind_response(element),
            State::SessionEstablishing => self.handle_session_response(element),
            State::Established => self.handle_stanza(element),
            State::Idle
            | State::TcpConnecting
            | State::Closing
            | State::Closed
            | State::Failed => {
                log::debug!("ignoring {} in state {:?}", element.name(), self.state);
                Ok(())
            }
        }
    }

    fn record_features(&mut self, features: &StreamFeatures) {
        self.features.stream_management |= features.stream_management;
        self.features.roster_versioning |= features.roster_versioning;
    }

    fn handle_initial_features(&mut self, features: StreamFeatures) -> Result<(), Error> {
        self.record_features(&features);
        if !self.encrypted {
            match (features.starttls, self.config.tls_policy) {
                (Some(_), TlsPolicy::Required | TlsPolicy::IfOffered) => {
                    log::debug!("requesting STARTTLS");
                    self.state = State::TlsUpgrading;
                    self.send_element(Element::builder("starttls", ns::TLS).build());
                    return Ok(());
                }
                (None, TlsPolicy::Required) | (Some(true), TlsPolicy::Disabled) => {
                    return Err(ProtocolError::NoTls.into());
                }
                _ => (),
            }
        }
        self.start_sasl(&features.mechanisms)
    }

    fn handle_starttls_response(&mut self, element: Element) -> Result<(), Error> {
        if self.awaiting_handshake {
            return Err(unexpected(&element));
        }
        if element.is("proceed", ns::TLS) {
            // Whatever follows <proceed/> belongs to the TLS layer.
            self.parser.reset();
            self.awaiting_handshake = true;
            self.outputs.push_back(Output::StartTls);
            Ok(())
        } else if element.is("failure", ns::TLS) {
            Err(ProtocolError::TlsRefused.into())
        } else {
            Err(unexpected(&element))
        }
    }

    fn start_sasl(&mut self, offered: &[String]) -> Result<(), Error> {
        let selection = Selection {
            offered,
            channel_binding: self.channel_binding.is_available(),
            password: self.config.password.is_some(),
            external: self.config.external && self.encrypted && self.client_certificate,
            plaintext_allowed: self.encrypted || self.config.tls_policy == TlsPolicy::Disabled,
        };
        let kind = selection
            .select(&self.config.mechanisms)
            .ok_or(AuthError::NoMechanism)?;
        log::debug!("authenticating with {} (offered: {:?})", kind.name(), offered);

        let mut credentials =
            Credentials::default().with_channel_binding(self.channel_binding.clone());
        if let Some(username) = self.config.username() {
            credentials = credentials.with_username(username);
        }
        if let Some(ref password) = self.config.password {
            credentials = credentials.with_password(password.clone());
        }
        if let Some(ref authzid) = self.config.authzid {
            credentials = credentials.with_authzid(authzid.clone());
        }
        let mut mechanism = kind.instantiate(credentials).map_err(AuthError::Sasl)?;

        let mut auth = Element::builder("auth", ns::SASL).attr("mechanism", mechanism.name());
        match mechanism.initial() {
            Some(data) if data.is_empty() => auth = auth.append("="),
            Some(data) => auth = auth.append(Base64.encode(data)),
            None => (),
        }
        self.mechanism = Some(mechanism);
        self.state = State::SaslAuthenticating;
        self.send_element(auth.build());
        Ok(())
    }

    fn handle_sasl(&mut self, element: Element) -> Result<(), Error> {
        if element.ns() != ns::SASL {
            return Err(unexpected(&element));
        }
        let mechanism = self.mechanism.as_mut().ok_or(Error::InvalidState)?;
        match element.name() {
            "challenge" => {
                let challenge = decode_sasl_payload(&element)?;
                let response = mechanism.response(&challenge).map_err(AuthError::Sasl)?;
                let mut reply = Element::builder("response", ns::SASL);
                if !response.is_empty() {
                    reply = reply.append(Base64.encode(response));
                }
                self.send_element(reply.build());
                Ok(())
            }
            "success" => {
                let data = decode_sasl_payload(&element)?;
                mechanism.success(&data).map_err(AuthError::Sasl)?;
                log::debug!("authenticated with {}", mechanism.name());
                self.mechanism = None;
                self.broadcast(|d, conn| d.connection_did_authenticate(conn));
                if self.state == State::SaslAuthenticating {
                    self.open_stream(State::StreamReopening);
                }
                Ok(())
            }
            "failure" => {
                let (condition, text) = defined_condition(&element, ns::SASL);
                Err(AuthError::Fail { condition, text }.into())
            }
            _ => Err(unexpected(&element)),
        }
    }

    fn handle_bound_features(&mut self, features: StreamFeatures) -> Result<(), Error> {
        self.record_features(&features);
        if !features.bind {
            return Err(ProtocolError::NoBind.into());
        }
        self.session_required = features.session == Some(true);
        let mut bind = Element::builder("bind", ns::BIND);
        if let Some(ref resource) = self.config.resource {
            bind = bind.append(
                Element::builder("resource", ns::BIND)
                    .append(resource.as_str())
                    .build(),
            );
        }
        let id = self.generate_stanza_id();
        self.negotiation_iq = Some(id.clone());
        self.state = State::ResourceBinding;
        self.send_element(Iq::from_set(id, bind.build()).into());
        Ok(())
    }

    /// The response to the bind or session request.
    fn negotiation_response(&mut self, element: Element) -> Result<Iq, Error> {
        if !element.is("iq", ns::JABBER_CLIENT) {
            return Err(unexpected(&element));
        }
        let iq = Iq::try_from(element)?;
        if iq.is_request() || Some(&iq.id) != self.negotiation_iq.as_ref() {
            return Err(ProtocolError::InvalidStanza("unexpected iq during negotiation").into());
        }
        self.negotiation_iq = None;
        Ok(iq)
    }

    fn handle_bind_response(&mut self, element: Element) -> Result<(), Error> {
        let iq = self.negotiation_response(element)?;
        let payload = match iq.payload {
            IqType::Result(Some(payload)) if payload.is("bind", ns::BIND) => payload,
            _ => return Err(ProtocolError::InvalidBindResponse.into()),
        };
        let jid = payload
            .get_child("jid", ns::BIND)
            .and_then(|jid| Jid::from_str(jid.text().trim()).ok())
            .ok_or(ProtocolError::InvalidBindResponse)?;
        log::debug!("bound as {}", jid);
        if self.bound_jid.is_none() {
            self.bound_jid = Some(jid.clone());
        }
        if let Some(storage) = self.storage.as_mut() {
            storage.set_string(BOUND_JID_KEY, &jid.to_string());
        }
        self.broadcast(|d, conn| d.connection_did_bind(conn, &jid));
        if self.state != State::ResourceBinding {
            return Ok(());
        }
        if self.session_required {
            let id = self.generate_stanza_id();
            self.negotiation_iq = Some(id.clone());
            self.state = State::SessionEstablishing;
            let session = Element::builder("session", ns::SESSION).build();
            self.send_element(Iq::from_set(id, session).into());
            Ok(())
        } else {
            self.establish();
            Ok(())
        }
    }

    fn handle_session_response(&mut self, element: Element) -> Result<(), Error> {
        let iq = self.negotiation_response(element)?;
        match iq.payload {
            IqType::Result(_) => {
                self.establish();
                Ok(())
            }
            _ => Err(ProtocolError::SessionFailed.into()),
        }
    }

    fn establish(&mut self) {
        log::debug!("connection established");
        self.state = State::Established;
        for element in std::mem::take(&mut self.queued) {
            self.send_element(element);
        }
        self.broadcast(|d, conn| d.connection_did_establish(conn));
    }

    fn handle_stanza(&mut self, element: Element) -> Result<(), Error> {
        if !Stanza::is_stanza(&element) {
            return Err(unexpected(&element));
        }
        match Stanza::try_from(element)? {
            Stanza::Iq(iq) => self.handle_iq(iq),
            Stanza::Message(message) => {
                self.broadcast(|d, conn| d.connection_did_receive_message(conn, &message));
            }
            Stanza::Presence(presence) => {
                self.broadcast(|d, conn| d.connection_did_receive_presence(conn, &presence));
            }
        }
        Ok(())
    }

    fn handle_iq(&mut self, iq: Iq) {
        if !iq.is_request() {
            let account = &self.config.jid;
            let bound = self.bound_jid.as_ref();
            let callback = self
                .pending
                .take(&iq.id, iq.from.as_ref(), |jid| is_own_address(account, bound, jid));
            if let Some(callback) = callback {
                callback(self, Ok(iq));
                return;
            }
        }
        let mut handled = false;
        self.broadcast(|d, conn| handled |= d.connection_did_receive_iq(conn, &iq));
        if !handled && iq.is_request() {
            log::debug!("no handler for IQ {} from {:?}", iq.id, iq.from);
            let mut reply = Iq::from_error(iq.id.clone(), "cancel", "service-unavailable");
            reply.to = iq.from;
            self.send_element(reply.into());
        }
    }
}
