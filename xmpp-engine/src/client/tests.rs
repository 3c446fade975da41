use std::sync::{Arc, Mutex};

use minidom::Element;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use super::*;
use crate::connect::TlsSession;
use crate::connection::{ConnectionDelegate, TlsPolicy};
use crate::ns;
use crate::stanza::{IqType, Message};

const SERVER_HEADER: &str = "<?xml version='1.0'?><stream:stream xmlns='jabber:client' xmlns:stream='http://etherx.jabber.org/streams' from='example.com' id='s1' version='1.0'>";

/// Hands out one in-memory transport.
struct DuplexConnector {
    stream: Mutex<Option<DuplexStream>>,
}

impl DuplexConnector {
    fn new(stream: DuplexStream) -> Self {
        DuplexConnector {
            stream: Mutex::new(Some(stream)),
        }
    }
}

impl ServerConnector for DuplexConnector {
    type Stream = DuplexStream;

    async fn connect(&self, _domain: &str) -> Result<DuplexStream, Error> {
        let stream = self.stream.lock().unwrap().take();
        stream.ok_or(Error::Disconnected)
    }

    async fn starttls(
        &self,
        _stream: DuplexStream,
        _domain: &str,
    ) -> Result<(DuplexStream, TlsSession), Error> {
        Err(Error::InvalidState)
    }
}

/// The server end of the transport, reading in whole protocol steps.
struct FakeServer {
    stream: DuplexStream,
    buf: Vec<u8>,
}

impl FakeServer {
    async fn read_until(&mut self, needle: &str) -> String {
        loop {
            if let Some(pos) = self
                .buf
                .windows(needle.len())
                .position(|window| window == needle.as_bytes())
            {
                let rest = self.buf.split_off(pos + needle.len());
                let head = std::mem::replace(&mut self.buf, rest);
                return String::from_utf8(head).unwrap();
            }
            let mut chunk = [0u8; 1024];
            let n = self.stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client hung up while server waited for {:?}", needle);
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    async fn read_element(&mut self, end: &str) -> Element {
        self.read_until(end).await.parse().unwrap()
    }

    async fn write(&mut self, data: &str) {
        self.stream.write_all(data.as_bytes()).await.unwrap();
    }

    async fn read_header(&mut self) {
        let header = self.read_until("'>").await;
        assert!(header.contains("to='example.com'"), "{}", header);
    }

    /// PLAIN, then bind without session.
    async fn negotiate(&mut self) {
        self.read_header().await;
        self.write(SERVER_HEADER).await;
        self.write("<stream:features><mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'><mechanism>PLAIN</mechanism></mechanisms></stream:features>").await;

        let auth = self.read_element("</auth>").await;
        assert_eq!(auth.attr("mechanism"), Some("PLAIN"));
        self.write("<success xmlns='urn:ietf:params:xml:ns:xmpp-sasl'/>")
            .await;

        self.read_header().await;
        self.write(SERVER_HEADER).await;
        self.write("<stream:features><bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'/></stream:features>").await;

        let bind = self.read_element("</iq>").await;
        assert!(bind.has_child("bind", ns::BIND));
        self.write(&format!(
            "<iq type='result' id='{}'><bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'><jid>juliet@example.com/balcony</jid></bind></iq>",
            bind.attr("id").unwrap()
        ))
        .await;
    }
}

fn client() -> (Client<DuplexConnector>, FakeServer) {
    let (client_end, server_end) = tokio::io::duplex(65536);
    let config = ConnectionConfig::new("juliet@example.com/balcony")
        .unwrap()
        .with_password("secret")
        .with_tls_policy(TlsPolicy::Disabled);
    let client = Client::new_with_connector(config, DuplexConnector::new(client_end));
    let server = FakeServer {
        stream: server_end,
        buf: Vec::new(),
    };
    (client, server)
}

#[derive(Default)]
struct Events(Mutex<Vec<String>>);

impl ConnectionDelegate for Events {
    fn connection_did_establish(&self, _: &mut Connection) {
        self.0.lock().unwrap().push("established".to_owned());
    }

    fn connection_was_closed(&self, _: &mut Connection, reason: &CloseReason) {
        self.0.lock().unwrap().push(format!("closed {:?}", reason));
    }
}

#[tokio::test]
async fn request_and_close() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (mut client, mut server) = client();
    let events = Arc::new(Events::default());
    client.connection_mut().add_delegate(events.clone());
    let (handle, task) = client.spawn();

    server.negotiate().await;

    let ping = Iq::from_get("", Element::builder("ping", "urn:xmpp:ping").build());
    let request = tokio::spawn({
        let handle = handle.clone();
        async move { handle.request(ping).await }
    });
    let sent = server.read_element("</iq>").await;
    assert!(sent.has_child("ping", "urn:xmpp:ping"));
    server
        .write(&format!("<iq type='result' id='{}'/>", sent.attr("id").unwrap()))
        .await;
    let response = request.await.unwrap().unwrap();
    assert_eq!(response.payload, IqType::Result(None));

    handle.close().await.unwrap();
    server.read_until("</stream:stream>").await;

    task.await.unwrap().unwrap();
    let events = events.0.lock().unwrap().clone();
    assert_eq!(
        events,
        vec!["established", "closed Requested"]
    );
}

#[tokio::test]
async fn stanzas_sent_before_establishment_are_queued() {
    let (client, mut server) = client();
    let (handle, task) = client.spawn();
    handle
        .send(Message::chat("romeo@example.net".parse().unwrap(), "early"))
        .await
        .unwrap();
    server.negotiate().await;
    let message = server.read_element("</message>").await;
    assert_eq!(message.attr("to"), Some("romeo@example.net"));

    server.write("</stream:stream>").await;
    server.read_until("</stream:stream>").await;
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn authentication_failure_ends_run() {
    let (client, mut server) = client();
    let (handle, task) = client.spawn();
    server.read_header().await;
    server.write(SERVER_HEADER).await;
    server.write("<stream:features><mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'><mechanism>PLAIN</mechanism></mechanisms></stream:features>").await;
    server.read_element("</auth>").await;
    server
        .write("<failure xmlns='urn:ietf:params:xml:ns:xmpp-sasl'><not-authorized/></failure>")
        .await;
    server.read_until("</stream:stream>").await;

    match task.await.unwrap() {
        Err(Error::Auth(crate::error::AuthError::Fail { condition, .. })) => {
            assert_eq!(condition, "not-authorized");
        }
        other => panic!("unexpected result {:?}", other),
    }
    let ping = Iq::from_get("", Element::builder("ping", "urn:xmpp:ping").build());
    assert_eq!(handle.request(ping).await, Err(IqFailure::LostWorker));
    assert!(handle.is_closed());
}

#[tokio::test]
async fn eof_during_negotiation() {
    let (client, mut server) = client();
    let (_handle, task) = client.spawn();
    server.read_header().await;
    drop(server);
    assert!(matches!(task.await.unwrap(), Err(Error::Disconnected)));
}

#[tokio::test]
async fn connect_failure() {
    let (client_end, _server_end) = tokio::io::duplex(64);
    let connector = DuplexConnector::new(client_end);
    connector.stream.lock().unwrap().take();
    let config = ConnectionConfig::new("juliet@example.com").unwrap();
    let mut client = Client::new_with_connector(config, connector);
    assert!(matches!(client.run().await, Err(Error::Disconnected)));
    assert_eq!(client.connection().state(), State::Failed);
    assert!(matches!(client.run().await, Err(Error::InvalidState)));
}
