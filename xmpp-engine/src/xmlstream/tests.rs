// Copyright (c) 2024 The xmpp-engine contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use super::*;

const SERVER_HEADER: &[u8] = b"<?xml version='1.0'?><stream:stream xmlns='jabber:client' xmlns:stream='http://etherx.jabber.org/streams' from='example.com' id='s1' version='1.0' xml:lang='en'>";

fn drain(parser: &mut StreamParser) -> Vec<Packet> {
    let mut packets = Vec::new();
    while let Some(packet) = parser.next_packet().unwrap() {
        packets.push(packet);
    }
    packets
}

#[test]
fn header_then_elements() {
    let mut parser = StreamParser::new();
    parser.feed(SERVER_HEADER);
    parser.feed(b"<stream:features><bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'/></stream:features>");
    let packets = drain(&mut parser);
    assert_eq!(packets.len(), 2);
    match &packets[0] {
        Packet::StreamStart(header) => {
            assert_eq!(header.from.as_deref(), Some("example.com"));
            assert_eq!(header.id.as_deref(), Some("s1"));
            assert_eq!(header.lang.as_deref(), Some("en"));
        }
        other => panic!("unexpected packet {:?}", other),
    }
    match &packets[1] {
        Packet::Element(features) => {
            assert!(features.is("features", ns::STREAM));
            assert!(features.has_child("bind", ns::BIND));
        }
        other => panic!("unexpected packet {:?}", other),
    }
}

#[test]
fn byte_by_byte() {
    let mut parser = StreamParser::new();
    let mut input = SERVER_HEADER.to_vec();
    input.extend_from_slice(b"<message to='a@b' type='chat'><body>h\xc3\xa9</body></message> \n</stream:stream>");
    let mut packets = Vec::new();
    for byte in input {
        parser.feed(&[byte]);
        packets.extend(drain(&mut parser));
    }
    assert_eq!(packets.len(), 3);
    match &packets[1] {
        Packet::Element(message) => {
            assert!(message.is("message", ns::JABBER_CLIENT));
            assert_eq!(message.attr("type"), Some("chat"));
            let body = message.get_child("body", ns::JABBER_CLIENT).unwrap();
            assert_eq!(body.text(), "hé");
        }
        other => panic!("unexpected packet {:?}", other),
    }
    assert_eq!(packets[2], Packet::StreamEnd);
    parser.feed(b"<message/>");
    assert_eq!(parser.next_packet().unwrap(), None);
}

#[test]
fn reset_discards_buffered_input() {
    let mut parser = StreamParser::new();
    parser.feed(SERVER_HEADER);
    parser.feed(b"<proceed xmlns='urn:ietf:params:xml:ns:xmpp-tls'/><half-rea");
    assert!(matches!(
        parser.next_packet().unwrap(),
        Some(Packet::StreamStart(_))
    ));
    assert!(matches!(parser.next_packet().unwrap(), Some(Packet::Element(_))));
    parser.reset();
    parser.feed(SERVER_HEADER);
    assert!(matches!(
        parser.next_packet().unwrap(),
        Some(Packet::StreamStart(_))
    ));
}

#[test]
fn malformed_xml() {
    let mut parser = StreamParser::new();
    parser.feed(SERVER_HEADER);
    parser.feed(b"<message><body></message>");
    let _ = parser.next_packet().unwrap();
    assert!(matches!(
        parser.next_packet(),
        Err(ProtocolError::NotWellFormed(_))
    ));
}

#[test]
fn wrong_root() {
    let mut parser = StreamParser::new();
    parser.feed(b"<html xmlns='http://www.w3.org/1999/xhtml'>");
    assert!(matches!(
        parser.next_packet(),
        Err(ProtocolError::NoStreamNamespace)
    ));
}

#[test]
fn missing_version() {
    let mut parser = StreamParser::new();
    parser.feed(b"<stream:stream xmlns='jabber:client' xmlns:stream='http://etherx.jabber.org/streams'>");
    assert!(matches!(
        parser.next_packet(),
        Err(ProtocolError::UnsupportedStreamVersion(None))
    ));
}

#[test]
fn text_at_stream_level() {
    let mut parser = StreamParser::new();
    parser.feed(SERVER_HEADER);
    parser.feed(b"hello<a/>");
    let _ = parser.next_packet().unwrap();
    assert!(matches!(
        parser.next_packet(),
        Err(ProtocolError::InvalidToken)
    ));
}

#[test]
fn header_encoding_escapes() {
    let header = StreamHeader {
        to: Some("ex'ample.com".to_owned()),
        lang: Some("en".to_owned()),
        ..StreamHeader::default()
    };
    let encoded = String::from_utf8(encode_header(&header)).unwrap();
    assert!(encoded.starts_with("<?xml version='1.0'?><stream:stream "));
    assert!(encoded.contains("to='ex&apos;ample.com'"));
    assert!(encoded.contains("xml:lang='en'"));
    assert!(encoded.ends_with('>'));
}

#[test]
fn element_encoding_parses_back() {
    let element = Element::builder("iq", ns::JABBER_CLIENT)
        .attr("type", "get")
        .attr("id", "x1")
        .build();
    let encoded = encode_element(&element).unwrap();
    let mut parser = StreamParser::new();
    parser.feed(SERVER_HEADER);
    parser.feed(&encoded);
    let packets = drain(&mut parser);
    assert_eq!(packets[1], Packet::Element(element));
}
