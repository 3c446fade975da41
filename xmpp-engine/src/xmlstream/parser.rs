// Copyright (c) 2024 The xmpp-engine contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use bytes::{Buf, BytesMut};
use rxml::error::EndOrError;
use rxml::{Event, Parse};

use super::{ElementBuilder, Packet, StreamHeader};
use crate::error::ProtocolError;
use crate::ns;

/// Incremental parser for the receiving side of an XML stream.
///
/// Input is pushed with [`feed`](StreamParser::feed) and drained packet by
/// packet with [`next_packet`](StreamParser::next_packet).
pub struct StreamParser {
    parser: rxml::Parser,
    buffer: BytesMut,
    builder: ElementBuilder,
    header_received: bool,
    finished: bool,
}

impl Default for StreamParser {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamParser {
    /// A parser waiting for a stream header.
    pub fn new() -> Self {
        Self {
            parser: rxml::Parser::default(),
            buffer: BytesMut::new(),
            builder: ElementBuilder::new(),
            header_received: false,
            finished: false,
        }
    }

    /// Discard all state, including input that was fed but not yet parsed.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Push received bytes.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Parse the next packet out of the fed input.
    ///
    /// Returns `Ok(None)` when more input is needed.
    pub fn next_packet(&mut self) -> Result<Option<Packet>, ProtocolError> {
        while !self.finished {
            let mut input = &self.buffer[..];
            let result = self.parser.parse(&mut input, false);
            let consumed = self.buffer.len() - input.len();
            self.buffer.advance(consumed);
            let event = match result {
                Ok(Some(event)) => event,
                Ok(None) | Err(EndOrError::NeedMoreData) => return Ok(None),
                Err(EndOrError::Error(e)) => return Err(ProtocolError::NotWellFormed(e)),
            };
            match event {
                Event::XmlDeclaration(_, _) => (),
                Event::StartElement(_, (ns, name), attrs) => {
                    let attrs = attrs
                        .into_iter()
                        .map(|((attr_ns, attr_name), value)| {
                            ((attr_ns.to_string(), attr_name.to_string()), value.to_string())
                        })
                        .collect::<Vec<_>>();
                    if !self.header_received {
                        let header = stream_header(&ns.to_string(), &name.to_string(), attrs)?;
                        self.header_received = true;
                        return Ok(Some(Packet::StreamStart(header)));
                    }
                    self.builder.start(ns.to_string(), name.to_string(), attrs);
                }
                Event::Text(_, data) => {
                    if self.builder.depth() > 0 {
                        self.builder.text(data.to_string());
                    } else if !data.chars().all(|c| matches!(c, ' ' | '\t' | '\r' | '\n')) {
                        return Err(ProtocolError::InvalidToken);
                    }
                }
                Event::EndElement(_) => {
                    if self.builder.depth() == 0 {
                        self.finished = true;
                        return Ok(Some(Packet::StreamEnd));
                    }
                    if let Some(element) = self.builder.end() {
                        return Ok(Some(Packet::Element(element)));
                    }
                }
            }
        }
        Ok(None)
    }
}

fn stream_header(
    ns: &str,
    name: &str,
    attrs: Vec<((String, String), String)>,
) -> Result<StreamHeader, ProtocolError> {
    if ns != ns::STREAM || name != "stream" {
        return Err(ProtocolError::NoStreamNamespace);
    }
    let mut header = StreamHeader::default();
    let mut version = None;
    for ((attr_ns, attr_name), value) in attrs {
        match (attr_ns.as_str(), attr_name.as_str()) {
            ("", "version") => version = Some(value),
            ("", "from") => header.from = Some(value),
            ("", "to") => header.to = Some(value),
            ("", "id") => header.id = Some(value),
            (ns::XML, "lang") => header.lang = Some(value),
            _ => log::debug!("ignoring stream header attribute {{{}}}{}", attr_ns, attr_name),
        }
    }
    match version {
        Some(ref v) if v == "1.0" => Ok(header),
        other => Err(ProtocolError::UnsupportedStreamVersion(other)),
    }
}
