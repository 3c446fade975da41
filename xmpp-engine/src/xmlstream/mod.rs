// Copyright (c) 2024 The xmpp-engine contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! # RFC 6120 XML Streams
//!
//! **Note:** The XML stream is a low-level API which you should probably not
//! use directly; [`Connection`](crate::connection::Connection) owns one.
//!
//! Incoming bytes are pushed into a [`StreamParser`] in arbitrary chunks.
//! The parser yields [`Packet`]s: the peer's stream header, every complete
//! top-level element (with its whole subtree), and the stream footer.
//!
//! Outgoing data is serialised with [`encode_header`], [`encode_element`]
//! and [`encode_footer`].
//!
//! Whenever the stream restarts (after STARTTLS and after SASL), the parser
//! must be [`reset`](StreamParser::reset): unconsumed input belongs to the
//! old stream and is dropped along with the partial element tree.

use std::fmt::Write;

use minidom::Element;

use crate::error::ProtocolError;
use crate::ns;

mod builder;
mod parser;
#[cfg(test)]
mod tests;

pub use self::builder::ElementBuilder;
pub use self::parser::StreamParser;

/// Attributes of a `<stream:stream>` header.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamHeader {
    /// The `from` attribute
    pub from: Option<String>,
    /// The `to` attribute
    pub to: Option<String>,
    /// The stream id, chosen by the receiving entity
    pub id: Option<String>,
    /// The default language of the stream
    pub lang: Option<String>,
}

/// A unit of data received on an XML stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// The peer's stream header
    StreamStart(StreamHeader),
    /// A complete top-level element
    Element(Element),
    /// The peer closed its stream
    StreamEnd,
}

fn escape_attr(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '\'' => out.push_str("&apos;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
}

/// Serialise an initiating stream header, including the XML declaration.
pub fn encode_header(header: &StreamHeader) -> Vec<u8> {
    let mut out = String::from("<?xml version='1.0'?>");
    let _ = write!(
        out,
        "<stream:stream xmlns='{}' xmlns:stream='{}' version='1.0'",
        ns::JABBER_CLIENT,
        ns::STREAM
    );
    let attrs = [
        ("to", &header.to),
        ("from", &header.from),
        ("id", &header.id),
        ("xml:lang", &header.lang),
    ];
    for (name, value) in attrs {
        if let Some(value) = value {
            out.push(' ');
            out.push_str(name);
            out.push_str("='");
            escape_attr(&mut out, value);
            out.push('\'');
        }
    }
    out.push('>');
    out.into_bytes()
}

/// Serialise a single top-level element.
pub fn encode_element(element: &Element) -> Result<Vec<u8>, ProtocolError> {
    let mut out = Vec::new();
    element.write_to(&mut out)?;
    Ok(out)
}

/// The closing tag of the stream.
pub fn encode_footer() -> &'static [u8] {
    b"</stream:stream>"
}
