// Copyright (c) 2024 The xmpp-engine contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use minidom::Element;

use crate::ns;

/// Folds parser callbacks into complete element trees.
///
/// The stream root is not tracked here; depth zero of the builder is the
/// level of top-level stanzas.
#[derive(Debug, Default)]
pub struct ElementBuilder {
    stack: Vec<Element>,
}

impl ElementBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of currently open elements.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// An element started. Attribute names are `(namespace, name)` pairs
    /// with an empty namespace for unqualified attributes.
    pub fn start<I>(&mut self, ns: String, name: String, attrs: I)
    where
        I: IntoIterator<Item = ((String, String), String)>,
    {
        let mut builder = Element::builder(name, ns);
        for ((attr_ns, attr_name), value) in attrs {
            if attr_ns.is_empty() {
                builder = builder.attr(attr_name, value);
            } else if attr_ns == ns::XML {
                builder = builder.attr(format!("xml:{}", attr_name), value);
            } else {
                log::trace!("dropping namespaced attribute {{{}}}{}", attr_ns, attr_name);
            }
        }
        self.stack.push(builder.build());
    }

    /// Character data inside the innermost open element. Ignored when no
    /// element is open.
    pub fn text(&mut self, text: String) {
        if let Some(top) = self.stack.last_mut() {
            top.append_text_node(text);
        }
    }

    /// The innermost open element ended. Returns it once it was a
    /// top-level element.
    pub fn end(&mut self) -> Option<Element> {
        let element = self.stack.pop()?;
        match self.stack.last_mut() {
            Some(parent) => {
                parent.append_child(element);
                None
            }
            None => Some(element),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_attrs() -> Vec<((String, String), String)> {
        Vec::new()
    }

    #[test]
    fn nested_tree() {
        let mut builder = ElementBuilder::new();
        builder.start(
            "jabber:client".to_owned(),
            "message".to_owned(),
            vec![
                ((String::new(), "to".to_owned()), "juliet@example.com".to_owned()),
                ((ns::XML.to_owned(), "lang".to_owned()), "en".to_owned()),
            ],
        );
        builder.start("jabber:client".to_owned(), "body".to_owned(), no_attrs());
        builder.text("wherefore".to_owned());
        assert_eq!(builder.depth(), 2);
        assert!(builder.end().is_none());
        let message = builder.end().unwrap();
        assert_eq!(builder.depth(), 0);
        assert!(message.is("message", "jabber:client"));
        assert_eq!(message.attr("to"), Some("juliet@example.com"));
        assert_eq!(message.attr("xml:lang"), Some("en"));
        let body = message.get_child("body", "jabber:client").unwrap();
        assert_eq!(body.text(), "wherefore");
    }

    #[test]
    fn end_without_start() {
        let mut builder = ElementBuilder::new();
        assert!(builder.end().is_none());
    }
}
