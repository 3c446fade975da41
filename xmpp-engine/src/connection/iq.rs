// Copyright (c) 2025 The xmpp-engine contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;

use jid::Jid;

use super::Connection;
use crate::stanza::Iq;

/// Error enumeration for Iq sending failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IqFailure {
    /// The connection was closed before a response arrived.
    ConnectionClosed,

    /// The driver task went away while the request was in flight.
    ///
    /// Most likely, this means that the driver has died with a panic.
    LostWorker,
}

impl fmt::Display for IqFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ConnectionClosed => f.write_str("connection closed before the IQ was answered"),
            Self::LostWorker => {
                f.write_str("disconnected from internal connection worker while sending IQ")
            }
        }
    }
}

impl Error for IqFailure {}

/// Handler invoked with the response to an IQ request.
///
/// A `type="error"` response is delivered as `Ok`; `Err` means no response
/// will ever arrive.
pub type IqCallback = Box<dyn FnOnce(&mut Connection, Result<Iq, IqFailure>) + Send>;

struct PendingIq {
    to: Option<Jid>,
    callback: IqCallback,
}

/// Outstanding IQ requests, keyed by stanza id.
#[derive(Default)]
pub(crate) struct PendingIqs {
    map: BTreeMap<String, PendingIq>,
}

impl PendingIqs {
    pub fn contains(&self, id: &str) -> bool {
        self.map.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn insert(&mut self, id: String, to: Option<Jid>, callback: IqCallback) {
        self.map.insert(id, PendingIq { to, callback });
    }

    /// Remove the entry for a response with `id` sent by `from`.
    ///
    /// `is_own` tells whether a JID belongs to our account or its server,
    /// which may answer requests sent without a `to`.
    pub fn take<F>(&mut self, id: &str, from: Option<&Jid>, is_own: F) -> Option<IqCallback>
    where
        F: Fn(&Jid) -> bool,
    {
        let entry = self.map.get(id)?;
        let matches = match (&entry.to, from) {
            (Some(to), Some(from)) => to == from || (is_own(to) && is_own(from)),
            (Some(to), None) => is_own(to),
            (None, Some(from)) => is_own(from),
            (None, None) => true,
        };
        if !matches {
            log::warn!(
                "not handling IQ response {:?} from {:?}: request was sent to {:?}",
                id,
                from,
                entry.to
            );
            return None;
        }
        self.map.remove(id).map(|entry| entry.callback)
    }

    pub fn drain(&mut self) -> Vec<(String, IqCallback)> {
        std::mem::take(&mut self.map)
            .into_iter()
            .map(|(id, entry)| (id, entry.callback))
            .collect()
    }
}
