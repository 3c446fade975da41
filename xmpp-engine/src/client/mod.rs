// Copyright (c) 2025 The xmpp-engine contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Async driver running a [`Connection`] over a [`ServerConnector`]
//! transport.

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::{
    connect::ServerConnector,
    connection::{CloseReason, Connection, ConnectionConfig, IqCallback, IqFailure, Output, State},
    error::Error,
    stanza::{Iq, Stanza},
    xmlstream::{encode_element, encode_footer, encode_header},
};

#[cfg(feature = "starttls")]
use crate::connect::StartTlsServerConnector;

#[cfg(test)]
mod tests;

const COMMAND_QUEUE_DEPTH: usize = 16;
const READ_BUFFER_SIZE: usize = 4096;

enum Command {
    Send(Stanza),
    SendIq(Iq, IqCallback),
    Close,
}

/// XMPP client: owns the [`Connection`], its transport and the task side of
/// a [`ClientHandle`] command queue.
///
/// Either drive it in place with [`run`](Client::run), or move it onto its
/// own task with [`spawn`](Client::spawn) and talk to it through handles.
pub struct Client<C: ServerConnector> {
    connection: Connection,
    connector: C,
    transport: Option<C::Stream>,
    commands: mpsc::Receiver<Command>,
    handle: ClientHandle,
}

#[cfg(feature = "starttls")]
impl Client<StartTlsServerConnector> {
    /// A client connecting over TCP with STARTTLS, resolving the server
    /// through SRV unless `config` names one.
    pub fn new(config: ConnectionConfig) -> Result<Self, Error> {
        let connector = StartTlsServerConnector::from_config(&config)?;
        Ok(Self::new_with_connector(config, connector))
    }
}

impl<C: ServerConnector> Client<C> {
    /// A client using `connector` for its transport.
    pub fn new_with_connector(config: ConnectionConfig, connector: C) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        Client {
            connection: Connection::new(config),
            connector,
            transport: None,
            commands: rx,
            handle: ClientHandle { commands: tx },
        }
    }

    /// A handle for submitting work from other tasks.
    pub fn handle(&self) -> ClientHandle {
        self.handle.clone()
    }

    /// The connection core.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// The connection core, e.g. to register delegates before connecting.
    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }

    /// Open the transport and send the initial stream header.
    ///
    /// Negotiation then proceeds as data arrives, inside [`run`](Client::run).
    pub async fn connect(&mut self) -> Result<(), Error> {
        self.connection.begin_connect()?;
        let domain = self.connection.config().domain().to_owned();
        match self.connector.connect(&domain).await {
            Ok(transport) => {
                self.transport = Some(transport);
                self.connection.transport_connected();
                self.flush().await;
                Ok(())
            }
            Err(e) => {
                self.connection.transport_failed(e);
                self.flush().await;
                Err(self.termination_error())
            }
        }
    }

    /// Connect if not yet connected, then process transport data and
    /// handle commands until the connection ends.
    ///
    /// Returns `Ok(())` after a requested close or an orderly close by the
    /// server, or the error that ended the connection.
    pub async fn run(&mut self) -> Result<(), Error> {
        match self.connection.state() {
            State::Idle => self.connect().await?,
            State::Closed | State::Failed => return Err(Error::InvalidState),
            _ => (),
        }
        let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
        loop {
            self.flush().await;
            if self.connection.is_terminated() {
                break;
            }
            let Some(transport) = self.transport.as_mut() else {
                self.connection.transport_closed();
                continue;
            };
            tokio::select! {
                result = transport.read_buf(&mut buf) => match result {
                    Ok(0) => {
                        log::debug!("transport reached EOF");
                        self.transport = None;
                        self.connection.transport_closed();
                    }
                    Ok(_) => {
                        self.connection.receive(&buf);
                        buf.clear();
                    }
                    Err(e) => {
                        self.transport = None;
                        self.connection.transport_failed(e.into());
                    }
                },
                Some(command) = self.commands.recv() => self.execute(command),
            }
        }
        match self.connection.take_close_reason() {
            Some(CloseReason::Error(e)) => Err(e),
            _ => Ok(()),
        }
    }

    /// Run the client on its own task.
    pub fn spawn(mut self) -> (ClientHandle, JoinHandle<Result<(), Error>>) {
        let handle = self.handle();
        let task = tokio::spawn(async move { self.run().await });
        (handle, task)
    }

    fn termination_error(&mut self) -> Error {
        match self.connection.take_close_reason() {
            Some(CloseReason::Error(e)) => e,
            _ => Error::Disconnected,
        }
    }

    fn execute(&mut self, command: Command) {
        match command {
            Command::Send(stanza) => {
                if let Err(e) = self.connection.send(stanza) {
                    log::warn!("dropping stanza: {}", e);
                }
            }
            Command::SendIq(iq, callback) => {
                if matches!(
                    self.connection.state(),
                    State::Closing | State::Closed | State::Failed
                ) {
                    callback(&mut self.connection, Err(IqFailure::ConnectionClosed));
                } else if let Err(e) = self.connection.send_iq(iq, callback) {
                    log::warn!("dropping IQ: {}", e);
                }
            }
            Command::Close => self.connection.close(),
        }
    }

    async fn write(&mut self, data: &[u8]) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        if let Err(e) = transport.write_all(data).await {
            self.transport = None;
            self.connection.transport_failed(e.into());
        }
    }

    /// Execute everything the connection asked for.
    async fn flush(&mut self) {
        let mut dirty = false;
        while let Some(output) = self.connection.poll_output() {
            match output {
                Output::StreamHeader(header) => {
                    self.write(&encode_header(&header)).await;
                    dirty = true;
                }
                Output::Element(element) => match encode_element(&element) {
                    Ok(data) => {
                        self.write(&data).await;
                        dirty = true;
                    }
                    Err(e) => log::warn!("cannot serialise {}: {}", element.name(), e),
                },
                Output::StreamFooter => {
                    self.write(encode_footer()).await;
                    dirty = true;
                }
                Output::StartTls => {
                    self.flush_transport().await;
                    dirty = false;
                    self.upgrade().await;
                }
                Output::Close => {
                    if let Some(mut transport) = self.transport.take() {
                        if let Err(e) = transport.shutdown().await {
                            log::debug!("shutting down transport: {}", e);
                        }
                    }
                    dirty = false;
                    self.connection.transport_closed();
                }
            }
        }
        if dirty {
            self.flush_transport().await;
        }
    }

    async fn flush_transport(&mut self) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        if let Err(e) = transport.flush().await {
            self.transport = None;
            self.connection.transport_failed(e.into());
        }
    }

    async fn upgrade(&mut self) {
        let Some(transport) = self.transport.take() else {
            return;
        };
        let domain = self.connection.config().domain().to_owned();
        match self.connector.starttls(transport, &domain).await {
            Ok((transport, session)) => {
                self.transport = Some(transport);
                if let Err(e) = self.connection.tls_established(session) {
                    log::warn!("TLS established out of order: {}", e);
                }
            }
            Err(e) => self.connection.transport_failed(e),
        }
    }
}

/// Submits work to a running [`Client`]. Cheap to clone.
#[derive(Clone, Debug)]
pub struct ClientHandle {
    commands: mpsc::Sender<Command>,
}

impl ClientHandle {
    /// Send a stanza; see [`Connection::send`].
    pub async fn send<S: Into<Stanza>>(&self, stanza: S) -> Result<(), Error> {
        self.commands
            .send(Command::Send(stanza.into()))
            .await
            .map_err(|_| Error::Disconnected)
    }

    /// Send an IQ request; see [`Connection::send_iq`]. The callback runs on
    /// the client's task.
    pub async fn send_iq<F>(&self, iq: Iq, callback: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Connection, Result<Iq, IqFailure>) + Send + 'static,
    {
        self.commands
            .send(Command::SendIq(iq, Box::new(callback)))
            .await
            .map_err(|_| Error::Disconnected)
    }

    /// Send an IQ request and wait for its response.
    ///
    /// A `type="error"` response is returned as `Ok`. Callers wanting a
    /// deadline wrap this in `tokio::time::timeout`.
    pub async fn request(&self, iq: Iq) -> Result<Iq, IqFailure> {
        let (tx, rx) = oneshot::channel();
        self.send_iq(iq, move |_, result| {
            let _ = tx.send(result);
        })
        .await
        .map_err(|_| IqFailure::LostWorker)?;
        rx.await.map_err(|_| IqFailure::LostWorker)?
    }

    /// Close the connection.
    pub async fn close(&self) -> Result<(), Error> {
        self.commands
            .send(Command::Close)
            .await
            .map_err(|_| Error::Disconnected)
    }

    /// Whether the client is gone.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}
