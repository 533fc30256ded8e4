//! Event notifications
//!
//! Watching the first event opens a second socket to the port announced by
//! the server. A spawned listener task owns that socket and dispatches
//! `name\0data\0` pairs to the registered callbacks, in arrival order.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use super::{Channel, Session};
use crate::error::{ClientError, Result};
use crate::protocol::{encode_command, encode_command_string, Command, FramedReader, STATUS_OK};

/// Callback invoked from the listener task with the event payload.
///
/// Runs on the listener task, concurrently with other session use; shared
/// state touched here needs its own synchronization.
pub type EventCallback = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Clone, Default)]
pub(crate) struct CallbackMap(Arc<RwLock<HashMap<String, EventCallback>>>);

impl std::ops::Deref for CallbackMap {
    type Target = RwLock<HashMap<String, EventCallback>>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventState {
    /// No event socket yet
    Inactive,
    Listening,
    /// The listener stopped or the session was closed
    Closed,
}

pub(crate) struct EventChannel {
    port: u16,
    // Held so the socket stays open for the listener
    writer: OwnedWriteHalf,
    listener: JoinHandle<()>,
}

impl EventChannel {
    /// Registration handshake. The watch code has already been sent on the
    /// primary channel; the server answers with the event port, then a token.
    async fn open(channel: &mut Channel, host: &str, callbacks: CallbackMap) -> Result<Self> {
        let port_str = channel.reader.read_string().await?;
        let port: u16 = port_str.trim().parse().map_err(|_| {
            ClientError::Protocol(format!("Invalid event port from server: '{}'", port_str))
        })?;

        let stream = TcpStream::connect((host, port)).await.map_err(|e| {
            ClientError::Connection(format!(
                "Failed to connect to event port {}:{}: {}",
                host, port, e
            ))
        })?;
        let token = channel.reader.read_string().await?;

        let (read, mut writer) = stream.into_split();
        let mut token_frame = token.into_bytes();
        token_frame.push(0);
        writer
            .write_all(&token_frame)
            .await
            .map_err(|e| ClientError::io("Failed to send event token", e))?;

        let mut reader = FramedReader::new(read).with_shutdown(channel.shutdown.clone());
        let ack = reader.read_byte().await?;
        if ack != STATUS_OK {
            return Err(ClientError::EventRegistration(format!(
                "Server rejected event token (status {})",
                ack
            )));
        }

        tracing::info!("Event listener connected on {}:{}", host, port);
        let listener = tokio::spawn(listen(reader, callbacks));

        Ok(Self {
            port,
            writer,
            listener,
        })
    }

    fn state(&self) -> EventState {
        if self.listener.is_finished() {
            EventState::Closed
        } else {
            EventState::Listening
        }
    }

    pub(crate) async fn shutdown(mut self) {
        self.listener.abort();
        if let Err(e) = self.writer.shutdown().await {
            tracing::debug!("Shutdown of event socket on port {} failed: {}", self.port, e);
        }
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

async fn listen(mut reader: FramedReader<OwnedReadHalf>, callbacks: CallbackMap) {
    loop {
        let (name, data) = match read_event(&mut reader).await {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("Event listener stopped: {}", e);
                break;
            }
        };

        let callback = callbacks.read().get(&name).cloned();
        match callback {
            Some(callback) => callback(&data),
            None => tracing::warn!("Dropping event '{}': no watch registered", name),
        }
    }
}

/// Reads one `name\0data\0` notification. Only socket failures end the
/// stream; undecodable bytes are replaced so later events still arrive.
async fn read_event(reader: &mut FramedReader<OwnedReadHalf>) -> Result<(String, String)> {
    let name = read_lossy(reader).await?;
    let data = read_lossy(reader).await?;
    Ok((name, data))
}

async fn read_lossy(reader: &mut FramedReader<OwnedReadHalf>) -> Result<String> {
    let bytes = reader.read_until(0).await?;
    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => {
            tracing::warn!("Invalid UTF-8 in event notification: {}", e);
            Ok(String::from_utf8_lossy(e.as_bytes()).into_owned())
        }
    }
}

impl Session {
    /// Registers `callback` for the server event `name`.
    ///
    /// The first watch on a session opens the event socket and starts the
    /// listener; later watches reuse it.
    pub async fn watch<F>(&self, name: &str, callback: F) -> Result<()>
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let mut channel = self.channel().await?;

        // Registered up front so an event pushed right after the ack is not lost
        let previous = self
            .shared
            .callbacks
            .write()
            .insert(name.to_string(), Arc::new(callback));

        let result = self.register_watch(&mut channel, name).await;
        if result.is_err() {
            let mut callbacks = self.shared.callbacks.write();
            match previous {
                Some(previous) => {
                    callbacks.insert(name.to_string(), previous);
                }
                None => {
                    callbacks.remove(name);
                }
            }
        }
        result
    }

    async fn register_watch(&self, channel: &mut Channel, name: &str) -> Result<()> {
        // The session lock is held, so no other watch can race this check
        let first = self.shared.events.lock().is_none();
        if first {
            channel.send(&encode_command(Command::Watch, &[])).await?;
            let events =
                EventChannel::open(channel, &self.shared.host, self.shared.callbacks.clone())
                    .await?;
            *self.shared.events.lock() = Some(events);
            channel.send(&encode_command_string(name)).await?;
        } else {
            channel.send(&encode_command(Command::Watch, &[name])).await?;
        }
        channel.read_info_status().await?;
        tracing::debug!("Watching event '{}'", name);
        Ok(())
    }

    /// Unregisters the watch for `name`. The event socket stays open.
    pub async fn unwatch(&self, name: &str) -> Result<()> {
        let mut channel = self.channel().await?;
        channel.send(&encode_command(Command::Unwatch, &[name])).await?;
        channel.read_info_status().await?;
        self.shared.callbacks.write().remove(name);
        tracing::debug!("Stopped watching event '{}'", name);
        Ok(())
    }

    /// Names of the events that currently have a callback.
    pub fn watched_events(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shared.callbacks.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn event_state(&self) -> EventState {
        if self.is_closed() {
            return EventState::Closed;
        }
        match &*self.shared.events.lock() {
            Some(events) => events.state(),
            None => EventState::Inactive,
        }
    }
}
