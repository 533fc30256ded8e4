//! BaseX session client
//!
//! A [`Session`] owns the primary command socket. It is a cheap `Clone`
//! handle: queries keep their own copy, and every command/response pair is
//! serialized through one lock because the protocol has no request ids.
//!
//! # Example
//!
//! ```rust,no_run
//! use basex_client::Session;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), basex_client::ClientError> {
//!     let session = Session::connect("localhost", 1984, "admin", "admin", Some("RePEc")).await?;
//!
//!     let mut query = session.query("count(//*)").await?;
//!     println!("{}", query.execute().await?);
//!     query.close().await?;
//!
//!     session.close().await
//! }
//! ```

mod builder;
mod database;
mod events;
mod query;

pub use builder::SessionBuilder;
pub use events::{EventCallback, EventState};
pub use query::{namespace_prologue, Query, ResultStream};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

use crate::error::{ClientError, Result};
use crate::protocol::{
    auth_digest, encode_command, encode_command_string, encode_login, Command, FramedReader,
    STATUS_OK,
};
use events::{CallbackMap, EventChannel};

/// Where the primary channel stands within a request/response exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exchange {
    /// On a frame boundary, nothing left to read
    Idle,
    /// A request went out and its reply is not fully read
    InFlight,
    /// Between two items of an iteration response
    Iterating,
}

/// Primary command channel. Only ever touched while holding the session lock.
pub(crate) struct Channel {
    reader: FramedReader<OwnedReadHalf>,
    /// Also held by [`Shared`] so `close` can reach the socket without this lock
    writer: Arc<Mutex<OwnedWriteHalf>>,
    shutdown: CancellationToken,
    /// Last info message reported by the server
    info: Option<String>,
    exchange: Exchange,
}

async fn write_frame(writer: &mut OwnedWriteHalf, data: &[u8]) -> Result<()> {
    writer
        .write_all(data)
        .await
        .map_err(|e| ClientError::io("Write failed", e))?;
    writer
        .flush()
        .await
        .map_err(|e| ClientError::io("Flush failed", e))
}

impl Channel {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        self.exchange = Exchange::InFlight;
        let mut writer = self.writer.lock().await;
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(ClientError::closed("Write aborted")),
            sent = write_frame(&mut writer, data) => sent,
        }
    }

    /// Reads a status byte; on failure the error string that follows it.
    /// Ends the current exchange either way.
    async fn read_status(&mut self) -> Result<()> {
        let status = self.reader.read_byte().await?;
        if status == STATUS_OK {
            self.exchange = Exchange::Idle;
            return Ok(());
        }
        let message = self.reader.read_string().await?;
        self.exchange = Exchange::Idle;
        self.info = Some(message.clone());
        Err(ClientError::Command {
            code: status,
            message,
        })
    }

    /// Textual command: `command\0` → `result\0info\0status`.
    async fn execute_string(&mut self, command: &str) -> Result<String> {
        self.send(&encode_command_string(command)).await?;
        let result = self.reader.read_string().await?;
        self.read_info_status().await?;
        Ok(result)
    }

    /// Control-code command: `code args\0` → `result\0status`.
    async fn execute_code(&mut self, cmd: Command, args: &[&str]) -> Result<String> {
        tracing::debug!("Sending {}", cmd);
        self.send(&encode_command(cmd, args)).await?;
        let result = self.reader.read_string().await?;
        self.read_status().await?;
        Ok(result)
    }

    /// Input command: `code name\0content\0` → `info\0status`.
    async fn send_input(&mut self, cmd: Command, name: &str, content: &str) -> Result<()> {
        tracing::debug!("Sending {} for '{}'", cmd, name);
        self.send(&encode_command(cmd, &[name, content])).await?;
        self.read_info_status().await
    }

    /// Reads `info\0status`, caching the info. Ends the current exchange.
    async fn read_info_status(&mut self) -> Result<()> {
        let info = self.reader.read_string().await?;
        let status = self.reader.read_byte().await?;
        self.exchange = Exchange::Idle;
        self.info = Some(info.clone());
        if status != STATUS_OK {
            return Err(ClientError::Command {
                code: status,
                message: info,
            });
        }
        Ok(())
    }

    /// Reads the next streamed item, or `None` at the terminating type code.
    async fn next_item(&mut self) -> Result<Option<String>> {
        self.exchange = Exchange::InFlight;
        let type_code = self.reader.read_byte().await?;
        if type_code == 0 {
            return Ok(None);
        }
        let item = self.reader.read_string().await?;
        self.exchange = Exchange::Iterating;
        Ok(Some(item))
    }

    /// Brings the channel back to a frame boundary before the next request.
    ///
    /// What is left of an abandoned iteration is read and discarded. A reply
    /// cut off anywhere else cannot be framed again, so the session fails
    /// from then on instead of handing out someone else's result.
    async fn resync(&mut self) -> Result<()> {
        match self.exchange {
            Exchange::Idle => Ok(()),
            Exchange::Iterating => self.drain_iteration().await,
            Exchange::InFlight => Err(ClientError::Connection(
                "session out of sync: an earlier request was interrupted before its reply was read"
                    .to_string(),
            )),
        }
    }

    async fn drain_iteration(&mut self) -> Result<()> {
        let mut skipped = 0usize;
        while self.next_item().await?.is_some() {
            skipped += 1;
        }
        tracing::debug!("Drained {} unread items from an abandoned iteration", skipped);
        // The iteration's own failure belongs to the dropped stream
        match self.read_status().await {
            Err(e) if e.is_connection_error() => Err(e),
            _ => Ok(()),
        }
    }
}

pub(crate) struct Shared {
    host: String,
    port: u16,
    channel: Arc<Mutex<Channel>>,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    /// Cancelled by `close` to abort whatever I/O is pending on the channel
    shutdown: CancellationToken,
    events: SyncMutex<Option<EventChannel>>,
    callbacks: CallbackMap,
    database: SyncMutex<Option<String>>,
    closed: AtomicBool,
}

/// Handle to an authenticated server session.
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.shared.host)
            .field("port", &self.shared.port)
            .field("database", &*self.shared.database.lock())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Session {
    /// Connects, authenticates and optionally opens a default database.
    ///
    /// If `database` cannot be opened the error is returned and the
    /// connection is dropped. To keep an authenticated session after a failed
    /// open, connect without a database and call [`Session::open`].
    ///
    /// # Arguments
    /// * `host` / `port` - Server address, usually `localhost:1984`
    /// * `database` - Database to open right after the handshake
    pub async fn connect(
        host: &str,
        port: u16,
        user: &str,
        password: &str,
        database: Option<&str>,
    ) -> Result<Self> {
        let stream = TcpStream::connect((host, port)).await.map_err(|e| {
            ClientError::Connection(format!("Failed to connect to {}:{}: {}", host, port, e))
        })?;
        stream.set_nodelay(true).map_err(|e| {
            ClientError::Connection(format!("Failed to set TCP_NODELAY: {}", e))
        })?;

        let shutdown = CancellationToken::new();
        let (read, mut writer) = stream.into_split();
        let mut reader = FramedReader::new(read).with_shutdown(shutdown.clone());

        let timestamp = reader.read_string().await?;
        let digest = auth_digest(password, &timestamp);
        write_frame(&mut writer, &encode_login(user, &digest)).await?;

        if reader.read_byte().await? != STATUS_OK {
            tracing::warn!("Authentication rejected for user '{}'", user);
            return Err(ClientError::Authentication(format!(
                "Access denied for user '{}'",
                user
            )));
        }
        tracing::info!("Connected to {}:{} as '{}'", host, port, user);

        let writer = Arc::new(Mutex::new(writer));
        let session = Self {
            shared: Arc::new(Shared {
                host: host.to_string(),
                port,
                channel: Arc::new(Mutex::new(Channel {
                    reader,
                    writer: writer.clone(),
                    shutdown: shutdown.clone(),
                    info: None,
                    exchange: Exchange::Idle,
                })),
                writer,
                shutdown,
                events: SyncMutex::new(None),
                callbacks: CallbackMap::default(),
                database: SyncMutex::new(None),
                closed: AtomicBool::new(false),
            }),
        };

        if let Some(database) = database {
            session.open(database).await?;
        }

        Ok(session)
    }

    pub fn builder(host: &str, port: u16) -> SessionBuilder {
        SessionBuilder::new(host, port)
    }

    pub fn host(&self) -> &str {
        &self.shared.host
    }

    pub fn port(&self) -> u16 {
        self.shared.port
    }

    /// Database opened through [`Session::open`] or at connect time.
    pub fn database(&self) -> Option<String> {
        self.shared.database.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(ClientError::UseAfterClose("session is closed".to_string()));
        }
        Ok(())
    }

    /// Locks the primary channel for one request/response exchange.
    pub(crate) async fn channel(&self) -> Result<MutexGuard<'_, Channel>> {
        self.ensure_open()?;
        let mut channel = self.shared.channel.lock().await;
        self.ensure_open()?;
        channel.resync().await?;
        Ok(channel)
    }

    /// Owned variant of [`Session::channel`], for streams that outlive the borrow.
    pub(crate) async fn channel_owned(&self) -> Result<OwnedMutexGuard<Channel>> {
        self.ensure_open()?;
        let mut channel = self.shared.channel.clone().lock_owned().await;
        self.ensure_open()?;
        channel.resync().await?;
        Ok(channel)
    }

    /// Opens `database` for subsequent queries.
    ///
    /// A failure leaves the session usable, with no database open.
    pub async fn open(&self, database: &str) -> Result<()> {
        let command = format!("open {}", database);
        match self.channel().await?.execute_string(&command).await {
            Ok(_) => {
                tracing::info!("Opened database '{}'", database);
                *self.shared.database.lock() = Some(database.to_string());
                Ok(())
            }
            Err(ClientError::Command { message, .. }) => {
                *self.shared.database.lock() = None;
                Err(ClientError::DatabaseOpen {
                    database: database.to_string(),
                    message,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Runs a database command such as `list` or `xquery 1 + 1`.
    pub async fn execute(&self, command: &str) -> Result<String> {
        self.channel().await?.execute_string(command).await
    }

    /// Last status message reported by the server.
    pub async fn info(&self) -> Option<String> {
        self.shared.channel.lock().await.info.clone()
    }

    pub async fn query(&self, text: &str) -> Result<Query> {
        Query::new(self, text).await
    }

    /// Creates a query with `declare namespace` prologues for each entry.
    pub async fn query_with_namespaces<I, K, V>(&self, text: &str, namespaces: I) -> Result<Query>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Query::with_namespaces(self, text, namespaces).await
    }

    pub(crate) async fn execute_code(&self, cmd: Command, args: &[&str]) -> Result<String> {
        self.channel().await?.execute_code(cmd, args).await
    }

    /// Sends `exit`, closes both sockets and stops the event listener.
    ///
    /// Does not wait for the session lock: a request blocked on the socket,
    /// or a result stream still alive on this task, fails with a
    /// [`ClientError::Connection`] error instead. Any further use of this
    /// session or its queries fails with [`ClientError::UseAfterClose`].
    pub async fn close(&self) -> Result<()> {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return Err(ClientError::UseAfterClose(
                "session already closed".to_string(),
            ));
        }
        self.shared.shutdown.cancel();

        let sent = {
            let mut writer = self.shared.writer.lock().await;
            let sent = write_frame(&mut writer, &encode_command_string("exit")).await;
            if let Err(e) = writer.shutdown().await {
                tracing::debug!("Shutdown of primary socket failed: {}", e);
            }
            sent
        };

        let events = self.shared.events.lock().take();
        if let Some(events) = events {
            events.shutdown().await;
        }
        self.shared.callbacks.write().clear();
        tracing::info!("Closed session to {}:{}", self.shared.host, self.shared.port);
        sent
    }
}
