use thiserror::Error;

/// Errors surfaced by the client.
///
/// Nothing here is retried or recovered locally. A failed handshake leaves the
/// session unusable; a `Command` error leaves the session healthy.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Socket-level I/O failure or unexpected closure
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Database '{database}' could not be opened: {message}")]
    DatabaseOpen { database: String, message: String },

    #[error("Query creation failed: {0}")]
    QueryCreation(String),

    /// Server-reported non-success status for a single command
    #[error("Command failed (status {code}): {message}")]
    Command { code: u8, message: String },

    #[error("Event registration failed: {0}")]
    EventRegistration(String),

    #[error("Use after close: {0}")]
    UseAfterClose(String),

    /// Malformed data received from the server
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;

impl ClientError {
    /// Maps an I/O error into a `Connection` error with some context.
    pub(crate) fn io(context: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            ClientError::Connection(format!("{}: connection closed by peer", context))
        } else {
            ClientError::Connection(format!("{}: {}", context, err))
        }
    }

    /// The local side closed the connection while an operation was pending.
    pub(crate) fn closed(context: &str) -> Self {
        ClientError::Connection(format!("{}: connection closed", context))
    }

    /// True when the error came from the socket rather than from the server.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, ClientError::Connection(_))
    }
}
