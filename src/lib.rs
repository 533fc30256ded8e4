//! BaseX Rust Client
//!
//! Async client for the BaseX server protocol: authenticated sessions,
//! database commands, document ingestion, server-side queries with variable
//! binding and streamed results, and push-based event notifications.
//!
//! # Example
//!
//! ```rust,no_run
//! use basex_client::SessionBuilder;
//! use futures::TryStreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), basex_client::ClientError> {
//!     let session = SessionBuilder::new("localhost", 1984)
//!         .auth("admin", "admin")
//!         .database("RePEc")
//!         .build()
//!         .await?;
//!
//!     let mut query = session
//!         .query_with_namespaces(
//!             "//amf:person/amf:name",
//!             [("amf", "http://amf.openlib.org")],
//!         )
//!         .await?;
//!
//!     let mut items = query.iter().await?;
//!     while let Some(item) = items.try_next().await? {
//!         println!("{}", item);
//!     }
//!     drop(items);
//!
//!     query.close().await?;
//!     session.close().await
//! }
//! ```
//!
//! The handshake uses a two-round MD5 digest over plain TCP. Treat the
//! connection as unencrypted.

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod xml;

pub use client::{EventCallback, EventState, Query, ResultStream, Session, SessionBuilder};
pub use config::Config;
pub use error::{ClientError, Result};
pub use protocol::{Command, FramedReader};
pub use xml::split_concatenated;
