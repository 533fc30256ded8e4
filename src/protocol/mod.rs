//! Wire protocol definitions for the BaseX server
//!
//! The protocol is a plain TCP byte stream with no length prefixes. Every
//! field is a NUL-terminated string, so a reader has to scan for delimiters
//! across socket reads.
//!
//! # Protocol Overview
//!
//! - **Handshake**: server sends a timestamp string; client answers
//!   `user\0digest\0`; server replies with one status byte (`0x00` = ok)
//! - **Command string**: `command\0` → `result\0info\0status`
//! - **Query command**: `code args...\0` → `result\0status` (on failure the
//!   status is followed by `error\0`)
//! - **Iteration**: `typecode [item\0]` pairs ending in a zero typecode,
//!   followed by a final status byte
//! - **Events**: a second socket carrying unbounded `name\0data\0` pairs
//!
//! The handshake digest is a two-round MD5 over an unencrypted socket. It is
//! a legacy scheme and is kept as-is for wire compatibility.

pub mod codec;
pub mod command;
pub mod reader;

pub use codec::{auth_digest, encode_command, encode_command_string, encode_login, STATUS_OK};
pub use command::Command;
pub use reader::{FramedReader, DEFAULT_BUFFER_SIZE};
