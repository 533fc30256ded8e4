//! Scripted in-process BaseX server for protocol tests
//!
//! Each test spawns a task that plays the server side of one exchange and
//! asserts on the exact bytes the client writes.

#![allow(dead_code)]

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub const TIMESTAMP: &str = "1234567890";
/// `md5_hex(md5_hex("admin") || TIMESTAMP)`
pub const ADMIN_DIGEST: &str = "d9a3650b375d1bfdb529dbf036d626a4";

pub async fn listen() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind mock server");
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

pub async fn read_byte(stream: &mut TcpStream) -> u8 {
    stream.read_u8().await.expect("Client closed the stream")
}

pub async fn read_cstring(stream: &mut TcpStream) -> String {
    let mut bytes = Vec::new();
    loop {
        let b = read_byte(stream).await;
        if b == 0 {
            break;
        }
        bytes.push(b);
    }
    String::from_utf8(bytes).expect("Client sent invalid UTF-8")
}

pub async fn write(stream: &mut TcpStream, bytes: &[u8]) {
    stream.write_all(bytes).await.expect("Failed to write to client");
    stream.flush().await.unwrap();
}

/// Reads until the client closes its side; returns any bytes it sent.
pub async fn read_to_eof(stream: &mut TcpStream) -> Vec<u8> {
    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).await.unwrap_or_default();
    rest
}

/// Accepts one client and runs the handshake, answering with `status`.
/// Returns the stream with the user name and digest the client sent.
pub async fn accept_login(listener: &TcpListener, status: u8) -> (TcpStream, String, String) {
    let (mut stream, _) = listener.accept().await.expect("No client connected");
    write(&mut stream, format!("{}\0", TIMESTAMP).as_bytes()).await;
    let user = read_cstring(&mut stream).await;
    let digest = read_cstring(&mut stream).await;
    write(&mut stream, &[status]).await;
    (stream, user, digest)
}

/// Accepts and authenticates a client as `admin`/`admin`.
pub async fn accept_admin(listener: &TcpListener) -> TcpStream {
    let (stream, user, digest) = accept_login(listener, 0).await;
    assert_eq!(user, "admin");
    assert_eq!(digest, ADMIN_DIGEST);
    stream
}

/// Expects a control code followed by `args.len()` NUL-terminated strings.
pub async fn expect_command(stream: &mut TcpStream, code: u8, args: &[&str]) {
    assert_eq!(read_byte(stream).await, code, "unexpected control code");
    for arg in args {
        assert_eq!(read_cstring(stream).await, *arg);
    }
}

/// Answers a query command with `result\0` and a success status.
pub async fn reply_ok(stream: &mut TcpStream, result: &str) {
    write(stream, format!("{}\0\0", result).as_bytes()).await;
}

/// Answers a query command with an empty result, failure status and message.
pub async fn reply_error(stream: &mut TcpStream, message: &str) {
    write(stream, format!("\0\x01{}\0", message).as_bytes()).await;
}

/// Answers a textual command with `result\0info\0status`.
pub async fn reply_command(stream: &mut TcpStream, result: &str, info: &str, status: u8) {
    let mut bytes = format!("{}\0{}\0", result, info).into_bytes();
    bytes.push(status);
    write(stream, &bytes).await;
}

/// Answers an input or watch command with `info\0status`.
pub async fn reply_info(stream: &mut TcpStream, info: &str, status: u8) {
    let mut bytes = format!("{}\0", info).into_bytes();
    bytes.push(status);
    write(stream, &bytes).await;
}

/// Expects the `exit` command sent by `Session::close`.
pub async fn expect_exit(stream: &mut TcpStream) {
    assert_eq!(read_cstring(stream).await, "exit");
}
