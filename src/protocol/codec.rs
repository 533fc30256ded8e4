use super::command::Command;

/// Status byte reported by the server on success.
pub const STATUS_OK: u8 = 0x00;

/// Encodes a control code followed by NUL-terminated arguments.
///
/// With no arguments only the control byte is produced.
pub fn encode_command(cmd: Command, args: &[&str]) -> Vec<u8> {
    let payload_len: usize = args.iter().map(|a| a.len() + 1).sum();
    let mut buf = Vec::with_capacity(1 + payload_len);
    buf.push(cmd.code());
    for arg in args {
        buf.extend_from_slice(arg.as_bytes());
        buf.push(0);
    }
    buf
}

/// Encodes a textual database command such as `open db` or `xquery 1+1`.
pub fn encode_command_string(command: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(command.len() + 1);
    buf.extend_from_slice(command.as_bytes());
    buf.push(0);
    buf
}

/// Encodes the client half of the handshake: `user\0digest\0`.
pub fn encode_login(user: &str, digest: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(user.len() + digest.len() + 2);
    buf.extend_from_slice(user.as_bytes());
    buf.push(0);
    buf.extend_from_slice(digest.as_bytes());
    buf.push(0);
    buf
}

/// Computes `md5_hex(md5_hex(password) || timestamp)`.
///
/// Legacy challenge-response; the socket itself is never encrypted.
pub fn auth_digest(password: &str, timestamp: &str) -> String {
    let inner = format!("{:x}", md5::compute(password.as_bytes()));
    let mut ctx = md5::Context::new();
    ctx.consume(inner.as_bytes());
    ctx.consume(timestamp.as_bytes());
    format!("{:x}", ctx.compute())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_digest_reference() {
        assert_eq!(
            auth_digest("admin", "1234567890"),
            "d9a3650b375d1bfdb529dbf036d626a4"
        );
        assert_eq!(auth_digest("secret", "ts42"), "713cec168b3258ae860bd18886f684c4");
    }

    #[test]
    fn test_auth_digest_is_lowercase_hex() {
        let digest = auth_digest("Pa55word", "987654");
        assert_eq!(digest.len(), 32);
        assert!(digest
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        assert_eq!(digest, auth_digest("Pa55word", "987654"));
    }

    #[test]
    fn test_encode_bind() {
        let bytes = encode_command(Command::Bind, &["0", "name", "Sarah", ""]);
        assert_eq!(bytes, b"\x030\0name\0Sarah\0\0".to_vec());
    }

    #[test]
    fn test_encode_empty_query() {
        let bytes = encode_command(Command::CreateQuery, &[""]);
        assert_eq!(bytes, vec![0x00, 0x00]);
    }

    #[test]
    fn test_encode_bare_code() {
        assert_eq!(encode_command(Command::Watch, &[]), vec![0x0A]);
    }

    #[test]
    fn test_encode_input() {
        let bytes = encode_command(Command::AddDocument, &["docs/a.xml", "<a/>"]);
        assert_eq!(bytes, b"\x09docs/a.xml\0<a/>\0".to_vec());
    }

    #[test]
    fn test_encode_login_and_string() {
        assert_eq!(encode_login("admin", "abc"), b"admin\0abc\0".to_vec());
        assert_eq!(encode_command_string("open RePEc"), b"open RePEc\0".to_vec());
    }
}
