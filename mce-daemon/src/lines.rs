//! Line framing shared by the control socket and the fpd link
//!
//! Both sockets carry one JSON document per line, capped at
//! [`mce_protocol::MAX_MESSAGE_SIZE`].

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

pub const MESSAGE_TOO_LARGE: &str = "Message too large";

/// Read one newline terminated line into `out`, refusing to buffer more
/// than `max_len` bytes.
///
/// `out` is appended to and never cleared here, so a partially read line
/// survives the future being dropped inside `select!`. Callers clear it
/// after consuming a complete line. Returns 0 on EOF.
pub async fn read_line_bounded<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    out: &mut Vec<u8>,
    max_len: usize,
) -> std::io::Result<usize> {
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(0);
        }

        let mut take_len = available.len();
        let mut found_newline = false;
        if let Some(pos) = available.iter().position(|b| *b == b'\n') {
            take_len = pos + 1;
            found_newline = true;
        }

        let remaining = max_len.saturating_sub(out.len());
        if take_len > remaining {
            // Consume enough to make forward progress, but don't buffer beyond max_len.
            let consume_len = remaining.min(available.len());
            reader.consume(consume_len);
            out.clear();
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, MESSAGE_TOO_LARGE));
        }

        out.extend_from_slice(&available[..take_len]);
        reader.consume(take_len);

        if found_newline {
            return Ok(out.len());
        }
    }
}

pub fn is_too_large(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::InvalidData && e.to_string().contains(MESSAGE_TOO_LARGE)
}

/// Serialize `message` and write it as a single line
pub async fn write_json_line<W, T>(writer: &mut W, message: &T) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut json = serde_json::to_vec(message)?;
    json.push(b'\n');
    writer.write_all(&json).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn test_reads_lines() {
        let mut reader = BufReader::new(&b"{\"a\":1}\n{\"b\":2}\n"[..]);
        let mut line = Vec::new();

        assert_eq!(read_line_bounded(&mut reader, &mut line, 64).await.unwrap(), 8);
        assert_eq!(line, b"{\"a\":1}\n");
        line.clear();

        read_line_bounded(&mut reader, &mut line, 64).await.unwrap();
        assert_eq!(line, b"{\"b\":2}\n");
        line.clear();

        assert_eq!(read_line_bounded(&mut reader, &mut line, 64).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rejects_long_line() {
        let data = vec![b'x'; 100];
        let mut reader = BufReader::new(&data[..]);
        let mut line = Vec::new();
        let err = read_line_bounded(&mut reader, &mut line, 16).await.unwrap_err();
        assert!(is_too_large(&err));
        assert!(line.is_empty());
    }

    #[tokio::test]
    async fn test_write_json_line() {
        let mut out = Vec::new();
        write_json_line(&mut out, &serde_json::json!({"id": 3})).await.unwrap();
        assert_eq!(out, b"{\"id\":3}\n");
    }
}
