use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on the bytes returned by a single [`read_line`] call.
///
/// A longer line is handed back in pieces, each piece becoming its own message.
pub const MAX_LINE_BYTES: usize = 1024;

const LINE_ENDINGS: &[char] = &['\n', '\r'];

/// Reads the next non-blank line, without its line ending.
///
/// Returns `Ok(None)` once the peer has closed the stream. Invalid UTF-8 is
/// replaced rather than treated as an error.
pub async fn read_line<R>(reader: &mut R) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        let bytes = (&mut *reader)
            .take(MAX_LINE_BYTES as u64)
            .read_until(b'\n', &mut buffer)
            .await?;
        if bytes == 0 {
            return Ok(None);
        }

        let text = String::from_utf8_lossy(&buffer);
        let trimmed = text.trim_end_matches(LINE_ENDINGS);
        if trimmed.is_empty() {
            continue;
        }

        return Ok(Some(trimmed.to_string()));
    }
}

/// Writes `line` followed by a newline and flushes so the peer sees it promptly.
pub async fn write_line<W>(writer: &mut W, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut encoded = Vec::with_capacity(line.len() + 1);
    encoded.extend_from_slice(line.as_bytes());
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncWriteExt, BufReader};

    use super::*;

    #[tokio::test]
    async fn written_lines_are_read_back_in_order() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut reader = BufReader::new(reader);

        write_line(&mut writer, "alice").await.expect("write username");
        write_line(&mut writer, "hello there").await.expect("write chat");
        drop(writer);

        assert_eq!(read_line(&mut reader).await.unwrap(), Some("alice".into()));
        assert_eq!(
            read_line(&mut reader).await.unwrap(),
            Some("hello there".into())
        );
        assert_eq!(read_line(&mut reader).await.unwrap(), None);
    }

    #[tokio::test]
    async fn one_write_carrying_two_lines_yields_two_messages() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut reader = BufReader::new(reader);

        writer.write_all(b"one\r\ntwo\n").await.unwrap();
        drop(writer);

        assert_eq!(read_line(&mut reader).await.unwrap(), Some("one".into()));
        assert_eq!(read_line(&mut reader).await.unwrap(), Some("two".into()));
    }

    #[tokio::test]
    async fn blank_lines_are_skipped() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut reader = BufReader::new(reader);

        writer.write_all(b"\n\r\n\nbob\n").await.unwrap();
        drop(writer);

        assert_eq!(read_line(&mut reader).await.unwrap(), Some("bob".into()));
        assert_eq!(read_line(&mut reader).await.unwrap(), None);
    }

    #[tokio::test]
    async fn unterminated_tail_is_returned_before_eof() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut reader = BufReader::new(reader);

        writer.write_all(b"no newline").await.unwrap();
        drop(writer);

        assert_eq!(
            read_line(&mut reader).await.unwrap(),
            Some("no newline".into())
        );
        assert_eq!(read_line(&mut reader).await.unwrap(), None);
    }

    #[tokio::test]
    async fn overlong_lines_are_split() {
        let (mut writer, reader) = tokio::io::duplex(4096);
        let mut reader = BufReader::new(reader);

        let long = "x".repeat(MAX_LINE_BYTES + 10);
        write_line(&mut writer, &long).await.unwrap();
        drop(writer);

        let first = read_line(&mut reader).await.unwrap().unwrap();
        let second = read_line(&mut reader).await.unwrap().unwrap();
        assert_eq!(first.len(), MAX_LINE_BYTES);
        assert_eq!(second.len(), 10);
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut reader = BufReader::new(reader);

        writer.write_all(b"caf\xff\n").await.unwrap();
        drop(writer);

        assert_eq!(
            read_line(&mut reader).await.unwrap(),
            Some("caf\u{fffd}".into())
        );
    }
}
