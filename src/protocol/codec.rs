//! Line framing and verdict encoding.

use crate::error::ProtocolError;
use crate::protocol::Checksum;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Longest line either peer will buffer, excluding the newline.
///
/// A `u64` size is at most 20 digits and a checksum exactly 16. This bounds
/// memory per session rather than parsing: a size line padded past the limit
/// (leading zeros, say) is refused even though its value would parse. A
/// longer checksum line can never match and is answered with `FAIL`.
pub const MAX_LINE_LENGTH: usize = 64;

/// Size of the verdict on the wire.
pub const VERDICT_LEN: usize = 4;

/// Outcome of the checksum comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Ok,
    Fail,
}

impl Verdict {
    pub fn from_match(matched: bool) -> Self {
        if matched {
            Verdict::Ok
        } else {
            Verdict::Fail
        }
    }

    pub fn as_bytes(&self) -> &'static [u8; VERDICT_LEN] {
        match self {
            Verdict::Ok => b"OKOK",
            Verdict::Fail => b"FAIL",
        }
    }

    /// Decode a verdict; anything other than the two known values is `None`.
    pub fn from_bytes(bytes: &[u8; VERDICT_LEN]) -> Option<Self> {
        match bytes {
            b"OKOK" => Some(Verdict::Ok),
            b"FAIL" => Some(Verdict::Fail),
            _ => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Verdict::Ok)
    }
}

/// Format the request line for `size` payload bytes.
pub fn encode_size_line(size: u64) -> String {
    format!("{size}\n")
}

/// Format the checksum line sent after the payload.
pub fn encode_checksum_line(checksum: &Checksum) -> String {
    let mut line = checksum.to_hex();
    line.push('\n');
    line
}

/// Parse a size line (without its newline).
///
/// Accepts ASCII decimal digits with an optional leading `+`. Anything
/// else, including a trailing `\r`, is malformed.
pub fn parse_size_line(line: &[u8]) -> Result<u64, ProtocolError> {
    let invalid = || ProtocolError::InvalidSize(String::from_utf8_lossy(line).into_owned());

    let digits = line.strip_prefix(b"+").unwrap_or(line);
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(invalid());
    }

    // Only ASCII digits remain, so this is valid UTF-8.
    let text = std::str::from_utf8(digits).map_err(|_| invalid())?;
    text.parse().map_err(|_| invalid())
}

/// Read one `\n`-terminated line of at most `limit` bytes.
///
/// Returns the line without its terminator.
pub async fn read_line<R>(reader: &mut R, limit: usize) -> Result<Vec<u8>, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::with_capacity(limit.min(MAX_LINE_LENGTH) + 1);
    let n = (&mut *reader)
        .take(limit as u64 + 1)
        .read_until(b'\n', &mut line)
        .await?;

    if n == 0 {
        return Err(ProtocolError::Closed);
    }

    if line.last() == Some(&b'\n') {
        line.pop();
        return Ok(line);
    }

    if line.len() > limit {
        Err(ProtocolError::LineTooLong { limit })
    } else {
        Err(ProtocolError::UnexpectedEof)
    }
}

/// Discard input up to and including the next `\n`, without buffering it.
pub async fn skip_line<R>(reader: &mut R) -> Result<(), ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let buf = reader.fill_buf().await?;
        if buf.is_empty() {
            return Err(ProtocolError::UnexpectedEof);
        }

        match buf.iter().position(|&b| b == b'\n') {
            Some(end) => {
                reader.consume(end + 1);
                return Ok(());
            }
            None => {
                let n = buf.len();
                reader.consume(n);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size_line(b"0").unwrap(), 0);
        assert_eq!(parse_size_line(b"524287").unwrap(), 524_287);
        assert_eq!(parse_size_line(b"+12").unwrap(), 12);
        assert_eq!(
            parse_size_line(b"18446744073709551615").unwrap(),
            u64::MAX
        );
    }

    #[test]
    fn test_parse_size_malformed() {
        let cases: [&[u8]; 9] = [
            b"",
            b"+",
            b"-1",
            b"12a",
            b" 12",
            b"12\r",
            b"0x10",
            b"18446744073709551616",
            b"\xff\xfe",
        ];
        for line in cases {
            match parse_size_line(line) {
                Err(ProtocolError::InvalidSize(_)) => {}
                other => panic!("unexpected for {:?}: {:?}", line, other),
            }
        }
    }

    #[test]
    fn test_encode_lines() {
        assert_eq!(encode_size_line(0), "0\n");
        assert_eq!(encode_size_line(131_072), "131072\n");

        let line = encode_checksum_line(&Checksum::new());
        assert_eq!(line, "ef46db3751d8e999\n");
    }

    #[test]
    fn test_verdict_bytes() {
        assert_eq!(Verdict::Ok.as_bytes(), b"OKOK");
        assert_eq!(Verdict::Fail.as_bytes(), b"FAIL");
        assert_eq!(Verdict::from_bytes(b"OKOK"), Some(Verdict::Ok));
        assert_eq!(Verdict::from_bytes(b"FAIL"), Some(Verdict::Fail));
        assert_eq!(Verdict::from_bytes(b"okok"), None);
        assert_eq!(Verdict::from_match(true), Verdict::Ok);
        assert!(!Verdict::from_match(false).is_ok());
    }

    #[tokio::test]
    async fn test_read_line() {
        let mut reader = BufReader::new(&b"42\nef46db3751d8e999\n"[..]);

        assert_eq!(read_line(&mut reader, MAX_LINE_LENGTH).await.unwrap(), b"42");
        assert_eq!(
            read_line(&mut reader, MAX_LINE_LENGTH).await.unwrap(),
            b"ef46db3751d8e999"
        );
        assert!(matches!(
            read_line(&mut reader, MAX_LINE_LENGTH).await,
            Err(ProtocolError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_read_line_partial() {
        let mut reader = BufReader::new(&b"123"[..]);
        assert!(matches!(
            read_line(&mut reader, MAX_LINE_LENGTH).await,
            Err(ProtocolError::UnexpectedEof)
        ));
    }

    #[tokio::test]
    async fn test_read_line_too_long() {
        let input = vec![b'9'; 100];
        let mut reader = BufReader::new(&input[..]);
        assert!(matches!(
            read_line(&mut reader, 16).await,
            Err(ProtocolError::LineTooLong { limit: 16 })
        ));

        // Exactly at the limit is fine.
        let mut reader = BufReader::new(&b"1234\n"[..]);
        assert_eq!(read_line(&mut reader, 4).await.unwrap(), b"1234");
    }

    #[tokio::test]
    async fn test_skip_rest_of_long_line() {
        let mut input = vec![b'a'; 5000];
        input.extend_from_slice(b"\n7\n");
        let mut reader = BufReader::with_capacity(256, &input[..]);

        assert!(matches!(
            read_line(&mut reader, MAX_LINE_LENGTH).await,
            Err(ProtocolError::LineTooLong { .. })
        ));
        skip_line(&mut reader).await.unwrap();
        assert_eq!(read_line(&mut reader, MAX_LINE_LENGTH).await.unwrap(), b"7");

        assert!(matches!(
            skip_line(&mut reader).await,
            Err(ProtocolError::UnexpectedEof)
        ));
    }

    #[tokio::test]
    async fn test_read_line_does_not_overread() {
        let mut reader = BufReader::new(&b"5\nhello"[..]);
        assert_eq!(read_line(&mut reader, MAX_LINE_LENGTH).await.unwrap(), b"5");

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"hello");
    }
}
