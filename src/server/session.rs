//! Per-connection session handler.

use crate::error::ProtocolError;
use crate::protocol::{
    parse_size_line, read_line, skip_line, Checksum, Verdict, MAX_LINE_LENGTH,
};
use crate::server::pool::RandomPool;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::trace;

/// What a completed session did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOutcome {
    /// Payload bytes requested and sent.
    pub requested: u64,
    pub verdict: Verdict,
}

/// Handle a single client connection.
///
/// Protocol:
/// - Read: `<size>\n`
/// - Write: `size` bytes from the pool, wrapping at its end
/// - Read: `<checksum hex>\n`
/// - Write: `OKOK` or `FAIL`
///
/// The checksum covers exactly the bytes written, in order. Any I/O or parse
/// error ends this session only.
pub async fn handle_session<S>(stream: S, pool: &RandomPool) -> Result<SessionOutcome, ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut stream = BufReader::new(stream);

    let line = read_line(&mut stream, MAX_LINE_LENGTH).await?;
    let requested = parse_size_line(&line)?;
    trace!(requested, "Streaming payload");

    let mut checksum = Checksum::new();
    for chunk in pool.chunks(requested) {
        stream.write_all(chunk).await?;
        checksum.update(chunk);
    }
    stream.flush().await?;

    // The peer already has the payload, so hanging up now is mid-exchange.
    // An overlong claim cannot match; drain it and answer FAIL.
    let claimed = match read_line(&mut stream, MAX_LINE_LENGTH).await {
        Ok(line) => Some(line),
        Err(ProtocolError::LineTooLong { .. }) => {
            skip_line(&mut stream).await?;
            None
        }
        Err(ProtocolError::Closed) => return Err(ProtocolError::UnexpectedEof),
        Err(e) => return Err(e),
    };

    let expected = checksum.to_hex();
    let verdict = Verdict::from_match(claimed.as_deref() == Some(expected.as_bytes()));
    if !verdict.is_ok() {
        let claimed = claimed.as_deref().map(String::from_utf8_lossy);
        trace!(
            expected = %expected,
            claimed = %claimed.as_deref().unwrap_or("<overlong>"),
            "Checksum mismatch"
        );
    }

    stream.write_all(verdict.as_bytes()).await?;
    stream.flush().await?;

    Ok(SessionOutcome { requested, verdict })
}
