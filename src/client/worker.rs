//! One worker's connection cycles.

use crate::client::WorkerMode;
use crate::config::ClientConfig;
use crate::error::{ClientError, ProtocolError};
use crate::protocol::{encode_checksum_line, encode_size_line, Checksum, Verdict, VERDICT_LEN};
use bytes::BytesMut;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace, warn};

/// Payload read buffer size
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Run one exchange on an open stream and return the server's verdict.
///
/// An unrecognised verdict counts as [`Verdict::Fail`].
pub async fn exchange<S>(stream: &mut S, size: u64) -> Result<Verdict, ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(encode_size_line(size).as_bytes()).await?;
    stream.flush().await?;

    let checksum = receive_payload(stream, size).await?;

    stream
        .write_all(encode_checksum_line(&checksum).as_bytes())
        .await?;
    stream.flush().await?;

    let mut verdict = [0u8; VERDICT_LEN];
    stream
        .read_exact(&mut verdict)
        .await
        .map_err(ProtocolError::from_read)?;

    Ok(Verdict::from_bytes(&verdict).unwrap_or_else(|| {
        warn!(verdict = ?verdict, "Unrecognised verdict");
        Verdict::Fail
    }))
}

/// Read exactly `size` payload bytes, hashing them as they arrive.
async fn receive_payload<R>(reader: &mut R, size: u64) -> Result<Checksum, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut checksum = Checksum::new();
    let mut buffer = BytesMut::with_capacity(READ_BUFFER_SIZE);

    while checksum.len() < size {
        let wanted = (size - checksum.len()).min(READ_BUFFER_SIZE as u64);

        buffer.clear();
        let n = (&mut *reader).take(wanted).read_buf(&mut buffer).await?;
        if n == 0 {
            return Err(ProtocolError::UnexpectedEof);
        }

        checksum.update(&buffer[..n]);
    }

    Ok(checksum)
}

/// Dial `target` and run one exchange requesting `size` bytes.
pub async fn run_cycle(target: SocketAddr, size: u64) -> Result<Verdict, ClientError> {
    let mut stream = TcpStream::connect(target)
        .await
        .map_err(|source| ClientError::Connect {
            addr: target,
            source,
        })?;
    stream.set_nodelay(true).map_err(ProtocolError::from)?;

    Ok(exchange(&mut stream, size).await?)
}

/// Run `config.connections` sequential cycles.
///
/// Returns `Ok(false)` as soon as the server rejects a checksum; any error is
/// fatal for the whole run. `config` must pass [`ClientConfig::validate`].
pub async fn run_worker(
    id: usize,
    config: Arc<ClientConfig>,
    mode: WorkerMode,
    completed: Arc<AtomicU64>,
) -> Result<bool, ClientError> {
    let ceiling = mode.ceiling(&config);
    let mut rng = StdRng::from_entropy();

    debug!(worker = id, ?mode, ceiling, "Worker started");

    for cycle in 0..config.connections {
        let size = rng.gen_range(0..ceiling);

        let verdict = match config.io_timeout {
            Some(limit) => tokio::time::timeout(limit, run_cycle(config.target, size))
                .await
                .map_err(|_| ClientError::Timeout(limit))??,
            None => run_cycle(config.target, size).await?,
        };

        if !verdict.is_ok() {
            warn!(worker = id, cycle, size, "Server rejected checksum");
            return Ok(false);
        }

        trace!(worker = id, cycle, size, "Cycle verified");
        completed.fetch_add(1, Ordering::Relaxed);
    }

    debug!(worker = id, "Worker finished");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_test::io::Builder;

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 256) as u8).collect()
    }

    #[tokio::test]
    async fn test_exchange_ok() {
        let data = payload(10);
        let mut stream = Builder::new()
            .write(b"10\n")
            .read(&data)
            .write(encode_checksum_line(&Checksum::of(&data)).as_bytes())
            .read(b"OKOK")
            .build();

        assert_eq!(exchange(&mut stream, 10).await.unwrap(), Verdict::Ok);
    }

    #[tokio::test]
    async fn test_exchange_payload_in_pieces() {
        let data = payload(200_000);
        let mut builder = Builder::new();
        builder.write(b"200000\n");
        for piece in data.chunks(30_000) {
            builder.read(piece);
        }
        let mut stream = builder
            .write(encode_checksum_line(&Checksum::of(&data)).as_bytes())
            .read(b"OKOK")
            .build();

        assert_eq!(exchange(&mut stream, 200_000).await.unwrap(), Verdict::Ok);
    }

    #[tokio::test]
    async fn test_exchange_zero_size() {
        let mut stream = Builder::new()
            .write(b"0\n")
            .write(b"ef46db3751d8e999\n")
            .read(b"OKOK")
            .build();

        assert_eq!(exchange(&mut stream, 0).await.unwrap(), Verdict::Ok);
    }

    #[tokio::test]
    async fn test_exchange_fail_verdict() {
        let data = payload(4);
        let mut stream = Builder::new()
            .write(b"4\n")
            .read(&data)
            .write(encode_checksum_line(&Checksum::of(&data)).as_bytes())
            .read(b"FAIL")
            .build();

        assert_eq!(exchange(&mut stream, 4).await.unwrap(), Verdict::Fail);
    }

    #[tokio::test]
    async fn test_exchange_unknown_verdict_is_fail() {
        let data = payload(4);
        let mut stream = Builder::new()
            .write(b"4\n")
            .read(&data)
            .write(encode_checksum_line(&Checksum::of(&data)).as_bytes())
            .read(b"WHAT")
            .build();

        assert_eq!(exchange(&mut stream, 4).await.unwrap(), Verdict::Fail);
    }

    #[tokio::test]
    async fn test_exchange_short_payload() {
        let data = payload(5);
        let mut stream = Builder::new().write(b"10\n").read(&data).build();

        assert!(matches!(
            exchange(&mut stream, 10).await,
            Err(ProtocolError::UnexpectedEof)
        ));
    }

    #[tokio::test]
    async fn test_exchange_truncated_verdict() {
        let data = payload(3);
        let mut stream = Builder::new()
            .write(b"3\n")
            .read(&data)
            .write(encode_checksum_line(&Checksum::of(&data)).as_bytes())
            .read(b"OK")
            .build();

        assert!(matches!(
            exchange(&mut stream, 3).await,
            Err(ProtocolError::UnexpectedEof)
        ));
    }

    #[tokio::test]
    async fn test_worker_times_out_on_silent_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Hold the connection open and never answer.
            let (_stream, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
        });

        let mut config = ClientConfig::new(addr);
        config.connections = 3;
        config.io_timeout = Some(Duration::from_millis(50));
        let completed = Arc::new(AtomicU64::new(0));

        let result = run_worker(0, Arc::new(config), WorkerMode::Small, Arc::clone(&completed)).await;
        match result {
            Err(ClientError::Timeout(limit)) => assert_eq!(limit, Duration::from_millis(50)),
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(completed.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_run_cycle_connect_refused() {
        // Grab a free port, then release it so nothing is listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        match run_cycle(addr, 1).await {
            Err(ClientError::Connect { addr: failed, .. }) => assert_eq!(failed, addr),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
