//! TCP server streaming checksummed payloads.
//!
//! Accepts connections and runs one session task per connection. Sessions
//! share nothing but the read-only [`RandomPool`].

pub mod pool;
pub mod session;

pub use pool::{RandomPool, DEFAULT_POOL_SIZE};
pub use session::{handle_session, SessionOutcome};

use crate::config::ServerConfig;
use crate::error::ProtocolError;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, trace, warn};

/// Server instance
pub struct Server {
    listener: TcpListener,
    pool: RandomPool,
    connection_limit: Option<Arc<Semaphore>>,
}

impl Server {
    /// Bind the listener. Must be called from within a tokio runtime.
    pub fn bind(config: &ServerConfig, pool: RandomPool) -> io::Result<Self> {
        let listener = create_listener(config.listen, config.backlog)?;
        let listener = TcpListener::from_std(listener)?;

        Ok(Server {
            listener,
            pool,
            connection_limit: config
                .max_connections
                .map(|limit| Arc::new(Semaphore::new(limit))),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` resolves.
    ///
    /// Sessions still running at that point are abandoned, not drained.
    pub async fn run_until<F>(self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = self.local_addr()?;
        info!(address = %addr, pool_size = self.pool.len(), "Server listening");

        tokio::pin!(shutdown);

        loop {
            let accepted = tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, no longer accepting connections");
                    return Ok(());
                }
                accepted = self.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer, permit)) => {
                    trace!(peer = %peer, "New connection");

                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
                    }

                    let pool = self.pool.clone();
                    tokio::spawn(async move {
                        run_session(stream, peer, &pool).await;
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    /// Accept connections until the process is stopped.
    pub async fn run(self) -> io::Result<()> {
        self.run_until(std::future::pending()).await
    }

    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr, Option<OwnedSemaphorePermit>)> {
        // Wait for a connection slot
        let permit = match &self.connection_limit {
            Some(limit) => Some(
                Arc::clone(limit)
                    .acquire_owned()
                    .await
                    .map_err(io::Error::other)?,
            ),
            None => None,
        };

        let (stream, peer) = self.listener.accept().await?;
        Ok((stream, peer, permit))
    }
}

async fn run_session(stream: TcpStream, peer: SocketAddr, pool: &RandomPool) {
    match handle_session(stream, pool).await {
        Ok(outcome) if outcome.verdict.is_ok() => {
            trace!(peer = %peer, requested = outcome.requested, "Session verified");
        }
        Ok(outcome) => {
            debug!(peer = %peer, requested = outcome.requested, "Session failed verification");
        }
        Err(ProtocolError::Closed) => {
            trace!(peer = %peer, "Connection closed before request");
        }
        Err(e) => {
            warn!(peer = %peer, error = %e, "Session aborted");
        }
    }
}

fn create_listener(addr: SocketAddr, backlog: u32) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog.min(i32::MAX as u32) as i32)?;

    Ok(socket.into())
}
