//! hashbash: checksum-verified TCP stress-test harness
//!
//! Two roles in one binary:
//! - `hashbash server`: streams pseudo-random payloads and verifies the
//!   client's checksum of each one
//! - `hashbash client`: drives many concurrent sessions and prints `OK` or
//!   `ERROR`, exiting nonzero on failure
//!
//! Configuration via CLI arguments or TOML file.

use hashbash::client;
use hashbash::config::{ClientConfig, Config, Role, ServerConfig};
use hashbash::server::{RandomPool, Server};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let threads = config.threads.unwrap_or_else(default_threads);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(threads)
        .enable_all()
        .build()?;

    match config.role {
        Role::Server(server) => runtime.block_on(run_server(server)),
        Role::Client(client) => {
            let passed = runtime.block_on(run_client(client));
            if passed {
                println!("OK");
                Ok(())
            } else {
                println!("ERROR");
                std::process::exit(1);
            }
        }
    }
}

/// Serve until SIGINT or SIGTERM.
async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        listen = %config.listen,
        pool_size = config.pool_size.get(),
        seeded = config.seed.is_some(),
        max_connections = ?config.max_connections,
        "Starting hashbash server"
    );

    info!("Filling random data");
    let pool = RandomPool::generate(config.pool_size, config.seed);
    info!("Done, ready to serve");

    let server = Server::bind(&config, pool)?;
    server.run_until(shutdown_signal()).await?;
    Ok(())
}

/// Run the workload; false on a failed verdict or a fatal error.
async fn run_client(config: ClientConfig) -> bool {
    info!(
        target_addr = %config.target,
        connections = config.connections,
        parallel = config.parallel,
        max_request_size = config.max_request_size,
        small_request_size = config.small_request_size,
        large_ratio = config.large_ratio,
        "Starting hashbash client"
    );

    match client::run(config).await {
        Ok(report) => report.success,
        Err(e) => {
            error!(error = %e, "Run aborted");
            false
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn default_threads() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cpus / 2).max(1)
}
