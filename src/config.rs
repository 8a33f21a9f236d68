//! Configuration module for hashbash.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use std::net::{SocketAddr, ToSocketAddrs};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use crate::server::DEFAULT_POOL_SIZE;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "hashbash")]
#[command(author = "hashbash authors")]
#[command(version = "0.1.0")]
#[command(about = "Checksum-verified TCP stress-test harness", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Runtime worker threads (defaults to half the CPU cores)
    #[arg(long, global = true)]
    pub threads: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve checksummed payloads
    Server(ServerArgs),
    /// Drive concurrent sessions against a server
    Client(ClientArgs),
}

#[derive(Args, Debug)]
pub struct ServerArgs {
    /// Address to bind to (e.g., 0.0.0.0:4000)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Port to accept connections on (overrides the port of --listen)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Size of the random payload pool in bytes
    #[arg(long)]
    pub pool_size: Option<usize>,

    /// Seed for the payload pool (random when omitted)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Listen backlog
    #[arg(long)]
    pub backlog: Option<u32>,

    /// Maximum simultaneous sessions (unbounded when omitted)
    #[arg(long)]
    pub max_connections: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ClientArgs {
    /// Server address (e.g., 127.0.0.1:4000)
    #[arg(short, long)]
    pub target: Option<String>,

    /// Port to connect to (overrides the port of --target)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Connections each worker makes
    #[arg(short = 'n', long)]
    pub connections: Option<usize>,

    /// Number of parallel workers
    #[arg(short = 'j', long)]
    pub parallel: Option<usize>,

    /// Request size ceiling for large-mode workers (exclusive)
    #[arg(long)]
    pub max_request_size: Option<u64>,

    /// Request size ceiling for small-mode workers (exclusive)
    #[arg(long)]
    pub small_request_size: Option<u64>,

    /// Fraction of workers in large mode (0.0 - 1.0)
    #[arg(long)]
    pub large_ratio: Option<f64>,

    /// Per-cycle timeout in milliseconds (none when omitted)
    #[arg(long)]
    pub io_timeout_ms: Option<u64>,

    /// Progress log interval in milliseconds (0 disables)
    #[arg(long)]
    pub progress_interval_ms: Option<u64>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub runtime: RuntimeSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    pub seed: Option<u64>,
    #[serde(default = "default_backlog")]
    pub backlog: u32,
    pub max_connections: Option<usize>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            pool_size: default_pool_size(),
            seed: None,
            backlog: default_backlog(),
            max_connections: None,
        }
    }
}

/// Client-related configuration
#[derive(Debug, Deserialize)]
pub struct ClientSection {
    #[serde(default = "default_target")]
    pub target: String,
    #[serde(default = "default_connections")]
    pub connections: usize,
    #[serde(default = "default_parallel")]
    pub parallel: usize,
    #[serde(default = "default_max_request_size")]
    pub max_request_size: u64,
    #[serde(default = "default_small_request_size")]
    pub small_request_size: u64,
    #[serde(default = "default_large_ratio")]
    pub large_ratio: f64,
    pub io_timeout_ms: Option<u64>,
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            target: default_target(),
            connections: default_connections(),
            parallel: default_parallel(),
            max_request_size: default_max_request_size(),
            small_request_size: default_small_request_size(),
            large_ratio: default_large_ratio(),
            io_timeout_ms: None,
            progress_interval_ms: default_progress_interval_ms(),
        }
    }
}

/// Runtime configuration
#[derive(Debug, Deserialize, Default)]
pub struct RuntimeSection {
    pub threads: Option<usize>,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:4000".to_string()
}

fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

fn default_backlog() -> u32 {
    1024
}

fn default_target() -> String {
    "127.0.0.1:4000".to_string()
}

fn default_connections() -> usize {
    1000
}

fn default_parallel() -> usize {
    30
}

fn default_max_request_size() -> u64 {
    512 * 1024 // 512 KiB
}

fn default_small_request_size() -> u64 {
    128
}

fn default_large_ratio() -> f64 {
    0.5
}

fn default_progress_interval_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Resolved server settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub pool_size: NonZeroUsize,
    pub seed: Option<u64>,
    pub backlog: u32,
    pub max_connections: Option<usize>,
}

/// Resolved client settings
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub target: SocketAddr,
    /// Sequential cycles per worker.
    pub connections: usize,
    /// Number of concurrent workers.
    pub parallel: usize,
    pub max_request_size: u64,
    pub small_request_size: u64,
    pub large_ratio: f64,
    pub io_timeout: Option<Duration>,
    pub progress_interval: Option<Duration>,
}

impl ClientConfig {
    /// Client settings with built-in defaults, aimed at `target`.
    pub fn new(target: SocketAddr) -> Self {
        Self {
            target,
            connections: default_connections(),
            parallel: default_parallel(),
            max_request_size: default_max_request_size(),
            small_request_size: default_small_request_size(),
            large_ratio: default_large_ratio(),
            io_timeout: None,
            progress_interval: None,
        }
    }

    /// Check the invariants workers rely on: at least one worker, nonzero
    /// size ceilings and a `large_ratio` within `[0, 1]`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parallel == 0 {
            return Err(ConfigError::Invalid("parallel must be at least 1".into()));
        }

        if self.max_request_size == 0 || self.small_request_size == 0 {
            return Err(ConfigError::Invalid(
                "request size ceilings must be at least 1".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.large_ratio) {
            return Err(ConfigError::Invalid(format!(
                "large_ratio must be between 0 and 1, got {}",
                self.large_ratio
            )));
        }

        Ok(())
    }
}

/// Which side of the exchange this process runs.
#[derive(Debug, Clone)]
pub enum Role {
    Server(ServerConfig),
    Client(ClientConfig),
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub role: Role,
    pub threads: Option<usize>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::resolve(cli, toml_config)
    }

    /// Merge CLI args over TOML values and validate the result.
    pub fn resolve(cli: CliArgs, file: TomlConfig) -> Result<Self, ConfigError> {
        let threads = cli.threads.or(file.runtime.threads);
        if threads == Some(0) {
            return Err(ConfigError::Invalid("threads must be at least 1".into()));
        }

        let role = match cli.command {
            Command::Server(args) => Role::Server(resolve_server(args, file.server)?),
            Command::Client(args) => Role::Client(resolve_client(args, file.client)?),
        };

        Ok(Config {
            role,
            threads,
            log_level: cli.log_level.unwrap_or(file.logging.level),
        })
    }
}

fn resolve_server(args: ServerArgs, file: ServerSection) -> Result<ServerConfig, ConfigError> {
    let listen = resolve_addr(&args.listen.unwrap_or(file.listen), args.port)?;

    let pool_size = NonZeroUsize::new(args.pool_size.unwrap_or(file.pool_size))
        .ok_or_else(|| ConfigError::Invalid("pool_size must be at least 1".into()))?;

    let max_connections = args.max_connections.or(file.max_connections);
    if max_connections == Some(0) {
        return Err(ConfigError::Invalid(
            "max_connections must be at least 1".into(),
        ));
    }

    Ok(ServerConfig {
        listen,
        pool_size,
        seed: args.seed.or(file.seed),
        backlog: args.backlog.unwrap_or(file.backlog),
        max_connections,
    })
}

fn resolve_client(args: ClientArgs, file: ClientSection) -> Result<ClientConfig, ConfigError> {
    let target = resolve_addr(&args.target.unwrap_or(file.target), args.port)?;

    let io_timeout = args
        .io_timeout_ms
        .or(file.io_timeout_ms)
        .map(Duration::from_millis);
    let progress_interval = match args
        .progress_interval_ms
        .unwrap_or(file.progress_interval_ms)
    {
        0 => None,
        ms => Some(Duration::from_millis(ms)),
    };

    let config = ClientConfig {
        target,
        connections: args.connections.unwrap_or(file.connections),
        parallel: args.parallel.unwrap_or(file.parallel),
        max_request_size: args.max_request_size.unwrap_or(file.max_request_size),
        small_request_size: args.small_request_size.unwrap_or(file.small_request_size),
        large_ratio: args.large_ratio.unwrap_or(file.large_ratio),
        io_timeout,
        progress_interval,
    };
    config.validate()?;

    Ok(config)
}

/// Resolve `addr` to its first socket address, replacing the port if given.
fn resolve_addr(addr: &str, port: Option<u16>) -> Result<SocketAddr, ConfigError> {
    let mut resolved = addr
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| ConfigError::InvalidAddress(addr.to_string()))?;

    if let Some(port) = port {
        resolved.set_port(port);
    }
    Ok(resolved)
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {1}", path = .0.display())]
    FileRead(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse config file '{path}': {1}", path = .0.display())]
    TomlParse(PathBuf, #[source] toml::de::Error),

    #[error("Invalid address '{0}'")]
    InvalidAddress(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
