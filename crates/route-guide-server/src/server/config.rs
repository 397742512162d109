use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use std::path::PathBuf;

/// Runtime configuration for the `route-guide-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a `.env`
/// file is honored), with defaults matching the reference behavior: a feature
/// every 100ms on port 50051.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "route-guide-server",
    version,
    about = "A gRPC service that streams a static feature dataset at a fixed pace"
)]
pub struct CliArgs {
    /// Host or IP address to listen on.
    ///
    /// Environment variable: `ROUTE_GUIDE_HOST`
    #[arg(long, env = "ROUTE_GUIDE_HOST", default_value_t = String::from("127.0.0.1"))]
    pub host: String,

    /// The server port.
    ///
    /// Environment variable: `ROUTE_GUIDE_PORT`
    #[arg(long, env = "ROUTE_GUIDE_PORT", default_value_t = 50051)]
    pub port: u16,

    /// Path to a JSON feature snapshot. When omitted, the dataset compiled
    /// into the binary is served.
    ///
    /// The file must contain an array of objects shaped like
    /// `{"name": "...", "location": {"latitude": 407838351, "longitude": -746143763}}`.
    /// A malformed or empty snapshot prevents the server from starting.
    ///
    /// Environment variable: `ROUTE_GUIDE_DB`
    #[arg(long, env = "ROUTE_GUIDE_DB")]
    pub db_path: Option<PathBuf>,

    /// Delay between two consecutive features on a stream, in milliseconds.
    ///
    /// Environment variable: `ROUTE_GUIDE_SEND_INTERVAL_MS`
    #[arg(long, env = "ROUTE_GUIDE_SEND_INTERVAL_MS", default_value_t = 100)]
    pub send_interval_ms: u64,

    /// Number of features that may sit in the response buffer before a send
    /// has to wait for the client to read.
    ///
    /// Environment variable: `ROUTE_GUIDE_STREAM_BUFFER_SIZE`
    #[arg(long, env = "ROUTE_GUIDE_STREAM_BUFFER_SIZE", default_value_t = 1)]
    pub stream_buffer_size: usize,

    /// How long a single send may wait for buffer capacity before the stream
    /// is failed as stalled, in milliseconds. `0` waits forever.
    ///
    /// Environment variable: `ROUTE_GUIDE_SEND_TIMEOUT_MS`
    #[arg(long, env = "ROUTE_GUIDE_SEND_TIMEOUT_MS", default_value_t = 30_000)]
    pub send_timeout_ms: u64,

    /// Seconds to let in-flight streams drain on shutdown before they are
    /// cancelled.
    ///
    /// Environment variable: `ROUTE_GUIDE_SHUTDOWN_TIMEOUT`
    #[arg(long, env = "ROUTE_GUIDE_SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub db_path: Option<PathBuf>,
    pub send_interval: Duration,
    pub stream_buffer_size: usize,
    pub send_timeout: Option<Duration>,
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_addr: String::from("127.0.0.1:50051"),
            db_path: None,
            send_interval: Duration::from_millis(100),
            stream_buffer_size: 1,
            send_timeout: Some(Duration::from_secs(30)),
            shutdown_timeout: Duration::from_secs(3),
        }
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.host.is_empty() {
            bail!("ROUTE_GUIDE_HOST must not be empty");
        }

        if args.port == 0 {
            bail!("ROUTE_GUIDE_PORT must be greater than 0");
        }

        // `tokio::sync::mpsc::channel` panics on a zero capacity.
        if args.stream_buffer_size == 0 {
            bail!("ROUTE_GUIDE_STREAM_BUFFER_SIZE must be greater than 0");
        }

        let server_addr = if args.host.contains(':') {
            format!("[{}]:{}", args.host, args.port)
        } else {
            format!("{}:{}", args.host, args.port)
        };

        let send_timeout =
            (args.send_timeout_ms > 0).then(|| Duration::from_millis(args.send_timeout_ms));

        Ok(Self {
            server_addr,
            db_path: args.db_path,
            send_interval: Duration::from_millis(args.send_interval_ms),
            stream_buffer_size: args.stream_buffer_size,
            send_timeout,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
        })
    }
}
