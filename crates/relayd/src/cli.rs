//! Command-line interface for the daemon.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use relay_core::Endpoint;

/// Binary RPC server daemon.
#[derive(Debug, Parser)]
#[command(name = "relayd", version, about)]
pub struct Args {
    /// Host to bind.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to bind; 0 picks a free port.
    #[arg(long, default_value_t = 9292)]
    pub port: u16,

    /// Unix domain socket path to bind instead of TCP.
    #[cfg(unix)]
    #[arg(long)]
    pub socket: Option<PathBuf>,

    /// Read timeout for request frames, in milliseconds.
    #[arg(long = "timeout-ms", default_value_t = 1000)]
    pub timeout_ms: u64,

    /// Treat empty connections as keep-alive probes instead of errors.
    #[arg(long)]
    pub keep_alive: bool,

    /// Log each request as a multi-line detailed trace.
    #[arg(long)]
    pub verbose: bool,

    /// Re-raise classified errors after logging (for test harnesses).
    #[arg(long)]
    pub debug: bool,

    /// Write the daemon PID to this file while running.
    #[arg(long)]
    pub pid_file: Option<PathBuf>,

    /// Tracing filter expression.
    #[arg(long, default_value = "info")]
    pub log_filter: String,
}

impl Args {
    /// The endpoint the daemon should bind.
    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        #[cfg(unix)]
        if let Some(path) = &self.socket {
            return Endpoint::unix(path.clone());
        }
        Endpoint::tcp(self.host.clone(), self.port)
    }

    /// The configured read timeout.
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
