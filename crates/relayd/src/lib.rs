//! The relay daemon: composition root for the relay RPC framework.
//!
//! `relayd` wires the pieces the framework crates provide: it parses the
//! command line, installs telemetry, registers the built-in services,
//! validates the routing table, binds the configured endpoint, and serves
//! until a signal requests a stop.

pub mod cli;
pub mod process;
pub mod services;
pub mod telemetry;

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use relay_core::{ListenerError, RouterError, ServerConfig, SocketListener};

use crate::cli::Args;
use crate::process::{PidFile, ProcessError};
use crate::telemetry::TelemetryError;

/// Tracing target for daemon startup and shutdown.
const DAEMON_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::daemon");

/// Errors that abort daemon startup.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Telemetry could not be initialised.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    /// The routing table failed boot-time validation.
    #[error("invalid routing table: {0}")]
    Routes(#[from] RouterError),
    /// The PID file or signal handlers could not be set up.
    #[error(transparent)]
    Process(#[from] ProcessError),
    /// The endpoint could not be bound or served.
    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// Runs the daemon until it is stopped by a signal.
///
/// # Errors
///
/// Returns a [`LaunchError`] when any startup step fails; once serving, the
/// only error paths are listener teardown failures surfaced by `join`.
pub fn run(args: &Args) -> Result<(), LaunchError> {
    telemetry::initialise(&args.log_filter)?;

    let mut registry = relay_core::HandlerRegistry::new();
    services::register(&mut registry);

    let config = ServerConfig::builder(services::router())
        .verbose_logging(args.verbose)
        .receives_keep_alive(args.keep_alive)
        .debug(args.debug)
        .read_timeout(args.read_timeout())
        .build(&registry)?;

    let _pid_file = args
        .pid_file
        .as_deref()
        .map(PidFile::write)
        .transpose()?;

    let endpoint = args.endpoint();
    let listener = SocketListener::bind(&endpoint)?;
    if let Some(addr) = listener.local_addr() {
        info!(target: DAEMON_TARGET, %addr, "listening");
    } else {
        info!(target: DAEMON_TARGET, ?endpoint, "listening");
    }

    let handle = listener.serve(Arc::new(config), Vec::new())?;
    process::install_signal_handlers(handle.control())?;

    handle.join()?;
    info!(target: DAEMON_TARGET, "stopped");
    Ok(())
}
