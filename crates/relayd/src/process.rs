//! Process management: PID file and signal wiring.
//!
//! The daemon's stop surface is driven entirely from the outside: SIGTERM
//! and SIGINT request a graceful stop (finish in-flight requests), SIGQUIT
//! an immediate halt. The PID file exists for the lifetime of the process
//! and is removed when the guard drops.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use relay_core::ListenerControl;

/// Tracing target for process management.
const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");

/// Errors surfaced while managing the process environment.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Writing the PID file failed.
    #[error("failed to write PID file {path}: {source}")]
    PidFile {
        /// Path that could not be written.
        path: String,
        /// Underlying filesystem error.
        #[source]
        source: io::Error,
    },
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Signals {
        /// Underlying error from the signal layer.
        #[source]
        source: io::Error,
    },
}

/// Guard that owns the PID file for the process lifetime.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Writes the current process ID to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::PidFile`] when the file cannot be created or
    /// written.
    pub fn write(path: &Path) -> Result<Self, ProcessError> {
        let write_pid = |path: &Path| -> io::Result<()> {
            let mut file = fs::File::create(path)?;
            writeln!(file, "{}", std::process::id())?;
            Ok(())
        };
        write_pid(path).map_err(|source| ProcessError::PidFile {
            path: path.display().to_string(),
            source,
        })?;
        info!(target: PROCESS_TARGET, path = %path.display(), "PID file written");
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(error) = fs::remove_file(&self.path)
            && error.kind() != io::ErrorKind::NotFound
        {
            warn!(
                target: PROCESS_TARGET,
                error = %error,
                path = %self.path.display(),
                "failed to remove PID file"
            );
        }
    }
}

/// Installs signal handlers driving the listener's stop surface.
///
/// Runs a background thread for the life of the process; it is never
/// joined because signal iteration only ends at process exit.
///
/// # Errors
///
/// Returns [`ProcessError::Signals`] when handler registration fails.
#[cfg(unix)]
pub fn install_signal_handlers(control: ListenerControl) -> Result<(), ProcessError> {
    use signal_hook::consts::{SIGINT, SIGQUIT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGTERM, SIGINT, SIGQUIT])
        .map_err(|source| ProcessError::Signals { source })?;
    std::thread::spawn(move || {
        for signal in signals.forever() {
            match signal {
                SIGQUIT => {
                    info!(target: PROCESS_TARGET, signal, "halting immediately");
                    control.halt();
                    break;
                }
                _ => {
                    info!(target: PROCESS_TARGET, signal, "stopping gracefully");
                    control.stop();
                    break;
                }
            }
        }
    });
    Ok(())
}

/// Signal handling is a no-op on non-unix targets.
#[cfg(not(unix))]
pub fn install_signal_handlers(_control: ListenerControl) -> Result<(), ProcessError> {
    Ok(())
}
