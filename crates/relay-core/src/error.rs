//! Worker-level error taxonomy.
//!
//! Everything that can go wrong between accepting a connection and writing
//! its response funnels into [`WorkerError`], which the classifier maps to a
//! response status. Halts are deliberately absent: they are not errors and
//! never reach this type.

use std::io;

use thiserror::Error;

use crate::router::RouterError;
use relay_wire::WireError;

/// Errors surfaced while processing one connection.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Frame or document could not be read or decoded.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// The connection ended before any request bytes arrived.
    #[error("Couldn't read request.")]
    EmptyConnection,

    /// Route lookup or resolution failed.
    #[error(transparent)]
    Routing(#[from] RouterError),

    /// A handler stage failed with an application error.
    #[error("handler failed: {0}")]
    Handler(#[source] anyhow::Error),

    /// An error-classifier hook itself failed; this error replaced the one
    /// being classified.
    #[error("error hook failed: {0}")]
    Hook(#[source] anyhow::Error),

    /// Writing the response failed.
    #[error("failed to write response: {0}")]
    Write(#[source] io::Error),

    /// Setting up the accepted socket failed.
    #[error("connection setup failed: {0}")]
    Setup(#[source] io::Error),
}
