//! Core request-processing pipeline for the relay RPC framework.
//!
//! A relay server accepts a connection, reads one framed request, routes it
//! to a registered handler, drives the handler through its lifecycle, and
//! writes exactly one framed response before closing its write side. This
//! crate owns every stage of that pipeline:
//!
//! - [`registry`]: the explicit name→handler table built at startup.
//! - [`router`]: service-name routing, validated once at boot.
//! - [`handler`]: the handler trait, lifecycle hooks, and the non-local
//!   [`halt`](handler::halt) exit.
//! - [`runner`]: stage sequencing for one request.
//! - [`classify`]: the error-classification chain that guarantees a
//!   response for every failure.
//! - [`worker`]: the per-connection worker owning one accepted socket.
//! - [`listener`]: the accept loop with graceful stop and immediate halt.
//! - [`config`]: the immutable snapshot shared by all workers.
//!
//! Workers run concurrently and independently, sharing only the read-only
//! [`ServerConfig`] snapshot; there are no locks in the request path.

pub mod classify;
pub mod config;
mod error;
pub mod handler;
pub mod listener;
pub mod registry;
pub mod router;
pub mod runner;
pub mod worker;

pub use classify::{ErrorHook, Verdict, classify};
pub use config::{DEFAULT_READ_TIMEOUT, ServerConfig, ServerConfigBuilder};
pub use error::WorkerError;
pub use handler::{Exit, Halt, Handler, HandlerContext, HandlerResult, halt};
pub use listener::{Endpoint, ListenerControl, ListenerError, ListenerHandle, SocketListener};
pub use registry::{HandlerFactory, HandlerRegistry, Hook, HookSet};
pub use router::{Route, Router, RouterError};
pub use runner::Runner;
pub use worker::{ConnectionStream, ConnectionWorker};
