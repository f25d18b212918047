//! Service handler lifecycle contract.
//!
//! A handler instance lives for exactly one request and is driven through
//! `init` then `run`, bracketed by the hooks registered on its
//! [`HookSet`](crate::registry::HookSet). Any stage can end the request early
//! with a [`halt`], which unwinds out of the remaining stages and becomes the
//! final response without touching the error classifier.

use relay_wire::{Request, Status, Value};

use crate::config::ServerConfig;

/// Per-request view handed to every lifecycle stage.
///
/// Borrows the request and the immutable configuration snapshot; handler
/// state itself lives in the handler instance's own fields.
pub struct HandlerContext<'a> {
    request: &'a Request,
    config: &'a ServerConfig,
}

impl<'a> HandlerContext<'a> {
    /// Creates a context for one request.
    #[must_use]
    pub fn new(request: &'a Request, config: &'a ServerConfig) -> Self {
        Self { request, config }
    }

    /// The request being processed.
    #[must_use]
    pub fn request(&self) -> &Request {
        self.request
    }

    /// The request's params document.
    #[must_use]
    pub fn params(&self) -> &Value {
        &self.request.params
    }

    /// The shared server configuration snapshot.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        self.config
    }
}

/// Payload of a halted request: the response the handler chose.
#[derive(Debug, Clone, PartialEq)]
pub struct Halt {
    /// Status for the final response.
    pub status: Status,
    /// Result document for the final response.
    pub data: Value,
}

/// Early termination of a lifecycle stage.
///
/// `Halt` is not a failure: it is the handler's normal way of producing a
/// non-default response and bypasses error classification entirely. `Failed`
/// carries an application error that the connection worker will classify.
#[derive(Debug)]
pub enum Exit {
    /// The stage halted with a chosen response.
    Halt(Halt),
    /// The stage failed with an application error.
    Failed(anyhow::Error),
}

impl Exit {
    /// Wraps an application error, for use with `map_err`.
    pub fn failed(error: impl Into<anyhow::Error>) -> Self {
        Self::Failed(error.into())
    }
}

impl<E> From<E> for Exit
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::Failed(anyhow::Error::new(error))
    }
}

/// Result type for lifecycle stages; `?` propagates both halts and failures.
pub type HandlerResult<T> = Result<T, Exit>;

/// Halts the request with the given status and result data.
///
/// Usable from any stage: `return halt(Status::with_message(728, "custom"),
/// data)`. The remaining stages are skipped and the payload becomes the
/// final response.
pub fn halt<T>(status: impl Into<Status>, data: Value) -> HandlerResult<T> {
    Err(Exit::Halt(Halt {
        status: status.into(),
        data,
    }))
}

/// A service handler: one instance per request.
///
/// Implementations keep per-request state in their own fields; the framework
/// never reuses an instance across requests.
pub trait Handler: Send {
    /// Prepares the handler before `run`. The default does nothing.
    fn init(&mut self, ctx: &mut HandlerContext<'_>) -> HandlerResult<()> {
        let _ = ctx;
        Ok(())
    }

    /// Executes the request and produces the result document.
    ///
    /// A plain return is wrapped as a 200 response; use [`halt`] for any
    /// other status.
    fn run(&mut self, ctx: &mut HandlerContext<'_>) -> HandlerResult<Value>;
}
