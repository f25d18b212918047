//! Error classification: turning worker errors into responses.
//!
//! Classification guarantees a response for every failure. Configured hooks
//! run first, in order, each seeing the current error; the last hook that
//! produces a verdict wins. A hook that itself fails replaces the error
//! being classified, and iteration continues so later hooks can still rule
//! on the replacement. When no hook decides, a static table maps the error
//! kind to a status.
//!
//! Halts never pass through here; they are responses already.

use relay_wire::{Request, Response, Status, WireError};

use crate::config::ServerConfig;
use crate::error::WorkerError;
use crate::router::RouterError;

/// Fallback message for unclassified failures.
pub const UNEXPECTED_ERROR_MESSAGE: &str = "An unexpected error occurred.";

/// Message for connections that closed before sending a request.
pub const UNREADABLE_REQUEST_MESSAGE: &str = "Couldn't read request.";

/// What an error hook decided about an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Use this response verbatim.
    Response(Response),
    /// Wrap this status into a minimal response.
    Status(Status),
}

impl From<Response> for Verdict {
    fn from(response: Response) -> Self {
        Self::Response(response)
    }
}

impl From<Status> for Verdict {
    fn from(status: Status) -> Self {
        Self::Status(status)
    }
}

impl From<u32> for Verdict {
    fn from(code: u32) -> Self {
        Self::Status(Status::new(code))
    }
}

/// A configured error-classification hook.
///
/// Receives the error being classified, the configuration snapshot, and the
/// request when one was decoded. Returning `Ok(None)` abstains; returning an
/// `Err` replaces the error under classification.
pub type ErrorHook = Box<
    dyn Fn(&WorkerError, &ServerConfig, Option<&Request>) -> Result<Option<Verdict>, anyhow::Error>
        + Send
        + Sync,
>;

/// Classifies an error into the response the client will receive.
///
/// Returns the response together with the error that was ultimately
/// classified, which differs from the input when a hook failed and replaced
/// it; the caller logs the returned error.
pub fn classify(
    error: WorkerError,
    config: &ServerConfig,
    request: Option<&Request>,
) -> (Response, WorkerError) {
    let mut current = error;
    let mut verdict = None;
    for hook in config.error_hooks() {
        match hook(&current, config, request) {
            Ok(Some(result)) => verdict = Some(result),
            Ok(None) => {}
            Err(replacement) => current = WorkerError::Hook(replacement),
        }
    }

    let response = match verdict {
        Some(Verdict::Response(response)) => response,
        Some(Verdict::Status(status)) => Response::from_status(status),
        None => fallback(&current, config),
    };
    (response, current)
}

/// Static classification table applied when no hook produces a verdict.
fn fallback(error: &WorkerError, config: &ServerConfig) -> Response {
    match error {
        WorkerError::Wire(WireError::Timeout) => Response::from_status(Status::timeout()),
        WorkerError::Wire(wire) => match wire {
            // Encoding failures are server-side faults, not client ones.
            WireError::Io(_) | WireError::Unencodable { .. } => unexpected(),
            _ => Response::from_status(Status::with_message(400, wire.to_string())),
        },
        WorkerError::EmptyConnection => {
            if config.receives_keep_alive() {
                // Keep-alive probe: not an error. The worker normally skips
                // classification for this case and writes nothing.
                Response::from_status(Status::success())
            } else {
                Response::from_status(Status::with_message(400, UNREADABLE_REQUEST_MESSAGE))
            }
        }
        WorkerError::Routing(RouterError::NotFound { .. }) => {
            Response::from_status(Status::not_found())
        }
        WorkerError::Routing(_)
        | WorkerError::Handler(_)
        | WorkerError::Hook(_)
        | WorkerError::Write(_)
        | WorkerError::Setup(_) => unexpected(),
    }
}

fn unexpected() -> Response {
    Response::from_status(Status::with_message(500, UNEXPECTED_ERROR_MESSAGE))
}
