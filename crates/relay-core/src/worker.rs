//! Per-connection request worker.
//!
//! A worker owns exactly one accepted stream for its entire lifetime: it
//! reads one frame, drives the request through routing and the runner, and
//! writes exactly one response — or none at all for a keep-alive probe.
//! Whatever happens, the write half is shut down at the end so the client
//! sees end-of-response, and one [`ProcessedRequest`] record is logged.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use relay_wire::{Request, Response, Status, frame};

use crate::classify::classify;
use crate::config::ServerConfig;
use crate::error::WorkerError;
use crate::runner::Runner;

use std::sync::Arc;

#[cfg(unix)]
use std::os::unix::net::UnixStream;

/// Tracing target for connection workers.
pub(crate) const WORKER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::worker");

/// Stream types a worker can own.
#[derive(Debug)]
pub enum ConnectionStream {
    /// TCP client connection.
    Tcp(TcpStream),
    /// Unix domain socket client connection.
    #[cfg(unix)]
    Unix(UnixStream),
}

impl ConnectionStream {
    /// Applies a read deadline to the underlying socket.
    pub(crate) fn set_read_timeout(&self, timeout: Duration) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.set_read_timeout(Some(timeout)),
            #[cfg(unix)]
            Self::Unix(stream) => stream.set_read_timeout(Some(timeout)),
        }
    }

    /// Closes the write half, signalling end-of-response to the client
    /// without touching the read half.
    pub(crate) fn shutdown_write(&self) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.shutdown(Shutdown::Write),
            #[cfg(unix)]
            Self::Unix(stream) => stream.shutdown(Shutdown::Write),
        }
    }
}

impl Read for ConnectionStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for ConnectionStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            Self::Unix(stream) => stream.flush(),
        }
    }
}

/// Diagnostic record for one worker invocation.
///
/// Constructed fresh per request and discarded after logging; never shared
/// across requests.
#[derive(Debug)]
pub struct ProcessedRequest {
    started: Instant,
    request: Option<Request>,
    handler: Option<String>,
    status: Option<Status>,
    error: Option<String>,
    error_detail: Option<String>,
}

impl ProcessedRequest {
    fn start() -> Self {
        Self {
            started: Instant::now(),
            request: None,
            handler: None,
            status: None,
            error: None,
            error_detail: None,
        }
    }

    fn request(&self) -> Option<&Request> {
        self.request.as_ref()
    }

    fn set_request(&mut self, request: &Request) {
        self.request = Some(request.clone());
    }

    fn set_handler(&mut self, handler: &str) {
        self.handler = Some(handler.to_owned());
    }

    fn set_status(&mut self, status: &Status) {
        self.status = Some(status.clone());
    }

    fn set_error(&mut self, error: &WorkerError) {
        self.error = Some(error.to_string());
        self.error_detail = Some(format!("{error:?}"));
    }

    /// Emits the record: a multi-line trace when verbose, otherwise a
    /// single-line key=value summary.
    fn log(&self, verbose: bool) {
        let time_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let service = self
            .request
            .as_ref()
            .map_or("-", |request| request.service_name.as_str());
        let status = self.status.as_ref().map(|status| status.code);

        if verbose {
            info!(target: WORKER_TARGET, service = %service, "processed request");
            if let Some(request) = &self.request {
                info!(
                    target: WORKER_TARGET,
                    version = %request.service_version,
                    params = ?request.params,
                    "request detail"
                );
            }
            if let Some(handler) = &self.handler {
                info!(target: WORKER_TARGET, handler = %handler, "handler");
            }
            if let Some(status) = &self.status {
                info!(
                    target: WORKER_TARGET,
                    code = status.code,
                    message = ?status.message,
                    "response status"
                );
            }
            if let Some(detail) = &self.error_detail {
                error!(target: WORKER_TARGET, error = %detail, "request failed");
            }
            info!(target: WORKER_TARGET, time_ms, "timing");
        } else {
            info!(
                target: WORKER_TARGET,
                service = %service,
                handler = ?self.handler,
                status = ?status,
                error = ?self.error,
                time_ms,
                "request"
            );
        }
    }
}

/// Handles one accepted connection from read to write-side close.
#[derive(Debug)]
pub struct ConnectionWorker {
    config: Arc<ServerConfig>,
}

impl ConnectionWorker {
    /// Creates a worker sharing the read-only configuration snapshot.
    #[must_use]
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self { config }
    }

    /// Processes the connection: exactly one response is written unless the
    /// connection is a keep-alive probe.
    ///
    /// # Errors
    ///
    /// Returns an error only when the response could not be delivered after
    /// the single reclassified retry, or — in debug mode — the classified
    /// error after it has been logged and answered. Either way the caller
    /// (the listener) just logs it; other connections are unaffected.
    pub fn handle(&self, mut stream: ConnectionStream) -> Result<(), WorkerError> {
        let mut record = ProcessedRequest::start();
        let outcome = self.run_connection(&mut stream, &mut record);
        if let Err(error) = stream.shutdown_write() {
            // The peer may have gone away already; nothing left to signal.
            debug!(target: WORKER_TARGET, error = %error, "write-side shutdown failed");
        }
        record.log(self.config.verbose_logging());

        match outcome {
            Ok(None) => Ok(()),
            Ok(Some(classified)) if self.config.debug() => Err(classified),
            Ok(Some(_)) => Ok(()),
            Err(fatal) => Err(fatal),
        }
    }

    /// Runs the request pipeline and delivers a response.
    ///
    /// `Ok(None)` means success or a keep-alive probe; `Ok(Some(error))`
    /// means a classified error was answered; `Err` means delivery failed
    /// twice and the connection is a lost cause.
    fn run_connection(
        &self,
        stream: &mut ConnectionStream,
        record: &mut ProcessedRequest,
    ) -> Result<Option<WorkerError>, WorkerError> {
        match self.process(stream, record) {
            Ok(Some(response)) => {
                record.set_status(&response.status);
                self.deliver(stream, response, record)?;
                Ok(None)
            }
            Ok(None) => {
                // Keep-alive probe: close without writing anything.
                record.set_status(&Status::success());
                debug!(target: WORKER_TARGET, "keep-alive probe, closing without response");
                Ok(None)
            }
            Err(error) => {
                let (response, surfaced) = classify(error, &self.config, record.request());
                record.set_status(&response.status);
                record.set_error(&surfaced);
                self.deliver(stream, response, record)?;
                Ok(Some(surfaced))
            }
        }
    }

    /// Reads, routes, and runs the request.
    ///
    /// Returns `Ok(None)` for a keep-alive probe (zero bytes read and probes
    /// enabled); every other shortfall is an error for classification.
    fn process(
        &self,
        stream: &mut ConnectionStream,
        record: &mut ProcessedRequest,
    ) -> Result<Option<Response>, WorkerError> {
        stream
            .set_read_timeout(self.config.read_timeout())
            .map_err(WorkerError::Setup)?;

        let body = match frame::read(stream)? {
            Some(body) => body,
            None if self.config.receives_keep_alive() => return Ok(None),
            None => return Err(WorkerError::EmptyConnection),
        };
        let request = Request::from_document(&body)?;
        record.set_request(&request);
        debug!(
            target: WORKER_TARGET,
            service = %request.service_name,
            version = %request.service_version,
            "dispatching request"
        );

        let route = self.config.route_for(&request.service_name)?;
        if let Ok(entry) = route.binding() {
            record.set_handler(entry.name());
        }
        let response = Runner::run(route, &request, &self.config)?;
        Ok(Some(response))
    }

    /// Writes a response, retrying once with a reclassified response when
    /// the first write fails.
    fn deliver(
        &self,
        stream: &mut ConnectionStream,
        response: Response,
        record: &mut ProcessedRequest,
    ) -> Result<(), WorkerError> {
        let Err(write_error) = self.write_response(stream, &response) else {
            return Ok(());
        };
        warn!(
            target: WORKER_TARGET,
            error = %write_error,
            "response write failed, reclassifying"
        );

        // Reclassify using the write failure, not the original error.
        let (retry, surfaced) = classify(write_error, &self.config, record.request());
        record.set_status(&retry.status);
        record.set_error(&surfaced);
        self.write_response(stream, &retry).map_err(|fatal| {
            error!(
                target: WORKER_TARGET,
                error = %fatal,
                "second response write failed, dropping connection"
            );
            fatal
        })
    }

    fn write_response(
        &self,
        stream: &mut ConnectionStream,
        response: &Response,
    ) -> Result<(), WorkerError> {
        let bytes = response.encode()?;
        stream.write_all(&bytes).map_err(WorkerError::Write)?;
        stream.flush().map_err(WorkerError::Write)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::net::{SocketAddr, TcpListener, TcpStream};
    use std::thread::{self, JoinHandle};

    use relay_wire::{PROTOCOL_VERSION, Value};
    use rstest::rstest;

    use crate::handler::{Handler, HandlerContext, HandlerResult, halt};
    use crate::registry::HandlerRegistry;
    use crate::router::Router;

    use super::*;

    #[derive(Default)]
    struct Echo;

    impl Handler for Echo {
        fn run(&mut self, ctx: &mut HandlerContext<'_>) -> HandlerResult<Value> {
            Ok(ctx.params().get("message").cloned().unwrap_or(Value::Null))
        }
    }

    #[derive(Default)]
    struct Failing;

    impl Handler for Failing {
        fn run(&mut self, _ctx: &mut HandlerContext<'_>) -> HandlerResult<Value> {
            Err(crate::handler::Exit::Failed(anyhow::anyhow!("boom")))
        }
    }

    #[derive(Default)]
    struct Halting;

    impl Handler for Halting {
        fn run(&mut self, _ctx: &mut HandlerContext<'_>) -> HandlerResult<Value> {
            halt(
                Status::with_message(728, "custom"),
                Value::List(vec![Value::Int(1), Value::Bool(true), Value::Str("yes".into())]),
            )
        }
    }

    fn test_config(keep_alive: bool) -> Arc<ServerConfig> {
        let mut registry = HandlerRegistry::new();
        registry.register::<Echo>("services::Echo");
        registry.register::<Failing>("services::Failing");
        registry.register::<Halting>("services::Halting");

        let mut router = Router::with_namespace("services");
        router.add("echo", "Echo");
        router.add("failing", "Failing");
        router.add("halting", "Halting");

        Arc::new(
            ServerConfig::builder(router)
                .receives_keep_alive(keep_alive)
                .read_timeout(Duration::from_millis(500))
                .build(&registry)
                .expect("config"),
        )
    }

    /// Runs a worker against a one-shot TCP pair and returns the client end.
    fn serve_one(config: Arc<ServerConfig>) -> (TcpStream, JoinHandle<Result<(), WorkerError>>) {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
        let addr: SocketAddr = listener.local_addr().expect("addr");
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            ConnectionWorker::new(config).handle(ConnectionStream::Tcp(stream))
        });
        let client = TcpStream::connect(addr).expect("connect");
        (client, server)
    }

    fn roundtrip(config: Arc<ServerConfig>, request: &Request) -> Response {
        let (mut client, server) = serve_one(config);
        client
            .write_all(&request.encode().expect("encode request"))
            .expect("send request");
        let body = frame::read(&mut client)
            .expect("read response frame")
            .expect("response document");
        server.join().expect("server join").expect("worker result");
        Response::from_document(&body).expect("parse response")
    }

    #[test]
    fn echo_request_round_trips() {
        let request = Request::new(
            "echo",
            "v1",
            Value::map().with("message", "hi"),
        );
        let response = roundtrip(test_config(false), &request);
        assert_eq!(response.status.code, 200);
        assert_eq!(response.status.message, None);
        assert_eq!(response.result, Some(Value::Str("hi".into())));
    }

    #[test]
    fn unknown_service_answers_404() {
        let request = Request::new("missing", "v1", Value::Null);
        let response = roundtrip(test_config(false), &request);
        assert_eq!(response.status.code, 404);
        assert_eq!(response.status.message, None);
        assert_eq!(response.result, None);
    }

    #[test]
    fn handler_failure_answers_500() {
        let request = Request::new("failing", "v1", Value::Null);
        let response = roundtrip(test_config(false), &request);
        assert_eq!(response.status.code, 500);
        assert_eq!(
            response.status.message.as_deref(),
            Some("An unexpected error occurred.")
        );
        assert_eq!(response.result, None);
    }

    #[test]
    fn halt_answers_custom_status_and_data() {
        let request = Request::new("halting", "v1", Value::Null);
        let response = roundtrip(test_config(false), &request);
        assert_eq!(response.status.code, 728);
        assert_eq!(response.status.message.as_deref(), Some("custom"));
        assert_eq!(
            response.result,
            Some(Value::List(vec![
                Value::Int(1),
                Value::Bool(true),
                Value::Str("yes".into()),
            ]))
        );
    }

    #[rstest]
    #[case::keep_alive_enabled(true)]
    #[case::keep_alive_disabled(false)]
    fn empty_connection_follows_keep_alive_policy(#[case] keep_alive: bool) {
        let (client, server) = serve_one(test_config(keep_alive));
        // Close without sending a byte, as a health-check probe would.
        client
            .shutdown(Shutdown::Write)
            .expect("close client write side");

        let mut reader = client;
        if keep_alive {
            // No response bytes at all; the server just closes.
            let body = frame::read(&mut reader).expect("clean close");
            assert_eq!(body, None);
        } else {
            let body = frame::read(&mut reader)
                .expect("read response frame")
                .expect("response document");
            let response = Response::from_document(&body).expect("parse response");
            assert_eq!(response.status.code, 400);
            assert_eq!(
                response.status.message.as_deref(),
                Some("Couldn't read request.")
            );
        }
        server.join().expect("server join").expect("worker result");
    }

    #[test]
    fn version_mismatch_answers_400_with_protocol_detail() {
        let (mut client, server) = serve_one(test_config(false));
        let request = Request::new("echo", "v1", Value::Null);
        let mut bytes = request.encode().expect("encode request");
        bytes[4] = PROTOCOL_VERSION + 1;
        client.write_all(&bytes).expect("send request");

        let body = frame::read(&mut client)
            .expect("read response frame")
            .expect("response document");
        let response = Response::from_document(&body).expect("parse response");
        assert_eq!(response.status.code, 400);
        let message = response.status.message.expect("message");
        assert!(message.contains("protocol version"), "message: {message}");
        server.join().expect("server join").expect("worker result");
    }

    #[test]
    fn read_timeout_answers_408() {
        let mut registry = HandlerRegistry::new();
        registry.register::<Echo>("services::Echo");
        let mut router = Router::with_namespace("services");
        router.add("echo", "Echo");
        let config = Arc::new(
            ServerConfig::builder(router)
                .read_timeout(Duration::from_millis(50))
                .build(&registry)
                .expect("config"),
        );

        let (mut client, server) = serve_one(config);
        // Send a partial size prefix, then stall past the deadline.
        client.write_all(&[0, 0]).expect("send partial prefix");

        let body = frame::read(&mut client)
            .expect("read response frame")
            .expect("response document");
        let response = Response::from_document(&body).expect("parse response");
        assert_eq!(response.status.code, 408);
        server.join().expect("server join").expect("worker result");
        drop(client);
    }

    #[test]
    fn debug_mode_reraises_classified_error() {
        let mut registry = HandlerRegistry::new();
        registry.register::<Failing>("services::Failing");
        let mut router = Router::with_namespace("services");
        router.add("failing", "Failing");
        let config = Arc::new(
            ServerConfig::builder(router)
                .debug(true)
                .read_timeout(Duration::from_millis(500))
                .build(&registry)
                .expect("config"),
        );

        let (mut client, server) = serve_one(config);
        let request = Request::new("failing", "v1", Value::Null);
        client
            .write_all(&request.encode().expect("encode request"))
            .expect("send request");

        // The client still receives a well-formed 500 response...
        let body = frame::read(&mut client)
            .expect("read response frame")
            .expect("response document");
        let response = Response::from_document(&body).expect("parse response");
        assert_eq!(response.status.code, 500);

        // ...but the worker re-raises the classified error to its caller.
        let outcome = server.join().expect("server join");
        assert!(matches!(outcome, Err(WorkerError::Handler(_))));
    }
}
