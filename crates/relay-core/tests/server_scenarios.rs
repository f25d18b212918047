//! End-to-end scenarios over a real TCP listener.
//!
//! Each test stands up a full server (registry, router, config snapshot,
//! listener) on an ephemeral port and speaks the wire protocol from the
//! client side.

use std::io::Write;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use rstest::rstest;

use relay_core::{
    Endpoint, Handler, HandlerContext, HandlerResult, HandlerRegistry, HookSet, ListenerHandle,
    Router, ServerConfig, SocketListener, halt,
};
use relay_wire::{Request, Response, Status, Value, frame};

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
        Err(relay_core::Exit::failed(anyhow::anyhow!(
            "database exploded"
        )))
    }
}

#[derive(Default)]
struct Custom;

impl Handler for Custom {
    fn run(&mut self, _ctx: &mut HandlerContext<'_>) -> HandlerResult<Value> {
        halt(
            Status::with_message(728, "custom"),
            Value::List(vec![Value::Int(1), Value::Bool(true), Value::Str("yes".into())]),
        )
    }
}

struct Server {
    addr: SocketAddr,
    handle: ListenerHandle,
}

impl Server {
    fn start(keep_alive: bool) -> Self {
        let mut registry = HandlerRegistry::new();
        registry.register::<Echo>("services::Echo");
        registry.register::<Failing>("services::Failing");
        registry.register_with(
            "services::Custom",
            Arc::new(|| Box::new(Custom)),
            HookSet::new(),
        );

        let mut router = Router::with_namespace("services");
        router.add("echo", "Echo");
        router.add("failing", "Failing");
        router.add("custom", "Custom");

        let config = Arc::new(
            ServerConfig::builder(router)
                .receives_keep_alive(keep_alive)
                .verbose_logging(true)
                .read_timeout(Duration::from_millis(500))
                .build(&registry)
                .expect("config"),
        );

        let listener = SocketListener::bind(&Endpoint::tcp("127.0.0.1", 0)).expect("bind");
        let addr = listener.local_addr().expect("addr");
        let handle = listener.serve(config, Vec::new()).expect("serve");
        Self { addr, handle }
    }

    fn call(&self, request: &Request) -> Response {
        let mut client = TcpStream::connect(self.addr).expect("connect");
        client
            .write_all(&request.encode().expect("encode request"))
            .expect("send request");
        let body = frame::read(&mut client)
            .expect("read response frame")
            .expect("response document");
        Response::from_document(&body).expect("parse response")
    }

    fn shutdown(self) {
        self.handle.stop();
        self.handle.join().expect("join listener");
    }
}

#[test]
fn scenario_a_echo_returns_message() {
    let server = Server::start(false);
    let response = server.call(&Request::new(
        "echo",
        "v1",
        Value::map().with("message", "hi"),
    ));

    assert_eq!(response.status, Status::success());
    assert_eq!(response.result, Some(Value::Str("hi".into())));
    server.shutdown();
}

#[test]
fn scenario_b_unknown_service_is_404() {
    let server = Server::start(false);
    let response = server.call(&Request::new("nonesuch", "v1", Value::Null));

    assert_eq!(response.status, Status::not_found());
    assert_eq!(response.result, None);
    server.shutdown();
}

#[test]
fn scenario_c_handler_error_is_500() {
    let server = Server::start(false);
    let response = server.call(&Request::new("failing", "v1", Value::Null));

    assert_eq!(response.status.code, 500);
    assert_eq!(
        response.status.message.as_deref(),
        Some("An unexpected error occurred.")
    );
    assert_eq!(response.result, None);
    server.shutdown();
}

#[test]
fn scenario_d_halt_with_custom_status_and_data() {
    let server = Server::start(false);
    let response = server.call(&Request::new("custom", "v1", Value::Null));

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
    server.shutdown();
}

#[rstest]
#[case::probe_enabled(true)]
#[case::probe_disabled(false)]
fn keep_alive_probe_policy(#[case] keep_alive: bool) {
    let server = Server::start(keep_alive);
    let client = TcpStream::connect(server.addr).expect("connect");
    client.shutdown(Shutdown::Write).expect("half-close");

    let mut reader = client;
    let read = frame::read(&mut reader);
    if keep_alive {
        assert!(matches!(read, Ok(None)), "expected silent close");
    } else {
        let body = read.expect("read response frame").expect("document");
        let response = Response::from_document(&body).expect("parse response");
        assert_eq!(response.status.code, 400);
        assert_eq!(
            response.status.message.as_deref(),
            Some("Couldn't read request.")
        );
    }
    server.shutdown();
}

#[test]
fn malformed_body_is_400_with_detail() {
    let server = Server::start(false);
    let mut client = TcpStream::connect(server.addr).expect("connect");

    // A frame whose body is a single unknown tag byte.
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&1_u32.to_be_bytes());
    bytes.push(relay_wire::PROTOCOL_VERSION);
    bytes.push(0x7f);
    client.write_all(&bytes).expect("send frame");

    let body = frame::read(&mut client)
        .expect("read response frame")
        .expect("document");
    let response = Response::from_document(&body).expect("parse response");
    assert_eq!(response.status.code, 400);
    let message = response.status.message.expect("message");
    assert!(message.contains("malformed"), "message: {message}");
    server.shutdown();
}

#[test]
fn request_missing_version_is_400() {
    let server = Server::start(false);
    let mut client = TcpStream::connect(server.addr).expect("connect");

    let body = Value::map().with("name", "echo");
    let frame_bytes = frame::encode(&body).expect("encode frame");
    client.write_all(&frame_bytes).expect("send frame");

    let response_body = frame::read(&mut client)
        .expect("read response frame")
        .expect("document");
    let response = Response::from_document(&response_body).expect("parse response");
    assert_eq!(response.status.code, 400);
    let message = response.status.message.expect("message");
    assert!(message.contains("version"), "message: {message}");
    server.shutdown();
}

#[test]
fn connections_complete_independently() {
    let server = Server::start(false);
    let addr = server.addr;

    let slow = std::thread::spawn(move || {
        // Open a connection and stall; its eventual timeout must not block
        // the fast request below.
        let client = TcpStream::connect(addr).expect("connect");
        std::thread::sleep(Duration::from_millis(300));
        drop(client);
    });

    let response = server.call(&Request::new(
        "echo",
        "v1",
        Value::map().with("message", "fast"),
    ));
    assert_eq!(response.status.code, 200);

    slow.join().expect("slow client");
    server.shutdown();
}
