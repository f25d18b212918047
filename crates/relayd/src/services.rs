//! Built-in service handlers shipped with the daemon.

use relay_core::{Handler, HandlerContext, HandlerResult, HandlerRegistry, Router};
use relay_wire::Value;

/// Namespace prefix for the built-in services.
pub const SERVICE_NAMESPACE: &str = "relayd";

/// Echoes the request's `message` param back to the caller.
///
/// With no `message` param the whole params document is returned, which
/// makes the handler usable as a wire-level smoke test.
#[derive(Debug, Default)]
pub struct EchoHandler;

impl Handler for EchoHandler {
    fn run(&mut self, ctx: &mut HandlerContext<'_>) -> HandlerResult<Value> {
        let params = ctx.params();
        match params.get("message") {
            Some(message) => Ok(message.clone()),
            None => Ok(params.clone()),
        }
    }
}

/// Reports the daemon name and version.
#[derive(Debug, Default)]
pub struct StatusHandler;

impl Handler for StatusHandler {
    fn run(&mut self, _ctx: &mut HandlerContext<'_>) -> HandlerResult<Value> {
        Ok(Value::map()
            .with("server", env!("CARGO_PKG_NAME"))
            .with("version", env!("CARGO_PKG_VERSION")))
    }
}

/// Registers the built-in handlers.
pub fn register(registry: &mut HandlerRegistry) {
    registry.register::<EchoHandler>("relayd::EchoHandler");
    registry.register::<StatusHandler>("relayd::StatusHandler");
}

/// Builds the routing table for the built-in services.
#[must_use]
pub fn router() -> Router {
    let mut router = Router::with_namespace(SERVICE_NAMESPACE);
    router.add("echo", "EchoHandler");
    router.add("status", "StatusHandler");
    router
}
