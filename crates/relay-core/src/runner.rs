//! Drives one handler through its lifecycle.
//!
//! The runner owns stage sequencing: hooks and handler methods execute in a
//! fixed order, a halt from any stage short-circuits the rest, and the
//! terminal outcome is wrapped into a [`Response`] with the result document
//! encoded eagerly so encoding failures surface here rather than at write
//! time. The runner never swallows handler failures; classifying them is
//! the connection worker's job.

use relay_wire::{Request, Response, Value, frame};

use crate::config::ServerConfig;
use crate::error::WorkerError;
use crate::handler::{Exit, HandlerContext, HandlerResult};
use crate::registry::{Hook, HookSet};
use crate::router::Route;

/// Stage driver for the handler lifecycle.
#[derive(Debug, Default, Clone, Copy)]
pub struct Runner;

impl Runner {
    /// Runs one request through the route's handler.
    ///
    /// Instantiates exactly one handler for this call; instances are never
    /// reused across requests.
    ///
    /// # Errors
    ///
    /// Returns the handler's failure, an unresolved-route error, or an
    /// encoding failure for an unrepresentable result. Halts are not
    /// errors and are returned as responses.
    pub fn run(
        route: &Route,
        request: &Request,
        config: &ServerConfig,
    ) -> Result<Response, WorkerError> {
        let entry = route.binding()?;
        let mut handler = (entry.factory)();
        let mut ctx = HandlerContext::new(request, config);

        let response = match drive(handler.as_mut(), &entry.hooks, &mut ctx) {
            Ok(result) => Response::success(result),
            Err(Exit::Halt(halt)) => Response::new(halt.status, Some(halt.data)),
            Err(Exit::Failed(error)) => return Err(WorkerError::Handler(error)),
        };

        // Validate encodability now so a bad result fails the run instead of
        // surfacing when the worker writes the frame.
        frame::encode(&response.to_document())?;
        Ok(response)
    }
}

/// Executes the lifecycle stages in order, propagating halts and failures.
fn drive(
    handler: &mut dyn crate::handler::Handler,
    hooks: &HookSet,
    ctx: &mut HandlerContext<'_>,
) -> HandlerResult<Value> {
    run_hooks(&hooks.before, ctx)?;
    run_hooks(&hooks.before_init, ctx)?;
    handler.init(ctx)?;
    run_hooks(&hooks.after_init, ctx)?;
    run_hooks(&hooks.before_run, ctx)?;
    let result = handler.run(ctx)?;
    run_hooks(&hooks.after_run, ctx)?;
    run_hooks(&hooks.after, ctx)?;
    Ok(result)
}

fn run_hooks(hooks: &[Hook], ctx: &mut HandlerContext<'_>) -> HandlerResult<()> {
    for hook in hooks {
        hook(ctx)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;

    use relay_wire::Status;
    use rstest::rstest;

    use crate::handler::{Handler, halt};
    use crate::registry::HandlerRegistry;
    use crate::router::Router;

    use super::*;

    /// Records which stages ran, shared between hooks and assertions.
    type Trace = Arc<Mutex<Vec<&'static str>>>;

    struct Traced {
        trace: Trace,
        halt_in_run: bool,
        fail_in_run: bool,
    }

    impl Handler for Traced {
        fn init(&mut self, _ctx: &mut HandlerContext<'_>) -> HandlerResult<()> {
            self.trace.lock().expect("trace lock").push("init");
            Ok(())
        }

        fn run(&mut self, _ctx: &mut HandlerContext<'_>) -> HandlerResult<Value> {
            self.trace.lock().expect("trace lock").push("run");
            if self.halt_in_run {
                return halt(Status::with_message(728, "custom"), Value::Str("stop".into()));
            }
            if self.fail_in_run {
                return Err(Exit::Failed(anyhow::anyhow!("boom")));
            }
            Ok(Value::Str("ran".into()))
        }
    }

    fn tracing_hook(trace: &Trace, stage: &'static str) -> Hook {
        let trace = Arc::clone(trace);
        Arc::new(move |_ctx| {
            trace.lock().expect("trace lock").push(stage);
            Ok(())
        })
    }

    fn halting_hook(trace: &Trace, stage: &'static str) -> Hook {
        let trace = Arc::clone(trace);
        Arc::new(move |_ctx| {
            trace.lock().expect("trace lock").push(stage);
            halt(Status::new(222), Value::Null)
        })
    }

    struct Setup {
        config: ServerConfig,
        trace: Trace,
    }

    fn setup(
        halt_in_run: bool,
        fail_in_run: bool,
        build_hooks: impl FnOnce(&Trace) -> HookSet,
    ) -> Setup {
        let trace: Trace = Arc::default();
        let hooks = build_hooks(&trace);

        let factory_trace = Arc::clone(&trace);
        let mut registry = HandlerRegistry::new();
        registry.register_with(
            "services::Traced",
            Arc::new(move || {
                Box::new(Traced {
                    trace: Arc::clone(&factory_trace),
                    halt_in_run,
                    fail_in_run,
                })
            }),
            hooks,
        );

        let mut router = Router::new();
        router.add("traced", "services::Traced");
        let config = ServerConfig::builder(router)
            .build(&registry)
            .expect("config");
        Setup { config, trace }
    }

    fn full_hooks(trace: &Trace) -> HookSet {
        let mut hooks = HookSet::new();
        hooks
            .before(noop(trace, "before"))
            .before_init(noop(trace, "before_init"))
            .after_init(noop(trace, "after_init"))
            .before_run(noop(trace, "before_run"))
            .after_run(noop(trace, "after_run"))
            .after(noop(trace, "after"));
        hooks
    }

    fn noop(
        trace: &Trace,
        stage: &'static str,
    ) -> impl Fn(&mut HandlerContext<'_>) -> HandlerResult<()> + Send + Sync + 'static {
        let trace = Arc::clone(trace);
        move |_ctx| {
            trace.lock().expect("trace lock").push(stage);
            Ok(())
        }
    }

    fn run_request(setup: &Setup) -> Result<Response, WorkerError> {
        let request = Request::new("traced", "v1", Value::Null);
        let route = setup.config.route_for("traced").expect("route");
        Runner::run(route, &request, &setup.config)
    }

    #[test]
    fn stages_run_in_order() {
        let setup = setup(false, false, full_hooks);
        let response = run_request(&setup).expect("response");

        assert_eq!(response.status.code, 200);
        assert_eq!(response.result, Some(Value::Str("ran".into())));
        assert_eq!(
            *setup.trace.lock().expect("trace lock"),
            vec![
                "before",
                "before_init",
                "init",
                "after_init",
                "before_run",
                "run",
                "after_run",
                "after",
            ]
        );
    }

    #[test]
    fn halt_in_before_run_skips_run_and_after_run() {
        let setup = setup(false, false, |trace| {
            let mut hooks = HookSet::new();
            hooks
                .before_run(noop_into(halting_hook(trace, "before_run")))
                .after_run(noop_into(tracing_hook(trace, "after_run")));
            hooks
        });
        let response = run_request(&setup).expect("response");

        assert_eq!(response.status.code, 222);
        let trace = setup.trace.lock().expect("trace lock").clone();
        assert_eq!(trace, vec!["init", "before_run"]);
    }

    #[test]
    fn halt_in_after_run_discards_run_result() {
        let setup = setup(false, false, |trace| {
            let mut hooks = HookSet::new();
            hooks.after_run(noop_into(halting_hook(trace, "after_run")));
            hooks
        });
        let response = run_request(&setup).expect("response");

        assert_eq!(response.status.code, 222);
        assert_eq!(response.result, Some(Value::Null));
        let trace = setup.trace.lock().expect("trace lock").clone();
        // run executed, but its result was discarded in favour of the halt.
        assert!(trace.contains(&"run"));
    }

    #[test]
    fn halt_in_run_yields_halt_payload() {
        let setup = setup(true, false, |_| HookSet::new());
        let response = run_request(&setup).expect("response");

        assert_eq!(response.status.code, 728);
        assert_eq!(response.status.message.as_deref(), Some("custom"));
        assert_eq!(response.result, Some(Value::Str("stop".into())));
    }

    #[rstest]
    fn failure_in_run_propagates() {
        let setup = setup(false, true, |_| HookSet::new());
        let error = run_request(&setup).expect_err("handler failure");
        assert!(matches!(error, WorkerError::Handler(_)));
    }

    /// Adapts an already-boxed hook to the builder's closure parameter.
    fn noop_into(
        hook: Hook,
    ) -> impl Fn(&mut HandlerContext<'_>) -> HandlerResult<()> + Send + Sync + 'static {
        move |ctx| hook(ctx)
    }
}
