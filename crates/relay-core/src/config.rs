//! Immutable server configuration snapshot.
//!
//! The snapshot is built once by the composition root, wrapped in an
//! [`std::sync::Arc`], and shared read-only by every connection worker. No
//! worker mutates it and no locks are needed; this replaces any process-wide
//! mutable registry of servers.

use std::time::Duration;

use crate::classify::ErrorHook;
use crate::registry::HandlerRegistry;
use crate::router::{Route, Router, RouterError};

/// Default bound on how long a worker waits for request bytes.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Pre-resolved, read-only view of routes and server policy.
pub struct ServerConfig {
    router: Router,
    verbose_logging: bool,
    receives_keep_alive: bool,
    debug: bool,
    read_timeout: Duration,
    error_hooks: Vec<ErrorHook>,
}

impl ServerConfig {
    /// Starts building a snapshot around an unvalidated router.
    #[must_use]
    pub fn builder(router: Router) -> ServerConfigBuilder {
        ServerConfigBuilder {
            router,
            verbose_logging: false,
            receives_keep_alive: false,
            debug: false,
            read_timeout: DEFAULT_READ_TIMEOUT,
            error_hooks: Vec::new(),
        }
    }

    /// Looks up the route for a service name.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::NotFound`] when no route matches.
    pub fn route_for(&self, name: &str) -> Result<&Route, RouterError> {
        self.router.route_for(name)
    }

    /// Whether request logging uses the multi-line detailed trace.
    #[must_use]
    pub fn verbose_logging(&self) -> bool {
        self.verbose_logging
    }

    /// Whether empty connections are treated as keep-alive probes.
    #[must_use]
    pub fn receives_keep_alive(&self) -> bool {
        self.receives_keep_alive
    }

    /// Whether classified errors are re-raised to the listener after logging.
    #[must_use]
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Bound on how long a worker waits for request bytes.
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// The ordered error-hook chain.
    pub(crate) fn error_hooks(&self) -> &[ErrorHook] {
        &self.error_hooks
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("router", &self.router)
            .field("verbose_logging", &self.verbose_logging)
            .field("receives_keep_alive", &self.receives_keep_alive)
            .field("debug", &self.debug)
            .field("read_timeout", &self.read_timeout)
            .field("error_hooks", &self.error_hooks.len())
            .finish()
    }
}

/// Builder for [`ServerConfig`].
pub struct ServerConfigBuilder {
    router: Router,
    verbose_logging: bool,
    receives_keep_alive: bool,
    debug: bool,
    read_timeout: Duration,
    error_hooks: Vec<ErrorHook>,
}

impl ServerConfigBuilder {
    /// Enables or disables the multi-line request trace.
    #[must_use]
    pub fn verbose_logging(mut self, enabled: bool) -> Self {
        self.verbose_logging = enabled;
        self
    }

    /// Enables or disables keep-alive probe handling.
    #[must_use]
    pub fn receives_keep_alive(mut self, enabled: bool) -> Self {
        self.receives_keep_alive = enabled;
        self
    }

    /// Enables or disables debug re-raising of classified errors.
    #[must_use]
    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// Overrides the read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Appends an error hook; hooks run in registration order.
    #[must_use]
    pub fn error_hook(mut self, hook: ErrorHook) -> Self {
        self.error_hooks.push(hook);
        self
    }

    /// Validates the router against the registry and freezes the snapshot.
    ///
    /// # Errors
    ///
    /// Returns the first [`RouterError`] from validation; startup must abort
    /// on failure.
    pub fn build(mut self, registry: &HandlerRegistry) -> Result<ServerConfig, RouterError> {
        self.router.validate(registry)?;
        Ok(ServerConfig {
            router: self.router,
            verbose_logging: self.verbose_logging,
            receives_keep_alive: self.receives_keep_alive,
            debug: self.debug,
            read_timeout: self.read_timeout,
            error_hooks: self.error_hooks,
        })
    }
}
