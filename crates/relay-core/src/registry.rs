//! Handler registration: name→factory table and lifecycle hooks.
//!
//! The registry replaces dynamic class lookup: every handler a route may
//! name is registered here at startup under an explicit name, and the router
//! resolves against this table exactly once during validation. Unknown names
//! fail at boot, never per-request.

use std::collections::HashMap;
use std::sync::Arc;

use crate::handler::{Handler, HandlerContext, HandlerResult};

/// Constructs a fresh handler instance for one request.
pub type HandlerFactory = Arc<dyn Fn() -> Box<dyn Handler> + Send + Sync>;

/// A lifecycle hook closure.
pub type Hook = Arc<dyn Fn(&mut HandlerContext<'_>) -> HandlerResult<()> + Send + Sync>;

/// Ordered hook lists for every lifecycle extension point.
///
/// Hooks run in registration order. A hook set built with [`HookSet::inheriting`]
/// runs the base set's hooks before its own, replacing mixin-style callback
/// accumulation with an explicit concatenation.
#[derive(Clone, Default)]
pub struct HookSet {
    pub(crate) before: Vec<Hook>,
    pub(crate) before_init: Vec<Hook>,
    pub(crate) after_init: Vec<Hook>,
    pub(crate) before_run: Vec<Hook>,
    pub(crate) after_run: Vec<Hook>,
    pub(crate) after: Vec<Hook>,
}

impl HookSet {
    /// Creates an empty hook set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a hook set that starts with all of `base`'s hooks.
    ///
    /// Hooks appended afterwards run after the inherited ones at each
    /// extension point.
    #[must_use]
    pub fn inheriting(base: &Self) -> Self {
        base.clone()
    }

    /// Appends a hook running before every other stage.
    pub fn before(
        &mut self,
        hook: impl Fn(&mut HandlerContext<'_>) -> HandlerResult<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.before.push(Arc::new(hook));
        self
    }

    /// Appends a hook running just before `init`.
    pub fn before_init(
        &mut self,
        hook: impl Fn(&mut HandlerContext<'_>) -> HandlerResult<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.before_init.push(Arc::new(hook));
        self
    }

    /// Appends a hook running just after `init`.
    pub fn after_init(
        &mut self,
        hook: impl Fn(&mut HandlerContext<'_>) -> HandlerResult<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.after_init.push(Arc::new(hook));
        self
    }

    /// Appends a hook running just before `run`.
    pub fn before_run(
        &mut self,
        hook: impl Fn(&mut HandlerContext<'_>) -> HandlerResult<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.before_run.push(Arc::new(hook));
        self
    }

    /// Appends a hook running just after `run`.
    pub fn after_run(
        &mut self,
        hook: impl Fn(&mut HandlerContext<'_>) -> HandlerResult<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.after_run.push(Arc::new(hook));
        self
    }

    /// Appends a hook running after every other stage.
    pub fn after(
        &mut self,
        hook: impl Fn(&mut HandlerContext<'_>) -> HandlerResult<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.after.push(Arc::new(hook));
        self
    }
}

impl std::fmt::Debug for HookSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookSet")
            .field("before", &self.before.len())
            .field("before_init", &self.before_init.len())
            .field("after_init", &self.after_init.len())
            .field("before_run", &self.before_run.len())
            .field("after_run", &self.after_run.len())
            .field("after", &self.after.len())
            .finish()
    }
}

/// A registered handler type: its factory plus its hook set.
pub struct HandlerEntry {
    pub(crate) name: String,
    pub(crate) factory: HandlerFactory,
    pub(crate) hooks: HookSet,
}

impl HandlerEntry {
    /// Full registered name of the handler type.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("name", &self.name)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

/// Name→handler table built by the composition root at startup.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    entries: HashMap<String, Arc<HandlerEntry>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a `Default`-constructible handler with no hooks.
    pub fn register<H>(&mut self, name: impl Into<String>)
    where
        H: Handler + Default + 'static,
    {
        self.register_with(name, Arc::new(|| Box::new(H::default())), HookSet::new());
    }

    /// Registers a handler with an explicit factory and hook set.
    ///
    /// A later registration under the same name replaces the earlier one;
    /// the registry is only written by the composition root before the
    /// server starts.
    pub fn register_with(
        &mut self,
        name: impl Into<String>,
        factory: HandlerFactory,
        hooks: HookSet,
    ) {
        let name = name.into();
        let entry = Arc::new(HandlerEntry {
            name: name.clone(),
            factory,
            hooks,
        });
        self.entries.insert(name, entry);
    }

    /// Resolves a full handler name.
    pub(crate) fn resolve(&self, name: &str) -> Option<Arc<HandlerEntry>> {
        self.entries.get(name).cloned()
    }
}
