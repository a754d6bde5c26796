//! Session-scoped shared state.
//!
//! The orchestrator avoids module-level mutable caches. Everything that
//! would otherwise be a global ("already printed notice K", the cached
//! add-ons actor, probed actor capabilities) lives in a
//! [`SessionContext`] constructed with the instance and dropped with it.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

// ============================================================================
// SessionContext
// ============================================================================

/// Shared per-session state passed to every component.
///
/// Cheap to clone; all clones observe the same state.
#[derive(Clone, Default)]
pub struct SessionContext {
    inner: Arc<ContextInner>,
}

#[derive(Default)]
struct ContextInner {
    /// Notice keys that have already been printed this session.
    printed_notices: Mutex<FxHashSet<String>>,

    /// Cached actor ids by role (e.g. "addons" -> "server1.conn0.addonsActor3").
    actors: Mutex<FxHashMap<String, String>>,

    /// Request types supported by an actor, cached after one probe.
    actor_capabilities: Mutex<FxHashMap<String, Vec<String>>>,
}

impl SessionContext {
    /// Creates an empty context.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a notice key as printed.
    ///
    /// Returns `true` the first time a key is seen, `false` afterwards.
    /// Callers print the notice only on `true`.
    pub fn mark_notice(&self, key: impl Into<String>) -> bool {
        self.inner.printed_notices.lock().insert(key.into())
    }

    /// Caches an actor id under a role name.
    pub fn cache_actor(&self, role: impl Into<String>, actor: impl Into<String>) {
        self.inner.actors.lock().insert(role.into(), actor.into());
    }

    /// Returns the cached actor id for a role, if any.
    #[must_use]
    pub fn actor(&self, role: &str) -> Option<String> {
        self.inner.actors.lock().get(role).cloned()
    }

    /// Drops a cached actor id (used when the remote invalidates it).
    pub fn evict_actor(&self, role: &str) {
        self.inner.actors.lock().remove(role);
    }

    /// Caches the probed request types for an actor.
    pub fn cache_capabilities(&self, actor: impl Into<String>, request_types: Vec<String>) {
        self.inner
            .actor_capabilities
            .lock()
            .insert(actor.into(), request_types);
    }

    /// Returns the cached request types for an actor, if probed before.
    #[must_use]
    pub fn capabilities(&self, actor: &str) -> Option<Vec<String>> {
        self.inner.actor_capabilities.lock().get(actor).cloned()
    }

    /// Returns `true` if an actor is known to support a request type.
    ///
    /// `None` means the actor was never probed.
    #[must_use]
    pub fn supports(&self, actor: &str, request_type: &str) -> Option<bool> {
        self.inner
            .actor_capabilities
            .lock()
            .get(actor)
            .map(|types| types.iter().any(|t| t == request_type))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_notice_first_time_only() {
        let ctx = SessionContext::new();
        assert!(ctx.mark_notice("banner:chrome"));
        assert!(!ctx.mark_notice("banner:chrome"));
        assert!(ctx.mark_notice("banner:firefox"));
    }

    #[test]
    fn test_actor_cache() {
        let ctx = SessionContext::new();
        assert!(ctx.actor("addons").is_none());

        ctx.cache_actor("addons", "server1.conn0.addonsActor3");
        assert_eq!(
            ctx.actor("addons").as_deref(),
            Some("server1.conn0.addonsActor3")
        );

        ctx.evict_actor("addons");
        assert!(ctx.actor("addons").is_none());
    }

    #[test]
    fn test_capability_cache() {
        let ctx = SessionContext::new();
        let actor = "server1.conn0.webExtensionDescriptor5";

        assert!(ctx.supports(actor, "reload").is_none());

        ctx.cache_capabilities(actor, vec!["reload".into(), "getTarget".into()]);
        assert_eq!(ctx.supports(actor, "reload"), Some(true));
        assert_eq!(ctx.supports(actor, "terminateBackgroundScript"), Some(false));
    }

    #[test]
    fn test_clones_share_state() {
        let ctx = SessionContext::new();
        let clone = ctx.clone();

        ctx.cache_actor("root", "root");
        assert_eq!(clone.actor("root").as_deref(), Some("root"));
    }
}
