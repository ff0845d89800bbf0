//! Tracking of named contexts and a default context, with explicit cleanup.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::ExecutionContext;

/// A context shared between the caller and an executor.
pub type SharedContext = Arc<Mutex<ExecutionContext>>;

/// Wrap a context for sharing.
pub fn share(context: ExecutionContext) -> SharedContext {
    Arc::new(Mutex::new(context))
}

/// Owns the cleanup of zero or more named contexts plus one default.
///
/// Dropping the manager does not release anything; cleanup is always
/// explicit through [`cleanup_all`](Self::cleanup_all) or
/// [`cleanup_context`](Self::cleanup_context).
#[derive(Debug, Default)]
pub struct ContextManager {
    contexts: BTreeMap<String, SharedContext>,
    default: Option<SharedContext>,
}

impl ContextManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `context` under `name`, replacing (without releasing) any
    /// context previously tracked under that name.
    pub fn create_context(&mut self, name: impl Into<String>, context: ExecutionContext) -> SharedContext {
        let name = name.into();
        let shared = share(context);
        if self.contexts.insert(name.clone(), Arc::clone(&shared)).is_some() {
            log::warn!("Replaced tracked context '{}' without releasing it", name);
        }
        shared
    }

    pub fn get_context(&self, name: &str) -> Option<SharedContext> {
        self.contexts.get(name).cloned()
    }

    pub fn set_default(&mut self, context: ExecutionContext) -> SharedContext {
        let shared = share(context);
        self.default = Some(Arc::clone(&shared));
        shared
    }

    pub fn get_default(&self) -> Option<SharedContext> {
        self.default.clone()
    }

    /// Stop tracking `name` without releasing it.
    pub fn remove_context(&mut self, name: &str) -> Option<SharedContext> {
        self.contexts.remove(name)
    }

    /// Tracked context names, sorted.
    pub fn list_contexts(&self) -> Vec<String> {
        self.contexts.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Release `name` and stop tracking it. Returns whether it was tracked.
    pub fn cleanup_context(&mut self, name: &str) -> bool {
        match self.contexts.remove(name) {
            Some(ctx) => {
                let released = ctx.lock().release_all();
                log::debug!("Cleaned up context '{}' ({} resource(s))", name, released);
                true
            }
            None => false,
        }
    }

    /// Release every tracked context and the default, then clear tracking.
    pub fn cleanup_all(&mut self) {
        let contexts = std::mem::take(&mut self.contexts);
        for (name, ctx) in contexts {
            let released = ctx.lock().release_all();
            log::debug!("Cleaned up context '{}' ({} resource(s))", name, released);
        }
        if let Some(ctx) = self.default.take() {
            ctx.lock().release_all();
        }
    }
}
