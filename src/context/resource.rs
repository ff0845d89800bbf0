//! Opaque resource handles held by an execution context.
//!
//! A handle type-erases any `Send + Sync` value behind an `Arc`, so cloning a
//! context shares the underlying resource rather than duplicating it. The
//! engine never looks inside a handle; capabilities downcast to the concrete
//! type they expect.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Callback run when a handle is released. An `Err` is logged, not raised.
pub type ReleaseFn = Arc<dyn Fn() -> std::result::Result<(), String> + Send + Sync>;

/// Shared, type-erased resource (a browser page, a session, a connection).
///
/// ```
/// use capability_dispatch::context::ResourceHandle;
///
/// struct Session { id: u32 }
///
/// let handle = ResourceHandle::new(Session { id: 7 });
/// assert_eq!(handle.downcast_ref::<Session>().map(|s| s.id), Some(7));
/// assert!(handle.downcast_ref::<String>().is_none());
/// ```
#[derive(Clone)]
pub struct ResourceHandle {
    value: Arc<dyn Any + Send + Sync>,
    type_id: TypeId,
    type_name: &'static str,
    release: Option<ReleaseFn>,
    /// Shared across clones so the release callback runs at most once.
    released: Arc<AtomicBool>,
}

impl ResourceHandle {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Wrap a value that is already shared elsewhere.
    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            value,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            release: None,
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Attach a callback invoked by [`ResourceHandle::release`].
    pub fn with_release<F>(mut self, release: F) -> Self
    where
        F: Fn() -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.release = Some(Arc::new(release));
        self
    }

    pub fn is<T: Any>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// A shared pointer to the value, if it has type `T`.
    pub fn downcast_arc<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.value).downcast::<T>().ok()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Run the release callback once. Later calls (on this handle or any
    /// clone of it) return `Ok(false)` without invoking it again.
    pub fn release(&self) -> std::result::Result<bool, String> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }
        match &self.release {
            Some(callback) => callback().map(|_| true),
            None => Ok(true),
        }
    }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("type_name", &self.type_name)
            .field("released", &self.is_released())
            .finish_non_exhaustive()
    }
}
