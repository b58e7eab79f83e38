use std::any::Any;
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

/// A trait for types that can be stored in the context.
/// Any type that is Clone, Send, Sync and 'static can be stored in the context.
pub trait ContextValue: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> ContextValue for T {}

/// A thread-safe context that stores values by type.
///
/// The same context is handed to every resolver and type resolver of one
/// invocation. Values are cloned when retrieved from the context. For types
/// that are expensive to clone, wrap them in an `Arc` before storing them.
///
/// # Examples
///
/// ```rust
/// use graphql_jit::Context;
///
/// let context = Context::new();
/// context.insert(42);
/// context.insert("hello".to_string());
///
/// assert_eq!(context.get::<i32>(), Some(42));
/// context.remove::<i32>();
/// assert!(context.get::<i32>().is_none());
/// ```
#[derive(Clone, Default)]
pub struct Context {
    entries: Arc<DashMap<TypeId, Arc<dyn Any + Send + Sync + 'static>>>,
}

impl Context {
    /// Creates a new empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets a value from the context by type.
    /// The value is cloned when retrieved.
    pub fn get<T: ContextValue>(&self) -> Option<T> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>().cloned())
    }

    /// Inserts a value into the context.
    /// If a value of the same type already exists, it will be overwritten.
    pub fn insert<T: ContextValue>(&self, value: T) {
        self.entries.insert(TypeId::of::<T>(), Arc::new(value));
    }

    /// Removes a value from the context.
    pub fn remove<T: ContextValue>(&self) {
        self.entries.remove(&TypeId::of::<T>());
    }

    /// Returns `true` if a value of this type is stored.
    pub fn contains<T: ContextValue>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("entries", &self.entries.len())
            .finish()
    }
}
