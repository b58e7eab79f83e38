use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Condvar;
use parking_lot::Mutex;

use self::storage::CacheStorage;
pub use self::storage::CacheStats;
use self::storage::KeyType;
use self::storage::ValueType;

pub(crate) mod storage;

type WaitMap<K, V, E> = Arc<Mutex<HashMap<K, Arc<Waiter<V, E>>>>>;

/// A cache that coalesces concurrent computations of the same key: the first
/// caller for a missing key computes the value, every concurrent caller for
/// that key blocks until it is published. Errors are handed to the waiters
/// but never stored.
#[derive(Clone)]
pub(crate) struct DedupCache<K: KeyType, V: ValueType, E> {
    wait_map: WaitMap<K, V, E>,
    storage: CacheStorage<K, V>,
}

impl<K, V, E> DedupCache<K, V, E>
where
    K: KeyType,
    V: ValueType,
    E: Clone + Send + Sync,
{
    pub(crate) fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        Self {
            wait_map: Arc::new(Mutex::new(HashMap::new())),
            storage: CacheStorage::new(capacity, ttl),
        }
    }

    pub(crate) fn get(&self, key: K) -> Entry<K, V, E> {
        let mut locked_wait_map = self.wait_map.lock();
        match locked_wait_map.get(&key) {
            Some(waiter) => {
                // Register interest in key
                Entry {
                    inner: EntryInner::Receiver {
                        waiter: waiter.clone(),
                    },
                }
            }
            None => {
                if let Some(value) = self.storage.get(&key) {
                    return Entry {
                        inner: EntryInner::Value(value),
                    };
                }

                let waiter = Arc::new(Waiter::default());
                locked_wait_map.insert(key.clone(), waiter.clone());

                Entry {
                    inner: EntryInner::First {
                        key,
                        waiter,
                        cache: self.clone(),
                    },
                }
            }
        }
    }

    pub(crate) fn stats(&self) -> CacheStats {
        self.storage.stats()
    }

    pub(crate) fn clear(&self) {
        self.storage.clear()
    }

    fn remove_wait(&self, key: &K) {
        let _ = self.wait_map.lock().remove(key);
    }
}

enum State<V, E> {
    Pending,
    Done(Result<V, E>),
    Abandoned,
}

struct Waiter<V, E> {
    state: Mutex<State<V, E>>,
    ready: Condvar,
}

impl<V, E> Default for Waiter<V, E> {
    fn default() -> Self {
        Self {
            state: Mutex::new(State::Pending),
            ready: Condvar::new(),
        }
    }
}

impl<V: Clone, E: Clone> Waiter<V, E> {
    fn publish(&self, state: State<V, E>) {
        *self.state.lock() = state;
        self.ready.notify_all();
    }

    fn wait(&self) -> Option<Result<V, E>> {
        let mut state = self.state.lock();
        while matches!(*state, State::Pending) {
            self.ready.wait(&mut state);
        }
        match &*state {
            State::Done(result) => Some(result.clone()),
            State::Pending | State::Abandoned => None,
        }
    }
}

pub(crate) struct Entry<K: KeyType, V: ValueType, E: Clone + Send + Sync> {
    inner: EntryInner<K, V, E>,
}

enum EntryInner<K: KeyType, V: ValueType, E: Clone + Send + Sync> {
    First {
        key: K,
        waiter: Arc<Waiter<V, E>>,
        cache: DedupCache<K, V, E>,
    },
    Receiver {
        waiter: Arc<Waiter<V, E>>,
    },
    Value(V),
    Done,
}

impl<K, V, E> Entry<K, V, E>
where
    K: KeyType,
    V: ValueType,
    E: Clone + Send + Sync,
{
    pub(crate) fn is_first(&self) -> bool {
        matches!(self.inner, EntryInner::First { .. })
    }

    /// Returns the stored value, or waits for the first caller to publish it.
    ///
    /// `None` means the first caller went away without publishing anything:
    /// the value has to be computed again.
    pub(crate) fn get(mut self) -> Option<Result<V, E>> {
        match std::mem::replace(&mut self.inner, EntryInner::Done) {
            // there was already a value in cache
            EntryInner::Value(v) => Some(Ok(v)),
            EntryInner::Receiver { waiter } => waiter.wait(),
            first @ EntryInner::First { .. } => {
                failfast_debug!("should not call get on the first call");
                self.inner = first;
                None
            }
            EntryInner::Done => None,
        }
    }

    pub(crate) fn insert(mut self, value: V) {
        if let EntryInner::First { key, waiter, cache } =
            std::mem::replace(&mut self.inner, EntryInner::Done)
        {
            cache.storage.insert(key.clone(), value.clone());
            cache.remove_wait(&key);
            waiter.publish(State::Done(Ok(value)));
        }
    }

    pub(crate) fn error(mut self, error: E) {
        if let EntryInner::First { key, waiter, cache } =
            std::mem::replace(&mut self.inner, EntryInner::Done)
        {
            cache.remove_wait(&key);
            waiter.publish(State::Done(Err(error)));
        }
    }
}

impl<K, V, E> Drop for Entry<K, V, E>
where
    K: KeyType,
    V: ValueType,
    E: Clone + Send + Sync,
{
    fn drop(&mut self) {
        // the first caller was cancelled or panicked: wake the waiters up so
        // that they compute the value themselves
        if let EntryInner::First { key, waiter, cache } =
            std::mem::replace(&mut self.inner, EntryInner::Done)
        {
            cache.remove_wait(&key);
            waiter.publish(State::Abandoned);
        }
    }
}
