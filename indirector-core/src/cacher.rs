//! Expiring value cache.
//!
//! An owner keeps a [`ValueCache`] of lazily computed attributes. The cache
//! remembers when it was last (re)populated and defers to an [`Expirer`] to
//! decide whether that population is still valid:
//!
//! - reading an attribute while the expirer reports the cache stale clears
//!   *every* attribute of the owner before recomputing;
//! - a cache with no expirer is always stale, so every read recomputes;
//! - owners can share one expirer (for instance a parent aggregate's), so a
//!   single `expire()` invalidates all of them.
//!
//! Values are never timed out on their own; only `expire()` or
//! [`ValueCache::invalidate`] drop them.
//!
//! # Example
//!
//! ```ignore
//! const ADDRESS: CachedAttr<String> = CachedAttr::new("address");
//!
//! let clock = Arc::new(ExpirationClock::new());
//! let cache = ValueCache::new(clock.clone());
//! let addr = ADDRESS.get(&cache, || resolve("puppet"));
//! clock.expire(); // next ADDRESS.get recomputes
//! ```

use crate::Watermark;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

type CachedValue = Arc<dyn Any + Send + Sync>;

// ============================================================================
// EXPIRER
// ============================================================================

/// Source of invalidation for one or more value caches.
pub trait Expirer: Send + Sync {
    /// Mark every cache governed by this expirer as stale.
    fn expire(&self);

    /// When `expire()` was last called, if ever.
    fn timestamp(&self) -> Option<Watermark>;

    /// True iff an expiration happened after `populated_at`.
    fn is_expired(&self, populated_at: &Watermark) -> bool {
        match self.timestamp() {
            Some(expired_at) => expired_at.is_newer_than(populated_at),
            None => false,
        }
    }
}

/// The standard expirer: holds the watermark of the last `expire()`.
#[derive(Debug, Default)]
pub struct ExpirationClock {
    timestamp: RwLock<Option<Watermark>>,
}

impl ExpirationClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Expirer for ExpirationClock {
    fn expire(&self) {
        let mut timestamp = self
            .timestamp
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *timestamp = Some(Watermark::now());
    }

    fn timestamp(&self) -> Option<Watermark> {
        *self
            .timestamp
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// VALUE CACHE
// ============================================================================

#[derive(Default)]
struct CacheState {
    populated_at: Option<Watermark>,
    values: HashMap<&'static str, CachedValue>,
}

impl CacheState {
    fn seed(&mut self) -> Watermark {
        *self.populated_at.get_or_insert_with(Watermark::now)
    }
}

/// Per-owner store of cached attributes.
///
/// The internal lock only protects the map itself. Initializers run outside
/// it, so two threads racing on a cold attribute may both compute; the first
/// value stored wins and both callers receive it.
pub struct ValueCache {
    expirer: Option<Arc<dyn Expirer>>,
    state: Mutex<CacheState>,
}

impl ValueCache {
    /// A cache governed by `expirer`.
    pub fn new(expirer: Arc<dyn Expirer>) -> Self {
        Self {
            expirer: Some(expirer),
            state: Mutex::new(CacheState::default()),
        }
    }

    /// A cache with no expirer: every read recomputes.
    pub fn uncached() -> Self {
        Self {
            expirer: None,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// A fresh, empty cache governed by the same expirer as this one.
    pub fn child(&self) -> Self {
        Self {
            expirer: self.expirer.clone(),
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn expirer(&self) -> Option<&Arc<dyn Expirer>> {
        self.expirer.as_ref()
    }

    /// Expire through the governing expirer. A no-op without one.
    pub fn expire(&self) {
        if let Some(expirer) = &self.expirer {
            expirer.expire();
        }
    }

    /// Drop every value of this owner only, leaving the expirer untouched.
    pub fn invalidate(&self) {
        let mut state = self.lock();
        state.values.clear();
        state.populated_at = None;
    }

    /// When this cache was last (re)populated.
    pub fn populated_at(&self) -> Option<Watermark> {
        self.lock().populated_at
    }

    pub fn len(&self) -> usize {
        self.lock().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clear everything and restart the population clock if the expirer says
    /// the current population is stale.
    fn refresh(&self, state: &mut CacheState) {
        let populated_at = state.seed();
        let stale = match &self.expirer {
            Some(expirer) => expirer.is_expired(&populated_at),
            None => true,
        };
        if stale {
            state.values.clear();
            state.populated_at = Some(Watermark::now());
        }
    }

    fn lookup(&self, name: &'static str) -> Option<CachedValue> {
        let mut state = self.lock();
        self.refresh(&mut state);
        state.values.get(name).cloned()
    }

    fn store_if_absent<T: Send + Sync + 'static>(&self, name: &'static str, value: Arc<T>) -> Arc<T> {
        let mut state = self.lock();
        state.seed();
        if let Some(existing) = state.values.get(name) {
            if let Ok(existing) = Arc::clone(existing).downcast::<T>() {
                return existing;
            }
        }
        state.values.insert(name, value.clone());
        value
    }

    fn remove(&self, name: &'static str) {
        self.lock().values.remove(name);
    }

    fn replace(&self, name: &'static str, value: CachedValue) {
        let mut state = self.lock();
        state.seed();
        state.values.insert(name, value);
    }
}

impl fmt::Debug for ValueCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("ValueCache")
            .field("has_expirer", &self.expirer.is_some())
            .field("populated_at", &state.populated_at)
            .field("attributes", &state.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ============================================================================
// CACHED ATTRIBUTE
// ============================================================================

/// Declaration of a cached attribute: a name bound to a value type.
///
/// The initializer is supplied at the read site, so owners that need `self`
/// to compute the value can capture it.
pub struct CachedAttr<T> {
    name: &'static str,
    _value: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> CachedAttr<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _value: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The cached value, computing and storing it with `init` if absent or
    /// expired.
    pub fn get(&self, cache: &ValueCache, init: impl FnOnce() -> T) -> Arc<T> {
        if let Some(value) = self.peek(cache) {
            return value;
        }
        cache.store_if_absent(self.name, Arc::new(init()))
    }

    /// Like [`CachedAttr::get`] with a fallible initializer. Errors are
    /// returned to the caller and nothing is cached.
    pub fn try_get<E>(
        &self,
        cache: &ValueCache,
        init: impl FnOnce() -> Result<T, E>,
    ) -> Result<Arc<T>, E> {
        if let Some(value) = self.peek(cache) {
            return Ok(value);
        }
        let value = init()?;
        Ok(cache.store_if_absent(self.name, Arc::new(value)))
    }

    /// Store a value directly. The first write seeds the cache timestamp.
    pub fn set(&self, cache: &ValueCache, value: T) {
        cache.replace(self.name, Arc::new(value));
    }

    /// Drop this attribute only; the next `get` recomputes it.
    pub fn invalidate(&self, cache: &ValueCache) {
        cache.remove(self.name);
    }

    /// The cached value if present and not expired. Never computes.
    pub fn peek(&self, cache: &ValueCache) -> Option<Arc<T>> {
        cache
            .lookup(self.name)
            .and_then(|value| value.downcast::<T>().ok())
    }
}

impl<T> fmt::Debug for CachedAttr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CachedAttr").field(&self.name).finish()
    }
}
