//! In-process terminus.
//!
//! Keeps objects in a map keyed by request key. This is the default cache
//! class and a convenient primary terminus for tests and single-process use.

use async_trait::async_trait;
use indirector_core::{IndirectorResult, Model, Request, Terminus};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

/// Terminus class name of [`MemoryTerminus`].
pub const MEMORY_TERMINUS: &str = "memory";

#[derive(Debug)]
pub struct MemoryTerminus<M> {
    objects: RwLock<BTreeMap<String, M>>,
}

impl<M> Default for MemoryTerminus<M> {
    fn default() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<M: Model> MemoryTerminus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }
}

#[async_trait]
impl<M: Model> Terminus<M> for MemoryTerminus<M> {
    fn name(&self) -> &str {
        MEMORY_TERMINUS
    }

    async fn find(&self, request: &Request<M>) -> IndirectorResult<Option<M>> {
        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        Ok(objects.get(request.key()).cloned())
    }

    /// Every object whose key starts with the request key, in key order.
    async fn search(&self, request: &Request<M>) -> IndirectorResult<Vec<M>> {
        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        Ok(objects
            .range(request.key().to_string()..)
            .take_while(|(key, _)| key.starts_with(request.key()))
            .map(|(_, object)| object.clone())
            .collect())
    }

    async fn save(&self, request: &Request<M>) -> IndirectorResult<M> {
        request.ensure_no_options()?;
        let instance = request.require_instance()?.clone();
        let mut objects = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        objects.insert(request.key().to_string(), instance.clone());
        Ok(instance)
    }

    async fn destroy(&self, request: &Request<M>) -> IndirectorResult<Option<M>> {
        request.ensure_no_options()?;
        let mut objects = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        Ok(objects.remove(request.key()))
    }
}
