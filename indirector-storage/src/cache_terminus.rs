//! Cache decorator over a primary terminus.
//!
//! Reads are tried against the cache terminus first and filled from the
//! primary on a miss. Writes go to the primary first and are then mirrored
//! into the cache (`save`) or removed from it (`destroy`). Because the layering
//! is itself a [`Terminus`], callers never special-case a cached indirection.

use async_trait::async_trait;
use indirector_core::{IndirectorResult, Model, Request, Terminus, TerminusRef};

pub struct CachingTerminus<M: Model> {
    name: String,
    primary: TerminusRef<M>,
    cache: TerminusRef<M>,
}

impl<M: Model> CachingTerminus<M> {
    pub fn new(primary: TerminusRef<M>, cache: TerminusRef<M>) -> Self {
        let name = format!("{}+{}", primary.name(), cache.name());
        Self {
            name,
            primary,
            cache,
        }
    }

    pub fn primary(&self) -> &TerminusRef<M> {
        &self.primary
    }

    pub fn cache(&self) -> &TerminusRef<M> {
        &self.cache
    }

    /// Key of the cache entry for `request`. Any environment, server or port
    /// the request pins is part of the entry key; requests that pin nothing
    /// use the bare key.
    pub fn cache_key(request: &Request<M>) -> String {
        if request.environment().is_none() && request.server().is_none() && request.port().is_none()
        {
            return request.key().to_string();
        }
        format!(
            "{}@{}|{}|{}",
            request.key(),
            request.environment().unwrap_or_default(),
            request.server().unwrap_or_default(),
            request.port().map(|port| port.to_string()).unwrap_or_default()
        )
    }

    /// Mirror `object` into the cache. Failures are logged, never returned.
    async fn fill(&self, request: &Request<M>, object: M) {
        let key = Self::cache_key(request);
        if let Err(err) = self.cache.save(&Request::save(key.clone(), object)).await {
            tracing::warn!(
                key = %key,
                cache = self.cache.name(),
                error = %err,
                "Failed to fill cache"
            );
        }
    }

    async fn evict(&self, request: &Request<M>) {
        let key = Self::cache_key(request);
        if let Err(err) = self.cache.destroy(&Request::destroy(key.clone())).await {
            tracing::warn!(
                key = %key,
                cache = self.cache.name(),
                error = %err,
                "Failed to evict cache entry"
            );
        }
    }
}

#[async_trait]
impl<M: Model> Terminus<M> for CachingTerminus<M> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find(&self, request: &Request<M>) -> IndirectorResult<Option<M>> {
        let key = Self::cache_key(request);
        if let Some(hit) = self.cache.find(&Request::find(key.clone())).await? {
            tracing::trace!(key = %key, cache = self.cache.name(), "Cache hit");
            return Ok(Some(hit));
        }
        tracing::trace!(key = %key, cache = self.cache.name(), "Cache miss");

        let found = self.primary.find(request).await?;
        if let Some(object) = &found {
            self.fill(request, object.clone()).await;
        }
        Ok(found)
    }

    async fn search(&self, request: &Request<M>) -> IndirectorResult<Vec<M>> {
        self.primary.search(request).await
    }

    async fn save(&self, request: &Request<M>) -> IndirectorResult<M> {
        let saved = self.primary.save(request).await?;
        self.fill(request, saved.clone()).await;
        Ok(saved)
    }

    async fn destroy(&self, request: &Request<M>) -> IndirectorResult<Option<M>> {
        let destroyed = self.primary.destroy(request).await?;
        self.evict(request).await;
        Ok(destroyed)
    }

    fn formats(&self) -> Vec<String> {
        self.primary.formats()
    }
}
