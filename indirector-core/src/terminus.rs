//! The terminus contract.
//!
//! A terminus is the backend at the end of an indirection: a REST service, a
//! persistent store, an in-process map. Every variant exposes the same four
//! operations; a variant that cannot perform one fails with
//! `UnsupportedOperation` instead of silently doing nothing.

use crate::{IndirectorError, IndirectorResult, Model, Operation, Request};
use async_trait::async_trait;
use std::sync::Arc;

/// Backend implementation of find/search/save/destroy for one model.
///
/// Implementations must be safe to call concurrently: one terminus instance
/// serves every request of its indirection.
#[async_trait]
pub trait Terminus<M: Model>: Send + Sync {
    /// Terminus class name, used in logs and errors.
    fn name(&self) -> &str;

    /// The single matching object, or `None` when it does not exist.
    async fn find(&self, request: &Request<M>) -> IndirectorResult<Option<M>> {
        let _ = request;
        Err(IndirectorError::unsupported(self.name(), Operation::Find))
    }

    /// Every matching object in backend order. Never `None`; an empty
    /// vector when nothing matches.
    async fn search(&self, request: &Request<M>) -> IndirectorResult<Vec<M>> {
        let _ = request;
        Err(IndirectorError::unsupported(self.name(), Operation::Search))
    }

    /// Store the request instance and return the canonical stored form.
    async fn save(&self, request: &Request<M>) -> IndirectorResult<M> {
        let _ = request;
        Err(IndirectorError::unsupported(self.name(), Operation::Save))
    }

    /// Remove the object, returning it when the backend reports it.
    async fn destroy(&self, request: &Request<M>) -> IndirectorResult<Option<M>> {
        let _ = request;
        Err(IndirectorError::unsupported(self.name(), Operation::Destroy))
    }

    /// Content types the payload model supports, for negotiation.
    fn formats(&self) -> Vec<String> {
        M::supported_formats()
    }
}

/// Shared handle to a terminus.
pub type TerminusRef<M> = Arc<dyn Terminus<M>>;

/// Result of dispatching a request of any operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<M> {
    Found(Option<M>),
    Searched(Vec<M>),
    Saved(M),
    Destroyed(Option<M>),
}

/// Route a request to the terminus method matching its operation.
pub async fn dispatch<M: Model>(
    terminus: &dyn Terminus<M>,
    request: &Request<M>,
) -> IndirectorResult<Outcome<M>> {
    match request.operation() {
        Operation::Find => terminus.find(request).await.map(Outcome::Found),
        Operation::Search => terminus.search(request).await.map(Outcome::Searched),
        Operation::Save => terminus.save(request).await.map(Outcome::Saved),
        Operation::Destroy => terminus.destroy(request).await.map(Outcome::Destroyed),
    }
}
