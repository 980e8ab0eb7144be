//! Terminus over a [`RecordStore`].

use super::merge::Rows;
use super::record::RecordStore;
use async_trait::async_trait;
use indirector_core::{IndirectorResult, Model, Request, StoreError, Terminus};
use std::marker::PhantomData;
use std::sync::Arc;

/// Terminus class name of [`StoreTerminus`].
pub const STORE_TERMINUS: &str = "store";

/// A model that can be split into named rows and rebuilt from them.
pub trait Persistable: Model {
    fn to_rows(&self) -> Rows;

    /// Rebuild from stored rows. The error is a human-readable reason.
    fn from_rows(key: &str, rows: Rows) -> Result<Self, String>;
}

/// Saves objects of one kind as rows in a [`RecordStore`].
///
/// `save` reconciles the submission with what is stored and commits only the
/// difference, diffing inside the same transaction, then answers with the
/// object as committed.
pub struct StoreTerminus<M, S: ?Sized> {
    kind: String,
    store: Arc<S>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Persistable, S: RecordStore + ?Sized> StoreTerminus<M, S> {
    pub fn new(kind: impl Into<String>, store: Arc<S>) -> Self {
        Self {
            kind: kind.into(),
            store,
            _model: PhantomData,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn rebuild(&self, key: &str, rows: Rows) -> Result<M, StoreError> {
        M::from_rows(key, rows).map_err(|reason| StoreError::Corrupt {
            kind: self.kind.clone(),
            key: key.to_string(),
            reason,
        })
    }
}

#[async_trait]
impl<M, S> Terminus<M> for StoreTerminus<M, S>
where
    M: Persistable,
    S: RecordStore + ?Sized + 'static,
{
    fn name(&self) -> &str {
        STORE_TERMINUS
    }

    async fn find(&self, request: &Request<M>) -> IndirectorResult<Option<M>> {
        match self.store.load(&self.kind, request.key()).await? {
            Some(rows) => Ok(Some(self.rebuild(request.key(), rows)?)),
            None => Ok(None),
        }
    }

    async fn search(&self, request: &Request<M>) -> IndirectorResult<Vec<M>> {
        let mut found = Vec::new();
        for key in self.store.keys(&self.kind, request.key()).await? {
            // Removed between listing and loading.
            if let Some(rows) = self.store.load(&self.kind, &key).await? {
                found.push(self.rebuild(&key, rows)?);
            }
        }
        Ok(found)
    }

    async fn save(&self, request: &Request<M>) -> IndirectorResult<M> {
        request.ensure_no_options()?;
        let submitted = request.require_instance()?.to_rows();
        let key = request.key();

        let (changes, committed) = self.store.merge(&self.kind, key, submitted).await?;
        tracing::debug!(
            kind = %self.kind,
            key = key,
            created = changes.create.len(),
            updated = changes.update.len(),
            deleted = changes.delete.len(),
            "Committed record"
        );
        Ok(self.rebuild(key, committed)?)
    }

    async fn destroy(&self, request: &Request<M>) -> IndirectorResult<Option<M>> {
        request.ensure_no_options()?;
        match self.store.remove(&self.kind, request.key()).await? {
            Some(rows) => Ok(Some(self.rebuild(request.key(), rows)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRecordStore;
    use indirector_core::IndirectorError;
    use indirector_test_utils::NodeFacts;
    use serde_json::Value;

    impl Persistable for NodeFacts {
        fn to_rows(&self) -> Rows {
            let mut rows: Rows = self
                .values
                .iter()
                .map(|(name, value)| (format!("fact:{}", name), Value::String(value.clone())))
                .collect();
            rows.insert("name".to_string(), Value::String(self.name.clone()));
            rows
        }

        fn from_rows(_key: &str, rows: Rows) -> Result<Self, String> {
            let mut facts = match rows.get("name") {
                Some(Value::String(name)) => NodeFacts::new(name.clone()),
                _ => return Err("missing name row".to_string()),
            };
            for (row, value) in rows {
                if let Some(name) = row.strip_prefix("fact:") {
                    let value = value.as_str().ok_or("fact value is not a string")?;
                    facts = facts.with_fact(name, value);
                }
            }
            Ok(facts)
        }
    }

    fn terminus() -> StoreTerminus<NodeFacts, MemoryRecordStore> {
        StoreTerminus::new("facts", Arc::new(MemoryRecordStore::new()))
    }

    #[tokio::test]
    async fn test_save_then_find() {
        let terminus = terminus();
        let facts = NodeFacts::new("web01").with_fact("kernel", "Linux");

        let saved = terminus
            .save(&Request::save("web01", facts.clone()))
            .await
            .unwrap();
        assert_eq!(saved, facts);
        assert_eq!(
            terminus.find(&Request::find("web01")).await.unwrap(),
            Some(facts)
        );
    }

    #[tokio::test]
    async fn test_resave_merges_fact_rows() {
        let terminus = terminus();
        let first = NodeFacts::new("web01")
            .with_fact("kernel", "Linux")
            .with_fact("uptime", "10");
        terminus.save(&Request::save("web01", first)).await.unwrap();

        let second = NodeFacts::new("web01")
            .with_fact("kernel", "Linux")
            .with_fact("memory", "8 GB");
        let saved = terminus
            .save(&Request::save("web01", second.clone()))
            .await
            .unwrap();

        assert_eq!(saved, second);
        let rows = terminus
            .store()
            .load("facts", "web01")
            .await
            .unwrap()
            .unwrap();
        assert!(!rows.contains_key("fact:uptime"));
        assert!(rows.contains_key("fact:memory"));
    }

    #[tokio::test]
    async fn test_search_by_prefix() {
        let terminus = terminus();
        for name in ["web01", "web02", "db01"] {
            terminus
                .save(&Request::save(name, NodeFacts::new(name)))
                .await
                .unwrap();
        }
        let found = terminus.search(&Request::search("web")).await.unwrap();
        let names: Vec<_> = found.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["web01", "web02"]);
    }

    #[tokio::test]
    async fn test_destroy_returns_object() {
        let terminus = terminus();
        terminus
            .save(&Request::save("web01", NodeFacts::new("web01")))
            .await
            .unwrap();

        let removed = terminus.destroy(&Request::destroy("web01")).await.unwrap();
        assert_eq!(removed, Some(NodeFacts::new("web01")));
        assert_eq!(terminus.find(&Request::find("web01")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_with_options_commits_nothing() {
        let terminus = terminus();
        let err = terminus
            .save(&Request::save("web01", NodeFacts::new("web01")).with_option("x", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, IndirectorError::InvalidArgument { .. }));
        assert_eq!(terminus.store().commits(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_rows_surface_as_store_error() {
        let terminus = terminus();
        let bad = crate::store::ChangeSet {
            create: [("fact:kernel".to_string(), Value::from("Linux"))]
                .into_iter()
                .collect(),
            ..Default::default()
        };
        terminus.store().commit("facts", "web01", bad).await.unwrap();

        let err = terminus.find(&Request::find("web01")).await.unwrap_err();
        assert!(matches!(
            err,
            IndirectorError::Store(StoreError::Corrupt { .. })
        ));
    }
}
