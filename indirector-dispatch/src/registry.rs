//! The indirection registry.
//!
//! One registry is built at startup from the process [`Settings`] and the
//! shared [`HttpTransport`], then handed to whatever needs to look up an
//! indirection by name. Indirections of different payload models live side by
//! side; a lookup names the model it expects and is checked against the one
//! the indirection was registered with.

use crate::indirection::{Indirection, IndirectionConfig};
use indirector_core::{HttpTransport, IndirectorError, IndirectorResult, Model, Settings};
use indirector_rest::PooledTransport;
use std::any::{type_name, Any};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

struct Entry {
    model: &'static str,
    indirection: Arc<dyn Any + Send + Sync>,
}

impl Entry {
    fn downcast<M: Model>(&self, name: &str) -> IndirectorResult<Arc<Indirection<M>>> {
        Arc::clone(&self.indirection)
            .downcast::<Indirection<M>>()
            .map_err(|_| IndirectorError::KindMismatch {
                name: name.to_string(),
                requested: type_name::<M>(),
                actual: self.model,
            })
    }
}

pub struct IndirectionRegistry {
    settings: Arc<Settings>,
    transport: Arc<dyn HttpTransport>,
    entries: RwLock<HashMap<String, Entry>>,
}

impl IndirectionRegistry {
    pub fn new(settings: Arc<Settings>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            settings,
            transport,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// A registry talking HTTP through a [`PooledTransport`] built from the
    /// settings' `[http]` section.
    pub fn with_pooled_transport(settings: Arc<Settings>) -> Self {
        let transport = Arc::new(PooledTransport::new(settings.http().clone()));
        Self::new(settings, transport)
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    pub fn transport(&self) -> &Arc<dyn HttpTransport> {
        &self.transport
    }

    /// Create the indirection for `config.name`, or reconfigure the existing
    /// one in place. Re-registering under a different model is a
    /// `KindMismatch`.
    pub fn register<M: Model>(&self, config: IndirectionConfig) -> IndirectorResult<Arc<Indirection<M>>> {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(entry) = entries.get(&config.name) {
            let indirection = entry.downcast::<M>(&config.name)?;
            indirection.reconfigure(config)?;
            return Ok(indirection);
        }

        let name = config.name.clone();
        let indirection = Arc::new(Indirection::<M>::new(
            config,
            self.settings.clone(),
            self.transport.clone(),
        )?);
        tracing::info!(indirection = %name, model = type_name::<M>(), "Registered indirection");
        entries.insert(
            name,
            Entry {
                model: type_name::<M>(),
                indirection: indirection.clone(),
            },
        );
        Ok(indirection)
    }

    /// The indirection registered as `name`, which must carry `M`.
    pub fn lookup<M: Model>(&self, name: &str) -> IndirectorResult<Arc<Indirection<M>>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(name)
            .ok_or_else(|| IndirectorError::NotFound {
                name: name.to_string(),
            })?
            .downcast::<M>(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Drop every indirection. Handles obtained earlier stay usable.
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        tracing::debug!("Cleared indirection registry");
    }
}
