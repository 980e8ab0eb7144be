//! Indirections: a named model kind bound to a terminus.
//!
//! An [`Indirection`] resolves its terminus class lazily, the first time a
//! request needs it, and keeps the instance in a [`ValueCache`] governed by
//! the settings clock. Changing a setting, or re-binding the terminus or cache
//! class, drops the instance so the next request builds a fresh one against
//! current configuration.

use indirector_core::{
    dispatch, CachedAttr, ConfigError, HttpTransport, IndirectorError, IndirectorResult, Model,
    Operation, Outcome, Request, Settings, TerminusRef, ValueCache,
};
use indirector_rest::{RestTarget, RestTerminus, REST_TERMINUS};
use indirector_storage::{CachingTerminus, MemoryTerminus, MEMORY_TERMINUS};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// How an indirection picks and configures its terminus.
///
/// ```toml
/// name = "certificate"
/// terminus_class = "rest"
/// cache_class = "memory"
/// server_setting = "ca_server"
/// port_setting = "ca_port"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndirectionConfig {
    pub name: String,
    #[serde(default = "default_terminus_class")]
    pub terminus_class: String,
    #[serde(default)]
    pub cache_class: Option<String>,
    /// Setting holding the default server. `server` when unset.
    #[serde(default)]
    pub server_setting: Option<String>,
    /// Setting holding the default port. `masterport` when unset.
    #[serde(default)]
    pub port_setting: Option<String>,
}

fn default_terminus_class() -> String {
    REST_TERMINUS.to_string()
}

impl IndirectionConfig {
    pub fn new(name: impl Into<String>, terminus_class: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            terminus_class: terminus_class.into(),
            cache_class: None,
            server_setting: None,
            port_setting: None,
        }
    }

    pub fn with_cache_class(mut self, cache_class: impl Into<String>) -> Self {
        self.cache_class = Some(cache_class.into());
        self
    }

    pub fn with_server_setting(mut self, setting: impl Into<String>) -> Self {
        self.server_setting = Some(setting.into());
        self
    }

    pub fn with_port_setting(mut self, setting: impl Into<String>) -> Self {
        self.port_setting = Some(setting.into());
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "name".to_string(),
                value: self.name.clone(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.terminus_class.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "terminus_class".to_string(),
                value: self.terminus_class.clone(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// TERMINUS CLASSES
// ============================================================================

/// What a terminus builder gets to work with.
pub struct TerminusContext<'a> {
    pub indirection: &'a str,
    pub settings: &'a Settings,
    pub transport: &'a Arc<dyn HttpTransport>,
    pub server_setting: Option<&'a str>,
    pub port_setting: Option<&'a str>,
}

/// Builds a terminus instance for a custom terminus class.
pub type TerminusBuilder<M> =
    Arc<dyn Fn(&TerminusContext<'_>) -> IndirectorResult<TerminusRef<M>> + Send + Sync>;

// ============================================================================
// INDIRECTION
// ============================================================================

pub struct Indirection<M: Model> {
    config: RwLock<IndirectionConfig>,
    settings: Arc<Settings>,
    transport: Arc<dyn HttpTransport>,
    classes: RwLock<HashMap<String, TerminusBuilder<M>>>,
    cache: ValueCache,
    /// Bumped on every configuration change; a terminus built under an older
    /// generation is never handed out.
    generation: AtomicU64,
}

impl<M: Model> Indirection<M> {
    const TERMINUS: CachedAttr<(u64, TerminusRef<M>)> = CachedAttr::new("terminus");

    pub fn new(
        config: IndirectionConfig,
        settings: Arc<Settings>,
        transport: Arc<dyn HttpTransport>,
    ) -> IndirectorResult<Self> {
        config.validate()?;
        let cache = ValueCache::new(settings.expirer());
        Ok(Self {
            config: RwLock::new(config),
            settings,
            transport,
            classes: RwLock::new(HashMap::new()),
            cache,
            generation: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> String {
        self.read_config().name.clone()
    }

    pub fn config(&self) -> IndirectionConfig {
        self.read_config().clone()
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    /// Make `class` available as a terminus or cache class. Shadows the
    /// built-in classes of the same name.
    pub fn register_terminus_class(&self, class: impl Into<String>, builder: TerminusBuilder<M>) {
        self.classes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(class.into(), builder);
        self.config_changed();
    }

    pub fn set_terminus_class(&self, class: impl Into<String>) {
        let class = class.into();
        tracing::info!(indirection = %self.name(), class = %class, "Terminus class changed");
        self.write_config().terminus_class = class;
        self.config_changed();
    }

    pub fn set_cache_class(&self, class: Option<String>) {
        tracing::info!(indirection = %self.name(), class = ?class, "Cache class changed");
        self.write_config().cache_class = class;
        self.config_changed();
    }

    /// Replace the whole configuration. The name must stay the same.
    pub fn reconfigure(&self, config: IndirectionConfig) -> IndirectorResult<()> {
        config.validate()?;
        {
            let mut current = self.write_config();
            if current.name != config.name {
                return Err(ConfigError::InvalidValue {
                    field: "name".to_string(),
                    value: config.name,
                    reason: format!("indirection is named {}", current.name),
                }
                .into());
            }
            *current = config;
        }
        self.config_changed();
        Ok(())
    }

    /// The configured terminus, instantiated on first use.
    pub fn terminus(&self) -> IndirectorResult<TerminusRef<M>> {
        loop {
            let generation = self.generation.load(Ordering::SeqCst);
            let bound = Self::TERMINUS.try_get(&self.cache, || {
                self.build_terminus().map(|terminus| (generation, terminus))
            })?;
            if bound.0 == self.generation.load(Ordering::SeqCst) {
                return Ok(bound.1.clone());
            }
            // Configuration moved while this terminus was built.
            Self::TERMINUS.invalidate(&self.cache);
        }
    }

    fn config_changed(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.cache.invalidate();
    }

    /// Route `request` to the terminus operation it names.
    pub async fn execute(&self, request: &Request<M>) -> IndirectorResult<Outcome<M>> {
        let terminus = self.prepare(request, request.operation())?;
        dispatch(terminus.as_ref(), request).await
    }

    pub async fn find(&self, request: &Request<M>) -> IndirectorResult<Option<M>> {
        self.prepare(request, Operation::Find)?.find(request).await
    }

    pub async fn search(&self, request: &Request<M>) -> IndirectorResult<Vec<M>> {
        self.prepare(request, Operation::Search)?.search(request).await
    }

    pub async fn save(&self, request: &Request<M>) -> IndirectorResult<M> {
        self.prepare(request, Operation::Save)?.save(request).await
    }

    pub async fn destroy(&self, request: &Request<M>) -> IndirectorResult<Option<M>> {
        self.prepare(request, Operation::Destroy)?.destroy(request).await
    }

    /// The terminus for a request that must be a `expected` operation.
    fn prepare(&self, request: &Request<M>, expected: Operation) -> IndirectorResult<TerminusRef<M>> {
        if request.operation() != expected {
            return Err(IndirectorError::invalid_argument(format!(
                "{} request passed to {}",
                request.operation(),
                expected
            )));
        }
        let terminus = self.terminus()?;
        tracing::debug!(
            indirection = %self.name(),
            terminus = terminus.name(),
            operation = %expected,
            key = request.key(),
            request_id = %request.id(),
            "Dispatching request"
        );
        Ok(terminus)
    }

    fn build_terminus(&self) -> IndirectorResult<TerminusRef<M>> {
        let config = self.config();
        let primary = self.instantiate(&config, &config.terminus_class)?;
        let terminus: TerminusRef<M> = match &config.cache_class {
            Some(cache_class) => {
                let cache = self.instantiate(&config, cache_class)?;
                Arc::new(CachingTerminus::new(primary, cache))
            }
            None => primary,
        };
        tracing::info!(
            indirection = %config.name,
            terminus = terminus.name(),
            "Instantiated terminus"
        );
        Ok(terminus)
    }

    fn instantiate(&self, config: &IndirectionConfig, class: &str) -> IndirectorResult<TerminusRef<M>> {
        let custom = self
            .classes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(class)
            .cloned();
        if let Some(builder) = custom {
            return builder(&TerminusContext {
                indirection: &config.name,
                settings: &self.settings,
                transport: &self.transport,
                server_setting: config.server_setting.as_deref(),
                port_setting: config.port_setting.as_deref(),
            });
        }

        match class {
            REST_TERMINUS => {
                let target = RestTarget::from_settings(
                    &self.settings,
                    config.server_setting.as_deref(),
                    config.port_setting.as_deref(),
                )?;
                Ok(Arc::new(RestTerminus::<M>::new(
                    config.name.clone(),
                    target,
                    self.transport.clone(),
                )))
            }
            MEMORY_TERMINUS => Ok(Arc::new(MemoryTerminus::<M>::new())),
            other => Err(ConfigError::UnknownTerminus {
                indirection: config.name.clone(),
                class: other.to_string(),
            }
            .into()),
        }
    }

    fn read_config(&self) -> std::sync::RwLockReadGuard<'_, IndirectionConfig> {
        self.config.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_config(&self) -> std::sync::RwLockWriteGuard<'_, IndirectionConfig> {
        self.config.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<M: Model> fmt::Debug for Indirection<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Indirection")
            .field("config", &*self.read_config())
            .field("cache", &self.cache)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indirector_test_utils::{ok_json, NodeFacts, RecordingTransport};

    fn indirection(
        config: IndirectionConfig,
    ) -> (Arc<Settings>, Arc<RecordingTransport>, Indirection<NodeFacts>) {
        let settings = Arc::new(Settings::new());
        let transport = Arc::new(RecordingTransport::new());
        let indirection = Indirection::new(config, settings.clone(), transport.clone()).unwrap();
        (settings, transport, indirection)
    }

    #[test]
    fn test_config_from_toml_defaults_to_rest() {
        let config: IndirectionConfig = toml::from_str("name = \"node\"").unwrap();
        assert_eq!(config, IndirectionConfig::new("node", "rest"));

        let config: IndirectionConfig = toml::from_str(
            r#"
            name = "certificate"
            cache_class = "memory"
            server_setting = "ca_server"
            port_setting = "ca_port"
            "#,
        )
        .unwrap();
        assert_eq!(config.cache_class.as_deref(), Some("memory"));
        assert_eq!(config.server_setting.as_deref(), Some("ca_server"));
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let settings = Arc::new(Settings::new());
        let transport = Arc::new(RecordingTransport::new());
        let err = Indirection::<NodeFacts>::new(
            IndirectionConfig::new(" ", "rest"),
            settings,
            transport,
        )
        .unwrap_err();
        assert!(matches!(err, IndirectorError::Config(_)));
    }

    #[test]
    fn test_terminus_is_instantiated_once() {
        let (_, _, indirection) = indirection(IndirectionConfig::new("node", "memory"));
        let first = indirection.terminus().unwrap();
        let second = indirection.terminus().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_settings_change_rebuilds_terminus() {
        let (settings, _, indirection) = indirection(IndirectionConfig::new("node", "rest"));
        let first = indirection.terminus().unwrap();

        settings.set("server", "other.example.com");

        let second = indirection.terminus().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_unknown_class_is_a_config_error() {
        let (_, _, indirection) = indirection(IndirectionConfig::new("node", "ldap"));
        let err = indirection.terminus().err().expect("expected a config error");
        assert!(matches!(
            err,
            IndirectorError::Config(ConfigError::UnknownTerminus { ref class, .. }) if class == "ldap"
        ));
    }

    #[test]
    fn test_failed_instantiation_is_retried_on_next_use() {
        let (settings, _, indirection) = indirection(
            IndirectionConfig::new("report", "rest").with_server_setting("report_server"),
        );
        assert!(indirection.terminus().is_err());

        settings.set("report_server", "reports.example.com");
        assert_eq!(indirection.terminus().unwrap().name(), "rest");
    }

    #[test]
    fn test_cache_class_layers_terminus() {
        let (_, _, indirection) =
            indirection(IndirectionConfig::new("node", "rest").with_cache_class("memory"));
        assert_eq!(indirection.terminus().unwrap().name(), "rest+memory");

        indirection.set_cache_class(None);
        assert_eq!(indirection.terminus().unwrap().name(), "rest");
    }

    #[test]
    fn test_custom_class_receives_context() {
        let (_, _, indirection) = indirection(
            IndirectionConfig::new("node", "mirror").with_server_setting("mirror_server"),
        );
        let builder: TerminusBuilder<NodeFacts> = Arc::new(|ctx: &TerminusContext<'_>| {
            assert_eq!(ctx.indirection, "node");
            assert_eq!(ctx.server_setting, Some("mirror_server"));
            Ok(Arc::new(MemoryTerminus::<NodeFacts>::new()) as TerminusRef<NodeFacts>)
        });
        indirection.register_terminus_class("mirror", builder);
        assert_eq!(indirection.terminus().unwrap().name(), "memory");
    }

    #[test]
    fn test_terminus_built_under_old_config_is_discarded() {
        let settings = Arc::new(Settings::new());
        let transport = Arc::new(RecordingTransport::new());
        let indirection = Arc::new(
            Indirection::<NodeFacts>::new(IndirectionConfig::new("node", "switching"), settings, transport)
                .unwrap(),
        );

        // The class is switched away while its own terminus is being built.
        let handle = Arc::downgrade(&indirection);
        let builder: TerminusBuilder<NodeFacts> = Arc::new(move |_ctx: &TerminusContext<'_>| {
            if let Some(indirection) = handle.upgrade() {
                indirection.set_terminus_class("rest");
            }
            Ok(Arc::new(MemoryTerminus::<NodeFacts>::new()) as TerminusRef<NodeFacts>)
        });
        indirection.register_terminus_class("switching", builder);

        assert_eq!(indirection.terminus().unwrap().name(), "rest");
        assert_eq!(indirection.config().terminus_class, "rest");
    }

    #[test]
    fn test_reconfigure_keeps_name() {
        let (_, _, indirection) = indirection(IndirectionConfig::new("node", "rest"));
        let err = indirection
            .reconfigure(IndirectionConfig::new("facts", "memory"))
            .unwrap_err();
        assert!(matches!(err, IndirectorError::Config(_)));

        indirection
            .reconfigure(IndirectionConfig::new("node", "memory"))
            .unwrap();
        assert_eq!(indirection.terminus().unwrap().name(), "memory");
    }

    #[tokio::test]
    async fn test_operations_route_through_terminus() {
        let (_, transport, indirection) = indirection(IndirectionConfig::new("node", "rest"));
        transport.push(ok_json(&NodeFacts::new("web01")));

        let found = indirection.find(&Request::find("web01")).await.unwrap();
        assert_eq!(found, Some(NodeFacts::new("web01")));

        let outcome = indirection.execute(&Request::search("web")).await.unwrap();
        assert_eq!(outcome, Outcome::Searched(Vec::new()));

        let sent = transport.requests();
        assert_eq!(sent[0].path, "/production/node/web01");
        assert_eq!(sent[1].path, "/production/nodes/web");
    }

    #[tokio::test]
    async fn test_request_must_match_operation() {
        let (_, transport, indirection) = indirection(IndirectionConfig::new("node", "rest"));
        let err = indirection
            .find(&Request::<NodeFacts>::search("web"))
            .await
            .unwrap_err();
        assert!(matches!(err, IndirectorError::InvalidArgument { .. }));
        assert_eq!(transport.calls(), 0);
    }
}
