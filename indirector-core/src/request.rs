//! The request value object passed through an indirection.
//!
//! A [`Request`] describes exactly one operation against one key. It is built
//! per call, handed to a terminus by reference and dropped when the call
//! completes.

use crate::{IndirectorError, IndirectorResult};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Options attached to a `find` or `search`. Serialized as query parameters
/// by the REST terminus.
pub type RequestOptions = BTreeMap<String, Value>;

// ============================================================================
// OPERATION
// ============================================================================

/// The four indirection operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Find,
    Search,
    Save,
    Destroy,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Find => "find",
            Operation::Search => "search",
            Operation::Save => "save",
            Operation::Destroy => "destroy",
        }
    }

    /// Operations whose requests must not carry options.
    pub fn rejects_options(&self) -> bool {
        matches!(self, Operation::Save | Operation::Destroy)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error when parsing an unknown operation name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationParseError(pub String);

impl fmt::Display for OperationParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid operation: {}", self.0)
    }
}

impl std::error::Error for OperationParseError {}

impl FromStr for Operation {
    type Err = OperationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "find" => Ok(Operation::Find),
            "search" => Ok(Operation::Search),
            "save" => Ok(Operation::Save),
            "destroy" => Ok(Operation::Destroy),
            _ => Err(OperationParseError(s.to_string())),
        }
    }
}

// ============================================================================
// REQUEST
// ============================================================================

/// One indirection operation: key, operation, options, payload and an
/// optional transport override.
#[derive(Debug, Clone, PartialEq)]
pub struct Request<M> {
    id: Uuid,
    key: String,
    operation: Operation,
    options: RequestOptions,
    instance: Option<M>,
    environment: Option<String>,
    server: Option<String>,
    port: Option<u16>,
}

impl<M> Request<M> {
    /// Build a request, checking the payload against the operation.
    ///
    /// `save` requires an instance; every other operation must not carry one.
    /// Options on `save`/`destroy` are rejected later, at terminus entry, so the
    /// violation is reported by the backend that would have sent them.
    pub fn new(
        operation: Operation,
        key: impl Into<String>,
        options: RequestOptions,
        instance: Option<M>,
    ) -> IndirectorResult<Self> {
        match (operation, instance.is_some()) {
            (Operation::Save, false) => {
                return Err(IndirectorError::invalid_argument(
                    "save requires an instance",
                ))
            }
            (Operation::Find | Operation::Search | Operation::Destroy, true) => {
                return Err(IndirectorError::invalid_argument(format!(
                    "{} does not accept an instance",
                    operation
                )))
            }
            _ => {}
        }

        Ok(Self {
            id: Uuid::now_v7(),
            key: key.into(),
            operation,
            options,
            instance,
            environment: None,
            server: None,
            port: None,
        })
    }

    fn bare(operation: Operation, key: impl Into<String>, instance: Option<M>) -> Self {
        Self {
            id: Uuid::now_v7(),
            key: key.into(),
            operation,
            options: RequestOptions::new(),
            instance,
            environment: None,
            server: None,
            port: None,
        }
    }

    pub fn find(key: impl Into<String>) -> Self {
        Self::bare(Operation::Find, key, None)
    }

    pub fn search(key: impl Into<String>) -> Self {
        Self::bare(Operation::Search, key, None)
    }

    pub fn save(key: impl Into<String>, instance: M) -> Self {
        Self::bare(Operation::Save, key, Some(instance))
    }

    pub fn destroy(key: impl Into<String>) -> Self {
        Self::bare(Operation::Destroy, key, None)
    }

    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options.extend(options);
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Correlation id for logging.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    pub fn instance(&self) -> Option<&M> {
        self.instance.as_ref()
    }

    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    pub fn server(&self) -> Option<&str> {
        self.server.as_deref()
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// The key, percent-escaped for use as a single path segment.
    pub fn escaped_key(&self) -> String {
        urlencoding::encode(&self.key).into_owned()
    }

    /// Options as `(name, value)` query pairs. String values are passed
    /// through as-is; everything else is rendered as JSON.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.options
            .iter()
            .map(|(name, value)| {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (name.clone(), value)
            })
            .collect()
    }

    /// Fail with `InvalidArgument` when options are present on an operation
    /// that does not take them.
    pub fn ensure_no_options(&self) -> IndirectorResult<()> {
        if self.operation.rejects_options() && !self.options.is_empty() {
            return Err(IndirectorError::invalid_argument(format!(
                "{} does not accept options",
                self.operation
            )));
        }
        Ok(())
    }

    /// The instance, or `InvalidArgument` when it is missing.
    pub fn require_instance(&self) -> IndirectorResult<&M> {
        self.instance.as_ref().ok_or_else(|| {
            IndirectorError::invalid_argument(format!("{} requires an instance", self.operation))
        })
    }
}
