//! Payload models and their wire formats.
//!
//! The framework never looks inside a payload. It threads a content-type
//! string from the `Accept` header through to [`Model::convert_from`] and lets
//! the model decide how bytes become objects.

use crate::FormatError;
use serde::{de::DeserializeOwned, Serialize};

/// Content type for JSON payloads.
pub const JSON: &str = "application/json";

/// Content type for YAML payloads.
pub const YAML: &str = "text/yaml";

/// Built-in serde-backed formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Json,
    Yaml,
}

impl Format {
    pub fn content_type(&self) -> &'static str {
        match self {
            Format::Json => JSON,
            Format::Yaml => YAML,
        }
    }

    /// Resolve a `content-type` header value. Parameters such as `charset`
    /// are ignored.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            "application/json" | "text/json" | "json" => Some(Format::Json),
            "text/yaml" | "application/yaml" | "application/x-yaml" | "text/x-yaml" | "yaml" => {
                Some(Format::Yaml)
            }
            _ => None,
        }
    }

    /// Like [`Format::from_content_type`], but unknown types are an error.
    pub fn require(content_type: &str) -> Result<Self, FormatError> {
        Self::from_content_type(content_type).ok_or_else(|| FormatError::UnsupportedContentType {
            content_type: content_type.to_string(),
        })
    }

    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, FormatError> {
        let encoded = match self {
            Format::Json => serde_json::to_vec(value).map_err(|e| e.to_string()),
            Format::Yaml => serde_yaml::to_string(value)
                .map(String::into_bytes)
                .map_err(|e| e.to_string()),
        };
        encoded.map_err(|reason| FormatError::Encode {
            content_type: self.content_type().to_string(),
            reason,
        })
    }

    pub fn decode<T: DeserializeOwned>(&self, body: &[u8]) -> Result<T, FormatError> {
        let decoded = match self {
            Format::Json => serde_json::from_slice(body).map_err(|e| e.to_string()),
            Format::Yaml => serde_yaml::from_slice(body).map_err(|e| e.to_string()),
        };
        decoded.map_err(|reason| FormatError::Decode {
            content_type: self.content_type().to_string(),
            reason,
        })
    }
}

/// An object kind that can travel through an indirection.
///
/// Every hook has a serde-backed default covering [`JSON`] and [`YAML`].
/// Models with their own wire formats override `supported_formats` together
/// with the conversion hooks.
pub trait Model: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Content types this model can be rendered in, most preferred first.
    fn supported_formats() -> Vec<String> {
        vec![JSON.to_string(), YAML.to_string()]
    }

    /// The content type used when rendering an instance for upload.
    fn default_format() -> String {
        Self::supported_formats()
            .into_iter()
            .next()
            .unwrap_or_else(|| JSON.to_string())
    }

    fn render(&self, content_type: &str) -> Result<Vec<u8>, FormatError> {
        Format::require(content_type)?.encode(self)
    }

    fn convert_from(content_type: &str, body: &[u8]) -> Result<Self, FormatError> {
        Format::require(content_type)?.decode(body)
    }

    fn convert_from_multiple(content_type: &str, body: &[u8]) -> Result<Vec<Self>, FormatError> {
        Format::require(content_type)?.decode(body)
    }
}

impl Model for String {}

impl Model for serde_json::Value {}
