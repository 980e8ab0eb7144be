//! Indirector Test Utilities
//!
//! Centralized test infrastructure for the indirector workspace:
//! - Fixture models (one serde-backed, one with its own wire format)
//! - A recording HTTP transport spy with canned responses
//! - Proptest generators for keys and models

pub use indirector_core::{
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, IndirectorError, IndirectorResult,
    Model, Request, FormatError, JSON, YAML,
};

use async_trait::async_trait;
use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

// ============================================================================
// FIXTURE MODELS
// ============================================================================

/// Fact set for one node. Uses the default JSON/YAML formats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFacts {
    pub name: String,
    pub values: BTreeMap<String, String>,
}

impl NodeFacts {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn with_fact(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

impl Model for NodeFacts {}

/// Content type of the [`Certificate`] line format.
pub const X_MODEL: &str = "text/x-model";

/// Certificate stub with a line-oriented `text/x-model` format:
/// `name=<name>\nserial=<serial>\n`, documents separated by `---\n`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub name: String,
    pub serial: u64,
}

impl Certificate {
    pub fn new(name: impl Into<String>, serial: u64) -> Self {
        Self {
            name: name.into(),
            serial,
        }
    }

    fn parse_one(text: &str) -> Result<Self, FormatError> {
        let decode_err = |reason: String| FormatError::Decode {
            content_type: X_MODEL.to_string(),
            reason,
        };
        let mut name = None;
        let mut serial = None;
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let (field, value) = line
                .split_once('=')
                .ok_or_else(|| decode_err(format!("malformed line '{}'", line)))?;
            match field.trim() {
                "name" => name = Some(value.trim().to_string()),
                "serial" => {
                    serial = Some(
                        value
                            .trim()
                            .parse::<u64>()
                            .map_err(|e| decode_err(e.to_string()))?,
                    )
                }
                other => return Err(decode_err(format!("unknown field '{}'", other))),
            }
        }
        Ok(Self {
            name: name.ok_or_else(|| decode_err("missing name".to_string()))?,
            serial: serial.ok_or_else(|| decode_err("missing serial".to_string()))?,
        })
    }
}

impl Model for Certificate {
    fn supported_formats() -> Vec<String> {
        vec![X_MODEL.to_string(), JSON.to_string()]
    }

    fn render(&self, content_type: &str) -> Result<Vec<u8>, FormatError> {
        if content_type.eq_ignore_ascii_case(X_MODEL) {
            return Ok(format!("name={}\nserial={}\n", self.name, self.serial).into_bytes());
        }
        indirector_core::Format::require(content_type)?.encode(self)
    }

    fn convert_from(content_type: &str, body: &[u8]) -> Result<Self, FormatError> {
        if content_type.eq_ignore_ascii_case(X_MODEL) {
            return Self::parse_one(&String::from_utf8_lossy(body));
        }
        indirector_core::Format::require(content_type)?.decode(body)
    }

    fn convert_from_multiple(content_type: &str, body: &[u8]) -> Result<Vec<Self>, FormatError> {
        if content_type.eq_ignore_ascii_case(X_MODEL) {
            return String::from_utf8_lossy(body)
                .split("---\n")
                .filter(|doc| !doc.trim().is_empty())
                .map(Self::parse_one)
                .collect();
        }
        indirector_core::Format::require(content_type)?.decode(body)
    }
}

// ============================================================================
// CANNED RESPONSES
// ============================================================================

pub fn not_found() -> HttpResponse {
    HttpResponse::new(404, "Not Found")
}

/// 200 with the given content type and body.
pub fn ok_with(content_type: &str, body: impl Into<Vec<u8>>) -> HttpResponse {
    HttpResponse::new(200, "OK")
        .with_header("content-type", content_type)
        .with_body(body)
}

/// 200 with a JSON-rendered body.
pub fn ok_json<T: Serialize>(value: &T) -> HttpResponse {
    let body = serde_json::to_vec(value).unwrap_or_default();
    ok_with(JSON, body)
}

/// Arbitrary status with no content type.
pub fn status(code: u16, message: &str) -> HttpResponse {
    HttpResponse::new(code, message)
}

// ============================================================================
// RECORDING TRANSPORT
// ============================================================================

/// Transport spy: records every request and replays queued responses in
/// order. When the queue is empty it answers `404 Not Found`.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    requests: Mutex<Vec<HttpRequest>>,
    responses: Mutex<VecDeque<IndirectorResult<HttpResponse>>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond_with(responses: impl IntoIterator<Item = HttpResponse>) -> Self {
        let transport = Self::new();
        for response in responses {
            transport.push(response);
        }
        transport
    }

    pub fn push(&self, response: HttpResponse) {
        self.push_result(Ok(response));
    }

    /// Queue a transport-level failure.
    pub fn push_error(&self, error: IndirectorError) {
        self.push_result(Err(error));
    }

    fn push_result(&self, result: IndirectorResult<HttpResponse>) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(result);
    }

    pub fn calls(&self) -> usize {
        self.requests().len()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn last_request(&self) -> Option<HttpRequest> {
        self.requests().pop()
    }
}

#[async_trait]
impl HttpTransport for RecordingTransport {
    async fn execute(&self, request: HttpRequest) -> IndirectorResult<HttpResponse> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Ok(not_found()))
    }
}

// ============================================================================
// GENERATORS
// ============================================================================

/// Keys as they occur in practice: hostnames, paths, and the odd space.
pub fn arb_key() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9][a-zA-Z0-9 ./_:-]{0,40}"
}

pub fn arb_node_facts() -> impl Strategy<Value = NodeFacts> {
    (
        "[a-z][a-z0-9.-]{0,20}",
        prop::collection::btree_map("[a-z_]{1,12}", "[ -~]{0,24}", 0..8),
    )
        .prop_map(|(name, values)| NodeFacts { name, values })
}

pub fn arb_certificate() -> impl Strategy<Value = Certificate> {
    ("[a-z][a-z0-9.-]{0,20}", any::<u64>()).prop_map(|(name, serial)| Certificate { name, serial })
}
