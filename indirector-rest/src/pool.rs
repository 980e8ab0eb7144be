//! Pooled HTTP clients.
//!
//! One `reqwest::Client` per `(server, port)`, created on first use and shared
//! by every terminus that talks to that target. `reqwest::Client` keeps its own
//! connection pool and is cheap to clone, so handing out clones is safe from
//! any task.

use async_trait::async_trait;
use dashmap::DashMap;
use indirector_core::{
    HttpConfig, HttpMethod, HttpRequest, HttpResponse, HttpTransport, IndirectorError,
    IndirectorResult,
};

#[derive(Debug)]
pub struct HttpPool {
    config: HttpConfig,
    clients: DashMap<(String, u16), reqwest::Client>,
}

impl HttpPool {
    pub fn new(config: HttpConfig) -> Self {
        Self {
            config,
            clients: DashMap::new(),
        }
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// The client for `server:port`, building it on first use.
    pub fn client(&self, server: &str, port: u16) -> IndirectorResult<reqwest::Client> {
        let key = (server.to_string(), port);
        if let Some(client) = self.clients.get(&key) {
            return Ok(client.clone());
        }

        let entry = self.clients.entry(key).or_try_insert_with(|| {
            tracing::debug!(server, port, "Opening HTTP client");
            self.build_client()
                .map_err(|e| transport_error(&format!("{}:{}", server, port), &e))
        })?;
        Ok(entry.value().clone())
    }

    /// Number of distinct targets with a live client.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Drop every client; connections close once in-flight calls finish.
    pub fn clear(&self) {
        self.clients.clear();
    }

    fn build_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .connect_timeout(self.config.connect_timeout())
            .timeout(self.config.request_timeout())
            .pool_idle_timeout(self.config.pool_idle_timeout())
            .build()
    }
}

/// [`HttpTransport`] over an [`HttpPool`].
#[derive(Debug)]
pub struct PooledTransport {
    pool: HttpPool,
}

impl PooledTransport {
    pub fn new(config: HttpConfig) -> Self {
        Self {
            pool: HttpPool::new(config),
        }
    }

    pub fn pool(&self) -> &HttpPool {
        &self.pool
    }

    fn url(&self, request: &HttpRequest) -> String {
        format!(
            "{}://{}:{}{}",
            self.pool.config().scheme,
            request.server,
            request.port,
            request.path_and_query()
        )
    }
}

#[async_trait]
impl HttpTransport for PooledTransport {
    async fn execute(&self, request: HttpRequest) -> IndirectorResult<HttpResponse> {
        let client = self.pool.client(&request.server, request.port)?;
        let target = request.target();

        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };
        let mut builder = client.request(method, self.url(&request));
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(&target, &e))?;

        let status = response.status();
        let mut converted = HttpResponse::new(status.as_u16(), reason_phrase(&response));
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                converted = converted.with_header(name.as_str(), value);
            }
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(&target, &e))?;
        Ok(converted.with_body(body.to_vec()))
    }
}

/// Reason phrase as sent by the server, falling back to the canonical one.
/// Only a phrase that differs from the canonical one is kept by the client.
fn reason_phrase(response: &reqwest::Response) -> String {
    response
        .extensions()
        .get::<hyper::ext::ReasonPhrase>()
        .and_then(|phrase| std::str::from_utf8(phrase.as_bytes()).ok())
        .or_else(|| response.status().canonical_reason())
        .unwrap_or_default()
        .to_string()
}

fn transport_error(target: &str, err: &reqwest::Error) -> IndirectorError {
    IndirectorError::Transport {
        target: target.to_string(),
        reason: err.to_string(),
        timed_out: err.is_timeout(),
    }
}
