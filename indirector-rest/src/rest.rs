//! Terminus over HTTP(S).
//!
//! | Operation | Verb   | Path                          | Body               |
//! |-----------|--------|-------------------------------|--------------------|
//! | find      | GET    | `/{env}/{indirection}/{key}`  | none               |
//! | search    | GET    | `/{env}/{indirection}s/{key}` | none               |
//! | save      | PUT    | `/{env}/{indirection}/{key}`  | rendered instance  |
//! | destroy   | DELETE | `/{env}/{indirection}/{key}`  | none               |
//!
//! Every call sends `Accept` with the model's supported formats.

use crate::response::{deserialize, deserialize_multiple, remote_error};
use crate::uri::indirection_path;
use async_trait::async_trait;
use indirector_core::{
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, IndirectorResult, Model, Request,
    Settings, Terminus, DEFAULT_PORT_SETTING, DEFAULT_SERVER_SETTING,
};
use std::marker::PhantomData;
use std::sync::Arc;

/// Terminus class name of [`RestTerminus`].
pub const REST_TERMINUS: &str = "rest";

/// Default target of a [`RestTerminus`], resolved once at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestTarget {
    pub scheme: String,
    pub server: String,
    pub port: u16,
    pub environment: String,
}

impl RestTarget {
    /// Resolve the target from `settings`. `server_setting` and
    /// `port_setting` name the settings to read; `None` falls back to
    /// `server` and `masterport`.
    pub fn from_settings(
        settings: &Settings,
        server_setting: Option<&str>,
        port_setting: Option<&str>,
    ) -> IndirectorResult<Self> {
        let server = settings.require(server_setting.unwrap_or(DEFAULT_SERVER_SETTING))?;
        let port = settings.port(port_setting.unwrap_or(DEFAULT_PORT_SETTING))?;
        Ok(Self {
            scheme: settings.http().scheme.clone(),
            server,
            port,
            environment: settings.environment(),
        })
    }
}

pub struct RestTerminus<M> {
    indirection: String,
    target: RestTarget,
    transport: Arc<dyn HttpTransport>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> RestTerminus<M> {
    pub fn new(
        indirection: impl Into<String>,
        target: RestTarget,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            indirection: indirection.into(),
            target,
            transport,
            _model: PhantomData,
        }
    }

    pub fn indirection(&self) -> &str {
        &self.indirection
    }

    pub fn target(&self) -> &RestTarget {
        &self.target
    }

    /// `Accept` value: the model's formats, most preferred first.
    pub fn accept_header() -> String {
        M::supported_formats().join(", ")
    }

    fn http_request(&self, method: HttpMethod, request: &Request<M>) -> HttpRequest {
        let query = match method {
            HttpMethod::Get => request.query_pairs(),
            HttpMethod::Put | HttpMethod::Delete => Vec::new(),
        };
        HttpRequest {
            method,
            server: request
                .server()
                .map(str::to_string)
                .unwrap_or_else(|| self.target.server.clone()),
            port: request.port().unwrap_or(self.target.port),
            path: indirection_path(&self.indirection, request, &self.target.environment),
            query,
            headers: vec![("Accept".to_string(), Self::accept_header())],
            body: None,
        }
    }

    /// Execute and return the response with the URL it came from.
    async fn send(
        &self,
        http: HttpRequest,
        request: &Request<M>,
    ) -> IndirectorResult<(HttpResponse, String)> {
        let url = format!(
            "{}://{}{}",
            self.target.scheme,
            http.target(),
            http.path_and_query()
        );
        tracing::debug!(
            request_id = %request.id(),
            method = %http.method,
            url = %url,
            "Sending REST request"
        );

        let response = self.transport.execute(http).await?;
        if !response.is_success() && response.status != 404 {
            tracing::warn!(
                request_id = %request.id(),
                status = response.status,
                message = %response.message,
                url = %url,
                "REST request failed"
            );
        }
        Ok((response, url))
    }
}

#[async_trait]
impl<M: Model> Terminus<M> for RestTerminus<M> {
    fn name(&self) -> &str {
        REST_TERMINUS
    }

    async fn find(&self, request: &Request<M>) -> IndirectorResult<Option<M>> {
        let http = self.http_request(HttpMethod::Get, request);
        let (response, url) = self.send(http, request).await?;
        deserialize(&response, &url)
    }

    async fn search(&self, request: &Request<M>) -> IndirectorResult<Vec<M>> {
        let http = self.http_request(HttpMethod::Get, request);
        let (response, url) = self.send(http, request).await?;
        deserialize_multiple(&response, &url)
    }

    async fn save(&self, request: &Request<M>) -> IndirectorResult<M> {
        request.ensure_no_options()?;
        let instance = request.require_instance()?;
        let content_type = M::default_format();
        let body = instance.render(&content_type)?;

        let mut http = self.http_request(HttpMethod::Put, request);
        http.headers.push(("Content-Type".to_string(), content_type));
        http.body = Some(body);

        let (response, url) = self.send(http, request).await?;
        match deserialize(&response, &url)? {
            Some(saved) => Ok(saved),
            // Nothing to return the canonical form from.
            None => Err(remote_error(&response, &url).into()),
        }
    }

    async fn destroy(&self, request: &Request<M>) -> IndirectorResult<Option<M>> {
        request.ensure_no_options()?;
        let http = self.http_request(HttpMethod::Delete, request);
        let (response, url) = self.send(http, request).await?;
        deserialize(&response, &url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indirector_core::{IndirectorError, JSON, YAML};
    use indirector_test_utils::{
        arb_certificate, arb_node_facts, not_found, ok_json, ok_with, status, Certificate,
        NodeFacts, RecordingTransport, X_MODEL,
    };
    use proptest::prelude::*;
    use tokio::runtime::Runtime;

    fn target() -> RestTarget {
        RestTarget {
            scheme: "https".to_string(),
            server: "puppet".to_string(),
            port: 8140,
            environment: "production".to_string(),
        }
    }

    fn terminus<M: Model>(transport: &Arc<RecordingTransport>) -> RestTerminus<M> {
        RestTerminus::new("node", target(), transport.clone())
    }

    // ------------------------------------------------------------------------
    // target resolution
    // ------------------------------------------------------------------------

    #[test]
    fn test_target_from_default_settings() {
        let target = RestTarget::from_settings(&Settings::new(), None, None).unwrap();
        assert_eq!(target.server, "puppet");
        assert_eq!(target.port, 8140);
        assert_eq!(target.environment, "production");
    }

    #[test]
    fn test_target_from_named_settings() {
        let settings = Settings::new()
            .with_value("ca_server", "ca.example.com")
            .with_value("ca_port", "8141");
        let target =
            RestTarget::from_settings(&settings, Some("ca_server"), Some("ca_port")).unwrap();
        assert_eq!(target.server, "ca.example.com");
        assert_eq!(target.port, 8141);
    }

    #[test]
    fn test_target_with_unset_setting_fails() {
        let err = RestTarget::from_settings(&Settings::new(), Some("report_server"), None)
            .unwrap_err();
        assert!(matches!(err, IndirectorError::Config(_)));
    }

    // ------------------------------------------------------------------------
    // find
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_find_404_is_none() {
        let transport = Arc::new(RecordingTransport::respond_with([not_found()]));
        let found = terminus::<NodeFacts>(&transport)
            .find(&Request::find("web01"))
            .await
            .unwrap();
        assert_eq!(found, None);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_find_decodes_declared_content_type() {
        let body = "name=web01\nserial=12\n";
        let transport = Arc::new(RecordingTransport::respond_with([ok_with(X_MODEL, body)]));
        let found = terminus::<Certificate>(&transport)
            .find(&Request::find("web01"))
            .await
            .unwrap();
        assert_eq!(
            found,
            Some(Certificate::convert_from(X_MODEL, body.as_bytes()).unwrap())
        );
    }

    #[tokio::test]
    async fn test_find_sends_get_with_accept_and_query() {
        let transport = Arc::new(RecordingTransport::new());
        terminus::<Certificate>(&transport)
            .find(&Request::find("web 01").with_option("fail_on_404", true))
            .await
            .unwrap();

        let sent = transport.last_request().unwrap();
        assert_eq!(sent.method, HttpMethod::Get);
        assert_eq!(sent.server, "puppet");
        assert_eq!(sent.port, 8140);
        assert_eq!(sent.path, "/production/node/web%2001");
        assert_eq!(
            sent.query,
            vec![("fail_on_404".to_string(), "true".to_string())]
        );
        assert_eq!(
            sent.header("accept"),
            Some(format!("{}, {}", X_MODEL, JSON).as_str())
        );
        assert!(sent.body.is_none());
    }

    #[tokio::test]
    async fn test_request_overrides_server_and_port() {
        let transport = Arc::new(RecordingTransport::new());
        terminus::<NodeFacts>(&transport)
            .find(
                &Request::find("web01")
                    .with_server("master2.example.com")
                    .with_port(8141),
            )
            .await
            .unwrap();

        let sent = transport.last_request().unwrap();
        assert_eq!(sent.target(), "master2.example.com:8141");
    }

    #[tokio::test]
    async fn test_missing_content_type_is_fatal_for_single_object_operations() {
        let transport = Arc::new(RecordingTransport::new());
        let rest = terminus::<NodeFacts>(&transport);

        transport.push(status(200, "OK").with_body("{}"));
        let err = rest.find(&Request::find("web01")).await.unwrap_err();
        assert!(matches!(err, IndirectorError::MissingContentType { .. }));

        transport.push(status(200, "OK").with_body("{}"));
        let err = rest
            .save(&Request::save("web01", NodeFacts::new("web01")))
            .await
            .unwrap_err();
        assert!(matches!(err, IndirectorError::MissingContentType { .. }));

        transport.push(status(200, "OK").with_body("{}"));
        let err = rest.destroy(&Request::destroy("web01")).await.unwrap_err();
        assert!(matches!(err, IndirectorError::MissingContentType { .. }));
    }

    #[tokio::test]
    async fn test_remote_error_carries_status_message_and_url() {
        let transport = Arc::new(RecordingTransport::respond_with([
            status(403, "Forbidden").with_body("not allowed")
        ]));
        let err = terminus::<NodeFacts>(&transport)
            .find(&Request::find("web01"))
            .await
            .unwrap_err();
        match err {
            IndirectorError::Remote(remote) => {
                assert_eq!(remote.status, 403);
                assert_eq!(remote.message, "Forbidden");
                assert_eq!(remote.url, "https://puppet:8140/production/node/web01");
                assert_eq!(remote.body, "not allowed");
                assert!(!remote.is_transient());
            }
            other => panic!("expected remote error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transport_failure_is_passed_through() {
        let transport = Arc::new(RecordingTransport::new());
        transport.push_error(IndirectorError::Transport {
            target: "puppet:8140".to_string(),
            reason: "connection refused".to_string(),
            timed_out: false,
        });
        let err = terminus::<NodeFacts>(&transport)
            .find(&Request::find("web01"))
            .await
            .unwrap_err();
        assert!(matches!(err, IndirectorError::Transport { .. }));
    }

    // ------------------------------------------------------------------------
    // search
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_search_uses_plural_path_and_decodes_sequence() {
        let nodes = vec![NodeFacts::new("web01"), NodeFacts::new("web02")];
        let transport = Arc::new(RecordingTransport::respond_with([ok_json(&nodes)]));
        let found = terminus::<NodeFacts>(&transport)
            .search(&Request::search("web").with_environment("staging"))
            .await
            .unwrap();
        assert_eq!(found, nodes);
        assert_eq!(transport.last_request().unwrap().path, "/staging/nodes/web");
    }

    #[tokio::test]
    async fn test_search_404_is_empty() {
        let transport = Arc::new(RecordingTransport::respond_with([not_found()]));
        let found = terminus::<NodeFacts>(&transport)
            .search(&Request::search("web"))
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    // ------------------------------------------------------------------------
    // save
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_save_puts_rendered_instance_once() {
        let instance = Certificate::new("web01", 3);
        let transport = Arc::new(RecordingTransport::respond_with([ok_with(
            X_MODEL,
            "name=web01\nserial=4\n",
        )]));

        let saved = terminus::<Certificate>(&transport)
            .save(&Request::save("web01", instance.clone()))
            .await
            .unwrap();

        // Canonical form comes from the server.
        assert_eq!(saved, Certificate::new("web01", 4));
        assert_eq!(transport.calls(), 1);

        let sent = transport.last_request().unwrap();
        assert_eq!(sent.method, HttpMethod::Put);
        assert_eq!(sent.body, Some(instance.render(X_MODEL).unwrap()));
        assert_eq!(sent.header("content-type"), Some(X_MODEL));
        assert_eq!(
            sent.header("accept"),
            Some(Certificate::supported_formats().join(", ").as_str())
        );
        assert!(sent.query.is_empty());
    }

    #[tokio::test]
    async fn test_save_with_options_makes_no_call() {
        let transport = Arc::new(RecordingTransport::new());
        let err = terminus::<NodeFacts>(&transport)
            .save(&Request::save("web01", NodeFacts::new("web01")).with_option("x", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, IndirectorError::InvalidArgument { .. }));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_save_answered_with_404_is_an_error() {
        let transport = Arc::new(RecordingTransport::respond_with([not_found()]));
        let err = terminus::<NodeFacts>(&transport)
            .save(&Request::save("web01", NodeFacts::new("web01")))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    // ------------------------------------------------------------------------
    // destroy
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_destroy_with_options_makes_no_call() {
        let transport = Arc::new(RecordingTransport::new());
        let err = terminus::<NodeFacts>(&transport)
            .destroy(&Request::destroy("web01").with_option("x", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, IndirectorError::InvalidArgument { .. }));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_destroy_sends_delete() {
        let deleted = NodeFacts::new("web01");
        let transport = Arc::new(RecordingTransport::respond_with([ok_json(&deleted), not_found()]));
        let rest = terminus::<NodeFacts>(&transport);

        assert_eq!(
            rest.destroy(&Request::destroy("web01")).await.unwrap(),
            Some(deleted)
        );
        assert_eq!(rest.destroy(&Request::destroy("web01")).await.unwrap(), None);

        let sent = transport.last_request().unwrap();
        assert_eq!(sent.method, HttpMethod::Delete);
        assert!(sent.body.is_none());
    }

    // ------------------------------------------------------------------------
    // round trip
    // ------------------------------------------------------------------------

    /// Echo the PUT body back with the content type it was sent with.
    async fn echo_save<M: Model>(instance: M) -> IndirectorResult<M> {
        let transport = Arc::new(RecordingTransport::new());
        let rest = terminus::<M>(&transport);

        let rendered = instance.render(&M::default_format())?;
        transport.push(ok_with(&M::default_format(), rendered));
        rest.save(&Request::save("key", instance)).await
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_save_round_trips_node_facts(facts in arb_node_facts()) {
            let rt = Runtime::new().unwrap();
            let saved = rt.block_on(echo_save(facts.clone())).unwrap();
            prop_assert_eq!(saved, facts);
        }

        #[test]
        fn prop_save_round_trips_certificates(cert in arb_certificate()) {
            let rt = Runtime::new().unwrap();
            let saved = rt.block_on(echo_save(cert.clone())).unwrap();
            prop_assert_eq!(saved, cert);
        }
    }

    #[test]
    fn test_accept_header_lists_model_formats() {
        assert_eq!(
            RestTerminus::<NodeFacts>::accept_header(),
            format!("{}, {}", JSON, YAML)
        );
    }
}
