use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_LENGTH, IF_MATCH,
};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use eventhorizon_observability::redact_authorization;
use eventhorizon_types::{LastTurnLog, Resource, TaskRef, Turn, TurnLog, TurnRef, TurnSpec};
use eventhorizon_wire::{
    ConflictError, ErrorResponse, ListPage, UploadTurnLogsRequest, UploadTurnLogsResponse,
};

use crate::config::{ClientConfig, RequestOptions};
use crate::error::{Error, Result};

pub const FEATURE_FLAGS_HEADER: &str = "x-eventhorizon-featureflags";
pub const DELEGATED_AUTH_TYPE_HEADER: &str = "x-eventhorizon-delegated-auth-type";
pub const DELEGATED_AUTH_TOKEN_HEADER: &str = "x-eventhorizon-delegated-auth-token";
pub const LAST_EVENT_ID_HEADER: &str = "last-event-id";

const JSON: &str = "application/json";
const EVENT_STREAM: &str = "text/event-stream";

/// Query options of list endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub include_deleted: bool,
    /// `nextToken` of the previous page.
    pub token: Option<String>,
    pub limit: Option<u32>,
}

impl ListOptions {
    fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if self.include_deleted {
            query.push(("includeDeleted", "true".to_string()));
        }
        if let Some(token) = self.token.as_deref().filter(|token| !token.is_empty()) {
            query.push(("token", token.to_string()));
        }
        if let Some(limit) = self.limit {
            query.push(("limit", limit.to_string()));
        }
        query
    }
}

/// Anything that accepts a batch of turn logs under a version precondition.
#[async_trait]
pub trait TurnLogSink: Send + Sync {
    async fn upload_turn_logs(
        &self,
        tenant_id: &str,
        request: &UploadTurnLogsRequest,
    ) -> Result<UploadTurnLogsResponse>;
}

/// Transport for the `/v1` API. Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: Url,
    token: Option<String>,
    timeout: Duration,
    defaults: RequestOptions,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url.as_str())
            .field(
                "token",
                &self
                    .token
                    .as_deref()
                    .map(|token| redact_authorization(&format!("Bearer {token}"))),
            )
            .field("timeout", &self.timeout)
            .field("feature_flags", &self.defaults.feature_flags)
            .finish()
    }
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let base_url = Url::parse(config.base_url.trim()).map_err(|err| {
            Error::InvalidRequest(format!("invalid base URL `{}`: {err}", config.base_url))
        })?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            return Err(Error::InvalidRequest(format!(
                "base URL `{base_url}` must be an absolute http(s) URL"
            )));
        }
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent)
            .build()?;
        Ok(Self {
            http,
            base_url,
            token: config.token.filter(|token| !token.trim().is_empty()),
            timeout: config.timeout,
            defaults: config.defaults,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn request_options(&self) -> &RequestOptions {
        &self.defaults
    }

    /// A clone whose requests carry `options` layered over the current defaults.
    pub fn with_request_options(&self, options: &RequestOptions) -> Self {
        let mut client = self.clone();
        client.defaults = self.defaults.merged(options);
        client
    }

    /// `base_url` + `/v1` + one percent-encoded segment per element.
    ///
    /// Empty, `.` and `..` segments are rejected: URL normalization would
    /// collapse them (even percent-encoded) and address a different endpoint.
    pub fn url(&self, segments: &[String]) -> Result<Url> {
        if let Some(segment) = segments
            .iter()
            .find(|segment| matches!(segment.as_str(), "" | "." | ".."))
        {
            return Err(Error::InvalidRequest(format!(
                "`{segment}` is not a valid path identifier"
            )));
        }
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                Error::InvalidRequest(format!("base URL `{}` cannot carry a path", self.base_url))
            })?;
            path.pop_if_empty().push("v1");
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    fn headers(&self, options: &RequestOptions, if_match: Option<i64>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(JSON));
        if let Some(token) = &self.token {
            headers.insert(AUTHORIZATION, header_value("authorization", &format!("Bearer {token}"))?);
        }
        if let Some(version) = if_match {
            headers.insert(IF_MATCH, HeaderValue::from(version));
        }
        if !options.feature_flags.is_empty() {
            let encoded = serde_json::to_string(&options.feature_flags)?;
            headers.insert(
                HeaderName::from_static(FEATURE_FLAGS_HEADER),
                header_value(FEATURE_FLAGS_HEADER, &encoded)?,
            );
        }
        if let Some(auth) = &options.delegated_auth {
            headers.insert(
                HeaderName::from_static(DELEGATED_AUTH_TYPE_HEADER),
                header_value(DELEGATED_AUTH_TYPE_HEADER, &auth.auth_type)?,
            );
            headers.insert(
                HeaderName::from_static(DELEGATED_AUTH_TOKEN_HEADER),
                header_value(DELEGATED_AUTH_TOKEN_HEADER, &auth.token)?,
            );
        }
        Ok(headers)
    }

    fn request(
        &self,
        method: Method,
        segments: &[String],
        if_match: Option<i64>,
    ) -> Result<RequestBuilder> {
        let url = self.url(segments)?;
        debug!(method = %method, url = %url, if_match, "eventhorizon request");
        Ok(self
            .http
            .request(method, url)
            .headers(self.headers(&self.defaults, if_match)?)
            .timeout(self.timeout))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = check(request.send().await?).await?;
        decode(response).await
    }

    async fn send_json<B, T>(&self, request: RequestBuilder, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(request.json(body)).await
    }

    pub async fn get<R: Resource>(
        &self,
        parent: &R::Parent,
        id: &str,
        include_deleted: bool,
    ) -> Result<R> {
        let mut request = self.request(Method::GET, &R::item_path(parent, id), None)?;
        if include_deleted {
            request = request.query(&[("includeDeleted", "true")]);
        }
        self.send(request).await
    }

    pub async fn list<R: Resource>(
        &self,
        parent: &R::Parent,
        options: &ListOptions,
    ) -> Result<ListPage<R>> {
        let request = self
            .request(Method::GET, &R::collection_path(parent), None)?
            .query(&options.query());
        self.send(request).await
    }

    /// Follows `nextToken` until the collection is exhausted.
    pub async fn list_all<R: Resource>(
        &self,
        parent: &R::Parent,
        include_deleted: bool,
    ) -> Result<Vec<R>> {
        let mut options = ListOptions {
            include_deleted,
            ..ListOptions::default()
        };
        let mut items = Vec::new();
        loop {
            let page = self.list::<R>(parent, &options).await?;
            items.extend(page.items);
            match page.next_token {
                Some(token) if !token.is_empty() => options.token = Some(token),
                _ => return Ok(items),
            }
        }
    }

    pub async fn create<R: Resource>(
        &self,
        parent: &R::Parent,
        id: &str,
        spec: &R::Spec,
    ) -> Result<R> {
        let request = self.request(Method::PUT, &R::item_path(parent, id), None)?;
        self.send_json(request, spec).await
    }

    /// Applies `update` if the server still holds `version`.
    pub async fn update<R: Resource>(
        &self,
        parent: &R::Parent,
        id: &str,
        version: i64,
        update: &R::Update,
    ) -> Result<R> {
        let request = self.request(Method::PATCH, &R::item_path(parent, id), Some(version))?;
        self.send_json(request, update).await
    }

    /// Soft-deletes the resource if the server still holds `version`.
    pub async fn delete<R: Resource>(&self, parent: &R::Parent, id: &str, version: i64) -> Result<()> {
        let request = self.request(Method::DELETE, &R::item_path(parent, id), Some(version))?;
        check(request.send().await?).await?;
        Ok(())
    }

    /// Read-modify-write under the version precondition.
    ///
    /// Reads the resource (tombstones included), asks `transform` for an
    /// update and writes it with `If-Match`. On a conflict the transform is
    /// re-run against the server's current state, up to `attempts` writes in
    /// total. Returning `None` from `transform` aborts with the current value.
    pub async fn update_with<R, F>(
        &self,
        parent: &R::Parent,
        id: &str,
        attempts: usize,
        mut transform: F,
    ) -> Result<R>
    where
        R: Resource,
        F: FnMut(&R) -> Option<R::Update> + Send,
    {
        let mut current: R = self.get(parent, id, true).await?;
        let mut remaining = attempts.max(1);
        loop {
            let Some(update) = transform(&current) else {
                return Ok(current);
            };
            match self.update::<R>(parent, id, current.version(), &update).await {
                Ok(updated) => return Ok(updated),
                Err(Error::Conflict(conflict)) if remaining > 1 => {
                    remaining -= 1;
                    warn!(
                        kind = R::KIND,
                        id,
                        stale_version = current.version(),
                        current_version = conflict.current.version(),
                        "version conflict, retrying update"
                    );
                    current = match conflict.current.into_resource::<R>() {
                        Some(fresh) => fresh,
                        None => self.get(parent, id, true).await?,
                    };
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Starts the next turn of a task; the server assigns the turn index.
    pub async fn create_turn(
        &self,
        task: &TaskRef,
        spec: &TurnSpec,
        task_version: Option<i64>,
    ) -> Result<Turn> {
        let request = self.request(Method::PUT, &Turn::collection_path(task), task_version)?;
        self.send_json(request, spec).await
    }

    pub async fn list_turn_logs(
        &self,
        turn: &TurnRef,
        options: &ListOptions,
    ) -> Result<ListPage<TurnLog>> {
        let request = self
            .request(Method::GET, &turn.logs_path(), None)?
            .query(&options.query());
        self.send(request).await
    }

    /// Fails with [`Error::NotFound`] when the turn has no logs yet.
    pub async fn last_turn_log(&self, turn: &TurnRef) -> Result<LastTurnLog> {
        let mut path = turn.logs_path();
        path.push("last".to_string());
        let request = self.request(Method::GET, &path, None)?;
        self.send(request).await
    }

    /// Index the next uploaded log of `turn` must carry.
    pub async fn next_log_index(&self, turn: &TurnRef) -> Result<u64> {
        match self.last_turn_log(turn).await {
            Ok(last) => Ok(last.next_index()),
            Err(err) if err.is_not_found() => Ok(1),
            Err(err) => Err(err),
        }
    }

    pub async fn upload_turn_logs(
        &self,
        tenant_id: &str,
        request: &UploadTurnLogsRequest,
    ) -> Result<UploadTurnLogsResponse> {
        let turn = TurnRef::new(tenant_id, request.task_id.as_str(), request.turn_index);
        let builder = self.request(Method::POST, &turn.logs_path(), None)?;
        self.send_json(builder, request).await
    }

    /// Opens the SSE log stream of `turn`.
    ///
    /// `Ok(None)` means the server has nothing more to send (`204` or an
    /// empty body). The response has no overall timeout.
    pub async fn open_log_stream(
        &self,
        turn: &TurnRef,
        last_id: i64,
        include_deleted: bool,
        options: &RequestOptions,
    ) -> Result<Option<Response>> {
        let mut path = turn.logs_path();
        path.push("stream".to_string());
        let url = self.url(&path)?;
        let mut headers = self.headers(&self.defaults.merged(options), None)?;
        headers.insert(ACCEPT, HeaderValue::from_static(EVENT_STREAM));
        if last_id != 0 {
            headers.insert(
                HeaderName::from_static(LAST_EVENT_ID_HEADER),
                HeaderValue::from(last_id),
            );
        }
        debug!(url = %url, last_id, "opening turn log stream");
        let mut request = self.http.get(url).headers(headers);
        if include_deleted {
            request = request.query(&[("includeDeleted", "true")]);
        }
        let response = check(request.send().await?).await?;
        let empty = response.status() == StatusCode::NO_CONTENT
            || response
                .headers()
                .get(CONTENT_LENGTH)
                .and_then(|value| value.to_str().ok())
                .is_some_and(|value| value.trim() == "0");
        Ok((!empty).then_some(response))
    }
}

#[async_trait]
impl TurnLogSink for Client {
    async fn upload_turn_logs(
        &self,
        tenant_id: &str,
        request: &UploadTurnLogsRequest,
    ) -> Result<UploadTurnLogsResponse> {
        Client::upload_turn_logs(self, tenant_id, request).await
    }
}

#[async_trait]
impl<T: TurnLogSink + ?Sized> TurnLogSink for std::sync::Arc<T> {
    async fn upload_turn_logs(
        &self,
        tenant_id: &str,
        request: &UploadTurnLogsRequest,
    ) -> Result<UploadTurnLogsResponse> {
        (**self).upload_turn_logs(tenant_id, request).await
    }
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|err| Error::InvalidRequest(format!("invalid value for header `{name}`: {err}")))
}

/// Maps non-success statuses onto the error taxonomy.
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await?;
    match status {
        StatusCode::CONFLICT => Err(serde_json::from_str::<ConflictError>(&body)?.into()),
        StatusCode::NOT_FOUND => Err(Error::NotFound(error_envelope(status, &body))),
        _ => Err(Error::Service(error_envelope(status, &body))),
    }
}

fn error_envelope(status: StatusCode, body: &str) -> ErrorResponse {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(mut envelope) => {
            if envelope.response_code == 0 {
                envelope.response_code = status.as_u16();
            }
            if envelope.message.is_empty() {
                envelope.message = format!("request failed with status {}", status.as_u16());
            }
            envelope
        }
        Err(_) => ErrorResponse::from_status(status.as_u16(), body),
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DelegatedAuth;
    use eventhorizon_types::{Environment, FeatureFlagOverride, Tenant};
    use std::collections::BTreeMap;

    fn client(base: &str) -> Client {
        Client::new(ClientConfig::new(base).with_token("secret-token")).expect("client")
    }

    #[test]
    fn rejects_non_http_base_urls() {
        assert!(matches!(
            Client::new(ClientConfig::new("ftp://example.com")),
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(
            Client::new(ClientConfig::new("not a url")),
            Err(Error::InvalidRequest(_))
        ));
    }

    #[test]
    fn paths_escape_every_identifier_segment() {
        let client = client("https://api.example.com/");
        let url = client
            .url(&Environment::item_path("acme/eu", "prod%1 x?y#z"))
            .expect("url");
        assert_eq!(
            url.path(),
            "/v1/tenants/acme%2Feu/environments/prod%251%20x%3Fy%23z"
        );
        assert!(url.query().is_none());
    }

    #[test]
    fn dot_and_empty_identifiers_are_rejected() {
        let client = client("https://api.example.com/");
        for id in ["..", ".", ""] {
            let err = client
                .url(&Environment::item_path("acme", id))
                .unwrap_err();
            assert!(matches!(err, Error::InvalidRequest(_)), "id {id:?}: {err:?}");
        }
        let turn = TurnRef::new("acme", "..", 2);
        let err = client.url(&turn.logs_path()).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
        let url = client
            .url(&Environment::item_path("acme", "..."))
            .expect("three dots are an ordinary segment");
        assert_eq!(url.path(), "/v1/tenants/acme/environments/...");
    }

    #[test]
    fn paths_keep_a_base_prefix() {
        let client = client("https://gw.example.com/eventhorizon");
        let url = client
            .url(&FeatureFlagOverride::item_path("fast-logs", "acme"))
            .expect("url");
        assert_eq!(
            url.as_str(),
            "https://gw.example.com/eventhorizon/v1/feature-flags/fast-logs/overrides/acme"
        );
        let url = client.url(&Tenant::item_path(&(), "acme")).expect("url");
        assert_eq!(url.path(), "/eventhorizon/v1/tenants/acme");
    }

    #[test]
    fn headers_carry_flags_auth_and_precondition() {
        let client = client("https://api.example.com");
        let options = RequestOptions {
            feature_flags: BTreeMap::from([("zeta".to_string(), false), ("alpha".to_string(), true)]),
            delegated_auth: Some(DelegatedAuth {
                auth_type: "github".to_string(),
                token: "gho_123".to_string(),
            }),
        };
        let headers = client.headers(&options, Some(7)).expect("headers");
        assert_eq!(headers[IF_MATCH], "7");
        assert_eq!(headers[AUTHORIZATION], "Bearer secret-token");
        let flags: BTreeMap<String, bool> =
            serde_json::from_str(headers[FEATURE_FLAGS_HEADER].to_str().expect("ascii"))
                .expect("flags json");
        assert_eq!(flags, options.feature_flags);
        assert_eq!(headers[DELEGATED_AUTH_TYPE_HEADER], "github");
        assert_eq!(headers[DELEGATED_AUTH_TOKEN_HEADER], "gho_123");
    }

    #[test]
    fn delegated_credentials_are_sent_verbatim() {
        let client = client("https://api.example.com");
        let options = RequestOptions {
            feature_flags: BTreeMap::new(),
            delegated_auth: Some(DelegatedAuth {
                auth_type: " github".to_string(),
                token: "gho_123 ".to_string(),
            }),
        };
        let headers = client.headers(&options, None).expect("headers");
        assert_eq!(headers[DELEGATED_AUTH_TYPE_HEADER], " github");
        assert_eq!(headers[DELEGATED_AUTH_TOKEN_HEADER], "gho_123 ");

        let options = RequestOptions {
            feature_flags: BTreeMap::new(),
            delegated_auth: Some(DelegatedAuth {
                auth_type: "github".to_string(),
                token: "gho\n123".to_string(),
            }),
        };
        let err = client.headers(&options, None).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn empty_flags_send_no_header() {
        let client = client("https://api.example.com");
        let headers = client
            .headers(&RequestOptions::default(), None)
            .expect("headers");
        assert!(!headers.contains_key(FEATURE_FLAGS_HEADER));
        assert!(!headers.contains_key(IF_MATCH));
    }

    #[test]
    fn debug_output_redacts_the_token() {
        let rendered = format!("{:?}", client("https://api.example.com"));
        assert!(!rendered.contains("secret-token"));
    }

    #[test]
    fn list_query_skips_unset_options() {
        assert!(ListOptions::default().query().is_empty());
        let query = ListOptions {
            include_deleted: true,
            token: Some("abc".to_string()),
            limit: Some(50),
        }
        .query();
        assert_eq!(
            query,
            vec![
                ("includeDeleted", "true".to_string()),
                ("token", "abc".to_string()),
                ("limit", "50".to_string()),
            ]
        );
    }

    #[test]
    fn error_envelope_falls_back_to_status() {
        let envelope = error_envelope(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>");
        assert_eq!(envelope.response_code, 502);
        assert_eq!(envelope.message, "<html>bad gateway</html>");
        let envelope = error_envelope(StatusCode::FORBIDDEN, r#"{"errorType":"Forbidden"}"#);
        assert_eq!(envelope.response_code, 403);
        assert_eq!(envelope.message, "request failed with status 403");
    }
}
