use std::fs;
use std::path::Path;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, InvalidHeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::auth::{self, AuthError};
use crate::config::{Config, ConfigError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid authorization header: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),
    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode response body: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("{status}\n{body}")]
    Status { status: StatusCode, body: String },
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A request ready to be sent, kept in a form that can be re-sent after the
/// bearer token changes.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: RequestBody,
}

#[derive(Debug, Clone)]
enum RequestBody {
    Empty,
    Json(Vec<u8>),
    Upload(UploadInput),
}

#[derive(Debug, Clone)]
struct UploadInput {
    fields: Vec<(String, String)>,
    file_name: String,
    mime_type: Option<String>,
    bytes: Vec<u8>,
}

impl ApiRequest {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[cfg(test)]
    pub fn json_body(&self) -> Option<&[u8]> {
        match &self.body {
            RequestBody::Json(bytes) => Some(bytes),
            _ => None,
        }
    }

    fn set_bearer(&mut self, token: &str) -> Result<(), ApiError> {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        Ok(())
    }

    fn to_http(&self, http: &Client) -> Result<RequestBuilder, ApiError> {
        let builder = http
            .request(self.method.clone(), self.url.clone())
            .headers(self.headers().clone());
        let builder = match &self.body {
            RequestBody::Empty => builder,
            RequestBody::Json(bytes) => builder.body(bytes.clone()),
            RequestBody::Upload(upload) => {
                let mut part = reqwest::multipart::Part::bytes(upload.bytes.clone())
                    .file_name(upload.file_name.clone());
                if let Some(mime) = upload.mime_type.as_deref() {
                    part = part.mime_str(mime)?;
                }
                let mut form = reqwest::multipart::Form::new();
                for (name, value) in &upload.fields {
                    form = form.text(name.clone(), value.clone());
                }
                builder.multipart(form.part("files", part))
            }
        };
        Ok(builder)
    }
}

/// Envelope the service uses for every list endpoint.
#[derive(Debug, Deserialize)]
pub struct ItemList<T> {
    #[serde(default)]
    pub items: Vec<T>,
}

/// HTTP client bound to the configured base URL and bearer token.
///
/// Any call may refresh the access token when the service answers 401, and a
/// refresh rewrites the config file. A plain GET can therefore write to disk.
pub struct ApiClient {
    http: Client,
    config: Config,
}

impl ApiClient {
    pub fn new(config: Config) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_http(config: Config, http: Client) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub(crate) fn parts_mut(&mut self) -> (&Client, &mut Config) {
        (&self.http, &mut self.config)
    }

    pub fn build_request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<ApiRequest, ApiError> {
        let url = self.url(path)?;
        let mut headers = HeaderMap::new();
        let body = match body {
            Some(body) => {
                let bytes = serde_json::to_vec(body).map_err(ApiError::Encode)?;
                debug!(body = %String::from_utf8_lossy(&bytes), "request body");
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                RequestBody::Json(bytes)
            }
            None => RequestBody::Empty,
        };
        let mut request = ApiRequest {
            method,
            url,
            headers,
            body,
        };
        request.set_bearer(&self.config.access_token)?;
        Ok(request)
    }

    pub fn get_request(&self, path: &str) -> Result<ApiRequest, ApiError> {
        self.build_request::<()>(Method::GET, path, None)
    }

    pub fn delete_request(&self, path: &str) -> Result<ApiRequest, ApiError> {
        self.build_request::<()>(Method::DELETE, path, None)
    }

    pub fn post_request<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ApiRequest, ApiError> {
        self.build_request(Method::POST, path, Some(body))
    }

    pub fn put_request<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ApiRequest, ApiError> {
        self.build_request(Method::PUT, path, Some(body))
    }

    /// Multipart POST carrying `fields` as text parts and `file` as the
    /// `files` part. The file is read up front so a retry can resend it.
    pub fn upload_request(
        &self,
        path: &str,
        fields: Vec<(String, String)>,
        file: &Path,
    ) -> Result<ApiRequest, ApiError> {
        let url = self.url(path)?;
        let bytes = fs::read(file)?;
        let file_name = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let mime_type = mime_guess::from_path(file)
            .first()
            .map(|mime| mime.essence_str().to_string());
        let mut request = ApiRequest {
            method: Method::POST,
            url,
            headers: HeaderMap::new(),
            body: RequestBody::Upload(UploadInput {
                fields,
                file_name,
                mime_type,
                bytes,
            }),
        };
        request.set_bearer(&self.config.access_token)?;
        Ok(request)
    }

    /// Sends the request exactly once, whatever the status.
    pub async fn send_once(&self, request: &ApiRequest) -> Result<Response, ApiError> {
        debug!(method = %request.method(), url = %request.url(), "sending request");
        let response = request.to_http(&self.http)?.send().await?;
        debug!(status = response.status().as_u16(), "response received");
        Ok(response)
    }

    pub async fn execute<T: DeserializeOwned>(&mut self, request: ApiRequest) -> Result<T, ApiError> {
        let body = self.execute_raw(request).await?;
        serde_json::from_slice(&body).map_err(ApiError::Decode)
    }

    pub async fn execute_empty(&mut self, request: ApiRequest) -> Result<(), ApiError> {
        self.execute_raw(request).await?;
        Ok(())
    }

    async fn execute_raw(&mut self, mut request: ApiRequest) -> Result<Vec<u8>, ApiError> {
        let mut response = self.send_once(&request).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            info!("access token rejected, refreshing");
            auth::refresh(&self.http, &mut self.config).await?;
            request.set_bearer(&self.config.access_token)?;
            response = self.send_once(&request).await?;
        }

        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            debug!(status = status.as_u16(), url = %request.url, "request failed");
            return Err(ApiError::Status {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        Ok(body.to_vec())
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        let raw = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        Url::parse(&raw).map_err(|source| ApiError::InvalidUrl { url: raw, source })
    }
}

/// Builds `path?query` from the non-empty parameters.
pub(crate) fn with_query(path: &str, params: &[(&str, Option<&str>)]) -> String {
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    let mut any = false;
    for (name, value) in params {
        if let Some(value) = value.map(str::trim).filter(|value| !value.is_empty()) {
            query.append_pair(name, value);
            any = true;
        }
    }
    if any {
        format!("{path}?{}", query.finish())
    } else {
        path.to_string()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::test_config;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn client_for(server: &MockServer, dir: &TempDir, access_token: &str) -> ApiClient {
        let mut config = test_config(dir.path().join("sparkcli.toml"), &server.uri());
        config.access_token = access_token.to_string();
        config.refresh_token = "refresh-1".to_string();
        config.refresh_expires = 7776000.0;
        ApiClient::new(config)
    }

    async fn mount_refresh(server: &MockServer, new_token: &str) {
        Mock::given(method("POST"))
            .and(path("/access_token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=refresh-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": new_token,
                "expires_in": 1209600,
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    #[test]
    fn build_request_sets_bearer_for_every_shape() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path().join("sparkcli.toml"), "https://example.test/v1/");
        config.access_token = "abc".to_string();
        let client = ApiClient::new(config);

        let requests = [
            client.get_request("/rooms").unwrap(),
            client.delete_request("/rooms/1").unwrap(),
            client.post_request("/rooms", &json!({"title": "X"})).unwrap(),
            client.put_request("/memberships/1", &json!({"isModerator": true})).unwrap(),
        ];
        for request in &requests {
            assert_eq!(request.headers().get(AUTHORIZATION).unwrap(), "Bearer abc");
            assert!(request.url().as_str().starts_with("https://example.test/v1/"));
        }
        assert_eq!(requests[0].url().as_str(), "https://example.test/v1/rooms");
        assert!(requests[0].headers().get(CONTENT_TYPE).is_none());
        assert_eq!(requests[2].headers().get(CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(requests[2].json_body().unwrap(), br#"{"title":"X"}"#);
        assert_eq!(*requests[3].method(), Method::PUT);
    }

    #[test]
    fn build_request_rejects_malformed_url() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path().join("sparkcli.toml"), "not a url");
        let client = ApiClient::new(config);

        let err = client.get_request("/rooms").unwrap_err();
        assert!(matches!(err, ApiError::InvalidUrl { .. }));
    }

    #[test]
    fn build_request_reports_encoding_failures() {
        use std::collections::HashMap;

        let dir = tempfile::tempdir().unwrap();
        let client = ApiClient::new(test_config(dir.path().join("sparkcli.toml"), "https://example.test"));
        // JSON object keys must be strings.
        let mut body = HashMap::new();
        body.insert(vec![1u8], "value");

        let err = client.post_request("/rooms", &body).unwrap_err();
        assert!(matches!(err, ApiError::Encode(_)));
    }

    #[test]
    fn query_skips_empty_parameters() {
        assert_eq!(with_query("/people", &[("email", None), ("displayName", Some(""))]), "/people");
        assert_eq!(
            with_query("/people", &[("email", Some("a@b.c")), ("displayName", Some("Jo Doe"))]),
            "/people?email=a%40b.c&displayName=Jo+Doe"
        );
    }

    #[tokio::test]
    async fn execute_decodes_success_body() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        Mock::given(method("GET"))
            .and(path("/people/me"))
            .and(header("authorization", "Bearer good"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "p1", "displayName": "Pat"})))
            .expect(1)
            .mount(&server)
            .await;

        let mut client = client_for(&server, &dir, "good");
        let request = client.get_request("/people/me").unwrap();
        let value: serde_json::Value = client.execute(request).await.unwrap();

        assert_eq!(value["displayName"], "Pat");
    }

    #[tokio::test]
    async fn execute_refreshes_once_and_retries() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        Mock::given(method("GET"))
            .and(path("/rooms"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rooms"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
            .expect(1)
            .mount(&server)
            .await;
        mount_refresh(&server, "fresh").await;

        let mut client = client_for(&server, &dir, "stale");
        let request = client.get_request("/rooms").unwrap();
        let list: ItemList<serde_json::Value> = client.execute(request).await.unwrap();

        assert!(list.items.is_empty());
        assert_eq!(client.config().access_token, "fresh");
        assert_eq!(client.config().refresh_token, "refresh-1");
        let saved = Config::load(dir.path().join("sparkcli.toml")).unwrap();
        assert_eq!(saved.access_token, "fresh");
        assert_eq!(saved.refresh_token, "refresh-1");
    }

    #[tokio::test]
    async fn retry_resends_json_body() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        Mock::given(method("POST"))
            .and(path("/rooms"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rooms"))
            .and(header("authorization", "Bearer fresh"))
            .and(header("content-type", "application/json"))
            .and(body_string_contains("\"title\":\"X\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "r1", "title": "X"})))
            .expect(1)
            .mount(&server)
            .await;
        mount_refresh(&server, "fresh").await;

        let mut client = client_for(&server, &dir, "stale");
        let request = client.post_request("/rooms", &json!({"title": "X"})).unwrap();
        let value: serde_json::Value = client.execute(request).await.unwrap();

        assert_eq!(value["id"], "r1");
    }

    #[tokio::test]
    async fn second_unauthorized_is_returned_from_retry() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        Mock::given(method("GET"))
            .and(path("/rooms"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401).set_body_string("first"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rooms"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(401).set_body_string("second"))
            .expect(1)
            .mount(&server)
            .await;
        mount_refresh(&server, "fresh").await;

        let mut client = client_for(&server, &dir, "stale");
        let request = client.get_request("/rooms").unwrap();
        let err = client.execute_empty(request).await.unwrap_err();

        match err {
            ApiError::Status { status, body } => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert_eq!(body, "second");
            }
            other => panic!("expected status error, got {other}"),
        }
    }

    #[tokio::test]
    async fn error_status_keeps_raw_body() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let raw = r#"{"message":"Failed to create room.","errors":[{"description":"Failed to create room."}],"trackingId":"NA_1"}"#;
        Mock::given(method("POST"))
            .and(path("/rooms"))
            .respond_with(ResponseTemplate::new(400).set_body_string(raw))
            .expect(1)
            .mount(&server)
            .await;

        let mut client = client_for(&server, &dir, "good");
        let request = client.post_request("/rooms", &json!({"title": ""})).unwrap();
        let err = client.execute_empty(request).await.unwrap_err();

        match err {
            ApiError::Status { status, body } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(body, raw);
            }
            other => panic!("expected status error, got {other}"),
        }
    }

    #[tokio::test]
    async fn failed_refresh_is_surfaced_without_retry() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        Mock::given(method("GET"))
            .and(path("/rooms"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/access_token"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let mut client = client_for(&server, &dir, "stale");
        let request = client.get_request("/rooms").unwrap();
        let err = client.execute_empty(request).await.unwrap_err();

        assert!(matches!(err, ApiError::Auth(AuthError::Unauthorized { .. })));
        assert_eq!(client.config().access_token, "stale");
    }

    #[tokio::test]
    async fn undecodable_success_body_is_a_decode_error() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        Mock::given(method("GET"))
            .and(path("/rooms/r1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let mut client = client_for(&server, &dir, "good");
        let request = client.get_request("/rooms/r1").unwrap();
        let err = client.execute::<serde_json::Value>(request).await.unwrap_err();

        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[tokio::test]
    async fn upload_is_resent_after_refresh() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        fs::write(&file, "hello upload").unwrap();
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("authorization", "Bearer fresh"))
            .and(body_string_contains("hello upload"))
            .and(body_string_contains("name=\"roomId\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "m1"})))
            .expect(1)
            .mount(&server)
            .await;
        mount_refresh(&server, "fresh").await;

        let mut client = client_for(&server, &dir, "stale");
        let request = client
            .upload_request("/messages", vec![("roomId".to_string(), "r1".to_string())], &file)
            .unwrap();
        let value: serde_json::Value = client.execute(request).await.unwrap();

        assert_eq!(value["id"], "m1");
    }

    #[tokio::test]
    async fn connection_failure_is_not_refreshed() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path().join("sparkcli.toml"), "http://127.0.0.1:9");
        config.access_token = "t".to_string();
        config.refresh_token = "refresh-1".to_string();
        let mut client = ApiClient::new(config);

        let request = client.get_request("/rooms").unwrap();
        let err = client.execute_empty(request).await.unwrap_err();

        assert!(matches!(err, ApiError::Http(_)), "got {err}");
        assert_eq!(client.config().access_token, "t");
        assert!(!dir.path().join("sparkcli.toml").exists());
    }

    #[tokio::test]
    async fn transport_error_on_retry_is_surfaced() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        Mock::given(method("GET"))
            .and(path("/rooms"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rooms"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"items": []}))
                    .set_delay(Duration::from_secs(2)),
            )
            .expect(1)
            .mount(&server)
            .await;
        mount_refresh(&server, "fresh").await;

        let config = client_for(&server, &dir, "stale").config().clone();
        let http = Client::builder()
            .timeout(Duration::from_millis(500))
            .build()
            .unwrap();
        let mut client = ApiClient::with_http(config, http);
        let request = client.get_request("/rooms").unwrap();
        let err = client.execute_empty(request).await.unwrap_err();

        match err {
            ApiError::Http(source) => assert!(source.is_timeout(), "got {source}"),
            other => panic!("expected http error, got {other}"),
        }
        assert_eq!(client.config().access_token, "fresh");
    }

    #[tokio::test]
    async fn unexpected_refresh_status_leaves_config_untouched() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        Mock::given(method("GET"))
            .and(path("/rooms"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/access_token"))
            .respond_with(ResponseTemplate::new(500).set_body_string("token service down"))
            .expect(1)
            .mount(&server)
            .await;

        let mut client = client_for(&server, &dir, "stale");
        let before = client.config().clone();
        let request = client.get_request("/rooms").unwrap();
        let err = client.execute_empty(request).await.unwrap_err();

        match err {
            ApiError::Auth(AuthError::UnexpectedStatus { status, body }) => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body, "token service down");
            }
            other => panic!("expected unexpected status, got {other}"),
        }
        assert_eq!(client.config(), &before);
        assert!(!dir.path().join("sparkcli.toml").exists());
    }
}
