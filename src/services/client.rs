use std::sync::Arc;
use std::time::Duration;

use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::core::config::Config;
use crate::core::envelope::extract_error_message;
use crate::core::error::{ApiError, ApiResult};
use crate::core::session::Session;

/// One backend call, described declaratively. The client owns every
/// transport concern: headers, bearer token, timeouts, error mapping.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub path: String,
    pub method: reqwest::Method,
    pub query: Vec<(&'static str, String)>,
    pub body: Option<serde_json::Value>,
}

impl Endpoint {
    fn new(method: reqwest::Method, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(reqwest::Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(reqwest::Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(reqwest::Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(reqwest::Method::DELETE, path)
    }

    pub fn query(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.query.push((key, value.into()));
        self
    }

    pub fn queries(mut self, pairs: Vec<(&'static str, String)>) -> Self {
        self.query.extend(pairs);
        self
    }

    pub fn json(mut self, body: &impl Serialize) -> ApiResult<Self> {
        let value =
            serde_json::to_value(body).map_err(|err| ApiError::Decode(err.to_string()))?;
        self.body = Some(value);
        Ok(self)
    }
}

/// Thin JSON client for the novel backend.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: Arc<Session>,
}

impl ApiClient {
    pub fn new(config: &Config, session: Arc<Session>) -> ApiResult<Self> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    pub async fn request<T: DeserializeOwned>(&self, endpoint: Endpoint) -> ApiResult<T> {
        let url = format!(
            "{}/{}",
            self.base_url,
            endpoint.path.trim_start_matches('/')
        );
        debug!("{} {}", endpoint.method, url);

        let mut builder = self.http.request(endpoint.method.clone(), &url);
        for (name, value) in request_headers(self.session.token().await.as_deref()) {
            builder = builder.header(name, value);
        }
        if !endpoint.query.is_empty() {
            builder = builder.query(&endpoint.query);
        }
        if let Some(body) = &endpoint.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!("{} {} -> {}", endpoint.method, url, status);

        if !status.is_success() {
            return Err(self.http_failure(status, &body).await);
        }

        decode_body(&body)
    }

    /// Turns a non-2xx answer into an `ApiError`. A 401 also drops the
    /// session, so the next run starts logged out instead of looping on a
    /// dead token.
    async fn http_failure(&self, status: reqwest::StatusCode, body: &str) -> ApiError {
        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.session.invalidate().await;
        }
        ApiError::Http {
            status: status.as_u16(),
            message: extract_error_message(body),
        }
    }
}

/// Headers attached to every request. `Content-Type` comes from the body
/// encoder, so only the constant pair lives here.
fn request_headers(token: Option<&str>) -> Vec<(&'static str, String)> {
    let mut headers = vec![("Accept", "application/json".to_string())];
    if let Some(token) = token {
        headers.push(("Authorization", format!("Bearer {token}")));
    }
    headers
}

/// An empty 2xx body decodes as `{}` so envelope-shaped responses without a
/// payload still deserialize.
fn decode_body<T: DeserializeOwned>(body: &str) -> ApiResult<T> {
    let effective = if body.trim().is_empty() { "{}" } else { body };
    serde_json::from_str(effective).map_err(|err| ApiError::Decode(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::envelope::Envelope;
    use crate::core::session::MemorySessionStore;

    fn test_client(session: Arc<Session>) -> ApiClient {
        let config = Config {
            base_url: "http://127.0.0.1:23004/api/v1/".to_string(),
            ..Config::default()
        };
        ApiClient::new(&config, session).unwrap()
    }

    #[test]
    fn test_request_headers_with_and_without_token() {
        let headers = request_headers(None);
        assert_eq!(headers, vec![("Accept", "application/json".to_string())]);

        let headers = request_headers(Some("tok_9"));
        assert!(headers.contains(&("Authorization", "Bearer tok_9".to_string())));
    }

    #[test]
    fn test_base_url_trailing_slash_is_normalized() {
        let session = Arc::new(Session::new(Arc::new(MemorySessionStore::new())));
        let client = test_client(session);
        assert_eq!(client.base_url, "http://127.0.0.1:23004/api/v1");
    }

    #[test]
    fn test_decode_body_treats_empty_as_object() {
        let envelope: Envelope<serde_json::Value> = decode_body("").unwrap();
        assert!(envelope.success.is_none());
        assert!(envelope.data.is_none());

        let envelope: Envelope<serde_json::Value> = decode_body("   ").unwrap();
        assert!(envelope.message.is_none());

        let err = decode_body::<Envelope<serde_json::Value>>("<html>").unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[test]
    fn test_endpoint_builders() {
        let endpoint = Endpoint::get("projects")
            .query("page", "1")
            .query("limit", "20");
        assert_eq!(endpoint.method, reqwest::Method::GET);
        assert_eq!(endpoint.query.len(), 2);
        assert!(endpoint.body.is_none());

        let endpoint = Endpoint::post("auth/login")
            .json(&serde_json::json!({"username": "u"}))
            .unwrap();
        assert_eq!(endpoint.method, reqwest::Method::POST);
        assert_eq!(endpoint.body.unwrap()["username"], "u");
    }

    #[test]
    fn test_query_pairs_land_in_the_request_url() {
        let endpoint = Endpoint::get("projects")
            .query("page", "2")
            .query("status", "in_progress");
        let request = reqwest::Client::new()
            .request(
                endpoint.method.clone(),
                "http://127.0.0.1:23004/api/v1/projects",
            )
            .query(&endpoint.query)
            .build()
            .unwrap();
        assert_eq!(
            request.url().as_str(),
            "http://127.0.0.1:23004/api/v1/projects?page=2&status=in_progress"
        );
    }

    #[tokio::test]
    async fn test_unauthorized_failure_drops_session() {
        let store = Arc::new(MemorySessionStore::new());
        let session = Arc::new(Session::new(store));
        session.set("tok_expired").await.unwrap();

        let client = test_client(session.clone());
        let err = client
            .http_failure(
                reqwest::StatusCode::UNAUTHORIZED,
                r#"{"message": "token 已过期"}"#,
            )
            .await;
        assert_eq!(err.to_string(), "请求失败(401)：token 已过期");
        assert!(err.is_unauthorized());
        assert!(
            !session.is_authenticated().await,
            "401 must clear the stored session"
        );
    }

    #[tokio::test]
    async fn test_other_failures_keep_session() {
        let session = Arc::new(Session::new(Arc::new(MemorySessionStore::new())));
        session.set("tok_fine").await.unwrap();

        let client = test_client(session.clone());
        let err = client
            .http_failure(reqwest::StatusCode::INTERNAL_SERVER_ERROR, "Bad Gateway")
            .await;
        assert_eq!(err.status(), Some(500));
        assert_eq!(err.to_string(), "请求失败(500)：Bad Gateway");
        assert!(session.is_authenticated().await);
    }
}
