//! reqwest-backed implementation of the backend API traits
//!
//! One `HttpBackend` serves every trait. It keeps the session cookies issued
//! by `/auth/login` in a shared jar; the realtime transport reads the same
//! jar to authenticate its WebSocket upgrade.

use crate::config::ClientConfig;
use bytes::Bytes;
use error_types::{BackendErrorBody, ClientError, ClientResult};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

#[derive(Clone)]
pub struct HttpBackend {
    pub(super) client: Client,
    base_url: String,
    cookies: Arc<Jar>,
}

impl HttpBackend {
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let cookies = Arc::new(Jar::default());
        let client = Client::builder()
            .cookie_provider(cookies.clone())
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ClientError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.api_base().to_string(),
            cookies,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `Cookie` header value the jar would send to `url`
    pub fn cookie_header(&self, url: &str) -> Option<String> {
        let url = Url::parse(url).ok()?;
        self.cookies
            .cookies(&url)
            .and_then(|value| value.to_str().ok().map(str::to_string))
    }

    pub(super) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and turn non-success statuses into errors
    pub(super) async fn send(&self, operation: &str, request: RequestBuilder) -> ClientResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| ClientError::network(operation, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body = BackendErrorBody::from_body(&body);
            warn!(
                operation,
                status = status.as_u16(),
                detail = body.as_ref().map(|b| b.summary()).unwrap_or_default(),
                "Backend rejected request"
            );
            return Err(ClientError::http_status(operation, status.as_u16(), body));
        }

        debug!(operation, status = status.as_u16(), "Backend request succeeded");
        Ok(response)
    }

    pub(super) async fn json<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> ClientResult<T> {
        match self.json_opt(operation, request).await? {
            Some(value) => Ok(value),
            None => Err(ClientError::parse(
                format!("{operation} response"),
                "empty response body",
            )),
        }
    }

    /// Like [`Self::json`], but an empty body decodes to `None`
    pub(super) async fn json_opt<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> ClientResult<Option<T>> {
        let response = self.send(operation, request).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| ClientError::network(operation, e))?;

        decode_body(operation, &body)
    }

    pub(super) async fn empty(&self, operation: &str, request: RequestBuilder) -> ClientResult<()> {
        self.send(operation, request).await.map(|_| ())
    }

    /// PUT raw bytes to a presigned object-storage URL
    pub async fn put_object(&self, url: &str, content_type: &str, data: Bytes) -> ClientResult<()> {
        let size = data.len();
        let request = self
            .client
            .put(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(data);

        self.empty("upload object", request).await?;
        debug!(size, content_type, "Uploaded object to storage");
        Ok(())
    }
}

fn decode_body<T: DeserializeOwned>(operation: &str, body: &[u8]) -> ClientResult<Option<T>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    // Spring serialises a null body as the literal `null`
    serde_json::from_slice::<Option<T>>(body)
        .map_err(|e| ClientError::parse(format!("{operation} response"), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Conversation;

    #[test]
    fn test_empty_and_null_bodies_decode_to_none() {
        let empty: Option<Conversation> = decode_body("get conversation", b"").unwrap();
        let null: Option<Conversation> = decode_body("get conversation", b"null").unwrap();
        assert!(empty.is_none());
        assert!(null.is_none());
    }

    #[test]
    fn test_malformed_body_is_parse_error() {
        let result: ClientResult<Option<Conversation>> = decode_body("get conversation", b"{\"id\":");
        assert!(matches!(result, Err(ClientError::Parse { .. })));
    }

    #[test]
    fn test_urls_join_without_double_slash() {
        let config = ClientConfig::from_toml(r#"backend_url = "http://localhost:8080/""#).unwrap();
        let backend = HttpBackend::new(&config).unwrap();
        assert_eq!(backend.url("/post/feeds"), "http://localhost:8080/post/feeds");
    }
}
