//! REST client for the provisioning API.
//!
//! One provider call maps to one HTTP request; the executor owns retries,
//! so this client classifies errors (transient vs fatal) but never loops.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::{ProviderError, Result, StackError};
use crate::graph::ResourceKind;

use super::Provider;
use super::types::{
    ApiErrorResponse, Outputs, PRIMARY_ID_OUTPUT, ResolvedAttrs, ResourceRequest,
    ResourceResponse, capability,
};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// HTTP-backed provider client.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    /// Underlying HTTP client.
    client: Client,
    /// Base URL of the provisioning API, without trailing slash.
    base_url: String,
    /// Bearer token for authentication.
    token: String,
}

impl HttpProvider {
    /// Creates a new provider client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(endpoint: &str, token: &str) -> Result<Self> {
        Self::with_timeout(endpoint, token, DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a provider client with a custom timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_timeout(endpoint: &str, token: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ProviderError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: endpoint.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// Returns the collection URL for a resource kind.
    fn collection_url(&self, kind: ResourceKind) -> String {
        format!("{}/{}", self.base_url, capability(kind).path)
    }

    /// Extracts the provider's primary identifier from recorded outputs.
    fn primary_id(outputs: &Outputs) -> Result<&str> {
        outputs
            .get(PRIMARY_ID_OUTPUT)
            .map(String::as_str)
            .ok_or_else(|| {
                StackError::Provider(ProviderError::InvalidResponse {
                    message: format!("Recorded outputs are missing '{PRIMARY_ID_OUTPUT}'"),
                })
            })
    }

    /// Sends a request and maps the response to the error taxonomy.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .header(header::CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| ProviderError::network(e.to_string()))?;

        let status = response.status();
        trace!("Provider responded with status: {status}");

        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let message = response
            .json::<ApiErrorResponse>()
            .await
            .ok()
            .and_then(|body| body.message)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());

        let error = match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                ProviderError::AuthenticationFailed { message }
            }
            StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited {
                retry_after_secs: retry_after.filter(|&secs| secs > 0).unwrap_or(60),
            },
            status if status.is_server_error() => ProviderError::Unavailable {
                status: status.as_u16(),
                message,
            },
            status => ProviderError::api_error(status.as_u16(), message),
        };

        Err(StackError::Provider(error))
    }

    /// Parses a resource response body.
    async fn parse_outputs(response: reqwest::Response) -> Result<Outputs> {
        let body: ResourceResponse = response.json().await.map_err(|e| {
            StackError::Provider(ProviderError::InvalidResponse {
                message: format!("Failed to parse response body: {e}"),
            })
        })?;
        Ok(body.outputs)
    }
}

#[async_trait]
impl Provider for HttpProvider {
    async fn create(&self, kind: ResourceKind, attributes: &ResolvedAttrs) -> Result<Outputs> {
        let url = self.collection_url(kind);
        debug!("POST {url}");

        let response = self
            .send(self.client.post(&url).json(&ResourceRequest { attributes }))
            .await?;

        Self::parse_outputs(response).await
    }

    async fn update(
        &self,
        kind: ResourceKind,
        outputs: &Outputs,
        attributes: &ResolvedAttrs,
    ) -> Result<Outputs> {
        let id = Self::primary_id(outputs)?;
        let url = format!("{}/{id}", self.collection_url(kind));
        debug!("PUT {url}");

        let response = self
            .send(self.client.put(&url).json(&ResourceRequest { attributes }))
            .await?;

        Self::parse_outputs(response).await
    }

    async fn delete(&self, kind: ResourceKind, outputs: &Outputs) -> Result<()> {
        let id = Self::primary_id(outputs)?;
        let url = format!("{}/{id}", self.collection_url(kind));
        debug!("DELETE {url}");

        self.send(self.client.delete(&url)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn attrs(pairs: &[(&str, &str)]) -> ResolvedAttrs {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), serde_json::Value::String((*v).to_string())))
            .collect()
    }

    fn outputs(pairs: &[(&str, &str)]) -> Outputs {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_create_posts_to_kind_collection() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/tables"))
            .and(header("authorization", "Bearer test-token"))
            .and(body_partial_json(serde_json::json!({
                "attributes": { "name": "favorite-team-matches" }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "outputs": { "id": "tbl-123", "arn": "arn:aws:dynamodb:tbl-123" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = HttpProvider::new(&server.uri(), "test-token").expect("client builds");
        let result = provider
            .create(
                ResourceKind::Table,
                &attrs(&[("name", "favorite-team-matches")]),
            )
            .await
            .expect("create should succeed");

        assert_eq!(result.get("id").map(String::as_str), Some("tbl-123"));
        assert_eq!(
            result.get("arn").map(String::as_str),
            Some("arn:aws:dynamodb:tbl-123")
        );
    }

    #[tokio::test]
    async fn test_update_puts_to_primary_id() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/functions/fn-9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "outputs": { "id": "fn-9" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = HttpProvider::new(&server.uri(), "test-token").expect("client builds");
        let result = provider
            .update(
                ResourceKind::Function,
                &outputs(&[("id", "fn-9")]),
                &attrs(&[("memory_mb", "512")]),
            )
            .await
            .expect("update should succeed");

        assert_eq!(result.get("id").map(String::as_str), Some("fn-9"));
    }

    #[tokio::test]
    async fn test_rate_limit_is_transient_with_hint() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/roles"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let provider = HttpProvider::new(&server.uri(), "test-token").expect("client builds");
        let err = provider
            .create(ResourceKind::Role, &attrs(&[]))
            .await
            .expect_err("rate limit must fail");

        assert!(err.is_retryable());
        assert_eq!(err.retry_delay_secs(), Some(7));
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rules"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let provider = HttpProvider::new(&server.uri(), "test-token").expect("client builds");
        let err = provider
            .create(ResourceKind::Rule, &attrs(&[]))
            .await
            .expect_err("server error must fail");

        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_auth_failure_is_fatal() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/tables"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "message": "token expired"
            })))
            .mount(&server)
            .await;

        let provider = HttpProvider::new(&server.uri(), "bad-token").expect("client builds");
        let err = provider
            .create(ResourceKind::Table, &attrs(&[]))
            .await
            .expect_err("auth failure must fail");

        assert!(!err.is_retryable());
        assert!(err.to_string().contains("token expired"));
    }

    #[tokio::test]
    async fn test_delete_targets_primary_id() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/bindings/bind-1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let provider = HttpProvider::new(&server.uri(), "test-token").expect("client builds");
        provider
            .delete(ResourceKind::Binding, &outputs(&[("id", "bind-1")]))
            .await
            .expect("delete should succeed");
    }

    #[tokio::test]
    async fn test_missing_primary_id_is_invalid() {
        let provider = HttpProvider::new("https://provisioner.example", "t").expect("client builds");
        let err = provider
            .delete(ResourceKind::Table, &outputs(&[("arn", "arn:x")]))
            .await
            .expect_err("missing id must fail");

        assert!(!err.is_retryable());
    }
}
