//! REST implementation of the data-access traits.
//!
//! Responses may be either the bare resource or wrapped as `{"data": ...}`;
//! failures carry the server's `{"error": "..."}` message when one is sent.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

use super::api::{ReferenceProvider, TransactionApi};
use crate::config::ClientConfig;
use crate::errors::{RemoteError, ServiceError};
use crate::models::{
    Item, Supplier, Transaction, TransactionHeader, TransactionId, TransactionInput, User, UserId,
};

#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    fn into_inner(self) -> T {
        match self {
            Envelope::Wrapped { data } => data,
            Envelope::Bare(value) => value,
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|body| body.error.or(body.message))
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
        })
}

/// Shared HTTP client: base URL, bearer token and timeout.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ServiceError::Config(format!("invalid api_base_url: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ServiceError::Config(format!(
                "api_base_url {} cannot carry a path",
                base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .gzip(true)
            .user_agent(concat!("stockdesk/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ServiceError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ServiceError> {
        Self::new(
            &config.api_base_url,
            config.api_token.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::new("base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, RemoteError> {
        let url = self.url(segments)?;
        debug!(%method, %url, "api request");
        let mut request = self
            .client
            .request(method, url)
            .header(ACCEPT, "application/json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        Ok(request)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().clone();
        let body = response.text().await.unwrap_or_default();
        let message = error_message(status, &body);
        warn!(status = status.as_u16(), %url, %message, "api request failed");
        Err(RemoteError::with_status(status.as_u16(), message))
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, RemoteError> {
        let response = self.send(request).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice::<Envelope<T>>(&bytes)
            .map(Envelope::into_inner)
            .map_err(RemoteError::decode)
    }
}

/// Transactions of kind `H` served under `/{resource}`.
pub struct HttpTransactionApi<H> {
    client: Arc<ApiClient>,
    _kind: PhantomData<fn() -> H>,
}

impl<H: TransactionHeader> HttpTransactionApi<H> {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }
}

#[async_trait]
impl<H: TransactionHeader> TransactionApi<H> for HttpTransactionApi<H> {
    #[instrument(skip(self), fields(resource = H::CONFIG.resource))]
    async fn list(&self) -> Result<Vec<Transaction<H>>, RemoteError> {
        let request = self.client.request(Method::GET, &[H::CONFIG.resource])?;
        self.client.fetch(request).await
    }

    #[instrument(skip(self, input), fields(resource = H::CONFIG.resource))]
    async fn create(
        &self,
        input: &TransactionInput<H>,
        author: &UserId,
    ) -> Result<Transaction<H>, RemoteError> {
        let mut body = serde_json::to_value(input).map_err(RemoteError::decode)?;
        if let Value::Object(fields) = &mut body {
            fields.insert(
                H::CONFIG.author_field.to_string(),
                Value::String(author.to_string()),
            );
        }
        let request = self
            .client
            .request(Method::POST, &[H::CONFIG.resource])?
            .json(&body);
        self.client.fetch(request).await
    }

    #[instrument(skip(self, input), fields(resource = H::CONFIG.resource))]
    async fn update(
        &self,
        id: &TransactionId,
        input: &TransactionInput<H>,
    ) -> Result<Transaction<H>, RemoteError> {
        let request = self
            .client
            .request(Method::PUT, &[H::CONFIG.resource, id.as_str()])?
            .json(input);
        self.client.fetch(request).await
    }

    #[instrument(skip(self), fields(resource = H::CONFIG.resource))]
    async fn submit(&self, id: &TransactionId) -> Result<Transaction<H>, RemoteError> {
        let request = self
            .client
            .request(Method::POST, &[H::CONFIG.resource, id.as_str(), "submit"])?;
        self.client.fetch(request).await
    }

    #[instrument(skip(self), fields(resource = H::CONFIG.resource))]
    async fn delete(&self, id: &TransactionId) -> Result<(), RemoteError> {
        let request = self
            .client
            .request(Method::DELETE, &[H::CONFIG.resource, id.as_str()])?;
        self.client.send(request).await?;
        Ok(())
    }
}

pub struct HttpReferenceProvider {
    client: Arc<ApiClient>,
}

impl HttpReferenceProvider {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReferenceProvider for HttpReferenceProvider {
    async fn list_suppliers(&self) -> Result<Vec<Supplier>, RemoteError> {
        let request = self.client.request(Method::GET, &["suppliers"])?;
        self.client.fetch(request).await
    }

    async fn list_items(&self) -> Result<Vec<Item>, RemoteError> {
        let request = self.client.request(Method::GET, &["items"])?;
        self.client.fetch(request).await
    }

    async fn list_users(&self) -> Result<Vec<User>, RemoteError> {
        let request = self.client.request(Method::GET, &["users"])?;
        self.client.fetch(request).await
    }
}
