//! JSON-over-HTTP provider client.
//!
//! Resources of a kind live under `{endpoint}/{kind}`:
//! `POST /` creates, `GET|PATCH|DELETE /{id}` read, update and delete, and
//! `POST /{id}/actions/{action}` runs an imperative action. Clone and restore
//! carry their parameters as a JSON body.

use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use converge_core::provider::{self, ProviderAction, ProviderClient, ProviderError, Provisioned};
use converge_core::Resource;

pub struct HttpProviderClient<R> {
    client: Client,
    endpoint: String,
    _kind: PhantomData<fn() -> R>,
}

impl<R: Resource> HttpProviderClient<R> {
    /// `timeout` bounds each request, including reading the body.
    pub fn new(endpoint: &str, timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            _kind: PhantomData,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}{}", self.endpoint, R::KIND, path)
    }

    async fn send(&self, request: RequestBuilder) -> provider::Result<Response> {
        let response = request.send().await.map_err(request_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = if body.is_empty() {
            status.to_string()
        } else {
            format!("{}: {}", status, body.trim())
        };
        Err(status_error(status, message))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> provider::Result<T> {
        let response = self.send(request).await?;
        response.json::<T>().await.map_err(|e| {
            if e.is_decode() {
                ProviderError::Terminal(format!("undecodable provider response: {}", e))
            } else {
                request_error(e)
            }
        })
    }
}

fn request_error(e: reqwest::Error) -> ProviderError {
    if e.is_builder() {
        ProviderError::Terminal(format!("invalid provider request: {}", e))
    } else {
        ProviderError::Transient(format!("provider unreachable: {}", e))
    }
}

fn status_error(status: StatusCode, message: String) -> ProviderError {
    if status == StatusCode::NOT_FOUND {
        ProviderError::NotFound(message)
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ProviderError::Transient(message)
    } else {
        ProviderError::Terminal(message)
    }
}

#[async_trait]
impl<R: Resource> ProviderClient<R> for HttpProviderClient<R> {
    async fn create(&self, spec: &R::Spec) -> provider::Result<Provisioned<R::Observed>> {
        debug!("POST {}", self.url(""));
        self.send_json(self.client.post(self.url("")).json(spec))
            .await
    }

    async fn get(&self, id: &str) -> provider::Result<R::Observed> {
        let url = self.url(&format!("/{}", id));
        debug!("GET {}", url);
        self.send_json(self.client.get(url)).await
    }

    async fn update(&self, id: &str, delta: &R::Spec) -> provider::Result<R::Observed> {
        let url = self.url(&format!("/{}", id));
        debug!("PATCH {}", url);
        self.send_json(self.client.patch(url).json(delta)).await
    }

    async fn delete(&self, id: &str) -> provider::Result<()> {
        let url = self.url(&format!("/{}", id));
        debug!("DELETE {}", url);
        self.send(self.client.delete(url)).await.map(|_| ())
    }

    async fn execute(&self, id: &str, action: ProviderAction) -> provider::Result<R::Observed> {
        let url = self.url(&format!("/{}/actions/{}", id, action));
        debug!("POST {}", url);
        let request = self.client.post(url);
        let request = match &action {
            ProviderAction::Clone(body) => request.json(body),
            ProviderAction::Restore(body) => request.json(body),
            _ => request,
        };
        self.send_json(request).await
    }
}
