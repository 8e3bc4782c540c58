use std::sync::Arc;
use std::time::Duration;

use reqwest::{multipart::Form, Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::error::{ApiError, ClientResult, ParseError};
use crate::store::{KeyValueStore, TOKEN_KEY};

/// Thin wrapper over `reqwest::Client`: base url, bearer token from the
/// persisted store and error normalization.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    store: Arc<dyn KeyValueStore>,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(config: &AppConfig, store: Arc<dyn KeyValueStore>) -> ClientResult<Self> {
        // No client-wide timeout: streamed replies must be allowed to run long.
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ApiError::unexpected(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            store,
            timeout: config.request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, format!("{}{}", self.base_url, path))
    }

    /// Sends the request with the current token, if any. Non-2xx responses
    /// are turned into [`ApiError`].
    pub async fn execute(&self, req: RequestBuilder) -> ClientResult<Response> {
        let req = match self.store.get(TOKEN_KEY).await? {
            Some(token) if !token.is_empty() => req.bearer_auth(token),
            _ => req,
        };

        let resp = req.send().await.map_err(|e| {
            let err = ApiError::from_reqwest(&e);
            warn!(error = %e, detail = %err.detail, "request failed without response");
            err
        })?;

        let status = resp.status();
        if status.is_success() {
            debug!(%status, url = %resp.url(), "response");
            return Ok(resp);
        }

        let url = resp.url().clone();
        let body = resp.bytes().await.unwrap_or_default();
        let err = ApiError::from_response(status.as_u16(), &body);
        warn!(%status, %url, detail = %err.detail, "request rejected");
        Err(err.into())
    }

    async fn execute_json<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        what: &'static str,
    ) -> ClientResult<T> {
        let resp = self.execute(req).await?;
        let body = resp.bytes().await?;
        serde_json::from_slice(&body).map_err(|source| ParseError { what, source }.into())
    }

    pub async fn get<T, Q>(&self, path: &str, query: &Q, what: &'static str) -> ClientResult<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let req = self
            .request(Method::GET, path)
            .query(query)
            .timeout(self.timeout);
        self.execute_json(req, what).await
    }

    pub async fn send_json<T, B>(
        &self,
        method: Method,
        path: &str,
        body: &B,
        what: &'static str,
    ) -> ClientResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let req = self.request(method, path).json(body).timeout(self.timeout);
        self.execute_json(req, what).await
    }

    pub async fn delete(&self, path: &str) -> ClientResult<()> {
        let req = self.request(Method::DELETE, path).timeout(self.timeout);
        self.execute(req).await?;
        Ok(())
    }

    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        form: Form,
        timeout: Duration,
        what: &'static str,
    ) -> ClientResult<T> {
        let req = self
            .request(Method::POST, path)
            .multipart(form)
            .timeout(timeout);
        self.execute_json(req, what).await
    }

    /// Opens a long-lived response; the body is left for the caller to read.
    pub async fn open_stream(&self, path: &str, form: Form) -> ClientResult<Response> {
        let req = self.request(Method::POST, path).multipart(form);
        self.execute(req).await
    }
}
