use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use tracing::debug;

use super::Capability;
use crate::error::AdapterError;

/// A capability served over HTTP: the request is POSTed as JSON and the
/// response body decoded as JSON.
pub struct HttpCapability<Req, Resp> {
    name: String,
    endpoint: String,
    client: reqwest::Client,
    api_key: Option<String>,
    _marker: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> HttpCapability<Req, Resp> {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
            api_key: None,
            _marker: PhantomData,
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn map_send_error(&self, e: reqwest::Error) -> AdapterError {
        if e.is_connect() || e.is_timeout() || e.is_request() {
            AdapterError::unavailable(&self.name, e.to_string())
        } else {
            AdapterError::invalid(&self.name, e.to_string())
        }
    }
}

#[async_trait]
impl<Req, Resp> Capability for HttpCapability<Req, Resp>
where
    Req: Serialize + Send + Sync + 'static,
    Resp: DeserializeOwned + Send + 'static,
{
    type Request = Req;
    type Response = Resp;

    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, request: &Req) -> Result<Resp, AdapterError> {
        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| self.map_send_error(e))?;
        let status = response.status();
        debug!(capability = %self.name, status = %status, "Capability responded");

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            return Err(AdapterError::RateLimited {
                capability: self.name.clone(),
                retry_after_secs,
            });
        }
        if status.is_server_error() {
            return Err(AdapterError::unavailable(
                &self.name,
                format!("server error {}", status),
            ));
        }
        if !status.is_success() {
            return Err(AdapterError::invalid(
                &self.name,
                format!("unexpected status {}", status),
            ));
        }

        response
            .json::<Resp>()
            .await
            .map_err(|e| AdapterError::invalid(&self.name, e.to_string()))
    }
}
