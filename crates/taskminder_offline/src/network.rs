use async_trait::async_trait;
use tracing::debug;

use crate::http::{same_origin, Request, Response, ResponseKind};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to `{url}` failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("network unavailable for `{0}`")]
    Offline(String),
}

#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}

/// Network access over reqwest. Redirects that leave the request origin
/// produce `Cors` responses, which are never cached.
#[derive(Debug, Clone, Default)]
pub struct HttpNetwork {
    client: reqwest::Client,
}

impl HttpNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let wrap = |source: reqwest::Error| FetchError::Http {
            url: request.url.to_string(),
            source,
        };
        let reply = self
            .client
            .request(request.method.clone(), request.url.clone())
            .send()
            .await
            .map_err(wrap)?;

        let status = reply.status().as_u16();
        let final_url = reply.url().clone();
        let kind = if same_origin(&final_url, &request.url) {
            ResponseKind::Basic
        } else {
            ResponseKind::Cors
        };
        let headers = reply
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = reply.bytes().await.map_err(wrap)?;
        debug!(url = %request.url, status, ?kind, bytes = body.len(), "network response");

        Ok(Response {
            status,
            kind,
            url: Some(final_url),
            headers,
            body,
        })
    }
}
