use crate::config::Config;
use crate::errors::{FetchFailure, Result};
use crate::models::{CookieSet, EndpointRequest};
use async_trait::async_trait;
use log::debug;
use reqwest::header::COOKIE;
use reqwest::Client;
use serde_json::Value;

/// Issues one authenticated GET and decodes the JSON body.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, request: &EndpointRequest, cookies: &CookieSet) -> std::result::Result<Value, FetchFailure>;
}

/// Transport backed by one shared reqwest connection pool.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Client shared by the fetcher and the cookie probe.
pub fn build_client(config: &Config) -> Result<Client> {
    let client = Client::builder()
        .timeout(config.request_timeout)
        .pool_max_idle_per_host(config.max_concurrency)
        .build()?;
    Ok(client)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, request: &EndpointRequest, cookies: &CookieSet) -> std::result::Result<Value, FetchFailure> {
        let response = self
            .client
            .get(&request.url)
            .headers(request.headers.clone())
            .header(COOKIE, cookies.header_value())
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchFailure::Timeout(request.timeout)
                } else {
                    FetchFailure::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchFailure::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                FetchFailure::Timeout(request.timeout)
            } else {
                FetchFailure::Transport(e.to_string())
            }
        })?;
        debug!("{} returned {} bytes", request.key, body.len());

        serde_json::from_slice(&body).map_err(|e| FetchFailure::MalformedBody(e.to_string()))
    }
}
