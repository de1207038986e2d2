use super::CookieValidator;
use crate::models::CookieSet;
use crate::scrapers::headers::HeaderTemplate;
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::{HeaderMap, COOKIE};
use reqwest::Client;
use std::time::Duration;

/// Validates cookies with one GET against a lightweight authenticated endpoint.
///
/// The request carries the same browser headers as a data request, with the page
/// that minted the cookies as its referer.
pub struct HttpCookieValidator {
    client: Client,
    probe_url: String,
    timeout: Duration,
    headers: HeaderMap,
}

impl HttpCookieValidator {
    pub fn new(client: Client, probe_url: &str, referer: &str, timeout: Duration, headers: &HeaderTemplate) -> Self {
        Self {
            client,
            probe_url: probe_url.to_string(),
            timeout,
            headers: headers.resolve(Some(referer)),
        }
    }
}

#[async_trait]
impl CookieValidator for HttpCookieValidator {
    async fn validate(&self, cookies: &CookieSet) -> bool {
        let request = self
            .client
            .get(&self.probe_url)
            .headers(self.headers.clone())
            .header(COOKIE, cookies.header_value())
            .timeout(self.timeout)
            .send();

        match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(response)) if response.status().is_success() => {
                debug!("Cookie probe {} returned {}", self.probe_url, response.status());
                true
            }
            Ok(Ok(response)) => {
                warn!("Cookie probe {} returned {}", self.probe_url, response.status());
                false
            }
            Ok(Err(e)) => {
                warn!("Cookie probe {} failed: {}", self.probe_url, e);
                false
            }
            Err(_) => {
                warn!("Cookie probe {} timed out after {:?}", self.probe_url, self.timeout);
                false
            }
        }
    }
}
