use crate::errors::{DataHubError, Result};
use log::warn;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};

const ACCEPT_LANGUAGE_VALUE: &str = "en-GB,en-US;q=0.9,en;q=0.8";

/// Browser-like headers for the exchange's JSON API, with an optional referring page.
///
/// Never carries a `Cookie` header; cookies are attached per request by the fetcher.
#[derive(Debug, Clone)]
pub struct HeaderTemplate {
    base_url: String,
    common: HeaderMap,
}

impl HeaderTemplate {
    pub fn new(base_url: &str, user_agent: &str) -> Result<Self> {
        let mut common = HeaderMap::new();
        common.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent)
                .map_err(|e| DataHubError::ConfigError(format!("invalid user agent: {}", e)))?,
        );
        common.insert(ACCEPT, HeaderValue::from_static("*/*"));
        common.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANGUAGE_VALUE));
        common.insert(HeaderName::from_static("sec-fetch-dest"), HeaderValue::from_static("empty"));
        common.insert(HeaderName::from_static("sec-fetch-mode"), HeaderValue::from_static("cors"));
        common.insert(HeaderName::from_static("sec-fetch-site"), HeaderValue::from_static("same-origin"));

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            common,
        })
    }

    /// Headers for one endpoint. A relative `referer` is resolved against the origin.
    pub fn resolve(&self, referer: Option<&str>) -> HeaderMap {
        let mut headers = self.common.clone();

        if let Some(referer) = referer {
            let absolute = if referer.starts_with("http://") || referer.starts_with("https://") {
                referer.to_string()
            } else {
                format!("{}/{}", self.base_url, referer.trim_start_matches('/'))
            };
            match HeaderValue::from_str(&absolute) {
                Ok(value) => {
                    headers.insert(REFERER, value);
                }
                Err(e) => warn!("Skipping invalid referer {}: {}", absolute, e),
            }
        }

        headers
    }
}
