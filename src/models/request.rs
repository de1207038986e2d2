use crate::errors::FetchFailure;
use reqwest::header::HeaderMap;
use serde_json::Value;
use std::time::Duration;

/// One GET to issue as part of a batch.
#[derive(Debug, Clone)]
pub struct EndpointRequest {
    pub key: String,
    pub url: String,
    pub headers: HeaderMap,
    pub timeout: Duration,
}

impl EndpointRequest {
    pub fn new(key: impl Into<String>, url: impl Into<String>, headers: HeaderMap, timeout: Duration) -> Self {
        Self {
            key: key.into(),
            url: url.into(),
            headers,
            timeout,
        }
    }
}

/// Result of one endpoint fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Success(Value),
    Failure(FetchFailure),
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success(_))
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            FetchOutcome::Success(value) => Some(value),
            FetchOutcome::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&FetchFailure> {
        match self {
            FetchOutcome::Success(_) => None,
            FetchOutcome::Failure(reason) => Some(reason),
        }
    }
}

impl From<std::result::Result<Value, FetchFailure>> for FetchOutcome {
    fn from(result: std::result::Result<Value, FetchFailure>) -> Self {
        match result {
            Ok(value) => FetchOutcome::Success(value),
            Err(reason) => FetchOutcome::Failure(reason),
        }
    }
}
