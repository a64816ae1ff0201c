//! Single-shot HTTP POST to a license server.
//!
//! No retries and no backoff: one request per acquisition. Failures carry
//! everything [`crate::report`] prints.
use std::collections::HashMap;
use std::fmt;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;

use crate::config::Config;
use crate::error::Result;

/// Why a license request did not produce a response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    /// Short error kind, e.g. `FetchError`.
    pub name: String,
    /// HTTP status, when a response arrived.
    pub status: Option<u16>,
    /// Canonical reason phrase for `status`.
    pub status_text: Option<String>,
    pub message: String,
    /// Response body, when a non-empty one arrived.
    pub body: Option<Vec<u8>>,
}

impl TransportFailure {
    fn new(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: None,
            status_text: None,
            message: message.into(),
            body: None,
        }
    }

    /// A non-2xx response.
    pub fn http(status: StatusCode, body: Option<Vec<u8>>) -> Self {
        Self {
            name: "FetchError".to_string(),
            status: Some(status.as_u16()),
            status_text: status.canonical_reason().map(str::to_string),
            message: status.to_string(),
            body: body.filter(|b| !b.is_empty()),
        }
    }
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, &self.status_text) {
            (Some(status), Some(text)) => write!(f, "{} {}: {}", self.name, status, text),
            _ => write!(f, "{}: {}", self.name, self.message),
        }
    }
}

impl std::error::Error for TransportFailure {}

impl From<reqwest::Error> for TransportFailure {
    fn from(e: reqwest::Error) -> Self {
        let name = if e.is_timeout() {
            "TimeoutError"
        } else if e.is_connect() {
            "ConnectError"
        } else if e.is_builder() || e.is_request() {
            "RequestError"
        } else if e.is_body() || e.is_decode() {
            "BodyError"
        } else {
            "FetchError"
        };
        let mut failure = Self::new(name, e.to_string());
        if let Some(status) = e.status() {
            failure.status = Some(status.as_u16());
            failure.status_text = status.canonical_reason().map(str::to_string);
        }
        failure
    }
}

/// HTTP client for license requests.
#[derive(Debug, Clone)]
pub struct Transport {
    client: reqwest::Client,
}

impl Transport {
    pub fn new(config: &Config) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.as_str());
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    /// POST `body` to `url` and return the response body of a 2xx answer.
    ///
    /// Caller headers win over client defaults such as User-Agent.
    pub async fn post(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        body: Vec<u8>,
    ) -> std::result::Result<Vec<u8>, TransportFailure> {
        let headers = header_map(headers)?;
        let response = self
            .client
            .post(url)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.ok().map(|b| b.to_vec());
            return Err(TransportFailure::http(status, body));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

fn header_map(headers: &HashMap<String, String>) -> std::result::Result<HeaderMap, TransportFailure> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            TransportFailure::new("InvalidHeader", format!("{}: {}", name, e))
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            TransportFailure::new("InvalidHeader", format!("{}: {}", name, e))
        })?;
        map.insert(name, value);
    }
    Ok(map)
}
