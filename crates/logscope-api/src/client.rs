//! HTTP client for the log service.

use reqwest::{StatusCode, Url};
use serde::Deserialize;

use logscope_types::{CollectorStatus, Selector};

use crate::wire::{RangeQueryRequest, RangeQueryResponse};

/// Transport-level failure talking to the log service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("service returned status {0}")]
    Status(StatusCode),

    #[error("transport failure: {0}")]
    Transport(String),
}

/// Log service client wrapper
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl ApiClient {
    /// Create a client for the given service base URL.
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url).map_err(|e| ApiError::InvalidUrl(e.to_string()))?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            token,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::InvalidUrl(e.to_string()))
    }

    /// Issue a point-in-time range query against the given endpoint path.
    pub(crate) async fn range_query(
        &self,
        path: &str,
        request: &RangeQueryRequest,
    ) -> Result<RangeQueryResponse, ApiError> {
        let mut builder = self.http.post(self.endpoint(path)?).json(request);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            return Err(ApiError::Status(response.status()));
        }

        Ok(response.json().await?)
    }

    /// Discovery call: resolve the installed collector version for a target.
    ///
    /// A missing collector is a normal outcome, not an error.
    pub async fn collector_status(
        &self,
        deployment_target_id: &str,
    ) -> Result<CollectorStatus, ApiError> {
        #[derive(Deserialize)]
        struct Discovery {
            version: String,
        }

        let url = self.endpoint(&format!("v1/collector/{deployment_target_id}"))?;
        let mut builder = self.http.get(url);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(CollectorStatus::NotFound);
        }
        if !response.status().is_success() {
            return Err(ApiError::Status(response.status()));
        }

        let discovery: Discovery = response.json().await?;
        match semver::Version::parse(&discovery.version) {
            Ok(version) => Ok(CollectorStatus::Present(version)),
            Err(err) => {
                tracing::warn!(%err, version = %discovery.version, "collector reported an unparseable version");
                Ok(CollectorStatus::NotFound)
            }
        }
    }

    /// Websocket address for a tail subscription under the given path.
    ///
    /// The selector parameters become the subscription's addressing.
    pub(crate) fn feed_url(&self, path: &str, selector: &Selector) -> Result<Url, ApiError> {
        let mut url = self.endpoint(path)?;
        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|_| ApiError::InvalidUrl("cannot derive websocket scheme".to_string()))?;

        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("selector", &selector.service)
                .append_pair("deployment_target_id", &selector.deployment_target_id)
                .append_pair("search_term", &selector.search_term);
            if let Some(revision) = &selector.revision {
                pairs.append_pair("revision", revision);
            }
            if let Some(token) = &self.token {
                pairs.append_pair("token", token);
            }
        }

        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_url_encodes_selector() {
        let client = ApiClient::new("https://logs.example.com/", None).unwrap();
        let mut selector = Selector::new("web", "prod-target");
        selector.search_term = "timed out".to_string();
        selector.revision = Some("rev-3".to_string());

        let url = client.feed_url("v2/logs/tail", &selector).unwrap();
        assert_eq!(url.scheme(), "wss");
        assert!(url.as_str().contains("selector=web"));
        assert!(url.as_str().contains("deployment_target_id=prod-target"));
        assert!(url.as_str().contains("revision=rev-3"));
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            ApiClient::new("not a url", None),
            Err(ApiError::InvalidUrl(_))
        ));
    }
}
