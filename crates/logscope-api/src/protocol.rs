//! Protocol selection across collector generations.

use std::sync::Arc;

use async_trait::async_trait;

use logscope_types::{Capabilities, CollectorStatus, LogRecord, Selector};

use crate::client::{ApiClient, ApiError};
use crate::feed::{self, FeedConnection};
use crate::wire::{self, RangeQueryRequest, RangeQueryResponse};

/// Backend protocol spoken by one collector generation.
///
/// Selected once at session start from the detected collector version; the
/// engine holds one of these and never branches on the version again.
#[async_trait]
pub trait LogProtocol: Send + Sync {
    /// Issue a point-in-time range query.
    async fn query_range(
        &self,
        request: &RangeQueryRequest,
    ) -> Result<RangeQueryResponse, ApiError>;

    /// Open a push subscription for the given selector.
    async fn open_feed(&self, selector: &Selector) -> Result<FeedConnection, ApiError>;

    /// Decode one pushed line. Never fails; malformed input falls back.
    fn decode_line(&self, selector: &Selector, line: &str) -> LogRecord;

    /// Decode one record value from a query response.
    fn decode_value(&self, selector: &Selector, value: &serde_json::Value) -> LogRecord;

    fn capabilities(&self) -> Capabilities;
}

/// v2 protocol: JSON-encoded records with styled segments and revision
/// filtering.
pub struct StructuredProtocol {
    client: ApiClient,
}

impl StructuredProtocol {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LogProtocol for StructuredProtocol {
    async fn query_range(
        &self,
        request: &RangeQueryRequest,
    ) -> Result<RangeQueryResponse, ApiError> {
        self.client.range_query("v2/logs/query", request).await
    }

    async fn open_feed(&self, selector: &Selector) -> Result<FeedConnection, ApiError> {
        feed::connect(self.client.feed_url("v2/logs/tail", selector)?).await
    }

    fn decode_line(&self, _selector: &Selector, line: &str) -> LogRecord {
        wire::decode_structured_line(line)
    }

    fn decode_value(&self, _selector: &Selector, value: &serde_json::Value) -> LogRecord {
        wire::decode_structured_value(value)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            structured_protocol: true,
            revision_filter: true,
        }
    }
}

/// v1 protocol for older collectors: plain `timestamp stream text` lines,
/// no revision filter.
pub struct PlainProtocol {
    client: ApiClient,
}

impl PlainProtocol {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LogProtocol for PlainProtocol {
    async fn query_range(
        &self,
        request: &RangeQueryRequest,
    ) -> Result<RangeQueryResponse, ApiError> {
        // Old collectors do not understand revision filtering
        let request = RangeQueryRequest {
            revision_filter: None,
            ..request.clone()
        };
        self.client.range_query("v1/logs/query", &request).await
    }

    async fn open_feed(&self, selector: &Selector) -> Result<FeedConnection, ApiError> {
        let mut selector = selector.clone();
        selector.revision = None;
        feed::connect(self.client.feed_url("v1/logs/tail", &selector)?).await
    }

    fn decode_line(&self, selector: &Selector, line: &str) -> LogRecord {
        wire::decode_plain_line(selector, line)
    }

    fn decode_value(&self, selector: &Selector, value: &serde_json::Value) -> LogRecord {
        wire::decode_plain_value(selector, value)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            structured_protocol: false,
            revision_filter: false,
        }
    }
}

/// Pick the protocol implementation a session will use.
pub fn select_protocol(client: ApiClient, status: &CollectorStatus) -> Arc<dyn LogProtocol> {
    if Capabilities::for_collector(status).structured_protocol {
        Arc::new(StructuredProtocol::new(client))
    } else {
        Arc::new(PlainProtocol::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semver::Version;

    #[test]
    fn test_select_protocol_by_version() {
        let client = ApiClient::new("https://logs.example.com/", None).unwrap();
        let old = select_protocol(
            client.clone(),
            &CollectorStatus::Present(Version::new(1, 0, 4)),
        );
        assert!(!old.capabilities().structured_protocol);

        let new = select_protocol(
            client.clone(),
            &CollectorStatus::Present(Version::new(2, 0, 0)),
        );
        assert!(new.capabilities().revision_filter);

        let missing = select_protocol(client, &CollectorStatus::NotFound);
        assert!(!missing.capabilities().structured_protocol);
    }
}
