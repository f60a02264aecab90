//! Message sources.
//!
//! A [`MessageSource`] answers "what happened after `last_seen_id`?" with a
//! [`Batch`]. [`HttpSource`] is the production implementation that talks to
//! a `/messages` endpoint.

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use crate::error::{PollError, Result};

/// Response header carrying the server's total event count.
pub const NUM_EVENTS_HEADER: &str = "numevents";

/// Query parameter carrying the client's high-water mark.
pub const LAST_SEEN_PARAM: &str = "lastSeenId";

/// Endpoint path, resolved against the configured base URL.
pub const MESSAGES_PATH: &str = "/messages";

/// One answer from a message source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Total number of events the server has ever produced.
    pub num_events: u64,
    /// HTML fragment, one top-level element per new message.
    pub body: String,
}

#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Fetch everything the server has after `last_seen_id`.
    async fn fetch(&self, last_seen_id: u64) -> Result<Batch>;
}

/// `GET /messages?lastSeenId=<n>` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSource {
    endpoint: Url,
    http: reqwest::Client,
}

impl HttpSource {
    /// Create a source for the server at `base_url`
    /// (e.g. "http://127.0.0.1:8080").
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        Self::with_client(base_url, reqwest::Client::new())
    }

    /// Create a source with a custom reqwest client.
    pub fn with_client(base_url: impl AsRef<str>, http: reqwest::Client) -> Result<Self> {
        let endpoint = Url::parse(base_url.as_ref())?.join(MESSAGES_PATH)?;
        Ok(Self { endpoint, http })
    }

    /// Fully resolved `/messages` URL, without the query.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn url(&self, last_seen_id: u64) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair(LAST_SEEN_PARAM, &last_seen_id.to_string());
        url
    }
}

#[async_trait]
impl MessageSource for HttpSource {
    async fn fetch(&self, last_seen_id: u64) -> Result<Batch> {
        let url = self.url(last_seen_id);
        debug!(name: "source.fetch", url = %url, "Fetching messages");

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PollError::Status {
                status: status.as_u16(),
            });
        }

        let num_events = parse_event_count(response.headers().get(NUM_EVENTS_HEADER))?;
        let body = response.text().await?;

        Ok(Batch { num_events, body })
    }
}

fn parse_event_count(value: Option<&reqwest::header::HeaderValue>) -> Result<u64> {
    let value = value.ok_or(PollError::MissingEventCount)?;
    let text = value.to_str().map_err(|_| PollError::InvalidEventCount {
        value: String::from_utf8_lossy(value.as_bytes()).into_owned(),
    })?;
    text.trim()
        .parse::<u64>()
        .map_err(|_| PollError::InvalidEventCount {
            value: text.to_string(),
        })
}
