//! The serving side of `/messages`.
//!
//! An [`EventLog`] collects rendered HTML events; [`router`] exposes them
//! to pollers. The total length of the log is reported in the `numEvents`
//! header so clients can tell new events from a restarted server.

use std::sync::{Arc, RwLock};

use axum::{
    Router,
    extract::{Query, State},
    http::{HeaderName, HeaderValue, StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::fragment::escape_html;
use crate::source::{MESSAGES_PATH, NUM_EVENTS_HEADER};

/// Thread-safe, append-only list of rendered events.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<RwLock<Vec<String>>>,
}

impl EventLog {
    /// An empty log; `numEvents` starts at 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one rendered event; returns the new event count.
    pub fn push(&self, html: impl Into<String>) -> usize {
        let mut events = self.events.write().unwrap();
        events.push(html.into());
        events.len()
    }

    pub fn len(&self) -> usize {
        self.events.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events after the first `last_seen_id`, together with the total count.
    ///
    /// A mark beyond the end of the log (the client saw a previous run of
    /// the server) yields the whole log.
    pub fn since(&self, last_seen_id: usize) -> (usize, Vec<String>) {
        let events = self.events.read().unwrap();
        let skip = if last_seen_id > events.len() {
            0
        } else {
            last_seen_id
        };
        (events.len(), events[skip..].to_vec())
    }

    /// Forget every event, as a restarted server would.
    pub fn reset(&self) {
        self.events.write().unwrap().clear();
    }
}

/// Render one plain-text line as a feed event.
pub fn render_line(line: &str) -> String {
    format!(
        "<div class=\"message\"><div>{}</div></div>",
        escape_html(line)
    )
}

#[derive(Debug, Deserialize)]
struct MessagesQuery {
    #[serde(rename = "lastSeenId")]
    last_seen_id: Option<String>,
}

impl MessagesQuery {
    /// Missing, malformed and negative marks all count as 0.
    fn mark(&self) -> usize {
        self.last_seen_id
            .as_deref()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(0)
    }
}

/// GET /messages?lastSeenId=N - events the client has not seen yet.
async fn messages_handler(
    State(log): State<EventLog>,
    Query(query): Query<MessagesQuery>,
) -> impl IntoResponse {
    let (num_events, events) = log.since(query.mark());
    (
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/html; charset=utf-8"),
            ),
            (
                HeaderName::from_static(NUM_EVENTS_HEADER),
                HeaderValue::from(num_events),
            ),
        ],
        events.join("\n"),
    )
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Build the feed router over `log`.
pub fn router(log: EventLog) -> Router {
    Router::new()
        .route(MESSAGES_PATH, get(messages_handler))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(log)
}

/// Serve `log` until `cancel` fires.
pub async fn start_server(
    config: &ServerConfig,
    log: EventLog,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %listener.local_addr()?,
        "Feed server started"
    );

    axum::serve(listener, router(log))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    info!(name: "server.stopped", "Feed server stopped");
    Ok(())
}
