//! The message poller.
//!
//! One [`MessagePoller::poll`] is one refresh cycle: fetch everything after
//! the high-water mark, clear the view if the server's counter went
//! backwards, merge the new nodes in and trim the view to its bound.

use std::num::NonZeroUsize;

use tracing::{debug, info};

use crate::error::Result;
use crate::fragment::{MessageNode, parse_fragment};
use crate::source::MessageSource;
use crate::view::OrderedView;

/// How new messages are laid out in the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewSettings {
    /// Append new messages after existing ones (oldest first) instead of
    /// inserting them in front (newest first).
    pub reverse: bool,
    /// Upper bound on displayed messages; `None` is unbounded.
    pub limit: Option<NonZeroUsize>,
}

impl ViewSettings {
    /// Build settings from the raw `max` knob, where any value `<= 0`
    /// means unbounded.
    pub fn from_raw(reverse: bool, max: i64) -> Self {
        let limit = usize::try_from(max).ok().and_then(NonZeroUsize::new);
        Self { reverse, limit }
    }
}

/// What a successful poll did to the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOutcome {
    /// Server-reported total event count; the new high-water mark.
    pub num_events: u64,
    /// The view was cleared because the counter went backwards.
    pub reset: bool,
    /// Nodes merged into the view.
    pub inserted: usize,
    /// Nodes removed to honour the limit.
    pub trimmed: usize,
}

impl PollOutcome {
    /// Whether the view's contents changed.
    pub fn changed(&self) -> bool {
        self.reset || self.inserted > 0 || self.trimmed > 0
    }
}

/// Keeps a view in step with a message source.
///
/// Each [`poll`](Self::poll) fetches what arrived after the stored
/// `last_seen_id`, clears the view if the server's counter went backwards,
/// inserts the new messages at the configured end and trims to the limit.
#[derive(Debug)]
pub struct MessagePoller<S, V> {
    source: S,
    view: V,
    settings: ViewSettings,
    last_seen_id: u64,
}

impl<S, V> MessagePoller<S, V>
where
    S: MessageSource,
    V: OrderedView,
{
    pub fn new(source: S, view: V, settings: ViewSettings) -> Self {
        Self {
            source,
            view,
            settings,
            last_seen_id: 0,
        }
    }

    /// Last server event count seen; 0 before the first successful poll.
    pub fn last_seen_id(&self) -> u64 {
        self.last_seen_id
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn settings(&self) -> ViewSettings {
        self.settings
    }

    pub fn into_parts(self) -> (S, V) {
        (self.source, self.view)
    }

    /// Run one refresh cycle.
    ///
    /// The body is parsed before anything is mutated, so on error neither
    /// the high-water mark nor the view changes.
    pub async fn poll(&mut self) -> Result<PollOutcome> {
        let batch = self.source.fetch(self.last_seen_id).await?;
        let nodes = parse_fragment(&batch.body)?;
        Ok(self.apply(batch.num_events, nodes))
    }

    /// Apply an already fetched batch.
    pub fn apply(&mut self, num_events: u64, nodes: Vec<MessageNode>) -> PollOutcome {
        // A counter below our mark means the server lost its history.
        let reset = self.last_seen_id > num_events;
        if reset {
            info!(
                name: "poll.reset",
                last_seen_id = self.last_seen_id,
                num_events,
                cleared = self.view.len(),
                "Server event count went backwards, clearing view"
            );
            self.view.clear();
        }

        self.last_seen_id = num_events;

        let inserted = nodes.len();
        for node in nodes {
            if self.settings.reverse {
                self.view.push_back(node);
            } else {
                self.view.push_front(node);
            }
        }

        let mut trimmed = 0;
        if let Some(limit) = self.settings.limit {
            while self.view.len() > limit.get() {
                let removed = if self.settings.reverse {
                    self.view.pop_front()
                } else {
                    self.view.pop_back()
                };
                if removed.is_none() {
                    break;
                }
                trimmed += 1;
            }
        }

        let outcome = PollOutcome {
            num_events,
            reset,
            inserted,
            trimmed,
        };
        debug!(
            name: "poll.applied",
            num_events,
            inserted,
            trimmed,
            displayed = self.view.len(),
            "Poll applied"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PollError;
    use crate::source::Batch;
    use crate::view::MessageList;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned answers and records the marks it was asked for.
    #[derive(Default)]
    struct ScriptedSource {
        answers: Mutex<VecDeque<Result<Batch>>>,
        requested: Mutex<Vec<u64>>,
    }

    impl ScriptedSource {
        fn answer(self, num_events: u64, body: &str) -> Self {
            self.answers.lock().unwrap().push_back(Ok(Batch {
                num_events,
                body: body.to_string(),
            }));
            self
        }

        fn fail(self, err: PollError) -> Self {
            self.answers.lock().unwrap().push_back(Err(err));
            self
        }
    }

    #[async_trait]
    impl MessageSource for ScriptedSource {
        async fn fetch(&self, last_seen_id: u64) -> Result<Batch> {
            self.requested.lock().unwrap().push(last_seen_id);
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(PollError::MissingEventCount))
        }
    }

    fn messages(range: std::ops::RangeInclusive<u32>) -> String {
        range
            .map(|n| format!("<div>m{n}</div>"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn poller(
        source: ScriptedSource,
        reverse: bool,
        max: i64,
    ) -> MessagePoller<ScriptedSource, MessageList> {
        MessagePoller::new(
            source,
            MessageList::new(),
            ViewSettings::from_raw(reverse, max),
        )
    }

    #[test]
    fn raw_max_sentinels() {
        assert_eq!(ViewSettings::from_raw(false, -1).limit, None);
        assert_eq!(ViewSettings::from_raw(false, 0).limit, None);
        assert_eq!(ViewSettings::from_raw(true, 5).limit, NonZeroUsize::new(5));
    }

    #[tokio::test]
    async fn newest_first_with_limit() {
        let source = ScriptedSource::default().answer(3, &messages(1..=3));
        let mut p = poller(source, false, 2);

        let outcome = p.poll().await.unwrap();

        assert_eq!(p.view().html(), vec!["<div>m3</div>", "<div>m2</div>"]);
        assert_eq!(p.last_seen_id(), 3);
        assert_eq!(
            outcome,
            PollOutcome {
                num_events: 3,
                reset: false,
                inserted: 3,
                trimmed: 1,
            }
        );
    }

    #[tokio::test]
    async fn oldest_first_trims_from_front() {
        let source = ScriptedSource::default()
            .answer(2, &messages(1..=2))
            .answer(4, &messages(3..=4));
        let mut p = poller(source, true, 3);

        p.poll().await.unwrap();
        assert_eq!(p.view().html(), vec!["<div>m1</div>", "<div>m2</div>"]);

        p.poll().await.unwrap();
        assert_eq!(
            p.view().html(),
            vec!["<div>m2</div>", "<div>m3</div>", "<div>m4</div>"]
        );
    }

    #[tokio::test]
    async fn counter_going_backwards_clears_view() {
        let source = ScriptedSource::default()
            .answer(3, &messages(1..=3))
            .answer(0, "");
        let mut p = poller(source, false, -1);

        p.poll().await.unwrap();
        assert_eq!(p.view().len(), 3);

        let outcome = p.poll().await.unwrap();
        assert!(outcome.reset);
        assert!(p.view().is_empty());
        assert_eq!(p.last_seen_id(), 0);
    }

    #[tokio::test]
    async fn reset_clears_before_inserting() {
        let source = ScriptedSource::default()
            .answer(5, &messages(1..=5))
            .answer(1, "<div>fresh</div>");
        let mut p = poller(source, false, -1);

        p.poll().await.unwrap();
        p.poll().await.unwrap();

        assert_eq!(p.view().html(), vec!["<div>fresh</div>"]);
        assert_eq!(p.last_seen_id(), 1);
    }

    #[tokio::test]
    async fn quiet_poll_changes_nothing() {
        let source = ScriptedSource::default()
            .answer(2, &messages(1..=2))
            .answer(2, "");
        let mut p = poller(source, false, -1);

        p.poll().await.unwrap();
        let before = p.view().html().join("");

        let outcome = p.poll().await.unwrap();
        assert!(!outcome.changed());
        assert_eq!(p.view().html().join(""), before);
        assert_eq!(p.last_seen_id(), 2);
    }

    #[tokio::test]
    async fn requests_carry_high_water_mark() {
        let source = ScriptedSource::default()
            .answer(2, &messages(1..=2))
            .answer(3, &messages(3..=3));
        let mut p = poller(source, false, -1);

        p.poll().await.unwrap();
        p.poll().await.unwrap();

        let (source, _) = p.into_parts();
        assert_eq!(*source.requested.lock().unwrap(), vec![0, 2]);
    }

    #[tokio::test]
    async fn failures_leave_state_alone() {
        let source = ScriptedSource::default()
            .answer(2, &messages(1..=2))
            .fail(PollError::Status { status: 503 })
            .answer(9, "<div>ok</div><!-- broken");
        let mut p = poller(source, false, -1);

        p.poll().await.unwrap();

        assert!(matches!(
            p.poll().await,
            Err(PollError::Status { status: 503 })
        ));
        assert_eq!(p.last_seen_id(), 2);

        assert!(matches!(p.poll().await, Err(PollError::Fragment(_))));
        assert_eq!(p.last_seen_id(), 2);
        assert_eq!(p.view().len(), 2);
    }

    #[test]
    fn limit_holds_across_many_batches() {
        let mut p = poller(ScriptedSource::default(), false, 4);
        let mut total = 0u64;
        for batch in 1..=6u32 {
            let body = messages(batch * 10..=batch * 10 + batch);
            let nodes = parse_fragment(&body).unwrap();
            total += nodes.len() as u64;
            p.apply(total, nodes);
            assert!(p.view().len() <= 4);
        }
        assert_eq!(p.view().iter().next().unwrap().text(), "m66");
    }
}
