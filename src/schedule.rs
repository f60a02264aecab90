//! Periodic driver for a [`MessagePoller`].
//!
//! Polls run one at a time inside a single task: a tick that comes due
//! while a poll is still in flight is skipped rather than queued, so two
//! polls of the same poller never interleave.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::Result;
use crate::poller::{MessagePoller, PollOutcome};
use crate::source::MessageSource;
use crate::view::OrderedView;

/// Default time between polls.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);

/// Poll immediately, then every `every`, until `cancel` fires.
///
/// `on_poll` sees every cycle's result together with the view as it stands
/// afterwards. Failed cycles are logged and the loop carries on. Returns the
/// poller so callers can inspect its final state.
pub async fn run<S, V, F>(
    mut poller: MessagePoller<S, V>,
    every: Duration,
    cancel: CancellationToken,
    mut on_poll: F,
) -> MessagePoller<S, V>
where
    S: MessageSource,
    V: OrderedView,
    F: FnMut(&Result<PollOutcome>, &V),
{
    // interval() panics on a zero period.
    let every = every.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        name: "poller.started",
        interval_ms = u64::try_from(every.as_millis()).unwrap_or(u64::MAX),
        reverse = poller.settings().reverse,
        limit = ?poller.settings().limit,
        "Poller started"
    );

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        // An in-flight poll may be dropped here; the poller only mutates
        // after the whole batch has arrived and parsed.
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = poller.poll() => result,
        };

        if let Err(err) = &result {
            warn!(
                name: "poll.failed",
                error = %err,
                last_seen_id = poller.last_seen_id(),
                "Poll failed, retrying on next tick"
            );
        }
        on_poll(&result, poller.view());
    }

    info!(
        name: "poller.stopped",
        last_seen_id = poller.last_seen_id(),
        "Poller stopped"
    );
    poller
}
