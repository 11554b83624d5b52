//! Live job status stream.
//!
//! Each observer gets its own polling loop over the job store. The first
//! snapshot goes out immediately; after that a snapshot is emitted only
//! when the row changed, and the stream ends after a terminal snapshot or
//! when the row disappears.

use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use futures::Stream;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use v2m_models::Job;
use v2m_store::JobStore;

/// Something to send to a watching client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Snapshot(Job),
    Keepalive,
}

#[derive(Debug, Clone, Copy)]
pub struct WatchConfig {
    pub poll_interval: Duration,
    pub keepalive_interval: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            keepalive_interval: Duration::from_secs(15),
        }
    }
}

enum Tick {
    Poll,
    Keepalive,
}

fn has_changed(previous: &Job, next: &Job) -> bool {
    next.updated_at > previous.updated_at || next.status != previous.status
}

/// Stream the evolution of `initial` until it reaches a terminal state.
pub fn watch_job(
    store: Arc<dyn JobStore>,
    initial: Job,
    config: WatchConfig,
) -> impl Stream<Item = WatchEvent> + Send {
    stream! {
        let job_id = initial.id.clone();
        let done = initial.is_terminal();
        let mut last = initial.clone();
        yield WatchEvent::Snapshot(initial);
        if done {
            return;
        }

        let start = Instant::now();
        let mut poll = interval_at(start + config.poll_interval, config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut keepalive =
            interval_at(start + config.keepalive_interval, config.keepalive_interval);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let tick = tokio::select! {
                _ = poll.tick() => Tick::Poll,
                _ = keepalive.tick() => Tick::Keepalive,
            };

            match tick {
                Tick::Keepalive => yield WatchEvent::Keepalive,
                Tick::Poll => match store.get(&job_id).await {
                    Ok(next) => {
                        if !has_changed(&last, &next) {
                            continue;
                        }
                        let done = next.is_terminal();
                        last = next.clone();
                        yield WatchEvent::Snapshot(next);
                        if done {
                            break;
                        }
                    }
                    Err(e) if e.is_not_found() => {
                        debug!(job_id = %job_id, "Watched job disappeared");
                        break;
                    }
                    Err(e) => {
                        warn!(job_id = %job_id, "Status poll failed: {}", e);
                    }
                },
            }
        }
    }
}
