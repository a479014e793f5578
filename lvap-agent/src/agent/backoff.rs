use std::{
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use futures::{FutureExt, Stream};
use tokio::time::{sleep, Sleep};

use crate::AgentOptions;

/// A stream that yields exponentially increasing backoff durations, capped at
/// a maximum. It never ends: the controller is retried for as long as the
/// agent runs.
#[derive(Debug)]
pub struct ExponentialBackoff {
    /// Failed attempts so far.
    retry_count: usize,
    /// The current backoff duration.
    backoff: Duration,
    max: Duration,
    /// We need the timeout to be pinned (`Sleep` is not `Unpin`)
    timeout: Option<Pin<Box<Sleep>>>,
}

impl ExponentialBackoff {
    /// Backoff starting at `initial`, doubling up to `max`.
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { retry_count: 0, backoff: initial.min(max), max, timeout: None }
    }

    /// Number of waits yielded so far.
    pub const fn retry_count(&self) -> usize {
        self.retry_count
    }

    fn reset_timeout(&mut self) {
        self.timeout = Some(Box::pin(sleep(self.backoff)));
    }
}

impl From<&AgentOptions> for ExponentialBackoff {
    fn from(options: &AgentOptions) -> Self {
        Self::new(options.backoff_duration, options.max_backoff)
    }
}

impl Stream for ExponentialBackoff {
    type Item = Duration;

    /// Yields the duration that was waited once the current timeout elapses.
    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            let Some(ref mut timeout) = this.timeout else {
                this.reset_timeout();
                continue;
            };

            if timeout.poll_unpin(cx).is_pending() {
                return Poll::Pending;
            }

            let waited = this.backoff;
            this.backoff = (this.backoff * 2).min(this.max);
            this.retry_count += 1;
            this.reset_timeout();

            return Poll::Ready(Some(waited));
        }
    }
}
