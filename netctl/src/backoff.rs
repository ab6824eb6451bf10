use futures::{FutureExt, Stream};
use std::{pin::Pin, task::Poll, time::Duration};
use tokio::time::sleep;

/// A stream that sleeps for exponentially increasing durations, capped at a maximum.
///
/// Each item is yielded once its sleep has elapsed and carries the slept duration. The stream
/// never ends, so callers bound it from the outside.
#[derive(Debug)]
pub(crate) struct ExponentialBackoff {
    /// Number of elapsed sleeps.
    retry_count: usize,
    /// The next backoff duration.
    backoff: Duration,
    /// Upper bound for a single backoff.
    max: Duration,
    /// The running sleep, if any.
    /// We need the timeout to be pinned (`Sleep` is not `Unpin`)
    timeout: Option<Pin<Box<tokio::time::Sleep>>>,
}

impl ExponentialBackoff {
    pub(crate) fn new(initial: Duration, max: Duration) -> Self {
        Self { retry_count: 0, backoff: initial.min(max), max, timeout: None }
    }

    pub(crate) const fn retry_count(&self) -> usize {
        self.retry_count
    }
}

impl Stream for ExponentialBackoff {
    type Item = Duration;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let backoff = this.backoff;
        let timeout = this.timeout.get_or_insert_with(|| Box::pin(sleep(backoff)));

        if timeout.poll_unpin(cx).is_pending() {
            return Poll::Pending;
        }

        // The next sleep starts on the next poll, not now
        this.timeout = None;
        this.retry_count += 1;
        this.backoff = (backoff * 2).min(this.max);

        Poll::Ready(Some(backoff))
    }
}
