//! Bounded, order-preserving concurrent map over a stream.

use std::collections::VecDeque;
use std::future::Future;
use std::panic;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::task::JoinHandle;

/// Map `source` through `map`, running up to `concurrency` map futures at a
/// time.
///
/// Outputs are yielded in input order. The next input is pulled only while
/// fewer than `concurrency` futures are outstanding. Each future is spawned
/// onto the tokio runtime; dropping the returned stream aborts any that have
/// not finished.
///
/// A `concurrency` of zero is treated as one.
pub fn prefetch<S, F, Fut>(source: S, concurrency: usize, map: F) -> Prefetch<S, F, Fut>
where
    S: Stream + Unpin,
    F: FnMut(S::Item) -> Fut,
    Fut: Future + Send + 'static,
    Fut::Output: Send + 'static,
{
    Prefetch {
        source,
        source_done: false,
        map,
        concurrency: concurrency.max(1),
        pending: VecDeque::new(),
    }
}

/// Stream returned by [`prefetch`].
pub struct Prefetch<S, F, Fut: Future> {
    source: S,
    source_done: bool,
    map: F,
    concurrency: usize,
    pending: VecDeque<JoinHandle<Fut::Output>>,
}

impl<S: Unpin, F, Fut: Future> Unpin for Prefetch<S, F, Fut> {}

impl<S, F, Fut: Future> Prefetch<S, F, Fut> {
    /// Number of map futures currently outstanding.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }
}

impl<S, F, Fut> Stream for Prefetch<S, F, Fut>
where
    S: Stream + Unpin,
    F: FnMut(S::Item) -> Fut,
    Fut: Future + Send + 'static,
    Fut::Output: Send + 'static,
{
    type Item = Fut::Output;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        while !this.source_done && this.pending.len() < this.concurrency {
            match Pin::new(&mut this.source).poll_next(cx) {
                Poll::Ready(Some(input)) => {
                    let fut = (this.map)(input);
                    this.pending.push_back(tokio::spawn(fut));
                }
                Poll::Ready(None) => this.source_done = true,
                Poll::Pending => break,
            }
        }

        let Some(head) = this.pending.front_mut() else {
            return if this.source_done {
                Poll::Ready(None)
            } else {
                Poll::Pending
            };
        };

        match Pin::new(head).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(result) => {
                this.pending.pop_front();
                match result {
                    Ok(output) => Poll::Ready(Some(output)),
                    Err(e) if e.is_panic() => panic::resume_unwind(e.into_panic()),
                    // Only we abort these, and only on drop.
                    Err(_) => Poll::Ready(None),
                }
            }
        }
    }
}

impl<S, F, Fut: Future> Drop for Prefetch<S, F, Fut> {
    fn drop(&mut self) {
        for task in &self.pending {
            task.abort();
        }
    }
}
