//! A FIFO async mutex for serializing critical sections.
//!
//! Used where a shared lazy cursor must serve one "give me more" request at a
//! time. Not reentrant: running a section from inside another on the same
//! mutex deadlocks.

use futures_util::future::BoxFuture;

/// Runs critical sections one at a time, in the order they were queued.
#[derive(Debug, Default)]
pub struct Mutex<T> {
    inner: tokio::sync::Mutex<T>,
}

impl<T: Send> Mutex<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: tokio::sync::Mutex::new(value),
        }
    }

    /// Queue `section` and run it once every earlier section has finished.
    pub async fn run<R, F>(&self, section: F) -> R
    where
        F: for<'a> FnOnce(&'a mut T) -> BoxFuture<'a, R>,
    {
        let mut guard = self.inner.lock().await;
        section(&mut guard).await
    }

    /// Run `section` only if nothing holds or waits on the lock.
    ///
    /// Returns `None` without running it otherwise.
    pub async fn run_if_none<R, F>(&self, section: F) -> Option<R>
    where
        F: for<'a> FnOnce(&'a mut T) -> BoxFuture<'a, R>,
    {
        let mut guard = self.inner.try_lock().ok()?;
        Some(section(&mut guard).await)
    }

    pub fn is_locked(&self) -> bool {
        self.inner.try_lock().is_err()
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use futures_util::FutureExt;

    #[tokio::test]
    async fn test_sections_run_in_queue_order() {
        let mutex = Mutex::new(Vec::new());

        let push = |n: u32| {
            let mutex = &mutex;
            async move {
                mutex
                    .run(move |log: &mut Vec<u32>| {
                        async move {
                            tokio::task::yield_now().await;
                            log.push(n);
                        }
                        .boxed()
                    })
                    .await
            }
        };

        futures_util::join!(push(1), push(2), push(3));
        assert_eq!(mutex.into_inner(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_run_if_none_skips_when_locked() {
        let mutex = Arc::new(Mutex::new(0u32));
        let inner = mutex.clone();

        let skipped = mutex
            .run(move |count: &mut u32| {
                async move {
                    *count += 1;
                    assert!(inner.is_locked());
                    inner
                        .run_if_none(|count: &mut u32| async move { *count += 100 }.boxed())
                        .await
                }
                .boxed()
            })
            .await;

        assert_eq!(skipped, None);
        assert!(!mutex.is_locked());

        let ran = mutex
            .run_if_none(|count: &mut u32| async move { *count }.boxed())
            .await;
        assert_eq!(ran, Some(1));
    }
}
