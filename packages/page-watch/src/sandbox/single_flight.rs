//! Single-flight guard for lazily created shared resources.
//!
//! At most one creation attempt is in flight at a time. Callers arriving
//! while it runs attach to the same attempt and receive its result instead of
//! starting their own. Once the attempt finishes the slot is cleared, so a
//! failed attempt can be retried by the next caller.

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;

pub struct SingleFlight<E>
where
    E: Clone + Send + Sync + 'static,
{
    in_flight: Mutex<Option<Shared<BoxFuture<'static, Result<(), E>>>>>,
}

impl<E> Default for SingleFlight<E>
where
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E> SingleFlight<E>
where
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            in_flight: Mutex::new(None),
        }
    }

    /// Run `create` unless an attempt is already in flight, in which case
    /// wait for that attempt instead.
    pub async fn run<F>(&self, create: F) -> Result<(), E>
    where
        F: FnOnce() -> BoxFuture<'static, Result<(), E>>,
    {
        let flight = {
            let mut slot = self.in_flight.lock().await;
            match slot.as_ref() {
                Some(existing) => existing.clone(),
                None => {
                    let fresh = create().shared();
                    *slot = Some(fresh.clone());
                    fresh
                }
            }
        };

        let result = flight.clone().await;

        // Whoever finishes first clears the slot, but never a newer attempt
        let mut slot = self.in_flight.lock().await;
        if slot
            .as_ref()
            .is_some_and(|current| current.ptr_eq(&flight))
        {
            *slot = None;
        }

        result
    }

    /// Whether a creation attempt is currently running.
    pub async fn is_in_flight(&self) -> bool {
        self.in_flight.lock().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_attempt() {
        let guard = Arc::new(SingleFlight::<String>::new());
        let attempts = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let guard = guard.clone();
            let attempts = attempts.clone();
            handles.push(tokio::spawn(async move {
                guard
                    .run(move || {
                        async move {
                            attempts.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok(())
                        }
                        .boxed()
                    })
                    .await
            }));
        }

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(!guard.is_in_flight().await);
    }

    #[tokio::test]
    async fn test_failure_is_shared_then_retried() {
        let guard = SingleFlight::<String>::new();

        let first = guard
            .run(|| async { Err("boom".to_string()) }.boxed())
            .await;
        assert_eq!(first, Err("boom".to_string()));

        let second = guard.run(|| async { Ok(()) }.boxed()).await;
        assert_eq!(second, Ok(()));
    }
}
