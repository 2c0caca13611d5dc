//! Single-flight execution
//!
//! Concurrent callers of [`SingleFlight::run`] share one execution of the
//! operation: the first caller spawns it, later callers attach to the same shared
//! result until it resolves. The operation runs as its own task, so it finishes
//! even when every caller has gone away, and the slot is released as soon as it
//! does.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// `None` when the task panicked or the runtime shut down underneath it
type Flight<T> = Shared<BoxFuture<'static, Option<T>>>;

struct Slot<T> {
    epoch: u64,
    flight: Option<Flight<T>>,
}

/// Clears the slot when the spawned task ends, however it ends
struct Release<T> {
    slot: Arc<Mutex<Slot<T>>>,
    epoch: u64,
}

impl<T> Drop for Release<T> {
    fn drop(&mut self) {
        let mut slot = lock(&self.slot);
        if slot.epoch == self.epoch {
            slot.flight = None;
        }
    }
}

pub struct SingleFlight<T> {
    slot: Arc<Mutex<Slot<T>>>,
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot {
                epoch: 0,
                flight: None,
            })),
        }
    }
}

impl<T> std::fmt::Debug for SingleFlight<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &lock(&self.slot).flight.is_some())
            .finish()
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an execution is currently running
    pub fn in_flight(&self) -> bool {
        lock(&self.slot).flight.is_some()
    }

    /// Run `start` unless an execution is already in flight, in which case wait
    /// for that one instead. `start` is only invoked by the caller that opens the
    /// flight.
    ///
    /// Must be called from within a Tokio runtime. Returns `None` only if the
    /// spawned task panicked or was cancelled by runtime shutdown.
    pub async fn run<F, Fut>(&self, start: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let flight = {
            let mut slot = lock(&self.slot);
            if let Some(flight) = &slot.flight {
                flight.clone()
            } else {
                slot.epoch += 1;
                let release = Release {
                    slot: Arc::clone(&self.slot),
                    epoch: slot.epoch,
                };
                let operation = start();
                let task = tokio::spawn(async move {
                    let _release = release;
                    operation.await
                });
                let flight = async move { task.await.ok() }.boxed().shared();
                slot.flight = Some(flight.clone());
                flight
            }
        };
        flight.await
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_callers_share_one_execution() {
        let flight = SingleFlight::new();
        let starts = Arc::new(AtomicUsize::new(0));

        let calls = (0..16).map(|_| {
            let starts = Arc::clone(&starts);
            flight.run(move || async move {
                starts.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                "fresh".to_string()
            })
        });
        let results = futures::future::join_all(calls).await;

        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(results.len(), 16);
        assert!(results.iter().all(|r| r.as_deref() == Some("fresh")));
        assert!(!flight.in_flight());
    }

    #[tokio::test]
    async fn failure_is_shared_by_every_waiter() {
        let flight: SingleFlight<Option<String>> = SingleFlight::new();
        let calls = (0..8).map(|_| {
            flight.run(|| async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                None
            })
        });
        let results = futures::future::join_all(calls).await;
        assert!(results.iter().all(|r| r == &Some(None)));
    }

    #[tokio::test]
    async fn completed_flight_releases_the_slot() {
        let flight = SingleFlight::new();
        let starts = Arc::new(AtomicUsize::new(0));

        for expected in 1..=3 {
            let starts_in = Arc::clone(&starts);
            let value = flight
                .run(move || async move { starts_in.fetch_add(1, Ordering::SeqCst) + 1 })
                .await;
            assert_eq!(value, Some(expected));
            assert!(!flight.in_flight());
        }
        assert_eq!(starts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn caller_attaching_late_gets_the_running_result() {
        let flight = SingleFlight::new();

        let first = flight.run(|| async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            7u32
        });
        assert!(
            tokio::time::timeout(Duration::from_millis(1), first)
                .await
                .is_err()
        );
        assert!(flight.in_flight());

        let value = flight.run(|| async { 99u32 }).await;
        assert_eq!(value, Some(7));
        assert!(!flight.in_flight());
    }

    #[tokio::test]
    async fn abandoned_flight_finishes_without_callers() {
        let flight = SingleFlight::new();
        let finished = Arc::new(AtomicUsize::new(0));

        let finished_in = Arc::clone(&finished);
        let first = flight.run(move || async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            finished_in.fetch_add(1, Ordering::SeqCst);
            1u32
        });
        assert!(
            tokio::time::timeout(Duration::from_millis(1), first)
                .await
                .is_err()
        );

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert!(!flight.in_flight());

        // The next call opens a new flight instead of reusing the finished one
        let value = flight.run(|| async { 2u32 }).await;
        assert_eq!(value, Some(2));
    }

    #[tokio::test]
    async fn panicked_flight_releases_the_slot() {
        let flight: SingleFlight<u32> = SingleFlight::new();

        let value = flight
            .run(|| async {
                let failed = true;
                assert!(!failed, "refresh task failed");
                0u32
            })
            .await;
        assert_eq!(value, None);
        assert!(!flight.in_flight());

        assert_eq!(flight.run(|| async { 3u32 }).await, Some(3));
    }
}
