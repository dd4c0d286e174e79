//! Request coalescing for concurrent identical lookups.
//!
//! The first caller for a key becomes the leader and runs the fetch; callers
//! that arrive while it is running subscribe to a write-once slot and get the
//! leader's result. Nothing is cached here: once the fetch completes the key
//! is released and the next call fetches again.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::FutureExt;
use metrics::counter;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Failure of the leader itself, seen by the leader and every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoalesceError {
    /// The fetch panicked.
    #[error("in-flight fetch panicked: {0}")]
    Panicked(String),

    /// The leader was dropped (cancelled or timed out) before completing.
    #[error("in-flight fetch was cancelled before completing")]
    LeaderCancelled,
}

type Slot<T> = Option<Result<T, CoalesceError>>;

struct InFlight<T> {
    /// Distinguishes this fetch from a later one for the same key.
    generation: u64,
    result: watch::Receiver<Slot<T>>,
    /// Callers currently subscribed; a dropped waiter takes itself off.
    waiters: usize,
}

enum Role<T> {
    Leader {
        generation: u64,
        publisher: watch::Sender<Slot<T>>,
    },
    Waiter {
        generation: u64,
        result: watch::Receiver<Slot<T>>,
    },
}

/// Deduplicates concurrent work per key.
///
/// The table lock is only held to register, join or release a key; fetches
/// run outside it, so different keys never wait on each other.
///
/// # Examples
///
/// ```
/// use turnstile_server::cache::RequestCoalescer;
///
/// # #[tokio::main]
/// # async fn main() {
/// let coalescer: RequestCoalescer<&str, u32> = RequestCoalescer::new();
/// let value = coalescer.execute("answer", || async { 42 }).await.unwrap();
/// assert_eq!(value, 42);
/// assert_eq!(coalescer.in_flight(), 0);
/// # }
/// ```
pub struct RequestCoalescer<K, T> {
    in_flight: Mutex<HashMap<K, InFlight<T>>>,
    next_generation: AtomicU64,
}

impl<K, T> RequestCoalescer<K, T>
where
    K: Eq + Hash + Clone + Send + Sync,
    T: Clone + Send + Sync,
{
    pub fn new() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Runs `fetch` for `key` unless a fetch for the same key is already
    /// running, in which case waits for and returns that fetch's result.
    pub async fn execute<F, Fut>(&self, key: K, fetch: F) -> Result<T, CoalesceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        match self.register(&key) {
            Role::Waiter {
                generation,
                mut result,
            } => {
                counter!("turnstile_coalesced_waiters_total").increment(1);
                let _guard = WaiterGuard {
                    coalescer: self,
                    key: &key,
                    generation,
                };
                // A closed channel means the publisher vanished without a value.
                let slot = result
                    .wait_for(Option::is_some)
                    .await
                    .ok()
                    .and_then(|slot| (*slot).clone());
                slot.unwrap_or(Err(CoalesceError::LeaderCancelled))
            },
            Role::Leader {
                generation,
                publisher,
            } => {
                let mut guard = LeaderGuard {
                    coalescer: self,
                    key: &key,
                    generation,
                    publisher: Some(publisher),
                };

                let outcome = AssertUnwindSafe(async { fetch().await })
                    .catch_unwind()
                    .await
                    .map_err(|payload| {
                        let message = panic_message(payload.as_ref());
                        warn!(panic = %message, "Coalesced fetch panicked");
                        CoalesceError::Panicked(message)
                    });

                guard.publish(outcome.clone());
                outcome
            },
        }
    }

    /// Number of keys with a fetch currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Number of callers waiting on the running fetch for `key`.
    pub fn waiters(&self, key: &K) -> usize {
        self.in_flight
            .lock()
            .get(key)
            .map(|entry| entry.waiters)
            .unwrap_or(0)
    }

    /// Detaches the running fetch for `key`, if any.
    ///
    /// Callers already waiting still get its result; the next caller starts
    /// a new fetch instead of joining it. Returns whether a fetch was detached.
    pub fn forget(&self, key: &K) -> bool {
        self.in_flight.lock().remove(key).is_some()
    }

    fn register(&self, key: &K) -> Role<T> {
        let mut table = self.in_flight.lock();

        if let Some(entry) = table.get_mut(key) {
            entry.waiters += 1;
            return Role::Waiter {
                generation: entry.generation,
                result: entry.result.clone(),
            };
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (publisher, result) = watch::channel(None);
        table.insert(
            key.clone(),
            InFlight {
                generation,
                result,
                waiters: 0,
            },
        );

        Role::Leader {
            generation,
            publisher,
        }
    }

    fn release(&self, key: &K, generation: u64) -> usize {
        let mut table = self.in_flight.lock();
        match table.get(key) {
            Some(entry) if entry.generation == generation => table
                .remove(key)
                .map(|entry| entry.waiters)
                .unwrap_or(0),
            _ => 0,
        }
    }

    fn leave(&self, key: &K, generation: u64) {
        let mut table = self.in_flight.lock();
        if let Some(entry) = table.get_mut(key)
            && entry.generation == generation
        {
            entry.waiters = entry.waiters.saturating_sub(1);
        }
    }
}

impl<K, T> Default for RequestCoalescer<K, T>
where
    K: Eq + Hash + Clone + Send + Sync,
    T: Clone + Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Releases the leader's key exactly once, even if the leader is dropped.
struct LeaderGuard<'a, K, T>
where
    K: Eq + Hash + Clone + Send + Sync,
    T: Clone + Send + Sync,
{
    coalescer: &'a RequestCoalescer<K, T>,
    key: &'a K,
    generation: u64,
    publisher: Option<watch::Sender<Slot<T>>>,
}

impl<K, T> LeaderGuard<'_, K, T>
where
    K: Eq + Hash + Clone + Send + Sync,
    T: Clone + Send + Sync,
{
    fn publish(&mut self, outcome: Result<T, CoalesceError>) {
        if let Some(publisher) = self.publisher.take() {
            // Release first so a caller arriving after completion starts a new fetch.
            let waiters = self.coalescer.release(self.key, self.generation);
            publisher.send_replace(Some(outcome));
            if waiters > 0 {
                debug!(waiters, "Coalesced result delivered");
            }
        }
    }
}

impl<K, T> Drop for LeaderGuard<'_, K, T>
where
    K: Eq + Hash + Clone + Send + Sync,
    T: Clone + Send + Sync,
{
    fn drop(&mut self) {
        if self.publisher.is_some() {
            warn!("Coalesced fetch dropped before completing");
            self.publish(Err(CoalesceError::LeaderCancelled));
        }
    }
}

/// Takes a waiter off its fetch's count when it finishes or is dropped.
struct WaiterGuard<'a, K, T>
where
    K: Eq + Hash + Clone + Send + Sync,
    T: Clone + Send + Sync,
{
    coalescer: &'a RequestCoalescer<K, T>,
    key: &'a K,
    generation: u64,
}

impl<K, T> Drop for WaiterGuard<'_, K, T>
where
    K: Eq + Hash + Clone + Send + Sync,
    T: Clone + Send + Sync,
{
    fn drop(&mut self) {
        self.coalescer.leave(self.key, self.generation);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;
    use tokio::sync::Notify;

    async fn wait_for_waiters<T>(
        coalescer: &RequestCoalescer<&'static str, T>,
        key: &'static str,
        n: usize,
    ) where
        T: Clone + Send + Sync,
    {
        while coalescer.waiters(&key) < n {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    #[tokio::test]
    async fn test_single_call_runs_fetch() {
        let coalescer: RequestCoalescer<&str, u32> = RequestCoalescer::new();
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let value = coalescer
            .execute("k", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                7
            })
            .await;

        assert_eq!(value, Ok(7));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(coalescer.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_fetch() {
        let coalescer: Arc<RequestCoalescer<&'static str, u32>> =
            Arc::new(RequestCoalescer::new());
        let calls = Arc::new(AtomicU32::new(0));
        let release = Arc::new(Notify::new());

        let mut handles = Vec::new();
        for _ in 0..50 {
            let coalescer = Arc::clone(&coalescer);
            let calls = Arc::clone(&calls);
            let release = Arc::clone(&release);
            handles.push(tokio::spawn(async move {
                coalescer
                    .execute("k", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        release.notified().await;
                        99
                    })
                    .await
            }));
        }

        wait_for_waiters(&coalescer, "k", 49).await;
        release.notify_one();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(99));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(coalescer.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_sequential_calls_fetch_again() {
        let coalescer: RequestCoalescer<&str, Result<u32, String>> = RequestCoalescer::new();
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let first = coalescer
            .execute("k", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("boom".to_string())
            })
            .await;
        assert_eq!(first, Ok(Err("boom".to_string())));

        let second = coalescer
            .execute("k", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(5)
            })
            .await;

        assert_eq!(second, Ok(Ok(5)));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_panic_reaches_every_waiter() {
        let coalescer: Arc<RequestCoalescer<&'static str, u32>> =
            Arc::new(RequestCoalescer::new());
        let release = Arc::new(Notify::new());

        let leader = {
            let coalescer = Arc::clone(&coalescer);
            let release = Arc::clone(&release);
            tokio::spawn(async move {
                coalescer
                    .execute("k", || async move {
                        release.notified().await;
                        panic!("store exploded");
                    })
                    .await
            })
        };

        while coalescer.in_flight() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let waiter = {
            let coalescer = Arc::clone(&coalescer);
            tokio::spawn(async move { coalescer.execute("k", || async { 1 }).await })
        };

        wait_for_waiters(&coalescer, "k", 1).await;
        release.notify_one();

        let expected = Err(CoalesceError::Panicked("store exploded".to_string()));
        assert_eq!(leader.await.unwrap(), expected);
        assert_eq!(waiter.await.unwrap(), expected);
        assert_eq!(coalescer.in_flight(), 0);

        // The key is not stuck after the panic.
        assert_eq!(coalescer.execute("k", || async { 3 }).await, Ok(3));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancelled_leader_releases_waiters() {
        let coalescer: Arc<RequestCoalescer<&'static str, u32>> =
            Arc::new(RequestCoalescer::new());

        let leader = {
            let coalescer = Arc::clone(&coalescer);
            tokio::spawn(async move {
                coalescer
                    .execute("k", || std::future::pending::<u32>())
                    .await
            })
        };

        while coalescer.in_flight() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let waiter = {
            let coalescer = Arc::clone(&coalescer);
            tokio::spawn(async move { coalescer.execute("k", || async { 1 }).await })
        };

        wait_for_waiters(&coalescer, "k", 1).await;
        leader.abort();

        assert_eq!(waiter.await.unwrap(), Err(CoalesceError::LeaderCancelled));
        assert_eq!(coalescer.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_timed_out_leader_releases_key() {
        let coalescer: RequestCoalescer<&str, u32> = RequestCoalescer::new();

        let timed_out = tokio::time::timeout(
            Duration::from_millis(10),
            coalescer.execute("k", || std::future::pending::<u32>()),
        )
        .await;

        assert!(timed_out.is_err());
        assert_eq!(coalescer.in_flight(), 0);
        assert_eq!(coalescer.execute("k", || async { 8 }).await, Ok(8));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_forget_starts_fresh_fetch_for_later_callers() {
        let coalescer: Arc<RequestCoalescer<&'static str, u32>> =
            Arc::new(RequestCoalescer::new());
        let release = Arc::new(Notify::new());

        let old = {
            let coalescer = Arc::clone(&coalescer);
            let release = Arc::clone(&release);
            tokio::spawn(async move {
                coalescer
                    .execute("k", || async move {
                        release.notified().await;
                        1
                    })
                    .await
            })
        };

        while coalescer.in_flight() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let joined = {
            let coalescer = Arc::clone(&coalescer);
            tokio::spawn(async move { coalescer.execute("k", || async { 9 }).await })
        };
        wait_for_waiters(&coalescer, "k", 1).await;

        assert!(coalescer.forget(&"k"));
        assert!(!coalescer.forget(&"k"));

        // Runs its own fetch instead of joining the detached one.
        let fresh = tokio::time::timeout(
            Duration::from_secs(1),
            coalescer.execute("k", || async { 2 }),
        )
        .await;
        assert_eq!(fresh.unwrap(), Ok(2));

        release.notify_one();
        assert_eq!(old.await.unwrap(), Ok(1));
        assert_eq!(joined.await.unwrap(), Ok(1));
        assert_eq!(coalescer.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_forget_keeps_newer_fetch_registered() {
        let coalescer: Arc<RequestCoalescer<&'static str, u32>> =
            Arc::new(RequestCoalescer::new());
        let release_old = Arc::new(Notify::new());
        let release_new = Arc::new(Notify::new());

        let spawn_leader = |release: Arc<Notify>, value: u32| {
            let coalescer = Arc::clone(&coalescer);
            tokio::spawn(async move {
                coalescer
                    .execute("k", || async move {
                        release.notified().await;
                        value
                    })
                    .await
            })
        };

        let old = spawn_leader(Arc::clone(&release_old), 1);
        while coalescer.in_flight() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        coalescer.forget(&"k");

        let new = spawn_leader(Arc::clone(&release_new), 2);
        while coalescer.in_flight() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        // The old leader finishing must not unregister the new one.
        release_old.notify_one();
        assert_eq!(old.await.unwrap(), Ok(1));
        assert_eq!(coalescer.in_flight(), 1);

        release_new.notify_one();
        assert_eq!(new.await.unwrap(), Ok(2));
        assert_eq!(coalescer.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dropped_waiter_leaves_count() {
        let coalescer: Arc<RequestCoalescer<&'static str, u32>> =
            Arc::new(RequestCoalescer::new());
        let release = Arc::new(Notify::new());

        let leader = {
            let coalescer = Arc::clone(&coalescer);
            let release = Arc::clone(&release);
            tokio::spawn(async move {
                coalescer
                    .execute("k", || async move {
                        release.notified().await;
                        4
                    })
                    .await
            })
        };

        while coalescer.in_flight() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let coalescer = Arc::clone(&coalescer);
                tokio::spawn(async move { coalescer.execute("k", || async { 0 }).await })
            })
            .collect();
        wait_for_waiters(&coalescer, "k", 3).await;

        waiters[0].abort();
        while coalescer.waiters(&"k") != 2 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        release.notify_one();
        assert_eq!(leader.await.unwrap(), Ok(4));
        for handle in waiters.into_iter().skip(1) {
            assert_eq!(handle.await.unwrap(), Ok(4));
        }
        assert_eq!(coalescer.waiters(&"k"), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_distinct_keys_do_not_block_each_other() {
        let coalescer: Arc<RequestCoalescer<&'static str, u32>> =
            Arc::new(RequestCoalescer::new());
        let release = Arc::new(Notify::new());

        let slow = {
            let coalescer = Arc::clone(&coalescer);
            let release = Arc::clone(&release);
            tokio::spawn(async move {
                coalescer
                    .execute("slow", || async move {
                        release.notified().await;
                        1
                    })
                    .await
            })
        };

        while coalescer.in_flight() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        // Completes while "slow" is still running.
        let fast = tokio::time::timeout(
            Duration::from_secs(1),
            coalescer.execute("fast", || async { 2 }),
        )
        .await;
        assert_eq!(fast.unwrap(), Ok(2));
        assert_eq!(coalescer.in_flight(), 1);

        release.notify_one();
        assert_eq!(slow.await.unwrap(), Ok(1));
    }
}
