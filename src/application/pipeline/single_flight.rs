//! Per-key single-flight coordination.
//!
//! At most one build runs per key at a time. A duplicate request either
//! awaits the leader's result (streaming-scheduler configuration) or is
//! rejected as busy (interactive path).

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Await the in-flight build and share its result
    Wait,
    /// Fail fast with `Busy`
    Reject,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SingleFlightError {
    #[error("a build is already in flight for this key")]
    Busy,
    #[error("the in-flight build went away without a result")]
    LeaderGone,
}

type Registry<T> = Mutex<HashMap<String, watch::Receiver<Option<T>>>>;

/// Process-wide mapping from key to in-progress handle, cleared when the
/// leader reaches a terminal state.
pub struct SingleFlight<T: Clone> {
    inflight: Arc<Registry<T>>,
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> SingleFlight<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently building (for tests and introspection)
    pub fn in_flight(&self) -> usize {
        self.inflight.lock().expect("registry lock").len()
    }

    pub async fn run<F, Fut>(
        &self,
        key: &str,
        policy: DuplicatePolicy,
        build: F,
    ) -> Result<T, SingleFlightError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        enum Decision<T> {
            Follow(watch::Receiver<Option<T>>),
            Lead(watch::Sender<Option<T>>),
        }

        let decision = {
            let mut inflight = self.inflight.lock().expect("registry lock");
            if let Some(rx) = inflight.get(key) {
                Decision::Follow(rx.clone())
            } else {
                let (tx, rx) = watch::channel(None);
                inflight.insert(key.to_string(), rx);
                Decision::Lead(tx)
            }
        };

        let tx = match decision {
            Decision::Follow(rx) => {
                return match policy {
                    DuplicatePolicy::Reject => Err(SingleFlightError::Busy),
                    DuplicatePolicy::Wait => Self::follow(rx).await,
                };
            }
            Decision::Lead(tx) => tx,
        };

        // The guard clears the key even if the build is cancelled mid-await
        let _guard = ClearOnDrop {
            registry: Arc::clone(&self.inflight),
            key: key.to_string(),
        };

        let outcome = build().await;
        let _ = tx.send(Some(outcome.clone()));
        Ok(outcome)
    }

    async fn follow(mut rx: watch::Receiver<Option<T>>) -> Result<T, SingleFlightError> {
        loop {
            if let Some(value) = rx.borrow().as_ref() {
                return Ok(value.clone());
            }
            if rx.changed().await.is_err() {
                // Sender dropped without publishing: leader was cancelled
                return match rx.borrow().as_ref() {
                    Some(value) => Ok(value.clone()),
                    None => Err(SingleFlightError::LeaderGone),
                };
            }
        }
    }
}

struct ClearOnDrop<T: Clone> {
    registry: Arc<Registry<T>>,
    key: String,
}

impl<T: Clone> Drop for ClearOnDrop<T> {
    fn drop(&mut self) {
        if let Ok(mut inflight) = self.registry.lock() {
            inflight.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_leader_runs_and_clears() {
        let flight: SingleFlight<u32> = SingleFlight::new();
        let result = flight
            .run("ACME.NS", DuplicatePolicy::Wait, || async { 7 })
            .await;
        assert_eq!(result, Ok(7));
        assert_eq!(flight.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_follower_shares_leader_result() {
        let flight = Arc::new(SingleFlight::<u32>::new());
        let builds = Arc::new(AtomicUsize::new(0));

        let lead_flight = Arc::clone(&flight);
        let lead_builds = Arc::clone(&builds);
        let leader = tokio::spawn(async move {
            lead_flight
                .run("ACME.NS", DuplicatePolicy::Wait, || async {
                    lead_builds.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    42
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        let follower = flight
            .run("ACME.NS", DuplicatePolicy::Wait, || async {
                builds.fetch_add(1, Ordering::SeqCst);
                99
            })
            .await;

        assert_eq!(leader.await.unwrap(), Ok(42));
        assert_eq!(follower, Ok(42));
        // The follower's build closure never ran
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reject_policy_returns_busy() {
        let flight = Arc::new(SingleFlight::<u32>::new());

        let lead_flight = Arc::clone(&flight);
        let leader = tokio::spawn(async move {
            lead_flight
                .run("ACME.NS", DuplicatePolicy::Wait, || async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    1
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = flight
            .run("ACME.NS", DuplicatePolicy::Reject, || async { 2 })
            .await;
        assert_eq!(second, Err(SingleFlightError::Busy));

        assert_eq!(leader.await.unwrap(), Ok(1));
    }

    #[tokio::test]
    async fn test_disjoint_keys_run_concurrently() {
        let flight = Arc::new(SingleFlight::<&'static str>::new());
        let a_flight = Arc::clone(&flight);
        let a = tokio::spawn(async move {
            a_flight
                .run("A.NS", DuplicatePolicy::Reject, || async {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    "a"
                })
                .await
        });
        tokio::time::sleep(Duration::from_millis(5)).await;
        let b = flight
            .run("B.NS", DuplicatePolicy::Reject, || async { "b" })
            .await;
        assert_eq!(b, Ok("b"));
        assert_eq!(a.await.unwrap(), Ok("a"));
    }

    #[tokio::test]
    async fn test_cancelled_leader_unblocks_followers() {
        let flight = Arc::new(SingleFlight::<u32>::new());

        let lead_flight = Arc::clone(&flight);
        let leader = tokio::spawn(async move {
            lead_flight
                .run("ACME.NS", DuplicatePolicy::Wait, || async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    1
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        let follow_flight = Arc::clone(&flight);
        let follower =
            tokio::spawn(async move {
                follow_flight
                    .run("ACME.NS", DuplicatePolicy::Wait, || async { 2 })
                    .await
            });

        tokio::time::sleep(Duration::from_millis(10)).await;
        leader.abort();
        let result = follower.await.unwrap();
        assert_eq!(result, Err(SingleFlightError::LeaderGone));
        assert_eq!(flight.in_flight(), 0);
    }
}
