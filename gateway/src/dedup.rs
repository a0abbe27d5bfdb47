//! Request Deduplicator: at most one in-flight upstream call per
//! fingerprint; concurrent callers for the same fingerprint share the first
//! caller's result.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;

use crate::strng::Strng;

#[derive(Debug, Clone)]
pub enum DedupError {
	Timeout,
	/// The in-flight producer failed; the message is the stringified error
	/// so it can be cloned and fanned out to every waiter identically.
	ProducerFailed(String),
}

struct InFlight<T> {
	tx: broadcast::Sender<Result<T, String>>,
}

pub struct Deduplicator<T: Clone + Send + 'static> {
	in_flight: Mutex<HashMap<Strng, InFlight<T>>>,
	dedup_timeout: Duration,
}

impl<T: Clone + Send + 'static> Deduplicator<T> {
	pub fn new(dedup_timeout: Duration) -> Self {
		Deduplicator {
			in_flight: Mutex::new(HashMap::new()),
			dedup_timeout,
		}
	}

	/// Runs `producer` for `fingerprint` if nothing is already in flight for
	/// it; otherwise awaits the result of the call already underway. Every
	/// waiter observes the same `Ok`/`Err` outcome.
	pub async fn execute<F, Fut>(&self, fingerprint: Strng, producer: F) -> Result<T, DedupError>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T, anyhow::Error>>,
	{
		enum Role<T: Clone> {
			Leader(broadcast::Sender<Result<T, String>>),
			Follower(broadcast::Receiver<Result<T, String>>),
		}

		let role = {
			let mut guard = self.in_flight.lock().expect("dedup mutex poisoned");
			if let Some(existing) = guard.get(&fingerprint) {
				Role::Follower(existing.tx.subscribe())
			} else {
				let (tx, _rx) = broadcast::channel(1);
				guard.insert(fingerprint.clone(), InFlight { tx: tx.clone() });
				Role::Leader(tx)
			}
		};

		match role {
			Role::Leader(tx) => {
				let result = producer().await;
				let broadcastable = result.as_ref().map(|v| v.clone()).map_err(|e| e.to_string());
				// Remove before broadcasting so a new request for the same
				// fingerprint that arrives right after completion starts a
				// fresh producer rather than joining this exhausted one.
				self.in_flight.lock().expect("dedup mutex poisoned").remove(&fingerprint);
				let _ = tx.send(broadcastable);
				result.map_err(|e| DedupError::ProducerFailed(e.to_string()))
			},
			Role::Follower(mut rx) => match tokio::time::timeout(self.dedup_timeout, rx.recv()).await {
				Ok(Ok(Ok(value))) => Ok(value),
				Ok(Ok(Err(msg))) => Err(DedupError::ProducerFailed(msg)),
				Ok(Err(_recv_err)) => Err(DedupError::Timeout),
				Err(_elapsed) => Err(DedupError::Timeout),
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use super::*;

	#[tokio::test]
	async fn concurrent_callers_share_one_producer_invocation() {
		let dedup = Arc::new(Deduplicator::<u32>::new(Duration::from_secs(5)));
		let calls = Arc::new(AtomicUsize::new(0));

		let mut handles = Vec::new();
		for _ in 0..10 {
			let dedup = dedup.clone();
			let calls = calls.clone();
			handles.push(tokio::spawn(async move {
				dedup
					.execute(Strng::from("fp"), || async move {
						calls.fetch_add(1, Ordering::SeqCst);
						tokio::time::sleep(Duration::from_millis(20)).await;
						Ok(42u32)
					})
					.await
			}));
		}
		for h in handles {
			assert_eq!(h.await.unwrap().unwrap(), 42);
		}
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn producer_error_is_shared_by_all_waiters() {
		let dedup = Arc::new(Deduplicator::<u32>::new(Duration::from_secs(5)));
		let mut handles = Vec::new();
		for _ in 0..3 {
			let dedup = dedup.clone();
			handles.push(tokio::spawn(async move {
				dedup
					.execute(Strng::from("fp"), || async move {
						tokio::time::sleep(Duration::from_millis(10)).await;
						Err(anyhow::anyhow!("upstream exploded"))
					})
					.await
			}));
		}
		for h in handles {
			assert!(matches!(h.await.unwrap(), Err(DedupError::ProducerFailed(_))));
		}
	}

	#[tokio::test]
	async fn sequential_calls_after_completion_run_producer_again() {
		let dedup = Deduplicator::<u32>::new(Duration::from_secs(5));
		let calls = AtomicUsize::new(0);
		for _ in 0..2 {
			dedup
				.execute(Strng::from("fp"), || async {
					calls.fetch_add(1, Ordering::SeqCst);
					Ok(1u32)
				})
				.await
				.unwrap();
		}
		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}
}
