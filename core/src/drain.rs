//! Graceful drain: components that want time to finish in-flight work hold a
//! [`DrainWatcher`] clone and `await` [`DrainWatcher::signaled`]; the drain
//! completes once every clone has been dropped (or a hard timeout elapses).

use std::time::Duration;

use tokio::sync::watch;

const HARD_TIMEOUT: Duration = Duration::from_secs(30);

pub fn new() -> (DrainTrigger, DrainWatcher) {
	let (closed_tx, closed_rx) = watch::channel(());
	let (draining_tx, draining_rx) = watch::channel(false);
	(
		DrainTrigger {
			draining_tx,
			closed_rx,
		},
		DrainWatcher {
			draining_rx,
			_closed_tx: Arc::new(closed_tx),
		},
	)
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DrainMode {
	/// Wait for in-flight work to finish, up to the hard timeout.
	Graceful,
	/// Return as soon as the signal has been observed by all watchers.
	Immediate,
}

pub struct DrainTrigger {
	draining_tx: watch::Sender<bool>,
	closed_rx: watch::Receiver<()>,
}

impl DrainTrigger {
	/// Signal all [`DrainWatcher`] holders and wait for them to drop their clone
	/// (or the hard timeout, whichever comes first).
	pub async fn start_drain_and_wait(mut self, mode: DrainMode) {
		let _ = self.draining_tx.send(true);
		if mode == DrainMode::Immediate {
			return;
		}
		// closed_rx.changed() resolves with Err once every DrainWatcher (and the
		// Arc<Sender> each one holds) has been dropped; that is our "all done" signal.
		let wait_for_all_dropped = async {
			loop {
				if self.closed_rx.changed().await.is_err() {
					return;
				}
			}
		};
		if tokio::time::timeout(HARD_TIMEOUT, wait_for_all_dropped)
			.await
			.is_err()
		{
			tracing::warn!("drain did not complete within {HARD_TIMEOUT:?}, forcing shutdown");
		}
	}
}

#[derive(Clone)]
pub struct DrainWatcher {
	draining_rx: watch::Receiver<bool>,
	_closed_tx: Arc<watch::Sender<()>>,
}

impl DrainWatcher {
	/// Resolves once a drain has been requested. Callers should then wind down
	/// and drop this handle.
	pub async fn signaled(&mut self) {
		if *self.draining_rx.borrow() {
			return;
		}
		let _ = self.draining_rx.changed().await;
	}
}

use std::sync::Arc;
