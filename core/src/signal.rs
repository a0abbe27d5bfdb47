//! Process-level shutdown signal: OS signals (SIGTERM/SIGINT) or an explicit
//! admin-triggered shutdown both resolve the same future.

use tokio::sync::watch;

#[derive(Clone)]
pub struct Shutdown {
	tx: watch::Sender<bool>,
}

impl Shutdown {
	pub fn new() -> Self {
		let (tx, _rx) = watch::channel(false);
		let s = Self { tx };
		s.spawn_signal_listener();
		s
	}

	fn spawn_signal_listener(&self) {
		let tx = self.tx.clone();
		tokio::spawn(async move {
			let mut term = match signal_stream() {
				Ok(t) => t,
				Err(e) => {
					tracing::warn!("failed to install signal handler: {e}");
					return;
				},
			};
			term.recv().await;
			tracing::info!("received shutdown signal");
			let _ = tx.send(true);
		});
	}

	/// A handle that can be used to trigger shutdown programmatically (e.g. from an admin API).
	pub fn trigger(&self) -> ShutdownTrigger {
		ShutdownTrigger {
			tx: self.tx.clone(),
		}
	}

	/// Resolves once a shutdown has been requested, by signal or trigger.
	pub async fn wait(&self) {
		let mut rx = self.tx.subscribe();
		if *rx.borrow() {
			return;
		}
		// watch::Receiver::changed never returns Err while a Sender is alive, and we hold one.
		let _ = rx.changed().await;
	}
}

impl Default for Shutdown {
	fn default() -> Self {
		Self::new()
	}
}

#[derive(Clone)]
pub struct ShutdownTrigger {
	tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
	pub fn shutdown_now(&self) {
		let _ = self.tx.send(true);
	}
}

#[cfg(unix)]
fn signal_stream() -> std::io::Result<UnixTermSignal> {
	use tokio::signal::unix::{SignalKind, signal};
	Ok(UnixTermSignal {
		term: signal(SignalKind::terminate())?,
		int: signal(SignalKind::interrupt())?,
	})
}

#[cfg(unix)]
struct UnixTermSignal {
	term: tokio::signal::unix::Signal,
	int: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl UnixTermSignal {
	async fn recv(&mut self) {
		tokio::select! {
			_ = self.term.recv() => {},
			_ = self.int.recv() => {},
		}
	}
}

#[cfg(not(unix))]
fn signal_stream() -> std::io::Result<WindowsTermSignal> {
	Ok(WindowsTermSignal)
}

#[cfg(not(unix))]
struct WindowsTermSignal;

#[cfg(not(unix))]
impl WindowsTermSignal {
	async fn recv(&mut self) {
		let _ = tokio::signal::ctrl_c().await;
	}
}
