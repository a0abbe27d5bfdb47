//! Connection Pool: bounded per-host idle connection reuse with a FIFO wait
//! queue, so bursts queue for a free slot instead of spawning unbounded
//! upstream connections. A background reaper retires idle connections past
//! `max_idle_time`.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{Notify, oneshot};
use tokio::time::timeout;
use tracing::debug;

use crate::strng::Strng;

pub struct PoolConfig {
	pub max_connections_per_host: usize,
	pub max_idle_time: Duration,
	pub acquire_timeout: Duration,
	pub reap_interval: Duration,
}

impl Default for PoolConfig {
	fn default() -> Self {
		PoolConfig {
			max_connections_per_host: 32,
			max_idle_time: Duration::from_secs(30),
			acquire_timeout: Duration::from_secs(10),
			reap_interval: Duration::from_secs(30),
		}
	}
}

struct IdleConn<C> {
	conn: C,
	idle_since: Instant,
}

struct HostState<C> {
	idle: VecDeque<IdleConn<C>>,
	in_use: usize,
	waiters: VecDeque<oneshot::Sender<()>>,
}

impl<C> Default for HostState<C> {
	fn default() -> Self {
		HostState {
			idle: VecDeque::new(),
			in_use: 0,
			waiters: VecDeque::new(),
		}
	}
}

/// A checked-out connection. Dropping it without calling [`Lease::release`]
/// still frees the slot (via `Drop`), but the connection itself is discarded
/// rather than returned to the idle list — callers that hit a transport
/// error on a leased connection should simply drop it.
pub struct Lease<C> {
	host: Strng,
	conn: Option<C>,
    pool: Arc<PoolInner<C>>,
}

impl<C> Lease<C> {
	pub fn get(&self) -> &C {
		self.conn.as_ref().expect("lease connection taken")
	}

	pub fn get_mut(&mut self) -> &mut C {
		self.conn.as_mut().expect("lease connection taken")
	}

	/// Returns the connection to the idle pool for reuse.
	pub fn release(mut self) {
		if let Some(conn) = self.conn.take() {
			self.pool.release(&self.host, Some(conn));
		}
	}
}

impl<C> Drop for Lease<C> {
	fn drop(&mut self) {
		if let Some(conn) = self.conn.take() {
			self.pool.release(&self.host, Some(conn));
		} else {
			self.pool.release(&self.host, None);
		}
	}
}

struct PoolInner<C> {
	hosts: Mutex<HashMap<Strng, HostState<C>>>,
	config: PoolConfig,
	notify: Notify,
}

impl<C> PoolInner<C> {
	fn release(&self, host: &Strng, conn: Option<C>) {
		let mut guard = self.hosts.lock().expect("pool mutex poisoned");
		if let Some(state) = guard.get_mut(host) {
			state.in_use = state.in_use.saturating_sub(1);
			if let Some(conn) = conn {
				state.idle.push_back(IdleConn { conn, idle_since: Instant::now() });
			}
			if let Some(waiter) = state.waiters.pop_front() {
				let _ = waiter.send(());
			}
		}
		self.notify.notify_waiters();
	}
}

pub struct ConnectionPool<C> {
	inner: Arc<PoolInner<C>>,
}

impl<C: Send + 'static> ConnectionPool<C> {
	pub fn new(config: PoolConfig) -> Self {
		ConnectionPool {
			inner: Arc::new(PoolInner {
				hosts: Mutex::new(HashMap::new()),
				config,
				notify: Notify::new(),
			}),
		}
	}

	/// Acquires a connection for `host`, reusing an idle one if available,
	/// otherwise calling `connect` once a slot under
	/// `max_connections_per_host` frees up. Waiters are served FIFO.
	pub async fn acquire<F, Fut>(&self, host: Strng, connect: F) -> anyhow::Result<Lease<C>>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = anyhow::Result<C>>,
	{
		let fut = self.acquire_inner(host.clone(), connect);
		match timeout(self.inner.config.acquire_timeout, fut).await {
			Ok(result) => result,
			Err(_) => anyhow::bail!("timed out waiting for a connection slot for host {host}"),
		}
	}

	async fn acquire_inner<F, Fut>(&self, host: Strng, connect: F) -> anyhow::Result<Lease<C>>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = anyhow::Result<C>>,
	{
		loop {
			enum Outcome<C> {
				Reused(C),
				ShouldConnect,
				Wait(oneshot::Receiver<()>),
			}

			let outcome = {
				let mut guard = self.inner.hosts.lock().expect("pool mutex poisoned");
				let state = guard.entry(host.clone()).or_default();
				if let Some(idle) = state.idle.pop_back() {
					state.in_use += 1;
					Outcome::Reused(idle.conn)
				} else if state.in_use < self.inner.config.max_connections_per_host {
					state.in_use += 1;
					Outcome::ShouldConnect
				} else {
					let (tx, rx) = oneshot::channel();
					state.waiters.push_back(tx);
					Outcome::Wait(rx)
				}
			};

			match outcome {
				Outcome::Reused(conn) => {
					return Ok(Lease { host, conn: Some(conn), pool: self.inner.clone() });
				},
				Outcome::ShouldConnect => {
					return match connect().await {
						Ok(conn) => Ok(Lease { host, conn: Some(conn), pool: self.inner.clone() }),
						Err(e) => {
							// give the slot back, no connection was produced
							self.inner.release(&host, None);
							Err(e)
						},
					};
				},
				Outcome::Wait(rx) => {
					let _ = rx.await;
					// woken up: loop back around and try again for a slot
				},
			}
		}
	}

	/// Drops idle connections that have sat unused past `max_idle_time`.
	/// Intended to run on a periodic background task.
	pub fn reap_idle(&self) {
		let mut guard = self.inner.hosts.lock().expect("pool mutex poisoned");
		let max_idle = self.inner.config.max_idle_time;
		for (host, state) in guard.iter_mut() {
			let before = state.idle.len();
			state.idle.retain(|c| c.idle_since.elapsed() < max_idle);
			let reaped = before - state.idle.len();
			if reaped > 0 {
				debug!(%host, reaped, "reaped idle connections");
			}
		}
		guard.retain(|_, state| state.in_use > 0 || !state.idle.is_empty() || !state.waiters.is_empty());
	}

	pub fn idle_count(&self, host: &Strng) -> usize {
		self.inner.hosts.lock().expect("pool mutex poisoned").get(host).map(|s| s.idle.len()).unwrap_or(0)
	}

	pub fn in_use_count(&self, host: &Strng) -> usize {
		self.inner.hosts.lock().expect("pool mutex poisoned").get(host).map(|s| s.in_use).unwrap_or(0)
	}
}
