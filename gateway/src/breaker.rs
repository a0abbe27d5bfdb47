//! Circuit Breaker: a per-host closed/open/half-open state machine that
//! stops sending requests to a host failing consistently, and probes it
//! back open once `open_duration` elapses. The registry itself is bounded
//! (LRU over hosts) so an attacker can't grow it without bound by probing
//! with fabricated Host headers.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use tracing::info;

use crate::strng::Strng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
	Closed,
	Open,
	HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
	pub failure_threshold: u32,
	pub success_threshold: u32,
	pub open_duration: Duration,
	pub max_breakers: usize,
	pub breaker_idle_timeout: Duration,
}

impl Default for BreakerConfig {
	fn default() -> Self {
		BreakerConfig {
			failure_threshold: 5,
			success_threshold: 2,
			open_duration: Duration::from_secs(60),
			max_breakers: 1_000,
			breaker_idle_timeout: Duration::from_secs(3600),
		}
	}
}

struct Breaker {
	state: State,
	consecutive_failures: u32,
	consecutive_successes: u32,
	opened_at: Option<Instant>,
	last_used: Instant,
	/// Whether a half-open probe is currently outstanding. Only one caller
	/// may be the probe at a time; everyone else fails fast until it reports.
	probe_in_flight: bool,
}

impl Breaker {
	fn new() -> Self {
		Breaker {
			state: State::Closed,
			consecutive_failures: 0,
			consecutive_successes: 0,
			opened_at: None,
			last_used: Instant::now(),
			probe_in_flight: false,
		}
	}
}

pub struct CircuitBreakerRegistry {
	breakers: Mutex<IndexMap<Strng, Breaker>>,
	config: BreakerConfig,
}

impl CircuitBreakerRegistry {
	pub fn new(config: BreakerConfig) -> Self {
		CircuitBreakerRegistry {
			breakers: Mutex::new(IndexMap::new()),
			config,
		}
	}

	/// Whether a call to `host` should be allowed right now. A half-open
	/// breaker permits exactly one probe at a time; callers that get `true`
	/// here on a half-open breaker are the probe, and must report the
	/// outcome via [`record_success`]/[`record_failure`].
	pub fn allow(&self, host: &Strng) -> bool {
		let mut guard = self.breakers.lock().expect("breaker mutex poisoned");
		self.touch(&mut guard, host);
		let breaker = guard.get_mut(host).expect("just touched");
		match breaker.state {
			State::Closed => true,
			State::HalfOpen => {
				if breaker.probe_in_flight {
					false
				} else {
					breaker.probe_in_flight = true;
					true
				}
			},
			State::Open => {
				let elapsed = breaker.opened_at.map(|t| t.elapsed()).unwrap_or_default();
				if elapsed >= self.config.open_duration && !breaker.probe_in_flight {
					breaker.state = State::HalfOpen;
					breaker.consecutive_successes = 0;
					breaker.probe_in_flight = true;
					true
				} else {
					false
				}
			},
		}
	}

	pub fn record_success(&self, host: &Strng) {
		let mut guard = self.breakers.lock().expect("breaker mutex poisoned");
		self.touch(&mut guard, host);
		let breaker = guard.get_mut(host).expect("just touched");
		breaker.consecutive_failures = 0;
		match breaker.state {
			State::Closed => {},
			State::HalfOpen => {
				breaker.probe_in_flight = false;
				breaker.consecutive_successes += 1;
				if breaker.consecutive_successes >= self.config.success_threshold {
					breaker.state = State::Closed;
					breaker.consecutive_successes = 0;
					info!(%host, "circuit breaker closed");
				}
			},
			State::Open => {},
		}
	}

	pub fn record_failure(&self, host: &Strng) {
		let mut guard = self.breakers.lock().expect("breaker mutex poisoned");
		self.touch(&mut guard, host);
		let breaker = guard.get_mut(host).expect("just touched");
		breaker.consecutive_successes = 0;
		match breaker.state {
			State::Closed => {
				breaker.consecutive_failures += 1;
				if breaker.consecutive_failures >= self.config.failure_threshold {
					breaker.state = State::Open;
					breaker.opened_at = Some(Instant::now());
					info!(%host, "circuit breaker opened");
				}
			},
			State::HalfOpen => {
				breaker.probe_in_flight = false;
				breaker.state = State::Open;
				breaker.opened_at = Some(Instant::now());
				breaker.consecutive_failures = 0;
				info!(%host, "circuit breaker re-opened on probe failure");
			},
			State::Open => {},
		}
	}

	pub fn state(&self, host: &Strng) -> State {
		self.breakers.lock().expect("breaker mutex poisoned").get(host).map(|b| b.state).unwrap_or(State::Closed)
	}

	/// Records use and evicts the least-recently-used breaker if the
	/// registry is now over `max_breakers`. Never evicts the entry being
	/// touched even if it's brand new and the map was already at capacity.
	fn touch(&self, guard: &mut IndexMap<Strng, Breaker>, host: &Strng) {
		if let Some(b) = guard.shift_remove(host) {
			let mut b = b;
			b.last_used = Instant::now();
			guard.insert(host.clone(), b);
		} else {
			if guard.len() >= self.config.max_breakers
				&& let Some((evicted, _)) = guard.shift_remove_index(0)
			{
				info!(host = %evicted, "evicted circuit breaker to stay under max_breakers");
			}
			guard.insert(host.clone(), Breaker::new());
		}
	}

	/// Drops breakers that have been closed and unused for longer than
	/// `breaker_idle_timeout`. Intended to run on a periodic background
	/// task alongside the connection pool's idle reaper.
	pub fn sweep_idle(&self) {
		let mut guard = self.breakers.lock().expect("breaker mutex poisoned");
		let timeout = self.config.breaker_idle_timeout;
		guard.retain(|_, b| b.state != State::Closed || b.last_used.elapsed() < timeout);
	}
}

#[cfg(test)]
mod tests {
	use test_case::test_case;

	use super::*;

	#[test_case(1, 3, State::Closed; "below threshold stays closed")]
	#[test_case(3, 3, State::Open; "exactly at threshold opens")]
	#[test_case(5, 3, State::Open; "past threshold stays open")]
	fn failure_count_reaches_threshold(failures: u32, threshold: u32, expected: State) {
		let reg = CircuitBreakerRegistry::new(BreakerConfig {
			failure_threshold: threshold,
			success_threshold: 2,
			open_duration: Duration::from_secs(60),
			max_breakers: 1_000,
			breaker_idle_timeout: Duration::from_secs(3600),
		});
		let host = Strng::from("threshold.example.com");
		reg.allow(&host);
		for _ in 0..failures {
			reg.record_failure(&host);
		}
		assert_eq!(reg.state(&host), expected);
	}

	fn registry() -> CircuitBreakerRegistry {
		CircuitBreakerRegistry::new(BreakerConfig {
			failure_threshold: 3,
			success_threshold: 2,
			open_duration: Duration::from_millis(20),
			max_breakers: 1_000,
			breaker_idle_timeout: Duration::from_secs(3600),
		})
	}

	#[test]
	fn opens_after_threshold_failures() {
		let reg = registry();
		let host = Strng::from("a.example.com");
		assert!(reg.allow(&host));
		for _ in 0..3 {
			reg.record_failure(&host);
		}
		assert_eq!(reg.state(&host), State::Open);
		assert!(!reg.allow(&host));
	}

	#[tokio::test]
	async fn half_opens_after_open_duration_and_closes_on_successes() {
		let reg = registry();
		let host = Strng::from("b.example.com");
		for _ in 0..3 {
			reg.record_failure(&host);
		}
		assert_eq!(reg.state(&host), State::Open);

		tokio::time::sleep(Duration::from_millis(30)).await;
		assert!(reg.allow(&host));
		assert_eq!(reg.state(&host), State::HalfOpen);

		reg.record_success(&host);
		assert_eq!(reg.state(&host), State::HalfOpen);
		reg.record_success(&host);
		assert_eq!(reg.state(&host), State::Closed);
	}

	#[tokio::test]
	async fn probe_failure_in_half_open_reopens() {
		let reg = registry();
		let host = Strng::from("c.example.com");
		for _ in 0..3 {
			reg.record_failure(&host);
		}
		tokio::time::sleep(Duration::from_millis(30)).await;
		assert!(reg.allow(&host));
		reg.record_failure(&host);
		assert_eq!(reg.state(&host), State::Open);
	}

	#[tokio::test]
	async fn half_open_allows_only_one_concurrent_probe() {
		let reg = registry();
		let host = Strng::from("d.example.com");
		for _ in 0..3 {
			reg.record_failure(&host);
		}
		tokio::time::sleep(Duration::from_millis(30)).await;
		assert!(reg.allow(&host));
		assert_eq!(reg.state(&host), State::HalfOpen);
		// a second concurrent caller must fail fast rather than also probing
		assert!(!reg.allow(&host));
		assert!(!reg.allow(&host));

		reg.record_success(&host);
		// the probe reported in; a fresh probe can now be issued
		assert!(reg.allow(&host));
	}

	#[test]
	fn registry_is_bounded_by_max_breakers() {
		let reg = CircuitBreakerRegistry::new(BreakerConfig {
			max_breakers: 2,
			..BreakerConfig::default()
		});
		reg.allow(&Strng::from("h1"));
		reg.allow(&Strng::from("h2"));
		reg.allow(&Strng::from("h3"));
		assert_eq!(reg.breakers.lock().unwrap().len(), 2);
	}
}
