//! Request-scoped audit logging. [`AsyncLog`] lets a handler stash a value
//! (the audit record) that gets filled in once the response body finishes
//! streaming, after the code that built the initial response has already
//! returned.

use std::sync::{Arc, Mutex};

use tracing::info;

use crate::pipeline::AuditRecord;

#[derive(Clone, Default)]
pub struct AsyncLog<T>(Arc<Mutex<Option<T>>>);

impl<T> AsyncLog<T> {
	pub fn new() -> Self {
		AsyncLog(Arc::new(Mutex::new(None)))
	}

	pub fn store(&self, value: T) {
		*self.0.lock().expect("async log mutex poisoned") = Some(value);
	}

	pub fn take(&self) -> Option<T> {
		self.0.lock().expect("async log mutex poisoned").take()
	}
}

/// Emits exactly one structured log line per request. Called once the
/// pipeline driver has produced its [`AuditRecord`], regardless of which
/// branch (cache hit, policy block, upstream call) the request took.
pub fn emit_audit_log(record: &AuditRecord) {
	info!(
		correlation_id = %record.correlation_id,
		host = %record.host,
		action = ?record.action,
		policy_id = record.policy_id.as_deref().unwrap_or("-"),
		cache_hit = record.cache_hit,
		threat_level = ?record.threat_level,
		latency_ms = record.latency.as_millis() as u64,
		"request handled"
	);
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn async_log_round_trips_a_value() {
		let log: AsyncLog<u32> = AsyncLog::new();
		assert!(log.take().is_none());
		log.store(42);
		assert_eq!(log.take(), Some(42));
		assert!(log.take().is_none());
	}
}
