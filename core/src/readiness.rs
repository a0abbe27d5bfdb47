//! Readiness tracking: components register a named task at startup and drop
//! the returned guard once they've reached a ready state. `/health` and
//! `/status` report not-ready until every registered task has checked in.

use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct Ready {
	pending: Arc<Mutex<Vec<&'static str>>>,
}

impl Ready {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register_task(&self, name: &'static str) -> TaskGuard {
		self.pending.lock().unwrap().push(name);
		TaskGuard {
			name,
			pending: self.pending.clone(),
		}
	}

	pub fn is_ready(&self) -> bool {
		self.pending.lock().unwrap().is_empty()
	}

	pub fn pending_tasks(&self) -> Vec<&'static str> {
		self.pending.lock().unwrap().clone()
	}
}

/// Dropping this marks the task as ready.
pub struct TaskGuard {
	name: &'static str,
	pending: Arc<Mutex<Vec<&'static str>>>,
}

impl Drop for TaskGuard {
	fn drop(&mut self) {
		self.pending.lock().unwrap().retain(|n| *n != self.name);
	}
}
