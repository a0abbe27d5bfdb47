//! Response Cache: fingerprint-keyed, bounded by both byte size and entry
//! count, strict LRU eviction, TTL expiry. Never a source of pipeline
//! failure — `get` misses and `set` no-ops on internal trouble rather than
//! propagating an error.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use sha2::{Digest, Sha256};

use crate::http::{HeaderMap, StatusCode};
use crate::model::{GenerationParams, Message, Provider};
use crate::strng::Strng;

/// Stable digest over `{provider, model, messages, parameters}`. Metadata is
/// deliberately excluded so two requests differing only in user/tenant/time
/// share a cache entry.
pub fn fingerprint(provider: Provider, model: &str, messages: &[Message], params: &GenerationParams) -> Strng {
	let mut hasher = Sha256::new();
	hasher.update(provider.as_str().as_bytes());
	hasher.update(b"\0");
	hasher.update(model.as_bytes());
	hasher.update(b"\0");
	for m in messages {
		hasher.update(format!("{:?}", m.role).as_bytes());
		for part in &m.content {
			if let Some(text) = part.scannable_text() {
				hasher.update(text.as_bytes());
			}
		}
	}
	hasher.update(format!("{params:?}").as_bytes());
	Strng::new(hex::encode(hasher.finalize()))
}

#[derive(Clone)]
pub struct CacheEntry {
	pub status: StatusCode,
	pub headers: HeaderMap,
	pub body: bytes::Bytes,
	pub created_at: Instant,
	pub last_access: Instant,
	pub size: usize,
}

impl CacheEntry {
	pub fn new(status: StatusCode, headers: HeaderMap, body: bytes::Bytes) -> Self {
		let size = body.len();
		let now = Instant::now();
		CacheEntry {
			status,
			headers,
			body,
			created_at: now,
			last_access: now,
			size,
		}
	}
}

pub struct ResponseCache {
	inner: Mutex<IndexMap<Strng, CacheEntry>>,
	max_bytes: usize,
	max_entries: usize,
	ttl: Duration,
}

impl ResponseCache {
	pub fn new(max_bytes: usize, max_entries: usize, ttl: Duration) -> Self {
		ResponseCache {
			inner: Mutex::new(IndexMap::new()),
			max_bytes,
			max_entries,
			ttl,
		}
	}

	/// Entries past their TTL are treated as absent, and are lazily dropped
	/// the next time they're looked up.
	pub fn get(&self, key: &Strng) -> Option<CacheEntry> {
		let mut guard = self.inner.lock().ok()?;
		let entry = guard.get(key)?;
		if entry.created_at.elapsed() > self.ttl {
			guard.shift_remove(key);
			return None;
		}
		// touch for LRU: move to the back (most-recently-used)
		let mut entry = guard.shift_remove(key)?;
		entry.last_access = Instant::now();
		let out = entry.clone();
		guard.insert(key.clone(), entry);
		Some(out)
	}

	pub fn set(&self, key: Strng, entry: CacheEntry) {
		let Ok(mut guard) = self.inner.lock() else { return };
		guard.insert(key, entry);
		self.evict_if_needed(&mut guard);
	}

	fn evict_if_needed(&self, guard: &mut IndexMap<Strng, CacheEntry>) {
		while guard.len() > self.max_entries || total_size(guard) > self.max_bytes {
			// IndexMap preserves insertion order; shift_remove_index(0) evicts
			// the least-recently-used entry since get()/set() re-insert at the
			// back on touch.
			if guard.shift_remove_index(0).is_none() {
				break;
			}
		}
	}

	pub fn len(&self) -> usize {
		self.inner.lock().map(|g| g.len()).unwrap_or(0)
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

fn total_size(map: &IndexMap<Strng, CacheEntry>) -> usize {
	map.values().map(|e| e.size).sum()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn entry(body: &str) -> CacheEntry {
		CacheEntry::new(StatusCode::OK, HeaderMap::new(), bytes::Bytes::from(body.to_string()))
	}

	#[test]
	fn get_after_set_hits() {
		let cache = ResponseCache::new(1_000_000, 10, Duration::from_secs(60));
		cache.set(Strng::from("a"), entry("hello"));
		assert!(cache.get(&Strng::from("a")).is_some());
	}

	#[test]
	fn entry_count_eviction_is_lru() {
		let cache = ResponseCache::new(1_000_000, 2, Duration::from_secs(60));
		cache.set(Strng::from("a"), entry("1"));
		cache.set(Strng::from("b"), entry("2"));
		// touch "a" so "b" becomes the least-recently-used
		cache.get(&Strng::from("a"));
		cache.set(Strng::from("c"), entry("3"));
		assert!(cache.get(&Strng::from("b")).is_none());
		assert!(cache.get(&Strng::from("a")).is_some());
		assert!(cache.get(&Strng::from("c")).is_some());
	}

	#[test]
	fn expired_entry_is_treated_as_absent() {
		let cache = ResponseCache::new(1_000_000, 10, Duration::from_millis(1));
		cache.set(Strng::from("a"), entry("hello"));
		std::thread::sleep(Duration::from_millis(10));
		assert!(cache.get(&Strng::from("a")).is_none());
	}

	#[test]
	fn fingerprint_ignores_metadata_changes() {
		let messages = vec![Message::text(crate::model::Role::User, "hi")];
		let params = GenerationParams::default();
		let a = fingerprint(Provider::OpenAi, "gpt-4", &messages, &params);
		let b = fingerprint(Provider::OpenAi, "gpt-4", &messages, &params);
		assert_eq!(a, b);
	}
}
