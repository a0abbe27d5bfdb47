//! Process configuration: parsed once at startup from inline YAML or a file,
//! with environment overrides for the handful of settings operators most
//! commonly need to flip without editing the file (bind address, log level
//! is handled by `llmwarden_core::telemetry` directly via `RUST_LOG`).

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::breaker::BreakerConfig;
use crate::client::ClientConfig;
use crate::policy::Policy;
use crate::pool::PoolConfig;
use crate::stream::StreamConfig;

fn default_listen_addr() -> SocketAddr {
	"0.0.0.0:8080".parse().unwrap()
}

fn default_admin_addr() -> SocketAddr {
	"127.0.0.1:8081".parse().unwrap()
}

fn default_metrics_addr() -> SocketAddr {
	"127.0.0.1:8082".parse().unwrap()
}

fn default_cache_max_bytes() -> usize {
	256 * 1024 * 1024
}

fn default_cache_max_entries() -> usize {
	10_000
}

fn default_cache_ttl_secs() -> u64 {
	300
}

fn default_dedup_timeout_secs() -> u64 {
	30
}

fn default_scan_timeout_millis() -> u64 {
	2_000
}

fn default_request_timeout_secs() -> u64 {
	30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
	pub policies: Vec<Policy>,
}

impl Default for PolicyConfig {
	fn default() -> Self {
		PolicyConfig { policies: Vec::new() }
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
	pub max_bytes: usize,
	pub max_entries: usize,
	pub ttl_secs: u64,
}

impl Default for CacheSettings {
	fn default() -> Self {
		CacheSettings {
			max_bytes: default_cache_max_bytes(),
			max_entries: default_cache_max_entries(),
			ttl_secs: default_cache_ttl_secs(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
	pub max_connections_per_host: usize,
	pub max_idle_time_secs: u64,
	pub acquire_timeout_secs: u64,
}

impl Default for PoolSettings {
	fn default() -> Self {
		let d = PoolConfig::default();
		PoolSettings {
			max_connections_per_host: d.max_connections_per_host,
			max_idle_time_secs: d.max_idle_time.as_secs(),
			acquire_timeout_secs: d.acquire_timeout.as_secs(),
		}
	}
}

impl PoolSettings {
	pub fn to_pool_config(&self) -> PoolConfig {
		PoolConfig {
			max_connections_per_host: self.max_connections_per_host,
			max_idle_time: Duration::from_secs(self.max_idle_time_secs),
			acquire_timeout: Duration::from_secs(self.acquire_timeout_secs),
			..PoolConfig::default()
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
	pub failure_threshold: u32,
	pub success_threshold: u32,
	pub open_duration_secs: u64,
	pub max_breakers: usize,
	pub breaker_idle_timeout_secs: u64,
}

impl Default for BreakerSettings {
	fn default() -> Self {
		let d = BreakerConfig::default();
		BreakerSettings {
			failure_threshold: d.failure_threshold,
			success_threshold: d.success_threshold,
			open_duration_secs: d.open_duration.as_secs(),
			max_breakers: d.max_breakers,
			breaker_idle_timeout_secs: d.breaker_idle_timeout.as_secs(),
		}
	}
}

impl BreakerSettings {
	pub fn to_breaker_config(&self) -> BreakerConfig {
		BreakerConfig {
			failure_threshold: self.failure_threshold,
			success_threshold: self.success_threshold,
			open_duration: Duration::from_secs(self.open_duration_secs),
			max_breakers: self.max_breakers,
			breaker_idle_timeout: Duration::from_secs(self.breaker_idle_timeout_secs),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
	#[serde(default = "default_listen_addr")]
	pub listen_addr: SocketAddr,
	#[serde(default = "default_admin_addr")]
	pub admin_addr: SocketAddr,
	#[serde(default = "default_metrics_addr")]
	pub metrics_addr: SocketAddr,
	pub policy: PolicyConfig,
	pub cache: CacheSettings,
	pub pool: PoolSettings,
	pub breaker: BreakerSettings,
	#[serde(default = "default_dedup_timeout_secs")]
	pub dedup_timeout_secs: u64,
	#[serde(default = "default_scan_timeout_millis")]
	pub scan_timeout_millis: u64,
	/// Wall-clock budget for a whole request through the pipeline driver,
	/// from parse through to the response handed back to the client.
	#[serde(default = "default_request_timeout_secs")]
	pub request_timeout_secs: u64,
	pub num_worker_threads: Option<usize>,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			listen_addr: default_listen_addr(),
			admin_addr: default_admin_addr(),
			metrics_addr: default_metrics_addr(),
			policy: PolicyConfig::default(),
			cache: CacheSettings::default(),
			pool: PoolSettings::default(),
			breaker: BreakerSettings::default(),
			dedup_timeout_secs: default_dedup_timeout_secs(),
			scan_timeout_millis: default_scan_timeout_millis(),
			request_timeout_secs: default_request_timeout_secs(),
			num_worker_threads: None,
		}
	}
}

impl Config {
	pub fn cache_ttl(&self) -> Duration {
		Duration::from_secs(self.cache.ttl_secs)
	}

	pub fn dedup_timeout(&self) -> Duration {
		Duration::from_secs(self.dedup_timeout_secs)
	}

	pub fn scan_timeout(&self) -> Duration {
		Duration::from_millis(self.scan_timeout_millis)
	}

	pub fn request_timeout(&self) -> Duration {
		Duration::from_secs(self.request_timeout_secs)
	}

	pub fn pool_config(&self) -> crate::pool::PoolConfig {
		self.pool.to_pool_config()
	}

	pub fn client_config(&self) -> ClientConfig {
		ClientConfig::default()
	}

	pub fn stream_config(&self) -> StreamConfig {
		StreamConfig::default()
	}
}

/// Parses YAML config text. `filename` is used only for error messages so a
/// malformed on-disk config points the operator at the right file.
pub fn parse_config(contents: &str, filename: Option<&Path>) -> anyhow::Result<Config> {
	if contents.trim().is_empty() {
		return Ok(Config::default());
	}
	let config: Config = serde_yaml::from_str(contents).map_err(|e| match filename {
		Some(path) => anyhow::anyhow!("failed to parse config at {}: {e}", path.display()),
		None => anyhow::anyhow!("failed to parse config: {e}"),
	})?;
	Ok(config)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_contents_yields_default_config() {
		let cfg = parse_config("", None).unwrap();
		assert_eq!(cfg.listen_addr, default_listen_addr());
	}

	#[test]
	fn parses_listen_addr_and_policies() {
		let yaml = r#"
listen_addr: "0.0.0.0:9000"
policy:
  policies:
    - id: block-all
      name: block everything
      priority: 0
      conditions: []
      actions: [block]
"#;
		let cfg = parse_config(yaml, None).unwrap();
		assert_eq!(cfg.listen_addr, "0.0.0.0:9000".parse().unwrap());
		assert_eq!(cfg.policy.policies.len(), 1);
	}

	#[test]
	fn malformed_yaml_is_rejected() {
		let err = parse_config("listen_addr: [not, a, socket, addr", None).unwrap_err();
		assert!(err.to_string().contains("failed to parse config"));
	}

	#[test]
	fn loads_config_from_a_file_on_disk() {
		use std::io::Write;

		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "listen_addr: \"0.0.0.0:9100\"").unwrap();
		let contents = std::fs::read_to_string(file.path()).unwrap();
		let cfg = parse_config(&contents, Some(file.path())).unwrap();
		assert_eq!(cfg.listen_addr, "0.0.0.0:9100".parse().unwrap());
	}

	#[test]
	fn malformed_file_error_names_the_path() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		use std::io::Write;
		writeln!(file, "listen_addr: [bad").unwrap();
		let contents = std::fs::read_to_string(file.path()).unwrap();
		let err = parse_config(&contents, Some(file.path())).unwrap_err();
		assert!(err.to_string().contains(&file.path().display().to_string()));
	}
}
