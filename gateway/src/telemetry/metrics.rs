use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;

#[derive(Clone, Copy, Hash, Debug, PartialEq, Eq, EncodeLabelValue)]
pub enum Outcome {
	Allow,
	Block,
	Error,
}

#[derive(Clone, Hash, Default, Debug, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
	pub host: String,
	pub cache_hit: bool,
}

#[derive(Debug)]
pub struct Metrics {
	pub requests: Family<RequestLabels, Counter>,
	pub blocked: Family<RequestLabels, Counter>,
	pub scan_latency: Histogram,
}

impl Metrics {
	pub fn new(registry: &mut Registry) -> Self {
		let requests = Family::default();
		registry.register("requests", "Total proxied requests", requests.clone());
		let blocked = Family::default();
		registry.register("blocked_requests", "Requests blocked by policy", blocked.clone());
		let scan_latency = Histogram::new(prometheus_client::metrics::histogram::exponential_buckets(0.001, 2.0, 12));
		registry.register("scan_latency_seconds", "Scanner orchestrator latency", scan_latency.clone());
		Metrics { requests, blocked, scan_latency }
	}
}
