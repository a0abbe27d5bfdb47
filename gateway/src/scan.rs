//! Shared types for content scanning: findings, per-scanner results, and the
//! aggregated verdict the policy engine consumes.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::strng::Strng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
	None,
	Low,
	Medium,
	High,
	Critical,
}

impl Severity {
	pub fn is_critical(&self) -> bool {
		matches!(self, Severity::Critical)
	}
}

impl Default for Severity {
	fn default() -> Self {
		Severity::None
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
	#[serde(rename = "type")]
	pub kind: String,
	pub severity: Severity,
	pub message: String,
	/// Masked excerpt of the triggering text, never the raw match.
	pub evidence: Option<String>,
	/// Path into the normalised request, e.g. `messages[1].content[0]`.
	pub location: Option<String>,
	pub confidence: f32,
	/// Byte range of the matched text within the string the scanner was
	/// given. Used by the Stream Pipeline to redact only the matched
	/// substring instead of discarding the whole chunk it was found in.
	pub span: Option<(usize, usize)>,
	#[serde(default)]
	pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Finding {
	pub fn new(kind: impl Into<String>, severity: Severity, message: impl Into<String>, confidence: f32) -> Self {
		Finding {
			kind: kind.into(),
			severity,
			message: message.into(),
			evidence: None,
			location: None,
			confidence,
			span: None,
			metadata: Default::default(),
		}
	}

	pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
		self.evidence = Some(evidence.into());
		self
	}

	pub fn with_location(mut self, location: impl Into<String>) -> Self {
		self.location = Some(location.into());
		self
	}

	pub fn with_span(mut self, start: usize, end: usize) -> Self {
		self.span = Some((start, end));
		self
	}
}

/// The result contributed by a single scanner for a single request.
/// Invariant: `passed <=> threat_level == Severity::None`, and `threat_level`
/// equals the maximum severity across `findings`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerResult {
	pub scanner_id: Strng,
	pub passed: bool,
	pub threat_level: Severity,
	pub score: u8,
	pub findings: Vec<Finding>,
	pub execution_time: Duration,
}

impl ScannerResult {
	/// A result built from findings: threat level and pass/fail are derived,
	/// never set independently, to keep the invariant true by construction.
	pub fn from_findings(scanner_id: impl Into<Strng>, findings: Vec<Finding>, score: u8, execution_time: Duration) -> Self {
		let threat_level = findings
			.iter()
			.map(|f| f.severity)
			.max()
			.unwrap_or(Severity::None);
		ScannerResult {
			scanner_id: scanner_id.into(),
			passed: threat_level == Severity::None,
			threat_level,
			score,
			findings,
			execution_time,
		}
	}

	/// The neutral result substituted when a scanner errors, is cancelled by
	/// the orchestrator deadline, or loses an early-termination race.
	pub fn neutral(scanner_id: impl Into<Strng>) -> Self {
		ScannerResult {
			scanner_id: scanner_id.into(),
			passed: true,
			threat_level: Severity::None,
			score: 0,
			findings: Vec::new(),
			execution_time: Duration::ZERO,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
	pub overall_threat_level: Severity,
	pub overall_score: u8,
	pub per_scanner: Vec<ScannerResult>,
	pub findings: Vec<Finding>,
	pub total_execution_time: Duration,
	pub timestamp: DateTime<Utc>,
}

impl Verdict {
	pub fn from_results(results: Vec<ScannerResult>, total_execution_time: Duration) -> Self {
		let overall_threat_level = results
			.iter()
			.map(|r| r.threat_level)
			.max()
			.unwrap_or(Severity::None);
		let overall_score = results.iter().map(|r| r.score).max().unwrap_or(0);
		let findings = results.iter().flat_map(|r| r.findings.clone()).collect();
		Verdict {
			overall_threat_level,
			overall_score,
			per_scanner: results,
			findings,
			total_execution_time,
			timestamp: Utc::now(),
		}
	}
}

/// Implemented by each content scanner. `scan` receives the memoised
/// scannable-text projection of the normalised request, not the request
/// itself, so scanners never re-derive it.
#[async_trait::async_trait]
pub trait Scanner: Send + Sync {
	fn id(&self) -> &str;
	async fn scan(&self, text: &str) -> anyhow::Result<ScannerResult>;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn result_threat_level_is_max_of_findings() {
		let findings = vec![
			Finding::new("a", Severity::Low, "low finding", 0.4),
			Finding::new("b", Severity::High, "high finding", 0.9),
		];
		let r = ScannerResult::from_findings("test", findings, 70, Duration::from_millis(5));
		assert_eq!(r.threat_level, Severity::High);
		assert!(!r.passed);
	}

	#[test]
	fn neutral_result_passes() {
		let r = ScannerResult::neutral("broken-scanner");
		assert!(r.passed);
		assert_eq!(r.threat_level, Severity::None);
	}

	#[test]
	fn verdict_overall_is_max_across_scanners() {
		let a = ScannerResult::from_findings("a", vec![], 0, Duration::ZERO);
		let b = ScannerResult::from_findings(
			"b",
			vec![Finding::new("x", Severity::Critical, "crit", 1.0)],
			100,
			Duration::ZERO,
		);
		let v = Verdict::from_results(vec![a, b], Duration::ZERO);
		assert_eq!(v.overall_threat_level, Severity::Critical);
	}
}
