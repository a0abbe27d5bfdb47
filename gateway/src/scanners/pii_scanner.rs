//! Adapts the regex-based PII recognizers into the `Scanner` contract.

use std::time::Instant;

use crate::scan::{Finding, ScannerResult, Scanner, Severity};
use crate::scanners::pii::recognizer::Recognizer;
use crate::scanners::pii::{self};

/// Entity types whose presence should raise a higher severity than a plain
/// "found some PII" hit. Kept here as the default; callers that need a
/// different mapping configure it through the policy layer instead.
fn severity_for(entity_type: &str) -> Severity {
	match entity_type {
		"US_SSN" | "CREDIT_CARD" => Severity::High,
		"EMAIL_ADDRESS" | "PHONE_NUMBER" => Severity::Medium,
		_ => Severity::Low,
	}
}

/// Masks all but the first and last character of a match so evidence in
/// findings/audit records never carries the raw PII value.
fn mask(s: &str) -> String {
	let chars: Vec<char> = s.chars().collect();
	if chars.len() <= 2 {
		return "*".repeat(chars.len());
	}
	let mut out = String::new();
	out.push(chars[0]);
	out.push_str(&"*".repeat(chars.len() - 2));
	out.push(chars[chars.len() - 1]);
	out
}

pub struct PiiScanner {
	recognizers: Vec<Box<dyn Recognizer + Send + Sync>>,
}

impl PiiScanner {
	pub fn new() -> Self {
		PiiScanner {
			recognizers: pii::recognizers(),
		}
	}
}

impl Default for PiiScanner {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait::async_trait]
impl Scanner for PiiScanner {
	fn id(&self) -> &str {
		"pii"
	}

	async fn scan(&self, text: &str) -> anyhow::Result<ScannerResult> {
		let start = Instant::now();
		let mut findings = Vec::new();
		for recognizer in &self.recognizers {
			for hit in recognizer.recognize(text) {
				let severity = severity_for(&hit.entity_type);
				findings.push(
					Finding::new(
						hit.entity_type.clone(),
						severity,
						format!("detected {}", hit.entity_type),
						hit.score,
					)
					.with_evidence(mask(&hit.matched))
					.with_span(hit.start, hit.end),
				);
			}
		}
		let score = findings.iter().map(|f| (f.confidence * 100.0) as u8).max().unwrap_or(0);
		Ok(ScannerResult::from_findings(self.id(), findings, score, start.elapsed()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn flags_email_as_medium() {
		let scanner = PiiScanner::new();
		let result = scanner.scan("reach me at jane@example.com").await.unwrap();
		assert!(!result.passed);
		assert_eq!(result.threat_level, Severity::Medium);
		assert_eq!(result.findings[0].evidence.as_deref(), Some("j**************m"));
	}

	#[tokio::test]
	async fn clean_text_passes() {
		let scanner = PiiScanner::new();
		let result = scanner.scan("just a normal sentence").await.unwrap();
		assert!(result.passed);
	}
}
