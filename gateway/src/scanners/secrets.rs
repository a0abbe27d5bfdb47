//! Detects vendor API-key/token shapes leaking into prompts.

use std::time::Instant;

use regex::Regex;

use crate::scan::{Finding, ScannerResult, Scanner, Severity};

struct SecretPattern {
	name: &'static str,
	regex: Regex,
}

pub struct SecretsScanner {
	patterns: Vec<SecretPattern>,
}

impl SecretsScanner {
	pub fn new() -> Self {
		let specs: &[(&str, &str)] = &[
			("openai_api_key", r"\bsk-[A-Za-z0-9]{20,}\b"),
			("aws_access_key_id", r"\bAKIA[0-9A-Z]{16}\b"),
			("github_token", r"\bgh[pousr]_[A-Za-z0-9]{36}\b"),
			("slack_token", r"\bxox[baprs]-[A-Za-z0-9-]{10,}\b"),
			("private_key_block", r"-----BEGIN (?:RSA |EC )?PRIVATE KEY-----"),
		];
		let patterns = specs
			.iter()
			.map(|(name, pattern)| SecretPattern {
				name,
				regex: Regex::new(pattern).expect("static pattern is valid regex"),
			})
			.collect();
		SecretsScanner { patterns }
	}
}

impl Default for SecretsScanner {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait::async_trait]
impl Scanner for SecretsScanner {
	fn id(&self) -> &str {
		"secrets"
	}

	async fn scan(&self, text: &str) -> anyhow::Result<ScannerResult> {
		let start = Instant::now();
		let mut findings = Vec::new();
		for pattern in &self.patterns {
			for m in pattern.regex.find_iter(text) {
				findings.push(
					Finding::new(
						pattern.name,
						Severity::Critical,
						format!("candidate {} in request body", pattern.name),
						0.9,
					)
					.with_evidence(format!("{}...", &m.as_str()[..m.as_str().len().min(4)]))
					.with_span(m.start(), m.end()),
				);
			}
		}
		let score = if findings.is_empty() { 0 } else { 95 };
		Ok(ScannerResult::from_findings(self.id(), findings, score, start.elapsed()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn flags_openai_style_key() {
		let scanner = SecretsScanner::new();
		let result = scanner
			.scan("here is my key sk-abcdefghijklmnopqrstuvwxyz012345")
			.await
			.unwrap();
		assert_eq!(result.threat_level, Severity::Critical);
	}

	#[tokio::test]
	async fn clean_text_passes() {
		let scanner = SecretsScanner::new();
		let result = scanner.scan("nothing suspicious here").await.unwrap();
		assert!(result.passed);
	}
}
