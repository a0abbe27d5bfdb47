//! Lexicon-based toxicity scoring. A placeholder for a real classifier:
//! ML-based moderation is out of scope, but the pipeline still needs a
//! scanner occupying this contract slot.

use std::collections::HashSet;
use std::time::Instant;

use crate::scan::{Finding, ScannerResult, Scanner, Severity};

pub struct ToxicityScanner {
	lexicon: HashSet<&'static str>,
}

impl ToxicityScanner {
	pub fn new() -> Self {
		ToxicityScanner {
			lexicon: ["idiot", "stupid", "hate you", "kill yourself"].into_iter().collect(),
		}
	}
}

impl Default for ToxicityScanner {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait::async_trait]
impl Scanner for ToxicityScanner {
	fn id(&self) -> &str {
		"toxicity"
	}

	async fn scan(&self, text: &str) -> anyhow::Result<ScannerResult> {
		let start = Instant::now();
		let lower = text.to_lowercase();
		let mut findings = Vec::new();
		for term in &self.lexicon {
			if let Some(start) = lower.find(term) {
				let severity = if *term == "kill yourself" { Severity::Critical } else { Severity::Medium };
				findings.push(
					Finding::new("toxicity", severity, format!("matched term '{term}'"), 0.6).with_span(start, start + term.len()),
				);
			}
		}
		let score = findings.iter().map(|_| 60u8).max().unwrap_or(0);
		Ok(ScannerResult::from_findings(self.id(), findings, score, start.elapsed()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn flags_lexicon_hit() {
		let scanner = ToxicityScanner::new();
		let result = scanner.scan("you are such an idiot").await.unwrap();
		assert_eq!(result.threat_level, Severity::Medium);
	}

	#[tokio::test]
	async fn clean_text_passes() {
		let scanner = ToxicityScanner::new();
		let result = scanner.scan("have a wonderful day").await.unwrap();
		assert!(result.passed);
	}
}
