//! Scanner Orchestrator: runs the registered scanners concurrently over a
//! shared text projection, with a deadline and early termination on any
//! critical finding.

mod pii;
mod pii_scanner;
mod prompt_injection;
mod secrets;
mod toxicity;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tracing::warn;

use crate::scan::{Scanner, ScannerResult, Severity, Verdict};
use crate::strng::Strng;

pub use pii_scanner::PiiScanner;
pub use prompt_injection::PromptInjectionScanner;
pub use secrets::SecretsScanner;
pub use toxicity::ToxicityScanner;

pub fn default_scanners() -> Vec<Arc<dyn Scanner>> {
	vec![
		Arc::new(PiiScanner::new()),
		Arc::new(SecretsScanner::new()),
		Arc::new(PromptInjectionScanner::new()),
		Arc::new(ToxicityScanner::new()),
	]
}

pub struct Orchestrator {
	scanners: Vec<Arc<dyn Scanner>>,
	scan_timeout: Duration,
}

impl Orchestrator {
	pub fn new(scanners: Vec<Arc<dyn Scanner>>, scan_timeout: Duration) -> Self {
		Orchestrator { scanners, scan_timeout }
	}

	/// Runs every scanner against `text`, returning the aggregated verdict.
	/// Scanners that error, or are still running when the deadline or an
	/// early-terminating critical finding fires, contribute a neutral result,
	/// so `per_scanner` always has exactly one entry per registered scanner.
	pub async fn run(&self, text: Arc<str>) -> Verdict {
		let start = Instant::now();
		let mut set: JoinSet<ScannerResult> = JoinSet::new();
		let mut pending: std::collections::HashMap<tokio::task::Id, Strng> = std::collections::HashMap::with_capacity(self.scanners.len());
		for scanner in &self.scanners {
			let scanner = scanner.clone();
			let text = text.clone();
			let id: Strng = Strng::from(scanner.id());
			let pending_id = id.clone();
			let abort_handle = set.spawn(async move {
				match scanner.scan(&text).await {
					Ok(result) => result,
					Err(err) => {
						warn!(scanner = %id, error = %err, "scanner failed, contributing neutral result");
						ScannerResult::neutral(id)
					},
				}
			});
			pending.insert(abort_handle.id(), pending_id);
		}

		let mut results = Vec::with_capacity(self.scanners.len());
		let deadline = tokio::time::sleep(self.scan_timeout);
		tokio::pin!(deadline);
		loop {
			if set.is_empty() {
				break;
			}
			tokio::select! {
				biased;
				joined = set.join_next_with_id() => {
					match joined {
						Some(Ok((task_id, result))) => {
							pending.remove(&task_id);
							let critical = result.threat_level.is_critical();
							results.push(result);
							if critical {
								// Early termination: correctness is identical to the
								// full run since a critical finding alone already
								// forces overall_threat_level = Critical. Whatever is
								// still in `pending` becomes a neutral result below.
								set.abort_all();
								break;
							}
						},
						Some(Err(join_err)) => {
							let id = pending.remove(&join_err.id()).unwrap_or_else(|| Strng::from("unknown"));
							warn!(scanner = %id, error = %join_err, "scanner task panicked, contributing neutral result");
							results.push(ScannerResult::neutral(id));
						},
						None => break,
					}
				},
				_ = &mut deadline => {
					warn!(pending = pending.len(), "scanner deadline elapsed, cancelling remaining scanners");
					set.abort_all();
					break;
				},
			}
		}
		// Anything still in `pending` was aborted (deadline or early
		// termination) before it reported; it contributes a neutral result
		// rather than silently vanishing from the verdict.
		for (_, id) in pending.drain() {
			results.push(ScannerResult::neutral(id));
		}
		// drain whatever abort_all left behind so the JoinSet doesn't leak
		while set.join_next().await.is_some() {}

		Verdict::from_results(results, start.elapsed())
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use async_trait::async_trait;

	use super::*;
	use crate::scan::{Finding, Scanner};

	struct SlowScanner(Duration);

	#[async_trait]
	impl Scanner for SlowScanner {
		fn id(&self) -> &str {
			"slow"
		}
		async fn scan(&self, _text: &str) -> anyhow::Result<ScannerResult> {
			tokio::time::sleep(self.0).await;
			Ok(ScannerResult::from_findings(self.id(), vec![], 0, Duration::ZERO))
		}
	}

	struct CriticalScanner;

	#[async_trait]
	impl Scanner for CriticalScanner {
		fn id(&self) -> &str {
			"critical"
		}
		async fn scan(&self, _text: &str) -> anyhow::Result<ScannerResult> {
			let findings = vec![Finding::new("x", Severity::Critical, "boom", 1.0)];
			Ok(ScannerResult::from_findings(self.id(), findings, 100, Duration::ZERO))
		}
	}

	struct FailingScanner;

	#[async_trait]
	impl Scanner for FailingScanner {
		fn id(&self) -> &str {
			"failing"
		}
		async fn scan(&self, _text: &str) -> anyhow::Result<ScannerResult> {
			anyhow::bail!("boom")
		}
	}

	#[tokio::test]
	async fn deadline_elapses_and_cancels_slow_scanner() {
		let orchestrator = Orchestrator::new(
			vec![Arc::new(SlowScanner(Duration::from_secs(5)))],
			Duration::from_millis(20),
		);
		let verdict = orchestrator.run(Arc::from("hello")).await;
		assert_eq!(verdict.overall_threat_level, Severity::None);
		assert_eq!(verdict.per_scanner.len(), 1);
	}

	#[tokio::test]
	async fn critical_finding_terminates_early() {
		let orchestrator = Orchestrator::new(
			vec![Arc::new(CriticalScanner), Arc::new(SlowScanner(Duration::from_secs(5)))],
			Duration::from_secs(10),
		);
		let start = Instant::now();
		let verdict = orchestrator.run(Arc::from("hello")).await;
		assert_eq!(verdict.overall_threat_level, Severity::Critical);
		assert!(start.elapsed() < Duration::from_secs(1));
	}

	#[tokio::test]
	async fn failing_scanner_contributes_neutral_result() {
		let orchestrator = Orchestrator::new(vec![Arc::new(FailingScanner)], Duration::from_secs(1));
		let verdict = orchestrator.run(Arc::from("hello")).await;
		assert_eq!(verdict.overall_threat_level, Severity::None);
		assert!(verdict.per_scanner[0].passed);
	}
}
