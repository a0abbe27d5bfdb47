//! Policy Engine: an ordered, hot-swappable rule set mapping
//! `{normalised request, verdict}` to an action. Default is block.

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::model::NormalisedRequest;
use crate::scan::{Severity, Verdict};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
	Eq,
	Ne,
	Gt,
	Gte,
	Lt,
	Lte,
	In,
	Contains,
	Matches,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum Condition {
	ThreatLevel { comparator: Comparator, value: Severity },
	Scanner { id: String, comparator: Comparator, value: Severity },
	User { comparator: Comparator, value: String },
	Time { comparator: Comparator, value: String },
}

impl Condition {
	fn matches(&self, req: &NormalisedRequest, verdict: &Verdict) -> bool {
		match self {
			Condition::ThreatLevel { comparator, value } => compare_severity(verdict.overall_threat_level, *comparator, *value),
			Condition::Scanner { id, comparator, value } => verdict
				.per_scanner
				.iter()
				.find(|r| r.scanner_id.as_str() == id)
				.is_some_and(|r| compare_severity(r.threat_level, *comparator, *value)),
			Condition::User { comparator, value } => {
				let user_id = req.metadata.user_id.as_deref().unwrap_or("");
				match comparator {
					Comparator::In => value.split(',').map(str::trim).any(|v| v == user_id),
					Comparator::Contains => {
						user_id.contains(value.as_str()) || req.metadata.tags.iter().any(|t| t == value)
					},
					Comparator::Matches => regex::Regex::new(value).is_ok_and(|re| re.is_match(user_id)),
					_ => compare_str(user_id, *comparator, value),
				}
			},
			Condition::Time { comparator, value } => {
				let now = req.metadata.timestamp.format("%H:%M").to_string();
				match comparator {
					Comparator::In => value.split(',').map(str::trim).any(|v| v == now),
					Comparator::Contains => {
						let weekday = req.metadata.timestamp.format("%a").to_string();
						weekday.eq_ignore_ascii_case(value)
					},
					Comparator::Matches => match value.split_once('-') {
						Some((start, end)) => now.as_str() >= start && now.as_str() <= end,
						None => false,
					},
					_ => compare_str(&now, *comparator, value),
				}
			},
		}
	}
}

/// Lexicographic string comparison; sufficient for zero-padded `HH:MM`
/// timestamps and for user ids under a scheme where ordering is meaningful.
fn compare_str(actual: &str, comparator: Comparator, expected: &str) -> bool {
	match comparator {
		Comparator::Eq => actual == expected,
		Comparator::Ne => actual != expected,
		Comparator::Gt => actual > expected,
		Comparator::Gte => actual >= expected,
		Comparator::Lt => actual < expected,
		Comparator::Lte => actual <= expected,
		Comparator::In | Comparator::Contains | Comparator::Matches => actual == expected,
	}
}

fn compare_severity(actual: Severity, comparator: Comparator, expected: Severity) -> bool {
	match comparator {
		Comparator::Eq => actual == expected,
		Comparator::Ne => actual != expected,
		Comparator::Gt => actual > expected,
		Comparator::Gte => actual >= expected,
		Comparator::Lt => actual < expected,
		Comparator::Lte => actual <= expected,
		// in/contains/matches don't have a natural reading over a single
		// severity value; treat them as equality so a misconfigured rule
		// fails closed (never silently matches everything).
		Comparator::In | Comparator::Contains | Comparator::Matches => actual == expected,
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
	Allow,
	Block,
	Modify,
	Alert,
	Log,
	Queue,
	Redirect,
}

impl Action {
	/// Precedence used when a policy lists multiple actions: the most
	/// consequential one determines the branch the pipeline driver takes.
	fn precedence(&self) -> u8 {
		match self {
			Action::Block => 6,
			Action::Queue => 5,
			Action::Modify => 4,
			Action::Redirect => 3,
			Action::Alert => 2,
			Action::Log => 1,
			Action::Allow => 0,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
	pub id: String,
	pub name: String,
	pub priority: i32,
	#[serde(default = "default_true")]
	pub enabled: bool,
	pub conditions: Vec<Condition>,
	pub actions: Vec<Action>,
}

fn default_true() -> bool {
	true
}

impl Policy {
	fn matches(&self, req: &NormalisedRequest, verdict: &Verdict) -> bool {
		self.enabled && self.conditions.iter().all(|c| c.matches(req, verdict))
	}

	/// The single dominant action for this policy, by precedence.
	fn dominant_action(&self) -> Action {
		self.actions.iter().copied().max_by_key(Action::precedence).unwrap_or(Action::Block)
	}
}

#[derive(Debug, Clone)]
pub struct Decision {
	pub action: Action,
	pub policy_id: Option<String>,
	pub policy_name: Option<String>,
}

pub struct PolicyEngine {
	policies: ArcSwap<Vec<Policy>>,
}

impl PolicyEngine {
	pub fn new(policies: Vec<Policy>) -> Self {
		PolicyEngine {
			policies: ArcSwap::from_pointee(policies),
		}
	}

	/// Atomically replaces the active rule set; in-flight evaluations keep
	/// using the snapshot they already loaded.
	pub fn reload(&self, policies: Vec<Policy>) {
		self.policies.store(Arc::new(policies));
	}

	pub fn evaluate(&self, req: &NormalisedRequest, verdict: &Verdict) -> Decision {
		let snapshot = self.policies.load();
		let mut matching: Vec<&Policy> = snapshot.iter().filter(|p| p.matches(req, verdict)).collect();
		matching.sort_by_key(|p| std::cmp::Reverse(p.priority));
		match matching.first() {
			Some(policy) => Decision {
				action: policy.dominant_action(),
				policy_id: Some(policy.id.clone()),
				policy_name: Some(policy.name.clone()),
			},
			None => Decision {
				action: Action::Block,
				policy_id: None,
				policy_name: None,
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use chrono::TimeZone;
	use test_case::test_case;

	use super::*;

	#[test_case(Comparator::Eq, Severity::High, Severity::High, true; "eq matches equal severities")]
	#[test_case(Comparator::Eq, Severity::High, Severity::Low, false; "eq rejects unequal severities")]
	#[test_case(Comparator::Gt, Severity::High, Severity::Low, true; "gt matches when actual exceeds expected")]
	#[test_case(Comparator::Gt, Severity::Low, Severity::High, false; "gt rejects when actual is below expected")]
	#[test_case(Comparator::Gte, Severity::High, Severity::High, true; "gte matches equal severities")]
	#[test_case(Comparator::Lte, Severity::Low, Severity::High, true; "lte matches when actual is below expected")]
	#[test_case(Comparator::Ne, Severity::High, Severity::Low, true; "ne matches unequal severities")]
	fn threat_level_comparator_matrix(comparator: Comparator, actual: Severity, expected: Severity, want: bool) {
		assert_eq!(compare_severity(actual, comparator, expected), want);
	}
	use crate::model::{GenerationParams, Provider};
	use crate::strng::Strng;

	fn req() -> NormalisedRequest {
		NormalisedRequest {
			provider: Provider::OpenAi,
			model: Strng::from("gpt-4"),
			messages: vec![],
			params: GenerationParams::default(),
			tools: vec![],
			metadata: crate::model::RequestMetadata::default(),
			raw_len: 0,
		}
	}

	fn verdict(level: Severity) -> Verdict {
		Verdict {
			overall_threat_level: level,
			overall_score: 0,
			per_scanner: vec![],
			findings: vec![],
			total_execution_time: Duration::ZERO,
			timestamp: chrono::Utc::now(),
		}
	}

	#[test]
	fn no_matching_policy_defaults_to_block() {
		let engine = PolicyEngine::new(vec![]);
		let decision = engine.evaluate(&req(), &verdict(Severity::None));
		assert_eq!(decision.action, Action::Block);
	}

	#[test]
	fn highest_priority_match_wins() {
		let policies = vec![
			Policy {
				id: "low".into(),
				name: "low priority allow".into(),
				priority: 1,
				enabled: true,
				conditions: vec![Condition::ThreatLevel { comparator: Comparator::Gte, value: Severity::None }],
				actions: vec![Action::Allow],
			},
			Policy {
				id: "high".into(),
				name: "high priority block on critical".into(),
				priority: 10,
				enabled: true,
				conditions: vec![Condition::ThreatLevel { comparator: Comparator::Eq, value: Severity::Critical }],
				actions: vec![Action::Block],
			},
		];
		let engine = PolicyEngine::new(policies);
		let decision = engine.evaluate(&req(), &verdict(Severity::Critical));
		assert_eq!(decision.action, Action::Block);
		assert_eq!(decision.policy_id.as_deref(), Some("high"));
	}

	#[test]
	fn reload_is_visible_to_subsequent_evaluations() {
		let engine = PolicyEngine::new(vec![]);
		engine.reload(vec![Policy {
			id: "allow-all".into(),
			name: "allow all".into(),
			priority: 0,
			enabled: true,
			conditions: vec![],
			actions: vec![Action::Allow],
		}]);
		let decision = engine.evaluate(&req(), &verdict(Severity::None));
		assert_eq!(decision.action, Action::Allow);
	}

	#[test]
	fn user_condition_matches_against_metadata_user_id() {
		let mut blocked_user = req();
		blocked_user.metadata.user_id = Some("eve".into());
		let mut allowed_user = req();
		allowed_user.metadata.user_id = Some("alice".into());

		let engine = PolicyEngine::new(vec![Policy {
			id: "block-eve".into(),
			name: "block eve".into(),
			priority: 0,
			enabled: true,
			conditions: vec![Condition::User { comparator: Comparator::Eq, value: "eve".into() }],
			actions: vec![Action::Block],
		}]);

		assert_eq!(engine.evaluate(&blocked_user, &verdict(Severity::None)).action, Action::Block);
		// no policy matches alice, so the engine falls through to the default block
		assert_eq!(engine.evaluate(&allowed_user, &verdict(Severity::None)).policy_id, None);
	}

	#[test]
	fn user_condition_in_checks_membership() {
		let mut request = req();
		request.metadata.user_id = Some("bob".into());
		let condition = Condition::User { comparator: Comparator::In, value: "alice, bob, carol".into() };
		assert!(condition.matches(&request, &verdict(Severity::None)));
	}

	#[test]
	fn time_condition_matches_hour_range() {
		let mut request = req();
		request.metadata.timestamp = chrono::Utc.with_ymd_and_hms(2026, 1, 1, 14, 30, 0).unwrap();
		let business_hours = Condition::Time { comparator: Comparator::Matches, value: "09:00-17:00".into() };
		let after_hours = Condition::Time { comparator: Comparator::Matches, value: "18:00-23:00".into() };
		assert!(business_hours.matches(&request, &verdict(Severity::None)));
		assert!(!after_hours.matches(&request, &verdict(Severity::None)));
	}
}
