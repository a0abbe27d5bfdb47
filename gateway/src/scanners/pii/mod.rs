mod credit_card;
mod email;
mod pattern;
mod phone;
pub mod recognizer;
pub mod result;
mod ssn;

use credit_card::CreditCardRecognizer;
use email::EmailRecognizer;
use phone::PhoneRecognizer;
use recognizer::Recognizer;
use ssn::UsSsnRecognizer;

/// The fixed set of regex-based PII detectors run against scannable text.
/// Order doesn't matter: findings are merged and deduplicated by the caller.
pub fn recognizers() -> Vec<Box<dyn Recognizer + Send + Sync>> {
	vec![
		Box::new(EmailRecognizer::new()),
		Box::new(PhoneRecognizer::new()),
		Box::new(CreditCardRecognizer::new()),
		Box::new(UsSsnRecognizer::new()),
	]
}
