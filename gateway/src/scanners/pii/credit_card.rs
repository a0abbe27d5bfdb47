use super::pattern::PatternRecognizer;
use super::recognizer::Recognizer;
use super::result::RecognizerResult;

pub struct CreditCardRecognizer {
	recognizer: PatternRecognizer,
}

impl CreditCardRecognizer {
	pub fn new() -> Self {
		let mut recognizer = PatternRecognizer::new(
			"CREDIT_CARD",
			vec![
				"credit".to_string(),
				"card".to_string(),
				"visa".to_string(),
				"mastercard".to_string(),
				"cc".to_string(),
				"amex".to_string(),
				"discover".to_string(),
				"jcb".to_string(),
				"diners".to_string(),
				"maestro".to_string(),
			],
		);

		recognizer.add_pattern(
			"visa",
			r"\b4\d{3}[- ]?(\d{3,4})[- ]?(\d{3,4})[- ]?(\d{3,5})\b",
			0.3,
		);
		recognizer.add_pattern(
			"mastercard",
			r"\b5[0-5]\d{2}[- ]?(\d{3,4})[- ]?(\d{3,4})[- ]?(\d{3,5})\b",
			0.3,
		);
		recognizer.add_pattern(
			"discover",
			r"\b6\d{3}[- ]?(\d{3,4})[- ]?(\d{3,4})[- ]?(\d{3,5})\b",
			0.3,
		);
		recognizer.add_pattern(
			"amex",
			r"\b3\d{3}[- ]?(\d{3,4})[- ]?(\d{3,4})[- ]?(\d{3,5})\b",
			0.3,
		);
		// Diners Club (1xxx) needs to be more specific to avoid colliding with the SSN-ish 13 digit runs
		recognizer.add_pattern(
			"diners",
			r"\b1\d{3}[- ]?(\d{3,4})[- ]?(\d{3,4})[- ]?(\d{4,5})\b",
			0.3,
		);

		Self { recognizer }
	}
}

impl Default for CreditCardRecognizer {
	fn default() -> Self {
		Self::new()
	}
}

impl Recognizer for CreditCardRecognizer {
	fn recognize(&self, text: &str) -> Vec<RecognizerResult> {
		self.recognizer.recognize(text)
	}
	fn name(&self) -> &str {
		self.recognizer.name()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn finds_visa_like_number() {
		let r = CreditCardRecognizer::new();
		let found = r.recognize("card on file: 4111 1111 1111 1111");
		assert_eq!(found.len(), 1);
		assert_eq!(found[0].entity_type, "CREDIT_CARD");
	}
}
