use super::pattern::PatternRecognizer;
use super::recognizer::Recognizer;
use super::result::RecognizerResult;

pub struct PhoneRecognizer {
	recognizer: PatternRecognizer,
}

impl PhoneRecognizer {
	pub fn new() -> Self {
		let mut recognizer = PatternRecognizer::new(
			"PHONE_NUMBER",
			vec!["phone".to_string(), "call".to_string(), "mobile".to_string()],
		);
		// US/Canada style with optional country code and separators.
		recognizer.add_pattern(
			"na number",
			r"\b(?:\+?1[-. ]?)?\(?\d{3}\)?[-. ]?\d{3}[-. ]?\d{4}\b",
			0.6,
		);
		// generic international, + followed by 8-15 digits
		recognizer.add_pattern("intl number", r"\+\d{1,3}[-. ]?\d{2,4}[-. ]?\d{2,4}[-. ]?\d{2,4}", 0.5);

		Self { recognizer }
	}
}

impl Default for PhoneRecognizer {
	fn default() -> Self {
		Self::new()
	}
}

impl Recognizer for PhoneRecognizer {
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
	fn finds_na_number() {
		let r = PhoneRecognizer::new();
		let found = r.recognize("call me at (415) 555-0132 tomorrow");
		assert_eq!(found.len(), 1);
	}
}
