use super::pattern::PatternRecognizer;
use super::recognizer::Recognizer;
use super::result::RecognizerResult;

pub struct UsSsnRecognizer {
	recognizer: PatternRecognizer,
}

impl UsSsnRecognizer {
	pub fn new() -> Self {
		let mut recognizer = PatternRecognizer::new(
			"US_SSN",
			vec![
				"social".to_string(),
				"security".to_string(),
				"ssn".to_string(),
				"ssns".to_string(),
			],
		);
		recognizer.add_pattern("ssn dashed", r"\b([0-9]{3})-([0-9]{2})-([0-9]{4})\b", 0.6);
		recognizer.add_pattern("ssn dotted or spaced", r"\b([0-9]{3})[. ]([0-9]{2})[. ]([0-9]{4})\b", 0.5);

		Self { recognizer }
	}
}

impl Default for UsSsnRecognizer {
	fn default() -> Self {
		Self::new()
	}
}

impl Recognizer for UsSsnRecognizer {
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
	fn finds_dashed_ssn() {
		let r = UsSsnRecognizer::new();
		let found = r.recognize("ssn: 123-45-6789 on file");
		assert_eq!(found.len(), 1);
		assert_eq!(found[0].matched, "123-45-6789");
	}
}
