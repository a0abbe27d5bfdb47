use super::pattern::PatternRecognizer;
use super::recognizer::Recognizer;
use super::result::RecognizerResult;

pub struct EmailRecognizer {
	recognizer: PatternRecognizer,
}

impl EmailRecognizer {
	pub fn new() -> Self {
		let mut recognizer = PatternRecognizer::new(
			"EMAIL_ADDRESS",
			vec![
				"email".to_string(),
				"e-mail".to_string(),
				"mail".to_string(),
			],
		);
		recognizer.add_pattern(
			"standard email",
			r"[a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+\.[a-zA-Z0-9-.]+",
			0.85,
		);
		Self { recognizer }
	}
}

impl Default for EmailRecognizer {
	fn default() -> Self {
		Self::new()
	}
}

impl Recognizer for EmailRecognizer {
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
	fn finds_email() {
		let r = EmailRecognizer::new();
		let found = r.recognize("contact me at jane.doe@example.com please");
		assert_eq!(found.len(), 1);
		assert_eq!(found[0].matched, "jane.doe@example.com");
	}
}
