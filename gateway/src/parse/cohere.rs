use serde_json::Value;

use super::Parser;
use crate::http::Request;
use crate::model::{GenerationParams, Message, NormalisedRequest, Provider, Role};
use crate::strng::Strng;

pub struct CohereParser;

fn host_matches(req: &Request) -> bool {
	req.uri().host().is_some_and(|h| h.ends_with("api.cohere.ai") || h.ends_with("api.cohere.com"))
}

/// Cohere's chat API uses a single `message` string plus an optional
/// `chat_history` array, not a unified `messages` list.
fn body_shape_matches(v: &Value) -> bool {
	v.get("message").is_some_and(Value::is_string)
}

impl Parser for CohereParser {
	fn name(&self) -> &str {
		"cohere"
	}

	fn try_parse(&self, req: &Request, body: &[u8]) -> Option<anyhow::Result<NormalisedRequest>> {
		let v: Value = serde_json::from_slice(body).ok()?;
		if !host_matches(req) && !body_shape_matches(&v) {
			return None;
		}
		if !body_shape_matches(&v) {
			return Some(Err(anyhow::anyhow!("missing message field")));
		}
		Some(parse_body(v, body.len()))
	}
}

fn parse_body(v: Value, raw_len: usize) -> anyhow::Result<NormalisedRequest> {
	let model = v.get("model").and_then(Value::as_str).unwrap_or("command-r");
	let mut messages: Vec<Message> = v
		.get("chat_history")
		.and_then(Value::as_array)
		.into_iter()
		.flatten()
		.map(|m| {
			let role = match m.get("role").and_then(Value::as_str) {
				Some("CHATBOT") => Role::Assistant,
				Some("SYSTEM") => Role::System,
				_ => Role::User,
			};
			let text = m.get("message").and_then(Value::as_str).unwrap_or_default();
			Message::text(role, text)
		})
		.collect();
	let message = v
		.get("message")
		.and_then(Value::as_str)
		.ok_or_else(|| anyhow::anyhow!("missing message field"))?;
	messages.push(Message::text(Role::User, message));

	Ok(NormalisedRequest {
		provider: Provider::Cohere,
		model: Strng::from(model),
		messages,
		params: GenerationParams {
			temperature: v.get("temperature").and_then(Value::as_f64).map(|f| f as f32),
			top_p: v.get("p").and_then(Value::as_f64).map(|f| f as f32),
			top_k: v.get("k").and_then(Value::as_u64).map(|n| n as u32),
			max_tokens: v.get("max_tokens").and_then(Value::as_u64).map(|n| n as u32),
			frequency_penalty: v.get("frequency_penalty").and_then(Value::as_f64).map(|f| f as f32),
			presence_penalty: v.get("presence_penalty").and_then(Value::as_f64).map(|f| f as f32),
			stop: v
				.get("stop_sequences")
				.and_then(Value::as_array)
				.map(|a| a.iter().filter_map(|x| x.as_str().map(String::from)).collect())
				.unwrap_or_default(),
			stream: v.get("stream").and_then(Value::as_bool).unwrap_or(false),
		},
		tools: vec![],
		metadata: Default::default(),
		raw_len,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_message_with_history() {
		let req = ::http::Request::builder()
			.uri("https://api.cohere.ai/v1/chat")
			.body(crate::http::Body::empty())
			.unwrap();
		let body = br#"{"model":"command-r","message":"hi","chat_history":[{"role":"USER","message":"earlier"}]}"#;
		let parsed = CohereParser.try_parse(&req, body).unwrap().unwrap();
		assert_eq!(parsed.provider, Provider::Cohere);
		assert_eq!(parsed.messages.len(), 2);
	}
}
