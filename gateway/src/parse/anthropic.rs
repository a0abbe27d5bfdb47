use serde_json::Value;

use super::Parser;
use crate::http::Request;
use crate::model::{ContentPart, GenerationParams, Message, NormalisedRequest, Provider, Role};
use crate::strng::Strng;

pub struct AnthropicParser;

fn host_matches(req: &Request) -> bool {
	req.uri().host().is_some_and(|h| h.ends_with("api.anthropic.com"))
}

/// Anthropic's Messages API: `{"messages": [...], "model": ..., "max_tokens": ...}`
/// with an optional top-level `system` string, distinguishing it from OpenAI's
/// shape where `system` is just another message with `role: "system"`.
fn body_shape_matches(v: &Value) -> bool {
	v.get("messages").is_some_and(Value::is_array) && v.get("max_tokens").is_some()
}

impl Parser for AnthropicParser {
	fn name(&self) -> &str {
		"anthropic"
	}

	fn try_parse(&self, req: &Request, body: &[u8]) -> Option<anyhow::Result<NormalisedRequest>> {
		let v: Value = serde_json::from_slice(body).ok()?;
		if !host_matches(req) && !body_shape_matches(&v) {
			return None;
		}
		if !v.get("messages").is_some_and(Value::is_array) {
			return Some(Err(anyhow::anyhow!("missing messages array")));
		}
		Some(parse_body(v, body.len()))
	}
}

fn parse_body(v: Value, raw_len: usize) -> anyhow::Result<NormalisedRequest> {
	let model = v.get("model").and_then(Value::as_str).unwrap_or("unknown");
	let mut messages = Vec::new();
	if let Some(system) = v.get("system").and_then(Value::as_str) {
		messages.push(Message::text(Role::System, system));
	}
	for m in v.get("messages").and_then(Value::as_array).into_iter().flatten() {
		let role = match m.get("role").and_then(Value::as_str) {
			Some("assistant") => Role::Assistant,
			_ => Role::User,
		};
		let content = match m.get("content") {
			Some(Value::String(s)) => vec![ContentPart::Text { text: s.clone() }],
			Some(Value::Array(parts)) => parts
				.iter()
				.filter_map(|p| match p.get("type").and_then(Value::as_str) {
					Some("text") => p.get("text").and_then(Value::as_str).map(|t| ContentPart::Text { text: t.to_string() }),
					Some("tool_result") => Some(ContentPart::ToolResult {
						tool_use_id: p.get("tool_use_id").and_then(Value::as_str).unwrap_or_default().to_string(),
						content: p.get("content").and_then(Value::as_str).unwrap_or_default().to_string(),
					}),
					_ => None,
				})
				.collect(),
			_ => vec![],
		};
		messages.push(Message { role, content });
	}

	Ok(NormalisedRequest {
		provider: Provider::Anthropic,
		model: Strng::from(model),
		messages,
		params: GenerationParams {
			temperature: v.get("temperature").and_then(Value::as_f64).map(|f| f as f32),
			top_p: v.get("top_p").and_then(Value::as_f64).map(|f| f as f32),
			top_k: v.get("top_k").and_then(Value::as_u64).map(|n| n as u32),
			max_tokens: v.get("max_tokens").and_then(Value::as_u64).map(|n| n as u32),
			frequency_penalty: None,
			presence_penalty: None,
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

	fn req() -> Request {
		::http::Request::builder()
			.uri("https://api.anthropic.com/v1/messages")
			.body(crate::http::Body::empty())
			.unwrap()
	}

	#[test]
	fn parses_messages_with_system_prompt() {
		let body = br#"{"model":"claude-3-opus-20240229","max_tokens":100,"system":"be terse","messages":[{"role":"user","content":"hi"}]}"#;
		let parsed = AnthropicParser.try_parse(&req(), body).unwrap().unwrap();
		assert_eq!(parsed.provider, Provider::Anthropic);
		assert_eq!(parsed.messages.len(), 2);
	}
}
