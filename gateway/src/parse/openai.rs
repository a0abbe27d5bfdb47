use serde_json::Value;

use super::Parser;
use crate::http::Request;
use crate::model::{ContentPart, GenerationParams, Message, NormalisedRequest, Provider, Role, ToolDescriptor};
use crate::strng::Strng;

pub struct OpenAiParser;

fn host_matches(req: &Request) -> bool {
	req.uri().host().is_some_and(|h| h.ends_with("api.openai.com") || h.ends_with("openai.azure.com"))
}

/// `{"messages": [...], "model": "..."}` at a `/v1/chat/completions`-shaped path.
fn body_shape_matches(v: &Value) -> bool {
	v.get("messages").is_some_and(Value::is_array)
}

fn role_from(s: &str) -> Role {
	match s {
		"system" => Role::System,
		"assistant" => Role::Assistant,
		"tool" => Role::Tool,
		"function" => Role::Function,
		_ => Role::User,
	}
}

/// OpenAI's `tools: [{type: "function", function: {name, description,
/// parameters}}]` shape; entries that aren't the `function` type are
/// skipped, matching the only tool kind this dialect defines today.
fn tools_from(v: &Value) -> Vec<ToolDescriptor> {
	v.get("tools")
		.and_then(Value::as_array)
		.map(|tools| {
			tools
				.iter()
				.filter(|t| t.get("type").and_then(Value::as_str) == Some("function"))
				.filter_map(|t| t.get("function"))
				.filter_map(|f| {
					let name = f.get("name").and_then(Value::as_str)?.to_string();
					Some(ToolDescriptor {
						name,
						description: f.get("description").and_then(Value::as_str).map(String::from),
						parameters: f.get("parameters").cloned().unwrap_or(Value::Null),
					})
				})
				.collect()
		})
		.unwrap_or_default()
}

impl Parser for OpenAiParser {
	fn name(&self) -> &str {
		"openai"
	}

	fn try_parse(&self, req: &Request, body: &[u8]) -> Option<anyhow::Result<NormalisedRequest>> {
		let v: Value = serde_json::from_slice(body).ok()?;
		if !host_matches(req) && !body_shape_matches(&v) {
			return None;
		}
		if !body_shape_matches(&v) {
			return Some(Err(anyhow::anyhow!("missing messages array")));
		}
		Some(parse_body(v, body.len()))
	}
}

fn parse_body(v: Value, raw_len: usize) -> anyhow::Result<NormalisedRequest> {
	let model = v.get("model").and_then(Value::as_str).unwrap_or("unknown");
	let messages = v
		.get("messages")
		.and_then(Value::as_array)
		.ok_or_else(|| anyhow::anyhow!("missing messages array"))?
		.iter()
		.map(|m| {
			let role = role_from(m.get("role").and_then(Value::as_str).unwrap_or("user"));
			let content = match m.get("content") {
				Some(Value::String(s)) => vec![ContentPart::Text { text: s.clone() }],
				Some(Value::Array(parts)) => parts
					.iter()
					.filter_map(|p| p.get("text").and_then(Value::as_str))
					.map(|t| ContentPart::Text { text: t.to_string() })
					.collect(),
				_ => vec![],
			};
			Message { role, content }
		})
		.collect();

	Ok(NormalisedRequest {
		provider: Provider::OpenAi,
		model: Strng::from(model),
		messages,
		params: GenerationParams {
			temperature: v.get("temperature").and_then(Value::as_f64).map(|f| f as f32),
			top_p: v.get("top_p").and_then(Value::as_f64).map(|f| f as f32),
			top_k: v.get("top_k").and_then(Value::as_u64).map(|n| n as u32),
			max_tokens: v.get("max_tokens").and_then(Value::as_u64).map(|n| n as u32),
			frequency_penalty: v.get("frequency_penalty").and_then(Value::as_f64).map(|f| f as f32),
			presence_penalty: v.get("presence_penalty").and_then(Value::as_f64).map(|f| f as f32),
			stop: v
				.get("stop")
				.and_then(Value::as_array)
				.map(|a| a.iter().filter_map(|x| x.as_str().map(String::from)).collect())
				.unwrap_or_default(),
			stream: v.get("stream").and_then(Value::as_bool).unwrap_or(false),
		},
		tools: tools_from(&v),
		metadata: Default::default(),
		raw_len,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	fn req() -> Request {
		::http::Request::builder()
			.uri("https://api.openai.com/v1/chat/completions")
			.body(crate::http::Body::empty())
			.unwrap()
	}

	#[test]
	fn parses_chat_completions_body() {
		let body = br#"{"model":"gpt-4","messages":[{"role":"user","content":"hi"}]}"#;
		let parsed = OpenAiParser.try_parse(&req(), body).unwrap().unwrap();
		assert_eq!(parsed.provider, Provider::OpenAi);
		assert_eq!(parsed.messages.len(), 1);
	}

	#[test]
	fn rejects_body_without_messages() {
		let result = OpenAiParser.try_parse(&req(), br#"{"model":"gpt-4"}"#);
		assert!(result.unwrap().is_err());
	}

	#[test]
	fn ignores_unrelated_request() {
		let other = ::http::Request::builder()
			.uri("https://example.com/foo")
			.body(crate::http::Body::empty())
			.unwrap();
		assert!(OpenAiParser.try_parse(&other, br#"{"foo":"bar"}"#).is_none());
	}

	#[test]
	fn function_role_and_tool_call_params_are_preserved() {
		let body = br#"{
			"model":"gpt-4",
			"messages":[
				{"role":"user","content":"what's the weather?"},
				{"role":"function","content":"{\"temp\":72}"}
			],
			"top_k": 40,
			"frequency_penalty": 0.2,
			"presence_penalty": 0.1,
			"tools":[{"type":"function","function":{"name":"get_weather","description":"fetch weather","parameters":{"type":"object"}}}]
		}"#;
		let parsed = OpenAiParser.try_parse(&req(), body).unwrap().unwrap();
		assert_eq!(parsed.messages[1].role, Role::Function);
		assert_eq!(parsed.params.top_k, Some(40));
		assert_eq!(parsed.params.frequency_penalty, Some(0.2));
		assert_eq!(parsed.params.presence_penalty, Some(0.1));
		assert_eq!(parsed.tools.len(), 1);
		assert_eq!(parsed.tools[0].name, "get_weather");
	}
}
