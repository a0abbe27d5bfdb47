use serde_json::Value;

use super::Parser;
use crate::http::Request;
use crate::model::{GenerationParams, Message, NormalisedRequest, Provider, Role};
use crate::strng::Strng;

pub struct HuggingFaceParser;

fn host_matches(req: &Request) -> bool {
	req.uri().host().is_some_and(|h| h.ends_with("api-inference.huggingface.co"))
}

/// The text-generation-inference shape: `{"inputs": "...", "parameters": {...}}`.
fn body_shape_matches(v: &Value) -> bool {
	v.get("inputs").is_some_and(Value::is_string)
}

impl Parser for HuggingFaceParser {
	fn name(&self) -> &str {
		"huggingface"
	}

	fn try_parse(&self, req: &Request, body: &[u8]) -> Option<anyhow::Result<NormalisedRequest>> {
		let v: Value = serde_json::from_slice(body).ok()?;
		if !host_matches(req) && !body_shape_matches(&v) {
			return None;
		}
		if !body_shape_matches(&v) {
			return Some(Err(anyhow::anyhow!("missing inputs field")));
		}
		Some(parse_body(req, v, body.len()))
	}
}

fn model_from_path(req: &Request) -> &str {
	req.uri().path().trim_start_matches("/models/").trim_end_matches('/')
}

fn parse_body(req: &Request, v: Value, raw_len: usize) -> anyhow::Result<NormalisedRequest> {
	let model = model_from_path(req);
	let input = v.get("inputs").and_then(Value::as_str).ok_or_else(|| anyhow::anyhow!("missing inputs field"))?;
	let params = v.get("parameters");

	Ok(NormalisedRequest {
		provider: Provider::HuggingFace,
		model: Strng::new(if model.is_empty() { "unknown" } else { model }),
		messages: vec![Message::text(Role::User, input)],
		params: GenerationParams {
			temperature: params.and_then(|p| p.get("temperature")).and_then(Value::as_f64).map(|f| f as f32),
			top_p: params.and_then(|p| p.get("top_p")).and_then(Value::as_f64).map(|f| f as f32),
			top_k: params.and_then(|p| p.get("top_k")).and_then(Value::as_u64).map(|n| n as u32),
			max_tokens: params.and_then(|p| p.get("max_new_tokens")).and_then(Value::as_u64).map(|n| n as u32),
			frequency_penalty: None,
			presence_penalty: None,
			stop: Vec::new(),
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
	fn parses_inputs_body() {
		let req = ::http::Request::builder()
			.uri("https://api-inference.huggingface.co/models/gpt2")
			.body(crate::http::Body::empty())
			.unwrap();
		let body = br#"{"inputs":"hello world","parameters":{"max_new_tokens":50}}"#;
		let parsed = HuggingFaceParser.try_parse(&req, body).unwrap().unwrap();
		assert_eq!(parsed.provider, Provider::HuggingFace);
		assert_eq!(parsed.model.as_str(), "gpt2");
	}
}
