use serde_json::Value;

use super::Parser;
use crate::http::Request;
use crate::model::{ContentPart, GenerationParams, Message, NormalisedRequest, Provider, Role};
use crate::strng::Strng;

pub struct GoogleParser;

fn host_matches(req: &Request) -> bool {
	req
		.uri()
		.host()
		.is_some_and(|h| h.ends_with("generativelanguage.googleapis.com") || h.ends_with("aiplatform.googleapis.com"))
}

/// Gemini's `generateContent`: `{"contents": [{"role": ..., "parts": [{"text": ...}]}]}`.
fn body_shape_matches(v: &Value) -> bool {
	v.get("contents").is_some_and(Value::is_array)
}

impl Parser for GoogleParser {
	fn name(&self) -> &str {
		"google"
	}

	fn try_parse(&self, req: &Request, body: &[u8]) -> Option<anyhow::Result<NormalisedRequest>> {
		let v: Value = serde_json::from_slice(body).ok()?;
		if !host_matches(req) && !body_shape_matches(&v) {
			return None;
		}
		if !body_shape_matches(&v) {
			return Some(Err(anyhow::anyhow!("missing contents array")));
		}
		Some(parse_body(req, v, body.len()))
	}
}

fn model_from_path(req: &Request) -> &str {
	// .../models/{model}:generateContent
	req
		.uri()
		.path()
		.rsplit('/')
		.next()
		.and_then(|seg| seg.split(':').next())
		.unwrap_or("unknown")
}

fn parse_body(req: &Request, v: Value, raw_len: usize) -> anyhow::Result<NormalisedRequest> {
	let model = model_from_path(req);
	let messages = v
		.get("contents")
		.and_then(Value::as_array)
		.ok_or_else(|| anyhow::anyhow!("missing contents array"))?
		.iter()
		.map(|c| {
			let role = match c.get("role").and_then(Value::as_str) {
				Some("model") => Role::Assistant,
				_ => Role::User,
			};
			let content = c
				.get("parts")
				.and_then(Value::as_array)
				.into_iter()
				.flatten()
				.filter_map(|p| p.get("text").and_then(Value::as_str))
				.map(|t| ContentPart::Text { text: t.to_string() })
				.collect();
			Message { role, content }
		})
		.collect();

	let gen_config = v.get("generationConfig");
	Ok(NormalisedRequest {
		provider: Provider::Google,
		model: Strng::from(model),
		messages,
		params: GenerationParams {
			temperature: gen_config.and_then(|g| g.get("temperature")).and_then(Value::as_f64).map(|f| f as f32),
			top_p: gen_config.and_then(|g| g.get("topP")).and_then(Value::as_f64).map(|f| f as f32),
			top_k: gen_config.and_then(|g| g.get("topK")).and_then(Value::as_u64).map(|n| n as u32),
			max_tokens: gen_config.and_then(|g| g.get("maxOutputTokens")).and_then(Value::as_u64).map(|n| n as u32),
			frequency_penalty: gen_config.and_then(|g| g.get("frequencyPenalty")).and_then(Value::as_f64).map(|f| f as f32),
			presence_penalty: gen_config.and_then(|g| g.get("presencePenalty")).and_then(Value::as_f64).map(|f| f as f32),
			stop: gen_config
				.and_then(|g| g.get("stopSequences"))
				.and_then(Value::as_array)
				.map(|a| a.iter().filter_map(|x| x.as_str().map(String::from)).collect())
				.unwrap_or_default(),
			stream: false,
		},
		tools: vec![],
		metadata: Default::default(),
		raw_len,
	})
}
