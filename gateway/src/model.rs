//! Normalised Request model: the provider-agnostic shape every vendor
//! dialect is parsed into before scanning, policy evaluation, and
//! forwarding. Deliberately closed enums rather than string discriminants.

use serde::{Deserialize, Serialize};

use crate::strng::Strng;

/// Which vendor dialect a request or response was recognised as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
	OpenAi,
	Anthropic,
	Google,
	Cohere,
	HuggingFace,
	Custom,
}

impl Provider {
	pub fn as_str(&self) -> &'static str {
		match self {
			Provider::OpenAi => "openai",
			Provider::Anthropic => "anthropic",
			Provider::Google => "google",
			Provider::Cohere => "cohere",
			Provider::HuggingFace => "huggingface",
			Provider::Custom => "custom",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
	System,
	User,
	Assistant,
	Tool,
	Function,
}

/// A single piece of message content. Vendors mix text/image/tool-call
/// shapes; we normalise into a closed set rather than carrying each
/// vendor's own JSON shape through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentPart {
	Text { text: String },
	ImageUrl { url: String },
	ToolUse { id: String, name: String, input: serde_json::Value },
	ToolResult { tool_use_id: String, content: String },
}

impl ContentPart {
	/// Text content is what scanners operate on; non-text parts contribute
	/// nothing to the scanned surface except their literal string fields.
	pub fn scannable_text(&self) -> Option<&str> {
		match self {
			ContentPart::Text { text } => Some(text),
			ContentPart::ToolResult { content, .. } => Some(content),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
	pub role: Role,
	pub content: Vec<ContentPart>,
}

impl Message {
	pub fn text(role: Role, text: impl Into<String>) -> Self {
		Message {
			role,
			content: vec![ContentPart::Text { text: text.into() }],
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationParams {
	#[serde(default)]
	pub temperature: Option<f32>,
	#[serde(default)]
	pub top_p: Option<f32>,
	#[serde(default)]
	pub top_k: Option<u32>,
	#[serde(default)]
	pub max_tokens: Option<u32>,
	#[serde(default)]
	pub frequency_penalty: Option<f32>,
	#[serde(default)]
	pub presence_penalty: Option<f32>,
	#[serde(default)]
	pub stop: Vec<String>,
	#[serde(default)]
	pub stream: bool,
}

/// A tool/function the model may call, carried through unmodified so the
/// upstream call sees the same tool surface the client offered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
	pub name: String,
	#[serde(default)]
	pub description: Option<String>,
	#[serde(default)]
	pub parameters: serde_json::Value,
}

/// Request-scoped context that never affects the scan verdict or the
/// upstream call, but is available to policy conditions (`user`, `time`)
/// and excluded from the cache fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMetadata {
	#[serde(default)]
	pub user_id: Option<String>,
	#[serde(default)]
	pub tenant: Option<String>,
	#[serde(default)]
	pub source_ip: Option<String>,
	#[serde(default)]
	pub user_agent: Option<String>,
	#[serde(default = "chrono::Utc::now")]
	pub timestamp: chrono::DateTime<chrono::Utc>,
	#[serde(default)]
	pub tags: Vec<String>,
}

impl Default for RequestMetadata {
	fn default() -> Self {
		RequestMetadata {
			user_id: None,
			tenant: None,
			source_ip: None,
			user_agent: None,
			timestamp: chrono::Utc::now(),
			tags: Vec::new(),
		}
	}
}

/// The provider-agnostic request the rest of the pipeline operates on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalisedRequest {
	pub provider: Provider,
	pub model: Strng,
	pub messages: Vec<Message>,
	#[serde(default)]
	pub params: GenerationParams,
	#[serde(default)]
	pub tools: Vec<ToolDescriptor>,
	/// Request-scoped context (user id, tenant, source IP, timestamp, tags).
	/// Excluded from the cache fingerprint; available to policy conditions.
	#[serde(default)]
	pub metadata: RequestMetadata,
	/// Raw body bytes as received, kept for fingerprinting and for the
	/// fallback of forwarding byte-for-byte when no mutation occurred.
	#[serde(skip)]
	pub raw_len: usize,
}

impl NormalisedRequest {
	/// Concatenation of every scannable text part, in message order, used
	/// by scanners that operate over the whole conversation rather than
	/// message-by-message.
	pub fn scannable_text(&self) -> String {
		let mut out = String::new();
		for m in &self.messages {
			for part in &m.content {
				if let Some(t) = part.scannable_text() {
					if !out.is_empty() {
						out.push('\n');
					}
					out.push_str(t);
				}
			}
		}
		out
	}
}

/// The provider-agnostic shape of a (non-streamed) response, used by
/// response-side scanning and cache storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalisedResponse {
	pub provider: Provider,
	pub model: Strng,
	pub content: Vec<ContentPart>,
	pub finish_reason: Option<String>,
}

impl NormalisedResponse {
	pub fn scannable_text(&self) -> String {
		self
			.content
			.iter()
			.filter_map(|p| p.scannable_text())
			.collect::<Vec<_>>()
			.join("\n")
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn scannable_text_joins_text_parts_only() {
		let req = NormalisedRequest {
			provider: Provider::OpenAi,
			model: Strng::from("gpt-4"),
			messages: vec![
				Message::text(Role::System, "be nice"),
				Message {
					role: Role::User,
					content: vec![
						ContentPart::Text { text: "hello".into() },
						ContentPart::ImageUrl { url: "http://x/y.png".into() },
					],
				},
			],
			params: GenerationParams::default(),
			tools: vec![],
			metadata: RequestMetadata::default(),
			raw_len: 0,
		};
		assert_eq!(req.scannable_text(), "be nice\nhello");
	}
}
