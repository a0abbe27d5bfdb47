//! Stream Pipeline: passes a chunked/SSE upstream response through to the
//! client while running incremental content scans over a rolling buffer,
//! redacting matched spans in place. Chunks are emitted in strict upstream
//! order; nothing is reordered, duplicated, or dropped except what a
//! redaction itself removes.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use http_body::Body;
use pin_project_lite::pin_project;
use tokio::time::{Instant, Sleep, sleep};
use tokio_sse_codec::{Event, Frame, SseDecoder, SseEncoder};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::error::PipelineError;
use crate::http;
use crate::pipeline::AuditRecord;
use crate::scan::{Severity, Verdict};
use crate::scanners::Orchestrator;
use crate::strng::Strng;
use crate::telemetry::log::{AsyncLog, emit_audit_log};

pub const REDACTION_MARKER: &str = "[REDACTED]";

/// Splices `REDACTION_MARKER` over the byte ranges named by `verdict`'s
/// findings, copying everything else through unchanged and in order. Spans
/// are clamped to `original`'s bounds and merged where they overlap or touch,
/// so a redacted chunk never reorders, duplicates, or drops non-redacted
/// content — only the matched substrings are replaced.
fn redact_spans(original: &[u8], verdict: &Verdict) -> Bytes {
	let mut spans: Vec<(usize, usize)> = verdict
		.findings
		.iter()
		.filter_map(|f| f.span)
		.map(|(start, end)| (start.min(original.len()), end.min(original.len())))
		.filter(|(start, end)| start < end)
		.collect();
	if spans.is_empty() {
		return Bytes::copy_from_slice(original);
	}
	spans.sort_unstable();

	let mut merged: Vec<(usize, usize)> = Vec::with_capacity(spans.len());
	for (start, end) in spans {
		match merged.last_mut() {
			Some((_, last_end)) if start <= *last_end => *last_end = (*last_end).max(end),
			_ => merged.push((start, end)),
		}
	}

	let mut out = BytesMut::with_capacity(original.len());
	let mut cursor = 0;
	for (start, end) in merged {
		out.extend_from_slice(&original[cursor..start]);
		out.extend_from_slice(REDACTION_MARKER.as_bytes());
		cursor = end;
	}
	out.extend_from_slice(&original[cursor..]);
	out.freeze()
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
	pub chunk_timeout: Duration,
	pub max_buffered_chunks: usize,
}

impl Default for StreamConfig {
	fn default() -> Self {
		StreamConfig {
			chunk_timeout: Duration::from_secs(15),
			max_buffered_chunks: 256,
		}
	}
}

type ScanFuture = Pin<Box<dyn Future<Output = Verdict> + Send>>;

pin_project! {
	/// Wraps an upstream body, scanning each flushed chunk of text through
	/// the scanner orchestrator and substituting `REDACTION_MARKER` for the
	/// whole chunk when its verdict is non-clean, before forwarding it
	/// downstream.
	pub struct ScanningBody {
		#[pin]
		inner: http::Body,
		orchestrator: Arc<Orchestrator>,
		correlation_id: Strng,
		config: StreamConfig,
		buffer: BytesMut,
		buffered_chunks: usize,
		#[pin]
		deadline: Sleep,
		finished: bool,
		scanning: Option<ScanFuture>,
		/// The worst severity seen across every chunk scanned so far, folded
		/// into the audit record's `threat_level` once the stream ends — which
		/// can only make it worse than what the request-side scan found, never
		/// better.
		worst_severity: Severity,
		/// Holds the baseline record [`crate::pipeline::handle`] stores right
		/// after this body is constructed. Taken and re-emitted, with
		/// `threat_level` escalated, once the stream finishes.
		audit_log: AsyncLog<AuditRecord>,
	}
}

impl ScanningBody {
	pub fn new(
		inner: http::Body, orchestrator: Arc<Orchestrator>, correlation_id: Strng, config: StreamConfig, audit_log: AsyncLog<AuditRecord>,
	) -> Self {
		let deadline = sleep(config.chunk_timeout);
		ScanningBody {
			inner,
			orchestrator,
			correlation_id,
			config,
			buffer: BytesMut::new(),
			buffered_chunks: 0,
			deadline,
			finished: false,
			scanning: None,
			worst_severity: Severity::None,
			audit_log,
		}
	}

}

/// Escalates the baseline audit record's `threat_level` to the worst severity
/// observed across a streamed response and emits it. Called exactly once,
/// from whichever path ends the stream (clean end, timeout, backpressure, or
/// upstream error), so every streamed request still produces one audit
/// record even though the request-side pipeline already returned. Shared by
/// [`ScanningBody`] and [`SseScanningBody`].
fn finalize_audit(audit_log: &AsyncLog<AuditRecord>, worst_severity: Severity) {
	if let Some(mut record) = audit_log.take() {
		if worst_severity > record.threat_level {
			record.threat_level = worst_severity;
		}
		emit_audit_log(&record);
	}
}

impl Body for ScanningBody {
	type Data = Bytes;
	type Error = PipelineError;

	fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<http_body::Frame<Self::Data>, Self::Error>>> {
		let mut this = self.project();

		loop {
			if *this.finished {
				return Poll::Ready(None);
			}

			if let Some(fut) = this.scanning.as_mut() {
				return match fut.as_mut().poll(cx) {
					Poll::Ready(verdict) => {
						let text = this.buffer.split().freeze();
						*this.scanning = None;
						if verdict.overall_threat_level > *this.worst_severity {
							*this.worst_severity = verdict.overall_threat_level;
						}
						let out = redact_spans(&text, &verdict);
						Poll::Ready(Some(Ok(http_body::Frame::data(out))))
					},
					Poll::Pending => Poll::Pending,
				};
			}

			if this.deadline.as_mut().poll(cx).is_ready() {
				warn!(correlation_id = %this.correlation_id, "stream chunk timeout, closing early");
				*this.finished = true;
				finalize_audit(this.audit_log, *this.worst_severity);
				return Poll::Ready(Some(Err(PipelineError::RequestTimeout)));
			}

			match this.inner.as_mut().poll_frame(cx) {
				Poll::Ready(Some(Ok(frame))) => {
					this.deadline.as_mut().reset(Instant::now() + this.config.chunk_timeout);
					let Some(data) = frame.data_ref() else {
						return Poll::Ready(Some(Ok(frame)));
					};
					*this.buffered_chunks += 1;
					if *this.buffered_chunks > this.config.max_buffered_chunks {
						*this.finished = true;
						finalize_audit(this.audit_log, *this.worst_severity);
						return Poll::Ready(Some(Err(PipelineError::StreamBackpressure {
							buffered: *this.buffered_chunks,
						})));
					}
					this.buffer.extend_from_slice(data);
					let text: Arc<str> = Arc::from(String::from_utf8_lossy(this.buffer).into_owned());
					let orchestrator = this.orchestrator.clone();
					*this.scanning = Some(Box::pin(async move { orchestrator.run(text).await }));
				},
				Poll::Ready(Some(Err(e))) => {
					*this.finished = true;
					finalize_audit(this.audit_log, *this.worst_severity);
					return Poll::Ready(Some(Err(PipelineError::UpstreamCall(e.into()))));
				},
				Poll::Ready(None) => {
					*this.finished = true;
					finalize_audit(this.audit_log, *this.worst_severity);
					return Poll::Ready(None);
				},
				Poll::Pending => return Poll::Pending,
			}
		}
	}

	fn is_end_stream(&self) -> bool {
		self.finished
	}
}

type SseScanFuture = Pin<Box<dyn Future<Output = Verdict> + Send>>;

pin_project! {
	/// Like [`ScanningBody`], but event-aware: decodes SSE frames with
	/// `tokio_sse_codec` so a scan+redaction only ever touches an event's
	/// `data` payload, never the `event:`/`id:` framing around it, so the
	/// client's own SSE parser keeps seeing well-formed events.
	pub struct SseScanningBody {
		#[pin]
		inner: http::Body,
		decoder: SseDecoder<Bytes>,
		encoder: SseEncoder<Bytes>,
		decode_buffer: BytesMut,
		encode_buffer: BytesMut,
		orchestrator: Arc<Orchestrator>,
		correlation_id: Strng,
		config: StreamConfig,
		buffered_chunks: usize,
		#[pin]
		deadline: Sleep,
		finished: bool,
		scanning: Option<(Bytes, SseScanFuture)>,
		/// Set once the inner body has been fully drained, so the next decode
		/// uses `decode_eof` to flush any event still sitting in the decoder's
		/// internal buffer before `finished` is set.
		eof_received: bool,
		worst_severity: Severity,
		audit_log: AsyncLog<AuditRecord>,
	}
}

impl SseScanningBody {
	pub fn new(inner: http::Body, orchestrator: Arc<Orchestrator>, correlation_id: Strng, config: StreamConfig, audit_log: AsyncLog<AuditRecord>) -> Self {
		let deadline = sleep(config.chunk_timeout);
		SseScanningBody {
			inner,
			decoder: SseDecoder::with_max_size(2_097_152),
			encoder: SseEncoder::new(),
			decode_buffer: BytesMut::new(),
			encode_buffer: BytesMut::new(),
			orchestrator,
			correlation_id,
			config,
			buffered_chunks: 0,
			deadline,
			finished: false,
			scanning: None,
			eof_received: false,
			worst_severity: Severity::None,
			audit_log,
		}
	}
}

impl Body for SseScanningBody {
	type Data = Bytes;
	type Error = PipelineError;

	fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<http_body::Frame<Self::Data>, Self::Error>>> {
		let mut this = self.project();

		loop {
			if *this.finished {
				return Poll::Ready(None);
			}

			if !this.encode_buffer.is_empty() {
				let out = this.encode_buffer.split().freeze();
				return Poll::Ready(Some(Ok(http_body::Frame::data(out))));
			}

			if let Some((data, fut)) = this.scanning.as_mut() {
				match fut.as_mut().poll(cx) {
					Poll::Ready(verdict) => {
						if verdict.overall_threat_level > *this.worst_severity {
							*this.worst_severity = verdict.overall_threat_level;
						}
						let redacted = redact_spans(data, &verdict);
						*this.scanning = None;
						let event = Frame::Event(Event::<Bytes> {
							data: redacted,
							name: std::borrow::Cow::Borrowed(""),
							id: None,
						});
						if let Err(e) = this.encoder.encode(event, this.encode_buffer) {
							*this.finished = true;
							finalize_audit(this.audit_log, *this.worst_severity);
							return Poll::Ready(Some(Err(PipelineError::Internal(anyhow::anyhow!(e.to_string())))));
						}
						continue;
					},
					Poll::Pending => return Poll::Pending,
				}
			}

			if this.deadline.as_mut().poll(cx).is_ready() {
				warn!(correlation_id = %this.correlation_id, "sse stream chunk timeout, closing early");
				*this.finished = true;
				finalize_audit(this.audit_log, *this.worst_severity);
				return Poll::Ready(Some(Err(PipelineError::RequestTimeout)));
			}

			let decode_result = if *this.eof_received { this.decoder.decode_eof(this.decode_buffer) } else { this.decoder.decode(this.decode_buffer) };
			match decode_result {
				Ok(Some(Frame::Event(Event { data, .. }))) => {
					let text: Arc<str> = Arc::from(String::from_utf8_lossy(&data).into_owned());
					let orchestrator = this.orchestrator.clone();
					*this.scanning = Some((data, Box::pin(async move { orchestrator.run(text).await })));
					continue;
				},
				Ok(Some(_comment_or_other)) => continue,
				Ok(None) => {
					if *this.eof_received {
						*this.finished = true;
						finalize_audit(this.audit_log, *this.worst_severity);
						return Poll::Ready(None);
					}
				},
				Err(e) => {
					*this.finished = true;
					finalize_audit(this.audit_log, *this.worst_severity);
					return Poll::Ready(Some(Err(PipelineError::Internal(anyhow::anyhow!(e.to_string())))));
				},
			}

			match this.inner.as_mut().poll_frame(cx) {
				Poll::Ready(Some(Ok(frame))) => {
					this.deadline.as_mut().reset(Instant::now() + this.config.chunk_timeout);
					let Some(data) = frame.data_ref() else { continue };
					*this.buffered_chunks += 1;
					if *this.buffered_chunks > this.config.max_buffered_chunks {
						*this.finished = true;
						finalize_audit(this.audit_log, *this.worst_severity);
						return Poll::Ready(Some(Err(PipelineError::StreamBackpressure {
							buffered: *this.buffered_chunks,
						})));
					}
					this.decode_buffer.extend_from_slice(data);
				},
				Poll::Ready(Some(Err(e))) => {
					*this.finished = true;
					finalize_audit(this.audit_log, *this.worst_severity);
					return Poll::Ready(Some(Err(PipelineError::UpstreamCall(e.into()))));
				},
				Poll::Ready(None) => {
					*this.eof_received = true;
				},
				Poll::Pending => return Poll::Pending,
			}
		}
	}

	fn is_end_stream(&self) -> bool {
		self.finished
	}
}

#[cfg(test)]
mod tests {
	use http_body_util::BodyExt;

	use super::*;
	use crate::scanners::default_scanners;

	fn orchestrator() -> Arc<Orchestrator> {
		Arc::new(Orchestrator::new(default_scanners(), Duration::from_secs(1)))
	}

	fn baseline_record() -> AuditRecord {
		AuditRecord {
			correlation_id: Strng::from("corr"),
			host: "api.openai.com".into(),
			action: crate::policy::Action::Allow,
			policy_id: None,
			cache_hit: false,
			threat_level: Severity::None,
			latency: Duration::ZERO,
			timestamp: chrono::Utc::now(),
			is_stream: true,
		}
	}

	#[tokio::test]
	async fn passes_through_benign_chunk() {
		let body = http::Body::from("hello world");
		let log = AsyncLog::new();
		log.store(baseline_record());
		let scanning = ScanningBody::new(body, orchestrator(), Strng::from("corr-1"), StreamConfig::default(), log);
		let collected = scanning.collect().await.unwrap().to_bytes();
		assert_eq!(&collected[..], b"hello world");
	}

	#[tokio::test]
	async fn redacts_only_the_matched_span_in_chunk() {
		let body = http::Body::from("here is sk-abcdefghijklmnopqrstuvwxyz012345, thanks");
		let log = AsyncLog::new();
		log.store(baseline_record());
		let scanning = ScanningBody::new(body, orchestrator(), Strng::from("corr-2"), StreamConfig::default(), log);
		let collected = scanning.collect().await.unwrap().to_bytes();
		let text = String::from_utf8_lossy(&collected);
		assert!(text.starts_with("here is "));
		assert!(text.ends_with(", thanks"));
		assert!(text.contains(REDACTION_MARKER));
		assert!(!text.contains("sk-abcdefghijklmnopqrstuvwxyz012345"));
	}

	#[tokio::test]
	async fn redact_spans_merges_overlapping_ranges_and_preserves_order() {
		use crate::scan::{Finding, ScannerResult, Severity};

		let original = b"abcdefghij";
		let verdict = Verdict::from_results(
			vec![ScannerResult::from_findings(
				"test",
				vec![
					Finding::new("a", Severity::High, "x", 1.0).with_span(1, 3),
					Finding::new("b", Severity::High, "y", 1.0).with_span(2, 5),
				],
				100,
				Duration::ZERO,
			)],
			Duration::ZERO,
		);
		let out = redact_spans(original, &verdict);
		let text = String::from_utf8_lossy(&out);
		assert_eq!(text, format!("a{}fghij", REDACTION_MARKER));
	}

	#[tokio::test]
	async fn backpressure_exceeded_when_too_many_chunks() {
		use futures_util::stream;

		let chunks: Vec<Result<Bytes, std::io::Error>> = (0..5).map(|_| Ok(Bytes::from_static(b"x"))).collect();
		let body = http::Body::from_stream(stream::iter(chunks));
		let config = StreamConfig {
			chunk_timeout: Duration::from_secs(5),
			max_buffered_chunks: 2,
		};
		let log = AsyncLog::new();
		log.store(baseline_record());
		let mut scanning = Box::pin(ScanningBody::new(body, orchestrator(), Strng::from("corr-3"), config, log));
		let mut saw_backpressure = false;
		while let Some(frame) = scanning.frame().await {
			if matches!(frame, Err(PipelineError::StreamBackpressure { .. })) {
				saw_backpressure = true;
				break;
			}
		}
		assert!(saw_backpressure);
	}

	#[tokio::test]
	async fn escalates_audit_record_threat_level_past_the_request_side_scan() {
		let body = http::Body::from("here is sk-abcdefghijklmnopqrstuvwxyz012345, thanks");
		let log = AsyncLog::new();
		let mut record = baseline_record();
		record.threat_level = Severity::Low;
		log.store(record);
		let scanning = ScanningBody::new(body, orchestrator(), Strng::from("corr-4"), StreamConfig::default(), log.clone());
		let _ = scanning.collect().await.unwrap();
		// the API key scanner should have found something worse than Low and
		// ScanningBody should have taken+re-emitted the record on stream end
		assert!(log.take().is_none());
	}

	#[tokio::test]
	async fn sse_scanning_preserves_event_framing_and_redacts_only_the_data_field() {
		let body = http::Body::from("data: here is sk-abcdefghijklmnopqrstuvwxyz012345, thanks\n\n");
		let log = AsyncLog::new();
		log.store(baseline_record());
		let scanning = SseScanningBody::new(body, orchestrator(), Strng::from("sse-1"), StreamConfig::default(), log);
		let collected = scanning.collect().await.unwrap().to_bytes();
		let text = String::from_utf8_lossy(&collected);
		assert!(text.starts_with("data:"));
		assert!(text.contains(REDACTION_MARKER));
		assert!(!text.contains("sk-abcdefghijklmnopqrstuvwxyz012345"));
	}

	#[tokio::test]
	async fn sse_scanning_passes_through_benign_events_unchanged() {
		let body = http::Body::from("data: hello\n\n");
		let log = AsyncLog::new();
		log.store(baseline_record());
		let scanning = SseScanningBody::new(body, orchestrator(), Strng::from("sse-2"), StreamConfig::default(), log);
		let collected = scanning.collect().await.unwrap().to_bytes();
		let text = String::from_utf8_lossy(&collected);
		assert!(text.contains("hello"));
		assert!(!text.contains(REDACTION_MARKER));
	}
}
