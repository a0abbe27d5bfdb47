use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use http_body::Body;
use pin_project_lite::pin_project;
use tokio_util::codec::{Decoder, Encoder};

use crate::http;

pin_project! {
	pub struct TransformBody<D, E, I, F> {
		#[pin]
		body: http::Body,
		decoder: D,
		encoder: E,
		decode_buffer: BytesMut,
		encode_buffer: BytesMut,
		handler: F,
		finished: bool,
		_item: std::marker::PhantomData<I>,
	}
}

/// Like `passthrough::parser`, but the handler may rewrite or drop each
/// decoded item: returning `None` drops the chunk (used when a scanner's
/// redaction removes it entirely), `Some(item)` re-encodes the replacement.
pub fn parser<D, E, F>(body: http::Body, decoder: D, encoder: E, handler: F) -> http::Body
where
	D: Decoder + Send + 'static,
	D::Error: Send + Into<axum_core::BoxError> + 'static,
	E: Encoder<D::Item, Error = D::Error> + Send + 'static,
	D::Item: Send,
	F: FnMut(D::Item) -> Option<D::Item> + Send + 'static,
{
	http::Body::new(TransformBody {
		body,
		decoder,
		encoder,
		decode_buffer: BytesMut::new(),
		encode_buffer: BytesMut::new(),
		handler,
		finished: false,
		_item: std::marker::PhantomData,
	})
}

impl<D, E, I, F> Body for TransformBody<D, E, I, F>
where
	D: Decoder<Item = I> + Send + 'static,
	D::Error: Send + Into<axum_core::BoxError> + 'static,
	E: Encoder<I, Error = D::Error> + Send + 'static,
	I: Send,
	F: FnMut(I) -> Option<I> + Send + 'static,
{
	type Data = Bytes;
	type Error = http::Error;

	fn poll_frame(
		self: Pin<&mut Self>,
		cx: &mut Context<'_>,
	) -> Poll<Option<Result<http_body::Frame<Self::Data>, Self::Error>>> {
		let mut this = self.project();

		loop {
			// Drain whatever's already encoded before asking for more input.
			if !this.encode_buffer.is_empty() {
				let out = this.encode_buffer.split().freeze();
				return Poll::Ready(Some(Ok(http_body::Frame::data(out))));
			}
			if *this.finished {
				return Poll::Ready(None);
			}

			let decode = if *this.finished {
				this.decoder.decode_eof(this.decode_buffer)
			} else {
				this.decoder.decode(this.decode_buffer)
			};
			match decode {
				Ok(Some(item)) => {
					if let Some(item) = (this.handler)(item) {
						if let Err(e) = this.encoder.encode(item, this.encode_buffer) {
							return Poll::Ready(Some(Err(http::Error::new(e))));
						}
					}
					continue;
				},
				Ok(None) => {},
				Err(e) => return Poll::Ready(Some(Err(http::Error::new(e)))),
			}

			match std::task::ready!(this.body.as_mut().poll_frame(cx)) {
				Some(Ok(frame)) => {
					if let Some(data) = frame.data_ref() {
						this.decode_buffer.extend_from_slice(data);
					}
				},
				Some(Err(e)) => return Poll::Ready(Some(Err(e))),
				None => {
					*this.finished = true;
				},
			}
		}
	}
}
