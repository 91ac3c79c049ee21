//! Drives one connection's read loop and turns it into an ordered stream of
//! canonical events.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_stream::stream;
use futures_util::{Stream, StreamExt};
use reqwest::Response;
use tracing::{debug, info, warn};

use crate::error::{parse_error_message, InferenceApiError};
use crate::events::StreamEvent;
use crate::sse::FrameDecoder;
use crate::translate::{EventTranslator, Translated};

/// Cancellation flag shared between the consumer and the read loop.
pub type CancellationSignal = Arc<AtomicBool>;

/// Pull-based event sequence for one connection.
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Message carried by the terminal `Error` of a cancelled connection.
pub const CANCELLED_MESSAGE: &str = "request was cancelled";

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone)]
pub struct StreamController {
    backend_id: String,
    started_at_ms: u64,
    cancellation: Option<CancellationSignal>,
}

impl StreamController {
    /// Start a connection; the start time is captured here.
    pub fn new(backend_id: impl Into<String>) -> Self {
        Self {
            backend_id: backend_id.into(),
            started_at_ms: current_epoch_ms(),
            cancellation: None,
        }
    }

    pub fn with_cancellation(mut self, cancellation: CancellationSignal) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    pub fn with_optional_cancellation(mut self, cancellation: Option<CancellationSignal>) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn backend_id(&self) -> &str {
        &self.backend_id
    }

    pub fn metadata_event(&self) -> StreamEvent {
        StreamEvent::Metadata {
            backend_id: self.backend_id.clone(),
            started_at_ms: self.started_at_ms,
        }
    }

    /// Decode a raw body stream.
    ///
    /// Yields `Metadata`, then every translated event in arrival order, then
    /// exactly one `Finish` or `Error`. Dropping the returned stream releases
    /// the body without emitting anything further.
    pub fn drive<S, B, E>(self, body: S) -> EventStream
    where
        S: Stream<Item = Result<B, E>> + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let metadata = self.metadata_event();
        let Self {
            backend_id,
            cancellation,
            ..
        } = self;

        Box::pin(stream! {
            yield metadata;

            let mut body = Box::pin(body);
            let mut decoder = FrameDecoder::default();
            let mut translator = EventTranslator::default();

            loop {
                let next = match await_or_cancel(body.next(), cancellation.as_ref()).await {
                    Ok(next) => next,
                    Err(_) => {
                        debug!(backend_id = %backend_id, "stream cancelled while reading");
                        yield StreamEvent::error(CANCELLED_MESSAGE);
                        return;
                    }
                };
                let chunk = match next {
                    Some(Ok(chunk)) => chunk,
                    Some(Err(error)) => {
                        warn!(backend_id = %backend_id, %error, "stream read failed");
                        yield StreamEvent::error(format!("stream read failed: {error}"));
                        return;
                    }
                    None => break,
                };

                for frame in decoder.feed(chunk.as_ref()) {
                    let Translated::Emit(events) = translator.translate(&frame) else {
                        continue;
                    };
                    for event in events {
                        if is_cancelled(cancellation.as_ref()) {
                            debug!(backend_id = %backend_id, "stream cancelled mid-chunk");
                            yield StreamEvent::error(CANCELLED_MESSAGE);
                            return;
                        }
                        yield event;
                    }
                }
                if decoder.is_closed() {
                    debug!(backend_id = %backend_id, "sentinel received");
                    break;
                }
            }

            if is_cancelled(cancellation.as_ref()) {
                yield StreamEvent::error(CANCELLED_MESSAGE);
                return;
            }

            decoder.finish();
            drop(body);

            let finish = translator.finish_event();
            info!(backend_id = %backend_id, ?finish, "stream finished");
            yield finish;
        })
    }

    /// Decode an HTTP response, turning a non-success status into a single
    /// `Error` derived from the response body.
    pub fn from_response(self, response: Response) -> EventStream {
        let status = response.status();
        if status.is_success() {
            return self.drive(response.bytes_stream());
        }

        let metadata = self.metadata_event();
        let Self {
            backend_id,
            cancellation,
            ..
        } = self;

        Box::pin(stream! {
            yield metadata;

            let body = match await_or_cancel(response.text(), cancellation.as_ref()).await {
                Ok(body) => body.unwrap_or_default(),
                Err(_) => {
                    yield StreamEvent::error(CANCELLED_MESSAGE);
                    return;
                }
            };
            let message = parse_error_message(status, &body);
            warn!(backend_id = %backend_id, %status, %message, "backend rejected request");
            yield StreamEvent::error(message);
        })
    }

    /// A connection that failed before any body could be read.
    pub fn fail(self, message: impl Into<String>) -> EventStream {
        let events = vec![self.metadata_event(), StreamEvent::error(message)];
        Box::pin(futures_util::stream::iter(events))
    }
}

pub(crate) fn is_cancelled(cancellation: Option<&CancellationSignal>) -> bool {
    cancellation.is_some_and(|token| token.load(Ordering::Acquire))
}

pub(crate) async fn await_or_cancel<F>(
    future: F,
    cancellation: Option<&CancellationSignal>,
) -> Result<F::Output, InferenceApiError>
where
    F: Future,
{
    if cancellation.is_none() {
        return Ok(future.await);
    }

    let mut future = Box::pin(future);

    loop {
        if is_cancelled(cancellation) {
            return Err(InferenceApiError::Cancelled);
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(cancellation) {
                return Err(InferenceApiError::Cancelled);
            }
            return Ok(output);
        }
    }
}

fn current_epoch_ms() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    u64::try_from(now.as_millis()).unwrap_or(u64::MAX)
}
