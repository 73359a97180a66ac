//! Server-sent-events plumbing for streaming adapters.
//!
//! [`SseBuffer`] turns raw body chunks into complete `data:` payloads;
//! [`sse_response_stream`] drives a [`ChunkParser`] over a response body and
//! guarantees the resulting stream ends with exactly one `Done`.

use crate::util::from_reqwest;
use asp_domain::error::Result;
use asp_domain::stream::{BoxStream, StreamEvent};

/// Provider-specific decoder for `data:` payloads.
pub(crate) trait ChunkParser: Send + 'static {
    /// Decode one payload into zero or more events.
    fn on_data(&mut self, data: &str) -> Vec<Result<StreamEvent>>;

    /// Called once when the body closes without the parser having produced
    /// a `Done`; returns the terminal event built from accumulated state.
    fn finish(&mut self) -> StreamEvent;
}

// ── Buffer ──────────────────────────────────────────────────────────

/// Accumulates body bytes and yields complete `data:` payloads.
///
/// Events are delimited by a blank line. Non-`data:` fields (`event:`,
/// `id:`, `retry:`) and comment lines are skipped.
#[derive(Debug, Default)]
pub(crate) struct SseBuffer {
    pending: String,
}

impl SseBuffer {
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending
            .push_str(&String::from_utf8_lossy(bytes).replace("\r\n", "\n"));
        let mut out = Vec::new();
        while let Some(pos) = self.pending.find("\n\n") {
            let block: String = self.pending.drain(..pos + 2).collect();
            out.extend(data_payloads(&block));
        }
        out
    }

    /// Flush whatever is left once the body is closed.
    pub(crate) fn finish(&mut self) -> Vec<String> {
        let rest = std::mem::take(&mut self.pending);
        data_payloads(&rest)
    }
}

fn data_payloads(block: &str) -> Vec<String> {
    block
        .lines()
        .filter_map(|line| line.trim().strip_prefix("data:"))
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(String::from)
        .collect()
}

// ── Stream ──────────────────────────────────────────────────────────

pub(crate) fn sse_response_stream<P: ChunkParser>(
    response: reqwest::Response,
    mut parser: P,
) -> BoxStream<'static, Result<StreamEvent>> {
    let stream = async_stream::stream! {
        let mut response = response;
        let mut buffer = SseBuffer::default();

        'body: loop {
            let payloads = match response.chunk().await {
                Ok(Some(bytes)) => buffer.push(&bytes),
                Ok(None) => {
                    for data in buffer.finish() {
                        for event in parser.on_data(&data) {
                            let done = matches!(event, Ok(StreamEvent::Done { .. }));
                            yield event;
                            if done {
                                break 'body;
                            }
                        }
                    }
                    yield Ok(parser.finish());
                    break;
                }
                Err(e) => {
                    yield Err(from_reqwest(e));
                    break;
                }
            };

            for data in payloads {
                for event in parser.on_data(&data) {
                    let done = matches!(event, Ok(StreamEvent::Done { .. }));
                    yield event;
                    if done {
                        break 'body;
                    }
                }
            }
        }
    };

    Box::pin(stream)
}
