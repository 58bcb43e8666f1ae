// Line framing over a backend response body
//
// Both backend dialects stream line-oriented text (NDJSON or SSE). Every byte
// received is kept so the exchange log shows exactly what the backend sent.

use axum::body::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::io;
use tokio_util::sync::CancellationToken;

pub struct LineStream {
    chunks: BoxStream<'static, io::Result<Bytes>>,
    pending: Vec<u8>,
    raw: Vec<u8>,
    finished: bool,
}

impl LineStream {
    pub fn new(chunks: BoxStream<'static, io::Result<Bytes>>) -> Self {
        Self {
            chunks,
            pending: Vec::new(),
            raw: Vec::new(),
            finished: false,
        }
    }

    pub fn from_response(response: reqwest::Response) -> Self {
        Self::new(response.bytes_stream().map(|chunk| chunk.map_err(io::Error::other)).boxed())
    }

    /// Next complete line without its terminator.
    ///
    /// Returns `None` at end of body, on a read error, or once `cancel` fires.
    /// An unterminated trailing line is returned before the end is reported.
    pub async fn next_line(&mut self, cancel: &CancellationToken) -> Option<String> {
        loop {
            if let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
                let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Some(String::from_utf8_lossy(&line).into_owned());
            }

            if self.finished {
                if self.pending.is_empty() {
                    return None;
                }
                let line = std::mem::take(&mut self.pending);
                return Some(String::from_utf8_lossy(&line).trim_end_matches('\r').to_string());
            }

            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                chunk = self.chunks.next() => chunk,
            };

            match chunk {
                Some(Ok(bytes)) => {
                    self.raw.extend_from_slice(&bytes);
                    self.pending.extend_from_slice(&bytes);
                }
                Some(Err(e)) => {
                    tracing::warn!("[PROXY] Error reading backend stream: {}", e);
                    self.finished = true;
                }
                None => self.finished = true,
            }
        }
    }

    /// Everything received so far, framing included
    pub fn into_transcript(self) -> String {
        String::from_utf8_lossy(&self.raw).into_owned()
    }
}

/// Payload of an SSE `data:` line
pub fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:")
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
}

#[cfg(test)]
pub(crate) fn lines_from(chunks: &[&str]) -> LineStream {
    let chunks: Vec<io::Result<Bytes>> = chunks
        .iter()
        .map(|c| Ok(Bytes::from(c.to_string())))
        .collect();
    LineStream::new(futures::stream::iter(chunks).boxed())
}
