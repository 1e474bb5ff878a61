//! Streaming response handling for Ollama-compatible servers
//!
//! `/api/generate` answers with newline-delimited JSON. Lines are cut from
//! the byte stream with a delimiter codec, so a JSON object split across
//! network reads is reassembled before parsing.

use std::io;

use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use reqwest::{RequestBuilder, StatusCode};
use serde::Deserialize;
use tokio_util::{
    codec::{AnyDelimiterCodec, AnyDelimiterCodecError, FramedRead},
    io::StreamReader,
};
use tracing::{debug, trace, warn};

use crate::{error::GenerationError, ports::TextStream};

type BodyReader = StreamReader<BoxStream<'static, io::Result<Bytes>>, Bytes>;

/// Longest stream line accepted before the body is abandoned
const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// One line of the generate stream
#[derive(Debug, Deserialize)]
struct GenerateStreamChunk {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    done: bool,
}

/// Text fragments decoded from a streaming response body
pub struct ResponseFragments {
    lines: FramedRead<BodyReader, AnyDelimiterCodec>,
}

impl std::fmt::Debug for ResponseFragments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseFragments").finish_non_exhaustive()
    }
}

impl ResponseFragments {
    /// Decode fragments from a raw byte stream
    pub fn from_byte_stream<S>(body: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self::with_max_line_length(body, MAX_LINE_LENGTH)
    }

    fn with_max_line_length<S>(body: S, max_length: usize) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        let reader = StreamReader::new(body.boxed());
        let codec = AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), Vec::new(), max_length);

        Self {
            lines: FramedRead::new(reader, codec),
        }
    }

    /// Decode fragments from an HTTP response body
    pub fn from_response(response: reqwest::Response) -> Self {
        Self::from_byte_stream(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(io::Error::other)),
        )
    }

    /// Next non-empty fragment, in arrival order
    ///
    /// Empty and malformed lines are skipped. Returns `Ok(None)` once the
    /// body is exhausted and `Err` if reading the body failed.
    pub async fn next_fragment(&mut self) -> Result<Option<String>, GenerationError> {
        while let Some(line) = self.lines.next().await {
            let line = line.map_err(body_error)?;
            if let Some(fragment) = parse_fragment(&line) {
                return Ok(Some(fragment));
            }
        }
        Ok(None)
    }
}

/// Send a streaming request and check the status line
pub(crate) async fn open(request: RequestBuilder) -> Result<ResponseFragments, GenerationError> {
    let response = request.send().await?;

    let status = response.status();
    if status != StatusCode::OK {
        let body = response.text().await.unwrap_or_default();
        warn!(status = %status, body = %body, "Generation request failed");
        return Err(GenerationError::Http {
            status: status.as_u16(),
            body,
        });
    }

    Ok(ResponseFragments::from_response(response))
}

/// Lazily send `request` and forward each fragment as it arrives
///
/// Any failure ends the stream with one `Error: ...` element.
pub(crate) fn fragment_stream(request: RequestBuilder) -> TextStream {
    enum State {
        Connect(RequestBuilder),
        Receive(ResponseFragments),
        Done,
    }

    let fragments = stream::unfold(State::Connect(request), |state| async move {
        let mut fragments = match state {
            State::Connect(request) => match open(request).await {
                Ok(fragments) => fragments,
                Err(e) => return Some((error_fragment(&e), State::Done)),
            },
            State::Receive(fragments) => fragments,
            State::Done => return None,
        };

        match fragments.next_fragment().await {
            Ok(Some(fragment)) => Some((fragment, State::Receive(fragments))),
            Ok(None) => {
                debug!("Generation stream finished");
                None
            },
            Err(e) => Some((error_fragment(&e), State::Done)),
        }
    });

    Box::pin(fragments)
}

/// Fragment reporting a failure to a streaming consumer
pub(crate) fn error_fragment(error: &GenerationError) -> String {
    format!("Error: {error}")
}

fn body_error(err: AnyDelimiterCodecError) -> GenerationError {
    match err {
        AnyDelimiterCodecError::Io(e) => GenerationError::from(e),
        AnyDelimiterCodecError::MaxChunkLengthExceeded => {
            warn!(max_length = MAX_LINE_LENGTH, "Stream line too long, abandoning response");
            GenerationError::Other("stream line exceeds maximum length".to_string())
        },
    }
}

/// Parse one NDJSON line into its text fragment
fn parse_fragment(line: &[u8]) -> Option<String> {
    let Ok(text) = std::str::from_utf8(line) else {
        trace!("Skipping non UTF-8 stream line");
        return None;
    };

    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    trace!(line = %text, "Parsing stream chunk");

    match serde_json::from_str::<GenerateStreamChunk>(text) {
        Ok(chunk) => {
            if chunk.done {
                trace!("Received final stream chunk");
            }
            chunk.response.filter(|fragment| !fragment.is_empty())
        },
        Err(e) => {
            trace!(error = %e, "Skipping malformed stream line");
            None
        },
    }
}
