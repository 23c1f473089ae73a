//! Whdbg Common - Shared protocol library for the webhook debugger
//!
//! This crate contains the wire types exchanged with the whdbg backend: the
//! captured request records pushed over the listener stream, the response
//! override sent to the update endpoint, and the status code catalog used by
//! the override editor.

pub mod status;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Failed to decode record: {source}")]
    Decode {
        #[source]
        source: serde_json::Error,
        /// The line that failed, without its neighbours
        line: String,
    },

    #[error("Frame is not valid UTF-8")]
    InvalidUtf8,

    #[error("Empty frame")]
    EmptyFrame,
}

impl ProtocolError {
    /// Offending line of a batched frame, when the failure is tied to one
    pub fn line(&self) -> Option<&str> {
        match self {
            ProtocolError::Decode { line, .. } => Some(line),
            _ => None,
        }
    }
}

/// One captured inbound HTTP request, as delivered by the listener stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRecord {
    /// Server-assigned capture time (RFC 1123)
    pub timestamp: String,

    /// Path the webhook was sent to
    pub url: String,

    /// Request line summary
    pub request: RequestLine,

    /// Raw rendering of the full request (headers + body)
    #[serde(default)]
    pub dump: String,

    /// Listener the request was captured for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listener: Option<String>,

    /// Capture time in unix seconds
    #[serde(
        rename = "unixtimestamp",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub unix_time: Option<i64>,
}

/// Method, host and protocol of a captured request.
///
/// The backend serializes these with capitalised keys; any other keys it
/// includes in the nested object (headers, cookies, body, ...) are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLine {
    #[serde(rename = "Method")]
    pub method: String,

    #[serde(rename = "Host", default)]
    pub host: String,

    #[serde(rename = "Proto", default)]
    pub proto: String,
}

impl RequestRecord {
    /// Lines of the raw dump, for expanded display
    pub fn dump_lines(&self) -> impl Iterator<Item = &str> {
        self.dump.lines()
    }

    /// Full URL the request was sent to (`https://<host><url>`)
    pub fn full_url(&self) -> String {
        format!("https://{}{}", self.request.host, self.url)
    }
}

/// Response behaviour the backend applies to future requests on a listener
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseOverride {
    /// Body to respond with. Empty reflects the original request body.
    #[serde(rename = "responseBody")]
    pub response_body: String,

    /// Status code to respond with
    #[serde(rename = "statusCode")]
    pub status_code: u16,
}

impl Default for ResponseOverride {
    fn default() -> Self {
        Self {
            response_body: String::new(),
            status_code: status::DEFAULT_STATUS_CODE,
        }
    }
}

impl ResponseOverride {
    pub fn new(status_code: u16, response_body: impl Into<String>) -> Self {
        Self {
            response_body: response_body.into(),
            status_code,
        }
    }

    /// Whether the backend will echo the request body back
    pub fn reflects_body(&self) -> bool {
        self.response_body.is_empty()
    }
}

/// Decode one text frame from the listener stream.
///
/// The backend flushes queued records into a single frame separated by
/// newlines, so a frame yields one result per non-blank line. A JSON `null`
/// line is a placeholder and decodes to `Ok(None)`.
pub fn decode_frame(frame: &str) -> Vec<Result<Option<RequestRecord>, ProtocolError>> {
    let results: Vec<_> = frame
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            serde_json::from_str::<Option<RequestRecord>>(line).map_err(|source| {
                ProtocolError::Decode {
                    source,
                    line: line.to_string(),
                }
            })
        })
        .collect();

    if results.is_empty() {
        return vec![Err(ProtocolError::EmptyFrame)];
    }

    results
}

/// Decode a binary frame, which must carry UTF-8 text
pub fn decode_binary_frame(data: &[u8]) -> Vec<Result<Option<RequestRecord>, ProtocolError>> {
    match std::str::from_utf8(data) {
        Ok(text) => decode_frame(text),
        Err(_) => vec![Err(ProtocolError::InvalidUtf8)],
    }
}

/// Path of the listener stream endpoint
pub fn stream_path(listener: &str) -> String {
    format!("{}{}", constants::STREAM_PATH_PREFIX, listener)
}

/// Path of the override update endpoint
pub fn update_path(listener: &str) -> String {
    format!("/api/{}/update", listener)
}

/// Constants for the protocol
pub mod constants {
    /// Production backend
    pub const PRODUCTION_SERVER_URL: &str = "https://whdbg.dev";

    /// Backend started locally with the default port
    pub const LOCAL_SERVER_URL: &str = "http://localhost:8080";

    /// Prefix of the listener stream endpoint
    pub const STREAM_PATH_PREFIX: &str = "/ws/";

    /// Timeout for override pushes
    pub const PUSH_TIMEOUT_SECONDS: u64 = 10;
}
