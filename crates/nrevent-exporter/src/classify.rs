//! HTTP response classification.
//!
//! Maps a response status (plus headers and an optional failure body) onto
//! an [`HttpOutcome`] following the OTLP/HTTP failure rules: which codes are
//! retryable, which carry a server-suggested throttle delay, and how the
//! error message is rendered.

use prost::Message;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::fmt;
use std::time::Duration;
use tonic::Code;

/// Result of interpreting one HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpOutcome {
    /// 2xx: the request was accepted.
    Success,
    /// The request may succeed if sent again.
    Retryable {
        /// Failure details.
        error: StatusError,
        /// Server-suggested delay. Zero means "use the default backoff".
        retry_after: Duration,
    },
    /// Sending the same request again will not help.
    Permanent {
        /// Failure details.
        error: StatusError,
    },
}

/// A failed HTTP response, rendered for the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct StatusError {
    /// HTTP status code of the response.
    pub status: u16,
    /// gRPC code equivalent to the HTTP status.
    pub code: Code,
    /// Human-readable description including the request URL.
    pub message: String,
}

/// `google.rpc.Status`, the body OTLP/HTTP servers return on 4xx/5xx.
#[derive(Clone, PartialEq, Message)]
pub struct RpcStatus {
    /// gRPC status code.
    #[prost(int32, tag = "1")]
    pub code: i32,
    /// Developer-facing error message.
    #[prost(string, tag = "2")]
    pub message: String,
    /// Additional error details.
    #[prost(message, repeated, tag = "3")]
    pub details: Vec<Any>,
}

/// `google.protobuf.Any`, kept opaque.
#[derive(Clone, PartialEq, Message)]
pub struct Any {
    /// Type URL of the packed message.
    #[prost(string, tag = "1")]
    pub type_url: String,
    /// Serialised message bytes.
    #[prost(bytes = "vec", tag = "2")]
    pub value: Vec<u8>,
}

struct DetailsDisplay<'a>(&'a [Any]);

impl fmt::Display for DetailsDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, detail) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(
                f,
                "type_url:{:?} value:{} bytes",
                detail.type_url,
                detail.value.len()
            )?;
        }
        f.write_str("]")
    }
}

/// Classifies a response.
///
/// `body` is only consulted for statuses in `[400, 599]`, where it is
/// decoded as an [`RpcStatus`] on a best-effort basis.
pub fn classify(url: &str, status: u16, headers: &HeaderMap, body: Option<&[u8]>) -> HttpOutcome {
    if (200..=299).contains(&status) {
        return HttpOutcome::Success;
    }

    let rpc_status = body.and_then(|bytes| decode_status(status, bytes));
    let message = match &rpc_status {
        Some(rpc) => format!(
            "error exporting items, request to {url} responded with HTTP Status Code {status}, Message={}, Details={}",
            rpc.message,
            DetailsDisplay(&rpc.details)
        ),
        None => format!(
            "error exporting items, request to {url} responded with HTTP Status Code {status}"
        ),
    };

    let error = StatusError {
        status,
        code: code_from_http_status(status),
        message,
    };

    if is_retryable_status(status) {
        let retry_after = if is_throttle_status(status) {
            parse_retry_after(headers).unwrap_or(Duration::ZERO)
        } else {
            Duration::ZERO
        };
        HttpOutcome::Retryable { error, retry_after }
    } else {
        HttpOutcome::Permanent { error }
    }
}

/// Decodes a failure body as [`RpcStatus`].
///
/// Returns `None` outside `[400, 599]` or when the body does not decode. An
/// empty body decodes to an empty status.
pub fn decode_status(status: u16, body: &[u8]) -> Option<RpcStatus> {
    if !(400..=599).contains(&status) {
        return None;
    }
    RpcStatus::decode(body).ok()
}

/// Whether a status code is retryable under OTLP/HTTP.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 502 | 503 | 504)
}

/// Whether a status code signals server-side throttling.
fn is_throttle_status(status: u16) -> bool {
    matches!(status, 429 | 503)
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Maps an HTTP status onto the equivalent gRPC code.
pub fn code_from_http_status(status: u16) -> Code {
    match status {
        400 => Code::InvalidArgument,
        401 => Code::Unauthenticated,
        403 => Code::PermissionDenied,
        404 => Code::Unimplemented,
        429 => Code::ResourceExhausted,
        502..=504 => Code::Unavailable,
        _ => Code::Unknown,
    }
}
