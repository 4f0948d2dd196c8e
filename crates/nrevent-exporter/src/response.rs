//! Bounded reading of HTTP response bodies.
//!
//! Ingestion endpoints are untrusted: a misbehaving server may declare a huge
//! body or stream one without a length. Every read here is capped at
//! [`MAX_HTTP_RESPONSE_READ_BYTES`].

use reqwest::Response;

/// Upper bound on response body bytes read or drained per request.
pub const MAX_HTTP_RESPONSE_READ_BYTES: usize = 64 * 1024;

/// Reads the response body, up to [`MAX_HTTP_RESPONSE_READ_BYTES`].
///
/// A declared length of zero returns immediately without touching the body.
/// When the length is unknown or larger than the cap, reading stops at the
/// cap. A body that ends before the expected number of bytes is returned as
/// read; only transport errors are propagated.
///
/// # Errors
///
/// Returns the underlying error if reading a body chunk fails.
pub async fn read_response_body(response: &mut Response) -> Result<Vec<u8>, reqwest::Error> {
    let declared = response.content_length();
    if declared == Some(0) {
        return Ok(Vec::new());
    }

    let max_read = max_read_len(declared);
    let mut body = Vec::with_capacity(max_read.min(8 * 1024));

    while body.len() < max_read {
        match response.chunk().await? {
            Some(chunk) => {
                let take = chunk.len().min(max_read - body.len());
                body.extend_from_slice(&chunk[..take]);
            }
            None => break,
        }
    }

    Ok(body)
}

/// Discards up to [`MAX_HTTP_RESPONSE_READ_BYTES`] of whatever body remains.
///
/// Errors are ignored; the response is about to be dropped either way.
pub async fn drain_response_body(response: &mut Response) {
    let mut drained = 0;
    while drained < MAX_HTTP_RESPONSE_READ_BYTES {
        match response.chunk().await {
            Ok(Some(chunk)) => drained += chunk.len(),
            Ok(None) | Err(_) => break,
        }
    }
}

fn max_read_len(declared: Option<u64>) -> usize {
    match declared {
        Some(len) if len > 0 && len <= MAX_HTTP_RESPONSE_READ_BYTES as u64 => len as usize,
        _ => MAX_HTTP_RESPONSE_READ_BYTES,
    }
}
