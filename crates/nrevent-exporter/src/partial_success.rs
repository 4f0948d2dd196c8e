//! Partial-success decoding for 2xx responses.
//!
//! A server may accept a request but drop some of its data points. It reports
//! this in an `ExportMetricsServiceResponse` body, encoded as protobuf or
//! JSON. Such a report is a warning and never turns a 2xx into a failure.

use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceResponse;
use prost::Message;
use serde::{Deserialize, Deserializer};

/// Protobuf content type.
pub const PROTOBUF_CONTENT_TYPE: &str = "application/x-protobuf";
/// JSON content type.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Data the server reported as rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialSuccessReport {
    /// Server-provided explanation.
    pub error_message: String,
    /// Number of data points the server dropped.
    pub rejected_count: i64,
}

impl PartialSuccessReport {
    /// Returns true when the server reported nothing.
    pub fn is_empty(&self) -> bool {
        self.error_message.is_empty() && self.rejected_count == 0
    }
}

/// Failure to decode a body whose content type was recognised.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum PartialSuccessError {
    /// Protobuf body did not decode.
    #[error("error parsing protobuf response")]
    Protobuf(#[source] prost::DecodeError),

    /// JSON body did not decode.
    #[error("error parsing json response")]
    Json(#[source] serde_json::Error),
}

/// Signature shared by partial-success decoders, one per signal type.
pub type PartialSuccessHandler =
    fn(&[u8], Option<&str>) -> Result<Option<PartialSuccessReport>, PartialSuccessError>;

/// Decodes a metrics partial-success body.
///
/// Returns `Ok(None)` for an empty body, an unsupported content type, or a
/// report with nothing in it.
///
/// # Errors
///
/// Returns [`PartialSuccessError`] if a protobuf or JSON body is malformed.
pub fn decode_metrics_partial_success(
    body: &[u8],
    content_type: Option<&str>,
) -> Result<Option<PartialSuccessReport>, PartialSuccessError> {
    if body.is_empty() {
        return Ok(None);
    }

    let report = match content_type.map(media_type).as_deref() {
        Some(PROTOBUF_CONTENT_TYPE) => {
            let response =
                ExportMetricsServiceResponse::decode(body).map_err(PartialSuccessError::Protobuf)?;
            response
                .partial_success
                .map(|partial| PartialSuccessReport {
                    error_message: partial.error_message,
                    rejected_count: partial.rejected_data_points,
                })
                .unwrap_or_default()
        }
        Some(JSON_CONTENT_TYPE) => serde_json::from_slice::<JsonExportResponse>(body)
            .map_err(PartialSuccessError::Json)?
            .into_report(),
        _ => return Ok(None),
    };

    if report.is_empty() {
        Ok(None)
    } else {
        Ok(Some(report))
    }
}

fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// JSON export response.
///
/// Accepts the OTLP shape with a nested `partialSuccess` object as well as a
/// flat object carrying the fields directly.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JsonExportResponse {
    #[serde(alias = "partialSuccess")]
    partial_success: Option<JsonPartialSuccess>,
    #[serde(flatten)]
    flat: JsonPartialSuccess,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JsonPartialSuccess {
    #[serde(alias = "errorMessage")]
    error_message: Option<String>,
    #[serde(alias = "rejectedDataPoints", deserialize_with = "int64")]
    rejected_data_points: Option<i64>,
}

impl JsonExportResponse {
    fn into_report(self) -> PartialSuccessReport {
        let partial = self.partial_success.unwrap_or(self.flat);
        PartialSuccessReport {
            error_message: partial.error_message.unwrap_or_default(),
            rejected_count: partial.rejected_data_points.unwrap_or_default(),
        }
    }
}

/// OTLP JSON encodes int64 as either a number or a decimal string.
fn int64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(i64),
        Text(String),
    }

    match Option::<Repr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Repr::Number(n)) => Ok(Some(n)),
        Some(Repr::Text(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}
