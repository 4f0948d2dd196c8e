//! Error types for the event exporter.

use crate::config::ConfigError;
use crate::exporter::ExportError;
use thiserror::Error;

/// A specialised Result type for exporter operations.
pub type Result<T> = std::result::Result<T, ExporterError>;

/// Errors that can occur while setting up or running the exporter.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ExporterError {
    /// Configuration sources could not be loaded.
    #[error("failed to load configuration")]
    Load(#[source] Box<figment::Error>),

    /// Configuration loaded but is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// HTTP client could not be created.
    #[error("failed to create HTTP client")]
    Client(#[source] reqwest::Error),

    /// Export error.
    #[error(transparent)]
    Export(#[from] ExportError),
}

impl From<figment::Error> for ExporterError {
    fn from(err: figment::Error) -> Self {
        ExporterError::Load(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_config_error_is_transparent() {
        let err = ExporterError::from(ConfigError::MissingEndpoint);
        assert_eq!(
            err.to_string(),
            "either endpoint or metrics_endpoint must be specified"
        );
    }

    #[test]
    fn test_figment_error_is_boxed() {
        let err = ExporterError::from(figment::Error::from("bad value".to_string()));
        assert!(matches!(err, ExporterError::Load(_)));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_export_error_passes_through() {
        let err = ExporterError::from(ExportError::Cancelled);
        assert_eq!(err.to_string(), "export cancelled");
    }
}
