//! Error types for the export pipeline.

use thiserror::Error;

/// Result type alias for folio operations.
pub type Result<T> = std::result::Result<T, ExportError>;

/// Everything that can abort an export.
///
/// Malformed margin strings and undecodable images never show up here: they
/// are recovered locally (default margin, skipped image).
#[derive(Error, Debug)]
pub enum ExportError {
    /// The measurement collaborator failed.
    #[error("Measurement failed: {0}")]
    Measurement(String),

    /// The measurement collaborator returned a negative or non-finite height.
    #[error("Measurement returned an invalid height: {0}")]
    InvalidMeasurement(f32),

    /// The layout engine rejected the content tree.
    #[error("Layout error: {0}")]
    Layout(String),

    /// The rendering collaborator failed to produce a raster surface.
    #[error("Render error: {0}")]
    Render(String),

    /// The PDF backend failed.
    #[error("PDF error: {0}")]
    Pdf(String),

    /// The input tree or configuration could not be read.
    #[error("Invalid input: {0}")]
    Input(String),

    /// I/O error when reading inputs or writing outputs.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ExportError {
    fn from(e: serde_json::Error) -> Self {
        ExportError::Input(e.to_string())
    }
}
