//! Error types for the watermark-attacks crate.

/// Errors that abort a whole run (or a whole collaborator batch).
///
/// Per-image problems never surface here; they are recorded as
/// [`Failure`](crate::report::Failure)s in the run report instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The scenario catalog is misconfigured.
    #[error("catalog configuration error: {0}")]
    Catalog(#[from] CatalogError),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The output container format is not supported.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// An error occurred during image processing (load, save, encode).
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single transform operator.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// The input raster has no pixels.
    #[error("image has zero area ({width}x{height})")]
    EmptyImage {
        /// Image width in pixels.
        width: u32,
        /// Image height in pixels.
        height: u32,
    },

    /// An operator parameter is outside its valid range.
    #[error("invalid {operator} parameter: {reason}")]
    InvalidParameter {
        /// Operator name.
        operator: &'static str,
        /// What is wrong with the parameter.
        reason: String,
    },

    /// The operator would produce an image with no pixels.
    #[error("{operator} produces an empty image from {width}x{height}")]
    Degenerate {
        /// Operator name.
        operator: &'static str,
        /// Input width in pixels.
        width: u32,
        /// Input height in pixels.
        height: u32,
    },

    /// Encoding or decoding the intermediate buffer failed.
    #[error("{operator} codec round-trip failed: {source}")]
    Codec {
        /// Operator name.
        operator: &'static str,
        /// Underlying codec error.
        #[source]
        source: image::ImageError,
    },
}

/// A transform failure located inside a scenario's step chain.
#[derive(Debug, thiserror::Error)]
#[error("step {index} ({label}) failed: {source}")]
pub struct StepError {
    /// Zero-based index of the failing step.
    pub index: usize,
    /// Human-readable label of the failing step.
    pub label: String,
    /// The operator error.
    #[source]
    pub source: TransformError,
}

/// Catalog construction errors. Always fatal before any image is processed.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Two scenarios share an identifier.
    #[error("duplicate scenario identifier `{0}`")]
    DuplicateScenario(String),

    /// A scenario has no steps.
    #[error("scenario `{0}` has no steps")]
    EmptyScenario(String),

    /// The identifier cannot be used as an output subdirectory name.
    #[error("scenario identifier `{0}` is not a valid directory name")]
    InvalidId(String),

    /// A step has out-of-range parameters.
    #[error("scenario `{scenario}` step {index}: {source}")]
    InvalidStep {
        /// Scenario identifier.
        scenario: String,
        /// Zero-based step index.
        index: usize,
        /// Validation error for the step's operator.
        #[source]
        source: TransformError,
    },
}

/// Error reported by a watermark embedder.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct EmbedError(pub String);

/// Error reported by an image generation service.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct GenerationError {
    /// Service error message.
    pub message: String,
    /// Whether the service rejected the call for quota or rate reasons.
    pub rate_limited: bool,
}

impl GenerationError {
    /// Build an error from a service message, classifying quota and rate
    /// limit messages by keyword.
    #[must_use]
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        let rate_limited = lower.contains("quota") || lower.contains("rate");
        Self {
            message,
            rate_limited,
        }
    }
}
