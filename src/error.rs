/// Centralized error types for the quote pipeline
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    // Request Errors
    #[error("Unsupported range: {0} (expected one of 1D, 1W, 1M)")]
    UnsupportedRange(String),

    #[error("Missing symbol parameter")]
    MissingSymbol,

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    // Quote Errors
    #[error("Price missing for {0}")]
    MissingPrice(String),

    #[error("Invalid price for {symbol}: {value}")]
    InvalidPrice { symbol: String, value: String },

    #[error("Invalid timestamp for {symbol}: {value}")]
    InvalidTimestamp { symbol: String, value: String },

    #[error("Upstream fetch failed for {symbol}: {message}")]
    UpstreamFetch { symbol: String, message: String },

    #[error("Upstream API error: {status} - {message}")]
    UpstreamApi { status: u16, message: String },

    // Network Errors
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    // Persistence Errors
    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Deserialization failed: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("File I/O error: {0}")]
    FileError(#[from] std::io::Error),

    // Archive Errors
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Missing archive column: {0}")]
    MissingColumn(String),

    #[error("Invalid archive column type: {0}")]
    InvalidColumnType(String),

    // Control Errors
    #[error("Notification failed: {0}")]
    Notification(String),

    // Configuration Errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] ::config::ConfigError),

    // Generic Errors
    #[error("Internal error: {0}")]
    InternalError(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Errors worth retrying on the next polling cycle or flush interval
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PipelineError::UpstreamFetch { .. }
                | PipelineError::UpstreamApi { .. }
                | PipelineError::HttpError(_)
                | PipelineError::Persistence(_)
                | PipelineError::FileError(_)
        )
    }

    /// Errors caused by the caller's request rather than by the system
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PipelineError::UnsupportedRange(_)
                | PipelineError::MissingSymbol
                | PipelineError::InvalidParameter(_)
        )
    }

    /// HTTP status a transport layer should answer with
    pub fn status_code(&self) -> u16 {
        if self.is_client_error() {
            400
        } else {
            500
        }
    }

    /// Get error code for logging/monitoring
    pub fn error_code(&self) -> &str {
        match self {
            PipelineError::UnsupportedRange(_) => "REQ_001",
            PipelineError::MissingSymbol => "REQ_002",
            PipelineError::InvalidParameter(_) => "REQ_003",
            PipelineError::MissingPrice(_) => "QUOTE_001",
            PipelineError::InvalidPrice { .. } => "QUOTE_002",
            PipelineError::InvalidTimestamp { .. } => "QUOTE_003",
            PipelineError::UpstreamFetch { .. } => "QUOTE_004",
            PipelineError::UpstreamApi { .. } => "QUOTE_005",
            PipelineError::HttpError(_) => "NET_001",
            PipelineError::Persistence(_) => "STORE_001",
            PipelineError::ObjectNotFound(_) => "STORE_002",
            PipelineError::DeserializationError(_) => "STORE_003",
            PipelineError::FileError(_) => "FILE_001",
            PipelineError::Arrow(_) => "ARCH_001",
            PipelineError::Parquet(_) => "ARCH_002",
            PipelineError::MissingColumn(_) => "ARCH_003",
            PipelineError::InvalidColumnType(_) => "ARCH_004",
            PipelineError::Notification(_) => "CTRL_001",
            PipelineError::ConfigError(_) => "CFG_001",
            PipelineError::ConfigSource(_) => "CFG_002",
            PipelineError::InternalError(_) => "INT_001",
        }
    }
}
