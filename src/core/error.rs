use thiserror::Error;

/// Centralized error types for the application
///
/// Infrastructure failures are converted into this enum for consistent
/// handling. Uses `thiserror` for automatic conversions and display
/// formatting. Expected-path conditions in the parse and download pipelines
/// are NOT signaled through here; those use the tagged [`ParseError`] and
/// [`DownloadError`] enums below so callers can match on them without
/// unwinding.
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Database connection pool errors
    #[error("Database pool error: {0}")]
    DatabasePool(#[from] r2d2::Error),

    /// HTTP/Fetch errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// URL parsing errors
    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    /// Transfer errors with a persisted taxonomy
    #[error("Download error: {0}")]
    Download(DownloadError),

    /// Link parse pipeline errors
    #[error("Parse error: {0}")]
    Parse(ParseError),

    /// Anyhow errors (for general error handling)
    #[error("Application error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;

/// Classified outcome of the link-parse pipeline.
///
/// Every expected failure of "give me the media behind this link" maps to
/// exactly one variant; the user-facing message is a pure function of the
/// variant so it can be re-rendered from stored state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The renderer timed out or failed to load the page at all.
    #[error("page render timed out")]
    NetworkTimeout,

    /// The primary content marker is missing: the page template changed.
    #[error("page structure changed, cannot parse")]
    StructureChanged,

    /// Structure intact but the post carries no downloadable media.
    #[error("no media found in post")]
    Empty,

    /// Anything unexpected, carrying the original reason when known.
    #[error("unknown parse error: {}", .0.as_deref().unwrap_or("no detail"))]
    Unknown(Option<String>),
}

impl ParseError {
    /// Stable tag for logs and storage.
    pub fn kind(&self) -> &'static str {
        match self {
            ParseError::NetworkTimeout => "NetworkTimeout",
            ParseError::StructureChanged => "StructureChanged",
            ParseError::Empty => "Empty",
            ParseError::Unknown(_) => "Unknown",
        }
    }

    /// Human-readable message for presentation.
    pub fn to_message(&self) -> String {
        match self {
            ParseError::NetworkTimeout => "Timed out loading the post".to_string(),
            ParseError::StructureChanged => {
                "The page layout changed and cannot be parsed right now".to_string()
            }
            ParseError::Empty => "No media found in this post".to_string(),
            ParseError::Unknown(reason) => reason
                .clone()
                .unwrap_or_else(|| "Unknown parse error".to_string()),
        }
    }
}

/// Classified outcome of a single transfer.
///
/// Persisted to the task store as (kind, message, code) so the error survives
/// process restarts. The manager never auto-retries on these; retry is an
/// explicit `resume` by the caller. The background executor maps them to its
/// host scheduler's retry decision instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadError {
    /// Non-2xx HTTP response.
    #[error("HTTP {0}")]
    Http(u16),

    /// The response carried no bytes.
    #[error("empty response body")]
    EmptyBody,

    /// Transport or filesystem failure mid-transfer.
    #[error("io error: {0}")]
    Io(String),

    /// Anything else.
    #[error("unknown download error: {0}")]
    Unknown(String),
}

impl DownloadError {
    /// Stable tag persisted in the task store's `error_kind` column.
    pub fn kind(&self) -> &'static str {
        match self {
            DownloadError::Http(_) => "Http",
            DownloadError::EmptyBody => "EmptyBody",
            DownloadError::Io(_) => "Io",
            DownloadError::Unknown(_) => "Unknown",
        }
    }

    /// Numeric code persisted alongside the kind, when one exists.
    pub fn code(&self) -> Option<u16> {
        match self {
            DownloadError::Http(code) => Some(*code),
            _ => None,
        }
    }

    /// Human-readable message for presentation.
    pub fn to_message(&self) -> String {
        match self {
            DownloadError::Http(code) => format!("Download failed with HTTP {}", code),
            DownloadError::EmptyBody => "Download returned no content".to_string(),
            DownloadError::Io(reason) => reason.clone(),
            DownloadError::Unknown(reason) => reason.clone(),
        }
    }
}

impl From<DownloadError> for AppError {
    fn from(err: DownloadError) -> Self {
        AppError::Download(err)
    }
}

impl From<ParseError> for AppError {
    fn from(err: ParseError) -> Self {
        AppError::Parse(err)
    }
}
