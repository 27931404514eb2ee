use thiserror::Error;

/// Application-wide error types.
///
/// This enum represents the errors that stop an operation outright. Per-batch
/// failures during a sync are *not* represented here: they are recorded as
/// [`BatchOutcome::Failure`](crate::batch::BatchOutcome) values and folded
/// into the run statistics instead of being raised.
///
/// # Error Conversion
///
/// Most errors automatically convert from their source types using the `#[from]` attribute:
/// - `serde_json::Error` → `AppError::SerializationError`
/// - `csv::Error` → `AppError::CsvError`
/// - `std::io::Error` → `AppError::Io`
///
/// # Examples
///
/// ```no_run
/// use billsync_core::error::AppError;
///
/// fn example() -> Result<(), AppError> {
///     Err(AppError::Generic("Something went wrong".to_string()))
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP client request failed.
    ///
    /// This error occurs when HTTP requests fail for reasons other than
    /// connectivity, such as an unreadable response body.
    #[error("API Client error: {0}")]
    ClientError(String),

    /// The credential exchange did not yield a usable access token.
    ///
    /// Carries the identity provider's error description. Fatal for a sync
    /// run: nothing is mutated once this is returned.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// A read query against the target table returned a non-success status.
    #[error("Query failed with HTTP {status}: {detail}")]
    QueryFailed { status: u16, detail: String },

    /// JSON serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The tabular report could not be parsed.
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// Reading a report or prompting the operator failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A caller-supplied date did not match `YYYY-MM-DD`.
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    /// Destination configuration is missing a required value.
    ///
    /// The sync command treats this as "skip the upload", not as a failure.
    #[error("Configuration incomplete: {0} is not set")]
    ConfigIncomplete(String),

    /// Network or connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timeout.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded. Please wait and try again.")]
    RateLimitExceeded,

    /// Generic application error for cases not covered by specific variants.
    #[error("Error: {0}")]
    Generic(String),
}

impl AppError {
    /// Returns a user-friendly error message suitable for CLI output.
    pub fn user_message(&self) -> String {
        match self {
            AppError::AuthenticationFailed(description) => {
                format!(
                    "Could not sign in to Dataverse: {}\n   Check DATAVERSE_USERNAME and DATAVERSE_PASSWORD.",
                    description
                )
            }
            AppError::QueryFailed { status, .. } if *status == 401 || *status == 403 => {
                "Dataverse rejected the query.\n   The account may lack read access to the table."
                    .to_string()
            }
            AppError::ClientError(msg) => {
                if msg.contains("timeout") || msg.contains("timed out") {
                    "Request timed out. Dataverse may be slow or unreachable.\n   Try again later."
                        .to_string()
                } else {
                    format!("API error: {}", msg)
                }
            }
            AppError::ConfigIncomplete(field) => {
                format!(
                    "{} is not configured.\n   Set it in the environment or the .env file.",
                    field
                )
            }
            AppError::InvalidDate(value) => {
                format!("Invalid date: {}\n   Expected format: YYYY-MM-DD", value)
            }
            AppError::NetworkError(msg) => {
                format!("Network error: {}\n   Check your internet connection.", msg)
            }
            AppError::Timeout(secs) => {
                format!(
                    "Request timed out after {} seconds.\n   The server may be overloaded. Try again later.",
                    secs
                )
            }
            AppError::RateLimitExceeded => {
                "Too many requests. Please wait a moment and try again.".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Returns true if this error is retryable.
    ///
    /// # Examples
    ///
    /// ```
    /// use billsync_core::error::AppError;
    ///
    /// let err = AppError::NetworkError("connection reset".to_string());
    /// assert!(err.is_retryable());
    ///
    /// let err = AppError::AuthenticationFailed("AADSTS50126".to_string());
    /// assert!(!err.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) | AppError::RateLimitExceeded => true,
            AppError::QueryFailed { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
