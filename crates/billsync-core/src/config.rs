//! Configuration types for billsync components.
//!
//! All values are built once (by the CLI, from flags and environment) and
//! passed by reference into the components that need them. Nothing in the
//! library reads the environment.

use std::fmt;
use std::time::Duration;

use url::Url;

use crate::error::AppError;

/// Public client identifier used for the username/password token flow.
pub const DEFAULT_CLIENT_ID: &str = "51f81489-12ee-4a9e-aaae-a2591f45987d";

/// Authority accepting work or school accounts from any tenant.
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com/organizations";

/// Dataverse Web API version segment.
pub const DEFAULT_API_VERSION: &str = "v9.2";

/// Destination table and credentials.
#[derive(Clone)]
pub struct TargetConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub table_prefix: String,
    pub table_name: String,
    pub api_version: String,
    pub authority: String,
    pub client_id: String,
}

impl TargetConfig {
    /// Creates a config for `base_url` with the default `<prefix>_eacdataraws` table.
    pub fn new(base_url: &str, table_prefix: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            username: String::new(),
            password: String::new(),
            table_prefix: table_prefix.to_string(),
            table_name: format!("{}_eacdataraws", table_prefix),
            api_version: DEFAULT_API_VERSION.to_string(),
            authority: DEFAULT_AUTHORITY.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
        }
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = username.to_string();
        self.password = password.to_string();
        self
    }

    pub fn with_table_name(mut self, table_name: &str) -> Self {
        self.table_name = table_name.to_string();
        self
    }

    pub fn with_authority(mut self, authority: &str) -> Self {
        self.authority = authority.trim_end_matches('/').to_string();
        self
    }

    /// Prefixed column name, e.g. `cr834_hours` for suffix `hours`.
    pub fn field_name(&self, suffix: &str) -> String {
        format!("{}_{}", self.table_prefix, suffix)
    }

    /// Column holding the work date that scopes the sync window.
    pub fn date_field(&self) -> String {
        self.field_name("date")
    }

    /// Primary key column: the table name without its plural "s", plus "id".
    ///
    /// # Examples
    ///
    /// ```
    /// use billsync_core::TargetConfig;
    ///
    /// let config = TargetConfig::new("https://org.crm.dynamics.com", "cr834");
    /// assert_eq!(config.primary_key_field(), "cr834_eacdatarawid");
    /// ```
    pub fn primary_key_field(&self) -> String {
        let singular = self
            .table_name
            .strip_suffix('s')
            .unwrap_or(&self.table_name);
        format!("{}id", singular)
    }

    pub fn api_root(&self) -> String {
        format!("{}/api/data/{}", self.base_url, self.api_version)
    }

    /// Entity set URL, the target of create requests and queries.
    pub fn entity_set_url(&self) -> String {
        format!("{}/{}", self.api_root(), self.table_name)
    }

    /// URL addressing one record by primary key.
    pub fn record_url(&self, id: &str) -> String {
        format!("{}({})", self.entity_set_url(), id)
    }

    pub fn batch_url(&self) -> String {
        format!("{}/$batch", self.api_root())
    }

    pub fn token_url(&self) -> String {
        format!("{}/oauth2/v2.0/token", self.authority)
    }

    /// OAuth2 scope granting access to the whole environment.
    pub fn scope(&self) -> String {
        format!("{}/.default", self.base_url)
    }

    pub fn has_credentials(&self) -> bool {
        !self.username.trim().is_empty() && !self.password.is_empty()
    }

    /// Checks the URL and reports the first missing credential.
    pub fn validate(&self) -> Result<(), AppError> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| AppError::InvalidUrl(format!("{}: {}", self.base_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AppError::InvalidUrl(format!(
                "unsupported scheme '{}' in {}",
                url.scheme(),
                self.base_url
            )));
        }
        if self.username.trim().is_empty() {
            return Err(AppError::ConfigIncomplete("DATAVERSE_USERNAME".to_string()));
        }
        if self.password.is_empty() {
            return Err(AppError::ConfigIncomplete("DATAVERSE_PASSWORD".to_string()));
        }
        Ok(())
    }
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("table_prefix", &self.table_prefix)
            .field("table_name", &self.table_name)
            .field("api_version", &self.api_version)
            .field("authority", &self.authority)
            .finish()
    }
}

/// HTTP client configuration for external API calls.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

impl HttpConfig {
    /// Delay before retry number `attempt` (1-based): base * 2^(attempt-1).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.retry_base_delay * 2_u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Batch sizing and window configuration for a sync run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Maximum create operations per batch.
    pub batch_size: usize,
    /// Delete batches carry no body, so they hold this many times more operations.
    pub delete_batch_multiplier: usize,
    /// Length of the rolling window ending today.
    pub window_days: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            delete_batch_multiplier: 10,
            window_days: 365,
        }
    }
}

impl SyncConfig {
    pub fn delete_batch_size(&self) -> usize {
        self.batch_size.saturating_mul(self.delete_batch_multiplier)
    }
}
