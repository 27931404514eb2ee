//! Dataverse Web API client.
//!
//! Reads use OData collection queries; writes go through `$batch` requests
//! built by [`billsync_core::BatchBuilder`].

use billsync_core::batch::{is_transient_status, truncate_detail, SUCCESS_STATUSES};
use billsync_core::error::AppError;
use billsync_core::{
    Batch, BatchOutcome, DateWindow, HttpConfig, RemoteFilter, SyncTarget, TargetConfig,
    TargetRecord,
};
use chrono::NaiveDate;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

use crate::auth::TokenCache;

/// One page of an OData collection response.
///
/// Dataverse pages large result sets; `@odata.nextLink` carries the URL of
/// the next page until the last one.
#[derive(Deserialize, Debug)]
struct ODataPage {
    #[serde(default)]
    value: Vec<Map<String, Value>>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
    #[serde(rename = "@odata.count")]
    count: Option<u64>,
}

/// Identifier and work date of an existing remote record, for previews.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRecord {
    pub id: String,
    pub date: Option<String>,
}

/// HTTP client for one Dataverse table.
///
/// Every request carries a bearer token from the shared [`TokenCache`].
/// Requests are retried with exponential backoff on throttling (429),
/// server errors (5xx) and connection failures; a 401 triggers one
/// re-authentication and a single replay of the request.
///
/// # Examples
///
/// ```no_run
/// use billsync_client::DataverseClient;
/// use billsync_core::{HttpConfig, TargetConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let target = TargetConfig::new("https://org.crm.dynamics.com", "cr834")
///     .with_credentials("me@example.com", "secret");
/// let client = DataverseClient::new(target, HttpConfig::default())?;
/// client.authenticate().await?;
/// # Ok(())
/// # }
/// ```
pub struct DataverseClient {
    client: Client,
    target: TargetConfig,
    http: HttpConfig,
    tokens: TokenCache,
}

impl DataverseClient {
    /// Creates a client for the table described by `target`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidUrl` if the environment URL is malformed.
    /// Returns `AppError::ClientError` if the HTTP client cannot be built.
    pub fn new(target: TargetConfig, http: HttpConfig) -> Result<Self, AppError> {
        Url::parse(&target.base_url)
            .map_err(|e| AppError::InvalidUrl(format!("{}: {}", target.base_url, e)))?;

        let client = Client::builder()
            .user_agent(concat!("billsync/", env!("CARGO_PKG_VERSION")))
            .timeout(http.timeout)
            .build()
            .map_err(|e| AppError::ClientError(e.to_string()))?;

        let tokens = TokenCache::new(client.clone(), &target);

        Ok(Self {
            client,
            target,
            http,
            tokens,
        })
    }

    pub fn target(&self) -> &TargetConfig {
        &self.target
    }

    /// Acquires (and caches) the access token.
    pub async fn authenticate(&self) -> Result<(), AppError> {
        self.tokens.get_token().await.map(|_| ())
    }

    /// Primary keys of every record matching `filter`, across all pages.
    ///
    /// Only the key column is selected. Dataverse returns at most one page
    /// per request, so `@odata.nextLink` is followed until it is absent.
    ///
    /// # Arguments
    ///
    /// * `filter` - Date condition on the table's work date column
    ///
    /// # Returns
    ///
    /// The primary key of each matching record, in server order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::QueryFailed` if any page comes back with a non-2xx status.
    /// Returns `AppError::AuthenticationFailed` if no token can be obtained.
    pub async fn query_ids(&self, filter: &RemoteFilter) -> Result<Vec<String>, AppError> {
        let key = self.target.primary_key_field();
        let mut url = self.collection_url(filter, &[key.as_str()], &[])?;
        let mut ids = Vec::new();

        loop {
            let page = self.get_page(url).await?;
            ids.extend(
                page.value
                    .iter()
                    .filter_map(|row| row.get(&key).and_then(Value::as_str))
                    .map(str::to_string),
            );

            match page.next_link {
                Some(next) => {
                    debug!("Following next page link ({} ids so far)", ids.len());
                    url = Url::parse(&next).map_err(|e| AppError::InvalidUrl(e.to_string()))?;
                }
                None => break,
            }
        }

        Ok(ids)
    }

    /// Records dated inside `window`, inclusive on both ends.
    pub async fn query_ids_in_window(&self, window: DateWindow) -> Result<Vec<String>, AppError> {
        self.query_ids(&RemoteFilter::Within(window)).await
    }

    /// Records dated strictly after `cutoff`.
    pub async fn query_ids_after(&self, cutoff: NaiveDate) -> Result<Vec<String>, AppError> {
        self.query_ids(&RemoteFilter::After(cutoff)).await
    }

    /// Number of records matching `filter`, without fetching them.
    ///
    /// # Arguments
    ///
    /// * `filter` - Date condition on the table's work date column
    ///
    /// # Returns
    ///
    /// The server's `@odata.count`, or 0 when the response omits it.
    pub async fn count_matching(&self, filter: &RemoteFilter) -> Result<u64, AppError> {
        let key = self.target.primary_key_field();
        let url = self.collection_url(
            filter,
            &[key.as_str()],
            &[("$count", "true"), ("$top", "0")],
        )?;
        let page = self.get_page(url).await?;
        Ok(page.count.unwrap_or(0))
    }

    /// Up to `top` matching records with their work date.
    ///
    /// # Arguments
    ///
    /// * `filter` - Date condition on the table's work date column
    /// * `top` - Maximum number of records to return
    ///
    /// # Returns
    ///
    /// A [`RemoteRecord`] per row; rows without a key are skipped.
    pub async fn sample_matching(
        &self,
        filter: &RemoteFilter,
        top: usize,
    ) -> Result<Vec<RemoteRecord>, AppError> {
        let key = self.target.primary_key_field();
        let date_field = self.target.date_field();
        let top = top.to_string();
        let url = self.collection_url(
            filter,
            &[key.as_str(), date_field.as_str()],
            &[("$top", top.as_str())],
        )?;
        let page = self.get_page(url).await?;

        Ok(page
            .value
            .iter()
            .filter_map(|row| {
                let id = row.get(&key)?.as_str()?.to_string();
                let date = row.get(&date_field).and_then(Value::as_str).map(str::to_string);
                Some(RemoteRecord { id, date })
            })
            .collect())
    }

    /// Posts a single record outside any batch.
    pub async fn create_record(&self, record: &TargetRecord) -> BatchOutcome {
        let url = self.target.entity_set_url();
        let body = Value::Object(record.to_json(&self.target.table_prefix));

        let result = self
            .send(|token| {
                self.odata_request(self.client.post(&url), token)
                    .header(CONTENT_TYPE, "application/json; charset=utf-8")
                    .json(&body)
            })
            .await;

        outcome_of(result, 1).await
    }

    /// Transmits one `$batch` request and classifies the response.
    pub async fn execute_batch(&self, batch: &Batch) -> BatchOutcome {
        let url = self.target.batch_url();

        let result = self
            .send(|token| {
                self.odata_request(self.client.post(&url), token)
                    .header(CONTENT_TYPE, batch.content_type())
                    .body(batch.body.clone())
            })
            .await;

        outcome_of(result, batch.len()).await
    }

    fn odata_request(&self, builder: RequestBuilder, token: &str) -> RequestBuilder {
        builder
            .bearer_auth(token)
            .header("OData-MaxVersion", "4.0")
            .header("OData-Version", "4.0")
            .header(ACCEPT, "application/json")
    }

    fn collection_url(
        &self,
        filter: &RemoteFilter,
        select: &[&str],
        extra: &[(&str, &str)],
    ) -> Result<Url, AppError> {
        let mut url = Url::parse(&self.target.entity_set_url())
            .map_err(|e| AppError::InvalidUrl(e.to_string()))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("$filter", &filter.to_odata(&self.target.date_field()));
            pairs.append_pair("$select", &select.join(","));
            for (key, value) in extra {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn get_page(&self, url: Url) -> Result<ODataPage, AppError> {
        let resp = self
            .send(|token| self.odata_request(self.client.get(url.clone()), token))
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::QueryFailed {
                status: status.as_u16(),
                detail: truncate_detail(&body),
            });
        }

        resp.json()
            .await
            .map_err(|e| AppError::ClientError(format!("Failed to parse response: {}", e)))
    }

    /// Sends a request built by `build`, retrying transient failures.
    ///
    /// Implements exponential backoff for retries on:
    /// - Rate limiting (429)
    /// - Server errors (5xx)
    /// - Connection failures and timeouts
    ///
    /// A 401 invalidates the cached token and replays the request once with a
    /// fresh one. Any other status is returned to the caller as-is.
    async fn send<F>(&self, build: F) -> Result<Response, AppError>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let max_attempts = self.http.max_retries.max(1);
        let mut attempt = 0;
        let mut reauthenticated = false;

        loop {
            attempt += 1;
            let token = self.tokens.get_token().await?;

            match build(&token).send().await {
                Ok(resp) => {
                    let status = resp.status();

                    if status == StatusCode::UNAUTHORIZED && !reauthenticated {
                        warn!("Access token rejected, re-authenticating");
                        self.tokens.invalidate().await;
                        reauthenticated = true;
                        attempt -= 1;
                        continue;
                    }

                    if is_transient_status(status.as_u16()) && attempt < max_attempts {
                        let delay = self.http.backoff_delay(attempt);
                        warn!(
                            "HTTP {} (attempt {}/{}), retrying in {:?}",
                            status.as_u16(),
                            attempt,
                            max_attempts,
                            delay
                        );
                        sleep(delay).await;
                        continue;
                    }

                    return Ok(resp);
                }
                Err(e) => {
                    let err = if e.is_timeout() {
                        AppError::Timeout(self.http.timeout.as_secs())
                    } else if e.is_connect() {
                        AppError::NetworkError(format!("Connection failed: {}", e))
                    } else {
                        AppError::ClientError(e.to_string())
                    };

                    if err.is_retryable() && attempt < max_attempts {
                        let delay = self.http.backoff_delay(attempt);
                        warn!("{} (attempt {}/{}), retrying in {:?}", err, attempt, max_attempts, delay);
                        sleep(delay).await;
                        continue;
                    }

                    return Err(err);
                }
            }
        }
    }
}

/// Turns a finished request into a batch outcome for `size` operations.
async fn outcome_of(result: Result<Response, AppError>, size: usize) -> BatchOutcome {
    match result {
        Ok(resp) => {
            let status = resp.status().as_u16();
            if SUCCESS_STATUSES.contains(&status) {
                return BatchOutcome::Success(size);
            }
            let body = resp.text().await.unwrap_or_default();
            BatchOutcome::from_status(status, size, &body)
        }
        Err(e) => BatchOutcome::transport_failure(e.to_string()),
    }
}

impl SyncTarget for DataverseClient {
    async fn authenticate(&self) -> Result<(), AppError> {
        DataverseClient::authenticate(self).await
    }

    async fn query_ids(&self, filter: &RemoteFilter) -> Result<Vec<String>, AppError> {
        DataverseClient::query_ids(self, filter).await
    }

    async fn execute(&self, batch: &Batch) -> BatchOutcome {
        self.execute_batch(batch).await
    }
}
