//! OAuth2 username/password authentication against Microsoft Entra ID.

use billsync_core::error::AppError;
use billsync_core::TargetConfig;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;

/// Token lifetime assumed when the provider omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Successful token response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Error response from the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    /// Returns true if the token is expired or will expire within the grace period.
    fn is_expired(&self, grace_period: Duration) -> bool {
        Utc::now() + grace_period >= self.expires_at
    }
}

/// Lazily acquired, expiry-aware bearer token for the target environment.
///
/// The first call to [`get_token`](Self::get_token) performs the resource
/// owner password credentials exchange; later calls reuse the cached token
/// until it is about to expire or [`invalidate`](Self::invalidate) is called
/// after the server rejected it.
#[derive(Debug)]
pub struct TokenCache {
    client: Client,
    token_url: String,
    client_id: String,
    username: String,
    password: String,
    scope: String,
    cached_token: RwLock<Option<CachedToken>>,
    /// Grace period before expiry to trigger refresh (default: 5 minutes).
    grace_period: Duration,
}

impl TokenCache {
    pub fn new(client: Client, target: &TargetConfig) -> Self {
        Self {
            client,
            token_url: target.token_url(),
            client_id: target.client_id.clone(),
            username: target.username.clone(),
            password: target.password.clone(),
            scope: target.scope(),
            cached_token: RwLock::new(None),
            grace_period: Duration::minutes(5),
        }
    }

    /// Gets a valid access token, acquiring a new one if necessary.
    pub async fn get_token(&self) -> Result<String, AppError> {
        {
            let cache = self.cached_token.read().await;
            if let Some(ref token) = *cache {
                if !token.is_expired(self.grace_period) {
                    return Ok(token.access_token.clone());
                }
            }
        }

        debug!("Requesting access token for {}", self.scope);
        let new_token = self.acquire_token().await?;
        let access_token = new_token.access_token.clone();
        *self.cached_token.write().await = Some(new_token);

        Ok(access_token)
    }

    /// Invalidates the cached token, forcing a refresh on next use.
    pub async fn invalidate(&self) {
        *self.cached_token.write().await = None;
    }

    async fn acquire_token(&self) -> Result<CachedToken, AppError> {
        let params = [
            ("grant_type", "password"),
            ("client_id", self.client_id.as_str()),
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
            ("scope", self.scope.as_str()),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::AuthenticationFailed(format!("token request failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(AppError::AuthenticationFailed(describe_error(&body, status.as_u16())));
        }

        let token: TokenResponse = serde_json::from_str(&body).map_err(|_| {
            AppError::AuthenticationFailed(describe_error(&body, status.as_u16()))
        })?;

        let expires_at = expiry_after(Utc::now(), token.expires_in);
        debug!(
            "Acquired new token, expires at {}",
            expires_at.format("%Y-%m-%d %H:%M:%S UTC")
        );

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at,
        })
    }
}

/// Expiry instant for a token issued at `now` with the given lifetime.
///
/// Missing, negative or unrepresentable lifetimes fall back to the default.
fn expiry_after(now: DateTime<Utc>, expires_in: Option<i64>) -> DateTime<Utc> {
    let fallback = Duration::seconds(DEFAULT_EXPIRES_IN_SECS);
    let lifetime = expires_in
        .filter(|secs| *secs >= 0)
        .and_then(Duration::try_seconds)
        .unwrap_or(fallback);
    now.checked_add_signed(lifetime)
        .unwrap_or(now + fallback)
}

/// Picks the most useful message out of a token endpoint error body.
fn describe_error(body: &str, status: u16) -> String {
    match serde_json::from_str::<TokenErrorResponse>(body) {
        Ok(TokenErrorResponse {
            error_description: Some(description),
            ..
        }) => description,
        Ok(TokenErrorResponse {
            error: Some(error), ..
        }) => error,
        _ => format!("Unknown error (HTTP {})", status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_token_expiry() {
        let token = CachedToken {
            access_token: "test".to_string(),
            expires_at: Utc::now() + Duration::minutes(10),
        };

        assert!(!token.is_expired(Duration::minutes(5)));
        assert!(token.is_expired(Duration::minutes(15)));
    }

    #[test]
    fn test_cached_token_already_expired() {
        let token = CachedToken {
            access_token: "test".to_string(),
            expires_at: Utc::now() - Duration::minutes(1),
        };

        assert!(token.is_expired(Duration::minutes(0)));
    }

    #[test]
    fn test_expiry_after_uses_lifetime() {
        let now = Utc::now();
        assert_eq!(expiry_after(now, Some(600)), now + Duration::seconds(600));
        assert_eq!(
            expiry_after(now, None),
            now + Duration::seconds(DEFAULT_EXPIRES_IN_SECS)
        );
    }

    #[test]
    fn test_expiry_after_absurd_lifetime_falls_back() {
        let now = Utc::now();
        let fallback = now + Duration::seconds(DEFAULT_EXPIRES_IN_SECS);
        assert_eq!(expiry_after(now, Some(i64::MAX)), fallback);
        assert_eq!(expiry_after(now, Some(-30)), fallback);
        // representable as a duration but past the last representable instant
        assert_eq!(expiry_after(now, Some(i64::MAX / 1_000)), fallback);
    }

    #[test]
    fn test_describe_error_prefers_description() {
        let body = r#"{"error":"invalid_grant","error_description":"AADSTS50126: Invalid username or password."}"#;
        assert_eq!(
            describe_error(body, 400),
            "AADSTS50126: Invalid username or password."
        );
        assert_eq!(describe_error(r#"{"error":"invalid_client"}"#, 401), "invalid_client");
        assert_eq!(describe_error("<html>", 502), "Unknown error (HTTP 502)");
    }
}
