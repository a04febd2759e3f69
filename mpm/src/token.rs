//! Spotify credential bookkeeping.
//!
//! The authorization page hands the user one string to paste back:
//!
//! ```text
//! <access token>?refresh_token=<refresh token>
//! ```
//!
//! [`parse_bootstrap`] splits it. From then on [`TokenManager`] keeps the
//! access token fresh: every authenticated call goes through
//! [`TokenManager::ensure_valid`], which refreshes through the backend when
//! the token has expired. Spotify access tokens live for an hour, and that
//! lifetime is assumed rather than read from the refresh response.

use std::fmt;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};
use zeroize::Zeroize;

use crate::backend::{BackendClient, BackendError};
use crate::store::{SettingsStore, StoreError, StoredState};

/// Delimiter between the two halves of the pasted bootstrap string.
pub const BOOTSTRAP_MARKER: &str = "?refresh_token=";

/// Assumed lifetime of a freshly minted access token.
pub const ACCESS_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Errors from credential handling.
#[derive(Error, Debug)]
pub enum TokenError {
    /// The pasted bootstrap string could not be split into two tokens.
    #[error("could not use token, expected '<access>?refresh_token=<refresh>'")]
    MalformedToken,

    /// No credentials have been stored yet.
    #[error("not logged in to Spotify, run `mpm login` first")]
    MissingCredentials,

    /// The backend refused or failed to mint a new access token.
    #[error("token refresh failed: {0}")]
    Refresh(#[from] BackendError),

    /// The refreshed credentials could not be persisted.
    #[error("failed to persist credentials: {0}")]
    Store(#[from] StoreError),
}

/// Both halves of a pasted bootstrap string. Zeroed on drop.
pub struct BootstrapTokens {
    pub access_token: String,
    pub refresh_token: String,
}

impl fmt::Debug for BootstrapTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootstrapTokens").finish_non_exhaustive()
    }
}

impl Drop for BootstrapTokens {
    fn drop(&mut self) {
        self.access_token.zeroize();
        self.refresh_token.zeroize();
    }
}

/// Splits `<access>?refresh_token=<refresh>` into its two tokens.
///
/// Surrounding whitespace is ignored. Both halves must be non-empty.
///
/// # Errors
///
/// Returns `TokenError::MalformedToken` when the marker is missing or either
/// half is empty.
///
/// # Example
///
/// ```
/// use mpm::token::parse_bootstrap;
///
/// let tokens = parse_bootstrap("ABC123?refresh_token=XYZ789").unwrap();
/// assert_eq!(tokens.access_token, "ABC123");
/// assert_eq!(tokens.refresh_token, "XYZ789");
/// ```
pub fn parse_bootstrap(raw: &str) -> Result<BootstrapTokens, TokenError> {
    let (access, refresh) = raw
        .trim()
        .split_once(BOOTSTRAP_MARKER)
        .ok_or(TokenError::MalformedToken)?;

    if access.is_empty() || refresh.is_empty() {
        return Err(TokenError::MalformedToken);
    }

    Ok(BootstrapTokens {
        access_token: access.to_string(),
        refresh_token: refresh.to_string(),
    })
}

/// Current epoch seconds.
#[must_use]
pub fn now_epoch() -> i64 {
    Utc::now().timestamp()
}

/// Owns the access/refresh token pair and keeps the access token valid.
pub struct TokenManager {
    access_token: String,
    refresh_token: String,
    expires_at: i64,
    store: SettingsStore,
    backend: BackendClient,
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl Drop for TokenManager {
    fn drop(&mut self) {
        self.access_token.zeroize();
        self.refresh_token.zeroize();
    }
}

impl TokenManager {
    /// Restores credentials from persisted state.
    ///
    /// A missing `expires` entry is treated as already expired.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::MissingCredentials` if either token is absent.
    pub fn from_state(
        state: &StoredState,
        store: SettingsStore,
        backend: BackendClient,
    ) -> Result<Self, TokenError> {
        let (Some(access), Some(refresh)) = (&state.api_key, &state.refresh_key) else {
            return Err(TokenError::MissingCredentials);
        };

        Ok(Self {
            access_token: access.clone(),
            refresh_token: refresh.clone(),
            expires_at: state.expires.unwrap_or(0),
            store,
            backend,
        })
    }

    /// Parses a pasted bootstrap string and persists the resulting tokens.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::MalformedToken` for an unusable string (the caller
    /// should prompt again) or `TokenError::Store` if saving fails.
    pub fn bootstrap(
        raw: &str,
        store: SettingsStore,
        backend: BackendClient,
    ) -> Result<Self, TokenError> {
        Self::bootstrap_at(raw, store, backend, now_epoch())
    }

    /// [`bootstrap`](Self::bootstrap) with an explicit clock.
    ///
    /// # Errors
    ///
    /// See [`bootstrap`](Self::bootstrap).
    pub fn bootstrap_at(
        raw: &str,
        store: SettingsStore,
        backend: BackendClient,
        now: i64,
    ) -> Result<Self, TokenError> {
        let tokens = parse_bootstrap(raw)?;
        let expires_at = now + ACCESS_TOKEN_LIFETIME_SECS;

        store.update(|s| {
            s.api_key = Some(tokens.access_token.clone());
            s.refresh_key = Some(tokens.refresh_token.clone());
            s.expires = Some(expires_at);
        })?;

        info!(expires_at, "Stored Spotify credentials");

        Ok(Self {
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            expires_at,
            store,
            backend,
        })
    }

    /// Expiry of the current access token, epoch seconds.
    #[must_use]
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    /// Whether the access token is still usable at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: i64) -> bool {
        now < self.expires_at
    }

    /// Returns a usable access token, refreshing first if it has expired.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Refresh` if a needed refresh fails. A refreshed
    /// token that cannot be persisted is still returned.
    pub async fn ensure_valid(&mut self) -> Result<String, TokenError> {
        self.ensure_valid_at(now_epoch()).await
    }

    /// [`ensure_valid`](Self::ensure_valid) with an explicit clock.
    ///
    /// # Errors
    ///
    /// See [`ensure_valid`](Self::ensure_valid).
    pub async fn ensure_valid_at(&mut self, now: i64) -> Result<String, TokenError> {
        if !self.is_valid_at(now) {
            debug!(expires_at = self.expires_at, now, "Access token expired");
            self.refresh_at(now).await?;
        }
        Ok(self.access_token.clone())
    }

    /// Refreshes regardless of expiry, e.g. after a 401.
    ///
    /// # Errors
    ///
    /// See [`ensure_valid`](Self::ensure_valid).
    pub async fn force_refresh(&mut self) -> Result<String, TokenError> {
        self.refresh_at(now_epoch()).await?;
        Ok(self.access_token.clone())
    }

    async fn refresh_at(&mut self, now: i64) -> Result<(), TokenError> {
        let fresh = self.backend.refresh_access_token(&self.refresh_token).await?;
        let expires_at = now + ACCESS_TOKEN_LIFETIME_SECS;

        self.access_token.zeroize();
        self.access_token = fresh;
        self.expires_at = expires_at;

        // The token stays usable in memory even if it cannot be persisted;
        // the next run simply refreshes again.
        let access_token = &self.access_token;
        if let Err(e) = self.store.update(|s| {
            s.api_key = Some(access_token.clone());
            s.expires = Some(expires_at);
        }) {
            warn!(error = %e, "Failed to persist refreshed access token");
        }
        Ok(())
    }
}
