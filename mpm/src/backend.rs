//! Client for the mpm companion backend.
//!
//! The backend mints fresh Spotify access tokens, serves per-user settings
//! and collects session statistics:
//!
//! - `GET /auth/refresh_token?refresh_token=..` -> `{ "acccess_token": .. }`
//! - `GET /extension/settings` (header `email`) -> `{ "settings": null | {..} }`
//! - `POST /extension` -> `{ "session": [{ "id": .. }] }`
//!
//! The refresh endpoint has always spelled the field `acccess_token`; the
//! correct spelling is accepted as well.

use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::http::{build_client, join_url};
use crate::store::{SettingsStore, StoredState};
use crate::types::{SessionId, SessionReport, UserSettings};

/// Errors that can occur when talking to the backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend returned an error status.
    #[error("server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    /// A session report was accepted but no session id came back.
    #[error("backend response did not include a session id")]
    MissingSessionId,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(alias = "acccess_token")]
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct SettingsResponse {
    #[serde(default)]
    settings: Option<RemoteSettings>,
}

#[derive(Debug, Deserialize)]
struct RemoteSettings {
    keypress: u32,
    #[serde(default)]
    hardcore: bool,
}

#[derive(Debug, Deserialize)]
struct ReportResponse {
    #[serde(default)]
    session: Vec<SessionRow>,
}

#[derive(Debug, Deserialize)]
struct SessionRow {
    id: SessionId,
}

/// HTTP client for the backend. Cheap to clone.
#[derive(Debug, Clone)]
pub struct BackendClient {
    base_url: String,
    client: Client,
}

impl BackendClient {
    /// Creates a client for the backend at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Http` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, BackendError> {
        Ok(Self {
            base_url: base_url.into(),
            client: build_client()?,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Exchanges a refresh token for a new access token.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` on transport failure, a non-2xx status, or a
    /// body without an access token.
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<String, BackendError> {
        let url = join_url(&self.base_url, "/auth/refresh_token");
        debug!(url = %url, "Requesting new access token");

        let response = self
            .client
            .get(&url)
            .query(&[("refresh_token", refresh_token)])
            .send()
            .await?;
        let response = check_status(response).await?;
        let body: RefreshResponse = response.json().await?;

        info!("Access token refreshed");
        Ok(body.access_token)
    }

    /// Fetches stored settings for `email`. `Ok(None)` means the user has
    /// never saved any.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` on transport failure or a non-2xx status.
    pub async fn user_settings(&self, email: &str) -> Result<Option<UserSettings>, BackendError> {
        let url = join_url(&self.base_url, "/extension/settings");

        let response = self
            .client
            .get(&url)
            .header(CONTENT_TYPE, "application/json")
            .header("email", email)
            .send()
            .await?;
        let response = check_status(response).await?;
        let body: SettingsResponse = response.json().await?;

        Ok(body.settings.map(|s| {
            UserSettings {
                keypress: s.keypress,
                hard_mode: s.hardcore,
            }
            .normalized()
        }))
    }

    /// Picks the settings for a session: the backend's if it has any for the
    /// stored user's email, else the stored ones, else `defaults`. Settings
    /// fetched from the backend are written to `store`. Never fails; backend
    /// and store errors are logged.
    pub async fn resolve_settings(
        &self,
        store: &SettingsStore,
        state: &StoredState,
        defaults: UserSettings,
    ) -> UserSettings {
        let fallback = state.settings.unwrap_or(defaults).normalized();

        let Some(email) = state.user.as_ref().and_then(|u| u.email.as_deref()) else {
            debug!("No stored email, using local settings");
            return fallback;
        };

        match self.user_settings(email).await {
            Ok(Some(settings)) => {
                if let Err(e) = store.update(|s| s.settings = Some(settings)) {
                    warn!(error = %e, "Failed to store settings");
                }
                info!(
                    keypress = settings.keypress,
                    hard_mode = settings.hard_mode,
                    "Loaded settings from backend"
                );
                settings
            }
            Ok(None) => fallback,
            Err(e) => {
                warn!(error = %e, "Failed to fetch settings, using local settings");
                fallback
            }
        }
    }

    /// Posts one statistics report and returns the session id the backend
    /// filed it under.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` on transport failure, a non-2xx status, or a
    /// response without a session row.
    pub async fn report_session(&self, report: &SessionReport) -> Result<SessionId, BackendError> {
        let url = join_url(&self.base_url, "/extension");
        debug!(
            url = %url,
            total_time = report.total_time,
            music_time = report.music_time,
            paused_times = report.paused_times,
            "Sending session report"
        );

        let response = self.client.post(&url).json(report).send().await?;
        let response = check_status(response).await?;
        let body: ReportResponse = response.json().await?;

        body.session
            .into_iter()
            .next()
            .map(|row| row.id)
            .ok_or(BackendError::MissingSessionId)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(BackendError::ServerError {
        status: status.as_u16(),
        message,
    })
}
