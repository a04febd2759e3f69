//! Spotify Web API client.
//!
//! Only the handful of player endpoints mpm needs. Every call takes the
//! bearer token explicitly; keeping it fresh is the token manager's job.

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::http::{build_client, join_url};
use crate::types::SpotifyUser;

/// Errors returned by [`SpotifyClient`].
#[derive(Error, Debug)]
pub enum SpotifyError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The access token was rejected (401).
    #[error("access token rejected")]
    Unauthorized,

    /// Spotify returned another error status.
    #[error("Spotify API error: {status} - {message}")]
    Api { status: u16, message: String },
}

/// A playback device as listed by `GET /v1/me/player/devices`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Device {
    pub id: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct DevicesResponse {
    #[serde(default)]
    devices: Vec<Device>,
}

#[derive(Debug, Serialize)]
struct TransferRequest<'a> {
    device_ids: [&'a str; 1],
}

/// HTTP client for the Spotify Web API. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SpotifyClient {
    base_url: String,
    client: Client,
}

impl SpotifyClient {
    /// Creates a client against `base_url` (normally `https://api.spotify.com`).
    ///
    /// # Errors
    ///
    /// Returns `SpotifyError::Http` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, SpotifyError> {
        Ok(Self {
            base_url: base_url.into(),
            client: build_client()?,
        })
    }

    /// Lists the user's playback devices.
    ///
    /// # Errors
    ///
    /// Returns `SpotifyError::Unauthorized` on 401, other failures as `Api`/`Http`.
    pub async fn devices(&self, token: &str) -> Result<Vec<Device>, SpotifyError> {
        let request = self.client.get(join_url(&self.base_url, "/v1/me/player/devices"));
        let response = send(request, token).await?;
        let body: DevicesResponse = response.json().await?;
        Ok(body.devices)
    }

    /// Moves playback to `device_id`.
    ///
    /// # Errors
    ///
    /// See [`devices`](Self::devices).
    pub async fn transfer_playback(&self, token: &str, device_id: &str) -> Result<(), SpotifyError> {
        let request = self
            .client
            .put(join_url(&self.base_url, "/v1/me/player"))
            .json(&TransferRequest {
                device_ids: [device_id],
            });
        send(request, token).await?;
        Ok(())
    }

    /// Resumes playback on the active device.
    ///
    /// # Errors
    ///
    /// See [`devices`](Self::devices).
    pub async fn play(&self, token: &str) -> Result<(), SpotifyError> {
        let request = self
            .client
            .put(join_url(&self.base_url, "/v1/me/player/play"))
            .body("");
        send(request, token).await?;
        Ok(())
    }

    /// Pauses playback on the active device.
    ///
    /// # Errors
    ///
    /// See [`devices`](Self::devices).
    pub async fn pause(&self, token: &str) -> Result<(), SpotifyError> {
        let request = self
            .client
            .put(join_url(&self.base_url, "/v1/me/player/pause"))
            .body("");
        send(request, token).await?;
        Ok(())
    }

    /// Fetches the signed-in user's profile.
    ///
    /// # Errors
    ///
    /// See [`devices`](Self::devices).
    pub async fn current_user(&self, token: &str) -> Result<SpotifyUser, SpotifyError> {
        let request = self.client.get(join_url(&self.base_url, "/v1/me"));
        let response = send(request, token).await?;
        Ok(response.json().await?)
    }
}

async fn send(request: RequestBuilder, token: &str) -> Result<reqwest::Response, SpotifyError> {
    let response = request.bearer_auth(token).send().await?;
    let status = response.status();
    debug!(status = status.as_u16(), url = %response.url(), "Spotify response");

    match status {
        _ if status.is_success() => Ok(response),
        StatusCode::UNAUTHORIZED => Err(SpotifyError::Unauthorized),
        _ => {
            let message = response.text().await.unwrap_or_default();
            Err(SpotifyError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}
