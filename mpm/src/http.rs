//! Shared reqwest client setup.

use std::time::Duration;

use reqwest::Client;

/// HTTP request timeout.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Builds the pooled client used for both the backend and Spotify.
///
/// # Errors
///
/// Returns the reqwest error if the TLS backend cannot be initialized.
pub(crate) fn build_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .pool_max_idle_per_host(4)
        .build()
}

/// Joins a base URL and a path without doubling the slash.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_handles_trailing_slash() {
        assert_eq!(join_url("http://a/", "/v1/me"), "http://a/v1/me");
        assert_eq!(join_url("http://a", "/v1/me"), "http://a/v1/me");
    }
}
