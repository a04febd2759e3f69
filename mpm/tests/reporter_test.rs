//! Integration tests for session reports against a mocked backend.

use mpm::backend::{BackendClient, BackendError};
use mpm::playback::PlaybackState;
use mpm::reporter::{SessionReporter, SessionStats};
use mpm::store::{SettingsStore, StoredState};
use mpm::types::{SessionId, SpotifyUser, UserSettings};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// =============================================================================
// Test Helpers
// =============================================================================

/// 65 elapsed seconds, 40 of them with music, two pauses.
fn busy_reporter() -> SessionReporter {
    let mut reporter = SessionReporter::new();
    for second in 0..65 {
        let state = if second < 40 {
            PlaybackState::Playing
        } else {
            PlaybackState::Paused
        };
        reporter.tick(state);
    }
    reporter.record_pause();
    reporter.record_pause();
    reporter
}

fn test_user() -> SpotifyUser {
    SpotifyUser {
        id: "user-1".to_string(),
        email: Some("dev@example.com".to_string()),
        ..SpotifyUser::default()
    }
}

// =============================================================================
// Report Tests
// =============================================================================

/// A successful flush sends the counters and zeroes them.
#[tokio::test]
async fn test_flush_sends_and_resets_counters() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/extension"))
        .and(body_partial_json(json!({
            "sessionId": null,
            "totalTime": 65,
            "musicTime": 40,
            "pausedTimes": 2,
            "user": { "id": "user-1", "email": "dev@example.com" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "session": [{ "id": 17 }] })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = BackendClient::new(server.uri()).unwrap();
    let mut reporter = busy_reporter();

    let session_id = reporter.flush(&backend, Some(test_user())).await.unwrap();

    assert_eq!(session_id, SessionId::Number(17));
    assert_eq!(
        reporter.stats(),
        &SessionStats {
            elapsed_seconds: 0,
            music_seconds: 0,
            paused_count: 0,
            session_id: Some(SessionId::Number(17)),
        }
    );
}

/// The session id from the first report is carried by the next one.
#[tokio::test]
async fn test_session_id_is_reused() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/extension"))
        .and(body_partial_json(json!({ "sessionId": "abc" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "session": [{ "id": "abc" }] })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/extension"))
        .and(body_partial_json(json!({ "sessionId": null })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "session": [{ "id": "abc" }] })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = BackendClient::new(server.uri()).unwrap();
    let mut reporter = busy_reporter();

    reporter.flush(&backend, None).await.unwrap();
    reporter.tick(PlaybackState::Playing);
    reporter.flush(&backend, None).await.unwrap();

    assert_eq!(
        reporter.stats().session_id,
        Some(SessionId::Text("abc".to_string()))
    );
}

/// A failed flush keeps everything for the next attempt.
#[tokio::test]
async fn test_failed_flush_keeps_counters() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/extension"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let backend = BackendClient::new(server.uri()).unwrap();
    let mut reporter = busy_reporter();
    let before = reporter.stats().clone();

    let result = reporter.flush(&backend, None).await;

    assert!(matches!(
        result,
        Err(BackendError::ServerError { status: 502, .. })
    ));
    assert_eq!(reporter.stats(), &before);
}

/// A 2xx response without a session row is treated as a failure.
#[tokio::test]
async fn test_missing_session_row_keeps_counters() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/extension"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "session": [] })))
        .mount(&server)
        .await;

    let backend = BackendClient::new(server.uri()).unwrap();
    let mut reporter = busy_reporter();

    let result = reporter.flush(&backend, None).await;

    assert!(matches!(result, Err(BackendError::MissingSessionId)));
    assert_eq!(reporter.stats().elapsed_seconds, 65);
}

// =============================================================================
// Settings Tests
// =============================================================================

/// Settings are looked up by the email header and mapped from `hardcore`.
#[tokio::test]
async fn test_user_settings_lookup() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/extension/settings"))
        .and(header("email", "dev@example.com"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "settings": { "keypress": 4, "hardcore": true } })),
        )
        .mount(&server)
        .await;

    let backend = BackendClient::new(server.uri()).unwrap();
    let settings = backend.user_settings("dev@example.com").await.unwrap();

    assert_eq!(
        settings,
        Some(UserSettings {
            keypress: 4,
            hard_mode: true
        })
    );
}

/// A user who never saved settings gets `None`.
#[tokio::test]
async fn test_user_settings_absent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/extension/settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "settings": null })))
        .mount(&server)
        .await;

    let backend = BackendClient::new(server.uri()).unwrap();
    assert_eq!(backend.user_settings("new@example.com").await.unwrap(), None);
}

// =============================================================================
// Settings Resolution Tests
// =============================================================================

const LOCAL_DEFAULTS: UserSettings = UserSettings {
    keypress: 2,
    hard_mode: false,
};

fn state_with(user: Option<SpotifyUser>, settings: Option<UserSettings>) -> StoredState {
    StoredState {
        user,
        settings,
        ..StoredState::default()
    }
}

/// Backend settings win and are written to the store.
#[tokio::test]
async fn test_resolve_settings_prefers_backend_and_stores_it() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/extension/settings"))
        .and(header("email", "dev@example.com"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "settings": { "keypress": 5, "hardcore": true } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let store = SettingsStore::new(dir.path());
    let stored = UserSettings {
        keypress: 3,
        hard_mode: false,
    };
    let state = state_with(Some(test_user()), Some(stored));

    let backend = BackendClient::new(server.uri()).unwrap();
    let settings = backend
        .resolve_settings(&store, &state, LOCAL_DEFAULTS)
        .await;

    let expected = UserSettings {
        keypress: 5,
        hard_mode: true,
    };
    assert_eq!(settings, expected);
    assert_eq!(store.load().unwrap().settings, Some(expected));
}

/// Without a stored email the backend is not asked.
#[tokio::test]
async fn test_resolve_settings_without_email_uses_stored() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/extension/settings"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let store = SettingsStore::new(dir.path());
    let stored = UserSettings {
        keypress: 3,
        hard_mode: true,
    };
    let user = SpotifyUser {
        id: "user-1".to_string(),
        ..SpotifyUser::default()
    };

    let backend = BackendClient::new(server.uri()).unwrap();
    let settings = backend
        .resolve_settings(&store, &state_with(Some(user), Some(stored)), LOCAL_DEFAULTS)
        .await;

    assert_eq!(settings, stored);
    assert!(!store.path().exists());
}

/// A user with no saved settings falls back to the stored ones, then defaults.
#[tokio::test]
async fn test_resolve_settings_null_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/extension/settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "settings": null })))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let store = SettingsStore::new(dir.path());
    let backend = BackendClient::new(server.uri()).unwrap();

    let stored = UserSettings {
        keypress: 4,
        hard_mode: false,
    };
    let with_stored = backend
        .resolve_settings(&store, &state_with(Some(test_user()), Some(stored)), LOCAL_DEFAULTS)
        .await;
    assert_eq!(with_stored, stored);

    let without_stored = backend
        .resolve_settings(&store, &state_with(Some(test_user()), None), LOCAL_DEFAULTS)
        .await;
    assert_eq!(without_stored, LOCAL_DEFAULTS);
    assert!(!store.path().exists());
}

/// A backend failure is not fatal; local settings are used.
#[tokio::test]
async fn test_resolve_settings_backend_error_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/extension/settings"))
        .respond_with(ResponseTemplate::new(500).set_body_string("down"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let store = SettingsStore::new(dir.path());
    let backend = BackendClient::new(server.uri()).unwrap();

    let settings = backend
        .resolve_settings(&store, &state_with(Some(test_user()), None), LOCAL_DEFAULTS)
        .await;

    assert_eq!(settings, LOCAL_DEFAULTS);
}

/// A stored keypress of zero is clamped on the way out.
#[tokio::test]
async fn test_resolve_settings_normalizes_fallback() {
    let dir = TempDir::new().unwrap();
    let store = SettingsStore::new(dir.path());
    let backend = BackendClient::new("http://127.0.0.1:9").unwrap();

    let stored = UserSettings {
        keypress: 0,
        hard_mode: true,
    };
    let settings = backend
        .resolve_settings(&store, &state_with(None, Some(stored)), LOCAL_DEFAULTS)
        .await;

    assert_eq!(
        settings,
        UserSettings {
            keypress: 1,
            hard_mode: true
        }
    );
}
