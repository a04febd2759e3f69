//! Session statistics and their periodic report to the backend.
//!
//! Counters only shrink by what a successful report carried, so a failed
//! report simply rolls into the next one. Duplicate reports after a lost
//! response are possible and accepted.

use tracing::{debug, info};

use crate::backend::{BackendClient, BackendError};
use crate::playback::PlaybackState;
use crate::types::{SessionId, SessionReport, SpotifyUser};

/// Counters accumulated since the last successful report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub elapsed_seconds: u64,
    pub music_seconds: u64,
    pub paused_count: u64,
    pub session_id: Option<SessionId>,
}

/// Accumulates [`SessionStats`] and reports them.
#[derive(Debug, Default)]
pub struct SessionReporter {
    stats: SessionStats,
}

impl SessionReporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// One second passed. Music time only counts while playing.
    pub fn tick(&mut self, state: PlaybackState) {
        self.stats.elapsed_seconds += 1;
        if state == PlaybackState::Playing {
            self.stats.music_seconds += 1;
        }
    }

    /// Playback was paused.
    pub fn record_pause(&mut self) {
        self.stats.paused_count += 1;
    }

    /// Builds the payload for the next report without changing anything.
    #[must_use]
    pub fn snapshot(&self, user: Option<SpotifyUser>) -> SessionReport {
        SessionReport {
            session_id: self.stats.session_id.clone(),
            total_time: self.stats.elapsed_seconds,
            music_time: self.stats.music_seconds,
            paused_times: self.stats.paused_count,
            user,
        }
    }

    /// Applies a successful report: subtracts what it carried and keeps the
    /// session id for later reports.
    pub fn acknowledge(&mut self, report: &SessionReport, session_id: SessionId) {
        let stats = &mut self.stats;
        stats.elapsed_seconds = stats.elapsed_seconds.saturating_sub(report.total_time);
        stats.music_seconds = stats.music_seconds.saturating_sub(report.music_time);
        stats.paused_count = stats.paused_count.saturating_sub(report.paused_times);

        if stats.session_id.as_ref() != Some(&session_id) {
            info!(session_id = %session_id, "Backend assigned session id");
        }
        stats.session_id = Some(session_id);
    }

    /// Sends the accumulated stats and resets the counters on success.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the report is not accepted; counters are
    /// left untouched so they roll into the next flush.
    pub async fn flush(
        &mut self,
        backend: &BackendClient,
        user: Option<SpotifyUser>,
    ) -> Result<SessionId, BackendError> {
        let report = self.snapshot(user);
        let session_id = backend.report_session(&report).await?;
        self.acknowledge(&report, session_id.clone());
        debug!(stats = ?self.stats, "Session report acknowledged");
        Ok(session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_counts_music_only_while_playing() {
        let mut r = SessionReporter::new();
        r.tick(PlaybackState::Paused);
        r.tick(PlaybackState::Playing);
        r.tick(PlaybackState::Playing);

        assert_eq!(r.stats().elapsed_seconds, 3);
        assert_eq!(r.stats().music_seconds, 2);
    }

    #[test]
    fn acknowledge_subtracts_reported_amounts() {
        let mut r = SessionReporter::new();
        for _ in 0..5 {
            r.tick(PlaybackState::Playing);
        }
        r.record_pause();
        let report = r.snapshot(None);

        // Activity while the report was in flight.
        r.tick(PlaybackState::Paused);
        r.record_pause();

        r.acknowledge(&report, SessionId::Number(7));
        assert_eq!(
            r.stats(),
            &SessionStats {
                elapsed_seconds: 1,
                music_seconds: 0,
                paused_count: 1,
                session_id: Some(SessionId::Number(7)),
            }
        );
    }

    #[test]
    fn snapshot_carries_session_id() {
        let mut r = SessionReporter::new();
        let first = r.snapshot(None);
        r.acknowledge(&first, SessionId::Text("s-1".to_string()));
        let report = r.snapshot(None);
        assert_eq!(report.session_id, Some(SessionId::Text("s-1".to_string())));
    }
}
