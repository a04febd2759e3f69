//! The per-activation session loop.
//!
//! One task owns the activity counter, the playback controller and the
//! session reporter, and processes everything strictly in arrival order:
//!
//! - editor events from [`SessionHandle::send_event`]
//! - the decay tick (1s): decays the level, accumulates stats, publishes a
//!   status update
//! - the report tick (60s): sends accumulated stats to the backend
//!
//! Network work never runs on this task. Playback commands go to the player
//! worker and reports go out on a spawned task whose outcome comes back over
//! a channel, so a slow backend never delays a tick.
//!
//! [`SessionHandle::dispose`] stops the loop and waits for it, so no tick
//! fires after it returns.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::activity::{ActivityCounter, ActivityEvent, LevelChange};
use crate::backend::{BackendClient, BackendError};
use crate::playback::{PlaybackCommand, PlaybackController, PlaybackState};
use crate::player::PlayerHandle;
use crate::reporter::{SessionReporter, SessionStats};
use crate::types::{SessionId, SessionReport, SpotifyUser, UserSettings};

/// Default decay tick interval.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Default interval between backend reports.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(60);

/// How long teardown waits for queued playback commands.
const SHUTDOWN_TIMEOUT_SECS: u64 = 5;

/// Capacity of the editor input channel.
const INPUT_BUFFER: usize = 256;

/// Capacity of the status update channel.
const UPDATE_BUFFER: usize = 64;

/// Timing and initial settings for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub tick_interval: Duration,
    pub report_interval: Duration,
    pub shutdown_timeout: Duration,
    pub settings: UserSettings,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            report_interval: DEFAULT_REPORT_INTERVAL,
            shutdown_timeout: Duration::from_secs(SHUTDOWN_TIMEOUT_SECS),
            settings: UserSettings::default(),
        }
    }
}

/// Where session reports go.
#[derive(Debug, Clone)]
pub struct Reporting {
    pub backend: BackendClient,
    pub user: Option<SpotifyUser>,
}

/// Published after every decay tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusUpdate {
    pub level: u32,
    pub state: PlaybackState,
}

impl StatusUpdate {
    /// Text for the editor's status bar.
    #[must_use]
    pub fn text(&self) -> String {
        format!("{} seconds left", self.level)
    }
}

/// Final state handed back by [`SessionHandle::dispose`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub stats: SessionStats,
    pub state: PlaybackState,
}

/// The session task has already stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("session is no longer running")]
pub struct SessionClosed;

#[derive(Debug)]
enum SessionInput {
    Activity(ActivityEvent),
    Settings(UserSettings),
}

struct FlushOutcome {
    report: SessionReport,
    result: Result<SessionId, BackendError>,
}

/// Controls a running session.
#[derive(Debug)]
pub struct SessionHandle {
    input: mpsc::Sender<SessionInput>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<SessionSummary>,
}

impl SessionHandle {
    /// Forwards an editor event to the activity counter.
    ///
    /// # Errors
    ///
    /// Returns `SessionClosed` once the session has stopped.
    pub async fn send_event(&self, event: ActivityEvent) -> Result<(), SessionClosed> {
        self.input
            .send(SessionInput::Activity(event))
            .await
            .map_err(|_| SessionClosed)
    }

    /// Replaces the keypress increment and hard mode flag.
    ///
    /// # Errors
    ///
    /// Returns `SessionClosed` once the session has stopped.
    pub async fn update_settings(&self, settings: UserSettings) -> Result<(), SessionClosed> {
        self.input
            .send(SessionInput::Settings(settings))
            .await
            .map_err(|_| SessionClosed)
    }

    /// Stops both ticks, zeroes the level, pauses playback if it was playing
    /// and waits for the session task to finish.
    pub async fn dispose(mut self) -> SessionSummary {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }

        match self.task.await {
            Ok(summary) => summary,
            Err(e) => {
                error!(error = %e, "Session task failed");
                SessionSummary::default()
            }
        }
    }
}

/// State owned by the session task.
pub struct Session {
    counter: ActivityCounter,
    controller: PlaybackController,
    reporter: SessionReporter,
    player: PlayerHandle,
    reporting: Option<Reporting>,
    updates: mpsc::Sender<StatusUpdate>,
    flush_task: Option<JoinHandle<()>>,
    // Cleared only once the outcome has been applied, not when the task ends.
    flush_in_flight: bool,
}

impl Session {
    /// Starts a session on a new task.
    ///
    /// Returns the control handle and the stream of status updates. With
    /// `reporting` unset, stats are still tracked but never sent.
    #[must_use]
    pub fn spawn(
        config: SessionConfig,
        player: PlayerHandle,
        reporting: Option<Reporting>,
    ) -> (SessionHandle, mpsc::Receiver<StatusUpdate>) {
        let (input_tx, input_rx) = mpsc::channel(INPUT_BUFFER);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (updates_tx, updates_rx) = mpsc::channel(UPDATE_BUFFER);

        let session = Self::new(config.settings, player, reporting, updates_tx);
        let task = tokio::spawn(session.run(config, input_rx, shutdown_rx));

        let handle = SessionHandle {
            input: input_tx,
            shutdown: Some(shutdown_tx),
            task,
        };
        (handle, updates_rx)
    }

    fn new(
        settings: UserSettings,
        player: PlayerHandle,
        reporting: Option<Reporting>,
        updates: mpsc::Sender<StatusUpdate>,
    ) -> Self {
        Self {
            counter: ActivityCounter::new(settings),
            controller: PlaybackController::new(),
            reporter: SessionReporter::new(),
            player,
            reporting,
            updates,
            flush_task: None,
            flush_in_flight: false,
        }
    }

    async fn run(
        mut self,
        config: SessionConfig,
        mut input_rx: mpsc::Receiver<SessionInput>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) -> SessionSummary {
        let start = Instant::now();

        let mut decay = interval_at(start + config.tick_interval, config.tick_interval);
        decay.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut report = interval_at(start + config.report_interval, config.report_interval);
        report.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let (flush_tx, mut flush_rx) = mpsc::channel::<FlushOutcome>(1);

        info!(
            tick_ms = config.tick_interval.as_millis(),
            report_secs = config.report_interval.as_secs(),
            keypress = config.settings.keypress,
            hard_mode = config.settings.hard_mode,
            "Session started"
        );

        loop {
            tokio::select! {
                biased;

                // Also fires if the handle was dropped without disposing.
                _ = &mut shutdown_rx => break,

                input = input_rx.recv() => match input {
                    Some(input) => self.handle_input(input),
                    None => break,
                },

                _ = decay.tick() => self.on_decay_tick(),

                _ = report.tick() => self.start_flush(&flush_tx),

                Some(outcome) = flush_rx.recv() => self.finish_flush(outcome),
            }
        }

        self.teardown(config.shutdown_timeout).await
    }

    fn handle_input(&mut self, input: SessionInput) {
        match input {
            SessionInput::Activity(event) => {
                let change = self.counter.apply(event);
                self.on_level_change(change);
            }
            SessionInput::Settings(settings) => {
                info!(
                    keypress = settings.keypress,
                    hard_mode = settings.hard_mode,
                    "Settings updated"
                );
                self.counter.update_settings(settings);
            }
        }
    }

    fn on_level_change(&mut self, change: LevelChange) {
        if let Some(command) = self.controller.on_level_change(change) {
            self.issue(command);
        }
    }

    fn issue(&mut self, command: PlaybackCommand) {
        if command == PlaybackCommand::Pause {
            self.reporter.record_pause();
        }
        debug!(?command, "Playback transition");
        self.player.submit(command);
    }

    fn on_decay_tick(&mut self) {
        self.reporter.tick(self.controller.state());

        let change = self.counter.apply(ActivityEvent::DecayTick);
        self.on_level_change(change);

        let update = StatusUpdate {
            level: self.counter.level(),
            state: self.controller.state(),
        };
        if self.updates.try_send(update).is_err() {
            debug!("Status update dropped");
        }
    }

    fn start_flush(&mut self, outcomes: &mpsc::Sender<FlushOutcome>) {
        let Some(reporting) = &self.reporting else {
            return;
        };
        if self.flush_in_flight {
            debug!("Previous report still in flight, skipping");
            return;
        }

        let report = self.reporter.snapshot(reporting.user.clone());
        let backend = reporting.backend.clone();
        let outcomes = outcomes.clone();

        self.flush_in_flight = true;
        self.flush_task = Some(tokio::spawn(async move {
            let result = backend.report_session(&report).await;
            let _ = outcomes.send(FlushOutcome { report, result }).await;
        }));
    }

    fn finish_flush(&mut self, outcome: FlushOutcome) {
        self.flush_in_flight = false;
        match outcome.result {
            Ok(session_id) => self.reporter.acknowledge(&outcome.report, session_id),
            Err(e) => warn!(error = %e, "Session report failed, will include in next report"),
        }
    }

    async fn teardown(mut self, timeout: Duration) -> SessionSummary {
        self.counter.reset();
        if let Some(command) = self.controller.force_pause() {
            self.issue(command);
        }
        if let Some(task) = self.flush_task.take() {
            task.abort();
        }

        let summary = SessionSummary {
            stats: self.reporter.stats().clone(),
            state: self.controller.state(),
        };

        self.player.shutdown(timeout).await;
        info!(
            elapsed_seconds = summary.stats.elapsed_seconds,
            music_seconds = summary.stats.music_seconds,
            "Session stopped"
        );
        summary
    }
}
