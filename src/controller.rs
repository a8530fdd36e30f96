//! Voice session orchestration
//!
//! Owns the session state machine and wires the pipeline together:
//! capture frames flow through resampling and encoding into the
//! streaming session, and decoded inbound packets flow into the playback
//! scheduler. All state transitions happen on this task; capture and
//! render callbacks only ever touch their own queues.

use tokio::sync::mpsc;

use crate::audio::codec::{self, AudioFrame, CAPTURE_SAMPLE_RATE};
use crate::audio::{CaptureFeed, PlaybackScheduler, Resampler};
use crate::config::Config;
use crate::live::{SessionEvent, StreamingSession};
use crate::{Error, Result};

/// Lifecycle of one voice interaction.
///
/// `Idle` is initial; `Closed` is terminal and reachable from every
/// state via stop/cancel. All other edges are listed in
/// [`SessionState::can_transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session active
    Idle,
    /// Devices acquired, connection in progress
    Connecting,
    /// Connection open, audio flowing both ways
    Listening,
    /// A fatal fault occurred; teardown follows
    Error,
    /// The remote side ended the session
    Disconnected,
    /// Torn down; a new controller is needed to start again
    Closed,
}

impl SessionState {
    /// Valid-transition table.
    ///
    /// Closed is reachable from anywhere (including itself, so that
    /// repeated stops stay idempotent); everything else follows the
    /// forward path Idle -> Connecting -> Listening -> {Error,
    /// Disconnected}.
    #[must_use]
    pub const fn can_transition(self, next: Self) -> bool {
        matches!(
            (self, next),
            (_, Self::Closed)
                | (Self::Idle, Self::Connecting)
                | (
                    Self::Connecting,
                    Self::Listening | Self::Error | Self::Disconnected
                )
                | (Self::Listening, Self::Error | Self::Disconnected)
        )
    }

    /// Whether this state ends the session
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Idle => "Idle",
            Self::Connecting => "Connecting",
            Self::Listening => "Listening",
            Self::Error => "Error",
            Self::Disconnected => "Disconnected",
            Self::Closed => "Closed",
        };
        f.write_str(label)
    }
}

/// What the run loop observed in one iteration
enum Step {
    Event(Option<SessionEvent>),
    Frame(Option<AudioFrame>),
    Shutdown,
}

/// Orchestrates one voice session from start to teardown
pub struct VoiceSessionController {
    config: Config,
    state: SessionState,
    capture: Option<CaptureFeed>,
    playback: Option<PlaybackScheduler>,
    session: Option<StreamingSession>,
    events: Option<mpsc::Receiver<SessionEvent>>,
    resampler: Option<Resampler>,
}

impl VoiceSessionController {
    /// Create an idle controller
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self {
            config,
            state: SessionState::Idle,
            capture: None,
            playback: None,
            session: None,
            events: None,
            resampler: None,
        }
    }

    /// Current session state
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Acquire devices and open the streaming connection.
    ///
    /// The capture device is opened first, then the output device, then
    /// the connection. Audio does not flow until the session reports
    /// open (see [`Self::run`]).
    ///
    /// # Errors
    ///
    /// Returns the acquisition or connection error after transitioning
    /// to `Error` and tearing everything down.
    #[allow(clippy::future_not_send)]
    pub async fn start(&mut self) -> Result<()> {
        self.transition(SessionState::Connecting)?;

        match self.acquire().await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!(error = %e, "voice session failed to start");
                self.fail();
                Err(e)
            }
        }
    }

    async fn acquire(&mut self) -> Result<()> {
        let capture = CaptureFeed::open()?;
        let resampler = Resampler::new(capture.sample_rate(), CAPTURE_SAMPLE_RATE)?;
        if resampler.is_active() {
            tracing::info!(
                device_rate = capture.sample_rate(),
                uplink_rate = CAPTURE_SAMPLE_RATE,
                "resampling capture audio"
            );
        }
        let playback = PlaybackScheduler::open()?;

        let live = self.config.live_config()?;
        let (session, events) = StreamingSession::connect(&live).await?;

        self.capture = Some(capture);
        self.resampler = Some(resampler);
        self.playback = Some(playback);
        self.session = Some(session);
        self.events = Some(events);
        Ok(())
    }

    /// Drive the session until it ends.
    ///
    /// Runs the cooperative event loop: session lifecycle events, capture
    /// frames (once listening), and Ctrl-C all land here, so state and
    /// the playback timeline are only ever touched from one task.
    ///
    /// # Errors
    ///
    /// Returns the fault that ended the session; a clean shutdown or
    /// remote disconnect returns `Ok`.
    #[allow(clippy::future_not_send)]
    pub async fn run(&mut self) -> Result<()> {
        let mut events = self
            .events
            .take()
            .ok_or_else(|| Error::State("run() called before start()".to_string()))?;

        loop {
            let listening = self.state == SessionState::Listening;
            let step = {
                let capture = self.capture.as_ref();
                tokio::select! {
                    event = events.recv() => Step::Event(event),
                    frame = next_frame(capture), if listening => Step::Frame(frame),
                    _ = tokio::signal::ctrl_c() => Step::Shutdown,
                }
            };

            match step {
                Step::Shutdown => {
                    tracing::info!("stop requested");
                    self.stop();
                    return Ok(());
                }
                Step::Frame(Some(frame)) => self.forward_frame(&frame),
                Step::Frame(None) => {}
                Step::Event(Some(event)) => {
                    if self.handle_event(event)? {
                        return Ok(());
                    }
                }
                Step::Event(None) => {
                    // Event channel gone without a Closed event
                    self.note_transition(SessionState::Disconnected);
                    self.stop();
                    return Ok(());
                }
            }
        }
    }

    /// Handle one session event; true means the session ended cleanly
    fn handle_event(&mut self, event: SessionEvent) -> Result<bool> {
        match event {
            SessionEvent::Open => {
                if let Err(e) = self
                    .transition(SessionState::Listening)
                    .and_then(|()| self.begin_streaming())
                {
                    tracing::error!(error = %e, "could not begin streaming");
                    self.fail();
                    return Err(e);
                }
                Ok(false)
            }
            SessionEvent::Audio(packet) => {
                if let Some(playback) = self.playback.as_ref() {
                    // Per-packet failures never abort the session
                    if let Err(e) = playback.enqueue(packet) {
                        tracing::warn!(error = %e, "inbound packet dropped");
                    }
                }
                Ok(false)
            }
            SessionEvent::Interrupted => {
                tracing::debug!("model interrupted, flushing playback");
                if let Some(playback) = self.playback.as_ref() {
                    playback.stop_all();
                }
                Ok(false)
            }
            SessionEvent::Error(message) => {
                tracing::error!(error = %message, "voice session error, tearing down");
                self.fail();
                Err(Error::Connection(message))
            }
            SessionEvent::Closed => {
                self.note_transition(SessionState::Disconnected);
                self.stop();
                Ok(true)
            }
        }
    }

    /// Start playback and capture once the session is open
    fn begin_streaming(&mut self) -> Result<()> {
        if let Some(playback) = self.playback.as_mut() {
            playback.start()?;
        }
        if let Some(capture) = self.capture.as_mut() {
            capture.start()?;
        }
        tracing::info!("listening");
        Ok(())
    }

    /// Resample, encode, and send one capture frame; never fatal
    fn forward_frame(&mut self, frame: &AudioFrame) {
        let (Some(resampler), Some(session)) = (self.resampler.as_mut(), self.session.as_ref())
        else {
            return;
        };

        let samples = match resampler.process(&frame.samples) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "resample failed, frame dropped");
                return;
            }
        };
        if samples.is_empty() {
            return;
        }

        let chunk = codec::encode_frame(&AudioFrame {
            samples,
            sample_rate: CAPTURE_SAMPLE_RATE,
        });
        if let Err(e) = session.send(chunk) {
            tracing::warn!(error = %e, "outbound chunk dropped");
        }
    }

    /// Tear down in fixed order and transition to Closed.
    ///
    /// Idempotent and infallible: every release step runs even when a
    /// resource was never acquired or an earlier step already ran.
    pub fn stop(&mut self) {
        // 1. stop accepting new capture frames
        if let Some(capture) = self.capture.as_mut() {
            capture.stop();
        }
        // 2. close the streaming session (transport + buffered sends)
        if let Some(session) = self.session.take() {
            session.close();
        }
        self.events = None;
        // 3. cut off all scheduled playback
        if let Some(playback) = self.playback.as_ref() {
            playback.stop_all();
        }
        // 4. release the capture device
        if let Some(mut capture) = self.capture.take() {
            capture.close();
        }
        // 5. release the output device
        if let Some(mut playback) = self.playback.take() {
            playback.close();
        }
        self.resampler = None;

        if self.state != SessionState::Closed {
            tracing::info!(from = %self.state, "session closed");
            self.state = SessionState::Closed;
        }
    }

    /// Alias for [`Self::stop`]; cancellation and stop share teardown
    pub fn cancel(&mut self) {
        self.stop();
    }

    /// Move to `next`, rejecting edges outside the transition table.
    ///
    /// # Errors
    ///
    /// Returns `Error::State` for an invalid transition.
    fn transition(&mut self, next: SessionState) -> Result<()> {
        if !self.state.can_transition(next) {
            return Err(Error::State(format!("{} -> {next}", self.state)));
        }
        tracing::info!(from = %self.state, to = %next, "session state");
        self.state = next;
        Ok(())
    }

    /// Transition on an internally-driven edge; a rejected edge here is
    /// a logic bug worth logging, not a caller error
    fn note_transition(&mut self, next: SessionState) {
        if let Err(e) = self.transition(next) {
            tracing::debug!(error = %e, "transition skipped");
        }
    }

    /// Enter Error state and run full teardown
    fn fail(&mut self) {
        self.note_transition(SessionState::Error);
        self.stop();
    }
}

impl Drop for VoiceSessionController {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Next frame from the capture feed, or pending forever without one
async fn next_frame(capture: Option<&CaptureFeed>) -> Option<AudioFrame> {
    match capture {
        Some(feed) => feed.next_frame().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_idle() {
        let controller = VoiceSessionController::new(Config::default());
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[test]
    fn test_stop_is_idempotent_from_any_state() {
        let mut controller = VoiceSessionController::new(Config::default());

        controller.stop();
        assert_eq!(controller.state(), SessionState::Closed);

        // Second stop must not error or change state
        controller.stop();
        assert_eq!(controller.state(), SessionState::Closed);
    }

    #[test]
    fn test_cancel_reaches_closed() {
        let mut controller = VoiceSessionController::new(Config::default());
        controller.cancel();
        assert_eq!(controller.state(), SessionState::Closed);
        assert!(controller.state().is_terminal());
    }

    #[tokio::test]
    async fn test_start_after_close_is_rejected() {
        let mut controller = VoiceSessionController::new(Config::default());
        controller.stop();

        let err = controller.start().await.unwrap_err();
        assert!(matches!(err, Error::State(_)));
    }

    #[tokio::test]
    async fn test_run_before_start_is_rejected() {
        let mut controller = VoiceSessionController::new(Config::default());
        let err = controller.run().await.unwrap_err();
        assert!(matches!(err, Error::State(_)));
    }

    #[test]
    fn test_transition_table() {
        use SessionState::{Closed, Connecting, Disconnected, Error, Idle, Listening};

        assert!(Idle.can_transition(Connecting));
        assert!(Connecting.can_transition(Listening));
        assert!(Connecting.can_transition(Error));
        assert!(Listening.can_transition(Disconnected));
        assert!(Listening.can_transition(Error));

        // Closed from everywhere
        for state in [Idle, Connecting, Listening, Error, Disconnected, Closed] {
            assert!(state.can_transition(Closed));
        }

        // No skipping forward or moving backward
        assert!(!Idle.can_transition(Listening));
        assert!(!Listening.can_transition(Connecting));
        assert!(!Closed.can_transition(Connecting));
        assert!(!Error.can_transition(Listening));
        assert!(!Disconnected.can_transition(Listening));
    }
}
