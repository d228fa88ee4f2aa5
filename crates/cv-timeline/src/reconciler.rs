//! The live-follow state machine.
//!
//! ```text
//! Idle ──enter──▶ Loading(s) ──started──▶ Following(s) ──end──▶ AwaitingNext(s)
//!                    ▲                                              │
//!                    └──────────── poll finds s' ≠ s ───────────────┘
//! ```
//!
//! Polling in `AwaitingNext` re-runs the live-tail selection; it stays put
//! while the selection still returns the exhausted segment. Any state drops
//! to `Idle` on [`LiveReconciler::stop`], an engine error, or a selection
//! failure while waiting.

use std::sync::Arc;
use std::time::Duration;

use cv_core::Segment;

use crate::engine::{EngineEvent, PlaybackEngine, PlaybackUri};
use crate::live::LiveTailSelector;

/// Where live following currently stands.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LiveState {
    #[default]
    Idle,
    Loading(Segment),
    Following(Segment),
    AwaitingNext(Segment),
}

impl LiveState {
    /// The segment being shown (or just exhausted), if any.
    pub fn segment(&self) -> Option<&Segment> {
        match self {
            Self::Idle => None,
            Self::Loading(s) | Self::Following(s) | Self::AwaitingNext(s) => Some(s),
        }
    }
}

/// A transition (or notable non-transition) the owner may want to report.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveUpdate {
    Loading(Segment),
    /// Playback started; `seek` is the near-live position jumped to, if any.
    Following { segment: Segment, seek: Option<f64> },
    /// The near-live jump, issued once the length became known.
    NearLiveSeek(f64),
    AwaitingNext(Segment),
    /// A poll found nothing newer than the exhausted segment.
    Unchanged(Segment),
    /// Live following stopped on its own.
    Ended(String),
}

/// Keeps playback pinned to the live tail across segment rotations.
pub struct LiveReconciler {
    selector: Arc<LiveTailSelector>,
    lookback: Option<Duration>,
    state: LiveState,
    length_ms: Option<u64>,
    near_live_pending: bool,
}

impl LiveReconciler {
    /// `lookback`: how far before the end of a freshly loaded segment to
    /// start; `None` plays it from the beginning.
    pub fn new(selector: Arc<LiveTailSelector>, lookback: Option<Duration>) -> Self {
        Self {
            selector,
            lookback,
            state: LiveState::Idle,
            length_ms: None,
            near_live_pending: false,
        }
    }

    pub fn selector(&self) -> &Arc<LiveTailSelector> {
        &self.selector
    }

    pub fn state(&self) -> &LiveState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        self.state != LiveState::Idle
    }

    pub fn is_awaiting(&self) -> bool {
        matches!(self.state, LiveState::AwaitingNext(_))
    }

    /// Select the live tail and load it.
    pub async fn enter(&mut self, engine: &mut dyn PlaybackEngine) -> cv_core::Result<LiveUpdate> {
        let selected = self.selector.select().await;
        self.start(selected, engine)
    }

    /// Load the outcome of a live-tail selection made on entering live mode.
    ///
    /// # Errors
    ///
    /// The selection error, or the engine's load error; the state is then
    /// `Idle`.
    pub fn start(
        &mut self,
        selected: cv_core::Result<Segment>,
        engine: &mut dyn PlaybackEngine,
    ) -> cv_core::Result<LiveUpdate> {
        match selected {
            Ok(segment) => self.load(segment, engine),
            Err(e) => {
                self.state = LiveState::Idle;
                Err(e)
            }
        }
    }

    /// Poll once from `AwaitingNext`; does nothing in other states.
    pub async fn poll(&mut self, engine: &mut dyn PlaybackEngine) -> Option<LiveUpdate> {
        if !self.is_awaiting() {
            return None;
        }
        let selected = self.selector.select().await;
        self.on_selection(selected, engine)
    }

    /// Apply the outcome of a poll-time selection.
    pub fn on_selection(
        &mut self,
        selected: cv_core::Result<Segment>,
        engine: &mut dyn PlaybackEngine,
    ) -> Option<LiveUpdate> {
        let LiveState::AwaitingNext(exhausted) = &self.state else {
            return None;
        };

        match selected {
            Ok(segment) if &segment == exhausted => {
                tracing::debug!("No segment newer than {segment} yet");
                Some(LiveUpdate::Unchanged(segment))
            }
            Ok(segment) => match self.load(segment, engine) {
                Ok(update) => Some(update),
                Err(e) => Some(LiveUpdate::Ended(e.to_string())),
            },
            Err(e) => {
                tracing::warn!("Live tail lost while waiting for the next segment: {e}");
                self.state = LiveState::Idle;
                Some(LiveUpdate::Ended(e.to_string()))
            }
        }
    }

    /// Feed an engine notification through the state machine.
    pub fn on_engine_event(
        &mut self,
        event: &EngineEvent,
        engine: &mut dyn PlaybackEngine,
    ) -> Option<LiveUpdate> {
        match (event, self.state.clone()) {
            (_, LiveState::Idle) => None,
            (EngineEvent::LengthKnown { length_ms }, state) => {
                self.length_ms = Some(*length_ms);
                match state {
                    LiveState::Following(_) => {
                        self.near_live_seek(engine).map(LiveUpdate::NearLiveSeek)
                    }
                    _ => None,
                }
            }
            (EngineEvent::PlaybackStarted, LiveState::Loading(segment)) => {
                tracing::info!("Following live segment {segment}");
                self.state = LiveState::Following(segment.clone());
                self.near_live_pending = self.lookback.is_some();
                let seek = self.near_live_seek(engine);
                Some(LiveUpdate::Following { segment, seek })
            }
            (
                EngineEvent::EndOfStream,
                LiveState::Loading(segment) | LiveState::Following(segment),
            ) => {
                tracing::info!("Reached the end of {segment}; waiting for the next segment");
                self.state = LiveState::AwaitingNext(segment.clone());
                Some(LiveUpdate::AwaitingNext(segment))
            }
            (EngineEvent::EngineError(message), _) => {
                tracing::error!("Engine failed during live follow: {message}");
                self.state = LiveState::Idle;
                Some(LiveUpdate::Ended(format!("engine error: {message}")))
            }
            _ => None,
        }
    }

    /// Leave live mode. Returns whether it was active.
    pub fn stop(&mut self) -> bool {
        let was_active = self.is_active();
        self.state = LiveState::Idle;
        self.near_live_pending = false;
        was_active
    }

    fn load(
        &mut self,
        segment: Segment,
        engine: &mut dyn PlaybackEngine,
    ) -> cv_core::Result<LiveUpdate> {
        engine.reset();
        self.length_ms = None;
        self.near_live_pending = false;

        if let Err(e) = engine.load(&PlaybackUri::from_path(&segment.path)) {
            tracing::warn!("Could not load live segment {segment}: {e}");
            self.state = LiveState::Idle;
            return Err(e);
        }
        engine.play();

        tracing::info!("Loading live segment {segment}");
        self.state = LiveState::Loading(segment.clone());
        Ok(LiveUpdate::Loading(segment))
    }

    /// Jump close to the end of the segment, once per load.
    fn near_live_seek(&mut self, engine: &mut dyn PlaybackEngine) -> Option<f64> {
        if !self.near_live_pending {
            return None;
        }
        let (Some(lookback), Some(length_ms)) = (self.lookback, self.length_ms) else {
            return None;
        };
        self.near_live_pending = false;

        let lookback_ms = u64::try_from(lookback.as_millis()).unwrap_or(u64::MAX);
        if length_ms <= lookback_ms {
            return None;
        }
        let target = (length_ms - lookback_ms) as f64 / length_ms as f64;
        tracing::debug!("Seeking to {target:.3} ({}s before the end)", lookback.as_secs());
        engine.seek(target);
        Some(target)
    }
}
