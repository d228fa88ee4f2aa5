//! Scrubbing helpers: the seek gate, progress throttling, and the
//! fast-forward / rewind transport.

use std::time::Duration;

use cv_core::events::TransportMode;
use tokio::time::Instant;

use crate::engine::PlaybackEngine;

// ---------------------------------------------------------------------------
// SeekGate
// ---------------------------------------------------------------------------

/// Suppresses stale position reports while a user seek is in flight.
///
/// After [`SeekGate::request`], reported positions are held back until one
/// lands within `tolerance` of the target or `timeout` has passed since the
/// request, whichever comes first. Either way the gate then reopens.
#[derive(Debug, Clone)]
pub struct SeekGate {
    tolerance: f64,
    timeout: Duration,
    pending: Option<PendingSeek>,
}

#[derive(Debug, Clone, Copy)]
struct PendingSeek {
    target: f64,
    since: Instant,
}

impl SeekGate {
    pub fn new(tolerance: f64, timeout: Duration) -> Self {
        Self {
            tolerance,
            timeout,
            pending: None,
        }
    }

    /// Record a seek to `target`, clamped to `[0, 1]`; returns the clamped
    /// value. A newer request replaces an older one.
    pub fn request(&mut self, target: f64, now: Instant) -> f64 {
        let target = target.clamp(0.0, 1.0);
        self.pending = Some(PendingSeek { target, since: now });
        target
    }

    /// Whether a reported `position` should reach the UI.
    pub fn admit(&mut self, position: f64, now: Instant) -> bool {
        let Some(pending) = self.pending else {
            return true;
        };

        if (position - pending.target).abs() <= self.tolerance {
            tracing::trace!("Seek to {:.3} confirmed at {position:.3}", pending.target);
            self.pending = None;
            return true;
        }
        if now.saturating_duration_since(pending.since) >= self.timeout {
            tracing::debug!(
                "Seek to {:.3} not confirmed within {:?}; accepting {position:.3}",
                pending.target,
                self.timeout
            );
            self.pending = None;
            return true;
        }
        false
    }

    pub fn clear(&mut self) {
        self.pending = None;
    }

    pub fn pending(&self) -> Option<f64> {
        self.pending.map(|p| p.target)
    }
}

// ---------------------------------------------------------------------------
// ProgressThrottle
// ---------------------------------------------------------------------------

/// Lets at most one progress update through per interval.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Fast-forward and rewind, layered over normal playback.
///
/// Fast-forward raises the engine rate. Rewind has no engine support and is
/// driven by the owner calling [`Transport::rewind_target`] on a ticker and
/// seeking there. Engaging one mode releases the other.
#[derive(Debug, Clone)]
pub struct Transport {
    mode: TransportMode,
    fast_forward_rate: f32,
    rewind_step: Duration,
}

impl Transport {
    pub fn new(fast_forward_rate: f32, rewind_step: Duration) -> Self {
        Self {
            mode: TransportMode::Normal,
            fast_forward_rate,
            rewind_step,
        }
    }

    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    pub fn is_active(&self) -> bool {
        self.mode != TransportMode::Normal
    }

    /// Engage fast-forward. Only takes effect while media is playing.
    /// Returns whether the mode changed.
    pub fn fast_forward(&mut self, playing: bool, engine: &mut dyn PlaybackEngine) -> bool {
        if !playing || self.mode == TransportMode::FastForward {
            return false;
        }
        engine.set_rate(self.fast_forward_rate);
        self.mode = TransportMode::FastForward;
        true
    }

    /// Engage rewind. Returns whether the mode changed.
    pub fn rewind(&mut self, engine: &mut dyn PlaybackEngine) -> bool {
        match self.mode {
            TransportMode::Rewind => false,
            TransportMode::FastForward => {
                engine.set_rate(1.0);
                self.mode = TransportMode::Rewind;
                true
            }
            TransportMode::Normal => {
                self.mode = TransportMode::Rewind;
                true
            }
        }
    }

    /// Return to normal playback. Returns whether the mode changed.
    pub fn release(&mut self, engine: &mut dyn PlaybackEngine) -> bool {
        match self.mode {
            TransportMode::Normal => false,
            TransportMode::FastForward => {
                engine.set_rate(1.0);
                self.mode = TransportMode::Normal;
                true
            }
            TransportMode::Rewind => {
                self.mode = TransportMode::Normal;
                true
            }
        }
    }

    /// Forget the mode without touching the engine (the media was reset).
    pub fn clear(&mut self) {
        self.mode = TransportMode::Normal;
    }

    /// Where one rewind step from `position` lands, in normalised units.
    /// `None` while the media length is unknown.
    pub fn rewind_target(&self, position: f64, length_ms: Option<u64>) -> Option<f64> {
        let length_ms = length_ms.filter(|l| *l > 0)?;
        let step = self.rewind_step.as_millis() as f64 / length_ms as f64;
        Some((position - step).max(0.0))
    }
}
