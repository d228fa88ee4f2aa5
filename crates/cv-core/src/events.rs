//! Playback event system.
//!
//! [`EventBus`] wraps a `tokio::sync::broadcast` channel with a bounded
//! ring-buffer of recent status events so that late subscribers (a UI that
//! attaches after live mode started) can catch up. High-frequency progress
//! events are broadcast but not retained.

use std::collections::VecDeque;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::ids::{ClipId, RequestId};
use crate::segment::TimeRange;

/// Maximum number of events retained in the ring buffer.
const MAX_RECENT_EVENTS: usize = 100;

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

/// What the playback cursor is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackMode {
    Idle,
    ClipPlayback,
    LiveFollow,
}

/// Scrubbing transport state layered over normal playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    #[default]
    Normal,
    FastForward,
    Rewind,
}

// ---------------------------------------------------------------------------
// EventCategory
// ---------------------------------------------------------------------------

/// Audience category for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    /// Mode changes, live-follow transitions, clip lifecycle, faults.
    Status,
    /// Position and length updates.
    Progress,
}

// ---------------------------------------------------------------------------
// EventPayload
// ---------------------------------------------------------------------------

/// Payload describing what happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    // -- Cursor --------------------------------------------------------------
    ModeChanged {
        mode: PlaybackMode,
    },
    TransportChanged {
        transport: TransportMode,
    },

    // -- Clip playback -------------------------------------------------------
    ClipRequested {
        request_id: RequestId,
        range: TimeRange,
    },
    ClipReady {
        request_id: RequestId,
        clip_id: ClipId,
        path: PathBuf,
    },
    ClipFailed {
        request_id: RequestId,
        error: String,
    },

    // -- Live follow ---------------------------------------------------------
    LiveLoading {
        segment: PathBuf,
    },
    LiveFollowing {
        segment: PathBuf,
    },
    LiveAwaitingNext {
        segment: PathBuf,
    },
    LiveUnchanged {
        segment: PathBuf,
    },
    LiveEnded {
        reason: String,
    },

    // -- Engine --------------------------------------------------------------
    Position {
        position: f64,
        time_ms: u64,
    },
    LengthKnown {
        length_ms: u64,
    },
    EngineFault {
        message: String,
    },
}

impl EventPayload {
    /// The category this payload is broadcast under.
    pub fn category(&self) -> EventCategory {
        match self {
            Self::Position { .. } | Self::LengthKnown { .. } => EventCategory::Progress,
            _ => EventCategory::Status,
        }
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A timestamped, categorised event ready for broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier.
    pub id: Uuid,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Audience category.
    pub category: EventCategory,
    /// What happened.
    pub payload: EventPayload,
}

impl Event {
    /// Create a new event with a fresh UUID and the current timestamp.
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            category: payload.category(),
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast channel with a bounded ring buffer of recent status events.
pub struct EventBus {
    tx: broadcast::Sender<Event>,
    recent: RwLock<VecDeque<Event>>,
}

impl EventBus {
    /// Create a new event bus.
    ///
    /// `capacity` controls the broadcast channel buffer size (not the ring
    /// buffer, which is always [`MAX_RECENT_EVENTS`]).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            recent: RwLock::new(VecDeque::with_capacity(MAX_RECENT_EVENTS)),
        }
    }

    /// Subscribe to the broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Broadcast an event to all current subscribers; status events are
    /// also kept in the ring buffer.
    pub fn broadcast(&self, payload: EventPayload) {
        let event = Event::new(payload);

        if event.category == EventCategory::Status {
            let mut recent = self.recent.write();
            if recent.len() >= MAX_RECENT_EVENTS {
                recent.pop_back();
            }
            recent.push_front(event.clone());
        }

        // Ignore send errors (no subscribers).
        let _ = self.tx.send(event);
    }

    /// Return the `n` most recent status events (newest first).
    pub fn recent_events(&self, n: usize) -> Vec<Event> {
        let recent = self.recent.read();
        recent.iter().take(n).cloned().collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.broadcast(EventPayload::ModeChanged {
            mode: PlaybackMode::LiveFollow,
        });

        let event = rx.try_recv().unwrap();
        assert_eq!(event.category, EventCategory::Status);
        assert_eq!(
            event.payload,
            EventPayload::ModeChanged {
                mode: PlaybackMode::LiveFollow
            }
        );
    }

    #[test]
    fn recent_events_capped() {
        let bus = EventBus::new(256);
        for _ in 0..150 {
            bus.broadcast(EventPayload::LiveEnded {
                reason: "stopped".into(),
            });
        }
        assert_eq!(bus.recent_events(200).len(), MAX_RECENT_EVENTS);
    }

    #[test]
    fn progress_events_are_not_retained() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.broadcast(EventPayload::Position {
            position: 0.5,
            time_ms: 1000,
        });
        bus.broadcast(EventPayload::LiveLoading {
            segment: PathBuf::from("a.mp4"),
        });

        assert_eq!(rx.try_recv().unwrap().category, EventCategory::Progress);
        let recent = bus.recent_events(10);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].category, EventCategory::Status);
    }

    #[test]
    fn no_subscribers_does_not_panic() {
        let bus = EventBus::new(4);
        bus.broadcast(EventPayload::EngineFault {
            message: "decoder".into(),
        });
    }

    #[test]
    fn payload_serializes_with_type_tag() {
        let json = serde_json::to_value(EventPayload::TransportChanged {
            transport: TransportMode::FastForward,
        })
        .unwrap();
        assert_eq!(json["type"], "transport_changed");
        assert_eq!(json["transport"], "fast_forward");
    }
}
