//! Supersession of in-flight requests.

use cv_core::RequestId;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Handle for one request started through a [`RequestSlot`].
#[derive(Debug, Clone)]
pub struct Ticket {
    pub id: RequestId,
    pub token: CancellationToken,
}

/// Holds at most one in-flight request of a kind.
///
/// Beginning a new request cancels the previous one's token, so its work
/// is torn down instead of awaited, and makes the previous id stale so a
/// late result can be recognised and dropped.
#[derive(Debug, Default)]
pub struct RequestSlot {
    current: Mutex<Option<Ticket>>,
}

impl RequestSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a request, superseding any in flight.
    pub fn begin(&self) -> Ticket {
        let ticket = Ticket {
            id: RequestId::new(),
            token: CancellationToken::new(),
        };
        if let Some(previous) = self.current.lock().replace(ticket.clone()) {
            tracing::debug!("Request {} superseded by {}", previous.id, ticket.id);
            previous.token.cancel();
        }
        ticket
    }

    /// Cancel whatever is in flight.
    pub fn cancel(&self) {
        if let Some(previous) = self.current.lock().take() {
            tracing::debug!("Request {} cancelled", previous.id);
            previous.token.cancel();
        }
    }

    /// Mark `id` complete. Returns `false` when it was superseded or
    /// cancelled, in which case its result must be ignored.
    pub fn finish(&self, id: RequestId) -> bool {
        let mut current = self.current.lock();
        match current.as_ref() {
            Some(ticket) if ticket.id == id => {
                *current = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.current.lock().is_some()
    }
}
