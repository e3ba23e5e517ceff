//! Published events

use serde::{Deserialize, Serialize};

use crate::ids::EventId;

/// An immutable published event
///
/// The payload's fields are flattened next to `id` on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event<P> {
    pub id: EventId,
    #[serde(flatten)]
    pub payload: P,
}

impl<P> Event<P> {
    /// Create an event with a freshly generated id
    pub fn new(payload: P) -> Self {
        Self::with_id(EventId::new(), payload)
    }

    pub fn with_id(id: EventId, payload: P) -> Self {
        Self { id, payload }
    }
}
