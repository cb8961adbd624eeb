//! Stock notification events and the pub/sub mechanics used to fan them out.
//!
//! Notifications are fire-and-forget: the ledger's movement log is the source
//! of truth, and a failed publish never undoes a committed write.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::{EnvelopeError, EventEnvelope};
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
