//! Background consumer for stock notifications.
//!
//! The ledger publishes after every committed change. The API has no broker,
//! so the default sink writes each notification to the structured log; other
//! consumers can take their own subscription from `AppServices`.

use std::sync::mpsc::RecvTimeoutError;
use std::thread;
use std::time::Duration;

use serde_json::Value as JsonValue;
use tracing::{debug, info};

use stockledger_events::{EventEnvelope, Subscription};

/// Spawn the log sink. It stops once every publisher is gone.
pub fn spawn_event_log(
    subscription: Subscription<EventEnvelope<JsonValue>>,
) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("stock-event-log".to_string())
        .spawn(move || event_log_loop(subscription))
}

fn event_log_loop(subscription: Subscription<EventEnvelope<JsonValue>>) {
    let tick = Duration::from_millis(250);
    loop {
        match subscription.recv_timeout(tick) {
            Ok(envelope) => info!(
                event_id = %envelope.event_id(),
                event_type = envelope.event_type(),
                stream = envelope.stream(),
                payload = %envelope.payload(),
                "stock notification"
            ),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("event bus closed, stopping notification log");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use stockledger_events::{EventBus, InMemoryEventBus};

    #[test]
    fn sink_stops_when_the_bus_is_dropped() {
        let bus: Arc<InMemoryEventBus<EventEnvelope<JsonValue>>> = Arc::new(InMemoryEventBus::new());
        let handle = spawn_event_log(bus.subscribe()).unwrap();

        bus.publish(EventEnvelope::new(
            uuid::Uuid::now_v7(),
            "stock/test",
            "inventory.stock.reserved",
            1,
            chrono::Utc::now(),
            serde_json::json!({}),
        ))
        .unwrap();
        drop(bus);

        handle.join().unwrap();
    }
}
