use crate::pipeline::{Event, Message, Plugin};
use glyphstore_events::{BlockingQueue, EventError};
use std::sync::Arc;
use std::time::Duration;

/// Exposes `waitForMessage`/`waitForJSONMessageWithType` by pushing
/// incoming frames into a blocking queue; a pure pass-through otherwise
/// (§4.5 "Promise/queue helper").
pub struct QueueHelperPlugin {
    queue: Arc<BlockingQueue<Event>>,
}

impl QueueHelperPlugin {
    pub fn new(max_queue_len: usize) -> Self {
        Self {
            queue: Arc::new(BlockingQueue::new(max_queue_len, false)),
        }
    }

    pub fn wait_for_message(&self, timeout: Duration) -> Result<Event, EventError> {
        self.queue.remove(timeout)
    }

    pub fn wait_for_json_message_with_type(&self, expected_type: &str, timeout: Duration) -> Result<serde_json::Value, EventError> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                return Err(EventError::Timeout);
            }
            let evt = self.queue.remove(remaining)?;
            if let Event::Message(Message::Text(t)) = evt {
                if let Ok(value) = serde_json::from_str::<serde_json::Value>(&t) {
                    if value.get("type").and_then(|v| v.as_str()) == Some(expected_type) {
                        return Ok(value);
                    }
                }
            }
        }
    }
}

impl Plugin for QueueHelperPlugin {
    fn transform_incoming(&mut self, evt: Event) -> Option<Event> {
        let _ = self.queue.add(evt.clone());
        Some(evt)
    }

    fn transform_outgoing(&mut self, evt: Event) -> Option<Event> {
        Some(evt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_for_message_returns_pushed_event() {
        let mut plugin = QueueHelperPlugin::new(8);
        plugin.transform_incoming(Event::Message(Message::Text("hi".into())));
        let evt = plugin.wait_for_message(Duration::from_millis(50)).unwrap();
        assert_eq!(evt, Event::Message(Message::Text("hi".into())));
    }

    #[test]
    fn wait_for_json_message_with_type_filters_by_type() {
        let mut plugin = QueueHelperPlugin::new(8);
        plugin.transform_incoming(Event::Message(Message::Text(r#"{"type":"other"}"#.into())));
        plugin.transform_incoming(Event::Message(Message::Text(r#"{"type":"wanted","value":1}"#.into())));
        let value = plugin.wait_for_json_message_with_type("wanted", Duration::from_millis(50)).unwrap();
        assert_eq!(value["value"], 1);
    }
}
