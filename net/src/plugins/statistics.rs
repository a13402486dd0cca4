use crate::pipeline::{Event, Message, Plugin};
use std::time::Instant;

/// Counts bytes and records open/close timestamps (§4.5 "Statistics").
pub struct StatisticsPlugin {
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub opened_at: Option<Instant>,
    pub closed_at: Option<Instant>,
    pub last_close_event: Option<Event>,
}

impl Default for StatisticsPlugin {
    fn default() -> Self {
        Self {
            bytes_in: 0,
            bytes_out: 0,
            opened_at: None,
            closed_at: None,
            last_close_event: None,
        }
    }
}

fn event_len(evt: &Event) -> u64 {
    match evt {
        Event::Message(Message::Text(t)) => t.len() as u64,
        Event::Message(Message::Bytes(b)) => b.len() as u64,
        _ => 0,
    }
}

impl Plugin for StatisticsPlugin {
    fn transform_incoming(&mut self, evt: Event) -> Option<Event> {
        match &evt {
            Event::Opened => self.opened_at = Some(Instant::now()),
            Event::Closed { .. } => {
                self.closed_at = Some(Instant::now());
                self.last_close_event = Some(evt.clone());
            }
            _ => self.bytes_in += event_len(&evt),
        }
        Some(evt)
    }

    fn transform_outgoing(&mut self, evt: Event) -> Option<Event> {
        self.bytes_out += event_len(&evt);
        Some(evt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_bytes_both_directions() {
        let mut plugin = StatisticsPlugin::default();
        plugin.transform_incoming(Event::Message(Message::Bytes(vec![1, 2, 3])));
        plugin.transform_outgoing(Event::Message(Message::Text("hello".into())));
        assert_eq!(plugin.bytes_in, 3);
        assert_eq!(plugin.bytes_out, 5);
    }

    #[test]
    fn records_open_and_close() {
        let mut plugin = StatisticsPlugin::default();
        plugin.transform_incoming(Event::Opened);
        plugin.transform_incoming(Event::Closed {
            reason: "peer".into(),
            origin: "remote".into(),
        });
        assert!(plugin.opened_at.is_some());
        assert!(plugin.closed_at.is_some());
    }
}
