use crate::pipeline::{Event, Message, Plugin};
use serde_json::json;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Periodically sends `{"command":"ping"}`; the peer replies
/// `{"command":"pong"}`. A missed round-trip past `budget` terminates the
/// connection. Decoupled from keepalive so either may be enabled
/// independently (§4.5 "Ping/Pong").
pub struct PingPongPlugin {
    interval: Duration,
    budget: Duration,
    last_ping_sent: Option<Instant>,
    last_pong_at: Instant,
    last_tick: Instant,
    pending_replies: VecDeque<Event>,
}

impl PingPongPlugin {
    pub fn new(interval: Duration, budget: Duration) -> Self {
        let now = Instant::now();
        Self {
            interval,
            budget,
            last_ping_sent: None,
            last_pong_at: now,
            last_tick: now,
            pending_replies: VecDeque::new(),
        }
    }

    pub fn tick(&mut self, now: Instant) -> Vec<Event> {
        if let Some(sent) = self.last_ping_sent {
            if now.duration_since(sent) >= self.budget {
                return vec![Event::Close {
                    reason: "ping/pong round-trip missed".into(),
                    terminate: true,
                }];
            }
        }
        if now.duration_since(self.last_tick) >= self.interval {
            self.last_tick = now;
            self.last_ping_sent = Some(now);
            return vec![Event::Message(Message::Text(json!({"command": "ping"}).to_string()))];
        }
        Vec::new()
    }
}

fn command_of(text: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|v| v.get("command").and_then(|c| c.as_str()).map(str::to_string))
}

impl Plugin for PingPongPlugin {
    fn transform_incoming(&mut self, evt: Event) -> Option<Event> {
        match &evt {
            Event::Message(Message::Text(t)) => match command_of(t).as_deref() {
                Some("ping") => {
                    self.pending_replies
                        .push_back(Event::Message(Message::Text(json!({"command": "pong"}).to_string())));
                    return None;
                }
                Some("pong") => {
                    self.last_pong_at = Instant::now();
                    self.last_ping_sent = None;
                    return None;
                }
                _ => {}
            },
            _ => {}
        }
        Some(evt)
    }

    fn transform_outgoing(&mut self, evt: Event) -> Option<Event> {
        Some(evt)
    }

    fn poll_injected(&mut self) -> Vec<Event> {
        self.pending_replies.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missed_round_trip_terminates() {
        let mut plugin = PingPongPlugin::new(Duration::from_millis(5), Duration::from_millis(10));
        let _ = plugin.tick(Instant::now());
        std::thread::sleep(Duration::from_millis(20));
        let events = plugin.tick(Instant::now());
        assert!(matches!(events.first(), Some(Event::Close { terminate: true, .. })));
    }

    #[test]
    fn pong_clears_outstanding_ping() {
        let mut plugin = PingPongPlugin::new(Duration::from_millis(5), Duration::from_millis(50));
        let _ = plugin.tick(Instant::now());
        assert!(plugin.last_ping_sent.is_some());
        plugin.transform_incoming(Event::Message(Message::Text(json!({"command":"pong"}).to_string())));
        assert!(plugin.last_ping_sent.is_none());
    }

    #[test]
    fn ping_is_swallowed_and_queues_a_pong_reply() {
        let mut plugin = PingPongPlugin::new(Duration::from_secs(60), Duration::from_secs(60));
        let swallowed = plugin.transform_incoming(Event::Message(Message::Text(json!({"command":"ping"}).to_string())));
        assert!(swallowed.is_none());

        let injected = plugin.poll_injected();
        assert_eq!(injected.len(), 1);
        assert_eq!(injected[0], Event::Message(Message::Text(json!({"command":"pong"}).to_string())));

        assert!(plugin.poll_injected().is_empty());
    }
}
