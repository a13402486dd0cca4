use crate::pipeline::{Event, Message, Plugin};
use std::time::{Duration, Instant};

const KEEPALIVE_TEXT: &str = "keepalive";
const ESCAPE_MARKER: char = '\u{1}';

fn escape(text: &str) -> String {
    if text == KEEPALIVE_TEXT || text.starts_with(ESCAPE_MARKER) {
        format!("{ESCAPE_MARKER}{text}")
    } else {
        text.to_string()
    }
}

fn unescape(text: &str) -> String {
    text.strip_prefix(ESCAPE_MARKER).unwrap_or(text).to_string()
}

/// Two watchdogs: a send-pulse that emits `keepalive` frames on `timer`,
/// and a detect-pulse that closes the connection if no frame arrives
/// within `timeout` (§4.5 "Keepalive").
pub struct KeepalivePlugin {
    timer: Duration,
    timeout: Duration,
    last_sent: Instant,
    last_seen: Instant,
}

impl KeepalivePlugin {
    pub fn new(timer: Duration, timeout: Duration) -> Self {
        let now = Instant::now();
        Self {
            timer,
            timeout,
            last_sent: now,
            last_seen: now,
        }
    }

    /// Called periodically by the connection driver; returns events to
    /// inject (a `keepalive` pulse, or a terminating `close`).
    pub fn tick(&mut self, now: Instant) -> Vec<Event> {
        let mut events = Vec::new();
        if now.duration_since(self.last_seen) >= self.timeout {
            events.push(Event::Close {
                reason: "keepalive timeout".into(),
                terminate: true,
            });
            return events;
        }
        if now.duration_since(self.last_sent) >= self.timer {
            self.last_sent = now;
            events.push(Event::Message(Message::Text(KEEPALIVE_TEXT.to_string())));
        }
        events
    }
}

impl Plugin for KeepalivePlugin {
    fn transform_incoming(&mut self, evt: Event) -> Option<Event> {
        self.last_seen = Instant::now();
        match evt {
            Event::Message(Message::Text(t)) if t == KEEPALIVE_TEXT => None,
            Event::Message(Message::Text(t)) => Some(Event::Message(Message::Text(unescape(&t)))),
            other => Some(other),
        }
    }

    fn transform_outgoing(&mut self, evt: Event) -> Option<Event> {
        self.last_sent = Instant::now();
        match evt {
            Event::Message(Message::Text(t)) => Some(Event::Message(Message::Text(escape(&t)))),
            other => Some(other),
        }
    }
}
