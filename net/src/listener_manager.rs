use parking_lot::Mutex;
use std::collections::HashMap;

/// Relay listeners go through the communication-server; direct listeners
/// bind a local socket directly (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    Relay,
    Direct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Stopped,
    Listening,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct ListenerKey {
    kind: ListenerKind,
    endpoint: String,
    local_public_key: [u8; 32],
}

struct ListenerEntry {
    state: ListenerState,
    ref_count: usize,
}

/// Reference-counted multiplexing over relay and direct listeners, keyed by
/// `(endpoint, localPublicKey)`; a listener starts on first registration and
/// stops once its reference count reaches zero (§4.9). Serialized by a
/// single manager (the surrounding `Mutex`), per §5 "Listener maps:
/// reference-counted; serialized by a single manager task".
#[derive(Default)]
pub struct ListenerManager {
    listeners: Mutex<HashMap<ListenerKey, ListenerEntry>>,
}

impl ListenerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers interest in a listener; returns `true` if this call
    /// caused the listener to transition from stopped to starting (the
    /// caller is responsible for actually binding the socket in that
    /// case).
    pub fn register(&self, kind: ListenerKind, endpoint: &str, local_public_key: [u8; 32]) -> bool {
        let key = ListenerKey {
            kind,
            endpoint: endpoint.to_string(),
            local_public_key,
        };
        let mut listeners = self.listeners.lock();
        let entry = listeners.entry(key).or_insert(ListenerEntry {
            state: ListenerState::Stopped,
            ref_count: 0,
        });
        entry.ref_count += 1;
        if entry.ref_count == 1 {
            entry.state = ListenerState::Listening;
            true
        } else {
            false
        }
    }

    /// Releases one registration; returns `true` if this call caused the
    /// listener to stop (reference count reached zero). The caller is
    /// responsible for actually closing the socket in that case.
    pub fn unregister(&self, kind: ListenerKind, endpoint: &str, local_public_key: [u8; 32]) -> bool {
        let key = ListenerKey {
            kind,
            endpoint: endpoint.to_string(),
            local_public_key,
        };
        let mut listeners = self.listeners.lock();
        let Some(entry) = listeners.get_mut(&key) else {
            return false;
        };
        entry.ref_count = entry.ref_count.saturating_sub(1);
        if entry.ref_count == 0 {
            entry.state = ListenerState::Stopped;
            listeners.remove(&key);
            true
        } else {
            false
        }
    }

    pub fn mark_listening(&self, kind: ListenerKind, endpoint: &str, local_public_key: [u8; 32]) {
        self.set_state(kind, endpoint, local_public_key, ListenerState::Listening);
    }

    pub fn mark_stopped(&self, kind: ListenerKind, endpoint: &str, local_public_key: [u8; 32]) {
        self.set_state(kind, endpoint, local_public_key, ListenerState::Stopped);
    }

    fn set_state(&self, kind: ListenerKind, endpoint: &str, local_public_key: [u8; 32], state: ListenerState) {
        let key = ListenerKey {
            kind,
            endpoint: endpoint.to_string(),
            local_public_key,
        };
        if let Some(entry) = self.listeners.lock().get_mut(&key) {
            entry.state = state;
        }
    }

    /// Online iff every relay listener is `Listening`; direct listeners do
    /// not affect this (§4.9 "Online state is true iff all relay listeners
    /// are in `Listening`; direct listeners do not affect it").
    pub fn is_online(&self) -> bool {
        self.listeners
            .lock()
            .iter()
            .filter(|(key, _)| key.kind == ListenerKind::Relay)
            .all(|(_, entry)| entry.state == ListenerState::Listening)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_registration_starts_listener() {
        let manager = ListenerManager::new();
        assert!(manager.register(ListenerKind::Direct, "127.0.0.1:9000", [1u8; 32]));
        assert!(!manager.register(ListenerKind::Direct, "127.0.0.1:9000", [1u8; 32]));
    }

    #[test]
    fn last_unregister_stops_listener() {
        let manager = ListenerManager::new();
        manager.register(ListenerKind::Direct, "127.0.0.1:9000", [1u8; 32]);
        manager.register(ListenerKind::Direct, "127.0.0.1:9000", [1u8; 32]);
        assert!(!manager.unregister(ListenerKind::Direct, "127.0.0.1:9000", [1u8; 32]));
        assert!(manager.unregister(ListenerKind::Direct, "127.0.0.1:9000", [1u8; 32]));
    }

    #[test]
    fn online_requires_all_relay_listeners_to_be_listening() {
        let manager = ListenerManager::new();
        manager.register(ListenerKind::Relay, "comm-server", [1u8; 32]);
        manager.register(ListenerKind::Relay, "comm-server-2", [2u8; 32]);
        assert!(manager.is_online());
        manager.mark_stopped(ListenerKind::Relay, "comm-server-2", [2u8; 32]);
        assert!(!manager.is_online());
    }

    #[test]
    fn direct_listeners_do_not_affect_online_state() {
        let manager = ListenerManager::new();
        manager.register(ListenerKind::Direct, "127.0.0.1:9000", [1u8; 32]);
        manager.mark_stopped(ListenerKind::Direct, "127.0.0.1:9000", [1u8; 32]);
        assert!(manager.is_online());
    }
}
