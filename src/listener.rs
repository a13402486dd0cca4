use glyphstore_net::handshake::{self, HandshakeMessage, LocalIdentity};
use glyphstore_net::pipeline::Pipeline;
use glyphstore_net::{ListenerKind, ListenerManager, NetError};
use parking_lot::Mutex;
use std::time::Duration;

/// An authenticated connection handed off to the application after a
/// successful handshake: the negotiated plugin stack plus the peer's
/// long-term public key (§4.9 "forwards the resulting authenticated
/// `Connection` plus key pair to the registered onConnection callback").
pub struct AuthenticatedConnection {
    pub peer_public_key: [u8; 32],
    pub pipeline: Pipeline,
}

type OnConnection = Box<dyn Fn(AuthenticatedConnection) + Send + Sync>;

/// Wraps [`ListenerManager`] with the handshake step and the
/// `onConnection` callback, so accepting a socket (owned by the caller,
/// since this crate has no concrete transport) is one call (§4.9).
pub struct IncomingConnectionManager {
    manager: ListenerManager,
    local: LocalIdentity,
    known_public_keys: Mutex<Vec<[u8; 32]>>,
    on_connection: Mutex<Option<OnConnection>>,
    chunk_size: usize,
    keepalive_timer: Duration,
    keepalive_timeout: Duration,
}

impl IncomingConnectionManager {
    pub fn new(local: LocalIdentity) -> Self {
        Self {
            manager: ListenerManager::new(),
            local,
            known_public_keys: Mutex::new(Vec::new()),
            on_connection: Mutex::new(None),
            chunk_size: 64 * 1024,
            keepalive_timer: Duration::from_secs(20),
            keepalive_timeout: Duration::from_secs(60),
        }
    }

    pub fn set_on_connection(&self, callback: impl Fn(AuthenticatedConnection) + Send + Sync + 'static) {
        *self.on_connection.lock() = Some(Box::new(callback));
    }

    /// Registers a public key as authorized to complete the handshake
    /// (e.g. after pairing binds trust to it).
    pub fn trust_public_key(&self, key: [u8; 32]) {
        let mut keys = self.known_public_keys.lock();
        if !keys.contains(&key) {
            keys.push(key);
        }
    }

    pub fn register_relay(&self, endpoint: &str) -> bool {
        self.manager.register(ListenerKind::Relay, endpoint, self.local.public_key)
    }

    pub fn register_direct(&self, endpoint: &str) -> bool {
        self.manager.register(ListenerKind::Direct, endpoint, self.local.public_key)
    }

    pub fn unregister_relay(&self, endpoint: &str) -> bool {
        self.manager.unregister(ListenerKind::Relay, endpoint, self.local.public_key)
    }

    pub fn unregister_direct(&self, endpoint: &str) -> bool {
        self.manager.unregister(ListenerKind::Direct, endpoint, self.local.public_key)
    }

    pub fn is_online(&self) -> bool {
        self.manager.is_online()
    }

    /// Runs the acceptor side of the handshake against an initiator's
    /// opening message, installs the standard plugin stack, and forwards
    /// the result to the registered callback (§4.9 "runs the handshake,
    /// and forwards the resulting authenticated Connection ... to the
    /// registered onConnection callback").
    pub fn accept(&self, their_message: &HandshakeMessage) -> Result<HandshakeMessage, NetError> {
        let known = self.known_public_keys.lock().clone();
        let (response, encryption) = handshake::accept(&self.local, &known, their_message)?;
        let pipeline = handshake::standard_pipeline(encryption, self.chunk_size, self.keepalive_timer, self.keepalive_timeout);
        if let Some(callback) = self.on_connection.lock().as_ref() {
            callback(AuthenticatedConnection {
                peer_public_key: their_message.claimed_public_key,
                pipeline,
            });
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glyphstore_crypto::generate_default_keypair;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn identity() -> LocalIdentity {
        let (keys, _, secret) = generate_default_keypair();
        LocalIdentity {
            public_key: keys.public_key,
            secret_key: secret.secret_key,
            public_sign_key: keys.public_sign_key,
            secret_sign_key: secret.secret_sign_key,
        }
    }

    #[test]
    fn relay_listener_reference_counting_matches_online_state() {
        let manager = IncomingConnectionManager::new(identity());
        assert!(manager.register_relay("comm-server"));
        assert!(manager.is_online());
        assert!(!manager.register_relay("comm-server"));
        assert!(manager.is_online());
        assert!(!manager.unregister_relay("comm-server"));
        assert!(manager.is_online());
        assert!(manager.unregister_relay("comm-server"));
    }

    #[test]
    fn accept_invokes_on_connection_for_trusted_key() {
        let acceptor_identity = identity();
        let initiator_identity = identity();
        let manager = IncomingConnectionManager::new(acceptor_identity);
        manager.trust_public_key(initiator_identity.public_key);

        let invoked = Arc::new(AtomicBool::new(false));
        let invoked_clone = invoked.clone();
        manager.set_on_connection(move |_conn| {
            invoked_clone.store(true, Ordering::SeqCst);
        });

        let initiator_challenge = handshake::initiate_challenge(&initiator_identity);
        manager.accept(&initiator_challenge).unwrap();
        assert!(invoked.load(Ordering::SeqCst));
    }

    #[test]
    fn accept_rejects_untrusted_key() {
        let acceptor_identity = identity();
        let initiator_identity = identity();
        let manager = IncomingConnectionManager::new(acceptor_identity);
        let initiator_challenge = handshake::initiate_challenge(&initiator_identity);
        assert!(manager.accept(&initiator_challenge).is_err());
    }
}
