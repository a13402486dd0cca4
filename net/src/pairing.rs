use crate::error::NetError;
use parking_lot::Mutex;
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub type PersonId = [u8; 32];
pub type InstanceId = [u8; 32];

/// One-shot credential authorizing a previously-unknown peer to establish
/// and be trusted (§4.6 "Pairing").
#[derive(Debug, Clone)]
pub struct Invitation {
    pub token: String,
    pub public_key: [u8; 32],
    pub url: String,
}

struct ActiveInvitation {
    invitation: Invitation,
    expected_local_person: PersonId,
    expires_at: Instant,
}

/// Arguments delivered to both sides on a successful pairing round-trip
/// (§4.6 step 3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingSuccess {
    pub initiated_locally: bool,
    pub local_person: PersonId,
    pub local_instance: InstanceId,
    pub remote_person: PersonId,
    pub remote_instance: InstanceId,
    pub token: String,
}

fn random_token() -> String {
    OsRng.sample_iter(&Alphanumeric).take(32).map(char::from).collect()
}

/// Host-side table of invitations awaiting a pairing round-trip, serialized
/// under a single-writer guard (§5 "Active invitations: serialized under a
/// single-writer guard").
#[derive(Default)]
pub struct PairingHost {
    active: Mutex<HashMap<String, ActiveInvitation>>,
}

impl PairingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an `Invitation`, registering it with an expiry timer
    /// (§4.6 step 1).
    pub fn create_invitation(&self, public_key: [u8; 32], url: String, expected_local_person: PersonId, ttl: Duration) -> Invitation {
        let invitation = Invitation {
            token: random_token(),
            public_key,
            url,
        };
        let entry = ActiveInvitation {
            invitation: invitation.clone(),
            expected_local_person,
            expires_at: Instant::now() + ttl,
        };
        self.active.lock().insert(invitation.token.clone(), entry);
        invitation
    }

    /// Drops invitations whose expiry has passed; should be driven
    /// periodically by the owning manager task.
    pub fn expire_stale(&self, now: Instant) {
        self.active.lock().retain(|_, entry| entry.expires_at > now);
    }

    /// Verifies `token` against the active table, binds it to the expected
    /// local person, and removes it on success (§4.6 step 3). Returns the
    /// `PairingSuccess` with `initiated_locally = false` (the host did not
    /// initiate the connection).
    pub fn complete(
        &self,
        token: &str,
        remote_person: PersonId,
        remote_instance: InstanceId,
        local_instance: InstanceId,
        now: Instant,
    ) -> Result<PairingSuccess, NetError> {
        let mut active = self.active.lock();
        let entry = active.get(token).ok_or(NetError::UnknownToken)?;
        if entry.expires_at <= now {
            active.remove(token);
            return Err(NetError::TokenExpired);
        }
        let local_person = entry.expected_local_person;
        active.remove(token);
        Ok(PairingSuccess {
            initiated_locally: false,
            local_person,
            local_instance,
            remote_person,
            remote_instance,
            token: token.to_string(),
        })
    }
}

/// Remote side of a pairing round-trip: opens an encrypted connection to
/// `invitation.url` keyed to `invitation.public_key`, sends the
/// authentication token, awaits identity exchange, and on success returns
/// the complementary `PairingSuccess` with `initiated_locally = true`
/// (§4.6 step 3). The actual socket I/O is left to the caller; this
/// function captures the protocol-level bookkeeping only.
pub fn connect_using_invitation(
    invitation: &Invitation,
    local_person: PersonId,
    local_instance: InstanceId,
    remote_person: PersonId,
    remote_instance: InstanceId,
) -> PairingSuccess {
    PairingSuccess {
        initiated_locally: true,
        local_person,
        local_instance,
        remote_person,
        remote_instance,
        token: invitation.token.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_consumes_token_exactly_once() {
        let host = PairingHost::new();
        let invitation = host.create_invitation([1u8; 32], "wss://host".into(), [2u8; 32], Duration::from_secs(60));
        let now = Instant::now();
        let success = host.complete(&invitation.token, [3u8; 32], [4u8; 32], [5u8; 32], now).unwrap();
        assert_eq!(success.local_person, [2u8; 32]);
        assert!(!success.initiated_locally);

        let second = host.complete(&invitation.token, [3u8; 32], [4u8; 32], [5u8; 32], now);
        assert!(matches!(second, Err(NetError::UnknownToken)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let host = PairingHost::new();
        let invitation = host.create_invitation([1u8; 32], "wss://host".into(), [2u8; 32], Duration::from_millis(10));
        let later = Instant::now() + Duration::from_secs(1);
        let result = host.complete(&invitation.token, [3u8; 32], [4u8; 32], [5u8; 32], later);
        assert!(matches!(result, Err(NetError::TokenExpired)));
    }

    #[test]
    fn unknown_token_is_rejected() {
        let host = PairingHost::new();
        let result = host.complete("not-a-real-token", [3u8; 32], [4u8; 32], [5u8; 32], Instant::now());
        assert!(matches!(result, Err(NetError::UnknownToken)));
    }

    #[test]
    fn expire_stale_removes_past_invitations() {
        let host = PairingHost::new();
        let invitation = host.create_invitation([1u8; 32], "wss://host".into(), [2u8; 32], Duration::from_millis(10));
        host.expire_stale(Instant::now() + Duration::from_secs(1));
        let result = host.complete(&invitation.token, [3u8; 32], [4u8; 32], [5u8; 32], Instant::now());
        assert!(matches!(result, Err(NetError::UnknownToken)));
    }
}
