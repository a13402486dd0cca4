use crate::error::NetError;
use crate::pipeline::{Event, Pipeline, Plugin};
use crate::plugins::EncryptionPlugin;
use glyphstore_crypto::CryptoApi;
use std::time::Duration;

/// A long-term box (x25519) identity as exchanged during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalIdentity {
    pub public_key: [u8; 32],
    pub secret_key: [u8; 32],
    pub public_sign_key: [u8; 32],
    pub secret_sign_key: [u8; 32],
}

const CHALLENGE_LEN: usize = 32;

/// A literal wire message of the handshake protocol: both sides exchange
/// their claimed public key, then sign a freshly generated challenge to
/// prove possession of the matching secret key (§4.6 "challenge/response
/// using both sides' long-term keypairs to derive a shared session key").
pub struct HandshakeMessage {
    pub claimed_public_key: [u8; 32],
    pub challenge: [u8; CHALLENGE_LEN],
    pub challenge_signature: [u8; 64],
}

fn random_challenge() -> [u8; CHALLENGE_LEN] {
    let mut buf = [0u8; CHALLENGE_LEN];
    getrandom::getrandom(&mut buf).expect("getrandom");
    buf
}

/// Acceptor side: verify the initiator owns `claimed_public_key` (must be
/// among `known_public_keys`), then derive the session key by signing our
/// own challenge over theirs and installing an [`EncryptionPlugin`] above
/// the socket. On any failure the caller should close the connection
/// (§4.6 "On failure close the connection").
pub fn accept(
    local: &LocalIdentity,
    known_public_keys: &[[u8; 32]],
    their_message: &HandshakeMessage,
) -> Result<(HandshakeMessage, EncryptionPlugin), NetError> {
    if !known_public_keys.contains(&their_message.claimed_public_key) {
        return Err(NetError::IdentityExchangeFailed);
    }
    CryptoApi::verify(
        &their_message.claimed_public_key,
        &their_message.challenge,
        &their_message.challenge_signature,
    )
    .map_err(|_| NetError::IdentityExchangeFailed)?;

    let api = CryptoApi::new(local.secret_key, local.secret_sign_key);
    let my_challenge = random_challenge();
    let my_signature = api.sign(&my_challenge);
    let response = HandshakeMessage {
        claimed_public_key: local.public_key,
        challenge: my_challenge,
        challenge_signature: my_signature,
    };
    let plugin = EncryptionPlugin::new(local.secret_key, their_message.claimed_public_key, true);
    Ok((response, plugin))
}

/// Initiator side: mirrors [`accept`], sending our own challenge first and
/// verifying the acceptor's response before installing the encryption
/// plugin (§4.6 "The initiator symmetrically performs the mirror
/// protocol").
pub fn initiate_challenge(local: &LocalIdentity) -> HandshakeMessage {
    let api = CryptoApi::new(local.secret_key, local.secret_sign_key);
    let challenge = random_challenge();
    let signature = api.sign(&challenge);
    HandshakeMessage {
        claimed_public_key: local.public_key,
        challenge,
        challenge_signature: signature,
    }
}

pub fn complete_initiate(
    local: &LocalIdentity,
    expected_remote_public_key: [u8; 32],
    their_response: &HandshakeMessage,
) -> Result<EncryptionPlugin, NetError> {
    if their_response.claimed_public_key != expected_remote_public_key {
        return Err(NetError::WrongPerson);
    }
    CryptoApi::verify(
        &their_response.claimed_public_key,
        &their_response.challenge,
        &their_response.challenge_signature,
    )
    .map_err(|_| NetError::IdentityExchangeFailed)?;
    Ok(EncryptionPlugin::new(local.secret_key, expected_remote_public_key, false))
}

/// Builds the standard pipeline stack above a raw socket, installing the
/// negotiated encryption plugin innermost-adjacent as described in §4.5's
/// "Standard stack (outer -> inner): socket, statistics, fragmentation,
/// keepalive, ping/pong, encryption, promise/queue helper".
pub fn standard_pipeline(
    encryption: EncryptionPlugin,
    chunk_size: usize,
    keepalive_timer: Duration,
    keepalive_timeout: Duration,
) -> Pipeline {
    use crate::plugins::{FragmentationPlugin, KeepalivePlugin, QueueHelperPlugin, StatisticsPlugin};
    let plugins: Vec<Box<dyn Plugin>> = vec![
        Box::new(StatisticsPlugin::default()),
        Box::new(FragmentationPlugin::new(chunk_size)),
        Box::new(KeepalivePlugin::new(keepalive_timer, keepalive_timeout)),
        Box::new(encryption),
        Box::new(QueueHelperPlugin::new(64)),
    ];
    Pipeline::new(plugins)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glyphstore_crypto::generate_default_keypair;

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
    fn full_handshake_round_trip_succeeds() {
        let acceptor = identity();
        let initiator = identity();

        let initiator_challenge = initiate_challenge(&initiator);
        let (acceptor_response, _acceptor_plugin) =
            accept(&acceptor, &[initiator.public_key], &initiator_challenge).unwrap();
        let _initiator_plugin = complete_initiate(&initiator, acceptor.public_key, &acceptor_response).unwrap();
    }

    #[test]
    fn unknown_public_key_is_rejected() {
        let acceptor = identity();
        let initiator = identity();
        let initiator_challenge = initiate_challenge(&initiator);
        let result = accept(&acceptor, &[], &initiator_challenge);
        assert!(matches!(result, Err(NetError::IdentityExchangeFailed)));
    }

    #[test]
    fn wrong_remote_identity_is_rejected() {
        let acceptor = identity();
        let initiator = identity();
        let impostor = identity();
        let initiator_challenge = initiate_challenge(&initiator);
        let (acceptor_response, _plugin) =
            accept(&acceptor, &[initiator.public_key], &initiator_challenge).unwrap();
        let result = complete_initiate(&initiator, impostor.public_key, &acceptor_response);
        assert!(matches!(result, Err(NetError::WrongPerson)));
    }
}
