use glyphstore_net::Invitation;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::form_urlencoded;

#[derive(Debug, Error)]
pub enum InvitationLinkError {
    #[error("invitation link has no '#' fragment")]
    MissingFragment,

    #[error("invitation payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invitation publicKey is not 32 bytes of hex")]
    InvalidPublicKey,
}

#[derive(Serialize, Deserialize)]
struct Payload {
    token: String,
    #[serde(rename = "publicKey")]
    public_key: String,
    url: String,
}

/// Renders `<prefix>#<url-encoded JSON {token, publicKey, url}>` (§6
/// "Pairing invitation URL").
pub fn encode_invitation_link(prefix: &str, invitation: &Invitation) -> String {
    let payload = Payload {
        token: invitation.token.clone(),
        public_key: hex::encode(invitation.public_key),
        url: invitation.url.clone(),
    };
    let json = serde_json::to_string(&payload).expect("Payload always serializes");
    let encoded: String = form_urlencoded::byte_serialize(json.as_bytes()).collect();
    format!("{prefix}#{encoded}")
}

/// Parses a link produced by [`encode_invitation_link`] back into an
/// [`Invitation`].
pub fn decode_invitation_link(link: &str) -> Result<Invitation, InvitationLinkError> {
    let (_, fragment) = link.split_once('#').ok_or(InvitationLinkError::MissingFragment)?;
    let (json, _) = form_urlencoded::parse(fragment.as_bytes())
        .next()
        .ok_or(InvitationLinkError::MissingFragment)?;
    let payload: Payload = serde_json::from_str(&json)?;
    let mut public_key = [0u8; 32];
    hex::decode_to_slice(&payload.public_key, &mut public_key).map_err(|_| InvitationLinkError::InvalidPublicKey)?;
    Ok(Invitation {
        token: payload.token,
        public_key,
        url: payload.url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_roundtrips_through_encode_and_decode() {
        let invitation = Invitation {
            token: "abc123".into(),
            public_key: [9u8; 32],
            url: "wss://comm.example/relay?x=1&y=2".into(),
        };
        let link = encode_invitation_link("https://app.example/invite", &invitation);
        assert!(link.starts_with("https://app.example/invite#"));

        let decoded = decode_invitation_link(&link).unwrap();
        assert_eq!(decoded.token, invitation.token);
        assert_eq!(decoded.public_key, invitation.public_key);
        assert_eq!(decoded.url, invitation.url);
    }

    #[test]
    fn missing_fragment_is_rejected() {
        assert!(decode_invitation_link("https://app.example/invite").is_err());
    }
}
