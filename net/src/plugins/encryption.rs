use crate::error::NetError;
use crate::pipeline::{Event, Message, Plugin};
use crypto_box::{PublicKey, SalsaBox, SecretKey};
use rand::{rngs::OsRng, Rng};

const NONCE_LEN: usize = 24;
/// "near 2^53", matching `Number.MAX_SAFE_INTEGER` headroom in the
/// reference design (§4.5 "Nonce counter overflow near 2^53 fails
/// NonceExhausted").
const MAX_COUNTER: u64 = (1u64 << 53) - 16;

fn nonce_from_counter(counter: u64) -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    nonce[..8].copy_from_slice(&counter.to_be_bytes());
    nonce
}

/// TweetNaCl-style authenticated box over a shared key negotiated at
/// handshake. The two peers partition the 24-byte nonce space by parity of
/// a counter incremented by 2 per frame; every outgoing binary frame is
/// padded to a length-hiding size with a 1-bit flag for text-vs-binary,
/// then encrypted (§4.5 "Encryption").
pub struct EncryptionPlugin {
    sbox: SalsaBox,
    send_counter: u64,
    recv_last_counter: Option<u64>,
}

impl EncryptionPlugin {
    /// `send_even` selects this side's nonce parity; the peer must use the
    /// opposite parity.
    pub fn new(my_secret: [u8; 32], their_public: [u8; 32], send_even: bool) -> Self {
        let sbox = SalsaBox::new(&PublicKey::from(their_public), &SecretKey::from(my_secret));
        Self {
            sbox,
            send_counter: if send_even { 0 } else { 1 },
            recv_last_counter: None,
        }
    }

    fn next_send_counter(&mut self) -> Result<u64, NetError> {
        if self.send_counter >= MAX_COUNTER {
            return Err(NetError::NonceExhausted);
        }
        let counter = self.send_counter;
        self.send_counter += 2;
        Ok(counter)
    }

    fn seal(&mut self, is_text: bool, payload: &[u8]) -> Result<Vec<u8>, NetError> {
        let counter = self.next_send_counter()?;
        let pad_len = OsRng.gen_range(1u16..=256u16);
        let mut plaintext = Vec::with_capacity(3 + payload.len() + pad_len as usize);
        plaintext.push(if is_text { 1 } else { 0 });
        plaintext.extend_from_slice(&pad_len.to_be_bytes());
        plaintext.extend_from_slice(payload);
        let mut padding = vec![0u8; pad_len as usize];
        OsRng.fill(padding.as_mut_slice());
        plaintext.extend_from_slice(&padding);

        let nonce = nonce_from_counter(counter);
        let ciphertext = self
            .sbox
            .encrypt(&nonce.into(), plaintext.as_slice())
            .map_err(|_| NetError::DecryptFailed)?;
        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn open(&mut self, sealed: &[u8]) -> Result<Event, NetError> {
        if sealed.len() < NONCE_LEN {
            return Err(NetError::DecryptFailed);
        }
        let (nonce, body) = sealed.split_at(NONCE_LEN);
        let counter = u64::from_be_bytes(nonce[..8].try_into().unwrap());
        if let Some(last) = self.recv_last_counter {
            if counter <= last {
                return Err(NetError::Protocol("replayed or out-of-order nonce".into()));
            }
        }
        self.recv_last_counter = Some(counter);

        let mut nonce_arr = [0u8; NONCE_LEN];
        nonce_arr.copy_from_slice(nonce);
        let plaintext = self
            .sbox
            .decrypt(&nonce_arr.into(), body)
            .map_err(|_| NetError::DecryptFailed)?;
        if plaintext.len() < 3 {
            return Err(NetError::Protocol("ciphertext too short for padding header".into()));
        }
        let is_text = plaintext[0] == 1;
        let pad_len = u16::from_be_bytes([plaintext[1], plaintext[2]]) as usize;
        let body = &plaintext[3..];
        if pad_len > body.len() {
            return Err(NetError::Protocol("padding length exceeds payload".into()));
        }
        let original = &body[..body.len() - pad_len];
        if is_text {
            let text = String::from_utf8(original.to_vec()).map_err(|_| NetError::Protocol("non-UTF8 text frame".into()))?;
            Ok(Event::Message(Message::Text(text)))
        } else {
            Ok(Event::Message(Message::Bytes(original.to_vec())))
        }
    }
}

impl Plugin for EncryptionPlugin {
    fn transform_incoming(&mut self, evt: Event) -> Option<Event> {
        match evt {
            Event::Message(Message::Bytes(sealed)) => self.open(&sealed).ok(),
            other => Some(other),
        }
    }

    fn transform_outgoing(&mut self, evt: Event) -> Option<Event> {
        match evt {
            Event::Message(Message::Text(t)) => self.seal(true, t.as_bytes()).ok().map(|b| Event::Message(Message::Bytes(b))),
            Event::Message(Message::Bytes(b)) => self.seal(false, &b).ok().map(|sealed| Event::Message(Message::Bytes(sealed))),
            other => Some(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (EncryptionPlugin, EncryptionPlugin) {
        let a_secret = SecretKey::generate(&mut OsRng);
        let b_secret = SecretKey::generate(&mut OsRng);
        let a_public = *a_secret.public_key().as_bytes();
        let b_public = *b_secret.public_key().as_bytes();
        let a = EncryptionPlugin::new(a_secret.to_bytes(), b_public, true);
        let b = EncryptionPlugin::new(b_secret.to_bytes(), a_public, false);
        (a, b)
    }

    #[test]
    fn text_roundtrip() {
        let (mut a, mut b) = pair();
        let sealed = a.transform_outgoing(Event::Message(Message::Text("hello".into()))).unwrap();
        let opened = b.transform_incoming(sealed).unwrap();
        assert_eq!(opened, Event::Message(Message::Text("hello".into())));
    }

    #[test]
    fn bytes_roundtrip_and_nonce_parity_never_collides() {
        let (mut a, mut b) = pair();
        let first = a.transform_outgoing(Event::Message(Message::Bytes(vec![1, 2, 3]))).unwrap();
        let second = a.transform_outgoing(Event::Message(Message::Bytes(vec![4, 5, 6]))).unwrap();
        assert_ne!(first, second);
        let opened_first = b.transform_incoming(first).unwrap();
        let opened_second = b.transform_incoming(second).unwrap();
        assert_eq!(opened_first, Event::Message(Message::Bytes(vec![1, 2, 3])));
        assert_eq!(opened_second, Event::Message(Message::Bytes(vec![4, 5, 6])));
    }

    #[test]
    fn nonce_exhaustion_is_rejected() {
        let (mut a, _b) = pair();
        a.send_counter = MAX_COUNTER;
        assert!(matches!(a.next_send_counter(), Err(NetError::NonceExhausted)));
    }
}
