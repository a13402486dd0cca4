use crate::error::NetError;
use crate::pipeline::{Event, Message, Plugin};
use std::collections::VecDeque;

const START_STRING: &str = "fragmentation_start_string";
const START_BINARY: &str = "fragmentation_start_binary";
const END: &str = "fragmentation_end";
/// Reversible escape marker: any application text that would otherwise
/// collide with a sentinel gets this byte prepended (§4.5 "escaped by a
/// reversible escape convention").
const ESCAPE_MARKER: char = '\u{1}';

fn is_sentinel(text: &str) -> bool {
    matches!(text, START_STRING | START_BINARY | END)
}

pub fn escape_text(text: &str) -> String {
    if is_sentinel(text) || text.starts_with(ESCAPE_MARKER) {
        format!("{ESCAPE_MARKER}{text}")
    } else {
        text.to_string()
    }
}

pub fn unescape_text(text: &str) -> String {
    text.strip_prefix(ESCAPE_MARKER).unwrap_or(text).to_string()
}

/// Splits `bytes` into a start sentinel, `ceil(len/chunk_size)` chunk
/// frames, and an end sentinel, as binary frames throughout (§4.5
/// "Fragmentation"). A payload exactly `chunk_size` long is still sent
/// fragmented once it goes through this path; callers decide whether
/// fragmentation is needed at all before calling this.
pub fn fragment_bytes(bytes: &[u8], chunk_size: usize) -> Vec<Event> {
    let mut out = vec![Event::Message(Message::Text(START_BINARY.to_string()))];
    for chunk in bytes.chunks(chunk_size.max(1)) {
        out.push(Event::Message(Message::Bytes(chunk.to_vec())));
    }
    out.push(Event::Message(Message::Text(END.to_string())));
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Text,
    Binary,
}

struct Reassembly {
    kind: Kind,
    bytes: Vec<u8>,
}

/// Chunks outgoing frames over a configured max size and reassembles
/// incoming fragments; text frames at or above `chunk_size/4` are sent as
/// binary fragments to bound UTF-8 expansion (§4.5 "Fragmentation").
pub struct FragmentationPlugin {
    chunk_size: usize,
    reassembly: Option<Reassembly>,
    pending_outgoing: VecDeque<Event>,
    error: Option<NetError>,
}

impl FragmentationPlugin {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            reassembly: None,
            pending_outgoing: VecDeque::new(),
            error: None,
        }
    }

    pub fn take_error(&mut self) -> Option<NetError> {
        self.error.take()
    }

    fn needs_fragmentation(&self, len: usize) -> bool {
        len > self.chunk_size
    }
}

impl Plugin for FragmentationPlugin {
    fn transform_incoming(&mut self, evt: Event) -> Option<Event> {
        match evt {
            Event::Message(Message::Text(t)) if t == START_BINARY => {
                if self.reassembly.is_some() {
                    self.error = Some(NetError::Protocol(
                        "fragmentation start sentinel received before a prior end".into(),
                    ));
                    return None;
                }
                self.reassembly = Some(Reassembly {
                    kind: Kind::Binary,
                    bytes: Vec::new(),
                });
                None
            }
            Event::Message(Message::Text(t)) if t == START_STRING => {
                if self.reassembly.is_some() {
                    self.error = Some(NetError::Protocol(
                        "fragmentation start sentinel received before a prior end".into(),
                    ));
                    return None;
                }
                self.reassembly = Some(Reassembly {
                    kind: Kind::Text,
                    bytes: Vec::new(),
                });
                None
            }
            Event::Message(Message::Text(t)) if t == END => {
                let reassembly = self.reassembly.take();
                match reassembly {
                    Some(Reassembly { kind: Kind::Binary, bytes }) => Some(Event::Message(Message::Bytes(bytes))),
                    Some(Reassembly { kind: Kind::Text, bytes }) => {
                        String::from_utf8(bytes).ok().map(|s| Event::Message(Message::Text(s)))
                    }
                    None => {
                        self.error = Some(NetError::Protocol("fragmentation_end without a start".into()));
                        None
                    }
                }
            }
            Event::Message(Message::Text(_)) if self.reassembly.is_some() => {
                self.error = Some(NetError::Protocol(
                    "non-sentinel text frame received mid-fragmentation".into(),
                ));
                None
            }
            Event::Message(Message::Text(t)) => Some(Event::Message(Message::Text(unescape_text(&t)))),
            Event::Message(Message::Bytes(b)) if self.reassembly.is_some() => {
                if let Some(r) = self.reassembly.as_mut() {
                    r.bytes.extend_from_slice(&b);
                }
                None
            }
            other => Some(other),
        }
    }

    fn transform_outgoing(&mut self, evt: Event) -> Option<Event> {
        match evt {
            Event::Message(Message::Bytes(b)) if self.needs_fragmentation(b.len()) => {
                let mut frames = fragment_bytes(&b, self.chunk_size).into_iter();
                let first = frames.next();
                self.pending_outgoing.extend(frames);
                first
            }
            Event::Message(Message::Text(t)) => {
                let byte_len = t.len();
                if self.needs_fragmentation(byte_len) || byte_len >= self.chunk_size / 4 {
                    let mut frames = fragment_bytes(t.as_bytes(), self.chunk_size).into_iter();
                    let first = frames.next();
                    self.pending_outgoing.extend(frames);
                    first
                } else {
                    Some(Event::Message(Message::Text(escape_text(&t))))
                }
            }
            other => Some(other),
        }
    }

    fn poll_injected(&mut self) -> Vec<Event> {
        self.pending_outgoing.drain(..).collect()
    }
}
