//! Connection pipeline, handshake, pairing, and incoming connection manager
//! (§4.5, §4.6, §4.9).

mod error;
pub mod handshake;
mod listener_manager;
mod pairing;
pub mod pipeline;
pub mod plugins;

pub use error::NetError;
pub use handshake::{HandshakeMessage, LocalIdentity};
pub use listener_manager::{ListenerKind, ListenerManager, ListenerState};
pub use pairing::{connect_using_invitation, Invitation, InstanceId, PairingHost, PairingSuccess, PersonId};
pub use pipeline::{Event, Message, Pipeline, Plugin};
