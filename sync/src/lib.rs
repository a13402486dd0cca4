//! The Chum sync protocol: importer (driver) and exporter (responder)
//! roles over the content-addressed store (§4.7).

mod crdt_meta;
mod error;
mod exporter;
mod importer;
pub mod protocol;

pub use error::SyncError;
pub use exporter::{Exporter, ExporterEvents, PROTOCOL_VERSION};
pub use importer::{Importer, Transport};
pub use protocol::{ChumMessage, RootKind, RootRef};
