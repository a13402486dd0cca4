mod encryption;
mod fragmentation;
mod keepalive;
mod pingpong;
mod queue_helper;
mod statistics;

pub use encryption::EncryptionPlugin;
pub use fragmentation::{escape_text, fragment_bytes, unescape_text, FragmentationPlugin};
pub use keepalive::KeepalivePlugin;
pub use pingpong::PingPongPlugin;
pub use queue_helper::QueueHelperPlugin;
pub use statistics::StatisticsPlugin;
