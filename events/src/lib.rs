//! Event bus and blocking queue (§4.10, §4.11).

mod bus;
mod error;
mod queue;

pub use bus::{Concurrency, EventBus, ListenerId};
pub use error::EventError;
pub use queue::BlockingQueue;
