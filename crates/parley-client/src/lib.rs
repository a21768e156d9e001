//! Polling client for chat threads.
//!
//! [`ChatPoller`] asks the server for messages newer than the last one it has
//! seen on a fixed interval and forwards anything new over a channel.

pub mod error;
pub mod poller;
pub mod sync;

pub use error::ClientError;
pub use poller::{ChatPoller, DEFAULT_POLL_INTERVAL};
pub use sync::PollState;
