//! Chat message lifecycle for project and page threads.
//!
//! [`ChatService`] owns every rule about who may post, edit, delete and
//! read; the HTTP layer only translates requests into [`RequestContext`]
//! plus arguments and maps [`ChatError`] back to responses.

pub mod context;
pub mod error;
pub mod lifecycle;
pub mod mentions;
pub mod sanitize;
pub mod uploads;

pub use context::RequestContext;
pub use error::ChatError;
pub use lifecycle::{ChatConfig, ChatService, DELETED_PLACEHOLDER};
pub use uploads::UploadStore;
