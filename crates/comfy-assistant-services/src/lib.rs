//! Model backends for the assistant.
//!
//! The supported backends form a closed set ([`Backend`]) dispatched through
//! one contract ([`ChatBackend`]). [`Backends`] holds one instance of each.

mod backend;
mod conversation;
mod error;
mod g4f;
mod qianwen;
mod sse;

pub use backend::{Backend, Backends, ChatBackend, TextStream};
pub use conversation::Conversation;
pub use error::ServiceError;
pub use g4f::G4fBackend;
pub use qianwen::{DEFAULT_ENDPOINT as QIANWEN_ENDPOINT, QianwenBackend, map_model_name};
pub use sse::SseDecoder;
