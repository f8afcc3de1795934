//! Test helpers shared across comfy-assistant crates.

pub mod backend;
pub mod records;

pub use backend::{RecordedRequest, StubBackend, StubBehavior};
pub use records::sample_record;
