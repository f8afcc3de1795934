//! Public surface of the assistant.
//!
//! Re-exports the building blocks so hosts embedding the assistant depend on
//! one crate.

pub use comfy_assistant_config as config;
pub use comfy_assistant_core as core;
pub use comfy_assistant_protocol as protocol;
pub use comfy_assistant_server as server;

/// Initialize `env_logger` with millisecond timestamps, honouring `RUST_LOG`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging() {
    let _ = env_logger::builder()
        .format_timestamp_millis()
        .parse_default_env()
        .try_init();
}
