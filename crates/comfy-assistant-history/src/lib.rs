//! Chat history storage: id allocation, record upserts, pagination and reset.

mod error;
mod page;
mod store;

pub use comfy_assistant_protocol::{AssistantTurn, MessageId, Page, Record, RecordKind, UserTurn};
pub use error::HistoryError;
pub use page::{MAX_PAGE_LIMIT, MIN_PAGE_LIMIT, validate_page_limit};
pub use store::{HISTORY_FILE_NAME, HistoryStore, JsonlHistoryStore};
