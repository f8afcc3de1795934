//! Page-size bounds and the cursor arithmetic shared by stores.

use crate::HistoryError;
use comfy_assistant_protocol::{MessageId, Page, Record};

/// Smallest accepted page size.
pub const MIN_PAGE_LIMIT: usize = 1;
/// Largest accepted page size.
pub const MAX_PAGE_LIMIT: usize = 100;

/// Reject page sizes outside `[MIN_PAGE_LIMIT, MAX_PAGE_LIMIT]`.
pub fn validate_page_limit(limit: usize) -> Result<usize, HistoryError> {
    if (MIN_PAGE_LIMIT..=MAX_PAGE_LIMIT).contains(&limit) {
        Ok(limit)
    } else {
        Err(HistoryError::InvalidInput(format!(
            "limit must be between {MIN_PAGE_LIMIT} and {MAX_PAGE_LIMIT} (got {limit})"
        )))
    }
}

/// Assemble a page from records collected while walking down from `from_id`.
///
/// The cursor is `from_id - limit` regardless of how many ids were missing,
/// so a page may be short while `has_more` is still true.
pub(crate) fn build_page(records: Vec<Record>, from_id: MessageId, limit: usize) -> Page {
    let next = i128::from(from_id) - limit as i128;
    let has_more = next > 0;
    Page {
        records,
        has_more,
        next_id: has_more.then_some(next as MessageId),
    }
}
