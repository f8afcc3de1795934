use comfy_assistant_history::{HistoryStore, JsonlHistoryStore, MessageId};
use comfy_assistant_test_utils::sample_record;
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;

fn ids(page: &comfy_assistant_history::Page) -> Vec<MessageId> {
    page.records.iter().map(|record| record.message_id).collect()
}

#[test]
fn sequential_allocations_are_contiguous() {
    let temp = tempdir().expect("tempdir");
    let store = JsonlHistoryStore::open(temp.path()).expect("store");
    store.upsert(&sample_record(4, "seed")).expect("seed");

    let start = store.last_message_id().expect("counter");
    let allocated: Vec<MessageId> = (0..25).map(|_| store.next_id().expect("next")).collect();
    let expected: Vec<MessageId> = (start + 1..=start + 25).collect();
    assert_eq!(allocated, expected);
}

#[test]
fn concurrent_allocations_never_repeat() {
    let temp = tempdir().expect("tempdir");
    let store = Arc::new(JsonlHistoryStore::open(temp.path()).expect("store"));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                (0..20)
                    .map(|_| store.next_id().expect("next"))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        for id in handle.join().expect("join") {
            assert!(seen.insert(id), "id {id} allocated twice");
        }
    }
    assert_eq!(seen.len(), 160);
    assert_eq!(store.last_message_id().expect("counter"), 160);
}

#[test]
fn chained_pages_visit_every_record_once() {
    let temp = tempdir().expect("tempdir");
    let store = JsonlHistoryStore::open(temp.path()).expect("store");
    for id in 1..=23 {
        store
            .upsert(&sample_record(id, &format!("message {id}")))
            .expect("upsert");
    }

    let mut collected = Vec::new();
    let mut cursor = 0;
    loop {
        let page = store.read_page(cursor, 5).expect("page");
        collected.extend(ids(&page));
        if !page.has_more {
            assert_eq!(page.next_id, None);
            break;
        }
        cursor = page.next_id.expect("cursor");
    }

    let expected: Vec<MessageId> = (1..=23).rev().collect();
    assert_eq!(collected, expected);
}

#[test]
fn gaps_produce_short_pages_with_literal_cursor() {
    let temp = tempdir().expect("tempdir");
    let store = JsonlHistoryStore::open(temp.path()).expect("store");
    for id in [1, 3, 5] {
        store.upsert(&sample_record(id, "sparse")).expect("upsert");
    }

    let page = store.read_page(5, 3).expect("first page");
    assert_eq!(ids(&page), vec![5, 3, 1]);
    assert!(page.has_more);
    assert_eq!(page.next_id, Some(2));

    // The cursor does not account for the gaps, so the follow-up page
    // revisits id 1 and then reports exhaustion.
    let next = store.read_page(2, 3).expect("second page");
    assert_eq!(ids(&next), vec![1]);
    assert!(!next.has_more);
    assert_eq!(next.next_id, None);
}

#[test]
fn reset_twice_matches_reset_once() {
    let temp = tempdir().expect("tempdir");
    let store = JsonlHistoryStore::open(temp.path()).expect("store");
    for id in 1..=3 {
        store.upsert(&sample_record(id, "hi")).expect("upsert");
    }

    store.reset().expect("reset");
    let once = std::fs::read_to_string(store.path()).expect("read once");
    store.reset().expect("reset again");
    let twice = std::fs::read_to_string(store.path()).expect("read twice");
    assert_eq!(once, twice);

    assert_eq!(store.get(1).expect("get"), None);
    assert_eq!(store.read_page(0, 10).expect("page").records, Vec::new());
    assert_eq!(store.next_id().expect("next"), 1);

    let reopened = JsonlHistoryStore::open(temp.path()).expect("reopen");
    assert_eq!(reopened.last_message_id().expect("counter"), 1);
}

#[test]
fn upsert_then_get_returns_identical_record() {
    let temp = tempdir().expect("tempdir");
    let store = JsonlHistoryStore::open(temp.path()).expect("store");
    let mut record = sample_record(9, "render a sunset");
    record.user.images = vec!["/view?filename=a.png".to_string()];
    record.user.prompt_name = Some("Workflow".to_string());
    record.assistant.images = vec!["https://example.invalid/b.png".to_string()];

    store.upsert(&record).expect("upsert");
    store.upsert(&record).expect("idempotent upsert");
    assert_eq!(store.get(9).expect("get"), Some(record));
}

#[test]
fn newest_first_pages_from_counter() {
    let temp = tempdir().expect("tempdir");
    let store = JsonlHistoryStore::open(temp.path()).expect("store");
    store.upsert(&sample_record(1, "hi")).expect("1");
    store.upsert(&sample_record(2, "hi again")).expect("2");
    store.upsert(&sample_record(3, "hi once more")).expect("3");

    let page = store.read_page(0, 2).expect("first page");
    assert_eq!(ids(&page), vec![3, 2]);
    assert!(page.has_more);
    assert_eq!(page.next_id, Some(1));

    let page = store.read_page(1, 2).expect("second page");
    assert_eq!(ids(&page), vec![1]);
    assert!(!page.has_more);
    assert_eq!(page.next_id, None);
}

#[test]
fn empty_store_yields_empty_last_page() {
    let temp = tempdir().expect("tempdir");
    let store = JsonlHistoryStore::open(temp.path()).expect("store");
    let page = store.read_page(0, 20).expect("page");
    assert!(page.records.is_empty());
    assert!(!page.has_more);
    assert_eq!(page.next_id, None);
}

#[test]
fn failed_write_changes_nothing() {
    let temp = tempdir().expect("tempdir");
    let store = JsonlHistoryStore::open(temp.path()).expect("store");
    store.upsert(&sample_record(1, "first")).expect("upsert");
    let path = store.path().to_path_buf();
    let saved = std::fs::read(&path).expect("read log");

    // A directory in place of the log makes every append fail.
    std::fs::remove_file(&path).expect("remove log");
    std::fs::create_dir(&path).expect("block log");
    assert!(store.upsert(&sample_record(2, "lost")).is_err());
    assert!(store.next_id().is_err());
    assert_eq!(store.get(2).expect("get"), None);
    assert_eq!(store.last_message_id().expect("counter"), 1);

    std::fs::remove_dir(&path).expect("unblock log");
    std::fs::write(&path, &saved).expect("restore log");
    store.upsert(&sample_record(2, "second")).expect("upsert after restore");

    let reopened = JsonlHistoryStore::open(temp.path()).expect("reopen");
    assert_eq!(reopened.last_message_id().expect("counter"), 2);
    let page = reopened.read_page(0, 10).expect("page");
    assert_eq!(ids(&page), vec![2, 1]);
}
