//! JSONL-backed history store.
//!
//! The whole history lives in one append-mostly file. Each line is a tagged
//! event; replaying the file in order rebuilds the allocator counter and the
//! record set (last write wins per id).
//!
//! Appends go to the end of the last acknowledged line, never blindly to the
//! end of the file: bytes left behind by a failed or interrupted write are
//! cut off before the next append. Once superseded lines outnumber live ones
//! the log is rewritten in place.

use crate::HistoryError;
use crate::page::build_page;
use comfy_assistant_protocol::{AssistantTurn, MessageId, Page, Record, UserTurn};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// File name of the history log under the storage root.
pub const HISTORY_FILE_NAME: &str = "history.jsonl";

const SCHEMA_VERSION: u32 = 1;

/// Superseded lines tolerated before the log is rewritten.
const COMPACT_MIN_STALE_LINES: usize = 256;

/// Persistent store abstraction for chat history.
pub trait HistoryStore: Send + Sync {
    /// Allocate the next message id and persist the counter.
    fn next_id(&self) -> Result<MessageId, HistoryError>;
    /// Store or replace the record with the same id.
    fn upsert(&self, record: &Record) -> Result<(), HistoryError>;
    /// Fetch a record by id.
    fn get(&self, id: MessageId) -> Result<Option<Record>, HistoryError>;
    /// Read up to `limit` records at or below `from_id`, newest first.
    ///
    /// `from_id == 0` starts from the newest allocated id.
    fn read_page(&self, from_id: MessageId, limit: usize) -> Result<Page, HistoryError>;
    /// Drop every record and reset the allocator to zero.
    fn reset(&self) -> Result<(), HistoryError>;
    /// Allocate an id and store the exchange under it in one step.
    fn append_exchange(
        &self,
        user: UserTurn,
        assistant: AssistantTurn,
    ) -> Result<Record, HistoryError>;
    /// Last allocated id (0 when nothing was allocated).
    fn last_message_id(&self) -> Result<MessageId, HistoryError>;
}

/// Internal JSONL event representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum HistoryEvent {
    SchemaVersion { version: u32 },
    Counter { last_message_id: MessageId },
    Record { record: Record },
}

/// Replayed view of the history file.
#[derive(Debug, Default)]
struct HistoryState {
    last_message_id: MessageId,
    records: BTreeMap<MessageId, Record>,
    /// Byte length of the acknowledged prefix of the file.
    log_len: u64,
    /// Event lines in that prefix.
    log_lines: usize,
    /// The acknowledged prefix ends without a newline (hand-edited file).
    unterminated: bool,
}

impl HistoryState {
    /// Lines a freshly written log would hold: header, counter and records.
    fn live_lines(&self) -> usize {
        self.records.len() + 2
    }

    fn wants_compaction(&self) -> bool {
        let stale = self.log_lines.saturating_sub(self.live_lines());
        stale >= COMPACT_MIN_STALE_LINES && stale >= self.live_lines()
    }

    fn apply(&mut self, event: HistoryEvent) -> Result<(), HistoryError> {
        match event {
            HistoryEvent::SchemaVersion { version } => {
                if version > SCHEMA_VERSION {
                    return Err(HistoryError::UnsupportedSchema(version));
                }
            }
            HistoryEvent::Counter { last_message_id } => {
                self.last_message_id = last_message_id;
            }
            HistoryEvent::Record { record } => {
                self.records.insert(record.message_id, record);
            }
        }
        Ok(())
    }
}

/// History store persisted as a single JSONL file.
pub struct JsonlHistoryStore {
    path: PathBuf,
    /// Replayed state; the guard is held across every file write.
    state: Mutex<HistoryState>,
}

impl JsonlHistoryStore {
    /// Open (or create) `history.jsonl` under the given root.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, HistoryError> {
        let root = root.as_ref();
        fs::create_dir_all(root)?;
        Self::open_file(root.join(HISTORY_FILE_NAME))
    }

    /// Open (or create) a history log at an explicit path.
    pub fn open_file(path: impl Into<PathBuf>) -> Result<Self, HistoryError> {
        let path = path.into();
        let mut state = if path.exists() {
            read_log(&path)?
        } else {
            let mut state = HistoryState::default();
            rewrite(&path, &mut state)?;
            state
        };
        if state.wants_compaction() {
            compact_locked(&path, &mut state);
        }
        info!(
            "opened history store (path={}, records={}, last_message_id={})",
            path.display(),
            state.records.len(),
            state.last_message_id
        );
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrite the log with one line per live record plus the counter.
    ///
    /// Runs on its own once superseded lines dominate the file.
    pub fn compact(&self) -> Result<(), HistoryError> {
        let mut state = self.state.lock();
        rewrite(&self.path, &mut state)?;
        info!(
            "compacted history (records={}, last_message_id={})",
            state.records.len(),
            state.last_message_id
        );
        Ok(())
    }

    /// Write events after the acknowledged prefix and flush them.
    ///
    /// On failure the file is cut back to the prefix and `state` is left
    /// untouched, so nothing of the failed write survives.
    fn append_events(
        &self,
        state: &mut HistoryState,
        events: &[HistoryEvent],
    ) -> Result<(), HistoryError> {
        let mut buffer = String::new();
        if state.unterminated {
            buffer.push('\n');
        }
        for event in events {
            buffer.push_str(&serde_json::to_string(event)?);
            buffer.push('\n');
        }

        let mut file = OpenOptions::new().write(true).open(&self.path)?;
        let on_disk = file.metadata()?.len();
        if on_disk < state.log_len {
            return Err(HistoryError::Corrupt {
                line: state.log_lines,
                message: format!(
                    "history file shrank from {} to {on_disk} bytes",
                    state.log_len
                ),
            });
        }
        if on_disk > state.log_len {
            warn!(
                "dropping unacknowledged history tail (path={}, bytes={})",
                self.path.display(),
                on_disk - state.log_len
            );
            file.set_len(state.log_len)?;
        }
        file.seek(SeekFrom::Start(state.log_len))?;
        let written = file
            .write_all(buffer.as_bytes())
            .and_then(|()| file.sync_data());
        if let Err(err) = written {
            if let Err(rollback) = file.set_len(state.log_len) {
                warn!(
                    "failed to roll back history append (path={}, err={rollback})",
                    self.path.display()
                );
            }
            return Err(err.into());
        }

        state.log_len += buffer.len() as u64;
        state.log_lines += events.len();
        state.unterminated = false;
        Ok(())
    }

    /// Compact after an acknowledged append when the log has bloated.
    fn after_append(&self, state: &mut HistoryState) {
        if state.wants_compaction() {
            compact_locked(&self.path, state);
        }
    }
}

impl HistoryStore for JsonlHistoryStore {
    fn next_id(&self) -> Result<MessageId, HistoryError> {
        let mut state = self.state.lock();
        let next = state.last_message_id + 1;
        self.append_events(
            &mut state,
            &[HistoryEvent::Counter {
                last_message_id: next,
            }],
        )?;
        state.last_message_id = next;
        self.after_append(&mut state);
        debug!("allocated message id (message_id={next})");
        Ok(next)
    }

    fn upsert(&self, record: &Record) -> Result<(), HistoryError> {
        if record.message_id == 0 {
            return Err(HistoryError::InvalidInput(
                "message_id must be positive".to_string(),
            ));
        }
        let mut state = self.state.lock();
        let mut events = vec![HistoryEvent::Record {
            record: record.clone(),
        }];
        let raises_counter = record.message_id > state.last_message_id;
        if raises_counter {
            events.push(HistoryEvent::Counter {
                last_message_id: record.message_id,
            });
        }
        self.append_events(&mut state, &events)?;
        if raises_counter {
            state.last_message_id = record.message_id;
        }
        state.records.insert(record.message_id, record.clone());
        self.after_append(&mut state);
        debug!(
            "upserted history record (message_id={}, content_len={})",
            record.message_id,
            record.user.content.len()
        );
        Ok(())
    }

    fn get(&self, id: MessageId) -> Result<Option<Record>, HistoryError> {
        Ok(self.state.lock().records.get(&id).cloned())
    }

    fn read_page(&self, from_id: MessageId, limit: usize) -> Result<Page, HistoryError> {
        let state = self.state.lock();
        let from_id = if from_id == 0 {
            state.last_message_id
        } else {
            from_id
        };
        // Same result as probing every id from `from_id` down to 1.
        let records: Vec<Record> = if from_id == 0 {
            Vec::new()
        } else {
            state
                .records
                .range(1..=from_id)
                .rev()
                .take(limit)
                .map(|(_, record)| record.clone())
                .collect()
        };
        debug!(
            "read history page (from_id={}, limit={}, returned={})",
            from_id,
            limit,
            records.len()
        );
        Ok(build_page(records, from_id, limit))
    }

    fn reset(&self) -> Result<(), HistoryError> {
        let mut state = self.state.lock();
        let mut fresh = HistoryState::default();
        rewrite(&self.path, &mut fresh)?;
        *state = fresh;
        info!("reset history store (path={})", self.path.display());
        Ok(())
    }

    fn append_exchange(
        &self,
        user: UserTurn,
        assistant: AssistantTurn,
    ) -> Result<Record, HistoryError> {
        let mut state = self.state.lock();
        let record = Record::new(state.last_message_id + 1, user, assistant);
        self.append_events(
            &mut state,
            &[
                HistoryEvent::Counter {
                    last_message_id: record.message_id,
                },
                HistoryEvent::Record {
                    record: record.clone(),
                },
            ],
        )?;
        state.last_message_id = record.message_id;
        state.records.insert(record.message_id, record.clone());
        self.after_append(&mut state);
        info!("recorded chat exchange (message_id={})", record.message_id);
        Ok(record)
    }

    fn last_message_id(&self) -> Result<MessageId, HistoryError> {
        Ok(self.state.lock().last_message_id)
    }
}

/// Replay a history log from disk.
///
/// An unparsable final line without a newline is the remains of an
/// interrupted append; it is skipped and cut off by the next write. Any other
/// unparsable line is fatal.
fn read_log(path: &Path) -> Result<HistoryState, HistoryError> {
    let contents = fs::read_to_string(path)?;
    let mut state = HistoryState::default();
    let mut saw_header = false;
    let mut acknowledged = 0usize;

    for (index, raw) in contents.split_inclusive('\n').enumerate() {
        let line_no = index + 1;
        let terminated = raw.ends_with('\n');
        let line = raw.trim();
        if line.is_empty() {
            acknowledged += raw.len();
            continue;
        }
        let event: HistoryEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(err) if !terminated => {
                warn!(
                    "ignoring torn history line (path={}, line={line_no}, err={err})",
                    path.display()
                );
                break;
            }
            Err(err) => {
                return Err(HistoryError::Corrupt {
                    line: line_no,
                    message: err.to_string(),
                });
            }
        };
        if !saw_header && !matches!(event, HistoryEvent::SchemaVersion { .. }) {
            return Err(HistoryError::Corrupt {
                line: line_no,
                message: "missing schema_version header".to_string(),
            });
        }
        saw_header = true;
        state.apply(event)?;
        state.log_lines += 1;
        state.unterminated = !terminated;
        acknowledged += raw.len();
    }
    if !saw_header {
        warn!("history file is empty (path={})", path.display());
    }
    state.log_len = acknowledged as u64;
    Ok(state)
}

/// Replace the log with a minimal one for `state`, via a sibling temp file.
///
/// `state`'s bookkeeping is updated only once the new file is in place.
fn rewrite(path: &Path, state: &mut HistoryState) -> Result<(), HistoryError> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let mut lines = vec![serde_json::to_string(&HistoryEvent::SchemaVersion {
        version: SCHEMA_VERSION,
    })?];
    if state.last_message_id > 0 {
        lines.push(serde_json::to_string(&HistoryEvent::Counter {
            last_message_id: state.last_message_id,
        })?);
    }
    for record in state.records.values() {
        lines.push(serde_json::to_string(&HistoryEvent::Record {
            record: record.clone(),
        })?);
    }
    let mut buffer = lines.join("\n");
    buffer.push('\n');

    let mut file = File::create(&tmp_path)?;
    file.write_all(buffer.as_bytes())?;
    file.sync_all()?;
    fs::rename(&tmp_path, path)?;

    state.log_len = buffer.len() as u64;
    state.log_lines = lines.len();
    state.unterminated = false;
    Ok(())
}

/// Compaction that follows an acknowledged write; failure only costs space.
fn compact_locked(path: &Path, state: &mut HistoryState) {
    let before = state.log_lines;
    match rewrite(path, state) {
        Ok(()) => info!(
            "compacted history (path={}, lines_before={before}, lines_after={})",
            path.display(),
            state.log_lines
        ),
        Err(err) => warn!(
            "history compaction failed (path={}, err={err})",
            path.display()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        COMPACT_MIN_STALE_LINES, HISTORY_FILE_NAME, HistoryEvent, HistoryStore, JsonlHistoryStore,
        SCHEMA_VERSION,
    };
    use crate::HistoryError;
    use comfy_assistant_protocol::{AssistantTurn, UserTurn};
    use comfy_assistant_test_utils::sample_record;
    use pretty_assertions::assert_eq;
    use std::fs::{self, OpenOptions};
    use std::io::Write;
    use std::path::Path;
    use tempfile::tempdir;

    const TORN: &str = r#"{"type":"record","rec"#;

    fn append_raw(path: &Path, text: &str) {
        let mut file = OpenOptions::new().append(true).open(path).expect("open log");
        file.write_all(text.as_bytes()).expect("append");
    }

    fn line_count(path: &Path) -> usize {
        fs::read_to_string(path).expect("read").lines().count()
    }

    #[test]
    fn reopen_replays_counter_and_records() {
        let temp = tempdir().expect("tempdir");
        {
            let store = JsonlHistoryStore::open(temp.path()).expect("store");
            store.upsert(&sample_record(1, "hi")).expect("upsert 1");
            store.upsert(&sample_record(2, "there")).expect("upsert 2");
            store.upsert(&sample_record(1, "edited")).expect("overwrite 1");
            assert_eq!(store.next_id().expect("next"), 3);
        }

        let store = JsonlHistoryStore::open(temp.path()).expect("reopen");
        assert_eq!(store.last_message_id().expect("counter"), 3);
        let first = store.get(1).expect("get").expect("record 1");
        assert_eq!(first.user.content, "edited");
        assert_eq!(store.get(3).expect("get"), None);
    }

    #[test]
    fn upsert_above_counter_raises_it() {
        let temp = tempdir().expect("tempdir");
        let store = JsonlHistoryStore::open(temp.path()).expect("store");
        store.upsert(&sample_record(10, "late")).expect("upsert");
        assert_eq!(store.next_id().expect("next"), 11);
    }

    #[test]
    fn upsert_rejects_zero_id() {
        let temp = tempdir().expect("tempdir");
        let store = JsonlHistoryStore::open(temp.path()).expect("store");
        let err = store.upsert(&sample_record(0, "nope")).unwrap_err();
        assert!(matches!(err, HistoryError::InvalidInput(_)));
    }

    #[test]
    fn append_exchange_allocates_sequential_ids() {
        let temp = tempdir().expect("tempdir");
        let store = JsonlHistoryStore::open(temp.path()).expect("store");
        let user = UserTurn {
            content: "draw a cat".to_string(),
            prompt_id: Some("comfyui_workflow".to_string()),
            ..UserTurn::default()
        };
        let assistant = AssistantTurn {
            content: "{}".to_string(),
            images: Vec::new(),
        };
        let first = store
            .append_exchange(user.clone(), assistant.clone())
            .expect("first");
        let second = store.append_exchange(user, assistant).expect("second");
        assert_eq!((first.message_id, second.message_id), (1, 2));
        assert_eq!(store.get(1).expect("get"), Some(first));
    }

    #[test]
    fn corrupt_line_is_fatal_on_open() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join(HISTORY_FILE_NAME);
        fs::write(
            &path,
            "{\"type\":\"schema_version\",\"version\":1}\n{\"type\":\"counter\",\n",
        )
        .expect("write");
        match JsonlHistoryStore::open(temp.path()) {
            Err(HistoryError::Corrupt { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected corrupt error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn newer_schema_is_rejected() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join(HISTORY_FILE_NAME);
        fs::write(&path, "{\"type\":\"schema_version\",\"version\":2}\n").expect("write");
        assert!(matches!(
            JsonlHistoryStore::open(temp.path()),
            Err(HistoryError::UnsupportedSchema(2))
        ));
    }

    #[test]
    fn missing_counter_reads_as_zero() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join(HISTORY_FILE_NAME);
        fs::write(&path, "{\"type\":\"schema_version\",\"version\":1}\n").expect("write");
        let store = JsonlHistoryStore::open(temp.path()).expect("store");
        assert_eq!(store.next_id().expect("next"), 1);
    }

    #[test]
    fn compact_keeps_state_and_shrinks_log() {
        let temp = tempdir().expect("tempdir");
        let store = JsonlHistoryStore::open(temp.path()).expect("store");
        for _ in 0..3 {
            store.upsert(&sample_record(1, "same id")).expect("upsert");
        }
        store.compact().expect("compact");
        let contents = fs::read_to_string(store.path()).expect("read");
        assert_eq!(contents.lines().count(), 3);

        let reopened = JsonlHistoryStore::open(temp.path()).expect("reopen");
        assert_eq!(reopened.last_message_id().expect("counter"), 1);
        assert_eq!(
            reopened.get(1).expect("get"),
            Some(sample_record(1, "same id"))
        );
    }

    #[test]
    fn torn_tail_is_cut_before_the_next_append() {
        let temp = tempdir().expect("tempdir");
        let store = JsonlHistoryStore::open(temp.path()).expect("store");
        store.upsert(&sample_record(1, "kept")).expect("upsert 1");
        append_raw(store.path(), TORN);

        store.upsert(&sample_record(2, "after")).expect("upsert 2");
        assert!(!fs::read_to_string(store.path()).expect("read").contains(TORN));

        let reopened = JsonlHistoryStore::open(temp.path()).expect("reopen");
        assert_eq!(reopened.get(1).expect("get"), Some(sample_record(1, "kept")));
        assert_eq!(reopened.get(2).expect("get"), Some(sample_record(2, "after")));
        assert_eq!(reopened.last_message_id().expect("counter"), 2);
    }

    #[test]
    fn torn_tail_from_an_interrupted_run_is_skipped_on_open() {
        let temp = tempdir().expect("tempdir");
        {
            let store = JsonlHistoryStore::open(temp.path()).expect("store");
            store.upsert(&sample_record(1, "kept")).expect("upsert");
        }
        append_raw(&temp.path().join(HISTORY_FILE_NAME), TORN);

        let store = JsonlHistoryStore::open(temp.path()).expect("reopen");
        assert_eq!(store.last_message_id().expect("counter"), 1);
        assert_eq!(store.next_id().expect("next"), 2);

        let reopened = JsonlHistoryStore::open(temp.path()).expect("reopen again");
        assert_eq!(reopened.last_message_id().expect("counter"), 2);
        assert_eq!(reopened.get(1).expect("get"), Some(sample_record(1, "kept")));
    }

    #[test]
    fn unterminated_valid_last_line_is_kept() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join(HISTORY_FILE_NAME);
        fs::write(
            &path,
            "{\"type\":\"schema_version\",\"version\":1}\n{\"type\":\"counter\",\"last_message_id\":4}",
        )
        .expect("write");
        let store = JsonlHistoryStore::open(temp.path()).expect("store");
        assert_eq!(store.next_id().expect("next"), 5);

        let reopened = JsonlHistoryStore::open(temp.path()).expect("reopen");
        assert_eq!(reopened.last_message_id().expect("counter"), 5);
    }

    #[test]
    fn overwrites_trigger_compaction() {
        let temp = tempdir().expect("tempdir");
        let store = JsonlHistoryStore::open(temp.path()).expect("store");
        let writes = COMPACT_MIN_STALE_LINES + 44;
        for _ in 0..writes {
            store.upsert(&sample_record(1, "same id")).expect("upsert");
        }
        // Compacted to three lines at the 257th write, then one line per write.
        assert_eq!(line_count(store.path()), 3 + writes - (COMPACT_MIN_STALE_LINES + 1));

        let reopened = JsonlHistoryStore::open(temp.path()).expect("reopen");
        assert_eq!(reopened.last_message_id().expect("counter"), 1);
        assert_eq!(
            reopened.get(1).expect("get"),
            Some(sample_record(1, "same id"))
        );
    }

    #[test]
    fn bloated_log_is_compacted_on_open() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join(HISTORY_FILE_NAME);
        let mut lines = vec![
            serde_json::to_string(&HistoryEvent::SchemaVersion {
                version: SCHEMA_VERSION,
            })
            .expect("header"),
            serde_json::to_string(&HistoryEvent::Counter { last_message_id: 1 }).expect("counter"),
        ];
        let record = serde_json::to_string(&HistoryEvent::Record {
            record: sample_record(1, "again"),
        })
        .expect("record");
        lines.extend(std::iter::repeat_n(record, 300));
        fs::write(&path, lines.join("\n") + "\n").expect("write");

        let store = JsonlHistoryStore::open(temp.path()).expect("store");
        assert_eq!(line_count(&path), 3);
        assert_eq!(store.get(1).expect("get"), Some(sample_record(1, "again")));
        store.upsert(&sample_record(2, "next")).expect("upsert");
        assert_eq!(line_count(&path), 5);
    }
}
