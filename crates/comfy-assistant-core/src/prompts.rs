//! Prompt library: named system prompts stored as an index plus one content
//! file per prompt.

use crate::error::AssistantError;
use log::{info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const PROMPTS_DIR: &str = "prompts";
pub const PROMPTS_INDEX: &str = "prompts.json";
pub const DEFAULT_PROMPT_ID: &str = "comfyui_workflow";
const DEFAULT_PROMPT_NAME: &str = "生成一份新的comfyui工作流";
const DEFAULT_PROMPT_FILE: &str = "comfyui_workflow.ini";
const DEFAULT_PROMPT_CONTENT: &str = "你是一个comfyui专家，请帮用户处理工作流新建问题";

/// Renderer applied to replies produced under a prompt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseHandler {
    /// Render a ComfyUI workflow widget.
    #[serde(alias = "fun_process_workflow_response")]
    Workflow,
    /// Render an executable FFmpeg command widget.
    #[serde(alias = "fun_process_ffmpeg_command")]
    FfmpegCommand,
}

/// Extra context appended to the system prompt before sending.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContextProvider {
    /// Host, GPU and FFmpeg build report.
    #[serde(alias = "run_process_ffmpeg_command")]
    MediaEnvironment,
}

/// One prompt in the index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptEntry {
    pub prompt_id: String,
    pub prompt_name: String,
    /// Content file name, relative to the prompts directory.
    pub prompt_content_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_fun: Option<ResponseHandler>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_run: Option<ContextProvider>,
}

/// On-disk shape of `prompts.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptIndex {
    pub prompts: Vec<PromptEntry>,
}

impl Default for PromptIndex {
    fn default() -> Self {
        Self {
            prompts: vec![PromptEntry {
                prompt_id: DEFAULT_PROMPT_ID.to_string(),
                prompt_name: DEFAULT_PROMPT_NAME.to_string(),
                prompt_content_path: DEFAULT_PROMPT_FILE.to_string(),
                prompt_fun: Some(ResponseHandler::Workflow),
                prompt_run: None,
            }],
        }
    }
}

/// File-backed prompt library.
#[derive(Debug)]
pub struct PromptLibrary {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl PromptLibrary {
    /// Library stored under `root/prompts/`.
    pub fn open(root: &Path) -> Self {
        Self {
            dir: root.join(PROMPTS_DIR),
            lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load the index, creating the default one when missing. An unreadable
    /// index yields the defaults without touching the file.
    pub fn list(&self) -> Result<PromptIndex, AssistantError> {
        let _guard = self.lock.lock();
        self.load_index()
    }

    pub fn entry(&self, prompt_id: &str) -> Result<Option<PromptEntry>, AssistantError> {
        Ok(self
            .list()?
            .prompts
            .into_iter()
            .find(|entry| entry.prompt_id == prompt_id))
    }

    /// Prompt text; empty when the prompt or its file is missing.
    pub fn content(&self, prompt_id: &str) -> Result<String, AssistantError> {
        let Some(entry) = self.entry(prompt_id)? else {
            return Ok(String::new());
        };
        if ensure_plain_file_name(&entry.prompt_content_path).is_err() {
            warn!(
                "ignoring prompt with unsafe content path (prompt_id={prompt_id}, path={})",
                entry.prompt_content_path
            );
            return Ok(String::new());
        }
        match fs::read_to_string(self.dir.join(&entry.prompt_content_path)) {
            Ok(content) => Ok(content),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(err) => Err(err.into()),
        }
    }

    /// Insert or replace a prompt and write its content file.
    pub fn save(&self, entry: PromptEntry, content: &str) -> Result<(), AssistantError> {
        if entry.prompt_id.trim().is_empty() || entry.prompt_name.trim().is_empty() {
            return Err(AssistantError::InvalidInput(
                "prompt_id and prompt_name are required".to_string(),
            ));
        }
        ensure_plain_file_name(&entry.prompt_content_path)?;

        let _guard = self.lock.lock();
        let mut index = self.load_index()?;
        fs::create_dir_all(&self.dir)?;
        fs::write(self.dir.join(&entry.prompt_content_path), content)?;
        match index
            .prompts
            .iter_mut()
            .find(|existing| existing.prompt_id == entry.prompt_id)
        {
            Some(existing) => *existing = entry,
            None => index.prompts.push(entry),
        }
        self.write_index(&index)
    }

    /// Remove a prompt and its content file.
    pub fn delete(&self, prompt_id: &str) -> Result<(), AssistantError> {
        let _guard = self.lock.lock();
        let mut index = self.load_index()?;
        let Some(position) = index
            .prompts
            .iter()
            .position(|entry| entry.prompt_id == prompt_id)
        else {
            return Err(AssistantError::PromptNotFound(prompt_id.to_string()));
        };
        let entry = index.prompts.remove(position);
        if ensure_plain_file_name(&entry.prompt_content_path).is_ok() {
            match fs::remove_file(self.dir.join(&entry.prompt_content_path)) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        self.write_index(&index)
    }

    /// Wipe the library and recreate the default prompt.
    pub fn reset_all(&self) -> Result<(), AssistantError> {
        let _guard = self.lock.lock();
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        self.write_defaults()?;
        info!("prompt library reset (dir={})", self.dir.display());
        Ok(())
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join(PROMPTS_INDEX)
    }

    fn load_index(&self) -> Result<PromptIndex, AssistantError> {
        let path = self.index_path();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return self.write_defaults();
            }
            Err(err) => return Err(err.into()),
        };
        match serde_json::from_str(&raw) {
            Ok(index) => Ok(index),
            Err(err) => {
                warn!(
                    "prompt index unreadable, using defaults (path={}, err={err})",
                    path.display()
                );
                Ok(PromptIndex::default())
            }
        }
    }

    fn write_defaults(&self) -> Result<PromptIndex, AssistantError> {
        let index = PromptIndex::default();
        fs::create_dir_all(&self.dir)?;
        fs::write(self.dir.join(DEFAULT_PROMPT_FILE), DEFAULT_PROMPT_CONTENT)?;
        self.write_index(&index)?;
        Ok(index)
    }

    fn write_index(&self, index: &PromptIndex) -> Result<(), AssistantError> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.index_path(), serde_json::to_vec_pretty(index)?)?;
        Ok(())
    }
}

/// Content files must live directly in the prompts directory.
fn ensure_plain_file_name(name: &str) -> Result<(), AssistantError> {
    let plain = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && Path::new(name).file_name().is_some_and(|file| file == name);
    if plain {
        Ok(())
    } else {
        Err(AssistantError::InvalidInput(format!(
            "prompt_content_path must be a plain file name: {name:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ContextProvider, DEFAULT_PROMPT_ID, PromptEntry, PromptLibrary, ResponseHandler,
    };
    use crate::AssistantError;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn entry(id: &str, path: &str) -> PromptEntry {
        PromptEntry {
            prompt_id: id.to_string(),
            prompt_name: format!("{id} name"),
            prompt_content_path: path.to_string(),
            prompt_fun: None,
            prompt_run: None,
        }
    }

    #[test]
    fn list_creates_default_prompt() {
        let temp = tempdir().expect("tempdir");
        let library = PromptLibrary::open(temp.path());
        let index = library.list().expect("list");
        assert_eq!(index.prompts.len(), 1);
        assert_eq!(index.prompts[0].prompt_id, DEFAULT_PROMPT_ID);
        assert!(library.dir().join("prompts.json").exists());
        assert!(library.content(DEFAULT_PROMPT_ID).expect("content").contains("comfyui"));
    }

    #[test]
    fn save_upserts_and_content_round_trips() {
        let temp = tempdir().expect("tempdir");
        let library = PromptLibrary::open(temp.path());
        library.save(entry("ffmpeg", "ffmpeg.ini"), "v1").expect("save");
        let mut updated = entry("ffmpeg", "ffmpeg.ini");
        updated.prompt_fun = Some(ResponseHandler::FfmpegCommand);
        updated.prompt_run = Some(ContextProvider::MediaEnvironment);
        library.save(updated.clone(), "v2").expect("save again");

        let index = library.list().expect("list");
        assert_eq!(index.prompts.len(), 2);
        assert_eq!(library.entry("ffmpeg").expect("entry"), Some(updated));
        assert_eq!(library.content("ffmpeg").expect("content"), "v2");
        assert_eq!(library.content("missing").expect("content"), "");
    }

    #[test]
    fn save_rejects_nested_content_paths() {
        let temp = tempdir().expect("tempdir");
        let library = PromptLibrary::open(temp.path());
        for path in ["../escape.ini", "sub/dir.ini", "", ".."] {
            let err = library.save(entry("bad", path), "x").unwrap_err();
            assert!(matches!(err, AssistantError::InvalidInput(_)), "{path}");
        }
    }

    #[test]
    fn delete_missing_prompt_is_not_found() {
        let temp = tempdir().expect("tempdir");
        let library = PromptLibrary::open(temp.path());
        library.save(entry("tmp", "tmp.ini"), "x").expect("save");
        library.delete("tmp").expect("delete");
        assert!(!library.dir().join("tmp.ini").exists());
        let err = library.delete("tmp").unwrap_err();
        assert!(matches!(err, AssistantError::PromptNotFound(id) if id == "tmp"));
    }

    #[test]
    fn invalid_index_falls_back_to_defaults() {
        let temp = tempdir().expect("tempdir");
        let library = PromptLibrary::open(temp.path());
        std::fs::create_dir_all(library.dir()).expect("dir");
        std::fs::write(library.dir().join("prompts.json"), "{ not json").expect("write");
        let index = library.list().expect("list");
        assert_eq!(index.prompts[0].prompt_id, DEFAULT_PROMPT_ID);
    }

    #[test]
    fn reset_all_restores_only_the_default() {
        let temp = tempdir().expect("tempdir");
        let library = PromptLibrary::open(temp.path());
        library.save(entry("extra", "extra.ini"), "x").expect("save");
        library.reset_all().expect("reset");
        let index = library.list().expect("list");
        assert_eq!(index.prompts.len(), 1);
        assert!(!library.dir().join("extra.ini").exists());
    }

    #[test]
    fn legacy_handler_names_are_accepted() {
        let entry: PromptEntry = serde_json::from_str(
            r#"{"prompt_id":"a","prompt_name":"A","prompt_content_path":"a.ini",
                "prompt_fun":"fun_process_ffmpeg_command","prompt_run":"run_process_ffmpeg_command"}"#,
        )
        .expect("decode");
        assert_eq!(entry.prompt_fun, Some(ResponseHandler::FfmpegCommand));
        assert_eq!(entry.prompt_run, Some(ContextProvider::MediaEnvironment));
    }
}
