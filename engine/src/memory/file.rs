//! Markdown file-based memory store.
//!
//! Layout under the memory-bank root:
//!
//! ```text
//! activeContext.md           current task pointer (read-only here)
//! tasks/<id>.md              task plan: status, checklist, command log
//! tasks/<id>.lock            run lock, present only while a build runs
//! creative/<id>/*.md         creative-decision records
//! progress/<id>.md           append-only progress records
//! ```

use super::{codec, delta, MemoryStore};
use chrono::Utc;
use sdk::errors::EngineError;
use sdk::types::{CreativePhaseRecord, ProgressRecord, Task, TaskDelta, TaskId};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const ACTIVE_CONTEXT_FILE: &str = "activeContext.md";
const TASKS_DIR: &str = "tasks";
const CREATIVE_DIR: &str = "creative";
const PROGRESS_DIR: &str = "progress";

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn active_context_path(&self) -> PathBuf {
        self.root.join(ACTIVE_CONTEXT_FILE)
    }

    pub fn plan_path(&self, id: &TaskId) -> PathBuf {
        self.root.join(TASKS_DIR).join(format!("{}.md", id))
    }

    pub fn lock_path(&self, id: &TaskId) -> PathBuf {
        self.root.join(TASKS_DIR).join(format!("{}.lock", id))
    }

    pub fn creative_dir(&self, id: &TaskId) -> PathBuf {
        self.root.join(CREATIVE_DIR).join(id.as_str())
    }

    pub fn progress_path(&self, id: &TaskId) -> PathBuf {
        self.root.join(PROGRESS_DIR).join(format!("{}.md", id))
    }

    /// Take the run lock for a task.
    ///
    /// Fails with `TaskLocked` while another run holds it. The lock file is
    /// removed when the returned guard is dropped.
    pub fn lock(&self, id: &TaskId) -> Result<RunLock, EngineError> {
        let path = self.lock_path(id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(EngineError::TaskLocked(id.to_string()));
            }
            Err(e) => return Err(EngineError::Io(e)),
        };
        let lock = RunLock::stamp(path, file, |file| {
            writeln!(file, "{}", std::process::id())
        })?;
        debug!("Acquired run lock {:?}", lock.path);

        Ok(lock)
    }

    /// Render the plan next to its final location; `commit_plan` moves it in
    fn stage_plan(&self, task: &Task) -> Result<PathBuf, EngineError> {
        let tmp_path = self.plan_path(&task.id).with_extension("md.tmp");
        fs::write(&tmp_path, codec::render_task(task))
            .map_err(|e| EngineError::StoreWriteFailed(format!("{}: {}", tmp_path.display(), e)))?;
        Ok(tmp_path)
    }

    fn commit_plan(&self, id: &TaskId, tmp_path: &Path) -> Result<(), EngineError> {
        let path = self.plan_path(id);
        fs::rename(tmp_path, &path)
            .map_err(|e| EngineError::StoreWriteFailed(format!("{}: {}", path.display(), e)))
    }

    fn discard_plan(tmp_path: &Path) {
        if let Err(e) = fs::remove_file(tmp_path) {
            warn!("Failed to remove staged plan {:?}: {}", tmp_path, e);
        }
    }

    fn append_progress(&self, id: &TaskId, records: &[ProgressRecord]) -> Result<(), EngineError> {
        if records.is_empty() {
            return Ok(());
        }
        let path = self.progress_path(id);
        let write_failed =
            |e: std::io::Error| EngineError::StoreWriteFailed(format!("{}: {}", path.display(), e));

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_failed)?;
        }
        let is_new = !path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(write_failed)?;

        let mut text = String::new();
        if is_new {
            text.push_str(&format!("# Progress: {}\n\n", id));
        }
        for record in records {
            text.push_str(&codec::render_progress(record));
        }
        file.write_all(text.as_bytes()).map_err(write_failed)?;
        Ok(())
    }
}

impl MemoryStore for FileStore {
    fn current_task(&self) -> Result<TaskId, EngineError> {
        let path = self.active_context_path();
        let text = self.active_context()?.ok_or_else(|| {
            EngineError::NotFound(format!("no active context document at {}", path.display()))
        })?;
        codec::parse_current_task(&text)?.ok_or_else(|| {
            EngineError::NotFound(format!("{} names no current task", path.display()))
        })
    }

    fn active_context(&self) -> Result<Option<String>, EngineError> {
        match fs::read_to_string(self.active_context_path()) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EngineError::Io(e)),
        }
    }

    fn read(&self, id: &TaskId) -> Result<Task, EngineError> {
        let path = self.plan_path(id);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(EngineError::NotFound(format!(
                    "no task plan at {}",
                    path.display()
                )));
            }
            Err(e) => return Err(EngineError::Io(e)),
        };
        codec::parse_task(id, &text)
    }

    fn write(&self, id: &TaskId, delta: &TaskDelta) -> Result<Task, EngineError> {
        let current = self.read(id)?;
        if delta.is_empty() {
            return Ok(current);
        }

        let (next, progress) = delta::apply(&current, delta, Utc::now())?;

        // Progress goes first: a failed append must leave the plan, and so
        // the transition that produced the record, unchanged.
        let tmp_path = self.stage_plan(&next)?;
        if let Err(e) = self.append_progress(id, &progress) {
            Self::discard_plan(&tmp_path);
            return Err(e);
        }
        self.commit_plan(id, &tmp_path)?;
        Ok(next)
    }

    fn creative_records(&self, id: &TaskId) -> Result<Vec<CreativePhaseRecord>, EngineError> {
        let dir = self.creative_dir(id);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(EngineError::Io(e)),
        };

        let mut records = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|ext| ext.to_str()) != Some("md") {
                continue;
            }
            let name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            let title = match fs::read_to_string(&path) {
                Ok(text) => codec::creative_title(&text),
                Err(e) => {
                    warn!("Failed to read creative record {:?}: {}", path, e);
                    None
                }
            };
            records.push(CreativePhaseRecord {
                title: title.unwrap_or_else(|| name.clone()),
                name,
            });
        }

        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    fn progress(&self, id: &TaskId) -> Result<Vec<ProgressRecord>, EngineError> {
        match fs::read_to_string(self.progress_path(id)) {
            Ok(text) => Ok(codec::parse_progress(&text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(EngineError::Io(e)),
        }
    }
}

/// Exclusive run lock on one task; released on drop
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Wrap a freshly created lock file and record its owner. The guard
    /// exists before the owner is written, so a failed write still removes
    /// the file.
    fn stamp(
        path: PathBuf,
        mut file: fs::File,
        owner: impl FnOnce(&mut fs::File) -> std::io::Result<()>,
    ) -> Result<Self, EngineError> {
        let lock = Self { path };
        owner(&mut file)?;
        Ok(lock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to release run lock {:?}: {}", self.path, e);
        } else {
            debug!("Released run lock {:?}", self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::types::{ComplexityLevel, TaskStatus};
    use tempfile::TempDir;

    fn seed(dir: &TempDir, id: &str, body: &str) -> (FileStore, TaskId) {
        let store = FileStore::new(dir.path());
        let id = TaskId::new(id).unwrap();
        fs::create_dir_all(dir.path().join(TASKS_DIR)).unwrap();
        fs::write(store.plan_path(&id), body).unwrap();
        (store, id)
    }

    const PLAN: &str = "# Task: fix-login\n\n- Complexity: Level 1\n\n## Checklist\n- [ ] review\n- [ ] fix\n";

    #[test]
    fn test_read_missing_plan_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        let err = store.read(&TaskId::new("nope").unwrap()).unwrap_err();
        assert!(matches!(err, EngineError::NotFound(ref msg) if msg.contains("nope.md")));
    }

    #[test]
    fn test_write_is_visible_to_next_read() {
        let dir = TempDir::new().unwrap();
        let (store, id) = seed(&dir, "fix-login", PLAN);

        let delta = TaskDelta::new()
            .status(TaskStatus::InProgress)
            .complete("review")
            .log("review", "git log -5", "found the regression")
            .progress("build started");
        let written = store.write(&id, &delta).unwrap();
        let read = store.read(&id).unwrap();

        assert_eq!(written, read);
        assert_eq!(read.complexity_level, ComplexityLevel::Level1);
        assert_eq!(read.status, TaskStatus::InProgress);
        assert!(read.item("review").unwrap().done);
        assert_eq!(read.log[0].command, "git log -5");
        assert!(!store.plan_path(&id).with_extension("md.tmp").exists());

        let progress = store.progress(&id).unwrap();
        assert_eq!(progress.len(), 1);
        assert_eq!(progress[0].text, "build started");
    }

    #[test]
    fn test_progress_is_appended() {
        let dir = TempDir::new().unwrap();
        let (store, id) = seed(&dir, "fix-login", PLAN);

        store.write(&id, &TaskDelta::new().progress("first")).unwrap();
        store.write(&id, &TaskDelta::new().progress("second")).unwrap();

        let texts: Vec<String> = store
            .progress(&id)
            .unwrap()
            .into_iter()
            .map(|record| record.text)
            .collect();
        assert_eq!(texts, vec!["first", "second"]);

        let raw = fs::read_to_string(store.progress_path(&id)).unwrap();
        assert!(raw.starts_with("# Progress: fix-login"));
    }

    #[test]
    fn test_rejected_write_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let (store, id) = seed(&dir, "fix-login", PLAN);

        let err = store
            .write(&id, &TaskDelta::new().complete("deploy"))
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownChecklistItem(_)));
        assert_eq!(fs::read_to_string(store.plan_path(&id)).unwrap(), PLAN);
    }

    #[test]
    fn test_creative_records() {
        let dir = TempDir::new().unwrap();
        let (store, id) = seed(&dir, "fix-login", PLAN);
        assert!(store.creative_records(&id).unwrap().is_empty());

        let creative = store.creative_dir(&id);
        fs::create_dir_all(&creative).unwrap();
        fs::write(creative.join("b-storage.md"), "# Storage layout\n").unwrap();
        fs::write(creative.join("a-api.md"), "no heading here\n").unwrap();
        fs::write(creative.join("scratch.txt"), "ignored").unwrap();

        let records = store.creative_records(&id).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "a-api");
        assert_eq!(records[0].title, "a-api");
        assert_eq!(records[1].title, "Storage layout");
    }

    #[test]
    fn test_current_task_from_active_context() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        assert!(matches!(store.current_task(), Err(EngineError::NotFound(_))));

        fs::write(store.active_context_path(), "# Active Context\n\n- Focus: auth\n").unwrap();
        assert!(matches!(store.current_task(), Err(EngineError::NotFound(_))));

        fs::write(
            store.active_context_path(),
            "# Active Context\n\n- Current Task: fix-login\n",
        )
        .unwrap();
        assert_eq!(store.current_task().unwrap().as_str(), "fix-login");
    }

    #[test]
    fn test_failed_progress_append_keeps_plan() {
        let dir = TempDir::new().unwrap();
        let (store, id) = seed(&dir, "fix-login", PLAN);
        // A regular file where the progress directory belongs
        fs::write(dir.path().join(PROGRESS_DIR), "not a directory").unwrap();

        let delta = TaskDelta::new()
            .status(TaskStatus::PrerequisitesVerified)
            .progress("prerequisites verified");
        let err = store.write(&id, &delta).unwrap_err();
        assert!(matches!(err, EngineError::StoreWriteFailed(_)));
        assert_eq!(fs::read_to_string(store.plan_path(&id)).unwrap(), PLAN);
        assert!(!store.plan_path(&id).with_extension("md.tmp").exists());

        fs::remove_file(dir.path().join(PROGRESS_DIR)).unwrap();
        store.write(&id, &delta).unwrap();
        assert_eq!(store.read(&id).unwrap().status, TaskStatus::PrerequisitesVerified);
        assert_eq!(store.progress(&id).unwrap()[0].text, "prerequisites verified");
    }

    #[test]
    fn test_blank_log_item_is_rejected_before_writing() {
        let dir = TempDir::new().unwrap();
        let (store, id) = seed(&dir, "fix-login", PLAN);

        let err = store
            .write(&id, &TaskDelta::new().log("  ", "ls", "ok"))
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownChecklistItem(_)));
        assert_eq!(fs::read_to_string(store.plan_path(&id)).unwrap(), PLAN);
        assert!(store.read(&id).unwrap().log.is_empty());
    }

    #[test]
    fn test_log_delimiters_survive_on_disk() {
        let dir = TempDir::new().unwrap();
        let (store, id) = seed(&dir, "fix-login", PLAN);

        let delta = TaskDelta::new().log("review", "grep `x` src", "found `a` => b");
        store.write(&id, &delta).unwrap();

        let entry = &store.read(&id).unwrap().log[0];
        assert_eq!(entry.item, "review");
        assert_eq!(entry.command, "grep `x` src");
        assert_eq!(entry.result, "found `a` => b");
    }

    #[test]
    fn test_lock_file_removed_when_owner_write_fails() {
        let dir = TempDir::new().unwrap();
        let (store, id) = seed(&dir, "fix-login", PLAN);
        let path = store.lock_path(&id);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .unwrap();

        let result = RunLock::stamp(path.clone(), file, |_| {
            Err(std::io::Error::new(ErrorKind::Other, "disk full"))
        });
        assert!(matches!(result, Err(EngineError::Io(_))));
        assert!(!path.exists());
        assert!(store.lock(&id).is_ok());
    }

    #[test]
    fn test_run_lock_is_exclusive() {
        let dir = TempDir::new().unwrap();
        let (store, id) = seed(&dir, "fix-login", PLAN);

        let lock = store.lock(&id).unwrap();
        assert!(lock.path().exists());
        assert!(matches!(store.lock(&id), Err(EngineError::TaskLocked(_))));

        drop(lock);
        assert!(!store.lock_path(&id).exists());
        assert!(store.lock(&id).is_ok());
    }
}
