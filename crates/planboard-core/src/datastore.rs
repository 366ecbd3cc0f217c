use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use chrono::Utc;
use tempfile::NamedTempFile;
use tracing::{debug, info};
use uuid::Uuid;

use crate::task::{NewTask, Task, TaskPatch};

/// Authoritative task collection. Implementations assign `id` and
/// `createdAt` on create.
pub trait TaskStore {
    fn list(&self) -> anyhow::Result<Vec<Task>>;
    fn create(&mut self, new: NewTask) -> anyhow::Result<Task>;
    fn update(&mut self, id: &str, patch: &TaskPatch) -> anyhow::Result<Task>;
    fn delete(&mut self, id: &str) -> anyhow::Result<()>;
}

#[derive(Debug)]
pub struct FileTaskStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
}

impl FileTaskStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let tasks_path = data_dir.join("tasks.data");
        if !tasks_path.exists() {
            fs::write(&tasks_path, "")?;
        }

        info!(
            data_dir = %data_dir.display(),
            tasks = %tasks_path.display(),
            "opened task store"
        );

        Ok(Self {
            data_dir,
            tasks_path,
        })
    }

    fn load(&self) -> anyhow::Result<Vec<Task>> {
        load_jsonl(&self.tasks_path).context("failed to load tasks.data")
    }

    fn save(&self, tasks: &[Task]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.tasks_path, tasks).context("failed to save tasks.data")
    }
}

impl TaskStore for FileTaskStore {
    #[tracing::instrument(skip(self))]
    fn list(&self) -> anyhow::Result<Vec<Task>> {
        self.load()
    }

    #[tracing::instrument(skip(self, new), fields(title = %new.title))]
    fn create(&mut self, new: NewTask) -> anyhow::Result<Task> {
        let mut tasks = self.load()?;
        let task = Task::from_new(Uuid::new_v4().to_string(), new, Utc::now());
        tasks.push(task.clone());
        self.save(&tasks)?;
        info!(id = %task.id, "created task");
        Ok(task)
    }

    #[tracing::instrument(skip(self, patch))]
    fn update(&mut self, id: &str, patch: &TaskPatch) -> anyhow::Result<Task> {
        let mut tasks = self.load()?;
        let updated = {
            let task = tasks
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or_else(|| anyhow!("task not found: {id}"))?;
            patch.apply(task);
            task.clone()
        };
        self.save(&tasks)?;
        debug!(id = %updated.id, "task patch applied");
        Ok(updated)
    }

    #[tracing::instrument(skip(self))]
    fn delete(&mut self, id: &str) -> anyhow::Result<()> {
        let mut tasks = self.load()?;
        let before = tasks.len();
        tasks.retain(|t| t.id != id);
        if tasks.len() == before {
            return Err(anyhow!("task not found: {id}"));
        }
        self.save(&tasks)?;
        info!(id, remaining = tasks.len(), "deleted task");
        Ok(())
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl(path: &Path) -> anyhow::Result<Vec<Task>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let task: Task = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(task);
    }

    debug!(count = out.len(), "loaded tasks from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, tasks))]
fn save_jsonl_atomic(path: &Path, tasks: &[Task]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = tasks.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for task in tasks {
        let serialized = serde_json::to_string(task)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
