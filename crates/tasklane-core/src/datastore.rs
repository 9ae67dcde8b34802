use std::fmt;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::TaskError;
use crate::filter::{Filter, sort_by_deadline_desc};
use crate::task::{Task, TaskFields};

const TASKS_FILE: &str = "tasks.data";

/// Receives the full, sorted result of a subscribed query.
pub type Listener = Box<dyn FnMut(&[Task])>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Subscription {
    id: SubscriptionId,
    filter: Filter,
    listener: Listener,
    last: Vec<Task>,
}

/// Durable task records in `<data_dir>/tasks.data`, one JSON object per line.
///
/// Every mutation rewrites the file through a temp file and an atomic rename.
/// The in-memory set only changes once the rename has succeeded, and
/// subscribers are notified after that, so they never observe a write that
/// did not land.
pub struct DataStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
    tasks: Vec<Task>,
    subscriptions: Vec<Subscription>,
}

impl fmt::Debug for DataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataStore")
            .field("data_dir", &self.data_dir)
            .field("tasks", &self.tasks.len())
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let tasks_path = data_dir.join(TASKS_FILE);
        if !tasks_path.exists() {
            fs::write(&tasks_path, "")?;
        }

        let tasks = load_jsonl(&tasks_path).context("failed to load tasks.data")?;

        info!(
            data_dir = %data_dir.display(),
            tasks = %tasks_path.display(),
            count = tasks.len(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            tasks_path,
            tasks,
            subscriptions: Vec::new(),
        })
    }

    pub fn all(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: Uuid) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Full UUID or a unique prefix of its hex form.
    pub fn resolve(&self, token: &str) -> Result<Uuid, TaskError> {
        let token = token.trim().to_ascii_lowercase();
        if let Ok(id) = Uuid::parse_str(&token) {
            return self
                .get(id)
                .map(|t| t.id)
                .ok_or_else(|| TaskError::not_found(id));
        }

        let needle = token.replace('-', "");
        if needle.is_empty() {
            return Err(TaskError::NotFound("empty task id".to_string()));
        }

        let mut hits = self
            .tasks
            .iter()
            .filter(|t| t.id.simple().to_string().starts_with(&needle));
        match (hits.next(), hits.next()) {
            (Some(task), None) => Ok(task.id),
            (Some(_), Some(_)) => Err(TaskError::NotFound(format!(
                "task id prefix is ambiguous: {token}"
            ))),
            (None, _) => Err(TaskError::NotFound(token)),
        }
    }

    #[tracing::instrument(skip(self, fields, now), fields(title = %fields.title))]
    pub fn create(&mut self, fields: TaskFields, now: DateTime<Utc>) -> Result<Task, TaskError> {
        fields.validate()?;

        let mut task = Task::from_fields(fields, now);
        while self.get(task.id).is_some() {
            task.id = Uuid::new_v4();
        }

        let mut next = self.tasks.clone();
        next.push(task.clone());
        self.commit(next)?;

        info!(id = %task.id, "created task");
        Ok(task)
    }

    #[tracing::instrument(skip(self, fields, now), fields(id = %id))]
    pub fn update(
        &mut self,
        id: Uuid,
        fields: TaskFields,
        now: DateTime<Utc>,
    ) -> Result<Task, TaskError> {
        fields.validate()?;

        let mut next = self.tasks.clone();
        let task = next
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| TaskError::not_found(id))?;
        task.apply_fields(fields, now);
        let updated = task.clone();

        self.commit(next)?;

        info!("updated task");
        Ok(updated)
    }

    #[tracing::instrument(skip(self, now), fields(id = %id))]
    pub fn set_completed(
        &mut self,
        id: Uuid,
        completed: bool,
        now: DateTime<Utc>,
    ) -> Result<Task, TaskError> {
        let mut next = self.tasks.clone();
        let task = next
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| TaskError::not_found(id))?;
        task.is_completed = completed;
        task.modified = now;
        let updated = task.clone();

        self.commit(next)?;

        info!(completed, "changed completion");
        Ok(updated)
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    pub fn delete(&mut self, id: Uuid) -> Result<Task, TaskError> {
        let mut next = self.tasks.clone();
        let idx = next
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| TaskError::not_found(id))?;
        let removed = next.remove(idx);

        self.commit(next)?;

        info!("deleted task");
        Ok(removed)
    }

    /// Matching tasks, latest deadline first.
    pub fn query(&self, filter: &Filter) -> Vec<Task> {
        matching(&self.tasks, filter)
    }

    /// Registers a live query. The listener is called once with the current
    /// result and again after every committed mutation that changes it.
    #[tracing::instrument(skip(self, listener))]
    pub fn subscribe(&mut self, filter: Filter, mut listener: Listener) -> SubscriptionId {
        let id = SubscriptionId::new();
        let snapshot = matching(&self.tasks, &filter);
        listener(&snapshot);
        self.subscriptions.push(Subscription {
            id,
            filter,
            listener,
            last: snapshot,
        });
        debug!(subscription = %id, "added subscription");
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|sub| sub.id != id);
        let removed = self.subscriptions.len() != before;
        if !removed {
            warn!(subscription = %id, "unsubscribe for unknown subscription");
        }
        removed
    }

    fn commit(&mut self, next: Vec<Task>) -> Result<(), TaskError> {
        save_jsonl_atomic(&self.tasks_path, &next)
            .map_err(|err| TaskError::persistence(format!("{err:#}")))?;
        self.tasks = next;
        self.publish();
        Ok(())
    }

    fn publish(&mut self) {
        for sub in &mut self.subscriptions {
            let snapshot = matching(&self.tasks, &sub.filter);
            if snapshot == sub.last {
                continue;
            }
            debug!(subscription = %sub.id, count = snapshot.len(), "publishing snapshot");
            (sub.listener)(&snapshot);
            sub.last = snapshot;
        }
    }
}

fn matching(tasks: &[Task], filter: &Filter) -> Vec<Task> {
    let mut out: Vec<Task> = tasks.iter().filter(|t| filter.matches(t)).cloned().collect();
    sort_by_deadline_desc(&mut out);
    out
}

#[tracing::instrument(skip(path))]
pub(crate) fn load_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
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

        let record: T = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(record);
    }

    debug!(count = out.len(), "loaded records from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, records))]
pub(crate) fn save_jsonl_atomic<T: Serialize>(path: &Path, records: &[T]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = records.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
    for record in records {
        let serialized = serde_json::to_string(record)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;
    temp.as_file().sync_all()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
