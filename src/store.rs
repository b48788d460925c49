// Task store: in-memory task list with derived views and write-behind persistence

use crate::backend::KeyValueBackend;
use crate::error::StoreError;
use crate::filter::{StatusFilter, ViewFilter, filtered};
use crate::models::{Priority, Task, Theme, now};
use crate::persist::WriteBehind;
use crate::record::{self, TASKS_KEY, THEME_KEY};
use crate::stats::Counts;
use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 64;

/// What the rendering layer shows: the visible tasks and the counts
#[derive(Debug, Clone, PartialEq)]
pub struct View {
    pub tasks: Vec<Task>,
    pub counts: Counts,
}

/// Advisory feedback for haptics or alerts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feedback {
    Success,
    Warning,
    Rejected,
}

/// Notifications published to subscribers. None of them affect store state.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    Changed(View),
    /// A toggle left every task completed
    AllCompleted,
    Feedback(Feedback),
    PersistFailed(StoreError),
}

/// Owner of the ordered task list and theme preference
///
/// Mutations apply synchronously and queue a full-state write on the
/// background writer, so a `TaskStore` must be created inside a tokio runtime.
pub struct TaskStore {
    tasks: Vec<Task>,
    theme: Theme,
    view: ViewFilter,
    backend: Arc<dyn KeyValueBackend>,
    writer: WriteBehind,
    events: broadcast::Sender<StoreEvent>,
}

impl TaskStore {
    /// Create an empty store over `backend`; call [`TaskStore::load`] to restore state
    pub fn new(backend: Arc<dyn KeyValueBackend>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let writer = WriteBehind::spawn(Arc::clone(&backend), events.clone());

        Self {
            tasks: Vec::new(),
            theme: Theme::default(),
            view: ViewFilter::default(),
            backend,
            writer,
            events,
        }
    }

    /// Restore tasks and theme from the backend
    ///
    /// Missing keys yield an empty list and the default theme. On any read or
    /// decode failure the store is reset to that same empty state and the
    /// error is returned for the caller to report.
    pub async fn load(&mut self) -> Result<(), StoreError> {
        let result = self.read_persisted().await;

        let outcome = match result {
            Ok((tasks, theme)) => {
                info!(count = tasks.len(), %theme, "Loaded task store");
                self.tasks = tasks;
                self.theme = theme;
                Ok(())
            }
            Err(e) => {
                warn!(error = ?e, "Failed to load task store, starting empty");
                self.tasks.clear();
                self.theme = Theme::default();
                Err(StoreError::read(&e))
            }
        };

        self.publish();
        outcome
    }

    async fn read_persisted(&self) -> Result<(Vec<Task>, Theme)> {
        let tasks = match self.backend.get(TASKS_KEY).await.context("Failed to read tasks")? {
            Some(raw) => record::decode_tasks(&raw)?,
            None => Vec::new(),
        };

        let theme = match self.backend.get(THEME_KEY).await.context("Failed to read theme")? {
            Some(raw) => record::decode_theme(&raw)?,
            None => Theme::default(),
        };

        Ok((tasks, theme))
    }

    /// Wait for every queued write to reach the backend
    pub async fn flush(&self) {
        self.writer.flush().await;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Insert a new task at the head of the list
    ///
    /// Returns the new id, or `None` when `text` is blank. A due date that is
    /// not strictly in the future is dropped.
    pub fn add(&mut self, text: &str, priority: Priority, due_date: Option<DateTime<Utc>>) -> Option<String> {
        let Some(task) = Task::new(text, priority, due_date, now()) else {
            debug!("add: rejected blank text");
            self.emit(StoreEvent::Feedback(Feedback::Rejected));
            return None;
        };

        let id = task.id.clone();
        debug!(id = %id, %priority, "add");
        self.tasks.insert(0, task);
        self.commit(Feedback::Success);
        Some(id)
    }

    /// Flip completion of `id`, returning the new state
    pub fn toggle(&mut self, id: &str) -> Option<bool> {
        let task = self.find_mut(id)?;
        task.completed = !task.completed;
        let completed = task.completed;

        self.commit(Feedback::Success);
        if completed && self.tasks.iter().all(|t| t.completed) {
            info!(count = self.tasks.len(), "All tasks completed");
            self.emit(StoreEvent::AllCompleted);
        }
        Some(completed)
    }

    /// Replace the text of `id`; blank text is ignored
    pub fn edit(&mut self, id: &str, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            self.emit(StoreEvent::Feedback(Feedback::Rejected));
            return false;
        }

        match self.find_mut(id) {
            Some(task) => {
                task.text = text.to_string();
                self.commit(Feedback::Success);
                true
            }
            None => false,
        }
    }

    pub fn set_priority(&mut self, id: &str, priority: Priority) -> bool {
        match self.find_mut(id) {
            Some(task) => {
                task.priority = priority;
                self.commit(Feedback::Success);
                true
            }
            None => false,
        }
    }

    /// Overwrite the due date of `id`; unlike `add`, past dates are kept
    pub fn set_due_date(&mut self, id: &str, due_date: Option<DateTime<Utc>>) -> bool {
        match self.find_mut(id) {
            Some(task) => {
                task.due_date = due_date;
                self.commit(Feedback::Success);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        if self.tasks.len() == before {
            return false;
        }

        debug!(id, "remove");
        self.commit(Feedback::Warning);
        true
    }

    /// Drop every completed task, returning how many were removed
    pub fn clear_completed(&mut self) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|t| !t.completed);
        let removed = before - self.tasks.len();

        debug!(removed, "clear_completed");
        self.commit(Feedback::Success);
        removed
    }

    /// Empty the list and delete the persisted tasks key
    pub fn clear_all(&mut self) {
        debug!(count = self.tasks.len(), "clear_all");
        self.tasks.clear();
        self.writer.remove(TASKS_KEY);
        self.publish();
        self.emit(StoreEvent::Feedback(Feedback::Warning));
    }

    /// Move the task at `from` so it ends up at `to`
    ///
    /// Splice semantics: the task is removed first and `to` indexes into the
    /// remaining list. Both indices must be below `len()`.
    pub fn reorder(&mut self, from: usize, to: usize) -> Result<(), StoreError> {
        let len = self.tasks.len();
        for index in [from, to] {
            if index >= len {
                return Err(StoreError::IndexOutOfRange { index, len });
            }
        }

        let task = self.tasks.remove(from);
        self.tasks.insert(to, task);
        self.commit(Feedback::Success);
        Ok(())
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
        self.writer.set(THEME_KEY, record::encode_theme(theme));
    }

    pub fn toggle_theme(&mut self) -> Theme {
        self.set_theme(self.theme.toggled());
        self.theme
    }

    /// Change the filter the rendering layer is showing
    pub fn set_view(&mut self, status: StatusFilter, query: impl Into<String>) {
        self.view = ViewFilter::new(status, query);
        self.publish();
    }

    // ========================================================================
    // Derived views
    // ========================================================================

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn filtered(&self, status: StatusFilter, query: &str) -> Vec<&Task> {
        filtered(&self.tasks, status, query)
    }

    pub fn counts(&self) -> Counts {
        Counts::from_tasks(&self.tasks, now())
    }

    pub fn completion_percentage(&self) -> u32 {
        self.counts().completion_percentage()
    }

    /// The list under the current view filter, plus counts
    pub fn visible(&self) -> View {
        View {
            tasks: self.tasks.iter().filter(|t| self.view.matches(t)).cloned().collect(),
            counts: self.counts(),
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn find_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// Persist the full list, notify subscribers and send feedback
    fn commit(&self, feedback: Feedback) {
        self.persist_tasks();
        self.publish();
        self.emit(StoreEvent::Feedback(feedback));
    }

    fn persist_tasks(&self) {
        match record::encode_tasks(&self.tasks) {
            Ok(raw) => self.writer.set(TASKS_KEY, raw),
            Err(e) => {
                warn!(error = ?e, "Failed to encode tasks, skipping persist");
                self.emit(StoreEvent::PersistFailed(StoreError::write(&e)));
            }
        }
    }

    fn publish(&self) {
        if self.events.receiver_count() > 0 {
            self.emit(StoreEvent::Changed(self.visible()));
        }
    }

    fn emit(&self, event: StoreEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
