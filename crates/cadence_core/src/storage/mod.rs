pub mod json_store;

use crate::error::AppError;
use crate::model::Task;
use time::OffsetDateTime;

/// Persistence collaborator used by the engine.
///
/// Implementations are expected to be cheap to clone when used with
/// [`atomically`], which stages all writes on a copy.
pub trait TaskStore {
    fn load_task(&self, id: &str) -> Result<Option<Task>, AppError>;
    fn save_task(&mut self, task: Task) -> Result<Task, AppError>;
    fn create_task(&mut self, task: Task) -> Result<Task, AppError>;
    fn delete_task(&mut self, id: &str) -> Result<Task, AppError>;
    fn list_tasks(&self) -> Result<Vec<Task>, AppError>;
}

/// Loads a task by a caller-supplied id, rejecting blank and unknown ids.
pub fn require_task<S: TaskStore + ?Sized>(store: &S, id: &str) -> Result<Task, AppError> {
    let trimmed_id = id.trim();
    if trimmed_id.is_empty() {
        return Err(AppError::invalid_input("id is required"));
    }

    store
        .load_task(trimmed_id)?
        .ok_or_else(|| AppError::invalid_input("task not found"))
}

/// `task-<unix nanos>`, bumped until it is free in `store`.
pub fn allocate_id<S: TaskStore + ?Sized>(
    store: &S,
    now: OffsetDateTime,
) -> Result<String, AppError> {
    let mut nanos = now.unix_timestamp_nanos();
    loop {
        let id = format!("task-{nanos}");
        if store.load_task(&id)?.is_none() {
            return Ok(id);
        }
        nanos += 1;
    }
}

/// Runs `f` against a staged copy of `store` and swaps the copy in only when
/// `f` succeeds. On error the store is left exactly as it was.
pub fn atomically<S, T, F>(store: &mut S, f: F) -> Result<T, AppError>
where
    S: TaskStore + Clone,
    F: FnOnce(&mut S) -> Result<T, AppError>,
{
    let mut staged = store.clone();
    let outcome = f(&mut staged)?;
    *store = staged;
    Ok(outcome)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskState {
    pub tasks: Vec<Task>,
}

impl TaskState {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }
}

impl TaskStore for TaskState {
    fn load_task(&self, id: &str) -> Result<Option<Task>, AppError> {
        Ok(self.tasks.iter().find(|task| task.id == id).cloned())
    }

    fn save_task(&mut self, task: Task) -> Result<Task, AppError> {
        let slot = self
            .tasks
            .iter_mut()
            .find(|existing| existing.id == task.id)
            .ok_or_else(|| AppError::invalid_input("task not found"))?;
        *slot = task.clone();
        Ok(task)
    }

    fn create_task(&mut self, task: Task) -> Result<Task, AppError> {
        if self.tasks.iter().any(|existing| existing.id == task.id) {
            return Err(AppError::invalid_input(format!(
                "task {} already exists",
                task.id
            )));
        }
        self.tasks.push(task.clone());
        Ok(task)
    }

    fn delete_task(&mut self, id: &str) -> Result<Task, AppError> {
        let index = self
            .tasks
            .iter()
            .position(|task| task.id == id)
            .ok_or_else(|| AppError::invalid_input("task not found"))?;
        Ok(self.tasks.remove(index))
    }

    fn list_tasks(&self) -> Result<Vec<Task>, AppError> {
        Ok(self.tasks.clone())
    }
}
