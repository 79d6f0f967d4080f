use crate::error::AppError;
use crate::model::Task;
use crate::storage::TaskState;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, warn};

pub const SCHEMA_VERSION: u32 = 3;
const STORE_FILE_NAME: &str = "tasks.json";
const STORE_ENV_VAR: &str = "CADENCE_STORE_PATH";
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(2000);
const STALE_LOCK_AGE: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize, Deserialize)]
struct StoredTasks {
    schema_version: u32,
    tasks: Vec<Task>,
}

pub fn store_path() -> Result<PathBuf, AppError> {
    if let Ok(path) = std::env::var(STORE_ENV_VAR)
        && !path.trim().is_empty()
    {
        return Ok(PathBuf::from(path));
    }

    Ok(app_dir()?.join(STORE_FILE_NAME))
}

/// Per-user application directory (`~/.config/cadence`, `%APPDATA%\cadence`).
pub fn app_dir() -> Result<PathBuf, AppError> {
    if cfg!(windows) {
        let appdata =
            std::env::var("APPDATA").map_err(|_| AppError::invalid_data("APPDATA is not set"))?;
        Ok(PathBuf::from(appdata).join("cadence"))
    } else {
        let home = std::env::var("HOME").map_err(|_| AppError::invalid_data("HOME is not set"))?;
        Ok(PathBuf::from(home).join(".config").join("cadence"))
    }
}

pub fn load_tasks(path: &Path) -> Result<Vec<Task>, AppError> {
    Ok(load_state(path)?.tasks)
}

pub fn load_state(path: &Path) -> Result<TaskState, AppError> {
    if !path.exists() {
        return Ok(TaskState::default());
    }

    let content = std::fs::read_to_string(path)?;
    let stored: StoredTasks =
        serde_json::from_str(&content).map_err(|err| AppError::invalid_data(err.to_string()))?;

    if !(1..=SCHEMA_VERSION).contains(&stored.schema_version) {
        return Err(AppError::invalid_data("schema_version mismatch"));
    }

    let mut seen = HashSet::new();
    for task in &stored.tasks {
        if !seen.insert(task.id.as_str()) {
            return Err(AppError::invalid_data(format!("duplicate task id {}", task.id)));
        }
        if let Some(rule) = task.recurrence.as_ref() {
            rule.validate().map_err(|err| {
                AppError::invalid_data(format!("task {}: {}", task.id, err.message()))
            })?;
        }
    }

    Ok(TaskState::new(stored.tasks))
}

pub fn save_tasks(path: &Path, tasks: &[Task]) -> Result<(), AppError> {
    save_state(path, &TaskState::new(tasks.to_vec()))
}

/// Writes the whole store to a sibling temp file and renames it into place,
/// so readers only ever observe a complete file.
pub fn save_state(path: &Path, state: &TaskState) -> Result<(), AppError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let stored = StoredTasks {
        schema_version: SCHEMA_VERSION,
        tasks: state.tasks.to_vec(),
    };
    let content = serde_json::to_string_pretty(&stored)
        .map_err(|err| AppError::invalid_data(err.to_string()))?;

    let temp_path = sibling_path(path, "tmp");
    std::fs::write(&temp_path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&temp_path, permissions)?;
    }

    std::fs::rename(&temp_path, path)?;
    Ok(())
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| STORE_FILE_NAME.to_string());
    path.with_file_name(format!("{file_name}.{suffix}"))
}

/// File-backed task store with a single-writer lock.
#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
    lock_timeout: Duration,
}

impl JsonStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn from_env() -> Result<Self, AppError> {
        Ok(Self::new(store_path()?))
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lock-free snapshot read.
    pub fn read(&self) -> Result<TaskState, AppError> {
        load_state(&self.path)
    }

    /// Re-reads the store under the write lock, runs `f`, and persists the
    /// result only if `f` succeeds.
    pub fn transaction<T, F>(&self, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&mut TaskState) -> Result<T, AppError>,
    {
        let _guard = self.acquire_write_guard()?;
        let mut state = load_state(&self.path)?;
        let outcome = f(&mut state)?;
        save_state(&self.path, &state)?;
        debug!(path = %self.path.display(), tasks = state.tasks.len(), "store committed");
        Ok(outcome)
    }

    fn lock_path(&self) -> PathBuf {
        sibling_path(&self.path, "lock")
    }

    fn acquire_write_guard(&self) -> Result<StoreLockGuard, AppError> {
        let lock_path = self.lock_path();
        if let Some(parent) = lock_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let started = Instant::now();
        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(mut file) => {
                    let guard = StoreLockGuard { path: lock_path };
                    write!(file, "{}", std::process::id()).map_err(|err| {
                        AppError::persistence(format!(
                            "failed to write store lock {}: {err}",
                            guard.path.display()
                        ))
                    })?;
                    return Ok(guard);
                }
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    evict_stale_lock(&lock_path);
                    if started.elapsed() > self.lock_timeout {
                        return Err(AppError::persistence(format!(
                            "timed out waiting for store lock {}",
                            lock_path.display()
                        )));
                    }
                    std::thread::sleep(Duration::from_millis(2));
                }
                Err(err) => {
                    return Err(AppError::persistence(format!(
                        "failed to create store lock {}: {err}",
                        lock_path.display()
                    )));
                }
            }
        }
    }
}

fn evict_stale_lock(lock_path: &Path) {
    let age = std::fs::metadata(lock_path)
        .and_then(|metadata| metadata.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok());

    if let Some(age) = age
        && age > STALE_LOCK_AGE
    {
        warn!(path = %lock_path.display(), "evicting stale store lock");
        let _ = std::fs::remove_file(lock_path);
    }
}

struct StoreLockGuard {
    path: PathBuf,
}

impl Drop for StoreLockGuard {
    fn drop(&mut self) {
        if std::fs::remove_file(&self.path).is_err() {
            debug!(path = %self.path.display(), "store lock already removed");
        }
    }
}
