use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    #[error("invalid_input - {0}")]
    InvalidInput(String),
    #[error("invalid_data - {0}")]
    InvalidData(String),
    #[error("invalid_rule - {0}")]
    InvalidRule(String),
    /// An instance whose parent does not resolve to a template. Callers can
    /// keep showing the instance, just without recurrence controls.
    #[error("ambiguous_parent - task {task_id} references missing template {parent_id}")]
    AmbiguousParent { task_id: String, parent_id: String },
    #[error("persistence_failure - {0}")]
    Persistence(String),
}

impl AppError {
    pub fn invalid_input<M: Into<String>>(message: M) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn invalid_data<M: Into<String>>(message: M) -> Self {
        Self::InvalidData(message.into())
    }

    pub fn invalid_rule<M: Into<String>>(message: M) -> Self {
        Self::InvalidRule(message.into())
    }

    pub fn ambiguous_parent<T: Into<String>, P: Into<String>>(task_id: T, parent_id: P) -> Self {
        Self::AmbiguousParent {
            task_id: task_id.into(),
            parent_id: parent_id.into(),
        }
    }

    pub fn persistence<M: Into<String>>(message: M) -> Self {
        Self::Persistence(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::InvalidData(_) => "invalid_data",
            Self::InvalidRule(_) => "invalid_rule",
            Self::AmbiguousParent { .. } => "ambiguous_parent",
            Self::Persistence(_) => "persistence_failure",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::InvalidInput(message)
            | Self::InvalidData(message)
            | Self::InvalidRule(message)
            | Self::Persistence(message) => message.clone(),
            Self::AmbiguousParent { task_id, parent_id } => {
                format!("task {task_id} references missing template {parent_id}")
            }
        }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::AmbiguousParent { .. })
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}
