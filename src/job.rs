use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::Hook;
use crate::utils::project_name;
use crate::webhook::{ClassifiedEvent, EventKind};

/// Number of commit characters handed to scripts for branch pushes
pub const SHORT_COMMIT_LEN: usize = 6;

/// A matched event ready to run. Consumed by a single script run.
#[derive(Debug, Clone)]
pub struct Job {
    /// Correlation id, only used to tie log lines together
    pub id: Uuid,
    pub repository: String,
    pub project: String,
    pub branch: String,
    pub kind: EventKind,
    pub value: String,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Create a job for an event classified against `hook`.
    pub fn new(repository: &str, hook: &Hook, event: ClassifiedEvent) -> Self {
        Self {
            id: Uuid::now_v7(),
            repository: repository.to_string(),
            project: project_name(&hook.repo).to_string(),
            branch: hook.branch.clone(),
            kind: event.kind,
            value: event.value,
            created_at: Utc::now(),
        }
    }

    /// The value handed to the script: short commit for pushes, full tag name otherwise.
    pub fn script_value(&self) -> String {
        match self.kind {
            EventKind::BranchPush => self.value.chars().take(SHORT_COMMIT_LEN).collect(),
            _ => self.value.clone(),
        }
    }

    /// Script arguments: repository, project, branch, kind, value.
    pub fn script_args(&self) -> [String; 5] {
        [
            self.repository.clone(),
            self.project.clone(),
            self.branch.clone(),
            self.kind.as_arg().to_string(),
            self.script_value(),
        ]
    }
}
