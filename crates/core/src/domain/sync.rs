use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncTaskId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    /// Input: variant id.
    ProjectVariant,
    /// Input: product id; fans out one `ProjectVariant` per variant.
    ProjectCollection,
    /// Input: variant id.
    ComputeRelated,
}

impl TaskKind {
    pub const ALL: [TaskKind; 3] =
        [TaskKind::ProjectVariant, TaskKind::ProjectCollection, TaskKind::ComputeRelated];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProjectVariant => "project-variant",
            Self::ProjectCollection => "project-collection",
            Self::ComputeRelated => "compute-related",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "project-variant" => Some(Self::ProjectVariant),
            "project-collection" => Some(Self::ProjectCollection),
            "compute-related" => Some(Self::ComputeRelated),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTaskState {
    Queued,
    Running,
    RetryableFailed,
    FailedTerminal,
    Completed,
}

impl SyncTaskState {
    pub const ALL: [SyncTaskState; 5] = [
        SyncTaskState::Queued,
        SyncTaskState::Running,
        SyncTaskState::RetryableFailed,
        SyncTaskState::FailedTerminal,
        SyncTaskState::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::RetryableFailed => "retryable_failed",
            Self::FailedTerminal => "failed_terminal",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "retryable_failed" => Some(Self::RetryableFailed),
            "failed_terminal" => Some(Self::FailedTerminal),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::FailedTerminal)
    }
}

/// What a completed task actually did.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Projected,
    /// Source unpublished; an existing flat row (if any) was marked hidden.
    Retired,
    Ranked,
    FannedOut,
}

impl TaskOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Projected => "projected",
            Self::Retired => "retired",
            Self::Ranked => "ranked",
            Self::FannedOut => "fanned_out",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "projected" => Some(Self::Projected),
            "retired" => Some(Self::Retired),
            "ranked" => Some(Self::Ranked),
            "fanned_out" => Some(Self::FannedOut),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTask {
    pub id: SyncTaskId,
    pub kind: TaskKind,
    pub input_id: String,
    pub state: SyncTaskState,
    pub attempt_count: u32,
    pub max_retries: u32,
    pub available_at: DateTime<Utc>,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub error_class: Option<String>,
    pub outcome: Option<TaskOutcome>,
    pub result_fingerprint: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub correlation_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
