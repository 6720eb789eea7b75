//! Deterministic Sync Task Engine
//!
//! State machine for projection and ranking work items. Every transition is
//! a pure function from the previous task value, so the same rules apply to
//! the SQL queue, the in-memory queue and tests.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::sync::{SyncTask, SyncTaskId, SyncTaskState, TaskKind, TaskOutcome};

/// Upper bound on a single retry delay, whatever the configured backoff.
pub const MAX_RETRY_DELAY_SECONDS: i64 = 86_400;

/// Error class recorded when a worker stopped reporting on a claimed task.
pub const CLAIM_EXPIRED_CLASS: &str = "claim_expired";

/// Configuration for the sync engine
#[derive(Clone, Debug)]
pub struct SyncEngineConfig {
    /// How long before a claimed task is considered stale
    pub claim_timeout_seconds: i64,
    /// Retries granted after the first failed attempt
    pub default_max_retries: u32,
    /// Backoff multiplier for retries
    pub retry_backoff_multiplier: u32,
    /// Base delay in seconds between retries
    pub retry_base_delay_seconds: i64,
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self {
            claim_timeout_seconds: 300,
            default_max_retries: 2,
            retry_backoff_multiplier: 2,
            retry_base_delay_seconds: 5,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("invalid state transition from {from:?} to {to:?}: {reason}")]
    InvalidTransition { from: SyncTaskState, to: SyncTaskState, reason: String },
    #[error("claim conflict: task {0:?} already claimed by {1}")]
    ClaimConflict(SyncTaskId, String),
    #[error("task not yet available: {0:?}")]
    TaskNotYetAvailable(SyncTaskId),
    #[error("task {0:?} exhausted its retry budget on expired claims")]
    ClaimBudgetExhausted(SyncTaskId),
}

/// How a job's result maps onto the queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobDisposition {
    Succeed,
    FailTerminal,
    Retry,
}

/// Policy for handling failures
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Retry with exponential backoff
    Retry,
    /// Mark as failed terminal, no more retries
    FailTerminal,
}

#[derive(Clone, Debug, Default)]
pub struct SyncEngine {
    config: SyncEngineConfig,
}

impl SyncEngine {
    pub fn new() -> Self {
        Self::with_config(SyncEngineConfig::default())
    }

    pub fn with_config(config: SyncEngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SyncEngineConfig {
        &self.config
    }

    /// Build a fresh queued task. Nothing is persisted here.
    pub fn create_task(
        &self,
        kind: TaskKind,
        input_id: impl Into<String>,
        correlation_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> SyncTask {
        SyncTask {
            id: SyncTaskId(Uuid::new_v4().to_string()),
            kind,
            input_id: input_id.into(),
            state: SyncTaskState::Queued,
            attempt_count: 0,
            max_retries: self.config.default_max_retries,
            available_at: now,
            claimed_by: None,
            claimed_at: None,
            last_error: None,
            error_class: None,
            outcome: None,
            result_fingerprint: None,
            completed_at: None,
            correlation_id: correlation_id.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Queued | RetryableFailed | stale Running -> Running.
    ///
    /// Taking over a stale claim spends one retry, since the previous attempt
    /// never reported back. Once the budget is spent the claim is refused
    /// with `ClaimBudgetExhausted` and the task should go to
    /// [`SyncEngine::expire_claim`].
    pub fn claim_task(
        &self,
        mut task: SyncTask,
        worker_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<SyncTask, SyncError> {
        match task.state {
            SyncTaskState::Queued | SyncTaskState::RetryableFailed => {}
            SyncTaskState::Running => {
                if !self.is_stale(&task, now) {
                    return Err(SyncError::ClaimConflict(
                        task.id.clone(),
                        task.claimed_by.clone().unwrap_or_default(),
                    ));
                }
                if task.attempt_count >= task.max_retries {
                    return Err(SyncError::ClaimBudgetExhausted(task.id.clone()));
                }
                task.attempt_count += 1;
                task.last_error = Some(format!(
                    "claim by {} expired",
                    task.claimed_by.as_deref().unwrap_or("unknown worker")
                ));
                task.error_class = Some(CLAIM_EXPIRED_CLASS.to_string());
            }
            SyncTaskState::Completed | SyncTaskState::FailedTerminal => {
                return Err(SyncError::InvalidTransition {
                    from: task.state,
                    to: SyncTaskState::Running,
                    reason: "task already in terminal state".to_string(),
                });
            }
        }

        if now < task.available_at {
            return Err(SyncError::TaskNotYetAvailable(task.id.clone()));
        }

        task.state = SyncTaskState::Running;
        task.claimed_by = Some(worker_id.into());
        task.claimed_at = Some(now);
        task.updated_at = now;
        Ok(task)
    }

    /// Running -> Completed.
    pub fn complete_task(
        &self,
        mut task: SyncTask,
        outcome: TaskOutcome,
        result_fingerprint: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<SyncTask, SyncError> {
        self.validate_transition(&task, SyncTaskState::Completed)?;

        task.state = SyncTaskState::Completed;
        task.outcome = Some(outcome);
        task.result_fingerprint = result_fingerprint;
        task.completed_at = Some(now);
        task.updated_at = now;
        task.claimed_by = None;
        task.claimed_at = None;
        Ok(task)
    }

    /// Running -> RetryableFailed while retry budget remains, otherwise
    /// Running -> FailedTerminal.
    pub fn fail_task(
        &self,
        mut task: SyncTask,
        error: impl Into<String>,
        error_class: impl Into<String>,
        retry_policy: RetryPolicy,
        now: DateTime<Utc>,
    ) -> Result<SyncTask, SyncError> {
        self.validate_transition(&task, SyncTaskState::RetryableFailed)?;

        let should_retry =
            retry_policy == RetryPolicy::Retry && task.attempt_count < task.max_retries;

        task.last_error = Some(error.into());
        task.error_class = Some(error_class.into());
        task.updated_at = now;
        task.claimed_by = None;
        task.claimed_at = None;

        if should_retry {
            task.state = SyncTaskState::RetryableFailed;
            task.available_at = now + self.retry_delay(task.attempt_count);
            task.attempt_count += 1;
        } else {
            task.state = SyncTaskState::FailedTerminal;
            task.completed_at = Some(now);
        }

        Ok(task)
    }

    /// Stale Running -> FailedTerminal for a task whose expired claims used up
    /// the retry budget.
    pub fn expire_claim(
        &self,
        mut task: SyncTask,
        now: DateTime<Utc>,
    ) -> Result<SyncTask, SyncError> {
        if !self.is_stale(&task, now) {
            return Err(SyncError::InvalidTransition {
                from: task.state,
                to: SyncTaskState::FailedTerminal,
                reason: "only stale claims can expire".to_string(),
            });
        }

        task.state = SyncTaskState::FailedTerminal;
        task.last_error = Some(format!(
            "claim by {} expired with no retries left",
            task.claimed_by.as_deref().unwrap_or("unknown worker")
        ));
        task.error_class = Some(CLAIM_EXPIRED_CLASS.to_string());
        task.claimed_by = None;
        task.claimed_at = None;
        task.completed_at = Some(now);
        task.updated_at = now;
        Ok(task)
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = i64::from(self.config.retry_backoff_multiplier)
            .checked_pow(attempt)
            .unwrap_or(i64::MAX);
        let seconds = self
            .config
            .retry_base_delay_seconds
            .max(0)
            .saturating_mul(factor)
            .min(MAX_RETRY_DELAY_SECONDS);
        Duration::seconds(seconds)
    }

    /// Claims taken before this instant have outlived the claim timeout.
    pub fn stale_before(&self, reference_time: DateTime<Utc>) -> DateTime<Utc> {
        reference_time - Duration::seconds(self.config.claim_timeout_seconds)
    }

    fn is_stale(&self, task: &SyncTask, reference_time: DateTime<Utc>) -> bool {
        let threshold = self.stale_before(reference_time);
        task.state == SyncTaskState::Running
            && task.claimed_at.is_some_and(|claimed_at| claimed_at < threshold)
    }

    fn validate_transition(&self, task: &SyncTask, to: SyncTaskState) -> Result<(), SyncError> {
        let valid = matches!(
            (task.state, to),
            (SyncTaskState::Running, SyncTaskState::Completed)
                | (SyncTaskState::Running, SyncTaskState::RetryableFailed)
                | (SyncTaskState::Running, SyncTaskState::FailedTerminal)
        );

        if valid {
            Ok(())
        } else {
            Err(SyncError::InvalidTransition {
                from: task.state,
                to,
                reason: format!("cannot transition from {:?} to {:?}", task.state, to),
            })
        }
    }
}
