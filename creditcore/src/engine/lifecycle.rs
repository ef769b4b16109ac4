//! Approval, status transitions, edits and progress updates.
//!
//! Every status change is checked against [`TaskStatus::ensure_transition`].
//! Each write holds the task's lock from the read it is based on, so a stale
//! copy never overwrites a newer status.

use tracing::{info, instrument};

use super::CreditEngine;
use crate::errors::{CreditError, CreditResult};
use crate::notification::{Notification, NotificationKind, RelatedEntity};
use crate::store::CreditStore;
use crate::task::{ApprovalDecision, Milestone, ProgressMode, Task, TaskStatus, TaskUpdate};
use crate::types::{AdminId, TaskId};

impl<S> CreditEngine<S>
where
    S: CreditStore,
{
    /// Finalises a purchased task and activates it.
    ///
    /// Progress restarts from zero and is recomputed from the approved dates.
    #[instrument(name = "approve_task", skip(self, decision), fields(admin = %admin, task = %task_id))]
    pub async fn approve_task(
        &self,
        admin: &AdminId,
        task_id: TaskId,
        decision: ApprovalDecision,
    ) -> CreditResult<Task> {
        let _guard = self.task_locks.acquire(task_id).await;
        let task = self.task(task_id).await?;
        task.status.ensure_transition(TaskStatus::Active)?;
        if task.status != TaskStatus::PendingApproval {
            return Err(CreditError::NotEligible(format!(
                "task '{task_id}' is {} and does not need approval",
                task.status
            )));
        }
        if decision.title.trim().is_empty() {
            return Err(CreditError::ValidationFailed(
                "title cannot be empty".to_string(),
            ));
        }

        let now = self.now();
        let mut approved = Task {
            title: decision.title,
            priority: decision.priority,
            start_date: Some(decision.start_date),
            end_date: Some(decision.end_date),
            status: TaskStatus::Active,
            progress: 0.0,
            progress_achieved: 0,
            milestones: task.milestones.iter().map(Milestone::reset).collect(),
            updated_at: now,
            ..task
        };
        approved
            .check_shape()
            .map_err(CreditError::ValidationFailed)?;
        self.apply_progress(&mut approved, now);

        let stored = self.store.update_task(approved).await?;
        info!(progress = stored.progress, "task approved");
        self.notify_task(
            &stored,
            NotificationKind::TaskApproved,
            "Your task was approved and scheduled",
        );
        Ok(stored)
    }

    /// Moves a task to `next` if the transition table allows it.
    ///
    /// `PENDING_APPROVAL` tasks only leave that state through
    /// [`approve_task`](Self::approve_task), which supplies their dates.
    #[instrument(name = "transition_task", skip(self, reason), fields(admin = %admin, task = %task_id, to = %next))]
    pub async fn transition_task(
        &self,
        admin: &AdminId,
        task_id: TaskId,
        next: TaskStatus,
        reason: Option<String>,
    ) -> CreditResult<Task> {
        let _guard = self.task_locks.acquire(task_id).await;
        let task = self.task(task_id).await?;
        task.status.ensure_transition(next)?;
        if task.status == TaskStatus::PendingApproval {
            return Err(CreditError::NotEligible(format!(
                "task '{task_id}' must be approved before it can be {next}"
            )));
        }

        let now = self.now();
        let from = task.status;
        let mut updated = Task {
            status: next,
            updated_at: now,
            ..task
        };
        match next {
            TaskStatus::Completed => updated.completed_at = Some(now),
            TaskStatus::Cancelled => {
                updated.cancelled_at = Some(now);
                updated.cancellation_reason = reason;
            }
            _ => {}
        }
        if !next.is_terminal() {
            self.apply_progress(&mut updated, now);
        }

        let stored = self.store.update_task(updated).await?;
        info!(%from, "task status changed");
        match next {
            TaskStatus::Completed => {
                self.notify_task(
                    &stored,
                    NotificationKind::TaskCompleted,
                    "Your task is complete",
                );
            }
            TaskStatus::Cancelled => {
                self.notify_task(
                    &stored,
                    NotificationKind::TaskCancelled,
                    "Your task was cancelled",
                );
            }
            _ => {}
        }
        Ok(stored)
    }

    /// Completes an active task.
    pub async fn complete_task(&self, admin: &AdminId, task_id: TaskId) -> CreditResult<Task> {
        self.transition_task(admin, task_id, TaskStatus::Completed, None)
            .await
    }

    /// Cancels a pending or active task. Charges are not refunded.
    pub async fn cancel_task(
        &self,
        admin: &AdminId,
        task_id: TaskId,
        reason: impl Into<String>,
    ) -> CreditResult<Task> {
        self.transition_task(admin, task_id, TaskStatus::Cancelled, Some(reason.into()))
            .await
    }

    /// Edits a task or plan. The price of a charged task cannot change.
    #[instrument(name = "update_task", skip(self, update), fields(admin = %admin, task = %task_id))]
    pub async fn update_task(
        &self,
        admin: &AdminId,
        task_id: TaskId,
        update: TaskUpdate,
    ) -> CreditResult<Task> {
        let _guard = self.task_locks.acquire(task_id).await;
        let task = self.task(task_id).await?;
        let now = self.now();
        let mut updated = update.apply_to(&task, now)?;
        self.apply_progress(&mut updated, now);

        let stored = self.store.update_task(updated).await?;
        info!("task updated");
        Ok(stored)
    }

    /// Records the achieved quantity of a MANUAL task and recomputes progress.
    #[instrument(name = "record_progress", skip(self), fields(task = %task_id))]
    pub async fn record_progress(&self, task_id: TaskId, achieved: u64) -> CreditResult<Task> {
        let _guard = self.task_locks.acquire(task_id).await;
        let task = self.task(task_id).await?;
        if task.progress_mode != ProgressMode::Manual {
            return Err(CreditError::ValidationFailed(format!(
                "task '{task_id}' computes progress automatically"
            )));
        }
        Self::ensure_progress_open(&task)?;

        let now = self.now();
        let mut updated = Task {
            progress_achieved: achieved,
            updated_at: now,
            ..task
        };
        self.apply_progress(&mut updated, now);

        let stored = self.store.update_task(updated).await?;
        info!(progress = stored.progress, "progress recorded");
        Ok(stored)
    }

    /// Recomputes and stores the progress of one task as of now.
    pub async fn refresh_progress(&self, task_id: TaskId) -> CreditResult<Task> {
        let _guard = self.task_locks.acquire(task_id).await;
        let task = self.task(task_id).await?;
        Self::ensure_progress_open(&task)?;

        let mut updated = task;
        self.apply_progress(&mut updated, self.now());
        self.store.update_task(updated).await.map_err(CreditError::from)
    }

    /// Recomputes progress for every active task whose cached values are stale.
    ///
    /// Returns the number of tasks written.
    #[instrument(name = "refresh_active_progress", skip(self))]
    pub async fn refresh_active_progress(&self) -> CreditResult<usize> {
        let now = self.now();
        let mut written = 0;
        for listed in self.store.list_tasks().await? {
            if listed.status != TaskStatus::Active {
                continue;
            }
            let _guard = self.task_locks.acquire(listed.id).await;
            let task = self.task(listed.id).await?;
            if task.status != TaskStatus::Active {
                continue;
            }
            let mut updated = task.clone();
            self.apply_progress(&mut updated, now);
            if updated != task {
                self.store.update_task(updated).await?;
                written += 1;
            }
        }
        info!(written, "active progress refreshed");
        Ok(written)
    }

    fn ensure_progress_open(task: &Task) -> CreditResult<()> {
        if task.is_listing || task.status.is_terminal() {
            return Err(CreditError::NotEligible(format!(
                "task '{}' is {} and its progress is frozen",
                task.id, task.status
            )));
        }
        Ok(())
    }

    fn notify_task(&self, task: &Task, kind: NotificationKind, message: &str) {
        if let Some(recipient_id) = task.client_id.clone() {
            self.notify(Notification {
                recipient_id,
                kind,
                title: task.title.clone(),
                message: message.to_string(),
                related_entity: Some(RelatedEntity::Task(task.id)),
            });
        }
    }
}
