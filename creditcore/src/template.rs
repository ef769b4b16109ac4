//! Reusable task and subscription templates.

use serde::{Deserialize, Serialize};

use crate::errors::{CreditError, CreditResult};
use crate::task::{Milestone, ProgressMode, Task, TaskOrigin, TaskStatus};
use crate::types::{
    Actor, AdminId, AutoCompletionCap, ClientId, Credits, TaskId, TemplateId, Timestamp,
};

/// Longest subscription window a template may offer.
pub const MAX_DURATION_DAYS: u32 = 3_650;

/// What buying a template produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TemplateKind {
    /// A one-off task, finalised by an administrator after purchase.
    Task,
    /// A subscription that starts immediately and runs for `duration_days`.
    Subscription,
}

/// A reusable template clients can buy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTemplate {
    /// Template identifier
    pub id: TemplateId,
    /// What a purchase produces
    pub kind: TemplateKind,
    /// Title copied into purchased tasks
    pub title: String,
    /// Description copied into purchased tasks
    pub description: String,
    /// Base price
    pub credit_cost: Credits,
    /// Optional override price
    pub offer_price: Option<Credits>,
    /// Progress mode of purchased tasks
    pub progress_mode: ProgressMode,
    /// Target quantity of purchased tasks
    pub progress_target: u64,
    /// AUTO cap of purchased tasks
    pub auto_completion_cap: AutoCompletionCap,
    /// Milestones copied into purchased tasks
    pub milestones: Vec<Milestone>,
    /// Length of the work window in days
    pub duration_days: u32,
    /// Author of the template
    pub created_by: Option<AdminId>,
    /// Whether clients may buy it
    pub active: bool,
    /// Creation time
    pub created_at: Timestamp,
}

impl TaskTemplate {
    /// Checks the fields a purchase relies on.
    pub fn validate(&self) -> CreditResult<()> {
        if self.title.trim().is_empty() {
            return Err(CreditError::ValidationFailed(
                "template title cannot be empty".to_string(),
            ));
        }
        if self.created_by.is_none() {
            return Err(CreditError::ValidationFailed(
                "template must record its author".to_string(),
            ));
        }
        if self.progress_mode == ProgressMode::Manual && self.progress_target == 0 {
            return Err(CreditError::ValidationFailed(
                "MANUAL progress requires a positive target".to_string(),
            ));
        }
        if self.kind == TemplateKind::Subscription && self.duration_days == 0 {
            return Err(CreditError::ValidationFailed(
                "a subscription must last at least one day".to_string(),
            ));
        }
        if self.duration_days > MAX_DURATION_DAYS {
            return Err(CreditError::ValidationFailed(format!(
                "a template cannot run longer than {MAX_DURATION_DAYS} days, got {}",
                self.duration_days
            )));
        }
        Ok(())
    }

    /// Builds the client-bound task a purchase creates.
    ///
    /// Task templates produce a `PENDING_APPROVAL` task without dates;
    /// subscriptions produce an `ACTIVE` task starting at `now`. Fails with
    /// `ValidationFailed` when the window ends past the representable range.
    pub fn instantiate(
        &self,
        client_id: ClientId,
        charge: Credits,
        now: Timestamp,
    ) -> CreditResult<Task> {
        let (status, start_date, end_date, origin) = match self.kind {
            TemplateKind::Task => (
                TaskStatus::PendingApproval,
                None,
                None,
                TaskOrigin::TemplatePurchase {
                    template_id: self.id,
                },
            ),
            TemplateKind::Subscription => (
                TaskStatus::Active,
                Some(now),
                Some(
                    now.checked_plus_days(i64::from(self.duration_days))
                        .ok_or_else(|| {
                            CreditError::ValidationFailed(format!(
                                "a {}-day window starting {now} cannot be represented",
                                self.duration_days
                            ))
                        })?,
                ),
                TaskOrigin::SubscriptionPurchase {
                    template_id: self.id,
                },
            ),
        };

        Ok(Task {
            id: TaskId::new(),
            title: self.title.clone(),
            description: self.description.clone(),
            priority: crate::task::Priority::default(),
            is_listing: false,
            client_id: Some(client_id.clone()),
            status,
            credit_cost: self.credit_cost,
            offer_price: self.offer_price,
            credits_used: charge,
            progress_mode: self.progress_mode,
            progress_target: self.progress_target,
            progress_achieved: 0,
            auto_completion_cap: self.auto_completion_cap,
            start_date,
            end_date,
            milestones: self.milestones.iter().map(Milestone::reset).collect(),
            progress: 0.0,
            progress_color: String::new(),
            origin,
            created_by: Actor::Client(client_id),
            created_at: now,
            updated_at: now,
            completed_at: None,
            cancelled_at: None,
            cancellation_reason: None,
        })
    }
}
