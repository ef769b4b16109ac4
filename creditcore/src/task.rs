//! Tasks and marketplace plans.
//!
//! A [`Task`] record is either a reusable marketplace listing (a *plan*,
//! `is_listing = true`) or a unit of work bound to exactly one client. The two
//! shapes are mutually exclusive: a plan never carries a client or dates, a
//! client-bound task always carries a client and, once past approval, a start
//! and end date.
//!
//! Status changes go through one transition table, [`TaskStatus::can_transition_to`].

use serde::{Deserialize, Serialize};

use crate::errors::{CreditError, CreditResult};
use crate::ledger::LedgerEntryKind;
use crate::types::{
    Actor, AdminId, AutoCompletionCap, ClientId, Credits, MilestoneThreshold, TaskId, TemplateId,
    Timestamp,
};

/// Lifecycle state of a task or plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Purchased by a client, waiting for an administrator to finalise it.
    PendingApproval,
    /// Assigned, scheduled to start later.
    Pending,
    /// In progress.
    Active,
    /// Finished. Terminal.
    Completed,
    /// Cancelled by an administrator. Terminal.
    Cancelled,
    /// A marketplace plan. Never transitions.
    Listed,
}

impl TaskStatus {
    /// Every defined status.
    pub const ALL: [Self; 6] = [
        Self::PendingApproval,
        Self::Pending,
        Self::Active,
        Self::Completed,
        Self::Cancelled,
        Self::Listed,
    ];

    /// Statuses reachable in one step from `self`.
    pub const fn allowed_transitions(self) -> &'static [Self] {
        match self {
            Self::PendingApproval => &[Self::Active],
            Self::Pending => &[Self::Active, Self::Cancelled],
            Self::Active => &[Self::Completed, Self::Cancelled],
            Self::Completed | Self::Cancelled | Self::Listed => &[],
        }
    }

    /// Returns true if the table allows `self -> next`.
    pub fn can_transition_to(self, next: Self) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Fails with [`CreditError::InvalidTransition`] unless the table allows `self -> next`.
    pub fn ensure_transition(self, next: Self) -> CreditResult<()> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(CreditError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    /// Returns true for statuses with no outbound transitions.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Returns true if a client-bound task in this status must carry dates.
    pub const fn requires_schedule(self) -> bool {
        matches!(
            self,
            Self::Pending | Self::Active | Self::Completed | Self::Cancelled
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::PendingApproval => "PENDING_APPROVAL",
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::Listed => "LISTED",
        };
        f.write_str(name)
    }
}

/// How progress is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressMode {
    /// Interpolated from elapsed time between start and end date.
    #[default]
    Auto,
    /// Ratio of achieved to target quantity, uncapped.
    Manual,
}

/// Scheduling priority chosen by an administrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Low priority.
    Low,
    /// Default priority.
    #[default]
    Medium,
    /// High priority.
    High,
    /// Urgent.
    Urgent,
}

/// A named progress threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    /// Display name
    pub name: String,
    /// Percentage at which the milestone is reached
    pub threshold_percent: MilestoneThreshold,
    /// Display color used while this is the highest reached milestone
    pub color: String,
    /// Whether progress currently meets the threshold
    pub reached: bool,
    /// When progress last crossed the threshold upward
    pub reached_at: Option<Timestamp>,
}

impl Milestone {
    /// An unreached milestone.
    pub fn new(name: impl Into<String>, threshold: MilestoneThreshold, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            threshold_percent: threshold,
            color: color.into(),
            reached: false,
            reached_at: None,
        }
    }

    /// Threshold as a plain percentage.
    pub fn threshold(&self) -> f64 {
        self.threshold_percent.into_inner()
    }

    /// Copy with reached state cleared, used when cloning templates and plans.
    #[must_use]
    pub fn reset(&self) -> Self {
        Self {
            reached: false,
            reached_at: None,
            ..self.clone()
        }
    }
}

/// How a task record came to exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TaskOrigin {
    /// A marketplace plan published by an administrator.
    Listing,
    /// Assigned to a client by an administrator.
    AdminAssignment {
        /// Assigning administrator
        admin: AdminId,
    },
    /// Bought from a task template.
    TemplatePurchase {
        /// Source template
        template_id: TemplateId,
    },
    /// Bought from a marketplace plan.
    PlanPurchase {
        /// Source plan
        plan_id: TaskId,
    },
    /// Bought from a subscription template.
    SubscriptionPurchase {
        /// Source template
        template_id: TemplateId,
    },
}

impl TaskOrigin {
    /// Ledger kind written when a task of this origin is charged.
    pub const fn charge_kind(&self) -> Option<LedgerEntryKind> {
        match self {
            Self::Listing => None,
            Self::AdminAssignment { .. } => Some(LedgerEntryKind::TaskAssigned),
            Self::TemplatePurchase { .. } => Some(LedgerEntryKind::TaskPurchase),
            Self::PlanPurchase { .. } => Some(LedgerEntryKind::PlanPurchase),
            Self::SubscriptionPurchase { .. } => Some(LedgerEntryKind::SubscriptionPurchase),
        }
    }
}

/// Price actually charged: the offer price when set and positive, else the base cost.
pub fn resolve_effective_charge(credit_cost: Credits, offer_price: Option<Credits>) -> Credits {
    match offer_price {
        Some(offer) if !offer.is_zero() => offer,
        _ => credit_cost,
    }
}

/// A plan or a client-bound task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Task identifier
    pub id: TaskId,
    /// Title
    pub title: String,
    /// Free-text description
    pub description: String,
    /// Priority
    pub priority: Priority,
    /// True for marketplace plans
    pub is_listing: bool,
    /// Owning client; `None` exactly for plans
    pub client_id: Option<ClientId>,
    /// Lifecycle state
    pub status: TaskStatus,
    /// Base price
    pub credit_cost: Credits,
    /// Optional override price
    pub offer_price: Option<Credits>,
    /// Amount actually deducted when the task was created
    pub credits_used: Credits,
    /// How progress is computed
    pub progress_mode: ProgressMode,
    /// Target quantity (MANUAL), descriptive in AUTO
    pub progress_target: u64,
    /// Achieved quantity (MANUAL), descriptive in AUTO
    pub progress_achieved: u64,
    /// Upper bound for AUTO progress
    pub auto_completion_cap: AutoCompletionCap,
    /// Start of the work window
    pub start_date: Option<Timestamp>,
    /// End of the work window
    pub end_date: Option<Timestamp>,
    /// Ordered milestones
    pub milestones: Vec<Milestone>,
    /// Cached progress percentage
    pub progress: f64,
    /// Cached display color
    pub progress_color: String,
    /// How the record was created
    pub origin: TaskOrigin,
    /// Who created the record
    pub created_by: Actor,
    /// Creation time
    pub created_at: Timestamp,
    /// Last modification time
    pub updated_at: Timestamp,
    /// When the task was completed
    pub completed_at: Option<Timestamp>,
    /// When the task was cancelled
    pub cancelled_at: Option<Timestamp>,
    /// Reason given on cancellation
    pub cancellation_reason: Option<String>,
}

impl Task {
    /// Effective charge for this record.
    pub fn effective_charge(&self) -> Credits {
        resolve_effective_charge(self.credit_cost, self.offer_price)
    }

    /// Returns true for tasks owned by a client.
    pub const fn is_client_bound(&self) -> bool {
        !self.is_listing
    }

    /// Checks the plan/task shape rules against the current fields.
    pub fn check_shape(&self) -> Result<(), String> {
        check_shape(&ShapeView {
            is_listing: self.is_listing,
            has_client: self.client_id.is_some(),
            status: self.status,
            start_date: self.start_date,
            end_date: self.end_date,
        })
    }

    /// Clones a plan into a fresh task for `client_id`.
    ///
    /// Dates are left empty; they are supplied when the purchase is approved.
    pub fn clone_plan_for_client(
        &self,
        client_id: ClientId,
        charge: Credits,
        now: Timestamp,
    ) -> Self {
        Self {
            id: TaskId::new(),
            is_listing: false,
            client_id: Some(client_id.clone()),
            status: TaskStatus::PendingApproval,
            credits_used: charge,
            progress_achieved: 0,
            start_date: None,
            end_date: None,
            milestones: self.milestones.iter().map(Milestone::reset).collect(),
            progress: 0.0,
            progress_color: String::new(),
            origin: TaskOrigin::PlanPurchase { plan_id: self.id },
            created_by: Actor::Client(client_id),
            created_at: now,
            updated_at: now,
            completed_at: None,
            cancelled_at: None,
            cancellation_reason: None,
            ..self.clone()
        }
    }
}

struct ShapeView {
    is_listing: bool,
    has_client: bool,
    status: TaskStatus,
    start_date: Option<Timestamp>,
    end_date: Option<Timestamp>,
}

fn check_shape(view: &ShapeView) -> Result<(), String> {
    if view.is_listing {
        if view.has_client {
            return Err("a plan cannot carry a client reference".to_string());
        }
        if view.start_date.is_some() || view.end_date.is_some() {
            return Err("a plan cannot carry a start or end date".to_string());
        }
        if view.status != TaskStatus::Listed {
            return Err(format!("a plan must be LISTED, found {}", view.status));
        }
        return Ok(());
    }

    if !view.has_client {
        return Err("a task must carry a client reference".to_string());
    }
    if view.status == TaskStatus::Listed {
        return Err("only plans may be LISTED".to_string());
    }
    if view.status.requires_schedule() && (view.start_date.is_none() || view.end_date.is_none()) {
        return Err(format!(
            "a {} task must carry a start and end date",
            view.status
        ));
    }
    if let (Some(start), Some(end)) = (view.start_date, view.end_date) {
        if end < start {
            return Err("end date precedes start date".to_string());
        }
    }
    Ok(())
}

fn check_milestones(milestones: &[Milestone]) -> Result<(), String> {
    if milestones.iter().any(|m| m.name.trim().is_empty()) {
        return Err("milestone names cannot be empty".to_string());
    }
    Ok(())
}

/// A request to create a plan or assign a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    /// Title
    pub title: String,
    /// Description
    pub description: String,
    /// Priority
    pub priority: Priority,
    /// True to publish a plan
    pub is_listing: bool,
    /// Client the task is assigned to; must be absent for plans
    pub client_id: Option<ClientId>,
    /// Base price
    pub credit_cost: Credits,
    /// Optional override price
    pub offer_price: Option<Credits>,
    /// Progress mode
    pub progress_mode: ProgressMode,
    /// Target quantity
    pub progress_target: u64,
    /// AUTO cap; the configured default when absent
    pub auto_completion_cap: Option<AutoCompletionCap>,
    /// Start date; must be absent for plans
    pub start_date: Option<Timestamp>,
    /// End date; must be absent for plans
    pub end_date: Option<Timestamp>,
    /// Milestones
    pub milestones: Vec<Milestone>,
}

impl TaskDraft {
    /// Draft for a marketplace plan.
    pub fn plan(title: impl Into<String>, credit_cost: Credits) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            priority: Priority::default(),
            is_listing: true,
            client_id: None,
            credit_cost,
            offer_price: None,
            progress_mode: ProgressMode::Auto,
            progress_target: 0,
            auto_completion_cap: None,
            start_date: None,
            end_date: None,
            milestones: Vec::new(),
        }
    }

    /// Draft for a task assigned to `client_id` over `[start, end]`.
    pub fn assignment(
        client_id: ClientId,
        title: impl Into<String>,
        credit_cost: Credits,
        start: Timestamp,
        end: Timestamp,
    ) -> Self {
        Self {
            is_listing: false,
            client_id: Some(client_id),
            start_date: Some(start),
            end_date: Some(end),
            ..Self::plan(title, credit_cost)
        }
    }

    /// Sets the offer price.
    #[must_use]
    pub const fn with_offer_price(mut self, offer_price: Credits) -> Self {
        self.offer_price = Some(offer_price);
        self
    }

    /// Switches to MANUAL progress with the given target.
    #[must_use]
    pub const fn with_manual_target(mut self, target: u64) -> Self {
        self.progress_mode = ProgressMode::Manual;
        self.progress_target = target;
        self
    }

    /// Sets the AUTO completion cap.
    #[must_use]
    pub const fn with_auto_completion_cap(mut self, cap: AutoCompletionCap) -> Self {
        self.auto_completion_cap = Some(cap);
        self
    }

    /// Adds a milestone.
    #[must_use]
    pub fn with_milestone(mut self, milestone: Milestone) -> Self {
        self.milestones.push(milestone);
        self
    }

    /// Sets the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Rejects malformed drafts and drafts that mix plan and task fields.
    ///
    /// `initial_status` is the status the record would be created in.
    pub fn validate(&self, initial_status: TaskStatus) -> CreditResult<()> {
        if self.title.trim().is_empty() {
            return Err(CreditError::ValidationFailed(
                "title cannot be empty".to_string(),
            ));
        }
        if self.progress_mode == ProgressMode::Manual && self.progress_target == 0 {
            return Err(CreditError::ValidationFailed(
                "MANUAL progress requires a positive target".to_string(),
            ));
        }
        check_milestones(&self.milestones).map_err(CreditError::ValidationFailed)?;
        check_shape(&ShapeView {
            is_listing: self.is_listing,
            has_client: self.client_id.is_some(),
            status: initial_status,
            start_date: self.start_date,
            end_date: self.end_date,
        })
        .map_err(CreditError::ValidationFailed)
    }
}

/// Changes an administrator may make to an existing task or plan.
///
/// Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
    /// New title
    pub title: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New priority
    pub priority: Option<Priority>,
    /// New base price; only applies to plans
    pub credit_cost: Option<Credits>,
    /// New offer price; only applies to plans
    pub offer_price: Option<Credits>,
    /// New target quantity
    pub progress_target: Option<u64>,
    /// New AUTO cap
    pub auto_completion_cap: Option<AutoCompletionCap>,
    /// New start date
    pub start_date: Option<Timestamp>,
    /// New end date
    pub end_date: Option<Timestamp>,
    /// Replacement milestones
    pub milestones: Option<Vec<Milestone>>,
}

impl TaskUpdate {
    /// Applies the update to a copy of `task` and validates the result.
    pub fn apply_to(&self, task: &Task, now: Timestamp) -> CreditResult<Task> {
        if task.status.is_terminal() {
            return Err(CreditError::NotEligible(format!(
                "task '{}' is {} and can no longer be edited",
                task.id, task.status
            )));
        }
        if task.is_client_bound() && (self.credit_cost.is_some() || self.offer_price.is_some()) {
            return Err(CreditError::ValidationFailed(
                "the price of a client-bound task is fixed once charged".to_string(),
            ));
        }

        let mut updated = task.clone();
        if let Some(title) = &self.title {
            updated.title.clone_from(title);
        }
        if let Some(description) = &self.description {
            updated.description.clone_from(description);
        }
        if let Some(priority) = self.priority {
            updated.priority = priority;
        }
        if let Some(cost) = self.credit_cost {
            updated.credit_cost = cost;
        }
        if self.offer_price.is_some() {
            updated.offer_price = self.offer_price;
        }
        if let Some(target) = self.progress_target {
            updated.progress_target = target;
        }
        if let Some(cap) = self.auto_completion_cap {
            updated.auto_completion_cap = cap;
        }
        if self.start_date.is_some() {
            updated.start_date = self.start_date;
        }
        if self.end_date.is_some() {
            updated.end_date = self.end_date;
        }
        if let Some(milestones) = &self.milestones {
            check_milestones(milestones).map_err(CreditError::ValidationFailed)?;
            updated.milestones.clone_from(milestones);
        }

        if updated.title.trim().is_empty() {
            return Err(CreditError::ValidationFailed(
                "title cannot be empty".to_string(),
            ));
        }
        if updated.progress_mode == ProgressMode::Manual && updated.progress_target == 0 {
            return Err(CreditError::ValidationFailed(
                "MANUAL progress requires a positive target".to_string(),
            ));
        }
        updated.check_shape().map_err(CreditError::ValidationFailed)?;
        updated.updated_at = now;
        Ok(updated)
    }
}

/// Final details an administrator supplies when approving a purchased task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalDecision {
    /// Final title
    pub title: String,
    /// Start of the work window
    pub start_date: Timestamp,
    /// End of the work window
    pub end_date: Timestamp,
    /// Priority
    pub priority: Priority,
}
