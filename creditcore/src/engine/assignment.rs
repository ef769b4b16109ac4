//! Plan publishing, task assignment and purchases.
//!
//! Every flow that costs credits funnels into `execute_charge`:
//!
//! 1. check the balance under the wallet lock
//! 2. debit the wallet (conditional, atomic in the store)
//! 3. create the task, crediting the charge back if that fails
//! 4. append the ledger entry referencing the task
//! 5. emit a notification
//!
//! Progress is computed on the task before it is written, so the stored task
//! already carries its initial progress and milestone state.

use tracing::{error, info, instrument};

use super::CreditEngine;
use crate::errors::{CreditError, CreditResult, EntityKind};
use crate::ledger::{LedgerEntryKind, LedgerReference};
use crate::notification::{Notification, NotificationKind, RelatedEntity};
use crate::store::CreditStore;
use crate::task::{resolve_effective_charge, Milestone, Task, TaskDraft, TaskOrigin, TaskStatus};
use crate::template::TemplateKind;
use crate::types::{Actor, AdminId, ClientId, Credits, TaskId, TemplateId, Timestamp, WalletId};

/// What a charge pays for.
struct Charge {
    client_id: ClientId,
    amount: Credits,
    kind: LedgerEntryKind,
    task: Task,
    notification: NotificationKind,
}

impl<S> CreditEngine<S>
where
    S: CreditStore,
{
    /// Creates a plan or assigns a task, depending on `draft.is_listing`.
    ///
    /// A draft that mixes plan and task fields is rejected before anything is
    /// written.
    pub async fn create_task(&self, admin: &AdminId, draft: TaskDraft) -> CreditResult<Task> {
        if draft.is_listing {
            self.publish_plan(admin, draft).await
        } else {
            self.assign_task(admin, draft).await
        }
    }

    /// Publishes a marketplace plan. Costs nothing.
    #[instrument(name = "publish_plan", skip(self, draft), fields(admin = %admin, title = %draft.title))]
    pub async fn publish_plan(&self, admin: &AdminId, draft: TaskDraft) -> CreditResult<Task> {
        if !draft.is_listing {
            return Err(CreditError::ValidationFailed(
                "a plan must be created as a listing".to_string(),
            ));
        }
        draft.validate(TaskStatus::Listed)?;

        let now = self.now();
        let task = self.task_from_draft(
            draft,
            TaskStatus::Listed,
            TaskOrigin::Listing,
            Actor::Admin(admin.clone()),
            now,
        );
        let stored = self.store.insert_task(task).await?;
        info!(plan = %stored.id, "plan published");
        Ok(stored)
    }

    /// Assigns a task to a client and charges its effective price.
    ///
    /// The task starts `ACTIVE` when its start date has passed, `PENDING`
    /// otherwise.
    #[instrument(name = "assign_task", skip(self, draft), fields(admin = %admin, title = %draft.title))]
    pub async fn assign_task(&self, admin: &AdminId, draft: TaskDraft) -> CreditResult<Task> {
        if draft.is_listing {
            return Err(CreditError::ValidationFailed(
                "an assignment cannot be a listing".to_string(),
            ));
        }
        let now = self.now();
        let status = match draft.start_date {
            Some(start) if start > now => TaskStatus::Pending,
            _ => TaskStatus::Active,
        };
        draft.validate(status)?;
        let client_id = draft.client_id.clone().ok_or_else(|| {
            CreditError::ValidationFailed("a task must carry a client reference".to_string())
        })?;
        self.require_client(&client_id).await?;

        let amount = resolve_effective_charge(draft.credit_cost, draft.offer_price);
        let mut task = self.task_from_draft(
            draft,
            status,
            TaskOrigin::AdminAssignment {
                admin: admin.clone(),
            },
            Actor::Admin(admin.clone()),
            now,
        );
        task.credits_used = amount;

        self.execute_charge(Charge {
            client_id,
            amount,
            kind: LedgerEntryKind::TaskAssigned,
            task,
            notification: NotificationKind::TaskAssigned,
        })
        .await
    }

    /// Buys a task template. The new task waits for administrator approval.
    #[instrument(name = "purchase_template", skip(self), fields(client = %client_id, template = %template_id))]
    pub async fn purchase_template(
        &self,
        client_id: &ClientId,
        template_id: TemplateId,
    ) -> CreditResult<Task> {
        self.purchase_from_template(client_id, template_id, TemplateKind::Task)
            .await
    }

    /// Buys a subscription. The new task is active immediately.
    #[instrument(name = "purchase_subscription", skip(self), fields(client = %client_id, template = %template_id))]
    pub async fn purchase_subscription(
        &self,
        client_id: &ClientId,
        template_id: TemplateId,
    ) -> CreditResult<Task> {
        self.purchase_from_template(client_id, template_id, TemplateKind::Subscription)
            .await
    }

    /// Buys a marketplace plan. The plan is cloned; the plan itself is unchanged.
    #[instrument(name = "purchase_plan", skip(self), fields(client = %client_id, plan = %plan_id))]
    pub async fn purchase_plan(&self, client_id: &ClientId, plan_id: TaskId) -> CreditResult<Task> {
        let plan = self.task(plan_id).await?;
        if !plan.is_listing || plan.status != TaskStatus::Listed {
            return Err(CreditError::NotEligible(format!(
                "task '{plan_id}' is not a listed plan"
            )));
        }
        self.require_client(client_id).await?;

        let now = self.now();
        let amount = plan.effective_charge();
        let task = plan.clone_plan_for_client(client_id.clone(), amount, now);

        self.execute_charge(Charge {
            client_id: client_id.clone(),
            amount,
            kind: LedgerEntryKind::PlanPurchase,
            task,
            notification: NotificationKind::TaskPurchased,
        })
        .await
    }

    async fn purchase_from_template(
        &self,
        client_id: &ClientId,
        template_id: TemplateId,
        expected: TemplateKind,
    ) -> CreditResult<Task> {
        let template = self
            .store
            .get_template(template_id)
            .await?
            .ok_or_else(|| CreditError::EntityNotFound {
                entity: EntityKind::Template,
                id: template_id.to_string(),
            })?;
        if !template.active {
            return Err(CreditError::NotEligible(format!(
                "template '{template_id}' is not available"
            )));
        }
        if template.kind != expected {
            return Err(CreditError::NotEligible(format!(
                "template '{template_id}' is a {:?} template, expected {expected:?}",
                template.kind
            )));
        }
        template.validate()?;
        self.require_client(client_id).await?;

        let now = self.now();
        let amount = resolve_effective_charge(template.credit_cost, template.offer_price);
        let task = template.instantiate(client_id.clone(), amount, now)?;
        let (kind, notification) = match expected {
            TemplateKind::Task => (LedgerEntryKind::TaskPurchase, NotificationKind::TaskPurchased),
            TemplateKind::Subscription => (
                LedgerEntryKind::SubscriptionPurchase,
                NotificationKind::SubscriptionPurchased,
            ),
        };

        self.execute_charge(Charge {
            client_id: client_id.clone(),
            amount,
            kind,
            task,
            notification,
        })
        .await
    }

    #[instrument(
        name = "execute_charge",
        skip(self, charge),
        fields(client = %charge.client_id, amount = %charge.amount, kind = %charge.kind, task = %charge.task.id)
    )]
    async fn execute_charge(&self, charge: Charge) -> CreditResult<Task> {
        let Charge {
            client_id,
            amount,
            kind,
            mut task,
            notification,
        } = charge;

        let wallet = match self.store.wallet_for_client(&client_id).await? {
            Some(wallet) => wallet,
            None if amount.is_zero() => self.ensure_wallet(&client_id).await?,
            None => {
                return Err(CreditError::InsufficientBalance {
                    wallet: None,
                    balance: Credits::zero(),
                    required: amount,
                })
            }
        };
        let _guard = self.wallet_locks.acquire(wallet.id).await;

        let now = self.now();
        let wallet = self.store.get_wallet(wallet.id).await?.ok_or_else(|| {
            CreditError::EntityNotFound {
                entity: EntityKind::Wallet,
                id: wallet.id.to_string(),
            }
        })?;
        if wallet.balance < amount {
            return Err(CreditError::InsufficientBalance {
                wallet: Some(wallet.id),
                balance: wallet.balance,
                required: amount,
            });
        }

        self.store
            .debit_wallet_if_sufficient(wallet.id, amount, now)
            .await?;

        self.apply_progress(&mut task, now);
        let task = match self.store.insert_task(task).await {
            Ok(task) => task,
            Err(err) => {
                self.compensate(wallet.id, amount, now).await;
                return Err(err.into());
            }
        };

        let description = format!("{kind}: {}", task.title);
        if let Err(err) = self
            .ledger()
            .append(
                wallet.id,
                kind,
                amount.as_debit(),
                Some(LedgerReference::Task(task.id)),
                description,
                now,
            )
            .await
        {
            error!(task = %task.id, wallet = %wallet.id, error = %err, "ledger append failed after charge");
            return Err(err);
        }

        info!(task = %task.id, status = %task.status, "charge completed");
        self.notify(Notification {
            recipient_id: client_id,
            kind: notification,
            title: task.title.clone(),
            message: format!("{} credits were charged for '{}'", amount, task.title),
            related_entity: Some(RelatedEntity::Task(task.id)),
        });
        Ok(task)
    }

    async fn compensate(&self, wallet_id: WalletId, amount: Credits, now: Timestamp) {
        match self.store.credit_wallet(wallet_id, amount, now).await {
            Ok(_) => info!(wallet = %wallet_id, %amount, "charge compensated"),
            Err(err) => error!(
                wallet = %wallet_id,
                %amount,
                error = %err,
                "compensation failed; wallet balance has drifted from its ledger"
            ),
        }
    }

    fn task_from_draft(
        &self,
        draft: TaskDraft,
        status: TaskStatus,
        origin: TaskOrigin,
        created_by: Actor,
        now: Timestamp,
    ) -> Task {
        let mut task = Task {
            id: TaskId::new(),
            title: draft.title,
            description: draft.description,
            priority: draft.priority,
            is_listing: draft.is_listing,
            client_id: draft.client_id,
            status,
            credit_cost: draft.credit_cost,
            offer_price: draft.offer_price,
            credits_used: Credits::zero(),
            progress_mode: draft.progress_mode,
            progress_target: draft.progress_target,
            progress_achieved: 0,
            auto_completion_cap: draft
                .auto_completion_cap
                .unwrap_or(self.config.default_auto_completion_cap),
            start_date: draft.start_date,
            end_date: draft.end_date,
            milestones: draft.milestones.iter().map(Milestone::reset).collect(),
            progress: 0.0,
            progress_color: String::new(),
            origin,
            created_by,
            created_at: now,
            updated_at: now,
            completed_at: None,
            cancelled_at: None,
            cancellation_reason: None,
        };
        self.apply_progress(&mut task, now);
        task
    }
}
