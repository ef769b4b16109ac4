//! The credit engine.
//!
//! [`CreditEngine`] ties a [`CreditStore`] to the clock, the notification sink
//! and the configuration, and exposes every balance-changing and task-changing
//! operation. Operations are split across submodules by concern:
//!
//! - `assignment`: plan publishing, admin assignment and client purchases
//! - `accounts`: wallet provisioning, balance adjustments, recharge requests
//! - `lifecycle`: approval, status transitions, edits and progress updates

mod accounts;
mod assignment;
mod lifecycle;

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::CreditConfig;
use crate::errors::{CreditError, CreditResult, EntityKind};
use crate::ledger::Ledger;
use crate::notification::{Notification, NotificationSink, TracingNotificationSink};
use crate::progress::ProgressEngine;
use crate::store::CreditStore;
use crate::task::Task;
use crate::types::{ClientId, TaskId, Timestamp};
use crate::validator::ConsistencyValidator;
use crate::locks::{TaskLocks, WalletLocks};
use crate::wallet::ClientAccount;

/// Entry point for every ledger and task operation.
pub struct CreditEngine<S> {
    store: S,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn NotificationSink>,
    config: CreditConfig,
    wallet_locks: WalletLocks,
    task_locks: TaskLocks,
    progress: ProgressEngine,
}

/// Assembles a [`CreditEngine`].
pub struct CreditEngineBuilder<S> {
    store: S,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn NotificationSink>,
    config: CreditConfig,
}

impl<S> CreditEngineBuilder<S>
where
    S: CreditStore,
{
    /// Starts from the system clock, the tracing sink and default configuration.
    pub fn new(store: S) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            notifier: Arc::new(TracingNotificationSink),
            config: CreditConfig::default(),
        }
    }

    /// Uses a different clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Uses a different notification sink.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Uses a different configuration.
    #[must_use]
    pub fn with_config(mut self, config: CreditConfig) -> Self {
        self.config = config;
        self
    }

    /// Validates the configuration and, if enabled, the stored state, then
    /// returns the engine.
    ///
    /// # Errors
    ///
    /// `ValidationFailed` for a bad configuration, `ConsistencyViolation` when
    /// stored state breaks an invariant.
    pub async fn boot(self) -> CreditResult<CreditEngine<S>> {
        self.config.validate()?;

        if self.config.validate_on_startup {
            ConsistencyValidator::new(&self.store)
                .ensure_consistent()
                .await?;
        } else {
            warn!("startup consistency validation disabled");
        }

        info!("credit engine ready");
        Ok(CreditEngine {
            progress: ProgressEngine::new(self.config.progress_palette.clone()),
            store: self.store,
            clock: self.clock,
            notifier: self.notifier,
            config: self.config,
            wallet_locks: WalletLocks::new(),
            task_locks: TaskLocks::new(),
        })
    }
}

impl<S> CreditEngine<S>
where
    S: CreditStore,
{
    /// A builder with default collaborators.
    pub fn builder(store: S) -> CreditEngineBuilder<S> {
        CreditEngineBuilder::new(store)
    }

    /// Boots an engine with the system clock and the tracing sink.
    pub async fn boot(store: S, config: CreditConfig) -> CreditResult<Self> {
        Self::builder(store).with_config(config).boot().await
    }

    /// The underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// The active configuration.
    pub const fn config(&self) -> &CreditConfig {
        &self.config
    }

    /// Read access to the ledger.
    pub const fn ledger(&self) -> Ledger<'_, S> {
        Ledger::new(&self.store)
    }

    /// A validator over the engine's store.
    pub const fn validator(&self) -> ConsistencyValidator<'_, S> {
        ConsistencyValidator::new(&self.store)
    }

    /// Reads a task or plan.
    pub async fn task(&self, task_id: TaskId) -> CreditResult<Task> {
        self.store
            .get_task(task_id)
            .await?
            .ok_or_else(|| CreditError::EntityNotFound {
                entity: EntityKind::Task,
                id: task_id.to_string(),
            })
    }

    fn now(&self) -> Timestamp {
        self.clock.now()
    }

    async fn require_client(&self, client_id: &ClientId) -> CreditResult<ClientAccount> {
        let account = self
            .store
            .get_client(client_id)
            .await?
            .ok_or_else(|| CreditError::ClientNotFound(client_id.clone()))?;
        if account.can_transact() {
            Ok(account)
        } else {
            Err(CreditError::NotAClient(client_id.clone()))
        }
    }

    /// Recomputes the cached progress fields of `task` in place.
    fn apply_progress(&self, task: &mut Task, now: Timestamp) {
        let snapshot = self.progress.compute(task, now);
        task.progress = snapshot.percent;
        task.milestones = snapshot.milestones;
        task.progress_color = snapshot.color;
    }

    /// Hands a notification to the sink without waiting for it.
    fn notify(&self, notification: Notification) {
        if !self.config.notifications_enabled {
            return;
        }
        let sink = Arc::clone(&self.notifier);
        let timeout = self.config.notification_timeout_ms.as_duration();
        tokio::spawn(async move {
            let recipient = notification.recipient_id.clone();
            let kind = notification.kind;
            match tokio::time::timeout(timeout, sink.notify(notification)).await {
                Ok(Ok(())) => debug!(%recipient, ?kind, "notification delivered"),
                Ok(Err(err)) => warn!(%recipient, ?kind, error = %err, "notification failed"),
                Err(_) => warn!(%recipient, ?kind, "notification timed out"),
            }
        });
    }
}
