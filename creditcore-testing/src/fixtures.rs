//! Builders and notification sinks shared by engine tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use creditcore::{
    AdminId, AutoCompletionCap, ClientAccount, ClientId, CreditEngine, CreditResult, CreditStore,
    Credits, Notification, NotificationError, NotificationKind, NotificationSink, ProgressMode,
    TaskTemplate, TemplateId, TemplateKind, Timestamp, Wallet,
};
use rust_decimal::Decimal;

/// Parses a client id, panicking on invalid input.
///
/// # Panics
///
/// If `raw` is blank.
pub fn client_id(raw: &str) -> ClientId {
    ClientId::try_new(raw).unwrap_or_else(|err| panic!("invalid client id {raw:?}: {err}"))
}

/// Parses an admin id, panicking on invalid input.
///
/// # Panics
///
/// If `raw` is blank.
pub fn admin_id(raw: &str) -> AdminId {
    AdminId::try_new(raw).unwrap_or_else(|err| panic!("invalid admin id {raw:?}: {err}"))
}

/// An active AUTO template costing `cost` credits.
///
/// Subscriptions run for 30 days.
pub fn task_template(kind: TemplateKind, cost: u64) -> TaskTemplate {
    TaskTemplate {
        id: TemplateId::new(),
        kind,
        title: match kind {
            TemplateKind::Task => "Landing page".to_string(),
            TemplateKind::Subscription => "Monthly upkeep".to_string(),
        },
        description: String::new(),
        credit_cost: Credits::whole(cost),
        offer_price: None,
        progress_mode: ProgressMode::Auto,
        progress_target: 0,
        auto_completion_cap: AutoCompletionCap::default(),
        milestones: Vec::new(),
        duration_days: 30,
        created_by: Some(admin_id("admin")),
        active: true,
        created_at: Timestamp::now(),
    }
}

/// Registers a client and funds its wallet through an admin adjustment.
pub async fn seed_client<S>(
    engine: &CreditEngine<S>,
    client: &ClientId,
    balance: u64,
) -> CreditResult<Wallet>
where
    S: CreditStore,
{
    let wallet = engine
        .register_client(ClientAccount::client(client.clone(), client.to_string()))
        .await?;
    if balance == 0 {
        return Ok(wallet);
    }
    engine
        .adjust_balance(&admin_id("seeder"), client, Decimal::from(balance), "opening balance")
        .await?;
    engine.wallet_of(client).await
}

/// Records every notification it receives.
#[derive(Debug, Clone, Default)]
pub struct CollectingNotificationSink {
    received: Arc<Mutex<Vec<Notification>>>,
}

impl CollectingNotificationSink {
    /// An empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything received so far.
    pub fn received(&self) -> Vec<Notification> {
        match self.received.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Kinds received so far, in arrival order.
    pub fn kinds(&self) -> Vec<NotificationKind> {
        self.received().iter().map(|n| n.kind).collect()
    }

    /// Waits until at least `count` notifications arrived or `within` elapsed.
    ///
    /// Returns whatever was received.
    pub async fn wait_for(&self, count: usize, within: Duration) -> Vec<Notification> {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            let received = self.received();
            if received.len() >= count || tokio::time::Instant::now() >= deadline {
                return received;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl NotificationSink for CollectingNotificationSink {
    async fn notify(&self, notification: Notification) -> Result<(), NotificationError> {
        match self.received.lock() {
            Ok(mut guard) => guard.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
        Ok(())
    }
}

/// Fails every delivery.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingNotificationSink;

#[async_trait]
impl NotificationSink for FailingNotificationSink {
    async fn notify(&self, notification: Notification) -> Result<(), NotificationError> {
        Err(NotificationError::Delivery(format!(
            "refusing {:?} for {}",
            notification.kind, notification.recipient_id
        )))
    }
}

/// Never finishes a delivery within any reasonable timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct StalledNotificationSink;

#[async_trait]
impl NotificationSink for StalledNotificationSink {
    async fn notify(&self, _notification: Notification) -> Result<(), NotificationError> {
        tokio::time::sleep(Duration::from_secs(3_600)).await;
        Ok(())
    }
}
