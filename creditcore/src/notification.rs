//! Notification port.
//!
//! The engine emits a [`Notification`] after a successful purchase, assignment,
//! approval or review. Delivery is somebody else's job: a sink may log, queue or
//! push. The engine never waits on a sink beyond its configured timeout and
//! never fails an operation because a sink did.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{ClientId, RechargeRequestId, TaskId, WalletId};

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    /// An administrator assigned a task.
    TaskAssigned,
    /// The client bought a task template or plan.
    TaskPurchased,
    /// The client bought a subscription.
    SubscriptionPurchased,
    /// A purchased task was approved and scheduled.
    TaskApproved,
    /// A task was completed.
    TaskCompleted,
    /// A task was cancelled.
    TaskCancelled,
    /// A recharge request was approved.
    RechargeApproved,
    /// A recharge request was rejected.
    RechargeRejected,
    /// An administrator adjusted the balance.
    BalanceAdjusted,
}

/// Record a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "camelCase")]
pub enum RelatedEntity {
    /// A task.
    Task(TaskId),
    /// A recharge request.
    RechargeRequest(RechargeRequestId),
    /// A wallet.
    Wallet(WalletId),
}

/// A message for one client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Recipient
    pub recipient_id: ClientId,
    /// What happened
    pub kind: NotificationKind,
    /// Short title
    pub title: String,
    /// Body text
    pub message: String,
    /// Record the message is about
    pub related_entity: Option<RelatedEntity>,
}

/// Errors a sink may report. They are logged and otherwise ignored.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// The sink could not accept the notification.
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Accepts notifications for delivery.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Hands one notification to the delivery mechanism.
    async fn notify(&self, notification: Notification) -> Result<(), NotificationError>;
}

/// Writes notifications to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotificationSink;

#[async_trait]
impl NotificationSink for TracingNotificationSink {
    async fn notify(&self, notification: Notification) -> Result<(), NotificationError> {
        tracing::info!(
            recipient = %notification.recipient_id,
            kind = ?notification.kind,
            title = %notification.title,
            "notification emitted"
        );
        Ok(())
    }
}

/// Discards every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotificationSink;

#[async_trait]
impl NotificationSink for NoopNotificationSink {
    async fn notify(&self, _notification: Notification) -> Result<(), NotificationError> {
        Ok(())
    }
}
