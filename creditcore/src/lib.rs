//! `CreditCore` - credit ledger and task-progress engine
//!
//! Keeps every client's spendable balance consistent with an append-only
//! ledger, charges clients when tasks, plans and subscriptions are assigned or
//! bought, computes task progress, and checks all of it at startup.
//!
//! The engine talks to persistence through the [`CreditStore`] port and to the
//! outside world through the [`NotificationSink`] port. Start with
//! [`CreditEngine::builder`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod engine;
pub mod errors;
pub mod ledger;
pub mod locks;
pub mod notification;
pub mod progress;
pub mod recharge;
pub mod store;
pub mod task;
pub mod template;
pub mod types;
pub mod validator;
pub mod wallet;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{CreditConfig, NotificationTimeoutMs};
pub use engine::{CreditEngine, CreditEngineBuilder};
pub use errors::{CreditError, CreditResult, EntityKind, Operation, StoreError, StoreResult};
pub use ledger::{Ledger, LedgerEntry, LedgerEntryKind, LedgerReference};
pub use locks::{KeyedLocks, TaskLocks, WalletLocks};
pub use notification::{
    Notification, NotificationError, NotificationKind, NotificationSink, NoopNotificationSink,
    RelatedEntity, TracingNotificationSink,
};
pub use progress::{ProgressBand, ProgressEngine, ProgressPalette, ProgressSnapshot};
pub use recharge::{RechargeRequest, RechargeStatus};
pub use store::CreditStore;
pub use task::{
    resolve_effective_charge, ApprovalDecision, Milestone, Priority, ProgressMode, Task,
    TaskDraft, TaskOrigin, TaskStatus, TaskUpdate,
};
pub use template::{TaskTemplate, TemplateKind};
pub use types::{
    Actor, AdminId, AutoCompletionCap, ClientId, Credits, CreditsError, LedgerEntryId,
    MilestoneThreshold, RechargeRequestId, TaskId, TemplateId, Timestamp, WalletId,
};
pub use validator::{ConsistencyValidator, ValidationReport, Violation};
pub use wallet::{AccountRole, ClientAccount, Wallet};
