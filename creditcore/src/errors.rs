//! Error types for `CreditCore`.
//!
//! Errors are split by layer:
//!
//! - **`CreditError`**: failures reported by engine operations (purchases,
//!   assignments, recharges, task administration, validation).
//! - **`StoreError`**: failures reported by a [`CreditStore`](crate::store::CreditStore)
//!   adapter.
//!
//! A `StoreError` converts into a `CreditError`; the two store-level business
//! refusals (an immutable ledger record, a conditional debit that found too
//! little balance) surface as their engine-level counterparts so callers only
//! need to match one enum.

use thiserror::Error;

use crate::task::TaskStatus;
use crate::types::{ClientId, Credits, LedgerEntryId, WalletId};
use crate::validator::ValidationReport;

/// Kinds of records the engine looks up by identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// A client account.
    Client,
    /// A client wallet.
    Wallet,
    /// A task or marketplace plan.
    Task,
    /// A reusable task or subscription template.
    Template,
    /// A recharge request.
    RechargeRequest,
    /// A ledger entry.
    LedgerEntry,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Client => "client",
            Self::Wallet => "wallet",
            Self::Task => "task",
            Self::Template => "template",
            Self::RechargeRequest => "recharge request",
            Self::LedgerEntry => "ledger entry",
        };
        f.write_str(name)
    }
}

/// Store operations, used to attribute failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Reading a client account.
    GetClient,
    /// Writing a client account.
    PutClient,
    /// Reading a wallet.
    GetWallet,
    /// Listing wallets.
    ListWallets,
    /// Creating a wallet.
    InsertWallet,
    /// Conditionally decrementing a wallet balance.
    DebitWallet,
    /// Incrementing a wallet balance.
    CreditWallet,
    /// Appending a ledger entry.
    AppendLedgerEntry,
    /// Reading ledger entries.
    ReadLedger,
    /// Creating a task.
    InsertTask,
    /// Replacing a task.
    UpdateTask,
    /// Reading tasks.
    ReadTasks,
    /// Writing a template.
    PutTemplate,
    /// Reading templates.
    ReadTemplates,
    /// Writing a recharge request.
    PutRechargeRequest,
    /// Reading recharge requests.
    ReadRechargeRequests,
}

/// Errors returned by credit store adapters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The requested record does not exist.
    #[error("{entity} '{id}' not found")]
    NotFound {
        /// Kind of record that was looked up
        entity: EntityKind,
        /// Identifier that was looked up
        id: String,
    },

    /// The write would violate a uniqueness constraint.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A conditional debit found less balance than requested; nothing was written.
    #[error("wallet '{wallet}' holds {balance}, cannot debit {requested}")]
    InsufficientFunds {
        /// Wallet that was debited
        wallet: WalletId,
        /// Balance at the time of the attempt
        balance: Credits,
        /// Requested debit
        requested: Credits,
    },

    /// An update or delete of an append-only record was attempted.
    #[error("ledger entry '{0}' is immutable")]
    ImmutableRecord(LedgerEntryId),

    /// The backing store could not serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A failure injected by a test harness.
    #[error("injected failure during {operation:?}")]
    InjectedFailure {
        /// Operation that was made to fail
        operation: Operation,
    },
}

/// Errors reported by engine operations.
///
/// # Handling
///
/// - **`InsufficientBalance`**, **`ValidationFailed`**, **`EntityNotFound`**,
///   **`ClientNotFound`**, **`NotAClient`**, **`NotEligible`**,
///   **`InvalidTransition`**: nothing was written; report to the caller.
/// - **`ImmutabilityViolation`**: a programming error; never retry.
/// - **`ConsistencyViolation`**: stored state has drifted; the process must
///   not start serving.
/// - **`Store`**: backend failure; a purchase may have been compensated.
#[derive(Debug, Clone, Error)]
pub enum CreditError {
    /// The wallet holds less than the effective charge.
    #[error("insufficient balance in {}: balance {balance}, required {required}", describe_wallet(.wallet.as_ref()))]
    InsufficientBalance {
        /// Wallet that would have been charged; `None` if the client has none yet
        wallet: Option<WalletId>,
        /// Balance at the time of the check
        balance: Credits,
        /// Effective charge
        required: Credits,
    },

    /// The request is malformed or mixes listing and client-bound fields.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// A referenced record does not exist.
    #[error("{entity} '{id}' not found")]
    EntityNotFound {
        /// Kind of record that was looked up
        entity: EntityKind,
        /// Identifier that was looked up
        id: String,
    },

    /// The client account does not exist.
    #[error("client '{0}' not found")]
    ClientNotFound(ClientId),

    /// The account exists but cannot act as a paying client.
    #[error("account '{0}' is not an active client")]
    NotAClient(ClientId),

    /// The referenced record exists but cannot be used for this operation.
    #[error("not eligible: {0}")]
    NotEligible(String),

    /// The task state machine does not allow this transition.
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition {
        /// Current status
        from: TaskStatus,
        /// Requested status
        to: TaskStatus,
    },

    /// An update or delete of a ledger entry was attempted.
    #[error("ledger entry '{0}' is immutable and cannot be changed or deleted")]
    ImmutabilityViolation(LedgerEntryId),

    /// The consistency validator found stored state that breaks an invariant.
    #[error("consistency violation: {0}")]
    ConsistencyViolation(ValidationReport),

    /// The backing store failed.
    #[error("store error: {0}")]
    Store(StoreError),
}

/// Type alias for engine results.
pub type CreditResult<T> = Result<T, CreditError>;

/// Type alias for store adapter results.
pub type StoreResult<T> = Result<T, StoreError>;

fn describe_wallet(wallet: Option<&WalletId>) -> String {
    wallet.map_or_else(
        || "an unprovisioned wallet".to_string(),
        |id| format!("wallet '{id}'"),
    )
}

impl From<StoreError> for CreditError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ImmutableRecord(entry) => Self::ImmutabilityViolation(entry),
            StoreError::InsufficientFunds {
                wallet,
                balance,
                requested,
            } => Self::InsufficientBalance {
                wallet: Some(wallet),
                balance,
                required: requested,
            },
            StoreError::NotFound { entity, id } => Self::EntityNotFound { entity, id },
            other => Self::Store(other),
        }
    }
}
