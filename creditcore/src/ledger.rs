//! Append-only credit ledger.
//!
//! Every balance change writes exactly one [`LedgerEntry`]. Entries are never
//! updated or deleted: store adapters refuse both operations with
//! [`StoreError::ImmutableRecord`](crate::errors::StoreError::ImmutableRecord).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::{CreditError, CreditResult};
use crate::store::CreditStore;
use crate::types::{LedgerEntryId, RechargeRequestId, TaskId, Timestamp, WalletId};

/// Why a ledger entry was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LedgerEntryKind {
    /// A client's recharge request was approved.
    RechargeApproved,
    /// An administrator adjusted the balance directly.
    AdminAdjustment,
    /// A client bought a task template.
    TaskPurchase,
    /// An administrator assigned a task to a client.
    TaskAssigned,
    /// A client bought a marketplace plan.
    PlanPurchase,
    /// A client bought a subscription.
    SubscriptionPurchase,
}

impl std::fmt::Display for LedgerEntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::RechargeApproved => "recharge-approved",
            Self::AdminAdjustment => "admin-adjustment",
            Self::TaskPurchase => "task-purchase",
            Self::TaskAssigned => "task-assigned",
            Self::PlanPurchase => "plan-purchase",
            Self::SubscriptionPurchase => "subscription-purchase",
        };
        f.write_str(name)
    }
}

/// The record whose creation caused a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "camelCase")]
pub enum LedgerReference {
    /// A task created by a charge.
    Task(TaskId),
    /// An approved recharge request.
    RechargeRequest(RechargeRequestId),
}

/// One immutable, signed change to a wallet balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    /// Entry identifier
    pub id: LedgerEntryId,
    /// Wallet whose balance changed
    pub wallet_id: WalletId,
    /// Why the balance changed
    pub kind: LedgerEntryKind,
    /// Signed change: negative for charges, positive for credits
    pub amount: Decimal,
    /// Record that caused the change, if any
    pub reference_id: Option<LedgerReference>,
    /// Human-readable description
    pub description: String,
    /// When the entry was written
    pub created_at: Timestamp,
}

/// Thin façade over the ledger part of a [`CreditStore`].
pub struct Ledger<'a, S> {
    store: &'a S,
}

impl<'a, S> Ledger<'a, S>
where
    S: CreditStore,
{
    /// Wraps a store.
    pub const fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Appends a new entry. Performs no business validation.
    #[tracing::instrument(name = "ledger_append", skip(self, description), fields(wallet = %wallet_id, kind = %kind, amount = %amount))]
    pub async fn append(
        &self,
        wallet_id: WalletId,
        kind: LedgerEntryKind,
        amount: Decimal,
        reference_id: Option<LedgerReference>,
        description: impl Into<String>,
        now: Timestamp,
    ) -> CreditResult<LedgerEntry> {
        let entry = LedgerEntry {
            id: LedgerEntryId::new(),
            wallet_id,
            kind,
            amount,
            reference_id,
            description: description.into(),
            created_at: now,
        };
        let stored = self.store.append_ledger_entry(entry).await?;
        tracing::debug!(entry = %stored.id, "ledger entry appended");
        Ok(stored)
    }

    /// Sum of all entries written against the wallet.
    pub async fn balance_of(&self, wallet_id: WalletId) -> CreditResult<Decimal> {
        let entries = self.store.ledger_entries_for_wallet(wallet_id).await?;
        Ok(entries.iter().map(|entry| entry.amount).sum())
    }

    /// Entries for the wallet, oldest first.
    pub async fn history(&self, wallet_id: WalletId) -> CreditResult<Vec<LedgerEntry>> {
        let mut entries = self.store.ledger_entries_for_wallet(wallet_id).await?;
        entries.sort_by_key(|entry| entry.id);
        Ok(entries)
    }

    /// Attempts to amend an entry. Always fails: the ledger is append-only.
    pub async fn amend(&self, entry: LedgerEntry) -> CreditResult<()> {
        let id = entry.id;
        self.store
            .update_ledger_entry(entry)
            .await
            .map_err(CreditError::from)?;
        // An adapter that accepted the write broke the append-only contract.
        Err(CreditError::ImmutabilityViolation(id))
    }

    /// Attempts to remove an entry. Always fails: the ledger is append-only.
    pub async fn remove(&self, entry_id: LedgerEntryId) -> CreditResult<()> {
        self.store
            .delete_ledger_entry(entry_id)
            .await
            .map_err(CreditError::from)?;
        Err(CreditError::ImmutabilityViolation(entry_id))
    }
}
