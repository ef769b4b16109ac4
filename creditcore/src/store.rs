//! Storage port.
//!
//! [`CreditStore`] is the only way the engine reaches persistent state. Each
//! method is a single, independent write or read; adapters offer no multi-step
//! transactions. Two methods carry extra guarantees every adapter must honor:
//!
//! - [`CreditStore::debit_wallet_if_sufficient`] checks and decrements in one
//!   atomic step and writes nothing when the balance is short.
//! - [`CreditStore::update_ledger_entry`] and [`CreditStore::delete_ledger_entry`]
//!   always refuse with [`StoreError::ImmutableRecord`](crate::errors::StoreError::ImmutableRecord)
//!   for an existing entry.
//!
//! Listing methods return records ordered by identifier, which for UUIDv7 ids is
//! creation order.
//!
//! Implementations include:
//! - `creditcore-memory`: in-memory adapter for tests and embedded use
//! - `creditcore-testing`: a failure-injecting wrapper around any adapter

use std::future::Future;

use crate::errors::StoreResult;
use crate::ledger::LedgerEntry;
use crate::recharge::RechargeRequest;
use crate::task::Task;
use crate::template::TaskTemplate;
use crate::types::{
    ClientId, Credits, LedgerEntryId, RechargeRequestId, TaskId, TemplateId, Timestamp, WalletId,
};
use crate::wallet::{ClientAccount, Wallet};

/// Persistence operations required by the engine.
pub trait CreditStore: Send + Sync {
    /// Reads a client account.
    fn get_client(
        &self,
        client_id: &ClientId,
    ) -> impl Future<Output = StoreResult<Option<ClientAccount>>> + Send;

    /// Inserts or replaces a client account.
    fn put_client(&self, account: ClientAccount) -> impl Future<Output = StoreResult<()>> + Send;

    /// Reads a wallet by id.
    fn get_wallet(
        &self,
        wallet_id: WalletId,
    ) -> impl Future<Output = StoreResult<Option<Wallet>>> + Send;

    /// Reads the wallet owned by a client.
    fn wallet_for_client(
        &self,
        client_id: &ClientId,
    ) -> impl Future<Output = StoreResult<Option<Wallet>>> + Send;

    /// Every wallet.
    fn list_wallets(&self) -> impl Future<Output = StoreResult<Vec<Wallet>>> + Send;

    /// Creates a wallet.
    ///
    /// Fails with `Conflict` if the client already owns one.
    fn insert_wallet(&self, wallet: Wallet) -> impl Future<Output = StoreResult<Wallet>> + Send;

    /// Decrements the balance by `amount` if it holds at least that much.
    ///
    /// Fails with `InsufficientFunds` and writes nothing otherwise.
    fn debit_wallet_if_sufficient(
        &self,
        wallet_id: WalletId,
        amount: Credits,
        now: Timestamp,
    ) -> impl Future<Output = StoreResult<Wallet>> + Send;

    /// Increments the balance by `amount`.
    fn credit_wallet(
        &self,
        wallet_id: WalletId,
        amount: Credits,
        now: Timestamp,
    ) -> impl Future<Output = StoreResult<Wallet>> + Send;

    /// Appends an immutable ledger entry.
    fn append_ledger_entry(
        &self,
        entry: LedgerEntry,
    ) -> impl Future<Output = StoreResult<LedgerEntry>> + Send;

    /// Refuses to change an existing entry.
    fn update_ledger_entry(&self, entry: LedgerEntry)
        -> impl Future<Output = StoreResult<()>> + Send;

    /// Refuses to delete an existing entry.
    fn delete_ledger_entry(
        &self,
        entry_id: LedgerEntryId,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Entries written against one wallet.
    fn ledger_entries_for_wallet(
        &self,
        wallet_id: WalletId,
    ) -> impl Future<Output = StoreResult<Vec<LedgerEntry>>> + Send;

    /// Every ledger entry.
    fn list_ledger_entries(&self) -> impl Future<Output = StoreResult<Vec<LedgerEntry>>> + Send;

    /// Creates a task or plan.
    fn insert_task(&self, task: Task) -> impl Future<Output = StoreResult<Task>> + Send;

    /// Replaces an existing task or plan.
    fn update_task(&self, task: Task) -> impl Future<Output = StoreResult<Task>> + Send;

    /// Reads a task or plan.
    fn get_task(&self, task_id: TaskId) -> impl Future<Output = StoreResult<Option<Task>>> + Send;

    /// Every task and plan.
    fn list_tasks(&self) -> impl Future<Output = StoreResult<Vec<Task>>> + Send;

    /// Inserts or replaces a template.
    fn put_template(
        &self,
        template: TaskTemplate,
    ) -> impl Future<Output = StoreResult<TaskTemplate>> + Send;

    /// Reads a template.
    fn get_template(
        &self,
        template_id: TemplateId,
    ) -> impl Future<Output = StoreResult<Option<TaskTemplate>>> + Send;

    /// Every template.
    fn list_templates(&self) -> impl Future<Output = StoreResult<Vec<TaskTemplate>>> + Send;

    /// Inserts or replaces a recharge request.
    fn put_recharge_request(
        &self,
        request: RechargeRequest,
    ) -> impl Future<Output = StoreResult<RechargeRequest>> + Send;

    /// Reads a recharge request.
    fn get_recharge_request(
        &self,
        request_id: RechargeRequestId,
    ) -> impl Future<Output = StoreResult<Option<RechargeRequest>>> + Send;

    /// Every recharge request.
    fn list_recharge_requests(
        &self,
    ) -> impl Future<Output = StoreResult<Vec<RechargeRequest>>> + Send;
}
