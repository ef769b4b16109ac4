//! In-memory adapter for the `CreditCore` ledger engine
//!
//! This crate provides an in-memory implementation of the `CreditStore` trait
//! from the creditcore crate, useful for testing and embedded deployments
//! where persistence is not required.
//!
//! All records live behind one lock, so the conditional debit is atomic and
//! ledger entries can never be changed once appended.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::significant_drop_tightening)]

use std::collections::{BTreeMap, HashMap};
use std::future::{ready, Future};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use creditcore::{
    ClientAccount, ClientId, CreditStore, Credits, EntityKind, LedgerEntry, LedgerEntryId,
    RechargeRequest, RechargeRequestId, StoreError, StoreResult, Task, TaskId, TaskTemplate,
    TemplateId, Timestamp, Wallet, WalletId,
};

#[derive(Debug, Default)]
struct MemoryState {
    clients: HashMap<ClientId, ClientAccount>,
    wallets: BTreeMap<WalletId, Wallet>,
    ledger: BTreeMap<LedgerEntryId, LedgerEntry>,
    tasks: BTreeMap<TaskId, Task>,
    templates: BTreeMap<TemplateId, TaskTemplate>,
    recharge_requests: BTreeMap<RechargeRequestId, RechargeRequest>,
}

impl MemoryState {
    fn wallet_mut(&mut self, wallet_id: WalletId) -> StoreResult<&mut Wallet> {
        self.wallets
            .get_mut(&wallet_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: EntityKind::Wallet,
                id: wallet_id.to_string(),
            })
    }

    fn refuse_ledger_change(&self, entry_id: LedgerEntryId) -> StoreResult<()> {
        if self.ledger.contains_key(&entry_id) {
            Err(StoreError::ImmutableRecord(entry_id))
        } else {
            Err(StoreError::NotFound {
                entity: EntityKind::LedgerEntry,
                id: entry_id.to_string(),
            })
        }
    }
}

/// Thread-safe in-memory credit store
#[derive(Debug, Clone, Default)]
pub struct InMemoryCreditStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryCreditStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))
    }

    fn read_with<T>(&self, f: impl FnOnce(&MemoryState) -> T) -> StoreResult<T> {
        let state = self.read()?;
        Ok(f(&state))
    }

    fn write_with<T>(&self, f: impl FnOnce(&mut MemoryState) -> StoreResult<T>) -> StoreResult<T> {
        let mut state = self.write()?;
        f(&mut state)
    }

    /// Overwrites a wallet record without touching the ledger.
    ///
    /// Exists so tests can simulate drift between a balance and its ledger;
    /// engine code never calls it.
    pub fn overwrite_wallet(&self, wallet: Wallet) -> StoreResult<()> {
        self.write_with(|state| {
            let _ = state.wallets.insert(wallet.id, wallet);
            Ok(())
        })
    }
}

impl CreditStore for InMemoryCreditStore {
    fn get_client(
        &self,
        client_id: &ClientId,
    ) -> impl Future<Output = StoreResult<Option<ClientAccount>>> + Send {
        ready(self.read_with(|state| state.clients.get(client_id).cloned()))
    }

    fn put_client(&self, account: ClientAccount) -> impl Future<Output = StoreResult<()>> + Send {
        ready(self.write_with(|state| {
            let _ = state.clients.insert(account.id.clone(), account);
            Ok(())
        }))
    }

    fn get_wallet(
        &self,
        wallet_id: WalletId,
    ) -> impl Future<Output = StoreResult<Option<Wallet>>> + Send {
        ready(self.read_with(|state| state.wallets.get(&wallet_id).cloned()))
    }

    fn wallet_for_client(
        &self,
        client_id: &ClientId,
    ) -> impl Future<Output = StoreResult<Option<Wallet>>> + Send {
        ready(self.read_with(|state| {
            state
                .wallets
                .values()
                .find(|wallet| &wallet.client_id == client_id)
                .cloned()
        }))
    }

    fn list_wallets(&self) -> impl Future<Output = StoreResult<Vec<Wallet>>> + Send {
        ready(self.read_with(|state| state.wallets.values().cloned().collect()))
    }

    fn insert_wallet(&self, wallet: Wallet) -> impl Future<Output = StoreResult<Wallet>> + Send {
        ready(self.write_with(|state| {
            if state
                .wallets
                .values()
                .any(|existing| existing.client_id == wallet.client_id)
            {
                return Err(StoreError::Conflict(format!(
                    "client '{}' already owns a wallet",
                    wallet.client_id
                )));
            }
            if state.wallets.contains_key(&wallet.id) {
                return Err(StoreError::Conflict(format!(
                    "wallet '{}' already exists",
                    wallet.id
                )));
            }
            let _ = state.wallets.insert(wallet.id, wallet.clone());
            Ok(wallet)
        }))
    }

    fn debit_wallet_if_sufficient(
        &self,
        wallet_id: WalletId,
        amount: Credits,
        now: Timestamp,
    ) -> impl Future<Output = StoreResult<Wallet>> + Send {
        ready(self.write_with(|state| {
            let wallet = state.wallet_mut(wallet_id)?;
            let Some(remaining) = wallet.balance.checked_sub(amount) else {
                return Err(StoreError::InsufficientFunds {
                    wallet: wallet_id,
                    balance: wallet.balance,
                    requested: amount,
                });
            };
            wallet.balance = remaining;
            wallet.updated_at = now;
            tracing::trace!(wallet = %wallet_id, %amount, "wallet debited");
            Ok(wallet.clone())
        }))
    }

    fn credit_wallet(
        &self,
        wallet_id: WalletId,
        amount: Credits,
        now: Timestamp,
    ) -> impl Future<Output = StoreResult<Wallet>> + Send {
        ready(self.write_with(|state| {
            let wallet = state.wallet_mut(wallet_id)?;
            wallet.balance = wallet.balance.saturating_add(amount);
            wallet.updated_at = now;
            tracing::trace!(wallet = %wallet_id, %amount, "wallet credited");
            Ok(wallet.clone())
        }))
    }

    fn append_ledger_entry(
        &self,
        entry: LedgerEntry,
    ) -> impl Future<Output = StoreResult<LedgerEntry>> + Send {
        ready(self.write_with(|state| {
            if state.ledger.contains_key(&entry.id) {
                return Err(StoreError::ImmutableRecord(entry.id));
            }
            let _ = state.ledger.insert(entry.id, entry.clone());
            Ok(entry)
        }))
    }

    fn update_ledger_entry(
        &self,
        entry: LedgerEntry,
    ) -> impl Future<Output = StoreResult<()>> + Send {
        ready(self.read().and_then(|state| state.refuse_ledger_change(entry.id)))
    }

    fn delete_ledger_entry(
        &self,
        entry_id: LedgerEntryId,
    ) -> impl Future<Output = StoreResult<()>> + Send {
        ready(self.read().and_then(|state| state.refuse_ledger_change(entry_id)))
    }

    fn ledger_entries_for_wallet(
        &self,
        wallet_id: WalletId,
    ) -> impl Future<Output = StoreResult<Vec<LedgerEntry>>> + Send {
        ready(self.read_with(|state| {
            state
                .ledger
                .values()
                .filter(|entry| entry.wallet_id == wallet_id)
                .cloned()
                .collect()
        }))
    }

    fn list_ledger_entries(&self) -> impl Future<Output = StoreResult<Vec<LedgerEntry>>> + Send {
        ready(self.read_with(|state| state.ledger.values().cloned().collect()))
    }

    fn insert_task(&self, task: Task) -> impl Future<Output = StoreResult<Task>> + Send {
        ready(self.write_with(|state| {
            if state.tasks.contains_key(&task.id) {
                return Err(StoreError::Conflict(format!(
                    "task '{}' already exists",
                    task.id
                )));
            }
            let _ = state.tasks.insert(task.id, task.clone());
            Ok(task)
        }))
    }

    fn update_task(&self, task: Task) -> impl Future<Output = StoreResult<Task>> + Send {
        ready(self.write_with(|state| match state.tasks.get_mut(&task.id) {
            Some(existing) => {
                existing.clone_from(&task);
                Ok(task)
            }
            None => Err(StoreError::NotFound {
                entity: EntityKind::Task,
                id: task.id.to_string(),
            }),
        }))
    }

    fn get_task(&self, task_id: TaskId) -> impl Future<Output = StoreResult<Option<Task>>> + Send {
        ready(self.read_with(|state| state.tasks.get(&task_id).cloned()))
    }

    fn list_tasks(&self) -> impl Future<Output = StoreResult<Vec<Task>>> + Send {
        ready(self.read_with(|state| state.tasks.values().cloned().collect()))
    }

    fn put_template(
        &self,
        template: TaskTemplate,
    ) -> impl Future<Output = StoreResult<TaskTemplate>> + Send {
        ready(self.write_with(|state| {
            let _ = state.templates.insert(template.id, template.clone());
            Ok(template)
        }))
    }

    fn get_template(
        &self,
        template_id: TemplateId,
    ) -> impl Future<Output = StoreResult<Option<TaskTemplate>>> + Send {
        ready(self.read_with(|state| state.templates.get(&template_id).cloned()))
    }

    fn list_templates(&self) -> impl Future<Output = StoreResult<Vec<TaskTemplate>>> + Send {
        ready(self.read_with(|state| state.templates.values().cloned().collect()))
    }

    fn put_recharge_request(
        &self,
        request: RechargeRequest,
    ) -> impl Future<Output = StoreResult<RechargeRequest>> + Send {
        ready(self.write_with(|state| {
            let _ = state.recharge_requests.insert(request.id, request.clone());
            Ok(request)
        }))
    }

    fn get_recharge_request(
        &self,
        request_id: RechargeRequestId,
    ) -> impl Future<Output = StoreResult<Option<RechargeRequest>>> + Send {
        ready(self.read_with(|state| state.recharge_requests.get(&request_id).cloned()))
    }

    fn list_recharge_requests(
        &self,
    ) -> impl Future<Output = StoreResult<Vec<RechargeRequest>>> + Send {
        ready(self.read_with(|state| state.recharge_requests.values().cloned().collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use creditcore::LedgerEntryKind;
    use rust_decimal::Decimal;

    fn client() -> ClientId {
        ClientId::try_new("client-1").unwrap()
    }

    #[tokio::test]
    async fn second_wallet_for_same_client_conflicts() {
        let store = InMemoryCreditStore::new();
        store
            .insert_wallet(Wallet::open(client(), Timestamp::now()))
            .await
            .unwrap();

        let result = store
            .insert_wallet(Wallet::open(client(), Timestamp::now()))
            .await;

        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn short_debit_writes_nothing() {
        let store = InMemoryCreditStore::new();
        let wallet = store
            .insert_wallet(Wallet::open(client(), Timestamp::now()))
            .await
            .unwrap();
        store
            .credit_wallet(wallet.id, Credits::whole(100), Timestamp::now())
            .await
            .unwrap();

        let result = store
            .debit_wallet_if_sufficient(wallet.id, Credits::whole(150), Timestamp::now())
            .await;

        assert!(matches!(
            result,
            Err(StoreError::InsufficientFunds { .. })
        ));
        let stored = store.get_wallet(wallet.id).await.unwrap().unwrap();
        assert_eq!(stored.balance, Credits::whole(100));
    }

    #[tokio::test]
    async fn appended_entries_cannot_be_changed() {
        let store = InMemoryCreditStore::new();
        let entry = LedgerEntry {
            id: LedgerEntryId::new(),
            wallet_id: WalletId::new(),
            kind: LedgerEntryKind::AdminAdjustment,
            amount: Decimal::from(10),
            reference_id: None,
            description: "seed".to_string(),
            created_at: Timestamp::now(),
        };
        store.append_ledger_entry(entry.clone()).await.unwrap();

        let mut altered = entry.clone();
        altered.amount = Decimal::from(1_000);
        assert_eq!(
            store.update_ledger_entry(altered).await,
            Err(StoreError::ImmutableRecord(entry.id))
        );
        assert_eq!(
            store.delete_ledger_entry(entry.id).await,
            Err(StoreError::ImmutableRecord(entry.id))
        );
        assert_eq!(
            store.append_ledger_entry(entry.clone()).await,
            Err(StoreError::ImmutableRecord(entry.id))
        );
        assert_eq!(store.list_ledger_entries().await.unwrap(), vec![entry]);
    }

    #[tokio::test]
    async fn clones_share_state() {
        let store = InMemoryCreditStore::new();
        let observer = store.clone();

        store
            .put_client(ClientAccount::client(client(), "Ada"))
            .await
            .unwrap();

        assert!(observer.get_client(&client()).await.unwrap().is_some());
    }
}
