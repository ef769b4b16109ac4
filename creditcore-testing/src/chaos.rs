//! Failure injection for credit stores.
//!
//! [`ChaosCreditStore`] wraps any [`CreditStore`] and makes chosen operations
//! fail with [`StoreError::InjectedFailure`] before they reach the inner store.
//! Failures are either targeted (always fail a named [`Operation`]) or random
//! with a configurable probability.
//!
//! Latency can also be added per operation. It is applied after the inner
//! store answers, so the caller receives a result that may already be stale;
//! this is how interleavings between engine operations are reproduced.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use creditcore::{
    ClientAccount, ClientId, CreditStore, Credits, LedgerEntry, LedgerEntryId, Operation,
    RechargeRequest, RechargeRequestId, StoreError, StoreResult, Task, TaskId, TaskTemplate,
    TemplateId, Timestamp, Wallet, WalletId,
};
use nutype::nutype;
use rand::{random, rngs::StdRng, Rng, SeedableRng};
use tokio::time::sleep;

/// Probability value for chaos injection rates.
///
/// Probability represents a value in the range [0.0, 1.0] where 0.0 means
/// never inject failures and 1.0 means always inject failures.
///
/// ```
/// use creditcore_testing::chaos::Probability;
///
/// assert!(Probability::try_new(0.5).is_ok());
/// assert!(Probability::try_new(1.5).is_err());
/// ```
#[nutype(
    validate(finite, greater_or_equal = 0.0, less_or_equal = 1.0),
    default = 0.0,
    derive(Debug, Clone, Copy, PartialEq, PartialOrd, Display, Into, Default)
)]
pub struct Probability(f64);

/// Which failures and delays a [`ChaosCreditStore`] injects.
#[derive(Debug, Clone)]
pub struct ChaosConfig {
    deterministic_seed: Option<u64>,
    failure_probability: Probability,
    failing_operations: HashSet<Operation>,
    latencies: HashMap<Operation, Duration>,
}

impl ChaosConfig {
    /// No failures, with a fixed RNG seed.
    pub fn deterministic() -> Self {
        Self {
            deterministic_seed: Some(0),
            ..Self::default()
        }
    }

    /// Fails any operation with the given probability, clamped to [0, 1].
    #[must_use]
    pub fn with_failure_probability(mut self, probability: f64) -> Self {
        if let Ok(probability) = Probability::try_new(probability.clamp(0.0, 1.0)) {
            self.failure_probability = probability;
        }
        self
    }

    /// Always fails `operation`.
    #[must_use]
    pub fn fail_operation(mut self, operation: Operation) -> Self {
        self.failing_operations.insert(operation);
        self
    }

    /// Delays every answer to `operation` by `latency`.
    #[must_use]
    pub fn with_latency(mut self, operation: Operation, latency: Duration) -> Self {
        self.latencies.insert(operation, latency);
        self
    }
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            deterministic_seed: None,
            failure_probability: Probability::default(),
            failing_operations: HashSet::new(),
            latencies: HashMap::new(),
        }
    }
}

/// Wraps a store with [`ChaosConfig`]-driven failures.
pub trait ChaosCreditStoreExt: Sized {
    /// Wraps `self`.
    fn with_chaos(self, config: ChaosConfig) -> ChaosCreditStore<Self>;
}

/// A store that fails on demand.
pub struct ChaosCreditStore<S> {
    store: S,
    config: ChaosConfig,
    rng: Mutex<StdRng>,
}

impl<S> ChaosCreditStore<S> {
    /// Wraps `store`.
    pub fn new(store: S, config: ChaosConfig) -> Self {
        let rng = match config.deterministic_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::seed_from_u64(random()),
        };

        Self {
            store,
            config,
            rng: Mutex::new(rng),
        }
    }

    /// The wrapped store.
    pub const fn inner(&self) -> &S {
        &self.store
    }

    fn should_fail(&self, operation: Operation) -> bool {
        if self.config.failing_operations.contains(&operation) {
            return true;
        }

        let probability: f64 = self.config.failure_probability.into();
        if probability <= 0.0 {
            return false;
        }
        if probability >= 1.0 {
            return true;
        }

        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        rng.random_bool(probability)
    }

    fn inject(&self, operation: Operation) -> Injection {
        Injection {
            failure: self.should_fail(operation).then_some(operation),
            latency: self.config.latencies.get(&operation).copied(),
        }
    }
}

/// What one store call suffers.
#[derive(Debug, Clone, Copy)]
struct Injection {
    failure: Option<Operation>,
    latency: Option<Duration>,
}

impl Injection {
    fn admit(self) -> StoreResult<()> {
        self.failure
            .map_or(Ok(()), |operation| Err(StoreError::InjectedFailure { operation }))
    }

    async fn settle<T>(self, answer: T) -> T {
        if let Some(latency) = self.latency {
            sleep(latency).await;
        }
        answer
    }
}

impl<S> ChaosCreditStoreExt for S
where
    S: CreditStore,
{
    fn with_chaos(self, config: ChaosConfig) -> ChaosCreditStore<Self> {
        ChaosCreditStore::new(self, config)
    }
}

impl<S> CreditStore for ChaosCreditStore<S>
where
    S: CreditStore,
{
    fn get_client(
        &self,
        client_id: &ClientId,
    ) -> impl Future<Output = StoreResult<Option<ClientAccount>>> + Send {
        let injection = self.inject(Operation::GetClient);
        let store = &self.store;
        async move {
            injection.admit()?;
            injection.settle(store.get_client(client_id).await).await
        }
    }

    fn put_client(&self, account: ClientAccount) -> impl Future<Output = StoreResult<()>> + Send {
        let injection = self.inject(Operation::PutClient);
        let store = &self.store;
        async move {
            injection.admit()?;
            injection.settle(store.put_client(account).await).await
        }
    }

    fn get_wallet(
        &self,
        wallet_id: WalletId,
    ) -> impl Future<Output = StoreResult<Option<Wallet>>> + Send {
        let injection = self.inject(Operation::GetWallet);
        let store = &self.store;
        async move {
            injection.admit()?;
            injection.settle(store.get_wallet(wallet_id).await).await
        }
    }

    fn wallet_for_client(
        &self,
        client_id: &ClientId,
    ) -> impl Future<Output = StoreResult<Option<Wallet>>> + Send {
        let injection = self.inject(Operation::GetWallet);
        let store = &self.store;
        async move {
            injection.admit()?;
            injection.settle(store.wallet_for_client(client_id).await).await
        }
    }

    fn list_wallets(&self) -> impl Future<Output = StoreResult<Vec<Wallet>>> + Send {
        let injection = self.inject(Operation::ListWallets);
        let store = &self.store;
        async move {
            injection.admit()?;
            injection.settle(store.list_wallets().await).await
        }
    }

    fn insert_wallet(&self, wallet: Wallet) -> impl Future<Output = StoreResult<Wallet>> + Send {
        let injection = self.inject(Operation::InsertWallet);
        let store = &self.store;
        async move {
            injection.admit()?;
            injection.settle(store.insert_wallet(wallet).await).await
        }
    }

    fn debit_wallet_if_sufficient(
        &self,
        wallet_id: WalletId,
        amount: Credits,
        now: Timestamp,
    ) -> impl Future<Output = StoreResult<Wallet>> + Send {
        let injection = self.inject(Operation::DebitWallet);
        let store = &self.store;
        async move {
            injection.admit()?;
            injection.settle(store.debit_wallet_if_sufficient(wallet_id, amount, now).await).await
        }
    }

    fn credit_wallet(
        &self,
        wallet_id: WalletId,
        amount: Credits,
        now: Timestamp,
    ) -> impl Future<Output = StoreResult<Wallet>> + Send {
        let injection = self.inject(Operation::CreditWallet);
        let store = &self.store;
        async move {
            injection.admit()?;
            injection.settle(store.credit_wallet(wallet_id, amount, now).await).await
        }
    }

    fn append_ledger_entry(
        &self,
        entry: LedgerEntry,
    ) -> impl Future<Output = StoreResult<LedgerEntry>> + Send {
        let injection = self.inject(Operation::AppendLedgerEntry);
        let store = &self.store;
        async move {
            injection.admit()?;
            injection.settle(store.append_ledger_entry(entry).await).await
        }
    }

    fn update_ledger_entry(
        &self,
        entry: LedgerEntry,
    ) -> impl Future<Output = StoreResult<()>> + Send {
        self.store.update_ledger_entry(entry)
    }

    fn delete_ledger_entry(
        &self,
        entry_id: LedgerEntryId,
    ) -> impl Future<Output = StoreResult<()>> + Send {
        self.store.delete_ledger_entry(entry_id)
    }

    fn ledger_entries_for_wallet(
        &self,
        wallet_id: WalletId,
    ) -> impl Future<Output = StoreResult<Vec<LedgerEntry>>> + Send {
        let injection = self.inject(Operation::ReadLedger);
        let store = &self.store;
        async move {
            injection.admit()?;
            injection.settle(store.ledger_entries_for_wallet(wallet_id).await).await
        }
    }

    fn list_ledger_entries(&self) -> impl Future<Output = StoreResult<Vec<LedgerEntry>>> + Send {
        let injection = self.inject(Operation::ReadLedger);
        let store = &self.store;
        async move {
            injection.admit()?;
            injection.settle(store.list_ledger_entries().await).await
        }
    }

    fn insert_task(&self, task: Task) -> impl Future<Output = StoreResult<Task>> + Send {
        let injection = self.inject(Operation::InsertTask);
        let store = &self.store;
        async move {
            injection.admit()?;
            injection.settle(store.insert_task(task).await).await
        }
    }

    fn update_task(&self, task: Task) -> impl Future<Output = StoreResult<Task>> + Send {
        let injection = self.inject(Operation::UpdateTask);
        let store = &self.store;
        async move {
            injection.admit()?;
            injection.settle(store.update_task(task).await).await
        }
    }

    fn get_task(&self, task_id: TaskId) -> impl Future<Output = StoreResult<Option<Task>>> + Send {
        let injection = self.inject(Operation::ReadTasks);
        let store = &self.store;
        async move {
            injection.admit()?;
            injection.settle(store.get_task(task_id).await).await
        }
    }

    fn list_tasks(&self) -> impl Future<Output = StoreResult<Vec<Task>>> + Send {
        let injection = self.inject(Operation::ReadTasks);
        let store = &self.store;
        async move {
            injection.admit()?;
            injection.settle(store.list_tasks().await).await
        }
    }

    fn put_template(
        &self,
        template: TaskTemplate,
    ) -> impl Future<Output = StoreResult<TaskTemplate>> + Send {
        let injection = self.inject(Operation::PutTemplate);
        let store = &self.store;
        async move {
            injection.admit()?;
            injection.settle(store.put_template(template).await).await
        }
    }

    fn get_template(
        &self,
        template_id: TemplateId,
    ) -> impl Future<Output = StoreResult<Option<TaskTemplate>>> + Send {
        let injection = self.inject(Operation::ReadTemplates);
        let store = &self.store;
        async move {
            injection.admit()?;
            injection.settle(store.get_template(template_id).await).await
        }
    }

    fn list_templates(&self) -> impl Future<Output = StoreResult<Vec<TaskTemplate>>> + Send {
        let injection = self.inject(Operation::ReadTemplates);
        let store = &self.store;
        async move {
            injection.admit()?;
            injection.settle(store.list_templates().await).await
        }
    }

    fn put_recharge_request(
        &self,
        request: RechargeRequest,
    ) -> impl Future<Output = StoreResult<RechargeRequest>> + Send {
        let injection = self.inject(Operation::PutRechargeRequest);
        let store = &self.store;
        async move {
            injection.admit()?;
            injection.settle(store.put_recharge_request(request).await).await
        }
    }

    fn get_recharge_request(
        &self,
        request_id: RechargeRequestId,
    ) -> impl Future<Output = StoreResult<Option<RechargeRequest>>> + Send {
        let injection = self.inject(Operation::ReadRechargeRequests);
        let store = &self.store;
        async move {
            injection.admit()?;
            injection.settle(store.get_recharge_request(request_id).await).await
        }
    }

    fn list_recharge_requests(
        &self,
    ) -> impl Future<Output = StoreResult<Vec<RechargeRequest>>> + Send {
        let injection = self.inject(Operation::ReadRechargeRequests);
        let store = &self.store;
        async move {
            injection.admit()?;
            injection.settle(store.list_recharge_requests().await).await
        }
    }
}
