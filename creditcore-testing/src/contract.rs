//! Behavioral contract every [`CreditStore`] adapter must satisfy.
//!
//! Adapters run the whole suite with [`credit_store_contract_tests!`]:
//!
//! ```ignore
//! creditcore_testing::credit_store_contract_tests! {
//!     suite = in_memory,
//!     make_store = creditcore_memory::InMemoryCreditStore::new,
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use creditcore::{
    ClientAccount, ClientId, CreditStore, Credits, LedgerEntry, LedgerEntryId, LedgerEntryKind,
    StoreError, TaskId, TemplateKind, Timestamp, Wallet,
};
use rust_decimal::Decimal;

use crate::fixtures::task_template;

/// A contract scenario that did not hold.
#[derive(Debug)]
pub struct ContractTestFailure {
    scenario: &'static str,
    detail: String,
}

impl ContractTestFailure {
    fn new(scenario: &'static str, detail: impl Into<String>) -> Self {
        Self {
            scenario,
            detail: detail.into(),
        }
    }

    fn store_error(scenario: &'static str, operation: &'static str, error: &StoreError) -> Self {
        Self::new(
            scenario,
            format!("{operation} operation returned unexpected error: {error}"),
        )
    }
}

impl fmt::Display for ContractTestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.scenario, self.detail)
    }
}

impl std::error::Error for ContractTestFailure {}

/// Outcome of one contract scenario.
pub type ContractTestResult = Result<(), ContractTestFailure>;

async fn funded_wallet<S>(
    scenario: &'static str,
    store: &S,
    client: &str,
    balance: u64,
) -> Result<Wallet, ContractTestFailure>
where
    S: CreditStore,
{
    let now = Timestamp::now();
    let client_id = ClientId::try_new(client)
        .map_err(|err| ContractTestFailure::new(scenario, format!("bad client id: {err}")))?;
    store
        .put_client(ClientAccount::client(client_id.clone(), client))
        .await
        .map_err(|err| ContractTestFailure::store_error(scenario, "put_client", &err))?;
    let wallet = store
        .insert_wallet(Wallet::open(client_id, now))
        .await
        .map_err(|err| ContractTestFailure::store_error(scenario, "insert_wallet", &err))?;
    if balance == 0 {
        return Ok(wallet);
    }
    store
        .credit_wallet(wallet.id, Credits::whole(balance), now)
        .await
        .map_err(|err| ContractTestFailure::store_error(scenario, "credit_wallet", &err))
}

fn ledger_entry(wallet: &Wallet, amount: i64) -> LedgerEntry {
    LedgerEntry {
        id: LedgerEntryId::new(),
        wallet_id: wallet.id,
        kind: LedgerEntryKind::AdminAdjustment,
        amount: Decimal::from(amount),
        reference_id: None,
        description: "contract entry".to_string(),
        created_at: Timestamp::now(),
    }
}

/// A client owns at most one wallet.
pub async fn test_wallet_uniqueness<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S + Send + Sync + Clone + 'static,
    S: CreditStore + 'static,
{
    const SCENARIO: &str = "wallet_uniqueness";

    let store = make_store();
    let wallet = funded_wallet(SCENARIO, &store, "unique-client", 0).await?;

    match store
        .insert_wallet(Wallet::open(wallet.client_id.clone(), Timestamp::now()))
        .await
    {
        Err(StoreError::Conflict(_)) => {}
        Ok(second) => {
            return Err(ContractTestFailure::new(
                SCENARIO,
                format!("second wallet {} was created for the same client", second.id),
            ));
        }
        Err(other) => {
            return Err(ContractTestFailure::store_error(
                SCENARIO,
                "insert_wallet",
                &other,
            ));
        }
    }

    let found = store
        .wallet_for_client(&wallet.client_id)
        .await
        .map_err(|err| ContractTestFailure::store_error(SCENARIO, "wallet_for_client", &err))?;
    if found.as_ref().map(|w| w.id) != Some(wallet.id) {
        return Err(ContractTestFailure::new(
            SCENARIO,
            format!("expected wallet {}, found {found:?}", wallet.id),
        ));
    }
    Ok(())
}

/// A short debit fails and leaves the balance untouched.
pub async fn test_conditional_debit<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S + Send + Sync + Clone + 'static,
    S: CreditStore + 'static,
{
    const SCENARIO: &str = "conditional_debit";

    let store = make_store();
    let wallet = funded_wallet(SCENARIO, &store, "debit-client", 50).await?;
    let now = Timestamp::now();

    match store
        .debit_wallet_if_sufficient(wallet.id, Credits::whole(80), now)
        .await
    {
        Err(StoreError::InsufficientFunds { .. }) => {}
        Ok(after) => {
            return Err(ContractTestFailure::new(
                SCENARIO,
                format!("short debit succeeded, balance is now {}", after.balance),
            ));
        }
        Err(other) => {
            return Err(ContractTestFailure::store_error(
                SCENARIO,
                "debit_wallet_if_sufficient",
                &other,
            ));
        }
    }

    let after = store
        .debit_wallet_if_sufficient(wallet.id, Credits::whole(50), now)
        .await
        .map_err(|err| {
            ContractTestFailure::store_error(SCENARIO, "debit_wallet_if_sufficient", &err)
        })?;
    if !after.balance.is_zero() {
        return Err(ContractTestFailure::new(
            SCENARIO,
            format!("expected an empty wallet, balance is {}", after.balance),
        ));
    }
    Ok(())
}

/// Ledger entries can be appended but never changed or removed.
pub async fn test_ledger_immutability<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S + Send + Sync + Clone + 'static,
    S: CreditStore + 'static,
{
    const SCENARIO: &str = "ledger_immutability";

    let store = make_store();
    let wallet = funded_wallet(SCENARIO, &store, "ledger-client", 0).await?;
    let entry = store
        .append_ledger_entry(ledger_entry(&wallet, 25))
        .await
        .map_err(|err| ContractTestFailure::store_error(SCENARIO, "append_ledger_entry", &err))?;

    let mut edited = entry.clone();
    edited.amount = Decimal::from(2_500);
    if !matches!(
        store.update_ledger_entry(edited).await,
        Err(StoreError::ImmutableRecord(_))
    ) {
        return Err(ContractTestFailure::new(
            SCENARIO,
            "update of an existing entry was not refused as immutable",
        ));
    }
    if !matches!(
        store.delete_ledger_entry(entry.id).await,
        Err(StoreError::ImmutableRecord(_))
    ) {
        return Err(ContractTestFailure::new(
            SCENARIO,
            "delete of an existing entry was not refused as immutable",
        ));
    }

    let entries = store
        .ledger_entries_for_wallet(wallet.id)
        .await
        .map_err(|err| ContractTestFailure::store_error(SCENARIO, "ledger_entries_for_wallet", &err))?;
    if entries != vec![entry] {
        return Err(ContractTestFailure::new(
            SCENARIO,
            format!("stored entries changed: {entries:?}"),
        ));
    }
    Ok(())
}

/// Per-wallet ledger reads only return that wallet's entries, oldest first.
pub async fn test_ledger_filters_by_wallet<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S + Send + Sync + Clone + 'static,
    S: CreditStore + 'static,
{
    const SCENARIO: &str = "ledger_filters_by_wallet";

    let store = make_store();
    let first = funded_wallet(SCENARIO, &store, "first-client", 0).await?;
    let second = funded_wallet(SCENARIO, &store, "second-client", 0).await?;

    let mut expected = Vec::new();
    for amount in [10, -4, 7] {
        let entry = store
            .append_ledger_entry(ledger_entry(&first, amount))
            .await
            .map_err(|err| {
                ContractTestFailure::store_error(SCENARIO, "append_ledger_entry", &err)
            })?;
        expected.push(entry.id);
        let _other = store
            .append_ledger_entry(ledger_entry(&second, amount * 100))
            .await
            .map_err(|err| {
                ContractTestFailure::store_error(SCENARIO, "append_ledger_entry", &err)
            })?;
    }

    let found: Vec<LedgerEntryId> = store
        .ledger_entries_for_wallet(first.id)
        .await
        .map_err(|err| ContractTestFailure::store_error(SCENARIO, "ledger_entries_for_wallet", &err))?
        .into_iter()
        .map(|entry| entry.id)
        .collect();
    if found != expected {
        return Err(ContractTestFailure::new(
            SCENARIO,
            format!("expected {expected:?}, found {found:?}"),
        ));
    }

    let total = store
        .list_ledger_entries()
        .await
        .map_err(|err| ContractTestFailure::store_error(SCENARIO, "list_ledger_entries", &err))?
        .len();
    if total != 6 {
        return Err(ContractTestFailure::new(
            SCENARIO,
            format!("expected 6 entries in total, found {total}"),
        ));
    }
    Ok(())
}

/// Tasks are created once, replaced by update and read back intact.
pub async fn test_task_round_trip<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S + Send + Sync + Clone + 'static,
    S: CreditStore + 'static,
{
    const SCENARIO: &str = "task_round_trip";

    let store = make_store();
    let client = ClientId::try_new("task-client")
        .map_err(|err| ContractTestFailure::new(SCENARIO, format!("bad client id: {err}")))?;
    let template = task_template(TemplateKind::Task, 40);
    let task = template
        .instantiate(client, Credits::whole(40), Timestamp::now())
        .map_err(|err| ContractTestFailure::new(SCENARIO, err.to_string()))?;

    let stored = store
        .insert_task(task.clone())
        .await
        .map_err(|err| ContractTestFailure::store_error(SCENARIO, "insert_task", &err))?;
    if stored != task {
        return Err(ContractTestFailure::new(SCENARIO, "insert_task altered the task"));
    }
    if !matches!(
        store.insert_task(task.clone()).await,
        Err(StoreError::Conflict(_))
    ) {
        return Err(ContractTestFailure::new(
            SCENARIO,
            "inserting the same task twice was not a conflict",
        ));
    }

    let mut edited = task.clone();
    edited.title = "Edited title".to_string();
    let _updated = store
        .update_task(edited.clone())
        .await
        .map_err(|err| ContractTestFailure::store_error(SCENARIO, "update_task", &err))?;
    let read = store
        .get_task(task.id)
        .await
        .map_err(|err| ContractTestFailure::store_error(SCENARIO, "get_task", &err))?;
    if read != Some(edited) {
        return Err(ContractTestFailure::new(
            SCENARIO,
            format!("expected the edited task, read {read:?}"),
        ));
    }

    let mut unknown = task;
    unknown.id = TaskId::new();
    if !matches!(
        store.update_task(unknown).await,
        Err(StoreError::NotFound { .. })
    ) {
        return Err(ContractTestFailure::new(
            SCENARIO,
            "updating an unknown task was not NotFound",
        ));
    }
    Ok(())
}

/// Concurrent debits against one wallet never drive it below zero.
pub async fn test_concurrent_debits_never_overdraw<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S + Send + Sync + Clone + 'static,
    S: CreditStore + 'static,
{
    const SCENARIO: &str = "concurrent_debits_never_overdraw";

    let store = Arc::new(make_store());
    let wallet_id = funded_wallet(SCENARIO, store.as_ref(), "racing-client", 100)
        .await?
        .id;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .debit_wallet_if_sufficient(wallet_id, Credits::whole(30), Timestamp::now())
                    .await
            })
        })
        .collect();

    let mut succeeded = 0_u64;
    for handle in handles {
        match handle.await {
            Ok(Ok(_)) => succeeded += 1,
            Ok(Err(StoreError::InsufficientFunds { .. })) => {}
            Ok(Err(other)) => {
                return Err(ContractTestFailure::store_error(
                    SCENARIO,
                    "debit_wallet_if_sufficient",
                    &other,
                ));
            }
            Err(join) => {
                return Err(ContractTestFailure::new(
                    SCENARIO,
                    format!("debit task panicked: {join}"),
                ));
            }
        }
    }

    let balance = store
        .get_wallet(wallet_id)
        .await
        .map_err(|err| ContractTestFailure::store_error(SCENARIO, "get_wallet", &err))?
        .map(|w| w.balance);
    if succeeded != 3 || balance != Some(Credits::whole(10)) {
        return Err(ContractTestFailure::new(
            SCENARIO,
            format!("expected 3 debits leaving 10, got {succeeded} leaving {balance:?}"),
        ));
    }
    Ok(())
}

/// Generates one `#[tokio::test]` per contract scenario for an adapter.
#[macro_export]
macro_rules! credit_store_contract_tests {
    (suite = $suite:ident, make_store = $make_store:expr $(,)?) => {
        mod $suite {
            use $crate::contract::{
                test_concurrent_debits_never_overdraw, test_conditional_debit,
                test_ledger_filters_by_wallet, test_ledger_immutability, test_task_round_trip,
                test_wallet_uniqueness,
            };

            #[tokio::test(flavor = "multi_thread")]
            async fn wallet_uniqueness_contract() {
                test_wallet_uniqueness($make_store)
                    .await
                    .expect("credit store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn conditional_debit_contract() {
                test_conditional_debit($make_store)
                    .await
                    .expect("credit store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn ledger_immutability_contract() {
                test_ledger_immutability($make_store)
                    .await
                    .expect("credit store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn ledger_filters_by_wallet_contract() {
                test_ledger_filters_by_wallet($make_store)
                    .await
                    .expect("credit store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn task_round_trip_contract() {
                test_task_round_trip($make_store)
                    .await
                    .expect("credit store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn concurrent_debits_never_overdraw_contract() {
                test_concurrent_debits_never_overdraw($make_store)
                    .await
                    .expect("credit store contract failed");
            }
        }
    };
}

pub use credit_store_contract_tests;
