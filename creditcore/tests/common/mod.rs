//! Engine wiring shared by the integration suites.

use std::sync::Arc;

use creditcore::{CreditConfig, CreditEngine, FixedClock, Timestamp};
use creditcore_memory::InMemoryCreditStore;
use creditcore_testing::fixtures::CollectingNotificationSink;
use creditcore_testing::{ChaosConfig, ChaosCreditStore, ChaosCreditStoreExt};

/// An engine over a shared in-memory store, a frozen clock and a collecting sink.
pub struct Harness {
    pub engine: CreditEngine<InMemoryCreditStore>,
    pub memory: InMemoryCreditStore,
    pub clock: FixedClock,
    pub sink: CollectingNotificationSink,
}

impl Harness {
    pub async fn boot(config: CreditConfig) -> Self {
        init_tracing();
        let memory = InMemoryCreditStore::new();
        let clock = FixedClock::new(Timestamp::now());
        let sink = CollectingNotificationSink::new();
        let engine = CreditEngine::builder(memory.clone())
            .with_clock(Arc::new(clock.clone()))
            .with_notifier(Arc::new(sink.clone()))
            .with_config(config)
            .boot()
            .await
            .expect("an empty store should boot");

        Self {
            engine,
            memory,
            clock,
            sink,
        }
    }

    pub fn now(&self) -> Timestamp {
        creditcore::Clock::now(&self.clock)
    }
}

/// An engine over an in-memory store whose answers are delayed per `chaos`.
pub async fn slow_engine(chaos: ChaosConfig) -> CreditEngine<ChaosCreditStore<InMemoryCreditStore>> {
    init_tracing();
    CreditEngine::builder(InMemoryCreditStore::new().with_chaos(chaos))
        .with_config(CreditConfig::default().without_notifications())
        .boot()
        .await
        .expect("an empty store should boot")
}

/// Routes engine logs to the test writer; `RUST_LOG=creditcore=debug` shows them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
