//! Test support for `CreditCore`: the store contract suite, a failure-injecting
//! store wrapper, and shared fixtures.

#![forbid(unsafe_code)]
#![deny(
    bad_style,
    clippy::allow_attributes,
    meta_variable_misuse,
    rust_2018_idioms,
    unused_imports,
    unused_must_use,
    unused_mut,
    unused_variables
)]

pub mod chaos;
pub mod contract;
pub mod fixtures;

pub use chaos::{ChaosConfig, ChaosCreditStore, ChaosCreditStoreExt, Probability};
pub use contract::{ContractTestFailure, ContractTestResult};
pub use fixtures::{
    admin_id, client_id, seed_client, task_template, CollectingNotificationSink,
    FailingNotificationSink, StalledNotificationSink,
};
