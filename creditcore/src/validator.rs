//! Consistency validator.
//!
//! Recomputes every cross-record invariant from stored data and reports each
//! breach. The pass is read-only, so running it twice without intervening
//! writes yields the same report.

use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;

use crate::errors::{CreditError, CreditResult};
use crate::ledger::{LedgerEntry, LedgerEntryKind, LedgerReference};
use crate::recharge::{RechargeRequest, RechargeStatus};
use crate::store::CreditStore;
use crate::task::{Task, TaskStatus};
use crate::template::TaskTemplate;
use crate::types::{ClientId, Credits, LedgerEntryId, RechargeRequestId, TaskId, TemplateId, WalletId};
use crate::wallet::Wallet;

/// One broken invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Stored balance differs from the ledger sum.
    BalanceMismatch {
        /// Wallet
        wallet: WalletId,
        /// Stored balance
        stored: Credits,
        /// Sum of ledger amounts
        ledger_sum: Decimal,
    },
    /// A client owns more than one wallet.
    DuplicateWallet {
        /// Owning client
        client: ClientId,
    },
    /// A ledger entry names a wallet that does not exist.
    OrphanLedgerEntry {
        /// Entry
        entry: LedgerEntryId,
        /// Missing wallet
        wallet: WalletId,
    },
    /// A ledger entry references a record that does not exist.
    DanglingReference {
        /// Entry
        entry: LedgerEntryId,
        /// Missing record
        reference: LedgerReference,
    },
    /// `reviewedBy` disagrees with the recharge status.
    RechargeReviewMismatch {
        /// Request
        request: RechargeRequestId,
        /// Stored status
        status: RechargeStatus,
    },
    /// The ledger entries for a recharge request do not match its status.
    RechargeLedgerMismatch {
        /// Request
        request: RechargeRequestId,
        /// What was found
        detail: String,
    },
    /// A task breaks the plan/task shape rules.
    TaskShape {
        /// Task
        task: TaskId,
        /// Rule that failed
        detail: String,
    },
    /// The ledger entries for a charged task do not match its charge.
    TaskChargeMismatch {
        /// Task
        task: TaskId,
        /// What was found
        detail: String,
    },
    /// A template is unusable.
    InvalidTemplate {
        /// Template
        template: TemplateId,
        /// Rule that failed
        detail: String,
    },
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BalanceMismatch {
                wallet,
                stored,
                ledger_sum,
            } => write!(
                f,
                "wallet '{wallet}' holds {stored} but its ledger sums to {ledger_sum}"
            ),
            Self::DuplicateWallet { client } => {
                write!(f, "client '{client}' owns more than one wallet")
            }
            Self::OrphanLedgerEntry { entry, wallet } => {
                write!(f, "ledger entry '{entry}' names missing wallet '{wallet}'")
            }
            Self::DanglingReference { entry, reference } => {
                write!(f, "ledger entry '{entry}' references missing {reference:?}")
            }
            Self::RechargeReviewMismatch { request, status } => write!(
                f,
                "recharge request '{request}' is {status} but its reviewer does not match"
            ),
            Self::RechargeLedgerMismatch { request, detail } => {
                write!(f, "recharge request '{request}': {detail}")
            }
            Self::TaskShape { task, detail } => write!(f, "task '{task}': {detail}"),
            Self::TaskChargeMismatch { task, detail } => {
                write!(f, "task '{task}' charge: {detail}")
            }
            Self::InvalidTemplate { template, detail } => {
                write!(f, "template '{template}': {detail}")
            }
        }
    }
}

/// All violations found by one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    violations: Vec<Violation>,
}

impl ValidationReport {
    /// Returns true if no invariant is broken.
    pub fn is_consistent(&self) -> bool {
        self.violations.is_empty()
    }

    /// Violations in discovery order.
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    fn push(&mut self, violation: Violation) {
        self.violations.push(violation);
    }
}

impl std::fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.violations.is_empty() {
            return f.write_str("no violations");
        }
        write!(f, "{} violation(s)", self.violations.len())?;
        for violation in &self.violations {
            write!(f, "; {violation}")?;
        }
        Ok(())
    }
}

/// Read-only pass over a [`CreditStore`].
pub struct ConsistencyValidator<'a, S> {
    store: &'a S,
}

impl<'a, S> ConsistencyValidator<'a, S>
where
    S: CreditStore,
{
    /// Wraps a store.
    pub const fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Checks every wallet, ledger entry, recharge request, task and template.
    #[tracing::instrument(name = "consistency_validation", skip(self))]
    pub async fn run(&self) -> CreditResult<ValidationReport> {
        let wallets = self.store.list_wallets().await?;
        let entries = self.store.list_ledger_entries().await?;
        let requests = self.store.list_recharge_requests().await?;
        let tasks = self.store.list_tasks().await?;
        let templates = self.store.list_templates().await?;

        let mut report = ValidationReport::default();
        check_wallets(&wallets, &entries, &mut report);
        check_references(&entries, &requests, &tasks, &mut report);
        check_recharge_requests(&requests, &entries, &mut report);
        check_tasks(&tasks, &entries, &mut report);
        check_templates(&templates, &mut report);

        if report.is_consistent() {
            tracing::info!(
                wallets = wallets.len(),
                entries = entries.len(),
                tasks = tasks.len(),
                "consistency validation passed"
            );
        } else {
            tracing::error!(
                violations = report.violations.len(),
                report = %report,
                "consistency validation failed"
            );
        }
        Ok(report)
    }

    /// Runs the pass and turns any violation into [`CreditError::ConsistencyViolation`].
    pub async fn ensure_consistent(&self) -> CreditResult<()> {
        let report = self.run().await?;
        if report.is_consistent() {
            Ok(())
        } else {
            Err(CreditError::ConsistencyViolation(report))
        }
    }
}

fn references_by_target(entries: &[LedgerEntry]) -> HashMap<LedgerReference, Vec<&LedgerEntry>> {
    let mut map: HashMap<LedgerReference, Vec<&LedgerEntry>> = HashMap::new();
    for entry in entries {
        if let Some(reference) = entry.reference_id {
            map.entry(reference).or_default().push(entry);
        }
    }
    map
}

fn check_wallets(wallets: &[Wallet], entries: &[LedgerEntry], report: &mut ValidationReport) {
    let mut sums: HashMap<WalletId, Decimal> = HashMap::new();
    for entry in entries {
        *sums.entry(entry.wallet_id).or_default() += entry.amount;
    }

    let mut owners = HashSet::new();
    for wallet in wallets {
        if !owners.insert(wallet.client_id.clone()) {
            report.push(Violation::DuplicateWallet {
                client: wallet.client_id.clone(),
            });
        }
        let ledger_sum = sums.get(&wallet.id).copied().unwrap_or_default();
        if ledger_sum != wallet.balance.amount() {
            report.push(Violation::BalanceMismatch {
                wallet: wallet.id,
                stored: wallet.balance,
                ledger_sum,
            });
        }
    }

    let known: HashSet<WalletId> = wallets.iter().map(|wallet| wallet.id).collect();
    for entry in entries {
        if !known.contains(&entry.wallet_id) {
            report.push(Violation::OrphanLedgerEntry {
                entry: entry.id,
                wallet: entry.wallet_id,
            });
        }
    }
}

fn check_references(
    entries: &[LedgerEntry],
    requests: &[RechargeRequest],
    tasks: &[Task],
    report: &mut ValidationReport,
) {
    let task_ids: HashSet<TaskId> = tasks.iter().map(|task| task.id).collect();
    let request_ids: HashSet<RechargeRequestId> =
        requests.iter().map(|request| request.id).collect();

    for entry in entries {
        let exists = match entry.reference_id {
            None => true,
            Some(LedgerReference::Task(id)) => task_ids.contains(&id),
            Some(LedgerReference::RechargeRequest(id)) => request_ids.contains(&id),
        };
        if let (false, Some(reference)) = (exists, entry.reference_id) {
            report.push(Violation::DanglingReference {
                entry: entry.id,
                reference,
            });
        }
    }
}

fn check_recharge_requests(
    requests: &[RechargeRequest],
    entries: &[LedgerEntry],
    report: &mut ValidationReport,
) {
    let by_target = references_by_target(entries);

    for request in requests {
        if !request.review_fields_consistent() {
            report.push(Violation::RechargeReviewMismatch {
                request: request.id,
                status: request.status,
            });
        }

        let referencing = by_target
            .get(&LedgerReference::RechargeRequest(request.id))
            .map_or(&[][..], Vec::as_slice);

        let detail = if request.status == RechargeStatus::Approved {
            match referencing {
                [entry] if entry.kind != LedgerEntryKind::RechargeApproved => Some(format!(
                    "approval entry has kind {} instead of recharge-approved",
                    entry.kind
                )),
                [entry] if entry.amount != request.amount.amount() => Some(format!(
                    "approval entry credits {} but the request was for {}",
                    entry.amount, request.amount
                )),
                [_] => None,
                others => Some(format!(
                    "approved request has {} ledger entries, expected exactly one",
                    others.len()
                )),
            }
        } else if referencing.is_empty() {
            None
        } else {
            Some(format!(
                "{} request has {} ledger entries, expected none",
                request.status,
                referencing.len()
            ))
        };

        if let Some(detail) = detail {
            report.push(Violation::RechargeLedgerMismatch {
                request: request.id,
                detail,
            });
        }
    }
}

fn check_tasks(tasks: &[Task], entries: &[LedgerEntry], report: &mut ValidationReport) {
    let by_target = references_by_target(entries);

    for task in tasks {
        if task.is_listing != (task.status == TaskStatus::Listed) {
            report.push(Violation::TaskShape {
                task: task.id,
                detail: format!(
                    "status {} does not match listing flag {}",
                    task.status, task.is_listing
                ),
            });
        }
        if let Err(detail) = task.check_shape() {
            report.push(Violation::TaskShape {
                task: task.id,
                detail,
            });
        }

        let referencing = by_target
            .get(&LedgerReference::Task(task.id))
            .map_or(&[][..], Vec::as_slice);

        let detail = match (task.is_client_bound(), task.origin.charge_kind()) {
            (true, Some(kind)) => match referencing {
                [entry] if entry.kind != kind => Some(format!(
                    "entry has kind {} but the task origin expects {kind}",
                    entry.kind
                )),
                [entry] if entry.amount != task.credits_used.as_debit() => Some(format!(
                    "entry amount {} does not match charge {}",
                    entry.amount, task.credits_used
                )),
                [_] => None,
                others => Some(format!(
                    "found {} ledger entries, expected exactly one",
                    others.len()
                )),
            },
            _ if referencing.is_empty() => None,
            _ => Some(format!(
                "uncharged record has {} ledger entries",
                referencing.len()
            )),
        };

        if let Some(detail) = detail {
            report.push(Violation::TaskChargeMismatch {
                task: task.id,
                detail,
            });
        }
    }
}

fn check_templates(templates: &[TaskTemplate], report: &mut ValidationReport) {
    for template in templates {
        if let Err(err) = template.validate() {
            report.push(Violation::InvalidTemplate {
                template: template.id,
                detail: err.to_string(),
            });
        }
    }
}
