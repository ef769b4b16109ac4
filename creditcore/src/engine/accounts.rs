//! Wallet provisioning, balance adjustments and the recharge desk.

use rust_decimal::Decimal;
use tracing::{error, info, instrument, warn};

use super::CreditEngine;
use crate::errors::{CreditError, CreditResult, EntityKind, StoreError};
use crate::ledger::{LedgerEntry, LedgerEntryKind, LedgerReference};
use crate::notification::{Notification, NotificationKind, RelatedEntity};
use crate::recharge::{RechargeRequest, RechargeStatus};
use crate::store::CreditStore;
use crate::types::{AdminId, ClientId, Credits, RechargeRequestId};
use crate::wallet::{AccountRole, ClientAccount, Wallet};

impl<S> CreditEngine<S>
where
    S: CreditStore,
{
    /// Records a client account and provisions its wallet.
    #[instrument(name = "register_client", skip(self, account), fields(client = %account.id))]
    pub async fn register_client(&self, account: ClientAccount) -> CreditResult<Wallet> {
        let client_id = account.id.clone();
        self.store.put_client(account).await?;
        self.provision_wallet(&client_id).await
    }

    /// Returns the client's wallet, creating an empty one on first use.
    ///
    /// Idempotent: a second call returns the same wallet.
    #[instrument(name = "provision_wallet", skip(self), fields(client = %client_id))]
    pub async fn provision_wallet(&self, client_id: &ClientId) -> CreditResult<Wallet> {
        let account = self
            .store
            .get_client(client_id)
            .await?
            .ok_or_else(|| CreditError::ClientNotFound(client_id.clone()))?;
        if account.role != AccountRole::Client {
            return Err(CreditError::NotAClient(client_id.clone()));
        }
        self.ensure_wallet(client_id).await
    }

    /// The client's wallet.
    pub async fn wallet_of(&self, client_id: &ClientId) -> CreditResult<Wallet> {
        self.store
            .wallet_for_client(client_id)
            .await?
            .ok_or_else(|| CreditError::EntityNotFound {
                entity: EntityKind::Wallet,
                id: client_id.to_string(),
            })
    }

    /// Applies a signed administrative adjustment and records it.
    ///
    /// A negative adjustment larger than the balance fails with
    /// `InsufficientBalance` and writes nothing.
    #[instrument(name = "adjust_balance", skip(self, reason), fields(admin = %admin, client = %client_id, amount = %amount))]
    pub async fn adjust_balance(
        &self,
        admin: &AdminId,
        client_id: &ClientId,
        amount: Decimal,
        reason: &str,
    ) -> CreditResult<LedgerEntry> {
        if amount.is_zero() {
            return Err(CreditError::ValidationFailed(
                "an adjustment must change the balance".to_string(),
            ));
        }
        let magnitude = Credits::new(amount.abs())
            .map_err(|err| CreditError::ValidationFailed(err.to_string()))?;
        let wallet = self.provision_wallet(client_id).await?;
        let _guard = self.wallet_locks.acquire(wallet.id).await;

        let now = self.now();
        if amount.is_sign_negative() {
            self.store
                .debit_wallet_if_sufficient(wallet.id, magnitude, now)
                .await?;
        } else {
            self.store.credit_wallet(wallet.id, magnitude, now).await?;
        }

        let entry = self
            .ledger()
            .append(
                wallet.id,
                LedgerEntryKind::AdminAdjustment,
                amount,
                None,
                format!("adjustment by {admin}: {reason}"),
                now,
            )
            .await
            .inspect_err(|err| {
                error!(wallet = %wallet.id, error = %err, "ledger append failed after adjustment");
            })?;

        info!(entry = %entry.id, "balance adjusted");
        self.notify(Notification {
            recipient_id: client_id.clone(),
            kind: NotificationKind::BalanceAdjusted,
            title: "Balance adjusted".to_string(),
            message: format!("Your balance changed by {amount}: {reason}"),
            related_entity: Some(RelatedEntity::Wallet(wallet.id)),
        });
        Ok(entry)
    }

    /// Files a recharge request for review.
    #[instrument(name = "submit_recharge", skip(self), fields(client = %client_id, amount = %amount))]
    pub async fn submit_recharge(
        &self,
        client_id: &ClientId,
        amount: Credits,
    ) -> CreditResult<RechargeRequest> {
        self.require_client(client_id).await?;
        let request = RechargeRequest::submit(client_id.clone(), amount, self.now())?;
        let stored = self.store.put_recharge_request(request).await?;
        info!(request = %stored.id, "recharge requested");
        Ok(stored)
    }

    /// Approves a pending request, credits the wallet and records exactly one
    /// `recharge-approved` entry.
    #[instrument(name = "approve_recharge", skip(self, note), fields(admin = %admin, request = %request_id))]
    pub async fn approve_recharge(
        &self,
        admin: &AdminId,
        request_id: RechargeRequestId,
        note: Option<String>,
    ) -> CreditResult<RechargeRequest> {
        let pending = self.recharge_request(request_id).await?;
        let wallet = self.provision_wallet(&pending.client_id).await?;
        let _guard = self.wallet_locks.acquire(wallet.id).await;

        // Re-read under the lock so two approvals cannot both pass the check.
        let pending = self.recharge_request(request_id).await?;
        let now = self.now();
        let approved = pending.reviewed(RechargeStatus::Approved, admin.clone(), note, now)?;

        let approved = self.store.put_recharge_request(approved).await?;
        if let Err(err) = self
            .store
            .credit_wallet(wallet.id, approved.amount, now)
            .await
        {
            self.restore_request(pending).await;
            return Err(err.into());
        }

        self.ledger()
            .append(
                wallet.id,
                LedgerEntryKind::RechargeApproved,
                approved.amount.amount(),
                Some(LedgerReference::RechargeRequest(approved.id)),
                format!("recharge approved by {admin}"),
                now,
            )
            .await
            .inspect_err(|err| {
                error!(wallet = %wallet.id, error = %err, "ledger append failed after recharge credit");
            })?;

        info!(amount = %approved.amount, "recharge approved");
        self.notify(Notification {
            recipient_id: approved.client_id.clone(),
            kind: NotificationKind::RechargeApproved,
            title: "Recharge approved".to_string(),
            message: format!("{} credits were added to your wallet", approved.amount),
            related_entity: Some(RelatedEntity::RechargeRequest(approved.id)),
        });
        Ok(approved)
    }

    /// Rejects a pending request. Balances are untouched.
    #[instrument(name = "reject_recharge", skip(self, note), fields(admin = %admin, request = %request_id))]
    pub async fn reject_recharge(
        &self,
        admin: &AdminId,
        request_id: RechargeRequestId,
        note: Option<String>,
    ) -> CreditResult<RechargeRequest> {
        let pending = self.recharge_request(request_id).await?;
        let wallet = self.provision_wallet(&pending.client_id).await?;
        let _guard = self.wallet_locks.acquire(wallet.id).await;

        // Reviews of one client's requests are serialized with approvals.
        let pending = self.recharge_request(request_id).await?;
        let rejected = pending.reviewed(RechargeStatus::Rejected, admin.clone(), note, self.now())?;
        let rejected = self.store.put_recharge_request(rejected).await?;

        info!("recharge rejected");
        self.notify(Notification {
            recipient_id: rejected.client_id.clone(),
            kind: NotificationKind::RechargeRejected,
            title: "Recharge rejected".to_string(),
            message: rejected
                .note
                .clone()
                .unwrap_or_else(|| "Your recharge request was rejected".to_string()),
            related_entity: Some(RelatedEntity::RechargeRequest(rejected.id)),
        });
        Ok(rejected)
    }

    /// Reads a recharge request.
    pub async fn recharge_request(
        &self,
        request_id: RechargeRequestId,
    ) -> CreditResult<RechargeRequest> {
        self.store
            .get_recharge_request(request_id)
            .await?
            .ok_or_else(|| CreditError::EntityNotFound {
                entity: EntityKind::RechargeRequest,
                id: request_id.to_string(),
            })
    }

    /// The client's wallet, created on first use. Does not check the account.
    pub(super) async fn ensure_wallet(&self, client_id: &ClientId) -> CreditResult<Wallet> {
        if let Some(wallet) = self.store.wallet_for_client(client_id).await? {
            return Ok(wallet);
        }

        match self
            .store
            .insert_wallet(Wallet::open(client_id.clone(), self.now()))
            .await
        {
            Ok(wallet) => {
                info!(wallet = %wallet.id, client = %client_id, "wallet provisioned");
                Ok(wallet)
            }
            // Lost a provisioning race; the other wallet is the one to use.
            Err(StoreError::Conflict(_)) => self.wallet_of(client_id).await,
            Err(err) => Err(err.into()),
        }
    }

    async fn restore_request(&self, pending: RechargeRequest) {
        let request = pending.id;
        if let Err(err) = self.store.put_recharge_request(pending).await {
            error!(%request, error = %err, "could not restore recharge request after failed credit");
        } else {
            warn!(%request, "recharge approval rolled back");
        }
    }
}
