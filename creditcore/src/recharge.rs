//! Client recharge requests.

use serde::{Deserialize, Serialize};

use crate::errors::{CreditError, CreditResult};
use crate::types::{AdminId, ClientId, Credits, RechargeRequestId, Timestamp};

/// Review state of a recharge request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RechargeStatus {
    /// Waiting for review.
    Pending,
    /// Approved; the wallet was credited. Terminal.
    Approved,
    /// Rejected. Terminal.
    Rejected,
}

impl RechargeStatus {
    /// Returns true once the request has been reviewed.
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for RechargeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        })
    }
}

/// A client's request to add credits.
///
/// `reviewed_by` is set exactly when the status is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RechargeRequest {
    /// Request identifier
    pub id: RechargeRequestId,
    /// Requesting client
    pub client_id: ClientId,
    /// Requested amount
    pub amount: Credits,
    /// Review state
    pub status: RechargeStatus,
    /// Reviewing administrator
    pub reviewed_by: Option<AdminId>,
    /// Review time
    pub reviewed_at: Option<Timestamp>,
    /// Reviewer's note
    pub note: Option<String>,
    /// Submission time
    pub created_at: Timestamp,
}

impl RechargeRequest {
    /// A new pending request.
    pub fn submit(client_id: ClientId, amount: Credits, now: Timestamp) -> CreditResult<Self> {
        if amount.is_zero() {
            return Err(CreditError::ValidationFailed(
                "recharge amount must be positive".to_string(),
            ));
        }
        Ok(Self {
            id: RechargeRequestId::new(),
            client_id,
            amount,
            status: RechargeStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            note: None,
            created_at: now,
        })
    }

    /// Returns a copy moved to a terminal status.
    pub fn reviewed(
        &self,
        outcome: RechargeStatus,
        reviewer: AdminId,
        note: Option<String>,
        now: Timestamp,
    ) -> CreditResult<Self> {
        if self.status.is_terminal() {
            return Err(CreditError::NotEligible(format!(
                "recharge request '{}' was already {}",
                self.id, self.status
            )));
        }
        if !outcome.is_terminal() {
            return Err(CreditError::ValidationFailed(
                "a review must approve or reject".to_string(),
            ));
        }
        Ok(Self {
            status: outcome,
            reviewed_by: Some(reviewer),
            reviewed_at: Some(now),
            note,
            ..self.clone()
        })
    }

    /// Returns true if `reviewed_by` agrees with the status.
    pub const fn review_fields_consistent(&self) -> bool {
        self.status.is_terminal() == self.reviewed_by.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RechargeRequest {
        RechargeRequest::submit(
            ClientId::try_new("client-1").unwrap(),
            Credits::whole(500),
            Timestamp::now(),
        )
        .unwrap()
    }

    #[test]
    fn zero_amount_is_rejected() {
        let result = RechargeRequest::submit(
            ClientId::try_new("client-1").unwrap(),
            Credits::zero(),
            Timestamp::now(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn review_sets_reviewer_and_status_together() {
        let admin = AdminId::try_new("admin-1").unwrap();
        let pending = request();
        assert!(pending.review_fields_consistent());

        let approved = pending
            .reviewed(RechargeStatus::Approved, admin, None, Timestamp::now())
            .unwrap();
        assert_eq!(approved.status, RechargeStatus::Approved);
        assert!(approved.reviewed_by.is_some());
        assert!(approved.review_fields_consistent());
    }

    #[test]
    fn terminal_requests_cannot_be_reviewed_again() {
        let admin = AdminId::try_new("admin-1").unwrap();
        let rejected = request()
            .reviewed(RechargeStatus::Rejected, admin.clone(), None, Timestamp::now())
            .unwrap();

        let again = rejected.reviewed(RechargeStatus::Approved, admin, None, Timestamp::now());
        assert!(matches!(again, Err(CreditError::NotEligible(_))));
    }

    #[test]
    fn reviewer_without_terminal_status_is_inconsistent() {
        let mut broken = request();
        broken.reviewed_by = Some(AdminId::try_new("admin-1").unwrap());
        assert!(!broken.review_fields_consistent());
    }
}
