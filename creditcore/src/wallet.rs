//! Client accounts and wallets.

use serde::{Deserialize, Serialize};

use crate::types::{ClientId, Credits, Timestamp, WalletId};

/// Role of an account as known to the identity layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountRole {
    /// A paying client.
    Client,
    /// A platform administrator.
    Admin,
}

/// The slice of an account record the engine needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientAccount {
    /// Account identifier
    pub id: ClientId,
    /// Display name, used in notifications
    pub name: String,
    /// Account role
    pub role: AccountRole,
    /// Whether the account may transact
    pub active: bool,
}

impl ClientAccount {
    /// An active client account.
    pub fn client(id: ClientId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            role: AccountRole::Client,
            active: true,
        }
    }

    /// Returns true if the account can be charged.
    pub fn can_transact(&self) -> bool {
        self.active && self.role == AccountRole::Client
    }
}

/// A client's spendable balance.
///
/// The balance must always equal the sum of the wallet's ledger entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    /// Wallet identifier
    pub id: WalletId,
    /// Owning client; unique across wallets
    pub client_id: ClientId,
    /// Current balance
    pub balance: Credits,
    /// When the wallet was provisioned
    pub created_at: Timestamp,
    /// When the balance last changed
    pub updated_at: Timestamp,
}

impl Wallet {
    /// A fresh, empty wallet for the client.
    pub fn open(client_id: ClientId, now: Timestamp) -> Self {
        Self {
            id: WalletId::new(),
            client_id,
            balance: Credits::zero(),
            created_at: now,
            updated_at: now,
        }
    }
}
