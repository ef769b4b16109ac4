//! Core types for the `CreditCore` ledger and task engine.
//!
//! Identifiers and bounded values use smart constructors so that an instance
//! is always valid once it exists ("parse, don't validate"). Credits are
//! decimal amounts that can never go negative.

use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use nutype::nutype;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Identifier of a client account, as supplied by the identity layer.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct ClientId(String);

/// Identifier of an administrator, as supplied by the identity layer.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct AdminId(String);

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[nutype(
            validate(predicate = |id: &Uuid| id.get_version() == Some(uuid::Version::SortRand)),
            derive(
                Debug,
                Clone,
                Copy,
                PartialEq,
                Eq,
                PartialOrd,
                Ord,
                Hash,
                AsRef,
                Deref,
                Display,
                Serialize,
                Deserialize
            )
        )]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a new time-ordered identifier.
            pub fn new() -> Self {
                Self::try_new(Uuid::now_v7())
                    .expect("Uuid::now_v7() always returns a valid v7 UUID")
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

uuid_identifier!(
    /// Identifier of a client's wallet.
    WalletId
);
uuid_identifier!(
    /// Identifier of a task or marketplace plan.
    TaskId
);
uuid_identifier!(
    /// Identifier of a reusable task or subscription template.
    TemplateId
);
uuid_identifier!(
    /// Identifier of a client's recharge request.
    RechargeRequestId
);
uuid_identifier!(
    /// Identifier of an immutable ledger entry.
    LedgerEntryId
);

/// The party performing an operation, as asserted by the identity layer.
///
/// The engine trusts this value and performs no authentication of its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "role", content = "id", rename_all = "camelCase")]
pub enum Actor {
    /// An administrator acting on behalf of the platform.
    Admin(AdminId),
    /// A client acting on their own account.
    Client(ClientId),
}

impl Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin(id) => write!(f, "admin:{id}"),
            Self::Client(id) => write!(f, "client:{id}"),
        }
    }
}

/// A point in time, always UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a new timestamp from a UTC `DateTime`.
    pub const fn new(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    /// Creates a timestamp representing the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns the underlying `DateTime`.
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Returns this timestamp shifted by a whole number of days, or `None`
    /// past the representable range.
    pub fn checked_plus_days(self, days: i64) -> Option<Self> {
        Duration::try_days(days)
            .and_then(|delta| self.0.checked_add_signed(delta))
            .map(Self)
    }

    /// Returns this timestamp shifted by a whole number of days, clamped to
    /// the representable range.
    #[must_use]
    pub fn plus_days(self, days: i64) -> Self {
        self.checked_plus_days(days).unwrap_or(if days < 0 {
            Self(DateTime::<Utc>::MIN_UTC)
        } else {
            Self(DateTime::<Utc>::MAX_UTC)
        })
    }

    /// Milliseconds elapsed from `earlier` to `self`; negative if `earlier` is later.
    pub fn millis_since(&self, earlier: &Self) -> i64 {
        self.0.signed_duration_since(earlier.0).num_milliseconds()
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(datetime: DateTime<Utc>) -> Self {
        Self::new(datetime)
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Errors that can occur when constructing [`Credits`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CreditsError {
    /// The amount is negative.
    #[error("credit amount cannot be negative: {0}")]
    NegativeAmount(Decimal),

    /// The amount has more than two decimal places.
    #[error("credits can only have up to 2 decimal places, got: {0}")]
    TooManyDecimalPlaces(Decimal),

    /// Failed to parse credits from a string.
    #[error("failed to parse credits from string: {0}")]
    ParseError(String),
}

/// A non-negative quantity of credits with at most two decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Credits(Decimal);

impl Credits {
    /// Creates credits from a decimal amount.
    pub fn new(amount: Decimal) -> Result<Self, CreditsError> {
        if amount < Decimal::ZERO {
            return Err(CreditsError::NegativeAmount(amount));
        }
        if amount.normalize().scale() > 2 {
            return Err(CreditsError::TooManyDecimalPlaces(amount));
        }
        Ok(Self(amount))
    }

    /// Creates credits from a whole number.
    pub fn whole(amount: u64) -> Self {
        Self(Decimal::from(amount))
    }

    /// Zero credits.
    pub const fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Returns the amount as a decimal.
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Returns the amount as a negative signed ledger amount.
    pub fn as_debit(&self) -> Decimal {
        -self.0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Adds two amounts.
    #[must_use]
    pub fn saturating_add(&self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Subtracts `other`, or returns `None` if the result would be negative.
    pub fn checked_sub(&self, other: Self) -> Option<Self> {
        if other.0 > self.0 {
            None
        } else {
            Some(Self(self.0 - other.0))
        }
    }
}

impl Default for Credits {
    fn default() -> Self {
        Self::zero()
    }
}

impl TryFrom<Decimal> for Credits {
    type Error = CreditsError;

    fn try_from(amount: Decimal) -> Result<Self, Self::Error> {
        Self::new(amount)
    }
}

impl From<Credits> for Decimal {
    fn from(credits: Credits) -> Self {
        credits.0
    }
}

impl Display for Credits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Credits {
    type Err = CreditsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let amount = Decimal::from_str(s).map_err(|_| CreditsError::ParseError(s.to_string()))?;
        Self::new(amount)
    }
}

/// Upper bound for AUTO-mode progress, in percent.
#[nutype(
    validate(finite, greater_or_equal = 0.0, less_or_equal = 100.0),
    default = 100.0,
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        PartialOrd,
        Display,
        Default,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct AutoCompletionCap(f64);

/// Progress percentage at which a milestone counts as reached.
///
/// Thresholds may exceed 100 because MANUAL progress is uncapped.
#[nutype(
    validate(finite, greater_or_equal = 0.0),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        PartialOrd,
        Display,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct MilestoneThreshold(f64);

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn credits_reject_negative_amounts() {
        assert_eq!(
            Credits::new(dec!(-1)),
            Err(CreditsError::NegativeAmount(dec!(-1)))
        );
    }

    #[test]
    fn credits_reject_sub_cent_precision() {
        assert!(matches!(
            Credits::new(dec!(1.005)),
            Err(CreditsError::TooManyDecimalPlaces(_))
        ));
        assert!(Credits::new(dec!(1.500)).is_ok());
    }

    #[test]
    fn credits_checked_sub_refuses_to_go_negative() {
        let hundred = Credits::whole(100);
        assert_eq!(hundred.checked_sub(Credits::whole(150)), None);
        assert_eq!(hundred.checked_sub(Credits::whole(40)), Some(Credits::whole(60)));
    }

    #[test]
    fn credits_deserialize_through_validation() {
        let parsed: Result<Credits, _> = serde_json::from_str("\"-5\"");
        assert!(parsed.is_err());

        let parsed: Credits = serde_json::from_str("\"12.50\"").unwrap();
        assert_eq!(parsed, Credits::new(dec!(12.5)).unwrap());
    }

    #[test]
    fn credits_parse_from_string() {
        assert_eq!(" 42 ".parse::<Credits>().unwrap(), Credits::whole(42));
        assert!(matches!(
            "abc".parse::<Credits>(),
            Err(CreditsError::ParseError(_))
        ));
    }

    #[test]
    fn day_arithmetic_never_overflows() {
        let end_of_time = Timestamp::new(DateTime::<Utc>::MAX_UTC);
        assert_eq!(end_of_time.checked_plus_days(1), None);
        assert_eq!(end_of_time.plus_days(1), end_of_time);
        assert_eq!(Timestamp::now().checked_plus_days(i64::MAX), None);

        let start = Timestamp::now();
        assert_eq!(start.checked_plus_days(2), Some(start.plus_days(2)));
    }

    #[test]
    fn auto_completion_cap_defaults_to_one_hundred() {
        let cap: f64 = AutoCompletionCap::default().into();
        assert!((cap - 100.0).abs() < f64::EPSILON);
        assert!(AutoCompletionCap::try_new(100.5).is_err());
        assert!(AutoCompletionCap::try_new(-0.5).is_err());
    }

    #[test]
    fn milestone_threshold_allows_overachievement_levels() {
        assert!(MilestoneThreshold::try_new(150.0).is_ok());
        assert!(MilestoneThreshold::try_new(f64::NAN).is_err());
    }

    #[test]
    fn generated_identifiers_are_unique_and_ordered() {
        let first = TaskId::new();
        let second = TaskId::new();
        assert_ne!(first, second);
        assert!(first < second);
    }

    #[test]
    fn actor_serializes_with_role_tag() {
        let actor = Actor::Client(ClientId::try_new("client-7").unwrap());
        let json = serde_json::to_value(&actor).unwrap();
        assert_eq!(json["role"], "client");
        assert_eq!(json["id"], "client-7");
    }

    proptest! {
        #[test]
        fn client_id_accepts_valid_strings(s in "[a-zA-Z0-9_-]{1,255}") {
            let result = ClientId::try_new(s.clone());
            prop_assert!(result.is_ok());
            let id = result.unwrap();
            prop_assert_eq!(id.as_ref(), &s);
        }

        #[test]
        fn client_id_rejects_whitespace_only(s in " {1,20}") {
            prop_assert!(ClientId::try_new(s).is_err());
        }

        #[test]
        fn credits_addition_then_subtraction_is_identity(a in 0u64..1_000_000, b in 0u64..1_000_000) {
            let left = Credits::whole(a);
            let right = Credits::whole(b);
            prop_assert_eq!(left.saturating_add(right).checked_sub(right), Some(left));
        }
    }
}
