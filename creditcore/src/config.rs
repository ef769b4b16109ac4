//! Engine configuration.
//!
//! Bounded values are `nutype` types, so a `CreditConfig` that deserialized
//! successfully only needs the cross-field checks in [`CreditConfig::validate`].

use std::time::Duration;

use nutype::nutype;
use serde::{Deserialize, Serialize};

use crate::errors::{CreditError, CreditResult};
use crate::progress::ProgressPalette;
use crate::types::AutoCompletionCap;

/// How long a notification sink may take before it is abandoned, in milliseconds.
///
/// Between 1ms and 60 seconds.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 60_000),
    default = 5_000,
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Default,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct NotificationTimeoutMs(u64);

impl NotificationTimeoutMs {
    /// Convert to Duration for use with `tokio::time::timeout`.
    pub fn as_duration(self) -> Duration {
        Duration::from_millis(self.into())
    }
}

/// Configuration for [`CreditEngine`](crate::engine::CreditEngine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreditConfig {
    /// Cap applied to AUTO tasks that do not set their own
    pub default_auto_completion_cap: AutoCompletionCap,
    /// Upper bound on a single notification delivery
    pub notification_timeout_ms: NotificationTimeoutMs,
    /// Whether notifications are emitted at all
    pub notifications_enabled: bool,
    /// Whether `CreditEngine::boot` runs the consistency validator
    pub validate_on_startup: bool,
    /// Colors used when no milestone is reached
    pub progress_palette: ProgressPalette,
}

impl Default for CreditConfig {
    fn default() -> Self {
        Self {
            default_auto_completion_cap: AutoCompletionCap::default(),
            notification_timeout_ms: NotificationTimeoutMs::default(),
            notifications_enabled: true,
            validate_on_startup: true,
            progress_palette: ProgressPalette::default(),
        }
    }
}

impl CreditConfig {
    /// Parses and validates a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> CreditResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|err| CreditError::ValidationFailed(format!("invalid configuration: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that palette bands are finite and strictly ascending.
    pub fn validate(&self) -> CreditResult<()> {
        let bands = &self.progress_palette.bands;
        if bands.iter().any(|band| !band.upper_bound.is_finite()) {
            return Err(CreditError::ValidationFailed(
                "progress palette bounds must be finite".to_string(),
            ));
        }
        if bands
            .windows(2)
            .any(|pair| pair[0].upper_bound >= pair[1].upper_bound)
        {
            return Err(CreditError::ValidationFailed(
                "progress palette bounds must be strictly ascending".to_string(),
            ));
        }
        Ok(())
    }

    /// Disables the startup validation pass.
    #[must_use]
    pub const fn without_startup_validation(mut self) -> Self {
        self.validate_on_startup = false;
        self
    }

    /// Disables notifications.
    #[must_use]
    pub const fn without_notifications(mut self) -> Self {
        self.notifications_enabled = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = CreditConfig::from_json_str("{}").unwrap();
        assert_eq!(config, CreditConfig::default());
        assert_eq!(
            config.notification_timeout_ms.as_duration(),
            Duration::from_millis(5_000)
        );
    }

    #[test]
    fn out_of_range_values_are_rejected_while_parsing() {
        let result = CreditConfig::from_json_str(r#"{"notificationTimeoutMs": 0}"#);
        assert!(matches!(result, Err(CreditError::ValidationFailed(_))));

        let result = CreditConfig::from_json_str(r#"{"defaultAutoCompletionCap": 120.0}"#);
        assert!(result.is_err());
    }

    #[test]
    fn partial_document_overrides_only_given_fields() {
        let config = CreditConfig::from_json_str(
            r#"{"validateOnStartup": false, "defaultAutoCompletionCap": 80.0}"#,
        )
        .unwrap();

        assert!(!config.validate_on_startup);
        assert!(config.notifications_enabled);
        let cap: f64 = config.default_auto_completion_cap.into();
        assert!((cap - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unordered_palette_is_rejected() {
        let json = r##"{
            "progressPalette": {
                "bands": [
                    {"upperBound": 50.0, "color": "#111111"},
                    {"upperBound": 25.0, "color": "#222222"}
                ],
                "complete": "#333333"
            }
        }"##;
        assert!(CreditConfig::from_json_str(json).is_err());
    }
}
