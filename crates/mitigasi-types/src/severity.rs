//! Severity levels and the status classifier.
//!
//! A district's severity is derived purely from its number of active
//! incidents. Both synchronizers call [`classify`], so there is exactly one
//! threshold table in the system:
//!
//! | Active incidents | Level | Label |
//! |------------------|-------|-------|
//! | 0 | [`SeverityLevel::Calm`] | `Aman` |
//! | 1..=2 | [`SeverityLevel::Alert`] | `Waspada` |
//! | 3..=5 | [`SeverityLevel::Standby`] | `Siaga` |
//! | > 5 | [`SeverityLevel::Critical`] | `Awas` |

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Incident intensity of a district.
///
/// Serialized (and stored in `PostgreSQL`) under the Indonesian labels the
/// city dashboard already understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum SeverityLevel {
    /// No active incidents.
    #[serde(rename = "Aman")]
    Calm,
    /// One or two active incidents.
    #[serde(rename = "Waspada")]
    Alert,
    /// Three to five active incidents.
    #[serde(rename = "Siaga")]
    Standby,
    /// More than five active incidents.
    #[serde(rename = "Awas")]
    Critical,
}

impl SeverityLevel {
    /// The persisted label of this level.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Calm => "Aman",
            Self::Alert => "Waspada",
            Self::Standby => "Siaga",
            Self::Critical => "Awas",
        }
    }

    /// Parse a persisted label back into a level.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Aman" => Some(Self::Calm),
            "Waspada" => Some(Self::Alert),
            "Siaga" => Some(Self::Standby),
            "Awas" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl core::fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}

/// Map an active incident count to its severity level.
pub const fn classify(active_incidents: u32) -> SeverityLevel {
    match active_incidents {
        0 => SeverityLevel::Calm,
        1..=2 => SeverityLevel::Alert,
        3..=5 => SeverityLevel::Standby,
        _ => SeverityLevel::Critical,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_boundaries() {
        assert_eq!(classify(0), SeverityLevel::Calm);
        assert_eq!(classify(1), SeverityLevel::Alert);
        assert_eq!(classify(2), SeverityLevel::Alert);
        assert_eq!(classify(3), SeverityLevel::Standby);
        assert_eq!(classify(4), SeverityLevel::Standby);
        assert_eq!(classify(5), SeverityLevel::Standby);
        assert_eq!(classify(6), SeverityLevel::Critical);
        assert_eq!(classify(u32::MAX), SeverityLevel::Critical);
    }

    #[test]
    fn classify_is_monotonic() {
        let mut previous = classify(0);
        for count in 1..50 {
            let level = classify(count);
            assert!(level >= previous, "severity dropped at {count}");
            previous = level;
        }
    }

    #[test]
    fn labels_round_trip() {
        for level in [
            SeverityLevel::Calm,
            SeverityLevel::Alert,
            SeverityLevel::Standby,
            SeverityLevel::Critical,
        ] {
            assert_eq!(SeverityLevel::from_label(level.label()), Some(level));
        }
        assert_eq!(SeverityLevel::from_label("Bahaya"), None);
    }

    #[test]
    fn serde_uses_labels() {
        let json = serde_json::to_string(&SeverityLevel::Standby).unwrap_or_default();
        assert_eq!(json, "\"Siaga\"");
    }
}
