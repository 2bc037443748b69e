//! The fixed set of storage keys

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One persisted document per domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StorageKey {
    Exercises,
    Sessions,
    Templates,
    Gamification,
    Settings,
    Measurements,
    Photos,
    Programs,
    Analytics,
    Records,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown storage key: {0}")]
pub struct UnknownKey(pub String);

impl StorageKey {
    /// Every key, in a stable order
    pub const ALL: [StorageKey; 10] = [
        StorageKey::Exercises,
        StorageKey::Sessions,
        StorageKey::Templates,
        StorageKey::Gamification,
        StorageKey::Settings,
        StorageKey::Measurements,
        StorageKey::Photos,
        StorageKey::Programs,
        StorageKey::Analytics,
        StorageKey::Records,
    ];

    /// The persisted key string (stable wire contract)
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKey::Exercises => "smarttrack_exercises",
            StorageKey::Sessions => "smarttrack_sessions",
            StorageKey::Templates => "smarttrack_templates",
            StorageKey::Gamification => "smarttrack_gamification",
            StorageKey::Settings => "smarttrack_settings",
            StorageKey::Measurements => "smarttrack_measurements",
            StorageKey::Photos => "smarttrack_photos",
            StorageKey::Programs => "smarttrack_programs",
            StorageKey::Analytics => "smarttrack_analytics",
            StorageKey::Records => "smarttrack_records",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageKey {
    type Err = UnknownKey;

    /// Accepts the full key (`smarttrack_sessions`) or the short name (`sessions`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let short = s.strip_prefix("smarttrack_").unwrap_or(s);
        StorageKey::ALL
            .into_iter()
            .find(|k| k.as_str().strip_prefix("smarttrack_") == Some(short))
            .ok_or_else(|| UnknownKey(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_keys_are_distinct_and_indexed() {
        for (i, key) in StorageKey::ALL.iter().enumerate() {
            assert_eq!(key.index(), i);
            assert!(key.as_str().starts_with("smarttrack_"));
        }
    }

    #[test]
    fn test_from_str() {
        assert_eq!("smarttrack_sessions".parse::<StorageKey>(), Ok(StorageKey::Sessions));
        assert_eq!("photos".parse::<StorageKey>(), Ok(StorageKey::Photos));
        assert_eq!(
            "smarttrack_nope".parse::<StorageKey>(),
            Err(UnknownKey("smarttrack_nope".to_string()))
        );
    }
}
