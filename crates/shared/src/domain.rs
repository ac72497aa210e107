use std::fmt;

use serde::{Deserialize, Serialize};

/// Locale used when the session has no active locale set.
pub const DEFAULT_LOCALE: &str = "en-US";

/// Lower bound for the rotation interval; smaller values are clamped.
pub const MIN_ROTATION_INTERVAL_MS: i64 = 500;

pub const DEFAULT_ROTATION_INTERVAL_MS: i64 = 5000;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// Opaque id of an entry in a localized alarm collection. Resolved by lookup,
// never dereferenced directly.
id_newtype!(AlarmHandle);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocaleId(String);

impl LocaleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Maps an optional session locale to the locale whose alarms are shown.
    /// Unset and blank locales fall back to [`DEFAULT_LOCALE`].
    pub fn or_default(active: Option<&LocaleId>) -> LocaleId {
        match active {
            Some(locale) if !locale.0.trim().is_empty() => locale.clone(),
            _ => LocaleId::default(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LocaleId {
    fn default() -> Self {
        Self(DEFAULT_LOCALE.to_string())
    }
}

impl fmt::Display for LocaleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LocaleId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationConfig {
    pub interval_millis: i64,
}

impl RotationConfig {
    pub fn from_millis(interval_millis: i64) -> Self {
        Self { interval_millis }
    }
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            interval_millis: DEFAULT_ROTATION_INTERVAL_MS,
        }
    }
}
