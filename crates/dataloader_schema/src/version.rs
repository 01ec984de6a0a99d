//! Schema version identifiers.
//!
//! Default ids are UTC timestamps (`20250102T030405123456Z`) kept strictly
//! increasing per recipe: each new id is `max(now, last + 1µs)`, where `last`
//! is the newest id issued by this clock or found in storage. A counter
//! strategy (`v000001`, `v000002`, ...) is available when wall-clock labels
//! are not wanted.
//!
//! Ids order by counter value first, so `v1000000` follows `v999999`; ids
//! that are not counters sort before all counters, by their text.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// chrono format of timestamp version ids.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%6fZ";

const COUNTER_PREFIX: &str = "v";

/// Error returned when a version id is empty or not a usable storage key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionParseError {
    message: String,
}

impl fmt::Display for VersionParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for VersionParseError {}

/// A schema version id, unique per recipe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(String);

impl Ord for VersionId {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.counter(), &self.0).cmp(&(other.counter(), &other.0))
    }
}

impl PartialOrd for VersionId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl VersionId {
    /// Accept any non-blank id without path separators.
    pub fn parse(value: &str) -> Result<Self, VersionParseError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(VersionParseError {
                message: "Invalid version ID: empty".to_string(),
            });
        }
        if trimmed.contains(['/', '\\']) || trimmed.contains("..") {
            return Err(VersionParseError {
                message: format!("Invalid version ID: {}", value),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn from_timestamp(at: DateTime<Utc>) -> Self {
        Self(at.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn from_counter(n: u64) -> Self {
        Self(format!("{}{:06}", COUNTER_PREFIX, n))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The id as a timestamp, when it is one.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(&self.0, TIMESTAMP_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }

    /// The id as a counter value, when it is one.
    pub fn counter(&self) -> Option<u64> {
        self.0.strip_prefix(COUNTER_PREFIX)?.parse().ok()
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for VersionId {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for VersionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// How default version ids are generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStrategy {
    #[default]
    Timestamp,
    Counter,
}

/// Issues default version ids, one sequence per recipe.
#[derive(Debug, Clone, Default)]
pub struct VersionClock {
    strategy: VersionStrategy,
    last: HashMap<String, VersionId>,
}

impl VersionClock {
    pub fn new(strategy: VersionStrategy) -> Self {
        Self {
            strategy,
            last: HashMap::new(),
        }
    }

    pub fn strategy(&self) -> VersionStrategy {
        self.strategy
    }

    /// Next id for `recipe`. `newest_stored` is the newest version already
    /// persisted, used to seed the sequence after a restart.
    pub fn next(&mut self, recipe: &str, newest_stored: Option<&VersionId>) -> VersionId {
        self.next_at(recipe, newest_stored, Utc::now())
    }

    fn next_at(
        &mut self,
        recipe: &str,
        newest_stored: Option<&VersionId>,
        now: DateTime<Utc>,
    ) -> VersionId {
        let previous = [self.last.get(recipe), newest_stored];
        let id = match self.strategy {
            VersionStrategy::Timestamp => {
                let floor = previous
                    .iter()
                    .flatten()
                    .filter_map(|v| v.timestamp())
                    .map(|t| t.timestamp_micros() + 1)
                    .max();
                let micros = floor.map_or(now.timestamp_micros(), |f| f.max(now.timestamp_micros()));
                let at = from_micros(micros).unwrap_or(now);
                VersionId::from_timestamp(at)
            }
            VersionStrategy::Counter => {
                let last = previous
                    .iter()
                    .flatten()
                    .filter_map(|v| v.counter())
                    .max()
                    .unwrap_or(0);
                VersionId::from_counter(last + 1)
            }
        };
        debug!("Issued version {} for recipe {}", id, recipe);
        self.last.insert(recipe.to_string(), id.clone());
        id
    }
}

fn from_micros(micros: i64) -> Option<DateTime<Utc>> {
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    DateTime::from_timestamp(micros.div_euclid(1_000_000), nanos)
}
