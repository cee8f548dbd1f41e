//! Author / project / time-window selection over authorship records.

use chrono::{DateTime, Utc};

use crate::artifacts::{parse_timestamp, TestRecord};

/// Sentinel accepted wherever a single author or project may be named.
pub const ALL: &str = "all";

/// Either every value or exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    All,
    Only(String),
}

impl Selection {
    pub fn accepts(&self, value: &str) -> bool {
        match self {
            Selection::All => true,
            Selection::Only(v) => v == value,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Selection::All => ALL,
            Selection::Only(v) => v,
        }
    }
}

impl From<&str> for Selection {
    fn from(s: &str) -> Self {
        if s == ALL {
            Selection::All
        } else {
            Selection::Only(s.to_owned())
        }
    }
}

/// Predicate applied to every [`TestRecord`] before aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFilter {
    pub author: Selection,
    pub project: Selection,
    /// Records dated before this instant are dropped.
    pub cutoff: DateTime<Utc>,
}

impl Default for RecordFilter {
    fn default() -> Self {
        Self {
            author: Selection::All,
            project: Selection::All,
            cutoff: DateTime::UNIX_EPOCH,
        }
    }
}

impl RecordFilter {
    pub fn new(author: &str, project: &str, cutoff: DateTime<Utc>) -> Self {
        Self {
            author: author.into(),
            project: project.into(),
            cutoff,
        }
    }

    /// Records with an unparseable timestamp never match, whatever the cutoff.
    pub fn matches(&self, record: &TestRecord) -> bool {
        if !self.author.accepts(&record.author) || !self.project.accepts(&record.project) {
            return false;
        }
        match parse_timestamp(&record.timestamp) {
            Some(ts) => ts >= self.cutoff,
            None => {
                tracing::debug!(
                    timestamp = %record.timestamp,
                    test = %record.test,
                    "skipping record with unparseable timestamp"
                );
                false
            }
        }
    }

    /// Matching records, in input order.
    pub fn apply(&self, records: &[TestRecord]) -> Vec<TestRecord> {
        records.iter().filter(|r| self.matches(r)).cloned().collect()
    }
}
