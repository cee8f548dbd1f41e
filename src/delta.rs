//! Differences between two executions: per-test status changes and
//! per-category count deltas.

use std::collections::HashMap;

use serde::{Serialize, Serializer};

use crate::artifacts::{ExecutionResult, OutcomeCounts, TestOutcome};

/// Label shown for a test that is missing from one side of the comparison.
pub const NOT_PRESENT: &str = "Not Present";

// ---------------------------------------------------------------------------
// Per-test deltas
// ---------------------------------------------------------------------------

/// A test's status in one execution, or its absence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Present(TestOutcome),
    NotPresent,
}

impl Presence {
    pub fn outcome(self) -> Option<TestOutcome> {
        match self {
            Presence::Present(o) => Some(o),
            Presence::NotPresent => None,
        }
    }
}

impl std::fmt::Display for Presence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Presence::Present(o) => f.write_str(o.as_str()),
            Presence::NotPresent => f.write_str(NOT_PRESENT),
        }
    }
}

impl Serialize for Presence {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

/// One test that contributes to a category's delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaEntry {
    pub test_name: String,
    pub class_name: String,
    pub project_name: String,
    pub previous_result: Presence,
    pub current_result: Presence,
}

impl DeltaEntry {
    fn from_result(r: &ExecutionResult, previous: Presence, current: Presence) -> Self {
        Self {
            test_name: r.test_name.clone(),
            class_name: r.class_name.clone(),
            project_name: r.project_name.clone(),
            previous_result: previous,
            current_result: current,
        }
    }
}

/// Tests whose status change touches `category` between two executions.
///
/// A test is reported when it is in both runs with different results and one
/// of them is `category`; when it is new in `current` with result `category`;
/// or when it disappeared from `current` and was `category` in `previous`.
/// Tests with the same result in both runs never appear.
///
/// Order: new and changed tests in `current` order, then removed tests in
/// `previous` order.  `previous` may be empty (first recorded execution).
/// Tests are matched on `(project_name, class_name, test_name)`; with
/// duplicate keys the last occurrence wins.
pub fn compute(
    current: &[ExecutionResult],
    previous: &[ExecutionResult],
    category: TestOutcome,
) -> Vec<DeltaEntry> {
    let previous_by_key: HashMap<_, _> = previous.iter().map(|r| (r.key(), r)).collect();
    let current_by_key: HashMap<_, _> = current.iter().map(|r| (r.key(), r)).collect();

    let mut out = Vec::new();

    for cur in current {
        match previous_by_key.get(&cur.key()) {
            Some(prev) => {
                let changed = cur.result != prev.result;
                if changed && (cur.result == category || prev.result == category) {
                    out.push(DeltaEntry::from_result(
                        cur,
                        Presence::Present(prev.result),
                        Presence::Present(cur.result),
                    ));
                }
            }
            None if cur.result == category => {
                out.push(DeltaEntry::from_result(
                    cur,
                    Presence::NotPresent,
                    Presence::Present(cur.result),
                ));
            }
            None => {}
        }
    }

    for prev in previous {
        if prev.result == category && !current_by_key.contains_key(&prev.key()) {
            out.push(DeltaEntry::from_result(
                prev,
                Presence::Present(prev.result),
                Presence::NotPresent,
            ));
        }
    }

    out
}

// ---------------------------------------------------------------------------
// Count deltas
// ---------------------------------------------------------------------------

/// Whether a count change is good news.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improved,
    Regressed,
    Unchanged,
}

/// A category's count in the current run next to the compared run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CountDelta {
    pub outcome: TestOutcome,
    pub current: u64,
    /// `None` when there is no run to compare against.
    pub previous: Option<u64>,
}

impl CountDelta {
    pub fn between(outcome: TestOutcome, current: &OutcomeCounts, previous: Option<&OutcomeCounts>) -> Self {
        Self {
            outcome,
            current: current.get(outcome),
            previous: previous.map(|p| p.get(outcome)),
        }
    }

    pub fn delta(&self) -> Option<i64> {
        self.previous.map(|p| self.current as i64 - p as i64)
    }

    /// More passes is an improvement; more of anything else is a regression.
    pub fn trend(&self) -> Option<Trend> {
        let d = self.delta()?;
        Some(match (d.signum(), self.outcome) {
            (0, _) => Trend::Unchanged,
            (1, TestOutcome::Passed) | (-1, TestOutcome::Failed | TestOutcome::Error | TestOutcome::Skipped) => {
                Trend::Improved
            }
            _ => Trend::Regressed,
        })
    }
}

/// One [`CountDelta`] per category, in passed/failed/error/skipped order.
pub fn count_deltas(current: &OutcomeCounts, previous: Option<&OutcomeCounts>) -> Vec<CountDelta> {
    TestOutcome::ALL
        .iter()
        .map(|&o| CountDelta::between(o, current, previous))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
