//! The execution index and the results of a single execution: which run is
//! selected, what it is compared against, and how its results are tallied,
//! filtered and grouped for display.

use std::collections::{HashMap, HashSet};

use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::Serialize;

use crate::artifacts::{ExecutionIndexEntry, ExecutionResult, OutcomeCounts, TestOutcome};
use crate::filter::Selection;

// ---------------------------------------------------------------------------
// Index ordering & lookup
// ---------------------------------------------------------------------------

/// Order the index by execution time, oldest first.
///
/// Ties and unparseable times keep their file order; unparseable entries sort
/// before every dated one.
pub fn sort_index(index: &mut [ExecutionIndexEntry]) {
    index.sort_by_key(|e| e.executed_at());
}

pub fn find_entry<'a>(index: &'a [ExecutionIndexEntry], filename: &str) -> Option<&'a ExecutionIndexEntry> {
    index.iter().find(|e| e.filename == filename)
}

/// The entry immediately before `filename` in index order.
pub fn previous_of<'a>(index: &'a [ExecutionIndexEntry], filename: &str) -> Option<&'a ExecutionIndexEntry> {
    let pos = index.iter().position(|e| e.filename == filename)?;
    pos.checked_sub(1).map(|p| &index[p])
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// The execution being viewed and the execution it is compared against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSelection {
    pub execution: String,
    /// `None` when there is nothing earlier to compare with.
    pub compared: Option<String>,
}

/// Resolve the requested `execution` / `compared` filenames against a sorted
/// index.
///
/// - No or unknown `execution` selects the latest entry.
/// - No or unknown `compared` selects the entry just before the execution,
///   which is the second most recent entry when both default.
/// - An empty index selects nothing.
pub fn resolve_selection(
    index: &[ExecutionIndexEntry],
    execution: Option<&str>,
    compared: Option<&str>,
) -> Option<RunSelection> {
    let latest = index.last()?;

    let execution = match execution {
        Some(name) if find_entry(index, name).is_some() => name.to_owned(),
        Some(name) => {
            tracing::warn!(
                requested = name,
                latest = %latest.filename,
                "execution not found in index, loading the latest run instead"
            );
            latest.filename.clone()
        }
        None => latest.filename.clone(),
    };

    let default_compared = || previous_of(index, &execution).map(|e| e.filename.clone());
    let compared = match compared {
        Some(name) if find_entry(index, name).is_some() => Some(name.to_owned()),
        Some(name) => {
            tracing::warn!(
                requested = name,
                "compared execution not found in index, using the preceding run"
            );
            default_compared()
        }
        None => default_compared(),
    };

    Some(RunSelection {
        execution,
        compared,
    })
}

// ---------------------------------------------------------------------------
// Trend series
// ---------------------------------------------------------------------------

/// Failed / error / skipped counts for every run up to the selected one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrendSeries {
    pub labels: Vec<String>,
    pub failed: Vec<u64>,
    pub error: Vec<u64>,
    pub skipped: Vec<u64>,
}

/// Build the result trend over a sorted index, ending at `selected`.
///
/// Runs whose time cannot be parsed are left out.  If `selected` is not in
/// the index every dated run is included.
pub fn trend_series(index: &[ExecutionIndexEntry], selected: &str) -> TrendSeries {
    let until = find_entry(index, selected).and_then(|e| e.executed_at());
    let mut series = TrendSeries::default();

    for entry in index {
        let Some(at) = entry.executed_at() else {
            continue;
        };
        if until.is_some_and(|u| at > u) {
            continue;
        }
        series.labels.push(run_label(at));
        series.failed.push(entry.counts.failed);
        series.error.push(entry.counts.error);
        series.skipped.push(entry.counts.skipped);
    }

    series
}

/// Short chart label: `"Nov 5th, 3:07pm"`.
pub fn run_label(at: NaiveDateTime) -> String {
    let day = at.day();
    let (pm, hour) = at.hour12();
    format!(
        "{} {day}{}, {hour}:{:02}{}",
        at.format("%b"),
        ordinal_suffix(day),
        at.minute(),
        if pm { "pm" } else { "am" },
    )
}

pub fn ordinal_suffix(day: u32) -> &'static str {
    if (4..=20).contains(&day) {
        return "th";
    }
    match day % 10 {
        1 => "st",
        2 => "nd",
        3 => "rd",
        _ => "th",
    }
}

// ---------------------------------------------------------------------------
// Results table
// ---------------------------------------------------------------------------

/// Tally the results of one execution.
pub fn count_results(results: &[ExecutionResult]) -> OutcomeCounts {
    let mut counts = OutcomeCounts::default();
    for r in results {
        match r.result {
            TestOutcome::Passed => counts.passed += 1,
            TestOutcome::Failed => counts.failed += 1,
            TestOutcome::Error => counts.error += 1,
            TestOutcome::Skipped => counts.skipped += 1,
        }
    }
    counts
}

/// Which results the table lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultScope {
    All,
    /// Failed and errored tests only.
    #[default]
    Failures,
}

pub fn filter_results<'a>(
    results: &'a [ExecutionResult],
    scope: ResultScope,
    project: &Selection,
) -> Vec<&'a ExecutionResult> {
    results
        .iter()
        .filter(|r| scope == ResultScope::All || r.result.is_failure())
        .filter(|r| project.accepts(&r.project_name))
        .collect()
}

/// Distinct project names in first-seen order.
pub fn project_names(results: &[ExecutionResult]) -> Vec<String> {
    let mut seen = HashSet::new();
    results
        .iter()
        .filter(|r| seen.insert(r.project_name.as_str()))
        .map(|r| r.project_name.clone())
        .collect()
}

#[derive(Debug, Serialize)]
pub struct ClassGroup<'a> {
    pub class_name: &'a str,
    pub tests: Vec<&'a ExecutionResult>,
}

#[derive(Debug, Serialize)]
pub struct ProjectGroup<'a> {
    pub project_name: &'a str,
    pub classes: Vec<ClassGroup<'a>>,
}

impl ProjectGroup<'_> {
    pub fn test_count(&self) -> usize {
        self.classes.iter().map(|c| c.tests.len()).sum()
    }
}

/// Group results by project, then class, each in first-seen order.
pub fn group_results<'a>(results: &[&'a ExecutionResult]) -> Vec<ProjectGroup<'a>> {
    let mut groups: Vec<ProjectGroup<'a>> = Vec::new();
    let mut project_pos: HashMap<&str, usize> = HashMap::new();
    let mut class_pos: HashMap<(&str, &str), usize> = HashMap::new();

    for &r in results {
        let pi = *project_pos.entry(r.project_name.as_str()).or_insert_with(|| {
            groups.push(ProjectGroup {
                project_name: &r.project_name,
                classes: Vec::new(),
            });
            groups.len() - 1
        });
        let classes = &mut groups[pi].classes;
        let ci = *class_pos
            .entry((r.project_name.as_str(), r.class_name.as_str()))
            .or_insert_with(|| {
                classes.push(ClassGroup {
                    class_name: &r.class_name,
                    tests: Vec::new(),
                });
                classes.len() - 1
            });
        classes[ci].tests.push(r);
    }

    groups
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
