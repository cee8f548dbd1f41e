//! Report model and shared rendering utilities used by all output backends.
//!
//! Every subcommand assembles a [`Report`] holding only the sections it
//! shows; the text, markdown and JSON backends each render whatever sections
//! are present.

pub mod markdown;
pub mod text;

use serde::{Serialize, Serializer};

use crate::artifacts::{ExecutionResult, TestOutcome, TestRecord};
use crate::commits::CommitRow;
use crate::delta::{CountDelta, DeltaEntry, Trend};
use crate::executions::{ProjectGroup, RunSelection, TrendSeries};
use crate::metrics::MetricsSummary;
use crate::slowest::{DurationLevel, ProjectDuration};
use crate::stats::{parse_month, DetailKind, VelocitySummary};

// ---------------------------------------------------------------------------
// Report model
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize)]
pub struct Report<'a> {
    /// Where the artifacts were read from.
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub velocity: Option<VelocitySection<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<RunSection<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsSummary<'a>>,
}

/// Test-authorship velocity under the active filter.
#[derive(Debug, Serialize)]
pub struct VelocitySection<'a> {
    pub author: &'a str,
    pub project: &'a str,
    pub window: &'a str,
    pub summary: &'a VelocitySummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<MonthDetails<'a>>,
}

/// One month's tests of one type, drilled down from the velocity table.
#[derive(Debug, Serialize)]
pub struct MonthDetails<'a> {
    pub month: &'a str,
    pub kind: DetailKind,
    pub tests: Vec<&'a TestRecord>,
}

/// One execution and everything derived from comparing it with another.
#[derive(Debug, Default, Serialize)]
pub struct RunSection<'a> {
    pub selection: Option<&'a RunSelection>,
    pub execution_time: Option<&'a str>,
    pub test_branch: &'a str,
    pub duration: Option<&'a str>,
    pub counts: Vec<CountDelta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend: Option<TrendSeries>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<ResultsTable<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deltas: Vec<DeltaSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slowest: Option<SlowestSection<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commits: Option<CommitStatus<'a>>,
}

#[derive(Debug, Serialize)]
pub struct ResultsTable<'a> {
    /// `"failures"` or `"all"`.
    pub scope: &'static str,
    pub project: &'a str,
    pub groups: Vec<ProjectGroup<'a>>,
}

#[derive(Debug, Serialize)]
pub struct DeltaSection {
    pub category: TestOutcome,
    pub entries: Vec<DeltaEntry>,
}

#[derive(Debug, Serialize)]
pub struct SlowestSection<'a> {
    pub count: usize,
    pub exclude_fixtures: bool,
    pub tests: Vec<SlowTest<'a>>,
    pub projects: Vec<ProjectDuration>,
}

#[derive(Debug, Serialize)]
pub struct SlowTest<'a> {
    #[serde(flatten)]
    pub result: &'a ExecutionResult,
    pub level: DurationLevel,
}

impl<'a> SlowTest<'a> {
    pub fn new(result: &'a ExecutionResult) -> Self {
        let secs = result.time.unwrap_or_default();
        Self {
            result,
            level: DurationLevel::for_test(secs),
        }
    }

    pub fn seconds(&self) -> f64 {
        self.result.time.unwrap_or_default()
    }
}

/// Commit data for the selected pair of runs.
#[derive(Debug)]
pub enum CommitStatus<'a> {
    /// Nothing recorded for this pair, or no compared run.
    Unavailable,
    /// Recorded; may be empty when nothing landed between the runs.
    Found(Vec<CommitRow<'a>>),
}

impl Serialize for CommitStatus<'_> {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            CommitStatus::Unavailable => s.serialize_none(),
            CommitStatus::Found(rows) => rows.serialize(s),
        }
    }
}

pub const NO_COMMITS: &str = "No new commits";
pub const COMMITS_UNAVAILABLE: &str = "Commit data not available";

// ---------------------------------------------------------------------------
// Bars
// ---------------------------------------------------------------------------

/// Horizontal bar of up to `width` cells, scaled against `max`.
///
/// Non-zero values always get at least one cell so a lull is visible as
/// distinct from an empty month.
pub fn bar(value: usize, max: usize, width: usize) -> String {
    if value == 0 || max == 0 {
        return String::new();
    }
    let cells = (value * width).div_ceil(max).clamp(1, width);
    "█".repeat(cells)
}

// ---------------------------------------------------------------------------
// Number formatting
// ---------------------------------------------------------------------------

/// Format an integer with thousands separators: `1234567` → `"1,234,567"`.
pub fn fmt_count(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let grouped: String = digits
        .chars()
        .rev()
        .enumerate()
        .flat_map(|(i, c)| {
            if i > 0 && i % 3 == 0 { Some(',') } else { None }
                .into_iter()
                .chain(std::iter::once(c))
        })
        .collect::<String>()
        .chars()
        .rev()
        .collect();
    if n < 0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

/// `"+3 ▲"`, `"-2 ▼"` or `"±0"`; empty without a compared run.
///
/// The arrow marks direction; whether that is good news is [`Trend`].
pub fn fmt_delta(d: &CountDelta) -> String {
    match d.delta() {
        None => String::new(),
        Some(0) => "±0".to_owned(),
        Some(n) if n > 0 => format!("+{} ▲", fmt_count(n)),
        Some(n) => format!("{} ▼", fmt_count(n)),
    }
}

pub fn trend_word(d: &CountDelta) -> &'static str {
    match d.trend() {
        Some(Trend::Improved) => "improved",
        Some(Trend::Regressed) => "regressed",
        Some(Trend::Unchanged) | None => "",
    }
}

/// Marker appended to durations over a threshold.
pub fn level_marker(level: DurationLevel) -> &'static str {
    match level {
        DurationLevel::Normal => "",
        DurationLevel::Warning => "⚠",
        DurationLevel::Error => "✖",
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `"2024-03"` → `"Mar 2024"`; anything else is returned unchanged.
pub fn month_display(month: &str) -> String {
    match parse_month(month) {
        Some((y, m)) => format!("{} {y}", month_abbr(m)),
        None => month.to_owned(),
    }
}

pub fn month_abbr(m: u32) -> &'static str {
    match m {
        1 => "Jan",
        2 => "Feb",
        3 => "Mar",
        4 => "Apr",
        5 => "May",
        6 => "Jun",
        7 => "Jul",
        8 => "Aug",
        9 => "Sep",
        10 => "Oct",
        11 => "Nov",
        12 => "Dec",
        _ => "???",
    }
}

/// Shorten `s` to `max` characters, ending in `…` when cut.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_owned();
    }
    let kept: String = s.chars().take(max.saturating_sub(1)).collect();
    format!("{kept}…")
}

/// First line of a commit message.
pub fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
