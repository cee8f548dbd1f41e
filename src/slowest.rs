//! Slowest-test ranking and duration thresholds.

use serde::Serialize;

use crate::artifacts::{ExecutionResult, ExecutionRun};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Row counts the slowest-tests view offers.
pub const SLOWEST_PRESETS: [usize; 4] = [10, 25, 50, 100];

/// Class-name prefixes marking setup / teardown fixture classes.
pub const FIXTURE_PREFIXES: [&str; 2] = ["AA_", "ZZ_"];

/// A single test slower than this many seconds is flagged as a warning.
pub const TEST_WARN_SECS: f64 = 180.0;
/// A single test slower than this many seconds is flagged as an error.
pub const TEST_ERROR_SECS: f64 = 300.0;
/// A whole project slower than this many seconds is flagged as a warning.
pub const PROJECT_WARN_SECS: f64 = 1200.0;
/// A whole project slower than this many seconds is flagged as an error.
pub const PROJECT_ERROR_SECS: f64 = 1800.0;

// ---------------------------------------------------------------------------
// Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationLevel {
    Normal,
    Warning,
    Error,
}

impl DurationLevel {
    fn classify(secs: f64, warn: f64, error: f64) -> Self {
        if secs > error {
            DurationLevel::Error
        } else if secs > warn {
            DurationLevel::Warning
        } else {
            DurationLevel::Normal
        }
    }

    pub fn for_test(secs: f64) -> Self {
        Self::classify(secs, TEST_WARN_SECS, TEST_ERROR_SECS)
    }

    pub fn for_project(secs: f64) -> Self {
        Self::classify(secs, PROJECT_WARN_SECS, PROJECT_ERROR_SECS)
    }
}

// ---------------------------------------------------------------------------
// Ranking
// ---------------------------------------------------------------------------

pub fn is_fixture_class(class_name: &str) -> bool {
    FIXTURE_PREFIXES.iter().any(|p| class_name.starts_with(p))
}

/// The `count` slowest results, slowest first.
///
/// Results without a finite `time` are never ranked.  With
/// `exclude_fixtures`, fixture classes are removed before ranking.  Equal
/// times keep input order.
pub fn slowest<'a>(
    results: &'a [ExecutionResult],
    count: usize,
    exclude_fixtures: bool,
) -> Vec<&'a ExecutionResult> {
    let mut timed: Vec<(f64, &ExecutionResult)> = results
        .iter()
        .filter_map(|r| r.time.filter(|t| t.is_finite()).map(|t| (t, r)))
        .filter(|(_, r)| !(exclude_fixtures && is_fixture_class(&r.class_name)))
        .collect();

    timed.sort_by(|a, b| b.0.total_cmp(&a.0));
    timed.into_iter().take(count).map(|(_, r)| r).collect()
}

/// Aggregate wall time for one project within an execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectDuration {
    pub project_name: String,
    pub seconds: f64,
    pub level: DurationLevel,
}

/// Per-project durations from `test_project_metrics`, slowest first.
///
/// Projects without a numeric duration are left out; runs that predate
/// per-project timing yield an empty list.
pub fn project_durations(run: &ExecutionRun) -> Vec<ProjectDuration> {
    let Some(metrics) = &run.test_project_metrics else {
        return Vec::new();
    };
    let mut out: Vec<ProjectDuration> = metrics
        .iter()
        .filter_map(|(name, timing)| {
            let secs = timing.duration.filter(|d| d.is_finite())?;
            Some(ProjectDuration {
                project_name: name.clone(),
                seconds: secs,
                level: DurationLevel::for_project(secs),
            })
        })
        .collect();
    out.sort_by(|a, b| b.seconds.total_cmp(&a.seconds));
    out
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

/// `"1h 2m 3s"`, `"2m 5s"` or `"4.25s"`.
pub fn format_duration(secs: f64) -> String {
    if !secs.is_finite() || secs < 0.0 {
        return "-".to_owned();
    }
    if secs < 60.0 {
        return format!("{secs:.2}s");
    }
    let total = secs.round() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}h {m}m {s}s")
    } else {
        format!("{m}m {s}s")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{ProjectTiming, TestOutcome};

    fn timed(class: &str, test: &str, time: Option<f64>) -> ExecutionResult {
        ExecutionResult {
            project_name: "core".to_owned(),
            class_name: class.to_owned(),
            test_name: test.to_owned(),
            result: TestOutcome::Passed,
            package: None,
            time,
            stack_trace: None,
            system_out: None,
            system_err: None,
        }
    }

    fn names(rs: &[&ExecutionResult]) -> Vec<String> {
        rs.iter().map(|r| r.test_name.clone()).collect()
    }

    #[test]
    fn ranks_numeric_times_descending() {
        let rs = vec![
            timed("A", "t10", Some(10.0)),
            timed("A", "t500", Some(500.0)),
            timed("A", "t50", Some(50.0)),
            timed("A", "untimed", None),
            timed("A", "t200", Some(200.0)),
        ];
        assert_eq!(names(&slowest(&rs, 2, false)), vec!["t500", "t200"]);
        assert_eq!(slowest(&rs, 100, false).len(), 4);
    }

    #[test]
    fn nan_times_are_not_ranked() {
        let rs = vec![timed("A", "nan", Some(f64::NAN)), timed("A", "one", Some(1.0))];
        assert_eq!(names(&slowest(&rs, 10, false)), vec!["one"]);
    }

    #[test]
    fn fixtures_excluded_before_ranking() {
        let rs = vec![
            timed("AA_Setup", "setup", Some(900.0)),
            timed("ZZ_Teardown", "teardown", Some(800.0)),
            timed("WidgetIT", "real", Some(5.0)),
            timed("XAA_NotFixture", "lookalike", Some(4.0)),
        ];
        assert_eq!(names(&slowest(&rs, 2, true)), vec!["real", "lookalike"]);
        assert_eq!(names(&slowest(&rs, 2, false)), vec!["setup", "teardown"]);
    }

    #[test]
    fn ties_keep_input_order() {
        let rs = vec![
            timed("A", "first", Some(3.0)),
            timed("A", "second", Some(3.0)),
            timed("A", "third", Some(3.0)),
        ];
        assert_eq!(names(&slowest(&rs, 3, false)), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_thresholds_are_strict() {
        assert_eq!(DurationLevel::for_test(180.0), DurationLevel::Normal);
        assert_eq!(DurationLevel::for_test(180.5), DurationLevel::Warning);
        assert_eq!(DurationLevel::for_test(300.0), DurationLevel::Warning);
        assert_eq!(DurationLevel::for_test(300.1), DurationLevel::Error);
    }

    #[test]
    fn project_thresholds() {
        assert_eq!(DurationLevel::for_project(1200.0), DurationLevel::Normal);
        assert_eq!(DurationLevel::for_project(1500.0), DurationLevel::Warning);
        assert_eq!(DurationLevel::for_project(1800.5), DurationLevel::Error);
    }

    #[test]
    fn project_durations_slowest_first() {
        let run = ExecutionRun {
            test_project_metrics: Some(
                [
                    ("fast".to_owned(), ProjectTiming { duration: Some(100.0), ..Default::default() }),
                    ("slow".to_owned(), ProjectTiming { duration: Some(2000.0), ..Default::default() }),
                    ("unknown".to_owned(), ProjectTiming::default()),
                ]
                .into_iter()
                .collect(),
            ),
            ..Default::default()
        };
        let ds = project_durations(&run);
        assert_eq!(ds.len(), 2);
        assert_eq!(ds[0].project_name, "slow");
        assert_eq!(ds[0].level, DurationLevel::Error);
        assert_eq!(ds[1].level, DurationLevel::Normal);
    }

    #[test]
    fn project_durations_absent_for_old_runs() {
        assert!(project_durations(&ExecutionRun::default()).is_empty());
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(4.25), "4.25s");
        assert_eq!(format_duration(125.0), "2m 5s");
        assert_eq!(format_duration(3723.4), "1h 2m 3s");
        assert_eq!(format_duration(3600.0), "1h 0m 0s");
        assert_eq!(format_duration(f64::NAN), "-");
    }
}
