//! Class / case / ignored-test totals from `test_project_metrics.json`.

use serde::Serialize;

use crate::artifacts::ProjectMetric;
use crate::filter::Selection;

/// Totals over the selected projects, plus the rows they were summed from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary<'a> {
    pub total_classes: u64,
    pub total_cases: u64,
    pub total_ignored: u64,
    /// Percentage of cases ignored, rounded to two decimals; 0 without cases.
    pub ignored_percentage: f64,
    pub rows: Vec<&'a ProjectMetric>,
}

pub fn summarize<'a>(metrics: &'a [ProjectMetric], project: &Selection) -> MetricsSummary<'a> {
    let rows: Vec<&ProjectMetric> = metrics
        .iter()
        .filter(|m| project.accepts(&m.project_name))
        .collect();

    let total_classes = rows.iter().map(|m| m.total_classes).sum();
    let total_cases: u64 = rows.iter().map(|m| m.total_cases).sum();
    let total_ignored: u64 = rows.iter().map(|m| m.total_ignored).sum();

    MetricsSummary {
        total_classes,
        total_cases,
        total_ignored,
        ignored_percentage: percentage(total_ignored, total_cases),
        rows,
    }
}

fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 / whole as f64 * 10_000.0).round() / 100.0
}

/// Project names in file order, for a project picker.
pub fn metric_projects(metrics: &[ProjectMetric]) -> Vec<&str> {
    metrics.iter().map(|m| m.project_name.as_str()).collect()
}
