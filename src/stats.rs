//! Monthly bucketing of authorship records and the velocity summary built on it.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::artifacts::{parse_timestamp, AuthorshipData, MonthEntry, TestKind, TestRecord};
use crate::filter::RecordFilter;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Number of most recently added tests surfaced in the summary.
pub const LATEST_TESTS_COUNT: usize = 5;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrimError {
    #[error("series lengths differ: first={first}, second={second}, labels={labels}")]
    LengthMismatch {
        first: usize,
        second: usize,
        labels: usize,
    },
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Tests added during one calendar month, split by test type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyAggregate {
    /// Zero-padded `YYYY-MM`.
    pub month: String,
    pub integration_count: usize,
    pub unit_count: usize,
    pub integration_details: Vec<TestRecord>,
    pub unit_details: Vec<TestRecord>,
}

/// Which detail list to read from a [`MonthlyAggregate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailKind {
    Integration,
    Unit,
    #[default]
    Both,
}

impl DetailKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DetailKind::Integration => "integration",
            DetailKind::Unit => "unit",
            DetailKind::Both => "both",
        }
    }
}

impl std::str::FromStr for DetailKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "integration" => Ok(DetailKind::Integration),
            "unit" => Ok(DetailKind::Unit),
            "both" => Ok(DetailKind::Both),
            other => anyhow::bail!("unknown test type {other:?}; expected integration, unit or both"),
        }
    }
}

impl MonthlyAggregate {
    fn empty(month: String) -> Self {
        Self {
            month,
            integration_count: 0,
            unit_count: 0,
            integration_details: Vec::new(),
            unit_details: Vec::new(),
        }
    }

    pub fn total(&self) -> usize {
        self.integration_count + self.unit_count
    }

    /// Integration details, unit details, or integration followed by unit.
    pub fn details_for(&self, kind: DetailKind) -> Vec<&TestRecord> {
        match kind {
            DetailKind::Integration => self.integration_details.iter().collect(),
            DetailKind::Unit => self.unit_details.iter().collect(),
            DetailKind::Both => self
                .integration_details
                .iter()
                .chain(&self.unit_details)
                .collect(),
        }
    }
}

/// Parallel chart series with the leading empty months removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrimmedSeries<L> {
    pub integration: Vec<usize>,
    pub unit: Vec<usize>,
    pub labels: Vec<L>,
}

/// Everything the velocity section shows for one filter selection.
#[derive(Debug, Clone, Serialize)]
pub struct VelocitySummary {
    /// One entry per month on the axis, chronological, zero months included.
    pub months: Vec<MonthlyAggregate>,
    /// Chart series starting at the first month with any tests.
    pub series: TrimmedSeries<String>,
    pub total_integration: usize,
    pub total_unit: usize,
    /// Records that passed the filter.
    pub matched: usize,
    /// Matched integration/unit records whose month is not on the axis.
    pub off_axis: usize,
    /// Every author in the data set, sorted; the filter's option list.
    pub authors: Vec<String>,
    /// Every project in the data set, sorted.
    pub projects: Vec<String>,
    /// Up to [`LATEST_TESTS_COUNT`] matched records, newest first.
    pub latest: Vec<TestRecord>,
    /// `author_test_count`, highest count first, ties by name.
    pub author_counts: Vec<(String, u64)>,
}

impl VelocitySummary {
    pub fn total(&self) -> usize {
        self.total_integration + self.total_unit
    }

    /// The axis entry for `month` (`YYYY-MM`, month may be unpadded).
    ///
    /// `None` when the month is malformed or not on the axis.
    pub fn month(&self, month: &str) -> Option<&MonthlyAggregate> {
        let label = month_label(parse_month(month)?);
        self.months.iter().find(|m| m.month == label)
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Compute the [`VelocitySummary`] for `data` under `filter`.
///
/// The month axis comes from `data.monthly_aggregates`, restricted to months
/// that overlap the filter's cutoff, so a month whose first day precedes the
/// cutoff is still shown when part of it falls inside the window.
///
/// The chart series are trimmed with [`trim_leading_zeros`]; its length
/// check is passed through rather than swallowed.
pub fn compute(data: &AuthorshipData, filter: &RecordFilter) -> Result<VelocitySummary, TrimError> {
    let matched = filter.apply(&data.test_metadata);
    let axis = month_axis(&data.monthly_aggregates, filter.cutoff);
    let months = aggregate(&matched, &axis);

    let total_integration = months.iter().map(|m| m.integration_count).sum();
    let total_unit = months.iter().map(|m| m.unit_count).sum::<usize>();

    let bucketed = matched
        .iter()
        .filter(|r| matches!(r.test_type, TestKind::Integration | TestKind::Unit))
        .count();
    let off_axis = bucketed - (total_integration + total_unit);
    if off_axis > 0 {
        tracing::warn!(off_axis, "records fall in months missing from the aggregate skeleton");
    }

    let integration: Vec<usize> = months.iter().map(|m| m.integration_count).collect();
    let unit: Vec<usize> = months.iter().map(|m| m.unit_count).collect();
    let labels: Vec<String> = months.iter().map(|m| m.month.clone()).collect();
    let series = trim_leading_zeros(&integration, &unit, &labels)?;

    let authors: BTreeSet<String> = data.test_metadata.iter().map(|r| r.author.clone()).collect();
    let projects: BTreeSet<String> = data.test_metadata.iter().map(|r| r.project.clone()).collect();

    let mut author_counts: Vec<(String, u64)> = data
        .author_test_count
        .iter()
        .map(|(a, n)| (a.clone(), *n))
        .collect();
    author_counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    Ok(VelocitySummary {
        latest: latest_tests(&matched, LATEST_TESTS_COUNT),
        matched: matched.len(),
        months,
        series,
        total_integration,
        total_unit,
        off_axis,
        authors: authors.into_iter().collect(),
        projects: projects.into_iter().collect(),
        author_counts,
    })
}

/// Normalised month labels from the skeleton that end on or after `cutoff`.
///
/// Skeleton entries that are not a `YYYY-MM` month are dropped.
pub fn month_axis(skeleton: &[MonthEntry], cutoff: DateTime<Utc>) -> Vec<String> {
    let cutoff_month = (cutoff.year(), cutoff.month());
    skeleton
        .iter()
        .filter_map(|entry| match parse_month(&entry.month) {
            Some(ym) if ym >= cutoff_month => Some(month_label(ym)),
            Some(_) => None,
            None => {
                tracing::debug!(month = %entry.month, "skipping malformed skeleton month");
                None
            }
        })
        .collect()
}

/// Bucket `records` into one [`MonthlyAggregate`] per entry of `months`.
///
/// Output order follows `months`.  Months without records are kept with zero
/// counts; records whose month is not listed, or whose type is neither
/// integration nor unit, are not counted anywhere.
pub fn aggregate(records: &[TestRecord], months: &[String]) -> Vec<MonthlyAggregate> {
    let mut by_month: HashMap<&str, MonthlyAggregate> = months
        .iter()
        .map(|m| (m.as_str(), MonthlyAggregate::empty(m.clone())))
        .collect();

    for record in records {
        let Some(bucket) = by_month.get_mut(record.month()) else {
            continue;
        };
        match record.test_type {
            TestKind::Integration => bucket.integration_details.push(record.clone()),
            TestKind::Unit => bucket.unit_details.push(record.clone()),
            TestKind::Other => {}
        }
    }

    months
        .iter()
        .filter_map(|m| by_month.remove(m.as_str()))
        .map(|mut agg| {
            agg.integration_count = agg.integration_details.len();
            agg.unit_count = agg.unit_details.len();
            agg
        })
        .collect()
}

/// Drop the leading run of entries where both series are zero.
///
/// Interior and trailing zeros are kept.  All-zero input yields three empty
/// series.  Fails if the three inputs differ in length.
pub fn trim_leading_zeros<L: Clone>(
    first: &[usize],
    second: &[usize],
    labels: &[L],
) -> Result<TrimmedSeries<L>, TrimError> {
    if first.len() != second.len() || first.len() != labels.len() {
        return Err(TrimError::LengthMismatch {
            first: first.len(),
            second: second.len(),
            labels: labels.len(),
        });
    }

    let start = first
        .iter()
        .zip(second)
        .position(|(a, b)| *a != 0 || *b != 0)
        .unwrap_or(first.len());

    Ok(TrimmedSeries {
        integration: first[start..].to_vec(),
        unit: second[start..].to_vec(),
        labels: labels[start..].to_vec(),
    })
}

/// The `n` newest records by timestamp; equal timestamps keep input order.
pub fn latest_tests(records: &[TestRecord], n: usize) -> Vec<TestRecord> {
    let mut dated: Vec<(Option<DateTime<Utc>>, &TestRecord)> = records
        .iter()
        .map(|r| (parse_timestamp(&r.timestamp), r))
        .collect();
    // `sort_by` is stable; `None` sorts last under the reversed comparison.
    dated.sort_by(|a, b| b.0.cmp(&a.0));
    dated.into_iter().take(n).map(|(_, r)| r.clone()).collect()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse `YYYY-MM` (month may be unpadded) into `(year, month)`.
pub fn parse_month(s: &str) -> Option<(i32, u32)> {
    let (y, m) = s.trim().split_once('-')?;
    let year: i32 = y.parse().ok()?;
    let month: u32 = m.get(..2.min(m.len()))?.trim_end_matches('-').parse().ok()?;
    if y.len() != 4 || !(1..=12).contains(&month) {
        return None;
    }
    Some((year, month))
}

/// Zero-padded `YYYY-MM` label.
pub fn month_label((year, month): (i32, u32)) -> String {
    format!("{year:04}-{month:02}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::ALL;
    use chrono::TimeZone;

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn rec(author: &str, project: &str, kind: TestKind, timestamp: &str) -> TestRecord {
        TestRecord {
            author: author.to_owned(),
            project: project.to_owned(),
            package: "com/acme".to_owned(),
            class: "WidgetIT".to_owned(),
            test: format!("test_{timestamp}"),
            test_type: kind,
            timestamp: timestamp.to_owned(),
        }
    }

    fn skeleton(months: &[&str]) -> Vec<MonthEntry> {
        months
            .iter()
            .map(|m| MonthEntry {
                month: (*m).to_owned(),
            })
            .collect()
    }

    fn labels(months: &[&str]) -> Vec<String> {
        months.iter().map(|m| (*m).to_owned()).collect()
    }

    fn sample_data() -> AuthorshipData {
        AuthorshipData {
            test_metadata: vec![
                rec("Ada", "core", TestKind::Integration, "2024-02-03"),
                rec("Bob", "core", TestKind::Unit, "2024-02-20"),
                rec("Ada", "web", TestKind::Unit, "2024-04-01"),
                rec("Cy", "web", TestKind::Integration, "2024-05-09"),
                rec("Ada", "core", TestKind::Integration, "2024-05-30"),
            ],
            monthly_aggregates: skeleton(&["2024-01", "2024-02", "2024-03", "2024-04", "2024-05"]),
            author_test_count: [("Ada".to_owned(), 3), ("Bob".to_owned(), 1), ("Cy".to_owned(), 1)]
                .into_iter()
                .collect(),
        }
    }

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    // -----------------------------------------------------------------------
    // aggregate
    // -----------------------------------------------------------------------

    #[test]
    fn zero_months_are_kept_in_axis_order() {
        let data = sample_data();
        let months = aggregate(&data.test_metadata, &labels(&["2024-01", "2024-02", "2024-03"]));
        let got: Vec<(&str, usize, usize)> = months
            .iter()
            .map(|m| (m.month.as_str(), m.integration_count, m.unit_count))
            .collect();
        assert_eq!(got, vec![("2024-01", 0, 0), ("2024-02", 1, 1), ("2024-03", 0, 0)]);
    }

    #[test]
    fn counts_equal_detail_lengths() {
        let data = sample_data();
        for m in aggregate(&data.test_metadata, &labels(&["2024-02", "2024-05"])) {
            assert_eq!(m.integration_count, m.integration_details.len());
            assert_eq!(m.unit_count, m.unit_details.len());
        }
    }

    #[test]
    fn details_keep_input_order() {
        let data = sample_data();
        let may = &aggregate(&data.test_metadata, &labels(&["2024-05"]))[0];
        let authors: Vec<&str> = may.integration_details.iter().map(|r| r.author.as_str()).collect();
        assert_eq!(authors, vec!["Cy", "Ada"]);
    }

    #[test]
    fn other_test_types_are_not_bucketed() {
        let records = vec![rec("Ada", "core", TestKind::Other, "2024-02-03")];
        let months = aggregate(&records, &labels(&["2024-02"]));
        assert_eq!(months[0].total(), 0);
    }

    #[test]
    fn details_for_both_chains_integration_then_unit() {
        let data = sample_data();
        let feb = &aggregate(&data.test_metadata, &labels(&["2024-02"]))[0];
        let both: Vec<&str> = feb
            .details_for(DetailKind::Both)
            .iter()
            .map(|r| r.author.as_str())
            .collect();
        assert_eq!(both, vec!["Ada", "Bob"]);
        assert_eq!(feb.details_for(DetailKind::Unit).len(), 1);
    }

    #[test]
    fn detail_kind_parses_case_insensitively() {
        assert_eq!("Integration".parse::<DetailKind>().unwrap(), DetailKind::Integration);
        assert_eq!("unit".parse::<DetailKind>().unwrap(), DetailKind::Unit);
        assert!("system".parse::<DetailKind>().is_err());
    }

    #[test]
    fn summary_month_lookup_normalises_label() {
        let s = compute(&sample_data(), &RecordFilter::default()).unwrap();
        let may = s.month("2024-5").unwrap();
        assert_eq!(may.details_for(DetailKind::Integration).len(), 2);
        assert_eq!(s.month("2024-01").unwrap().total(), 0);
        assert!(s.month("2023-12").is_none());
        assert!(s.month("May").is_none());
    }

    // -----------------------------------------------------------------------
    // month_axis
    // -----------------------------------------------------------------------

    #[test]
    fn axis_keeps_the_month_containing_the_cutoff() {
        let axis = month_axis(
            &skeleton(&["2023-12", "2024-01", "2024-02"]),
            utc(2024, 1, 15),
        );
        assert_eq!(axis, labels(&["2024-01", "2024-02"]));
    }

    #[test]
    fn axis_normalises_and_drops_malformed_months() {
        let axis = month_axis(&skeleton(&["2024-1", "garbage", "2024-13", "2024-02"]), DateTime::UNIX_EPOCH);
        assert_eq!(axis, labels(&["2024-01", "2024-02"]));
    }

    // -----------------------------------------------------------------------
    // compute
    // -----------------------------------------------------------------------

    #[test]
    fn totals_match_filtered_record_count() {
        let data = sample_data();
        for author in [ALL, "Ada", "Bob", "Cy", "Nobody"] {
            let f = RecordFilter::new(author, ALL, DateTime::UNIX_EPOCH);
            let s = compute(&data, &f).unwrap();
            assert_eq!(s.total(), f.apply(&data.test_metadata).len(), "author={author}");
            assert_eq!(s.off_axis, 0);
        }
    }

    #[test]
    fn totals_hold_with_a_mid_month_cutoff() {
        let data = sample_data();
        let f = RecordFilter::new(ALL, ALL, utc(2024, 2, 10));
        let s = compute(&data, &f).unwrap();
        assert_eq!(s.matched, 4);
        assert_eq!(s.total(), 4);
        assert_eq!(s.months.first().unwrap().month, "2024-02");
    }

    #[test]
    fn series_trims_leading_empty_months() {
        let s = compute(&sample_data(), &RecordFilter::default()).unwrap();
        assert_eq!(s.months.len(), 5);
        assert_eq!(s.series.labels, labels(&["2024-02", "2024-03", "2024-04", "2024-05"]));
        assert_eq!(s.series.integration, vec![1, 0, 0, 2]);
        assert_eq!(s.series.unit, vec![1, 0, 1, 0]);
    }

    #[test]
    fn options_cover_full_data_set() {
        let f = RecordFilter::new("Bob", ALL, DateTime::UNIX_EPOCH);
        let s = compute(&sample_data(), &f).unwrap();
        assert_eq!(s.authors, vec!["Ada", "Bob", "Cy"]);
        assert_eq!(s.projects, vec!["core", "web"]);
        assert_eq!(s.total(), 1);
    }

    #[test]
    fn author_counts_sorted_by_count_then_name() {
        let s = compute(&sample_data(), &RecordFilter::default()).unwrap();
        assert_eq!(
            s.author_counts,
            vec![("Ada".to_owned(), 3), ("Bob".to_owned(), 1), ("Cy".to_owned(), 1)]
        );
    }

    #[test]
    fn off_axis_records_are_reported() {
        let mut data = sample_data();
        data.monthly_aggregates = skeleton(&["2024-02"]);
        let s = compute(&data, &RecordFilter::default()).unwrap();
        assert_eq!(s.total(), 2);
        assert_eq!(s.off_axis, 3);
    }

    #[test]
    fn empty_data_gives_empty_summary() {
        let s = compute(&AuthorshipData::default(), &RecordFilter::default()).unwrap();
        assert!(s.months.is_empty());
        assert!(s.series.labels.is_empty());
        assert_eq!(s.total(), 0);
    }

    // -----------------------------------------------------------------------
    // trim_leading_zeros
    // -----------------------------------------------------------------------

    #[test]
    fn trim_drops_only_the_leading_zero_run() {
        let t = trim_leading_zeros(&[0, 0, 3, 0, 5], &[0, 0, 0, 1, 0], &["a", "b", "c", "d", "e"])
            .unwrap();
        assert_eq!(t.integration, vec![3, 0, 5]);
        assert_eq!(t.unit, vec![0, 1, 0]);
        assert_eq!(t.labels, vec!["c", "d", "e"]);
    }

    #[test]
    fn trim_keeps_trailing_zeros() {
        let t = trim_leading_zeros(&[0, 1, 0, 0], &[0, 0, 0, 0], &["a", "b", "c", "d"]).unwrap();
        assert_eq!(t.labels, vec!["b", "c", "d"]);
    }

    #[test]
    fn trim_all_zero_gives_empty_series() {
        let t = trim_leading_zeros(&[0, 0, 0, 0], &[0, 0, 0, 0], &["a", "b", "c", "d"]).unwrap();
        assert!(t.integration.is_empty());
        assert!(t.unit.is_empty());
        assert!(t.labels.is_empty());
    }

    #[test]
    fn trim_no_leading_zeros_is_unchanged() {
        let t = trim_leading_zeros(&[0, 2], &[1, 0], &["a", "b"]).unwrap();
        assert_eq!(t.labels, vec!["a", "b"]);
    }

    #[test]
    fn trim_error_message_names_the_lengths() {
        let err = anyhow::Error::from(TrimError::LengthMismatch {
            first: 1,
            second: 2,
            labels: 1,
        });
        assert_eq!(err.to_string(), "series lengths differ: first=1, second=2, labels=1");
    }

    #[test]
    fn trim_length_mismatch_is_an_error() {
        let err = trim_leading_zeros(&[0, 1, 2], &[0, 1, 2, 3], &["a", "b", "c"]).unwrap_err();
        assert_eq!(
            err,
            TrimError::LengthMismatch {
                first: 3,
                second: 4,
                labels: 3
            }
        );
        assert!(trim_leading_zeros(&[1], &[1], &["a", "b"]).is_err());
    }

    // -----------------------------------------------------------------------
    // latest_tests
    // -----------------------------------------------------------------------

    #[test]
    fn latest_tests_newest_first_and_capped() {
        let data = sample_data();
        let latest = latest_tests(&data.test_metadata, 3);
        let ts: Vec<&str> = latest.iter().map(|r| r.timestamp.as_str()).collect();
        assert_eq!(ts, vec!["2024-05-30", "2024-05-09", "2024-04-01"]);
    }

    #[test]
    fn latest_tests_ties_keep_input_order() {
        let records = vec![
            rec("Ada", "core", TestKind::Unit, "2024-05-01"),
            rec("Bob", "core", TestKind::Unit, "2024-05-01"),
        ];
        let latest = latest_tests(&records, 5);
        assert_eq!(latest[0].author, "Ada");
        assert_eq!(latest[1].author, "Bob");
    }

    // -----------------------------------------------------------------------
    // month helpers
    // -----------------------------------------------------------------------

    #[test]
    fn parse_month_accepts_unpadded() {
        assert_eq!(parse_month("2024-5"), Some((2024, 5)));
        assert_eq!(parse_month("2024-05"), Some((2024, 5)));
        assert_eq!(parse_month("2024-05-13"), Some((2024, 5)));
        assert_eq!(parse_month("2024-00"), None);
        assert_eq!(parse_month("24-05"), None);
    }

    #[test]
    fn month_label_pads() {
        assert_eq!(month_label((2024, 5)), "2024-05");
        assert_eq!(month_label((2024, 12)), "2024-12");
    }
}
