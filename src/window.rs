//! Symbolic time windows for the authorship velocity view.

use chrono::{DateTime, Months, Utc};
use serde::Serialize;

/// How far back the velocity view looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeWindow {
    #[default]
    All,
    Last6Months,
    LastYear,
}

impl TimeWindow {
    /// Map a selector tag to a window.  Unrecognised tags mean [`TimeWindow::All`].
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim() {
            "last_6_months" => TimeWindow::Last6Months,
            "last_year" => TimeWindow::LastYear,
            _ => TimeWindow::All,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            TimeWindow::All => "all",
            TimeWindow::Last6Months => "last_6_months",
            TimeWindow::LastYear => "last_year",
        }
    }

    /// Earliest instant included by this window, relative to `now`.
    ///
    /// Rollback is by calendar month, not by a fixed number of days.  When the
    /// target month is shorter than `now`'s day of month, the day is clamped
    /// to the target month's last day: 2024-08-31 minus six months is
    /// 2024-02-29, and 2024-02-29 minus one year is 2023-02-28.  Time of day is
    /// preserved.
    pub fn cutoff(self, now: DateTime<Utc>) -> DateTime<Utc> {
        let months = match self {
            TimeWindow::All => return DateTime::UNIX_EPOCH,
            TimeWindow::Last6Months => 6,
            TimeWindow::LastYear => 12,
        };
        now.checked_sub_months(Months::new(months))
            .unwrap_or(DateTime::UNIX_EPOCH)
    }
}

impl From<&str> for TimeWindow {
    fn from(tag: &str) -> Self {
        TimeWindow::from_tag(tag)
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}
