//! Plain-text terminal report.

use std::fmt::Write;

use anyhow::Result;

use crate::executions::ResultScope;
use crate::slowest::format_duration;
use crate::stats::VelocitySummary;

use super::{
    bar, first_line, fmt_count, fmt_delta, level_marker, month_display, trend_word, truncate,
    CommitStatus, Report, RunSection, VelocitySection, COMMITS_UNAVAILABLE, NO_COMMITS,
};
use crate::metrics::MetricsSummary;

const WIDTH: usize = 60;
const BAR_WIDTH: usize = 30;

/// Render every section present in `report`.
pub fn render(report: &Report) -> Result<String> {
    let mut out = String::new();
    header(&mut out, &report.source)?;

    if let Some(v) = &report.velocity {
        velocity(&mut out, v)?;
    }
    if let Some(run) = &report.run {
        run_section(&mut out, run)?;
    }
    if let Some(m) = &report.metrics {
        metrics(&mut out, m)?;
    }

    writeln!(out)?;
    Ok(out)
}

fn header(out: &mut String, source: &str) -> std::fmt::Result {
    let bar = "─".repeat(WIDTH);
    let source = truncate(source, WIDTH - 16);
    writeln!(out)?;
    writeln!(out, "┌{bar}┐")?;
    writeln!(out, "│  pulsescope · {source:<width$}│", width = WIDTH - 15)?;
    writeln!(out, "└{bar}┘")
}

fn section(out: &mut String, title: &str) -> std::fmt::Result {
    writeln!(out)?;
    writeln!(out, "  {title}")?;
    writeln!(out, "  {}", "─".repeat(title.chars().count()))
}

// ---------------------------------------------------------------------------
// Velocity
// ---------------------------------------------------------------------------

fn velocity(out: &mut String, v: &VelocitySection) -> std::fmt::Result {
    let s: &VelocitySummary = v.summary;
    section(out, "Test velocity")?;
    writeln!(
        out,
        "  author {}  ·  project {}  ·  window {}",
        v.author, v.project, v.window
    )?;
    writeln!(out)?;
    writeln!(
        out,
        "  Integration {:>7}   Unit {:>7}   Total {:>7}",
        fmt_count(s.total_integration as i64),
        fmt_count(s.total_unit as i64),
        fmt_count(s.total() as i64),
    )?;

    if s.series.labels.is_empty() {
        writeln!(out)?;
        writeln!(out, "  No tests match this filter.")?;
    } else {
        let max = s
            .series
            .integration
            .iter()
            .zip(&s.series.unit)
            .map(|(i, u)| i + u)
            .max()
            .unwrap_or_default();
        writeln!(out)?;
        writeln!(out, "  {:<9} {:>6} {:>6}", "Month", "Integ", "Unit")?;
        for ((label, i), u) in s.series.labels.iter().zip(&s.series.integration).zip(&s.series.unit) {
            writeln!(
                out,
                "  {:<9} {:>6} {:>6}  {}",
                month_display(label),
                i,
                u,
                bar(i + u, max, BAR_WIDTH)
            )?;
        }
    }

    if let Some(d) = &v.details {
        writeln!(out)?;
        writeln!(
            out,
            "  Tests added in {} ({})",
            month_display(d.month),
            d.kind.as_str()
        )?;
        if d.tests.is_empty() {
            writeln!(out, "    None.")?;
        }
        for r in &d.tests {
            writeln!(
                out,
                "    {:<10} {:<16} {:<12} {}.{}",
                r.timestamp,
                truncate(&r.author, 16),
                truncate(&r.project, 12),
                r.class,
                r.test
            )?;
        }
    }

    if !s.latest.is_empty() {
        writeln!(out)?;
        writeln!(out, "  Latest tests")?;
        for r in &s.latest {
            writeln!(
                out,
                "    {:<10} {:<16} {}.{}",
                r.timestamp,
                truncate(&r.author, 16),
                r.class,
                r.test
            )?;
        }
    }

    if !s.author_counts.is_empty() {
        writeln!(out)?;
        writeln!(out, "  Tests by author")?;
        for (author, n) in &s.author_counts {
            writeln!(out, "    {:<36} {:>7}", truncate(author, 36), fmt_count(*n as i64))?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

fn run_section(out: &mut String, run: &RunSection) -> std::fmt::Result {
    let title = match run.selection {
        Some(sel) => format!("Execution {}", sel.execution),
        None => "Execution".to_owned(),
    };
    section(out, &title)?;
    writeln!(
        out,
        "  time {}  ·  branch {}  ·  duration {}",
        run.execution_time.unwrap_or("-"),
        if run.test_branch.is_empty() { "-" } else { run.test_branch },
        run.duration.unwrap_or("-"),
    )?;
    if let Some(compared) = run.selection.and_then(|s| s.compared.as_deref()) {
        writeln!(out, "  compared with {compared}")?;
    }

    if !run.counts.is_empty() {
        writeln!(out)?;
        for d in &run.counts {
            writeln!(
                out,
                "  {:<8} {:>7}  {:<10} {}",
                d.outcome.as_str(),
                fmt_count(d.current as i64),
                fmt_delta(d),
                trend_word(d)
            )?;
        }
    }

    if let Some(trend) = &run.trend {
        if !trend.labels.is_empty() {
            writeln!(out)?;
            writeln!(out, "  {:<18} {:>6} {:>6} {:>7}", "Run", "Failed", "Error", "Skipped")?;
            for (i, label) in trend.labels.iter().enumerate() {
                writeln!(
                    out,
                    "  {:<18} {:>6} {:>6} {:>7}",
                    label, trend.failed[i], trend.error[i], trend.skipped[i]
                )?;
            }
        }
    }

    if let Some(table) = &run.results {
        writeln!(out)?;
        writeln!(out, "  Results ({}, project {})", table.scope, table.project)?;
        if table.groups.is_empty() {
            let what = if table.scope == scope_name(ResultScope::Failures) {
                "No failed or errored tests."
            } else {
                "No results."
            };
            writeln!(out, "    {what}")?;
        }
        for g in &table.groups {
            writeln!(out, "    {} ({})", g.project_name, g.test_count())?;
            for c in &g.classes {
                writeln!(out, "      {}", c.class_name)?;
                for r in &c.tests {
                    writeln!(out, "        {:<8} {}", r.result.as_str(), r.test_name)?;
                    if let Some(trace) = r.trace() {
                        writeln!(out, "                 {}", truncate(first_line(trace), WIDTH))?;
                    }
                }
            }
        }
    }

    for d in &run.deltas {
        writeln!(out)?;
        writeln!(out, "  Changes touching {} ({})", d.category, d.entries.len())?;
        for e in &d.entries {
            writeln!(
                out,
                "    {:<12} → {:<12} {}.{}",
                e.previous_result.to_string(),
                e.current_result.to_string(),
                e.class_name,
                e.test_name
            )?;
        }
    }

    if let Some(slow) = &run.slowest {
        writeln!(out)?;
        writeln!(
            out,
            "  Slowest {} tests{}",
            slow.count,
            if slow.exclude_fixtures { " (fixtures excluded)" } else { "" }
        )?;
        for (rank, t) in slow.tests.iter().enumerate() {
            writeln!(
                out,
                "    {:>3}. {:>10} {:<1} {}.{}",
                rank + 1,
                format_duration(t.seconds()),
                level_marker(t.level),
                t.result.class_name,
                t.result.test_name
            )?;
        }
        if !slow.projects.is_empty() {
            writeln!(out)?;
            writeln!(out, "  Project durations")?;
            for p in &slow.projects {
                writeln!(
                    out,
                    "    {:<36} {:>10} {}",
                    truncate(&p.project_name, 36),
                    format_duration(p.seconds),
                    level_marker(p.level)
                )?;
            }
        }
    }

    if let Some(commits) = &run.commits {
        writeln!(out)?;
        writeln!(out, "  Commits")?;
        match commits {
            CommitStatus::Unavailable => writeln!(out, "    {COMMITS_UNAVAILABLE}")?,
            CommitStatus::Found(rows) if rows.is_empty() => writeln!(out, "    {NO_COMMITS}")?,
            CommitStatus::Found(rows) => {
                for row in rows {
                    writeln!(
                        out,
                        "    {:<10} {} {:<16} {}",
                        row.repo.as_str(),
                        row.short_hash,
                        truncate(&row.commit.author, 16),
                        truncate(first_line(&row.commit.message), 48)
                    )?;
                }
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

fn metrics(out: &mut String, m: &MetricsSummary) -> std::fmt::Result {
    section(out, "Project metrics")?;
    writeln!(
        out,
        "  Classes {:>7}   Cases {:>7}   Ignored {:>6} ({:.2}%)",
        fmt_count(m.total_classes as i64),
        fmt_count(m.total_cases as i64),
        fmt_count(m.total_ignored as i64),
        m.ignored_percentage,
    )?;
    if m.rows.is_empty() {
        writeln!(out, "  No project metrics available.")?;
        return Ok(());
    }
    writeln!(out)?;
    for row in &m.rows {
        writeln!(
            out,
            "    {:<32} {:>6} {:>7} {:>6} {:>7.2}%",
            truncate(&row.project_name, 32),
            fmt_count(row.total_classes as i64),
            fmt_count(row.total_cases as i64),
            fmt_count(row.total_ignored as i64),
            row.ignored_percentage,
        )?;
        for ignored in &row.ignored_tests {
            writeln!(out, "        ignored {}.{}", ignored.class_name, ignored.method_name)?;
        }
    }
    Ok(())
}

pub fn scope_name(scope: ResultScope) -> &'static str {
    match scope {
        ResultScope::All => "all",
        ResultScope::Failures => "failures",
    }
}
