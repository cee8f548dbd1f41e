//! Markdown report renderer.

use anyhow::Result;
use minijinja::Environment;
use serde::Serialize;

use crate::artifacts::TestRecord;
use crate::slowest::format_duration;

use super::text::scope_name;
use super::{
    first_line, fmt_count, fmt_delta, level_marker, month_display, trend_word, CommitStatus,
    Report, COMMITS_UNAVAILABLE, NO_COMMITS,
};

// ---------------------------------------------------------------------------
// Template
// ---------------------------------------------------------------------------

/// Renders cleanly on a code host and stays readable when `cat`'d raw.
const TEMPLATE: &str = r#"## pulsescope · {{ source }}
{% if velocity %}

### Test velocity

_author **{{ velocity.author }}** · project **{{ velocity.project }}** · window **{{ velocity.window }}**_

| | |
|:--|--:|
| Integration tests | **{{ velocity.integration }}** |
| Unit tests | **{{ velocity.unit }}** |
| Total | **{{ velocity.total }}** |

{% if velocity.months %}
| Month | Integration | Unit |
|:------|------------:|-----:|
{% for m in velocity.months %}| {{ m.label }} | {{ m.integration }} | {{ m.unit }} |
{% endfor %}
{% else %}
No tests match this filter.
{% endif %}
{% if velocity.details %}

**Tests added in {{ velocity.details.month }}** ({{ velocity.details.kind }})

{% if velocity.details.tests %}
| Date | Author | Project | Test |
|:-----|:-------|:--------|:-----|
{% for t in velocity.details.tests %}| {{ t.timestamp }} | {{ t.author }} | {{ t.project }} | `{{ t.class }}.{{ t.test }}` |
{% endfor %}
{% else %}
None.
{% endif %}
{% endif %}
{% if velocity.latest %}

**Latest tests**

| Date | Author | Project | Test |
|:-----|:-------|:--------|:-----|
{% for t in velocity.latest %}| {{ t.timestamp }} | {{ t.author }} | {{ t.project }} | `{{ t.class }}.{{ t.test }}` |
{% endfor %}
{% endif %}
{% if velocity.authors %}

**Tests by author**

| Author | Tests |
|:-------|------:|
{% for a in velocity.authors %}| {{ a.name }} | {{ a.count }} |
{% endfor %}
{% endif %}
{% endif %}
{% if run %}

### Execution `{{ run.execution }}`

_{{ run.time }} · branch `{{ run.branch }}` · duration {{ run.duration }}{% if run.compared %} · compared with `{{ run.compared }}`{% endif %}_
{% if run.counts %}

| Result | Count | Δ | |
|:-------|------:|--:|:--|
{% for c in run.counts %}| {{ c.outcome }} | {{ c.current }} | {{ c.delta }} | {{ c.trend }} |
{% endfor %}
{% endif %}
{% if run.trend %}

| Run | Failed | Error | Skipped |
|:----|-------:|------:|--------:|
{% for t in run.trend %}| {{ t.label }} | {{ t.failed }} | {{ t.error }} | {{ t.skipped }} |
{% endfor %}
{% endif %}
{% if run.results is not none %}

**Results** ({{ run.results_scope }}, project {{ run.results_project }})

{% if run.results %}
| Project | Class | Test | Result |
|:--------|:------|:-----|:-------|
{% for r in run.results %}| {{ r.project }} | {{ r.class }} | `{{ r.test }}` | {{ r.result }} |
{% endfor %}
{% else %}
No matching results.
{% endif %}
{% endif %}
{% for d in run.deltas %}

**Changes touching {{ d.category }}** ({{ d.entries | length }})

{% if d.entries %}
| Test | Class | Project | Previous | Current |
|:-----|:------|:--------|:---------|:--------|
{% for e in d.entries %}| `{{ e.test }}` | {{ e.class }} | {{ e.project }} | {{ e.previous }} | {{ e.current }} |
{% endfor %}
{% else %}
No changes.
{% endif %}
{% endfor %}
{% if run.slowest is not none %}

**Slowest {{ run.slowest_count }} tests**{% if run.exclude_fixtures %} (fixtures excluded){% endif %}


| # | Duration | Class | Test |
|--:|---------:|:------|:-----|
{% for s in run.slowest %}| {{ loop.index }} | {{ s.duration }} {{ s.marker }} | {{ s.class }} | `{{ s.test }}` |
{% endfor %}
{% if run.projects %}

| Project | Duration |
|:--------|---------:|
{% for p in run.projects %}| {{ p.name }} | {{ p.duration }} {{ p.marker }} |
{% endfor %}
{% endif %}
{% endif %}
{% if run.commits is not none %}

**Commits**

{% if run.commits %}
| Repo | Commit | Author | Date | Message |
|:-----|:-------|:-------|:-----|:--------|
{% for c in run.commits %}| {{ c.repo }} | `{{ c.hash }}` | {{ c.author }} | {{ c.date }} | {{ c.message }} |
{% endfor %}
{% else %}
_{{ run.commits_note }}_
{% endif %}
{% endif %}
{% endif %}
{% if metrics %}

### Project metrics

| | |
|:--|--:|
| Test classes | **{{ metrics.classes }}** |
| Test cases | **{{ metrics.cases }}** |
| Ignored | **{{ metrics.ignored }}** ({{ metrics.percentage }}%) |

{% if metrics.rows %}
| Project | Classes | Cases | Ignored | % |
|:--------|--------:|------:|--------:|--:|
{% for r in metrics.rows %}| {{ r.name }} | {{ r.classes }} | {{ r.cases }} | {{ r.ignored }} | {{ r.percentage }} |
{% endfor %}
{% endif %}
{% endif %}

---

_Generated {{ generated_at }}_
"#;

// ---------------------------------------------------------------------------
// Context types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct VelocityCtx<'a> {
    author: &'a str,
    project: &'a str,
    window: &'a str,
    integration: String,
    unit: String,
    total: String,
    months: Vec<MonthRow>,
    details: Option<DetailsCtx<'a>>,
    latest: Vec<&'a TestRecord>,
    authors: Vec<AuthorRow<'a>>,
}

#[derive(Serialize)]
struct DetailsCtx<'a> {
    month: String,
    kind: &'static str,
    tests: &'a [&'a TestRecord],
}

#[derive(Serialize)]
struct AuthorRow<'a> {
    name: &'a str,
    count: String,
}

#[derive(Serialize)]
struct MonthRow {
    label: String,
    integration: usize,
    unit: usize,
}

#[derive(Serialize)]
struct RunCtx<'a> {
    execution: &'a str,
    compared: Option<&'a str>,
    time: &'a str,
    branch: &'a str,
    duration: &'a str,
    counts: Vec<CountRow>,
    trend: Vec<TrendRow<'a>>,
    results: Option<Vec<ResultRow<'a>>>,
    results_scope: &'a str,
    results_project: &'a str,
    deltas: Vec<DeltaCtx>,
    slowest: Option<Vec<SlowRow<'a>>>,
    slowest_count: usize,
    exclude_fixtures: bool,
    projects: Vec<ProjectDurationRow<'a>>,
    commits: Option<Vec<CommitCtx<'a>>>,
    commits_note: &'static str,
}

#[derive(Serialize)]
struct CountRow {
    outcome: &'static str,
    current: String,
    delta: String,
    trend: &'static str,
}

#[derive(Serialize)]
struct TrendRow<'a> {
    label: &'a str,
    failed: u64,
    error: u64,
    skipped: u64,
}

#[derive(Serialize)]
struct ResultRow<'a> {
    project: &'a str,
    class: &'a str,
    test: &'a str,
    result: &'static str,
}

#[derive(Serialize)]
struct DeltaCtx {
    category: &'static str,
    entries: Vec<DeltaRow>,
}

#[derive(Serialize)]
struct DeltaRow {
    test: String,
    class: String,
    project: String,
    previous: String,
    current: String,
}

#[derive(Serialize)]
struct SlowRow<'a> {
    duration: String,
    marker: &'static str,
    class: &'a str,
    test: &'a str,
}

#[derive(Serialize)]
struct ProjectDurationRow<'a> {
    name: &'a str,
    duration: String,
    marker: &'static str,
}

#[derive(Serialize)]
struct CommitCtx<'a> {
    repo: &'static str,
    hash: &'a str,
    author: &'a str,
    date: &'a str,
    message: &'a str,
}

#[derive(Serialize)]
struct MetricsCtx<'a> {
    classes: String,
    cases: String,
    ignored: String,
    percentage: String,
    rows: Vec<MetricRow<'a>>,
}

#[derive(Serialize)]
struct MetricRow<'a> {
    name: &'a str,
    classes: String,
    cases: String,
    ignored: String,
    percentage: String,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Render every section present in `report` as markdown.
pub fn render(report: &Report) -> Result<String> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);

    let velocity = report.velocity.as_ref().map(|v| {
        let s = v.summary;
        VelocityCtx {
            author: v.author,
            project: v.project,
            window: v.window,
            integration: fmt_count(s.total_integration as i64),
            unit: fmt_count(s.total_unit as i64),
            total: fmt_count(s.total() as i64),
            months: s
                .series
                .labels
                .iter()
                .zip(&s.series.integration)
                .zip(&s.series.unit)
                .map(|((label, &integration), &unit)| MonthRow {
                    label: month_display(label),
                    integration,
                    unit,
                })
                .collect(),
            details: v.details.as_ref().map(|d| DetailsCtx {
                month: month_display(d.month),
                kind: d.kind.as_str(),
                tests: &d.tests,
            }),
            latest: s.latest.iter().collect(),
            authors: s
                .author_counts
                .iter()
                .map(|(name, n)| AuthorRow {
                    name: name.as_str(),
                    count: fmt_count(*n as i64),
                })
                .collect(),
        }
    });

    let run = report.run.as_ref().map(|run| RunCtx {
        execution: run.selection.map(|s| s.execution.as_str()).unwrap_or("-"),
        compared: run.selection.and_then(|s| s.compared.as_deref()),
        time: run.execution_time.unwrap_or("-"),
        branch: run.test_branch,
        duration: run.duration.unwrap_or("-"),
        counts: run
            .counts
            .iter()
            .map(|d| CountRow {
                outcome: d.outcome.as_str(),
                current: fmt_count(d.current as i64),
                delta: fmt_delta(d),
                trend: trend_word(d),
            })
            .collect(),
        trend: run
            .trend
            .iter()
            .flat_map(|t| {
                t.labels.iter().enumerate().map(move |(i, label)| TrendRow {
                    label,
                    failed: t.failed[i],
                    error: t.error[i],
                    skipped: t.skipped[i],
                })
            })
            .collect(),
        results: run.results.as_ref().map(|table| {
            table
                .groups
                .iter()
                .flat_map(|g| g.classes.iter())
                .flat_map(|c| c.tests.iter())
                .map(|r| ResultRow {
                    project: &r.project_name,
                    class: &r.class_name,
                    test: &r.test_name,
                    result: r.result.as_str(),
                })
                .collect()
        }),
        results_scope: run.results.as_ref().map(|t| t.scope).unwrap_or(scope_name(Default::default())),
        results_project: run.results.as_ref().map(|t| t.project).unwrap_or(crate::filter::ALL),
        deltas: run
            .deltas
            .iter()
            .map(|d| DeltaCtx {
                category: d.category.as_str(),
                entries: d
                    .entries
                    .iter()
                    .map(|e| DeltaRow {
                        test: e.test_name.clone(),
                        class: e.class_name.clone(),
                        project: e.project_name.clone(),
                        previous: e.previous_result.to_string(),
                        current: e.current_result.to_string(),
                    })
                    .collect(),
            })
            .collect(),
        slowest: run.slowest.as_ref().map(|s| {
            s.tests
                .iter()
                .map(|t| SlowRow {
                    duration: format_duration(t.seconds()),
                    marker: level_marker(t.level),
                    class: &t.result.class_name,
                    test: &t.result.test_name,
                })
                .collect()
        }),
        slowest_count: run.slowest.as_ref().map_or(0, |s| s.count),
        exclude_fixtures: run.slowest.as_ref().is_some_and(|s| s.exclude_fixtures),
        projects: run
            .slowest
            .iter()
            .flat_map(|s| s.projects.iter())
            .map(|p| ProjectDurationRow {
                name: &p.project_name,
                duration: format_duration(p.seconds),
                marker: level_marker(p.level),
            })
            .collect(),
        commits: run.commits.as_ref().map(|c| match c {
            CommitStatus::Unavailable => Vec::new(),
            CommitStatus::Found(rows) => rows
                .iter()
                .map(|r| CommitCtx {
                    repo: r.repo.as_str(),
                    hash: r.short_hash,
                    author: &r.commit.author,
                    date: &r.commit.date,
                    message: first_line(&r.commit.message),
                })
                .collect(),
        }),
        commits_note: match run.commits {
            Some(CommitStatus::Found(_)) => NO_COMMITS,
            _ => COMMITS_UNAVAILABLE,
        },
    });

    let metrics = report.metrics.as_ref().map(|m| MetricsCtx {
        classes: fmt_count(m.total_classes as i64),
        cases: fmt_count(m.total_cases as i64),
        ignored: fmt_count(m.total_ignored as i64),
        percentage: format!("{:.2}", m.ignored_percentage),
        rows: m
            .rows
            .iter()
            .map(|r| MetricRow {
                name: &r.project_name,
                classes: fmt_count(r.total_classes as i64),
                cases: fmt_count(r.total_cases as i64),
                ignored: fmt_count(r.total_ignored as i64),
                percentage: format!("{:.2}", r.ignored_percentage),
            })
            .collect(),
    });

    let generated_at = chrono::Utc::now().format("%Y-%m-%d").to_string();

    let ctx = minijinja::context! {
        source       => &report.source,
        velocity     => velocity,
        run          => run,
        metrics      => metrics,
        generated_at => generated_at,
    };

    Ok(env.render_str(TEMPLATE, ctx)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
