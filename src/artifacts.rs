//! Artifact stores and the serde types for every JSON file the test-reporting
//! pipeline publishes.
//!
//! Artifacts are addressed by their path relative to the dashboard root
//! (`test_results/test_results_index.json`, `commit_deltas.json`, …).  A store
//! resolves that path either against an HTTP base URL or a local directory.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Ordered list of every recorded execution.
pub const INDEX_PATH: &str = "test_results/test_results_index.json";

/// Directory holding one JSON file per execution.
pub const RESULTS_DIR: &str = "test_results";

/// Authorship data for the desktop test suites.
pub const AUTHORSHIP_PATH: &str = "test_analysis_results.json";

/// Authorship data for the mobile test suites (same shape).
pub const MOBILE_AUTHORSHIP_PATH: &str = "mobile_test_analysis_results.json";

/// Commits landed between pairs of executions.
pub const COMMIT_DELTAS_PATH: &str = "commit_deltas.json";

/// Per-project class / case / ignored-test counts.
pub const PROJECT_METRICS_PATH: &str = "test_project_metrics.json";

/// Timestamp format written by the pipeline for execution times:
/// `"2024-11-05 15:07:00"` (UTC).
const EXECUTION_TS_FMT: &str = "%Y-%m-%d %H:%M:%S";

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

/// Somewhere the dashboard artifacts can be read from.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Fetch the raw body of the artifact at `path`.
    async fn fetch_text(&self, path: &str) -> Result<String>;

    /// Human-readable location of `path`, used in log lines and errors.
    fn locate(&self, path: &str) -> String;
}

/// Open the store named by `source`: an `http(s)://` base URL or a directory.
pub fn open_store(source: &str) -> Result<Box<dyn ArtifactStore>> {
    if source.starts_with("http://") || source.starts_with("https://") {
        Ok(Box::new(HttpStore::new(source)?))
    } else {
        Ok(Box::new(DirStore::new(source)?))
    }
}

/// Artifacts served over HTTP, e.g. from the published dashboard site.
pub struct HttpStore {
    /// Base URL with no trailing slash.
    base_url: String,
    http: Client,
}

impl HttpStore {
    /// Construct a store for the given base URL.
    ///
    /// `base_url` may optionally end with a `/`; it is normalised away.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            http,
        })
    }
}

#[async_trait]
impl ArtifactStore for HttpStore {
    async fn fetch_text(&self, path: &str) -> Result<String> {
        let url = self.locate(path);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("HTTP {status} for {url}");
        }

        response
            .text()
            .await
            .with_context(|| format!("reading body of {url}"))
    }

    fn locate(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

/// Artifacts in a local checkout of the dashboard directory.
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            bail!("artifact directory {} does not exist", root.display());
        }
        Ok(Self { root })
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let rel = Path::new(path);
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            bail!("artifact path {path:?} escapes the artifact directory");
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl ArtifactStore for DirStore {
    async fn fetch_text(&self, path: &str) -> Result<String> {
        let full = self.resolve(path)?;
        tokio::fs::read_to_string(&full)
            .await
            .with_context(|| format!("reading {}", full.display()))
    }

    fn locate(&self, path: &str) -> String {
        self.root.join(path).display().to_string()
    }
}

// ---------------------------------------------------------------------------
// Typed loaders
// ---------------------------------------------------------------------------

/// Which authorship artifact to read.  Both share one schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuiteVariant {
    #[default]
    Desktop,
    Mobile,
}

impl SuiteVariant {
    pub fn authorship_path(self) -> &'static str {
        match self {
            SuiteVariant::Desktop => AUTHORSHIP_PATH,
            SuiteVariant::Mobile => MOBILE_AUTHORSHIP_PATH,
        }
    }
}

/// Path of the results file for one execution.
pub fn execution_path(filename: &str) -> String {
    format!("{RESULTS_DIR}/{filename}")
}

async fn fetch_json<T: DeserializeOwned>(store: &dyn ArtifactStore, path: &str) -> Result<T> {
    tracing::info!(location = %store.locate(path), "fetching artifact");
    let text = store.fetch_text(path).await?;
    serde_json::from_str(&text).with_context(|| format!("deserialising {}", store.locate(path)))
}

pub async fn load_index(store: &dyn ArtifactStore) -> Result<Vec<ExecutionIndexEntry>> {
    fetch_json(store, INDEX_PATH).await
}

pub async fn load_execution(store: &dyn ArtifactStore, filename: &str) -> Result<ExecutionRun> {
    fetch_json(store, &execution_path(filename)).await
}

pub async fn load_authorship(
    store: &dyn ArtifactStore,
    variant: SuiteVariant,
) -> Result<AuthorshipData> {
    fetch_json(store, variant.authorship_path()).await
}

pub async fn load_commit_deltas(store: &dyn ArtifactStore) -> Result<Vec<CommitDelta>> {
    fetch_json(store, COMMIT_DELTAS_PATH).await
}

/// Project metrics are optional: a missing or broken file yields an empty
/// list and a warning rather than failing the whole report.
pub async fn load_project_metrics(store: &dyn ArtifactStore) -> Vec<ProjectMetric> {
    match fetch_json(store, PROJECT_METRICS_PATH).await {
        Ok(metrics) => metrics,
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "project metrics unavailable");
            Vec::new()
        }
    }
}

// ---------------------------------------------------------------------------
// Authorship types
// ---------------------------------------------------------------------------

/// Contents of `test_analysis_results.json` / `mobile_test_analysis_results.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorshipData {
    pub test_metadata: Vec<TestRecord>,
    /// Month axis for the velocity chart, chronological.
    pub monthly_aggregates: Vec<MonthEntry>,
    #[serde(default)]
    pub author_test_count: BTreeMap<String, u64>,
}

/// One entry of the `monthly_aggregates` skeleton.  Only `month` is read;
/// counts are always recomputed from `test_metadata`.
#[derive(Debug, Clone, Deserialize)]
pub struct MonthEntry {
    pub month: String,
}

/// Test type as recorded by the authorship pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestKind {
    Integration,
    Unit,
    /// Anything else the pipeline emits; never bucketed.
    #[serde(other)]
    Other,
}

/// Authorship metadata for a single test method.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TestRecord {
    pub author: String,
    pub project: String,
    /// Slash-separated package path, e.g. `com/acme/idr`.
    #[serde(default)]
    pub package: String,
    pub class: String,
    pub test: String,
    pub test_type: TestKind,
    /// ISO date (`YYYY-MM-DD`) the test was first committed.
    pub timestamp: String,
}

impl TestRecord {
    /// The `YYYY-MM` bucket this record belongs to.
    pub fn month(&self) -> &str {
        self.timestamp.get(..7).unwrap_or(&self.timestamp)
    }
}

// ---------------------------------------------------------------------------
// Execution types
// ---------------------------------------------------------------------------

/// Outcome of one test in one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestOutcome {
    Passed,
    Failed,
    Error,
    Skipped,
}

impl TestOutcome {
    pub const ALL: [TestOutcome; 4] = [
        TestOutcome::Passed,
        TestOutcome::Failed,
        TestOutcome::Error,
        TestOutcome::Skipped,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TestOutcome::Passed => "passed",
            TestOutcome::Failed => "failed",
            TestOutcome::Error => "error",
            TestOutcome::Skipped => "skipped",
        }
    }

    /// Failed and errored tests are what the results table shows by default.
    pub fn is_failure(self) -> bool {
        matches!(self, TestOutcome::Failed | TestOutcome::Error)
    }
}

impl std::fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TestOutcome {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "passed" => Ok(TestOutcome::Passed),
            "failed" => Ok(TestOutcome::Failed),
            "error" => Ok(TestOutcome::Error),
            "skipped" => Ok(TestOutcome::Skipped),
            other => bail!("unknown result {other:?}; expected passed, failed, error or skipped"),
        }
    }
}

/// One test's outcome within an execution's `test_results` array.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExecutionResult {
    pub project_name: String,
    pub class_name: String,
    pub test_name: String,
    pub result: TestOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    /// Wall-clock seconds.  Absent for runs that did not record timing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_out: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_err: Option<String>,
}

impl ExecutionResult {
    /// Identity used to match the same test across two executions.
    pub fn key(&self) -> (&str, &str, &str) {
        (&self.project_name, &self.class_name, &self.test_name)
    }

    /// `stack_trace` when present and non-blank.
    pub fn trace(&self) -> Option<&str> {
        self.stack_trace.as_deref().filter(|s| !s.trim().is_empty())
    }
}

/// Per-category tallies stored alongside each index entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct OutcomeCounts {
    #[serde(default)]
    pub passed: u64,
    #[serde(default)]
    pub failed: u64,
    #[serde(default)]
    pub error: u64,
    #[serde(default)]
    pub skipped: u64,
}

impl OutcomeCounts {
    pub fn get(&self, outcome: TestOutcome) -> u64 {
        match outcome {
            TestOutcome::Passed => self.passed,
            TestOutcome::Failed => self.failed,
            TestOutcome::Error => self.error,
            TestOutcome::Skipped => self.skipped,
        }
    }

    pub fn total(&self) -> u64 {
        self.passed + self.failed + self.error + self.skipped
    }
}

/// One row of `test_results_index.json`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExecutionIndexEntry {
    pub filename: String,
    pub execution_time: String,
    #[serde(default)]
    pub test_branch: String,
    #[serde(default)]
    pub counts: OutcomeCounts,
}

impl ExecutionIndexEntry {
    pub fn executed_at(&self) -> Option<NaiveDateTime> {
        parse_execution_time(&self.execution_time)
    }
}

/// Timing for one project within an execution.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ProjectTiming {
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    /// Seconds.  Older runs wrote this as a string.
    #[serde(default, deserialize_with = "de_opt_seconds")]
    pub duration: Option<f64>,
}

/// Full contents of `test_results/<filename>.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecutionRun {
    #[serde(default)]
    pub execution_time: Option<String>,
    #[serde(default)]
    pub execution_start_time: Option<String>,
    #[serde(default)]
    pub execution_end_time: Option<String>,
    /// Pre-formatted by the pipeline (`"1h 2m 3s"`); absent on older runs.
    #[serde(default)]
    pub execution_duration: Option<String>,
    #[serde(default)]
    pub test_branch: String,
    #[serde(default)]
    pub glide_commit_hash: Option<String>,
    #[serde(default)]
    pub glide_test_commit_hash: Option<String>,
    pub test_results: Vec<ExecutionResult>,
    #[serde(default)]
    pub test_project_metrics: Option<BTreeMap<String, ProjectTiming>>,
}

impl ExecutionRun {
    /// Best available timestamp for display: `execution_time`, else the start
    /// time the pipeline recorded.
    pub fn display_time(&self) -> Option<&str> {
        self.execution_time
            .as_deref()
            .or(self.execution_start_time.as_deref())
            .filter(|s| !s.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Commit deltas & project metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Commit {
    pub commit: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub message: String,
}

/// Commits landed between the `from` execution and the `to` execution.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CommitDelta {
    pub from_filename: String,
    pub to_filename: String,
    #[serde(default)]
    pub from_execution_time: String,
    #[serde(default)]
    pub to_execution_time: String,
    #[serde(default)]
    pub glide_commits: Vec<Commit>,
    #[serde(default)]
    pub glide_test_commits: Vec<Commit>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct IgnoredTest {
    pub class_name: String,
    pub method_name: String,
}

/// One row of `test_project_metrics.json`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProjectMetric {
    pub project_name: String,
    #[serde(default)]
    pub total_classes: u64,
    #[serde(default)]
    pub total_cases: u64,
    #[serde(default)]
    pub total_ignored: u64,
    #[serde(default)]
    pub ignored_percentage: f64,
    #[serde(default)]
    pub ignored_tests: Vec<IgnoredTest>,
}

// ---------------------------------------------------------------------------
// Timestamp helpers
// ---------------------------------------------------------------------------

/// Parse an execution time: `YYYY-MM-DD HH:MM:SS` or RFC 3339.
pub fn parse_execution_time(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, EXECUTION_TS_FMT)
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.naive_utc()))
}

/// Parse an authorship timestamp or month label into a UTC instant.
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM` (first of the month), `YYYY-MM-DD HH:MM:SS`
/// and RFC 3339.  Date-only values are midnight UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|ndt| ndt.and_utc());
    }
    if let Ok(d) = NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|ndt| ndt.and_utc());
    }
    if let Some(ndt) = parse_execution_time(s) {
        return Some(ndt.and_utc());
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|ndt| ndt.and_utc())
}

fn de_opt_seconds<'de, D>(de: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<serde_json::Value> = Option::deserialize(de)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
