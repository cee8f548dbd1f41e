use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use pulsescope::artifacts::{self, ArtifactStore, SuiteVariant, TestOutcome};
use pulsescope::commits;
use pulsescope::executions::{self, ResultScope};
use pulsescope::filter::{RecordFilter, Selection, ALL};
use pulsescope::metrics;
use pulsescope::render::{
    self, text::scope_name, CommitStatus, DeltaSection, Report, ResultsTable, RunSection,
    MonthDetails, SlowTest, SlowestSection, VelocitySection,
};
use pulsescope::session::{RunView, Session};
use pulsescope::slowest::{self, SLOWEST_PRESETS};
use pulsescope::stats::{self, DetailKind, VelocitySummary};
use pulsescope::window::TimeWindow;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(
    name = "pulsescope",
    version,
    about = "Report test-execution history and test-authorship velocity from pipeline JSON artifacts"
)]
struct Cli {
    /// Dashboard root: an http(s):// base URL or a local directory.
    #[arg(long, global = true, env = "PULSESCOPE_SOURCE", default_value = ".")]
    source: String,

    /// Execution to view (filename from the execution index).  Defaults to
    /// the latest run.
    #[arg(long, global = true, env = "PULSESCOPE_EXECUTION")]
    execution: Option<String>,

    /// Execution to compare against.  Defaults to the run before --execution.
    #[arg(long, global = true, env = "PULSESCOPE_COMPARED")]
    compared: Option<String>,

    /// Read mobile suite authorship instead of desktop.
    #[arg(long, global = true, env = "PULSESCOPE_MOBILE")]
    mobile: bool,

    /// Output format.
    #[arg(long, global = true, value_enum, env = "PULSESCOPE_FORMAT", default_value = "text")]
    format: Format,

    /// More log output on stderr (-v info, -vv debug).  RUST_LOG overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Markdown,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Tests added per month, by type, author and project
    Velocity(VelocityArgs),

    /// Results of one execution with the run-over-run trend
    Results {
        /// List every result instead of only failed and errored tests.
        #[arg(long)]
        all: bool,

        /// Only show results for this project.
        #[arg(long, default_value = ALL)]
        project: String,
    },

    /// Tests whose outcome changed between two executions
    Delta {
        /// Restrict to one result category (passed, failed, error, skipped).
        #[arg(long)]
        category: Option<TestOutcome>,
    },

    /// Slowest tests and project durations of one execution
    Slowest(SlowestArgs),

    /// Commits landed between the compared execution and this one
    Commits,

    /// Class, case and ignored-test totals per project
    Metrics {
        /// Only summarise this project.
        #[arg(long, default_value = ALL)]
        project: String,
    },

    /// Every section at its default settings
    Report(VelocityArgs),
}

#[derive(Args)]
struct VelocityArgs {
    /// Only count tests written by this author.
    #[arg(long, default_value = ALL)]
    author: String,

    /// Only count tests in this project.
    #[arg(long, default_value = ALL)]
    project: String,

    /// Time window: all, last_6_months or last_year.
    #[arg(long, default_value = "all")]
    window: String,

    /// List the tests added in this month (YYYY-MM).
    #[arg(long)]
    month: Option<String>,

    /// Which tests to list for --month: integration, unit or both.
    #[arg(long = "type", default_value = "both", requires = "month")]
    kind: DetailKind,
}

#[derive(Args)]
struct SlowestArgs {
    /// Number of tests to list: 10, 25, 50 or 100.
    #[arg(long, default_value = "10", value_parser = parse_preset)]
    count: usize,

    /// Rank setup / teardown fixture classes (AA_*, ZZ_*) too.
    #[arg(long)]
    include_fixtures: bool,
}

fn parse_preset(s: &str) -> Result<usize, String> {
    let n: usize = s.parse().map_err(|_| format!("{s:?} is not a number"))?;
    if SLOWEST_PRESETS.contains(&n) {
        Ok(n)
    } else {
        Err(format!("must be one of {SLOWEST_PRESETS:?}"))
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let store = artifacts::open_store(&cli.source)?;
    let store = store.as_ref();
    let variant = if cli.mobile {
        SuiteVariant::Mobile
    } else {
        SuiteVariant::Desktop
    };

    match &cli.command {
        Command::Velocity(args) => {
            let data = artifacts::load_authorship(store, variant).await?;
            let summary = velocity_summary(&data, args)?;
            emit(
                &Report {
                    source: cli.source.clone(),
                    velocity: Some(velocity_section(args, &summary)),
                    ..Default::default()
                },
                cli.format,
            )
        }
        Command::Metrics { project } => {
            let data = artifacts::load_project_metrics(store).await;
            if project != ALL
                && !data.is_empty()
                && !metrics::metric_projects(&data).contains(&project.as_str())
            {
                tracing::warn!(%project, "project has no metrics");
            }
            emit(
                &Report {
                    source: cli.source.clone(),
                    metrics: Some(metrics::summarize(&data, &Selection::from(project.as_str()))),
                    ..Default::default()
                },
                cli.format,
            )
        }
        Command::Results { all, project } => {
            let (session, view) = open_run(&cli, store).await?;
            let scope = if *all { ResultScope::All } else { ResultScope::Failures };
            if project != ALL
                && !executions::project_names(&view.current.test_results).contains(project)
            {
                tracing::warn!(%project, execution = %view.selection.execution, "project not in this execution");
            }
            let selected = executions::filter_results(
                &view.current.test_results,
                scope,
                &Selection::from(project.as_str()),
            );
            let mut run = run_header(&view);
            run.trend = Some(executions::trend_series(&session.index, &view.selection.execution));
            run.results = Some(ResultsTable {
                scope: scope_name(scope),
                project,
                groups: executions::group_results(&selected),
            });
            emit(&run_report(&cli, run), cli.format)
        }
        Command::Delta { category } => {
            let (_, view) = open_run(&cli, store).await?;
            let categories = match category {
                Some(c) => vec![*c],
                None => TestOutcome::ALL.to_vec(),
            };
            let mut run = run_header(&view);
            run.deltas = delta_sections(&view, &categories);
            emit(&run_report(&cli, run), cli.format)
        }
        Command::Slowest(args) => {
            let (_, view) = open_run(&cli, store).await?;
            let mut run = run_header(&view);
            run.slowest = Some(slowest_section(&view, args.count, !args.include_fixtures));
            emit(&run_report(&cli, run), cli.format)
        }
        Command::Commits => {
            let (mut session, view) = open_run(&cli, store).await?;
            session.load_commit_deltas(store).await;
            let mut run = run_header(&view);
            run.commits = Some(commit_status(&session, &view));
            emit(&run_report(&cli, run), cli.format)
        }
        Command::Report(args) => {
            let (mut session, view) = open_run(&cli, store).await?;
            session.load_commit_deltas(store).await;
            session.load_project_metrics(store).await;
            let data = session.load_authorship(store, variant).await?.clone();
            let summary = velocity_summary(&data, args)?;

            let failures = executions::filter_results(
                &view.current.test_results,
                ResultScope::Failures,
                &Selection::All,
            );
            let mut run = run_header(&view);
            run.trend = Some(executions::trend_series(&session.index, &view.selection.execution));
            run.results = Some(ResultsTable {
                scope: scope_name(ResultScope::Failures),
                project: ALL,
                groups: executions::group_results(&failures),
            });
            run.deltas = delta_sections(&view, &[TestOutcome::Failed, TestOutcome::Error]);
            run.slowest = Some(slowest_section(&view, SLOWEST_PRESETS[0], true));
            run.commits = Some(commit_status(&session, &view));

            emit(
                &Report {
                    source: cli.source.clone(),
                    velocity: Some(velocity_section(args, &summary)),
                    run: Some(run),
                    metrics: Some(metrics::summarize(&session.project_metrics, &Selection::All)),
                },
                cli.format,
            )
        }
    }
}

/// Logs go to stderr so stdout stays a clean report.
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

// ---------------------------------------------------------------------------
// Section builders
// ---------------------------------------------------------------------------

fn velocity_summary(data: &artifacts::AuthorshipData, args: &VelocityArgs) -> Result<VelocitySummary> {
    let window = TimeWindow::from_tag(&args.window);
    if window.tag() != args.window {
        tracing::warn!(requested = %args.window, "unknown time window, showing all time");
    }
    let filter = RecordFilter::new(&args.author, &args.project, window.cutoff(chrono::Utc::now()));
    let summary = stats::compute(data, &filter)?;

    if let Selection::Only(author) = &filter.author {
        if !summary.authors.contains(author) {
            tracing::warn!(%author, "no tests recorded for this author");
        }
    }
    if let Selection::Only(project) = &filter.project {
        if !summary.projects.contains(project) {
            tracing::warn!(%project, "no tests recorded for this project");
        }
    }
    Ok(summary)
}

fn velocity_section<'a>(args: &'a VelocityArgs, summary: &'a VelocitySummary) -> VelocitySection<'a> {
    VelocitySection {
        author: &args.author,
        project: &args.project,
        window: TimeWindow::from_tag(&args.window).tag(),
        summary,
        details: args.month.as_deref().and_then(|month| month_details(summary, month, args.kind)),
    }
}

fn month_details<'a>(
    summary: &'a VelocitySummary,
    month: &str,
    kind: DetailKind,
) -> Option<MonthDetails<'a>> {
    let Some(agg) = summary.month(month) else {
        tracing::warn!(%month, "month is not on the velocity axis");
        return None;
    };
    Some(MonthDetails {
        month: &agg.month,
        kind,
        tests: agg.details_for(kind),
    })
}

async fn open_run(cli: &Cli, store: &dyn ArtifactStore) -> Result<(Session, RunView)> {
    let session = Session::open(store)
        .await
        .context("loading the execution index")?;
    session
        .select(store, cli.execution.as_deref(), cli.compared.as_deref())
        .await?;
    let view = session
        .snapshot()
        .await
        .context("no execution could be selected")?;
    Ok((session, view))
}

fn run_header(view: &RunView) -> RunSection<'_> {
    RunSection {
        selection: Some(&view.selection),
        execution_time: view.current.display_time(),
        test_branch: &view.current.test_branch,
        duration: view.current.execution_duration.as_deref(),
        counts: view.count_deltas(),
        ..Default::default()
    }
}

fn run_report<'a>(cli: &Cli, run: RunSection<'a>) -> Report<'a> {
    Report {
        source: cli.source.clone(),
        run: Some(run),
        ..Default::default()
    }
}

fn delta_sections(view: &RunView, categories: &[TestOutcome]) -> Vec<DeltaSection> {
    categories
        .iter()
        .map(|&category| DeltaSection {
            category,
            entries: view.delta(category),
        })
        .collect()
}

fn slowest_section(view: &RunView, count: usize, exclude_fixtures: bool) -> SlowestSection<'_> {
    SlowestSection {
        count,
        exclude_fixtures,
        tests: slowest::slowest(&view.current.test_results, count, exclude_fixtures)
            .into_iter()
            .map(SlowTest::new)
            .collect(),
        projects: slowest::project_durations(&view.current),
    }
}

fn commit_status<'a>(session: &'a Session, view: &RunView) -> CommitStatus<'a> {
    match session.commits_for(&view.selection) {
        Some(entry) => CommitStatus::Found(commits::commit_rows(entry)),
        None => CommitStatus::Unavailable,
    }
}

fn emit(report: &Report, format: Format) -> Result<()> {
    let out = match format {
        Format::Text => render::text::render(report)?,
        Format::Markdown => render::markdown::render(report)?,
        Format::Json => serde_json::to_string_pretty(report)? + "\n",
    };
    print!("{out}");
    Ok(())
}
