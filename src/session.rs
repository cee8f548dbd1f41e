//! Loaded dashboard state and run selection.
//!
//! A [`Session`] owns every artifact read for one report.  Changing the
//! selected execution fetches two result files; when selections overlap, only
//! the most recently issued one is committed.

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{bail, Result};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::artifacts::{
    self, ArtifactStore, AuthorshipData, CommitDelta, ExecutionIndexEntry, ExecutionRun,
    ProjectMetric, SuiteVariant, TestOutcome,
};
use crate::commits;
use crate::delta::{self, CountDelta, DeltaEntry};
use crate::executions::{self, RunSelection};

// ---------------------------------------------------------------------------
// Run view
// ---------------------------------------------------------------------------

/// The selected execution and the execution it is compared against.
#[derive(Debug, Clone)]
pub struct RunView {
    pub selection: RunSelection,
    pub current: ExecutionRun,
    /// `None` when there is no earlier run.
    pub previous: Option<ExecutionRun>,
}

impl RunView {
    /// Tests whose change between the two runs touches `category`.
    pub fn delta(&self, category: TestOutcome) -> Vec<DeltaEntry> {
        let previous = self
            .previous
            .as_ref()
            .map(|p| p.test_results.as_slice())
            .unwrap_or_default();
        delta::compute(&self.current.test_results, previous, category)
    }

    /// Per-category counts next to the compared run's counts.
    pub fn count_deltas(&self) -> Vec<CountDelta> {
        let current = executions::count_results(&self.current.test_results);
        let previous = self
            .previous
            .as_ref()
            .map(|p| executions::count_results(&p.test_results));
        delta::count_deltas(&current, previous.as_ref())
    }
}

/// Outcome of a selection change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Applied {
    /// The fetched runs are now the session's view.
    Committed,
    /// A newer selection was issued while this one was loading; its data
    /// was discarded.
    Superseded,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct Session {
    /// Sorted oldest first.
    pub index: Vec<ExecutionIndexEntry>,
    pub authorship: Option<AuthorshipData>,
    pub commit_deltas: Option<Vec<CommitDelta>>,
    pub project_metrics: Vec<ProjectMetric>,
    issued: AtomicU64,
    view: Mutex<Option<RunView>>,
}

impl Session {
    /// Start a session from an already-loaded index.
    pub fn new(mut index: Vec<ExecutionIndexEntry>) -> Self {
        executions::sort_index(&mut index);
        Self {
            index,
            ..Default::default()
        }
    }

    /// Load the execution index from `store`.
    pub async fn open(store: &dyn ArtifactStore) -> Result<Self> {
        let index = artifacts::load_index(store).await?;
        tracing::info!(executions = index.len(), "loaded execution index");
        Ok(Self::new(index))
    }

    pub async fn load_authorship(
        &mut self,
        store: &dyn ArtifactStore,
        variant: SuiteVariant,
    ) -> Result<&AuthorshipData> {
        let data = artifacts::load_authorship(store, variant).await?;
        Ok(&*self.authorship.insert(data))
    }

    /// A missing or unreadable commit-delta file leaves commit data
    /// unavailable rather than failing the session.
    pub async fn load_commit_deltas(&mut self, store: &dyn ArtifactStore) {
        match artifacts::load_commit_deltas(store).await {
            Ok(deltas) => self.commit_deltas = Some(deltas),
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "commit deltas unavailable");
                self.commit_deltas = None;
            }
        }
    }

    pub async fn load_project_metrics(&mut self, store: &dyn ArtifactStore) {
        self.project_metrics = artifacts::load_project_metrics(store).await;
    }

    /// Select the runs to view, fetching their result files.
    ///
    /// Unknown or absent filenames fall back as in
    /// [`executions::resolve_selection`].  If another selection is issued
    /// before this one finishes loading, this one returns
    /// [`Applied::Superseded`] and the view is left to the newer selection.
    /// A failed fetch returns the error and leaves the current view as it was.
    pub async fn select(
        &self,
        store: &dyn ArtifactStore,
        execution: Option<&str>,
        compared: Option<&str>,
    ) -> Result<Applied> {
        let ticket = self.issued.fetch_add(1, Ordering::SeqCst) + 1;

        let Some(selection) = executions::resolve_selection(&self.index, execution, compared) else {
            bail!("execution index is empty");
        };

        let current = artifacts::load_execution(store, &selection.execution).await?;
        let previous = match &selection.compared {
            Some(filename) => Some(artifacts::load_execution(store, filename).await?),
            None => None,
        };

        let mut view = self.view.lock().await;
        if self.issued.load(Ordering::SeqCst) != ticket {
            tracing::info!(
                execution = %selection.execution,
                ticket,
                "discarding superseded selection"
            );
            return Ok(Applied::Superseded);
        }
        tracing::info!(
            execution = %selection.execution,
            compared = selection.compared.as_deref().unwrap_or("-"),
            "selected execution"
        );
        *view = Some(RunView {
            selection,
            current,
            previous,
        });
        Ok(Applied::Committed)
    }

    /// A copy of the committed view, if any selection has completed.
    pub async fn snapshot(&self) -> Option<RunView> {
        self.view.lock().await.clone()
    }

    /// Consume the session, keeping only the committed view.
    pub fn into_view(self) -> Option<RunView> {
        self.view.into_inner()
    }

    /// Commit delta recorded for the committed selection.
    ///
    /// The outer `None` means commit data is unavailable, either because
    /// nothing was loaded or because no entry covers this pair.
    pub fn commits_for<'a>(&'a self, selection: &RunSelection) -> Option<&'a CommitDelta> {
        let deltas = self.commit_deltas.as_deref()?;
        let from = selection.compared.as_deref()?;
        commits::lookup(deltas, &selection.execution, from)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
