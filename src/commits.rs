//! Commits landed between two executions, looked up from `commit_deltas.json`.

use serde::Serialize;

use crate::artifacts::{Commit, CommitDelta};

/// Length of an abbreviated commit hash.
pub const SHORT_HASH_LEN: usize = 7;

/// Which repository a commit belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Repo {
    /// The product repository (`glide_commits`).
    Glide,
    /// The test repository (`glide_test_commits`).
    GlideTest,
}

impl Repo {
    pub fn as_str(self) -> &'static str {
        match self {
            Repo::Glide => "glide",
            Repo::GlideTest => "glide-test",
        }
    }
}

impl std::fmt::Display for Repo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The entry whose `to_filename` and `from_filename` both match exactly.
///
/// `None` means no commit data was recorded for this pair, which is not the
/// same as an entry whose commit lists are empty.
pub fn lookup<'a>(deltas: &'a [CommitDelta], to: &str, from: &str) -> Option<&'a CommitDelta> {
    deltas
        .iter()
        .find(|d| d.to_filename == to && d.from_filename == from)
}

/// One commit, tagged with its repository.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitRow<'a> {
    pub repo: Repo,
    pub short_hash: &'a str,
    #[serde(flatten)]
    pub commit: &'a Commit,
}

/// Product commits followed by test-repo commits, each in file order.
pub fn commit_rows(entry: &CommitDelta) -> Vec<CommitRow<'_>> {
    let product = entry.glide_commits.iter().map(|c| row(Repo::Glide, c));
    let tests = entry.glide_test_commits.iter().map(|c| row(Repo::GlideTest, c));
    product.chain(tests).collect()
}

fn row(repo: Repo, commit: &Commit) -> CommitRow<'_> {
    CommitRow {
        repo,
        short_hash: short_hash(&commit.commit),
        commit,
    }
}

/// First seven characters of `hash`, or all of it when shorter.
pub fn short_hash(hash: &str) -> &str {
    match hash.char_indices().nth(SHORT_HASH_LEN) {
        Some((idx, _)) => &hash[..idx],
        None => hash,
    }
}
