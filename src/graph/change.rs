// src/graph/change.rs

use std::fmt;

use serde::{Deserialize, Serialize};

/// One revision in one repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Commit {
    pub repository: String,
    pub git_hash: String,
}

impl Commit {
    pub fn new(repository: impl Into<String>, git_hash: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            git_hash: git_hash.into(),
        }
    }

    /// `repo@hash`, used inside task ids.
    pub fn id_string(&self) -> String {
        format!("{}@{}", self.repository, self.git_hash)
    }
}

impl fmt::Display for Commit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id_string())
    }
}

/// A buildable point in history: the base commit followed by any
/// dependency commits pinned on top of it.
///
/// Two changes are the same change iff their commit lists are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Change {
    pub commits: Vec<Commit>,
}

impl Change {
    pub fn new(commits: Vec<Commit>) -> Self {
        Self { commits }
    }

    pub fn from_commit(commit: Commit) -> Self {
        Self {
            commits: vec![commit],
        }
    }

    pub fn base_commit(&self) -> Option<&Commit> {
        self.commits.first()
    }

    /// Same change with the base commit swapped out; pinned commits are kept.
    pub fn with_base_commit(&self, commit: Commit) -> Self {
        let mut commits = Vec::with_capacity(self.commits.len().max(1));
        commits.push(commit);
        commits.extend(self.commits.iter().skip(1).cloned());
        Self { commits }
    }

    /// Stable identity string, e.g. `chromium@abc123` or `chromium@abc123+v8@def456`.
    pub fn id_string(&self) -> String {
        self.commits
            .iter()
            .map(Commit::id_string)
            .collect::<Vec<_>>()
            .join("+")
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id_string())
    }
}
