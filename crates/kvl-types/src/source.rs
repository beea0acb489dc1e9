use std::fmt;

use serde::{Deserialize, Serialize};

/// Provenance of a commit delivered to watchers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeSource {
    /// The commit was created by a journal on this page.
    Local,
    /// The commit was ingested from the remote replica.
    Sync,
}

impl fmt::Display for ChangeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "LOCAL"),
            Self::Sync => write!(f, "SYNC"),
        }
    }
}

/// How a journal is finalized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JournalType {
    /// The caller must commit or roll back explicitly.
    Explicit,
    /// The journal commits itself when dropped while still open.
    Implicit,
}

impl fmt::Display for JournalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explicit => write!(f, "explicit"),
            Self::Implicit => write!(f, "implicit"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_source_display() {
        assert_eq!(format!("{}", ChangeSource::Local), "LOCAL");
        assert_eq!(format!("{}", ChangeSource::Sync), "SYNC");
    }

    #[test]
    fn journal_type_display() {
        assert_eq!(format!("{}", JournalType::Explicit), "explicit");
        assert_eq!(format!("{}", JournalType::Implicit), "implicit");
    }
}
