//! Append-only record of what happened inside an environment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Monotonic revision number, starting at 1.
pub type Version = u64;

/// One recorded action (command run, config change, service start).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub version: Version,
    pub name: String,
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Ordered revisions, serialized as a single JSON array.
///
/// Saved wholesale to the state note on every propagation; never diffed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History(Vec<Revision>);

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a revision, assigning the next version number.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        explanation: impl Into<String>,
        output: Option<String>,
    ) -> &Revision {
        let version = self.latest_version() + 1;
        self.0.push(Revision {
            version,
            name: name.into(),
            explanation: explanation.into(),
            output,
            created_at: Utc::now(),
        });
        &self.0[self.0.len() - 1]
    }

    pub fn latest(&self) -> Option<&Revision> {
        self.0.last()
    }

    /// Version of the newest revision, 0 when empty.
    pub fn latest_version(&self) -> Version {
        self.latest().map(|rev| rev.version).unwrap_or(0)
    }

    pub fn get(&self, version: Version) -> Option<&Revision> {
        self.0.iter().find(|rev| rev.version == version)
    }

    pub fn revisions(&self) -> &[Revision] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Pretty JSON, as stored in the state note.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_history_serializes_as_empty_array() {
        assert_eq!(History::new().to_json().expect("json"), "[]");
    }

    #[test]
    fn versions_increase_from_one() {
        let mut history = History::new();
        history.add("Run ls", "list files", Some("a\nb\n".to_string()));
        history.add("Update config", "new base image", None);

        assert_eq!(history.latest_version(), 2);
        assert_eq!(history.get(1).map(|r| r.name.as_str()), Some("Run ls"));
        assert!(history.get(3).is_none());
    }

    #[test]
    fn json_round_trip_preserves_revisions() {
        let mut history = History::new();
        history.add("Run make", "build", Some("ok".to_string()));
        let raw = history.to_json().expect("json");
        assert_eq!(History::from_json(&raw).expect("parse"), history);
    }
}
