//! Strongly-typed identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a job within one graph.
///
/// Assigned sequentially when the graph is built, so two distinct job names
/// always map to distinct identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(u32);

impl JobId {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job_{}", self.0)
    }
}

impl From<usize> for JobId {
    fn from(index: usize) -> Self {
        Self(index as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_display() {
        assert_eq!(JobId::new(3).to_string(), "job_3");
    }

    #[test]
    fn test_job_id_index_roundtrip() {
        let id = JobId::from(7usize);
        assert_eq!(id.index(), 7);
    }
}
