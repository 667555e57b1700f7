//! Candidate servers for later federation attempts

use super::errors::PerformError;
use super::types::ServerName;
use serde::{Deserialize, Serialize};

/// Result of a resolution step that threads server candidates
pub type StepResult<T> = Result<T, Rejection>;

/// Ordered list of servers that may know about a room.
///
/// Order is preference order. The list only ever grows; duplicates are kept.
/// Resolution steps take the list by value and hand it back with their
/// result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerCandidates(Vec<ServerName>);

impl ServerCandidates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one server
    #[must_use]
    pub fn with(mut self, server: ServerName) -> Self {
        self.0.push(server);
        self
    }

    /// Append servers in the order given
    #[must_use]
    pub fn extended<I>(mut self, servers: I) -> Self
    where
        I: IntoIterator<Item = ServerName>,
    {
        self.0.extend(servers);
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[ServerName] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<ServerName> {
        self.0
    }
}

impl From<Vec<ServerName>> for ServerCandidates {
    fn from(servers: Vec<ServerName>) -> Self {
        ServerCandidates(servers)
    }
}

/// A failed resolution step and the candidates gathered before it failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub error: PerformError,
    pub candidates: ServerCandidates,
}

impl Rejection {
    pub fn new(error: PerformError, candidates: ServerCandidates) -> Self {
        Self { error, candidates }
    }
}
