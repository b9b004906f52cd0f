//! IPC protocol types for daemon communication.

use crate::graph::{CategoryGraph, DependencyNode};
use crate::progress::Gate;
use crate::snapshot::Snapshot;
use crate::store::{BlockedEntry, ProgressReport};
use crate::types::{Concept, ConceptFilter, ConceptUpdate, NewConcept};
use serde::{Deserialize, Serialize};

/// Request sent from client to daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Create a new concept.
    CreateConcept { concept: NewConcept },

    /// Get a concept by id.
    GetConcept { concept_id: String },

    /// Update fields of a concept.
    UpdateConcept { concept_id: String, update: ConceptUpdate },

    /// Archive a concept.
    ArchiveConcept { concept_id: String },

    /// List concepts.
    ListConcepts {
        #[serde(default)]
        filter: ConceptFilter,
    },

    /// Full prerequisite tree of a concept.
    Dependencies { concept_id: String },

    /// Direct dependents of a concept.
    Dependents { concept_id: String },

    /// Category-wide graph; all categories when `category` is absent.
    CategoryGraph {
        #[serde(default)]
        category: Option<String>,
    },

    /// A user's progress report.
    Progress { user_id: String },

    /// Start a concept for a user.
    StartConcept { user_id: String, concept_id: String },

    /// Complete a concept for a user.
    CompleteConcept { user_id: String, concept_id: String },

    /// Concepts a user may work on next.
    AvailableConcepts { user_id: String },

    /// Concepts still locked for a user.
    BlockedConcepts { user_id: String },

    /// Export a user's snapshot.
    Export { user_id: String },

    /// Import a snapshot for a user.
    Import { user_id: String, snapshot: Snapshot },

    /// Shutdown the daemon.
    Shutdown,

    /// Ping to check if daemon is alive.
    Ping,
}

/// Response sent from daemon to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    /// Single concept.
    Concept { concept: Concept },

    /// Multiple concepts.
    Concepts { concepts: Vec<Concept> },

    /// Dependency tree.
    Tree { tree: DependencyNode },

    /// Direct dependents of a concept.
    Dependents {
        concept_id: String,
        title: String,
        dependent_concepts: Vec<String>,
    },

    /// Category graph.
    Graph { graph: CategoryGraph },

    /// Progress report.
    Progress { report: ProgressReport },

    /// Outcome of a start or complete.
    Gate { gate: Gate },

    /// Locked concepts.
    Blocked { concepts: Vec<BlockedEntry> },

    /// Snapshot document.
    Snapshot { snapshot: Snapshot },

    /// Concept not found.
    NotFound { id: String },

    /// Operation succeeded.
    Ok,

    /// Pong response to ping.
    Pong,

    /// Error response.
    Error { message: String },
}

impl Response {
    /// Create an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
