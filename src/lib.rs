//! Skilltree: concept prerequisite graphs with per-user learning progress.
//!
//! Concepts form a directed prerequisite graph. Each user records which concepts
//! they have started and completed, and a concept may only be started or
//! completed once all its prerequisites are completed. Progress can be exported
//! to and restored from portable JSON snapshots.
//!
//! Records live in append-only JSONL files with a SQLite cache, the same layout
//! whether accessed directly through [`Store`] or through the daemon.
//!
//! # Example
//!
//! ```no_run
//! use skilltree::{NewConcept, Store};
//! use std::path::Path;
//!
//! let mut store = Store::init(Path::new(".")).unwrap();
//!
//! store
//!     .create_concept(NewConcept::new("matrices_intro", "Introduction to Matrices"))
//!     .unwrap();
//! store
//!     .create_concept(
//!         NewConcept::new("determinants", "Determinants").with_prerequisites(["matrices_intro"]),
//!     )
//!     .unwrap();
//!
//! // Locked until the prerequisite is done
//! assert!(!store.complete_concept("alice", "determinants").unwrap().is_granted());
//!
//! store.complete_concept("alice", "matrices_intro").unwrap();
//! assert!(store.complete_concept("alice", "determinants").unwrap().is_granted());
//!
//! let snapshot = store.export_snapshot("alice").unwrap();
//! assert_eq!(snapshot.completed_concepts.len(), 2);
//! ```

mod config;
mod graph;
mod progress;
mod snapshot;
mod storage;
mod store;
mod types;

pub mod client;
pub mod daemon;
pub mod protocol;

// Re-export public API
pub use client::Client;
pub use config::{Config, DaemonSettings};
pub use daemon::{Daemon, DaemonConfig, is_daemon_running, start_daemon};
pub use graph::{Branch, CategoryGraph, ConceptGraph, DependencyNode, GraphEntry};
pub use progress::{
    BlockedConcept, Gate, ProgressStats, available_concepts, blocked_concepts, can_access, complete_concept, gate,
    progress_stats, start_concept, unlocked_concepts,
};
pub use protocol::{Request, Response};
pub use snapshot::{CompletedEntry, Snapshot, SnapshotDir, UnknownConcept, load as load_snapshot};
pub use storage::{ConceptStore, STORE_DIR, Storage, UserStore};
pub use store::{ActiveConcept, BlockedEntry, CompletedConcept, ProgressReport, Store, StoreError};
pub use types::{
    Concept, ConceptFilter, ConceptRef, ConceptState, ConceptUpdate, NewConcept, UserSkill, ValidationError,
    validate_concept_id, validate_user_id,
};
