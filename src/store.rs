//! High-level store API for skilltree.

use crate::config::Config;
use crate::graph::{CategoryGraph, ConceptGraph, DependencyNode};
use crate::progress::{self, Gate, ProgressStats};
use crate::snapshot::{Snapshot, SnapshotDir};
use crate::storage::{ConceptStore, Storage, UserStore};
use crate::types::{
    Concept, ConceptFilter, ConceptRef, ConceptUpdate, NewConcept, UserSkill, ValidationError, validate_user_id,
};
use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Errors that can occur during store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Concept not found where one is required.
    ConceptNotFound(String),
    /// A concept with this id already exists.
    DuplicateConcept(String),
    /// Prerequisite id does not resolve to a concept.
    PrerequisiteNotFound(String),
    /// Snapshot references a concept that does not exist.
    ImportUnknownConcept(String),
    /// Validation error.
    Validation(ValidationError),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::ConceptNotFound(id) => write!(f, "concept not found: {}", id),
            StoreError::DuplicateConcept(id) => write!(f, "concept already exists: {}", id),
            StoreError::PrerequisiteNotFound(id) => write!(f, "prerequisite concept {} not found", id),
            StoreError::ImportUnknownConcept(id) => {
                write!(f, "cannot import skill tree: concept {} not found", id)
            }
            StoreError::Validation(e) => write!(f, "validation error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

/// A user's progress with resolved titles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressReport {
    pub user_id: String,
    pub skill_tree_name: String,
    pub stats: ProgressStats,
    pub completed_concepts: Vec<CompletedConcept>,
    pub in_progress_concepts: Vec<ActiveConcept>,
}

/// Completed concept row of a [`ProgressReport`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletedConcept {
    pub concept_id: String,
    pub title: String,
    pub category: String,
    pub completed_at: Option<DateTime<Utc>>,
}

/// In-progress concept row of a [`ProgressReport`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActiveConcept {
    pub concept_id: String,
    pub title: String,
    pub category: String,
}

/// A concept the user cannot start yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlockedEntry {
    pub concept_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub difficulty_level: i32,
    pub blocked_by: Vec<ConceptRef>,
}

/// The main skilltree store.
pub struct Store<S = Storage> {
    storage: S,
    config: Config,
    snapshots: SnapshotDir,
}

impl Store<Storage> {
    /// Initialize a new store in the given directory.
    pub fn init(root: &Path) -> Result<Self> {
        let storage = Storage::init(root)?;
        let config = Config::default();
        config.write_if_missing(storage.dir())?;
        let config = Config::load(storage.dir())?;
        log::info!("Initialized store in {}", storage.dir().display());
        Ok(Self::from_storage(storage, config))
    }

    /// Open an existing store.
    pub fn open(root: &Path) -> Result<Self> {
        let storage = Storage::open(root)?;
        let config = Config::load(storage.dir())?;
        Ok(Self::from_storage(storage, config))
    }

    fn from_storage(storage: Storage, config: Config) -> Self {
        let snapshots = SnapshotDir::new(config.snapshot_path(storage.dir()));
        Self {
            storage,
            config,
            snapshots,
        }
    }
}

impl<S: ConceptStore + UserStore> Store<S> {
    /// Build a store over any storage backend.
    pub fn with_storage(storage: S, config: Config, snapshots: SnapshotDir) -> Self {
        Self {
            storage,
            config,
            snapshots,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn snapshots(&self) -> &SnapshotDir {
        &self.snapshots
    }

    // =========================================================================
    // Concepts
    // =========================================================================

    /// Create a new concept. Every prerequisite must already exist.
    pub fn create_concept(&mut self, new: NewConcept) -> Result<Concept> {
        let now = Utc::now();
        let concept = Concept {
            concept_id: new.concept_id,
            title: new.title,
            description: new.description,
            category: new.category,
            difficulty_level: new.difficulty_level,
            prerequisites: new.prerequisites,
            is_archived: false,
            created_at: now,
            updated_at: now,
        };

        concept
            .validate()
            .map_err(|e| eyre::eyre!(StoreError::Validation(e)))?;

        if self.storage.get_concept(&concept.concept_id)?.is_some() {
            return Err(eyre::eyre!(StoreError::DuplicateConcept(concept.concept_id)));
        }
        self.resolve_prerequisites(&concept.prerequisites)?;

        self.storage
            .put_concept(&concept)
            .context("Failed to persist concept")?;

        log::info!("Created concept {}", concept.concept_id);
        Ok(concept)
    }

    /// Get a concept by id.
    pub fn get_concept(&self, concept_id: &str) -> Result<Option<Concept>> {
        self.storage.get_concept(concept_id)
    }

    /// Apply a field-level update. `Ok(None)` if the concept does not exist.
    pub fn update_concept(&mut self, concept_id: &str, update: ConceptUpdate) -> Result<Option<Concept>> {
        let Some(existing) = self.storage.get_concept(concept_id)? else {
            return Ok(None);
        };

        if let Some(prereqs) = &update.prerequisites {
            self.resolve_prerequisites(prereqs)?;
        }

        let updated = Concept {
            title: update.title.unwrap_or(existing.title),
            description: update.description.unwrap_or(existing.description),
            category: update.category.unwrap_or(existing.category),
            difficulty_level: update.difficulty_level.unwrap_or(existing.difficulty_level),
            prerequisites: update.prerequisites.unwrap_or(existing.prerequisites),
            is_archived: update.is_archived.unwrap_or(existing.is_archived),
            updated_at: Utc::now(),
            ..existing
        };

        updated
            .validate()
            .map_err(|e| eyre::eyre!(StoreError::Validation(e)))?;

        self.storage
            .put_concept(&updated)
            .context("Failed to persist updated concept")?;

        Ok(Some(updated))
    }

    /// Soft-delete a concept. Returns false if it does not exist.
    pub fn archive_concept(&mut self, concept_id: &str) -> Result<bool> {
        let Some(existing) = self.storage.get_concept(concept_id)? else {
            return Ok(false);
        };

        let archived = Concept {
            is_archived: true,
            updated_at: Utc::now(),
            ..existing
        };
        self.storage
            .put_concept(&archived)
            .context("Failed to persist archive")?;

        log::info!("Archived concept {}", concept_id);
        Ok(true)
    }

    /// List concepts matching a filter.
    pub fn list_concepts(&self, filter: &ConceptFilter) -> Result<Vec<Concept>> {
        self.storage.list_concepts(filter)
    }

    /// Graph over every concept, archived included.
    pub fn graph(&self) -> Result<ConceptGraph> {
        let all = self.storage.list_concepts(&ConceptFilter::new().include_archived())?;
        Ok(ConceptGraph::new(all))
    }

    /// Nested prerequisite tree, `None` if the concept does not exist.
    pub fn dependency_tree(&self, concept_id: &str) -> Result<Option<DependencyNode>> {
        Ok(self.graph()?.dependency_tree(concept_id))
    }

    /// Ids of concepts that directly require `concept_id`.
    pub fn dependents(&self, concept_id: &str) -> Result<Vec<String>> {
        Ok(self.graph()?.dependents(concept_id))
    }

    /// All transitive prerequisites of `concept_id`.
    pub fn transitive_dependencies(&self, concept_id: &str) -> Result<BTreeSet<String>> {
        Ok(self.graph()?.transitive_dependency_ids(concept_id))
    }

    /// Adjacency view of every active concept in a category.
    pub fn category_graph(&self, category: Option<&str>) -> Result<CategoryGraph> {
        Ok(self.graph()?.category_graph(category))
    }

    fn resolve_prerequisites(&self, prereqs: &[String]) -> Result<()> {
        for prereq in prereqs {
            if self.storage.get_concept(prereq)?.is_none() {
                return Err(eyre::eyre!(StoreError::PrerequisiteNotFound(prereq.clone())));
            }
        }
        Ok(())
    }

    fn require_concept(&self, concept_id: &str) -> Result<Concept> {
        self.storage
            .get_concept(concept_id)?
            .ok_or_else(|| eyre::eyre!(StoreError::ConceptNotFound(concept_id.to_string())))
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Get a user, creating it with `skill_tree_name` on first sight.
    pub fn get_or_create_user(&mut self, user_id: &str, skill_tree_name: &str) -> Result<UserSkill> {
        validate_user_id(user_id).map_err(|e| eyre::eyre!(StoreError::Validation(e)))?;

        if let Some(user) = self.storage.get_user(user_id)? {
            return Ok(user);
        }

        let user = UserSkill::new(user_id, skill_tree_name, Utc::now());
        self.storage.put_user(&user).context("Failed to persist user")?;
        log::info!("Created user {} with skill tree {}", user_id, skill_tree_name);
        Ok(user)
    }

    /// Get a user, creating it with the configured default tree name.
    pub fn user(&mut self, user_id: &str) -> Result<UserSkill> {
        let tree_name = self.config.default_skill_tree_name.clone();
        self.get_or_create_user(user_id, &tree_name)
    }

    /// Counters plus resolved completed and in-progress concepts.
    pub fn progress(&mut self, user_id: &str) -> Result<ProgressReport> {
        let user = self.user(user_id)?;
        let graph = self.graph()?;

        let completed_concepts = user
            .completed_concepts
            .iter()
            .map(|id| CompletedConcept {
                concept_id: id.clone(),
                title: graph.title_of(id).to_string(),
                category: graph.get(id).map(|c| c.category.clone()).unwrap_or_default(),
                completed_at: user.verified_skills.get(id).copied(),
            })
            .collect();

        let in_progress_concepts = user
            .in_progress_concepts
            .iter()
            .map(|id| ActiveConcept {
                concept_id: id.clone(),
                title: graph.title_of(id).to_string(),
                category: graph.get(id).map(|c| c.category.clone()).unwrap_or_default(),
            })
            .collect();

        Ok(ProgressReport {
            stats: progress::progress_stats(&user),
            user_id: user.user_id,
            skill_tree_name: user.skill_tree_name,
            completed_concepts,
            in_progress_concepts,
        })
    }

    /// Mark a concept completed for a user if its prerequisites are done.
    pub fn complete_concept(&mut self, user_id: &str, concept_id: &str) -> Result<Gate> {
        let mut user = self.user(user_id)?;
        let concept = self.require_concept(concept_id)?;

        let outcome = progress::complete_concept(&mut user, &concept, Utc::now());
        self.commit_progress(&user, concept_id, "complete", &outcome)?;
        Ok(outcome)
    }

    /// Mark a concept in progress for a user if its prerequisites are done.
    pub fn start_concept(&mut self, user_id: &str, concept_id: &str) -> Result<Gate> {
        let mut user = self.user(user_id)?;
        let concept = self.require_concept(concept_id)?;

        let outcome = progress::start_concept(&mut user, &concept, Utc::now());
        self.commit_progress(&user, concept_id, "start", &outcome)?;
        Ok(outcome)
    }

    fn commit_progress(&mut self, user: &UserSkill, concept_id: &str, action: &str, outcome: &Gate) -> Result<()> {
        if let Gate::Denied { missing } = outcome {
            log::warn!(
                "User {} cannot {} {}: missing {}",
                user.user_id,
                action,
                concept_id,
                missing.join(", ")
            );
            return Ok(());
        }

        self.storage.put_user(user).context("Failed to persist progress")?;
        self.auto_snapshot(user)
    }

    /// Active concepts the user may work on next.
    pub fn available_concepts(&mut self, user_id: &str) -> Result<Vec<Concept>> {
        let user = self.user(user_id)?;
        let concepts = self.storage.list_concepts(&ConceptFilter::new())?;
        Ok(progress::available_concepts(&user, &concepts)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Active concepts still locked for the user, with what blocks them.
    pub fn blocked_concepts(&mut self, user_id: &str) -> Result<Vec<BlockedEntry>> {
        let user = self.user(user_id)?;
        let concepts = self.storage.list_concepts(&ConceptFilter::new())?;
        let graph = self.graph()?;

        Ok(progress::blocked_concepts(&user, &concepts)
            .into_iter()
            .map(|blocked| BlockedEntry {
                concept_id: blocked.concept.concept_id.clone(),
                title: blocked.concept.title.clone(),
                description: blocked.concept.description.clone(),
                category: blocked.concept.category.clone(),
                difficulty_level: blocked.concept.difficulty_level,
                blocked_by: blocked
                    .blocked_by
                    .iter()
                    .map(|id| ConceptRef {
                        concept_id: id.clone(),
                        title: graph.title_of(id).to_string(),
                    })
                    .collect(),
            })
            .collect())
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Capture the user's progress, write it to the snapshot directory and
    /// return it.
    pub fn export_snapshot(&mut self, user_id: &str) -> Result<Snapshot> {
        let user = self.user(user_id)?;
        let snapshot = Snapshot::capture(&user, &self.graph()?, Utc::now());
        self.snapshots.write(&snapshot)?;
        Ok(snapshot)
    }

    /// The last snapshot written for a user, if any.
    pub fn saved_snapshot(&self, user_id: &str) -> Result<Option<Snapshot>> {
        validate_user_id(user_id).map_err(|e| eyre::eyre!(StoreError::Validation(e)))?;
        self.snapshots.read(user_id)
    }

    /// Replace a user's completed set from a snapshot document.
    ///
    /// In-progress concepts are cleared and not restored.
    pub fn import_snapshot(&mut self, user_id: &str, snapshot: &Snapshot) -> Result<UserSkill> {
        let mut user = self.user(user_id)?;
        let graph = self.graph()?;

        snapshot
            .restore(&mut user, &graph, Utc::now())
            .map_err(|e| eyre::eyre!(StoreError::ImportUnknownConcept(e.0)))?;

        self.storage.put_user(&user).context("Failed to persist imported progress")?;
        log::info!(
            "Imported {} completed concepts for {}",
            user.completed_concepts.len(),
            user_id
        );
        self.auto_snapshot(&user)?;
        Ok(user)
    }

    fn auto_snapshot(&self, user: &UserSkill) -> Result<()> {
        if !self.config.auto_snapshot {
            return Ok(());
        }
        let snapshot = Snapshot::capture(user, &self.graph()?, Utc::now());
        self.snapshots.write(&snapshot)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_store() -> (TempDir, Store) {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::init(temp_dir.path()).unwrap();
        (temp_dir, store)
    }

    fn add(store: &mut Store, id: &str, prereqs: &[&str]) -> Concept {
        store
            .create_concept(
                NewConcept::new(id, id.replace('_', " "))
                    .with_category("Linear Algebra")
                    .with_prerequisites(prereqs.iter().copied()),
            )
            .unwrap()
    }

    #[test]
    fn test_create_and_get() {
        let (_temp_dir, mut store) = setup_test_store();

        let concept = store
            .create_concept(
                NewConcept::new("basic_vectors", "Basic Vectors")
                    .with_description("Introduction to vectors")
                    .with_category("Linear Algebra")
                    .with_difficulty(1),
            )
            .unwrap();

        assert_eq!(concept.concept_id, "basic_vectors");
        assert!(!concept.is_archived);

        let retrieved = store.get_concept("basic_vectors").unwrap().unwrap();
        assert_eq!(retrieved.title, "Basic Vectors");
        assert_eq!(retrieved.description, "Introduction to vectors");
    }

    #[test]
    fn test_create_with_unknown_prerequisite() {
        let (_temp_dir, mut store) = setup_test_store();

        let err = store
            .create_concept(NewConcept::new("vector_operations", "Vector Operations").with_prerequisites(["basic_vectors"]))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::PrerequisiteNotFound(id)) if id == "basic_vectors"
        ));
        assert!(store.get_concept("vector_operations").unwrap().is_none());
    }

    #[test]
    fn test_create_duplicate() {
        let (_temp_dir, mut store) = setup_test_store();
        add(&mut store, "basic_vectors", &[]);

        let err = store
            .create_concept(NewConcept::new("basic_vectors", "Again"))
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<StoreError>(), Some(StoreError::DuplicateConcept(_))));
    }

    #[test]
    fn test_update_fields() {
        let (_temp_dir, mut store) = setup_test_store();
        add(&mut store, "basic_vectors", &[]);
        add(&mut store, "matrices_intro", &[]);
        add(&mut store, "vector_operations", &["basic_vectors"]);

        let updated = store
            .update_concept(
                "vector_operations",
                ConceptUpdate {
                    title: Some("Vector Ops".to_string()),
                    difficulty_level: Some(3),
                    prerequisites: Some(vec!["matrices_intro".to_string()]),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();

        assert_eq!(updated.title, "Vector Ops");
        assert_eq!(updated.difficulty_level, 3);
        assert_eq!(updated.prerequisites, vec!["matrices_intro"]);
        assert_eq!(updated.category, "Linear Algebra");
        assert!(updated.updated_at >= updated.created_at);
    }

    #[test]
    fn test_update_missing_and_bad_prerequisite() {
        let (_temp_dir, mut store) = setup_test_store();
        add(&mut store, "basic_vectors", &[]);

        assert!(store.update_concept("nope", ConceptUpdate::default()).unwrap().is_none());

        let result = store.update_concept(
            "basic_vectors",
            ConceptUpdate {
                prerequisites: Some(vec!["ghost".to_string()]),
                ..Default::default()
            },
        );
        assert!(result.is_err());
        assert!(store.get_concept("basic_vectors").unwrap().unwrap().prerequisites.is_empty());
    }

    #[test]
    fn test_archive() {
        let (_temp_dir, mut store) = setup_test_store();
        add(&mut store, "basic_vectors", &[]);

        assert!(store.archive_concept("basic_vectors").unwrap());
        assert!(!store.archive_concept("nope").unwrap());

        assert!(store.list_concepts(&ConceptFilter::new()).unwrap().is_empty());
        assert_eq!(
            store
                .list_concepts(&ConceptFilter::new().include_archived())
                .unwrap()
                .len(),
            1
        );
        // Still resolvable by id
        assert!(store.get_concept("basic_vectors").unwrap().unwrap().is_archived);
    }

    #[test]
    fn test_start_complete_and_available() {
        let (_temp_dir, mut store) = setup_test_store();
        add(&mut store, "basic_vectors", &[]);
        add(&mut store, "vector_operations", &["basic_vectors"]);

        let available: Vec<String> = store
            .available_concepts("alice")
            .unwrap()
            .into_iter()
            .map(|c| c.concept_id)
            .collect();
        assert_eq!(available, vec!["basic_vectors"]);

        assert!(store.start_concept("alice", "basic_vectors").unwrap().is_granted());
        assert!(store.complete_concept("alice", "basic_vectors").unwrap().is_granted());

        let available: Vec<String> = store
            .available_concepts("alice")
            .unwrap()
            .into_iter()
            .map(|c| c.concept_id)
            .collect();
        assert_eq!(available, vec!["vector_operations"]);
    }

    #[test]
    fn test_complete_denied_is_not_persisted() {
        let (_temp_dir, mut store) = setup_test_store();
        add(&mut store, "basic_vectors", &[]);
        add(&mut store, "vector_operations", &["basic_vectors"]);

        let outcome = store.complete_concept("alice", "vector_operations").unwrap();
        assert_eq!(
            outcome,
            Gate::Denied {
                missing: vec!["basic_vectors".to_string()]
            }
        );
        assert!(store.user("alice").unwrap().completed_concepts.is_empty());
    }

    #[test]
    fn test_complete_unknown_concept_is_error() {
        let (_temp_dir, mut store) = setup_test_store();
        let err = store.complete_concept("alice", "ghost").unwrap_err();
        assert!(matches!(err.downcast_ref::<StoreError>(), Some(StoreError::ConceptNotFound(_))));
    }

    #[test]
    fn test_user_created_with_default_tree() {
        let (_temp_dir, mut store) = setup_test_store();
        let user = store.user("alice").unwrap();
        assert_eq!(user.skill_tree_name, "default");

        // Existing users keep their tree name
        let again = store.get_or_create_user("alice", "other").unwrap();
        assert_eq!(again.skill_tree_name, "default");
    }

    #[test]
    fn test_invalid_user_id_rejected() {
        let (_temp_dir, mut store) = setup_test_store();
        assert!(store.user("../escape").is_err());
    }

    #[test]
    fn test_auto_snapshot_written() {
        let (_temp_dir, mut store) = setup_test_store();
        add(&mut store, "basic_vectors", &[]);

        store.complete_concept("alice", "basic_vectors").unwrap();
        let saved = store.saved_snapshot("alice").unwrap().unwrap();
        assert_eq!(saved.completed_concepts[0].concept_id, "basic_vectors");
    }
}
