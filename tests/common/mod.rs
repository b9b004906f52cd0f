//! Shared test infrastructure for skilltree integration tests.
//!
//! Provides TestEnv helper for consistent test setup/teardown.

#![allow(dead_code)]

use skilltree::{Concept, Gate, NewConcept, Store};
use tempfile::TempDir;

/// Linear algebra sample graph: (id, title, difficulty, prerequisites).
pub const LINEAR_ALGEBRA: &[(&str, &str, i32, &[&str])] = &[
    ("basic_vectors", "Basic Vectors", 1, &[]),
    ("vector_operations", "Vector Operations", 2, &["basic_vectors"]),
    ("matrices_intro", "Introduction to Matrices", 2, &[]),
    ("matrix_multiplication", "Matrix Multiplication", 3, &["matrices_intro"]),
    (
        "matrix_transformations",
        "Matrix Transformations",
        4,
        &["matrix_multiplication", "vector_operations"],
    ),
    ("eigenvalues", "Eigenvalues and Eigenvectors", 4, &["matrix_transformations"]),
    ("linear_systems", "Solving Linear Systems", 3, &["matrices_intro"]),
    ("determinants", "Determinants", 3, &["matrices_intro"]),
    ("matrix_inverse", "Matrix Inversion", 4, &["determinants", "linear_systems"]),
];

/// Test environment with automatic cleanup.
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub store: Store,
}

impl TestEnv {
    /// Create a new test environment with an initialized, empty store.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = Store::init(temp_dir.path()).expect("Failed to init store");
        Self { temp_dir, store }
    }

    /// Create a test environment seeded with the linear algebra graph.
    pub fn linear_algebra() -> Self {
        let mut env = Self::new();
        for (id, title, difficulty, prereqs) in LINEAR_ALGEBRA {
            env.store
                .create_concept(
                    NewConcept::new(*id, *title)
                        .with_category("Linear Algebra")
                        .with_difficulty(*difficulty)
                        .with_prerequisites(prereqs.iter().copied()),
                )
                .expect("Failed to seed concept");
        }
        env
    }

    /// Reopen the store from disk, dropping the current handle.
    pub fn reopen(&mut self) {
        self.store = Store::open(self.temp_dir.path()).expect("Failed to reopen store");
    }

    /// Create a concept in a category with the given prerequisites.
    pub fn add(&mut self, id: &str, category: &str, prereqs: &[&str]) -> Concept {
        self.store
            .create_concept(
                NewConcept::new(id, id.replace('_', " "))
                    .with_category(category)
                    .with_prerequisites(prereqs.iter().copied()),
            )
            .expect("Failed to create concept")
    }

    /// Complete a concept, asserting the gate was granted.
    pub fn complete(&mut self, user: &str, id: &str) {
        let gate = self.store.complete_concept(user, id).expect("Failed to complete");
        assert_eq!(gate, Gate::Granted, "expected {} to complete {}", user, id);
    }

    /// Start a concept, asserting the gate was granted.
    pub fn start(&mut self, user: &str, id: &str) {
        let gate = self.store.start_concept(user, id).expect("Failed to start");
        assert_eq!(gate, Gate::Granted, "expected {} to start {}", user, id);
    }

    /// Ids of concepts available to a user, sorted.
    pub fn available_ids(&mut self, user: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .store
            .available_concepts(user)
            .expect("Failed to get available concepts")
            .into_iter()
            .map(|c| c.concept_id)
            .collect();
        ids.sort();
        ids
    }

    /// Ids of concepts blocked for a user, sorted.
    pub fn blocked_ids(&mut self, user: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .store
            .blocked_concepts(user)
            .expect("Failed to get blocked concepts")
            .into_iter()
            .map(|b| b.concept_id)
            .collect();
        ids.sort();
        ids
    }

    /// Assert that a concept is available to a user.
    pub fn assert_available(&mut self, user: &str, id: &str) {
        let available = self.available_ids(user);
        assert!(
            available.iter().any(|a| a == id),
            "Expected {} to be available to {}. Available: {:?}",
            id,
            user,
            available
        );
    }

    /// Assert that a concept is NOT available to a user.
    pub fn assert_not_available(&mut self, user: &str, id: &str) {
        let available = self.available_ids(user);
        assert!(
            !available.iter().any(|a| a == id),
            "Expected {} to NOT be available to {}",
            id,
            user
        );
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Sort a list of ids for order-independent comparison.
pub fn sorted(mut ids: Vec<String>) -> Vec<String> {
    ids.sort();
    ids
}
