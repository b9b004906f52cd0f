//! Integration tests for error handling.
//!
//! Tests that errors are properly returned for invalid operations.

mod common;

use common::TestEnv;
use skilltree::{ConceptUpdate, NewConcept, Store, StoreError, ValidationError};
use tempfile::TempDir;

fn store_error(err: &eyre::Report) -> &StoreError {
    err.downcast_ref::<StoreError>()
        .unwrap_or_else(|| panic!("expected StoreError, got: {:#}", err))
}

// =============================================================================
// Concept Not Found Tests
// =============================================================================

#[test]
fn test_get_nonexistent_concept_returns_none() {
    let env = TestEnv::new();
    assert!(env.store.get_concept("ghost").unwrap().is_none());
}

#[test]
fn test_update_nonexistent_concept_returns_none() {
    let mut env = TestEnv::new();

    let result = env
        .store
        .update_concept(
            "ghost",
            ConceptUpdate {
                title: Some("title".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(result.is_none());
}

#[test]
fn test_archive_nonexistent_concept_returns_false() {
    let mut env = TestEnv::new();
    assert!(!env.store.archive_concept("ghost").unwrap());
}

#[test]
fn test_start_nonexistent_concept_fails() {
    let mut env = TestEnv::new();

    let err = env.store.start_concept("alice", "ghost").unwrap_err();
    assert!(matches!(store_error(&err), StoreError::ConceptNotFound(id) if id == "ghost"));
}

#[test]
fn test_complete_nonexistent_concept_fails() {
    let mut env = TestEnv::new();

    let err = env.store.complete_concept("alice", "ghost").unwrap_err();
    assert!(matches!(store_error(&err), StoreError::ConceptNotFound(_)));
}

// =============================================================================
// Creation Validation Tests
// =============================================================================

#[test]
fn test_create_duplicate_fails() {
    let mut env = TestEnv::new();
    env.add("basic_vectors", "Linear Algebra", &[]);

    let err = env
        .store
        .create_concept(NewConcept::new("basic_vectors", "Another"))
        .unwrap_err();
    assert!(matches!(store_error(&err), StoreError::DuplicateConcept(id) if id == "basic_vectors"));
}

#[test]
fn test_create_unknown_prerequisite_fails() {
    let mut env = TestEnv::new();
    env.add("basic_vectors", "Linear Algebra", &[]);

    let err = env
        .store
        .create_concept(NewConcept::new("matrix_inverse", "Matrix Inversion").with_prerequisites(["basic_vectors", "determinants"]))
        .unwrap_err();
    assert!(matches!(store_error(&err), StoreError::PrerequisiteNotFound(id) if id == "determinants"));
    assert!(env.store.get_concept("matrix_inverse").unwrap().is_none());
}

#[test]
fn test_create_self_prerequisite_fails() {
    let mut env = TestEnv::new();

    let result = env
        .store
        .create_concept(NewConcept::new("loop", "Loop").with_prerequisites(["loop"]));
    assert!(result.is_err());
}

#[test]
fn test_create_empty_id_fails() {
    let mut env = TestEnv::new();

    let err = env.store.create_concept(NewConcept::new("", "Title")).unwrap_err();
    assert!(matches!(
        store_error(&err),
        StoreError::Validation(ValidationError::EmptyConceptId)
    ));
}

#[test]
fn test_create_whitespace_in_id_fails() {
    let mut env = TestEnv::new();

    let err = env
        .store
        .create_concept(NewConcept::new("basic vectors", "Title"))
        .unwrap_err();
    assert!(matches!(
        store_error(&err),
        StoreError::Validation(ValidationError::InvalidConceptId(_))
    ));
}

#[test]
fn test_create_empty_title_fails() {
    let mut env = TestEnv::new();

    let err = env.store.create_concept(NewConcept::new("basic_vectors", "")).unwrap_err();
    assert!(matches!(store_error(&err), StoreError::Validation(ValidationError::EmptyTitle)));
}

#[test]
fn test_create_title_too_long_fails() {
    let mut env = TestEnv::new();

    let result = env
        .store
        .create_concept(NewConcept::new("basic_vectors", "x".repeat(501)));
    assert!(result.is_err());
}

#[test]
fn test_create_control_chars_in_title_fails() {
    let mut env = TestEnv::new();

    let result = env
        .store
        .create_concept(NewConcept::new("basic_vectors", "Basic\x00Vectors"));
    assert!(result.is_err());
}

// =============================================================================
// Update Validation Tests
// =============================================================================

#[test]
fn test_update_to_empty_title_fails() {
    let mut env = TestEnv::new();
    env.add("basic_vectors", "Linear Algebra", &[]);

    let result = env.store.update_concept(
        "basic_vectors",
        ConceptUpdate {
            title: Some(String::new()),
            ..Default::default()
        },
    );
    assert!(result.is_err());
    assert_eq!(
        env.store.get_concept("basic_vectors").unwrap().unwrap().title,
        "basic vectors"
    );
}

#[test]
fn test_update_unknown_prerequisite_fails() {
    let mut env = TestEnv::new();
    env.add("basic_vectors", "Linear Algebra", &[]);

    let err = env
        .store
        .update_concept(
            "basic_vectors",
            ConceptUpdate {
                prerequisites: Some(vec!["ghost".to_string()]),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(matches!(store_error(&err), StoreError::PrerequisiteNotFound(_)));
}

// =============================================================================
// User Validation Tests
// =============================================================================

#[test]
fn test_empty_user_id_fails() {
    let mut env = TestEnv::linear_algebra();

    let err = env.store.progress("").unwrap_err();
    assert!(matches!(store_error(&err), StoreError::Validation(ValidationError::EmptyUserId)));
}

#[test]
fn test_path_like_user_ids_fail() {
    let mut env = TestEnv::linear_algebra();

    for user_id in ["../alice", "a/b", "a\\b", ".", ".."] {
        let err = env.store.complete_concept(user_id, "basic_vectors").unwrap_err();
        assert!(
            matches!(store_error(&err), StoreError::Validation(ValidationError::InvalidUserId(_))),
            "{} should be rejected",
            user_id
        );
    }
    assert!(env.store.saved_snapshot("../alice").is_err());
}

#[test]
fn test_user_id_with_double_dot_inside_is_valid() {
    let mut env = TestEnv::linear_algebra();
    env.complete("john..doe", "basic_vectors");

    env.store.export_snapshot("john..doe").unwrap();
    let path = env.store.snapshots().path_for("john..doe");
    assert!(path.ends_with("john..doe_skill_tree.json"));
    assert!(path.exists());
}

// =============================================================================
// Store Lifecycle Tests
// =============================================================================

#[test]
fn test_init_creates_skilltree_directory() {
    let temp = TempDir::new().unwrap();
    Store::init(temp.path()).unwrap();

    let dir = temp.path().join(".skilltree");
    assert!(dir.exists());
    assert!(dir.join("concepts.jsonl").exists());
    assert!(dir.join("users.jsonl").exists());
    assert!(dir.join("skilltree.db").exists());
    assert!(dir.join("config.yaml").exists());
}

#[test]
fn test_open_existing_store() {
    let temp = TempDir::new().unwrap();

    {
        let mut store = Store::init(temp.path()).unwrap();
        store
            .create_concept(NewConcept::new("basic_vectors", "Basic Vectors"))
            .unwrap();
    }

    {
        let store = Store::open(temp.path()).unwrap();
        assert!(store.get_concept("basic_vectors").unwrap().is_some());
    }
}

#[test]
fn test_init_twice_keeps_data() {
    let temp = TempDir::new().unwrap();

    {
        let mut store = Store::init(temp.path()).unwrap();
        store
            .create_concept(NewConcept::new("basic_vectors", "Basic Vectors"))
            .unwrap();
    }

    let store = Store::init(temp.path()).unwrap();
    assert!(store.get_concept("basic_vectors").unwrap().is_some());
}

#[test]
fn test_open_nonexistent_store_fails() {
    let temp = TempDir::new().unwrap();
    let result = Store::open(temp.path());

    let message = format!("{:#}", result.err().unwrap());
    assert!(message.contains("skt init"));
}

#[test]
fn test_invalid_config_fails_open() {
    let temp = TempDir::new().unwrap();
    Store::init(temp.path()).unwrap();
    std::fs::write(temp.path().join(".skilltree").join("config.yaml"), "auto_snapshot: [not, a, bool]\n").unwrap();

    assert!(Store::open(temp.path()).is_err());
}
