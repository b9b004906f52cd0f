//! Integration tests for edge cases and boundary conditions.

mod common;

use common::TestEnv;
use skilltree::{ConceptFilter, ConceptUpdate, Gate, NewConcept, Store};
use std::fs::OpenOptions;
use std::io::Write;

// =============================================================================
// Empty Store
// =============================================================================

#[test]
fn test_empty_store_listings() {
    let mut env = TestEnv::new();

    assert!(env.store.list_concepts(&ConceptFilter::new()).unwrap().is_empty());
    assert!(env.available_ids("alice").is_empty());
    assert!(env.blocked_ids("alice").is_empty());
    assert_eq!(env.store.category_graph(None).unwrap().total_concepts, 0);
}

// =============================================================================
// Unicode
// =============================================================================

#[test]
fn test_unicode_title_and_description() {
    let mut env = TestEnv::new();

    let concept = env
        .store
        .create_concept(
            NewConcept::new("eigen", "\u{7279}\u{5F81}\u{503C} \u{1F680}").with_description("\u{0645}\u{0647}\u{0645}\u{0629}"),
        )
        .unwrap();

    env.reopen();
    let retrieved = env.store.get_concept("eigen").unwrap().unwrap();
    assert_eq!(retrieved.title, concept.title);
    assert_eq!(retrieved.description, concept.description);
}

#[test]
fn test_unicode_concept_id() {
    let mut env = TestEnv::new();
    env.add("\u{0432}\u{0435}\u{043A}\u{0442}\u{043E}\u{0440}", "Math", &[]);
    env.complete("alice", "\u{0432}\u{0435}\u{043A}\u{0442}\u{043E}\u{0440}");
}

// =============================================================================
// Boundaries
// =============================================================================

#[test]
fn test_title_length_max_valid() {
    let mut env = TestEnv::new();

    let concept = env
        .store
        .create_concept(NewConcept::new("long", "x".repeat(500)))
        .unwrap();
    assert_eq!(concept.title.len(), 500);
}

#[test]
fn test_difficulty_is_not_range_checked() {
    let mut env = TestEnv::new();

    let low = env
        .store
        .create_concept(NewConcept::new("low", "Low").with_difficulty(-3))
        .unwrap();
    let high = env
        .store
        .create_concept(NewConcept::new("high", "High").with_difficulty(1000))
        .unwrap();
    assert_eq!(low.difficulty_level, -3);
    assert_eq!(high.difficulty_level, 1000);
}

#[test]
fn test_default_difficulty_is_one() {
    let mut env = TestEnv::new();
    let concept = env.add("plain", "", &[]);
    assert_eq!(concept.difficulty_level, 1);
}

#[test]
fn test_description_very_long() {
    let mut env = TestEnv::new();

    let long_desc = "x".repeat(10000);
    let concept = env
        .store
        .create_concept(NewConcept::new("long_desc", "Long").with_description(long_desc.clone()))
        .unwrap();
    assert_eq!(concept.description, long_desc);
}

// =============================================================================
// Prerequisite Lists
// =============================================================================

#[test]
fn test_prerequisite_order_preserved() {
    let mut env = TestEnv::linear_algebra();
    env.reopen();

    let concept = env.store.get_concept("matrix_transformations").unwrap().unwrap();
    assert_eq!(concept.prerequisites, vec!["matrix_multiplication", "vector_operations"]);
}

#[test]
fn test_duplicate_prerequisite_counts_once() {
    let mut env = TestEnv::new();
    env.add("a", "", &[]);
    env.add("b", "", &["a", "a"]);

    assert_eq!(env.store.dependents("a").unwrap(), vec!["b"]);
    assert_eq!(
        env.store.start_concept("alice", "b").unwrap(),
        Gate::Denied {
            missing: vec!["a".to_string()]
        }
    );
}

#[test]
fn test_clearing_prerequisites_unlocks() {
    let mut env = TestEnv::linear_algebra();

    env.store
        .update_concept(
            "eigenvalues",
            ConceptUpdate {
                prerequisites: Some(vec![]),
                ..Default::default()
            },
        )
        .unwrap();

    env.assert_available("alice", "eigenvalues");
}

// =============================================================================
// Archiving
// =============================================================================

#[test]
fn test_archived_prerequisite_still_gates() {
    let mut env = TestEnv::linear_algebra();
    env.store.archive_concept("basic_vectors").unwrap();

    // Archived concepts can still be completed by id and still count
    env.assert_not_available("alice", "vector_operations");
    env.complete("alice", "basic_vectors");
    env.assert_available("alice", "vector_operations");
}

#[test]
fn test_archived_concept_visible_in_trees() {
    let mut env = TestEnv::linear_algebra();
    env.store.archive_concept("matrices_intro").unwrap();

    let tree = env.store.dependency_tree("determinants").unwrap().unwrap();
    assert_eq!(tree.prerequisites[0].as_node().unwrap().concept_id, "matrices_intro");
    assert_eq!(env.store.dependents("matrices_intro").unwrap().len(), 3);
}

#[test]
fn test_unarchive_restores_listing() {
    let mut env = TestEnv::linear_algebra();
    env.store.archive_concept("basic_vectors").unwrap();
    assert_eq!(env.store.list_concepts(&ConceptFilter::new()).unwrap().len(), 8);

    env.store
        .update_concept(
            "basic_vectors",
            ConceptUpdate {
                is_archived: Some(false),
                ..Default::default()
            },
        )
        .unwrap()
        .unwrap();
    assert_eq!(env.store.list_concepts(&ConceptFilter::new()).unwrap().len(), 9);
}

#[test]
fn test_list_filters() {
    let mut env = TestEnv::linear_algebra();
    env.add("limits", "Calculus", &[]);
    env.store.archive_concept("limits").unwrap();

    let calculus = env
        .store
        .list_concepts(&ConceptFilter::new().category("Calculus"))
        .unwrap();
    assert!(calculus.is_empty());

    let calculus_all = env
        .store
        .list_concepts(&ConceptFilter::new().category("Calculus").include_archived())
        .unwrap();
    assert_eq!(calculus_all.len(), 1);

    let everything = env
        .store
        .list_concepts(&ConceptFilter::new().include_archived())
        .unwrap();
    assert_eq!(everything.len(), 10);
}

// =============================================================================
// Persistence and Cache
// =============================================================================

#[test]
fn test_last_record_wins_after_reopen() {
    let mut env = TestEnv::linear_algebra();

    env.store
        .update_concept(
            "basic_vectors",
            ConceptUpdate {
                title: Some("Vectors 101".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    env.reopen();

    assert_eq!(
        env.store.get_concept("basic_vectors").unwrap().unwrap().title,
        "Vectors 101"
    );
    assert_eq!(env.store.list_concepts(&ConceptFilter::new()).unwrap().len(), 9);
}

#[test]
fn test_external_jsonl_append_triggers_rebuild() {
    let mut env = TestEnv::new();
    env.add("basic_vectors", "Linear Algebra", &[]);

    let line = r#"{"concept_id":"matrices_intro","title":"Introduction to Matrices","created_at":"2025-01-01T00:00:00Z","updated_at":"2025-01-01T00:00:00Z"}"#;
    let mut file = OpenOptions::new()
        .append(true)
        .open(env.temp_dir.path().join(".skilltree").join("concepts.jsonl"))
        .unwrap();
    writeln!(file, "{}", line).unwrap();
    drop(file);

    env.reopen();
    let concept = env.store.get_concept("matrices_intro").unwrap().unwrap();
    assert_eq!(concept.difficulty_level, 1);
    assert!(concept.prerequisites.is_empty());
}

#[test]
fn test_malformed_jsonl_line_is_skipped() {
    let mut env = TestEnv::new();
    env.add("basic_vectors", "Linear Algebra", &[]);

    let mut file = OpenOptions::new()
        .append(true)
        .open(env.temp_dir.path().join(".skilltree").join("concepts.jsonl"))
        .unwrap();
    writeln!(file, "{{not json").unwrap();
    drop(file);

    env.reopen();
    assert!(env.store.get_concept("basic_vectors").unwrap().is_some());
}

#[test]
fn test_two_handles_see_each_others_writes_after_reopen() {
    let mut env = TestEnv::linear_algebra();
    env.complete("alice", "basic_vectors");

    let mut other = Store::open(env.temp_dir.path()).unwrap();
    assert!(other.complete_concept("alice", "vector_operations").unwrap().is_granted());
}

// =============================================================================
// Snapshots
// =============================================================================

#[test]
fn test_auto_snapshot_disabled() {
    let mut env = TestEnv::linear_algebra();
    std::fs::write(
        env.temp_dir.path().join(".skilltree").join("config.yaml"),
        "auto_snapshot: false\n",
    )
    .unwrap();
    env.reopen();

    env.complete("alice", "basic_vectors");
    assert!(env.store.saved_snapshot("alice").unwrap().is_none());

    // Explicit export still writes
    env.store.export_snapshot("alice").unwrap();
    assert!(env.store.saved_snapshot("alice").unwrap().is_some());
}

#[test]
fn test_snapshot_directory_from_config() {
    let mut env = TestEnv::linear_algebra();
    let custom = env.temp_dir.path().join("exports");
    std::fs::write(
        env.temp_dir.path().join(".skilltree").join("config.yaml"),
        format!("snapshot_dir: {}\n", custom.display()),
    )
    .unwrap();
    env.reopen();

    env.store.export_snapshot("alice").unwrap();
    assert!(custom.join("alice_skill_tree.json").exists());
}

#[test]
fn test_import_ignores_snapshot_user_and_tree() {
    let mut env = TestEnv::linear_algebra();
    env.complete("alice", "basic_vectors");
    let snapshot = env.store.export_snapshot("alice").unwrap();

    let bob = env.store.import_snapshot("bob", &snapshot).unwrap();
    assert_eq!(bob.user_id, "bob");
    assert_eq!(bob.skill_tree_name, "default");
    assert!(env.store.saved_snapshot("bob").unwrap().is_some());
}
