//! Core data types for the skilltree concept graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum length of a concept identifier.
const MAX_ID_LEN: usize = 200;

/// Maximum length of a concept title.
const MAX_TITLE_LEN: usize = 500;

/// A learning unit node in the dependency graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Concept {
    /// Stable identifier, primary key for all lookups
    pub concept_id: String,

    /// Short display name
    pub title: String,

    /// Longer description
    #[serde(default)]
    pub description: String,

    /// Grouping, e.g. "Linear Algebra"
    #[serde(default)]
    pub category: String,

    /// Informational difficulty, no range enforced
    #[serde(default = "default_difficulty")]
    pub difficulty_level: i32,

    /// Ids of concepts that must be completed first, in insertion order
    #[serde(default)]
    pub prerequisites: Vec<String>,

    /// Soft-delete flag
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_archived: bool,

    /// When created
    pub created_at: DateTime<Utc>,

    /// Last modification
    pub updated_at: DateTime<Utc>,
}

fn default_difficulty() -> i32 {
    1
}

impl Concept {
    /// Check the concept's identifier and display fields.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_concept_id(&self.concept_id)?;

        if self.title.is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        if self.title.len() > MAX_TITLE_LEN {
            return Err(ValidationError::TitleTooLong);
        }
        if self.title.chars().any(|c| c.is_control()) {
            return Err(ValidationError::InvalidCharacters);
        }

        if self.updated_at < self.created_at {
            return Err(ValidationError::InvalidTimestamp);
        }

        Ok(())
    }

    /// Lightweight reference used in listings and snapshots.
    pub fn to_ref(&self) -> ConceptRef {
        ConceptRef {
            concept_id: self.concept_id.clone(),
            title: self.title.clone(),
        }
    }
}

/// Fields for creating a concept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewConcept {
    pub concept_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default = "default_difficulty")]
    pub difficulty_level: i32,
    #[serde(default)]
    pub prerequisites: Vec<String>,
}

impl NewConcept {
    /// Create with just an id and title.
    pub fn new(concept_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            concept_id: concept_id.into(),
            title: title.into(),
            description: String::new(),
            category: String::new(),
            difficulty_level: default_difficulty(),
            prerequisites: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_difficulty(mut self, difficulty_level: i32) -> Self {
        self.difficulty_level = difficulty_level;
        self
    }

    pub fn with_prerequisites(mut self, prerequisites: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.prerequisites = prerequisites.into_iter().map(|p| p.into()).collect();
        self
    }
}

/// Field-level update for a concept. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConceptUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty_level: Option<i32>,
    /// Replaces the whole prerequisite list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prerequisites: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_archived: Option<bool>,
}

impl ConceptUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Filter for concept listings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConceptFilter {
    /// Only concepts in this category
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Include archived concepts alongside active ones
    #[serde(default)]
    pub include_archived: bool,
}

impl ConceptFilter {
    /// Active concepts in every category.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn include_archived(mut self) -> Self {
        self.include_archived = true;
        self
    }

    /// Check a concept against this filter.
    pub fn matches(&self, concept: &Concept) -> bool {
        if concept.is_archived && !self.include_archived {
            return false;
        }
        match &self.category {
            Some(category) => &concept.category == category,
            None => true,
        }
    }
}

/// Id and title of a concept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConceptRef {
    pub concept_id: String,
    #[serde(default)]
    pub title: String,
}

/// One learner's progress through the concept graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserSkill {
    pub user_id: String,

    pub skill_tree_name: String,

    /// Completed concept ids, set semantics
    #[serde(default)]
    pub completed_concepts: Vec<String>,

    /// Started concept ids, set semantics, disjoint from completed
    #[serde(default)]
    pub in_progress_concepts: Vec<String>,

    /// concept_id -> completion time
    #[serde(default)]
    pub verified_skills: BTreeMap<String, DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl UserSkill {
    /// A fresh user with no progress.
    pub fn new(user_id: impl Into<String>, skill_tree_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            skill_tree_name: skill_tree_name.into(),
            completed_concepts: Vec::new(),
            in_progress_concepts: Vec::new(),
            verified_skills: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_completed(&self, concept_id: &str) -> bool {
        self.completed_concepts.iter().any(|c| c == concept_id)
    }

    pub fn is_in_progress(&self, concept_id: &str) -> bool {
        self.in_progress_concepts.iter().any(|c| c == concept_id)
    }

    /// Progress state of a single concept for this user.
    pub fn state_of(&self, concept_id: &str) -> ConceptState {
        if self.has_completed(concept_id) {
            ConceptState::Completed
        } else if self.is_in_progress(concept_id) {
            ConceptState::InProgress
        } else {
            ConceptState::Untouched
        }
    }

    /// Check the user id is usable as a snapshot file stem.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_user_id(&self.user_id)
    }
}

/// Per-(user, concept) progress state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConceptState {
    Untouched,
    InProgress,
    Completed,
}

impl ConceptState {
    /// Check if a state transition exists. Gating is checked separately.
    pub fn can_transition_to(&self, target: &ConceptState) -> bool {
        use ConceptState::*;
        matches!(
            (self, target),
            (Untouched, InProgress)
                | (Untouched, Completed)
                | (InProgress, InProgress)
                | (InProgress, Completed)
                | (Completed, Completed)
        )
    }
}

/// Validation errors for concepts and users.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyConceptId,
    InvalidConceptId(String),
    EmptyTitle,
    TitleTooLong,
    InvalidCharacters,
    InvalidTimestamp,
    EmptyUserId,
    InvalidUserId(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::EmptyConceptId => write!(f, "concept_id cannot be empty"),
            ValidationError::InvalidConceptId(id) => write!(
                f,
                "invalid concept_id '{}': must be at most {} characters without whitespace",
                id, MAX_ID_LEN
            ),
            ValidationError::EmptyTitle => write!(f, "title cannot be empty"),
            ValidationError::TitleTooLong => write!(f, "title exceeds {} characters", MAX_TITLE_LEN),
            ValidationError::InvalidCharacters => write!(f, "title contains control characters"),
            ValidationError::InvalidTimestamp => write!(f, "updated_at cannot be before created_at"),
            ValidationError::EmptyUserId => write!(f, "user_id cannot be empty"),
            ValidationError::InvalidUserId(id) => {
                write!(f, "invalid user_id '{}': must not be '.' or '..' or contain path separators", id)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate a concept identifier.
pub fn validate_concept_id(concept_id: &str) -> Result<(), ValidationError> {
    if concept_id.is_empty() {
        return Err(ValidationError::EmptyConceptId);
    }
    if concept_id.len() > MAX_ID_LEN || concept_id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ValidationError::InvalidConceptId(concept_id.to_string()));
    }
    Ok(())
}

/// Validate a user identifier.
pub fn validate_user_id(user_id: &str) -> Result<(), ValidationError> {
    if user_id.is_empty() {
        return Err(ValidationError::EmptyUserId);
    }
    if user_id == "."
        || user_id == ".."
        || user_id.contains('/')
        || user_id.contains('\\')
        || user_id.chars().any(|c| c.is_control())
    {
        return Err(ValidationError::InvalidUserId(user_id.to_string()));
    }
    Ok(())
}
