//! Access gating and progress views for a single user.
//!
//! Everything here is pure: functions take a [`UserSkill`] and concepts and
//! either answer a question or mutate the user in memory. Persistence is the
//! caller's job.

use crate::types::{Concept, ConceptState, UserSkill};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of checking the prerequisite gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Gate {
    /// All prerequisites are completed.
    Granted,
    /// Some prerequisites are not completed yet.
    Denied { missing: Vec<String> },
}

impl Gate {
    pub fn is_granted(&self) -> bool {
        matches!(self, Gate::Granted)
    }
}

/// A concept the user cannot access yet, with the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockedConcept<'a> {
    pub concept: &'a Concept,
    /// Prerequisite ids not yet completed, in prerequisite order
    pub blocked_by: Vec<String>,
}

/// Completion counters for one user.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressStats {
    pub completed: usize,
    pub in_progress: usize,
    pub progress_percentage: f64,
}

/// True iff every prerequisite of `concept` is completed by `user`.
pub fn can_access(user: &UserSkill, concept: &Concept) -> bool {
    concept.prerequisites.iter().all(|p| user.has_completed(p))
}

/// Check the gate and report which prerequisites are missing.
pub fn gate(user: &UserSkill, concept: &Concept) -> Gate {
    let missing = missing_prerequisites(user, concept);
    if missing.is_empty() {
        Gate::Granted
    } else {
        Gate::Denied { missing }
    }
}

fn missing_prerequisites(user: &UserSkill, concept: &Concept) -> Vec<String> {
    let mut missing: Vec<String> = Vec::new();
    for prereq in &concept.prerequisites {
        if !user.has_completed(prereq) && !missing.contains(prereq) {
            missing.push(prereq.clone());
        }
    }
    missing
}

/// Concepts the user can access, completed or not.
pub fn unlocked_concepts<'a>(
    user: &UserSkill,
    concepts: impl IntoIterator<Item = &'a Concept>,
) -> Vec<&'a Concept> {
    concepts.into_iter().filter(|c| can_access(user, c)).collect()
}

/// Accessible concepts the user has not completed. In-progress ones stay in.
pub fn available_concepts<'a>(
    user: &UserSkill,
    concepts: impl IntoIterator<Item = &'a Concept>,
) -> Vec<&'a Concept> {
    unlocked_concepts(user, concepts)
        .into_iter()
        .filter(|c| !user.has_completed(&c.concept_id))
        .collect()
}

/// Inaccessible, uncompleted concepts with their missing prerequisites.
pub fn blocked_concepts<'a>(
    user: &UserSkill,
    concepts: impl IntoIterator<Item = &'a Concept>,
) -> Vec<BlockedConcept<'a>> {
    concepts
        .into_iter()
        .filter(|c| !user.has_completed(&c.concept_id))
        .filter_map(|concept| match gate(user, concept) {
            Gate::Granted => None,
            Gate::Denied { missing } => Some(BlockedConcept {
                concept,
                blocked_by: missing,
            }),
        })
        .collect()
}

/// Mark `concept` completed if the gate allows it.
///
/// Re-completing an already completed concept re-stamps its timestamp without
/// duplicating membership.
pub fn complete_concept(user: &mut UserSkill, concept: &Concept, now: DateTime<Utc>) -> Gate {
    let outcome = gate(user, concept);
    if !outcome.is_granted() {
        return outcome;
    }

    let id = &concept.concept_id;
    let state = user.state_of(id);
    if !state.can_transition_to(&ConceptState::Completed) {
        return outcome;
    }
    if state != ConceptState::Completed {
        user.completed_concepts.push(id.clone());
    }
    user.in_progress_concepts.retain(|c| c != id);
    user.verified_skills.insert(id.clone(), now);
    user.updated_at = now;

    outcome
}

/// Mark `concept` in progress if the gate allows it.
///
/// Starting an already completed concept is granted but changes nothing; a
/// completed concept never goes back to in progress.
pub fn start_concept(user: &mut UserSkill, concept: &Concept, now: DateTime<Utc>) -> Gate {
    let outcome = gate(user, concept);
    if !outcome.is_granted() {
        return outcome;
    }

    let state = user.state_of(&concept.concept_id);
    if !state.can_transition_to(&ConceptState::InProgress) {
        log::debug!("{} already completed {}, leaving it completed", user.user_id, concept.concept_id);
        return outcome;
    }
    if state == ConceptState::Untouched {
        user.in_progress_concepts.push(concept.concept_id.clone());
    }
    user.updated_at = now;

    outcome
}

/// Completion counts and a smoothed percentage.
///
/// The percentage is `completed / (completed + in_progress + 1) * 100`, not a
/// share of all concepts.
pub fn progress_stats(user: &UserSkill) -> ProgressStats {
    let completed = user.completed_concepts.len();
    let in_progress = user.in_progress_concepts.len();
    let progress_percentage = if completed > 0 {
        completed as f64 / (completed + in_progress + 1) as f64 * 100.0
    } else {
        0.0
    };

    ProgressStats {
        completed,
        in_progress,
        progress_percentage,
    }
}
