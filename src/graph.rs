//! Read-side computations over the concept prerequisite graph.
//!
//! A [`ConceptGraph`] is built from the full concept set (archived included) and
//! indexes both directions of the prerequisite relation once, so reverse lookups
//! do not rescan every concept.

use crate::types::Concept;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// In-memory view of all concepts with a reverse prerequisite index.
#[derive(Debug, Clone, Default)]
pub struct ConceptGraph {
    concepts: BTreeMap<String, Concept>,
    /// prerequisite id -> ids of concepts listing it, in concept order
    dependents: BTreeMap<String, Vec<String>>,
}

/// A node of a nested dependency tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DependencyNode {
    pub concept_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub difficulty_level: i32,
    pub prerequisites: Vec<Branch>,
}

/// One prerequisite slot of a [`DependencyNode`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Branch {
    /// Prerequisite expanded in place.
    Node(DependencyNode),
    /// Prerequisite already visited earlier in this traversal.
    Truncated { concept_id: String, truncated: bool },
    /// Prerequisite id with no concept record.
    Missing { concept_id: String, missing: bool },
}

impl Branch {
    pub fn concept_id(&self) -> &str {
        match self {
            Branch::Node(node) => &node.concept_id,
            Branch::Truncated { concept_id, .. } | Branch::Missing { concept_id, .. } => concept_id,
        }
    }

    pub fn as_node(&self) -> Option<&DependencyNode> {
        match self {
            Branch::Node(node) => Some(node),
            _ => None,
        }
    }
}

/// Graph of every active concept in a category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryGraph {
    /// Category name, "All" when unfiltered
    pub category: String,
    pub total_concepts: usize,
    pub concepts: BTreeMap<String, GraphEntry>,
}

/// Per-concept entry of a [`CategoryGraph`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphEntry {
    pub title: String,
    pub description: String,
    pub difficulty_level: i32,
    pub prerequisites: Vec<String>,
    pub dependents: Vec<String>,
}

impl ConceptGraph {
    /// Build the graph and its reverse index.
    pub fn new(concepts: impl IntoIterator<Item = Concept>) -> Self {
        let concepts: BTreeMap<String, Concept> = concepts.into_iter().map(|c| (c.concept_id.clone(), c)).collect();

        let mut dependents: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for concept in concepts.values() {
            // A concept listing the same prerequisite twice is still one dependent
            let unique: BTreeSet<&String> = concept.prerequisites.iter().collect();
            for prereq in unique {
                dependents
                    .entry(prereq.clone())
                    .or_default()
                    .push(concept.concept_id.clone());
            }
        }

        Self { concepts, dependents }
    }

    pub fn get(&self, concept_id: &str) -> Option<&Concept> {
        self.concepts.get(concept_id)
    }

    pub fn contains(&self, concept_id: &str) -> bool {
        self.concepts.contains_key(concept_id)
    }

    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    /// Non-archived concepts, ordered by id.
    pub fn active(&self) -> impl Iterator<Item = &Concept> {
        self.concepts.values().filter(|c| !c.is_archived)
    }

    /// Title of a concept, empty if unknown.
    pub fn title_of(&self, concept_id: &str) -> &str {
        self.concepts.get(concept_id).map(|c| c.title.as_str()).unwrap_or("")
    }

    /// Ids of concepts that list `concept_id` as a direct prerequisite.
    pub fn dependents(&self, concept_id: &str) -> Vec<String> {
        self.dependents.get(concept_id).cloned().unwrap_or_default()
    }

    /// Nested prerequisite tree rooted at `concept_id`.
    ///
    /// Traversal is depth-first in prerequisite order with one visited set for the
    /// whole walk, so a concept reachable along two paths is expanded only under
    /// the first and appears as [`Branch::Truncated`] elsewhere. Cycles terminate
    /// the same way.
    pub fn dependency_tree(&self, concept_id: &str) -> Option<DependencyNode> {
        let root = self.concepts.get(concept_id)?;

        // Arena in preorder: children always have larger indices than parents.
        let mut arena: Vec<(&Concept, Vec<Slot>)> = vec![(root, Vec::new())];
        let mut visited: HashSet<&str> = HashSet::from([root.concept_id.as_str()]);
        let mut stack: Vec<(usize, usize)> = vec![(0, 0)];

        while let Some((idx, pos)) = stack.pop() {
            let concept = arena[idx].0;
            let Some(prereq_id) = concept.prerequisites.get(pos) else {
                continue;
            };
            stack.push((idx, pos + 1));

            let slot = match self.concepts.get(prereq_id) {
                None => {
                    log::warn!("Concept {} lists unknown prerequisite {}", concept.concept_id, prereq_id);
                    Slot::Missing(prereq_id.clone())
                }
                Some(_) if visited.contains(prereq_id.as_str()) => Slot::Truncated(prereq_id.clone()),
                Some(prereq) => {
                    visited.insert(prereq.concept_id.as_str());
                    arena.push((prereq, Vec::new()));
                    let child = arena.len() - 1;
                    stack.push((child, 0));
                    Slot::Child(child)
                }
            };
            arena[idx].1.push(slot);
        }

        log::debug!("Dependency tree for {} visited {} concepts", concept_id, arena.len());

        // Assemble bottom-up so every child is built before its parent.
        let mut built: Vec<Option<DependencyNode>> = vec![None; arena.len()];
        for idx in (0..arena.len()).rev() {
            let (concept, slots) = &arena[idx];
            let prerequisites = slots
                .iter()
                .filter_map(|slot| match slot {
                    Slot::Child(child) => built[*child].take().map(Branch::Node),
                    Slot::Truncated(id) => Some(Branch::Truncated {
                        concept_id: id.clone(),
                        truncated: true,
                    }),
                    Slot::Missing(id) => Some(Branch::Missing {
                        concept_id: id.clone(),
                        missing: true,
                    }),
                })
                .collect();
            built[idx] = Some(DependencyNode {
                concept_id: concept.concept_id.clone(),
                title: concept.title.clone(),
                description: concept.description.clone(),
                category: concept.category.clone(),
                difficulty_level: concept.difficulty_level,
                prerequisites,
            });
        }

        built.into_iter().next().flatten()
    }

    /// Every concept reachable through prerequisite edges from `concept_id`,
    /// excluding `concept_id` itself even when a cycle leads back to it.
    pub fn transitive_dependency_ids(&self, concept_id: &str) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        let Some(root) = self.concepts.get(concept_id) else {
            return found;
        };

        let mut stack: Vec<&String> = root.prerequisites.iter().collect();
        while let Some(id) = stack.pop() {
            if id == concept_id || !found.insert(id.clone()) {
                continue;
            }
            if let Some(concept) = self.concepts.get(id) {
                stack.extend(concept.prerequisites.iter());
            }
        }

        found
    }

    /// Prerequisite/dependent adjacency for active concepts in a category.
    pub fn category_graph(&self, category: Option<&str>) -> CategoryGraph {
        let concepts: BTreeMap<String, GraphEntry> = self
            .active()
            .filter(|c| category.is_none_or(|cat| c.category == cat))
            .map(|c| {
                (
                    c.concept_id.clone(),
                    GraphEntry {
                        title: c.title.clone(),
                        description: c.description.clone(),
                        difficulty_level: c.difficulty_level,
                        prerequisites: c.prerequisites.clone(),
                        dependents: self.dependents(&c.concept_id),
                    },
                )
            })
            .collect();

        CategoryGraph {
            category: category.unwrap_or("All").to_string(),
            total_concepts: concepts.len(),
            concepts,
        }
    }
}

/// Arena slot for one prerequisite during tree construction.
enum Slot {
    Child(usize),
    Truncated(String),
    Missing(String),
}
