//! Portable per-user progress documents.
//!
//! A [`Snapshot`] captures a user's completed concepts (with timestamps) and
//! in-progress concepts. Restoring one only brings back the completed set;
//! in-progress concepts are cleared, not restored.

use crate::graph::ConceptGraph;
use crate::types::{ConceptRef, UserSkill};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use eyre::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Suffix of snapshot file names.
const SNAPSHOT_SUFFIX: &str = "_skill_tree.json";

/// Exported progress of one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    #[serde(default)]
    pub user_id: String,

    #[serde(default)]
    pub skill_tree_name: Option<String>,

    #[serde(default)]
    pub completed_concepts: Vec<CompletedEntry>,

    #[serde(default)]
    pub in_progress_concepts: Vec<ConceptRef>,

    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub exported_at: Option<DateTime<Utc>>,
}

/// A completed concept inside a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletedEntry {
    pub concept_id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Parse a snapshot timestamp.
///
/// Accepts RFC 3339 and offset-less ISO 8601 (`2024-01-15T10:30:00.123456`),
/// which is read as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|naive| Utc.from_utc_datetime(&naive)))
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|raw| parse_timestamp(&raw).map_err(serde::de::Error::custom))
        .transpose()
}

/// Snapshot referenced a concept that does not exist.
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownConcept(pub String);

impl Snapshot {
    /// Capture the observable state of `user`. Titles come from `graph`.
    pub fn capture(user: &UserSkill, graph: &ConceptGraph, now: DateTime<Utc>) -> Self {
        let completed_concepts = user
            .completed_concepts
            .iter()
            .map(|id| CompletedEntry {
                concept_id: id.clone(),
                title: graph.title_of(id).to_string(),
                completed_at: user.verified_skills.get(id).copied(),
            })
            .collect();

        let in_progress_concepts = user
            .in_progress_concepts
            .iter()
            .map(|id| ConceptRef {
                concept_id: id.clone(),
                title: graph.title_of(id).to_string(),
            })
            .collect();

        Self {
            user_id: user.user_id.clone(),
            skill_tree_name: Some(user.skill_tree_name.clone()),
            completed_concepts,
            in_progress_concepts,
            created_at: Some(user.created_at),
            updated_at: Some(user.updated_at),
            exported_at: Some(now),
        }
    }

    /// Replace `user`'s progress with the completed set of this snapshot.
    ///
    /// Every referenced concept is resolved before anything changes, so a
    /// failed restore leaves `user` untouched. Prerequisites are not re-checked.
    pub fn restore(&self, user: &mut UserSkill, graph: &ConceptGraph, now: DateTime<Utc>) -> Result<(), UnknownConcept> {
        if let Some(entry) = self.completed_concepts.iter().find(|e| !graph.contains(&e.concept_id)) {
            return Err(UnknownConcept(entry.concept_id.clone()));
        }

        let mut completed: Vec<String> = Vec::with_capacity(self.completed_concepts.len());
        let mut verified: BTreeMap<String, DateTime<Utc>> = BTreeMap::new();
        for entry in &self.completed_concepts {
            if !completed.contains(&entry.concept_id) {
                completed.push(entry.concept_id.clone());
            }
            if let Some(at) = entry.completed_at {
                verified.insert(entry.concept_id.clone(), at);
            }
        }

        user.completed_concepts = completed;
        user.in_progress_concepts.clear();
        user.verified_skills = verified;
        user.updated_at = now;

        Ok(())
    }
}

/// Directory holding one snapshot file per user.
#[derive(Debug, Clone)]
pub struct SnapshotDir {
    root: PathBuf,
}

impl SnapshotDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the snapshot file for `user_id`.
    pub fn path_for(&self, user_id: &str) -> PathBuf {
        self.root.join(format!("{}{}", user_id, SNAPSHOT_SUFFIX))
    }

    /// Write a snapshot as pretty JSON, replacing any previous one.
    pub fn write(&self, snapshot: &Snapshot) -> Result<PathBuf> {
        fs::create_dir_all(&self.root).context("Failed to create snapshot directory")?;

        let path = self.path_for(&snapshot.user_id);
        let json = serde_json::to_string_pretty(snapshot).context("Failed to serialize snapshot")?;

        // Write then rename so readers never see a partial document
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("Failed to move snapshot into {}", path.display()))?;

        log::info!("Wrote snapshot for {} to {}", snapshot.user_id, path.display());
        Ok(path)
    }

    /// Read the saved snapshot for `user_id`, if any.
    pub fn read(&self, user_id: &str) -> Result<Option<Snapshot>> {
        let path = self.path_for(user_id);
        if !path.exists() {
            return Ok(None);
        }
        load(&path).map(Some)
    }
}

/// Load a snapshot document from an arbitrary path.
pub fn load(path: &Path) -> Result<Snapshot> {
    let contents = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Failed to parse snapshot {}", path.display()))
}
