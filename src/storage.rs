//! Storage layer for skilltree: JSONL files + SQLite cache.
//!
//! JSONL logs are the source of truth (last record per key wins). SQLite is a
//! query cache rebuilt from them whenever the recorded line counts drift.

use crate::types::{Concept, ConceptFilter, UserSkill};
use chrono::{DateTime, SecondsFormat, Utc};
use eyre::{Context, Result};
use rusqlite::{Connection, OptionalExtension, ToSql, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Storage directory name.
pub const STORE_DIR: &str = ".skilltree";

/// JSONL file for concepts.
const CONCEPTS_FILE: &str = "concepts.jsonl";

/// JSONL file for users.
const USERS_FILE: &str = "users.jsonl";

/// SQLite database file.
const DB_FILE: &str = "skilltree.db";

/// Persisted concept records.
pub trait ConceptStore {
    /// Get a concept by id, archived or not.
    fn get_concept(&self, concept_id: &str) -> Result<Option<Concept>>;

    /// List concepts matching a filter, oldest first.
    fn list_concepts(&self, filter: &ConceptFilter) -> Result<Vec<Concept>>;

    /// Insert or replace a concept wholesale.
    fn put_concept(&mut self, concept: &Concept) -> Result<()>;
}

/// Persisted user progress records.
pub trait UserStore {
    fn get_user(&self, user_id: &str) -> Result<Option<UserSkill>>;

    /// Insert or replace a user wholesale.
    fn put_user(&mut self, user: &UserSkill) -> Result<()>;
}

/// Storage handle for reading/writing skilltree data.
pub struct Storage {
    dir: PathBuf,
    db: Connection,
}

impl Storage {
    /// Initialize storage in the given directory.
    pub fn init(root: &Path) -> Result<Self> {
        let dir = root.join(STORE_DIR);
        fs::create_dir_all(&dir).context("Failed to create .skilltree directory")?;

        for name in [CONCEPTS_FILE, USERS_FILE] {
            let path = dir.join(name);
            if !path.exists() {
                File::create(&path).with_context(|| format!("Failed to create {}", name))?;
            }
        }

        let db = Connection::open(dir.join(DB_FILE)).context("Failed to open SQLite database")?;
        let mut storage = Self { dir, db };

        storage.init_schema()?;
        storage.rebuild_from_jsonl()?;

        Ok(storage)
    }

    /// Open existing storage.
    pub fn open(root: &Path) -> Result<Self> {
        let dir = root.join(STORE_DIR);
        if !dir.exists() {
            eyre::bail!("No .skilltree directory found. Run 'skt init' first.");
        }

        let db = Connection::open(dir.join(DB_FILE)).context("Failed to open SQLite database")?;
        let mut storage = Self { dir, db };

        storage.init_schema()?;

        if storage.needs_rebuild()? {
            log::info!("SQLite cache out of date, rebuilding from JSONL");
            storage.rebuild_from_jsonl()?;
        }

        Ok(storage)
    }

    /// The `.skilltree` directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Initialize SQLite schema.
    fn init_schema(&self) -> Result<()> {
        self.db
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS concepts (
                    concept_id TEXT PRIMARY KEY,
                    title TEXT NOT NULL,
                    description TEXT NOT NULL,
                    category TEXT NOT NULL,
                    difficulty_level INTEGER NOT NULL,
                    is_archived INTEGER NOT NULL CHECK (is_archived IN (0, 1)),
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_concepts_category ON concepts(category);

                CREATE TABLE IF NOT EXISTS prerequisites (
                    concept_id TEXT NOT NULL,
                    prerequisite_id TEXT NOT NULL,
                    position INTEGER NOT NULL,
                    PRIMARY KEY (concept_id, position)
                );
                CREATE INDEX IF NOT EXISTS idx_prerequisites_prereq ON prerequisites(prerequisite_id);

                CREATE TABLE IF NOT EXISTS users (
                    user_id TEXT PRIMARY KEY,
                    skill_tree_name TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS user_concepts (
                    user_id TEXT NOT NULL,
                    concept_id TEXT NOT NULL,
                    state TEXT NOT NULL CHECK (state IN ('completed', 'in_progress')),
                    position INTEGER NOT NULL,
                    PRIMARY KEY (user_id, state, concept_id)
                );

                CREATE TABLE IF NOT EXISTS verified_skills (
                    user_id TEXT NOT NULL,
                    concept_id TEXT NOT NULL,
                    completed_at TEXT NOT NULL,
                    PRIMARY KEY (user_id, concept_id)
                );

                CREATE TABLE IF NOT EXISTS meta (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );
            "#,
            )
            .context("Failed to initialize schema")?;

        Ok(())
    }

    /// Check if SQLite needs to be rebuilt from JSONL.
    fn needs_rebuild(&self) -> Result<bool> {
        let concept_lines = count_lines(&self.dir.join(CONCEPTS_FILE))?;
        let user_lines = count_lines(&self.dir.join(USERS_FILE))?;

        let stored_concepts = self.meta_count("jsonl_concepts_lines");
        let stored_users = self.meta_count("jsonl_users_lines");

        Ok(concept_lines as i64 != stored_concepts || user_lines as i64 != stored_users)
    }

    fn meta_count(&self, key: &str) -> i64 {
        self.db
            .query_row(
                "SELECT CAST(COALESCE((SELECT value FROM meta WHERE key = ?), '0') AS INTEGER)",
                params![key],
                |row| row.get(0),
            )
            .unwrap_or(0)
    }

    /// Rebuild SQLite cache from JSONL files.
    pub fn rebuild_from_jsonl(&mut self) -> Result<()> {
        self.db
            .execute_batch(
                r#"
                DELETE FROM prerequisites;
                DELETE FROM concepts;
                DELETE FROM user_concepts;
                DELETE FROM verified_skills;
                DELETE FROM users;
            "#,
            )
            .context("Failed to clear tables")?;

        let (concepts, concept_lines) =
            read_jsonl::<Concept, _>(&self.dir.join(CONCEPTS_FILE), |c| c.concept_id.clone())?;
        let (users, user_lines) = read_jsonl::<UserSkill, _>(&self.dir.join(USERS_FILE), |u| u.user_id.clone())?;

        let tx = self.db.transaction().context("Failed to start rebuild transaction")?;
        for concept in concepts.values() {
            insert_concept_to_db(&tx, concept)?;
        }
        for user in users.values() {
            insert_user_to_db(&tx, user)?;
        }

        tx.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('jsonl_concepts_lines', ?)",
            params![concept_lines.to_string()],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('jsonl_users_lines', ?)",
            params![user_lines.to_string()],
        )?;
        tx.commit().context("Failed to commit rebuild")?;

        log::debug!(
            "Rebuilt cache: {} concepts, {} users",
            concepts.len(),
            users.len()
        );
        Ok(())
    }

    /// Append a record to a JSONL file and bump its recorded line count.
    fn append_line<T: Serialize>(&self, file_name: &str, meta_key: &str, record: &T) -> Result<()> {
        let path = self.dir.join(file_name);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {} for append", file_name))?;

        let json = serde_json::to_string(record).context("Failed to serialize record")?;
        writeln!(file, "{}", json).with_context(|| format!("Failed to write to {}", file_name))?;
        file.sync_all().with_context(|| format!("Failed to sync {}", file_name))?;

        self.db.execute(
            "UPDATE meta SET value = CAST(CAST(value AS INTEGER) + 1 AS TEXT) WHERE key = ?",
            params![meta_key],
        )?;

        Ok(())
    }

    /// Load prerequisite ids of a concept in insertion order.
    fn load_prerequisites(&self, concept_id: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .db
            .prepare_cached("SELECT prerequisite_id FROM prerequisites WHERE concept_id = ? ORDER BY position")?;
        let prereqs: Vec<String> = stmt
            .query_map(params![concept_id], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(prereqs)
    }

    /// Load a user's concept ids in one state, in insertion order.
    fn load_user_concepts(&self, user_id: &str, state: &str) -> Result<Vec<String>> {
        let mut stmt = self.db.prepare_cached(
            "SELECT concept_id FROM user_concepts WHERE user_id = ? AND state = ? ORDER BY position",
        )?;
        let ids: Vec<String> = stmt
            .query_map(params![user_id, state], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(ids)
    }

    fn load_verified_skills(&self, user_id: &str) -> Result<BTreeMap<String, DateTime<Utc>>> {
        let mut stmt = self
            .db
            .prepare_cached("SELECT concept_id, completed_at FROM verified_skills WHERE user_id = ?")?;
        let skills: BTreeMap<String, DateTime<Utc>> = stmt
            .query_map(params![user_id], |row| {
                let concept_id: String = row.get(0)?;
                let completed_at: String = row.get(1)?;
                Ok((concept_id, completed_at))
            })?
            .filter_map(|r| r.ok())
            .filter_map(|(id, at)| parse_ts(&at).map(|at| (id, at)))
            .collect();
        Ok(skills)
    }

    /// Convert a database row to a Concept without prerequisites.
    fn row_to_concept(row: &rusqlite::Row) -> rusqlite::Result<Concept> {
        let created_at: String = row.get(6)?;
        let updated_at: String = row.get(7)?;
        let is_archived: i64 = row.get(5)?;

        Ok(Concept {
            concept_id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            category: row.get(3)?,
            difficulty_level: row.get(4)?,
            prerequisites: vec![],
            is_archived: is_archived != 0,
            created_at: parse_ts(&created_at).unwrap_or_else(Utc::now),
            updated_at: parse_ts(&updated_at).unwrap_or_else(Utc::now),
        })
    }
}

impl ConceptStore for Storage {
    fn get_concept(&self, concept_id: &str) -> Result<Option<Concept>> {
        let mut stmt = self.db.prepare_cached(
            r#"
            SELECT concept_id, title, description, category, difficulty_level, is_archived, created_at, updated_at
            FROM concepts WHERE concept_id = ?
            "#,
        )?;

        let concept = stmt.query_row(params![concept_id], Self::row_to_concept).optional()?;

        match concept {
            Some(mut concept) => {
                concept.prerequisites = self.load_prerequisites(concept_id)?;
                Ok(Some(concept))
            }
            None => Ok(None),
        }
    }

    fn list_concepts(&self, filter: &ConceptFilter) -> Result<Vec<Concept>> {
        let mut sql = String::from(
            r#"
            SELECT concept_id, title, description, category, difficulty_level, is_archived, created_at, updated_at
            FROM concepts WHERE 1 = 1
            "#,
        );
        let mut args: Vec<&dyn ToSql> = Vec::new();

        if !filter.include_archived {
            sql.push_str(" AND is_archived = 0");
        }
        if let Some(category) = &filter.category {
            sql.push_str(" AND category = ?");
            args.push(category);
        }
        sql.push_str(" ORDER BY created_at ASC, concept_id ASC");

        let mut stmt = self.db.prepare(&sql)?;
        let mut concepts: Vec<Concept> = stmt
            .query_map(&args[..], Self::row_to_concept)?
            .filter_map(|r| r.ok())
            .collect();

        for concept in &mut concepts {
            concept.prerequisites = self.load_prerequisites(&concept.concept_id)?;
        }

        Ok(concepts)
    }

    fn put_concept(&mut self, concept: &Concept) -> Result<()> {
        self.append_line(CONCEPTS_FILE, "jsonl_concepts_lines", concept)?;
        insert_concept_to_db(&self.db, concept)
    }
}

impl UserStore for Storage {
    fn get_user(&self, user_id: &str) -> Result<Option<UserSkill>> {
        let mut stmt = self
            .db
            .prepare_cached("SELECT user_id, skill_tree_name, created_at, updated_at FROM users WHERE user_id = ?")?;

        let row = stmt
            .query_row(params![user_id], |row| {
                let created_at: String = row.get(2)?;
                let updated_at: String = row.get(3)?;
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, created_at, updated_at))
            })
            .optional()?;

        let Some((user_id, skill_tree_name, created_at, updated_at)) = row else {
            return Ok(None);
        };

        Ok(Some(UserSkill {
            completed_concepts: self.load_user_concepts(&user_id, "completed")?,
            in_progress_concepts: self.load_user_concepts(&user_id, "in_progress")?,
            verified_skills: self.load_verified_skills(&user_id)?,
            created_at: parse_ts(&created_at).unwrap_or_else(Utc::now),
            updated_at: parse_ts(&updated_at).unwrap_or_else(Utc::now),
            user_id,
            skill_tree_name,
        }))
    }

    fn put_user(&mut self, user: &UserSkill) -> Result<()> {
        self.append_line(USERS_FILE, "jsonl_users_lines", user)?;
        insert_user_to_db(&self.db, user)
    }
}

/// Insert a concept and its prerequisite rows.
fn insert_concept_to_db(db: &Connection, concept: &Concept) -> Result<()> {
    db.execute(
        r#"
        INSERT OR REPLACE INTO concepts (concept_id, title, description, category, difficulty_level, is_archived, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            concept.concept_id,
            concept.title,
            concept.description,
            concept.category,
            concept.difficulty_level,
            concept.is_archived as i64,
            fmt_ts(&concept.created_at),
            fmt_ts(&concept.updated_at),
        ],
    )?;

    db.execute(
        "DELETE FROM prerequisites WHERE concept_id = ?",
        params![concept.concept_id],
    )?;
    for (position, prereq) in concept.prerequisites.iter().enumerate() {
        db.execute(
            "INSERT INTO prerequisites (concept_id, prerequisite_id, position) VALUES (?, ?, ?)",
            params![concept.concept_id, prereq, position as i64],
        )?;
    }

    Ok(())
}

/// Insert a user with membership and verified-skill rows.
fn insert_user_to_db(db: &Connection, user: &UserSkill) -> Result<()> {
    db.execute(
        r#"
        INSERT OR REPLACE INTO users (user_id, skill_tree_name, created_at, updated_at)
        VALUES (?, ?, ?, ?)
        "#,
        params![
            user.user_id,
            user.skill_tree_name,
            fmt_ts(&user.created_at),
            fmt_ts(&user.updated_at),
        ],
    )?;

    db.execute("DELETE FROM user_concepts WHERE user_id = ?", params![user.user_id])?;
    for (state, ids) in [
        ("completed", &user.completed_concepts),
        ("in_progress", &user.in_progress_concepts),
    ] {
        for (position, concept_id) in ids.iter().enumerate() {
            db.execute(
                "INSERT OR IGNORE INTO user_concepts (user_id, concept_id, state, position) VALUES (?, ?, ?, ?)",
                params![user.user_id, concept_id, state, position as i64],
            )?;
        }
    }

    db.execute("DELETE FROM verified_skills WHERE user_id = ?", params![user.user_id])?;
    for (concept_id, completed_at) in &user.verified_skills {
        db.execute(
            "INSERT INTO verified_skills (user_id, concept_id, completed_at) VALUES (?, ?, ?)",
            params![user.user_id, concept_id, fmt_ts(completed_at)],
        )?;
    }

    Ok(())
}

/// Read a JSONL file keyed by `key_of`; later records replace earlier ones.
/// Returns the records and the number of lines read.
fn read_jsonl<T, F>(path: &Path, key_of: F) -> Result<(HashMap<String, T>, usize)>
where
    T: DeserializeOwned,
    F: Fn(&T) -> String,
{
    let mut records: HashMap<String, T> = HashMap::new();
    let mut line_count = 0;

    if !path.exists() {
        return Ok((records, line_count));
    }

    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let reader = BufReader::new(file);

    for line in reader.lines() {
        line_count += 1;
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                log::warn!("Failed to read line {} of {}: {}", line_count, path.display(), e);
                continue;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<T>(&line) {
            Ok(record) => {
                records.insert(key_of(&record), record);
            }
            Err(e) => {
                log::warn!("Failed to parse line {} of {}: {}", line_count, path.display(), e);
            }
        }
    }

    Ok((records, line_count))
}

/// Fixed-width RFC 3339 so text ordering matches time ordering.
fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc)).ok()
}

/// Count lines in a file.
fn count_lines(path: &Path) -> Result<usize> {
    if !path.exists() {
        return Ok(0);
    }
    let file = File::open(path).context("Failed to open file for line count")?;
    let reader = BufReader::new(file);
    Ok(reader.lines().count())
}
