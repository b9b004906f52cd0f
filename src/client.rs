//! Client for connecting to the skilltree daemon.

use crate::daemon::{DaemonConfig, is_daemon_running, start_daemon};
use crate::graph::{CategoryGraph, DependencyNode};
use crate::progress::Gate;
use crate::protocol::{Request, Response};
use crate::snapshot::Snapshot;
use crate::store::{BlockedEntry, ProgressReport};
use crate::types::{Concept, ConceptFilter, ConceptUpdate, NewConcept};
use eyre::{Context, Result, bail};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Client for communicating with the skilltree daemon.
pub struct Client {
    root: PathBuf,
    stream: UnixStream,
}

impl Client {
    /// Connect to the daemon, optionally auto-starting it if not running.
    pub fn connect(root: &Path, auto_start: bool) -> Result<Self> {
        let config = DaemonConfig::new(root);
        let socket_path = config.socket_path();

        let stream = match UnixStream::connect(&socket_path) {
            Ok(stream) => stream,
            Err(_) if auto_start => {
                if !is_daemon_running(root) {
                    start_daemon(root).context("Failed to auto-start daemon")?;

                    let mut attempts = 0;
                    loop {
                        if attempts > 20 {
                            bail!("Daemon failed to start in time");
                        }
                        std::thread::sleep(Duration::from_millis(50));
                        if let Ok(stream) = UnixStream::connect(&socket_path) {
                            break stream;
                        }
                        attempts += 1;
                    }
                } else {
                    UnixStream::connect(&socket_path).context("Failed to connect to daemon")?
                }
            }
            Err(e) => {
                bail!("Failed to connect to daemon: {}. Is it running?", e);
            }
        };

        stream
            .set_read_timeout(Some(Duration::from_secs(30)))
            .context("Failed to set read timeout")?;

        Ok(Self {
            root: root.to_path_buf(),
            stream,
        })
    }

    /// Get the store root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn request(&mut self, request: Request) -> Result<Response> {
        let request_json = serde_json::to_string(&request)?;
        writeln!(self.stream, "{}", request_json)?;
        self.stream.flush()?;

        let mut reader = BufReader::new(&self.stream);
        let mut response_line = String::new();
        reader.read_line(&mut response_line)?;

        let response: Response = serde_json::from_str(&response_line)?;
        Ok(response)
    }

    /// Create a new concept.
    pub fn create_concept(&mut self, concept: NewConcept) -> Result<Concept> {
        match self.request(Request::CreateConcept { concept })? {
            Response::Concept { concept } => Ok(concept),
            Response::Error { message } => bail!("{}", message),
            _ => bail!("Unexpected response"),
        }
    }

    /// Get a concept by id.
    pub fn get_concept(&mut self, concept_id: &str) -> Result<Option<Concept>> {
        let response = self.request(Request::GetConcept {
            concept_id: concept_id.to_string(),
        })?;

        match response {
            Response::Concept { concept } => Ok(Some(concept)),
            Response::NotFound { .. } => Ok(None),
            Response::Error { message } => bail!("{}", message),
            _ => bail!("Unexpected response"),
        }
    }

    /// Update fields of a concept.
    pub fn update_concept(&mut self, concept_id: &str, update: ConceptUpdate) -> Result<Option<Concept>> {
        let response = self.request(Request::UpdateConcept {
            concept_id: concept_id.to_string(),
            update,
        })?;

        match response {
            Response::Concept { concept } => Ok(Some(concept)),
            Response::NotFound { .. } => Ok(None),
            Response::Error { message } => bail!("{}", message),
            _ => bail!("Unexpected response"),
        }
    }

    /// Archive a concept. Returns false if it does not exist.
    pub fn archive_concept(&mut self, concept_id: &str) -> Result<bool> {
        let response = self.request(Request::ArchiveConcept {
            concept_id: concept_id.to_string(),
        })?;

        match response {
            Response::Ok => Ok(true),
            Response::NotFound { .. } => Ok(false),
            Response::Error { message } => bail!("{}", message),
            _ => bail!("Unexpected response"),
        }
    }

    /// List concepts matching a filter.
    pub fn list_concepts(&mut self, filter: ConceptFilter) -> Result<Vec<Concept>> {
        match self.request(Request::ListConcepts { filter })? {
            Response::Concepts { concepts } => Ok(concepts),
            Response::Error { message } => bail!("{}", message),
            _ => bail!("Unexpected response"),
        }
    }

    /// Prerequisite tree of a concept.
    pub fn dependencies(&mut self, concept_id: &str) -> Result<Option<DependencyNode>> {
        let response = self.request(Request::Dependencies {
            concept_id: concept_id.to_string(),
        })?;

        match response {
            Response::Tree { tree } => Ok(Some(tree)),
            Response::NotFound { .. } => Ok(None),
            Response::Error { message } => bail!("{}", message),
            _ => bail!("Unexpected response"),
        }
    }

    /// Direct dependents of a concept, with the concept's title.
    pub fn dependents(&mut self, concept_id: &str) -> Result<Option<(String, Vec<String>)>> {
        let response = self.request(Request::Dependents {
            concept_id: concept_id.to_string(),
        })?;

        match response {
            Response::Dependents {
                title,
                dependent_concepts,
                ..
            } => Ok(Some((title, dependent_concepts))),
            Response::NotFound { .. } => Ok(None),
            Response::Error { message } => bail!("{}", message),
            _ => bail!("Unexpected response"),
        }
    }

    /// Graph of a category, or of everything.
    pub fn category_graph(&mut self, category: Option<&str>) -> Result<CategoryGraph> {
        let response = self.request(Request::CategoryGraph {
            category: category.map(String::from),
        })?;

        match response {
            Response::Graph { graph } => Ok(graph),
            Response::Error { message } => bail!("{}", message),
            _ => bail!("Unexpected response"),
        }
    }

    /// A user's progress report.
    pub fn progress(&mut self, user_id: &str) -> Result<ProgressReport> {
        let response = self.request(Request::Progress {
            user_id: user_id.to_string(),
        })?;

        match response {
            Response::Progress { report } => Ok(report),
            Response::Error { message } => bail!("{}", message),
            _ => bail!("Unexpected response"),
        }
    }

    /// Start a concept for a user.
    pub fn start_concept(&mut self, user_id: &str, concept_id: &str) -> Result<Gate> {
        let response = self.request(Request::StartConcept {
            user_id: user_id.to_string(),
            concept_id: concept_id.to_string(),
        })?;

        match response {
            Response::Gate { gate } => Ok(gate),
            Response::Error { message } => bail!("{}", message),
            _ => bail!("Unexpected response"),
        }
    }

    /// Complete a concept for a user.
    pub fn complete_concept(&mut self, user_id: &str, concept_id: &str) -> Result<Gate> {
        let response = self.request(Request::CompleteConcept {
            user_id: user_id.to_string(),
            concept_id: concept_id.to_string(),
        })?;

        match response {
            Response::Gate { gate } => Ok(gate),
            Response::Error { message } => bail!("{}", message),
            _ => bail!("Unexpected response"),
        }
    }

    /// Concepts a user may work on next.
    pub fn available_concepts(&mut self, user_id: &str) -> Result<Vec<Concept>> {
        let response = self.request(Request::AvailableConcepts {
            user_id: user_id.to_string(),
        })?;

        match response {
            Response::Concepts { concepts } => Ok(concepts),
            Response::Error { message } => bail!("{}", message),
            _ => bail!("Unexpected response"),
        }
    }

    /// Concepts still locked for a user.
    pub fn blocked_concepts(&mut self, user_id: &str) -> Result<Vec<BlockedEntry>> {
        let response = self.request(Request::BlockedConcepts {
            user_id: user_id.to_string(),
        })?;

        match response {
            Response::Blocked { concepts } => Ok(concepts),
            Response::Error { message } => bail!("{}", message),
            _ => bail!("Unexpected response"),
        }
    }

    /// Export a user's snapshot.
    pub fn export(&mut self, user_id: &str) -> Result<Snapshot> {
        let response = self.request(Request::Export {
            user_id: user_id.to_string(),
        })?;

        match response {
            Response::Snapshot { snapshot } => Ok(snapshot),
            Response::Error { message } => bail!("{}", message),
            _ => bail!("Unexpected response"),
        }
    }

    /// Import a snapshot for a user.
    pub fn import(&mut self, user_id: &str, snapshot: Snapshot) -> Result<()> {
        let response = self.request(Request::Import {
            user_id: user_id.to_string(),
            snapshot,
        })?;

        match response {
            Response::Ok => Ok(()),
            Response::Error { message } => bail!("{}", message),
            _ => bail!("Unexpected response"),
        }
    }

    /// Shutdown the daemon.
    pub fn shutdown(&mut self) -> Result<()> {
        match self.request(Request::Shutdown)? {
            Response::Ok => Ok(()),
            Response::Error { message } => bail!("{}", message),
            _ => bail!("Unexpected response"),
        }
    }

    /// Ping the daemon.
    pub fn ping(&mut self) -> Result<()> {
        match self.request(Request::Ping)? {
            Response::Pong => Ok(()),
            Response::Error { message } => bail!("{}", message),
            _ => bail!("Unexpected response"),
        }
    }
}
