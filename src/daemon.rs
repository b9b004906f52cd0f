//! Background daemon serving the skilltree store over a Unix socket.
//!
//! The daemon provides:
//! - A line-delimited JSON request/response protocol
//! - Single-writer access: one `Store`, requests handled one at a time, so
//!   read-modify-write of a user record never races
//! - Stale socket and PID file cleanup

use crate::config::Config;
use crate::protocol::{Request, Response};
use crate::storage::STORE_DIR;
use crate::store::Store;
use eyre::{Context, Result};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;

/// Socket file name within the .skilltree directory.
const SOCKET_FILE: &str = "daemon.sock";

/// PID file name within the .skilltree directory.
const PID_FILE: &str = "daemon.pid";

/// Configuration for the daemon.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Root directory containing .skilltree
    pub root: PathBuf,

    /// Main loop tick, bounds how long shutdown takes to be noticed
    pub tick_interval: Duration,
}

impl DaemonConfig {
    /// Create config with default settings.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tick_interval: Config::default().daemon.tick_interval(),
        }
    }

    /// Create config using the store's own settings.
    pub fn from_config(root: impl Into<PathBuf>, config: &Config) -> Self {
        Self {
            root: root.into(),
            tick_interval: config.daemon.tick_interval(),
        }
    }

    /// Get the socket path.
    pub fn socket_path(&self) -> PathBuf {
        self.root.join(STORE_DIR).join(SOCKET_FILE)
    }

    /// Get the PID file path.
    pub fn pid_path(&self) -> PathBuf {
        self.root.join(STORE_DIR).join(PID_FILE)
    }
}

/// The skilltree daemon.
pub struct Daemon {
    config: DaemonConfig,
    store: Store,
    shutdown: Arc<AtomicBool>,
}

impl Daemon {
    /// Create a new daemon instance.
    pub fn new(root: &Path) -> Result<Self> {
        let store = Store::open(root).context("Failed to open store")?;
        let config = DaemonConfig::from_config(root, store.config());
        Ok(Self::with_store(config, store))
    }

    /// Create a daemon around an already opened store.
    pub fn with_store(config: DaemonConfig, store: Store) -> Self {
        Self {
            config,
            store,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get a shutdown handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Run the daemon (blocking).
    pub async fn run(&mut self) -> Result<()> {
        // Clean up any stale socket
        let socket_path = self.config.socket_path();
        if socket_path.exists() {
            fs::remove_file(&socket_path).ok();
        }

        let pid_path = self.config.pid_path();
        fs::write(&pid_path, std::process::id().to_string()).context("Failed to write PID file")?;

        let listener = UnixListener::bind(&socket_path).context("Failed to bind to Unix socket")?;
        listener
            .set_nonblocking(true)
            .context("Failed to set socket to non-blocking")?;

        log::info!("Daemon listening on {:?}", socket_path);

        let (tx, mut rx) = mpsc::channel::<(Request, mpsc::Sender<Response>)>(100);

        let shutdown_flag = Arc::clone(&self.shutdown);
        let tx_clone = tx.clone();
        tokio::spawn(async move {
            Self::accept_connections(listener, tx_clone, shutdown_flag).await;
        });

        let mut tick = interval(self.config.tick_interval);

        loop {
            tokio::select! {
                Some((request, response_tx)) = rx.recv() => {
                    let response = self.handle_request(request);
                    let _ = response_tx.send(response).await;
                }

                // Wake periodically so a shutdown flag set elsewhere is seen
                _ = tick.tick() => {}
            }

            if self.shutdown.load(Ordering::Relaxed) {
                log::info!("Daemon shutting down");
                break;
            }
        }

        fs::remove_file(&socket_path).ok();
        fs::remove_file(&pid_path).ok();

        Ok(())
    }

    /// Accept connections in a background task.
    async fn accept_connections(
        listener: UnixListener,
        tx: mpsc::Sender<(Request, mpsc::Sender<Response>)>,
        shutdown: Arc<AtomicBool>,
    ) {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }

            match listener.accept() {
                Ok((stream, _)) => {
                    let tx_clone = tx.clone();
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_connection(stream, tx_clone).await {
                            log::warn!("Connection error: {}", e);
                        }
                    });
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                Err(e) => {
                    log::error!("Accept error: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// Handle a single client connection.
    async fn handle_connection(stream: UnixStream, tx: mpsc::Sender<(Request, mpsc::Sender<Response>)>) -> Result<()> {
        stream.set_nonblocking(false)?;

        let reader = BufReader::new(stream.try_clone()?);
        let mut writer = stream;

        for line in reader.lines() {
            let line = line.context("Failed to read line")?;
            if line.is_empty() {
                continue;
            }

            // Malformed requests are answered, not fatal to the connection
            let request: Request = match serde_json::from_str(&line) {
                Ok(request) => request,
                Err(e) => {
                    let response_json = serde_json::to_string(&Response::error(format!("invalid request: {}", e)))?;
                    writeln!(writer, "{}", response_json)?;
                    writer.flush()?;
                    continue;
                }
            };

            let is_shutdown = matches!(request, Request::Shutdown);

            let (resp_tx, mut resp_rx) = mpsc::channel(1);
            tx.send((request, resp_tx))
                .await
                .context("Failed to send request to daemon")?;

            if let Some(response) = resp_rx.recv().await {
                let response_json = serde_json::to_string(&response)?;
                writeln!(writer, "{}", response_json)?;
                writer.flush()?;
            }

            if is_shutdown {
                break;
            }
        }

        Ok(())
    }

    /// Handle a single request.
    fn handle_request(&mut self, request: Request) -> Response {
        match request {
            Request::CreateConcept { concept } => match self.store.create_concept(concept) {
                Ok(concept) => Response::Concept { concept },
                Err(e) => Response::error(e.to_string()),
            },

            Request::GetConcept { concept_id } => match self.store.get_concept(&concept_id) {
                Ok(Some(concept)) => Response::Concept { concept },
                Ok(None) => Response::NotFound { id: concept_id },
                Err(e) => Response::error(e.to_string()),
            },

            Request::UpdateConcept { concept_id, update } => match self.store.update_concept(&concept_id, update) {
                Ok(Some(concept)) => Response::Concept { concept },
                Ok(None) => Response::NotFound { id: concept_id },
                Err(e) => Response::error(e.to_string()),
            },

            Request::ArchiveConcept { concept_id } => match self.store.archive_concept(&concept_id) {
                Ok(true) => Response::Ok,
                Ok(false) => Response::NotFound { id: concept_id },
                Err(e) => Response::error(e.to_string()),
            },

            Request::ListConcepts { filter } => match self.store.list_concepts(&filter) {
                Ok(concepts) => Response::Concepts { concepts },
                Err(e) => Response::error(e.to_string()),
            },

            Request::Dependencies { concept_id } => match self.store.dependency_tree(&concept_id) {
                Ok(Some(tree)) => Response::Tree { tree },
                Ok(None) => Response::NotFound { id: concept_id },
                Err(e) => Response::error(e.to_string()),
            },

            Request::Dependents { concept_id } => {
                let result = self.store.graph().map(|graph| {
                    graph
                        .get(&concept_id)
                        .map(|c| (c.title.clone(), graph.dependents(&concept_id)))
                });
                match result {
                    Ok(Some((title, dependent_concepts))) => Response::Dependents {
                        concept_id,
                        title,
                        dependent_concepts,
                    },
                    Ok(None) => Response::NotFound { id: concept_id },
                    Err(e) => Response::error(e.to_string()),
                }
            }

            Request::CategoryGraph { category } => match self.store.category_graph(category.as_deref()) {
                Ok(graph) => Response::Graph { graph },
                Err(e) => Response::error(e.to_string()),
            },

            Request::Progress { user_id } => match self.store.progress(&user_id) {
                Ok(report) => Response::Progress { report },
                Err(e) => Response::error(e.to_string()),
            },

            Request::StartConcept { user_id, concept_id } => match self.store.start_concept(&user_id, &concept_id) {
                Ok(gate) => Response::Gate { gate },
                Err(e) => Response::error(e.to_string()),
            },

            Request::CompleteConcept { user_id, concept_id } => {
                match self.store.complete_concept(&user_id, &concept_id) {
                    Ok(gate) => Response::Gate { gate },
                    Err(e) => Response::error(e.to_string()),
                }
            }

            Request::AvailableConcepts { user_id } => match self.store.available_concepts(&user_id) {
                Ok(concepts) => Response::Concepts { concepts },
                Err(e) => Response::error(e.to_string()),
            },

            Request::BlockedConcepts { user_id } => match self.store.blocked_concepts(&user_id) {
                Ok(concepts) => Response::Blocked { concepts },
                Err(e) => Response::error(e.to_string()),
            },

            Request::Export { user_id } => match self.store.export_snapshot(&user_id) {
                Ok(snapshot) => Response::Snapshot { snapshot },
                Err(e) => Response::error(e.to_string()),
            },

            Request::Import { user_id, snapshot } => match self.store.import_snapshot(&user_id, &snapshot) {
                Ok(_) => Response::Ok,
                Err(e) => Response::error(e.to_string()),
            },

            Request::Shutdown => {
                self.shutdown.store(true, Ordering::Relaxed);
                Response::Ok
            }

            Request::Ping => Response::Pong,
        }
    }
}

/// Check if a daemon is running for the given store path.
pub fn is_daemon_running(root: &Path) -> bool {
    let config = DaemonConfig::new(root);
    let socket_path = config.socket_path();
    let pid_path = config.pid_path();

    if !socket_path.exists() {
        return false;
    }

    // Signal 0 checks process existence without delivering anything
    if let Ok(pid_str) = fs::read_to_string(&pid_path)
        && let Ok(pid) = pid_str.trim().parse::<i32>()
    {
        unsafe {
            if libc::kill(pid, 0) == 0 {
                return true;
            }
        }
    }

    // Stale socket, clean up
    fs::remove_file(&socket_path).ok();
    fs::remove_file(&pid_path).ok();
    false
}

/// Start the daemon as a background process.
pub fn start_daemon(root: &Path) -> Result<()> {
    use std::process::Command;

    let exe = std::env::current_exe().context("Failed to get current executable")?;

    Command::new(exe)
        .args(["--dir", root.to_str().unwrap_or("."), "daemon"])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .context("Failed to spawn daemon process")?;

    std::thread::sleep(Duration::from_millis(100));

    Ok(())
}
