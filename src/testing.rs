//! In-memory collaborators for exercising the engine, provider and controller.

use crate::backup::BackupService;
use crate::clock::Clock;
use crate::error::{KeeperError, Result};
use crate::preflight::PreflightService;
use crate::process::ProcessManager;
use crate::update::{PatchApplier, UpdateCheck, UpdateOracle};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared, ordered record of collaborator calls
pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

#[derive(Debug, Clone)]
enum OracleAnswer {
    UpToDate,
    Available(String),
    Fails,
}

pub struct ScriptedOracle {
    answer: Mutex<OracleAnswer>,
    calls: AtomicUsize,
    versions_seen: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    fn with_answer(answer: OracleAnswer) -> Self {
        Self {
            answer: Mutex::new(answer),
            calls: AtomicUsize::new(0),
            versions_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn up_to_date() -> Self {
        Self::with_answer(OracleAnswer::UpToDate)
    }

    pub fn available(version: &str) -> Self {
        Self::with_answer(OracleAnswer::Available(version.to_string()))
    }

    pub fn failing() -> Self {
        Self::with_answer(OracleAnswer::Fails)
    }

    pub fn set_available(&self, version: &str) {
        *self.answer.lock() = OracleAnswer::Available(version.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn versions_seen(&self) -> Vec<String> {
        self.versions_seen.lock().clone()
    }
}

#[async_trait]
impl UpdateOracle for ScriptedOracle {
    async fn check_for_newer_version(&self, current_version: &str) -> Result<UpdateCheck> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.versions_seen.lock().push(current_version.to_string());

        let answer = self.answer.lock().clone();
        match answer {
            OracleAnswer::UpToDate => Ok(UpdateCheck::up_to_date("current")),
            OracleAnswer::Available(version) => Ok(UpdateCheck {
                available: true,
                message: format!("{} available", version),
                new_version: version,
            }),
            OracleAnswer::Fails => Err(KeeperError::update("manifest unreachable")),
        }
    }
}

/// Process manager whose state flips instantly on start/stop
pub struct FakeProcessManager {
    clock: Arc<dyn Clock>,
    running: AtomicBool,
    start_time: Mutex<Option<DateTime<Utc>>>,
    start_succeeds: AtomicBool,
    graceful_succeeds: AtomicBool,
    journal: Journal,
    running_queries: AtomicUsize,
    start_calls: AtomicUsize,
    graceful_calls: AtomicUsize,
    force_calls: AtomicUsize,
}

impl FakeProcessManager {
    pub fn new(clock: Arc<dyn Clock>, journal: Journal) -> Self {
        Self {
            clock,
            running: AtomicBool::new(false),
            start_time: Mutex::new(None),
            start_succeeds: AtomicBool::new(true),
            graceful_succeeds: AtomicBool::new(true),
            journal,
            running_queries: AtomicUsize::new(0),
            start_calls: AtomicUsize::new(0),
            graceful_calls: AtomicUsize::new(0),
            force_calls: AtomicUsize::new(0),
        }
    }

    /// Pretend the server is already up, started at `since`
    pub fn set_running(&self, since: Option<DateTime<Utc>>) {
        self.running.store(true, Ordering::SeqCst);
        *self.start_time.lock() = since;
    }

    pub fn fail_starts(&self) {
        self.start_succeeds.store(false, Ordering::SeqCst);
    }

    pub fn ignore_graceful_stops(&self) {
        self.graceful_succeeds.store(false, Ordering::SeqCst);
    }

    pub fn running_queries(&self) -> usize {
        self.running_queries.load(Ordering::SeqCst)
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn graceful_calls(&self) -> usize {
        self.graceful_calls.load(Ordering::SeqCst)
    }

    pub fn force_calls(&self) -> usize {
        self.force_calls.load(Ordering::SeqCst)
    }

    fn mark_stopped(&self) {
        self.running.store(false, Ordering::SeqCst);
        *self.start_time.lock() = None;
    }
}

#[async_trait]
impl ProcessManager for FakeProcessManager {
    async fn is_running(&self) -> bool {
        self.running_queries.fetch_add(1, Ordering::SeqCst);
        self.running.load(Ordering::SeqCst)
    }

    async fn start_time(&self) -> Option<DateTime<Utc>> {
        *self.start_time.lock()
    }

    async fn current_version(&self) -> String {
        "1.0.0".to_string()
    }

    async fn start(&self) -> bool {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        self.journal.lock().push("start".to_string());
        if !self.start_succeeds.load(Ordering::SeqCst) {
            return false;
        }
        self.running.store(true, Ordering::SeqCst);
        *self.start_time.lock() = Some(self.clock.now());
        true
    }

    async fn graceful_stop(&self) -> bool {
        self.graceful_calls.fetch_add(1, Ordering::SeqCst);
        self.journal.lock().push("graceful_stop".to_string());
        if !self.graceful_succeeds.load(Ordering::SeqCst) {
            return false;
        }
        self.mark_stopped();
        true
    }

    async fn force_stop(&self) -> bool {
        self.force_calls.fetch_add(1, Ordering::SeqCst);
        self.journal.lock().push("force_stop".to_string());
        self.mark_stopped();
        true
    }
}

pub struct RecordingPatchApplier {
    journal: Journal,
    fails: AtomicBool,
    applied: Mutex<Vec<String>>,
}

impl RecordingPatchApplier {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            fails: AtomicBool::new(false),
            applied: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_updates(&self) {
        self.fails.store(true, Ordering::SeqCst);
    }

    pub fn applied(&self) -> Vec<String> {
        self.applied.lock().clone()
    }
}

#[async_trait]
impl PatchApplier for RecordingPatchApplier {
    async fn apply_update(&self, version: &str, _cancel: &CancellationToken) -> Result<()> {
        self.applied.lock().push(version.to_string());
        self.journal.lock().push(format!("patch {}", version));
        if self.fails.load(Ordering::SeqCst) {
            return Err(KeeperError::update("archive corrupted"));
        }
        Ok(())
    }
}

pub struct RecordingBackupService {
    journal: Journal,
    calls: AtomicUsize,
}

impl RecordingBackupService {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackupService for RecordingBackupService {
    async fn create_backup(&self) -> Result<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.journal.lock().push("backup".to_string());
        Ok(PathBuf::from("backups/backup-test.zip"))
    }
}

pub struct StaticPreflight {
    result: bool,
    calls: AtomicUsize,
}

impl StaticPreflight {
    pub fn new(result: bool) -> Self {
        Self {
            result,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PreflightService for StaticPreflight {
    async fn check_and_cleanup(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result
    }
}

/// Minimal HTTP/1.1 responder on a loopback port.
///
/// Serves each `(path, body)` with 200 and anything else with 404, one
/// request per connection. Returns the base URL, e.g. `http://127.0.0.1:4321`.
pub async fn serve_http(routes: Vec<(&'static str, Vec<u8>)>) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let routes = Arc::new(routes);

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let routes = Arc::clone(&routes);
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }

                let head = String::from_utf8_lossy(&request);
                let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
                let (status, body) = match routes.iter().find(|(route, _)| *route == path) {
                    Some((_, body)) => ("200 OK", body.clone()),
                    None => ("404 Not Found", Vec::new()),
                };

                let header = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    body.len()
                );
                let _ = socket.write_all(header.as_bytes()).await;
                let _ = socket.write_all(&body).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    base
}

/// ZIP archive bytes holding the given `(name, contents)` entries
pub fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, contents) in entries {
        writer
            .start_file(name.to_string(), SimpleFileOptions::default())
            .unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}
