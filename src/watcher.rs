// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Inbox watcher: filesystem events to classification jobs
//!
//! notify delivers events on its own thread; they are forwarded into tokio
//! over an unbounded channel. The [`Dispatcher`] waits for each new file to
//! stop growing, then hands it to the bounded job queue. A path is claimed
//! while it is being stabilized or classified, so repeated events for the
//! same file produce one job.

use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::Result;

/// Inbox changes the pipeline cares about
#[derive(Debug, Clone, PartialEq)]
pub enum InboxEvent {
    /// A file was created or moved into the inbox
    Appeared(PathBuf),
    /// A file was deleted or moved out of the inbox
    Vanished(PathBuf),
    Error(String),
}

/// Non-recursive watcher over the inbox directory
pub struct FileWatcher {
    watcher: RecommendedWatcher,
}

impl FileWatcher {
    pub fn new(event_tx: mpsc::UnboundedSender<InboxEvent>) -> Result<Self> {
        let config = Config::default().with_poll_interval(Duration::from_secs(2));

        let watcher = RecommendedWatcher::new(
            move |result: notify::Result<Event>| match result {
                Ok(event) => {
                    for inbox_event in convert_event(&event) {
                        if event_tx.send(inbox_event).is_err() {
                            // receiver gone, pipeline is shutting down
                            return;
                        }
                    }
                }
                Err(e) => {
                    let _ = event_tx.send(InboxEvent::Error(e.to_string()));
                }
            },
            config,
        )?;

        Ok(Self { watcher })
    }

    /// Start watching a directory, creating it if needed
    pub fn watch(&mut self, path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::create_dir_all(path)?;
            info!("Created watch directory: {:?}", path);
        }

        self.watcher.watch(path, RecursiveMode::NonRecursive)?;
        info!("Watching: {:?}", path);
        Ok(())
    }
}

fn convert_event(event: &Event) -> Vec<InboxEvent> {
    let first = || event.paths.first().cloned();

    match &event.kind {
        EventKind::Create(_) => first().map(InboxEvent::Appeared).into_iter().collect(),
        EventKind::Remove(_) => first().map(InboxEvent::Vanished).into_iter().collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            first().map(InboxEvent::Appeared).into_iter().collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            first().map(InboxEvent::Vanished).into_iter().collect()
        }
        EventKind::Modify(ModifyKind::Name(_)) if event.paths.len() >= 2 => vec![
            InboxEvent::Vanished(event.paths[0].clone()),
            InboxEvent::Appeared(event.paths[1].clone()),
        ],
        _ => Vec::new(),
    }
}

/// Check if a file should be processed
pub fn should_process(path: &Path) -> bool {
    let filename = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return false,
    };

    // Hidden files and office lock files
    if filename.starts_with('.') || filename.starts_with('~') {
        return false;
    }

    let temp_extensions = [".tmp", ".part", ".crdownload", ".partial", ".download"];
    if temp_extensions.iter().any(|ext| filename.ends_with(ext)) {
        return false;
    }

    let skip_names = ["desktop.ini", "thumbs.db", ".ds_store"];
    if skip_names.iter().any(|n| filename.eq_ignore_ascii_case(n)) {
        return false;
    }

    true
}

/// Files already waiting in the inbox, sorted by name
pub fn scan_existing(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && should_process(path))
        .collect();
    files.sort();
    Ok(files)
}

/// Wait until the size is equal on two checks `interval` apart
///
/// Gives up waiting after `max_wait` and proceeds with the current size.
/// Fails if the file disappears.
pub async fn wait_for_stable(path: &Path, interval: Duration, max_wait: Duration) -> std::io::Result<u64> {
    let start = Instant::now();
    let mut last_size = tokio::fs::metadata(path).await?.len();

    loop {
        tokio::time::sleep(interval).await;
        let current_size = tokio::fs::metadata(path).await?.len();

        if current_size == last_size {
            return Ok(current_size);
        }
        if start.elapsed() > max_wait {
            warn!("File stability check timed out for {:?}", path);
            return Ok(current_size);
        }

        debug!("File {:?} still being written, size: {}", path, current_size);
        last_size = current_size;
    }
}

/// The file went away, as opposed to being unreadable
fn is_vanished(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::NotFound
}

/// Paths currently being stabilized or classified
#[derive(Clone, Default)]
pub struct InFlight {
    paths: Arc<Mutex<HashSet<PathBuf>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a path; `None` if someone already holds it
    pub fn try_claim(&self, path: &Path) -> Option<Claim> {
        let mut paths = self.paths.lock().ok()?;
        if paths.insert(path.to_path_buf()) {
            Some(Claim {
                set: self.clone(),
                path: path.to_path_buf(),
            })
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.paths.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Releases the path when dropped
pub struct Claim {
    set: InFlight,
    path: PathBuf,
}

impl Drop for Claim {
    fn drop(&mut self) {
        if let Ok(mut paths) = self.set.paths.lock() {
            paths.remove(&self.path);
        }
    }
}

/// A stable file waiting for a worker
pub struct Job {
    path: PathBuf,
    _claim: Claim,
}

impl Job {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Turns raw appearances into deduplicated, stabilized jobs
#[derive(Clone)]
pub struct Dispatcher {
    inflight: InFlight,
    jobs: mpsc::Sender<Job>,
    debounce: Duration,
    max_wait: Duration,
}

impl Dispatcher {
    pub fn new(jobs: mpsc::Sender<Job>, debounce: Duration) -> Self {
        Self {
            inflight: InFlight::new(),
            jobs,
            debounce,
            max_wait: debounce.saturating_mul(120),
        }
    }

    pub fn inflight(&self) -> &InFlight {
        &self.inflight
    }

    /// Schedule a path; returns false if it was filtered or already in flight
    pub fn offer(&self, path: PathBuf) -> bool {
        if !should_process(&path) {
            debug!("Ignoring {:?}", path);
            return false;
        }

        let claim = match self.inflight.try_claim(&path) {
            Some(claim) => claim,
            None => {
                debug!("Already in flight: {:?}", path);
                return false;
            }
        };

        let jobs = self.jobs.clone();
        let (debounce, max_wait) = (self.debounce, self.max_wait);
        tokio::spawn(async move {
            match wait_for_stable(&path, debounce, max_wait).await {
                Ok(size) => {
                    debug!("Stable at {} bytes: {:?}", size, path);
                    let job = Job { path, _claim: claim };
                    if jobs.send(job).await.is_err() {
                        debug!("Job queue closed");
                    }
                }
                Err(e) if is_vanished(&e) => debug!("File disappeared during stability check: {:?}", path),
                Err(e) => warn!("Skipping unreadable file {:?}: {}", path, e),
            }
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, RemoveKind};
    use tempfile::TempDir;

    fn event(kind: EventKind, paths: Vec<PathBuf>) -> Event {
        Event {
            kind,
            paths,
            attrs: Default::default(),
        }
    }

    #[test]
    fn test_convert_create_and_remove() {
        let p = PathBuf::from("/inbox/a.pdf");
        assert_eq!(
            convert_event(&event(EventKind::Create(CreateKind::File), vec![p.clone()])),
            vec![InboxEvent::Appeared(p.clone())]
        );
        assert_eq!(
            convert_event(&event(EventKind::Remove(RemoveKind::File), vec![p.clone()])),
            vec![InboxEvent::Vanished(p)]
        );
    }

    #[test]
    fn test_convert_rename_both() {
        let from = PathBuf::from("/inbox/a.part");
        let to = PathBuf::from("/inbox/a.pdf");
        let events = convert_event(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            vec![from.clone(), to.clone()],
        ));
        assert_eq!(events, vec![InboxEvent::Vanished(from), InboxEvent::Appeared(to)]);
    }

    #[test]
    fn test_content_modification_ignored() {
        let events = convert_event(&event(
            EventKind::Modify(ModifyKind::Data(notify::event::DataChange::Content)),
            vec![PathBuf::from("/inbox/a.pdf")],
        ));
        assert!(events.is_empty());
    }

    #[test]
    fn test_should_process() {
        assert!(should_process(Path::new("/inbox/rechnung.pdf")));
        assert!(!should_process(Path::new("/inbox/.hidden")));
        assert!(!should_process(Path::new("/inbox/~$brief.docx")));
        assert!(!should_process(Path::new("/inbox/scan.pdf.part")));
        assert!(!should_process(Path::new("/inbox/Thumbs.db")));
    }

    #[test]
    fn test_claim_released_on_drop() {
        let inflight = InFlight::new();
        let path = Path::new("/inbox/a.pdf");
        let claim = inflight.try_claim(path).unwrap();
        assert!(inflight.try_claim(path).is_none());
        drop(claim);
        assert!(inflight.try_claim(path).is_some());
    }

    #[test]
    fn test_scan_existing_filters() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.pdf"), b"x").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"x").unwrap();
        std::fs::write(dir.path().join(".secret"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let files = scan_existing(dir.path()).unwrap();
        assert_eq!(files, vec![dir.path().join("a.txt"), dir.path().join("b.pdf")]);
    }

    #[tokio::test]
    async fn test_vanished_file_is_not_stable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone.pdf");
        assert!(wait_for_stable(&path, Duration::from_millis(5), Duration::from_secs(1))
            .await
            .is_err());
    }

    #[test]
    fn test_only_not_found_counts_as_vanished() {
        assert!(is_vanished(&std::io::Error::from(std::io::ErrorKind::NotFound)));
        assert!(!is_vanished(&std::io::Error::from(std::io::ErrorKind::PermissionDenied)));
    }

    fn append(path: &Path, bytes: &[u8]) {
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new().append(true).open(path).unwrap();
        file.write_all(bytes).unwrap();
    }

    #[tokio::test]
    async fn test_growing_file_waits_for_last_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scan.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();

        let writer_path = path.clone();
        let writer = tokio::spawn(async move {
            for _ in 0..20 {
                tokio::time::sleep(Duration::from_millis(10)).await;
                append(&writer_path, &[b'x'; 16]);
            }
        });

        let size = wait_for_stable(&path, Duration::from_millis(150), Duration::from_secs(10))
            .await
            .unwrap();
        assert!(writer.is_finished());
        writer.await.unwrap();
        assert_eq!(size, 8 + 20 * 16);
        assert_eq!(size, std::fs::metadata(&path).unwrap().len());
    }

    #[tokio::test]
    async fn test_endless_writer_gives_up_after_max_wait() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stream.bin");
        std::fs::write(&path, b"").unwrap();

        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let writer = {
            let (path, stop) = (path.clone(), Arc::clone(&stop));
            tokio::spawn(async move {
                while !stop.load(std::sync::atomic::Ordering::Relaxed) {
                    append(&path, b"x");
                    tokio::time::sleep(Duration::from_millis(2)).await;
                }
            })
        };

        let start = Instant::now();
        let size = wait_for_stable(&path, Duration::from_millis(20), Duration::from_millis(100))
            .await
            .unwrap();
        let waited = start.elapsed();
        stop.store(true, std::sync::atomic::Ordering::Relaxed);
        writer.await.unwrap();

        assert!(waited >= Duration::from_millis(100));
        assert!(waited < Duration::from_secs(5));
        assert!(size > 0);
    }

    #[tokio::test]
    async fn test_rapid_duplicate_offers_dispatch_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scan.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let dispatcher = Dispatcher::new(tx, Duration::from_millis(20));

        assert!(dispatcher.offer(path.clone()));
        assert!(!dispatcher.offer(path.clone()));

        let job = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.path(), path.as_path());

        // still claimed while the job is alive
        assert!(!dispatcher.offer(path.clone()));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());

        drop(job);
        assert!(dispatcher.inflight().is_empty());
    }
}
