//! Inbound directory watching.
//!
//! ```text
//! notify event thread                      worker thread
//! ───────────────────                      ─────────────
//! Create(file.xlsx) ─► wait_until_stable ─► QueueSender ══► QueueReceiver ─► handler
//! ```
//!
//! The event thread only stabilizes and enqueues; the worker is the only
//! place the (slow) pipeline runs. The queue is unbounded and FIFO, with no
//! deduplication of repeated file names.

use std::fs;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use notify::event::CreateKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::config::WatchSettings;
use crate::error::SourcingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilizePolicy {
    pub interval: Duration,
    pub attempts: u32,
}

impl From<&WatchSettings> for StabilizePolicy {
    fn from(settings: &WatchSettings) -> Self {
        Self {
            interval: settings.interval,
            attempts: settings.attempts,
        }
    }
}

pub trait SizeProbe: Send + Sync {
    /// Current size in bytes, `None` when the file cannot be stat'ed.
    fn size(&self, path: &Utf8Path) -> Option<u64>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FsSizeProbe;

impl SizeProbe for FsSizeProbe {
    fn size(&self, path: &Utf8Path) -> Option<u64> {
        fs::metadata(path.as_std_path()).ok().map(|meta| meta.len())
    }
}

pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Polls the size of `path` until two consecutive polls agree, giving up
/// after `policy.attempts` polls. A poll that cannot read the size neither
/// matches nor resets the previous reading.
pub fn wait_until_stable(
    path: &Utf8Path,
    policy: StabilizePolicy,
    probe: &dyn SizeProbe,
    sleeper: &dyn Sleeper,
) -> bool {
    let mut last_size: Option<u64> = None;
    for _ in 0..policy.attempts {
        if let Some(size) = probe.size(path) {
            if last_size == Some(size) {
                return true;
            }
            last_size = Some(size);
        }
        sleeper.sleep(policy.interval);
    }
    false
}

pub fn is_recognized(path: &Utf8Path, extensions: &[String]) -> bool {
    path.extension()
        .map(|ext| extensions.iter().any(|known| known.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

#[derive(Debug, Clone)]
pub struct QueueSender {
    tx: Sender<Utf8PathBuf>,
}

impl QueueSender {
    /// Never blocks.
    pub fn push(&self, path: Utf8PathBuf) -> Result<(), SourcingError> {
        self.tx
            .send(path)
            .map_err(|err| SourcingError::Watch(format!("queue closed, dropped {}", err.0)))
    }
}

#[derive(Debug)]
pub struct QueueReceiver {
    rx: Receiver<Utf8PathBuf>,
}

impl QueueReceiver {
    /// Blocks until a path is available; `None` once every sender is gone.
    pub fn pop(&self) -> Option<Utf8PathBuf> {
        self.rx.recv().ok()
    }

    /// Like [`pop`](Self::pop), but gives up after `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Utf8PathBuf> {
        self.rx.recv_timeout(timeout).ok()
    }
}

pub fn watch_queue() -> (QueueSender, QueueReceiver) {
    let (tx, rx) = mpsc::channel();
    (QueueSender { tx }, QueueReceiver { rx })
}

/// Starts the single background worker. It handles one path at a time and
/// returns how many it handled once the queue is closed.
pub fn spawn_worker<F>(queue: QueueReceiver, mut handler: F) -> JoinHandle<usize>
where
    F: FnMut(&Utf8Path) -> Result<(), SourcingError> + Send + 'static,
{
    thread::spawn(move || {
        let mut handled = 0usize;
        while let Some(path) = queue.pop() {
            tracing::info!(file = %path, "processing queued file");
            if let Err(err) = handler(&path) {
                tracing::error!(file = %path, error = %err, "processing failed");
            }
            handled += 1;
        }
        handled
    })
}

/// Filters, stabilizes and enqueues one created path. Returns whether it was
/// enqueued.
pub fn handle_created(
    path: &Utf8Path,
    settings: &WatchSettings,
    probe: &dyn SizeProbe,
    sleeper: &dyn Sleeper,
    queue: &QueueSender,
) -> bool {
    if !is_recognized(path, &settings.extensions) {
        return false;
    }
    let name = path.file_name().unwrap_or(path.as_str());
    tracing::info!(file = name, "new file, waiting for it to settle");

    if !wait_until_stable(path, StabilizePolicy::from(settings), probe, sleeper) {
        tracing::error!(file = name, "file did not stabilize in time, dropped");
        return false;
    }
    match queue.push(path.to_path_buf()) {
        Ok(()) => {
            tracing::info!(file = name, "file ready, queued");
            true
        }
        Err(err) => {
            tracing::error!(file = name, error = %err, "could not queue file");
            false
        }
    }
}

/// Keeps the underlying `notify` watcher alive; dropping it stops watching.
pub struct DirectoryWatcher {
    _watcher: RecommendedWatcher,
    dir: Utf8PathBuf,
}

impl DirectoryWatcher {
    pub fn start(
        dir: &Utf8Path,
        settings: WatchSettings,
        queue: QueueSender,
    ) -> Result<Self, SourcingError> {
        if !dir.as_std_path().is_dir() {
            return Err(SourcingError::Watch(format!("{dir} is not a directory")));
        }
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(err) => {
                    tracing::warn!(error = %err, "watch error");
                    return;
                }
            };
            if !is_file_creation(&event.kind) {
                return;
            }
            for path in event.paths {
                if path.is_dir() {
                    continue;
                }
                match Utf8PathBuf::from_path_buf(path) {
                    Ok(path) => {
                        handle_created(&path, &settings, &FsSizeProbe, &ThreadSleeper, &queue);
                    }
                    Err(path) => {
                        tracing::warn!(path = %path.display(), "skipping non UTF-8 path");
                    }
                }
            }
        })
        .map_err(|err| SourcingError::Watch(err.to_string()))?;
        watcher
            .watch(dir.as_std_path(), RecursiveMode::NonRecursive)
            .map_err(|err| SourcingError::Watch(err.to_string()))?;
        tracing::info!(dir = %dir, "watching for new files");
        Ok(Self {
            _watcher: watcher,
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }
}

fn is_file_creation(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(create) if *create != CreateKind::Folder)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn folder_creation_is_ignored() {
        assert!(is_file_creation(&EventKind::Create(CreateKind::File)));
        assert!(is_file_creation(&EventKind::Create(CreateKind::Any)));
        assert!(!is_file_creation(&EventKind::Create(CreateKind::Folder)));
        assert!(!is_file_creation(&EventKind::Any));
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        let exts = vec!["xlsx".to_string()];
        assert!(is_recognized(Utf8Path::new("in/BOM.XLSX"), &exts));
        assert!(!is_recognized(Utf8Path::new("in/bom.xlsx.part"), &exts));
        assert!(!is_recognized(Utf8Path::new("in/README"), &exts));
    }

    struct Sequence(Mutex<Vec<Option<u64>>>);

    impl SizeProbe for Sequence {
        fn size(&self, _path: &Utf8Path) -> Option<u64> {
            let mut sizes = self.0.lock().unwrap();
            if sizes.is_empty() { None } else { sizes.remove(0) }
        }
    }

    struct NoSleep;

    impl Sleeper for NoSleep {
        fn sleep(&self, _duration: Duration) {}
    }

    #[test]
    fn missing_file_does_not_reset_reading() {
        let probe = Sequence(Mutex::new(vec![Some(10), None, Some(10)]));
        let policy = StabilizePolicy {
            interval: Duration::from_secs(1),
            attempts: 10,
        };
        assert!(wait_until_stable(Utf8Path::new("a.xlsx"), policy, &probe, &NoSleep));
    }
}
