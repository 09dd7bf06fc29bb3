//! Completion logging and tracing setup
//!
//! Finished episodes are handed to a [`CompletionSink`]. [`JsonLogWriter`]
//! is the production sink: records go over a channel to a background thread
//! that buffers them and periodically appends them to a JSON array on disk,
//! so the environment loop never waits on file I/O.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{RecvTimeoutError, Sender};
use tracing_subscriber::EnvFilter;

use crate::env::{episode::CompletionRecord, types::Frame};

/// Install a formatted tracing subscriber
///
/// The filter comes from `RUST_LOG` when set, otherwise from
/// `default_directive` (e.g. `"info"` or `"stopfinder_rl=debug"`). Calling it
/// twice is harmless; the second call is ignored.
pub fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Receiver of completed-episode records
pub trait CompletionSink: Send + Sync {
    /// Accept one record; must not block on I/O
    fn submit(&self, record: CompletionRecord);

    /// Accept the frame that earned the episode's best reward
    fn submit_best_frame(&self, _record: &CompletionRecord, _frame: &Frame) {}
}

/// Sink that drops every record
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl CompletionSink for NullSink {
    fn submit(&self, _record: CompletionRecord) {}
}

/// Sink that keeps records in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<CompletionRecord>>,
    best_frames: Mutex<Vec<(String, Frame)>>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the records received so far
    pub fn records(&self) -> Vec<CompletionRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Best frames received so far, keyed by place name
    pub fn best_frames(&self) -> Vec<(String, Frame)> {
        self.best_frames.lock().map(|f| f.clone()).unwrap_or_default()
    }

    /// Number of records received so far
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Whether nothing was received yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CompletionSink for MemorySink {
    fn submit(&self, record: CompletionRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }

    fn submit_best_frame(&self, record: &CompletionRecord, frame: &Frame) {
        if let Ok(mut frames) = self.best_frames.lock() {
            frames.push((record.place_name.clone(), frame.clone()));
        }
    }
}

enum LogMessage {
    Record(Box<CompletionRecord>),
    Image { path: PathBuf, image: Vec<u8> },
    Shutdown,
}

/// Background JSON log writer
///
/// Records are flushed when `flush_every` of them are buffered, when
/// `flush_interval` passes without a flush, and on shutdown. Each flush
/// reads the existing array, appends the buffered records and rewrites the
/// file; an unreadable file is replaced by a fresh array.
///
/// With an evidence directory set, the best frame of each episode is
/// written there as `<place name>.bin`.
pub struct JsonLogWriter {
    path: PathBuf,
    evidence_dir: Option<PathBuf>,
    sender: Option<Sender<LogMessage>>,
    handle: Option<JoinHandle<()>>,
}

impl JsonLogWriter {
    /// Default number of buffered records that triggers a flush
    pub const DEFAULT_FLUSH_EVERY: usize = 5;

    /// Default time between periodic flushes
    pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(100);

    /// Start a writer with the default flush policy
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_flush(
            path,
            Self::DEFAULT_FLUSH_EVERY,
            Self::DEFAULT_FLUSH_INTERVAL,
        )
    }

    /// Start a writer with an explicit flush policy
    pub fn with_flush<P: AsRef<Path>>(
        path: P,
        flush_every: usize,
        flush_interval: Duration,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating log directory {}", parent.display()))?;
        }

        let (sender, receiver) = crossbeam_channel::unbounded();
        let thread_path = path.clone();
        let flush_every = flush_every.max(1);

        let handle = thread::Builder::new()
            .name("completion-log".to_string())
            .spawn(move || {
                let mut buffer = Vec::new();
                loop {
                    match receiver.recv_timeout(flush_interval) {
                        Ok(LogMessage::Record(record)) => {
                            buffer.push(*record);
                            if buffer.len() >= flush_every {
                                flush_records(&thread_path, &mut buffer);
                            }
                        }
                        Ok(LogMessage::Image { path, image }) => {
                            if let Err(e) = fs::write(&path, image) {
                                tracing::warn!(
                                    "Failed to write best frame {}: {}",
                                    path.display(),
                                    e
                                );
                            }
                        }
                        Err(RecvTimeoutError::Timeout) => flush_records(&thread_path, &mut buffer),
                        Ok(LogMessage::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                            flush_records(&thread_path, &mut buffer);
                            break;
                        }
                    }
                }
            })
            .context("spawning completion log thread")?;

        Ok(Self {
            path,
            evidence_dir: None,
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    /// Also save each episode's best frame under `dir`
    pub fn with_evidence_dir<P: AsRef<Path>>(mut self, dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating evidence directory {}", dir.display()))?;
        self.evidence_dir = Some(dir);
        Ok(self)
    }

    /// Directory best frames are saved to, if any
    pub fn evidence_dir(&self) -> Option<&Path> {
        self.evidence_dir.as_deref()
    }

    fn send(&self, message: LogMessage) -> bool {
        self.sender.as_ref().map_or(false, |s| s.send(message).is_ok())
    }

    /// File the log is written to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush what is buffered and stop the background thread
    pub fn shutdown(mut self) -> Result<()> {
        self.close()
    }

    fn close(&mut self) -> Result<()> {
        if let Some(sender) = self.sender.take() {
            // A closed channel means the thread already exited
            let _ = sender.send(LogMessage::Shutdown);
        }
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| anyhow!("completion log thread panicked")),
            None => Ok(()),
        }
    }
}

impl CompletionSink for JsonLogWriter {
    fn submit(&self, record: CompletionRecord) {
        if !self.send(LogMessage::Record(Box::new(record))) {
            tracing::warn!(
                "Completion log {} is closed; record dropped",
                self.path.display()
            );
        }
    }

    fn submit_best_frame(&self, record: &CompletionRecord, frame: &Frame) {
        let Some(dir) = &self.evidence_dir else {
            return;
        };
        let path = dir.join(format!("{}.bin", evidence_file_stem(&record.place_name)));
        let message = LogMessage::Image {
            path,
            image: frame.image.clone(),
        };
        if !self.send(message) {
            tracing::warn!(
                "Completion log {} is closed; best frame dropped",
                self.path.display()
            );
        }
    }
}

impl Drop for JsonLogWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Failed to close completion log: {}", e);
        }
    }
}

/// Read every record from a completion log file
pub fn read_log<P: AsRef<Path>>(path: P) -> Result<Vec<CompletionRecord>> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading completion log {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("parsing completion log {}", path.display()))
}

// Place names carry spaces, '&' and '/'
fn evidence_file_stem(place_name: &str) -> String {
    place_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn flush_records(path: &Path, buffer: &mut Vec<CompletionRecord>) {
    if buffer.is_empty() {
        return;
    }
    if let Err(e) = append_records(path, buffer) {
        tracing::warn!("Failed to write completion log {}: {:#}", path.display(), e);
        return;
    }
    tracing::debug!("Flushed {} records to {}", buffer.len(), path.display());
    buffer.clear();
}

fn append_records(path: &Path, records: &[CompletionRecord]) -> Result<()> {
    let mut all: Vec<serde_json::Value> = match fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
            tracing::warn!(
                "Completion log {} is not a JSON array ({}); starting over",
                path.display(),
                e
            );
            Vec::new()
        }),
        Err(_) => Vec::new(),
    };
    for record in records {
        all.push(serde_json::to_value(record)?);
    }
    fs::write(path, serde_json::to_string_pretty(&all)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn record(name: &str, reward: f64) -> CompletionRecord {
        CompletionRecord {
            place_name: name.to_string(),
            latitude: 33.7,
            longitude: -84.4,
            is_known_positive: false,
            amenity_scores: BTreeMap::from([("sign".to_string(), 0.8)]),
            total_reward: reward,
            steps_taken: 12,
            viewpoints: 2,
            best_reward: Some(0.74),
        }
    }

    #[test]
    fn test_memory_sink() {
        let sink = MemorySink::new();
        assert!(sink.is_empty());
        sink.submit(record("A", 0.5));
        sink.submit(record("B", -0.2));
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.records()[1].place_name, "B");
    }

    #[test]
    fn test_writer_flushes_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs").join("log.json");

        let writer = JsonLogWriter::with_flush(&path, 100, Duration::from_secs(3600)).unwrap();
        writer.submit(record("A", 0.5));
        writer.submit(record("B", 1.25));
        writer.shutdown().unwrap();

        let records = read_log(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], record("A", 0.5));
        assert_eq!(records[1].total_reward, 1.25);
    }

    #[test]
    fn test_writer_flushes_every_n() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");

        let writer = JsonLogWriter::with_flush(&path, 2, Duration::from_secs(3600)).unwrap();
        writer.submit(record("A", 0.1));
        writer.submit(record("B", 0.2));

        // The flush happens on the background thread
        let mut flushed = Vec::new();
        for _ in 0..200 {
            if let Ok(records) = read_log(&path) {
                flushed = records;
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(flushed.len(), 2);
        drop(writer);
    }

    #[test]
    fn test_writer_appends_to_existing_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");

        let first = JsonLogWriter::new(&path).unwrap();
        first.submit(record("A", 0.1));
        first.shutdown().unwrap();

        let second = JsonLogWriter::new(&path).unwrap();
        second.submit(record("B", 0.2));
        drop(second);

        let names: Vec<_> = read_log(&path).unwrap().into_iter().map(|r| r.place_name).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_writer_replaces_corrupt_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        fs::write(&path, "not json").unwrap();

        let writer = JsonLogWriter::new(&path).unwrap();
        writer.submit(record("A", 0.1));
        writer.shutdown().unwrap();

        assert_eq!(read_log(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_evidence_file_stem() {
        assert_eq!(
            evidence_file_stem("Peachtree St & 10th/NE"),
            "Peachtree_St___10th_NE"
        );
        assert_eq!(evidence_file_stem("Stop-12"), "Stop-12");
    }

    #[test]
    fn test_writer_saves_best_frame() {
        use crate::env::types::Pose;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        let evidence = dir.path().join("best");

        let writer = JsonLogWriter::new(&path).unwrap().with_evidence_dir(&evidence).unwrap();
        assert_eq!(writer.evidence_dir(), Some(evidence.as_path()));

        let frame = Frame::new(Pose::new(33.7, -84.4, 90.0), vec![1, 2, 3]);
        writer.submit(record("Elm St & 3rd", 0.5));
        writer.submit_best_frame(&record("Elm St & 3rd", 0.5), &frame);
        writer.shutdown().unwrap();

        assert_eq!(
            fs::read(evidence.join("Elm_St___3rd.bin")).unwrap(),
            vec![1, 2, 3]
        );
        assert_eq!(read_log(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_writer_without_evidence_dir_skips_frames() {
        use crate::env::types::Pose;

        let dir = tempfile::tempdir().unwrap();
        let writer = JsonLogWriter::new(dir.path().join("log.json")).unwrap();
        let frame = Frame::new(Pose::new(0.0, 0.0, 0.0), vec![9]);
        writer.submit_best_frame(&record("A", 0.1), &frame);
        writer.shutdown().unwrap();

        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
