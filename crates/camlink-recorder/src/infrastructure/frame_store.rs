//! Writes received frames to disk, one folder per recording.
//!
//! Layout:
//!
//! ```text
//! <root>/session_<uuid>/img_<unix_millis>_<index:06>.jpg
//! ```
//!
//! `index` counts frames across the whole recording, so files sort in arrival
//! order even when a reconnect restarts the per-connection frame counter.
//!
//! # Blocking writes (for beginners)
//!
//! [`FrameSink::on_frame`] is called on the receive-pump task, and
//! `std::fs::write` blocks the thread it runs on.  Inside a tokio runtime the
//! store therefore hands each write to [`tokio::task::spawn_blocking`] and
//! returns at once, so a slow disk never delays the next read.  Outside a
//! runtime (plain unit tests, offline tools) the write happens inline.
//! Because writes finish asynchronously, the counters can trail the frames
//! handed in by the number of writes still in flight.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use camlink_core::Frame;
use tokio::runtime::Handle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::FrameSink;

#[derive(Default)]
struct WriteCounters {
    written: AtomicU64,
    failed: AtomicU64,
}

pub struct DirectoryFrameStore {
    dir: PathBuf,
    next_index: AtomicU64,
    counters: Arc<WriteCounters>,
}

impl DirectoryFrameStore {
    /// Creates `root/session_<uuid>`.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the directory cannot be created.
    pub fn create(root: &Path) -> std::io::Result<Self> {
        let dir = root.join(format!("session_{}", Uuid::new_v4().simple()));
        std::fs::create_dir_all(&dir)?;
        info!(dir = %dir.display(), "writing frames");
        Ok(Self {
            dir,
            next_index: AtomicU64::new(0),
            counters: Arc::default(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Frames whose write has completed successfully.
    pub fn frames_written(&self) -> u64 {
        self.counters.written.load(Ordering::Relaxed)
    }

    pub fn write_failures(&self) -> u64 {
        self.counters.failed.load(Ordering::Relaxed)
    }

    fn file_name(index: u64, frame: &Frame) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        format!("img_{millis}_{index:06}.{}", frame.format.extension())
    }
}

fn write_frame(path: &Path, payload: &[u8], counters: &WriteCounters) {
    match std::fs::write(path, payload) {
        Ok(()) => {
            counters.written.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            warn!(path = %path.display(), error = %e, "failed to write frame");
        }
    }
}

impl FrameSink for DirectoryFrameStore {
    fn on_frame(&self, frame: &Frame) {
        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        let path = self.dir.join(Self::file_name(index, frame));
        match Handle::try_current() {
            Ok(runtime) => {
                let payload = frame.payload.clone();
                let counters = Arc::clone(&self.counters);
                runtime.spawn_blocking(move || write_frame(&path, &payload, &counters));
            }
            Err(_) => write_frame(&path, &frame.payload, &self.counters),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camlink_core::FrameFormat;

    fn frame(format: FrameFormat) -> Frame {
        Frame {
            epoch: 1,
            index: 0,
            format,
            payload: vec![0xFF, 0xD8, 0xAA],
        }
    }

    #[test]
    fn test_frames_are_written_with_sequential_names() {
        // Arrange
        let root = std::env::temp_dir().join(format!("camlink-store-{}", Uuid::new_v4()));
        let store = DirectoryFrameStore::create(&root).unwrap();

        // Act
        store.on_frame(&frame(FrameFormat::Jpeg));
        store.on_frame(&frame(FrameFormat::Unknown));

        // Assert
        let mut names: Vec<String> = std::fs::read_dir(store.dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort_by_key(|n| n.rsplit('_').next().map(str::to_string));
        assert_eq!(names.len(), 2);
        assert!(names[0].starts_with("img_") && names[0].ends_with("_000000.jpg"));
        assert!(names[1].ends_with("_000001.bin"));
        assert_eq!(store.frames_written(), 2);

        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn test_write_failure_is_counted_not_propagated() {
        let root = std::env::temp_dir().join(format!("camlink-store-{}", Uuid::new_v4()));
        let store = DirectoryFrameStore::create(&root).unwrap();
        std::fs::remove_dir_all(store.dir()).unwrap();

        store.on_frame(&frame(FrameFormat::Jpeg));

        assert_eq!(store.write_failures(), 1);
        assert_eq!(store.frames_written(), 0);
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn test_writes_inside_runtime_finish_off_the_calling_task() {
        // Arrange
        let root = std::env::temp_dir().join(format!("camlink-store-{}", Uuid::new_v4()));
        let store = DirectoryFrameStore::create(&root).unwrap();

        // Act
        store.on_frame(&frame(FrameFormat::Jpeg));
        let mut waited = 0;
        while store.frames_written() == 0 && waited < 500 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            waited += 1;
        }

        // Assert
        assert_eq!(store.frames_written(), 1);
        assert_eq!(store.write_failures(), 0);
        let files = std::fs::read_dir(store.dir()).unwrap().count();
        assert_eq!(files, 1);
        let _ = std::fs::remove_dir_all(root);
    }
}
