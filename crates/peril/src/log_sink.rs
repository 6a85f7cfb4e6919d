//! Archival of game logs received by the server.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use peril_protocol::GameLog;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Somewhere to append game logs.
///
/// The same log may arrive more than once (at-least-once delivery); sinks
/// simply append it again.
pub trait LogSink: Send + Sync + 'static {
    fn write(&self, log: &GameLog) -> impl Future<Output = io::Result<()>> + Send;
}

/// Appends one line per log to a file: `<rfc3339 time> <username>: <message>`.
#[derive(Debug)]
pub struct FileLogSink {
    path: PathBuf,
    // Serializes appends so lines never interleave.
    lock: Mutex<()>,
}

impl FileLogSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileLogSink {
    async fn write(&self, log: &GameLog) -> io::Result<()> {
        let _guard = self.lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(format!("{log}\n").as_bytes()).await?;
        file.flush().await?;
        tracing::debug!(path = %self.path.display(), username = %log.username, "game log archived");
        Ok(())
    }
}
