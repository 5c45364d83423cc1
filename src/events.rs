//! Job event journal
//!
//! `events.log` in the state directory gets one JSON object per finished index
//! preparation or search, stamped by the job's clock:
//!
//! ```text
//! {"at":"2026-03-01T14:05:09Z","event":"index.ready","reference":"/data/ID_000042_FEED.fasta","mode":"ForwardReverse","source":"fetched","owner":"node7"}
//! {"at":"2026-03-01T15:40:12Z","event":"search.verdict","spectra":"/data/run1.mzML","reference":"/data/ID_000042_FEED.fasta","verdict":"failure","reason":"..."}
//! ```

use crate::clock::Clock;
use crate::config::{schema::Config, ConfigManager};
use crate::index::IndexSource;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Something worth keeping in the journal
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum JobEvent {
    #[serde(rename = "index.ready")]
    IndexReady {
        reference: PathBuf,
        mode: &'static str,
        source: IndexSource,
        owner: String,
    },
    #[serde(rename = "search.verdict")]
    SearchVerdict {
        spectra: PathBuf,
        reference: PathBuf,
        verdict: &'static str,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        warnings: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

#[derive(Serialize)]
struct JournalLine<'a> {
    at: DateTime<Utc>,
    #[serde(flatten)]
    event: &'a JobEvent,
}

#[derive(Clone)]
struct Sink {
    path: PathBuf,
    clock: Arc<dyn Clock>,
}

/// Append-only journal of [`JobEvent`]s
#[derive(Clone, Default)]
pub struct EventLog {
    sink: Option<Sink>,
}

impl EventLog {
    /// Journal in the state directory when `general.event_log` is on
    pub fn new(config: &Config, clock: Arc<dyn Clock>) -> Self {
        if !config.general.event_log {
            return Self::disabled();
        }
        Self::at(ConfigManager::event_log_path(), clock)
    }

    pub fn at(path: PathBuf, clock: Arc<dyn Clock>) -> Self {
        Self {
            sink: Some(Sink { path, clock }),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    /// Journal file, if journaling is on
    pub fn path(&self) -> Option<&Path> {
        self.sink.as_ref().map(|sink| sink.path.as_path())
    }

    /// Append `event`; a journal that can't be written only costs a warning
    pub async fn record(&self, event: &JobEvent) {
        let Some(sink) = &self.sink else {
            return;
        };

        let line = JournalLine {
            at: sink.clock.now(),
            event,
        };
        let mut text = match serde_json::to_string(&line) {
            Ok(text) => text,
            Err(e) => {
                warn!("Event not journaled: {}", e);
                return;
            }
        };
        text.push('\n');

        match append_line(&sink.path, &text).await {
            Ok(()) => debug!(path = %sink.path.display(), "Journaled event"),
            Err(e) => warn!(path = %sink.path.display(), "Event not journaled: {}", e),
        }
    }
}

async fn append_line(path: &Path, text: &str) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(text.as_bytes()).await?;
    file.flush().await
}
