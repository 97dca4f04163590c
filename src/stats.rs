use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::warn;

/// A recoverable problem with one page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Issue {
    pub page: String,
    pub message: String,
}

/// Counters and non-fatal problems collected during a transform pass
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct TransformStats {
    pub pages_seen: u64,
    pub pages_moved: u64,
    pub talk_pages_moved: u64,
    pub pages_retained: u64,
    pub pages_dropped: u64,
    pub links_rewritten: u64,
    pub checksums_removed: u64,
    pub files_embedded: u64,
    pub issues: Vec<Issue>,
}

impl TransformStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_seen(&mut self) {
        self.pages_seen += 1;
    }

    pub fn inc_moved(&mut self) {
        self.pages_moved += 1;
    }

    pub fn inc_talk_moved(&mut self) {
        self.talk_pages_moved += 1;
    }

    pub fn inc_retained(&mut self) {
        self.pages_retained += 1;
    }

    pub fn inc_dropped(&mut self) {
        self.pages_dropped += 1;
    }

    pub fn add_links(&mut self, count: u64) {
        self.links_rewritten += count;
    }

    pub fn add_checksums(&mut self, count: u64) {
        self.checksums_removed += count;
    }

    pub fn inc_files(&mut self) {
        self.files_embedded += 1;
    }

    /// Logs and keeps a non-fatal problem for the final report.
    pub fn record_issue(&mut self, page: &str, message: impl Into<String>) {
        let message = message.into();
        warn!(page, "{}", message);
        self.issues.push(Issue {
            page: page.to_string(),
            message,
        });
    }

    pub fn pages_emitted(&self) -> u64 {
        self.pages_moved + self.talk_pages_moved + self.pages_retained
    }

    pub fn write_report(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create report: {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).context("Failed to serialize report")?;
        writer.flush().context("Failed to write report")?;
        Ok(())
    }
}
