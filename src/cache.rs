//! Title index cache.
//!
//! Every input export gets its own entry under the cache directory, named
//! after the md5 of its canonical path. An entry is only trusted while the
//! export's size and modification time match the ones it was built from.

use crate::config::CACHE_VERSION;
use crate::index::TitleIndex;
use anyhow::{Context, Result};
use bincode::Options;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Identifies the exact export a title set was scanned from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Fingerprint {
    version: u32,
    path: String,
    modified: u64,
    len: u64,
}

impl Fingerprint {
    fn of(input: &Path) -> Result<Self> {
        let path = fs::canonicalize(input)
            .with_context(|| format!("Failed to resolve input: {}", input.display()))?;
        let metadata = fs::metadata(&path)
            .with_context(|| format!("Failed to get metadata for: {}", path.display()))?;
        let modified = metadata
            .modified()
            .context("Failed to get modification time")?
            .duration_since(SystemTime::UNIX_EPOCH)
            .context("Invalid modification time")?
            .as_secs();
        Ok(Self {
            version: CACHE_VERSION,
            path: path.to_string_lossy().into_owned(),
            modified,
            len: metadata.len(),
        })
    }

    fn file_name(&self) -> String {
        let hash = format!("{:x}", Md5::digest(self.path.as_bytes()));
        format!("titles-{}.bin", &hash[..16])
    }
}

#[derive(Deserialize)]
struct Entry {
    fingerprint: Fingerprint,
    titles: Vec<String>,
}

/// Borrows the titles so large indexes are not cloned on save.
#[derive(Serialize)]
struct EntryRef<'a> {
    fingerprint: &'a Fingerprint,
    titles: Vec<&'a str>,
}

/// Directory of title index entries, one per input export.
#[derive(Debug, Clone)]
pub struct TitleCache {
    dir: PathBuf,
}

impl TitleCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the entry for `input` lives. Fails when the input is missing.
    pub fn entry_path(&self, input: &Path) -> Result<PathBuf> {
        Ok(self.dir.join(Fingerprint::of(input)?.file_name()))
    }

    /// The cached titles for `input`, or `None` when there is no entry or it
    /// no longer describes the input. Never fails: a bad entry means a rescan.
    pub fn load(&self, input: &Path) -> Option<TitleIndex> {
        let current = match Fingerprint::of(input) {
            Ok(f) => f,
            Err(e) => {
                debug!(error = %e, "No fingerprint for input, skipping title cache");
                return None;
            }
        };
        let path = self.dir.join(current.file_name());

        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) => {
                debug!(error = %e, path = ?path, "No title cache entry");
                return None;
            }
        };
        let options = bincode::options().with_limit(bytes.len() as u64 + 1024);
        let entry: Entry = match options.deserialize(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, path = ?path, "Title cache entry is corrupt");
                return None;
            }
        };

        if entry.fingerprint != current {
            info!(
                cached_version = entry.fingerprint.version,
                cached_len = entry.fingerprint.len,
                current_len = current.len,
                cached_modified = entry.fingerprint.modified,
                current_modified = current.modified,
                "Title cache entry is stale"
            );
            return None;
        }

        info!(titles = entry.titles.len(), "Title index loaded from cache");
        Some(TitleIndex::from_lowercased(entry.titles))
    }

    /// Writes the entry for `input` through a temporary file renamed into place.
    pub fn store(&self, input: &Path, index: &TitleIndex) -> Result<PathBuf> {
        let fingerprint = Fingerprint::of(input)?;
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create directory: {}", self.dir.display()))?;

        let mut titles: Vec<&str> = index.titles().collect();
        titles.sort_unstable();
        let entry = EntryRef {
            fingerprint: &fingerprint,
            titles,
        };

        let path = self.dir.join(fingerprint.file_name());
        let tmp_path = path.with_extension("bin.tmp");
        let file = File::create(&tmp_path)
            .with_context(|| format!("Failed to create temp cache file: {}", tmp_path.display()))?;
        let mut writer = BufWriter::new(file);
        bincode::options()
            .serialize_into(&mut writer, &entry)
            .context("Failed to serialize title cache")?;
        writer.flush().context("Failed to flush title cache")?;

        fs::rename(&tmp_path, &path)
            .with_context(|| format!("Failed to move title cache into place: {}", path.display()))?;

        info!(titles = index.len(), path = ?path, "Title cache saved");
        Ok(path)
    }
}
