use crate::error::{RemapError, Result};
use md5::{Digest, Md5};
use std::fs;
use std::path::{Path, PathBuf};

/// Source of uploaded file contents, looked up by storage key.
pub trait FileStore {
    fn read(&self, key: &str) -> Result<Vec<u8>>;
}

/// Storage key of a file page: its name without the namespace prefix,
/// spaces stored as underscores.
pub fn storage_key(name: &str) -> String {
    name.trim().replace(' ', "_")
}

/// `a/ab/Name.png`, where `ab` are the leading hex digits of md5(key).
pub fn hashed_path(key: &str) -> PathBuf {
    let hash = format!("{:x}", Md5::digest(key.as_bytes()));
    PathBuf::from(&hash[..1]).join(&hash[..2]).join(key)
}

/// MediaWiki's hashed upload directory layout.
#[derive(Debug, Clone)]
pub struct HashedDirStore {
    root: PathBuf,
}

impl HashedDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(hashed_path(key))
    }
}

impl FileStore for HashedDirStore {
    fn read(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key);
        fs::read(&path).map_err(|source| RemapError::BinaryAsset {
            file: path.display().to_string(),
            source,
        })
    }
}
