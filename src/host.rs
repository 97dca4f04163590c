//! The host wiki the export is being imported into.
//!
//! Namespace ids and interwiki prefixes belong to the host's configuration,
//! not to the export. The engine only sees them through the traits below;
//! [`HostConfig`] is a TOML-backed stand-in for a live wiki.

use crate::error::RemapError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub trait NamespaceResolver {
    fn namespace_id(&self, name: &str) -> Option<i32>;
}

pub trait InterwikiLookup {
    fn is_interwiki(&self, prefix: &str) -> bool;
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct HostConfig {
    /// Namespace name to numeric id
    #[serde(default)]
    pub namespaces: BTreeMap<String, i32>,
    #[serde(default)]
    pub interwiki: InterwikiSection,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct InterwikiSection {
    #[serde(default)]
    pub prefixes: Vec<String>,
}

impl NamespaceResolver for HostConfig {
    fn namespace_id(&self, name: &str) -> Option<i32> {
        let wanted = crate::namespaces::normalize(name);
        self.namespaces
            .iter()
            .find(|(k, _)| crate::namespaces::normalize(k) == wanted)
            .map(|(_, id)| *id)
    }
}

impl InterwikiLookup for HostConfig {
    fn is_interwiki(&self, prefix: &str) -> bool {
        let wanted = prefix.trim().to_lowercase();
        self.interwiki
            .prefixes
            .iter()
            .any(|p| p.trim().to_lowercase() == wanted)
    }
}

/// Load a host description from TOML. A missing file yields the empty default.
pub fn load_host_config(path: &Path) -> Result<HostConfig> {
    if !path.exists() {
        return Ok(HostConfig::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let parsed: HostConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(parsed)
}

/// Explicit id wins; otherwise ask the host. Nothing found is a
/// configuration error, raised before any transform starts.
pub fn resolve_target_id(
    target: &str,
    explicit: Option<i32>,
    resolver: &dyn NamespaceResolver,
) -> Result<i32, RemapError> {
    if let Some(id) = explicit {
        return Ok(id);
    }
    resolver.namespace_id(target).ok_or_else(|| {
        RemapError::Configuration(format!(
            "no namespace id configured for '{}'; pass one explicitly",
            target
        ))
    })
}
