use crate::namespaces::normalize;
use rustc_hash::FxHashSet;
use std::path::PathBuf;

/// Case-folding mode assumed when the export has no `<case>` element
pub const DEFAULT_CASE: &str = "first-letter";

/// Progress update interval (tick every N pages)
pub const PROGRESS_INTERVAL: u64 = 1000;

/// Bump whenever the on-disk title index layout changes
pub const CACHE_VERSION: u32 = 1;

/// Conventional upload directory, relative to the working directory
pub const DEFAULT_FILES_DIR: &str = "images";

/// Title index cache location when `--cache-dir` is not given
pub const DEFAULT_CACHE_DIR: &str = ".nsremap";

/// Host configuration read when `--host-config` is not given
pub const DEFAULT_HOST_CONFIG: &str = "nsremap.toml";

/// Read buffer for input streams
pub const INPUT_BUFFER_SIZE: usize = 1024 * 1024;

/// Write buffer for the output document
pub const OUTPUT_BUFFER_SIZE: usize = 256 * 1024;

/// Number of the file namespace in every MediaWiki install
pub const FILE_NAMESPACE: i32 = 6;

/// Title prefixes that mark a file description page outside namespace 6
pub const FILE_PREFIXES: [&str; 2] = ["File:", "Image:"];

/// How links in revision text are redirected into the target namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPolicy {
    /// Leave revision text untouched.
    Disabled,
    /// Rewrite only links whose target was a main-namespace page in the export.
    IndexOnly,
    /// Also rewrite links that merely look like main-namespace links.
    Force,
}

impl LinkPolicy {
    /// The policy to fall back on when no title index could be built.
    pub fn without_index(self) -> Self {
        match self {
            Self::Force => Self::Force,
            Self::IndexOnly | Self::Disabled => Self::Disabled,
        }
    }
}

/// Immutable settings for one run.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub target_ns: String,
    pub target_ns_id: i32,
    /// Lower-cased names of source namespaces (besides main) to keep.
    retain: FxHashSet<String>,
    pub link_policy: LinkPolicy,
    pub embed_files: bool,
    pub files_root: PathBuf,
}

impl ImportConfig {
    pub fn new(target_ns: impl Into<String>, target_ns_id: i32) -> Self {
        Self {
            target_ns: target_ns.into(),
            target_ns_id,
            retain: FxHashSet::default(),
            link_policy: LinkPolicy::IndexOnly,
            embed_files: false,
            files_root: PathBuf::from(DEFAULT_FILES_DIR),
        }
    }

    pub fn with_retained<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.retain.extend(
            names
                .into_iter()
                .map(|n| normalize(n.as_ref()))
                .filter(|n| !n.is_empty()),
        );
        self
    }

    pub fn with_link_policy(mut self, policy: LinkPolicy) -> Self {
        self.link_policy = policy;
        self
    }

    pub fn with_embedded_files(mut self, root: impl Into<PathBuf>) -> Self {
        self.embed_files = true;
        self.files_root = root.into();
        self
    }

    /// Whether pages from the named source namespace survive the transform.
    pub fn retains(&self, namespace: &str) -> bool {
        self.retain.contains(&normalize(namespace))
    }

    pub fn talk_namespace(&self) -> String {
        format!("{} talk", self.target_ns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retains_is_case_insensitive() {
        let config = ImportConfig::new("EAI", 556).with_retained(["Help", " template "]);
        assert!(config.retains("help"));
        assert!(config.retains("HELP"));
        assert!(config.retains("Template"));
        assert!(!config.retains("User"));
    }

    #[test]
    fn retains_treats_underscore_as_space() {
        let config = ImportConfig::new("EAI", 556).with_retained(["Help_talk"]);
        assert!(config.retains("Help talk"));
    }

    #[test]
    fn empty_names_are_ignored() {
        let config = ImportConfig::new("EAI", 556).with_retained(["", "  "]);
        assert!(!config.retains(""));
    }

    #[test]
    fn defaults() {
        let config = ImportConfig::new("EAI", 556);
        assert_eq!(config.link_policy, LinkPolicy::IndexOnly);
        assert!(!config.embed_files);
        assert_eq!(config.files_root, PathBuf::from(DEFAULT_FILES_DIR));
        assert_eq!(config.talk_namespace(), "EAI talk");
    }

    #[test]
    fn only_forced_links_survive_a_missing_index() {
        assert_eq!(LinkPolicy::Force.without_index(), LinkPolicy::Force);
        assert_eq!(LinkPolicy::IndexOnly.without_index(), LinkPolicy::Disabled);
        assert_eq!(LinkPolicy::Disabled.without_index(), LinkPolicy::Disabled);
    }
}
