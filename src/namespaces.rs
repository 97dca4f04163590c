use rustc_hash::FxHashSet;

/// Pseudo-namespaces that must never be mistaken for main-namespace links.
const SYNTHETIC_NAMESPACES: [&str; 2] = ["image", "http"];

/// Namespace names declared by the export's `<siteinfo>`.
///
/// Only [`NamespaceRegistryBuilder::finish`] produces one, so a registry in
/// hand means the declaration block has been read completely.
#[derive(Debug, Clone)]
pub struct NamespaceRegistry {
    names: FxHashSet<String>,
    case: String,
}

impl NamespaceRegistry {
    /// Case-insensitive; underscores count as spaces, as in link syntax.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(&normalize(name))
    }

    /// The source wiki's `<case>` marker.
    pub fn case(&self) -> &str {
        &self.case
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct NamespaceRegistryBuilder {
    names: FxHashSet<String>,
}

impl NamespaceRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, name: &str) {
        let name = normalize(name);
        if !name.is_empty() {
            self.names.insert(name);
        }
    }

    pub fn finish(mut self, case: impl Into<String>) -> NamespaceRegistry {
        self.names
            .extend(SYNTHETIC_NAMESPACES.iter().map(|s| s.to_string()));
        NamespaceRegistry {
            names: self.names,
            case: case.into(),
        }
    }
}

pub(crate) fn normalize(name: &str) -> String {
    name.trim().replace('_', " ").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(names: &[&str]) -> NamespaceRegistry {
        let mut builder = NamespaceRegistryBuilder::new();
        for name in names {
            builder.record(name);
        }
        builder.finish("first-letter")
    }

    #[test]
    fn synthetic_entries_always_present() {
        let reg = registry(&[]);
        assert!(reg.contains("Image"));
        assert!(reg.contains("http"));
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn lookup_ignores_case_and_underscores() {
        let reg = registry(&["Help talk", "Template"]);
        assert!(reg.contains("help talk"));
        assert!(reg.contains("Help_talk"));
        assert!(reg.contains("TEMPLATE"));
        assert!(!reg.contains("User"));
    }

    #[test]
    fn empty_names_are_skipped() {
        let reg = registry(&["", "  "]);
        assert_eq!(reg.len(), 2);
        assert!(!reg.contains(""));
    }

    #[test]
    fn case_marker_is_kept_verbatim() {
        let reg = NamespaceRegistryBuilder::new().finish("case-sensitive");
        assert_eq!(reg.case(), "case-sensitive");
    }
}
