use crate::host::InterwikiLookup;
use crate::index::TitleIndex;
use crate::namespaces::NamespaceRegistry;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use rustc_hash::FxHashMap;
use std::borrow::Cow;
use tracing::trace;

/// `[[target` up to the first `|` or `]`.
pub static LINK_TARGET_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\[([^|\]]+)").unwrap());

static DRIVE_PATH_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z]:\\").unwrap());

/// Guesses whether a link target names a main-namespace page without
/// consulting the title index.
///
/// Titles that themselves contain a colon (`Star Wars: Episode I`) read as
/// namespaced and are rejected unless the prefix is unknown to both the
/// registry and the interwiki table; such links can be misclassified.
pub fn looks_like_main_namespace(
    target: &str,
    registry: &NamespaceRegistry,
    interwiki: &dyn InterwikiLookup,
) -> bool {
    let target = target.strip_prefix(':').unwrap_or(target);
    if DRIVE_PATH_REGEX.is_match(target) || target.contains("://") {
        return false;
    }
    match target.split_once(':') {
        None => true,
        Some((prefix, _)) => !interwiki.is_interwiki(prefix) && !registry.contains(prefix),
    }
}

/// Redirects wikitext links into the target namespace.
pub struct LinkRewriter<'a> {
    target_ns: &'a str,
    titles: &'a TitleIndex,
    registry: &'a NamespaceRegistry,
    interwiki: &'a dyn InterwikiLookup,
    force: bool,
}

impl<'a> LinkRewriter<'a> {
    pub fn new(
        target_ns: &'a str,
        titles: &'a TitleIndex,
        registry: &'a NamespaceRegistry,
        interwiki: &'a dyn InterwikiLookup,
    ) -> Self {
        Self {
            target_ns,
            titles,
            registry,
            interwiki,
            force: false,
        }
    }

    /// Also rewrite targets the heuristic takes for main-namespace pages.
    pub fn forced(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn should_rewrite(&self, target: &str) -> bool {
        let bare = target.strip_prefix(':').unwrap_or(target);
        if self.titles.contains(bare) {
            return true;
        }
        self.force && looks_like_main_namespace(target, self.registry, self.interwiki)
    }

    fn prefixed(&self, target: &str) -> String {
        match target.strip_prefix(':') {
            Some(rest) => format!("[[:{}:{}", self.target_ns, rest),
            None => format!("[[{}:{}", self.target_ns, target),
        }
    }

    /// Rewrites every qualifying link in `text`, deciding once per distinct
    /// target. Returns the new text and the number of links changed.
    pub fn rewrite<'t>(&self, text: &'t str) -> (Cow<'t, str>, u64) {
        let mut decisions: FxHashMap<String, bool> = FxHashMap::default();
        let mut rewritten = 0u64;

        let out = LINK_TARGET_REGEX.replace_all(text, |caps: &Captures<'_>| {
            let target = &caps[1];
            let rewrite = *decisions
                .entry(target.to_string())
                .or_insert_with(|| self.should_rewrite(target));
            if rewrite {
                trace!(link = target, "Rewriting link");
                rewritten += 1;
                self.prefixed(target)
            } else {
                caps[0].to_string()
            }
        });

        (out, rewritten)
    }
}
