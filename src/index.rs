use crate::cache::TitleCache;
use crate::config::PROGRESS_INTERVAL;
use crate::error::{RemapError, Result};
use crate::source::InputSource;
use crate::subtree::{local_name_is, Cursor};
use indicatif::ProgressBar;
use quick_xml::events::Event;
use rustc_hash::FxHashSet;
use std::io::BufRead;
use tracing::{info, warn};

/// Lower-cased titles of the export's main and talk namespace pages.
///
/// Built once by a dedicated scan before the controlling pass and never
/// touched afterwards.
#[derive(Debug, Default, Clone)]
pub struct TitleIndex {
    titles: FxHashSet<String>,
}

#[derive(Clone, Copy)]
enum Field {
    Title,
    Ns,
}

impl TitleIndex {
    /// Scans a fresh handle on `source`. Fails with `UnreadableInput` when
    /// the source cannot be opened a second time.
    pub fn build(source: &InputSource) -> Result<Self> {
        info!("Building title index from: {}", source.name());
        let index = Self::scan(source.reopen()?)?;
        info!(titles = index.len(), "Title index built");
        Ok(index)
    }

    /// The index for `source`, from `cache` when it holds a current entry,
    /// otherwise by scanning (and then refreshing the entry). `None` when the
    /// source cannot be pre-scanned, as with stdin.
    pub fn load_or_build(source: &InputSource, cache: Option<&TitleCache>) -> Result<Option<Self>> {
        let cached = cache.zip(source.path());
        if let Some(index) = cached.and_then(|(cache, path)| cache.load(path)) {
            return Ok(Some(index));
        }

        match Self::build(source) {
            Ok(index) => {
                if let Some((cache, path)) = cached {
                    if let Err(e) = cache.store(path, &index) {
                        warn!(error = %e, "Failed to save title cache");
                    }
                }
                Ok(Some(index))
            }
            Err(e @ RemapError::UnreadableInput { .. }) => {
                warn!(error = %e, "No title index for this input");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub fn scan<R: BufRead>(input: R) -> Result<Self> {
        let mut cursor = Cursor::new(input);
        let mut titles = FxHashSet::default();
        let pb = ProgressBar::new_spinner();

        let mut in_page = false;
        let mut field: Option<Field> = None;
        let mut title: Option<String> = None;
        let mut ns: Option<String> = None;
        let mut pages: u64 = 0;

        loop {
            match cursor.next()? {
                Event::Start(e) if local_name_is(&e, "page") => {
                    in_page = true;
                    field = None;
                    title = None;
                    ns = None;
                }
                Event::Start(e) if in_page => {
                    field = if local_name_is(&e, "title") && title.is_none() {
                        Some(Field::Title)
                    } else if local_name_is(&e, "ns") && ns.is_none() {
                        Some(Field::Ns)
                    } else {
                        None
                    };
                }
                Event::Text(t) => {
                    let slot = match field {
                        Some(Field::Title) => &mut title,
                        Some(Field::Ns) => &mut ns,
                        None => continue,
                    };
                    slot.get_or_insert_with(String::new)
                        .push_str(&t.unescape()?);
                }
                Event::End(e) if e.local_name().as_ref() == b"page" => {
                    in_page = false;
                    let is_main = matches!(ns.as_deref().map(str::trim), Some("0") | Some("1"));
                    if let (true, Some(t)) = (is_main, title.take()) {
                        titles.insert(t.to_lowercase());
                    }
                    pages += 1;
                    if pages % PROGRESS_INTERVAL == 0 {
                        pb.tick();
                    }
                }
                Event::End(_) => field = None,
                Event::Eof => break,
                _ => {}
            }
        }

        pb.finish_and_clear();
        Ok(Self { titles })
    }

    pub fn from_titles<I, S>(titles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            titles: titles
                .into_iter()
                .map(|t| t.as_ref().to_lowercase())
                .collect(),
        }
    }

    /// Titles that were lower-cased when first indexed.
    pub(crate) fn from_lowercased(titles: Vec<String>) -> Self {
        Self {
            titles: titles.into_iter().collect(),
        }
    }

    pub(crate) fn titles(&self) -> impl Iterator<Item = &str> {
        self.titles.iter().map(String::as_str)
    }

    pub fn contains(&self, title: &str) -> bool {
        self.titles.contains(&title.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = r#"<mediawiki>
  <siteinfo><sitename>Test</sitename></siteinfo>
  <page>
    <title>Widgets</title>
    <ns>0</ns>
    <id>1</id>
    <revision><id>10</id><text>[[Gadgets]]</text></revision>
  </page>
  <page>
    <title>Talk:Widgets</title>
    <ns>1</ns>
    <id>2</id>
  </page>
  <page>
    <title>Help:Contents</title>
    <ns>12</ns>
    <id>3</id>
  </page>
  <page>
    <title>Caf&#233; &amp; Bar</title>
    <ns>0</ns>
    <id>4</id>
  </page>
</mediawiki>"#;

    #[test]
    fn records_main_and_talk_titles_only() {
        let index = TitleIndex::scan(EXPORT.as_bytes()).unwrap();
        assert_eq!(index.len(), 3);
        assert!(index.contains("widgets"));
        assert!(index.contains("Talk:Widgets"));
        assert!(!index.contains("Help:Contents"));
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let index = TitleIndex::scan(EXPORT.as_bytes()).unwrap();
        assert!(index.contains("WIDGETS"));
        assert!(index.contains("widgets"));
    }

    #[test]
    fn titles_are_unescaped() {
        let index = TitleIndex::scan(EXPORT.as_bytes()).unwrap();
        assert!(index.contains("Café & Bar"));
    }

    #[test]
    fn empty_export_gives_empty_index() {
        let index = TitleIndex::scan("<mediawiki></mediawiki>".as_bytes()).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn stdin_is_unreadable_for_prescan() {
        let err = TitleIndex::build(&InputSource::Stdin).unwrap_err();
        assert!(matches!(err, RemapError::UnreadableInput { .. }));
    }

    #[test]
    fn stdin_has_no_index_even_with_a_cache() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = TitleCache::new(dir.path());
        let index = TitleIndex::load_or_build(&InputSource::Stdin, Some(&cache)).unwrap();
        assert!(index.is_none());
    }

    #[test]
    fn load_or_build_fills_then_uses_the_cache() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("export.xml");
        std::fs::write(&path, EXPORT).unwrap();
        let source = InputSource::Path(path.clone());
        let cache = TitleCache::new(dir.path().join("cache"));

        let built = TitleIndex::load_or_build(&source, Some(&cache)).unwrap().unwrap();
        assert_eq!(built.len(), 3);
        assert_eq!(cache.load(&path).unwrap().len(), 3);

        // A planted entry wins over the file on disk.
        cache.store(&path, &TitleIndex::from_titles(["Planted"])).unwrap();
        let loaded = TitleIndex::load_or_build(&source, Some(&cache)).unwrap().unwrap();
        assert!(loaded.contains("planted"));
        assert!(!loaded.contains("widgets"));
    }

    #[test]
    fn load_or_build_without_cache_scans() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("export.xml");
        std::fs::write(&path, EXPORT).unwrap();
        let index = TitleIndex::load_or_build(&InputSource::Path(path), None)
            .unwrap()
            .unwrap();
        assert!(index.contains("Talk:Widgets"));
    }

    #[test]
    fn from_titles_lowercases() {
        let index = TitleIndex::from_titles(["Widgets", "GADGETS"]);
        assert!(index.contains("gadgets"));
        assert!(index.contains("Widgets"));
        assert!(!index.contains("Sprockets"));
    }
}
