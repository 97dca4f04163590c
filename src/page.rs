use crate::config::{ImportConfig, FILE_NAMESPACE, FILE_PREFIXES};
use crate::error::{RemapError, Result};
use crate::files::{storage_key, FileStore};
use crate::links::LinkRewriter;
use crate::stats::TransformStats;
use crate::subtree::Element;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tracing::debug;

/// One `<page>` lifted out of the stream, with the fields the rewrite
/// rules care about pulled out of its subtree.
#[derive(Debug)]
pub struct PageRecord {
    pub title: String,
    pub ns: i32,
    id: Option<String>,
    /// One entry per `<revision>`; `None` when the revision has no `<text>`.
    pub texts: Vec<Option<String>>,
    checksums: Vec<String>,
    timestamp: Option<String>,
    upload: Option<Element>,
    original_title: String,
    original_ns: i32,
    original_texts: Vec<Option<String>>,
    element: Element,
}

impl PageRecord {
    pub fn from_element(element: Element) -> Result<Self> {
        let title = element
            .child("title")
            .ok_or_else(|| RemapError::structural("<page> without <title>"))?
            .text()?;
        let ns_text = element
            .child("ns")
            .ok_or_else(|| RemapError::structural(format!("page '{}' has no <ns>", title)))?
            .text()?;
        let ns = ns_text.trim().parse::<i32>().map_err(|_| {
            RemapError::structural(format!("page '{}' has non-numeric <ns> '{}'", title, ns_text))
        })?;
        let id = element.child("id").map(Element::text).transpose()?;

        let mut texts = Vec::new();
        let mut checksums = Vec::new();
        let mut timestamp = None;
        for revision in element.children_named("revision") {
            texts.push(revision.child("text").map(Element::text).transpose()?);
            for sha1 in revision.children_named("sha1") {
                checksums.push(sha1.text()?);
            }
            if timestamp.is_none() {
                if let Some(ts) = revision.child("timestamp") {
                    timestamp = Some(ts.text()?);
                }
            }
        }

        Ok(Self {
            original_title: title.clone(),
            original_ns: ns,
            original_texts: texts.clone(),
            title,
            ns,
            id,
            texts,
            checksums,
            timestamp,
            upload: None,
            element,
        })
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn checksums(&self) -> &[String] {
        &self.checksums
    }

    pub fn attach_upload(&mut self, upload: Element) {
        self.upload = Some(upload);
    }

    /// Writes the record's fields back into its subtree. Page and revision
    /// ids and all checksums are dropped.
    pub fn into_element(self) -> Result<Element> {
        let mut element = self.element;

        if self.title != self.original_title {
            if let Some(title) = element.child_mut("title") {
                title.set_text(&self.title);
            }
        }
        if self.ns != self.original_ns {
            if let Some(ns) = element.child_mut("ns") {
                ns.set_text(&self.ns.to_string());
            }
        }
        element.remove_children("id");

        let texts = self.texts.iter().zip(&self.original_texts);
        for (revision, (text, original)) in element.children_named_mut("revision").zip(texts) {
            revision.remove_children("id");
            revision.remove_children("parentid");
            revision.remove_children("sha1");

            let Some(text_el) = revision.child_mut("text") else {
                continue;
            };
            if text_el.attribute("sha1")?.is_some() {
                text_el.set_attribute("sha1", None)?;
            }
            if let Some(text) = text {
                if Some(text) != original.as_ref() {
                    text_el.set_text(text);
                    if text_el.attribute("bytes")?.is_some() {
                        text_el.set_attribute("bytes", Some(text.len().to_string().as_str()))?;
                    }
                }
            }
        }

        if let Some(upload) = self.upload {
            element.append_child(upload);
        }
        Ok(element)
    }
}

#[derive(Debug)]
pub enum PageOutcome {
    Emit(PageRecord),
    Drop,
}

/// Text before the first `:` of a title, if any.
pub fn namespace_prefix(title: &str) -> Option<&str> {
    title.split_once(':').map(|(prefix, _)| prefix)
}

/// Upload name of a file description page. Namespace 6 is recognised
/// whatever its local name (`Datei:`, `Fichier:`).
fn file_name(title: &str, ns: i32) -> Option<&str> {
    if ns == FILE_NAMESPACE {
        return title.split_once(':').map(|(_, name)| name);
    }
    FILE_PREFIXES
        .iter()
        .find_map(|prefix| title.strip_prefix(*prefix))
}

/// Applies the rename, filter, link and embedding rules to one page.
pub struct PageTransformer<'a> {
    config: &'a ImportConfig,
    links: Option<LinkRewriter<'a>>,
    files: Option<&'a dyn FileStore>,
}

impl<'a> PageTransformer<'a> {
    pub fn new(config: &'a ImportConfig) -> Self {
        Self {
            config,
            links: None,
            files: None,
        }
    }

    pub fn with_links(mut self, links: LinkRewriter<'a>) -> Self {
        self.links = Some(links);
        self
    }

    pub fn with_files(mut self, files: &'a dyn FileStore) -> Self {
        self.files = Some(files);
        self
    }

    pub fn transform(&self, mut page: PageRecord, stats: &mut TransformStats) -> PageOutcome {
        stats.inc_seen();

        match page.ns {
            0 => {
                page.title = format!("{}:{}", self.config.target_ns, page.title);
                page.ns = self.config.target_ns_id;
                stats.inc_moved();
            }
            1 => {
                let rest = page
                    .title
                    .split_once(':')
                    .map(|(_, rest)| rest)
                    .unwrap_or(&page.title);
                page.title = format!("{}:{}", self.config.talk_namespace(), rest);
                page.ns = self.config.target_ns_id + 1;
                stats.inc_talk_moved();
            }
            ns if ns == self.config.target_ns_id || ns == self.config.target_ns_id + 1 => {
                stats.inc_retained();
            }
            _ => match namespace_prefix(&page.title) {
                Some(prefix) if self.config.retains(prefix) => stats.inc_retained(),
                Some(prefix) => {
                    debug!(title = %page.title, namespace = prefix, "Dropping page");
                    stats.inc_dropped();
                    return PageOutcome::Drop;
                }
                None => {
                    stats.record_issue(
                        &page.title,
                        format!("no namespace prefix in title for ns {}; page dropped", page.ns),
                    );
                    stats.inc_dropped();
                    return PageOutcome::Drop;
                }
            },
        }

        stats.add_checksums(page.checksums.len() as u64);

        if let Some(links) = &self.links {
            for text in page.texts.iter_mut().flatten() {
                let (rewritten, count) = links.rewrite(text);
                if count > 0 {
                    let rewritten = rewritten.into_owned();
                    *text = rewritten;
                    stats.add_links(count);
                }
            }
        }

        if self.config.embed_files {
            if let Some(files) = self.files {
                self.embed(&mut page, files, stats);
            }
        }

        debug!(title = %page.title, ns = page.ns, "Emitting page");
        PageOutcome::Emit(page)
    }

    fn embed(&self, page: &mut PageRecord, files: &dyn FileStore, stats: &mut TransformStats) {
        let Some(name) = file_name(&page.title, page.ns) else {
            return;
        };
        let key = storage_key(name);
        match files.read(&key) {
            Ok(bytes) => {
                let mut upload = Element::new("upload");
                if let Some(ts) = &page.timestamp {
                    upload.append_child(Element::with_text("timestamp", ts));
                }
                upload.append_child(Element::with_text("filename", &key));
                upload.append_child(Element::with_text("size", &bytes.len().to_string()));
                upload.append_child(
                    Element::with_text("contents", &BASE64.encode(&bytes))
                        .with_attribute("encoding", "base64"),
                );
                page.attach_upload(upload);
                stats.inc_files();
            }
            Err(e) => stats.record_issue(&page.title, e.to_string()),
        }
    }
}
