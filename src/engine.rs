//! The controlling pass.
//!
//! A forward-only state machine over the export's event stream:
//!
//! 1. **Preamble** -- copy verbatim up to `<namespaces>`, noting `<case>`
//! 2. **NamespaceBlock** -- copy declarations into the registry, insert the
//!    target namespace before `</namespaces>`
//! 3. **HeaderTail** -- copy verbatim up to the first `<page>`
//! 4. **PageLoop** -- expand, transform and emit or drop each page
//! 5. **Done** -- root closed, output flushed
//!
//! Phases never go backwards. Any structural surprise aborts the run and the
//! partially written output must be discarded.

use crate::config::{ImportConfig, LinkPolicy, DEFAULT_CASE, PROGRESS_INTERVAL};
use crate::error::{RemapError, Result};
use crate::files::{FileStore, HashedDirStore};
use crate::host::InterwikiLookup;
use crate::index::TitleIndex;
use crate::links::LinkRewriter;
use crate::namespaces::{normalize, NamespaceRegistry, NamespaceRegistryBuilder};
use crate::page::{PageOutcome, PageRecord, PageTransformer};
use crate::stats::TransformStats;
use crate::subtree::{local_name_is, Cursor, Element};
use indicatif::ProgressBar;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::writer::Writer;
use std::io::{BufRead, Write};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Preamble,
    NamespaceBlock,
    HeaderTail,
    PageLoop,
    Done,
}

/// Drives one controlling pass. The title index must already be complete.
pub struct StreamEngine<'a> {
    config: &'a ImportConfig,
    titles: &'a TitleIndex,
    interwiki: &'a dyn InterwikiLookup,
    files: Option<&'a dyn FileStore>,
}

impl<'a> StreamEngine<'a> {
    pub fn new(
        config: &'a ImportConfig,
        titles: &'a TitleIndex,
        interwiki: &'a dyn InterwikiLookup,
    ) -> Self {
        Self {
            config,
            titles,
            interwiki,
            files: None,
        }
    }

    /// Replaces the hashed upload directory under `config.files_root`.
    pub fn with_file_store(mut self, files: &'a dyn FileStore) -> Self {
        self.files = Some(files);
        self
    }

    /// Streams `input` to `output`. Returns the output sink so callers can
    /// finish it (compression trailers) along with the run's counters.
    pub fn run<R: BufRead, W: Write>(&self, input: R, output: W) -> Result<(W, TransformStats)> {
        let mut pass = Pass {
            cursor: Cursor::new(input),
            writer: Writer::new(output),
            phase: Phase::Preamble,
            depth: 0,
            stats: TransformStats::new(),
        };

        let (case, opening) = pass.preamble()?;
        pass.advance(Phase::NamespaceBlock);
        let registry = match opening {
            BlockOpening::Open => pass.namespace_block(self.config, case)?,
            BlockOpening::SelfClosing(start) => pass.fill_empty_block(start, self.config, case)?,
        };
        info!(namespaces = registry.len(), case = registry.case(), "Namespace block rewritten");

        pass.advance(Phase::HeaderTail);
        let first_page = pass.header_tail()?;

        let default_store;
        let files: Option<&dyn FileStore> = match self.files {
            Some(files) => Some(files),
            None if self.config.embed_files => {
                default_store = HashedDirStore::new(&self.config.files_root);
                Some(&default_store)
            }
            None => None,
        };
        let transformer = self.transformer(&registry, files);

        if let Some(first) = first_page {
            pass.advance(Phase::PageLoop);
            pass.page_loop(first, &transformer)?;
        }

        pass.advance(Phase::Done);
        let Pass { writer, stats, .. } = pass;
        let mut output = writer.into_inner();
        output.flush()?;
        Ok((output, stats))
    }

    fn transformer<'b>(
        &'b self,
        registry: &'b NamespaceRegistry,
        files: Option<&'b dyn FileStore>,
    ) -> PageTransformer<'b> {
        let mut transformer = PageTransformer::new(self.config);
        let force = match self.config.link_policy {
            LinkPolicy::Disabled => None,
            LinkPolicy::IndexOnly => Some(false),
            LinkPolicy::Force => Some(true),
        };
        if let Some(force) = force {
            let links =
                LinkRewriter::new(&self.config.target_ns, self.titles, registry, self.interwiki)
                    .forced(force);
            transformer = transformer.with_links(links);
        }
        if let Some(files) = files {
            transformer = transformer.with_files(files);
        }
        transformer
    }
}

fn unexpected_eof(phase: Phase, waiting_for: &str) -> RemapError {
    RemapError::structural(format!(
        "input ended in phase {:?} while looking for {}",
        phase, waiting_for
    ))
}

fn write_target_namespace<W: Write>(
    writer: &mut Writer<W>,
    config: &ImportConfig,
    case: &str,
) -> Result<()> {
    info!(
        name = %config.target_ns,
        key = config.target_ns_id,
        "Inserting target namespace"
    );
    Element::with_text("namespace", &config.target_ns)
        .with_attribute("key", &config.target_ns_id.to_string())
        .with_attribute("case", case)
        .write(writer)
}

/// How the export spelled its namespace list.
enum BlockOpening {
    Open,
    /// `<namespaces/>`: nothing to copy, expanded so the target can be declared.
    SelfClosing(BytesStart<'static>),
}

struct Pass<R, W: Write> {
    cursor: Cursor<R>,
    writer: Writer<W>,
    phase: Phase,
    /// Open elements in the copied stream (pages are consumed whole).
    depth: usize,
    stats: TransformStats,
}

impl<R: BufRead, W: Write> Pass<R, W> {
    fn advance(&mut self, next: Phase) {
        debug_assert!(next > self.phase, "phase {:?} -> {:?}", self.phase, next);
        debug!(from = ?self.phase, to = ?next, "Phase transition");
        self.phase = next;
    }

    /// Copies up to and including `<namespaces>`; returns the case marker.
    /// A self-closing block is handed back unwritten.
    fn preamble(&mut self) -> Result<(String, BlockOpening)> {
        let mut case: Option<String> = None;
        let mut in_case = false;
        loop {
            let event = self.cursor.next()?;
            match &event {
                Event::Start(e) if local_name_is(e, "namespaces") => {
                    self.depth += 1;
                    self.writer.write_event(&event)?;
                    let case = case.unwrap_or_else(|| DEFAULT_CASE.to_string());
                    return Ok((case, BlockOpening::Open));
                }
                Event::Empty(e) if local_name_is(e, "namespaces") => {
                    let case = case.unwrap_or_else(|| DEFAULT_CASE.to_string());
                    return Ok((case, BlockOpening::SelfClosing(e.to_owned())));
                }
                Event::Start(e) => {
                    in_case = local_name_is(e, "case");
                    self.depth += 1;
                }
                Event::Text(t) if in_case => {
                    case.get_or_insert_with(String::new).push_str(&t.unescape()?);
                }
                Event::End(_) => {
                    in_case = false;
                    self.depth = self.depth.saturating_sub(1);
                }
                Event::Eof => return Err(unexpected_eof(self.phase, "<namespaces>")),
                _ => {}
            }
            self.writer.write_event(&event)?;
        }
    }

    fn fill_empty_block(
        &mut self,
        start: BytesStart<'static>,
        config: &ImportConfig,
        case: String,
    ) -> Result<NamespaceRegistry> {
        self.writer.write_event(Event::Start(start.borrow()))?;
        write_target_namespace(&mut self.writer, config, &case)?;
        self.writer.write_event(Event::End(start.to_end()))?;
        Ok(NamespaceRegistryBuilder::new().finish(case))
    }

    /// Copies the declarations, records them, and inserts the target
    /// namespace just before `</namespaces>` unless the block already
    /// declares it by name or key.
    fn namespace_block(&mut self, config: &ImportConfig, case: String) -> Result<NamespaceRegistry> {
        let mut builder = NamespaceRegistryBuilder::new();
        let mut item_indent: Option<BytesText<'static>> = None;
        let mut pending_ws: Option<BytesText<'static>> = None;
        let mut current: Option<String> = None;
        let target_name = normalize(&config.target_ns);
        let target_key = config.target_ns_id.to_string();
        let mut declared = false;

        loop {
            let event = self.cursor.next()?;
            match &event {
                Event::Text(t) if current.is_none() && t.iter().all(u8::is_ascii_whitespace) => {
                    // Held back so the inserted entry can slot in before the
                    // closing tag's indentation.
                    if let Some(ws) = pending_ws.take() {
                        self.writer.write_event(Event::Text(ws))?;
                    }
                    pending_ws = Some(t.clone().into_owned());
                    continue;
                }
                Event::End(e) if e.local_name().as_ref() == b"namespaces" => {}
                Event::Eof => return Err(unexpected_eof(self.phase, "</namespaces>")),
                _ => {
                    if let Some(ws) = pending_ws.take() {
                        if item_indent.is_none() {
                            item_indent = Some(ws.clone());
                        }
                        self.writer.write_event(Event::Text(ws))?;
                    }
                }
            }

            match &event {
                Event::Start(e) | Event::Empty(e) if local_name_is(e, "namespace") => {
                    if let Some(key) = e.try_get_attribute("key")? {
                        declared |= key.unescape_value()?.trim() == target_key;
                    }
                    if matches!(event, Event::Start(_)) {
                        current = Some(String::new());
                    }
                }
                Event::Text(t) => {
                    if let Some(name) = current.as_mut() {
                        name.push_str(&t.unescape()?);
                    }
                }
                Event::End(e) if e.local_name().as_ref() == b"namespace" => {
                    if let Some(name) = current.take() {
                        declared |= normalize(&name) == target_name;
                        builder.record(&name);
                    }
                }
                Event::End(e) if e.local_name().as_ref() == b"namespaces" => {
                    if declared {
                        info!(name = %config.target_ns, "Target namespace already declared");
                    } else {
                        if let Some(indent) = &item_indent {
                            self.writer.write_event(Event::Text(indent.clone()))?;
                        }
                        write_target_namespace(&mut self.writer, config, &case)?;
                    }
                    if let Some(ws) = pending_ws.take() {
                        self.writer.write_event(Event::Text(ws))?;
                    }
                    self.writer.write_event(&event)?;
                    self.depth = self.depth.saturating_sub(1);
                    return Ok(builder.finish(case));
                }
                _ => {}
            }
            self.writer.write_event(&event)?;
        }
    }

    /// Copies up to the first `<page>`, which is returned unwritten. `None`
    /// means the root closed without any pages.
    fn header_tail(&mut self) -> Result<Option<BytesStart<'static>>> {
        loop {
            let event = self.cursor.next()?;
            match &event {
                Event::Start(e) if self.depth == 1 && local_name_is(e, "page") => {
                    return Ok(Some(e.to_owned()));
                }
                Event::Start(_) => self.depth += 1,
                Event::End(_) => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.depth == 0 {
                        self.writer.write_event(&event)?;
                        return Ok(None);
                    }
                }
                Event::Eof => return Err(unexpected_eof(self.phase, "<page>")),
                _ => {}
            }
            self.writer.write_event(&event)?;
        }
    }

    fn page_loop(&mut self, first: BytesStart<'static>, transformer: &PageTransformer<'_>) -> Result<()> {
        let pb = ProgressBar::new_spinner();
        self.process_page(first, transformer)?;

        loop {
            let event = self.cursor.next()?;
            match &event {
                Event::Start(e) if self.depth == 1 && local_name_is(e, "page") => {
                    let start = e.to_owned();
                    self.process_page(start, transformer)?;
                    if self.stats.pages_seen % PROGRESS_INTERVAL == 0 {
                        pb.tick();
                    }
                    continue;
                }
                Event::Start(_) => self.depth += 1,
                Event::End(_) => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.depth == 0 {
                        self.writer.write_event(&event)?;
                        break;
                    }
                }
                Event::Eof => return Err(unexpected_eof(self.phase, "</mediawiki>")),
                _ => {}
            }
            self.writer.write_event(&event)?;
        }

        pb.finish_and_clear();
        info!(
            seen = self.stats.pages_seen,
            emitted = self.stats.pages_emitted(),
            dropped = self.stats.pages_dropped,
            "Page loop finished"
        );
        Ok(())
    }

    fn process_page(&mut self, start: BytesStart<'static>, transformer: &PageTransformer<'_>) -> Result<()> {
        let element = self.cursor.expand(start)?;
        let record = PageRecord::from_element(element)?;
        match transformer.transform(record, &mut self.stats) {
            PageOutcome::Emit(record) => record.into_element()?.write(&mut self.writer)?,
            PageOutcome::Drop => {}
        }
        Ok(())
    }
}
