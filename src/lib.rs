//! nsremap: move a MediaWiki export's main namespace into a new namespace
//!
//! Rewrites an XML export so that, once imported, every main-namespace page
//! lands in a custom namespace on the host wiki:
//!
//! 1. **Indexing Pass** -- Collect the lower-cased titles of all main and talk
//!    pages by streaming through the export once (optionally from a cache)
//! 2. **Controlling Pass** -- Copy the document through a forward-only state
//!    machine, inserting the target namespace declaration and transforming
//!    each page: rename, filter, drop ids and checksums, rewrite links, and
//!    optionally embed uploaded files
//!
//! # Architecture
//!
//! - **Streaming XML** -- Only one `<page>` subtree is held in memory at a time
//! - **Immutable lookups** -- The title index and namespace registry are built
//!   once and only read afterwards
//! - **Typed failures** -- Structural problems abort the run; missing files and
//!   unparsable titles are recorded in the run statistics
//!
//! # Key Modules
//!
//! - [`engine`] -- The controlling pass state machine
//! - [`page`] -- Per-page record and transform rules
//! - [`links`] -- Wikitext link rewriting and the main-namespace heuristic
//! - [`index`] -- Title index pre-scan
//! - [`namespaces`] -- Namespace registry collected from the export header
//! - [`subtree`] -- Pull cursor and owned element tree
//! - [`source`] -- Plain/bz2 input and output handles
//! - [`host`] -- Host wiki description (namespace ids, interwiki prefixes)
//! - [`files`] -- Hashed upload directory access
//! - [`cache`] -- Title index persistence
//! - [`stats`] -- Run counters and issue report
//! - [`config`] -- Constants and the run configuration
//! - [`error`] -- Error taxonomy
//!
//! # Example Usage
//!
//! ```bash
//! # Move everything into EAI (id 556), keep Help pages, embed uploads
//! nsremap -t EAI -i 556 -n Help --embed-files --files-dir images/ \
//!     export.xml.bz2 remapped.xml.bz2
//!
//! # Read from stdin; rewrite links by heuristic since stdin can't be pre-scanned
//! bzcat export.xml.bz2 | nsremap -t EAI -i 556 --anyway > remapped.xml
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod files;
pub mod host;
pub mod index;
pub mod links;
pub mod namespaces;
pub mod page;
pub mod source;
pub mod stats;
pub mod subtree;

pub use config::{ImportConfig, LinkPolicy};
pub use engine::StreamEngine;
pub use error::RemapError;
pub use index::TitleIndex;
pub use stats::TransformStats;
