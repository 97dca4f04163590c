//! End-to-end tests for the namespace remap pipeline.
//!
//! Every test runs the two passes the binary runs, title index first and
//! controlling pass second, over the shared `sample_xml()` export:
//!
//! - 2 main pages: "Widgets" (links to Gadgets, AT&T and the web) and "Gadgets"
//! - 1 talk page: "Talk:Widgets"
//! - 1 help page, 1 user page, 1 file page with an upload on disk
//!
//! Inputs are written to temp files, plain or BZ2-compressed, so the same
//! source handles the binary uses are exercised.

use bzip2::read::MultiBzDecoder;
use bzip2::write::BzEncoder;
use bzip2::Compression;
use nsremap::files::{hashed_path, storage_key};
use nsremap::host::HostConfig;
use nsremap::source::{InputSource, OutputSink};
use nsremap::{ImportConfig, LinkPolicy, StreamEngine, TitleIndex, TransformStats};
use std::fs;
use std::io::{Read, Write};
use tempfile::{NamedTempFile, TempDir};

fn create_bz2_xml(xml: &str) -> NamedTempFile {
    let mut encoder = BzEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(xml.as_bytes()).unwrap();
    let compressed = encoder.finish().unwrap();

    let mut tmp = tempfile::Builder::new().suffix(".xml.bz2").tempfile().unwrap();
    tmp.write_all(&compressed).unwrap();
    tmp.flush().unwrap();
    tmp
}

fn create_plain_xml(xml: &str) -> NamedTempFile {
    let mut tmp = tempfile::Builder::new().suffix(".xml").tempfile().unwrap();
    tmp.write_all(xml.as_bytes()).unwrap();
    tmp.flush().unwrap();
    tmp
}

fn sample_xml() -> &'static str {
    r#"<mediawiki xmlns="http://www.mediawiki.org/xml/export-0.10/" version="0.10" xml:lang="en">
  <siteinfo>
    <sitename>Engineering</sitename>
    <case>first-letter</case>
    <namespaces>
      <namespace key="-1" case="first-letter">Special</namespace>
      <namespace key="0" case="first-letter" />
      <namespace key="1" case="first-letter">Talk</namespace>
      <namespace key="2" case="first-letter">User</namespace>
      <namespace key="6" case="first-letter">File</namespace>
      <namespace key="12" case="first-letter">Help</namespace>
    </namespaces>
  </siteinfo>
  <page>
    <title>Widgets</title>
    <ns>0</ns>
    <id>1</id>
    <revision>
      <id>100</id>
      <timestamp>2024-01-15T10:30:00Z</timestamp>
      <contributor>
        <username>Alice</username>
        <id>7</id>
      </contributor>
      <text xml:space="preserve" bytes="93">Widgets pair with [[Gadgets]] and [[gadgets|small gadgets]].
Sold by [[AT&amp;T]]. See [[http://example.com]].</text>
      <sha1>5t2q8mhqx3xvvq5a0xkp9xku3nyg4sa</sha1>
    </revision>
    <revision>
      <id>101</id>
      <parentid>100</parentid>
      <timestamp>2024-01-16T08:00:00Z</timestamp>
      <text xml:space="preserve" bytes="21">See [[Help:Widgets]].</text>
      <sha1>0x8d7yqfmq7yqo0p1b2qzbgbtrwdb7r</sha1>
    </revision>
  </page>
  <page>
    <title>Gadgets</title>
    <ns>0</ns>
    <id>2</id>
    <revision>
      <id>102</id>
      <text xml:space="preserve" bytes="14">Back to [[Widgets]].</text>
    </revision>
  </page>
  <page>
    <title>AT&amp;T</title>
    <ns>0</ns>
    <id>3</id>
    <revision>
      <id>103</id>
      <text xml:space="preserve" bytes="9">A carrier</text>
    </revision>
  </page>
  <page>
    <title>Talk:Widgets</title>
    <ns>1</ns>
    <id>4</id>
    <revision>
      <id>104</id>
      <text xml:space="preserve" bytes="16">Discuss [[Widgets]]</text>
    </revision>
  </page>
  <page>
    <title>Help:Widgets</title>
    <ns>12</ns>
    <id>5</id>
    <revision>
      <id>105</id>
      <text xml:space="preserve" bytes="17">How to [[Widgets]]</text>
    </revision>
  </page>
  <page>
    <title>User:Alice</title>
    <ns>2</ns>
    <id>6</id>
    <revision>
      <id>106</id>
      <text xml:space="preserve" bytes="5">Hello</text>
    </revision>
  </page>
  <page>
    <title>File:Rust logo.svg</title>
    <ns>6</ns>
    <id>7</id>
    <revision>
      <id>107</id>
      <timestamp>2024-02-01T12:00:00Z</timestamp>
      <text xml:space="preserve" bytes="8">The logo</text>
    </revision>
  </page>
</mediawiki>
"#
}

fn remap(input: &InputSource, config: &ImportConfig) -> (String, TransformStats) {
    let titles = TitleIndex::build(input).unwrap();
    let host = HostConfig::default();
    let engine = StreamEngine::new(config, &titles, &host);
    let (out, stats) = engine.run(input.open().unwrap(), Vec::new()).unwrap();
    (String::from_utf8(out).unwrap(), stats)
}

fn default_config() -> ImportConfig {
    ImportConfig::new("EAI", 556).with_retained(["Help", "File"])
}

fn source(file: &NamedTempFile) -> InputSource {
    InputSource::from_arg(file.path().to_str())
}

// ============================================================================
// Title index
// ============================================================================

#[test]
fn title_index_holds_main_and_talk_titles() {
    let file = create_bz2_xml(sample_xml());
    let titles = TitleIndex::build(&source(&file)).unwrap();

    assert_eq!(titles.len(), 4);
    assert!(titles.contains("Widgets"));
    assert!(titles.contains("gadgets"));
    assert!(titles.contains("AT&T"));
    assert!(titles.contains("Talk:Widgets"));
    assert!(!titles.contains("Help:Widgets"));
    assert!(!titles.contains("User:Alice"));
}

#[test]
fn stdin_cannot_be_indexed() {
    let err = TitleIndex::build(&InputSource::Stdin).unwrap_err();
    assert!(!err.is_fatal());
}

// ============================================================================
// Header
// ============================================================================

#[test]
fn target_namespace_is_declared_last() {
    let file = create_plain_xml(sample_xml());
    let (out, _) = remap(&source(&file), &default_config());

    assert!(out.contains(
        "      <namespace key=\"12\" case=\"first-letter\">Help</namespace>\n      <namespace key=\"556\" case=\"first-letter\">EAI</namespace>\n    </namespaces>"
    ));
    assert_eq!(out.matches("<namespace ").count(), 7);
    assert!(out.contains("<sitename>Engineering</sitename>"));
}

// ============================================================================
// Pages
// ============================================================================

#[test]
fn main_and_talk_pages_are_moved() {
    let file = create_bz2_xml(sample_xml());
    let (out, stats) = remap(&source(&file), &default_config());

    assert!(out.contains("<title>EAI:Widgets</title>\n    <ns>556</ns>"));
    assert!(out.contains("<title>EAI:Gadgets</title>"));
    assert!(out.contains("<title>EAI:AT&amp;T</title>"));
    assert!(out.contains("<title>EAI talk:Widgets</title>\n    <ns>557</ns>"));
    assert_eq!(stats.pages_moved, 3);
    assert_eq!(stats.talk_pages_moved, 1);
}

#[test]
fn other_namespaces_follow_retain_set() {
    let file = create_plain_xml(sample_xml());
    let (out, stats) = remap(&source(&file), &default_config());

    assert!(out.contains("<title>Help:Widgets</title>\n    <ns>12</ns>"));
    assert!(out.contains("<title>File:Rust logo.svg</title>"));
    assert!(!out.contains("User:Alice"));
    assert_eq!(stats.pages_retained, 2);
    assert_eq!(stats.pages_dropped, 1);
    assert_eq!(stats.pages_seen, 7);
    assert_eq!(stats.pages_emitted(), 6);
}

#[test]
fn ids_and_checksums_are_removed() {
    let file = create_plain_xml(sample_xml());
    let (out, stats) = remap(&source(&file), &default_config());

    assert!(!out.contains("<sha1>"));
    assert!(!out.contains("<parentid>"));
    assert!(!out.contains("<id>1</id>"));
    assert!(!out.contains("<id>100</id>"));
    // contributor ids identify users, not pages
    assert!(out.contains("<username>Alice</username>\n        <id>7</id>"));
    assert_eq!(stats.checksums_removed, 2);
}

// ============================================================================
// Links
// ============================================================================

#[test]
fn indexed_links_are_rewritten() {
    let file = create_plain_xml(sample_xml());
    let (out, stats) = remap(&source(&file), &default_config());

    assert!(out.contains("Widgets pair with [[EAI:Gadgets]] and [[EAI:gadgets|small gadgets]]."));
    assert!(out.contains("Sold by [[EAI:AT&amp;T]]."));
    assert!(out.contains("See [[http://example.com]]."));
    assert!(out.contains("See [[Help:Widgets]]."));
    assert!(out.contains("Back to [[EAI:Widgets]]."));
    assert!(out.contains("How to [[EAI:Widgets]]"));
    assert_eq!(stats.links_rewritten, 6);
}

#[test]
fn rewritten_text_updates_byte_count() {
    let file = create_plain_xml(sample_xml());
    let (out, _) = remap(&source(&file), &default_config());
    let expected = "Back to [[EAI:Widgets]].".len();
    assert!(out.contains(&format!(
        "<text xml:space=\"preserve\" bytes=\"{}\">Back to [[EAI:Widgets]].</text>",
        expected
    )));
}

#[test]
fn disabled_policy_keeps_text() {
    let file = create_plain_xml(sample_xml());
    let config = default_config().with_link_policy(LinkPolicy::Disabled);
    let (out, stats) = remap(&source(&file), &config);

    assert!(out.contains("Back to [[Widgets]]."));
    assert!(out.contains("<text xml:space=\"preserve\" bytes=\"14\">Back to [[Widgets]].</text>"));
    assert_eq!(stats.links_rewritten, 0);
}

#[test]
fn forced_policy_uses_heuristic_without_index() {
    let file = create_plain_xml(sample_xml());
    let config = default_config().with_link_policy(LinkPolicy::Force);
    let input = source(&file);
    let host = HostConfig::default();
    let titles = TitleIndex::default();
    let engine = StreamEngine::new(&config, &titles, &host);
    let (out, _) = engine.run(input.open().unwrap(), Vec::new()).unwrap();
    let out = String::from_utf8(out).unwrap();

    assert!(out.contains("Back to [[EAI:Widgets]]."));
    assert!(out.contains("See [[Help:Widgets]]."));
    assert!(out.contains("See [[http://example.com]]."));
}

// ============================================================================
// Uploads
// ============================================================================

#[test]
fn file_pages_embed_their_upload() {
    let uploads = TempDir::new().unwrap();
    let key = storage_key("Rust logo.svg");
    let path = uploads.path().join(hashed_path(&key));
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, b"\x89PNG fake image").unwrap();

    let file = create_plain_xml(sample_xml());
    let config = default_config().with_embedded_files(uploads.path());
    let (out, stats) = remap(&source(&file), &config);

    assert!(out.contains("<filename>Rust_logo.svg</filename>"));
    assert!(out.contains("<size>15</size>"));
    assert!(out.contains("<contents encoding=\"base64\">iVBORyBmYWtlIGltYWdl</contents>"));
    assert!(out.contains("<timestamp>2024-02-01T12:00:00Z</timestamp>"));
    assert_eq!(stats.files_embedded, 1);
    assert!(stats.issues.is_empty());
}

#[test]
fn missing_upload_is_reported_not_fatal() {
    let uploads = TempDir::new().unwrap();
    let file = create_plain_xml(sample_xml());
    let config = default_config().with_embedded_files(uploads.path());
    let (out, stats) = remap(&source(&file), &config);

    assert!(out.contains("<title>File:Rust logo.svg</title>"));
    assert!(!out.contains("<upload>"));
    assert_eq!(stats.files_embedded, 0);
    assert_eq!(stats.issues.len(), 1);
    assert_eq!(stats.issues[0].page, "File:Rust logo.svg");
}

// ============================================================================
// Whole documents
// ============================================================================

#[test]
fn bz2_output_roundtrips() {
    let file = create_bz2_xml(sample_xml());
    let input = source(&file);
    let dir = TempDir::new().unwrap();
    let out_path = dir.path().join("remapped.xml.bz2");

    let config = default_config();
    let titles = TitleIndex::build(&input).unwrap();
    let host = HostConfig::default();
    let sink = OutputSink::create(out_path.to_str()).unwrap();
    let (sink, _) = StreamEngine::new(&config, &titles, &host)
        .run(input.open().unwrap(), sink)
        .unwrap();
    sink.finish().unwrap();

    let mut decoded = String::new();
    MultiBzDecoder::new(fs::File::open(&out_path).unwrap())
        .read_to_string(&mut decoded)
        .unwrap();
    assert!(decoded.contains("<title>EAI:Widgets</title>"));
    assert!(decoded.trim_end().ends_with("</mediawiki>"));
}

#[test]
fn second_run_changes_nothing_more() {
    let first = create_plain_xml(sample_xml());
    let config = ImportConfig::new("EAI", 556);
    let (once, _) = remap(&source(&first), &config);

    let second = create_plain_xml(&once);
    let (twice, stats) = remap(&source(&second), &config);

    assert_eq!(stats.pages_moved, 0);
    assert_eq!(stats.talk_pages_moved, 0);
    assert_eq!(stats.links_rewritten, 0);
    assert!(!twice.contains("EAI:EAI:"));
    assert!(twice.contains("<title>EAI:Widgets</title>\n    <ns>556</ns>"));
    assert!(twice.contains("<title>EAI talk:Widgets</title>\n    <ns>557</ns>"));
    assert_eq!(twice.matches(">EAI</namespace>").count(), 1);
}

#[test]
fn truncated_export_fails() {
    let xml = sample_xml();
    let cut = xml.find("<title>Gadgets</title>").unwrap();
    let file = create_plain_xml(&xml[..cut]);
    let input = source(&file);

    let config = default_config();
    let titles = TitleIndex::build(&input).unwrap();
    let host = HostConfig::default();
    let err = StreamEngine::new(&config, &titles, &host)
        .run(input.open().unwrap(), Vec::new())
        .unwrap_err();
    assert!(err.is_fatal(), "{err}");
}

#[test]
fn report_is_written_as_json() {
    let file = create_plain_xml(sample_xml());
    let (_, stats) = remap(&source(&file), &default_config());

    let dir = TempDir::new().unwrap();
    let report = dir.path().join("report.json");
    stats.write_report(&report).unwrap();

    let parsed: TransformStats =
        serde_json::from_str(&fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(parsed.pages_moved, 3);
    assert_eq!(parsed.pages_dropped, 1);
}
