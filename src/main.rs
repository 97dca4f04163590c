use anyhow::{Context, Result};
use clap::Parser;
use nsremap::cache::TitleCache;
use nsremap::config::{DEFAULT_CACHE_DIR, DEFAULT_FILES_DIR, DEFAULT_HOST_CONFIG};
use nsremap::host::{self, HostConfig};
use nsremap::source::{InputSource, OutputSink};
use nsremap::{ImportConfig, LinkPolicy, StreamEngine, TitleIndex};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "nsremap")]
#[command(about = "Move the main namespace of a MediaWiki XML export into a new namespace")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Name of the namespace pages are moved into
    #[arg(short, long)]
    target: String,

    /// Numeric id of the target namespace (looked up in the host config if omitted)
    #[arg(short, long)]
    id: Option<i32>,

    /// Comma-separated source namespaces to keep besides the main one
    #[arg(short, long, value_delimiter = ',')]
    namespaces: Vec<String>,

    /// Rewrite links the heuristic takes for main-namespace pages, even when not indexed
    #[arg(long)]
    anyway: bool,

    /// Leave revision text untouched
    #[arg(long, conflicts_with = "anyway")]
    no_links: bool,

    /// Embed uploaded files into their description pages
    #[arg(long)]
    embed_files: bool,

    /// Hashed upload directory to read embedded files from
    #[arg(long, requires = "embed_files")]
    files_dir: Option<PathBuf>,

    /// Host wiki description (namespace ids, interwiki prefixes)
    #[arg(long)]
    host_config: Option<PathBuf>,

    /// Directory for the title index cache
    #[arg(long, default_value = DEFAULT_CACHE_DIR)]
    cache_dir: PathBuf,

    /// Force rebuild of the title index
    #[arg(long)]
    no_cache: bool,

    /// Write run statistics and issues as JSON
    #[arg(long)]
    report: Option<PathBuf>,

    /// Export to read (.xml or .xml.bz2); stdin when omitted or "-"
    input: Option<String>,

    /// Where to write the result (.bz2 is compressed); stdout when omitted or "-"
    output: Option<String>,
}

fn build_config(cli: &Cli, host: &HostConfig) -> Result<ImportConfig> {
    let target_id = host::resolve_target_id(&cli.target, cli.id, host)?;
    let policy = if cli.no_links {
        LinkPolicy::Disabled
    } else if cli.anyway {
        LinkPolicy::Force
    } else {
        LinkPolicy::IndexOnly
    };

    let mut config = ImportConfig::new(cli.target.trim(), target_id)
        .with_retained(&cli.namespaces)
        .with_link_policy(policy);
    if cli.embed_files {
        let root = cli
            .files_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FILES_DIR));
        config = config.with_embedded_files(root);
    }
    Ok(config)
}

/// Loads or builds the title index. Stdin cannot be pre-scanned: the run
/// then relies on the heuristic alone (`--anyway`) or skips link rewriting.
fn load_titles(cli: &Cli, input: &InputSource, config: &mut ImportConfig) -> Result<TitleIndex> {
    if config.link_policy == LinkPolicy::Disabled {
        info!("Link rewriting disabled, skipping title index");
        return Ok(TitleIndex::default());
    }

    let cache = (!cli.no_cache).then(|| TitleCache::new(&cli.cache_dir));
    let index =
        TitleIndex::load_or_build(input, cache.as_ref()).context("Failed to build title index")?;
    if let Some(index) = index {
        return Ok(index);
    }

    config.link_policy = config.link_policy.without_index();
    if config.link_policy == LinkPolicy::Force {
        warn!("Rewriting links by heuristic only");
    } else {
        warn!("Link rewriting disabled (use --anyway to force)");
    }
    Ok(TitleIndex::default())
}

fn run(cli: Cli) -> Result<()> {
    let host_path = cli
        .host_config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_HOST_CONFIG));
    let host = host::load_host_config(&host_path)?;
    let mut config = build_config(&cli, &host)?;
    let input = InputSource::from_arg(cli.input.as_deref());

    let start_indexing = Instant::now();
    let titles = load_titles(&cli, &input, &mut config)?;
    let indexing_duration = start_indexing.elapsed();
    info!(
        titles = titles.len(),
        duration_secs = indexing_duration.as_secs_f64(),
        "Indexing complete"
    );

    info!(
        namespace = %config.target_ns,
        id = config.target_ns_id,
        policy = ?config.link_policy,
        "Starting controlling pass"
    );
    let start_rewriting = Instant::now();
    let reader = input
        .open()
        .with_context(|| format!("Failed to open input: {}", input.name()))?;
    let sink = OutputSink::create(cli.output.as_deref()).context("Failed to create output")?;

    let engine = StreamEngine::new(&config, &titles, &host);
    let (sink, stats) = match engine.run(reader, sink) {
        Ok(done) => done,
        Err(e) => {
            discard_partial_output(cli.output.as_deref());
            return Err(e).context("Rewrite aborted");
        }
    };
    sink.finish().context("Failed to finish output")?;
    let rewriting_duration = start_rewriting.elapsed();

    if let Some(report) = &cli.report {
        stats.write_report(report)?;
    }

    // stdout may carry the document itself
    eprintln!();
    eprintln!("=== Summary ===");
    eprintln!("Indexing time:      {:.2}s", indexing_duration.as_secs_f64());
    eprintln!("Rewrite time:       {:.2}s", rewriting_duration.as_secs_f64());
    eprintln!();
    eprintln!("Pages seen:         {}", stats.pages_seen);
    eprintln!("Pages moved:        {}", stats.pages_moved);
    eprintln!("Talk pages moved:   {}", stats.talk_pages_moved);
    eprintln!("Pages retained:     {}", stats.pages_retained);
    eprintln!("Pages dropped:      {}", stats.pages_dropped);
    eprintln!("Links rewritten:    {}", stats.links_rewritten);
    eprintln!("Checksums removed:  {}", stats.checksums_removed);
    eprintln!("Files embedded:     {}", stats.files_embedded);
    eprintln!("Issues:             {}", stats.issues.len());

    Ok(())
}

fn discard_partial_output(output: Option<&str>) {
    let Some(path) = output.filter(|p| *p != "-") else {
        return;
    };
    if let Err(e) = fs::remove_file(path) {
        warn!(error = %e, path, "Failed to remove partial output");
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    match run(cli) {
        Ok(()) => {
            info!("Completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
