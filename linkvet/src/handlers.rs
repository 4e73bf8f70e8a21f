use anyhow::{Context, Result};
use clap::ArgMatches;
use colored::Colorize;
use linkvet_core::check::{CheckOptions, execute_check};
use linkvet_core::checkpoint::{CheckpointState, CheckpointStore};
use linkvet_core::config::CheckConfig;
use linkvet_core::report::{self, CategoryCounts, CorpusSummary, ReportFormat};
use linkvet_scanner::extract::{self, DocumentCollection, Extraction};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Process exit statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Report written
    Success,
    /// Unreadable collection, bad configuration or persistence failure
    Fatal,
    /// Cancelled; checkpoint written, no report
    Interrupted,
    /// Report written and `--fail-on-broken` found definitely broken links
    BrokenLinksFound,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Fatal => 1,
            ExitStatus::Interrupted => 2,
            ExitStatus::BrokenLinksFound => 3,
        }
    }
}

pub fn print_banner() {
    eprintln!(
        "{} {}",
        "linkvet".bold().cyan(),
        format!("v{} - outbound link checker", env!("CARGO_PKG_VERSION")).dimmed()
    );
}

/// Log to stderr; `RUST_LOG` wins over `--verbose`.
pub fn init_logging(verbose: bool) {
    let default_level = if verbose {
        "warn,linkvet=debug,linkvet_core=debug,linkvet_scanner=debug"
    } else {
        "warn"
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Parse a `HOST=MILLIS` domain interval override
pub fn parse_domain_interval(raw: &str) -> std::result::Result<(String, u64), String> {
    let (host, millis) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected HOST=MILLIS, got '{}'", raw))?;

    let host = host.trim().to_ascii_lowercase();
    if host.is_empty() {
        return Err(format!("missing host in '{}'", raw));
    }

    let millis = millis
        .trim()
        .parse::<u64>()
        .map_err(|e| format!("invalid interval in '{}': {}", raw, e))?;

    Ok((host, millis))
}

/// Expand a leading `~` in a user-supplied path
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(raw.as_ref()).as_ref())
}

/// Command line values that override the config file
#[derive(Debug, Clone, Default)]
pub struct CheckOverrides {
    pub config_file: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub checkpoint: Option<PathBuf>,
    pub threads: Option<usize>,
    pub batch_size: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub interval_ms: Option<u64>,
    pub domain_intervals: Vec<(String, u64)>,
    pub strict: bool,
    pub no_browser_headers: bool,
}

impl CheckOverrides {
    pub fn from_matches(args: &ArgMatches) -> Self {
        Self {
            config_file: args.get_one::<PathBuf>("config").cloned(),
            output: args.get_one::<PathBuf>("output").cloned(),
            checkpoint: args.get_one::<PathBuf>("checkpoint").cloned(),
            threads: args.get_one::<usize>("threads").copied(),
            batch_size: args.get_one::<usize>("batch-size").copied(),
            timeout_secs: args.get_one::<u64>("timeout").copied(),
            interval_ms: args.get_one::<u64>("interval").copied(),
            domain_intervals: args
                .get_many::<(String, u64)>("domain-interval")
                .map(|values| values.cloned().collect())
                .unwrap_or_default(),
            strict: args.get_flag("strict"),
            no_browser_headers: args.get_flag("no-browser-headers"),
        }
    }
}

/// Defaults, then the config file, then command line flags.
pub fn build_config(overrides: &CheckOverrides) -> Result<CheckConfig> {
    let mut config = match &overrides.config_file {
        Some(path) => CheckConfig::from_file(&expand_path(path))?,
        None => CheckConfig::default(),
    };

    if let Some(output) = &overrides.output {
        config.output_path = expand_path(output);
    } else {
        config.output_path = expand_path(&config.output_path);
    }
    if let Some(checkpoint) = &overrides.checkpoint {
        config.checkpoint_path = Some(expand_path(checkpoint));
    } else if let Some(checkpoint) = &config.checkpoint_path {
        config.checkpoint_path = Some(expand_path(checkpoint));
    }
    if let Some(threads) = overrides.threads {
        config.max_workers = threads;
    }
    if let Some(batch_size) = overrides.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(timeout) = overrides.timeout_secs {
        config.request_timeout_secs = timeout;
    }
    if let Some(interval) = overrides.interval_ms {
        config.default_domain_interval_ms = interval;
    }
    for (host, millis) in &overrides.domain_intervals {
        config.domain_intervals.insert(host.clone(), *millis);
    }
    if overrides.strict {
        config.strict_markup = true;
    }
    if overrides.no_browser_headers {
        config.browser_headers = false;
    }

    config.validate()?;
    Ok(config)
}

/// Flip the returned receiver to `true` on the first Ctrl+C.
/// A second Ctrl+C exits immediately.
pub fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!(
                "\n{} finishing in-flight requests and saving checkpoint (Ctrl+C again to quit now)",
                "Interrupted:".yellow().bold()
            );
            let _ = shutdown_tx.send(true);

            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Force quit requested, exiting immediately...");
                std::process::exit(ExitStatus::Interrupted.code());
            }
        }
    });

    shutdown_rx
}

fn open_collection(dir: &Path, strict: bool) -> Result<DocumentCollection> {
    let dir = expand_path(dir);
    let collection = DocumentCollection::open(&dir)
        .with_context(|| format!("Cannot read document collection {}", dir.display()))?;
    Ok(collection.with_strict_markup(strict))
}

pub async fn handle_check(args: &ArgMatches, quiet: bool) -> Result<ExitStatus> {
    init_logging(args.get_flag("verbose"));

    let config = build_config(&CheckOverrides::from_matches(args))
        .context("Invalid configuration")?;
    let format = args
        .get_one::<String>("format")
        .and_then(|f| ReportFormat::from_str(f))
        .unwrap_or(ReportFormat::Text);
    let fresh = args.get_flag("fresh");
    let fail_on_broken = args.get_flag("fail-on-broken");

    let dir = args
        .get_one::<PathBuf>("DIR")
        .context("No document directory given")?;
    let collection = open_collection(dir, config.strict_markup)?;

    let extraction = extract::extract(&collection);
    let missing = extract::check_local_references(&extraction.local_references, collection.root());

    let store = CheckpointStore::new(config.checkpoint_path());
    let state = if fresh {
        store.clear().context("Cannot discard old checkpoint")?;
        CheckpointState::new()
    } else {
        match store.load().context("Cannot resume from checkpoint")? {
            Some(state) => {
                if !quiet {
                    eprintln!(
                        "{} {} URL(s) already checked in run {}",
                        "Resuming:".cyan().bold(),
                        state.len(),
                        state.run_id
                    );
                }
                state
            }
            None => CheckpointState::new(),
        }
    };

    if !quiet {
        eprintln!(
            "Checking {} unique link(s) from {} document(s) with {} worker(s)\n",
            extraction.links.len(),
            extraction.documents_scanned,
            config.max_workers
        );
    }

    let output_path = config.output_path.clone();
    let outcome = execute_check(
        &extraction.links,
        state,
        store.clone(),
        CheckOptions {
            config,
            show_progress_bars: !quiet,
        },
        shutdown_on_ctrl_c(),
        None,
    )
    .await
    .context("Link check failed")?;

    if outcome.is_interrupted() {
        eprintln!(
            "{} {} URL(s) checked so far; checkpoint saved to {}",
            "Interrupted:".yellow().bold(),
            outcome.state().len(),
            store.path().display()
        );
        return Ok(ExitStatus::Interrupted);
    }

    let state = outcome.into_state();
    let counts = write_report(&extraction, missing, state, format, &output_path)?;
    store.clear().context("Cannot remove checkpoint")?;

    if !quiet {
        print_summary(&counts, &output_path);
    }

    if fail_on_broken && counts.definitely_broken > 0 {
        Ok(ExitStatus::BrokenLinksFound)
    } else {
        Ok(ExitStatus::Success)
    }
}

/// Write the report for every result that still belongs to the collection.
pub fn write_report(
    extraction: &Extraction,
    missing: Vec<extract::LocalReference>,
    state: CheckpointState,
    format: ReportFormat,
    output_path: &Path,
) -> Result<CategoryCounts> {
    let results: Vec<_> = state
        .results
        .into_iter()
        .filter(|r| extraction.links.contains_key(&r.url))
        .collect();

    let summary = CorpusSummary::from_extraction(extraction, missing);
    let content = report::generate_report(format, &results, &summary)
        .context("Failed to render report")?;
    report::save_report(&content, output_path)
        .with_context(|| format!("Failed to save report to {}", output_path.display()))?;

    info!("Report written to {}", output_path.display());
    Ok(CategoryCounts::from_results(&results))
}

fn print_summary(counts: &CategoryCounts, output_path: &Path) {
    println!("\n{} Check complete!\n", "✓".green().bold());
    println!("  {} {}", "Definitely broken:  ".red(), counts.definitely_broken);
    println!("  {} {}", "Works in browser:   ".yellow(), counts.works_in_browser);
    println!("  {} {}", "May work in browser:".truecolor(255, 165, 0), counts.may_work_in_browser);
    println!("  {} {}", "OK:                 ".green(), counts.ok);
    println!("\nReport saved to: {}", output_path.display());
}

pub fn handle_extract(args: &ArgMatches) -> Result<ExitStatus> {
    init_logging(args.get_flag("verbose"));

    let dir = args
        .get_one::<PathBuf>("DIR")
        .context("No document directory given")?;
    let collection = open_collection(dir, args.get_flag("strict"))?;
    let extraction = extract::extract(&collection);

    print!("{}", format_extraction(&extraction));
    Ok(ExitStatus::Success)
}

/// Plain listing of unique links, their kinds and referencing documents
pub fn format_extraction(extraction: &Extraction) -> String {
    let mut out = String::new();

    for link in extraction.links.values() {
        let kinds: Vec<&str> = link.kinds.iter().map(|k| k.as_str()).collect();
        out.push_str(&format!("{} [{}]\n", link.url, kinds.join("/")));
        for document in &link.source_documents {
            out.push_str(&format!("    {}\n", document));
        }
    }

    for issue in &extraction.issues {
        out.push_str(&format!("skipped {}: {}\n", issue.document, issue.reason));
    }

    out.push_str(&format!(
        "\n{} unique link(s), {} reference(s), {} document(s), {} skipped\n",
        extraction.links.len(),
        extraction.total_references(),
        extraction.documents_scanned,
        extraction.issues.len()
    ));
    out
}
