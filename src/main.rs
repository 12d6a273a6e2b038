use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Instant;

use cdlc_reconcile::config::Config;
use cdlc_reconcile::engine::{self, RecommendRequest};
use cdlc_reconcile::library::scan_library;
use cdlc_reconcile::loader::SourceLoader;
use cdlc_reconcile::models::{RenameLogEntry, RenameSummary};
use cdlc_reconcile::oracle::HttpOracle;
use cdlc_reconcile::progress::{follow_filter_events, format_duration, set_log_only};
use cdlc_reconcile::ranking::{FilterOrder, ScrobbleRange};
use cdlc_reconcile::renamer::{add_packaging_markers, normalize_folder, DiskFolder, RenameOptions};
use cdlc_reconcile::report::{print_preview, save_library, save_recommendations, CsvRenameLog};
use cdlc_reconcile::safety::validate_output_path;

#[derive(Parser)]
#[command(name = "cdlc-reconcile")]
#[command(about = "Find missing CDLC songs from listening history and tidy chart filenames")]
struct Cli {
    /// TOML config file (defaults apply when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Hide progress bars, emit periodic log lines instead
    #[arg(long, global = true)]
    log_only: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rank liked/top songs missing from the library by artist scrobbles
    Recommend(RecommendArgs),
    /// Fuzzy-match malformed chart filenames and rename them canonically
    NormalizeFiles(NormalizeArgs),
    /// Rebuild the library table from the chart folder
    RebuildLibrary(RebuildArgs),
    /// Add the `_p` packaging marker to chart files lacking it
    AddSuffix(SuffixArgs),
}

#[derive(Args)]
struct RecommendArgs {
    #[arg(long, default_value = "50")]
    top: usize,

    #[arg(long, default_value = "0")]
    min_scrobbles: u64,

    #[arg(long)]
    max_scrobbles: Option<u64>,

    /// Keep only songs that already have a chart available online
    #[arg(long)]
    filter_existing: bool,

    #[arg(long, value_enum, default_value_t = FilterOrderArg::TruncateThenFilter)]
    filter_order: FilterOrderArg,

    /// Print the list without writing the CSV
    #[arg(long)]
    no_save: bool,

    /// Write run statistics as JSON
    #[arg(long)]
    stats: Option<PathBuf>,
}

#[derive(Args)]
struct NormalizeArgs {
    /// Folder of malformed chart files (default: the configured unmatched folder)
    #[arg(long)]
    folder: Option<PathBuf>,

    /// Rename log path (default: rename_log.csv inside the folder)
    #[arg(long)]
    log: Option<PathBuf>,

    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct RebuildArgs {
    #[arg(long)]
    dlc: Option<PathBuf>,

    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct SuffixArgs {
    #[arg(long)]
    folder: Option<PathBuf>,

    #[arg(long)]
    dry_run: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum FilterOrderArg {
    TruncateThenFilter,
    FilterThenTruncate,
}

impl From<FilterOrderArg> for FilterOrder {
    fn from(arg: FilterOrderArg) -> Self {
        match arg {
            FilterOrderArg::TruncateThenFilter => FilterOrder::TruncateThenFilter,
            FilterOrderArg::FilterThenTruncate => FilterOrder::FilterThenTruncate,
        }
    }
}

fn print_banner(title: &str) {
    println!("\n{:=<60}", "");
    println!("{}", title);
}

fn print_rename_summary(summary: &RenameSummary) {
    println!("  Renamed: {}", summary.renamed);
    println!("  Skipped (duplicate): {}", summary.skipped_duplicate);
    println!("  No match: {}", summary.no_match);
    println!("  Unmatched: {}", summary.unmatched);
}

fn run_recommend(config: &Config, args: RecommendArgs) -> Result<()> {
    let start = Instant::now();
    let paths = config.source_paths();
    let output = config.recommendations_path();
    if !args.no_save {
        validate_output_path(&output, "recommendations", &paths.all())?;
    }

    let sources = SourceLoader::new(paths, config.repair_encoding).load()?;
    let request = RecommendRequest {
        top_n: args.top,
        range: ScrobbleRange::new(args.min_scrobbles, args.max_scrobbles),
    };

    let (recommendations, mut stats) = if args.filter_existing {
        let oracle = HttpOracle::new(config.oracle_settings());
        let order = FilterOrder::from(args.filter_order);
        engine::recommend_existing(&sources, request, order, oracle, follow_filter_events)?
    } else {
        engine::recommend(&sources, request)
    };

    print_preview(&recommendations);
    if !args.no_save {
        save_recommendations(&output, &recommendations)?;
        println!("\nSaved to {}", output.display());
    }

    stats.elapsed_seconds = start.elapsed().as_secs_f64();
    stats.log_phase("recommend");
    if let Some(path) = args.stats {
        stats.write_to_file(&path)?;
    }
    Ok(())
}

fn run_normalize(config: &Config, args: NormalizeArgs) -> Result<()> {
    let start = Instant::now();
    let paths = config.source_paths();
    let folder_path = args.folder.unwrap_or_else(|| config.unmatched_dir());
    let log_path = args.log.unwrap_or_else(|| config.rename_log_path(&folder_path));
    validate_output_path(&log_path, "rename_log", &paths.all())?;

    let sources = SourceLoader::new(paths, config.repair_encoding).load_history_sources()?;
    let references = engine::reference_set(&sources);

    let mut folder = DiskFolder::new(&folder_path);
    let mut sink = CsvRenameLog::create(&log_path)?;
    let options = RenameOptions {
        threshold: config.match_threshold,
        dry_run: args.dry_run,
    };
    let summary = normalize_folder(&mut folder, &references, options, &mut sink)?;
    sink.into_inner()?;

    print_banner(if args.dry_run { "Normalization dry run complete" } else { "Normalization complete" });
    print_rename_summary(&summary);
    println!("  Log: {}", log_path.display());
    println!("  Elapsed: {}", format_duration(start.elapsed()));
    Ok(())
}

fn run_rebuild(config: &Config, args: RebuildArgs) -> Result<()> {
    let dlc = args.dlc.unwrap_or_else(|| config.dlc_dir.clone());
    let output = args.output.unwrap_or_else(|| config.library_path());
    let paths = config.source_paths();
    validate_output_path(
        &output,
        "library",
        &[paths.liked.as_path(), paths.top.as_path(), paths.scrobbles.as_path()],
    )?;

    let exclude = dlc.join(&config.normalizer_dir);
    let scan = scan_library(&dlc, Some(exclude.as_path()))?;
    save_library(&output, &scan.entries)?;

    print_banner("Library rebuild complete");
    println!("  Charts: {}", scan.entries.len());
    println!("  Dropped (no artist/title): {}", scan.rejected.len());
    for name in &scan.rejected {
        println!("    {}", name);
    }
    println!("  Saved to {}", output.display());
    Ok(())
}

fn run_add_suffix(config: &Config, args: SuffixArgs) -> Result<()> {
    let folder_path = args.folder.unwrap_or_else(|| config.dlc_dir.clone());
    let mut folder = DiskFolder::new(&folder_path);
    let mut log: Vec<RenameLogEntry> = Vec::new();
    let summary = add_packaging_markers(&mut folder, args.dry_run, &mut log)?;

    print_banner("Suffix pass complete");
    for entry in &log {
        println!("  {}: {} -> {}", entry.status, entry.original, entry.new_name);
    }
    print_rename_summary(&summary);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    set_log_only(cli.log_only);

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Recommend(args) => run_recommend(&config, args),
        Command::NormalizeFiles(args) => run_normalize(&config, args),
        Command::RebuildLibrary(args) => run_rebuild(&config, args),
        Command::AddSuffix(args) => run_add_suffix(&config, args),
    }
}
