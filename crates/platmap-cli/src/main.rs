//! platmap CLI
//!
//! Command-line interface for platform line-association analysis.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use platmap_analysis::{Analysis, Analyzer, SetMap};
use platmap_core::config::Config;
use platmap_core::{Diagnostic, Granularity, LineMetric};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "platmap")]
#[command(author, version, about = "Which source lines does each platform use?", long_about = None)]
struct Cli {
    /// Analysis configuration (YAML, or JSON by extension)
    #[arg(short, long, global = true, default_value = "platmap.yaml")]
    config: PathBuf,

    /// Override the configured source root
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Worker threads
    #[arg(short, long, global = true)]
    jobs: Option<usize>,

    /// Line counting mode
    #[arg(long, global = true, value_enum)]
    count: Option<CountArg>,

    /// Report every (platform, pass) context as its own member
    #[arg(long, global = true)]
    by_pass: bool,

    /// Debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the set map, summary statistics and clustering
    Report {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,

        /// Cluster only these members (repeatable; default: all)
        #[arg(short, long = "platform", value_name = "NAME")]
        platforms: Vec<String>,
    },

    /// Dump one file's conditional tree with the contexts of each leaf
    Tree {
        /// Source file, absolute or relative to the root
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Export the lines used by at least one context
    Coverage {
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum CountArg {
    Lines,
    Sloc,
}

impl From<CountArg> for LineMetric {
    fn from(arg: CountArg) -> Self {
        match arg {
            CountArg::Lines => LineMetric::Lines,
            CountArg::Sloc => LineMetric::Sloc,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let config = load_config(&cli)?;
    let granularity = if cli.by_pass {
        Granularity::Pass
    } else {
        Granularity::Platform
    };

    let analysis = Analyzer::new(config)?.run()?;
    analysis.diagnostics.log();

    match &cli.command {
        Commands::Report { format, platforms } => {
            cmd_report(&analysis, granularity, *format, platforms)?
        }
        Commands::Tree { file } => cmd_tree(&analysis, file)?,
        Commands::Coverage { output } => cmd_coverage(&analysis, output.as_deref())?,
    }

    Ok(())
}

/// `RUST_LOG` wins; otherwise `-v`/`-q` pick the level. Logs go to stderr.
fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::from_path(&cli.config)
        .with_context(|| format!("failed to load configuration {}", cli.config.display()))?;

    if let Some(root) = &cli.root {
        config.root = root.clone();
    }
    if cli.jobs.is_some() {
        config.jobs = cli.jobs;
    }
    if let Some(count) = cli.count {
        config.count = count.into();
    }
    config.validate()?;

    info!(
        "Analyzing {} for platforms {:?}",
        config.root.display(),
        config.platform_names()
    );
    Ok(config)
}

#[derive(Serialize)]
struct Report<'a> {
    members: &'a [String],
    setmap: &'a SetMap,
    summary: platmap_analysis::Summary,
    dendrogram: Option<platmap_analysis::Dendrogram>,
    diagnostics: Vec<&'a Diagnostic>,
}

fn cmd_report(
    analysis: &Analysis,
    granularity: Granularity,
    format: Format,
    platforms: &[String],
) -> Result<()> {
    let setmap = analysis.setmap(granularity);
    let summary = analysis.summary(granularity);
    let subset = (!platforms.is_empty()).then_some(platforms);
    let dendrogram = analysis.dendrogram(granularity, subset)?;

    if let Format::Json = format {
        let report = Report {
            members: setmap.members(),
            setmap: &setmap,
            summary,
            dendrogram,
            diagnostics: analysis.diagnostics.iter().collect(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let total = setmap.total();
    let percent = |lines: u64| {
        if total == 0 {
            0.0
        } else {
            100.0 * lines as f64 / total as f64
        }
    };

    println!("📊 Set map ({} files)", analysis.files.len());
    let mut entries: Vec<_> = setmap.iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    for (set, lines) in entries {
        let names = setmap.names(set);
        let label = if names.is_empty() {
            "(unused)".to_string()
        } else {
            format!("[{}]", names.join(", "))
        };
        println!("  {:<40} {:>10} {:>6.2}%", label, lines, percent(lines));
    }

    println!();
    println!("📈 Summary");
    println!("  Total:          {:>10}", summary.total);
    println!("  Unused:         {:>10} {:>6.2}%", summary.unused, percent(summary.unused));
    println!("  Unique:         {:>10} {:>6.2}%", summary.unique, percent(summary.unique));
    println!(
        "  Shared by all:  {:>10} {:>6.2}%",
        summary.shared_by_all,
        percent(summary.shared_by_all)
    );
    for member in &summary.members {
        println!(
            "  {:<15} {:>10} lines, {} unique",
            format!("{}:", member.name),
            member.lines,
            member.unique
        );
    }
    match summary.divergence {
        Some(divergence) => println!("  Divergence:     {:>10.3}", divergence),
        None => println!("  Divergence:            n/a"),
    }
    println!("  Coverage:       {:>9.2}%", summary.coverage * 100.0);

    if let Some(dendrogram) = dendrogram {
        println!();
        println!("🌳 Clustering");
        for line in dendrogram.render().lines() {
            println!("  {}", line);
        }
    }

    if !analysis.diagnostics.is_empty() {
        println!();
        println!("⚠️  {} warnings", analysis.diagnostics.len());
        for diagnostic in analysis.diagnostics.iter() {
            println!("  {}", diagnostic);
        }
    }

    Ok(())
}

fn cmd_tree(analysis: &Analysis, file: &Path) -> Result<()> {
    let Some(result) = analysis.file(file) else {
        bail!("{} was not analyzed", file.display());
    };
    println!("{}", serde_json::to_string_pretty(&analysis.tree_dump(result))?);
    Ok(())
}

fn cmd_coverage(analysis: &Analysis, output: Option<&Path>) -> Result<()> {
    let coverage = analysis.coverage();
    let json = serde_json::to_string_pretty(&coverage)?;

    if let Some(out_path) = output {
        std::fs::write(out_path, &json)
            .with_context(|| format!("failed to write {}", out_path.display()))?;
        info!("Coverage for {} files written to {}", coverage.len(), out_path.display());
    } else {
        println!("{}", json);
    }

    Ok(())
}
