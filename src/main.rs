mod config;
mod dom;
mod error;
mod fetch;
mod orchestrator;
mod output;
mod parser;
mod pipeline;
mod region;
mod resolve;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context};
use chrono::Local;
use clap::{Parser, Subcommand};

use config::{CachePolicy, RunConfig};
use fetch::CachedFetcher;
use orchestrator::{RegionOutcome, RunSummary};
use output::{Artifact, CsvSink};
use parser::candidates::Candidate;
use pipeline::Services;
use region::Region;
use resolve::{DnsResolver, HostResolver};

#[derive(Parser)]
#[command(name = "edumap", about = "Wikipedia college listings to per-state CSV tables")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape regions and write one CSV per region
    Run {
        /// Region abbreviations, comma separated (e.g. NC,SC)
        #[arg(short, long, value_delimiter = ',', required_unless_present = "all")]
        regions: Vec<String>,
        /// Every state in the built-in table
        #[arg(long, conflicts_with = "regions")]
        all: bool,
        /// Where documents come from
        #[arg(long, value_enum, default_value_t = CachePolicy::PreferCache)]
        cache: CachePolicy,
        /// Don't store fetched documents in the cache
        #[arg(long)]
        no_write_docs: bool,
        /// Skip website address lookups
        #[arg(long)]
        no_ip: bool,
        /// Intermediate artifacts to dump, comma separated
        #[arg(long, value_enum, value_delimiter = ',')]
        dump: Vec<Artifact>,
        /// Also merge each dumped folder into one (ALL).txt
        #[arg(long, requires = "dump")]
        combine: bool,
        #[arg(long, default_value = "data/cache")]
        cache_dir: PathBuf,
        #[arg(short, long, default_value = "data/out")]
        out: PathBuf,
        /// Max regions in flight
        #[arg(short = 'j', long, default_value_t = config::MAX_WORKERS)]
        workers: usize,
        /// Wait budget per region, in seconds
        #[arg(long, default_value_t = config::SECONDS_PER_REGION)]
        region_timeout: u64,
    },
    /// List known regions
    Regions,
    /// Parse a saved detail page and print the resulting record
    Inspect {
        file: PathBuf,
        #[arg(short, long, default_value = "NC")]
        region: String,
        /// Entity name (default: file stem)
        #[arg(short, long)]
        name: Option<String>,
        /// Look up the website's address
        #[arg(long)]
        resolve: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            regions,
            all,
            cache,
            no_write_docs,
            no_ip,
            dump,
            combine,
            cache_dir,
            out,
            workers,
            region_timeout,
        } => {
            let regions = if all {
                Region::all()
            } else {
                lookup_regions(&regions)?
            };
            let config = RunConfig {
                cache_policy: cache,
                write_docs: !no_write_docs,
                resolve_ips: !no_ip,
                dump: dump.into_iter().collect(),
                combine_dumps: combine,
                cache_dir,
                output_dir: out,
                max_workers: workers.max(1),
                seconds_per_region: region_timeout,
                ..Default::default()
            };
            run(regions, config).await
        }
        Commands::Regions => {
            for r in Region::all() {
                println!("{}  {}", r.abbr, r.name);
            }
            Ok(())
        }
        Commands::Inspect {
            file,
            region,
            name,
            resolve,
        } => inspect(&file, &region, name, resolve).await,
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn lookup_regions(abbrs: &[String]) -> anyhow::Result<Vec<Region>> {
    let mut regions = Vec::with_capacity(abbrs.len());
    for abbr in abbrs {
        match Region::lookup(abbr) {
            Some(r) if !regions.contains(&r) => regions.push(r),
            Some(_) => {}
            None => bail!("Unknown region '{}'. Run 'edumap regions' for the list.", abbr),
        }
    }
    Ok(regions)
}

async fn run(regions: Vec<Region>, config: RunConfig) -> anyhow::Result<()> {
    let started = Local::now();
    let clock = Instant::now();

    let resolver: Option<Arc<dyn HostResolver>> = if config.resolve_ips {
        Some(Arc::new(DnsResolver::new(config.dns_timeout)))
    } else {
        None
    };
    let services = Services {
        source: Arc::new(CachedFetcher::new(&config)?),
        resolver,
        sink: Arc::new(CsvSink::new(config.output_dir.clone())),
    };
    let output_dir = config.output_dir.clone();

    println!("Extracting {} region(s)...", regions.len());
    let outcomes = match orchestrator::run_extraction(regions, Arc::new(config), services).await {
        Ok(outcomes) => outcomes,
        Err(e) => {
            eprintln!("Aborted: {}", e);
            return Err(e.into());
        }
    };

    print_outcomes(&outcomes);
    let summary = RunSummary::new(started, clock, &outcomes);
    let path = output::write_summary(&output_dir, &summary)?;
    println!("Summary: {}", path.display());
    Ok(())
}

fn print_outcomes(outcomes: &[RegionOutcome]) {
    println!(
        "{:<4} | {:<16} | {:>10} | {:>7} | {:>7} | {:>5}",
        "", "Region", "Candidates", "Records", "Dropped", "Rows"
    );
    println!("{}", "-".repeat(64));

    let mut failed = 0usize;
    for outcome in outcomes {
        match outcome {
            RegionOutcome::Completed(report) => {
                let s = &report.stats;
                println!(
                    "{:<4} | {:<16} | {:>10} | {:>7} | {:>7} | {:>5}",
                    report.region.abbr,
                    truncate(&report.region.name, 16),
                    s.candidates,
                    s.records,
                    s.dropped(),
                    s.rows
                );
            }
            RegionOutcome::Failed { region, error } => {
                failed += 1;
                println!("{:<4} | {:<16} | failed: {}", region.abbr, truncate(&region.name, 16), error);
            }
        }
    }

    println!(
        "\n{} region(s): {} completed, {} failed",
        outcomes.len(),
        outcomes.len() - failed,
        failed
    );
}

async fn inspect(
    file: &std::path::Path,
    region: &str,
    name: Option<String>,
    resolve: bool,
) -> anyhow::Result<()> {
    let region = Region::lookup(region).with_context(|| format!("Unknown region '{}'", region))?;
    let html = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let name = name.unwrap_or_else(|| {
        file.file_stem()
            .map(|s| s.to_string_lossy().replace('_', " "))
            .unwrap_or_default()
    });

    let doc = dom::Document::parse(&html);
    let candidate = Candidate {
        name,
        link: file.display().to_string(),
    };
    let resolver = DnsResolver::new(std::time::Duration::from_secs(config::DNS_TIMEOUT_SECS));
    let resolver: Option<&dyn HostResolver> = if resolve { Some(&resolver) } else { None };

    let record = parser::record::build(&candidate, &region, Some(&doc), resolver).await?;
    println!("{}", record.describe());
    if !record.is_valid() {
        println!("\n(not located in {}; excluded from output)", region);
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
