use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use hud_sync::config::Config;
use hud_sync::constants::{state_name, US_STATES};
use hud_sync::feed::{HttpFeed, JsonFileFeed};
use hud_sync::jobs::JobStore;
use hud_sync::logging::init_logging;
use hud_sync::metrics::init_metrics;
use hud_sync::service::SyncService;
use hud_sync::snapshots::SnapshotArchive;
use hud_sync::storage::{CatalogStore, SqliteCatalog};
use hud_sync::{ListingStatus, PassReport, Region, RunOptions};

#[derive(Parser)]
#[command(name = "hud_sync")]
#[command(about = "Keeps a catalog of HUD home listings in step with scraped snapshots")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile a scraper JSON export against the catalog
    Import {
        /// Path to the JSON file
        #[arg(long)]
        json: PathBuf,
        /// Region code; detected from the first listing if omitted
        #[arg(long)]
        state: Option<String>,
        /// Show what would change without writing
        #[arg(long)]
        dry_run: bool,
        /// Allow an empty file to mark every AVAILABLE listing UNDER_CONTRACT
        #[arg(long)]
        confirm_empty: bool,
    },
    /// Fetch snapshots from the listing feed, review and commit them
    Sync {
        /// Region codes to sync (repeatable)
        #[arg(long = "state", required = true)]
        states: Vec<String>,
        /// Commit without asking for confirmation
        #[arg(long)]
        no_review: bool,
        /// Preview only
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        confirm_empty: bool,
    },
    /// Reconcile the current archived snapshot of a region again
    Replay {
        #[arg(long)]
        state: String,
        #[arg(long)]
        dry_run: bool,
    },
    /// List catalog rows for a region
    Show {
        #[arg(long)]
        state: String,
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
    },
    /// List known region codes
    Regions,
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    Available,
    UnderContract,
}

impl From<StatusArg> for ListingStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Available => ListingStatus::Available,
            StatusArg::UnderContract => ListingStatus::UnderContract,
        }
    }
}

fn open_service(config: &Config) -> anyhow::Result<SyncService> {
    let store: Arc<dyn CatalogStore> = Arc::new(
        SqliteCatalog::open(&config.catalog.db_path)
            .with_context(|| format!("opening catalog {}", config.catalog.db_path.display()))?,
    );
    let archive = Arc::new(
        SnapshotArchive::open(&config.snapshots.dir)
            .with_context(|| format!("opening snapshot archive {}", config.snapshots.dir.display()))?,
    );
    let jobs = JobStore::new(
        Duration::from_secs(config.jobs.ttl_seconds),
        config.jobs.max_entries,
    );
    Ok(SyncService::new(store, archive, jobs))
}

fn print_report(report: &PassReport) {
    let stats = &report.stats;
    let label = state_name(report.region.as_str()).unwrap_or("unknown");
    println!("\n📊 Results for {} ({}):", report.region, label);
    println!("   Total observed: {}", stats.total_observed);
    println!("   New: {}", stats.new_count);
    println!("   Updated: {}", stats.updated_count);
    println!("   Restored: {}", stats.restored_count);
    println!("   Marked under contract: {}", stats.marked_under_contract_count);
    println!("   Errors: {}", stats.error_count);
    println!("   Duration: {} ms", report.duration_ms);

    if !report.failed_writes.is_empty() {
        println!("\n⚠️  Failed writes:");
        for failed in &report.failed_writes {
            println!("   - {}: {}", failed.case_number, failed.error);
        }
    }
    if report.dry_run {
        println!("\n🔍 DRY RUN - no changes were written");
    }
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{prompt} (yes/no): ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

async fn sync_states(
    service: &SyncService,
    config: &Config,
    states: &[String],
    no_review: bool,
    dry_run: bool,
    confirm_empty: bool,
) -> anyhow::Result<()> {
    let feed = HttpFeed::new(&config.feed)?;
    let mut summary: Vec<(String, Result<PassReport, String>)> = Vec::new();

    for code in states {
        let region = match Region::parse(code) {
            Ok(region) => region,
            Err(e) => {
                println!("⚠️  {e}");
                summary.push((code.clone(), Err(e.to_string())));
                continue;
            }
        };

        println!("\n🔄 Fetching listings for {}...", region);
        let job = match service.stage(&region, &feed).await {
            Ok(job) => job,
            Err(e) => {
                error!("Failed to stage {}: {}", region, e);
                println!("❌ Fetch failed for {}: {}", region, e);
                summary.push((region.to_string(), Err(e.to_string())));
                continue;
            }
        };
        println!(
            "   Staged job {} ({} listings, {} rejected)",
            job.job_id,
            job.observed.len(),
            job.rejected_count()
        );
        println!(
            "   New listings: {}, price reduced: {}",
            job.highlights.new_listings, job.highlights.price_reduced
        );

        let preview = match service.preview(&job.job_id).await {
            Ok(preview) => preview,
            Err(e) => {
                error!("Preview for {} failed: {}", region, e);
                println!("❌ Preview failed for {}: {}", region, e);
                summary.push((region.to_string(), Err(e.to_string())));
                continue;
            }
        };
        print_report(&preview);

        if dry_run {
            summary.push((region.to_string(), Ok(preview)));
            continue;
        }
        if !no_review && !confirm(&format!("\nApply these changes to {}?", region))? {
            println!("⏭️  Skipped {}", region);
            info!("Import for {} declined at review", region);
            continue;
        }

        match service.commit(&job.job_id, confirm_empty).await {
            Ok(report) => {
                println!("✅ Committed {}", region);
                summary.push((region.to_string(), Ok(report)));
            }
            Err(e) => {
                error!("Commit for {} failed: {}", region, e);
                println!("❌ Commit failed for {}: {}", region, e);
                summary.push((region.to_string(), Err(e.to_string())));
            }
        }
    }

    println!("\n📋 Sync summary:");
    for (region, outcome) in &summary {
        match outcome {
            Ok(report) => println!(
                "   {}: {} new, {} updated, {} restored, {} under contract, {} errors{}",
                region,
                report.stats.new_count,
                report.stats.updated_count,
                report.stats.restored_count,
                report.stats.marked_under_contract_count,
                report.stats.error_count,
                if report.dry_run { " (dry run)" } else { "" }
            ),
            Err(e) => println!("   {}: failed ({})", region, e),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::load()?;
    let _log_guard = init_logging(&config.logging.dir);
    init_metrics(config.metrics.listen_addr.as_deref());

    match cli.command {
        Commands::Import {
            json,
            state,
            dry_run,
            confirm_empty,
        } => {
            let service = open_service(&config)?;
            let feed = JsonFileFeed::new(json);
            let region = match state {
                Some(code) => Region::parse(&code)?,
                None => {
                    let region = feed.detect_region().await?;
                    info!("Detected region {} from {}", region, feed.path().display());
                    region
                }
            };
            println!("📥 Importing {} for {}...", feed.path().display(), region);
            let report = service
                .sync_region(&region, &feed, RunOptions { dry_run, confirm_empty })
                .await?;
            print_report(&report);
        }
        Commands::Sync {
            states,
            no_review,
            dry_run,
            confirm_empty,
        } => {
            let service = open_service(&config)?;
            sync_states(&service, &config, &states, no_review, dry_run, confirm_empty).await?;
        }
        Commands::Replay { state, dry_run } => {
            let service = open_service(&config)?;
            let region = Region::parse(&state)?;
            match service.archive().current(&region)? {
                Some(generation) => println!(
                    "🔁 Replaying generation {} ({} listings, captured {})",
                    generation.generation_id, generation.listing_count, generation.captured_at
                ),
                None => warn!("No archived snapshot for {}", region),
            }
            let report = service
                .replay(
                    &region,
                    RunOptions {
                        dry_run,
                        confirm_empty: false,
                    },
                )
                .await?;
            print_report(&report);
        }
        Commands::Show { state, status } => {
            let service = open_service(&config)?;
            let region = Region::parse(&state)?;
            let rows = service.listings(&region, status.map(Into::into)).await?;
            println!("🏠 {} listings in {}:", rows.len(), region);
            for row in rows {
                println!(
                    "   {:<14} {:<15} ${:>11.0} {}bd/{}ba  {}, {}",
                    row.case_number, row.status.as_str(), row.price, row.beds, row.baths, row.address, row.city
                );
            }
        }
        Commands::Regions => {
            for (code, name) in US_STATES {
                println!("{code}  {name}");
            }
        }
    }
    Ok(())
}
