mod run;

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use sizewatch_core::{AppConfig, InvalidationPolicy, SourceConfig};
use tracing_subscriber::EnvFilter;

use crate::run::{run_targets, select_targets, RunOptions};

#[derive(Debug, Parser)]
#[command(name = "sizewatch")]
#[command(about = "Cheapest-per-size marketplace price tracker")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Refresh per-size prices for every catalog product flagged for update
    Run {
        /// Source code to search (defaults to the first configured source)
        #[arg(long)]
        source: Option<String>,
        /// Only process this catalog id
        #[arg(long)]
        product: Option<String>,
        /// Compute and print the write plan without touching the store
        #[arg(long)]
        dry_run: bool,
        /// Delete the targeted products' rows and write only the sizes found
        #[arg(long)]
        rebuild: bool,
        /// Leave sizes that were not found untouched instead of zeroing them
        #[arg(long)]
        keep_missing: bool,
    },
    /// Database maintenance commands
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// List configured marketplace sources
    Sources,
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check that the database is reachable
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(sizewatch_core::log_level_from_env()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match command {
        Commands::Run {
            source,
            product,
            dry_run,
            rebuild,
            keep_missing,
        } => {
            let config = sizewatch_core::load_app_config_from_env()?;
            let options = RunOptions {
                dry_run,
                rebuild,
                policy: if keep_missing {
                    InvalidationPolicy::KeepOnlyFound
                } else {
                    config.invalidation
                },
                cooldown: Duration::from_millis(config.keyword_cooldown_ms),
            };
            run_command(&config, source.as_deref(), product.as_deref(), &options).await?;
        }
        Commands::Db { command } => {
            let config = sizewatch_core::load_app_config_from_env()?;
            let pool_config = sizewatch_db::PoolConfig::from_app_config(&config);
            let pool = sizewatch_db::connect_pool(&config.database_url, pool_config).await?;
            match command {
                DbCommands::Ping => {
                    sizewatch_db::ping(&pool).await?;
                    println!("database reachable");
                }
                DbCommands::Migrate => {
                    let applied = sizewatch_db::run_migrations(&pool).await?;
                    println!("applied {applied} migration(s)");
                }
            }
        }
        Commands::Sources => {
            let path = sizewatch_core::sources_path_from_env();
            for source in configured_sources(path.as_deref())? {
                let mode = match source.mode {
                    sizewatch_core::SearchMode::Candidates => "candidates",
                    sizewatch_core::SearchMode::SizeFacet => "size-facet",
                };
                println!("{:<4} {:<20} {:<11} {}", source.code, source.name, mode, source.base_url);
            }
        }
    }

    Ok(())
}

async fn run_command(
    config: &AppConfig,
    source_code: Option<&str>,
    product: Option<&str>,
    options: &RunOptions,
) -> anyhow::Result<()> {
    let catalog = sizewatch_core::load_catalog(&config.catalog_path)
        .with_context(|| format!("failed to load catalog {}", config.catalog_path.display()))?;
    let targets = select_targets(&catalog, product)?;
    if targets.is_empty() {
        println!("no catalog products are flagged for update");
        return Ok(());
    }

    let sources = configured_sources(config.sources_path.as_deref())?;
    let source = select_source(&sources, source_code)?;

    let fetcher = sizewatch_scraper::HttpPageFetcher::new(
        config.fetch_timeout_secs,
        &config.user_agent,
    )
    .map_err(|e| anyhow::anyhow!("failed to build page fetcher: {e}"))?
    .with_scroll_param(source.scroll_page_param.clone());

    let pool_config = sizewatch_db::PoolConfig::from_app_config(config);
    let pool = sizewatch_db::connect_pool(&config.database_url, pool_config).await?;
    sizewatch_db::run_migrations(&pool).await?;
    let mut store = sizewatch_db::PgRowStore::new(pool);

    let settings = sizewatch_scraper::FetchSettings::from_app_config(config);
    let summary = run_targets(&fetcher, &mut store, source, &settings, &targets, options).await?;
    summary.print(options.dry_run);
    Ok(())
}

/// Sources from `path`, or the built-in presets when no file is configured.
fn configured_sources(path: Option<&Path>) -> anyhow::Result<Vec<SourceConfig>> {
    match path {
        Some(path) => sizewatch_core::load_sources(path)
            .with_context(|| format!("failed to load sources {}", path.display())),
        None => Ok(sizewatch_core::builtin_sources()),
    }
}

fn select_source<'a>(
    sources: &'a [SourceConfig],
    code: Option<&str>,
) -> anyhow::Result<&'a SourceConfig> {
    match code {
        Some(code) => sources
            .iter()
            .find(|s| s.code.eq_ignore_ascii_case(code))
            .ok_or_else(|| {
                let known: Vec<&str> = sources.iter().map(|s| s.code.as_str()).collect();
                anyhow::anyhow!("unknown source '{code}' (known: {})", known.join(", "))
            }),
        None => sources
            .first()
            .ok_or_else(|| anyhow::anyhow!("no sources are configured")),
    }
}
