mod crawl;
mod discover;
mod report;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::crawl::CrawlCommands;
use crate::discover::DiscoverCommands;
use crate::report::ReportCommands;

#[derive(Debug, Parser)]
#[command(name = "mentions")]
#[command(about = "Tracks product mentions in messaging channels")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Crawl tracked channels for product mentions
    Crawl {
        #[command(subcommand)]
        command: CrawlCommands,
    },
    /// Find new channels to track
    Discover {
        #[command(subcommand)]
        command: DiscoverCommands,
    },
    /// Print stored mentions
    Report {
        #[command(subcommand)]
        command: ReportCommands,
    },
    /// Show recent crawl runs
    Runs {
        /// Maximum number of runs to show
        #[arg(long, default_value = "20")]
        limit: i64,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check the database connection
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("mentions: no command given, see --help");
        return Ok(());
    };

    let config = mentions_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = mentions_db::PoolConfig::from_app_config(&config);
    let pool = mentions_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Db {
            command: DbCommands::Ping,
        } => {
            mentions_db::ping(&pool).await?;
            println!("database connection ok");
        }
        Commands::Db {
            command: DbCommands::Migrate,
        } => {
            let applied = mentions_db::run_migrations(&pool).await?;
            println!("applied {applied} migrations");
        }
        Commands::Crawl { command } => {
            mentions_db::run_migrations(&pool).await?;
            crawl::run(&pool, &config, command).await?;
        }
        Commands::Discover { command } => {
            mentions_db::run_migrations(&pool).await?;
            discover::run(&pool, &config, command).await?;
        }
        Commands::Report { command } => report::run_report(&pool, command).await?,
        Commands::Runs { limit } => report::run_list_runs(&pool, limit).await?,
    }

    Ok(())
}

/// Attempt to mark a crawl run as failed, logging any secondary error.
pub(crate) async fn fail_run_best_effort(
    pool: &sqlx::PgPool,
    run_id: i64,
    kind: mentions_db::CrawlKind,
    message: String,
) {
    if let Err(mark_err) = mentions_db::fail_crawl_run(pool, run_id, &message).await {
        tracing::error!(
            run_id,
            error = %mark_err,
            "failed to mark {} run as failed",
            kind.as_str()
        );
    }
}
