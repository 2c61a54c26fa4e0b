use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vb_cal_sync::config::DEFAULT_CONFIG_PATH;
use vb_cal_sync::data::{save_results_to_csv, GAMES_CACHE_FILE};
use vb_cal_sync::{
    authenticate, list_upcoming_events, print_upcoming_events, run_sync, AppConfig,
    ReconciliationResult, SyncRequest, SyncStatus,
};

#[derive(Parser)]
#[command(name = "vb-cal")]
#[command(about = "Sync NY Urban volleyball games into Google Calendar")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape the league schedule and create or update calendar events
    Sync {
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Show what would happen without writing to the calendar
        #[arg(long)]
        dry_run: bool,

        /// Skip the team email confirmation prompt
        #[arg(short, long)]
        yes: bool,

        /// Reuse the last scraped schedule if one is cached
        #[arg(long)]
        use_cache: bool,

        /// Write the results to a CSV file
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// List upcoming events in the calendar
    Events {
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
    /// Authenticate with Google and store the token
    Auth {
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Sync {
            config,
            dry_run,
            yes,
            use_cache,
            report,
        } => {
            let config = AppConfig::load(&config)?;
            let request = SyncRequest {
                dry_run,
                confirm: !yes,
                use_cache,
                cache_path: PathBuf::from(GAMES_CACHE_FILE),
            };

            println!("Volleyball Calendar Sync\n");
            if dry_run || !config.flag.create_events {
                println!("Dry run: no events will be written\n");
            }

            let results = run_sync(&config, &request).await?;
            print_summary(&results);

            if let Some(path) = report {
                save_results_to_csv(&results, &path)?;
                println!("\nSaved results to {}", path.display());
            }
        }
        Commands::Events { config } => {
            let config = AppConfig::load(&config)?;
            println!("Upcoming events (next {})\n", config.calendar.max_offset);
            let events = list_upcoming_events(&config).await?;
            print_upcoming_events(&events);
        }
        Commands::Auth { config } => {
            let config = AppConfig::load(&config)?;
            let path = authenticate(&config).await?;
            println!("Saved token to {}", path.display());
        }
    }

    Ok(())
}

fn print_summary(results: &[ReconciliationResult]) {
    let count = |wanted: fn(&SyncStatus) -> bool| results.iter().filter(|r| wanted(&r.status)).count();

    println!("\nSYNC SUMMARY\n");
    println!("Games:     {}", results.len());
    println!("Created:   {}", count(|s| *s == SyncStatus::Created));
    println!("Updated:   {}", count(|s| *s == SyncStatus::Updated));
    println!("Unchanged: {}", count(|s| *s == SyncStatus::Skipped));
    println!("Dry run:   {}", count(|s| *s == SyncStatus::DryRun));

    let failed: Vec<&ReconciliationResult> = results
        .iter()
        .filter(|r| matches!(r.status, SyncStatus::Failed(_)))
        .collect();
    if !failed.is_empty() {
        println!("\nFailed ({}):", failed.len());
        for result in failed {
            println!("  {}", result);
        }
    }
}
