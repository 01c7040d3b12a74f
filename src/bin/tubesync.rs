#![forbid(unsafe_code)]

//! Command-line entry point: syncs a channel into the document store, resets
//! the store, or prints per-collection document counts.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tubesync::config::{SyncOverrides, SyncSettings, resolve_settings};
use tubesync::platform::{ChatKind, DataApiClient, YouTubeClient, YtDlp};
use tubesync::store::{Collection, DocumentStore};
use tubesync::sync::{self, RunReport, Stage, StageReport};

#[derive(Debug, Parser)]
#[command(name = "tubesync", version, about = "Incremental YouTube channel sync")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args, Default)]
struct StoreArgs {
    /// Database file (overrides DATABASE_PATH).
    #[arg(long)]
    database: Option<PathBuf>,
    /// Env file to read settings from.
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Sync channel info, videos, comments, transcriptions and chats.
    Sync {
        #[command(flatten)]
        store: StoreArgs,
        #[arg(long)]
        channel_url: Option<String>,
        /// Only sync children of videos published at or after this ISO-8601 time.
        #[arg(long)]
        since: Option<String>,
        /// Subtitle language code.
        #[arg(long)]
        language: Option<String>,
        #[arg(long)]
        transcriptions_dir: Option<PathBuf>,
        /// Leave a per-video stage out of the run (repeatable).
        #[arg(long, value_enum)]
        skip: Vec<Stage>,
    },
    /// Drop and recreate every collection.
    Reset {
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Print the document count of every collection.
    Stats {
        #[command(flatten)]
        store: StoreArgs,
    },
}

fn settings_for(store: StoreArgs, overrides: SyncOverrides) -> Result<SyncSettings> {
    resolve_settings(SyncOverrides {
        database_path: store.database,
        env_path: store.env_file,
        ..overrides
    })
}

async fn open_store(settings: &SyncSettings) -> Result<DocumentStore> {
    DocumentStore::open(&settings.database_path)
        .await
        .with_context(|| format!("opening {}", settings.database_path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Commands::Sync {
            store,
            channel_url,
            since,
            language,
            transcriptions_dir,
            skip,
        } => {
            let settings = settings_for(
                store,
                SyncOverrides {
                    channel_url,
                    since,
                    language,
                    transcription_dir: transcriptions_dir,
                    ..SyncOverrides::default()
                },
            )?;
            run_sync(&settings, skip).await
        }
        Commands::Reset { store } => {
            let settings = settings_for(store, SyncOverrides::default())?;
            let store = open_store(&settings).await?;
            store.reset().await.context("resetting document store")?;
            println!(
                "Reset {} collection(s) in {}",
                Collection::ALL.len(),
                settings.database_path.display()
            );
            Ok(())
        }
        Commands::Stats { store } => {
            let settings = settings_for(store, SyncOverrides::default())?;
            let store = open_store(&settings).await?;
            println!("Database: {}", settings.database_path.display());
            for collection in Collection::ALL {
                let count = store.count(collection).await?;
                println!("  {:<15} {}", collection.name(), count);
            }
            Ok(())
        }
    }
}

async fn run_sync(settings: &SyncSettings, skip: Vec<Stage>) -> Result<()> {
    let options = settings.sync_options(skip)?;
    let api_keys = settings.require_api_keys()?;
    let store = open_store(settings).await?;

    let ytdlp = YtDlp::locate(&settings.yt_dlp_path, settings.chat_dir());
    let client = YouTubeClient::new(DataApiClient::new(api_keys), ytdlp);

    println!("===================================");
    println!("Channel: {}", options.channel_url);
    println!("Database: {}", settings.database_path.display());
    if let Some(since) = &options.since {
        println!("Since: {since}");
    }
    println!("===================================");

    let report = sync::run(&client, &store, &options)
        .await
        .with_context(|| format!("syncing {}", options.channel_url))?;
    print_report(&report);
    Ok(())
}

fn print_stage(label: &str, report: Option<&StageReport>) {
    let Some(report) = report else {
        println!("{label:<15} skipped");
        return;
    };
    println!("{label:<15} {report}");
    for failure in &report.failures {
        println!("  - {failure}");
    }
}

fn print_report(report: &RunReport) {
    println!();
    println!("Channel id: {}", report.channel.channel_id);
    println!(
        "Videos: {} listed, {} in scope",
        report.videos_seen,
        report.video_ids.len()
    );
    print_stage("Comments", report.comments.as_ref());
    print_stage("Transcriptions", report.transcriptions.as_ref());
    match &report.chat {
        Some(chat) => {
            for kind in ChatKind::ALL {
                if chat.unsupported.contains(&kind) {
                    println!("{:<15} not supported by client", kind.label());
                } else {
                    print_stage(kind.label(), Some(chat.stage(kind)));
                }
            }
        }
        None => print_stage("Chat", None),
    }
    println!();
    println!("Sync complete ({} per-video failure(s))", report.failure_count());
}
