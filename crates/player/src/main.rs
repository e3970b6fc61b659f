//! `pov-player` -- inspect, import and play `.pov` scenario documents.
//!
//! # Environment variables
//!
//! See [`PlayerConfig::from_env`] for the full table. `RUST_LOG` sets the
//! log filter and `LOG_FORMAT=json` switches logs to JSON. Logs go to
//! stderr; command output goes to stdout.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use pov_assets::{AssetFilter, AssetKind};
use pov_playback::PlaybackEngine;
use pov_player::commands;
use pov_player::session::Session;
use pov_player::{LogFormat, PlayerConfig, PlayerError};
use serde::Serialize;
use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "pov-player", version, about = "Branching scenario player")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Summarise a scenario document without importing it.
    Inspect { file: PathBuf },
    /// Play a scenario interactively on stdin/stdout.
    Play { file: PathBuf },
    /// Import a scenario's bundled media into the asset library.
    Import { file: PathBuf },
    /// Re-export a scenario under a new title, dropping unused media.
    Repack {
        file: PathBuf,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        /// Fail unless the scenario has exactly one entry node.
        #[arg(long)]
        strict: bool,
    },
    /// Manage the asset library.
    #[command(subcommand)]
    Assets(AssetsCommand),
}

#[derive(Debug, Subcommand)]
enum AssetsCommand {
    List {
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        search: Option<String>,
    },
    Add {
        file: PathBuf,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        mime: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    Usage,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Image,
    Video,
    Audio,
}

impl From<KindArg> for AssetKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Image => AssetKind::Image,
            KindArg::Video => AssetKind::Video,
            KindArg::Audio => AssetKind::Audio,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let config = PlayerConfig::from_env();
    init_tracing(config.log_format);

    let cli = Cli::parse();
    match run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "pov_player=info,pov_playback=info,pov_codec=info,pov_assets=info".into()
    });
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

fn print<T: Serialize>(value: &T) -> Result<(), PlayerError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(command: Command, config: &PlayerConfig) -> Result<(), PlayerError> {
    match command {
        Command::Inspect { file } => {
            let document = pov_codec::read_file(&file).await?;
            print(&commands::inspect(&document)?)
        }
        Command::Play { file } => play(config, file).await,
        Command::Import { file } => {
            let library = commands::open_library(config);
            print(&commands::import(library, &file).await?)
        }
        Command::Repack {
            file,
            title,
            out_dir,
            strict,
        } => print(&commands::repack(config, &file, &title, &out_dir, strict).await?),
        Command::Assets(command) => assets(config, command).await,
    }
}

async fn assets(config: &PlayerConfig, command: AssetsCommand) -> Result<(), PlayerError> {
    let library = commands::open_library(config);
    match command {
        AssetsCommand::List { kind, tags, search } => {
            let filter = AssetFilter {
                kind: kind.map(Into::into),
                tags,
                search,
            };
            print(&commands::list_assets(&library, &filter).await?)
        }
        AssetsCommand::Add {
            file,
            name,
            mime,
            tags,
        } => print(&commands::add_asset(&library, &file, name, mime, tags).await?),
        AssetsCommand::Delete { ids } => print(&commands::delete_assets(&library, &ids).await?),
        AssetsCommand::Usage => print(&commands::usage(&library).await?),
    }
}

/// Import into a scratch store so playing never writes to the library.
async fn play(config: &PlayerConfig, file: PathBuf) -> Result<(), PlayerError> {
    let assets = commands::scratch_library(config);
    let document = pov_codec::read_file(&file).await?;
    let imported = pov_codec::ScenarioCodec::new(Arc::clone(&assets))
        .import(document)
        .await?;
    for warning in &imported.warnings {
        tracing::warn!(%warning, "Import warning");
    }

    let graph = Arc::new(imported.graph);
    let engine = PlaybackEngine::new(Arc::clone(&graph), assets, config.playback());
    let session = Session::start(&engine, graph, std::io::stdout())?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    session
        .run(BufReader::new(tokio::io::stdin()), shutdown)
        .await?;
    Ok(())
}
