//! DarkTube CLI - Headless Video Player
//!
//! Features:
//! - Subtitle inspection and conversion (WebVTT / SRT)
//! - Source and quality inspection against a DarkTube backend
//! - Simulated playback sessions with analytics delivery
//! - Chapter extraction from video descriptions

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod offline;
mod output;

/// DarkTube CLI - headless player toolkit
#[derive(Parser)]
#[command(name = "darktube")]
#[command(author = "DarkTube Contributors")]
#[command(version)]
#[command(about = "Headless DarkTube player and subtitle toolkit", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// JSON configuration file ({"player": {...}, "api": {...}})
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend base URL (overrides the configuration file)
    #[arg(long)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a subtitle file and list its cues
    Subtitles {
        /// Path to a .vtt or .srt file
        file: PathBuf,

        /// Subtitle format (vtt, srt); guessed from the extension if omitted
        #[arg(short = 't', long = "type")]
        subtitle_format: Option<String>,

        /// Show only the cue active at this time (seconds)
        #[arg(long)]
        at: Option<f64>,

        /// Print the document converted to this format (vtt, srt)
        #[arg(long)]
        convert: Option<String>,
    },

    /// Show the available qualities of a video
    Inspect {
        /// Video identifier
        video_id: String,

        /// Preferred quality to resolve against the source set
        #[arg(short, long)]
        quality: Option<String>,

        /// Read the source set from a JSON file instead of the backend
        #[arg(long)]
        sources: Option<PathBuf>,
    },

    /// Simulate a playback session
    Play {
        /// Video identifier
        video_id: String,

        /// Preferred quality
        #[arg(short, long)]
        quality: Option<String>,

        /// Start position in seconds
        #[arg(short, long, default_value = "0")]
        start: f64,

        /// Simulated media length in seconds
        #[arg(short, long, default_value = "60")]
        duration: f64,

        /// Seconds of media per simulation step
        #[arg(long, default_value = "1")]
        step: f64,

        /// Switch to this quality halfway through
        #[arg(long)]
        switch_to: Option<String>,

        /// Subtitle language to load and display
        #[arg(long)]
        subtitles: Option<String>,

        /// Read the source set from a JSON file instead of the backend
        #[arg(long)]
        sources: Option<PathBuf>,

        /// Log analytics batches instead of posting them
        #[arg(long)]
        dry_run: bool,
    },

    /// Extract chapter timestamps from a video description
    Chapters {
        /// Description text
        description: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    darktube_core::init();

    let mut settings = config::CliConfig::load(cli.config.as_deref())?;
    if let Some(api_url) = cli.api_url {
        settings.api.base_url = api_url;
    }

    match cli.command {
        Commands::Subtitles { file, subtitle_format, at, convert } => {
            commands::subtitles(&file, subtitle_format.as_deref(), at, convert.as_deref(), &cli.format)?;
        }
        Commands::Inspect { video_id, quality, sources } => {
            commands::inspect(&settings, &video_id, quality.as_deref(), sources.as_deref(), &cli.format)
                .await?;
        }
        Commands::Play {
            video_id,
            quality,
            start,
            duration,
            step,
            switch_to,
            subtitles,
            sources,
            dry_run,
        } => {
            let options = commands::PlayOptions {
                quality,
                start,
                duration,
                step,
                switch_to,
                subtitles,
                sources,
                dry_run,
            };
            commands::play(&settings, &video_id, options, &cli.format).await?;
        }
        Commands::Chapters { description } => {
            commands::chapters(&description, &cli.format)?;
        }
    }

    Ok(())
}
