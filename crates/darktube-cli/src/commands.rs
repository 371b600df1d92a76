//! CLI command implementations

use crate::config::CliConfig;
use crate::offline::{FileVideoApi, LoggingTransport};
use crate::output::{print_json, OutputFormat};
use anyhow::{bail, Context};
use darktube_core::format::{format_duration, format_quality, parse_description_timestamps};
use darktube_core::{
    parse_subtitles, to_srt, to_webvtt, AnalyticsTransport, HttpAnalyticsTransport, HttpVideoApi,
    LoadStatus, MediaEvent, PlayerCallbacks, PlayerController, PlayerServices, PlayerState,
    SimulatedMediaElement, SubtitleFormat, SubtitleSegment, SubtitleTrack, VideoApi,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Parse a subtitle file, then list, look up, or convert its cues
pub fn subtitles(
    file: &Path,
    subtitle_format: Option<&str>,
    at: Option<f64>,
    convert: Option<&str>,
    format: &str,
) -> anyhow::Result<()> {
    let input_format = match subtitle_format {
        Some(name) => parse_format(name)?,
        None => file
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(SubtitleFormat::from_extension)
            .with_context(|| format!("cannot guess subtitle format of {}", file.display()))?,
    };

    let content = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let segments = parse_subtitles(&content, input_format);
    info!(file = %file.display(), format = %input_format, cues = segments.len(), "Parsed subtitles");

    if let Some(target) = convert {
        let rendered = match parse_format(target)? {
            SubtitleFormat::Vtt => to_webvtt(&segments),
            SubtitleFormat::Srt => to_srt(&segments),
        };
        print!("{}", rendered);
        return Ok(());
    }

    if let Some(time) = at {
        let track = SubtitleTrack::new("", segments);
        let active = track.active_at(time);
        match OutputFormat::from(format) {
            OutputFormat::Json => print_json(&active)?,
            OutputFormat::Text => match active {
                Some(segment) => println!("[{}] {}", format_duration(time), segment.text),
                None => println!("[{}] (no caption)", format_duration(time)),
            },
        }
        return Ok(());
    }

    match OutputFormat::from(format) {
        OutputFormat::Json => print_json(&segments)?,
        OutputFormat::Text => {
            println!("{} cues ({})", segments.len(), input_format);
            for (i, segment) in segments.iter().enumerate() {
                println!(
                    "  {:>4}. {} -> {}  {}",
                    i + 1,
                    format_duration(segment.start),
                    format_duration(segment.end),
                    segment.text
                );
            }
        }
    }
    Ok(())
}

fn parse_format(name: &str) -> anyhow::Result<SubtitleFormat> {
    match SubtitleFormat::from_extension(name.trim_start_matches('.')) {
        Some(format) => Ok(format),
        None => bail!("unknown subtitle format '{}' (expected vtt or srt)", name),
    }
}

#[derive(Debug, Serialize)]
struct InspectReport {
    video_id: String,
    qualities: Vec<String>,
    selected: Option<SelectedSource>,
    thumbnails: usize,
}

#[derive(Debug, Serialize)]
struct SelectedSource {
    quality: String,
    url: String,
}

/// Fetch a video's sources and show which one would play
pub async fn inspect(
    settings: &CliConfig,
    video_id: &str,
    quality: Option<&str>,
    sources: Option<&Path>,
    format: &str,
) -> anyhow::Result<()> {
    let api = video_api(settings, sources, None)?;
    let set = api.fetch_sources(video_id).await?;
    let preferred = quality.unwrap_or(&settings.player.preferred_quality);

    let report = InspectReport {
        video_id: video_id.to_string(),
        qualities: set.qualities().into_iter().map(str::to_string).collect(),
        selected: set.select(preferred).map(|(quality, url)| SelectedSource {
            quality: quality.to_string(),
            url: url.to_string(),
        }),
        thumbnails: set.thumbnails.len(),
    };

    match OutputFormat::from(format) {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => {
            println!("Video: {}", report.video_id);
            println!("  Qualities: {}", report.qualities.join(", "));
            match &report.selected {
                Some(selected) => println!(
                    "  Selected ({} requested): {} -> {}",
                    preferred,
                    format_quality(&selected.quality),
                    selected.url
                ),
                None => println!("  Selected ({} requested): none compatible", preferred),
            }
            println!("  Preview thumbnails: {}", report.thumbnails);
        }
    }
    Ok(())
}

/// Options for a simulated playback session
#[derive(Debug, Clone)]
pub struct PlayOptions {
    pub quality: Option<String>,
    pub start: f64,
    pub duration: f64,
    pub step: f64,
    pub switch_to: Option<String>,
    pub subtitles: Option<String>,
    pub sources: Option<PathBuf>,
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
struct PlayReport {
    video_id: String,
    session_id: String,
    quality: String,
    qualities: Vec<String>,
    captions: Vec<SubtitleSegment>,
    events_logged: Option<usize>,
    state: PlayerState,
}

/// Drive a controller against a simulated media element until playback ends
pub async fn play(
    settings: &CliConfig,
    video_id: &str,
    options: PlayOptions,
    format: &str,
) -> anyhow::Result<()> {
    if !(options.step > 0.0) {
        bail!("--step must be positive");
    }

    let api = video_api(settings, options.sources.as_deref(), options.subtitles.as_deref())?;
    let logging = (options.dry_run || options.sources.is_some())
        .then(|| Arc::new(LoggingTransport::default()));
    let transport: Arc<dyn AnalyticsTransport> = match &logging {
        Some(logging) => Arc::clone(logging) as Arc<dyn AnalyticsTransport>,
        None => Arc::new(HttpAnalyticsTransport::new(&settings.api)?),
    };

    let media = SimulatedMediaElement::new(options.duration);
    let callbacks = PlayerCallbacks {
        on_error: Some(Box::new(|e: &darktube_core::Error| {
            error!(code = e.error_code(), error = %e, "Player error");
        })),
        on_ended: Some(Box::new(|| info!("Playback ended"))),
        ..Default::default()
    };
    let mut player = PlayerController::new(
        settings.player.clone(),
        PlayerServices::new(api, transport),
        Box::new(media.clone()),
    )
    .with_callbacks(callbacks);

    match player
        .load_video(video_id, options.quality.as_deref(), options.start)
        .await?
    {
        LoadStatus::Ready { quality } => info!(quality = %quality, "Source attached"),
        LoadStatus::Stale => bail!("load of {} was superseded", video_id),
    }

    if let Some(language) = &options.subtitles {
        match player.load_subtitles(language).await {
            Ok(cues) => {
                info!(language = %language, cues, "Subtitles ready");
                player.toggle_subtitles().await;
            }
            Err(e) => warn!(error = %e, "Continuing without subtitles"),
        }
    }

    let text = OutputFormat::from(format) == OutputFormat::Text;
    let mut captions: Vec<SubtitleSegment> = Vec::new();
    let mut switched = options.switch_to.is_none();
    // Room for the metadata ticks of the initial load and one quality switch
    let max_steps = (options.duration / options.step).ceil() as usize + 4;

    for _ in 0..=max_steps {
        let mut ended = false;
        for event in media.tick(options.step) {
            ended |= matches!(event, MediaEvent::Ended);
            let metadata = matches!(event, MediaEvent::MetadataLoaded { .. });
            player.handle_media_event(event).await;
            if metadata && !player.state().is_playing {
                player.play().await;
            }
        }

        if let Some(error) = &player.state().error {
            bail!("playback failed: {}", error);
        }

        let now = player.state().current_time;
        if let Some(caption) = player.active_subtitle() {
            if captions.last().map(|c| c.text.as_str()) != Some(caption) {
                if text {
                    println!("[{}] {}", format_duration(now), caption);
                }
                captions.push(SubtitleSegment::new(now, now, caption));
            } else if let Some(last) = captions.last_mut() {
                last.end = now;
            }
        }

        if !switched && now >= player.state().duration / 2.0 && player.state().duration > 0.0 {
            if let Some(target) = &options.switch_to {
                if let Err(e) = player.change_quality(target).await {
                    warn!(error = %e, "Quality switch refused");
                }
            }
            switched = true;
        }

        if ended {
            break;
        }
    }

    finish_session(&mut player).await;

    let report = PlayReport {
        video_id: video_id.to_string(),
        session_id: player.session_id().to_string(),
        quality: player.state().quality.clone(),
        qualities: player
            .available_qualities()
            .into_iter()
            .map(str::to_string)
            .collect(),
        captions,
        events_logged: logging.as_ref().map(|l| l.delivered()),
        state: player.state().clone(),
    };

    match OutputFormat::from(format) {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => {
            println!("\nSession {} ({})", report.session_id, report.video_id);
            println!(
                "  Quality: {} of [{}]",
                format_quality(&report.quality),
                report.qualities.join(", ")
            );
            println!(
                "  Position: {} / {} ({:.0}%)",
                format_duration(report.state.current_time),
                format_duration(report.state.duration),
                report.state.progress_percent()
            );
            if let Some(count) = report.events_logged {
                println!("  Analytics events: {}", count);
            }
        }
    }
    Ok(())
}

/// Deliver the queued analytics on the awaited path, then unmount
///
/// The unmount beacon runs on a detached task, which the runtime would drop
/// as soon as the command returns.
async fn finish_session(player: &mut PlayerController) {
    if let Some(analytics) = player.analytics() {
        let outcome = analytics.flush_events().await;
        debug!(?outcome, "Final analytics flush");
    }
    player.unmount().await;
}

/// Print chapter timestamps found in a description
pub fn chapters(description: &str, format: &str) -> anyhow::Result<()> {
    let stamps = parse_description_timestamps(description);

    match OutputFormat::from(format) {
        OutputFormat::Json => {
            let entries: Vec<serde_json::Value> = stamps
                .iter()
                .map(|(text, seconds)| serde_json::json!({ "text": text, "seconds": seconds }))
                .collect();
            print_json(&entries)?;
        }
        OutputFormat::Text => {
            if stamps.is_empty() {
                println!("No timestamps found");
            }
            for (text, seconds) in &stamps {
                println!("  {:>8}  {}s", text, seconds);
            }
        }
    }
    Ok(())
}

fn video_api(
    settings: &CliConfig,
    sources: Option<&Path>,
    subtitle_language: Option<&str>,
) -> anyhow::Result<Arc<dyn VideoApi>> {
    let Some(path) = sources else {
        return Ok(Arc::new(HttpVideoApi::new(&settings.api)?));
    };

    let mut api = FileVideoApi::from_file(path)?;
    if let (Some(language), Some(dir)) = (subtitle_language, path.parent()) {
        api = api.with_subtitles_from(dir, language);
    }
    Ok(Arc::new(api))
}
