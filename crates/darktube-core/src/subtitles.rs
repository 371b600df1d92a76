//! Subtitle parsing - WebVTT and SRT
//!
//! Both formats parse into the same ordered list of [`SubtitleSegment`]s.
//! Parsing is lenient: a cue with a malformed timing line or without text is
//! skipped and the rest of the document is still returned.
//!
//! # Example
//!
//! ```rust
//! use darktube_core::subtitles::{SrtParser, WebVttParser};
//!
//! let vtt = WebVttParser::parse("WEBVTT\n\n00:00:01.000 --> 00:00:03.000\nHello");
//! let srt = SrtParser::parse("1\n00:00:01,000 --> 00:00:03,000\nHello");
//! assert_eq!(vtt, srt);
//! assert_eq!(vtt[0].text, "Hello");
//! ```

use crate::types::{SubtitleDocument, SubtitleFormat, SubtitleSegment};
use tracing::debug;

/// Parse subtitle content in the given format
pub fn parse_subtitles(content: &str, format: SubtitleFormat) -> Vec<SubtitleSegment> {
    match format {
        SubtitleFormat::Vtt => WebVttParser::parse(content),
        SubtitleFormat::Srt => SrtParser::parse(content),
    }
}

/// WebVTT parser
pub struct WebVttParser;

impl WebVttParser {
    /// Parse a WebVTT document
    pub fn parse(input: &str) -> Vec<SubtitleSegment> {
        let mut segments = Vec::new();

        for block in blocks(input) {
            let first = block[0];
            if first.starts_with("WEBVTT")
                || first.starts_with("NOTE")
                || first.starts_with("STYLE")
                || first.starts_with("REGION")
            {
                continue;
            }

            // Optional cue identifier before the timing line
            let Some(timing_index) = block.iter().take(2).position(|l| l.contains("-->")) else {
                debug!(line = first, "Skipping WebVTT block without timing line");
                continue;
            };

            let Some((start, end)) = parse_timing_line(block[timing_index], '.') else {
                debug!(line = block[timing_index], "Skipping malformed WebVTT cue");
                continue;
            };

            if let Some(text) = join_text(&block[timing_index + 1..]) {
                segments.push(SubtitleSegment { start, end, text });
            }
        }

        sort_segments(&mut segments);
        segments
    }

    /// Strip VTT markup tags from text
    pub fn strip_tags(text: &str) -> String {
        let mut result = String::with_capacity(text.len());
        let mut in_tag = false;

        for ch in text.chars() {
            match ch {
                '<' => in_tag = true,
                '>' => in_tag = false,
                _ if !in_tag => result.push(ch),
                _ => {}
            }
        }

        result
    }
}

/// SRT (SubRip) parser
pub struct SrtParser;

impl SrtParser {
    /// Parse an SRT document
    pub fn parse(input: &str) -> Vec<SubtitleSegment> {
        let mut segments = Vec::new();

        for block in blocks(input) {
            // Sequence number first, but tolerate files that omit it
            let timing_index = if block[0].contains("-->") { 0 } else { 1 };
            let Some(timing_line) = block.get(timing_index) else {
                continue;
            };

            let Some((start, end)) = parse_timing_line(timing_line, ',') else {
                debug!(line = *timing_line, "Skipping malformed SRT cue");
                continue;
            };

            if let Some(text) = join_text(&block[timing_index + 1..]) {
                segments.push(SubtitleSegment { start, end, text });
            }
        }

        sort_segments(&mut segments);
        segments
    }
}

/// Render segments as a WebVTT document
pub fn to_webvtt(segments: &[SubtitleSegment]) -> String {
    let mut out = String::from("WEBVTT\n");
    for segment in segments {
        out.push_str(&format!(
            "\n{} --> {}\n{}\n",
            format_timestamp(segment.start, '.'),
            format_timestamp(segment.end, '.'),
            segment.text
        ));
    }
    out
}

/// Render segments as a SubRip document
pub fn to_srt(segments: &[SubtitleSegment]) -> String {
    segments
        .iter()
        .enumerate()
        .map(|(i, segment)| {
            format!(
                "{}\n{} --> {}\n{}\n",
                i + 1,
                format_timestamp(segment.start, ','),
                format_timestamp(segment.end, ','),
                segment.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Sequence of cues loaded for one (video, language) pair
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubtitleTrack {
    pub language: String,
    segments: Vec<SubtitleSegment>,
}

impl SubtitleTrack {
    pub fn new(language: impl Into<String>, segments: Vec<SubtitleSegment>) -> Self {
        let mut segments = segments;
        sort_segments(&mut segments);
        Self {
            language: language.into(),
            segments,
        }
    }

    /// Parse a document fetched from the subtitles endpoint
    pub fn from_document(language: impl Into<String>, document: &SubtitleDocument) -> Self {
        Self::new(language, parse_subtitles(&document.content, document.format))
    }

    pub fn segments(&self) -> &[SubtitleSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// First segment covering `time`
    pub fn active_at(&self, time: f64) -> Option<&SubtitleSegment> {
        self.segments.iter().find(|s| s.is_active_at(time))
    }
}

/// Split input into blocks of non-blank, trimmed lines
fn blocks(input: &str) -> Vec<Vec<&str>> {
    let mut blocks = Vec::new();
    let mut current = Vec::new();

    for line in input.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }

    blocks
}

fn join_text(lines: &[&str]) -> Option<String> {
    if lines.is_empty() {
        return None;
    }
    Some(lines.join(" "))
}

fn sort_segments(segments: &mut [SubtitleSegment]) {
    segments.sort_by(|a, b| a.start.total_cmp(&b.start));
}

/// Parse "start --> end [settings]"
fn parse_timing_line(line: &str, decimal: char) -> Option<(f64, f64)> {
    let (start, rest) = line.split_once("-->")?;
    let end = rest.split_whitespace().next()?;
    let start = parse_timestamp(start.trim(), decimal)?;
    let end = parse_timestamp(end, decimal)?;
    (end >= start).then_some((start, end))
}

/// Parse "HH:MM:SS<d>mmm" or "MM:SS<d>mmm" into seconds
fn parse_timestamp(ts: &str, decimal: char) -> Option<f64> {
    let parts: Vec<&str> = ts.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [h, m, s] => (parse_unit(h)?, parse_unit(m)?, *s),
        [m, s] => (0, parse_unit(m)?, *s),
        _ => return None,
    };

    let (whole, millis) = seconds.split_once(decimal)?;
    let whole = parse_unit(whole)?;
    if minutes >= 60 || whole >= 60 || millis.len() != 3 {
        return None;
    }
    let millis = parse_unit(millis)?;

    Some(hours as f64 * 3600.0 + minutes as f64 * 60.0 + whole as f64 + millis as f64 / 1000.0)
}

fn format_timestamp(seconds: f64, decimal: char) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let (hours, rest) = (total_ms / 3_600_000, total_ms % 3_600_000);
    let (minutes, rest) = (rest / 60_000, rest % 60_000);
    format!(
        "{:02}:{:02}:{:02}{}{:03}",
        hours,
        minutes,
        rest / 1000,
        decimal,
        rest % 1000
    )
}

fn parse_unit(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
