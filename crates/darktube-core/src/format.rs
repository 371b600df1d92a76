//! Display formatting helpers
//!
//! Durations, counts, sizes, relative times and the site's URL shapes.

use chrono::{DateTime, Utc};
use url::form_urlencoded;

/// Format seconds as `M:SS` or `H:MM:SS`
pub fn format_duration(seconds: f64) -> String {
    let total = if seconds.is_finite() { seconds.max(0.0) as u64 } else { 0 };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

/// Format a count with a K/M/B suffix: 1500 -> "1.5K", 2000000 -> "2M"
pub fn format_view_count(views: u64) -> String {
    const UNITS: [(u64, &str); 3] = [(1_000_000_000, "B"), (1_000_000, "M"), (1_000, "K")];

    for (scale, suffix) in UNITS {
        if views >= scale {
            let value = format!("{:.1}", views as f64 / scale as f64);
            let value = value.strip_suffix(".0").unwrap_or(&value);
            return format!("{}{}", value, suffix);
        }
    }
    views.to_string()
}

pub fn format_subscriber_count(subscribers: u64) -> String {
    format_view_count(subscribers)
}

/// "Just now", "5 minutes ago", "1 year ago", relative to `now`
pub fn format_time_ago(date: DateTime<Utc>, now: DateTime<Utc>) -> String {
    const UNITS: [(i64, &str); 6] = [
        (31_556_952, "year"),
        (2_629_746, "month"),
        (604_800, "week"),
        (86_400, "day"),
        (3_600, "hour"),
        (60, "minute"),
    ];

    let elapsed = (now - date).num_seconds();
    for (scale, unit) in UNITS {
        if elapsed >= scale {
            let count = elapsed / scale;
            let plural = if count == 1 { "" } else { "s" };
            return format!("{} {}{} ago", count, unit, plural);
        }
    }
    "Just now".to_string()
}

/// Relative time against the current clock
pub fn format_time_ago_now(date: DateTime<Utc>) -> String {
    format_time_ago(date, Utc::now())
}

/// Human readable byte size: 1536 -> "1.5 KB"
pub fn format_file_size(bytes: u64) -> String {
    const SIZES: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];

    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut exponent = 0;
    let mut value = bytes as f64;
    while value >= 1024.0 && exponent < SIZES.len() - 1 {
        value /= 1024.0;
        exponent += 1;
    }
    format!("{} {}", trim_decimals(&format!("{:.2}", value)), SIZES[exponent])
}

/// Ratio in [0, 1] as a percentage string: 0.256 -> "25.6%"
pub fn format_percentage(value: f64, decimals: usize) -> String {
    format!("{:.*}%", decimals, value * 100.0)
}

/// Thousands separators: 1234567 -> "1,234,567"
pub fn format_number(num: i64) -> String {
    let digits = num.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if num < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Display name for a quality label
pub fn format_quality(quality: &str) -> String {
    let label = match quality {
        "720p" => "720p HD",
        "1080p" => "1080p HD",
        "1440p" => "1440p QHD",
        "2160p" | "4K" => "4K UHD",
        "auto" => "Auto",
        other => other,
    };
    label.to_string()
}

/// Bitrate given in kbps: 800 -> "800 kbps", 2500 -> "2.5 Mbps"
pub fn format_bitrate(kbps: u64) -> String {
    if kbps < 1000 {
        format!("{} kbps", kbps)
    } else {
        format!("{:.1} Mbps", kbps as f64 / 1000.0)
    }
}

/// Truncate to `max_len` characters, ending with "..."
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let keep = max_len.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

pub fn format_username(username: &str) -> String {
    if username.starts_with('@') {
        username.to_string()
    } else {
        format!("@{}", username)
    }
}

pub fn format_channel_url(channel_id: &str, custom_url: Option<&str>) -> String {
    match custom_url {
        Some(custom) if !custom.is_empty() => format!("/c/{}", custom),
        _ => format!("/channel/{}", channel_id),
    }
}

/// Watch page URL, with a whole-second start offset when positive
pub fn format_video_url(video_id: &str, timestamp: Option<f64>) -> String {
    let base = format!("/watch?v={}", video_id);
    match timestamp {
        Some(t) if t >= 1.0 => format!("{}&t={}s", base, t.floor() as u64),
        _ => base,
    }
}

/// Search page URL; empty filter values are dropped
pub fn format_search_url(query: &str, filters: &[(&str, &str)]) -> String {
    let mut params = form_urlencoded::Serializer::new(String::new());
    params.append_pair("q", query);
    for (key, value) in filters.iter().filter(|(_, v)| !v.is_empty()) {
        params.append_pair(key, value);
    }
    format!("/search?{}", params.finish())
}

pub fn format_playlist_url(playlist_id: &str, video_id: Option<&str>) -> String {
    match video_id {
        Some(v) => format!("/playlist?list={}&v={}", playlist_id, v),
        None => format!("/playlist?list={}", playlist_id),
    }
}

/// Progress text for a named action: "saving" -> "Saving..."
pub fn format_loading_text(action: &str) -> String {
    match action {
        "loading" => "Loading...".to_string(),
        "uploading" => "Uploading...".to_string(),
        "processing" => "Processing...".to_string(),
        "saving" => "Saving...".to_string(),
        "deleting" => "Deleting...".to_string(),
        "publishing" => "Publishing...".to_string(),
        other => format!("{}...", other),
    }
}

/// Chapter-style timestamps (`M:SS`, `MM:SS`, `H:MM:SS`) found in a
/// description, as (matched text, seconds) in order of appearance
pub fn parse_description_timestamps(description: &str) -> Vec<(String, u64)> {
    description
        .split(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | '[' | ']' | ','))
        .filter_map(|word| {
            let word = word.trim_end_matches(['.', '-', ':']);
            parse_clock(word).map(|secs| (word.to_string(), secs))
        })
        .collect()
}

fn parse_clock(word: &str) -> Option<u64> {
    let parts: Vec<&str> = word.split(':').collect();
    let valid = |p: &&str, max_len: usize| {
        !p.is_empty() && p.len() <= max_len && p.bytes().all(|b| b.is_ascii_digit())
    };

    match parts.as_slice() {
        [m, s] if valid(m, 2) && s.len() == 2 && valid(s, 2) => {
            Some(m.parse::<u64>().ok()? * 60 + s.parse::<u64>().ok()?)
        }
        [h, m, s] if valid(h, 2) && valid(m, 2) && s.len() == 2 && valid(s, 2) => Some(
            h.parse::<u64>().ok()? * 3600 + m.parse::<u64>().ok()? * 60 + s.parse::<u64>().ok()?,
        ),
        _ => None,
    }
}

fn trim_decimals(value: &str) -> &str {
    if value.contains('.') {
        value.trim_end_matches('0').trim_end_matches('.')
    } else {
        value
    }
}
