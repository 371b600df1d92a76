//! Subtitle parsing example
//!
//! Parses a WebVTT document, looks up the active cue at a few playback
//! positions, and converts the result to SRT.
//!
//! Run with: cargo run -p darktube-core --example subtitles

use darktube_core::format::format_duration;
use darktube_core::subtitles::{to_srt, SubtitleTrack, WebVttParser};

fn main() {
    println!("DarkTube Core - Subtitle Example");
    println!("================================\n");

    let webvtt = r#"WEBVTT

NOTE Example captions for the watch page

STYLE
::cue {
  background-color: rgba(0, 0, 0, 0.8);
}

intro
00:00:00.000 --> 00:00:03.000
Welcome to DarkTube!

00:00:03.500 --> 00:00:07.000 align:center position:50%
This video shows how
captions are rendered.

00:00:08.000 --> 00:00:12.000
<v Narrator>Let's dive into the player.</v>

01:30:00.000 --> 01:30:05.000
This caption appears at 1 hour 30 minutes.
"#;

    let segments = WebVttParser::parse(webvtt);
    println!("Found {} cues:\n", segments.len());
    for (i, segment) in segments.iter().enumerate() {
        println!(
            "  {:>2}. [{} -> {}] {}",
            i + 1,
            format_duration(segment.start),
            format_duration(segment.end),
            WebVttParser::strip_tags(&segment.text)
        );
    }

    let track = SubtitleTrack::new("en", segments);
    println!("\nActive cue lookup:");
    for time in [0.5, 5.0, 7.5, 10.0, 5402.0] {
        match track.active_at(time) {
            Some(segment) => println!(
                "  At {}: \"{}\"",
                format_duration(time),
                WebVttParser::strip_tags(&segment.text)
            ),
            None => println!("  At {}: (no caption)", format_duration(time)),
        }
    }

    println!("\nAs SRT:\n");
    println!("{}", to_srt(track.segments()));
}
