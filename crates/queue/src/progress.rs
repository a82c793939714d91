//! Encoder telemetry parsing.
//!
//! Understands two shapes of ffmpeg output:
//! - `-progress` key/value blocks (`frame=…`, `out_time_us=…`, …) closed by a
//!   `progress=continue|end` line; one update per closing line.
//! - classic stats lines (`frame=  240 fps= 48 … time=00:00:10.00 bitrate=… speed=1.9x`);
//!   one update per line.

use crate::item::ItemProgress;

/// Stateful parser for one encode's output.
#[derive(Debug, Clone, Default)]
pub struct ProgressParser {
    /// Total media duration, for the percentage.
    duration_secs: Option<f64>,
    frame: u64,
    fps: f64,
    out_time_us: u64,
    bitrate_kbps: Option<f64>,
    speed: Option<f64>,
}

impl ProgressParser {
    pub fn new(duration_secs: Option<f64>) -> Self {
        Self {
            duration_secs: duration_secs.filter(|d| *d > 0.0),
            ..Self::default()
        }
    }

    /// Feeds one line; returns a progress update when the line completes one.
    pub fn parse_line(&mut self, line: &str) -> Option<ItemProgress> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if is_stats_line(line) {
            self.apply_stats_line(line);
            return Some(self.snapshot());
        }

        let (key, value) = line.split_once('=')?;
        let value = value.trim();
        match key.trim() {
            "frame" => {
                if let Ok(v) = value.parse() {
                    self.frame = v;
                }
            }
            "fps" => {
                if let Ok(v) = value.parse() {
                    self.fps = v;
                }
            }
            // ffmpeg reports microseconds under both names
            "out_time_us" | "out_time_ms" => {
                if let Ok(v) = value.parse::<i64>() {
                    self.out_time_us = v.max(0) as u64;
                }
            }
            "out_time" => {
                if let Some(secs) = parse_timestamp(value) {
                    self.out_time_us = (secs * 1_000_000.0) as u64;
                }
            }
            "bitrate" => self.bitrate_kbps = parse_bitrate(value),
            "speed" => self.speed = parse_speed(value),
            "progress" => return Some(self.snapshot()),
            _ => {}
        }
        None
    }

    fn apply_stats_line(&mut self, line: &str) {
        for (key, value) in stats_pairs(line) {
            match key {
                "frame" => {
                    if let Ok(v) = value.parse() {
                        self.frame = v;
                    }
                }
                "fps" => {
                    if let Ok(v) = value.parse() {
                        self.fps = v;
                    }
                }
                "time" => {
                    if let Some(secs) = parse_timestamp(value) {
                        self.out_time_us = (secs * 1_000_000.0) as u64;
                    }
                }
                "bitrate" => self.bitrate_kbps = parse_bitrate(value),
                "speed" => self.speed = parse_speed(value),
                _ => {}
            }
        }
    }

    /// Current telemetry.
    pub fn snapshot(&self) -> ItemProgress {
        let time_secs = self.out_time_us as f64 / 1_000_000.0;
        let percent = match self.duration_secs {
            Some(total) => (time_secs / total * 100.0).clamp(0.0, 100.0),
            None => 0.0,
        };
        ItemProgress {
            frame: self.frame,
            fps: self.fps,
            time_secs,
            bitrate_kbps: self.bitrate_kbps,
            speed: self.speed,
            percent,
        }
    }
}

fn is_stats_line(line: &str) -> bool {
    line.starts_with("frame=") && line.contains(" time=")
}

/// Splits `frame=  240 fps= 48 q=28.0 size= 1024kB time=…` into key/value pairs.
///
/// Values may be separated from their `=` by padding spaces.
fn stats_pairs(line: &str) -> Vec<(&str, &str)> {
    let mut pairs = Vec::new();
    let mut rest = line;
    while let Some(eq) = rest.find('=') {
        let key = rest[..eq].trim();
        let after = rest[eq + 1..].trim_start();
        let end = after.find(char::is_whitespace).unwrap_or(after.len());
        pairs.push((key, &after[..end]));
        rest = &after[end..];
    }
    pairs
}

/// `HH:MM:SS.micro` to seconds. Negative or `N/A` values yield `None`.
pub fn parse_timestamp(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.starts_with('-') {
        return None;
    }
    let mut parts = value.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// `1523.4kbits/s` to kbit/s.
fn parse_bitrate(value: &str) -> Option<f64> {
    value.trim().trim_end_matches("kbits/s").trim().parse().ok()
}

/// `1.93x` to 1.93.
fn parse_speed(value: &str) -> Option<f64> {
    value.trim().trim_end_matches('x').trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_block_emits_once_per_terminator() {
        let mut parser = ProgressParser::new(Some(10.0));

        assert!(parser.parse_line("frame=120").is_none());
        assert!(parser.parse_line("fps=24.00").is_none());
        assert!(parser.parse_line("bitrate=1523.4kbits/s").is_none());
        assert!(parser.parse_line("out_time_us=5000000").is_none());
        assert!(parser.parse_line("speed=1.93x").is_none());

        let progress = parser.parse_line("progress=continue").unwrap();
        assert_eq!(progress.frame, 120);
        assert_eq!(progress.fps, 24.0);
        assert_eq!(progress.time_secs, 5.0);
        assert_eq!(progress.bitrate_kbps, Some(1523.4));
        assert_eq!(progress.speed, Some(1.93));
        assert_eq!(progress.percent, 50.0);
    }

    #[test]
    fn test_classic_stats_line() {
        let mut parser = ProgressParser::new(Some(40.0));
        let line = "frame=  240 fps= 48 q=28.0 size=    1024kB time=00:00:10.00 bitrate= 838.9kbits/s speed=1.9x";

        let progress = parser.parse_line(line).unwrap();
        assert_eq!(progress.frame, 240);
        assert_eq!(progress.fps, 48.0);
        assert_eq!(progress.time_secs, 10.0);
        assert_eq!(progress.bitrate_kbps, Some(838.9));
        assert_eq!(progress.speed, Some(1.9));
        assert_eq!(progress.percent, 25.0);
    }

    #[test]
    fn test_unknown_duration_reports_zero_percent() {
        let mut parser = ProgressParser::new(None);
        parser.parse_line("out_time_us=5000000");
        assert_eq!(parser.parse_line("progress=end").unwrap().percent, 0.0);

        let mut parser = ProgressParser::new(Some(0.0));
        parser.parse_line("out_time_us=5000000");
        assert_eq!(parser.parse_line("progress=end").unwrap().percent, 0.0);
    }

    #[test]
    fn test_percent_is_clamped() {
        let mut parser = ProgressParser::new(Some(4.0));
        parser.parse_line("out_time_us=5000000");
        assert_eq!(parser.parse_line("progress=end").unwrap().percent, 100.0);

        let mut parser = ProgressParser::new(Some(4.0));
        parser.parse_line("out_time_us=-120000");
        assert_eq!(parser.parse_line("progress=continue").unwrap().percent, 0.0);
    }

    #[test]
    fn test_out_time_text_form() {
        let mut parser = ProgressParser::new(Some(7200.0));
        parser.parse_line("out_time=01:00:00.000000");
        assert_eq!(parser.parse_line("progress=continue").unwrap().percent, 50.0);
    }

    #[test]
    fn test_na_values_keep_previous() {
        let mut parser = ProgressParser::new(None);
        parser.parse_line("bitrate=N/A");
        parser.parse_line("speed=N/A");
        parser.parse_line("out_time=N/A");
        let progress = parser.parse_line("progress=continue").unwrap();
        assert_eq!(progress.bitrate_kbps, None);
        assert_eq!(progress.speed, None);
        assert_eq!(progress.time_secs, 0.0);
    }

    #[test]
    fn test_diagnostic_lines_are_ignored() {
        let mut parser = ProgressParser::new(Some(10.0));
        assert!(parser.parse_line("").is_none());
        assert!(parser
            .parse_line("Input #0, matroska,webm, from 'in.mkv':")
            .is_none());
        assert!(parser.parse_line("[Parsed_subtitles_0 @ 0x55] Using font provider fontconfig").is_none());
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp("00:01:30.50"), Some(90.5));
        assert_eq!(parse_timestamp("N/A"), None);
        assert_eq!(parse_timestamp("-00:00:00.12"), None);
    }
}
