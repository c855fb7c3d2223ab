//! Text layout of the progress line.
//!
//! ```text
//! xx% [++++=====>          ] 12,345,678    1012.45K/s ETA 01:02
//! ```
//!
//! Field widths are fixed so nothing jitters between frames: percentage 4,
//! bar brackets 2, byte count `1 + max(len, 13)`, rate 11, ETA 13; the bar
//! gets the rest.

use std::fmt::Write;
use std::time::Duration;

pub const MIN_WIDTH: usize = 80;
const RATE_UNITS: [&str; 5] = ["B", "K", "M", "G", "T"];

/// One sample of transfer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Bytes already present before this run.
    pub initial: u64,
    pub total: u64,
    /// Bytes received in this run.
    pub received: u64,
    /// Bytes received during the last interval.
    pub delta: u64,
    pub interval: Duration,
    /// Time since the transfer started.
    pub elapsed: Duration,
    pub finished: bool,
}

/// Groups digits in threes: `1234567` -> `1,234,567`.
pub fn group_digits(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Rate scaled to the largest unit that keeps it at or under 1024.
pub fn scale_rate(bytes: u64, over: Duration) -> (f64, &'static str) {
    let ms = over.as_millis().max(1) as f64;
    let mut rate = 1000.0 * bytes as f64 / ms;
    let mut unit = 0;
    while rate > 1024.0 && unit + 1 < RATE_UNITS.len() {
        rate /= 1024.0;
        unit += 1;
    }
    (rate, RATE_UNITS[unit])
}

fn eta(frame: &Frame, size: u64) -> Option<(u64, u64, u64)> {
    if frame.finished || frame.received == 0 || frame.elapsed.is_zero() {
        return None;
    }
    let remaining = frame.total.saturating_sub(size);
    let secs = (frame.elapsed.as_secs_f64() * remaining as f64 / frame.received as f64) as u64;
    let hours = secs / 3600;
    (hours <= 99).then_some((hours, secs % 3600 / 60, secs % 60))
}

/// Renders `frame` exactly `width` columns wide (at least [`MIN_WIDTH`]).
pub fn render(frame: &Frame, width: usize) -> String {
    let width = width.max(MIN_WIDTH);
    let size = (frame.initial + frame.received).min(frame.total);
    let size_text = group_digits(size);
    let count_cols = 1 + size_text.len().max(13);
    let bar_cols = width.saturating_sub(4 + 2 + count_cols + 11 + 13).max(1);
    let mut line = String::with_capacity(width);

    let fraction = |n: u64| {
        if frame.total == 0 {
            1.0
        } else {
            n as f64 / frame.total as f64
        }
    };
    let percent = (100.0 * fraction(size)) as u32;
    if percent < 100 {
        let _ = write!(line, "{:2}% ", percent);
    } else {
        line.push_str("100%");
    }

    let initial_cols = ((fraction(frame.initial.min(size)) * bar_cols as f64) as usize).min(bar_cols);
    let done_cols = ((fraction(size) * bar_cols as f64) as usize).clamp(initial_cols, bar_cols);
    line.push('[');
    line.extend(std::iter::repeat('+').take(initial_cols));
    let fresh = done_cols - initial_cols;
    if fresh > 0 {
        line.extend(std::iter::repeat('=').take(fresh - 1));
        line.push('>');
    }
    line.extend(std::iter::repeat(' ').take(bar_cols - done_cols));
    line.push(']');

    let _ = write!(line, " {:<13}", size_text);

    if frame.delta > 0 {
        let (rate, unit) = scale_rate(frame.delta, frame.interval);
        let _ = write!(line, " {:7.2}{}/s", rate, unit);
        match eta(frame, size) {
            Some((0, m, s)) => {
                let _ = write!(line, "    ETA {:02}:{:02}", m, s);
            }
            Some((h, m, s)) => {
                let pad = if h < 10 { " " } else { "" };
                let _ = write!(line, "{} ETA {}:{:02}:{:02}", pad, h, m, s);
            }
            None => line.push_str(&" ".repeat(13)),
        }
    } else {
        line.push_str("   --.--K/s");
        line.push_str(&" ".repeat(13));
    }

    let used = line.chars().count();
    if used < width {
        line.push_str(&" ".repeat(width - used));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(initial: u64, total: u64, received: u64, delta: u64, elapsed_s: u64) -> Frame {
        Frame {
            initial,
            total,
            received,
            delta,
            interval: Duration::from_secs(1),
            elapsed: Duration::from_secs(elapsed_s),
            finished: false,
        }
    }

    #[test]
    fn digits_are_grouped() {
        assert_eq!(group_digits(0), "0");
        assert_eq!(group_digits(999), "999");
        assert_eq!(group_digits(1000), "1,000");
        assert_eq!(group_digits(1234567890), "1,234,567,890");
    }

    #[test]
    fn rate_units_scale() {
        assert_eq!(scale_rate(512, Duration::from_secs(1)), (512.0, "B"));
        let (r, u) = scale_rate(2048, Duration::from_secs(1));
        assert_eq!((r, u), (2.0, "K"));
        let (r, u) = scale_rate(3 * 1024 * 1024, Duration::from_millis(500));
        assert_eq!((r, u), (6.0, "M"));
    }

    #[test]
    fn half_done_fresh_download() {
        let line = render(&frame(0, 1000, 500, 100, 10), 80);
        assert_eq!(line.chars().count(), 80);
        assert!(line.starts_with("50% ["), "{line}");
        // 80 - (4 + 2 + 14 + 11 + 13) = 36 bar columns, half of them filled.
        let bar: String = line.chars().skip(5).take(36).collect();
        assert_eq!(bar, format!("{}>{}", "=".repeat(17), " ".repeat(18)));
        assert!(line.contains(" 500           "));
        assert!(line.contains("  100.00B/s"));
        assert!(line.contains("    ETA 00:10"));
    }

    #[test]
    fn resumed_part_uses_plus() {
        let line = render(&frame(500, 1000, 250, 50, 5), 80);
        let expected = format!("75% [{}{}>", "+".repeat(18), "=".repeat(8));
        assert!(line.starts_with(&expected), "{line}");
    }

    #[test]
    fn no_throughput_blanks_rate_and_eta() {
        let line = render(&frame(0, 1000, 0, 0, 0), 100);
        assert_eq!(line.chars().count(), 100);
        assert!(line.starts_with(" 0% [ "));
        assert!(line.contains("   --.--K/s"));
        assert!(!line.contains("ETA"));
    }

    #[test]
    fn long_eta_shows_hours_and_huge_eta_is_blank() {
        let line = render(&frame(0, 10_000, 1, 1, 4), 80);
        assert!(line.contains(" ETA 11:06:36"), "{line}");
        let line = render(&frame(0, 10_000, 1, 1, 3600), 80);
        assert!(!line.contains("ETA"));
        let line = render(&frame(0, 7201, 1, 1, 1), 80);
        assert!(line.contains("/s  ETA 2:00:00"), "{line}");
    }

    #[test]
    fn zero_elapsed_blanks_eta_but_keeps_rate() {
        let line = render(&frame(0, 1_000_000, 4096, 4096, 0), 80);
        assert_eq!(line.chars().count(), 80);
        assert!(line.contains("4.00K/s"), "{line}");
        assert!(!line.contains("ETA"), "{line}");
    }

    #[test]
    fn finished_frame_is_full_without_eta() {
        let mut f = frame(100, 1000, 900, 900, 9);
        f.finished = true;
        f.interval = Duration::from_secs(9);
        let line = render(&f, 90);
        assert!(line.starts_with("100%["));
        assert!(line.contains("1,000"));
        assert!(!line.contains("ETA"));
        assert_eq!(line.chars().count(), 90);
    }

    #[test]
    fn narrow_terminal_is_widened_and_empty_file_is_complete() {
        let line = render(&frame(0, 0, 0, 0, 0), 20);
        assert_eq!(line.chars().count(), MIN_WIDTH);
        assert!(line.starts_with("100%"));
    }
}
