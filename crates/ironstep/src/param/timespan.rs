//! Time span text in the `[-][d.]hh:mm:ss[.fffffff]` format.

use std::time::Duration;

const SECS_PER_MINUTE: u64 = 60;
const SECS_PER_HOUR: u64 = 60 * SECS_PER_MINUTE;
const SECS_PER_DAY: u64 = 24 * SECS_PER_HOUR;
const NANOS_PER_TICK: u32 = 100;

/// Parse a time span such as `00:00:05`, `1.02:03:04` or `00:00:00.1500000`.
///
/// Hours-and-minutes only (`hh:mm`) is accepted as well. Fractions carry at
/// most seven digits (100ns ticks). Negative spans are rejected since
/// [`Duration`] cannot represent them.
pub fn parse_timespan(text: &str) -> Result<Duration, String> {
    let text = text.trim();
    if text.starts_with('-') {
        return Err(format!("negative time span `{text}` is not supported"));
    }

    let invalid = || format!("`{text}` is not a time span");
    let parts: Vec<&str> = text.split(':').collect();
    let (head, minutes, seconds) = match parts.as_slice() {
        [head, minutes] => (*head, *minutes, None),
        [head, minutes, seconds] => (*head, *minutes, Some(*seconds)),
        _ => return Err(invalid()),
    };

    let (days, hours) = match head.split_once('.') {
        Some((days, hours)) => (number(days).ok_or_else(invalid)?, hours),
        None => (0, head),
    };
    let hours = number(hours).filter(|h| *h < 24).ok_or_else(invalid)?;
    let minutes = number(minutes).filter(|m| *m < 60).ok_or_else(invalid)?;

    let (seconds, nanos) = match seconds {
        None => (0, 0),
        Some(seconds) => {
            let (whole, fraction) = match seconds.split_once('.') {
                Some((whole, fraction)) => (whole, Some(fraction)),
                None => (seconds, None),
            };
            let whole = number(whole).filter(|s| *s < 60).ok_or_else(invalid)?;
            let nanos = match fraction {
                None => 0,
                Some(fraction) => fraction_nanos(fraction).ok_or_else(invalid)?,
            };
            (whole, nanos)
        }
    };

    let secs = days
        .checked_mul(SECS_PER_DAY)
        .and_then(|d| d.checked_add(hours * SECS_PER_HOUR + minutes * SECS_PER_MINUTE + seconds))
        .ok_or_else(|| format!("time span `{text}` is out of range"))?;
    Ok(Duration::new(secs, nanos))
}

/// Format a duration as `[d.]hh:mm:ss[.fffffff]`.
///
/// Sub-tick precision is truncated, so any duration with 100ns resolution
/// survives a round trip through [`parse_timespan`].
pub fn format_timespan(duration: Duration) -> String {
    let total = duration.as_secs();
    let days = total / SECS_PER_DAY;
    let hours = (total % SECS_PER_DAY) / SECS_PER_HOUR;
    let minutes = (total % SECS_PER_HOUR) / SECS_PER_MINUTE;
    let seconds = total % SECS_PER_MINUTE;
    let ticks = duration.subsec_nanos() / NANOS_PER_TICK;

    let mut out = String::new();
    if days > 0 {
        out.push_str(&format!("{days}."));
    }
    out.push_str(&format!("{hours:02}:{minutes:02}:{seconds:02}"));
    if ticks > 0 {
        out.push_str(&format!(".{ticks:07}"));
    }
    out
}

fn number(text: &str) -> Option<u64> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

fn fraction_nanos(fraction: &str) -> Option<u32> {
    if fraction.is_empty() || fraction.len() > 7 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let padded = format!("{fraction:0<9}");
    padded.parse().ok()
}
