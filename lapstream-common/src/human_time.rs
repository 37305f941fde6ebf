//! Human-readable time formatting for timeline positions
//!
//! Timeline positions are `f64` seconds. Logs and the CLI show them as
//! `M:SS.s` (under an hour) or `H:MM:SS.s`.

/// Positions at or above this many seconds include an hours field
const HOURS_FORMAT_MIN: f64 = 3600.0;

/// Format a timeline position in seconds.
///
/// Negative and non-finite values are rendered as-is with a sign or as `--:--`
/// since they only appear in error conditions.
///
/// # Examples
///
/// ```
/// use lapstream_common::human_time::format_position;
///
/// assert_eq!(format_position(0.0), "0:00.0");
/// assert_eq!(format_position(42.25), "0:42.3");
/// assert_eq!(format_position(95.0), "1:35.0");
/// assert_eq!(format_position(3725.5), "1:02:05.5");
/// assert_eq!(format_position(f64::NAN), "--:--");
/// ```
pub fn format_position(seconds: f64) -> String {
    if !seconds.is_finite() {
        return "--:--".to_string();
    }

    let is_negative = seconds < 0.0;
    // Round to tenths first so 59.96 renders as 1:00.0, not 0:60.0
    let tenths = (seconds.abs() * 10.0).round() as u64;
    let whole = tenths / 10;
    let frac = tenths % 10;

    let formatted = if (whole as f64) < HOURS_FORMAT_MIN {
        format!("{}:{:02}.{}", whole / 60, whole % 60, frac)
    } else {
        format!(
            "{}:{:02}:{:02}.{}",
            whole / 3600,
            (whole % 3600) / 60,
            whole % 60,
            frac
        )
    };

    if is_negative {
        format!("-{}", formatted)
    } else {
        formatted
    }
}

/// Format `position / duration` for progress display.
///
/// # Examples
///
/// ```
/// use lapstream_common::human_time::format_progress;
///
/// assert_eq!(format_progress(42.0, Some(95.0)), "0:42.0 / 1:35.0");
/// assert_eq!(format_progress(3.0, None), "0:03.0 / --:--");
/// ```
pub fn format_progress(position: f64, duration: Option<f64>) -> String {
    let duration = duration.map(format_position).unwrap_or_else(|| "--:--".to_string());
    format!("{} / {}", format_position(position), duration)
}
