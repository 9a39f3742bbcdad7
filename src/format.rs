//! Human-readable formatting helpers

const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

/// Formats a raw byte count using binary prefixes
///
/// The value is divided by 1024 until it drops below one unit step or the
/// largest unit (GB) is reached. Byte values are printed as integers, every
/// larger unit with one decimal place.
///
/// # Example
///
/// ```
/// use maplister::format_file_size;
///
/// assert_eq!(format_file_size(0), "0 B");
/// assert_eq!(format_file_size(1536), "1.5 KB");
/// ```
pub fn format_file_size(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;

    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
