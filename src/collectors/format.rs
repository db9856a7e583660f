/// Human-readable duration from seconds: `350μs`, `12.4ms`, `1.25s`.
pub fn format_duration(seconds: f64) -> String {
    if seconds < 0.001 {
        format!("{}μs", (seconds * 1_000_000.0).round() as i64)
    } else if seconds < 1.0 {
        format!("{:.2}ms", seconds * 1_000.0)
    } else {
        format!("{seconds:.2}s")
    }
}

/// Human-readable byte count, signed so memory deltas read naturally.
pub fn format_bytes(bytes: i64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

    if bytes == 0 {
        return "0B".into();
    }
    let sign = if bytes < 0 { "-" } else { "" };
    let mut value = bytes.unsigned_abs() as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    // Whole numbers print without a fraction
    if (value.fract()).abs() < f64::EPSILON {
        format!("{sign}{}{}", value as u64, UNITS[unit])
    } else {
        format!("{sign}{value:.2}{}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations() {
        assert_eq!(format_duration(0.00035), "350μs");
        assert_eq!(format_duration(0.0124), "12.40ms");
        assert_eq!(format_duration(1.5), "1.50s");
    }

    #[test]
    fn bytes() {
        assert_eq!(format_bytes(0), "0B");
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(2048), "2KB");
        assert_eq!(format_bytes(1536), "1.50KB");
        assert_eq!(format_bytes(-3 * 1024 * 1024), "-3MB");
    }
}
