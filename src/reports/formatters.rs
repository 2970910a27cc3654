use crate::types::{Completeness, ResultStatus};

pub fn status_glyph(status: ResultStatus) -> &'static str {
    match status {
        ResultStatus::Ok => "✅",
        ResultStatus::Error => "❌",
        ResultStatus::Timeout => "⏱",
    }
}

pub fn status_label(status: ResultStatus) -> &'static str {
    match status {
        ResultStatus::Ok => "ok",
        ResultStatus::Error => "error",
        ResultStatus::Timeout => "timeout",
    }
}

pub fn completeness_label(completeness: Completeness) -> &'static str {
    match completeness {
        Completeness::Full => "full",
        Completeness::Partial => "partial",
    }
}

pub fn format_latency(latency_ms: u64) -> String {
    if latency_ms < 1_000 {
        format!("{} ms", latency_ms)
    } else {
        format!("{:.1} s", latency_ms as f64 / 1_000.0)
    }
}

/// First line of a payload, truncated for display.
pub fn excerpt(payload: &str, max_chars: usize) -> String {
    let first_line = payload.lines().next().unwrap_or("");
    if first_line.chars().count() <= max_chars {
        first_line.to_string()
    } else {
        let truncated: String = first_line.chars().take(max_chars).collect();
        format!("{}…", truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latency_formatting_switches_units() {
        assert_eq!(format_latency(12), "12 ms");
        assert_eq!(format_latency(999), "999 ms");
        assert_eq!(format_latency(1_500), "1.5 s");
        assert_eq!(format_latency(30_000), "30.0 s");
    }

    #[test]
    fn excerpt_truncates_and_keeps_first_line() {
        assert_eq!(excerpt("short", 10), "short");
        assert_eq!(excerpt("first\nsecond", 10), "first");
        assert_eq!(excerpt("abcdefghij", 4), "abcd…");
    }
}
