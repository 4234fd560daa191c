use chrono::Utc;

// ============== Timestamp Helpers ==============

/// Filesystem-safe UTC timestamp, e.g. `20260202T123456Z`.
pub fn file_timestamp_utc() -> String {
    Utc::now().format("%Y%m%dT%H%M%SZ").to_string()
}

// ============== Text Helpers ==============

pub fn truncate_text(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let mut out = s.chars().take(max_len).collect::<String>();
    out.push_str("...");
    out
}

/// Keep the last `max_lines` lines of `text`, and at most roughly `max_bytes` of them.
///
/// Diagnostics from failing tools are usually at the end of their output.
pub fn tail_text(text: &str, max_lines: usize, max_bytes: usize) -> String {
    let mut kept: Vec<&str> = Vec::new();
    let mut bytes = 0usize;
    for line in text.trim_end().lines().rev() {
        // +1 for the '\n' we join with later.
        if kept.len() >= max_lines || bytes + line.len() + 1 > max_bytes {
            break;
        }
        bytes += line.len() + 1;
        kept.push(line);
    }
    kept.reverse();
    kept.join("\n")
}
