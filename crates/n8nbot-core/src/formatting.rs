//! Formatting utilities for Telegram HTML replies.

use crate::utils::truncate_text;

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Monospace block for command output.
pub fn pre_block(text: &str) -> String {
    let body = if text.trim().is_empty() {
        "(no output)"
    } else {
        text.trim_end()
    };
    format!("<pre>{}</pre>", escape_html(body))
}

pub fn code(text: &str) -> String {
    format!("<code>{}</code>", escape_html(text))
}

/// `❌ <action> failed:` followed by the error text in a monospace block.
///
/// The error is capped so the reply always fits a single message.
pub fn failure_html(action: &str, error: &str) -> String {
    format!(
        "❌ <b>{} failed:</b>\n{}",
        escape_html(action),
        pre_block(&truncate_text(error, 3500))
    )
}

pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0usize;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
