//! Shared utility functions
//!
//! Common utilities used across multiple modules.

/// Format a byte size as human-readable string
///
/// Examples: "1.2MB", "450KB", "23B", "2.5TB"
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.1}TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.1}GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1}MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.0}KB", bytes as f64 / KB as f64)
    } else {
        format!("{}B", bytes)
    }
}

/// Sample at most `max_chars` characters from `text`, keeping both the
/// beginning and the end so that context and conclusion survive.
///
/// Text that already fits is returned unchanged. The omitted middle is
/// replaced by a marker that states how many characters were dropped; the
/// marker counts against the budget.
pub fn head_tail_sample(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }

    // The omitted count never has more digits than `total`
    let marker_len = truncation_marker(total).chars().count();
    let keep = max_chars.saturating_sub(marker_len);
    if keep == 0 {
        return text.chars().take(max_chars).collect();
    }

    let head_len = keep * 2 / 3;
    let tail_len = keep - head_len;
    let head: String = text.chars().take(head_len).collect();
    let tail: String = text.chars().skip(total - tail_len).collect();

    format!(
        "{}{}{}",
        head,
        truncation_marker(total - head_len - tail_len),
        tail
    )
}

fn truncation_marker(omitted: usize) -> String {
    format!("\n...[truncated {} chars]...\n", omitted)
}

/// Take the first `max_chars` characters, appending an ellipsis when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}
