//! Log-safe previews of panel traffic.
//! Commands and panel strings may carry control characters or Latin-1 glyphs; raw
//! frames are binary. Both are rendered onto a single readable log line.

/// Escape a command for single-line logging:
/// - `\n` => `\\n`
/// - `\r` => `\\r`
/// - other control characters => `\xNN`
///   Truncates long commands (over `MAX_PREVIEW` chars) with an ellipsis.
pub fn command_preview(s: &str) -> String {
    const MAX_PREVIEW: usize = 120;
    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= MAX_PREVIEW {
            out.push('…');
            break;
        }
        match ch {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c if c.is_control() => {
                use std::fmt::Write;
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Hex dump of the first `max` bytes, e.g. `66 02 FF FF FF`.
pub fn hex_snippet(data: &[u8], max: usize) -> String {
    let mut out = data
        .iter()
        .take(max)
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ");
    if data.len() > max {
        out.push_str(&format!(" …(+{} bytes)", data.len() - max));
    }
    out
}
