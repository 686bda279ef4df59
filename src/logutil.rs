//! Log sanitizing for text that arrives over the air.
//!
//! Channel messages are free-form: senders paste newlines, firmware pads buffers with
//! NULs, and nothing bounds the length. These helpers keep every log record on one line.
use std::borrow::Cow;

/// Escape control characters (`\n`, `\t`, `\u{0}`, ...) so the text stays on one log
/// line. Text without any is returned borrowed.
pub fn escape_log(s: &str) -> Cow<'_, str> {
    if !s.chars().any(char::is_control) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        if c.is_control() {
            out.extend(c.escape_default());
        } else {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

/// Escape and cut `input` to at most `max_bytes` of source text, never splitting a
/// UTF-8 sequence. Cut strings end in `...`.
pub fn truncate_for_log(input: &str, max_bytes: usize) -> String {
    if input.len() <= max_bytes {
        return escape_log(input).into_owned();
    }
    let mut cut = max_bytes.saturating_sub(3);
    while !input.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", escape_log(&input[..cut]))
}
