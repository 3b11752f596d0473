//! Log text repair before classification and persistence.
//!
//! Container build and run output arrives with terminal artifacts: ANSI
//! escapes, backspaces, carriage-return progress bars, tab characters, and
//! engine stream-JSON fragments. The persisted iteration log must stay
//! well-formed structured text, so everything below is a format requirement,
//! not cosmetics.

/// Repair one raw log into clean, newline-separated text.
pub fn sanitize_log(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for line in raw.lines() {
        let line = unwrap_stream_json(line);
        for piece in line.split('\n') {
            let cleaned = clean_line(piece);
            out.push_str(&cleaned);
            out.push('\n');
        }
    }
    // Collapse a trailing run of blank lines to a single newline.
    while out.ends_with("\n\n") {
        out.pop();
    }
    out
}

/// Unwrap a container-engine stream fragment (`{"stream":"…"}`) into its
/// payload text; other lines pass through unchanged.
fn unwrap_stream_json(line: &str) -> String {
    let trimmed = line.trim_start();
    if !trimmed.starts_with("{\"stream\":\"") {
        return line.to_string();
    }
    let inner = &trimmed["{\"stream\":\"".len()..];
    let inner = inner.strip_suffix("\"}").unwrap_or(inner);
    inner
        .replace("\\n", "\n")
        .replace("\\t", "\t")
        .replace("\\\"", "\"")
}

fn clean_line(line: &str) -> String {
    // Progress bars redraw in place; the last carriage-return segment is
    // what a terminal would actually show.
    let visible = line.rsplit('\r').next().unwrap_or(line);
    let stripped = strip_escape_sequences(visible);
    stripped.replace('\t', "  ")
}

/// Drop ANSI CSI sequences, the printable control-glyph artifacts some
/// engines emit (`␛`, `␈`), and every remaining control character.
fn strip_escape_sequences(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' || c == '␛' {
            // CSI sequence: optional '[' then parameter bytes up to a letter.
            if chars.peek() == Some(&'[') {
                chars.next();
                for param in chars.by_ref() {
                    if param.is_ascii_alphabetic() {
                        break;
                    }
                }
            }
            continue;
        }
        if c == '␈' || (c.is_control() && c != '\t') {
            continue;
        }
        out.push(c);
    }
    out
}
