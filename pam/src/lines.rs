//! Byte-level line edits on a directive chain.
//!
//! Chains are edited as bytes, not strings: unrelated lines (including any
//! non-UTF-8 content, `\r\n` endings and a missing final newline) pass through
//! untouched.

/// Lines with their terminators. The last line may lack one.
fn split_lines(content: &[u8]) -> impl Iterator<Item = &[u8]> {
    content.split_inclusive(|&b| b == b'\n')
}

/// A line without its `\n` / `\r\n` terminator.
fn body(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Number of lines exactly equal to `directive`.
pub(crate) fn count_directive(content: &[u8], directive: &[u8]) -> usize {
    split_lines(content)
        .filter(|line| body(line) == directive)
        .count()
}

/// Whether `line` opens the given management group, e.g. `auth` or `-auth`.
///
/// Comments and blank lines never match.
pub(crate) fn is_entry_point(line: &[u8], entry_point: &str) -> bool {
    let trimmed = body(line).trim_ascii_start();
    if trimmed.is_empty() || trimmed.starts_with(b"#") {
        return false;
    }
    let token = trimmed
        .split(u8::is_ascii_whitespace)
        .next()
        .unwrap_or_default();
    let token = token.strip_prefix(b"-").unwrap_or(token);
    token == entry_point.as_bytes()
}

/// Insert `directive` right after the first entry-point line, or at the top
/// when there is none.
pub(crate) fn insert_directive(content: &[u8], directive: &[u8], entry_point: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + directive.len() + 2);
    let mut inserted = false;

    for line in split_lines(content) {
        out.extend_from_slice(line);
        if !inserted && is_entry_point(line, entry_point) {
            if !line.ends_with(b"\n") {
                out.push(b'\n');
            }
            out.extend_from_slice(directive);
            out.push(b'\n');
            inserted = true;
        }
    }

    if !inserted {
        let mut top = Vec::with_capacity(out.len() + directive.len() + 1);
        top.extend_from_slice(directive);
        top.push(b'\n');
        top.extend_from_slice(&out);
        out = top;
    }
    out
}

/// Drop every line exactly equal to `directive`; everything else is kept
/// byte-for-byte.
pub(crate) fn remove_directive(content: &[u8], directive: &[u8]) -> (Vec<u8>, usize) {
    let mut out = Vec::with_capacity(content.len());
    let mut removed = 0;
    for line in split_lines(content) {
        if body(line) == directive {
            removed += 1;
        } else {
            out.extend_from_slice(line);
        }
    }
    (out, removed)
}
