//! Custom matchers for input a single anchored pattern can't describe.
//!
//! ## Newline runs
//!
//! ```text
//! "\n"            -> NEWLINE
//! "\n  \n\t\n"    -> one NEWLINE (blank lines fold into the run)
//! "\n  x"         -> NEWLINE, then the indentation is left for IGNORE
//! ```
//!
//! ## String literals
//!
//! Either quote style, with backslash escapes. The closing quote must match
//! the opening one; an unterminated literal does not match at all.

/// Matches a run of line breaks, including blank lines between them.
///
/// Returns the byte length of the run, which always ends just after its last
/// `\n`.
pub fn newline_run(input: &str) -> Option<usize> {
    let bytes = input.as_bytes();
    let start = match bytes {
        [b'\n', ..] => 1,
        [b'\r', b'\n', ..] => 2,
        _ => return None,
    };

    let mut end = start;
    for (i, b) in bytes.iter().enumerate().skip(start) {
        match b {
            b'\n' => end = i + 1,
            b' ' | b'\t' | b'\r' => {}
            _ => break,
        }
    }
    Some(end)
}

/// Matches a quoted string literal.
pub fn string_literal(input: &str) -> Option<usize> {
    let mut chars = input.char_indices();
    let (_, quote) = chars.next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }

    let mut escaped = false;
    for (i, c) in chars {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Some(i + c.len_utf8());
        }
    }
    None
}

/// Strips the quotes from a string literal and resolves its escapes.
pub fn unquote(literal: &str) -> String {
    let inner = if literal.len() >= 2 {
        &literal[1..literal.len() - 1]
    } else {
        literal
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
