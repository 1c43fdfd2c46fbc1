//! Canonical formatting of configuration source.
//!
//! The formatter is line-oriented: it re-indents by nesting depth,
//! normalizes `key = value` spacing and block headers, aligns the `=` of
//! consecutive attributes, and collapses blank lines. Comments and string
//! contents are preserved.

use crate::parser::{ParseError, parse_source};

const INDENT: &str = "  ";

/// Formats `text` canonically.
///
/// # Errors
///
/// Returns the syntax error if the text does not parse; invalid source is
/// never rewritten.
pub fn format_source(filename: &str, text: &str) -> Result<String, ParseError> {
    let _ = parse_source(filename, text)?;
    Ok(format_lines(text))
}

#[derive(Debug)]
enum Line {
    Blank,
    /// Kept as-is apart from trailing whitespace (inside block comments).
    Verbatim(String),
    Code {
        depth: usize,
        text: String,
    },
    Attribute {
        depth: usize,
        key: String,
        rest: String,
    },
}

#[derive(Debug, Default)]
struct LineScan {
    opens: usize,
    closes: usize,
    leading_closers: usize,
    /// Byte offset where a trailing comment starts.
    comment_at: Option<usize>,
    unclosed_block_comment: bool,
}

fn format_lines(text: &str) -> String {
    let mut lines = Vec::new();
    let mut depth = 0usize;
    let mut in_block_comment = false;

    for raw in text.lines() {
        if in_block_comment {
            lines.push(Line::Verbatim(raw.trim_end().to_string()));
            if raw.contains("*/") {
                in_block_comment = false;
            }
            continue;
        }
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            lines.push(Line::Blank);
            continue;
        }

        let scan = scan_line(trimmed);
        let line_depth = depth.saturating_sub(scan.leading_closers);
        depth = (depth + scan.opens).saturating_sub(scan.closes);
        in_block_comment = scan.unclosed_block_comment;

        if let Some((key, rest)) = split_attribute(trimmed) {
            lines.push(Line::Attribute {
                depth: line_depth,
                key: key.to_string(),
                rest: rest.to_string(),
            });
        } else if trimmed.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
            lines.push(Line::Code {
                depth: line_depth,
                text: normalize_header(trimmed, scan.comment_at),
            });
        } else {
            lines.push(Line::Code {
                depth: line_depth,
                text: trimmed.to_string(),
            });
        }
    }

    render(&lines)
}

fn render(lines: &[Line]) -> String {
    let mut out = String::new();
    let mut pending_blank = false;
    let mut i = 0;

    while i < lines.len() {
        match &lines[i] {
            Line::Blank => {
                pending_blank = !out.is_empty();
                i += 1;
                continue;
            }
            Line::Attribute { depth, .. } => {
                // A run of attributes at one depth shares an `=` column.
                let run_depth = *depth;
                let mut end = i;
                while let Some(Line::Attribute { depth, .. }) = lines.get(end) {
                    if *depth != run_depth {
                        break;
                    }
                    end += 1;
                }
                let width = lines[i..end]
                    .iter()
                    .filter_map(|l| match l {
                        Line::Attribute { key, .. } => Some(key.chars().count()),
                        _ => None,
                    })
                    .max()
                    .unwrap_or(0);
                flush_blank(&mut out, &mut pending_blank);
                for line in &lines[i..end] {
                    if let Line::Attribute { depth, key, rest } = line {
                        push_indent(&mut out, *depth);
                        let pad = width - key.chars().count();
                        out.push_str(key);
                        out.push_str(&" ".repeat(pad));
                        if rest.is_empty() {
                            out.push_str(" =\n");
                        } else {
                            out.push_str(" = ");
                            out.push_str(rest);
                            out.push('\n');
                        }
                    }
                }
                i = end;
                continue;
            }
            Line::Code { depth, text } => {
                flush_blank(&mut out, &mut pending_blank);
                push_indent(&mut out, *depth);
                out.push_str(text);
                out.push('\n');
            }
            Line::Verbatim(text) => {
                flush_blank(&mut out, &mut pending_blank);
                out.push_str(text);
                out.push('\n');
            }
        }
        i += 1;
    }
    out
}

fn flush_blank(out: &mut String, pending: &mut bool) {
    if *pending {
        out.push('\n');
        *pending = false;
    }
}

fn push_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}

fn scan_line(line: &str) -> LineScan {
    let b = line.as_bytes();
    let mut scan = LineScan::default();
    let mut leading = true;
    let mut i = 0;

    while i < b.len() {
        match b[i] {
            b'"' => {
                leading = false;
                i = skip_string(b, i);
                continue;
            }
            b'#' => {
                scan.comment_at = Some(i);
                break;
            }
            b'/' if b.get(i + 1) == Some(&b'/') => {
                scan.comment_at = Some(i);
                break;
            }
            b'/' if b.get(i + 1) == Some(&b'*') => {
                if let Some(end) = line[i + 2..].find("*/") {
                    i += end + 4;
                    continue;
                }
                scan.comment_at = Some(i);
                scan.unclosed_block_comment = true;
                break;
            }
            b'{' | b'[' | b'(' => {
                leading = false;
                scan.opens += 1;
            }
            b'}' | b']' | b')' => {
                if leading {
                    scan.leading_closers += 1;
                }
                scan.closes += 1;
            }
            b' ' | b'\t' | b',' => {}
            _ => leading = false,
        }
        i += 1;
    }
    scan
}

/// Returns the index just past the string literal starting at `i`.
fn skip_string(b: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    while i < b.len() {
        match b[i] {
            b'\\' => i += 2,
            b'"' => return i + 1,
            b'$' if b.get(i + 1) == Some(&b'$') => i += 2,
            b'$' if b.get(i + 1) == Some(&b'{') => i = skip_interpolation(b, i + 2),
            _ => i += 1,
        }
    }
    b.len()
}

fn skip_interpolation(b: &[u8], start: usize) -> usize {
    let mut depth = 0usize;
    let mut i = start;
    while i < b.len() {
        match b[i] {
            b'"' => {
                i = skip_string(b, i);
                continue;
            }
            b'{' => depth += 1,
            b'}' => {
                if depth == 0 {
                    return i + 1;
                }
                depth -= 1;
            }
            _ => {}
        }
        i += 1;
    }
    b.len()
}

/// Splits `key = rest` lines. The key is an identifier or a quoted string.
fn split_attribute(line: &str) -> Option<(&str, &str)> {
    let b = line.as_bytes();
    let key_end = if b.first() == Some(&b'"') {
        skip_string(b, 0)
    } else {
        line.find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
            .unwrap_or(line.len())
    };
    if key_end == 0 || !line.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_' || c == '"') {
        return None;
    }
    let after = line[key_end..].trim_start();
    let rest = after.strip_prefix('=')?;
    if rest.starts_with('=') {
        return None;
    }
    Some((&line[..key_end], rest.trim()))
}

/// Collapses whitespace between header tokens and spaces the opening brace.
fn normalize_header(line: &str, comment_at: Option<usize>) -> String {
    let (code, comment) = match comment_at {
        Some(at) => (line[..at].trim_end(), Some(&line[at..])),
        None => (line, None),
    };
    let b = code.as_bytes();
    let mut out = String::with_capacity(code.len());
    let mut i = 0;
    while i < b.len() {
        match b[i] {
            b'"' => {
                let end = skip_string(b, i);
                out.push_str(&code[i..end]);
                i = end;
                continue;
            }
            b' ' | b'\t' => {
                if !out.ends_with(' ') {
                    out.push(' ');
                }
            }
            b'{' => {
                if !out.is_empty() && !out.ends_with(' ') {
                    out.push(' ');
                }
                out.push('{');
            }
            _ => {
                let ch_len = code[i..].chars().next().map_or(1, char::len_utf8);
                out.push_str(&code[i..i + ch_len]);
                i += ch_len;
                continue;
            }
        }
        i += 1;
    }
    let mut out = out.trim_end().to_string();
    if let Some(comment) = comment {
        out.push(' ');
        out.push_str(comment);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(src: &str) -> String {
        format_source("main.mtl", src).expect("should format")
    }

    #[test]
    fn reindents_and_aligns() {
        let src = "resource   \"null_resource\"  \"a\"{\ntriggers = {\na = 1\nlong_key    =   \"x\"\n}\n  keep=\"2\"\n}\n";
        let want = "resource \"null_resource\" \"a\" {\n  triggers = {\n    a        = 1\n    long_key = \"x\"\n  }\n  keep = \"2\"\n}\n";
        assert_eq!(fmt(src), want);
    }

    #[test]
    fn collapses_blank_lines_and_trailing_space() {
        let src = "\n\nvariable \"a\" {}   \n\n\n\nvariable \"b\" {}\n\n\n";
        assert_eq!(fmt(src), "variable \"a\" {}\n\nvariable \"b\" {}\n");
    }

    #[test]
    fn formatted_source_is_stable() {
        let src = "output \"x\" {\n  value       = \"${var.a}-{b}\" # note\n  description = \"d\"\n}\n";
        assert_eq!(fmt(src), src);
    }

    #[test]
    fn braces_in_strings_do_not_change_depth() {
        let src = "variable \"a\" {\ndefault = \"}{\"\n}\n";
        assert_eq!(fmt(src), "variable \"a\" {\n  default = \"}{\"\n}\n");
    }

    #[test]
    fn block_comments_are_kept() {
        let src = "/* header\n   stays */\nvariable \"a\" {}\n";
        assert_eq!(fmt(src), src);
    }

    #[test]
    fn alignment_breaks_at_other_lines() {
        let src = "a = 1\n# c\nlonger = 2\n";
        assert_eq!(fmt(src), "a = 1\n# c\nlonger = 2\n");
    }

    #[test]
    fn invalid_source_is_not_formatted() {
        let err = format_source("bad.mtl", "resource {").expect_err("should fail");
        assert_eq!(err.range.filename, "bad.mtl");
    }
}
