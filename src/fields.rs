//! Dotted field paths.
//!
//! Logical field names are dotted paths from the fact root (`nested1.description`).
//! A literal dot inside a document key is escaped as `\.`, a leading `$` as `\$`,
//! so that typed tags (`$S`, `$N`, ...) can never be confused with user keys.
//! The empty key is spelled `\e`. The root of a path is spelled `.`.

use nom::{
    branch::alt,
    bytes::complete::is_not,
    character::complete::{anychar, char},
    combinator::recognize,
    multi::{many0, separated_list0},
    sequence::preceded,
    IResult,
};

/// The root path.
pub const ROOT: &str = ".";

/// Segment standing for the empty document key.
const EMPTY_KEY: &str = "\\e";

/// Parse one escape sequence (`\x`).
fn parse_escape(input: &str) -> IResult<&str, &str> {
    recognize(preceded(char('\\'), anychar))(input)
}

/// Parse one raw segment, escapes left in place.
fn parse_segment(input: &str) -> IResult<&str, &str> {
    recognize(many0(alt((is_not(".\\"), parse_escape))))(input)
}

/// Parse a full path into raw segments.
fn parse_segments(input: &str) -> IResult<&str, Vec<&str>> {
    separated_list0(char('.'), parse_segment)(input)
}

/// Split a path into its raw (still escaped) segments, dropping empty ones.
pub fn split_raw(field: &str) -> Vec<&str> {
    if field.is_empty() || field == ROOT {
        return Vec::new();
    }
    match parse_segments(field) {
        Ok(("", segments)) => segments.into_iter().filter(|s| !s.is_empty()).collect(),
        // A dangling backslash: fall back to a plain split.
        _ => field.split('.').filter(|s| !s.is_empty()).collect(),
    }
}

/// Split a path into unescaped key names.
///
/// ```
/// use snowdoc::fields::split_field;
///
/// assert_eq!(split_field("a.b\\.c"), vec!["a", "b.c"]);
/// assert!(split_field(".").is_empty());
/// ```
pub fn split_field(field: &str) -> Vec<String> {
    split_raw(field).into_iter().map(unescape).collect()
}

/// Join unescaped key names into a path.
pub fn join_field<S: AsRef<str>>(keys: &[S]) -> String {
    if keys.is_empty() {
        return ROOT.to_string();
    }
    keys.iter()
        .map(|k| escape_key(k.as_ref()))
        .collect::<Vec<_>>()
        .join(".")
}

/// Escape a document key so it is a single path segment.
pub fn escape_key(key: &str) -> String {
    if key.is_empty() {
        return EMPTY_KEY.to_string();
    }
    let mut out = String::with_capacity(key.len());
    if key.starts_with('$') {
        out.push('\\');
    }
    for c in key.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '.' => out.push_str("\\."),
            _ => out.push(c),
        }
    }
    out
}

/// Remove escapes from a raw segment.
pub fn unescape(segment: &str) -> String {
    if segment == EMPTY_KEY {
        return String::new();
    }
    let mut out = String::with_capacity(segment.len());
    let mut chars = segment.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Append `suffix` to `prefix`; either side may be the root.
pub fn concat_field(prefix: &str, suffix: &str) -> String {
    if prefix.is_empty() || prefix == ROOT {
        if suffix.is_empty() {
            return ROOT.to_string();
        }
        return suffix.to_string();
    }
    if suffix.is_empty() || suffix == ROOT {
        return prefix.to_string();
    }
    format!("{}.{}", prefix, suffix)
}

/// True when `field` is `prefix` or lies under it.
pub fn startswith_field(field: &str, prefix: &str) -> bool {
    if prefix.is_empty() || prefix == ROOT {
        return true;
    }
    let field = split_raw(field);
    let prefix = split_raw(prefix);
    field.len() >= prefix.len() && field[..prefix.len()] == prefix[..]
}

/// `field` expressed relative to `parent`.
///
/// Fields outside `parent` get one leading dot per level climbed
/// (`relative_field("a.x", "a.b") == "..x"`).
pub fn relative_field(field: &str, parent: &str) -> String {
    if parent.is_empty() || parent == ROOT {
        return if field.is_empty() { ROOT.to_string() } else { field.to_string() };
    }
    let field_path = split_raw(field);
    let parent_path = split_raw(parent);
    let common = field_path
        .iter()
        .zip(parent_path.iter())
        .take_while(|(f, p)| f == p)
        .count();
    let rest = &field_path[common..];
    if common == parent_path.len() {
        if rest.is_empty() {
            return ROOT.to_string();
        }
        return rest.join(".");
    }
    let dots = ".".repeat(parent_path.len() - common);
    format!("{}.{}", dots, rest.join("."))
}

/// Normalize a relative name into an output property path.
///
/// Leading parent-dots are dropped; the root stays `.`.
pub fn property_name(name: &str) -> String {
    let trimmed = name.trim_start_matches('.');
    if trimmed.is_empty() {
        ROOT.to_string()
    } else {
        trimmed.to_string()
    }
}
