//! Path compiler
//!
//! Turns a raw path string into a [`CompiledPath`]: trailing `|@modifier`
//! calls are split off first, then the body is tokenized on unescaped
//! dots (dots inside `#(...)` and quoted literals do not split), then
//! each token becomes one typed segment.
//!
//! Pure string work; no document access.

use super::filter;
use super::segment::{CompiledPath, ModifierCall, PathSegment, SegmentKind, APPEND_INDEX};
use crate::core::limits::{MAX_FIELD_NAME_LEN, MAX_FILTER_EXPR_LEN, MAX_NS_PREFIX_LEN};
use crate::Error;

/// Compile a path string.
pub fn compile(path: &str) -> Result<CompiledPath, Error> {
    if path.is_empty() {
        return Err(Error::invalid_path("empty path"));
    }
    if path.bytes().any(|b| b < 0x20 || b == 0x7f) {
        return Err(Error::invalid_path("control character in path"));
    }

    let (body, modifier_part) = split_modifiers(path);
    if body.is_empty() {
        return Err(Error::invalid_path("empty path before modifiers"));
    }

    let modifiers = parse_modifiers(modifier_part)?;
    let tokens = tokenize(body)?;
    let segments = build_segments(&tokens)?;

    Ok(CompiledPath { segments, modifiers })
}

/// Split off the trailing modifier chain at the first top-level `|`.
fn split_modifiers(path: &str) -> (&str, Option<&str>) {
    let bytes = path.as_bytes();
    let mut depth = 0usize;
    let mut in_quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match in_quote {
            Some(q) => {
                if b == q {
                    in_quote = None;
                }
            }
            None => match b {
                b'\\' => i += 1,
                b'"' | b'\'' if depth > 0 => in_quote = Some(b),
                b'(' => depth += 1,
                b')' => depth = depth.saturating_sub(1),
                b'|' if depth == 0 => return (&path[..i], Some(&path[i + 1..])),
                _ => {}
            },
        }
        i += 1;
    }
    (path, None)
}

fn parse_modifiers(part: Option<&str>) -> Result<Vec<ModifierCall>, Error> {
    let part = match part {
        Some(p) => p,
        None => return Ok(Vec::new()),
    };

    // Calls are delimited by `|@`, not bare `|`, so an argument may
    // itself contain a pipe.
    let bytes = part.as_bytes();
    let mut calls = Vec::new();
    let mut start = 0usize;
    for i in 0..bytes.len() {
        if bytes[i] == b'|' && bytes.get(i + 1) == Some(&b'@') {
            calls.push(parse_modifier_call(&part[start..i])?);
            start = i + 1;
        }
    }
    calls.push(parse_modifier_call(&part[start..])?);
    Ok(calls)
}

fn parse_modifier_call(raw: &str) -> Result<ModifierCall, Error> {
    let raw = raw
        .strip_prefix('@')
        .ok_or_else(|| Error::invalid_path("modifier must start with '@'"))?;
    let (name, arg) = match raw.split_once(':') {
        Some((n, a)) => (n, Some(a.to_string())),
        None => (raw, None),
    };
    if name.is_empty()
        || !name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(Error::invalid_path("invalid modifier name"));
    }
    Ok(ModifierCall {
        name: name.to_string(),
        arg,
    })
}

/// Split the path body on unescaped top-level dots.
fn tokenize(body: &str) -> Result<Vec<String>, Error> {
    let bytes = body.as_bytes();
    let mut tokens = Vec::new();
    let mut start = 0usize;
    let mut depth = 0usize;
    let mut in_quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match in_quote {
            Some(q) => {
                if b == q {
                    in_quote = None;
                }
            }
            None => match b {
                b'\\' => i += 1, // escaped character stays in the token
                b'"' | b'\'' if depth > 0 => in_quote = Some(b),
                b'(' => depth += 1,
                b')' => depth = depth.saturating_sub(1),
                b'.' if depth == 0 => {
                    if i == start {
                        return Err(Error::invalid_path("empty path segment"));
                    }
                    tokens.push(body[start..i].to_string());
                    start = i + 1;
                }
                _ => {}
            },
        }
        i += 1;
    }

    if start >= bytes.len() {
        // Trailing dot
        return Err(Error::invalid_path("empty path segment"));
    }
    tokens.push(body[start..].to_string());
    Ok(tokens)
}

fn build_segments(tokens: &[String]) -> Result<Vec<PathSegment>, Error> {
    let mut segments = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        let tok = tokens[i].as_str();

        if tok == "#" {
            if i + 1 == tokens.len() {
                segments.push(PathSegment::bare(SegmentKind::Count));
            } else {
                // `#.field` — exactly one field token may follow
                if i + 2 != tokens.len() {
                    return Err(Error::invalid_path(
                        "nested paths after field extraction are not supported",
                    ));
                }
                let field = &tokens[i + 1];
                validate_field_name(field)?;
                segments.push(PathSegment::name(SegmentKind::FieldExtract, field.clone()));
                i += 2;
                continue;
            }
        } else if let Some(rest) = tok.strip_prefix("#(") {
            let (expr, all) = if let Some(e) = rest.strip_suffix(")#") {
                (e, true)
            } else if let Some(e) = rest.strip_suffix(')') {
                (e, false)
            } else {
                return Err(Error::invalid_path("unterminated filter expression"));
            };
            if expr.len() > MAX_FILTER_EXPR_LEN {
                return Err(Error::invalid_path("filter expression too long"));
            }
            segments.push(PathSegment::filter(filter::parse(expr)?, all));
        } else if tok == "*" {
            segments.push(PathSegment::bare(SegmentKind::Wildcard));
        } else if tok == "**" {
            segments.push(PathSegment::bare(SegmentKind::RecursiveWildcard));
        } else if tok == "%" {
            segments.push(PathSegment::bare(SegmentKind::DirectText));
        } else if let Some(name) = tok.strip_prefix('@') {
            let name = unescape(name);
            if name.is_empty() {
                return Err(Error::invalid_path("empty attribute name"));
            }
            check_prefix(&name)?;
            segments.push(PathSegment::name(SegmentKind::Attribute, name));
        } else if let Some(n) = parse_integer(tok) {
            if n >= 0 || n == APPEND_INDEX {
                segments.push(PathSegment::index(n));
            } else {
                return Err(Error::invalid_path(
                    "negative indexes are reserved for future use",
                ));
            }
        } else {
            let name = unescape(tok);
            check_prefix(&name)?;
            segments.push(PathSegment::name(SegmentKind::ElementName, name));
        }
        i += 1;
    }

    Ok(segments)
}

/// Parse a token that is entirely an optionally-signed integer.
fn parse_integer(tok: &str) -> Option<i64> {
    let digits = tok.strip_prefix('-').unwrap_or(tok);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    tok.parse().ok()
}

/// Remove one level of backslash escaping (`\.` → `.`).
fn unescape(tok: &str) -> String {
    if !tok.contains('\\') {
        return tok.to_string();
    }
    let mut out = String::with_capacity(tok.len());
    let mut chars = tok.chars();
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

/// A prefix-qualified name must carry a bounded prefix.
fn check_prefix(name: &str) -> Result<(), Error> {
    if let Some((prefix, _)) = name.split_once(':') {
        if prefix.len() > MAX_NS_PREFIX_LEN {
            return Err(Error::invalid_path("namespace prefix too long"));
        }
    }
    Ok(())
}

/// Field names are single names (`@attr`, `%`, or an element name);
/// traversal-like or control characters are rejected before any
/// extraction is attempted.
fn validate_field_name(field: &str) -> Result<(), Error> {
    if field.is_empty() || field.len() > MAX_FIELD_NAME_LEN {
        return Err(Error::invalid_path("invalid field extraction name"));
    }
    if field == "%" {
        return Ok(());
    }
    let name = field.strip_prefix('@').unwrap_or(field);
    if name.is_empty()
        || name.contains("..")
        || name.bytes().any(|b| b < 0x20 || b == b'/' || b == b'\\')
    {
        return Err(Error::invalid_path("invalid field extraction name"));
    }
    check_prefix(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(path: &str) -> Vec<SegmentKind> {
        compile(path).unwrap().segments.iter().map(|s| s.kind).collect()
    }

    #[test]
    fn test_simple_path() {
        assert_eq!(
            kinds("catalog.book.title"),
            vec![
                SegmentKind::ElementName,
                SegmentKind::ElementName,
                SegmentKind::ElementName
            ]
        );
    }

    #[test]
    fn test_mixed_segments() {
        let p = compile("root.item.0.@id").unwrap();
        assert_eq!(p.segments[2].kind, SegmentKind::Index);
        assert_eq!(p.segments[2].index, 0);
        assert_eq!(p.segments[3].kind, SegmentKind::Attribute);
        assert_eq!(p.segments[3].literal, "id");
    }

    #[test]
    fn test_escaped_dot_in_name() {
        let p = compile("root.a\\.b").unwrap();
        assert_eq!(p.segments[1].literal, "a.b");
    }

    #[test]
    fn test_count_final() {
        assert_eq!(
            kinds("root.item.#"),
            vec![
                SegmentKind::ElementName,
                SegmentKind::ElementName,
                SegmentKind::Count
            ]
        );
    }

    #[test]
    fn test_field_extraction() {
        let p = compile("root.item.#.title").unwrap();
        let last = p.segments.last().unwrap();
        assert_eq!(last.kind, SegmentKind::FieldExtract);
        assert_eq!(last.literal, "title");
    }

    #[test]
    fn test_field_extraction_too_deep() {
        assert!(compile("root.item.#.a.b").is_err());
    }

    #[test]
    fn test_filter_with_dot_in_subpath() {
        let p = compile("c.b.#(a.x==1).p").unwrap();
        assert_eq!(p.segments[2].kind, SegmentKind::Filter);
        assert_eq!(p.segments[2].filter.as_ref().unwrap().path, "a.x");
        assert_eq!(p.segments[3].kind, SegmentKind::ElementName);
    }

    #[test]
    fn test_filter_all_form() {
        let p = compile("c.b.#(x==1)#").unwrap();
        assert!(p.segments[2].filter_all);
    }

    #[test]
    fn test_append_index() {
        let p = compile("root.item.-1").unwrap();
        assert!(p.segments[2].is_append());
    }

    #[test]
    fn test_reserved_negative_index() {
        let err = compile("root.item.-2").unwrap_err();
        assert!(err.to_string().contains("reserved"));
    }

    #[test]
    fn test_dot_syntax_violations() {
        assert!(compile("").is_err());
        assert!(compile(".a").is_err());
        assert!(compile("a.").is_err());
        assert!(compile("a..b").is_err());
    }

    #[test]
    fn test_control_characters_rejected() {
        assert!(compile("a\0b").is_err());
        assert!(compile("a\tb").is_err());
    }

    #[test]
    fn test_modifiers() {
        let p = compile("root.item|@reverse|@pretty:  ").unwrap();
        assert_eq!(p.modifiers.len(), 2);
        assert_eq!(p.modifiers[0].name, "reverse");
        assert_eq!(p.modifiers[1].name, "pretty");
        assert_eq!(p.modifiers[1].arg.as_deref(), Some("  "));
    }

    #[test]
    fn test_modifier_arg_may_contain_pipe() {
        let p = compile("a|@join:x|y").unwrap();
        assert_eq!(p.modifiers.len(), 1);
        assert_eq!(p.modifiers[0].name, "join");
        assert_eq!(p.modifiers[0].arg.as_deref(), Some("x|y"));

        let p = compile("a|@join:x|y|@reverse").unwrap();
        assert_eq!(p.modifiers.len(), 2);
        assert_eq!(p.modifiers[0].arg.as_deref(), Some("x|y"));
        assert_eq!(p.modifiers[1].name, "reverse");
    }

    #[test]
    fn test_bad_modifier() {
        assert!(compile("a|reverse").is_err());
        assert!(compile("a|@").is_err());
    }

    #[test]
    fn test_field_name_traversal_rejected() {
        assert!(compile("a.#.b/c").is_err());
        assert!(compile("a.#.b\\\\c").is_err());
    }
}
