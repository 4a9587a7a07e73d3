//! Well-formedness checking
//!
//! A standalone tag-stack walk called eagerly by every mutation entry
//! point. Queries never use it; they degrade instead of erroring.
//! Multi-root fragments are accepted; repeated root names are an
//! array-like structure, not an error.
//!
//! The same walk, with injection checks switched on, vets raw fragments
//! before they are spliced into a document.

use crate::core::element;
use crate::core::limits::MAX_DOCUMENT_SIZE;
use crate::core::scanner::{is_name_start_char, is_whitespace, Scanner};

/// Outcome of validating a document. `line`/`column` are 1-based and
/// meaningful only when `ok` is false.
#[derive(Debug, Clone)]
pub struct Validity {
    pub ok: bool,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl Validity {
    fn ok() -> Self {
        Validity {
            ok: true,
            line: 0,
            column: 0,
            message: String::new(),
        }
    }
}

/// Validate a whole document.
pub fn validate(doc: &[u8]) -> Validity {
    match check(doc) {
        Ok(()) => Validity::ok(),
        Err((pos, message)) => {
            let (line, column) = line_column(doc, pos);
            Validity {
                ok: false,
                line,
                column,
                message,
            }
        }
    }
}

/// Internal check used by the mutation path: Err carries byte offset and
/// message.
pub(crate) fn check(doc: &[u8]) -> Result<(), (usize, String)> {
    if doc.len() > MAX_DOCUMENT_SIZE {
        return Err((0, "document exceeds size ceiling".to_string()));
    }
    walk(doc, false)
}

/// Vet a raw fragment: balanced tags, no DOCTYPE, no ENTITY declaration,
/// no nested CDATA. Err carries a message only.
pub(crate) fn check_fragment(frag: &[u8]) -> Result<(), String> {
    walk(frag, true).map_err(|(_, msg)| msg)
}

fn walk(doc: &[u8], fragment_rules: bool) -> Result<(), (usize, String)> {
    let mut s = Scanner::new(doc);
    let mut stack: Vec<(String, usize)> = Vec::new();

    while !s.is_eof() {
        let lt = match s.find_byte(b'<') {
            Some(pos) => pos,
            None => break, // trailing text
        };
        s.set_position(lt);

        if s.starts_with(b"<!--") {
            element::skip_comment(&mut s);
            if s.is_eof() && !doc.ends_with(b"-->") {
                return Err((lt, "unterminated comment".to_string()));
            }
        } else if s.starts_with(b"<![CDATA[") {
            s.advance(9);
            let content_start = s.position();
            let end = find_subsequence(doc, content_start, b"]]>")
                .ok_or_else(|| (lt, "unterminated CDATA section".to_string()))?;
            if fragment_rules
                && find_subsequence(&doc[content_start..end], 0, b"<![CDATA[").is_some()
            {
                return Err((lt, "nested CDATA section in fragment".to_string()));
            }
            s.set_position(end + 3);
        } else if s.starts_with(b"<!")
            && Scanner::at(doc, lt + 2).starts_with_ignore_case(b"DOCTYPE")
        {
            if fragment_rules {
                return Err((lt, "DOCTYPE not allowed in fragment".to_string()));
            }
            element::skip_doctype(&mut s);
            if s.is_eof() && doc.last() != Some(&b'>') {
                return Err((lt, "unterminated DOCTYPE".to_string()));
            }
        } else if s.starts_with(b"<!") {
            if fragment_rules && Scanner::at(doc, lt + 2).starts_with_ignore_case(b"ENTITY") {
                return Err((lt, "ENTITY declaration not allowed in fragment".to_string()));
            }
            return Err((lt, "invalid declaration".to_string()));
        } else if s.starts_with(b"<?") {
            element::skip_pi(&mut s);
            if s.is_eof() && !doc.ends_with(b"?>") {
                return Err((lt, "unterminated processing instruction".to_string()));
            }
        } else if s.starts_with(b"</") {
            s.advance(2);
            let name = s
                .read_name()
                .ok_or_else(|| (lt, "invalid name in closing tag".to_string()))?;
            let name = std::str::from_utf8(name)
                .map_err(|_| (lt, "invalid name in closing tag".to_string()))?;
            s.skip_whitespace();
            if s.next() != Some(b'>') {
                return Err((lt, "malformed closing tag".to_string()));
            }
            match stack.pop() {
                Some((open_name, _)) if open_name == name => {}
                Some((open_name, _)) => {
                    return Err((
                        lt,
                        format!("closing tag </{}> does not match <{}>", name, open_name),
                    ));
                }
                None => {
                    return Err((lt, format!("closing tag </{}> has no opening tag", name)));
                }
            }
        } else if s.peek_at(1).map(is_name_start_char).unwrap_or(false) {
            s.advance(1);
            let name = match s.read_name().and_then(|n| std::str::from_utf8(n).ok()) {
                Some(n) => n.to_string(),
                None => return Err((lt, "invalid element name".to_string())),
            };
            let tag_end = s
                .find_tag_end_quoted()
                .ok_or_else(|| (lt, "unterminated tag".to_string()))?;
            let self_closing = doc[tag_end - 1] == b'/';
            let attr_end = if self_closing { tag_end - 1 } else { tag_end };
            check_attributes(doc, s.position(), attr_end)?;
            if !self_closing {
                stack.push((name, lt));
            }
            s.set_position(tag_end + 1);
        } else {
            return Err((lt, "stray '<' in content".to_string()));
        }
    }

    if let Some((name, pos)) = stack.pop() {
        return Err((pos, format!("unclosed element <{}>", name)));
    }
    Ok(())
}

/// Attribute syntax within one tag: `name = "value"` pairs, quoted
/// values, unique names.
fn check_attributes(doc: &[u8], start: usize, end: usize) -> Result<(), (usize, String)> {
    let slice = &doc[start..end];
    let mut names: Vec<&[u8]> = Vec::new();
    let mut pos = 0usize;
    while pos < slice.len() {
        while pos < slice.len() && is_whitespace(slice[pos]) {
            pos += 1;
        }
        if pos >= slice.len() {
            break;
        }
        let attr_start = pos;
        if !is_name_start_char(slice[pos]) {
            return Err((start + pos, "invalid attribute name".to_string()));
        }
        while pos < slice.len() && crate::core::scanner::is_name_char(slice[pos]) {
            pos += 1;
        }
        let name = &slice[attr_start..pos];
        if names.contains(&name) {
            return Err((start + attr_start, "duplicate attribute".to_string()));
        }
        names.push(name);
        while pos < slice.len() && is_whitespace(slice[pos]) {
            pos += 1;
        }
        if pos >= slice.len() || slice[pos] != b'=' {
            return Err((start + attr_start, "attribute missing value".to_string()));
        }
        pos += 1;
        while pos < slice.len() && is_whitespace(slice[pos]) {
            pos += 1;
        }
        let quote = match slice.get(pos) {
            Some(&q @ (b'"' | b'\'')) => q,
            _ => return Err((start + pos, "attribute value must be quoted".to_string())),
        };
        pos += 1;
        while pos < slice.len() && slice[pos] != quote {
            if slice[pos] == b'<' {
                return Err((start + pos, "'<' in attribute value".to_string()));
            }
            pos += 1;
        }
        if pos >= slice.len() {
            return Err((start + attr_start, "unterminated attribute value".to_string()));
        }
        pos += 1;
    }
    Ok(())
}

fn find_subsequence(haystack: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| from + i)
}

/// 1-based line and column of a byte offset.
fn line_column(doc: &[u8], pos: usize) -> (usize, usize) {
    let pos = pos.min(doc.len());
    let mut line = 1usize;
    let mut col = 1usize;
    for &b in &doc[..pos] {
        if b == b'\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}
