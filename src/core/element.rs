//! Element-level scanning
//!
//! Builds on the byte cursor to locate whole elements: tag name,
//! attribute map, self-closing flag, and the byte range of the inner
//! content up to the matching close tag. Nothing here allocates a tree;
//! an [`ElementLocation`] is a transient descriptor valid for one call.
//!
//! DOCTYPE blocks are recognized case-insensitively and skipped
//! wholesale, including a bracketed internal subset. Entity declarations
//! inside them are never expanded.

use super::entities;
use super::limits::{MAX_ATTRIBUTES, MAX_NESTING_DEPTH, MAX_TOKEN_SIZE};
use super::scanner::{is_name_start_char, is_whitespace, Scanner};

/// Byte-offset descriptor of exactly one element.
///
/// Invariant: `open_start <= content_start <= content_end <= close_end`,
/// all within the document. Violations abort the operation that produced
/// the location rather than drive a splice.
#[derive(Debug, Clone)]
pub struct ElementLocation {
    /// Offset of the opening `<`.
    pub open_start: usize,
    /// First byte of the inner content (just past the opening tag's `>`).
    pub content_start: usize,
    /// One past the last byte of the inner content (the `<` of the close tag).
    pub content_end: usize,
    /// One past the close tag's `>`.
    pub close_end: usize,
    /// Element name as written in the document.
    pub name: String,
    /// Attributes in document order, entity-decoded values, unique keys.
    pub attributes: Vec<(String, String)>,
    /// True for `<name/>`.
    pub self_closing: bool,
}

impl ElementLocation {
    /// Offsets form a coherent, in-bounds range.
    pub fn is_coherent(&self, doc_len: usize) -> bool {
        self.open_start <= self.content_start
            && self.content_start <= self.content_end
            && self.content_end <= self.close_end
            && self.close_end <= doc_len
    }

    /// Look up an attribute value.
    pub fn attr(&self, name: &str, case_sensitive: bool) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| names_equal(k, name, case_sensitive))
            .map(|(_, v)| v.as_str())
    }
}

/// Compare two names under the configured case mode (ASCII fold).
#[inline]
pub fn names_equal(a: &str, b: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        a == b
    } else {
        a.eq_ignore_ascii_case(b)
    }
}

/// Advance the cursor to the `<` of the next element start at the current
/// scope, skipping text, whitespace, comments, processing instructions,
/// CDATA sections and DOCTYPE blocks. Returns false at a close tag or at
/// end of input.
pub fn skip_to_next_element_start(s: &mut Scanner) -> bool {
    loop {
        let lt = match s.find_byte(b'<') {
            Some(pos) => pos,
            None => {
                s.set_position(s.input().len());
                return false;
            }
        };
        s.set_position(lt);

        if s.starts_with(b"<!--") {
            skip_comment(s);
        } else if s.starts_with(b"<![CDATA[") {
            skip_cdata(s);
        } else if s.starts_with(b"<?") {
            skip_pi(s);
        } else if s.starts_with(b"<!") && Scanner::at(s.input(), lt + 2).starts_with_ignore_case(b"DOCTYPE") {
            skip_doctype(s);
        } else if s.starts_with(b"</") {
            return false;
        } else if s.peek_at(1).map(is_name_start_char).unwrap_or(false) {
            return true;
        } else {
            // Stray '<' in malformed input; step over it
            s.advance(1);
        }
    }
}

/// Skip `<!--...-->`. Unterminated comments consume the rest of the input.
pub fn skip_comment(s: &mut Scanner) {
    s.advance(4);
    loop {
        match s.find_byte(b'-') {
            Some(pos) => {
                s.set_position(pos);
                if s.starts_with(b"-->") {
                    s.advance(3);
                    return;
                }
                s.advance(1);
            }
            None => {
                s.set_position(s.input().len());
                return;
            }
        }
    }
}

/// Skip `<![CDATA[...]]>`.
pub fn skip_cdata(s: &mut Scanner) {
    s.advance(9);
    loop {
        match s.find_byte(b']') {
            Some(pos) => {
                s.set_position(pos);
                if s.starts_with(b"]]>") {
                    s.advance(3);
                    return;
                }
                s.advance(1);
            }
            None => {
                s.set_position(s.input().len());
                return;
            }
        }
    }
}

/// Skip `<?...?>`.
pub fn skip_pi(s: &mut Scanner) {
    s.advance(2);
    loop {
        match s.find_byte(b'?') {
            Some(pos) => {
                s.set_position(pos);
                if s.starts_with(b"?>") {
                    s.advance(2);
                    return;
                }
                s.advance(1);
            }
            None => {
                s.set_position(s.input().len());
                return;
            }
        }
    }
}

/// Skip a DOCTYPE block wholesale, tracking a bracketed internal subset
/// with nested `[`/`]`. Entity declarations inside are never expanded.
pub fn skip_doctype(s: &mut Scanner) {
    s.advance(2); // "<!"
    let mut bracket_depth = 0usize;
    while let Some(b) = s.next() {
        match b {
            b'[' => bracket_depth += 1,
            b']' => bracket_depth = bracket_depth.saturating_sub(1),
            b'>' if bracket_depth == 0 => return,
            _ => {}
        }
    }
}

/// Parse the element whose `<` sits at `at`. Returns None on malformed
/// input or a breached nesting ceiling — never an error.
pub fn parse_element_at(doc: &[u8], at: usize) -> Option<ElementLocation> {
    let mut s = Scanner::at(doc, at);
    if s.next() != Some(b'<') {
        return None;
    }
    let name = std::str::from_utf8(s.read_name()?).ok()?.to_string();

    let tag_end = s.find_tag_end_quoted()?;
    let self_closing = tag_end > at && doc[tag_end - 1] == b'/';
    let attr_slice_end = if self_closing { tag_end - 1 } else { tag_end };
    let attributes = parse_attributes(&doc[s.position()..attr_slice_end]);

    let content_start = tag_end + 1;
    if self_closing {
        return Some(ElementLocation {
            open_start: at,
            content_start,
            content_end: content_start,
            close_end: content_start,
            name,
            attributes,
            self_closing,
        });
    }

    let (content_end, close_end) = find_matching_close(doc, content_start, &name)?;
    let loc = ElementLocation {
        open_start: at,
        content_start,
        content_end,
        close_end,
        name,
        attributes,
        self_closing,
    };
    loc.is_coherent(doc.len()).then_some(loc)
}

/// Find the close tag matching an element whose content begins at
/// `content_start`. Returns (content_end, close_end).
///
/// Nested elements are tracked with a depth counter, not a re-entrant
/// parse; the depth ceiling turns runaway nesting into a None.
fn find_matching_close(doc: &[u8], content_start: usize, name: &str) -> Option<(usize, usize)> {
    let mut s = Scanner::at(doc, content_start);
    let mut depth = 0usize;

    loop {
        let lt = s.find_byte(b'<')?;
        s.set_position(lt);

        if s.starts_with(b"<!--") {
            skip_comment(&mut s);
        } else if s.starts_with(b"<![CDATA[") {
            skip_cdata(&mut s);
        } else if s.starts_with(b"<?") {
            skip_pi(&mut s);
        } else if s.starts_with(b"</") {
            s.advance(2);
            let close_name = s.read_name()?;
            s.skip_whitespace();
            if s.peek() != Some(b'>') {
                return None;
            }
            let close_end = s.position() + 1;
            if depth == 0 {
                // Close tag for the element we are matching
                if close_name != name.as_bytes() {
                    return None;
                }
                return Some((lt, close_end));
            }
            depth -= 1;
            s.set_position(close_end);
        } else if s.peek_at(1).map(is_name_start_char).unwrap_or(false) {
            // Nested open tag
            s.advance(1);
            s.read_name()?;
            let tag_end = s.find_tag_end_quoted()?;
            let nested_self_closing = doc[tag_end - 1] == b'/';
            if !nested_self_closing {
                depth += 1;
                if depth > MAX_NESTING_DEPTH {
                    return None;
                }
            }
            s.set_position(tag_end + 1);
        } else {
            s.advance(1);
        }
    }
}

/// Parse attributes from the raw bytes between the element name and the
/// tag's `>`. Lenient: unquoted values and valueless attributes are
/// accepted. Attributes beyond the per-element ceiling are parsed but not
/// retained; duplicate names keep the first occurrence.
pub fn parse_attributes(input: &[u8]) -> Vec<(String, String)> {
    let mut attrs: Vec<(String, String)> = Vec::new();
    let mut pos = 0;

    while pos < input.len() {
        while pos < input.len() && is_whitespace(input[pos]) {
            pos += 1;
        }
        if pos >= input.len() || input[pos] == b'/' || input[pos] == b'>' {
            break;
        }

        let name_start = pos;
        if !is_name_start_char(input[pos]) {
            pos += 1;
            continue;
        }
        while pos < input.len()
            && super::scanner::is_name_char(input[pos])
            && pos - name_start < MAX_TOKEN_SIZE
        {
            pos += 1;
        }
        let name = match std::str::from_utf8(&input[name_start..pos]) {
            Ok(n) => n.to_string(),
            Err(_) => continue,
        };

        while pos < input.len() && is_whitespace(input[pos]) {
            pos += 1;
        }

        if pos >= input.len() || input[pos] != b'=' {
            // Valueless attribute
            push_attr(&mut attrs, name, String::new());
            continue;
        }
        pos += 1; // '='
        while pos < input.len() && is_whitespace(input[pos]) {
            pos += 1;
        }
        if pos >= input.len() {
            push_attr(&mut attrs, name, String::new());
            break;
        }

        let quote = input[pos];
        let value = if quote == b'"' || quote == b'\'' {
            pos += 1;
            let value_start = pos;
            while pos < input.len() && input[pos] != quote {
                pos += 1;
            }
            let raw = &input[value_start..pos.min(input.len())];
            if pos < input.len() {
                pos += 1; // closing quote
            }
            entities::decode_to_string(raw)
        } else {
            // Unquoted value (non-standard but tolerated on the read path)
            let value_start = pos;
            while pos < input.len() && !is_whitespace(input[pos]) && input[pos] != b'/' {
                pos += 1;
            }
            entities::decode_to_string(&input[value_start..pos])
        };

        push_attr(&mut attrs, name, value);
    }

    attrs
}

fn push_attr(attrs: &mut Vec<(String, String)>, name: String, value: String) {
    if attrs.len() >= MAX_ATTRIBUTES {
        return;
    }
    if attrs.iter().any(|(k, _)| *k == name) {
        return;
    }
    attrs.push((name, value));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_element() {
        let doc = b"<item id=\"1\">hello</item>";
        let loc = parse_element_at(doc, 0).unwrap();
        assert_eq!(loc.name, "item");
        assert_eq!(loc.attr("id", true), Some("1"));
        assert_eq!(&doc[loc.content_start..loc.content_end], b"hello");
        assert_eq!(loc.close_end, doc.len());
        assert!(!loc.self_closing);
    }

    #[test]
    fn test_parse_self_closing() {
        let doc = b"<br/>tail";
        let loc = parse_element_at(doc, 0).unwrap();
        assert!(loc.self_closing);
        assert_eq!(loc.content_start, loc.content_end);
        assert_eq!(loc.close_end, 5);
    }

    #[test]
    fn test_parse_nested_same_name() {
        let doc = b"<a><a>x</a>y</a>z";
        let loc = parse_element_at(doc, 0).unwrap();
        assert_eq!(&doc[loc.content_start..loc.content_end], b"<a>x</a>y");
    }

    #[test]
    fn test_unclosed_element_is_none() {
        assert!(parse_element_at(b"<a><b>x</b>", 0).is_none());
    }

    #[test]
    fn test_mismatched_close_is_none() {
        assert!(parse_element_at(b"<a>x</b>", 0).is_none());
    }

    #[test]
    fn test_skip_to_next_element() {
        let doc = b"  <!-- c --> <?pi data?> <!DOCTYPE foo [ <!ENTITY x \"y\"> ]> <root/>";
        let mut s = Scanner::new(doc);
        assert!(skip_to_next_element_start(&mut s));
        assert!(s.starts_with(b"<root/>"));
    }

    #[test]
    fn test_skip_stops_at_close_tag() {
        let mut s = Scanner::new(b"  </parent>");
        assert!(!skip_to_next_element_start(&mut s));
    }

    #[test]
    fn test_attribute_cap() {
        let mut input = Vec::new();
        for i in 0..150 {
            input.extend_from_slice(format!(" a{}=\"v\"", i).as_bytes());
        }
        let attrs = parse_attributes(&input);
        assert_eq!(attrs.len(), MAX_ATTRIBUTES);
    }

    #[test]
    fn test_duplicate_attribute_keeps_first() {
        let attrs = parse_attributes(b" id=\"1\" id=\"2\"");
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].1, "1");
    }

    #[test]
    fn test_attribute_entity_decoded() {
        let attrs = parse_attributes(b" title=\"&lt;x&gt;\"");
        assert_eq!(attrs[0].1, "<x>");
    }

    #[test]
    fn test_doctype_bracket_tracking() {
        let doc = b"<!DOCTYPE r [ <!ELEMENT r (#PCDATA)> [nested] ]><r/>";
        let mut s = Scanner::new(doc);
        skip_doctype(&mut s);
        assert!(s.starts_with(b"<r/>"));
    }
}
