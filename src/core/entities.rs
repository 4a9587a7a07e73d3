//! Predefined entity escaping
//!
//! Exactly the five XML-predefined entities, both directions:
//! `&amp; &lt; &gt; &quot; &apos;`. Anything else — numeric character
//! references, DTD-declared entities — is left as literal text; this
//! crate never expands entities (XXE posture).
//!
//! Uses Cow for zero-copy when no substitution is needed.

use memchr::memchr;
use std::borrow::Cow;

/// Decode the five predefined entities in `input`.
///
/// Unknown or unterminated references stay literal. The single forward
/// pass means an `&amp;lt;` decodes to `&lt;` and is never re-decoded,
/// which is the "apply `&amp;` last" rule of sequential replacement.
pub fn decode(input: &[u8]) -> Cow<'_, [u8]> {
    // Fast path: no ampersand, nothing to decode
    if memchr(b'&', input).is_none() {
        return Cow::Borrowed(input);
    }

    let mut result = Vec::with_capacity(input.len());
    let mut pos = 0;

    while pos < input.len() {
        match memchr(b'&', &input[pos..]) {
            Some(amp) => {
                result.extend_from_slice(&input[pos..pos + amp]);
                pos += amp;
                let rest = &input[pos..];
                let (replacement, len) = match_entity(rest);
                match replacement {
                    Some(b) => {
                        result.push(b);
                        pos += len;
                    }
                    None => {
                        result.push(b'&');
                        pos += 1;
                    }
                }
            }
            None => {
                result.extend_from_slice(&input[pos..]);
                break;
            }
        }
    }

    Cow::Owned(result)
}

/// Match one of the five references at the start of `rest`.
fn match_entity(rest: &[u8]) -> (Option<u8>, usize) {
    if rest.starts_with(b"&lt;") {
        (Some(b'<'), 4)
    } else if rest.starts_with(b"&gt;") {
        (Some(b'>'), 4)
    } else if rest.starts_with(b"&quot;") {
        (Some(b'"'), 6)
    } else if rest.starts_with(b"&apos;") {
        (Some(b'\''), 6)
    } else if rest.starts_with(b"&amp;") {
        (Some(b'&'), 5)
    } else {
        (None, 0)
    }
}

/// Encode text for element content or attribute values.
pub fn encode(input: &str) -> Cow<'_, str> {
    // Fast path: check if any escaping needed
    if !input
        .bytes()
        .any(|b| matches!(b, b'<' | b'>' | b'&' | b'"' | b'\''))
    {
        return Cow::Borrowed(input);
    }

    let mut result = String::with_capacity(input.len() + 16);
    for c in input.chars() {
        match c {
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '&' => result.push_str("&amp;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&apos;"),
            _ => result.push(c),
        }
    }
    Cow::Owned(result)
}

/// Decode into an owned String, replacing invalid UTF-8 lossily.
pub fn decode_to_string(input: &[u8]) -> String {
    String::from_utf8_lossy(decode(input).as_ref()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_entities_borrows() {
        let result = decode(b"Hello, World!");
        assert!(matches!(result, Cow::Borrowed(_)));
        assert_eq!(result.as_ref(), b"Hello, World!");
    }

    #[test]
    fn test_five_entities() {
        let result = decode(b"&lt;a&gt; &amp; &quot;b&quot; &apos;c&apos;");
        assert_eq!(result.as_ref(), b"<a> & \"b\" 'c'");
    }

    #[test]
    fn test_no_double_unescape() {
        // &amp;lt; must become the literal text "&lt;", not "<"
        let result = decode(b"&amp;lt;");
        assert_eq!(result.as_ref(), b"&lt;");
    }

    #[test]
    fn test_unknown_entity_stays_literal() {
        let result = decode(b"&unknown; &#65;");
        assert_eq!(result.as_ref(), b"&unknown; &#65;");
    }

    #[test]
    fn test_encode() {
        assert_eq!(encode("<a> & \"b\""), "&lt;a&gt; &amp; &quot;b&quot;");
        assert!(matches!(encode("plain"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_roundtrip() {
        let original = "a < b && c > \"d\"";
        let encoded = encode(original);
        assert_eq!(decode_to_string(encoded.as_bytes()), original);
    }
}
