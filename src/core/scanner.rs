//! Byte-level document cursor
//!
//! A cursor over an immutable byte buffer with memchr-backed delimiter
//! searches (SIMD where available). Every query and every mutation owns
//! its own `Scanner`, so concurrent reads over one buffer need no
//! synchronization.
//!
//! Token-length ceilings are enforced inline: an over-long name is
//! truncated rather than turned into an error, per the crate's read-path
//! policy of bounding work instead of failing.

use super::limits::MAX_TOKEN_SIZE;
use memchr::memchr;

/// Cursor over a document byte buffer.
pub struct Scanner<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    #[inline]
    pub fn new(input: &'a [u8]) -> Self {
        Scanner { input, pos: 0 }
    }

    /// Cursor over `input` starting at `pos`.
    #[inline]
    pub fn at(input: &'a [u8], pos: usize) -> Self {
        Scanner {
            input,
            pos: pos.min(input.len()),
        }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos.min(self.input.len());
    }

    #[inline]
    pub fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    #[inline]
    pub fn input(&self) -> &'a [u8] {
        self.input
    }

    #[inline]
    pub fn slice(&self, start: usize, end: usize) -> &'a [u8] {
        let len = self.input.len();
        &self.input[start.min(len)..end.min(len)]
    }

    /// Peek at the current byte without advancing.
    #[inline]
    pub fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    /// Peek at the byte `offset` positions ahead.
    #[inline]
    pub fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    /// Consume and return the current byte.
    #[inline]
    pub fn next(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    #[inline]
    pub fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.input.len());
    }

    /// Skip space, tab, newline and carriage return.
    #[inline]
    pub fn skip_whitespace(&mut self) {
        while self.pos < self.input.len() {
            match self.input[self.pos] {
                b' ' | b'\t' | b'\n' | b'\r' => self.pos += 1,
                _ => break,
            }
        }
    }

    /// Find the next occurrence of `byte` at or after the cursor.
    #[inline]
    pub fn find_byte(&self, byte: u8) -> Option<usize> {
        memchr(byte, &self.input[self.pos..]).map(|i| self.pos + i)
    }

    #[inline]
    pub fn starts_with(&self, needle: &[u8]) -> bool {
        self.input[self.pos..].starts_with(needle)
    }

    /// Case-insensitive prefix check, used for DOCTYPE detection.
    #[inline]
    pub fn starts_with_ignore_case(&self, needle: &[u8]) -> bool {
        let rest = &self.input[self.pos..];
        rest.len() >= needle.len() && rest[..needle.len()].eq_ignore_ascii_case(needle)
    }

    /// Find the position of the `>` closing the current tag, skipping any
    /// `>` inside quoted attribute values.
    pub fn find_tag_end_quoted(&self) -> Option<usize> {
        let mut pos = self.pos;
        let mut in_single_quote = false;
        let mut in_double_quote = false;

        while pos < self.input.len() {
            match self.input[pos] {
                b'"' if !in_single_quote => in_double_quote = !in_double_quote,
                b'\'' if !in_double_quote => in_single_quote = !in_single_quote,
                b'>' if !in_single_quote && !in_double_quote => return Some(pos),
                _ => {}
            }
            pos += 1;
        }
        None
    }

    /// Read an XML name (letter/underscore/colon start, then name chars).
    /// Stops at the token-size ceiling.
    pub fn read_name(&mut self) -> Option<&'a [u8]> {
        let start = self.pos;
        let first = *self.input.get(start)?;
        if !is_name_start_char(first) {
            return None;
        }
        self.pos += 1;

        while self.pos < self.input.len()
            && is_name_char(self.input[self.pos])
            && self.pos - start < MAX_TOKEN_SIZE
        {
            self.pos += 1;
        }
        Some(&self.input[start..self.pos])
    }
}

/// Valid XML name start byte: ASCII letter, underscore, colon, or any
/// non-ASCII byte (multi-byte names are handled byte-wise).
#[inline]
pub fn is_name_start_char(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'_' | b':') || b >= 0x80
}

/// Valid XML name byte.
#[inline]
pub fn is_name_char(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' | b'.' | b':') || b >= 0x80
}

/// XML whitespace.
#[inline]
pub fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_name() {
        let mut scanner = Scanner::new(b"element-name>");
        assert_eq!(scanner.read_name(), Some(b"element-name" as &[u8]));
        assert_eq!(scanner.position(), 12);
    }

    #[test]
    fn test_read_name_rejects_digit_start() {
        let mut scanner = Scanner::new(b"1bad");
        assert_eq!(scanner.read_name(), None);
    }

    #[test]
    fn test_skip_whitespace() {
        let mut scanner = Scanner::new(b"  \t\n hello");
        scanner.skip_whitespace();
        assert_eq!(scanner.position(), 5);
    }

    #[test]
    fn test_find_tag_end_quoted() {
        let scanner = Scanner::new(b"<a attr=\">test\">content");
        assert_eq!(scanner.find_tag_end_quoted(), Some(15));
    }

    #[test]
    fn test_doctype_prefix_case_insensitive() {
        let scanner = Scanner::at(b"<!doctype html>", 2);
        assert!(scanner.starts_with_ignore_case(b"DOCTYPE"));
    }
}
