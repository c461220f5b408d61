//! Buffer helpers: line lookup, offsets and identifier words.
//!
//! Columns are counted in characters, not bytes.

use std::path::Path;

use flowide_types::{Position, Range};

/// An open buffer as the providers see it.
#[derive(Debug, Clone, Copy)]
pub struct Document<'a> {
    pub path: &'a Path,
    pub text: &'a str,
}

impl<'a> Document<'a> {
    #[must_use]
    pub fn new(path: &'a Path, text: &'a str) -> Self {
        Self { path, text }
    }

    /// Text of line `line` without its terminator.
    #[must_use]
    pub fn line(&self, line: u32) -> Option<&'a str> {
        self.text
            .split('\n')
            .nth(line as usize)
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
    }

    /// Byte offset of `position`, clamped to the end of its line and to the
    /// end of the buffer.
    #[must_use]
    pub fn offset_at(&self, position: Position) -> usize {
        let mut line_start = 0;
        for (index, raw) in self.text.split('\n').enumerate() {
            if index == position.line as usize {
                let content = raw.strip_suffix('\r').unwrap_or(raw);
                let within = content
                    .char_indices()
                    .nth(position.character as usize)
                    .map_or(content.len(), |(byte, _)| byte);
                return line_start + within;
            }
            line_start += raw.len() + 1;
        }
        self.text.len()
    }

    /// Range of the identifier touching `position`, if any. A word that ends
    /// right at the cursor counts.
    #[must_use]
    pub fn word_range_at(&self, position: Position) -> Option<Range> {
        let chars: Vec<char> = self.line(position.line)?.chars().collect();
        let cursor = position.character as usize;
        if cursor > chars.len() {
            return None;
        }

        let mut start = cursor;
        while start > 0 && is_word_char(chars[start - 1]) {
            start -= 1;
        }
        let mut end = cursor;
        while end < chars.len() && is_word_char(chars[end]) {
            end += 1;
        }
        if start == end {
            return None;
        }
        Some(Range::new(
            Position::new(position.line, start as u32),
            Position::new(position.line, end as u32),
        ))
    }

    #[must_use]
    pub fn slice(&self, range: Range) -> &'a str {
        let start = self.offset_at(range.start);
        let end = self.offset_at(range.end).max(start);
        &self.text[start..end]
    }
}

pub(crate) fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

pub(crate) fn basename(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document<'_> {
        Document::new(Path::new("/p/a.js"), text)
    }

    #[test]
    fn line_strips_terminators() {
        let d = doc("one\r\ntwo\nthree");
        assert_eq!(d.line(0), Some("one"));
        assert_eq!(d.line(1), Some("two"));
        assert_eq!(d.line(2), Some("three"));
        assert_eq!(d.line(3), None);
    }

    #[test]
    fn offsets_clamp_to_line_and_buffer() {
        let d = doc("ab\ncdé\nf");
        assert_eq!(d.offset_at(Position::new(0, 1)), 1);
        assert_eq!(d.offset_at(Position::new(1, 0)), 3);
        assert_eq!(d.offset_at(Position::new(1, 3)), 7);
        assert_eq!(d.offset_at(Position::new(1, 99)), 7);
        assert_eq!(d.offset_at(Position::new(9, 0)), d.text.len());
    }

    #[test]
    fn word_touching_cursor() {
        let d = doc("const fooBar = $el;");
        let range = d.word_range_at(Position::new(0, 9)).unwrap();
        assert_eq!(d.slice(range), "fooBar");
        // Cursor right after the word.
        let range = d.word_range_at(Position::new(0, 12)).unwrap();
        assert_eq!(d.slice(range), "fooBar");
        let range = d.word_range_at(Position::new(0, 16)).unwrap();
        assert_eq!(d.slice(range), "$el");
    }

    #[test]
    fn no_word_in_whitespace_or_punctuation() {
        let d = doc("a  = (b)");
        assert!(d.word_range_at(Position::new(0, 2)).is_none());
        assert!(d.word_range_at(Position::new(0, 99)).is_none());
        assert!(d.word_range_at(Position::new(4, 0)).is_none());
    }

    #[test]
    fn basename_of_checker_paths() {
        assert_eq!(basename("/p/src/a.js"), "a.js");
        assert_eq!(basename("a.js"), "a.js");
        assert_eq!(basename(""), "");
    }
}
