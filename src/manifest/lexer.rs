//! Comment- and string-aware scanning of manifest source text.
//!
//! The parser and the patcher never evaluate a manifest; they only need to know,
//! for every byte, whether it is code, part of a comment, or part of a string
//! literal. [`SourceMap`] computes that classification once with an explicit
//! state machine and then answers structural queries over it: matching brackets,
//! finding tokens in code, reading string literals, and splitting argument or
//! array lists at top-level commas.
//!
//! # States
//!
//! | State | Entered on | Left on |
//! |---|---|---|
//! | `Code` | start, end of any other state | - |
//! | `LineComment` | `//` | newline |
//! | `BlockComment(depth)` | `/*` (nests) | matching `*/` |
//! | `StringLiteral` | `"`, `"""`, `#"` | closing delimiter |
//!
//! String literals track a backslash-escape sub-state. A single-line literal
//! that reaches a newline without closing is treated as ended there, which
//! keeps one bad line from swallowing the rest of the file.
//!
//! All structural tokens are ASCII, so the scanner works on bytes: UTF-8
//! continuation bytes are never mistaken for delimiters.

use std::ops::Range;

/// Classification of one byte of source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharClass {
    /// Ordinary code, including whitespace between tokens.
    Code,
    /// Inside a line or block comment, delimiters included.
    Comment,
    /// Inside a string literal, quotes included.
    StringLiteral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexState {
    Code,
    LineComment,
    BlockComment {
        depth: u32,
    },
    StringLiteral {
        escaped: bool,
        multiline: bool,
        hashes: usize,
    },
}

/// Source text together with its per-byte classification.
#[derive(Debug, Clone)]
pub struct SourceMap<'a> {
    text: &'a str,
    classes: Vec<CharClass>,
    literals: Vec<Range<usize>>,
}

impl<'a> SourceMap<'a> {
    /// Classify every byte of `text`.
    #[must_use]
    pub fn new(text: &'a str) -> Self {
        let bytes = text.as_bytes();
        let len = bytes.len();
        let mut classes = vec![CharClass::Code; len];
        let mut literals = Vec::new();
        let mut literal_start = 0;
        let mut state = LexState::Code;
        let mut i = 0;

        while i < len {
            let b = bytes[i];
            match state {
                LexState::Code => {
                    if bytes[i..].starts_with(b"//") {
                        classes[i..i + 2].fill(CharClass::Comment);
                        state = LexState::LineComment;
                        i += 2;
                    } else if bytes[i..].starts_with(b"/*") {
                        classes[i..i + 2].fill(CharClass::Comment);
                        state = LexState::BlockComment {
                            depth: 1,
                        };
                        i += 2;
                    } else if b == b'"' || b == b'#' {
                        let hashes = bytes[i..].iter().take_while(|c| **c == b'#').count();
                        let quote_at = i + hashes;
                        if quote_at < len && bytes[quote_at] == b'"' {
                            let multiline = bytes[quote_at..].starts_with(b"\"\"\"");
                            let opener = hashes + if multiline { 3 } else { 1 };
                            classes[i..i + opener].fill(CharClass::StringLiteral);
                            literal_start = i;
                            state = LexState::StringLiteral {
                                escaped: false,
                                multiline,
                                hashes,
                            };
                            i += opener;
                        } else {
                            // `#if`, `#available` and friends are plain code
                            i += hashes.max(1);
                        }
                    } else {
                        i += 1;
                    }
                }
                LexState::LineComment => {
                    if b == b'\n' {
                        state = LexState::Code;
                    } else {
                        classes[i] = CharClass::Comment;
                    }
                    i += 1;
                }
                LexState::BlockComment {
                    depth,
                } => {
                    if bytes[i..].starts_with(b"/*") {
                        classes[i..i + 2].fill(CharClass::Comment);
                        state = LexState::BlockComment {
                            depth: depth + 1,
                        };
                        i += 2;
                    } else if bytes[i..].starts_with(b"*/") {
                        classes[i..i + 2].fill(CharClass::Comment);
                        state = if depth == 1 {
                            LexState::Code
                        } else {
                            LexState::BlockComment {
                                depth: depth - 1,
                            }
                        };
                        i += 2;
                    } else {
                        classes[i] = CharClass::Comment;
                        i += 1;
                    }
                }
                LexState::StringLiteral {
                    escaped,
                    multiline,
                    hashes,
                } => {
                    if escaped {
                        classes[i] = CharClass::StringLiteral;
                        state = LexState::StringLiteral {
                            escaped: false,
                            multiline,
                            hashes,
                        };
                        i += 1;
                    } else if b == b'\\' && hashes == 0 {
                        classes[i] = CharClass::StringLiteral;
                        state = LexState::StringLiteral {
                            escaped: true,
                            multiline,
                            hashes,
                        };
                        i += 1;
                    } else if let Some(closer) = closing_delimiter_len(&bytes[i..], multiline, hashes) {
                        classes[i..i + closer].fill(CharClass::StringLiteral);
                        literals.push(literal_start..i + closer);
                        state = LexState::Code;
                        i += closer;
                    } else if b == b'\n' && !multiline {
                        // unterminated single-line literal ends at the newline
                        literals.push(literal_start..i);
                        state = LexState::Code;
                        i += 1;
                    } else {
                        classes[i] = CharClass::StringLiteral;
                        i += 1;
                    }
                }
            }
        }

        if matches!(state, LexState::StringLiteral { .. }) {
            literals.push(literal_start..len);
        }

        Self {
            text,
            classes,
            literals,
        }
    }

    /// The underlying text.
    #[must_use]
    pub const fn text(&self) -> &'a str {
        self.text
    }

    /// Length of the text in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Whether the text is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Classification of the byte at `idx`.
    #[must_use]
    pub fn class_at(&self, idx: usize) -> Option<CharClass> {
        self.classes.get(idx).copied()
    }

    /// Whether the byte at `idx` is code.
    #[must_use]
    pub fn is_code(&self, idx: usize) -> bool {
        self.class_at(idx) == Some(CharClass::Code)
    }

    fn byte(&self, idx: usize) -> u8 {
        self.text.as_bytes()[idx]
    }

    /// Index of the bracket closing the one at `open`.
    ///
    /// Only code brackets count. Returns `None` if `open` is not a code bracket,
    /// if a closer of the wrong kind is met first, or if the text ends first.
    #[must_use]
    pub fn find_matching(&self, open: usize) -> Option<usize> {
        if !self.is_code(open) || closer_for(self.byte(open)).is_none() {
            return None;
        }
        let mut stack: Vec<u8> = Vec::new();
        for idx in open..self.len() {
            if !self.is_code(idx) {
                continue;
            }
            let b = self.byte(idx);
            if let Some(closer) = closer_for(b) {
                stack.push(closer);
            } else if matches!(b, b')' | b']' | b'}') {
                if stack.pop() != Some(b) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(idx);
                }
            }
        }
        None
    }

    /// Every code position in `range` where `needle` starts.
    #[must_use]
    pub fn code_occurrences(&self, needle: &str, range: Range<usize>) -> Vec<usize> {
        let end = range.end.min(self.len());
        let haystack = &self.text.as_bytes()[..end];
        let needle = needle.as_bytes();
        let mut found = Vec::new();
        if needle.is_empty() || range.start >= end {
            return found;
        }
        let mut idx = range.start;
        while idx + needle.len() <= end {
            let in_code = (idx..idx + needle.len()).all(|i| self.is_code(i));
            if in_code && haystack[idx..].starts_with(needle) {
                found.push(idx);
                idx += needle.len();
            } else {
                idx += 1;
            }
        }
        found
    }

    /// Start positions of `.name(` calls in code within `range`.
    ///
    /// Whitespace is allowed between the name and the parenthesis. The returned
    /// pair is `(dot_index, open_paren_index)`.
    #[must_use]
    pub fn member_calls(&self, name: &str, range: Range<usize>) -> Vec<(usize, usize)> {
        let pattern = format!(".{name}");
        self.code_occurrences(&pattern, range)
            .into_iter()
            .filter_map(|dot| {
                let after = dot + pattern.len();
                if after < self.len() && is_ident_byte(self.byte(after)) {
                    return None;
                }
                let paren = self.skip_trivia(after, self.len())?;
                (self.byte(paren) == b'(').then_some((dot, paren))
            })
            .collect()
    }

    /// First position at or after `from` (and before `to`) that is neither
    /// whitespace nor comment.
    #[must_use]
    pub fn skip_trivia(&self, from: usize, to: usize) -> Option<usize> {
        (from..to.min(self.len())).find(|&i| self.is_significant(i))
    }

    /// Last position before `before` (and at or after `floor`) that is neither
    /// whitespace nor comment.
    #[must_use]
    pub fn last_significant_before(&self, before: usize, floor: usize) -> Option<usize> {
        (floor..before.min(self.len())).rev().find(|&i| self.is_significant(i))
    }

    fn is_significant(&self, idx: usize) -> bool {
        self.class_at(idx) != Some(CharClass::Comment) && !self.byte(idx).is_ascii_whitespace()
    }

    /// Read the string literal whose opening delimiter starts at `start`.
    ///
    /// Returns the byte range of the whole literal and its unescaped contents.
    #[must_use]
    pub fn string_literal_at(&self, start: usize) -> Option<(Range<usize>, String)> {
        let slot = self.literals.binary_search_by_key(&start, |r| r.start).ok()?;
        let range = self.literals[slot].clone();
        let raw = &self.text[range.clone()];
        let hashes = raw.bytes().take_while(|b| *b == b'#').count();
        let quotes = if raw[hashes..].starts_with("\"\"\"") { 3 } else { 1 };
        let opener = hashes + quotes;
        let closer = format!("{}{}", "\"".repeat(quotes), "#".repeat(hashes));
        let inner = if raw.len() >= opener + closer.len() && raw.ends_with(&closer) {
            &raw[opener..raw.len() - closer.len()]
        } else {
            raw.get(opener..).unwrap_or("")
        };
        let value = if hashes == 0 { unescape(inner) } else { inner.to_string() };
        Some((range, value))
    }

    /// Position just past the `label:` argument label found at depth zero inside
    /// the bracket pair `open..close`.
    ///
    /// `open` and `close` are the indices of the brackets themselves.
    #[must_use]
    pub fn find_label(&self, open: usize, close: usize, label: &str) -> Option<usize> {
        self.top_level_positions(open, close).into_iter().find_map(|idx| {
            if !self.text.as_bytes()[idx..close].starts_with(label.as_bytes()) {
                return None;
            }
            if idx > 0 && is_ident_byte(self.byte(idx - 1)) {
                return None;
            }
            let after = idx + label.len();
            if after < close && is_ident_byte(self.byte(after)) {
                return None;
            }
            let colon = self.skip_trivia(after, close)?;
            (self.byte(colon) == b':').then_some(colon + 1)
        })
    }

    /// Positions of depth-zero code bytes strictly between `open` and `close`.
    fn top_level_positions(&self, open: usize, close: usize) -> Vec<usize> {
        let mut depth = 0usize;
        let mut positions = Vec::new();
        for idx in open + 1..close.min(self.len()) {
            if !self.is_code(idx) {
                continue;
            }
            let b = self.byte(idx);
            if closer_for(b).is_some() {
                if depth == 0 {
                    positions.push(idx);
                }
                depth += 1;
            } else if matches!(b, b')' | b']' | b'}') {
                depth = depth.saturating_sub(1);
            } else if depth == 0 {
                positions.push(idx);
            }
        }
        positions
    }

    /// Split the contents of the bracket pair `open..close` at depth-zero commas.
    ///
    /// Each range is trimmed of surrounding whitespace and comments; empty
    /// elements (such as the slot after a trailing comma) are omitted.
    #[must_use]
    pub fn split_top_level(&self, open: usize, close: usize) -> Vec<Range<usize>> {
        let mut elements = Vec::new();
        let mut depth = 0usize;
        let mut start = open + 1;
        for idx in open + 1..close.min(self.len()) {
            if !self.is_code(idx) {
                continue;
            }
            match self.byte(idx) {
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => depth = depth.saturating_sub(1),
                b',' if depth == 0 => {
                    if let Some(range) = self.trim_range(start, idx) {
                        elements.push(range);
                    }
                    start = idx + 1;
                }
                _ => {}
            }
        }
        if let Some(range) = self.trim_range(start, close) {
            elements.push(range);
        }
        elements
    }

    fn trim_range(&self, start: usize, end: usize) -> Option<Range<usize>> {
        let first = self.skip_trivia(start, end)?;
        let last = self.last_significant_before(end, first)?;
        Some(first..last + 1)
    }

    /// Leading whitespace of the line containing `idx`.
    #[must_use]
    pub fn line_indent(&self, idx: usize) -> &'a str {
        let line_start = self.text[..idx.min(self.len())].rfind('\n').map_or(0, |p| p + 1);
        let rest = &self.text[line_start..];
        let width = rest.len() - rest.trim_start_matches([' ', '\t']).len();
        &self.text[line_start..line_start + width]
    }

    /// Whether `a..b` spans a line break.
    #[must_use]
    pub fn spans_lines(&self, a: usize, b: usize) -> bool {
        self.text[a.min(self.len())..b.min(self.len())].contains('\n')
    }

    /// Position of the end of the line containing `idx` (the newline, or the end of text).
    #[must_use]
    pub fn line_end(&self, idx: usize) -> usize {
        let idx = idx.min(self.len());
        self.text.get(idx..).and_then(|rest| rest.find('\n')).map_or(self.len(), |p| idx + p)
    }
}

fn closing_delimiter_len(rest: &[u8], multiline: bool, hashes: usize) -> Option<usize> {
    let quotes = if multiline { 3 } else { 1 };
    if rest.len() < quotes + hashes {
        return None;
    }
    let (q, h) = rest[..quotes + hashes].split_at(quotes);
    (q.iter().all(|b| *b == b'"') && h.iter().all(|b| *b == b'#')).then_some(quotes + hashes)
}

const fn closer_for(b: u8) -> Option<u8> {
    match b {
        b'(' => Some(b')'),
        b'[' => Some(b']'),
        b'{' => Some(b'}'),
        _ => None,
    }
}

/// Whether `b` can appear in a Swift identifier (ASCII subset).
#[must_use]
pub const fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
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

#[cfg(test)]
mod tests {
    use super::*;

    fn classes(text: &str) -> String {
        let map = SourceMap::new(text);
        (0..text.len())
            .map(|i| match map.class_at(i).unwrap() {
                CharClass::Code => 'c',
                CharClass::Comment => '/',
                CharClass::StringLiteral => 's',
            })
            .collect()
    }

    #[test]
    fn test_classifies_comments_and_strings() {
        assert_eq!(classes(r#"a "b" // c"#), "ccsssc////");
        assert_eq!(classes("a /* b */ c"), "cc///////cc");
    }

    #[test]
    fn test_nested_block_comments() {
        let text = "x /* a /* b */ ( */ (y)";
        let map = SourceMap::new(text);
        let paren = text.rfind('(').unwrap();
        assert!(map.is_code(paren));
        assert!(!map.is_code(text.find('(').unwrap()));
        assert_eq!(map.find_matching(paren), Some(text.len() - 1));
    }

    #[test]
    fn test_escaped_quote_stays_in_string() {
        let text = r#"f("a\"(b", c)"#;
        let map = SourceMap::new(text);
        assert_eq!(map.find_matching(1), Some(text.len() - 1));
    }

    #[test]
    fn test_brackets_inside_strings_ignored() {
        let text = r#".target(name: "A)]", dependencies: ["[B"])"#;
        let map = SourceMap::new(text);
        let open = text.find('(').unwrap();
        assert_eq!(map.find_matching(open), Some(text.len() - 1));
    }

    #[test]
    fn test_unterminated_string_recovers_at_newline() {
        let text = "a(\"oops\n)";
        let map = SourceMap::new(text);
        assert_eq!(map.find_matching(1), Some(text.len() - 1));
    }

    #[test]
    fn test_unbalanced_returns_none() {
        let text = "a(b[c)";
        let map = SourceMap::new(text);
        assert_eq!(map.find_matching(1), None);

        let text = "a(b(c)";
        let map = SourceMap::new(text);
        assert_eq!(map.find_matching(1), None);
    }

    #[test]
    fn test_multiline_string() {
        let text = "x = \"\"\"\n  ( \" \n\"\"\"\ny(z)";
        let map = SourceMap::new(text);
        let first_paren = text.find('(').unwrap();
        assert!(!map.is_code(first_paren));
        let call = text.rfind('(').unwrap();
        assert!(map.is_code(call));
    }

    #[test]
    fn test_raw_string() {
        let text = r###"a(#"x " ) \"#, b)"###;
        let map = SourceMap::new(text);
        assert_eq!(map.find_matching(1), Some(text.len() - 1));
        let (range, value) = map.string_literal_at(2).unwrap();
        assert_eq!(value, r#"x " ) \"#);
        assert_eq!(&text[range], r##"#"x " ) \"#"##);
    }

    #[test]
    fn test_hash_directives_are_code() {
        let text = "#if os(Linux)\nlet x = 1\n#endif";
        let map = SourceMap::new(text);
        assert!(map.is_code(text.find('(').unwrap()));
    }

    #[test]
    fn test_string_literal_at_unescapes() {
        let text = r#"name: "Core\"Kit", x"#;
        let map = SourceMap::new(text);
        let (range, value) = map.string_literal_at(6).unwrap();
        assert_eq!(value, "Core\"Kit");
        assert_eq!(&text[range], r#""Core\"Kit""#);
    }

    #[test]
    fn test_adjacent_literals_are_separate() {
        let text = r#"["A","B"]"#;
        let map = SourceMap::new(text);
        let (_, first) = map.string_literal_at(1).unwrap();
        assert_eq!(first, "A");
        let (_, second) = map.string_literal_at(5).unwrap();
        assert_eq!(second, "B");
    }

    #[test]
    fn test_member_calls_require_exact_name() {
        let text = ".target (name: \"A\"), .targetItem(x), .target(name: \"B\")";
        let map = SourceMap::new(text);
        let calls = map.member_calls("target", 0..text.len());
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, 0);
    }

    #[test]
    fn test_member_calls_skip_comments() {
        let text = "// .target(name: \"X\")\n.target(name: \"Y\")";
        let map = SourceMap::new(text);
        let calls = map.member_calls("target", 0..text.len());
        assert_eq!(calls.len(), 1);
    }

    #[test]
    fn test_find_label_top_level_only() {
        let text = r#"(name: "A", dependencies: [.product(name: "B", package: "c")], path: "p")"#;
        let map = SourceMap::new(text);
        let close = text.len() - 1;
        let name = map.find_label(0, close, "name").unwrap();
        assert_eq!(&text[name..name + 5], " \"A\",");
        let path = map.find_label(0, close, "path").unwrap();
        assert!(text[path..].starts_with(" \"p\""));
        assert!(map.find_label(0, close, "package").is_none());
    }

    #[test]
    fn test_split_top_level_with_trailing_comma_and_comments() {
        let text = "[\n  \"A\", // first\n  .product(name: \"B\", package: \"b\"),\n  /* gone */\n]";
        let map = SourceMap::new(text);
        let parts: Vec<&str> =
            map.split_top_level(0, text.len() - 1).into_iter().map(|r| &text[r]).collect();
        assert_eq!(parts, vec!["\"A\"", ".product(name: \"B\", package: \"b\")"]);
    }

    #[test]
    fn test_split_empty_array() {
        let text = "[ /* nothing */ ]";
        let map = SourceMap::new(text);
        assert!(map.split_top_level(0, text.len() - 1).is_empty());
    }

    #[test]
    fn test_line_helpers() {
        let text = "a\n    b(c)\n";
        let map = SourceMap::new(text);
        let b = text.find('b').unwrap();
        assert_eq!(map.line_indent(b), "    ");
        assert_eq!(map.line_end(b), text.len() - 1);
        assert!(map.spans_lines(0, b));
        assert!(!map.spans_lines(b, b + 3));
    }

    #[test]
    fn test_line_end_past_text_is_clamped() {
        let text = "a\nb";
        let map = SourceMap::new(text);
        assert_eq!(map.line_end(text.len()), text.len());
        assert_eq!(map.line_end(text.len() + 10), text.len());
    }

    #[test]
    fn test_adversarial_inputs_do_not_panic() {
        let inputs = [
            "\"",
            "\"\"\"",
            "/*",
            "/* /* */",
            "(((",
            ")))",
            "#",
            "##\"",
            "\\",
            "\"\\",
            ".target(",
            "[\"a\", \"b\"",
            "é(\"ü\")ö",
        ];
        for input in inputs {
            let map = SourceMap::new(input);
            for i in 0..input.len() {
                let _ = map.find_matching(i);
                let _ = map.string_literal_at(i);
            }
            let _ = map.member_calls("target", 0..input.len());
            if !input.is_empty() {
                let _ = map.split_top_level(0, input.len());
            }
        }
    }
}
