//! The extended string operation set: splitting, trimming, padding,
//! escaping, wildcard matching, and shell-style command-line splitting.

use super::{Str, unicode};

/// Options for [`Str::split_with_options`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SplitOptions {
    /// Keep empty pieces between adjacent matches.
    pub keep_empty: bool,
}

/// Options for [`Str::wildcard_match`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WildcardOptions {
    /// `/` (and `\` when backslash escapes are off) may not be matched by
    /// `*` or `?`.
    pub filename_mode: bool,
    /// `\` in the pattern escapes the character after it.
    pub backslash_escapes: bool,
    /// Compare using Unicode case folding.
    pub case_insensitive: bool,
}

impl Str {
    /// Splits on a literal pattern. `limit` bounds the number of splits
    /// (0 = no limit); the remainder lands in the final piece.
    #[must_use]
    pub fn split_with_options(&self, pattern: &Self, limit: i64, options: SplitOptions) -> Vec<Self> {
        let mut pieces = Vec::new();
        if pattern.is_empty() {
            pieces.push(self.clone());
            return pieces;
        }
        let mut remaining = if limit <= 0 { i64::MAX } else { limit };
        let mut position = 0;
        while remaining > 0 {
            let Some(found) = self.index_of(pattern, position) else {
                break;
            };
            if found > position || options.keep_empty {
                pieces.push(self.substring(position, found - position));
            }
            position = found + pattern.len();
            remaining -= 1;
        }
        if position < self.len() || options.keep_empty {
            pieces.push(self.substring_at(position));
        }
        pieces
    }

    /// Splits on a literal pattern, discarding empty pieces.
    #[must_use]
    pub fn split(&self, pattern: &Self) -> Vec<Self> {
        self.split_with_options(pattern, 0, SplitOptions::default())
    }

    /// Counts non-overlapping occurrences of `pattern` at or after `start`.
    #[must_use]
    pub fn count_of(&self, pattern: &Self, start: usize) -> i64 {
        if pattern.is_empty() {
            return 0;
        }
        let mut count = 0;
        let mut i = start;
        while let Some(found) = self.index_of(pattern, i) {
            count += 1;
            i = found + pattern.len();
        }
        count
    }

    /// Everything after the first occurrence of `pattern` at or after
    /// `start`, or `None` when the pattern never occurs.
    #[must_use]
    pub fn after(&self, pattern: &Self, start: usize) -> Option<Self> {
        self.index_of(pattern, start).map(|i| self.substring_at(i + pattern.len()))
    }

    /// Everything before the first occurrence of `pattern`.
    #[must_use]
    pub fn before(&self, pattern: &Self, start: usize) -> Option<Self> {
        self.index_of(pattern, start).map(|i| self.substring(0, i))
    }

    /// Everything after the last occurrence of `pattern`.
    #[must_use]
    pub fn after_last(&self, pattern: &Self, start: usize) -> Option<Self> {
        self.last_index_of(pattern, start).map(|i| self.substring_at(i + pattern.len()))
    }

    /// Everything before the last occurrence of `pattern`.
    #[must_use]
    pub fn before_last(&self, pattern: &Self, start: usize) -> Option<Self> {
        self.last_index_of(pattern, start).map(|i| self.substring(0, i))
    }

    /// Reverses the bytes, with no regard for UTF-8 sequences.
    #[must_use]
    pub fn raw_reverse(&self) -> Self {
        let mut bytes: Vec<u8> = self.as_bytes().to_vec();
        bytes.reverse();
        Self::from_bytes(bytes)
    }

    /// Reverses the code points, keeping each UTF-8 sequence intact.
    #[must_use]
    pub fn reverse(&self) -> Self {
        let mut sequences = Vec::new();
        let bytes = self.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            let (_, len) = unicode::decode_code_point(bytes, i);
            sequences.push(&bytes[i..i + len]);
            i += len;
        }
        let mut out = Vec::with_capacity(bytes.len());
        for seq in sequences.iter().rev() {
            out.extend_from_slice(seq);
        }
        Self::from_bytes(out)
    }

    /// Pads the start with `pad_char` until the string is at least
    /// `min_length` bytes.
    #[must_use]
    pub fn pad_start(&self, min_length: usize, pad_char: u8) -> Self {
        if self.len() >= min_length {
            return self.clone();
        }
        let mut out = vec![pad_char; min_length - self.len()];
        out.extend_from_slice(self.as_bytes());
        Self::from_bytes(out)
    }

    /// Pads the end with `pad_char` until the string is at least
    /// `min_length` bytes.
    #[must_use]
    pub fn pad_end(&self, min_length: usize, pad_char: u8) -> Self {
        if self.len() >= min_length {
            return self.clone();
        }
        let mut out = self.as_bytes().to_vec();
        out.resize(min_length, pad_char);
        Self::from_bytes(out)
    }

    /// Pads both ends, the extra odd byte going on the end.
    #[must_use]
    pub fn pad_center(&self, min_length: usize, pad_char: u8) -> Self {
        if self.len() >= min_length {
            return self.clone();
        }
        let total = min_length - self.len();
        let front = total / 2;
        let mut out = vec![pad_char; front];
        out.extend_from_slice(self.as_bytes());
        out.resize(min_length, pad_char);
        Self::from_bytes(out)
    }

    /// Trims bytes ≤ 0x20 from either end.
    #[must_use]
    pub fn trim_whitespace(&self, trim_start: bool, trim_end: bool) -> Self {
        let bytes = self.as_bytes();
        let mut start = 0;
        let mut end = bytes.len();
        if trim_start {
            while start < end && bytes[start] <= 0x20 {
                start += 1;
            }
        }
        if trim_end {
            while end > start && bytes[end - 1] <= 0x20 {
                end -= 1;
            }
        }
        Self::from_bytes(&bytes[start..end])
    }

    /// Collapses runs of whitespace (bytes ≤ 0x20) into single spaces and
    /// trims both ends.
    #[must_use]
    pub fn compact_whitespace(&self) -> Self {
        let mut out = Vec::with_capacity(self.len());
        let mut in_space = true; // true so leading whitespace is dropped
        for &b in self.as_bytes() {
            if b <= 0x20 {
                if !in_space {
                    out.push(b' ');
                    in_space = true;
                }
            } else {
                out.push(b);
                in_space = false;
            }
        }
        if out.last() == Some(&b' ') {
            out.pop();
        }
        Self::from_bytes(out)
    }

    /// Replaces every newline (CR, LF, CRLF, or LFCR) with `replacement`.
    #[must_use]
    pub fn replace_newlines(&self, replacement: &Self) -> Self {
        let bytes = self.as_bytes();
        let mut out = Vec::with_capacity(self.len());
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'\r' => {
                    out.extend_from_slice(replacement.as_bytes());
                    i += if bytes.get(i + 1) == Some(&b'\n') { 2 } else { 1 };
                }
                b'\n' => {
                    out.extend_from_slice(replacement.as_bytes());
                    i += if bytes.get(i + 1) == Some(&b'\r') { 2 } else { 1 };
                }
                b => {
                    out.push(b);
                    i += 1;
                }
            }
        }
        Self::from_bytes(out)
    }

    /// Splits into lines at CR, LF, CRLF, or LFCR boundaries. The line
    /// terminators are not included in the output.
    #[must_use]
    pub fn split_newlines(&self) -> Vec<Self> {
        let bytes = self.as_bytes();
        let mut lines = Vec::new();
        let mut line_start = 0;
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'\r' => {
                    lines.push(self.substring(line_start, i - line_start));
                    i += if bytes.get(i + 1) == Some(&b'\n') { 2 } else { 1 };
                    line_start = i;
                }
                b'\n' => {
                    lines.push(self.substring(line_start, i - line_start));
                    i += if bytes.get(i + 1) == Some(&b'\r') { 2 } else { 1 };
                    line_start = i;
                }
                _ => i += 1,
            }
        }
        lines.push(self.substring_at(line_start));
        lines
    }

    /// Joins path components, deduplicating slashes at the joins.
    #[must_use]
    pub fn slash_append(pieces: &[Self]) -> Self {
        let mut out: Vec<u8> = Vec::new();
        for piece in pieces {
            if piece.is_empty() {
                continue;
            }
            let mut bytes = piece.as_bytes();
            if !out.is_empty() {
                let had_slash = out.last() == Some(&b'/');
                while bytes.first() == Some(&b'/') {
                    bytes = &bytes[1..];
                }
                if !had_slash {
                    out.push(b'/');
                }
            }
            out.extend_from_slice(bytes);
        }
        Self::from_bytes(out)
    }

    /// Escapes backslashes, quotes, and control characters C-style.
    #[must_use]
    pub fn add_c_slashes(&self) -> Self {
        let mut out = Vec::with_capacity(self.len());
        for &b in self.as_bytes() {
            match b {
                b'\\' => out.extend_from_slice(b"\\\\"),
                b'"' => out.extend_from_slice(b"\\\""),
                b'\'' => out.extend_from_slice(b"\\'"),
                0 => out.extend_from_slice(b"\\0"),
                7 => out.extend_from_slice(b"\\a"),
                8 => out.extend_from_slice(b"\\b"),
                9 => out.extend_from_slice(b"\\t"),
                10 => out.extend_from_slice(b"\\n"),
                11 => out.extend_from_slice(b"\\v"),
                12 => out.extend_from_slice(b"\\f"),
                13 => out.extend_from_slice(b"\\r"),
                b if b < 0x20 => {
                    out.extend_from_slice(format!("\\x{b:02X}").as_bytes());
                }
                b => out.push(b),
            }
        }
        Self::from_bytes(out)
    }

    /// Undoes [`Str::add_c_slashes`]. Unrecognized escapes pass the escaped
    /// character through unchanged.
    #[must_use]
    pub fn strip_c_slashes(&self) -> Self {
        let bytes = self.as_bytes();
        let mut out = Vec::with_capacity(self.len());
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] != b'\\' || i + 1 >= bytes.len() {
                out.push(bytes[i]);
                i += 1;
                continue;
            }
            i += 1;
            match bytes[i] {
                b'0' => out.push(0),
                b'a' => out.push(7),
                b'b' => out.push(8),
                b't' => out.push(9),
                b'n' => out.push(10),
                b'v' => out.push(11),
                b'f' => out.push(12),
                b'r' => out.push(13),
                b'x' => {
                    let hi = bytes.get(i + 1).and_then(|b| char::from(*b).to_digit(16));
                    let lo = bytes.get(i + 2).and_then(|b| char::from(*b).to_digit(16));
                    if let (Some(hi), Some(lo)) = (hi, lo) {
                        out.push((hi * 16 + lo) as u8);
                        i += 2;
                    } else {
                        out.push(b'x');
                    }
                }
                other => out.push(other),
            }
            i += 1;
        }
        Self::from_bytes(out)
    }

    /// The classic ROT-13 transform on ASCII letters.
    #[must_use]
    pub fn rot13(&self) -> Self {
        let mut out = self.as_bytes().to_vec();
        for b in &mut out {
            *b = match *b {
                b'a'..=b'z' => (*b - b'a' + 13) % 26 + b'a',
                b'A'..=b'Z' => (*b - b'A' + 13) % 26 + b'A',
                other => other,
            };
        }
        Self::from_bytes(out)
    }

    /// Escapes regex metacharacters so the result matches this string
    /// literally.
    #[must_use]
    pub fn regex_escape(&self) -> Self {
        let mut out = Vec::with_capacity(self.len());
        for &b in self.as_bytes() {
            if matches!(
                b,
                b'.' | b'\\' | b'+' | b'*' | b'?' | b'[' | b'^' | b']' | b'$' | b'(' | b')' | b'{' | b'}' | b'='
                    | b'!' | b'<' | b'>' | b'|' | b':' | b'-' | b'#'
            ) {
                out.push(b'\\');
            }
            out.push(b);
        }
        Self::from_bytes(out)
    }

    /// Simple wildcard matching: `*` matches zero or more characters, `?`
    /// matches exactly one. See [`WildcardOptions`] for the filename,
    /// backslash-escape, and case-insensitive modes.
    #[must_use]
    pub fn wildcard_match(pattern: &Self, text: &Self, options: WildcardOptions) -> bool {
        if options.case_insensitive {
            let pattern = pattern.case_fold();
            let text = text.case_fold();
            return wildcard_match_inner(pattern.as_bytes(), text.as_bytes(), options);
        }
        wildcard_match_inner(pattern.as_bytes(), text.as_bytes(), options)
    }

    /// Splits a command line into arguments, honoring single and double
    /// quotes, with backslash escapes recognized only inside quotes (for
    /// the quote character and backslash itself).
    #[must_use]
    pub fn split_command_line(&self) -> Vec<Self> {
        let bytes = self.as_bytes();
        let mut args = Vec::new();
        let mut current: Vec<u8> = Vec::new();
        let mut i = 0;
        while i < bytes.len() {
            let ch = bytes[i];
            if ch <= 0x20 {
                if !current.is_empty() {
                    args.push(Self::from_bytes(std::mem::take(&mut current)));
                }
                i += 1;
                while i < bytes.len() && bytes[i] <= 0x20 {
                    i += 1;
                }
            } else if ch == b'"' || ch == b'\'' {
                let quote = ch;
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    if bytes[i] == b'\\' && i + 1 < bytes.len() {
                        current.push(bytes[i + 1]);
                        i += 2;
                    } else {
                        current.push(bytes[i]);
                        i += 1;
                    }
                }
                // Discard the trailing quote mark.
                if i < bytes.len() {
                    i += 1;
                }
            } else {
                let start = i;
                while i < bytes.len() && bytes[i] > 0x20 && bytes[i] != b'"' && bytes[i] != b'\'' {
                    i += 1;
                }
                current.extend_from_slice(&bytes[start..i]);
            }
        }
        if !current.is_empty() {
            args.push(Self::from_bytes(current));
        }
        args
    }
}

fn is_path_separator(b: u8, options: WildcardOptions) -> bool {
    options.filename_mode && (b == b'/' || (b == b'\\' && !options.backslash_escapes))
}

fn wildcard_match_inner(mut pattern: &[u8], mut text: &[u8], options: WildcardOptions) -> bool {
    while let Some((&pattern_char, rest)) = pattern.split_first() {
        pattern = rest;
        match pattern_char {
            b'?' => {
                let Some((&text_char, text_rest)) = text.split_first() else {
                    return false;
                };
                if is_path_separator(text_char, options) {
                    return false;
                }
                text = text_rest;
            }
            b'*' => {
                // Consume trailing '*' and '?' runs; each '?' demands one
                // mandatory filler character.
                while let Some(&next) = pattern.first() {
                    if next == b'?' {
                        let Some((&text_char, text_rest)) = text.split_first() else {
                            return false;
                        };
                        if is_path_separator(text_char, options) {
                            return false;
                        }
                        pattern = &pattern[1..];
                        text = text_rest;
                    } else if next == b'*' {
                        pattern = &pattern[1..];
                    } else {
                        break;
                    }
                }

                // A trailing star consumes the rest of the text (unless it
                // would have to swallow a path separator).
                let Some(&next_raw) = pattern.first() else {
                    return !text.iter().any(|&b| is_path_separator(b, options));
                };

                // The character the star-scan is looking for, honoring
                // backslash escapes in the pattern.
                let next_char = if options.backslash_escapes && next_raw == b'\\' && pattern.len() > 1 {
                    pattern[1]
                } else {
                    next_raw
                };

                while let Some((&text_char, text_rest)) = text.split_first() {
                    if is_path_separator(text_char, options) {
                        // The star cannot cross a path separator; the rest
                        // of the pattern must match from here.
                        return wildcard_match_inner(pattern, text, options);
                    }
                    if text_char == next_char && wildcard_match_inner(pattern, text, options) {
                        return true;
                    }
                    text = text_rest;
                }
                return false;
            }
            b'\\' if options.backslash_escapes => {
                let Some((&escaped, rest)) = pattern.split_first() else {
                    return false; // bad pattern
                };
                pattern = rest;
                let Some((&text_char, text_rest)) = text.split_first() else {
                    return false;
                };
                if escaped != text_char {
                    return false;
                }
                text = text_rest;
            }
            literal => {
                let Some((&text_char, text_rest)) = text.split_first() else {
                    return false;
                };
                if literal != text_char {
                    return false;
                }
                text = text_rest;
            }
        }
    }
    text.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_with_limit_and_empties() {
        let s = Str::from("1,2,,4");
        let comma = Str::from(",");
        let pieces = s.split(&comma);
        assert_eq!(pieces, vec![Str::from("1"), Str::from("2"), Str::from("4")]);
        let pieces = s.split_with_options(&comma, 0, SplitOptions { keep_empty: true });
        assert_eq!(pieces, vec![Str::from("1"), Str::from("2"), Str::empty(), Str::from("4")]);
        let pieces = Str::from("1,2,3,4,5").split_with_options(&comma, 2, SplitOptions::default());
        assert_eq!(pieces, vec![Str::from("1"), Str::from("2"), Str::from("3,4,5")]);
    }

    #[test]
    fn before_and_after() {
        let s = Str::from("a/b/c");
        let slash = Str::from("/");
        assert_eq!(s.after(&slash, 0), Some(Str::from("b/c")));
        assert_eq!(s.before(&slash, 0), Some(Str::from("a")));
        assert_eq!(s.after_last(&slash, s.len()), Some(Str::from("c")));
        assert_eq!(s.before_last(&slash, s.len()), Some(Str::from("a/b")));
        assert_eq!(s.after(&Str::from("x"), 0), None);
    }

    #[test]
    fn reverse_keeps_utf8_sequences() {
        assert_eq!(Str::from("héllo").reverse(), Str::from("olléh"));
        assert_eq!(Str::from("abc").raw_reverse(), Str::from("cba"));
    }

    #[test]
    fn padding() {
        let s = Str::from("ab");
        assert_eq!(s.pad_start(5, b'.'), Str::from("...ab"));
        assert_eq!(s.pad_end(5, b'.'), Str::from("ab..."));
        assert_eq!(s.pad_center(5, b'.'), Str::from(".ab.."));
        assert_eq!(s.pad_center(2, b'.'), s);
    }

    #[test]
    fn whitespace_handling() {
        assert_eq!(Str::from("  a  b  ").trim_whitespace(true, true), Str::from("a  b"));
        assert_eq!(Str::from("  a \t\n b  ").compact_whitespace(), Str::from("a b"));
    }

    #[test]
    fn newline_forms() {
        let s = Str::from("a\r\nb\nc\rd\n\re");
        let lines = s.split_newlines();
        assert_eq!(
            lines,
            vec![Str::from("a"), Str::from("b"), Str::from("c"), Str::from("d"), Str::from("e")]
        );
        assert_eq!(s.replace_newlines(&Str::from("|")), Str::from("a|b|c|d|e"));
    }

    #[test]
    fn slash_append_dedupes() {
        let joined = Str::slash_append(&[Str::from("a/"), Str::from("/b"), Str::from("c")]);
        assert_eq!(joined, Str::from("a/b/c"));
    }

    #[test]
    fn c_slashes_round_trip() {
        let s = Str::from("a\"b\\c\nd\x01");
        let escaped = s.add_c_slashes();
        assert_eq!(escaped, Str::from("a\\\"b\\\\c\\nd\\x01"));
        assert_eq!(escaped.strip_c_slashes(), s);
    }

    #[test]
    fn rot13_round_trips() {
        let s = Str::from("Hello, World!");
        assert_eq!(s.rot13(), Str::from("Uryyb, Jbeyq!"));
        assert_eq!(s.rot13().rot13(), s);
    }

    #[test]
    fn wildcards() {
        let opts = WildcardOptions::default();
        assert!(Str::wildcard_match(&Str::from("*.txt"), &Str::from("notes.txt"), opts));
        assert!(Str::wildcard_match(&Str::from("a?c"), &Str::from("abc"), opts));
        assert!(!Str::wildcard_match(&Str::from("a?c"), &Str::from("ac"), opts));
        assert!(Str::wildcard_match(&Str::from("a*"), &Str::from("a"), opts));

        let file = WildcardOptions {
            filename_mode: true,
            ..Default::default()
        };
        assert!(!Str::wildcard_match(&Str::from("*.txt"), &Str::from("dir/notes.txt"), file));
        assert!(Str::wildcard_match(&Str::from("*/*.txt"), &Str::from("dir/notes.txt"), file));

        let esc = WildcardOptions {
            backslash_escapes: true,
            ..Default::default()
        };
        assert!(Str::wildcard_match(&Str::from("a\\*b"), &Str::from("a*b"), esc));
        assert!(!Str::wildcard_match(&Str::from("a\\*b"), &Str::from("axb"), esc));

        let ci = WildcardOptions {
            case_insensitive: true,
            ..Default::default()
        };
        assert!(Str::wildcard_match(&Str::from("*.TXT"), &Str::from("notes.txt"), ci));
    }

    #[test]
    fn command_line_splitting() {
        let s = Str::from(r#"foo "bar baz" 'qux\'quux' end"#);
        let args = s.split_command_line();
        assert_eq!(
            args,
            vec![Str::from("foo"), Str::from("bar baz"), Str::from("qux'quux"), Str::from("end")]
        );
    }

    #[test]
    fn regex_escape_escapes_metacharacters() {
        assert_eq!(Str::from("a.b*c").regex_escape(), Str::from(r"a\.b\*c"));
    }
}
