//! UTF-8 decoding and Unicode-aware string operations.
//!
//! The decoder rejects overlong encodings, surrogate halves, values above
//! U+10FFFF, and illegal continuation bytes. Lossy callers get U+FFFD for
//! each bad byte; strict callers get `None`.
//!
//! Case conversion walks code points and applies the standard full
//! mappings (one-to-many expansions included). Case folding uses the full
//! Unicode default fold. Normalization is the canonical reorder of
//! combining marks by combining class; compose/decompose are the canonical
//! NFC/NFD transforms.

use caseless::Caseless;
use unicode_normalization::{UnicodeNormalization, char::canonical_combining_class};

use super::Str;

/// U+FFFD, the replacement character.
pub const REPLACEMENT: u32 = 0xFFFD;

/// Decodes one code point starting at byte offset `index`.
///
/// Returns `(code_point, bytes_consumed)`. Malformed input yields
/// `(REPLACEMENT, 1)` so lossy scans always make progress.
#[must_use]
pub fn decode_code_point(bytes: &[u8], index: usize) -> (u32, usize) {
    decode_strict(bytes, index).unwrap_or((REPLACEMENT, 1))
}

/// Strict single code point decode; `None` on any malformed sequence.
#[must_use]
pub fn decode_strict(bytes: &[u8], index: usize) -> Option<(u32, usize)> {
    let first = *bytes.get(index)?;
    if first < 0x80 {
        return Some((u32::from(first), 1));
    }
    let (len, min, mut value) = match first {
        0xC2..=0xDF => (2, 0x80, u32::from(first & 0x1F)),
        0xE0..=0xEF => (3, 0x800, u32::from(first & 0x0F)),
        0xF0..=0xF4 => (4, 0x1_0000, u32::from(first & 0x07)),
        // 0x80-0xBF: bare continuation; 0xC0/0xC1: overlong; 0xF5+: out of range.
        _ => return None,
    };
    for offset in 1..len {
        let byte = *bytes.get(index + offset)?;
        if byte & 0xC0 != 0x80 {
            return None;
        }
        value = (value << 6) | u32::from(byte & 0x3F);
    }
    if value < min || value > 0x10_FFFF || (0xD800..=0xDFFF).contains(&value) {
        return None;
    }
    Some((value, len))
}

/// Iterator over the code points of a byte string, lossy.
pub fn code_points(bytes: &[u8]) -> impl Iterator<Item = char> + '_ {
    let mut index = 0;
    std::iter::from_fn(move || {
        if index >= bytes.len() {
            return None;
        }
        let (cp, len) = decode_code_point(bytes, index);
        index += len;
        Some(char::from_u32(cp).unwrap_or('\u{FFFD}'))
    })
}

/// Encodes a code point, appending its UTF-8 bytes to `out`.
pub fn encode_code_point(out: &mut Vec<u8>, cp: char) {
    let mut buf = [0u8; 4];
    out.extend_from_slice(cp.encode_utf8(&mut buf).as_bytes());
}

fn map_code_points(s: &Str, mut f: impl FnMut(&mut Vec<u8>, char)) -> Str {
    let mut out = Vec::with_capacity(s.len());
    for cp in code_points(s.as_bytes()) {
        f(&mut out, cp);
    }
    Str::from_bytes(out)
}

impl Str {
    /// Lowercases every code point (full mappings).
    #[must_use]
    pub fn to_lower(&self) -> Self {
        map_code_points(self, |out, cp| {
            for lowered in cp.to_lowercase() {
                encode_code_point(out, lowered);
            }
        })
    }

    /// Uppercases every code point (full mappings, so ß becomes SS).
    #[must_use]
    pub fn to_upper(&self) -> Self {
        map_code_points(self, |out, cp| {
            for raised in cp.to_uppercase() {
                encode_code_point(out, raised);
            }
        })
    }

    /// Titlecases the string: the first cased letter of each word is
    /// uppercased, the rest lowercased. Word boundaries are transitions
    /// from non-alphanumeric to alphanumeric.
    #[must_use]
    pub fn to_title(&self) -> Self {
        let mut at_word_start = true;
        map_code_points(self, |out, cp| {
            if cp.is_alphanumeric() {
                if at_word_start {
                    for raised in cp.to_uppercase() {
                        encode_code_point(out, raised);
                    }
                } else {
                    for lowered in cp.to_lowercase() {
                        encode_code_point(out, lowered);
                    }
                }
                at_word_start = false;
            } else {
                at_word_start = true;
                encode_code_point(out, cp);
            }
        })
    }

    /// Full Unicode default case fold.
    #[must_use]
    pub fn case_fold(&self) -> Self {
        let mut out = Vec::with_capacity(self.len());
        for folded in code_points(self.as_bytes()).default_case_fold() {
            encode_code_point(&mut out, folded);
        }
        Self::from_bytes(out)
    }

    /// Canonical decomposition (NFD).
    #[must_use]
    pub fn decompose(&self) -> Self {
        let mut out = Vec::with_capacity(self.len() * 2);
        for cp in code_points(self.as_bytes()).nfd() {
            encode_code_point(&mut out, cp);
        }
        Self::from_bytes(out)
    }

    /// Canonical composition (NFC).
    #[must_use]
    pub fn compose(&self) -> Self {
        let mut out = Vec::with_capacity(self.len());
        for cp in code_points(self.as_bytes()).nfc() {
            encode_code_point(&mut out, cp);
        }
        Self::from_bytes(out)
    }

    /// Canonical ordering of combining marks: stable-sorts each run of
    /// nonzero-combining-class code points by combining class, without
    /// composing or decomposing anything.
    #[must_use]
    pub fn normalize(&self) -> Self {
        let mut chars: Vec<char> = code_points(self.as_bytes()).collect();
        let mut start = 0;
        while start < chars.len() {
            if canonical_combining_class(chars[start]) == 0 {
                start += 1;
                continue;
            }
            let mut end = start;
            while end < chars.len() && canonical_combining_class(chars[end]) != 0 {
                end += 1;
            }
            chars[start..end].sort_by_key(|&c| canonical_combining_class(c));
            start = end;
        }
        let mut out = Vec::with_capacity(self.len());
        for cp in chars {
            encode_code_point(&mut out, cp);
        }
        Self::from_bytes(out)
    }

    /// Case-insensitive comparison.
    ///
    /// Walks both strings code point by code point, folding each side. When
    /// either side folds to more than one code point, the remainders are
    /// bulk-folded and compared bytewise — the slow path the short form
    /// cannot express.
    #[must_use]
    pub fn compare_insensitive(&self, other: &Self) -> std::cmp::Ordering {
        let a = self.as_bytes();
        let b = other.as_bytes();
        let (mut ai, mut bi) = (0, 0);
        loop {
            match (ai < a.len(), bi < b.len()) {
                (false, false) => return std::cmp::Ordering::Equal,
                (false, true) => return std::cmp::Ordering::Less,
                (true, false) => return std::cmp::Ordering::Greater,
                (true, true) => {}
            }
            let (acp, alen) = decode_code_point(a, ai);
            let (bcp, blen) = decode_code_point(b, bi);
            let afold = fold_one(acp);
            let bfold = fold_one(bcp);
            match (afold, bfold) {
                (Some(fa), Some(fb)) => {
                    if fa != fb {
                        return fa.cmp(&fb);
                    }
                    ai += alen;
                    bi += blen;
                }
                _ => {
                    // Multi-code-point fold: fall back to folding the rest
                    // of both strings in bulk.
                    let rest_a = self.substring_at(ai).case_fold();
                    let rest_b = other.substring_at(bi).case_fold();
                    return rest_a.as_bytes().cmp(rest_b.as_bytes());
                }
            }
        }
    }

    /// Case-insensitive index of `pattern` at or after `start`.
    #[must_use]
    pub fn index_of_i(&self, pattern: &Self, start: usize) -> Option<usize> {
        if pattern.is_empty() {
            return (start <= self.len()).then_some(start.min(self.len()));
        }
        (start..self.len()).find(|&i| self.matches_fold_at(i, pattern))
    }

    /// Case-insensitive last index of `pattern` beginning at or before
    /// `start`.
    #[must_use]
    pub fn last_index_of_i(&self, pattern: &Self, start: usize) -> Option<usize> {
        if pattern.is_empty() {
            return Some(start.min(self.len()));
        }
        let upper = start.min(self.len());
        (0..=upper).rev().find(|&i| self.matches_fold_at(i, pattern))
    }

    /// Case-insensitive count of non-overlapping occurrences.
    #[must_use]
    pub fn count_of_i(&self, pattern: &Self, start: usize) -> i64 {
        if pattern.is_empty() {
            return 0;
        }
        let mut count = 0;
        let mut i = start;
        while let Some(found) = self.index_of_i(pattern, i) {
            count += 1;
            i = found + self.fold_match_len(found, pattern).max(1);
        }
        count
    }

    #[must_use]
    pub fn contains_i(&self, pattern: &Self) -> bool {
        self.index_of_i(pattern, 0).is_some()
    }

    #[must_use]
    pub fn starts_with_i(&self, prefix: &Self) -> bool {
        self.matches_fold_at(0, prefix)
    }

    #[must_use]
    pub fn ends_with_i(&self, suffix: &Self) -> bool {
        if suffix.is_empty() {
            return true;
        }
        (0..self.len()).any(|i| {
            let consumed = self.fold_match_len(i, suffix);
            consumed > 0 && consumed == self.len() - i
        })
    }

    /// Case-insensitive replace of every occurrence.
    #[must_use]
    pub fn replace_i(&self, pattern: &Self, replacement: &Self) -> Self {
        self.replace_with_limit_i(pattern, replacement, 0)
    }

    /// Case-insensitive replace, up to `limit` occurrences (0 = no limit).
    #[must_use]
    pub fn replace_with_limit_i(&self, pattern: &Self, replacement: &Self, limit: i64) -> Self {
        if pattern.is_empty() {
            return self.clone();
        }
        let mut out = Vec::with_capacity(self.len());
        let mut position = 0;
        let mut remaining = if limit <= 0 { i64::MAX } else { limit };
        while remaining > 0 {
            match self.index_of_i(pattern, position) {
                Some(found) => {
                    let matched = self.fold_match_len(found, pattern).max(1);
                    out.extend_from_slice(&self.as_bytes()[position..found]);
                    out.extend_from_slice(replacement.as_bytes());
                    position = found + matched;
                    remaining -= 1;
                }
                None => break,
            }
        }
        out.extend_from_slice(&self.as_bytes()[position..]);
        Self::from_bytes(out)
    }

    /// True when `pattern` matches case-insensitively at byte offset `i`.
    fn matches_fold_at(&self, i: usize, pattern: &Self) -> bool {
        self.fold_match_len(i, pattern) > 0 || pattern.is_empty()
    }

    /// Number of bytes of `self` consumed by matching all of `pattern`
    /// case-insensitively at offset `i`, or 0 when it does not match.
    fn fold_match_len(&self, i: usize, pattern: &Self) -> usize {
        let text = self.as_bytes();
        let pat = pattern.as_bytes();
        let (mut ti, mut pi) = (i, 0);
        let mut text_pending: Vec<char> = Vec::new();
        let mut pat_pending: Vec<char> = Vec::new();
        loop {
            if pat_pending.is_empty() {
                if pi >= pat.len() {
                    // Pattern exhausted; match succeeds only if no stray
                    // folded text remains buffered.
                    return if text_pending.is_empty() { ti - i } else { 0 };
                }
                let (cp, len) = decode_code_point(pat, pi);
                pi += len;
                fold_into(cp, &mut pat_pending);
            }
            if text_pending.is_empty() {
                if ti >= text.len() {
                    return 0;
                }
                let (cp, len) = decode_code_point(text, ti);
                ti += len;
                fold_into(cp, &mut text_pending);
            }
            if text_pending.remove(0) != pat_pending.remove(0) {
                return 0;
            }
        }
    }
}

/// Folds a code point; `Some` when the fold is a single code point.
fn fold_one(cp: u32) -> Option<u32> {
    let c = char::from_u32(cp)?;
    let mut iter = std::iter::once(c).default_case_fold();
    let first = iter.next()?;
    if iter.next().is_some() { None } else { Some(first as u32) }
}

fn fold_into(cp: u32, out: &mut Vec<char>) {
    let c = char::from_u32(cp).unwrap_or('\u{FFFD}');
    out.extend(std::iter::once(c).default_case_fold());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_rejects_overlong_and_out_of_range() {
        // Overlong "/" (0xC0 0xAF)
        assert_eq!(decode_strict(&[0xC0, 0xAF], 0), None);
        assert_eq!(decode_code_point(&[0xC0, 0xAF], 0), (REPLACEMENT, 1));
        // 0xF5 starts a sequence above U+10FFFF
        assert_eq!(decode_strict(&[0xF5, 0x80, 0x80, 0x80], 0), None);
        // Surrogate half U+D800 (0xED 0xA0 0x80)
        assert_eq!(decode_strict(&[0xED, 0xA0, 0x80], 0), None);
        // A valid 3-byte sequence
        assert_eq!(decode_strict("€".as_bytes(), 0), Some((0x20AC, 3)));
    }

    #[test]
    fn utf8_round_trips() {
        let s = Str::from("héllo wörld — ≤≥ 🙂");
        let mut out = Vec::new();
        for cp in code_points(s.as_bytes()) {
            encode_code_point(&mut out, cp);
        }
        assert_eq!(out.as_slice(), s.as_bytes());
    }

    #[test]
    fn case_conversion_applies_full_mappings() {
        assert_eq!(Str::from("Straße").to_upper(), Str::from("STRASSE"));
        assert_eq!(Str::from("HÉLLO").to_lower(), Str::from("héllo"));
        assert_eq!(Str::from("hello world").to_title(), Str::from("Hello World"));
    }

    #[test]
    fn case_fold_is_idempotent() {
        for input in ["Straße", "ΣΊΣΥΦΟΣ", "Hello, WORLD", "İstanbul"] {
            let once = Str::from(input).case_fold();
            let twice = once.case_fold();
            assert_eq!(once, twice, "fold not idempotent for {input}");
        }
    }

    #[test]
    fn normalize_is_idempotent_and_orders_marks() {
        // e + combining-dot-below (ccc 220) + combining-acute (ccc 230),
        // deliberately written acute-first.
        let disordered = Str::from("e\u{0301}\u{0323}");
        let normalized = disordered.normalize();
        assert_eq!(normalized, Str::from("e\u{0323}\u{0301}"));
        assert_eq!(normalized.normalize(), normalized);
    }

    #[test]
    fn compose_of_decompose_round_trips_nfc() {
        for input in ["héllo", "crème brûlée", "naïve"] {
            let s = Str::from(input);
            assert_eq!(s.decompose().compose(), s);
        }
    }

    #[test]
    fn insensitive_compare_handles_multi_codepoint_folds() {
        use std::cmp::Ordering;
        assert_eq!(Str::from("HELLO").compare_insensitive(&Str::from("hello")), Ordering::Equal);
        assert_eq!(Str::from("straße").compare_insensitive(&Str::from("STRASSE")), Ordering::Equal);
        assert_eq!(Str::from("abc").compare_insensitive(&Str::from("abd")), Ordering::Less);
    }

    #[test]
    fn insensitive_search() {
        let s = Str::from("The Quick Brown Fox");
        assert_eq!(s.index_of_i(&Str::from("quick"), 0), Some(4));
        assert_eq!(s.last_index_of_i(&Str::from("O"), s.len()), Some(17));
        assert!(s.contains_i(&Str::from("BROWN")));
        assert!(s.starts_with_i(&Str::from("the")));
        assert!(s.ends_with_i(&Str::from("FOX")));
        assert_eq!(s.replace_i(&Str::from("o"), &Str::from("0")), Str::from("The Quick Br0wn F0x"));
    }
}
