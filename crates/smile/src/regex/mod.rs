//! The regex subsystem: cached compiled patterns with an LRU bound,
//! matching, splitting, counting, template replacement, and a resumable
//! replace state machine for user-function callbacks.
//!
//! A user-facing [`Regex`] is just `(pattern, flags, cache_id)`. The cache
//! id is a *weak* reference into the [`RegexCache`]: entries may be evicted
//! while `Regex` values still reference them, and the next use recompiles
//! and re-caches. Two regexes with the same canonical `(flags, pattern)`
//! pair collapse onto one cache entry.

pub mod flags;
pub mod translate;

use ahash::AHashMap;
use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::string::Str;
use self::flags::RegexFlags;
use self::translate::{TranslatedPattern, translate};

/// Maximum number of compiled regexes kept in the cache.
pub const REGEX_CACHE_SIZE: usize = 256;

/// A user-facing regex value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Regex {
    /// Weak id of the cache entry that was current when this value was
    /// created.
    pub cache_id: u32,
    /// The original pattern text.
    pub pattern: String,
    /// Canonical flag string (alphabetically ordered subset of `aimnsx`).
    pub flags: String,
}

impl Regex {
    /// The loanword form, `#/pattern/flags`.
    #[must_use]
    pub fn to_loanword(&self) -> String {
        format!("#/{}/{}", self.pattern, self.flags)
    }
}

/// One capture range: byte start and length, or `(-1, 0)` for a group that
/// did not participate in the match.
pub type CaptureRange = (i64, i64);

/// The result of a regex match attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegexMatch {
    pub is_match: bool,
    /// The input text the ranges index into.
    pub input: String,
    /// Indexed capture ranges; index 0 is the whole match.
    pub ranges: SmallVec<[CaptureRange; 8]>,
    /// Named captures: name → capture index. Every name in the regex
    /// appears here; when a name occurs on several groups, the first
    /// non-empty capture wins.
    pub named: IndexMap<String, usize>,
    /// Why the match failed, when failure was an error rather than a
    /// plain mismatch.
    pub error: Option<String>,
}

impl RegexMatch {
    fn failure(input: &str, error: Option<String>) -> Self {
        Self {
            is_match: false,
            input: input.to_string(),
            ranges: SmallVec::new(),
            named: IndexMap::new(),
            error,
        }
    }

    /// The text of capture `index`, or `None` when it did not participate.
    #[must_use]
    pub fn capture(&self, index: usize) -> Option<&str> {
        let &(start, length) = self.ranges.get(index)?;
        if start < 0 {
            return None;
        }
        self.input.get(start as usize..(start + length) as usize)
    }

    /// The text of the named capture, per the first-non-empty rule.
    #[must_use]
    pub fn named_capture(&self, name: &str) -> Option<&str> {
        self.capture(*self.named.get(name)?)
    }
}

/// One cache entry: a compiled pattern plus its identity and any compile
/// error.
#[derive(Debug)]
struct CacheNode {
    id: u32,
    key: String,
    pattern: String,
    flags: String,
    is_valid: bool,
    error: Option<String>,
    compiled: Option<fancy_regex::Regex>,
    group_names: Vec<(String, usize)>,
}

/// The process-wide (per-`Env`) regex cache: LRU over compiled patterns.
#[derive(Debug)]
pub struct RegexCache {
    next_id: u32,
    nodes: AHashMap<u32, CacheNode>,
    key_to_id: AHashMap<String, u32>,
    /// Most recently used first.
    lru: Vec<u32>,
}

impl Default for RegexCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RegexCache {
    /// Creates an empty cache. Cache ids start at 1; 0 is the "no entry"
    /// sentinel carried by freshly derived `Regex` values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: 1,
            nodes: AHashMap::new(),
            key_to_id: AHashMap::new(),
            lru: Vec::new(),
        }
    }

    /// Number of live cache entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Creates a `Regex` value, compiling and caching the pattern.
    ///
    /// An invalid pattern (or unknown flag) still produces a `Regex`; the
    /// error message is returned alongside so the caller can decide
    /// whether to raise.
    pub fn create(&mut self, pattern: &str, flag_text: &str) -> (Regex, Option<String>) {
        // Unknown flags keep their raw spelling so the invalid entry cannot
        // collide with a valid one in the cache.
        let (canonical, parse_error) = match RegexFlags::parse(flag_text) {
            Ok(parsed) => (parsed.canonical(), None),
            Err(bad) => (
                flag_text.to_string(),
                Some(format!("Unknown/unsupported Regex option '{bad}'")),
            ),
        };
        let node_id = self.find_or_add(0, pattern, &canonical);
        let node = &self.nodes[&node_id];
        let error = parse_error.or_else(|| node.error.clone());
        (
            Regex {
                cache_id: node.id,
                pattern: pattern.to_string(),
                flags: canonical,
            },
            error,
        )
    }

    /// Wraps the pattern in `\A(...)` so it only matches at the start.
    pub fn with_start_anchor(&mut self, regex: &Regex) -> Regex {
        if regex.pattern.starts_with("\\A(") {
            return regex.clone();
        }
        let (anchored, _) = self.create(&format!("\\A({})", regex.pattern), &regex.flags);
        anchored
    }

    /// Wraps the pattern in `(...)\z` so it only matches at the end.
    pub fn with_end_anchor(&mut self, regex: &Regex) -> Regex {
        if regex.pattern.ends_with(")\\z") {
            return regex.clone();
        }
        let (anchored, _) = self.create(&format!("({})\\z", regex.pattern), &regex.flags);
        anchored
    }

    /// Adds the `i` flag if absent.
    pub fn as_case_insensitive(&mut self, regex: &Regex) -> Regex {
        if regex.flags.contains('i') {
            return regex.clone();
        }
        let (relaxed, _) = self.create(&regex.pattern, &format!("{}i", regex.flags));
        relaxed
    }

    /// Finds a usable cache node for `(id, pattern, flags)`: by id when the
    /// entry is still live, by key when another regex compiled the same
    /// pattern, or by compiling fresh. Bumps the node in the LRU and
    /// evicts past the cache bound.
    fn find_or_add(&mut self, id: u32, pattern: &str, canonical_flags: &str) -> u32 {
        if self.nodes.contains_key(&id) {
            self.bump(id);
            return id;
        }

        let key = format!("{canonical_flags}/{pattern}");
        if let Some(&existing) = self.key_to_id.get(&key) {
            self.bump(existing);
            return existing;
        }

        let new_id = self.next_id;
        self.next_id += 1;

        let node = compile_node(new_id, key.clone(), pattern, canonical_flags);
        self.key_to_id.insert(key, new_id);
        self.nodes.insert(new_id, node);
        self.lru.insert(0, new_id);
        self.evict_oldest(REGEX_CACHE_SIZE);
        new_id
    }

    fn bump(&mut self, id: u32) {
        if self.lru.first() == Some(&id) {
            return;
        }
        if let Some(position) = self.lru.iter().position(|&n| n == id) {
            self.lru.remove(position);
            self.lru.insert(0, id);
        }
    }

    fn evict_oldest(&mut self, limit: usize) {
        while self.lru.len() > limit {
            if let Some(oldest) = self.lru.pop() {
                if let Some(node) = self.nodes.remove(&oldest) {
                    self.key_to_id.remove(&node.key);
                }
            }
        }
    }

    fn node_for(&mut self, regex: &Regex) -> &CacheNode {
        let id = self.find_or_add(regex.cache_id, &regex.pattern, &regex.flags);
        &self.nodes[&id]
    }

    // ------------------------------------------------------------------
    // Matching operations.

    /// Tests whether the regex matches anywhere at or after `start`.
    pub fn test(&mut self, regex: &Regex, input: &Str, start: usize) -> bool {
        if start >= input.len() {
            return false;
        }
        let text = input.to_utf8_lossy().into_owned();
        let node = self.node_for(regex);
        let Some(compiled) = &node.compiled else {
            return false;
        };
        matches!(compiled.captures_from_pos(&text, start), Ok(Some(_)))
    }

    /// Matches, searching forward from `start`. Always returns a
    /// [`RegexMatch`]; failures carry an error message when failure was
    /// not a plain mismatch.
    pub fn match_at(&mut self, regex: &Regex, input: &Str, start: usize) -> RegexMatch {
        let text = input.to_utf8_lossy().into_owned();
        if start >= text.len() && !text.is_empty() {
            return RegexMatch::failure(
                &text,
                Some(format!("Start offset at {start} for 'Regex.match' is outside string.")),
            );
        }
        let node = self.node_for(regex);
        let Some(compiled) = &node.compiled else {
            let error = node.error.clone();
            return RegexMatch::failure(&text, error);
        };
        match compiled.captures_from_pos(&text, start) {
            Ok(Some(captures)) => build_match(&text, &captures, &node.group_names),
            Ok(None) => RegexMatch::failure(&text, None),
            Err(e) => RegexMatch::failure(&text, Some(e.to_string())),
        }
    }

    /// Splits `input` by the regex. Pieces between matches are returned,
    /// plus any explicit capture groups from each match. `limit` bounds
    /// the number of splits (0 = no limit).
    pub fn split(&mut self, regex: &Regex, input: &Str, keep_empty: bool, limit: i64) -> Vec<Str> {
        let text = input.to_utf8_lossy().into_owned();
        let mut pieces = Vec::new();
        let mut last_offset = 0usize;
        let mut remaining = if limit <= 0 { i64::MAX } else { limit };

        while last_offset <= text.len() && remaining > 0 {
            let Some(found) = self.search(regex, &text, last_offset) else {
                break;
            };
            let (match_start, match_end) = match found.ranges.first() {
                Some(&(s, l)) if s >= 0 => (s as usize, (s + l) as usize),
                _ => break,
            };
            if match_start > last_offset || keep_empty {
                pieces.push(Str::from(&text[last_offset..match_start]));
            }
            for index in 1..found.ranges.len() {
                if let Some(capture) = found.capture(index) {
                    pieces.push(Str::from(capture));
                }
            }
            remaining -= 1;
            // An empty match advances one position so the scan cannot
            // stall.
            last_offset = if match_end > last_offset {
                match_end
            } else {
                next_char_boundary(&text, last_offset)
            };
        }

        if last_offset < text.len() || keep_empty {
            pieces.push(Str::from(&text[last_offset.min(text.len())..]));
        }
        pieces
    }

    /// Counts matches at or after `start`, up to `limit` (0 = no limit).
    pub fn count(&mut self, regex: &Regex, input: &Str, start: usize, limit: i64) -> i64 {
        let text = input.to_utf8_lossy().into_owned();
        if start >= text.len() {
            return 0;
        }
        let mut count = 0;
        let mut offset = start;
        let mut remaining = if limit <= 0 { i64::MAX } else { limit };
        while offset <= text.len() && remaining > 0 {
            let Some(found) = self.search(regex, &text, offset) else {
                break;
            };
            let (match_start, match_end) = match found.ranges.first() {
                Some(&(s, l)) if s >= 0 => (s as usize, (s + l) as usize),
                _ => break,
            };
            let _ = match_start;
            count += 1;
            remaining -= 1;
            offset = if match_end > offset {
                match_end
            } else {
                next_char_boundary(&text, offset)
            };
        }
        count
    }

    /// Template replacement: replaces up to `limit` matches at or after
    /// `start` with the replacement template (capture substitutions
    /// included).
    pub fn replace(&mut self, regex: &Regex, input: &Str, replacement: &Str, start: usize, limit: i64) -> Str {
        let tokens = parse_replacement(&replacement.to_utf8_lossy());
        let mut state = RegexReplaceState::new(regex.clone(), input, start, limit);
        while state.loop_top(self) {
            let replaced = {
                let matched = state.current_match().expect("loop_top leaves a match");
                apply_replacement(&tokens, matched)
            };
            state.loop_bottom(&Str::from(replaced));
        }
        state.end()
    }

    /// One search step: a full match object at or after `offset`.
    fn search(&mut self, regex: &Regex, text: &str, offset: usize) -> Option<RegexMatch> {
        if offset > text.len() {
            return None;
        }
        let node = self.node_for(regex);
        let compiled = node.compiled.as_ref()?;
        match compiled.captures_from_pos(text, offset) {
            Ok(Some(captures)) => Some(build_match(text, &captures, &node.group_names)),
            _ => None,
        }
    }
}

fn compile_node(id: u32, key: String, pattern: &str, canonical_flags: &str) -> CacheNode {
    let parsed = match RegexFlags::parse(canonical_flags) {
        Ok(parsed) => parsed,
        Err(bad) => {
            return CacheNode {
                id,
                key,
                pattern: pattern.to_string(),
                flags: canonical_flags.to_string(),
                is_valid: false,
                error: Some(format!("Unknown/unsupported Regex option '{bad}'")),
                compiled: None,
                group_names: Vec::new(),
            };
        }
    };
    let TranslatedPattern {
        pattern: translated,
        group_names,
        group_count: _,
    } = translate(pattern, parsed);
    match fancy_regex::Regex::new(&translated) {
        Ok(compiled) => CacheNode {
            id,
            key,
            pattern: pattern.to_string(),
            flags: canonical_flags.to_string(),
            is_valid: true,
            error: None,
            compiled: Some(compiled),
            group_names,
        },
        Err(e) => CacheNode {
            id,
            key,
            pattern: pattern.to_string(),
            flags: canonical_flags.to_string(),
            is_valid: false,
            error: Some(e.to_string()),
            compiled: None,
            group_names,
        },
    }
}

fn build_match(text: &str, captures: &fancy_regex::Captures<'_>, group_names: &[(String, usize)]) -> RegexMatch {
    let mut ranges: SmallVec<[CaptureRange; 8]> = SmallVec::new();
    for index in 0..captures.len() {
        match captures.get(index) {
            Some(group) => ranges.push((group.start() as i64, (group.end() - group.start()) as i64)),
            None => ranges.push((-1, 0)),
        }
    }

    // Named captures: the first occurrence of each name claims the slot;
    // a later occurrence replaces it only when the earlier capture was
    // empty and the later one is not.
    let mut named = IndexMap::new();
    for &(ref name, index) in group_names {
        let this_len = ranges.get(index).map_or(0, |&(s, l)| if s >= 0 { l } else { 0 });
        match named.get(name) {
            None => {
                named.insert(name.clone(), index);
            }
            Some(&existing) => {
                let existing_len = ranges.get(existing).map_or(0, |&(s, l)| if s >= 0 { l } else { 0 });
                if existing_len == 0 && this_len > 0 {
                    named.insert(name.clone(), index);
                }
            }
        }
    }

    RegexMatch {
        is_match: true,
        input: text.to_string(),
        ranges,
        named,
        error: None,
    }
}

fn next_char_boundary(text: &str, offset: usize) -> usize {
    let mut next = offset + 1;
    while next < text.len() && !text.is_char_boundary(next) {
        next += 1;
    }
    next
}

// ---------------------------------------------------------------------------
// Replacement templates.

/// One parsed piece of a replacement template.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ReplacementToken {
    Literal(String),
    /// `$0`/`$&`, `$n`, `$nn`, `${n}`.
    Numeric(usize),
    /// `${name}`.
    Named(String),
    /// `$+`: the last capture group.
    Last,
}

/// Parses a replacement template. `$` and `\` both introduce
/// substitutions: `$0`/`$&` (whole match), `$n`/`$nn`, `${n}`, `${name}`,
/// `$+` (last group), and `$$`/`\\` for the literal characters.
/// Unrecognized escapes pass through unchanged.
fn parse_replacement(template: &str) -> Vec<ReplacementToken> {
    let bytes = template.as_bytes();
    let mut tokens = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;

    let flush = |tokens: &mut Vec<ReplacementToken>, from: usize, to: usize| {
        if to > from {
            tokens.push(ReplacementToken::Literal(
                String::from_utf8_lossy(&bytes[from..to]).into_owned(),
            ));
        }
    };

    while i < bytes.len() {
        if bytes[i] != b'$' && bytes[i] != b'\\' {
            i += 1;
            continue;
        }
        flush(&mut tokens, literal_start, i);
        let intro = i;
        i += 1;
        if i >= bytes.len() {
            literal_start = intro;
            break;
        }
        match bytes[i] {
            b'$' => {
                tokens.push(ReplacementToken::Literal("$".to_string()));
                i += 1;
            }
            b'\\' => {
                tokens.push(ReplacementToken::Literal("\\".to_string()));
                i += 1;
            }
            b'+' => {
                tokens.push(ReplacementToken::Last);
                i += 1;
            }
            b'0' | b'&' => {
                tokens.push(ReplacementToken::Numeric(0));
                i += 1;
            }
            b'1'..=b'9' => {
                let mut number = usize::from(bytes[i] - b'0');
                i += 1;
                if i < bytes.len() && bytes[i].is_ascii_digit() {
                    number = number * 10 + usize::from(bytes[i] - b'0');
                    i += 1;
                }
                tokens.push(ReplacementToken::Numeric(number));
            }
            b'{' => {
                let close = bytes[i + 1..].iter().position(|&b| b == b'}').map(|p| i + 1 + p);
                match close {
                    Some(close) if close > i + 1 => {
                        let body = String::from_utf8_lossy(&bytes[i + 1..close]).into_owned();
                        if body.bytes().all(|b| b.is_ascii_digit()) {
                            tokens.push(ReplacementToken::Numeric(body.parse().unwrap_or(0)));
                        } else {
                            tokens.push(ReplacementToken::Named(body));
                        }
                        i = close + 1;
                    }
                    _ => {
                        // Unterminated brace: pass the intro through.
                        tokens.push(ReplacementToken::Literal(
                            String::from_utf8_lossy(&bytes[intro..=i]).into_owned(),
                        ));
                        i += 1;
                    }
                }
            }
            _ => {
                // Unrecognized escape: pass both characters through.
                tokens.push(ReplacementToken::Literal(
                    String::from_utf8_lossy(&bytes[intro..=i]).into_owned(),
                ));
                i += 1;
            }
        }
        literal_start = i;
    }
    flush(&mut tokens, literal_start, bytes.len());
    tokens
}

fn apply_replacement(tokens: &[ReplacementToken], matched: &RegexMatch) -> String {
    let mut out = String::new();
    for token in tokens {
        match token {
            ReplacementToken::Literal(text) => out.push_str(text),
            ReplacementToken::Numeric(number) => {
                if let Some(capture) = matched.capture(*number) {
                    out.push_str(capture);
                }
            }
            ReplacementToken::Named(name) => {
                if let Some(capture) = matched.named_capture(name) {
                    out.push_str(capture);
                }
            }
            ReplacementToken::Last => {
                if matched.ranges.len() > 1
                    && let Some(capture) = matched.capture(matched.ranges.len() - 1)
                {
                    out.push_str(capture);
                }
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Resumable replacement.

/// The interruptible replacement machine.
///
/// Usage: [`RegexReplaceState::loop_top`] finds the next match (appending
/// the text before it to the output) and returns whether to continue; the
/// caller computes a replacement however it likes (typically by invoking a
/// user function on [`RegexReplaceState::current_match`]); then
/// [`RegexReplaceState::loop_bottom`] appends the replacement and advances.
/// [`RegexReplaceState::end`] appends the tail and yields the result.
#[derive(Debug)]
pub struct RegexReplaceState {
    regex: Regex,
    text: String,
    offset: usize,
    remaining: i64,
    out: String,
    current: Option<RegexMatch>,
    match_start: usize,
    match_end: usize,
}

impl RegexReplaceState {
    /// Begins a replacement pass over `input` from `start`, with at most
    /// `limit` replacements (0 = no limit).
    #[must_use]
    pub fn new(regex: Regex, input: &Str, start: usize, limit: i64) -> Self {
        let text = input.to_utf8_lossy().into_owned();
        let mut out = String::new();
        let mut offset = start;
        let mut remaining = if limit <= 0 { i64::MAX } else { limit };
        if start >= text.len() && !text.is_empty() {
            // Out-of-range start: nothing to replace, echo the input.
            offset = 0;
            remaining = 0;
        } else if start > 0 {
            out.push_str(&text[..start]);
        }
        Self {
            regex,
            text,
            offset,
            remaining,
            out,
            current: None,
            match_start: 0,
            match_end: 0,
        }
    }

    /// The match found by the last [`Self::loop_top`].
    #[must_use]
    pub fn current_match(&self) -> Option<&RegexMatch> {
        self.current.as_ref()
    }

    /// Finds the next match and appends the pre-match text. Returns false
    /// when the pass is over.
    pub fn loop_top(&mut self, cache: &mut RegexCache) -> bool {
        if self.offset >= self.text.len() || self.remaining <= 0 {
            return false;
        }
        self.remaining -= 1;
        let Some(found) = cache.search(&self.regex, &self.text, self.offset) else {
            return false;
        };
        let (start, length) = match found.ranges.first() {
            Some(&(s, l)) if s >= 0 => (s as usize, l as usize),
            _ => return false,
        };
        self.match_start = start;
        self.match_end = start + length;
        if start > self.offset {
            self.out.push_str(&self.text[self.offset..start]);
        }
        self.current = Some(found);
        true
    }

    /// Appends the computed replacement and advances past the match.
    pub fn loop_bottom(&mut self, replacement: &Str) {
        self.out.push_str(&replacement.to_utf8_lossy());
        self.offset = if self.match_end > self.offset {
            self.match_end
        } else {
            next_char_boundary(&self.text, self.offset)
        };
    }

    /// Appends any unmatched tail and returns the final string.
    #[must_use]
    pub fn end(mut self) -> Str {
        if self.offset < self.text.len() {
            let tail = &self.text[self.offset..];
            self.out.push_str(tail);
        }
        Str::from(self.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> RegexCache {
        RegexCache::new()
    }

    #[test]
    fn create_canonicalizes_flags_and_shares_entries() {
        let mut cache = cache();
        let (a, err_a) = cache.create("ab+", "si");
        let (b, err_b) = cache.create("ab+", "is");
        assert_eq!(err_a, None);
        assert_eq!(err_b, None);
        assert_eq!(a.flags, "is");
        assert_eq!(a.cache_id, b.cache_id);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn unknown_flag_reports_a_configuration_error() {
        let mut cache = cache();
        let (_, error) = cache.create("a", "z");
        assert!(error.unwrap().contains("'z'"));
    }

    #[test]
    fn invalid_patterns_still_produce_a_regex() {
        let mut cache = cache();
        let (regex, error) = cache.create("a(", "");
        assert!(error.is_some());
        assert!(!cache.test(&regex, &Str::from("a("), 0));
        let m = cache.match_at(&regex, &Str::from("a("), 0);
        assert!(!m.is_match);
        assert!(m.error.is_some());
    }

    #[test]
    fn eviction_is_transparent_to_regex_values() {
        let mut cache = cache();
        let (regex, _) = cache.create("needle", "");
        // Flood the cache far past its bound.
        for i in 0..(REGEX_CACHE_SIZE + 16) {
            let _ = cache.create(&format!("filler{i}"), "");
        }
        assert!(cache.len() <= REGEX_CACHE_SIZE);
        // The original entry is gone, but the Regex still works: the next
        // use recompiles and re-caches.
        assert!(cache.test(&regex, &Str::from("a needle here"), 0));
    }

    #[test]
    fn match_populates_indexed_and_named_captures() {
        let mut cache = cache();
        let (regex, _) = cache.create(r"(?<word>\w+)-(\d+)", "");
        let m = cache.match_at(&regex, &Str::from("see ab-42 there"), 0);
        assert!(m.is_match);
        assert_eq!(m.capture(0), Some("ab-42"));
        assert_eq!(m.capture(1), Some("ab"));
        assert_eq!(m.capture(2), Some("42"));
        assert_eq!(m.named_capture("word"), Some("ab"));
    }

    #[test]
    fn duplicate_names_take_the_first_non_empty_capture() {
        let mut cache = cache();
        let (regex, error) = cache.create("(?<n>a)|(?<n>b)", "");
        assert_eq!(error, None);
        let m = cache.match_at(&regex, &Str::from("b"), 0);
        assert!(m.is_match);
        assert_eq!(m.named.get("n"), Some(&2));
        assert_eq!(m.named_capture("n"), Some("b"));
    }

    #[test]
    fn backreferences_and_lookahead_are_supported() {
        let mut cache = cache();
        let (backref, _) = cache.create(r"(\w+) \1", "");
        assert!(cache.test(&backref, &Str::from("hey hey"), 0));
        assert!(!cache.test(&backref, &Str::from("hey there"), 0));

        let (look, _) = cache.create(r"foo(?=bar)", "");
        assert!(cache.test(&look, &Str::from("foobar"), 0));
        assert!(!cache.test(&look, &Str::from("foobaz"), 0));
    }

    #[test]
    fn split_includes_captures_and_honors_limits() {
        let mut cache = cache();
        let (plain, _) = cache.create(",", "");
        let pieces = cache.split(&plain, &Str::from("1,2,,4"), false, 0);
        assert_eq!(pieces, vec![Str::from("1"), Str::from("2"), Str::from("4")]);
        let pieces = cache.split(&plain, &Str::from("1,2,,4"), true, 0);
        assert_eq!(pieces, vec![Str::from("1"), Str::from("2"), Str::from(""), Str::from("4")]);
        let pieces = cache.split(&plain, &Str::from("1,2,3,4,5"), false, 2);
        assert_eq!(pieces, vec![Str::from("1"), Str::from("2"), Str::from("3,4,5")]);

        let (with_capture, _) = cache.create(r"(;|,)", "");
        let pieces = cache.split(&with_capture, &Str::from("a,b;c"), false, 0);
        assert_eq!(
            pieces,
            vec![Str::from("a"), Str::from(","), Str::from("b"), Str::from(";"), Str::from("c")]
        );
    }

    #[test]
    fn count_matches_split_piece_arithmetic() {
        let mut cache = cache();
        let (regex, _) = cache.create(r"\d+", "");
        let input = Str::from("a1b22c333");
        let count = cache.count(&regex, &input, 0, 0);
        let pieces = cache.split(&regex, &input, true, 0);
        assert_eq!(count, 3);
        assert_eq!(count, (pieces.len() as i64) - 1);
    }

    #[test]
    fn replace_templates() {
        let mut cache = cache();
        let (regex, _) = cache.create(r"(?<first>\w+) (?<second>\w+)", "");
        let input = Str::from("hello world");
        let swapped = cache.replace(&regex, &input, &Str::from("${second} ${first}"), 0, 0);
        assert_eq!(swapped, Str::from("world hello"));

        let (digits, _) = cache.create(r"\d+", "");
        let marked = cache.replace(&digits, &Str::from("a1b22c333"), &Str::from("<$0>"), 0, 0);
        assert_eq!(marked, Str::from("a<1>b<22>c<333>"));
        let limited = cache.replace(&digits, &Str::from("a1b22c333"), &Str::from("#"), 0, 2);
        assert_eq!(limited, Str::from("a#b#c333"));

        // `$0` replacement reproduces the input when the regex matches.
        let identity = cache.replace(&digits, &Str::from("a1b22"), &Str::from("$0"), 0, 0);
        assert_eq!(identity, Str::from("a1b22"));
        // ...and when it never matches.
        let untouched = cache.replace(&digits, &Str::from("abc"), &Str::from("$0"), 0, 0);
        assert_eq!(untouched, Str::from("abc"));

        // `$$` is a literal dollar; unrecognized escapes pass through.
        let literal = cache.replace(&digits, &Str::from("x1"), &Str::from("$$$q"), 0, 0);
        assert_eq!(literal, Str::from("x$$q"));
    }

    #[test]
    fn resumable_replace_drives_like_a_callback() {
        let mut cache = cache();
        let (digits, _) = cache.create(r"\d+", "");
        let input = Str::from("a1b22c333");
        let mut state = RegexReplaceState::new(digits, &input, 0, 0);
        let mut iterations = 0;
        while state.loop_top(&mut cache) {
            iterations += 1;
            let matched = state.current_match().unwrap();
            assert!(matched.is_match);
            state.loop_bottom(&Str::from("#"));
        }
        assert_eq!(iterations, 3);
        assert_eq!(state.end(), Str::from("a#b#c#"));
    }

    #[test]
    fn anchors_and_case_insensitive_derivation() {
        let mut cache = cache();
        let (regex, _) = cache.create("ab", "");
        let anchored = cache.with_start_anchor(&regex);
        assert_eq!(anchored.pattern, "\\A(ab)");
        assert!(cache.test(&anchored, &Str::from("abxx"), 0));
        assert!(!cache.test(&anchored, &Str::from("xxab"), 0));

        let end_anchored = cache.with_end_anchor(&regex);
        assert_eq!(end_anchored.pattern, "(ab)\\z");
        assert!(cache.test(&end_anchored, &Str::from("xxab"), 0));
        assert!(!cache.test(&end_anchored, &Str::from("abxx"), 0));

        let insensitive = cache.as_case_insensitive(&regex);
        assert_eq!(insensitive.flags, "i");
        assert!(cache.test(&insensitive, &Str::from("AB"), 0));
        // Already-insensitive regexes come back unchanged.
        let again = cache.as_case_insensitive(&insensitive);
        assert_eq!(again, insensitive);
    }

    #[test]
    fn loanword_form() {
        let mut cache = cache();
        let (regex, _) = cache.create("a+", "ix");
        assert_eq!(regex.to_loanword(), "#/a+/ix");
    }
}
