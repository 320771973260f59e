//! Regex subsystem tests over the public API.

use pretty_assertions::assert_eq;
use smile::{RegexCache, RegexReplaceState, Str, regex::REGEX_CACHE_SIZE};

#[test]
fn named_captures_prefer_the_first_non_empty_duplicate() {
    let mut cache = RegexCache::new();
    let (regex, error) = cache.create("(?<n>a)|(?<n>b)", "");
    assert_eq!(error, None);
    let m = cache.match_at(&regex, &Str::from("b"), 0);
    assert!(m.is_match);
    // The name refers to capture 2, the one that actually matched.
    assert_eq!(m.named.get("n").copied(), Some(2));
    assert_eq!(m.named_capture("n"), Some("b"));

    // Against "a" the same name refers to capture 1.
    let m = cache.match_at(&regex, &Str::from("a"), 0);
    assert_eq!(m.named.get("n").copied(), Some(1));
}

#[test]
fn resumable_replace_with_a_user_callback() {
    let mut cache = RegexCache::new();
    let (digits, _) = cache.create(r"\d+", "");
    let input = Str::from("a1b22c333");

    let mut state = RegexReplaceState::new(digits, &input, 0, 0);
    let mut matches_seen = Vec::new();
    while state.loop_top(&mut cache) {
        let matched = state.current_match().expect("match available inside the loop");
        matches_seen.push(matched.capture(0).unwrap_or_default().to_string());
        // The "user function" replaces every number with '#'.
        state.loop_bottom(&Str::from("#"));
    }
    assert_eq!(matches_seen, vec!["1", "22", "333"]);
    assert_eq!(state.end(), Str::from("a#b#c#"));
}

#[test]
fn replace_dollar_zero_is_the_identity() {
    let mut cache = RegexCache::new();
    let (digits, _) = cache.create(r"\d+", "");
    assert_eq!(
        cache.replace(&digits, &Str::from("a1b22c333"), &Str::from("$0"), 0, 0),
        Str::from("a1b22c333")
    );
    assert_eq!(
        cache.replace(&digits, &Str::from("no digits"), &Str::from("$0"), 0, 0),
        Str::from("no digits")
    );
}

#[test]
fn count_equals_split_pieces_minus_one() {
    let mut cache = RegexCache::new();
    for (pattern, input) in [(r"\d+", "a1b22c333"), (",", "1,2,,4"), ("x", "no matches here")] {
        let (regex, _) = cache.create(pattern, "");
        let count = cache.count(&regex, &Str::from(input), 0, 0);
        let pieces = cache.split(&regex, &Str::from(input), true, 0);
        assert_eq!(count, pieces.len() as i64 - 1, "property failed for {pattern} on {input}");
    }
}

#[test]
fn eviction_preserves_observable_behavior() {
    let mut cache = RegexCache::new();
    let (regex, _) = cache.create(r"(\w+)@(\w+)", "");
    let before = cache.match_at(&regex, &Str::from("user@host"), 0);

    for i in 0..(REGEX_CACHE_SIZE * 2) {
        let _ = cache.create(&format!("evictor{i}"), "");
    }
    assert!(cache.len() <= REGEX_CACHE_SIZE);

    // After eviction the same Regex value recompiles and produces a
    // byte-equal match.
    let after = cache.match_at(&regex, &Str::from("user@host"), 0);
    assert_eq!(before, after);
}

#[test]
fn flags_are_order_insensitive_and_unknown_flags_error() {
    let mut cache = RegexCache::new();
    let (a, _) = cache.create("x", "xsmi");
    assert_eq!(a.flags, "imsx");
    let (_, error) = cache.create("x", "iz");
    assert!(error.unwrap().contains("'z'"));
}

#[test]
fn case_insensitive_and_multiline_matching() {
    let mut cache = RegexCache::new();
    let (regex, _) = cache.create("^hello", "im");
    assert!(cache.test(&regex, &Str::from("first\nHELLO there"), 0));
    let (strict, _) = cache.create("^hello", "");
    assert!(!cache.test(&strict, &Str::from("first\nHELLO there"), 0));
}
