//! String and Unicode tests over the public API.

use pretty_assertions::assert_eq;
use smile::Str;
use smile::string::{codepage::CodePage, extra::WildcardOptions, html, unicode};

#[test]
fn split_command_line_matches_shell_semantics() {
    let input = Str::from(r#"foo "bar baz" 'qux\'quux' end"#);
    assert_eq!(
        input.split_command_line(),
        vec![Str::from("foo"), Str::from("bar baz"), Str::from("qux'quux"), Str::from("end")]
    );
}

#[test]
fn utf8_round_trip_and_replacement() {
    let valid = Str::from("héllo — 🙂");
    let mut rebuilt = Vec::new();
    for cp in unicode::code_points(valid.as_bytes()) {
        unicode::encode_code_point(&mut rebuilt, cp);
    }
    assert_eq!(rebuilt.as_slice(), valid.as_bytes());

    // Malformed bytes decode to U+FFFD.
    let malformed = Str::from_bytes(vec![b'a', 0xC0, 0xAF, b'b']);
    let decoded: String = unicode::code_points(malformed.as_bytes()).collect();
    assert!(decoded.contains('\u{FFFD}'));
}

#[test]
fn case_fold_and_normalize_are_idempotent() {
    for sample in ["Straße", "İstanbul", "ΣΊΣΥΦΟΣ", "mixed Case STRING"] {
        let folded = Str::from(sample).case_fold();
        assert_eq!(folded.case_fold(), folded);
        let normalized = Str::from(sample).normalize();
        assert_eq!(normalized.normalize(), normalized);
    }
}

#[test]
fn compose_inverts_decompose_on_nfc_strings() {
    for sample in ["héllo", "crème brûlée", "façade"] {
        let s = Str::from(sample);
        assert_eq!(s.decompose().compose(), s);
    }
}

#[test]
fn case_insensitive_compare_crosses_expansions() {
    use std::cmp::Ordering;
    assert_eq!(Str::from("STRASSE").compare_insensitive(&Str::from("straße")), Ordering::Equal);
    assert_eq!(Str::from("apple").compare_insensitive(&Str::from("APRICOT")), Ordering::Less);
}

#[test]
fn wildcard_matching_modes() {
    let plain = WildcardOptions::default();
    assert!(Str::wildcard_match(&Str::from("report-*.txt"), &Str::from("report-2024.txt"), plain));
    let filename = WildcardOptions {
        filename_mode: true,
        ..Default::default()
    };
    assert!(!Str::wildcard_match(&Str::from("*.txt"), &Str::from("a/b.txt"), filename));
}

#[test]
fn code_pages_round_trip_their_repertoire() {
    let s = Str::from("déjà vu");
    let latin1 = s.to_code_page(CodePage::Iso8859_1);
    assert_eq!(latin1.from_code_page(CodePage::Iso8859_1), s);

    let cyrillic = Str::from("привет");
    let encoded = cyrillic.to_code_page(CodePage::Windows1251);
    assert_eq!(encoded.len(), 6);
    assert_eq!(encoded.from_code_page(CodePage::Windows1251), cyrillic);
}

#[test]
fn html_entities_both_directions() {
    assert_eq!(html::entity_value("mdash"), Some(0x2014));
    assert_eq!(html::entity_name(0x2014), Some("mdash"));
    let encoded = Str::from("x < y & z").html_encode();
    assert_eq!(encoded, Str::from("x &lt; y &amp; z"));
    assert_eq!(encoded.html_decode(), Str::from("x < y & z"));
}

#[test]
fn padding_trimming_and_newlines() {
    assert_eq!(Str::from("7").pad_start(3, b'0'), Str::from("007"));
    assert_eq!(Str::from(" x \t").trim_whitespace(true, true), Str::from("x"));
    assert_eq!(
        Str::from("a\r\nb\rc\nd").split_newlines(),
        vec![Str::from("a"), Str::from("b"), Str::from("c"), Str::from("d")]
    );
}
