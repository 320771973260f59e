//! Legacy code-page conversion.
//!
//! Each supported page is a 256-entry decode table plus its inverse map.
//! The ISO-8859 and windows-125x tables come from `encoding_rs` (decoded
//! once per page, on first use); ISO-8859-1 is the identity on Latin-1, and
//! CP437 — not a web encoding — is a hand table. Code points with no
//! representation in the target page encode as `?`.

use std::sync::LazyLock;

use ahash::AHashMap;
use strum::{Display, EnumIter, EnumString};

use super::{Str, unicode};

/// The supported legacy code pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum CodePage {
    #[strum(serialize = "iso-8859-1")]
    Iso8859_1,
    #[strum(serialize = "iso-8859-2")]
    Iso8859_2,
    #[strum(serialize = "iso-8859-3")]
    Iso8859_3,
    #[strum(serialize = "iso-8859-4")]
    Iso8859_4,
    #[strum(serialize = "iso-8859-5")]
    Iso8859_5,
    #[strum(serialize = "iso-8859-6")]
    Iso8859_6,
    #[strum(serialize = "iso-8859-7")]
    Iso8859_7,
    #[strum(serialize = "iso-8859-8")]
    Iso8859_8,
    #[strum(serialize = "iso-8859-9")]
    Iso8859_9,
    #[strum(serialize = "iso-8859-10")]
    Iso8859_10,
    #[strum(serialize = "iso-8859-11")]
    Iso8859_11,
    #[strum(serialize = "iso-8859-13")]
    Iso8859_13,
    #[strum(serialize = "iso-8859-14")]
    Iso8859_14,
    #[strum(serialize = "iso-8859-15")]
    Iso8859_15,
    #[strum(serialize = "iso-8859-16")]
    Iso8859_16,
    #[strum(serialize = "cp437")]
    Cp437,
    #[strum(serialize = "windows-1250")]
    Windows1250,
    #[strum(serialize = "windows-1251")]
    Windows1251,
    #[strum(serialize = "windows-1252")]
    Windows1252,
    #[strum(serialize = "windows-1253")]
    Windows1253,
    #[strum(serialize = "windows-1254")]
    Windows1254,
    #[strum(serialize = "windows-1255")]
    Windows1255,
    #[strum(serialize = "windows-1256")]
    Windows1256,
    #[strum(serialize = "windows-1257")]
    Windows1257,
    #[strum(serialize = "windows-1258")]
    Windows1258,
}

struct PageTables {
    to_unicode: [char; 256],
    from_unicode: AHashMap<char, u8>,
}

fn invert(to_unicode: [char; 256]) -> PageTables {
    let mut from_unicode = AHashMap::with_capacity(256);
    for (byte, &cp) in to_unicode.iter().enumerate() {
        if cp != '\u{FFFD}' {
            // Keep the first (lowest) byte when a code point appears twice.
            from_unicode.entry(cp).or_insert(byte as u8);
        }
    }
    PageTables { to_unicode, from_unicode }
}

fn build_from_encoding(encoding: &'static encoding_rs::Encoding) -> PageTables {
    let mut to_unicode = ['\u{FFFD}'; 256];
    for byte in 0..=255u8 {
        let input = [byte];
        let (decoded, _) = encoding.decode_without_bom_handling(&input);
        let mut chars = decoded.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            to_unicode[byte as usize] = c;
        }
    }
    invert(to_unicode)
}

fn build_latin1() -> PageTables {
    let mut to_unicode = ['\u{FFFD}'; 256];
    for byte in 0..=255u8 {
        to_unicode[byte as usize] = char::from_u32(u32::from(byte)).unwrap_or('\u{FFFD}');
    }
    invert(to_unicode)
}

/// The upper half of CP437 (the lower half is ASCII).
const CP437_HIGH: [char; 128] = [
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å', //
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ', //
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '⌐', '¬', '½', '¼', '¡', '«', '»', //
    '░', '▒', '▓', '│', '┤', '╡', '╢', '╖', '╕', '╣', '║', '╗', '╝', '╜', '╛', '┐', //
    '└', '┴', '┬', '├', '─', '┼', '╞', '╟', '╚', '╔', '╩', '╦', '╠', '═', '╬', '╧', //
    '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫', '╪', '┘', '┌', '█', '▄', '▌', '▐', '▀', //
    'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ', 'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩', //
    '≡', '±', '≥', '≤', '⌠', '⌡', '÷', '≈', '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{A0}',
];

fn build_cp437() -> PageTables {
    let mut to_unicode = ['\u{FFFD}'; 256];
    for byte in 0..128u8 {
        to_unicode[byte as usize] = char::from(byte);
    }
    for (offset, &cp) in CP437_HIGH.iter().enumerate() {
        to_unicode[128 + offset] = cp;
    }
    invert(to_unicode)
}

macro_rules! encoding_page {
    ($name:ident, $encoding:expr) => {
        static $name: LazyLock<PageTables> = LazyLock::new(|| build_from_encoding($encoding));
    };
}

static LATIN1: LazyLock<PageTables> = LazyLock::new(build_latin1);
static CP437: LazyLock<PageTables> = LazyLock::new(build_cp437);
encoding_page!(ISO2, encoding_rs::ISO_8859_2);
encoding_page!(ISO3, encoding_rs::ISO_8859_3);
encoding_page!(ISO4, encoding_rs::ISO_8859_4);
encoding_page!(ISO5, encoding_rs::ISO_8859_5);
encoding_page!(ISO6, encoding_rs::ISO_8859_6);
encoding_page!(ISO7, encoding_rs::ISO_8859_7);
encoding_page!(ISO8, encoding_rs::ISO_8859_8);
// ISO-8859-9 and -11 are carried by their windows supersets, which is how
// the web platform treats them as well.
encoding_page!(ISO9, encoding_rs::WINDOWS_1254);
encoding_page!(ISO10, encoding_rs::ISO_8859_10);
encoding_page!(ISO11, encoding_rs::WINDOWS_874);
encoding_page!(ISO13, encoding_rs::ISO_8859_13);
encoding_page!(ISO14, encoding_rs::ISO_8859_14);
encoding_page!(ISO15, encoding_rs::ISO_8859_15);
encoding_page!(ISO16, encoding_rs::ISO_8859_16);
encoding_page!(WIN1250, encoding_rs::WINDOWS_1250);
encoding_page!(WIN1251, encoding_rs::WINDOWS_1251);
encoding_page!(WIN1252, encoding_rs::WINDOWS_1252);
encoding_page!(WIN1253, encoding_rs::WINDOWS_1253);
encoding_page!(WIN1254, encoding_rs::WINDOWS_1254);
encoding_page!(WIN1255, encoding_rs::WINDOWS_1255);
encoding_page!(WIN1256, encoding_rs::WINDOWS_1256);
encoding_page!(WIN1257, encoding_rs::WINDOWS_1257);
encoding_page!(WIN1258, encoding_rs::WINDOWS_1258);

fn tables(page: CodePage) -> &'static PageTables {
    match page {
        CodePage::Iso8859_1 => &LATIN1,
        CodePage::Iso8859_2 => &ISO2,
        CodePage::Iso8859_3 => &ISO3,
        CodePage::Iso8859_4 => &ISO4,
        CodePage::Iso8859_5 => &ISO5,
        CodePage::Iso8859_6 => &ISO6,
        CodePage::Iso8859_7 => &ISO7,
        CodePage::Iso8859_8 => &ISO8,
        CodePage::Iso8859_9 => &ISO9,
        CodePage::Iso8859_10 => &ISO10,
        CodePage::Iso8859_11 => &ISO11,
        CodePage::Iso8859_13 => &ISO13,
        CodePage::Iso8859_14 => &ISO14,
        CodePage::Iso8859_15 => &ISO15,
        CodePage::Iso8859_16 => &ISO16,
        CodePage::Cp437 => &CP437,
        CodePage::Windows1250 => &WIN1250,
        CodePage::Windows1251 => &WIN1251,
        CodePage::Windows1252 => &WIN1252,
        CodePage::Windows1253 => &WIN1253,
        CodePage::Windows1254 => &WIN1254,
        CodePage::Windows1255 => &WIN1255,
        CodePage::Windows1256 => &WIN1256,
        CodePage::Windows1257 => &WIN1257,
        CodePage::Windows1258 => &WIN1258,
    }
}

impl Str {
    /// Converts UTF-8 text to the given code page. Code points the page
    /// cannot express become `?`.
    #[must_use]
    pub fn to_code_page(&self, page: CodePage) -> Self {
        let tables = tables(page);
        let mut out = Vec::with_capacity(self.len());
        for cp in unicode::code_points(self.as_bytes()) {
            out.push(tables.from_unicode.get(&cp).copied().unwrap_or(b'?'));
        }
        Self::from_bytes(out)
    }

    /// Converts code-page bytes to UTF-8 text. Undefined bytes become
    /// U+FFFD.
    #[must_use]
    pub fn from_code_page(&self, page: CodePage) -> Self {
        let tables = tables(page);
        let mut out = Vec::with_capacity(self.len());
        for &byte in self.as_bytes() {
            unicode::encode_code_point(&mut out, tables.to_unicode[byte as usize]);
        }
        Self::from_bytes(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin1_round_trips() {
        let s = Str::from("héllo — café");
        let encoded = s.to_code_page(CodePage::Iso8859_1);
        // The em-dash is not Latin-1; it becomes '?'.
        assert_eq!(encoded.from_code_page(CodePage::Iso8859_1), Str::from("héllo ? café"));
    }

    #[test]
    fn cp437_box_drawing() {
        let s = Str::from("─┼─");
        let encoded = s.to_code_page(CodePage::Cp437);
        assert_eq!(encoded.as_bytes(), &[0xC4, 0xC5, 0xC4]);
        assert_eq!(encoded.from_code_page(CodePage::Cp437), s);
    }

    #[test]
    fn windows_1252_quotes() {
        let s = Str::from("\u{201C}hi\u{201D}");
        let encoded = s.to_code_page(CodePage::Windows1252);
        assert_eq!(encoded.as_bytes(), &[0x93, b'h', b'i', 0x94]);
        assert_eq!(encoded.from_code_page(CodePage::Windows1252), s);
    }

    #[test]
    fn unknown_code_points_become_question_marks() {
        let s = Str::from("日本");
        assert_eq!(s.to_code_page(CodePage::Iso8859_5), Str::from("??"));
    }
}
