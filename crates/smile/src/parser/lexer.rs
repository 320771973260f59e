//! A minimal tokenizer, sufficient to drive the parser and its tests.
//!
//! Recognizes names (alphabetic and punctuation runs), numeric literals
//! with kind suffixes (`b`/`h`/`t`/`l`/`x` for byte/16/32/64/128-bit
//! integers, `f`/`r` for binary/decimal floating point), double-quoted
//! strings with C escapes plus `\u{…}`, character literals, backtick
//! symbols, `#/pattern/flags` regex loanwords, and the bracket/punctuation
//! tokens. Newlines are tracked so the parser can apply its line-break
//! rules.

use crate::{
    error::{ParseMessage, SourcePos},
    symbol::{KnownSymbol, SymbolTable},
};

use super::token::{Token, TokenKind};

/// Lexes a whole source string.
pub fn lex(symbols: &mut SymbolTable, source: &str) -> (Vec<Token>, Vec<ParseMessage>) {
    Lexer {
        bytes: source.as_bytes(),
        at: 0,
        line: 1,
        column: 1,
        first_on_line: true,
        symbols,
        tokens: Vec::new(),
        messages: Vec::new(),
    }
    .run()
}

struct Lexer<'a> {
    bytes: &'a [u8],
    at: usize,
    line: u32,
    column: u32,
    first_on_line: bool,
    symbols: &'a mut SymbolTable,
    tokens: Vec<Token>,
    messages: Vec<ParseMessage>,
}

/// Punctuation characters that form operator names.
fn is_punct_name_char(b: u8) -> bool {
    matches!(b, b'~' | b'!' | b'?' | b'@' | b'%' | b'^' | b'&' | b'*' | b'-' | b'+' | b'=' | b'<' | b'>' | b'/' | b'\\')
}

fn is_alpha_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b >= 0x80
}

fn is_alpha_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

impl Lexer<'_> {
    fn run(mut self) -> (Vec<Token>, Vec<ParseMessage>) {
        while self.at < self.bytes.len() {
            let start_pos = self.pos();
            let b = self.bytes[self.at];
            match b {
                b' ' | b'\t' => {
                    self.advance(1);
                }
                b'\n' | b'\r' => {
                    self.newline();
                }
                b'/' if self.peek_at(1) == Some(b'/') => {
                    while self.at < self.bytes.len() && self.bytes[self.at] != b'\n' && self.bytes[self.at] != b'\r' {
                        self.advance(1);
                    }
                }
                b'/' if self.peek_at(1) == Some(b'*') => {
                    self.block_comment();
                }
                b'(' => self.single(TokenKind::LeftParen),
                b')' => self.single(TokenKind::RightParen),
                b'[' => self.single(TokenKind::LeftBracket),
                b']' => self.single(TokenKind::RightBracket),
                b'{' => self.single(TokenKind::LeftBrace),
                b'}' => self.single(TokenKind::RightBrace),
                b'|' => self.single(TokenKind::Bar),
                b',' => self.single(TokenKind::Comma),
                b';' => self.single(TokenKind::Semicolon),
                b':' => self.single(TokenKind::Colon),
                b'.' => {
                    if self.peek_at(1) == Some(b'.') {
                        self.advance(2);
                        self.push(TokenKind::DotDot, start_pos);
                    } else {
                        self.advance(1);
                        self.push(TokenKind::Dot, start_pos);
                    }
                }
                b'`' => self.backtick(start_pos),
                b'"' => self.string_literal(start_pos),
                b'\'' => self.char_literal(start_pos),
                b'#' if self.peek_at(1) == Some(b'/') => self.regex_literal(start_pos),
                b'0'..=b'9' => self.number(start_pos),
                b if is_alpha_start(b) => self.alpha_name(start_pos),
                b if is_punct_name_char(b) => self.punct_name(start_pos),
                other => {
                    self.error(start_pos, format!("Unknown character '{}'.", char::from(other)));
                    self.advance(1);
                }
            }
        }
        let pos = self.pos();
        self.push(TokenKind::Eoi, pos);
        (self.tokens, self.messages)
    }

    fn pos(&self) -> SourcePos {
        SourcePos::new(self.line, self.column)
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.at + offset).copied()
    }

    fn advance(&mut self, count: usize) {
        self.at += count;
        self.column += count as u32;
    }

    fn newline(&mut self) {
        let b = self.bytes[self.at];
        self.at += 1;
        // CRLF and LFCR each count as one newline.
        if self.at < self.bytes.len() {
            let next = self.bytes[self.at];
            if (b == b'\r' && next == b'\n') || (b == b'\n' && next == b'\r') {
                self.at += 1;
            }
        }
        self.line += 1;
        self.column = 1;
        self.first_on_line = true;
    }

    fn push(&mut self, kind: TokenKind, pos: SourcePos) {
        let first = self.first_on_line;
        self.first_on_line = false;
        self.tokens.push(Token {
            kind,
            pos,
            first_on_line: first,
        });
    }

    fn single(&mut self, kind: TokenKind) {
        let pos = self.pos();
        self.advance(1);
        self.push(kind, pos);
    }

    fn error(&mut self, pos: SourcePos, message: String) {
        self.messages.push(ParseMessage { position: pos, message });
    }

    fn block_comment(&mut self) {
        let start = self.pos();
        self.advance(2);
        loop {
            if self.at >= self.bytes.len() {
                self.error(start, "Unterminated block comment.".to_string());
                return;
            }
            match self.bytes[self.at] {
                b'*' if self.peek_at(1) == Some(b'/') => {
                    self.advance(2);
                    return;
                }
                b'\n' | b'\r' => self.newline(),
                _ => self.advance(1),
            }
        }
    }

    fn alpha_name(&mut self, pos: SourcePos) {
        let start = self.at;
        self.advance(1);
        loop {
            match self.peek_at(0) {
                Some(b) if is_alpha_continue(b) => self.advance(1),
                // Interior dashes join kebab-case names when followed by
                // another name character.
                Some(b'-') if self.peek_at(1).is_some_and(is_alpha_continue) => self.advance(2),
                _ => break,
            }
        }
        // Trailing ? and ! are part of the name (any?, sort!).
        while matches!(self.peek_at(0), Some(b'?') | Some(b'!')) {
            self.advance(1);
        }
        let text = String::from_utf8_lossy(&self.bytes[start..self.at]).into_owned();
        let symbol = self.symbols.intern(&text);
        let kind = if KnownSymbol::from_symbol(symbol).is_some_and(is_keyword) {
            TokenKind::AlphaName(symbol)
        } else {
            TokenKind::UnknownAlphaName(symbol)
        };
        self.push(kind, pos);
    }

    fn punct_name(&mut self, pos: SourcePos) {
        let start = self.at;
        while self.peek_at(0).is_some_and(is_punct_name_char) {
            self.advance(1);
        }
        let text = String::from_utf8_lossy(&self.bytes[start..self.at]).into_owned();
        if text == "=" {
            self.push(TokenKind::Equal, pos);
            return;
        }
        let symbol = self.symbols.intern(&text);
        let kind = if KnownSymbol::from_symbol(symbol).is_some_and(is_known_operator) {
            TokenKind::PunctName(symbol)
        } else {
            TokenKind::UnknownPunctName(symbol)
        };
        self.push(kind, pos);
    }

    fn number(&mut self, pos: SourcePos) {
        let start = self.at;
        while self.peek_at(0).is_some_and(|b| b.is_ascii_digit()) {
            self.advance(1);
        }
        let mut is_fractional = false;
        if self.peek_at(0) == Some(b'.') && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
            is_fractional = true;
            self.advance(1);
            while self.peek_at(0).is_some_and(|b| b.is_ascii_digit()) {
                self.advance(1);
            }
        }
        let digits = String::from_utf8_lossy(&self.bytes[start..self.at]).into_owned();

        if is_fractional {
            let value: f64 = digits.parse().unwrap_or(0.0);
            let kind = match self.peek_at(0) {
                Some(b'f') => {
                    self.advance(1);
                    TokenKind::Float64(value)
                }
                Some(b'r') => {
                    self.advance(1);
                    TokenKind::Real64(value)
                }
                // Unsuffixed fractional literals are decimal reals.
                _ => TokenKind::Real64(value),
            };
            self.push(kind, pos);
            return;
        }

        let kind = match self.peek_at(0) {
            Some(b'b') => {
                self.advance(1);
                match digits.parse::<u8>() {
                    Ok(v) => TokenKind::Byte(v),
                    Err(_) => {
                        self.error(pos, format!("Byte literal '{digits}' is out of range."));
                        TokenKind::Byte(0)
                    }
                }
            }
            Some(b'h') => {
                self.advance(1);
                match digits.parse::<i16>() {
                    Ok(v) => TokenKind::Int16(v),
                    Err(_) => {
                        self.error(pos, format!("Integer16 literal '{digits}' is out of range."));
                        TokenKind::Int16(0)
                    }
                }
            }
            Some(b't') => {
                self.advance(1);
                match digits.parse::<i32>() {
                    Ok(v) => TokenKind::Int32(v),
                    Err(_) => {
                        self.error(pos, format!("Integer32 literal '{digits}' is out of range."));
                        TokenKind::Int32(0)
                    }
                }
            }
            Some(b'l') => {
                self.advance(1);
                self.parse_i64(&digits, pos)
            }
            Some(b'x') => {
                self.advance(1);
                match digits.parse::<i128>() {
                    Ok(v) => TokenKind::Int128(v),
                    Err(_) => {
                        self.error(pos, format!("Integer128 literal '{digits}' is out of range."));
                        TokenKind::Int128(0)
                    }
                }
            }
            Some(b'f') => {
                self.advance(1);
                TokenKind::Float64(digits.parse().unwrap_or(0.0))
            }
            Some(b'r') => {
                self.advance(1);
                TokenKind::Real64(digits.parse().unwrap_or(0.0))
            }
            _ => self.parse_i64(&digits, pos),
        };
        self.push(kind, pos);
    }

    fn parse_i64(&mut self, digits: &str, pos: SourcePos) -> TokenKind {
        match digits.parse::<i64>() {
            Ok(v) => TokenKind::Int64(v),
            Err(_) => {
                self.error(pos, format!("Integer64 literal '{digits}' is out of range."));
                TokenKind::Int64(0)
            }
        }
    }

    fn backtick(&mut self, pos: SourcePos) {
        self.advance(1);
        match self.peek_at(0) {
            Some(b) if is_alpha_start(b) => {
                let start = self.at;
                self.advance(1);
                while self.peek_at(0).is_some_and(is_alpha_continue) {
                    self.advance(1);
                }
                while matches!(self.peek_at(0), Some(b'?') | Some(b'!')) {
                    self.advance(1);
                }
                let text = String::from_utf8_lossy(&self.bytes[start..self.at]).into_owned();
                let symbol = self.symbols.intern(&text);
                self.push(TokenKind::SymbolLiteral(symbol), pos);
            }
            Some(b) if is_punct_name_char(b) => {
                let start = self.at;
                while self.peek_at(0).is_some_and(is_punct_name_char) {
                    self.advance(1);
                }
                let text = String::from_utf8_lossy(&self.bytes[start..self.at]).into_owned();
                let symbol = self.symbols.intern(&text);
                self.push(TokenKind::SymbolLiteral(symbol), pos);
            }
            _ => self.push(TokenKind::Backtick, pos),
        }
    }

    fn string_literal(&mut self, pos: SourcePos) {
        self.advance(1);
        let mut out = String::new();
        loop {
            match self.peek_at(0) {
                None => {
                    self.error(pos, "Unterminated string literal.".to_string());
                    break;
                }
                Some(b'"') => {
                    self.advance(1);
                    break;
                }
                Some(b'\\') => {
                    self.advance(1);
                    self.escape_into(&mut out, pos);
                }
                Some(b'\n') | Some(b'\r') => {
                    self.error(pos, "Unterminated string literal.".to_string());
                    break;
                }
                Some(b) => {
                    out.push(char::from(b));
                    self.advance(1);
                }
            }
        }
        self.push(TokenKind::Str(out), pos);
    }

    fn escape_into(&mut self, out: &mut String, pos: SourcePos) {
        match self.peek_at(0) {
            None => self.error(pos, "Unterminated escape sequence.".to_string()),
            Some(b'n') => {
                out.push('\n');
                self.advance(1);
            }
            Some(b'r') => {
                out.push('\r');
                self.advance(1);
            }
            Some(b't') => {
                out.push('\t');
                self.advance(1);
            }
            Some(b'a') => {
                out.push('\x07');
                self.advance(1);
            }
            Some(b'b') => {
                out.push('\x08');
                self.advance(1);
            }
            Some(b'f') => {
                out.push('\x0C');
                self.advance(1);
            }
            Some(b'v') => {
                out.push('\x0B');
                self.advance(1);
            }
            Some(b'0') => {
                out.push('\0');
                self.advance(1);
            }
            Some(b'x') => {
                self.advance(1);
                let hi = self.peek_at(0).and_then(|b| char::from(b).to_digit(16));
                let lo = self.peek_at(1).and_then(|b| char::from(b).to_digit(16));
                if let (Some(hi), Some(lo)) = (hi, lo) {
                    out.push(char::from((hi * 16 + lo) as u8));
                    self.advance(2);
                } else {
                    self.error(pos, "Bad \\x escape in string literal.".to_string());
                }
            }
            Some(b'u') if self.peek_at(1) == Some(b'{') => {
                self.advance(2);
                let start = self.at;
                while self.peek_at(0).is_some_and(|b| b.is_ascii_hexdigit()) {
                    self.advance(1);
                }
                let digits = String::from_utf8_lossy(&self.bytes[start..self.at]).into_owned();
                if self.peek_at(0) == Some(b'}') {
                    self.advance(1);
                    match u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32) {
                        Some(c) => out.push(c),
                        None => self.error(pos, "Bad \\u{...} escape in string literal.".to_string()),
                    }
                } else {
                    self.error(pos, "Unterminated \\u{...} escape in string literal.".to_string());
                }
            }
            Some(other) => {
                out.push(char::from(other));
                self.advance(1);
            }
        }
    }

    fn char_literal(&mut self, pos: SourcePos) {
        self.advance(1);
        let mut buffer = String::new();
        match self.peek_at(0) {
            Some(b'\\') => {
                self.advance(1);
                self.escape_into(&mut buffer, pos);
            }
            Some(b) if b != b'\'' => {
                buffer.push(char::from(b));
                self.advance(1);
            }
            _ => self.error(pos, "Empty character literal.".to_string()),
        }
        if self.peek_at(0) == Some(b'\'') {
            self.advance(1);
        } else {
            self.error(pos, "Unterminated character literal.".to_string());
        }
        let cp = buffer.chars().next().map_or(0, |c| c as u32);
        if cp > 0xFF {
            self.push(TokenKind::Uni(cp), pos);
        } else {
            self.push(TokenKind::Char(cp as u8), pos);
        }
    }

    fn regex_literal(&mut self, pos: SourcePos) {
        self.advance(2); // #/
        let mut pattern = String::new();
        loop {
            match self.peek_at(0) {
                None | Some(b'\n') | Some(b'\r') => {
                    self.error(pos, "Unterminated regex literal.".to_string());
                    break;
                }
                Some(b'/') => {
                    self.advance(1);
                    break;
                }
                Some(b'\\') => {
                    pattern.push('\\');
                    self.advance(1);
                    if let Some(next) = self.peek_at(0) {
                        // `\/` is an escaped slash inside the loanword.
                        if next == b'/' {
                            pattern.pop();
                        }
                        pattern.push(char::from(next));
                        self.advance(1);
                    }
                }
                Some(b) => {
                    pattern.push(char::from(b));
                    self.advance(1);
                }
            }
        }
        let mut flags = String::new();
        while self.peek_at(0).is_some_and(|b| b.is_ascii_alphabetic()) {
            flags.push(char::from(self.bytes[self.at]));
            self.advance(1);
        }
        self.push(TokenKind::Regex { pattern, flags }, pos);
    }
}

/// The alphabetic keyword spellings.
fn is_keyword(known: KnownSymbol) -> bool {
    use KnownSymbol as K;
    matches!(
        known,
        K::If | K::Unless
            | K::Then
            | K::Else
            | K::While
            | K::Until
            | K::Till
            | K::Do
            | K::When
            | K::Var
            | K::Const
            | K::Auto
            | K::Keyword
            | K::Try
            | K::Catch
            | K::Fn
            | K::Quote
            | K::Scope
            | K::Prog1
            | K::Progn
            | K::Return
            | K::Not
            | K::Or
            | K::And
            | K::New
            | K::Is
            | K::Typeof
            | K::Brk
    )
}

/// The punctuation operator spellings with reserved parser meaning.
fn is_known_operator(known: KnownSymbol) -> bool {
    use KnownSymbol as K;
    matches!(
        known,
        K::Eq | K::Ne
            | K::Lt
            | K::Gt
            | K::Le
            | K::Ge
            | K::SuperEq
            | K::SuperNe
            | K::Plus
            | K::Minus
            | K::Star
            | K::Slash
            | K::Caret
            | K::ShiftLeft
            | K::ShiftRight
            | K::ArithmeticShiftLeft
            | K::ArithmeticShiftRight
            | K::RotateLeft
            | K::RotateRight
            | K::Implies
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut symbols = SymbolTable::with_known_symbols();
        let (tokens, messages) = lex(&mut symbols, source);
        assert!(messages.is_empty(), "unexpected lex errors: {messages:?}");
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn names_split_known_from_unknown() {
        let mut symbols = SymbolTable::with_known_symbols();
        let (tokens, _) = lex(&mut symbols, "if foo == +=");
        assert!(matches!(tokens[0].kind, TokenKind::AlphaName(s) if s == KnownSymbol::If.symbol()));
        assert!(matches!(tokens[1].kind, TokenKind::UnknownAlphaName(_)));
        assert!(matches!(tokens[2].kind, TokenKind::PunctName(s) if s == KnownSymbol::Eq.symbol()));
        assert!(matches!(tokens[3].kind, TokenKind::UnknownPunctName(_)));
    }

    #[test]
    fn numbers_with_suffixes() {
        assert_eq!(
            kinds("10 10b 10h 10t 10l 10x 1.5 2.5f 3r"),
            vec![
                TokenKind::Int64(10),
                TokenKind::Byte(10),
                TokenKind::Int16(10),
                TokenKind::Int32(10),
                TokenKind::Int64(10),
                TokenKind::Int128(10),
                TokenKind::Real64(1.5),
                TokenKind::Float64(2.5),
                TokenKind::Real64(3.0),
                TokenKind::Eoi,
            ]
        );
    }

    #[test]
    fn ranges_do_not_eat_numbers() {
        assert_eq!(
            kinds("1..10"),
            vec![TokenKind::Int64(1), TokenKind::DotDot, TokenKind::Int64(10), TokenKind::Eoi]
        );
    }

    #[test]
    fn strings_and_escapes() {
        assert_eq!(
            kinds(r#""a\nb\u{41}""#),
            vec![TokenKind::Str("a\nbA".to_string()), TokenKind::Eoi]
        );
    }

    #[test]
    fn regex_loanwords() {
        assert_eq!(
            kinds(r"#/\d+/im"),
            vec![
                TokenKind::Regex {
                    pattern: r"\d+".to_string(),
                    flags: "im".to_string()
                },
                TokenKind::Eoi
            ]
        );
    }

    #[test]
    fn backtick_symbols() {
        let mut symbols = SymbolTable::with_known_symbols();
        let (tokens, _) = lex(&mut symbols, "`foo `[");
        assert!(matches!(tokens[0].kind, TokenKind::SymbolLiteral(_)));
        assert_eq!(tokens[1].kind, TokenKind::Backtick);
        assert_eq!(tokens[2].kind, TokenKind::LeftBracket);
    }

    #[test]
    fn first_on_line_tracks_newlines() {
        let mut symbols = SymbolTable::with_known_symbols();
        let (tokens, _) = lex(&mut symbols, "a b\nc");
        assert!(tokens[0].first_on_line);
        assert!(!tokens[1].first_on_line);
        assert!(tokens[2].first_on_line);
        assert_eq!(tokens[2].pos.line, 2);
    }

    #[test]
    fn kebab_names_lex_as_one_token() {
        let mut symbols = SymbolTable::with_known_symbols();
        let (tokens, _) = lex(&mut symbols, "index-of a-1");
        assert!(matches!(tokens[0].kind, TokenKind::UnknownAlphaName(s) if s == KnownSymbol::IndexOf.symbol()));
        // The dash joins name characters, digits included.
        assert!(matches!(tokens[1].kind, TokenKind::UnknownAlphaName(_)));
    }
}
