//! The recursive-descent parser.
//!
//! Consumes the token stream and produces Smile list structure: every form
//! is `[$keyword args…]` built from cons cells, each carrying the source
//! position of the token that introduced it. Precedence is the fixed ladder
//!
//! ```text
//! term < dot < cons < postfix < prefix < range < colon
//!      < binary < mul < add < cmp < not < and < or < expr < stmt
//! ```
//!
//! and every level consults the custom-syntax table before (keyword root)
//! and inside (nonterminal root) its own rule, so user-registered syntax
//! can hook any level. Non-matching alternatives never consume tokens.

pub mod lexer;
pub mod token;

mod expr;
mod stmt;

use std::rc::Rc;

use ahash::{AHashMap, AHashSet};

use crate::{
    env::Env,
    error::{ParseMessage, SourcePos},
    symbol::{KnownSymbol, Symbol},
    value::Value,
};

use self::token::{Token, TokenKind};

/// The result of one parse attempt.
///
/// The contract: every variant except [`ParseResult::NotMatched`] may have
/// consumed tokens; `NotMatched` never has.
#[derive(Debug, Clone)]
pub enum ParseResult {
    /// Matched and produced an expression.
    Expr(Value),
    /// Matched, consumed tokens, produced nothing (declarations).
    NoResult,
    /// Something went wrong but the parser recovered; diagnostics were
    /// recorded and parsing can continue.
    Recovered,
    /// Matched partway and failed; the message explains where.
    Partial(ParseMessage),
    /// This alternative does not apply; no tokens were consumed.
    NotMatched,
}

impl ParseResult {
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Partial(_))
    }
}

/// Unwraps `ParseResult::Expr`, forwarding every other variant to the
/// caller. For *first*-operand positions, where nothing has been consumed
/// yet and `NotMatched` must propagate untouched.
macro_rules! try_expr {
    ($result:expr) => {
        match $result {
            $crate::parser::ParseResult::Expr(expr) => expr,
            other => return other,
        }
    };
}
pub(crate) use try_expr;

/// Unwraps `ParseResult::Expr` in a position where tokens have already
/// been consumed (after a keyword or an operator): a non-matching operand
/// here is a parse error, not a failed alternative.
macro_rules! require_expr {
    ($parser:expr, $result:expr) => {
        match $result {
            $crate::parser::ParseResult::Expr(expr) => expr,
            $crate::parser::ParseResult::NotMatched => {
                let at = $parser.peek().pos;
                return $crate::parser::ParseResult::Partial($crate::error::ParseMessage {
                    position: at,
                    message: "Expected an expression here.".to_string(),
                });
            }
            other => return other,
        }
    };
}
pub(crate) use require_expr;

/// Parser modes threaded down the precedence ladder.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseMode {
    /// When set, binary operators may begin a new line (inside parens,
    /// between `if` and `then`, and the like).
    pub binary_line_breaks: bool,
}

impl ParseMode {
    #[must_use]
    pub fn with_line_breaks(self) -> Self {
        Self {
            binary_line_breaks: true,
        }
    }
}

/// Whether a custom rule matches standing alone or chained after a parsed
/// left-hand side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyntaxRoot {
    Keyword,
    Nonterminal,
}

/// A registered custom-syntax rule. Keyword rules receive `None`;
/// nonterminal rules receive the already-parsed left-hand side.
pub type SyntaxRule = Rc<dyn Fn(&mut Parser<'_>, ParseMode, Option<Value>) -> ParseResult>;

/// The per-parser table of user-registered syntax rules.
#[derive(Default)]
pub struct CustomSyntaxTable {
    rules: AHashMap<(Symbol, SyntaxRoot, Symbol), SyntaxRule>,
    /// Symbols claimed by custom rules or `keyword` declarations; the
    /// arbitrary-operator rules refuse them.
    follow: AHashSet<Symbol>,
}

impl std::fmt::Debug for CustomSyntaxTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomSyntaxTable")
            .field("rules", &self.rules.len())
            .field("follow", &self.follow.len())
            .finish()
    }
}

/// The parser for one token stream.
#[derive(Debug)]
pub struct Parser<'a> {
    pub(crate) env: &'a mut Env,
    tokens: Vec<Token>,
    position: usize,
    pub messages: Vec<ParseMessage>,
    custom: CustomSyntaxTable,
}

/// Lexes and parses a whole source string against an interpreter context.
/// Multiple top-level statements wrap in `[$progn …]`.
pub fn parse_source(env: &mut Env, source: &str) -> Result<Value, Vec<ParseMessage>> {
    let (tokens, lex_messages) = lexer::lex(&mut env.symbols, source);
    let mut parser = Parser::new(env, tokens);
    parser.messages.extend(lex_messages);
    let program = parser.parse_program();
    if parser.messages.is_empty() {
        Ok(program)
    } else {
        Err(parser.messages)
    }
}

impl<'a> Parser<'a> {
    #[must_use]
    pub fn new(env: &'a mut Env, tokens: Vec<Token>) -> Self {
        Self {
            env,
            tokens,
            position: 0,
            messages: Vec::new(),
            custom: CustomSyntaxTable::default(),
        }
    }

    /// Registers a custom-syntax rule at one precedence nonterminal.
    ///
    /// Keyword-rooted rules are keyed by their leading keyword symbol
    /// (which is also withdrawn from the arbitrary-operator rule);
    /// nonterminal-rooted rules are keyed by the follower nonterminal.
    pub fn register_syntax(&mut self, nonterminal: KnownSymbol, root: SyntaxRoot, key: Symbol, rule: SyntaxRule) {
        if root == SyntaxRoot::Keyword {
            self.custom.follow.insert(key);
        }
        self.custom.rules.insert((nonterminal.symbol(), root, key), rule);
    }

    /// Reserves a name so the arbitrary-operator rules skip it (the
    /// `keyword` declaration).
    pub fn reserve_keyword(&mut self, name: Symbol) {
        self.custom.follow.insert(name);
    }

    pub(crate) fn is_reserved(&self, name: Symbol) -> bool {
        self.custom.follow.contains(&name)
    }

    /// The custom-syntax dispatch hook, consulted at every precedence
    /// level. Keyword dispatch looks at the next token; nonterminal
    /// dispatch applies to an already-parsed left-hand side.
    pub(crate) fn apply_custom_syntax(
        &mut self,
        mode: ParseMode,
        nonterminal: KnownSymbol,
        root: SyntaxRoot,
        key: Option<KnownSymbol>,
        lhs: Option<Value>,
    ) -> ParseResult {
        let lookup_key = match root {
            SyntaxRoot::Keyword => match self.peek().name_symbol() {
                Some(symbol) => symbol,
                None => return ParseResult::NotMatched,
            },
            SyntaxRoot::Nonterminal => match key {
                Some(known) => known.symbol(),
                None => return ParseResult::NotMatched,
            },
        };
        let Some(rule) = self.custom.rules.get(&(nonterminal.symbol(), root, lookup_key)).cloned() else {
            return ParseResult::NotMatched;
        };
        rule(self, mode, lhs)
    }

    // ------------------------------------------------------------------
    // Token plumbing.

    pub(crate) fn peek(&self) -> &Token {
        self.tokens.get(self.position).unwrap_or_else(|| {
            self.tokens.last().expect("token stream always ends with Eoi")
        })
    }

    pub(crate) fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    pub(crate) fn next(&mut self) -> Token {
        let token = self.peek().clone();
        if self.position + 1 < self.tokens.len() {
            self.position += 1;
        }
        token
    }

    pub(crate) fn unget(&mut self) {
        self.position = self.position.saturating_sub(1);
    }

    pub(crate) fn at_eoi(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eoi)
    }

    pub(crate) fn add_error(&mut self, pos: SourcePos, message: impl Into<String>) {
        self.messages.push(ParseMessage {
            position: pos,
            message: message.into(),
        });
    }

    /// Scans forward to the nearest recovery token — a closing brace,
    /// bracket, parenthesis, bar, or keyword — without consuming it.
    pub(crate) fn recover(&mut self) -> Token {
        loop {
            let token = self.peek().clone();
            match token.kind {
                TokenKind::RightBrace
                | TokenKind::RightBracket
                | TokenKind::RightParen
                | TokenKind::Bar
                | TokenKind::AlphaName(_)
                | TokenKind::Eoi => return token,
                _ => {
                    self.next();
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // List construction.

    pub(crate) fn cons_at(&mut self, a: Value, d: Value, pos: SourcePos) -> Value {
        self.env.heap.alloc_cons(a, d, pos)
    }

    pub(crate) fn known(&self, known: KnownSymbol) -> Value {
        Value::Symbol(known.symbol())
    }

    /// Builds a well-formed list from items, every cell at `pos`.
    pub(crate) fn list_at(&mut self, items: &[Value], pos: SourcePos) -> Value {
        let mut result = Value::Null;
        for &item in items.iter().rev() {
            result = self.cons_at(item, result, pos);
        }
        result
    }

    /// Builds the dot form `[$dot lhs rhs]`.
    pub(crate) fn dot_form(&mut self, lhs: Value, rhs: Value, pos: SourcePos) -> Value {
        let dollar_dot = self.known(KnownSymbol::DollarDot);
        self.list_at(&[dollar_dot, lhs, rhs], pos)
    }

    /// Builds `[(lhs.op) rhs]`, the shape of a binary operator invocation.
    pub(crate) fn binary_form(&mut self, lhs: Value, op: Symbol, rhs: Value, pos: SourcePos) -> Value {
        let dot = self.dot_form(lhs, Value::Symbol(op), pos);
        self.list_at(&[dot, rhs], pos)
    }

    // ------------------------------------------------------------------
    // Program entry.

    /// Parses a whole program: statements separated by semicolons or
    /// line structure. Multiple statements wrap in `[$progn …]`.
    pub fn parse_program(&mut self) -> Value {
        let mut statements = Vec::new();
        let program_pos = self.peek().pos;
        loop {
            while matches!(self.peek_kind(), TokenKind::Semicolon) {
                self.next();
            }
            if self.at_eoi() {
                break;
            }
            match self.parse_stmt(ParseMode::default()) {
                ParseResult::Expr(expr) => statements.push(expr),
                ParseResult::NoResult | ParseResult::Recovered => {}
                ParseResult::Partial(message) => {
                    self.messages.push(message);
                    self.recover();
                    // Leave the recovery token for the next iteration
                    // unless it is one of the closers, which are stray at
                    // the top level.
                    if matches!(
                        self.peek_kind(),
                        TokenKind::RightBrace | TokenKind::RightBracket | TokenKind::RightParen | TokenKind::Bar
                    ) {
                        self.next();
                    }
                }
                ParseResult::NotMatched => {
                    let token = self.next();
                    self.add_error(token.pos, format!("Unexpected token {:?}.", token.kind));
                }
            }
        }
        match statements.len() {
            0 => Value::Null,
            1 => statements[0],
            _ => {
                let progn = self.known(KnownSymbol::DollarProgn);
                let mut items = vec![progn];
                items.extend(statements);
                self.list_at(&items, program_pos)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> (String, Env) {
        let mut env = Env::new();
        let result = parse_source(&mut env, source);
        match result {
            Ok(value) => {
                let text = value.repr(&env.heap, &env.symbols);
                (text, env)
            }
            Err(messages) => panic!("parse failed: {messages:?}"),
        }
    }

    fn parse_repr(source: &str) -> String {
        parse(source).0
    }

    #[test]
    fn if_then_else_builds_the_if_form() {
        assert_eq!(parse_repr("if 1 < 2 then 10 else 20"), "[$if [[1.<] 2] 10 20]");
    }

    #[test]
    fn if_without_else_builds_the_short_form() {
        assert_eq!(parse_repr("if x then 10"), "[$if x 10]");
    }

    #[test]
    fn unless_inserts_a_not() {
        assert_eq!(parse_repr("unless x then 10"), "[$if [$not x] 10]");
    }

    #[test]
    fn do_until_builds_the_while_form() {
        assert_eq!(
            parse_repr("do x += 1 until x == 10"),
            "[$while [[x.+=] 1] [$not [[x.==] 10]] null]"
        );
    }

    #[test]
    fn while_do_builds_the_two_element_form() {
        assert_eq!(parse_repr("while x < 10 do x += 1"), "[$while [[x.<] 10] [[x.+=] 1]]");
    }

    #[test]
    fn assignment_and_operators() {
        assert_eq!(parse_repr("x = 1 + 2 * 3"), "[$set x [[1.+] [[2.*] 3]]]");
        assert_eq!(parse_repr("a === b"), "[$eq a b]");
        assert_eq!(parse_repr("a !== b"), "[$ne a b]");
        assert_eq!(parse_repr("a is b"), "[$is a b]");
    }

    #[test]
    fn and_or_build_variadic_forms() {
        assert_eq!(parse_repr("a and b and c"), "[$and a b c]");
        assert_eq!(parse_repr("a or b"), "[$or a b]");
        assert_eq!(parse_repr("not a"), "[$not a]");
    }

    #[test]
    fn prefix_operators_apply_outermost_last() {
        assert_eq!(parse_repr("typeof x"), "[$typeof x]");
        assert_eq!(parse_repr("-x"), "[[x.-]]");
    }

    #[test]
    fn dot_range_and_colon() {
        assert_eq!(parse_repr("a.b"), "[a.b]");
        assert_eq!(parse_repr("a.b.c"), "[[a.b].c]");
        assert_eq!(parse_repr("1..10"), "[[1.range-to] 10]");
        assert_eq!(parse_repr("a:1"), "[$index a 1]");
    }

    #[test]
    fn fn_literals_and_try_catch() {
        assert_eq!(parse_repr("|x| x * 2"), "[$fn [x] [[x.*] 2]]");
        assert_eq!(parse_repr("try foo catch |e| e"), "[$catch foo [$fn [e] e]]");
    }

    #[test]
    fn return_and_till() {
        assert_eq!(parse_repr("return x"), "[$return x]");
        assert_eq!(parse_repr("till done do x"), "[$till [done] x]");
    }

    #[test]
    fn var_declarations() {
        assert_eq!(parse_repr("var x = 5"), "[$set x 5]");
        assert_eq!(parse_repr("var x = 5, y = 6"), "[$progn [$set x 5] [$set y 6]]");
    }

    #[test]
    fn multiple_statements_wrap_in_progn() {
        assert_eq!(parse_repr("x = 1\ny = 2"), "[$progn [$set x 1] [$set y 2]]");
    }

    #[test]
    fn binary_operators_do_not_cross_lines() {
        // Outside any grouping, the `+` on a new line starts a fresh
        // statement (a unary plus), not a continuation of `a`.
        assert_eq!(parse_repr("a\n+ b"), "[$progn a [[b.+]]]");
        // Inside parentheses the same break continues the binary form.
        assert_eq!(parse_repr("(a\n+ b)"), "[[a.+] b]");
    }

    #[test]
    fn quoted_lists_and_symbols() {
        assert_eq!(parse_repr("`foo"), "[$quote foo]");
        assert_eq!(parse_repr("`[a b]"), "[$quote [a b]]");
    }

    #[test]
    fn regex_literals_parse_through_the_cache() {
        let (repr, env) = parse("#/a+/i");
        assert_eq!(repr, "#/a+/i");
        assert_eq!(env.regex_cache.len(), 1);
    }

    #[test]
    fn custom_syntax_keyword_rule_matches_at_stmt_level() {
        let mut env = Env::new();
        let (tokens, _) = lexer::lex(&mut env.symbols, "hello world");
        let hello = env.symbols.intern("hello");
        let mut parser = Parser::new(&mut env, tokens);
        parser.register_syntax(
            KnownSymbol::NtStmt,
            SyntaxRoot::Keyword,
            hello,
            Rc::new(|parser, _mode, _lhs| {
                let keyword = parser.next(); // consume `hello`
                let target = parser.next(); // consume the operand
                let Some(symbol) = target.name_symbol() else {
                    return ParseResult::Partial(ParseMessage {
                        position: target.pos,
                        message: "hello needs a name".into(),
                    });
                };
                let items = [Value::Symbol(symbol)];
                ParseResult::Expr(parser.list_at(&items, keyword.pos))
            }),
        );
        let program = parser.parse_program();
        assert!(parser.messages.is_empty(), "{:?}", parser.messages);
        let repr = program.repr(&env.heap, &env.symbols);
        assert_eq!(repr, "[world]");
    }

    #[test]
    fn reserved_keywords_are_excluded_from_binary_operators() {
        // Without a reservation, `a foo 1` is a binary invocation of foo.
        assert_eq!(parse_repr("a foo 1"), "[[a.foo] 1]");
        // After `keyword foo`, the same input is three separate statements.
        assert_eq!(parse_repr("keyword foo\na foo 1"), "[$progn a foo 1]");
    }
}
