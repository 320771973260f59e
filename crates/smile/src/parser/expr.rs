//! The expression levels of the precedence ladder.
//!
//! Each level parses its left operand at the next-tighter level, then loops
//! consuming its own operators. Binary operators respect the line-break
//! rule: unless the surrounding context allows it, an operator that is the
//! first content on its line ends the expression instead of extending it.

use crate::{
    error::SourcePos,
    symbol::{KnownSymbol, Symbol},
    value::{Real64, Value},
};

use super::{ParseMode, ParseResult, Parser, SyntaxRoot, require_expr, token::TokenKind, try_expr};

impl Parser<'_> {
    /// `expr` is `stmt` — statements are expressions in this grammar.
    pub(crate) fn parse_expr(&mut self, mode: ParseMode) -> ParseResult {
        self.parse_stmt(mode)
    }

    /// Whether a binary/operator token may extend the current expression
    /// under the line-break rule.
    fn operator_allowed(&self, first_on_line: bool, mode: ParseMode) -> bool {
        mode.binary_line_breaks || !first_on_line
    }

    // ------------------------------------------------------------------
    // Assignment.

    pub(crate) fn parse_op_equals(&mut self, mode: ParseMode) -> ParseResult {
        let lhs = try_expr!(self.parse_or(mode));
        let token = self.peek().clone();
        if token.kind == TokenKind::Equal && self.operator_allowed(token.first_on_line, mode) {
            self.next();
            let rhs = require_expr!(self, self.parse_op_equals(mode));
            let set = self.known(KnownSymbol::DollarSet);
            return ParseResult::Expr(self.list_at(&[set, lhs, rhs], token.pos));
        }
        ParseResult::Expr(lhs)
    }

    // ------------------------------------------------------------------
    // Short-circuit logic.

    pub(crate) fn parse_or(&mut self, mode: ParseMode) -> ParseResult {
        let hooked = self.apply_custom_syntax(mode, KnownSymbol::NtExpr, SyntaxRoot::Keyword, None, None);
        if !matches!(hooked, ParseResult::NotMatched) {
            return hooked;
        }

        let first = try_expr!(self.parse_and(mode));
        let mut items = vec![first];
        let mut or_pos = SourcePos::UNKNOWN;
        loop {
            let token = self.peek().clone();
            let is_or = matches!(token.kind, TokenKind::AlphaName(s) if s == KnownSymbol::Or.symbol());
            if !is_or || !self.operator_allowed(token.first_on_line, mode) {
                break;
            }
            self.next();
            if or_pos == SourcePos::UNKNOWN {
                or_pos = token.pos;
            }
            items.push(require_expr!(self, self.parse_and(mode)));
        }
        if items.len() == 1 {
            return ParseResult::Expr(items[0]);
        }
        let or = self.known(KnownSymbol::DollarOr);
        let mut form = vec![or];
        form.extend(items);
        ParseResult::Expr(self.list_at(&form, or_pos))
    }

    pub(crate) fn parse_and(&mut self, mode: ParseMode) -> ParseResult {
        let first = try_expr!(self.parse_not(mode));
        let mut items = vec![first];
        let mut and_pos = SourcePos::UNKNOWN;
        loop {
            let token = self.peek().clone();
            let is_and = matches!(token.kind, TokenKind::AlphaName(s) if s == KnownSymbol::And.symbol());
            if !is_and || !self.operator_allowed(token.first_on_line, mode) {
                break;
            }
            self.next();
            if and_pos == SourcePos::UNKNOWN {
                and_pos = token.pos;
            }
            items.push(require_expr!(self, self.parse_not(mode)));
        }
        if items.len() == 1 {
            return ParseResult::Expr(items[0]);
        }
        let and = self.known(KnownSymbol::DollarAnd);
        let mut form = vec![and];
        form.extend(items);
        ParseResult::Expr(self.list_at(&form, and_pos))
    }

    /// `not` is right-recursive; the nots are collected in a loop and
    /// applied innermost-to-outermost afterward.
    pub(crate) fn parse_not(&mut self, mode: ParseMode) -> ParseResult {
        let mut not_positions = Vec::new();
        loop {
            let token = self.peek().clone();
            let is_not = matches!(token.kind, TokenKind::AlphaName(s) if s == KnownSymbol::Not.symbol());
            if !is_not {
                break;
            }
            if !not_positions.is_empty() && !self.operator_allowed(token.first_on_line, mode) {
                break;
            }
            self.next();
            not_positions.push(token.pos);
        }

        let mut expr = if not_positions.is_empty() {
            try_expr!(self.parse_cmp(mode))
        } else {
            require_expr!(self, self.parse_cmp(mode))
        };
        for &pos in not_positions.iter().rev() {
            let not = self.known(KnownSymbol::DollarNot);
            expr = self.list_at(&[not, expr], pos);
        }
        ParseResult::Expr(expr)
    }

    // ------------------------------------------------------------------
    // Comparisons.

    pub(crate) fn parse_cmp(&mut self, mode: ParseMode) -> ParseResult {
        let hooked = self.apply_custom_syntax(mode, KnownSymbol::NtCmpExpr, SyntaxRoot::Keyword, None, None);
        if !matches!(hooked, ParseResult::NotMatched) {
            return hooked;
        }

        let mut expr = try_expr!(self.parse_add(mode));
        loop {
            match self.apply_custom_syntax(
                mode,
                KnownSymbol::NtCmpExpr,
                SyntaxRoot::Nonterminal,
                Some(KnownSymbol::NtAddExpr),
                Some(expr),
            ) {
                ParseResult::Expr(chained) => {
                    expr = chained;
                    continue;
                }
                ParseResult::NotMatched => {}
                other => return other,
            }

            let token = self.peek().clone();
            let symbol = match token.kind {
                TokenKind::PunctName(s)
                    if matches!(
                        KnownSymbol::from_symbol(s),
                        Some(
                            KnownSymbol::Lt
                                | KnownSymbol::Gt
                                | KnownSymbol::Le
                                | KnownSymbol::Ge
                                | KnownSymbol::Eq
                                | KnownSymbol::Ne
                                | KnownSymbol::SuperEq
                                | KnownSymbol::SuperNe
                        )
                    ) =>
                {
                    s
                }
                TokenKind::AlphaName(s) if s == KnownSymbol::Is.symbol() => s,
                _ => break,
            };
            if !self.operator_allowed(token.first_on_line, mode) {
                break;
            }
            self.next();
            let rhs = require_expr!(self, self.parse_add(mode));
            expr = match KnownSymbol::from_symbol(symbol) {
                Some(KnownSymbol::SuperEq) => {
                    let eq = self.known(KnownSymbol::DollarEq);
                    self.list_at(&[eq, expr, rhs], token.pos)
                }
                Some(KnownSymbol::SuperNe) => {
                    let ne = self.known(KnownSymbol::DollarNe);
                    self.list_at(&[ne, expr, rhs], token.pos)
                }
                Some(KnownSymbol::Is) => {
                    let is = self.known(KnownSymbol::DollarIs);
                    self.list_at(&[is, expr, rhs], token.pos)
                }
                _ => self.binary_form(expr, symbol, rhs, token.pos),
            };
        }
        ParseResult::Expr(expr)
    }

    // ------------------------------------------------------------------
    // Arithmetic.

    pub(crate) fn parse_add(&mut self, mode: ParseMode) -> ParseResult {
        let hooked = self.apply_custom_syntax(mode, KnownSymbol::NtAddExpr, SyntaxRoot::Keyword, None, None);
        if !matches!(hooked, ParseResult::NotMatched) {
            return hooked;
        }

        let mut expr = try_expr!(self.parse_mul(mode));
        loop {
            match self.apply_custom_syntax(
                mode,
                KnownSymbol::NtAddExpr,
                SyntaxRoot::Nonterminal,
                Some(KnownSymbol::NtMulExpr),
                Some(expr),
            ) {
                ParseResult::Expr(chained) => {
                    expr = chained;
                    continue;
                }
                ParseResult::NotMatched => {}
                other => return other,
            }

            let token = self.peek().clone();
            let symbol = match token.kind {
                TokenKind::PunctName(s)
                    if matches!(KnownSymbol::from_symbol(s), Some(KnownSymbol::Plus | KnownSymbol::Minus)) =>
                {
                    s
                }
                _ => break,
            };
            if !self.operator_allowed(token.first_on_line, mode) {
                break;
            }
            self.next();
            let rhs = require_expr!(self, self.parse_mul(mode));
            expr = self.binary_form(expr, symbol, rhs, token.pos);
        }
        ParseResult::Expr(expr)
    }

    pub(crate) fn parse_mul(&mut self, mode: ParseMode) -> ParseResult {
        let hooked = self.apply_custom_syntax(mode, KnownSymbol::NtMulExpr, SyntaxRoot::Keyword, None, None);
        if !matches!(hooked, ParseResult::NotMatched) {
            return hooked;
        }

        let mut expr = try_expr!(self.parse_binary(mode));
        loop {
            match self.apply_custom_syntax(
                mode,
                KnownSymbol::NtMulExpr,
                SyntaxRoot::Nonterminal,
                Some(KnownSymbol::NtBinaryExpr),
                Some(expr),
            ) {
                ParseResult::Expr(chained) => {
                    expr = chained;
                    continue;
                }
                ParseResult::NotMatched => {}
                other => return other,
            }

            let token = self.peek().clone();
            let symbol = match token.kind {
                TokenKind::PunctName(s)
                    if matches!(KnownSymbol::from_symbol(s), Some(KnownSymbol::Star | KnownSymbol::Slash)) =>
                {
                    s
                }
                _ => break,
            };
            if !self.operator_allowed(token.first_on_line, mode) {
                break;
            }
            self.next();
            let rhs = require_expr!(self, self.parse_binary(mode));
            expr = self.binary_form(expr, symbol, rhs, token.pos);
        }
        ParseResult::Expr(expr)
    }

    // ------------------------------------------------------------------
    // Arbitrary binary operators.

    pub(crate) fn parse_binary(&mut self, mode: ParseMode) -> ParseResult {
        let hooked = self.apply_custom_syntax(mode, KnownSymbol::NtBinaryExpr, SyntaxRoot::Keyword, None, None);
        if !matches!(hooked, ParseResult::NotMatched) {
            return hooked;
        }

        let mut expr = try_expr!(self.parse_colon(mode));
        loop {
            match self.apply_custom_syntax(
                mode,
                KnownSymbol::NtBinaryExpr,
                SyntaxRoot::Nonterminal,
                Some(KnownSymbol::NtColonExpr),
                Some(expr),
            ) {
                ParseResult::Expr(chained) => {
                    expr = chained;
                    continue;
                }
                ParseResult::NotMatched => {}
                other => return other,
            }

            let token = self.peek().clone();
            let symbol = match token.kind {
                TokenKind::UnknownAlphaName(s) | TokenKind::UnknownPunctName(s) if !self.is_reserved(s) => s,
                _ => break,
            };
            if !self.operator_allowed(token.first_on_line, mode) {
                break;
            }
            self.next();
            let first_arg = require_expr!(self, self.parse_colon(mode));

            // A binary operator may take comma-separated extra arguments:
            // `lhs op a, b, c` is one invocation with three arguments.
            let mut args = vec![first_arg];
            while matches!(self.peek_kind(), TokenKind::Comma) {
                self.next();
                args.push(require_expr!(self, self.parse_colon(mode)));
            }

            let dot = self.dot_form(expr, Value::Symbol(symbol), token.pos);
            let mut form = vec![dot];
            form.extend(args);
            expr = self.list_at(&form, token.pos);
        }
        ParseResult::Expr(expr)
    }

    // ------------------------------------------------------------------
    // Colon (indexing) and ranges.

    pub(crate) fn parse_colon(&mut self, mode: ParseMode) -> ParseResult {
        let hooked = self.apply_custom_syntax(mode, KnownSymbol::NtColonExpr, SyntaxRoot::Keyword, None, None);
        if !matches!(hooked, ParseResult::NotMatched) {
            return hooked;
        }

        let mut expr = try_expr!(self.parse_range(mode));
        loop {
            let token = self.peek().clone();
            if token.kind != TokenKind::Colon || !self.operator_allowed(token.first_on_line, mode) {
                break;
            }
            self.next();
            let rhs = require_expr!(self, self.parse_range(mode));
            let index = self.known(KnownSymbol::DollarIndex);
            expr = self.list_at(&[index, expr, rhs], token.pos);
        }
        ParseResult::Expr(expr)
    }

    pub(crate) fn parse_range(&mut self, mode: ParseMode) -> ParseResult {
        let hooked = self.apply_custom_syntax(mode, KnownSymbol::NtRangeExpr, SyntaxRoot::Keyword, None, None);
        if !matches!(hooked, ParseResult::NotMatched) {
            return hooked;
        }

        let expr = try_expr!(self.parse_prefix(mode));
        let token = self.peek().clone();
        if token.kind == TokenKind::DotDot && self.operator_allowed(token.first_on_line, mode) {
            self.next();
            let rhs = require_expr!(self, self.parse_prefix(mode));
            return ParseResult::Expr(self.binary_form(expr, KnownSymbol::RangeTo.symbol(), rhs, token.pos));
        }
        ParseResult::Expr(expr)
    }

    // ------------------------------------------------------------------
    // Prefix operators.

    /// Collects prefix operators greedily, then applies them innermost
    /// first. `typeof` builds `[$typeof x]`; every other unary symbol
    /// builds the no-argument method call `[(x.op)]`.
    pub(crate) fn parse_prefix(&mut self, mode: ParseMode) -> ParseResult {
        let hooked = self.apply_custom_syntax(mode, KnownSymbol::NtPrefixExpr, SyntaxRoot::Keyword, None, None);
        if !matches!(hooked, ParseResult::NotMatched) {
            return hooked;
        }

        let mut operators: Vec<(Symbol, SourcePos, bool)> = Vec::new();
        loop {
            let token = self.peek().clone();
            // Alphabetic names are never prefix operators here: a bare name
            // is a variable reference, and consuming it as an operator
            // would swallow the left side of every expression.
            let accepted = match token.kind {
                TokenKind::UnknownPunctName(s) if !self.is_reserved(s) => Some((s, false)),
                TokenKind::PunctName(s) => Some((s, false)),
                TokenKind::AlphaName(s) if s == KnownSymbol::Typeof.symbol() => Some((s, true)),
                _ => None,
            };
            let Some((symbol, is_typeof)) = accepted else {
                break;
            };
            if !operators.is_empty() && !self.operator_allowed(token.first_on_line, mode) {
                break;
            }
            self.next();
            operators.push((symbol, token.pos, is_typeof));
        }

        let mut expr = if operators.is_empty() {
            try_expr!(self.parse_postfix(mode))
        } else {
            require_expr!(self, self.parse_postfix(mode))
        };
        for &(symbol, pos, is_typeof) in operators.iter().rev() {
            expr = if is_typeof {
                let type_of = self.known(KnownSymbol::DollarTypeof);
                self.list_at(&[type_of, expr], pos)
            } else {
                let dot = self.dot_form(expr, Value::Symbol(symbol), pos);
                self.list_at(&[dot], pos)
            };
        }
        ParseResult::Expr(expr)
    }

    // ------------------------------------------------------------------
    // Postfix, cons, and dot levels.

    pub(crate) fn parse_postfix(&mut self, mode: ParseMode) -> ParseResult {
        let hooked = self.apply_custom_syntax(mode, KnownSymbol::NtPostfixExpr, SyntaxRoot::Keyword, None, None);
        if !matches!(hooked, ParseResult::NotMatched) {
            return hooked;
        }
        self.parse_cons(mode)
    }

    pub(crate) fn parse_cons(&mut self, mode: ParseMode) -> ParseResult {
        let hooked = self.apply_custom_syntax(mode, KnownSymbol::NtConsExpr, SyntaxRoot::Keyword, None, None);
        if !matches!(hooked, ParseResult::NotMatched) {
            return hooked;
        }
        self.parse_dot(mode)
    }

    pub(crate) fn parse_dot(&mut self, mode: ParseMode) -> ParseResult {
        let hooked = self.apply_custom_syntax(mode, KnownSymbol::NtDotExpr, SyntaxRoot::Keyword, None, None);
        if !matches!(hooked, ParseResult::NotMatched) {
            return hooked;
        }

        let mut expr = try_expr!(self.parse_term(mode));
        loop {
            if *self.peek_kind() != TokenKind::Dot {
                break;
            }
            let dot_token = self.next();
            let member = self.next();
            let Some(symbol) = member.name_symbol() else {
                self.unget();
                return ParseResult::Partial(crate::error::ParseMessage {
                    position: member.pos,
                    message: "Expected a member name after '.'.".to_string(),
                });
            };
            expr = self.dot_form(expr, Value::Symbol(symbol), dot_token.pos);
        }
        ParseResult::Expr(expr)
    }

    // ------------------------------------------------------------------
    // Terms.

    pub(crate) fn parse_term(&mut self, mode: ParseMode) -> ParseResult {
        let hooked = self.apply_custom_syntax(mode, KnownSymbol::NtTerm, SyntaxRoot::Keyword, None, None);
        if !matches!(hooked, ParseResult::NotMatched) {
            return hooked;
        }

        let token = self.next();
        let pos = token.pos;
        match token.kind {
            TokenKind::Byte(v) => ParseResult::Expr(Value::Byte(v)),
            TokenKind::Int16(v) => ParseResult::Expr(Value::Int16(v)),
            TokenKind::Int32(v) => ParseResult::Expr(Value::Int32(v)),
            TokenKind::Int64(v) => ParseResult::Expr(Value::Int64(v)),
            TokenKind::Int128(v) => {
                let id = self.env.heap.allocate(crate::heap::HeapData::Int128(v));
                ParseResult::Expr(Value::Ref(id))
            }
            TokenKind::Real64(v) => ParseResult::Expr(Value::Real64(Real64(v))),
            TokenKind::Float64(v) => ParseResult::Expr(Value::Float64(v)),
            TokenKind::Char(c) => ParseResult::Expr(Value::Char(c)),
            TokenKind::Uni(u) => ParseResult::Expr(Value::Uni(u)),
            TokenKind::Str(s) => ParseResult::Expr(self.env.heap.alloc_str(s)),
            TokenKind::SymbolLiteral(symbol) => {
                let quote = self.known(KnownSymbol::DollarQuote);
                ParseResult::Expr(self.list_at(&[quote, Value::Symbol(symbol)], pos))
            }
            TokenKind::Regex { pattern, flags } => {
                let (regex, error) = self.env.regex_cache.create(&pattern, &flags);
                if let Some(error) = error {
                    self.add_error(pos, error);
                }
                let id = self.env.heap.allocate(crate::heap::HeapData::Regex(regex));
                ParseResult::Expr(Value::Ref(id))
            }
            TokenKind::UnknownAlphaName(symbol) => ParseResult::Expr(Value::Symbol(symbol)),
            TokenKind::LeftParen => {
                let expr = require_expr!(self, self.parse_expr(mode.with_line_breaks()));
                if *self.peek_kind() == TokenKind::RightParen {
                    self.next();
                } else {
                    let at = self.peek().pos;
                    self.add_error(at, "Missing ')' after parenthesized expression.");
                }
                ParseResult::Expr(expr)
            }
            TokenKind::LeftBracket => self.parse_bracket_list(pos),
            TokenKind::Backtick => {
                if *self.peek_kind() == TokenKind::LeftBracket {
                    self.next();
                    let list = self.parse_raw_list(pos);
                    let quote = self.known(KnownSymbol::DollarQuote);
                    ParseResult::Expr(self.list_at(&[quote, list], pos))
                } else {
                    ParseResult::Partial(crate::error::ParseMessage {
                        position: pos,
                        message: "Expected a name or '[' after '`'.".to_string(),
                    })
                }
            }
            TokenKind::Bar => self.parse_fn_literal(pos, mode),
            _ => {
                self.unget();
                ParseResult::NotMatched
            }
        }
    }

    /// A `[…]` call/list form: a sequence of expressions.
    fn parse_bracket_list(&mut self, pos: SourcePos) -> ParseResult {
        let inner_mode = ParseMode::default().with_line_breaks();
        let mut items = Vec::new();
        loop {
            if *self.peek_kind() == TokenKind::RightBracket {
                self.next();
                break;
            }
            if self.at_eoi() {
                return ParseResult::Partial(crate::error::ParseMessage {
                    position: pos,
                    message: "Missing ']' at the end of a list.".to_string(),
                });
            }
            match self.parse_or(inner_mode) {
                ParseResult::Expr(expr) => items.push(expr),
                ParseResult::NotMatched => {
                    let stray = self.next();
                    self.add_error(stray.pos, format!("Unexpected token {:?} inside a list.", stray.kind));
                }
                other => return other,
            }
        }
        ParseResult::Expr(self.list_at(&items, pos))
    }

    /// A raw quoted list: names stay symbols, literals stay literals, and
    /// nested `[` recurses. Consumes through the matching `]`.
    fn parse_raw_list(&mut self, pos: SourcePos) -> Value {
        let mut items = Vec::new();
        loop {
            let token = self.next();
            match token.kind {
                TokenKind::RightBracket | TokenKind::Eoi => break,
                TokenKind::LeftBracket => items.push(self.parse_raw_list(token.pos)),
                TokenKind::Byte(v) => items.push(Value::Byte(v)),
                TokenKind::Int16(v) => items.push(Value::Int16(v)),
                TokenKind::Int32(v) => items.push(Value::Int32(v)),
                TokenKind::Int64(v) => items.push(Value::Int64(v)),
                TokenKind::Real64(v) => items.push(Value::Real64(Real64(v))),
                TokenKind::Float64(v) => items.push(Value::Float64(v)),
                TokenKind::Char(c) => items.push(Value::Char(c)),
                TokenKind::Uni(u) => items.push(Value::Uni(u)),
                TokenKind::Str(s) => {
                    let value = self.env.heap.alloc_str(s);
                    items.push(value);
                }
                other => {
                    let name = match other {
                        TokenKind::AlphaName(s)
                        | TokenKind::PunctName(s)
                        | TokenKind::UnknownAlphaName(s)
                        | TokenKind::UnknownPunctName(s)
                        | TokenKind::SymbolLiteral(s) => Some(s),
                        _ => None,
                    };
                    match name {
                        Some(symbol) => items.push(Value::Symbol(symbol)),
                        None => self.add_error(token.pos, "Unexpected token inside a quoted list."),
                    }
                }
            }
        }
        self.list_at(&items, pos)
    }

    /// A function literal: `|args| body`.
    fn parse_fn_literal(&mut self, pos: SourcePos, mode: ParseMode) -> ParseResult {
        let mut arg_names = Vec::new();
        loop {
            let token = self.next();
            match token.kind {
                TokenKind::Bar => break,
                TokenKind::AlphaName(s) | TokenKind::UnknownAlphaName(s) => arg_names.push(Value::Symbol(s)),
                TokenKind::Comma => {}
                TokenKind::Eoi => {
                    return ParseResult::Partial(crate::error::ParseMessage {
                        position: pos,
                        message: "Missing '|' at the end of a function's argument list.".to_string(),
                    });
                }
                _ => {
                    self.add_error(token.pos, "Expected an argument name in a function's argument list.");
                }
            }
        }
        let body = require_expr!(self, self.parse_expr(mode));
        let fn_sym = self.known(KnownSymbol::DollarFn);
        let args = self.list_at(&arg_names, pos);
        ParseResult::Expr(self.list_at(&[fn_sym, args, body], pos))
    }
}
