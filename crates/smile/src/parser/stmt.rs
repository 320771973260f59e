//! Statement-level parsing: declarations, conditionals, loops, `return`,
//! `till`, and `try … catch`.
//!
//! Error recovery: when a sub-expression fails, the parser scans forward to
//! a recovery set (closing brackets, `|`, or a keyword). When the recovery
//! token is the keyword the statement was waiting for anyway (`then`,
//! `else`, `while`, `until`), the diagnostic is recorded and parsing
//! continues with a Null placeholder, so one broken expression doesn't
//! take the whole file down with it.

use crate::{
    error::SourcePos,
    symbol::{KnownSymbol, Symbol},
    value::Value,
};

use super::{ParseMode, ParseResult, Parser, SyntaxRoot, require_expr, token::TokenKind};

impl Parser<'_> {
    pub(crate) fn parse_stmt(&mut self, mode: ParseMode) -> ParseResult {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::LeftBrace => self.parse_scope(mode),
            TokenKind::AlphaName(symbol) => match KnownSymbol::from_symbol(symbol) {
                Some(KnownSymbol::Var | KnownSymbol::Const | KnownSymbol::Auto) => self.parse_var_decls(mode),
                Some(KnownSymbol::Keyword) => self.parse_keyword_list(),
                Some(KnownSymbol::If) => self.parse_if_unless(mode, false),
                Some(KnownSymbol::Unless) => self.parse_if_unless(mode, true),
                Some(KnownSymbol::Do) => self.parse_do_while(mode),
                Some(KnownSymbol::While) => self.parse_while_until(mode, false),
                Some(KnownSymbol::Until) => self.parse_while_until(mode, true),
                Some(KnownSymbol::Return) => self.parse_return(mode),
                Some(KnownSymbol::Till) => self.parse_till(mode),
                Some(KnownSymbol::Try) => self.parse_try_catch(mode),
                Some(KnownSymbol::Brk) => {
                    let brk = self.next();
                    let dollar_brk = self.known(KnownSymbol::DollarBrk);
                    ParseResult::Expr(self.list_at(&[dollar_brk], brk.pos))
                }
                _ => self.parse_stmt_fallthrough(mode),
            },
            _ => self.parse_stmt_fallthrough(mode),
        }
    }

    fn parse_stmt_fallthrough(&mut self, mode: ParseMode) -> ParseResult {
        let hooked = self.apply_custom_syntax(mode, KnownSymbol::NtStmt, SyntaxRoot::Keyword, None, None);
        if !matches!(hooked, ParseResult::NotMatched) {
            return hooked;
        }
        self.parse_op_equals(mode)
    }

    // ------------------------------------------------------------------
    // Scopes.

    /// `{ stmt… }` builds `[$scope [] stmt…]`.
    pub(crate) fn parse_scope(&mut self, mode: ParseMode) -> ParseResult {
        let open = self.next(); // consume `{`
        let mut statements = Vec::new();
        loop {
            while matches!(self.peek_kind(), TokenKind::Semicolon) {
                self.next();
            }
            match self.peek_kind() {
                TokenKind::RightBrace => {
                    self.next();
                    break;
                }
                TokenKind::Eoi => {
                    return ParseResult::Partial(crate::error::ParseMessage {
                        position: open.pos,
                        message: "Missing '}' at the end of a scope.".to_string(),
                    });
                }
                _ => {}
            }
            match self.parse_stmt(mode) {
                ParseResult::Expr(expr) => statements.push(expr),
                ParseResult::NoResult | ParseResult::Recovered => {}
                ParseResult::Partial(message) => {
                    self.messages.push(message);
                    self.recover();
                }
                ParseResult::NotMatched => {
                    let stray = self.next();
                    self.add_error(stray.pos, format!("Unexpected token {:?} in a scope.", stray.kind));
                }
            }
        }
        let scope = self.known(KnownSymbol::DollarScope);
        let mut items = vec![scope, Value::Null];
        items.extend(statements);
        ParseResult::Expr(self.list_at(&items, open.pos))
    }

    // ------------------------------------------------------------------
    // Declarations.

    /// `var x = 5, y` — each initialized declaration becomes a `[$set]`.
    fn parse_var_decls(&mut self, mode: ParseMode) -> ParseResult {
        let keyword = self.next(); // var/const/auto
        let mut assignments = Vec::new();
        loop {
            let name_token = self.next();
            let Some(name) = name_token.name_symbol() else {
                return ParseResult::Partial(crate::error::ParseMessage {
                    position: name_token.pos,
                    message: "Expected a variable name in a declaration.".to_string(),
                });
            };
            if *self.peek_kind() == TokenKind::Equal {
                self.next();
                let init = require_expr!(self, self.parse_op_equals(mode));
                let set = self.known(KnownSymbol::DollarSet);
                let assignment = self.list_at(&[set, Value::Symbol(name), init], name_token.pos);
                assignments.push(assignment);
            }
            if *self.peek_kind() == TokenKind::Comma {
                self.next();
                continue;
            }
            break;
        }
        match assignments.len() {
            0 => ParseResult::NoResult,
            1 => ParseResult::Expr(assignments[0]),
            _ => {
                let progn = self.known(KnownSymbol::DollarProgn);
                let mut items = vec![progn];
                items.extend(assignments);
                ParseResult::Expr(self.list_at(&items, keyword.pos))
            }
        }
    }

    /// `keyword name, name…` reserves names against the arbitrary-operator
    /// rules. Produces no expression.
    fn parse_keyword_list(&mut self) -> ParseResult {
        self.next(); // consume `keyword`
        loop {
            let token = self.next();
            match token.name_symbol() {
                Some(name) => self.reserve_keyword(name),
                None => {
                    return ParseResult::Partial(crate::error::ParseMessage {
                        position: token.pos,
                        message: "Expected a name after 'keyword'.".to_string(),
                    });
                }
            }
            if *self.peek_kind() == TokenKind::Comma {
                self.next();
                continue;
            }
            break;
        }
        ParseResult::NoResult
    }

    // ------------------------------------------------------------------
    // Conditionals and loops.

    fn expect_keyword(&mut self, wanted: KnownSymbol) -> Option<SourcePos> {
        let token = self.peek().clone();
        if matches!(token.kind, TokenKind::AlphaName(s) if s == wanted.symbol()) {
            self.next();
            Some(token.pos)
        } else {
            None
        }
    }

    /// Recovers from a failed sub-expression, continuing when the recovery
    /// token is one of the keywords the statement can resume at.
    fn recover_to_keyword(&mut self, resume_at: &[KnownSymbol]) -> bool {
        let recovered = self.recover();
        matches!(recovered.kind, TokenKind::AlphaName(s) if resume_at.iter().any(|k| k.symbol() == s))
    }

    fn parse_if_unless(&mut self, mode: ParseMode, invert: bool) -> ParseResult {
        let keyword = self.next(); // if/unless
        let pos = keyword.pos;

        let mut condition = match self.parse_op_equals(mode.with_line_breaks()) {
            ParseResult::Expr(expr) => expr,
            ParseResult::Partial(message) => {
                self.messages.push(message);
                if self.recover_to_keyword(&[KnownSymbol::Then]) {
                    // Recovered to `then`; keep going with a Null condition.
                    Value::Null
                } else {
                    return ParseResult::Recovered;
                }
            }
            ParseResult::NotMatched => {
                let at = self.peek().pos;
                return ParseResult::Partial(crate::error::ParseMessage {
                    position: at,
                    message: "Expected an expression here.".to_string(),
                });
            }
            other => return other,
        };

        if self.expect_keyword(KnownSymbol::Then).is_none() {
            let at = self.peek().pos;
            self.add_error(
                at,
                format!("Missing 'then' keyword after '{}'.", if invert { "unless" } else { "if" }),
            );
        }

        let then_body = match self.parse_expr(mode) {
            ParseResult::Expr(expr) => expr,
            ParseResult::Partial(message) => {
                self.messages.push(message);
                if self.recover_to_keyword(&[KnownSymbol::Else]) {
                    Value::Null
                } else {
                    return ParseResult::Recovered;
                }
            }
            ParseResult::NotMatched => {
                let at = self.peek().pos;
                return ParseResult::Partial(crate::error::ParseMessage {
                    position: at,
                    message: "Expected an expression here.".to_string(),
                });
            }
            other => return other,
        };

        let else_body = if self.expect_keyword(KnownSymbol::Else).is_some() {
            Some(require_expr!(self, self.parse_expr(mode)))
        } else {
            None
        };

        if invert {
            let not = self.known(KnownSymbol::DollarNot);
            condition = self.list_at(&[not, condition], pos);
        }

        let if_sym = self.known(KnownSymbol::DollarIf);
        let form = match else_body {
            Some(else_body) => self.list_at(&[if_sym, condition, then_body, else_body], pos),
            None => self.list_at(&[if_sym, condition, then_body], pos),
        };
        ParseResult::Expr(form)
    }

    /// `do body while cond` / `do body until cond` builds
    /// `[$while body cond null]` (the body runs before the first test).
    fn parse_do_while(&mut self, mode: ParseMode) -> ParseResult {
        let keyword = self.next(); // do
        let pos = keyword.pos;

        let body = match self.parse_expr(mode) {
            ParseResult::Expr(expr) => expr,
            ParseResult::Partial(message) => {
                self.messages.push(message);
                if self.recover_to_keyword(&[KnownSymbol::While, KnownSymbol::Until]) {
                    Value::Null
                } else {
                    return ParseResult::Recovered;
                }
            }
            ParseResult::NotMatched => {
                let at = self.peek().pos;
                return ParseResult::Partial(crate::error::ParseMessage {
                    position: at,
                    message: "Expected an expression here.".to_string(),
                });
            }
            other => return other,
        };

        let invert = if self.expect_keyword(KnownSymbol::While).is_some() {
            false
        } else if self.expect_keyword(KnownSymbol::Until).is_some() {
            true
        } else {
            let at = self.peek().pos;
            return ParseResult::Partial(crate::error::ParseMessage {
                position: at,
                message: "Missing 'while' or 'until' after a 'do' body.".to_string(),
            });
        };

        let mut condition = require_expr!(self, self.parse_op_equals(mode.with_line_breaks()));
        if invert {
            let not = self.known(KnownSymbol::DollarNot);
            condition = self.list_at(&[not, condition], pos);
        }

        let while_sym = self.known(KnownSymbol::DollarWhile);
        ParseResult::Expr(self.list_at(&[while_sym, body, condition, Value::Null], pos))
    }

    /// `while cond do body` / `until cond do body` builds
    /// `[$while cond body]`.
    fn parse_while_until(&mut self, mode: ParseMode, invert: bool) -> ParseResult {
        let keyword = self.next(); // while/until
        let pos = keyword.pos;

        let mut condition = match self.parse_op_equals(mode.with_line_breaks()) {
            ParseResult::Expr(expr) => expr,
            ParseResult::Partial(message) => {
                self.messages.push(message);
                if self.recover_to_keyword(&[KnownSymbol::Do]) {
                    Value::Null
                } else {
                    return ParseResult::Recovered;
                }
            }
            ParseResult::NotMatched => {
                let at = self.peek().pos;
                return ParseResult::Partial(crate::error::ParseMessage {
                    position: at,
                    message: "Expected an expression here.".to_string(),
                });
            }
            other => return other,
        };

        if self.expect_keyword(KnownSymbol::Do).is_none() {
            let at = self.peek().pos;
            self.add_error(
                at,
                format!("Missing 'do' keyword after '{}'.", if invert { "until" } else { "while" }),
            );
        }

        let body = require_expr!(self, self.parse_expr(mode));

        if invert {
            let not = self.known(KnownSymbol::DollarNot);
            condition = self.list_at(&[not, condition], pos);
        }

        let while_sym = self.known(KnownSymbol::DollarWhile);
        ParseResult::Expr(self.list_at(&[while_sym, condition, body], pos))
    }

    fn parse_return(&mut self, mode: ParseMode) -> ParseResult {
        let keyword = self.next();
        let value = require_expr!(self, self.parse_op_equals(mode.with_line_breaks()));
        let return_sym = self.known(KnownSymbol::DollarReturn);
        ParseResult::Expr(self.list_at(&[return_sym, value], keyword.pos))
    }

    /// `till flag, flag do body` builds `[$till [flags…] body]`.
    fn parse_till(&mut self, mode: ParseMode) -> ParseResult {
        let keyword = self.next();
        let mut flags: Vec<Value> = Vec::new();
        loop {
            let token = self.next();
            match token.name_symbol() {
                Some(name) if !is_do_keyword(name) => flags.push(Value::Symbol(name)),
                _ => {
                    return ParseResult::Partial(crate::error::ParseMessage {
                        position: token.pos,
                        message: "Expected a flag name after 'till'.".to_string(),
                    });
                }
            }
            if *self.peek_kind() == TokenKind::Comma {
                self.next();
                continue;
            }
            break;
        }
        if self.expect_keyword(KnownSymbol::Do).is_none() {
            let at = self.peek().pos;
            self.add_error(at, "Missing 'do' keyword after the till flag list.");
        }
        let body = require_expr!(self, self.parse_expr(mode));
        let till_sym = self.known(KnownSymbol::DollarTill);
        let flag_list = self.list_at(&flags, keyword.pos);
        ParseResult::Expr(self.list_at(&[till_sym, flag_list, body], keyword.pos))
    }

    /// `try body catch handler` — the handler must be a function literal.
    fn parse_try_catch(&mut self, mode: ParseMode) -> ParseResult {
        let keyword = self.next();
        let body = match self.parse_expr(mode.with_line_breaks()) {
            ParseResult::Expr(expr) => expr,
            ParseResult::Partial(message) => {
                self.messages.push(message);
                if self.recover_to_keyword(&[KnownSymbol::Catch]) {
                    Value::Null
                } else {
                    return ParseResult::Recovered;
                }
            }
            ParseResult::NotMatched => {
                let at = self.peek().pos;
                return ParseResult::Partial(crate::error::ParseMessage {
                    position: at,
                    message: "Expected an expression here.".to_string(),
                });
            }
            other => return other,
        };

        if self.expect_keyword(KnownSymbol::Catch).is_none() {
            let at = self.peek().pos;
            return ParseResult::Partial(crate::error::ParseMessage {
                position: at,
                message: "Missing 'catch' after a 'try' body.".to_string(),
            });
        }

        let handler = require_expr!(self, self.parse_term(mode));
        if !self.is_fn_form(handler) {
            let at = self.peek().pos;
            self.add_error(at, "The 'catch' handler must be a function literal.");
        }

        let catch_sym = self.known(KnownSymbol::DollarCatch);
        ParseResult::Expr(self.list_at(&[catch_sym, body, handler], keyword.pos))
    }

    /// True when the value is a `[$fn …]` form.
    fn is_fn_form(&self, value: Value) -> bool {
        self.env
            .heap
            .as_cons(value)
            .is_some_and(|cell| cell.a == Value::Symbol(KnownSymbol::DollarFn.symbol()))
    }
}

fn is_do_keyword(symbol: Symbol) -> bool {
    symbol == KnownSymbol::Do.symbol()
}
