//! Hand-written recursive-descent parser with Pratt-style precedence
//! climbing for binary operators (§4.2).
//!
//! Unlike a typical multi-error recovering parser, this one follows the
//! original's contract exactly: the first unrecoverable mismatch sets a
//! single `error` message and the parser stops making forward progress
//! (further productions return placeholder nodes without consuming
//! tokens), observable afterwards via [`Parser::error_msg`].

use crate::ast::*;
use crate::diagnostic::format_syntax_error;
use crate::lexeme::Lexeme;
use crate::span::{Span, Spanned};

pub struct Parser<'src> {
    tokens: Vec<Spanned<Lexeme>>,
    pos: usize,
    source: &'src str,
    filename: String,
    error: Option<String>,
}

impl<'src> Parser<'src> {
    pub fn new(tokens: Vec<Spanned<Lexeme>>, source: &'src str, filename: impl Into<String>) -> Self {
        Self {
            tokens,
            pos: 0,
            source,
            filename: filename.into(),
            error: None,
        }
    }

    pub fn error_msg(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn poisoned(&self) -> bool {
        self.error.is_some()
    }

    fn peek(&self) -> &Lexeme {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].node
    }

    fn current_span(&self) -> Span {
        self.tokens[self.pos.min(self.tokens.len() - 1)].span
    }

    fn prev_span(&self) -> Span {
        let idx = self.pos.saturating_sub(1).min(self.tokens.len() - 1);
        self.tokens[idx].span
    }

    fn at(&self, lex: &Lexeme) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(lex)
    }

    fn advance(&mut self) -> Lexeme {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].node.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, lex: &Lexeme) -> bool {
        if self.at(lex) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn fail(&mut self) {
        if self.error.is_none() {
            let line = line_of(self.source, self.current_span().start);
            let desc = self.peek().description();
            self.error = Some(format_syntax_error(&self.filename, line, &desc));
        }
    }

    fn expect(&mut self, lex: &Lexeme) {
        if !self.eat(lex) {
            self.fail();
        }
    }

    fn expect_type_id(&mut self) -> Spanned<String> {
        let span = self.current_span();
        match self.peek().clone() {
            Lexeme::TypeId(s) => {
                self.advance();
                Spanned::new(s, span)
            }
            _ => {
                self.fail();
                Spanned::new(String::new(), span)
            }
        }
    }

    fn expect_object_id(&mut self) -> Spanned<String> {
        let span = self.current_span();
        match self.peek().clone() {
            Lexeme::ObjectId(s) => {
                self.advance();
                Spanned::new(s, span)
            }
            _ => {
                self.fail();
                Spanned::new(String::new(), span)
            }
        }
    }

    fn dummy_expr(&self) -> Expr {
        Expr::new(self.current_span(), ExprKind::ObjectRef { name: Spanned::dummy(String::new()) })
    }

    // ---- Grammar --------------------------------------------------

    /// `program → class+ EOF`
    pub fn parse_program(mut self) -> Result<Program, String> {
        let mut classes = Vec::new();
        while !self.at(&Lexeme::Eof) && !self.poisoned() {
            classes.push(self.parse_class());
            if self.poisoned() {
                break;
            }
        }
        if !self.at(&Lexeme::Eof) && !self.poisoned() {
            self.fail();
        }
        match self.error {
            Some(e) => Err(e),
            None => Ok(Program { classes }),
        }
    }

    /// `class → CLASS TYPEID [INHERITS TYPEID] { feature* } ;`
    fn parse_class(&mut self) -> Class {
        self.expect(&Lexeme::Class);
        let name = self.expect_type_id();
        let parent = if self.eat(&Lexeme::Inherits) {
            self.expect_type_id()
        } else {
            Spanned::new(OBJECT.to_string(), name.span)
        };
        self.expect(&Lexeme::LBrace);
        let mut features = Vec::new();
        while !self.at(&Lexeme::RBrace) && !self.poisoned() {
            features.push(self.parse_feature());
            self.expect(&Lexeme::Semi);
        }
        self.expect(&Lexeme::RBrace);
        self.expect(&Lexeme::Semi);
        Class {
            name,
            parent,
            features,
            file: self.filename.clone(),
        }
    }

    /// `feature → OBJECTID (formals) : TYPEID { expr }` (method)
    ///         | `OBJECTID : TYPEID [<- expr]` (attribute)
    fn parse_feature(&mut self) -> Feature {
        let id = self.expect_object_id();
        if self.eat(&Lexeme::LParen) {
            let formals = self.parse_formals();
            self.expect(&Lexeme::RParen);
            self.expect(&Lexeme::Colon);
            let return_type = self.expect_type_id();
            self.expect(&Lexeme::LBrace);
            let body = self.parse_expr();
            self.expect(&Lexeme::RBrace);
            Feature::Method(Method {
                name: id,
                formals,
                return_type,
                body,
            })
        } else {
            self.expect(&Lexeme::Colon);
            let declared_type = self.expect_type_id();
            let init = if self.eat(&Lexeme::Assign) {
                Some(self.parse_expr())
            } else {
                None
            };
            Feature::Attribute(Attribute {
                name: id,
                declared_type,
                init,
            })
        }
    }

    fn parse_formals(&mut self) -> Vec<Formal> {
        let mut formals = Vec::new();
        if self.at(&Lexeme::RParen) {
            return formals;
        }
        loop {
            let name = self.expect_object_id();
            self.expect(&Lexeme::Colon);
            let declared_type = self.expect_type_id();
            formals.push(Formal { name, declared_type });
            if !self.eat(&Lexeme::Comma) {
                break;
            }
        }
        formals
    }

    // ---- Expressions ------------------------------------------------
    //
    // Precedence ladder, loosest to tightest (§4.2):
    //   assignment(0) < not(1) < <(2) < =,<=(3,non-assoc) < +,-(4,left)
    //   < *,/(5,left) < ~(6) < isvoid(7) < .,@(8,tightest)

    pub fn parse_expr(&mut self) -> Expr {
        if self.poisoned() {
            return self.dummy_expr();
        }
        if let Lexeme::ObjectId(name) = self.peek().clone() {
            if matches!(self.tokens.get(self.pos + 1).map(|t| &t.node), Some(Lexeme::Assign)) {
                let name_span = self.current_span();
                self.advance(); // id
                self.advance(); // <-
                let value = self.parse_expr();
                let span = name_span.merge(value.span);
                return Expr::new(
                    span,
                    ExprKind::Assign {
                        name: Spanned::new(name, name_span),
                        value: Box::new(value),
                    },
                );
            }
        }
        self.parse_not()
    }

    fn parse_not(&mut self) -> Expr {
        if self.eat(&Lexeme::Not) {
            let start = self.prev_span();
            let operand = self.parse_not();
            let span = start.merge(operand.span);
            return Expr::new(
                span,
                ExprKind::UnaryOp {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
            );
        }
        self.parse_lt()
    }

    fn parse_lt(&mut self) -> Expr {
        let mut lhs = self.parse_eq_le();
        while self.eat(&Lexeme::Lt) {
            let rhs = self.parse_eq_le();
            let span = lhs.span.merge(rhs.span);
            lhs = Expr::new(
                span,
                ExprKind::BinOp {
                    op: BinOp::Lt,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
            );
        }
        lhs
    }

    /// `=` and `<=` are non-associative: `a = b = c` is a syntax error.
    fn parse_eq_le(&mut self) -> Expr {
        let lhs = self.parse_additive();
        let op = if self.at(&Lexeme::Eq) {
            Some(BinOp::Eq)
        } else if self.at(&Lexeme::Le) {
            Some(BinOp::Le)
        } else {
            None
        };
        let Some(op) = op else { return lhs };
        self.advance();
        let rhs = self.parse_additive();
        let span = lhs.span.merge(rhs.span);
        let combined = Expr::new(
            span,
            ExprKind::BinOp {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        );
        if self.at(&Lexeme::Eq) || self.at(&Lexeme::Le) {
            self.fail();
        }
        combined
    }

    fn parse_additive(&mut self) -> Expr {
        let mut lhs = self.parse_multiplicative();
        loop {
            let op = if self.at(&Lexeme::Plus) {
                BinOp::Add
            } else if self.at(&Lexeme::Minus) {
                BinOp::Sub
            } else {
                break;
            };
            self.advance();
            let rhs = self.parse_multiplicative();
            let span = lhs.span.merge(rhs.span);
            lhs = Expr::new(span, ExprKind::BinOp { op, lhs: Box::new(lhs), rhs: Box::new(rhs) });
        }
        lhs
    }

    fn parse_multiplicative(&mut self) -> Expr {
        let mut lhs = self.parse_neg();
        loop {
            let op = if self.at(&Lexeme::Star) {
                BinOp::Mul
            } else if self.at(&Lexeme::Slash) {
                BinOp::Div
            } else {
                break;
            };
            self.advance();
            let rhs = self.parse_neg();
            let span = lhs.span.merge(rhs.span);
            lhs = Expr::new(span, ExprKind::BinOp { op, lhs: Box::new(lhs), rhs: Box::new(rhs) });
        }
        lhs
    }

    fn parse_neg(&mut self) -> Expr {
        if self.eat(&Lexeme::Tilde) {
            let start = self.prev_span();
            let operand = self.parse_neg();
            let span = start.merge(operand.span);
            return Expr::new(span, ExprKind::UnaryOp { op: UnaryOp::Neg, operand: Box::new(operand) });
        }
        self.parse_isvoid()
    }

    fn parse_isvoid(&mut self) -> Expr {
        if self.eat(&Lexeme::Isvoid) {
            let start = self.prev_span();
            let operand = self.parse_isvoid();
            let span = start.merge(operand.span);
            return Expr::new(span, ExprKind::UnaryOp { op: UnaryOp::IsVoid, operand: Box::new(operand) });
        }
        self.parse_dispatch_chain()
    }

    /// After each primary, attach trailing `.id(...)` / `@T.id(...)` /
    /// bare-call forms until neither applies (§4.2).
    fn parse_dispatch_chain(&mut self) -> Expr {
        let mut expr = self.parse_primary();
        loop {
            if self.eat(&Lexeme::Dot) {
                let method = self.expect_object_id();
                self.expect(&Lexeme::LParen);
                let args = self.parse_call_args();
                self.expect(&Lexeme::RParen);
                let span = expr.span.merge(self.prev_span());
                expr = Expr::new(
                    span,
                    ExprKind::DispatchVirtual {
                        receiver: Box::new(expr),
                        method,
                        args,
                    },
                );
            } else if self.eat(&Lexeme::At) {
                let target_type = self.expect_type_id();
                self.expect(&Lexeme::Dot);
                let method = self.expect_object_id();
                self.expect(&Lexeme::LParen);
                let args = self.parse_call_args();
                self.expect(&Lexeme::RParen);
                let span = expr.span.merge(self.prev_span());
                expr = Expr::new(
                    span,
                    ExprKind::DispatchStatic {
                        receiver: Box::new(expr),
                        target_type,
                        method,
                        args,
                    },
                );
            } else {
                break;
            }
        }
        expr
    }

    fn parse_call_args(&mut self) -> Vec<Expr> {
        let mut args = Vec::new();
        if self.at(&Lexeme::RParen) {
            return args;
        }
        loop {
            args.push(self.parse_expr());
            if !self.eat(&Lexeme::Comma) {
                break;
            }
        }
        args
    }

    fn parse_primary(&mut self) -> Expr {
        let span = self.current_span();
        match self.peek().clone() {
            Lexeme::Integer(n) => {
                self.advance();
                Expr::new(span, ExprKind::IntLit(n))
            }
            Lexeme::StringLit(s) => {
                self.advance();
                Expr::new(span, ExprKind::StringLit(s))
            }
            Lexeme::BoolLit(b) => {
                self.advance();
                Expr::new(span, ExprKind::BoolLit(b))
            }
            Lexeme::New => {
                self.advance();
                let type_name = self.expect_type_id();
                let full = span.merge(type_name.span);
                Expr::new(full, ExprKind::New { type_name })
            }
            Lexeme::LParen => {
                self.advance();
                let inner = self.parse_expr();
                self.expect(&Lexeme::RParen);
                inner
            }
            Lexeme::LBrace => self.parse_block(),
            Lexeme::If => self.parse_if(),
            Lexeme::While => self.parse_while(),
            Lexeme::Let => self.parse_let(),
            Lexeme::Case => self.parse_case(),
            Lexeme::ObjectId(name) => {
                self.advance();
                if self.eat(&Lexeme::LParen) {
                    // bare OBJECTID(args) — sugar for self.OBJECTID(args)
                    let args = self.parse_call_args();
                    self.expect(&Lexeme::RParen);
                    let full = span.merge(self.prev_span());
                    Expr::new(
                        full,
                        ExprKind::DispatchVirtual {
                            receiver: Box::new(Expr::new(span, ExprKind::ObjectRef { name: Spanned::new(SELF.to_string(), span) })),
                            method: Spanned::new(name, span),
                            args,
                        },
                    )
                } else {
                    Expr::new(span, ExprKind::ObjectRef { name: Spanned::new(name, span) })
                }
            }
            _ => {
                self.fail();
                self.dummy_expr()
            }
        }
    }

    fn parse_block(&mut self) -> Expr {
        let start = self.current_span();
        self.expect(&Lexeme::LBrace);
        let mut exprs = Vec::new();
        while !self.at(&Lexeme::RBrace) && !self.poisoned() {
            exprs.push(self.parse_expr());
            self.expect(&Lexeme::Semi);
        }
        self.expect(&Lexeme::RBrace);
        let span = start.merge(self.prev_span());
        Expr::new(span, ExprKind::Block { exprs })
    }

    fn parse_if(&mut self) -> Expr {
        let start = self.current_span();
        self.expect(&Lexeme::If);
        let cond = self.parse_expr();
        self.expect(&Lexeme::Then);
        let then_branch = self.parse_expr();
        self.expect(&Lexeme::Else);
        let else_branch = self.parse_expr();
        self.expect(&Lexeme::Fi);
        let span = start.merge(self.prev_span());
        Expr::new(
            span,
            ExprKind::If {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            },
        )
    }

    fn parse_while(&mut self) -> Expr {
        let start = self.current_span();
        self.expect(&Lexeme::While);
        let cond = self.parse_expr();
        self.expect(&Lexeme::Loop);
        let body = self.parse_expr();
        self.expect(&Lexeme::Pool);
        let span = start.merge(self.prev_span());
        Expr::new(span, ExprKind::While { cond: Box::new(cond), body: Box::new(body) })
    }

    fn parse_let(&mut self) -> Expr {
        let start = self.current_span();
        self.expect(&Lexeme::Let);
        let mut bindings = Vec::new();
        loop {
            let name = self.expect_object_id();
            self.expect(&Lexeme::Colon);
            let declared_type = self.expect_type_id();
            let init = if self.eat(&Lexeme::Assign) {
                Some(self.parse_expr())
            } else {
                None
            };
            bindings.push(LetBinding { name, declared_type, init });
            if !self.eat(&Lexeme::Comma) {
                break;
            }
        }
        self.expect(&Lexeme::In);
        let body = self.parse_expr();
        let span = start.merge(body.span);
        Expr::new(span, ExprKind::Let { bindings, body: Box::new(body) })
    }

    fn parse_case(&mut self) -> Expr {
        let start = self.current_span();
        self.expect(&Lexeme::Case);
        let scrutinee = self.parse_expr();
        self.expect(&Lexeme::Of);
        let mut arms = Vec::new();
        while !self.at(&Lexeme::Esac) && !self.poisoned() {
            let name = self.expect_object_id();
            self.expect(&Lexeme::Colon);
            let declared_type = self.expect_type_id();
            self.expect(&Lexeme::Arrow);
            let body = self.parse_expr();
            self.expect(&Lexeme::Semi);
            arms.push(CaseArm { name, declared_type, body });
        }
        self.expect(&Lexeme::Esac);
        let span = start.merge(self.prev_span());
        Expr::new(span, ExprKind::Case { scrutinee: Box::new(scrutinee), arms })
    }
}
