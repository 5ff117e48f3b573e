//! Parser implementation
//!
//! A single-pass recursive-descent parser with precedence climbing for
//! binary operators. The parser maintains a current scope that mirrors the
//! lexical nesting of the source; every brace block, function header and
//! enum body opens a child scope. Errors are fatal-on-first: the parser
//! records a diagnostic and unwinds with `?`.

use crate::ast::*;
use crate::precedence::{binary_op, precedence, Precedence};
use crate::scope::ScopeId;
use crate::types::QualType;
use basalt_common::{BasaltError, BasaltResult, Diagnostics, Position, Span};
use basalt_lexer::{Token, TokenKind};

/// Identifiers that cannot be used as binding names.
const RESERVED: &[&str] = &[
    "void", "bool", "char", "s8", "s16", "s32", "s64", "u8", "u16", "u32", "u64", "f32", "f64",
    "mut", "struct", "enum", "let", "ret", "stop", "restart", "until", "if", "else", "true",
    "false", "null", "sizeof", "load",
];

/// Parser for one Basalt translation unit.
pub struct Parser<'d> {
    tokens: Vec<Token>,
    current: usize,
    file: String,
    unit: Unit,
    scope: ScopeId,
    diagnostics: &'d mut Diagnostics,
}

impl<'d> Parser<'d> {
    pub fn new(tokens: Vec<Token>, file: impl Into<String>, diagnostics: &'d mut Diagnostics) -> Self {
        let file = file.into();
        let unit = Unit::new(file.clone());
        let scope = unit.root_scope;

        Self {
            tokens,
            current: 0,
            file,
            unit,
            scope,
            diagnostics,
        }
    }

    /// Parse the whole token stream into a translation unit.
    pub fn parse(mut self) -> BasaltResult<Unit> {
        while !self.at_eof() {
            let defn = self.parse_initial_definition()?;
            self.unit.top.push(defn);
        }

        Ok(self.unit)
    }

    // Token plumbing

    fn curr(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn peek_second(&self) -> Option<&Token> {
        self.tokens.get(self.current + 1)
    }

    fn at_eof(&self) -> bool {
        self.curr().kind == TokenKind::Eof
    }

    fn loc(&self) -> Position {
        self.curr().loc
    }

    fn prev_loc(&self) -> Position {
        if self.current == 0 {
            self.loc()
        } else {
            self.tokens[self.current - 1].loc
        }
    }

    fn since(&self, start: Position) -> Span {
        Span::new(start, self.prev_loc())
    }

    fn advance(&mut self) {
        if self.current + 1 < self.tokens.len() {
            self.current += 1;
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.curr().kind == kind
    }

    fn check_kw(&self, kw: &str) -> bool {
        self.curr().is_keyword(kw)
    }

    /// Consume the current token if it matches `kind`.
    fn expect(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }

        self.advance();
        true
    }

    /// Consume the current token if it is an identifier spelling `kw`.
    fn expect_kw(&mut self, kw: &str) -> bool {
        if !self.check_kw(kw) {
            return false;
        }

        self.advance();
        true
    }

    fn skip_semis(&mut self) {
        while self.expect(TokenKind::Semicolon) {}
    }

    fn fatal(&mut self, message: impl Into<String>, at: Position) -> BasaltError {
        self.diagnostics
            .fatal(BasaltError::parse(message.into()), &self.file, Span::single(at))
    }

    /// Require and consume a token of the given kind.
    fn require(&mut self, kind: TokenKind, what: &str) -> BasaltResult<Token> {
        if !self.check(kind) {
            return Err(self.fatal(
                format!("expected {}, found '{}'", what, self.curr()),
                self.loc(),
            ));
        }

        let token = self.curr().clone();
        self.advance();
        Ok(token)
    }

    fn is_reserved(&self, ident: &str) -> bool {
        RESERVED.contains(&ident)
    }

    fn enter_scope(&mut self) -> ScopeId {
        let scope = self.unit.scopes.alloc(Some(self.scope));
        self.scope = scope;
        scope
    }

    fn exit_scope(&mut self) {
        self.scope = self
            .unit
            .scopes
            .parent(self.scope)
            .expect("cannot exit the root scope");
    }

    /// Bind a named definition in the current scope; duplicates are fatal.
    fn bind(&mut self, name: &str, defn: DefnId, at: Position) -> BasaltResult<()> {
        if self.unit.scopes.add(self.scope, name, defn).is_some() {
            return Err(self.fatal(format!("duplicate definition of '{}'", name), at));
        }

        Ok(())
    }

    // Definitions

    fn parse_rune_decorators(&mut self) -> BasaltResult<Vec<Rune>> {
        let mut runes = Vec::new();
        while self.check(TokenKind::Rune) {
            let token = self.curr().clone();
            match Rune::from_name(&token.value) {
                Some(rune) => {
                    if !runes.contains(&rune) {
                        runes.push(rune);
                    }
                }
                None => {
                    return Err(self.fatal(format!("unknown rune '${}'", token.value), token.loc))
                }
            }

            self.advance();
        }

        Ok(runes)
    }

    fn parse_initial_definition(&mut self) -> BasaltResult<DefnId> {
        let runes = self.parse_rune_decorators()?;

        if !self.check(TokenKind::Identifier) {
            return Err(self.fatal("expected identifier", self.loc()));
        }

        if self.check_kw("load") {
            return self.parse_load_definition();
        }

        let name = self.curr().clone();
        if self.is_reserved(&name.value) {
            return Err(self.fatal(
                format!("'{}' is reserved and cannot be bound", name.value),
                name.loc,
            ));
        }

        self.advance();
        self.require(TokenKind::Path, "'::'")?;
        self.parse_binding_definition(runes, name)
    }

    fn parse_load_definition(&mut self) -> BasaltResult<DefnId> {
        let start = self.loc();
        self.advance(); // 'load'

        if !self.check(TokenKind::String) {
            return Err(self.fatal("expected file path after 'load'", self.loc()));
        }

        let path = self.curr().value.clone();
        self.advance();
        self.skip_semis();

        Ok(self.unit.add_defn(Defn {
            kind: DefnKind::Load { path },
            span: self.since(start),
        }))
    }

    fn parse_binding_definition(&mut self, runes: Vec<Rune>, name: Token) -> BasaltResult<DefnId> {
        if self.expect(TokenKind::OpenParen) {
            self.parse_function_definition(runes, name)
        } else if self.expect_kw("struct") {
            self.parse_struct_definition(runes, name)
        } else if self.expect_kw("enum") {
            self.parse_enum_definition(runes, name)
        } else {
            self.parse_global_definition(runes, name)
        }
    }

    fn parse_function_definition(&mut self, runes: Vec<Rune>, name: Token) -> BasaltResult<DefnId> {
        let scope = self.enter_scope();

        let mut params = Vec::new();
        while !self.expect(TokenKind::CloseParen) {
            let param_start = self.loc();
            let param_name = self.require(TokenKind::Identifier, "parameter name")?;

            self.require(TokenKind::Colon, "':' after parameter name")?;
            let param_type = self.parse_type_specifier()?;

            let param = self.unit.add_defn(Defn {
                kind: DefnKind::Param { name: param_name.value.clone(), ty: param_type },
                span: self.since(param_start),
            });

            // Anonymous parameters are spelled '_' and go unbound.
            if param_name.value != "_" {
                self.bind(&param_name.value, param, param_name.loc)?;
            }

            params.push(param);

            if self.expect(TokenKind::CloseParen) {
                break;
            }

            self.require(TokenKind::Comma, "','")?;
        }

        self.require(TokenKind::Arrow, "'->' after parameter list")?;
        let ret_type = self.parse_type_specifier()?;

        let body = if self.check(TokenKind::OpenBrace) {
            Some(self.parse_block_statement()?)
        } else {
            self.require(TokenKind::Semicolon, "function body or ';'")?;
            None
        };

        self.exit_scope();

        let param_types = params
            .iter()
            .map(|&p| self.unit.defn_type(p).expect("parameters are typed"))
            .collect();

        let fn_type = QualType::new(self.unit.types.function(param_types, ret_type));
        let defn = self.unit.add_defn(Defn {
            kind: DefnKind::Function {
                name: name.value.clone(),
                runes,
                ty: fn_type,
                scope,
                params,
                body,
            },
            span: self.since(name.loc),
        });

        self.bind(&name.value, defn, name.loc)?;
        Ok(defn)
    }

    fn parse_struct_definition(&mut self, runes: Vec<Rune>, name: Token) -> BasaltResult<DefnId> {
        self.require(TokenKind::OpenBrace, "'{'")?;

        let ty = match self.unit.types.create_struct(&name.value) {
            Some(ty) => QualType::new(ty),
            None => {
                return Err(self.fatal(format!("duplicate type '{}'", name.value), name.loc))
            }
        };

        let mut fields = Vec::new();
        while !self.expect(TokenKind::CloseBrace) {
            let field_name = self.require(TokenKind::Identifier, "field name")?;
            self.require(TokenKind::Colon, "':'")?;
            let field_type = self.parse_type_specifier()?;

            for &existing in &fields {
                if self.unit.defn_name(existing) == Some(field_name.value.as_str()) {
                    return Err(self.fatal(
                        format!("duplicate field '{}'", field_name.value),
                        field_name.loc,
                    ));
                }
            }

            let field = self.unit.add_defn(Defn {
                kind: DefnKind::Field {
                    name: field_name.value.clone(),
                    ty: field_type,
                    index: fields.len() as u32,
                },
                span: self.since(field_name.loc),
            });

            fields.push(field);

            if self.expect(TokenKind::CloseBrace) {
                break;
            }

            self.require(TokenKind::Comma, "','")?;
        }

        let defn = self.unit.add_defn(Defn {
            kind: DefnKind::Struct { name: name.value.clone(), runes, ty, fields },
            span: self.since(name.loc),
        });

        self.bind(&name.value, defn, name.loc)?;
        Ok(defn)
    }

    fn parse_enum_definition(&mut self, runes: Vec<Rune>, name: Token) -> BasaltResult<DefnId> {
        // Underlying type defaults to s64.
        let underlying = if self.check(TokenKind::Identifier) {
            self.parse_type_specifier()?
        } else {
            QualType::new(self.unit.types.s64())
        };

        let ty = match self.unit.types.create_enum(&name.value, underlying) {
            Some(ty) => QualType::new(ty),
            None => {
                return Err(self.fatal(format!("duplicate type '{}'", name.value), name.loc))
            }
        };

        self.require(TokenKind::OpenBrace, "'{'")?;

        let mut variants = Vec::new();
        let mut value: i64 = 0;
        while !self.expect(TokenKind::CloseBrace) {
            let variant_name = self.require(TokenKind::Identifier, "variant name")?;

            if self.expect(TokenKind::Eq) {
                let neg = self.expect(TokenKind::Minus);
                let int = self.require(TokenKind::Integer, "integer")?;
                value = int
                    .value
                    .parse::<i64>()
                    .map_err(|_| self.fatal("invalid integer literal", int.loc))?;

                if neg {
                    value = -value;
                }
            }

            let variant = self.unit.add_defn(Defn {
                kind: DefnKind::Variant { name: variant_name.value.clone(), ty, value },
                span: self.since(variant_name.loc),
            });

            value += 1;

            // Variants bind directly in the enclosing scope.
            self.bind(&variant_name.value, variant, variant_name.loc)?;
            variants.push(variant);

            if self.expect(TokenKind::CloseBrace) {
                break;
            }

            self.require(TokenKind::Comma, "','")?;
        }

        let defn = self.unit.add_defn(Defn {
            kind: DefnKind::Enum { name: name.value.clone(), runes, ty, underlying, variants },
            span: self.since(name.loc),
        });

        self.bind(&name.value, defn, name.loc)?;
        Ok(defn)
    }

    fn parse_global_definition(&mut self, runes: Vec<Rune>, name: Token) -> BasaltResult<DefnId> {
        let ty = self.parse_type_specifier()?;

        let init = if self.expect(TokenKind::Eq) {
            Some(self.parse_initial_expression()?)
        } else {
            None
        };

        self.skip_semis();

        let defn = self.unit.add_defn(Defn {
            kind: DefnKind::Var { name: name.value.clone(), runes, ty, init, global: true },
            span: self.since(name.loc),
        });

        self.bind(&name.value, defn, name.loc)?;
        Ok(defn)
    }

    // Types

    fn parse_type_specifier(&mut self) -> BasaltResult<QualType> {
        let mut is_mut = false;
        while self.check_kw("mut") {
            let at = self.loc();
            self.advance();

            if is_mut {
                self.diagnostics
                    .warn("duplicate 'mut' keyword", &self.file, Span::single(at));
            } else {
                is_mut = true;
            }
        }

        let ty = if self.expect(TokenKind::Star) {
            let pointee = self.parse_type_specifier()?;
            QualType::new(self.unit.types.pointer(pointee))
        } else if self.expect(TokenKind::OpenBrack) {
            let int = self.require(TokenKind::Integer, "array length")?;
            let len: i64 = int
                .value
                .parse()
                .map_err(|_| self.fatal("invalid integer literal", int.loc))?;

            if len <= 0 {
                return Err(self.fatal("array size must be greater than 0", int.loc));
            }

            self.require(TokenKind::CloseBrack, "']'")?;
            let element = self.parse_type_specifier()?;
            QualType::new(self.unit.types.array(element, len as u32))
        } else if self.check(TokenKind::Identifier) {
            let name = self.curr().value.clone();
            self.advance();

            let id = match self.unit.types.builtin_by_name(&name) {
                Some(id) => id,
                None => self.unit.types.deferred(&name),
            };

            QualType::new(id)
        } else {
            return Err(self.fatal("expected type identifier", self.loc()));
        };

        Ok(if is_mut { ty.with_mut() } else { ty })
    }

    // Statements

    fn parse_initial_statement(&mut self) -> BasaltResult<StmtId> {
        if self.check(TokenKind::OpenBrace) {
            self.parse_block_statement()
        } else if self.check_kw("let") {
            self.parse_declarative_statement()
        } else if self.check(TokenKind::Rune) {
            self.parse_rune_statement()
        } else {
            self.parse_control_statement()
        }
    }

    fn parse_block_statement(&mut self) -> BasaltResult<StmtId> {
        let start = self.loc();
        self.advance(); // '{'

        let scope = self.enter_scope();

        let mut stmts = Vec::new();
        while !self.check(TokenKind::CloseBrace) {
            if self.at_eof() {
                return Err(self.fatal("expected '}'", self.loc()));
            }

            let stmt = self.parse_initial_statement()?;
            self.skip_semis();
            stmts.push(stmt);
        }

        self.exit_scope();
        self.advance(); // '}'

        Ok(self.unit.add_stmt(Stmt {
            kind: StmtKind::Block { scope, stmts },
            span: self.since(start),
        }))
    }

    fn parse_rune_statement(&mut self) -> BasaltResult<StmtId> {
        let token = self.curr().clone();
        self.advance();

        let rune = match Rune::from_name(&token.value) {
            Some(rune @ (Rune::Abort | Rune::Unreachable)) => rune,
            _ => {
                return Err(self.fatal(
                    format!("'${}' cannot be used as a statement", token.value),
                    token.loc,
                ))
            }
        };

        self.skip_semis();
        Ok(self.unit.add_stmt(Stmt { kind: StmtKind::Rune(rune), span: self.since(token.loc) }))
    }

    fn parse_control_statement(&mut self) -> BasaltResult<StmtId> {
        let start = self.loc();

        if self.expect_kw("stop") {
            self.skip_semis();
            return Ok(self.unit.add_stmt(Stmt { kind: StmtKind::Stop, span: self.since(start) }));
        }

        if self.expect_kw("restart") {
            self.skip_semis();
            return Ok(self
                .unit
                .add_stmt(Stmt { kind: StmtKind::Restart, span: self.since(start) }));
        }

        if self.expect_kw("ret") {
            let expr = if self.expect(TokenKind::Semicolon) {
                None
            } else {
                let expr = self.parse_initial_expression()?;
                self.require(TokenKind::Semicolon, "';'")?;
                Some(expr)
            };

            return Ok(self
                .unit
                .add_stmt(Stmt { kind: StmtKind::Ret(expr), span: self.since(start) }));
        }

        if self.expect_kw("if") {
            let cond = self.parse_initial_expression()?;
            let then = self.parse_initial_statement()?;

            let els = if self.expect_kw("else") {
                Some(self.parse_initial_statement()?)
            } else {
                None
            };

            return Ok(self.unit.add_stmt(Stmt {
                kind: StmtKind::If { cond, then, els },
                span: self.since(start),
            }));
        }

        if self.expect_kw("until") {
            let cond = self.parse_initial_expression()?;

            let body = if self.check(TokenKind::Semicolon) {
                self.skip_semis();
                None
            } else {
                Some(self.parse_initial_statement()?)
            };

            return Ok(self.unit.add_stmt(Stmt {
                kind: StmtKind::Until { cond, body },
                span: self.since(start),
            }));
        }

        let expr = self.parse_initial_expression()?;
        self.skip_semis();
        Ok(self.unit.add_stmt(Stmt { kind: StmtKind::Expr(expr), span: self.since(start) }))
    }

    fn parse_declarative_statement(&mut self) -> BasaltResult<StmtId> {
        let start = self.loc();
        self.advance(); // 'let'

        let name = self.require(TokenKind::Identifier, "identifier")?;
        if self.is_reserved(&name.value) {
            return Err(self.fatal(
                format!("'{}' is reserved and cannot be bound", name.value),
                name.loc,
            ));
        }

        self.require(TokenKind::Colon, "':'")?;
        let ty = self.parse_type_specifier()?;

        let init = if self.expect(TokenKind::Semicolon) {
            None
        } else {
            self.require(TokenKind::Eq, "'='")?;
            let init = self.parse_initial_expression()?;
            self.require(TokenKind::Semicolon, "';'")?;
            Some(init)
        };

        let defn = self.unit.add_defn(Defn {
            kind: DefnKind::Var {
                name: name.value.clone(),
                runes: Vec::new(),
                ty,
                init,
                global: false,
            },
            span: self.since(start),
        });

        self.bind(&name.value, defn, name.loc)?;
        Ok(self.unit.add_stmt(Stmt { kind: StmtKind::Local(defn), span: self.since(start) }))
    }

    // Expressions

    fn parse_initial_expression(&mut self) -> BasaltResult<ExprId> {
        let start = self.loc();
        let unary = self.parse_prefix_operator()?;
        let lhs = self.parse_binary_operator(unary, Precedence::LogicOr as u8)?;

        // Assignment is right-associative and binds loosest.
        if self.check(TokenKind::Eq) {
            self.advance();
            let rhs = self.parse_initial_expression()?;

            return Ok(self.unit.add_expr(Expr {
                kind: ExprKind::Binary { op: BinOp::Assign, lhs, rhs },
                span: self.since(start),
                ty: None,
            }));
        }

        Ok(lhs)
    }

    fn parse_binary_operator(&mut self, mut lhs: ExprId, min_prec: u8) -> BasaltResult<ExprId> {
        loop {
            let op = match binary_op(self.curr().kind) {
                Some(op) if op != BinOp::Assign => op,
                _ => return Ok(lhs),
            };

            let prec = precedence(op) as u8;
            if prec < min_prec {
                return Ok(lhs);
            }

            let start = self.unit.expr(lhs).span.start;
            self.advance();

            let mut rhs = self.parse_prefix_operator()?;
            if let Some(next) = binary_op(self.curr().kind) {
                if next != BinOp::Assign && precedence(next) as u8 > prec {
                    rhs = self.parse_binary_operator(rhs, prec + 1)?;
                }
            }

            lhs = self.unit.add_expr(Expr {
                kind: ExprKind::Binary { op, lhs, rhs },
                span: self.since(start),
                ty: None,
            });
        }
    }

    fn parse_prefix_operator(&mut self) -> BasaltResult<ExprId> {
        let start = self.loc();
        let op = match self.curr().kind {
            TokenKind::Minus => Some(UnOp::Negate),
            TokenKind::Tilde => Some(UnOp::Not),
            TokenKind::Bang => Some(UnOp::LogicNot),
            TokenKind::Amp => Some(UnOp::AddressOf),
            TokenKind::Star => Some(UnOp::Deref),
            _ => None,
        };

        if let Some(op) = op {
            self.advance();
            let expr = self.parse_prefix_operator()?;

            return Ok(self.unit.add_expr(Expr {
                kind: ExprKind::Unary { op, expr },
                span: self.since(start),
                ty: None,
            }));
        }

        let primary = self.parse_primary_expression()?;
        self.parse_postfix_operator(primary)
    }

    fn parse_postfix_operator(&mut self, mut base: ExprId) -> BasaltResult<ExprId> {
        loop {
            let start = self.unit.expr(base).span.start;

            if self.expect(TokenKind::OpenParen) {
                let mut args = Vec::new();
                while !self.expect(TokenKind::CloseParen) {
                    args.push(self.parse_initial_expression()?);

                    if self.expect(TokenKind::CloseParen) {
                        break;
                    }

                    self.require(TokenKind::Comma, "','")?;
                }

                base = self.unit.add_expr(Expr {
                    kind: ExprKind::Call { callee: base, args },
                    span: self.since(start),
                    ty: None,
                });
            } else if self.expect(TokenKind::OpenBrack) {
                let index = self.parse_initial_expression()?;
                self.require(TokenKind::CloseBrack, "']'")?;

                base = self.unit.add_expr(Expr {
                    kind: ExprKind::Subscript { base, index },
                    span: self.since(start),
                    ty: None,
                });
            } else if self.expect(TokenKind::Dot) {
                let name = self.require(TokenKind::Identifier, "field name")?;

                base = self.unit.add_expr(Expr {
                    kind: ExprKind::Access { base, name: name.value, field: None },
                    span: self.since(start),
                    ty: None,
                });
            } else {
                return Ok(base);
            }
        }
    }

    fn parse_primary_expression(&mut self) -> BasaltResult<ExprId> {
        let token = self.curr().clone();

        match token.kind {
            TokenKind::Integer => {
                self.advance();
                let value: i64 = token
                    .value
                    .parse()
                    .map_err(|_| self.fatal("integer literal out of range", token.loc))?;

                let ty = QualType::new(self.unit.types.s64());
                Ok(self.unit.add_expr(Expr {
                    kind: ExprKind::Int(value),
                    span: Span::single(token.loc),
                    ty: Some(ty),
                }))
            }

            TokenKind::Float => {
                self.advance();
                let value: f64 = token
                    .value
                    .parse()
                    .map_err(|_| self.fatal("invalid float literal", token.loc))?;

                let ty = QualType::new(self.unit.types.f64());
                Ok(self.unit.add_expr(Expr {
                    kind: ExprKind::Float(value),
                    span: Span::single(token.loc),
                    ty: Some(ty),
                }))
            }

            TokenKind::Char => {
                self.advance();
                let value = token.value.chars().next().unwrap_or('\0');
                let ty = QualType::new(self.unit.types.char_());
                Ok(self.unit.add_expr(Expr {
                    kind: ExprKind::Char(value),
                    span: Span::single(token.loc),
                    ty: Some(ty),
                }))
            }

            TokenKind::String => {
                self.advance();
                let char_ptr = {
                    let pointee = QualType::new(self.unit.types.char_());
                    QualType::new(self.unit.types.pointer(pointee))
                };

                Ok(self.unit.add_expr(Expr {
                    kind: ExprKind::Str(token.value),
                    span: Span::single(token.loc),
                    ty: Some(char_ptr),
                }))
            }

            TokenKind::OpenParen => {
                self.advance();
                let inner = self.parse_initial_expression()?;
                self.require(TokenKind::CloseParen, "')'")?;

                Ok(self.unit.add_expr(Expr {
                    kind: ExprKind::Paren(inner),
                    span: self.since(token.loc),
                    ty: None,
                }))
            }

            TokenKind::Identifier => match token.value.as_str() {
                "true" | "false" => {
                    self.advance();
                    let ty = QualType::new(self.unit.types.bool_());
                    Ok(self.unit.add_expr(Expr {
                        kind: ExprKind::Bool(token.value == "true"),
                        span: Span::single(token.loc),
                        ty: Some(ty),
                    }))
                }

                "null" => {
                    self.advance();
                    let void_ptr = {
                        let pointee = QualType::new(self.unit.types.void());
                        QualType::new(self.unit.types.pointer(pointee))
                    };

                    Ok(self.unit.add_expr(Expr {
                        kind: ExprKind::Null,
                        span: Span::single(token.loc),
                        ty: Some(void_ptr),
                    }))
                }

                "sizeof" => self.parse_sizeof_operator(),

                "cast" if self.peek_second().map(|t| t.kind) == Some(TokenKind::Lt) => {
                    self.parse_type_cast()
                }

                _ => {
                    self.advance();
                    Ok(self.unit.add_expr(Expr {
                        kind: ExprKind::Ref { name: token.value, defn: None },
                        span: Span::single(token.loc),
                        ty: None,
                    }))
                }
            },

            _ => Err(self.fatal(format!("expected expression, found '{}'", token), token.loc)),
        }
    }

    fn parse_sizeof_operator(&mut self) -> BasaltResult<ExprId> {
        let start = self.loc();
        self.advance(); // 'sizeof'

        self.require(TokenKind::Lt, "'<'")?;
        let target = self.parse_type_specifier()?;
        self.require(TokenKind::Gt, "'>'")?;

        let ty = QualType::new(self.unit.types.u64());
        Ok(self.unit.add_expr(Expr {
            kind: ExprKind::Sizeof { target },
            span: self.since(start),
            ty: Some(ty),
        }))
    }

    fn parse_type_cast(&mut self) -> BasaltResult<ExprId> {
        let start = self.loc();
        self.advance(); // 'cast'

        self.require(TokenKind::Lt, "'<'")?;
        let target = self.parse_type_specifier()?;
        self.require(TokenKind::Gt, "'>'")?;

        self.require(TokenKind::OpenParen, "'('")?;
        let expr = self.parse_initial_expression()?;
        self.require(TokenKind::CloseParen, "')'")?;

        Ok(self.unit.add_expr(Expr {
            kind: ExprKind::Cast { expr },
            span: self.since(start),
            ty: Some(target),
        }))
    }
}
