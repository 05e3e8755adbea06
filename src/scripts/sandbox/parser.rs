//! Recursive-descent parser for sandbox scripts.
//!
//! Semicolons are optional: a statement ends where the next token cannot
//! continue it.

use super::ast::*;
use super::lexer::{is_keyword, tokenize, TemplatePart, Token, TokenKind};
use super::SyntaxError;
use std::rc::Rc;

/// Deepest nesting of statements and expressions a script may use.
pub const MAX_NESTING_DEPTH: usize = 128;

/// Parses a whole script.
pub fn parse_program(source: &str) -> Result<Vec<Stmt>, SyntaxError> {
    let mut parser = Parser::new(tokenize(source)?, 0);
    let mut body = Vec::new();
    while !parser.at_eof() {
        body.push(parser.statement()?);
    }
    Ok(body)
}

/// Parses a standalone expression, such as a template substitution.
fn parse_expression(source: &str, line: usize, depth: usize) -> Result<Expr, SyntaxError> {
    let tokens = tokenize(source).map_err(|e| SyntaxError {
        message: e.message,
        line,
    })?;
    let mut parser = Parser::new(tokens, depth);
    let expr = parser.expression()?;
    if !parser.at_eof() {
        return Err(parser.unexpected());
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>, depth: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            depth,
        }
    }

    /// Runs `parse` one nesting level deeper.
    fn nested<T>(
        &mut self,
        parse: fn(&mut Self) -> Result<T, SyntaxError>,
    ) -> Result<T, SyntaxError> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(self.error(format!(
                "Maximum nesting depth of {} exceeded",
                MAX_NESTING_DEPTH
            )));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn current(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn at_eof(&self) -> bool {
        matches!(self.current().kind, TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if self.current().is_punct(punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_ident(&mut self, word: &str) -> bool {
        if self.current().is_ident(word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, punct: &str) -> Result<(), SyntaxError> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(self.error(format!(
                "Expected '{}' but found {}",
                punct,
                describe(self.current())
            )))
        }
    }

    fn error(&self, message: String) -> SyntaxError {
        SyntaxError {
            message,
            line: self.current().line,
        }
    }

    fn unexpected(&self) -> SyntaxError {
        self.error(format!("Unexpected {}", describe(self.current())))
    }

    fn binding_name(&mut self) -> Result<String, SyntaxError> {
        match &self.current().kind {
            TokenKind::Ident(name) if !is_keyword(name) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            TokenKind::Punct("{") | TokenKind::Punct("[") => {
                Err(self.error("Destructuring is not supported".to_string()))
            }
            _ => Err(self.unexpected()),
        }
    }

    // ---- statements ----

    fn statement(&mut self) -> Result<Stmt, SyntaxError> {
        self.nested(Self::single_statement)
    }

    fn single_statement(&mut self) -> Result<Stmt, SyntaxError> {
        let token = self.current().clone();
        let stmt = match &token.kind {
            TokenKind::Punct(";") => {
                self.pos += 1;
                return Ok(Stmt::Empty);
            }
            TokenKind::Punct("{") => {
                self.pos += 1;
                return Ok(Stmt::Block(self.block_body()?));
            }
            TokenKind::Ident(word) => match word.as_str() {
                "const" | "let" | "var" => self.declaration()?,
                "function" => {
                    self.pos += 1;
                    let def = self.function_rest(true)?;
                    return Ok(Stmt::Function(def));
                }
                "if" => return self.if_statement(),
                "return" => {
                    self.pos += 1;
                    let ends = {
                        let next = self.current();
                        next.is_punct(";")
                            || next.is_punct("}")
                            || matches!(next.kind, TokenKind::Eof)
                            || next.line > token.line
                    };
                    if ends {
                        Stmt::Return(None)
                    } else {
                        Stmt::Return(Some(self.expression()?))
                    }
                }
                "throw" => {
                    self.pos += 1;
                    Stmt::Throw(self.expression()?)
                }
                "for" | "while" | "do" | "switch" | "try" | "class" => {
                    return Err(self.error(format!("'{}' statements are not supported", word)));
                }
                _ => Stmt::Expr(self.expression()?),
            },
            _ => Stmt::Expr(self.expression()?),
        };
        self.eat_punct(";");
        Ok(stmt)
    }

    /// Statements up to and including the closing `}`.
    fn block_body(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        let mut body = Vec::new();
        while !self.eat_punct("}") {
            if self.at_eof() {
                return Err(self.error("Expected '}' before end of script".to_string()));
            }
            body.push(self.statement()?);
        }
        Ok(body)
    }

    fn declaration(&mut self) -> Result<Stmt, SyntaxError> {
        let kind = match &self.advance().kind {
            TokenKind::Ident(w) if w == "const" => DeclKind::Const,
            TokenKind::Ident(w) if w == "let" => DeclKind::Let,
            _ => DeclKind::Var,
        };
        let mut declarations = Vec::new();
        loop {
            let name = self.binding_name()?;
            let init = if self.eat_punct("=") {
                Some(self.assignment()?)
            } else if kind == DeclKind::Const {
                return Err(self.error("Missing initializer in const declaration".to_string()));
            } else {
                None
            };
            declarations.push((name, init));
            if !self.eat_punct(",") {
                break;
            }
        }
        Ok(Stmt::Declare { kind, declarations })
    }

    fn if_statement(&mut self) -> Result<Stmt, SyntaxError> {
        self.pos += 1;
        self.expect_punct("(")?;
        let test = self.expression()?;
        self.expect_punct(")")?;
        let consequent = Box::new(self.statement()?);
        let alternate = if self.eat_ident("else") {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            test,
            consequent,
            alternate,
        })
    }

    /// Parses `[name](params) { body }` after the `function` keyword.
    fn function_rest(&mut self, require_name: bool) -> Result<Rc<FunctionDef>, SyntaxError> {
        let name = match &self.current().kind {
            TokenKind::Ident(_) => Some(self.binding_name()?),
            _ if require_name => return Err(self.unexpected()),
            _ => None,
        };
        self.expect_punct("(")?;
        let params = self.param_list()?;
        self.expect_punct("{")?;
        let body = FunctionBody::Block(self.block_body()?);
        Ok(Rc::new(FunctionDef { name, params, body }))
    }

    /// Parameter names up to and including the closing `)`.
    fn param_list(&mut self) -> Result<Vec<String>, SyntaxError> {
        let mut params = Vec::new();
        while !self.eat_punct(")") {
            params.push(self.binding_name()?);
            if self.current().is_punct("=") {
                return Err(self.error("Default parameters are not supported".to_string()));
            }
            if !self.eat_punct(",") {
                self.expect_punct(")")?;
                break;
            }
        }
        Ok(params)
    }

    // ---- expressions ----

    fn expression(&mut self) -> Result<Expr, SyntaxError> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr, SyntaxError> {
        self.nested(Self::assignment_expr)
    }

    fn assignment_expr(&mut self) -> Result<Expr, SyntaxError> {
        if let Some(arrow) = self.try_arrow()? {
            return Ok(arrow);
        }

        let target = self.conditional()?;
        let op = match &self.current().kind {
            TokenKind::Punct("=") => None,
            TokenKind::Punct("+=") => Some(AssignOp::Add),
            TokenKind::Punct("-=") => Some(AssignOp::Sub),
            TokenKind::Punct("*=") => Some(AssignOp::Mul),
            TokenKind::Punct("/=") => Some(AssignOp::Div),
            _ => return Ok(target),
        };
        if !matches!(
            target,
            Expr::Ident(_) | Expr::Member { .. } | Expr::Index { .. }
        ) {
            return Err(self.error("Invalid assignment target".to_string()));
        }
        self.pos += 1;
        let value = self.assignment()?;
        Ok(Expr::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    fn try_arrow(&mut self) -> Result<Option<Expr>, SyntaxError> {
        let params = match &self.current().kind {
            TokenKind::Ident(name)
                if !is_keyword(name)
                    && self.peek_at(1).map_or(false, |t| t.is_punct("=>")) =>
            {
                let name = name.clone();
                self.pos += 2;
                vec![name]
            }
            TokenKind::Punct("(") if self.arrow_follows_parens() => {
                self.pos += 1;
                let params = self.param_list()?;
                self.expect_punct("=>")?;
                params
            }
            _ => return Ok(None),
        };

        let body = if self.eat_punct("{") {
            FunctionBody::Block(self.block_body()?)
        } else {
            FunctionBody::Expr(self.assignment()?)
        };
        Ok(Some(Expr::Function(Rc::new(FunctionDef {
            name: None,
            params,
            body,
        }))))
    }

    /// Whether the parenthesised group at the cursor is followed by `=>`.
    fn arrow_follows_parens(&self) -> bool {
        let mut depth = 0usize;
        for (offset, token) in self.tokens[self.pos..].iter().enumerate() {
            if token.is_punct("(") {
                depth += 1;
            } else if token.is_punct(")") {
                depth -= 1;
                if depth == 0 {
                    return self
                        .peek_at(offset + 1)
                        .map_or(false, |t| t.is_punct("=>"));
                }
            }
        }
        false
    }

    fn conditional(&mut self) -> Result<Expr, SyntaxError> {
        let test = self.logical_or()?;
        if !self.eat_punct("?") {
            return Ok(test);
        }
        let consequent = self.assignment()?;
        self.expect_punct(":")?;
        let alternate = self.assignment()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    fn logical_or(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.logical_and()?;
        loop {
            let op = if self.eat_punct("||") {
                LogicalOp::Or
            } else if self.eat_punct("??") {
                LogicalOp::Nullish
            } else {
                return Ok(left);
            };
            let right = self.logical_and()?;
            left = Expr::Logical {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn logical_and(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.equality()?;
        while self.eat_punct("&&") {
            let right = self.equality()?;
            left = Expr::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    /// One left-associative binary precedence level.
    fn binary_level(
        &mut self,
        ops: &[(&str, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr, SyntaxError>,
    ) -> Result<Expr, SyntaxError> {
        let mut left = next(self)?;
        'outer: loop {
            for (punct, op) in ops {
                if self.eat_punct(punct) {
                    let right = next(self)?;
                    left = Expr::Binary {
                        op: *op,
                        left: Box::new(left),
                        right: Box::new(right),
                    };
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn equality(&mut self) -> Result<Expr, SyntaxError> {
        self.binary_level(
            &[
                ("===", BinaryOp::StrictEq),
                ("!==", BinaryOp::StrictNe),
                ("==", BinaryOp::LooseEq),
                ("!=", BinaryOp::LooseNe),
            ],
            Self::relational,
        )
    }

    fn relational(&mut self) -> Result<Expr, SyntaxError> {
        self.binary_level(
            &[
                ("<=", BinaryOp::Le),
                (">=", BinaryOp::Ge),
                ("<", BinaryOp::Lt),
                (">", BinaryOp::Gt),
            ],
            Self::additive,
        )
    }

    fn additive(&mut self) -> Result<Expr, SyntaxError> {
        self.binary_level(
            &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
            Self::multiplicative,
        )
    }

    fn multiplicative(&mut self) -> Result<Expr, SyntaxError> {
        self.binary_level(
            &[
                ("*", BinaryOp::Mul),
                ("/", BinaryOp::Div),
                ("%", BinaryOp::Rem),
            ],
            Self::unary,
        )
    }

    fn unary(&mut self) -> Result<Expr, SyntaxError> {
        let op = match &self.current().kind {
            TokenKind::Punct("!") => UnaryOp::Not,
            TokenKind::Punct("-") => UnaryOp::Neg,
            TokenKind::Punct("+") => UnaryOp::Plus,
            TokenKind::Ident(w) if w == "typeof" => UnaryOp::TypeOf,
            TokenKind::Punct("++") | TokenKind::Punct("--") => {
                return Err(self.error("Increment operators are not supported".to_string()));
            }
            _ => return self.call_member(),
        };
        self.pos += 1;
        let operand = self.nested(Self::unary)?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn call_member(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = if self.eat_ident("new") {
            let callee = self.member_only()?;
            let args = if self.eat_punct("(") {
                self.arguments()?
            } else {
                Vec::new()
            };
            Expr::Call {
                callee: Box::new(callee),
                args,
            }
        } else {
            self.primary()?
        };

        loop {
            if self.eat_punct("(") {
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args: self.arguments()?,
                };
            } else if let Some(next) = self.member_suffix(expr.clone())? {
                expr = next;
            } else if self.current().is_punct("++") || self.current().is_punct("--") {
                return Err(self.error("Increment operators are not supported".to_string()));
            } else {
                return Ok(expr);
            }
        }
    }

    /// A primary expression followed by property accesses, without calls.
    fn member_only(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.primary()?;
        while let Some(next) = self.member_suffix(expr.clone())? {
            expr = next;
        }
        Ok(expr)
    }

    fn member_suffix(&mut self, object: Expr) -> Result<Option<Expr>, SyntaxError> {
        let optional = if self.eat_punct("?.") {
            true
        } else if self.eat_punct(".") {
            false
        } else if self.eat_punct("[") {
            let index = self.expression()?;
            self.expect_punct("]")?;
            return Ok(Some(Expr::Index {
                object: Box::new(object),
                index: Box::new(index),
            }));
        } else {
            return Ok(None);
        };

        match self.advance().kind {
            TokenKind::Ident(property) => Ok(Some(Expr::Member {
                object: Box::new(object),
                property,
                optional,
            })),
            _ => {
                self.pos -= 1;
                Err(self.unexpected())
            }
        }
    }

    /// Call arguments up to and including the closing `)`.
    fn arguments(&mut self) -> Result<Vec<Expr>, SyntaxError> {
        let mut args = Vec::new();
        while !self.eat_punct(")") {
            if self.current().is_punct("...") {
                return Err(self.error("Spread arguments are not supported".to_string()));
            }
            args.push(self.assignment()?);
            if !self.eat_punct(",") {
                self.expect_punct(")")?;
                break;
            }
        }
        Ok(args)
    }

    fn primary(&mut self) -> Result<Expr, SyntaxError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Number(n) => Ok(Expr::Number(n)),
            TokenKind::Str(s) => Ok(Expr::Str(s)),
            TokenKind::Regex { pattern, flags } => Ok(Expr::Regex { pattern, flags }),
            TokenKind::Template(parts) => {
                let mut segments = Vec::with_capacity(parts.len());
                for part in parts {
                    segments.push(match part {
                        TemplatePart::Text(text) => TemplateSegment::Text(text),
                        TemplatePart::Expr(source) => {
                            TemplateSegment::Expr(parse_expression(&source, token.line, self.depth)?)
                        }
                    });
                }
                Ok(Expr::Template(segments))
            }
            TokenKind::Ident(word) => match word.as_str() {
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                "null" => Ok(Expr::Null),
                "function" => Ok(Expr::Function(self.function_rest(false)?)),
                "undefined" | "this" => Ok(Expr::Ident(word)),
                w if is_keyword(w) => {
                    self.pos -= 1;
                    Err(self.unexpected())
                }
                _ => Ok(Expr::Ident(word)),
            },
            TokenKind::Punct("(") => {
                let expr = self.expression()?;
                self.expect_punct(")")?;
                Ok(expr)
            }
            TokenKind::Punct("[") => self.array_literal(),
            TokenKind::Punct("{") => self.object_literal(),
            _ => {
                self.pos -= 1;
                Err(self.unexpected())
            }
        }
    }

    fn array_literal(&mut self) -> Result<Expr, SyntaxError> {
        let mut items = Vec::new();
        while !self.eat_punct("]") {
            if self.current().is_punct("...") {
                return Err(self.error("Spread elements are not supported".to_string()));
            }
            items.push(self.assignment()?);
            if !self.eat_punct(",") {
                self.expect_punct("]")?;
                break;
            }
        }
        Ok(Expr::Array(items))
    }

    fn object_literal(&mut self) -> Result<Expr, SyntaxError> {
        let mut properties = Vec::new();
        while !self.eat_punct("}") {
            let token = self.advance();
            let key = match token.kind {
                TokenKind::Ident(name) => PropertyKey::Static(name),
                TokenKind::Str(s) => PropertyKey::Static(s),
                TokenKind::Number(n) => PropertyKey::Static(super::value::number_to_string(n)),
                TokenKind::Punct("[") => {
                    let key = self.expression()?;
                    self.expect_punct("]")?;
                    PropertyKey::Computed(key)
                }
                _ => {
                    self.pos -= 1;
                    return Err(self.unexpected());
                }
            };

            let value = if self.eat_punct(":") {
                self.assignment()?
            } else if self.eat_punct("(") {
                let params = self.param_list()?;
                self.expect_punct("{")?;
                let body = FunctionBody::Block(self.block_body()?);
                Expr::Function(Rc::new(FunctionDef {
                    name: None,
                    params,
                    body,
                }))
            } else {
                match &key {
                    PropertyKey::Static(name) => Expr::Ident(name.clone()),
                    PropertyKey::Computed(_) => return Err(self.unexpected()),
                }
            };
            properties.push((key, value));

            if !self.eat_punct(",") {
                self.expect_punct("}")?;
                break;
            }
        }
        Ok(Expr::Object(properties))
    }
}

fn describe(token: &Token) -> String {
    match &token.kind {
        TokenKind::Number(n) => format!("number {}", n),
        TokenKind::Str(s) => format!("string \"{}\"", s),
        TokenKind::Template(_) => "template literal".to_string(),
        TokenKind::Regex { pattern, .. } => format!("regular expression /{}/", pattern),
        TokenKind::Ident(w) => format!("token '{}'", w),
        TokenKind::Punct(p) => format!("token '{}'", p),
        TokenKind::Eof => "end of script".to_string(),
    }
}
