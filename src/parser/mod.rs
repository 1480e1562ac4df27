//=============================================
// sciblock/parser.rs
//=============================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Snippet recursive descent parser implementation
// Objective: Transform token streams into AST nodes consumed by interpreter
//=============================================

//=============================================
//            Section 1: Imports
//=============================================

use std::rc::Rc;

use crate::ast::{
    BinaryOp, CompareOp, Expr, ExprKind, FunctionDecl, Literal, LogicalOp, Parameter, Program,
    Stmt, StmtKind, Target, UnaryOp,
};
use crate::tokenizer::{Position, Token, TokenKind, TokenizeError, Tokenizer};

//=============================================
//            Section 2: Parse Errors
//=============================================

/// Parser error types
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    UnexpectedToken {
        expected: String,
        found: TokenKind,
        position: Position,
    },
    UnexpectedEndOfInput {
        expected: String,
        position: Position,
    },
    InvalidSyntax {
        message: String,
        position: Position,
    },
}

impl ParseError {
    pub fn position(&self) -> Position {
        match self {
            ParseError::UnexpectedToken { position, .. }
            | ParseError::UnexpectedEndOfInput { position, .. }
            | ParseError::InvalidSyntax { position, .. } => *position,
        }
    }

    /// Message without the position suffix; the diagnostic carries the line
    /// separately.
    pub fn message(&self) -> String {
        match self {
            ParseError::UnexpectedToken {
                expected, found, ..
            } => format!("invalid syntax: expected {} but found {}", expected, found),
            ParseError::UnexpectedEndOfInput { expected, .. } => {
                format!("unexpected end of input, expected {}", expected)
            }
            ParseError::InvalidSyntax { message, .. } => message.clone(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let position = self.position();
        write!(
            f,
            "{} at line {}, column {}",
            self.message(),
            position.line,
            position.column
        )
    }
}

impl std::error::Error for ParseError {}

impl From<TokenizeError> for ParseError {
    fn from(value: TokenizeError) -> Self {
        ParseError::InvalidSyntax {
            message: value.message,
            position: value.position,
        }
    }
}

/// Tokenizes and parses a complete snippet.
pub fn parse_source(source: &str) -> Result<Program, ParseError> {
    let tokens = Tokenizer::new(source).tokenize()?;
    Parser::new(tokens).parse()
}

//=============================================
//            Section 3: Parser State
//=============================================

/// Recursive descent parser for snippets
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    expr_depth: usize,
}

const MAX_EXPRESSION_DEPTH: usize = 256;

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            expr_depth: 0,
        }
    }

    pub fn parse(mut self) -> Result<Program, ParseError> {
        let mut statements = Vec::new();
        while !self.check(&TokenKind::Eof) {
            if self.match_token(&TokenKind::Newline) {
                continue;
            }
            if self.check(&TokenKind::Indent) {
                return Err(self.invalid("unexpected indent"));
            }
            statements.push(self.parse_statement()?);
        }
        Ok(Program { statements })
    }

    //=============================================
    //            Section 4: Token Navigation
    //=============================================

    fn peek(&self) -> &Token {
        let index = self.current.min(self.tokens.len().saturating_sub(1));
        &self.tokens[index]
    }

    fn peek_kind_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.current + offset).map(|t| &t.kind)
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.current < self.tokens.len() {
            self.current += 1;
        }
        token
    }

    fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn line(&self) -> usize {
        self.peek().position.line
    }

    fn expect(&mut self, kind: &TokenKind, expected: &str) -> Result<Token, ParseError> {
        if self.check(kind) {
            return Ok(self.advance());
        }
        Err(self.unexpected(expected))
    }

    fn expect_identifier(&mut self, expected: &str) -> Result<String, ParseError> {
        match &self.peek().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let token = self.peek();
        if token.kind == TokenKind::Eof {
            ParseError::UnexpectedEndOfInput {
                expected: expected.to_string(),
                position: token.position,
            }
        } else {
            ParseError::UnexpectedToken {
                expected: expected.to_string(),
                found: token.kind.clone(),
                position: token.position,
            }
        }
    }

    fn invalid(&self, message: &str) -> ParseError {
        ParseError::InvalidSyntax {
            message: message.to_string(),
            position: self.peek().position,
        }
    }

    fn end_of_statement(&mut self) -> Result<(), ParseError> {
        if self.match_token(&TokenKind::Newline) || self.check(&TokenKind::Eof) {
            Ok(())
        } else {
            Err(self.unexpected("end of line"))
        }
    }

    //=============================================
    //            Section 5: Statements
    //=============================================

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        match self.peek().kind {
            TokenKind::Def => self.parse_function_def(),
            TokenKind::If => {
                self.advance();
                self.parse_if_tail(line)
            }
            TokenKind::While => {
                self.advance();
                let condition = self.parse_expression()?;
                let body = self.parse_block()?;
                Ok(Stmt::new(StmtKind::While { condition, body }, line))
            }
            TokenKind::For => {
                self.advance();
                let target = self.parse_target_list()?;
                self.expect(&TokenKind::In, "'in'")?;
                let iterable = self.parse_expression_list()?;
                let body = self.parse_block()?;
                Ok(Stmt::new(
                    StmtKind::For {
                        target,
                        iterable,
                        body,
                    },
                    line,
                ))
            }
            _ => {
                let stmt = self.parse_simple_statement()?;
                self.end_of_statement()?;
                Ok(stmt)
            }
        }
    }

    fn parse_simple_statement(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        let kind = match self.peek().kind {
            TokenKind::Pass => {
                self.advance();
                StmtKind::Pass
            }
            TokenKind::Break => {
                self.advance();
                StmtKind::Break
            }
            TokenKind::Continue => {
                self.advance();
                StmtKind::Continue
            }
            TokenKind::Return => {
                self.advance();
                if self.at_statement_end() {
                    StmtKind::Return(None)
                } else {
                    StmtKind::Return(Some(self.parse_expression_list()?))
                }
            }
            TokenKind::Raise => {
                self.advance();
                if self.at_statement_end() {
                    StmtKind::Raise(None)
                } else {
                    StmtKind::Raise(Some(self.parse_expression()?))
                }
            }
            TokenKind::Assert => {
                self.advance();
                let condition = self.parse_expression()?;
                let message = if self.match_token(&TokenKind::Comma) {
                    Some(self.parse_expression()?)
                } else {
                    None
                };
                StmtKind::Assert { condition, message }
            }
            TokenKind::Import => {
                self.advance();
                let path = self.parse_dotted_name()?;
                let alias = if self.match_token(&TokenKind::As) {
                    Some(self.expect_identifier("alias name")?)
                } else {
                    None
                };
                StmtKind::Import { path, alias }
            }
            TokenKind::From => {
                self.advance();
                let path = self.parse_dotted_name()?;
                self.expect(&TokenKind::Import, "'import'")?;
                let mut names = Vec::new();
                loop {
                    let name = self.expect_identifier("imported name")?;
                    let alias = if self.match_token(&TokenKind::As) {
                        Some(self.expect_identifier("alias name")?)
                    } else {
                        None
                    };
                    names.push((name, alias));
                    if !self.match_token(&TokenKind::Comma) {
                        break;
                    }
                }
                StmtKind::ImportFrom { path, names }
            }
            _ => return self.parse_expression_statement(),
        };
        Ok(Stmt::new(kind, line))
    }

    fn at_statement_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Newline | TokenKind::Eof)
    }

    fn parse_dotted_name(&mut self) -> Result<Vec<String>, ParseError> {
        let mut path = vec![self.expect_identifier("module name")?];
        while self.match_token(&TokenKind::Dot) {
            path.push(self.expect_identifier("module name")?);
        }
        Ok(path)
    }

    fn parse_expression_statement(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        let first = self.parse_expression_list()?;

        let aug_op = match self.peek().kind {
            TokenKind::PlusEqual => Some(BinaryOp::Add),
            TokenKind::MinusEqual => Some(BinaryOp::Subtract),
            TokenKind::StarEqual => Some(BinaryOp::Multiply),
            TokenKind::SlashEqual => Some(BinaryOp::Divide),
            _ => None,
        };
        if let Some(op) = aug_op {
            self.advance();
            let target = self.to_target(first)?;
            if matches!(target, Target::Tuple(_)) {
                return Err(self.invalid("illegal expression for augmented assignment"));
            }
            let value = self.parse_expression_list()?;
            return Ok(Stmt::new(StmtKind::AugAssign { target, op, value }, line));
        }

        if !self.check(&TokenKind::Equal) {
            return Ok(Stmt::new(StmtKind::Expression(first), line));
        }

        let mut pending = vec![first];
        while self.match_token(&TokenKind::Equal) {
            pending.push(self.parse_expression_list()?);
        }
        let value = pending.pop().ok_or_else(|| self.invalid("invalid syntax"))?;
        let targets = pending
            .into_iter()
            .map(|expr| self.to_target(expr))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Stmt::new(StmtKind::Assign { targets, value }, line))
    }

    fn to_target(&self, expr: Expr) -> Result<Target, ParseError> {
        match expr.kind {
            ExprKind::Name(name) => Ok(Target::Name(name)),
            ExprKind::Index { object, index } => Ok(Target::Index {
                object: *object,
                index: *index,
            }),
            ExprKind::Attribute { object, name } => Ok(Target::Attribute {
                object: *object,
                name,
            }),
            ExprKind::Tuple(items) | ExprKind::List(items) => Ok(Target::Tuple(
                items
                    .into_iter()
                    .map(|item| self.to_target(item))
                    .collect::<Result<Vec<_>, _>>()?,
            )),
            ExprKind::Call { .. } => Err(ParseError::InvalidSyntax {
                message: "cannot assign to function call".to_string(),
                position: Position::new(expr.line, 1, 0),
            }),
            _ => Err(ParseError::InvalidSyntax {
                message: "cannot assign to expression".to_string(),
                position: Position::new(expr.line, 1, 0),
            }),
        }
    }

    /// Targets of `for` loops and comprehensions; parsed below the
    /// comparison level so `in` is not consumed.
    fn parse_target_list(&mut self) -> Result<Target, ParseError> {
        let line = self.line();
        let mut items = vec![self.parse_postfix()?];
        let mut is_tuple = false;
        while self.match_token(&TokenKind::Comma) {
            is_tuple = true;
            if self.check(&TokenKind::In) {
                break;
            }
            items.push(self.parse_postfix()?);
        }
        let expr = if is_tuple {
            Expr::new(ExprKind::Tuple(items), line)
        } else {
            items.remove(0)
        };
        self.to_target(expr)
    }

    fn parse_function_def(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        self.expect(&TokenKind::Def, "'def'")?;
        let name = self.expect_identifier("function name")?;
        self.expect(&TokenKind::LeftParen, "'('")?;
        let params = self.parse_parameters(&TokenKind::RightParen)?;
        self.expect(&TokenKind::RightParen, "')'")?;
        let body = self.parse_block()?;
        let decl = FunctionDecl {
            name,
            params,
            body,
            line,
        };
        Ok(Stmt::new(StmtKind::FunctionDef(Rc::new(decl)), line))
    }

    fn parse_parameters(&mut self, terminator: &TokenKind) -> Result<Vec<Parameter>, ParseError> {
        let mut params: Vec<Parameter> = Vec::new();
        while !self.check(terminator) {
            let name = self.expect_identifier("parameter name")?;
            let default = if self.match_token(&TokenKind::Equal) {
                Some(self.parse_expression()?)
            } else {
                if params.iter().any(|p| p.default.is_some()) {
                    return Err(
                        self.invalid("non-default argument follows default argument")
                    );
                }
                None
            };
            if params.iter().any(|p| p.name == name) {
                return Err(self.invalid(&format!(
                    "duplicate argument '{}' in function definition",
                    name
                )));
            }
            params.push(Parameter { name, default });
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        Ok(params)
    }

    fn parse_if_tail(&mut self, line: usize) -> Result<Stmt, ParseError> {
        let condition = self.parse_expression()?;
        let then_branch = self.parse_block()?;
        let else_branch = if self.check(&TokenKind::Elif) {
            let elif_line = self.line();
            self.advance();
            vec![self.parse_if_tail(elif_line)?]
        } else if self.match_token(&TokenKind::Else) {
            self.parse_block()?
        } else {
            Vec::new()
        };
        Ok(Stmt::new(
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            },
            line,
        ))
    }

    /// `:` followed by either an indented suite or simple statements on the
    /// same line.
    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect(&TokenKind::Colon, "':'")?;
        if !self.match_token(&TokenKind::Newline) {
            let stmt = self.parse_simple_statement()?;
            self.end_of_statement()?;
            return Ok(vec![stmt]);
        }
        if !self.match_token(&TokenKind::Indent) {
            return Err(self.unexpected("an indented block"));
        }
        let mut body = Vec::new();
        while !self.check(&TokenKind::Dedent) && !self.check(&TokenKind::Eof) {
            if self.match_token(&TokenKind::Newline) {
                continue;
            }
            body.push(self.parse_statement()?);
        }
        self.match_token(&TokenKind::Dedent);
        Ok(body)
    }

    //=============================================
    //            Section 6: Expressions
    //=============================================

    /// Comma-separated expressions; more than one (or a trailing comma)
    /// forms a tuple.
    fn parse_expression_list(&mut self) -> Result<Expr, ParseError> {
        let line = self.line();
        let first = self.parse_expression()?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.match_token(&TokenKind::Comma) {
            if self.at_expression_list_end() {
                break;
            }
            items.push(self.parse_expression()?);
        }
        Ok(Expr::new(ExprKind::Tuple(items), line))
    }

    fn at_expression_list_end(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Newline
                | TokenKind::Eof
                | TokenKind::Equal
                | TokenKind::RightParen
                | TokenKind::Colon
        )
    }

    pub fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.expr_depth += 1;
        if self.expr_depth > MAX_EXPRESSION_DEPTH {
            self.expr_depth -= 1;
            return Err(self.invalid("expression nested too deeply"));
        }
        let result = self.parse_lambda_or_conditional();
        self.expr_depth -= 1;
        result
    }

    fn parse_lambda_or_conditional(&mut self) -> Result<Expr, ParseError> {
        let line = self.line();
        if self.match_token(&TokenKind::Lambda) {
            let params = self.parse_parameters(&TokenKind::Colon)?;
            self.expect(&TokenKind::Colon, "':'")?;
            let body_expr = self.parse_expression()?;
            let body_line = body_expr.line;
            let decl = FunctionDecl {
                name: "<lambda>".to_string(),
                params,
                body: vec![Stmt::new(StmtKind::Return(Some(body_expr)), body_line)],
                line,
            };
            return Ok(Expr::new(ExprKind::Lambda(Rc::new(decl)), line));
        }

        let value = self.parse_or()?;
        if self.match_token(&TokenKind::If) {
            let condition = self.parse_or()?;
            self.expect(&TokenKind::Else, "'else'")?;
            let else_value = self.parse_expression()?;
            return Ok(Expr::new(
                ExprKind::Conditional {
                    condition: Box::new(condition),
                    then_value: Box::new(value),
                    else_value: Box::new(else_value),
                },
                line,
            ));
        }
        Ok(value)
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;
        while self.check(&TokenKind::Or) {
            let line = self.line();
            self.advance();
            let right = self.parse_and()?;
            left = Expr::new(
                ExprKind::Logical {
                    op: LogicalOp::Or,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                line,
            );
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_not()?;
        while self.check(&TokenKind::And) {
            let line = self.line();
            self.advance();
            let right = self.parse_not()?;
            left = Expr::new(
                ExprKind::Logical {
                    op: LogicalOp::And,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                line,
            );
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        if self.check(&TokenKind::Not) {
            let line = self.line();
            self.advance();
            let operand = self.parse_not()?;
            return Ok(Expr::new(
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                line,
            ));
        }
        self.parse_comparison()
    }

    fn compare_op(&mut self) -> Option<CompareOp> {
        let op = match self.peek().kind {
            TokenKind::EqualEqual => CompareOp::Equal,
            TokenKind::NotEqual => CompareOp::NotEqual,
            TokenKind::Less => CompareOp::Less,
            TokenKind::Greater => CompareOp::Greater,
            TokenKind::LessEqual => CompareOp::LessEqual,
            TokenKind::GreaterEqual => CompareOp::GreaterEqual,
            TokenKind::In => CompareOp::In,
            TokenKind::Not if self.peek_kind_at(1) == Some(&TokenKind::In) => {
                self.advance();
                CompareOp::NotIn
            }
            TokenKind::Is => {
                if self.peek_kind_at(1) == Some(&TokenKind::Not) {
                    self.advance();
                    CompareOp::IsNot
                } else {
                    CompareOp::Is
                }
            }
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let line = self.line();
        let left = self.parse_additive()?;
        let mut links = Vec::new();
        while let Some(op) = self.compare_op() {
            links.push((op, self.parse_additive()?));
        }
        if links.is_empty() {
            return Ok(left);
        }
        Ok(Expr::new(
            ExprKind::Compare {
                left: Box::new(left),
                links,
            },
            line,
        ))
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Subtract,
                _ => break,
            };
            let line = self.line();
            self.advance();
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right, line);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Multiply,
                TokenKind::Slash => BinaryOp::Divide,
                TokenKind::DoubleSlash => BinaryOp::FloorDivide,
                TokenKind::Percent => BinaryOp::Modulo,
                _ => break,
            };
            let line = self.line();
            self.advance();
            let right = self.parse_unary()?;
            left = binary(op, left, right, line);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek().kind {
            TokenKind::Minus => UnaryOp::Negate,
            TokenKind::Plus => UnaryOp::Plus,
            _ => return self.parse_power(),
        };
        let line = self.line();
        self.advance();
        let operand = self.parse_unary()?;
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            line,
        ))
    }

    /// `**` binds tighter than a unary minus on its left and is right
    /// associative.
    fn parse_power(&mut self) -> Result<Expr, ParseError> {
        let base = self.parse_postfix()?;
        if self.check(&TokenKind::DoubleStar) {
            let line = self.line();
            self.advance();
            let exponent = self.parse_unary()?;
            return Ok(binary(BinaryOp::Power, base, exponent, line));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            let line = self.line();
            if self.match_token(&TokenKind::LeftParen) {
                let (args, kwargs) = self.parse_call_arguments()?;
                self.expect(&TokenKind::RightParen, "')'")?;
                expr = Expr::new(
                    ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                        kwargs,
                    },
                    line,
                );
            } else if self.match_token(&TokenKind::LeftBracket) {
                let index = self.parse_subscript()?;
                self.expect(&TokenKind::RightBracket, "']'")?;
                expr = Expr::new(
                    ExprKind::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    },
                    line,
                );
            } else if self.match_token(&TokenKind::Dot) {
                let name = self.expect_identifier("attribute name")?;
                expr = Expr::new(
                    ExprKind::Attribute {
                        object: Box::new(expr),
                        name,
                    },
                    line,
                );
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_call_arguments(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), ParseError> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();
        while !self.check(&TokenKind::RightParen) {
            let is_keyword = matches!(self.peek().kind, TokenKind::Identifier(_))
                && self.peek_kind_at(1) == Some(&TokenKind::Equal);
            if is_keyword {
                let name = self.expect_identifier("keyword name")?;
                self.advance();
                if kwargs.iter().any(|(existing, _)| existing == &name) {
                    return Err(self.invalid(&format!("keyword argument repeated: {}", name)));
                }
                kwargs.push((name, self.parse_expression()?));
            } else {
                if !kwargs.is_empty() {
                    return Err(self.invalid("positional argument follows keyword argument"));
                }
                let arg = self.parse_expression()?;
                if self.check(&TokenKind::For) {
                    args.push(self.parse_comprehension_tail(arg)?);
                } else {
                    args.push(arg);
                }
            }
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        Ok((args, kwargs))
    }

    fn parse_subscript(&mut self) -> Result<Expr, ParseError> {
        let line = self.line();
        let lower = if self.check(&TokenKind::Colon) {
            None
        } else {
            let expr = self.parse_expression()?;
            if !self.check(&TokenKind::Colon) {
                return Ok(expr);
            }
            Some(Box::new(expr))
        };
        self.expect(&TokenKind::Colon, "':'")?;
        let upper = if matches!(
            self.peek().kind,
            TokenKind::Colon | TokenKind::RightBracket
        ) {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };
        let step = if self.match_token(&TokenKind::Colon) && !self.check(&TokenKind::RightBracket)
        {
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };
        Ok(Expr::new(ExprKind::Slice { lower, upper, step }, line))
    }

    fn parse_comprehension_tail(&mut self, element: Expr) -> Result<Expr, ParseError> {
        let line = element.line;
        self.expect(&TokenKind::For, "'for'")?;
        let target = self.parse_target_list()?;
        self.expect(&TokenKind::In, "'in'")?;
        let iterable = self.parse_or()?;
        let mut conditions = Vec::new();
        while self.match_token(&TokenKind::If) {
            conditions.push(self.parse_or()?);
        }
        Ok(Expr::new(
            ExprKind::ListComp {
                element: Box::new(element),
                target: Box::new(target),
                iterable: Box::new(iterable),
                conditions,
            },
            line,
        ))
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.peek().clone();
        let line = token.position.line;
        let kind = match token.kind {
            TokenKind::Integer(n) => {
                self.advance();
                ExprKind::Literal(Literal::Int(n))
            }
            TokenKind::Float(n) => {
                self.advance();
                ExprKind::Literal(Literal::Float(n))
            }
            TokenKind::String(s) => {
                self.advance();
                // adjacent literals concatenate
                let mut value = s;
                while let TokenKind::String(next) = &self.peek().kind {
                    value.push_str(next);
                    self.advance();
                }
                ExprKind::Literal(Literal::Str(value))
            }
            TokenKind::True => {
                self.advance();
                ExprKind::Literal(Literal::Bool(true))
            }
            TokenKind::False => {
                self.advance();
                ExprKind::Literal(Literal::Bool(false))
            }
            TokenKind::None => {
                self.advance();
                ExprKind::Literal(Literal::None)
            }
            TokenKind::Identifier(name) => {
                self.advance();
                ExprKind::Name(name)
            }
            TokenKind::LeftParen => {
                self.advance();
                return self.parse_parenthesized(line);
            }
            TokenKind::LeftBracket => {
                self.advance();
                return self.parse_list_display(line);
            }
            TokenKind::LeftBrace => {
                self.advance();
                return self.parse_dict_display(line);
            }
            _ => return Err(self.unexpected("an expression")),
        };
        Ok(Expr::new(kind, line))
    }

    fn parse_parenthesized(&mut self, line: usize) -> Result<Expr, ParseError> {
        if self.match_token(&TokenKind::RightParen) {
            return Ok(Expr::new(ExprKind::Tuple(Vec::new()), line));
        }
        let first = self.parse_expression()?;
        if self.check(&TokenKind::For) {
            let comp = self.parse_comprehension_tail(first)?;
            self.expect(&TokenKind::RightParen, "')'")?;
            return Ok(comp);
        }
        if self.match_token(&TokenKind::RightParen) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.match_token(&TokenKind::Comma) {
            if self.check(&TokenKind::RightParen) {
                break;
            }
            items.push(self.parse_expression()?);
        }
        self.expect(&TokenKind::RightParen, "')'")?;
        Ok(Expr::new(ExprKind::Tuple(items), line))
    }

    fn parse_list_display(&mut self, line: usize) -> Result<Expr, ParseError> {
        if self.match_token(&TokenKind::RightBracket) {
            return Ok(Expr::new(ExprKind::List(Vec::new()), line));
        }
        let first = self.parse_expression()?;
        if self.check(&TokenKind::For) {
            let comp = self.parse_comprehension_tail(first)?;
            self.expect(&TokenKind::RightBracket, "']'")?;
            return Ok(comp);
        }
        let mut items = vec![first];
        while self.match_token(&TokenKind::Comma) {
            if self.check(&TokenKind::RightBracket) {
                break;
            }
            items.push(self.parse_expression()?);
        }
        self.expect(&TokenKind::RightBracket, "']'")?;
        Ok(Expr::new(ExprKind::List(items), line))
    }

    fn parse_dict_display(&mut self, line: usize) -> Result<Expr, ParseError> {
        let mut entries = Vec::new();
        while !self.check(&TokenKind::RightBrace) {
            let key = self.parse_expression()?;
            self.expect(&TokenKind::Colon, "':'")?;
            let value = self.parse_expression()?;
            entries.push((key, value));
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RightBrace, "'}'")?;
        Ok(Expr::new(ExprKind::Dict(entries), line))
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr, line: usize) -> Expr {
    Expr::new(
        ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        line,
    )
}

//=============================================
//            Section 7: Tests
//=============================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Program {
        parse_source(source).unwrap()
    }

    #[test]
    fn test_assignment_and_lines() {
        let program = parse("x = 1\n\ny = x + 2\n");
        assert_eq!(program.statements.len(), 2);
        assert_eq!(program.statements[1].line, 3);
        assert!(matches!(
            program.statements[1].kind,
            StmtKind::Assign { .. }
        ));
    }

    #[test]
    fn test_power_binds_tighter_than_negation() {
        let program = parse("-2 ** 2\n");
        match &program.statements[0].kind {
            StmtKind::Expression(Expr {
                kind: ExprKind::Unary { op, operand },
                ..
            }) => {
                assert_eq!(*op, UnaryOp::Negate);
                assert!(matches!(
                    operand.kind,
                    ExprKind::Binary {
                        op: BinaryOp::Power,
                        ..
                    }
                ));
            }
            other => panic!("expected unary expression, found {other:?}"),
        }
    }

    #[test]
    fn test_function_def_with_defaults() {
        let program = parse("def f(a, b=2):\n    return a + b\n");
        match &program.statements[0].kind {
            StmtKind::FunctionDef(decl) => {
                assert_eq!(decl.name, "f");
                assert_eq!(decl.params.len(), 2);
                assert!(decl.params[1].default.is_some());
                assert_eq!(decl.body[0].line, 2);
            }
            other => panic!("expected function definition, found {other:?}"),
        }
    }

    #[test]
    fn test_elif_chain_nests() {
        let program = parse("if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n");
        match &program.statements[0].kind {
            StmtKind::If { else_branch, .. } => {
                assert_eq!(else_branch.len(), 1);
                assert_eq!(else_branch[0].line, 3);
            }
            other => panic!("expected if statement, found {other:?}"),
        }
    }

    #[test]
    fn test_call_with_keywords_and_comprehension() {
        let program = parse("plt.plot(x, [v * 2 for v in x if v > 0], label='a')\n");
        match &program.statements[0].kind {
            StmtKind::Expression(Expr {
                kind: ExprKind::Call { args, kwargs, .. },
                ..
            }) => {
                assert_eq!(args.len(), 2);
                assert!(matches!(args[1].kind, ExprKind::ListComp { .. }));
                assert_eq!(kwargs[0].0, "label");
            }
            other => panic!("expected call, found {other:?}"),
        }
    }

    #[test]
    fn test_tuple_unpacking_and_slices() {
        let program = parse("a, b = x[1:], x[::2]\n");
        match &program.statements[0].kind {
            StmtKind::Assign { targets, value } => {
                assert!(matches!(targets[0], Target::Tuple(ref items) if items.len() == 2));
                assert!(matches!(value.kind, ExprKind::Tuple(ref items) if items.len() == 2));
            }
            other => panic!("expected assignment, found {other:?}"),
        }
    }

    #[test]
    fn test_multiline_dict_keeps_start_line() {
        let program = parse("result = {\n    'a': 1,\n    'b': 2,\n}\nz = 0\n");
        assert_eq!(program.statements.len(), 2);
        assert_eq!(program.statements[1].line, 5);
    }

    #[test]
    fn test_syntax_error_position() {
        let err = parse_source("x = 1\ny = (2 +\n").unwrap_err();
        assert_eq!(err.position().line, 2);
        assert!(err.message().contains("was never closed"));

        let err = parse_source("x = 1\ny = 2 +\n").unwrap_err();
        assert!(matches!(err, ParseError::InvalidSyntax { .. } | ParseError::UnexpectedToken { .. }));

        let err = parse_source("x = 1\nif x\n    y = 2\n").unwrap_err();
        assert_eq!(err.position().line, 2);
        assert!(err.message().contains("':'"));
    }

    #[test]
    fn test_cannot_assign_to_call() {
        let err = parse_source("f() = 3\n").unwrap_err();
        assert_eq!(err.message(), "cannot assign to function call");
    }
}
