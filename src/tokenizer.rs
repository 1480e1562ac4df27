//=====================================================
// File: tokenizer.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Snippet tokenizer
// Objective: Turn snippet source text into a token stream with line-accurate
//            positions and INDENT/DEDENT structure for block parsing
//=====================================================

use std::collections::HashMap;
use std::fmt;

/// Represents the position of a token in the source code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl Position {
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }
}

/// All token types of the snippet language
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Integer(i64),
    Float(f64),
    String(String),
    Identifier(String),

    // Keywords
    Def,
    Return,
    If,
    Elif,
    Else,
    While,
    For,
    In,
    Not,
    And,
    Or,
    Is,
    None,
    True,
    False,
    Break,
    Continue,
    Pass,
    Lambda,
    Raise,
    Assert,
    Import,
    From,
    As,

    // Operators
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    Equal,
    EqualEqual,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    PlusEqual,
    MinusEqual,
    StarEqual,
    SlashEqual,

    // Delimiters
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    Comma,
    Colon,
    Dot,

    // Layout
    Newline,
    Indent,
    Dedent,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Integer(n) => write!(f, "{}", n),
            TokenKind::Float(n) => write!(f, "{}", n),
            TokenKind::String(s) => write!(f, "'{}'", s),
            TokenKind::Identifier(s) => write!(f, "{}", s),
            TokenKind::Newline => write!(f, "end of line"),
            TokenKind::Indent => write!(f, "indent"),
            TokenKind::Dedent => write!(f, "dedent"),
            TokenKind::Eof => write!(f, "end of input"),
            other => write!(f, "'{}'", symbol_text(other)),
        }
    }
}

fn symbol_text(kind: &TokenKind) -> &'static str {
    match kind {
        TokenKind::Def => "def",
        TokenKind::Return => "return",
        TokenKind::If => "if",
        TokenKind::Elif => "elif",
        TokenKind::Else => "else",
        TokenKind::While => "while",
        TokenKind::For => "for",
        TokenKind::In => "in",
        TokenKind::Not => "not",
        TokenKind::And => "and",
        TokenKind::Or => "or",
        TokenKind::Is => "is",
        TokenKind::None => "None",
        TokenKind::True => "True",
        TokenKind::False => "False",
        TokenKind::Break => "break",
        TokenKind::Continue => "continue",
        TokenKind::Pass => "pass",
        TokenKind::Lambda => "lambda",
        TokenKind::Raise => "raise",
        TokenKind::Assert => "assert",
        TokenKind::Import => "import",
        TokenKind::From => "from",
        TokenKind::As => "as",
        TokenKind::Plus => "+",
        TokenKind::Minus => "-",
        TokenKind::Star => "*",
        TokenKind::DoubleStar => "**",
        TokenKind::Slash => "/",
        TokenKind::DoubleSlash => "//",
        TokenKind::Percent => "%",
        TokenKind::Equal => "=",
        TokenKind::EqualEqual => "==",
        TokenKind::NotEqual => "!=",
        TokenKind::Less => "<",
        TokenKind::Greater => ">",
        TokenKind::LessEqual => "<=",
        TokenKind::GreaterEqual => ">=",
        TokenKind::PlusEqual => "+=",
        TokenKind::MinusEqual => "-=",
        TokenKind::StarEqual => "*=",
        TokenKind::SlashEqual => "/=",
        TokenKind::LeftParen => "(",
        TokenKind::RightParen => ")",
        TokenKind::LeftBracket => "[",
        TokenKind::RightBracket => "]",
        TokenKind::LeftBrace => "{",
        TokenKind::RightBrace => "}",
        TokenKind::Comma => ",",
        TokenKind::Colon => ":",
        TokenKind::Dot => ".",
        _ => "?",
    }
}

/// A token with its kind and position information
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: Position,
}

impl Token {
    pub fn new(kind: TokenKind, position: Position) -> Self {
        Self { kind, position }
    }
}

/// Lexical failure with the position where scanning stopped.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenizeError {
    pub message: String,
    pub position: Position,
}

impl fmt::Display for TokenizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (line {}, column {})",
            self.message, self.position.line, self.position.column
        )
    }
}

impl std::error::Error for TokenizeError {}

/// Tokenizer for snippet source
pub struct Tokenizer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
    keywords: HashMap<&'static str, TokenKind>,
    tokens: Vec<Token>,
    indent_stack: Vec<usize>,
    bracket_depth: usize,
    open_brackets: Vec<(char, Position)>,
    at_line_start: bool,
}

impl Tokenizer {
    pub fn new(input: &str) -> Self {
        let mut keywords = HashMap::new();
        keywords.insert("def", TokenKind::Def);
        keywords.insert("return", TokenKind::Return);
        keywords.insert("if", TokenKind::If);
        keywords.insert("elif", TokenKind::Elif);
        keywords.insert("else", TokenKind::Else);
        keywords.insert("while", TokenKind::While);
        keywords.insert("for", TokenKind::For);
        keywords.insert("in", TokenKind::In);
        keywords.insert("not", TokenKind::Not);
        keywords.insert("and", TokenKind::And);
        keywords.insert("or", TokenKind::Or);
        keywords.insert("is", TokenKind::Is);
        keywords.insert("None", TokenKind::None);
        keywords.insert("True", TokenKind::True);
        keywords.insert("False", TokenKind::False);
        keywords.insert("break", TokenKind::Break);
        keywords.insert("continue", TokenKind::Continue);
        keywords.insert("pass", TokenKind::Pass);
        keywords.insert("lambda", TokenKind::Lambda);
        keywords.insert("raise", TokenKind::Raise);
        keywords.insert("assert", TokenKind::Assert);
        keywords.insert("import", TokenKind::Import);
        keywords.insert("from", TokenKind::From);
        keywords.insert("as", TokenKind::As);

        Self {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            keywords,
            tokens: Vec::new(),
            indent_stack: vec![0],
            bracket_depth: 0,
            open_brackets: Vec::new(),
            at_line_start: true,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, TokenizeError> {
        loop {
            if self.at_line_start && self.bracket_depth == 0 {
                self.handle_indentation()?;
                if self.is_at_end() {
                    break;
                }
            }

            self.skip_inline_whitespace();
            if self.is_at_end() {
                break;
            }

            match self.current_char() {
                '\n' => self.handle_newline(),
                '#' => self.skip_comment(),
                '\\' if self.peek_char() == Some('\n') => {
                    // explicit line continuation
                    self.advance();
                    self.advance();
                }
                '"' | '\'' => self.handle_string()?,
                c if c.is_ascii_digit() => self.handle_number()?,
                '.' if self.peek_char().is_some_and(|c| c.is_ascii_digit()) => {
                    self.handle_number()?
                }
                c if c.is_alphabetic() || c == '_' => self.handle_identifier(),
                _ => self.handle_operator_or_delimiter()?,
            }
        }

        if let Some((open, start)) = self.open_brackets.last() {
            return Err(self.error(format!("'{}' was never closed", open), *start));
        }
        if self.bracket_depth == 0
            && !matches!(
                self.tokens.last().map(|t| &t.kind),
                None | Some(TokenKind::Newline)
            )
        {
            self.emit_token(TokenKind::Newline, self.current_position());
        }
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.emit_token(TokenKind::Dedent, self.current_position());
        }
        self.emit_token(TokenKind::Eof, self.current_position());
        Ok(self.tokens)
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    fn current_char(&self) -> char {
        self.input.get(self.position).copied().unwrap_or('\0')
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn advance(&mut self) -> char {
        let ch = self.current_char();
        self.position += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        ch
    }

    fn current_position(&self) -> Position {
        Position::new(self.line, self.column, self.position)
    }

    fn emit_token(&mut self, kind: TokenKind, position: Position) {
        self.tokens.push(Token::new(kind, position));
    }

    fn error(&self, message: impl Into<String>, position: Position) -> TokenizeError {
        TokenizeError {
            message: message.into(),
            position,
        }
    }

    fn skip_inline_whitespace(&mut self) {
        while !self.is_at_end() {
            match self.current_char() {
                ' ' | '\t' | '\r' => {
                    self.advance();
                }
                '\n' if self.bracket_depth > 0 => {
                    self.advance();
                }
                _ => break,
            }
        }
    }

    fn skip_comment(&mut self) {
        while !self.is_at_end() && self.current_char() != '\n' {
            self.advance();
        }
    }

    fn handle_newline(&mut self) {
        let position = self.current_position();
        self.advance();
        if !matches!(
            self.tokens.last().map(|t| &t.kind),
            None | Some(TokenKind::Newline)
        ) {
            self.emit_token(TokenKind::Newline, position);
        }
        self.at_line_start = true;
    }

    /// Measures the indentation of the next logical line, skipping blank and
    /// comment-only lines, and emits INDENT/DEDENT tokens.
    fn handle_indentation(&mut self) -> Result<(), TokenizeError> {
        loop {
            let mut indent_level = 0;
            while !self.is_at_end() {
                match self.current_char() {
                    ' ' => indent_level += 1,
                    '\t' => indent_level += 4,
                    '\r' => {}
                    _ => break,
                }
                self.advance();
            }

            if self.is_at_end() {
                return Ok(());
            }
            match self.current_char() {
                '\n' => {
                    self.advance();
                    continue;
                }
                '#' => {
                    self.skip_comment();
                    continue;
                }
                _ => {}
            }

            self.at_line_start = false;
            let position = self.current_position();
            let current_indent = self.indent_stack.last().copied().unwrap_or(0);

            if indent_level > current_indent {
                self.indent_stack.push(indent_level);
                self.emit_token(TokenKind::Indent, position);
            } else if indent_level < current_indent {
                while let Some(&stack_level) = self.indent_stack.last() {
                    if stack_level <= indent_level {
                        break;
                    }
                    self.indent_stack.pop();
                    self.emit_token(TokenKind::Dedent, position);
                }
                if self.indent_stack.last().copied().unwrap_or(0) != indent_level {
                    return Err(self.error(
                        "unindent does not match any outer indentation level",
                        position,
                    ));
                }
            }
            return Ok(());
        }
    }

    fn handle_string(&mut self) -> Result<(), TokenizeError> {
        let start = self.current_position();
        let quote = self.advance();
        let mut value = String::new();

        loop {
            if self.is_at_end() || self.current_char() == '\n' {
                return Err(self.error("unterminated string literal", start));
            }
            let ch = self.advance();
            if ch == quote {
                break;
            }
            if ch == '\\' {
                if self.is_at_end() {
                    return Err(self.error("unterminated string literal", start));
                }
                match self.advance() {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    'r' => value.push('\r'),
                    '0' => value.push('\0'),
                    '\\' => value.push('\\'),
                    '\'' => value.push('\''),
                    '"' => value.push('"'),
                    '\n' => {}
                    other => {
                        value.push('\\');
                        value.push(other);
                    }
                }
            } else {
                value.push(ch);
            }
        }

        self.emit_token(TokenKind::String(value), start);
        Ok(())
    }

    fn handle_number(&mut self) -> Result<(), TokenizeError> {
        let start = self.current_position();
        let mut number = String::new();
        let mut is_float = false;

        while !self.is_at_end() {
            let ch = self.current_char();
            if ch.is_ascii_digit() || ch == '_' {
                if ch != '_' {
                    number.push(ch);
                }
                self.advance();
            } else if ch == '.' && !is_float {
                is_float = true;
                number.push(ch);
                self.advance();
            } else if (ch == 'e' || ch == 'E')
                && self
                    .peek_char()
                    .is_some_and(|c| c.is_ascii_digit() || c == '-' || c == '+')
            {
                is_float = true;
                number.push(self.advance());
                if matches!(self.current_char(), '-' | '+') {
                    number.push(self.advance());
                }
            } else {
                break;
            }
        }

        if self.current_char().is_alphabetic() || self.current_char() == '_' {
            return Err(self.error("invalid decimal literal", start));
        }

        let kind = if is_float {
            number
                .parse::<f64>()
                .map(TokenKind::Float)
                .map_err(|_| self.error(format!("invalid float literal '{}'", number), start))?
        } else {
            number
                .parse::<i64>()
                .map(TokenKind::Integer)
                .map_err(|_| self.error(format!("integer literal '{}' too large", number), start))?
        };
        self.emit_token(kind, start);
        Ok(())
    }

    fn handle_identifier(&mut self) {
        let start = self.current_position();
        let mut ident = String::new();
        while !self.is_at_end()
            && (self.current_char().is_alphanumeric() || self.current_char() == '_')
        {
            ident.push(self.advance());
        }

        let kind = self
            .keywords
            .get(ident.as_str())
            .cloned()
            .unwrap_or(TokenKind::Identifier(ident));
        self.emit_token(kind, start);
    }

    fn handle_operator_or_delimiter(&mut self) -> Result<(), TokenizeError> {
        let start = self.current_position();
        let ch = self.advance();
        let next = self.current_char();

        let (kind, consume_next) = match (ch, next) {
            ('*', '*') => (TokenKind::DoubleStar, true),
            ('/', '/') => (TokenKind::DoubleSlash, true),
            ('=', '=') => (TokenKind::EqualEqual, true),
            ('!', '=') => (TokenKind::NotEqual, true),
            ('<', '=') => (TokenKind::LessEqual, true),
            ('>', '=') => (TokenKind::GreaterEqual, true),
            ('+', '=') => (TokenKind::PlusEqual, true),
            ('-', '=') => (TokenKind::MinusEqual, true),
            ('*', '=') => (TokenKind::StarEqual, true),
            ('/', '=') => (TokenKind::SlashEqual, true),
            ('+', _) => (TokenKind::Plus, false),
            ('-', _) => (TokenKind::Minus, false),
            ('*', _) => (TokenKind::Star, false),
            ('/', _) => (TokenKind::Slash, false),
            ('%', _) => (TokenKind::Percent, false),
            ('=', _) => (TokenKind::Equal, false),
            ('<', _) => (TokenKind::Less, false),
            ('>', _) => (TokenKind::Greater, false),
            ('(', _) => (TokenKind::LeftParen, false),
            (')', _) => (TokenKind::RightParen, false),
            ('[', _) => (TokenKind::LeftBracket, false),
            (']', _) => (TokenKind::RightBracket, false),
            ('{', _) => (TokenKind::LeftBrace, false),
            ('}', _) => (TokenKind::RightBrace, false),
            (',', _) => (TokenKind::Comma, false),
            (':', _) => (TokenKind::Colon, false),
            ('.', _) => (TokenKind::Dot, false),
            (other, _) => {
                return Err(self.error(format!("invalid character '{}'", other), start));
            }
        };
        if consume_next {
            self.advance();
        }

        match kind {
            TokenKind::LeftParen | TokenKind::LeftBracket | TokenKind::LeftBrace => {
                self.bracket_depth += 1;
                self.open_brackets.push((ch, start));
            }
            TokenKind::RightParen | TokenKind::RightBracket | TokenKind::RightBrace => {
                if self.bracket_depth == 0 {
                    return Err(self.error(format!("unmatched '{}'", ch), start));
                }
                self.bracket_depth -= 1;
                self.open_brackets.pop();
            }
            _ => {}
        }

        self.emit_token(kind, start);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Tokenizer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_block_structure() {
        let tokens = kinds("if x:\n    y = 1\nz = 2\n");
        assert_eq!(
            tokens,
            vec![
                TokenKind::If,
                TokenKind::Identifier("x".into()),
                TokenKind::Colon,
                TokenKind::Newline,
                TokenKind::Indent,
                TokenKind::Identifier("y".into()),
                TokenKind::Equal,
                TokenKind::Integer(1),
                TokenKind::Newline,
                TokenKind::Dedent,
                TokenKind::Identifier("z".into()),
                TokenKind::Equal,
                TokenKind::Integer(2),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_brackets_join_lines() {
        let tokens = kinds("x = [1,\n     2]\n");
        assert!(!tokens[..tokens.len() - 2].contains(&TokenKind::Newline));
        assert!(!tokens.contains(&TokenKind::Indent));
    }

    #[test]
    fn test_positions_follow_lines() {
        let tokens = Tokenizer::new("a = 1\n\n# note\nb = 2").tokenize().unwrap();
        let b = tokens
            .iter()
            .find(|t| t.kind == TokenKind::Identifier("b".into()))
            .unwrap();
        assert_eq!(b.position.line, 4);
        assert_eq!(b.position.column, 1);
    }

    #[test]
    fn test_numbers_and_strings() {
        let tokens = kinds("1e-3 2.5 7 'it\\'s' \"x\"");
        assert_eq!(tokens[0], TokenKind::Float(1e-3));
        assert_eq!(tokens[1], TokenKind::Float(2.5));
        assert_eq!(tokens[2], TokenKind::Integer(7));
        assert_eq!(tokens[3], TokenKind::String("it's".into()));
        assert_eq!(tokens[4], TokenKind::String("x".into()));
    }

    #[test]
    fn test_unterminated_string_reports_line() {
        let err = Tokenizer::new("a = 1\nb = 'oops\n").tokenize().unwrap_err();
        assert_eq!(err.position.line, 2);
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn test_unclosed_bracket_reports_opening_line() {
        let err = Tokenizer::new("x = 1\ny = (2 +\n").tokenize().unwrap_err();
        assert_eq!(err.position.line, 2);
        assert_eq!(err.message, "'(' was never closed");
    }

    #[test]
    fn test_bad_dedent() {
        let err = Tokenizer::new("if a:\n        b\n    c\n").tokenize().unwrap_err();
        assert_eq!(err.position.line, 3);
    }
}
