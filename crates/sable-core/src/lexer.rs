//! Source text to token stream.
//!
//! Operator recognition is maximal-munch: two-character operators are tried
//! before their one-character prefixes. The stream always ends with an
//! explicit Eof token carrying the final position.

use std::fmt;

use crate::token::{Token, TokenKind};
use crate::value::Value;

/// Lexical error with the position of the offending character.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl LexError {
    fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LexerException at {}:{}: {}",
            self.line, self.column, self.message
        )
    }
}

impl std::error::Error for LexError {}

pub struct Lexer {
    source: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    /// Scan the whole source, producing a token list terminated by Eof.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();

        while !self.is_at_end() {
            let ch = self.peek();
            match ch {
                ' ' | '\t' | '\r' => {
                    self.advance();
                }
                '\n' => {
                    self.advance();
                    self.line += 1;
                    self.col = 1;
                }
                '(' => tokens.push(self.single(TokenKind::LParen, "(")),
                ')' => tokens.push(self.single(TokenKind::RParen, ")")),
                '[' => tokens.push(self.single(TokenKind::LBracket, "[")),
                ']' => tokens.push(self.single(TokenKind::RBracket, "]")),
                '{' => tokens.push(self.single(TokenKind::LBrace, "{")),
                '}' => tokens.push(self.single(TokenKind::RBrace, "}")),
                ',' => tokens.push(self.single(TokenKind::Comma, ",")),
                ':' => tokens.push(self.single(TokenKind::Colon, ":")),
                '.' => tokens.push(self.single(TokenKind::Dot, ".")),
                '+' => tokens.push(self.single(TokenKind::Plus, "+")),
                '-' => tokens.push(self.single(TokenKind::Minus, "-")),
                '/' => tokens.push(self.single(TokenKind::Divide, "/")),
                '%' => tokens.push(self.single(TokenKind::Modulo, "%")),
                '*' => {
                    if self.peek_at(1) == '*' {
                        tokens.push(self.double(TokenKind::Power, "**"));
                    } else {
                        tokens.push(self.single(TokenKind::Multiply, "*"));
                    }
                }
                '?' => {
                    if self.peek_at(1) == '.' {
                        tokens.push(self.double(TokenKind::QuestionDot, "?."));
                    } else {
                        tokens.push(self.single(TokenKind::Question, "?"));
                    }
                }
                '|' => {
                    if self.peek_at(1) == '|' {
                        tokens.push(self.double(TokenKind::Or, "||"));
                    } else {
                        tokens.push(self.single(TokenKind::Pipe, "|"));
                    }
                }
                '&' => {
                    if self.peek_at(1) == '&' {
                        tokens.push(self.double(TokenKind::And, "&&"));
                    } else {
                        return Err(self.error("unexpected character '&'"));
                    }
                }
                '!' => {
                    if self.peek_at(1) == '=' {
                        tokens.push(self.double(TokenKind::NotEqual, "!="));
                    } else {
                        tokens.push(self.single(TokenKind::Not, "!"));
                    }
                }
                '=' => {
                    if self.peek_at(1) == '=' {
                        tokens.push(self.double(TokenKind::Equal, "=="));
                    } else if self.peek_at(1) == '>' {
                        tokens.push(self.double(TokenKind::Arrow, "=>"));
                    } else {
                        return Err(self.error("unexpected character '=', use '==' for equality"));
                    }
                }
                '<' => {
                    if self.peek_at(1) == '=' {
                        tokens.push(self.double(TokenKind::Le, "<="));
                    } else {
                        tokens.push(self.single(TokenKind::Lt, "<"));
                    }
                }
                '>' => {
                    if self.peek_at(1) == '=' {
                        tokens.push(self.double(TokenKind::Ge, ">="));
                    } else {
                        tokens.push(self.single(TokenKind::Gt, ">"));
                    }
                }
                '$' => {
                    if self.peek_at(1) == '{' {
                        tokens.push(self.double(TokenKind::DollarBrace, "${"));
                    } else {
                        tokens.push(self.lex_identifier());
                    }
                }
                '"' | '\'' => tokens.push(self.lex_string()?),
                c if c.is_ascii_digit() => tokens.push(self.lex_number()?),
                c if c.is_alphabetic() || c == '_' => tokens.push(self.lex_identifier()),
                c => return Err(self.error(format!("unexpected character '{c}'"))),
            }
        }

        tokens.push(Token::new(TokenKind::Eof, "", self.line, self.col));
        Ok(tokens)
    }

    fn lex_string(&mut self) -> Result<Token, LexError> {
        let line = self.line;
        let col = self.col;
        let quote = self.peek();
        let mut lexeme = String::new();
        lexeme.push(quote);
        self.advance();

        let mut text = String::new();
        loop {
            if self.is_at_end() {
                return Err(LexError::new(line, col, "unterminated string"));
            }
            let ch = self.peek();
            if ch == quote {
                lexeme.push(quote);
                self.advance();
                break;
            }
            if ch == '\\' {
                lexeme.push(ch);
                self.advance();
                if self.is_at_end() {
                    return Err(LexError::new(line, col, "unterminated string"));
                }
                let escaped = self.peek();
                lexeme.push(escaped);
                self.advance();
                match escaped {
                    'n' => text.push('\n'),
                    't' => text.push('\t'),
                    'r' => text.push('\r'),
                    '\\' => text.push('\\'),
                    '"' => text.push('"'),
                    '\'' => text.push('\''),
                    other => text.push(other),
                }
                continue;
            }
            if ch == '\n' {
                self.line += 1;
                self.col = 1;
                self.pos += 1;
                lexeme.push(ch);
                text.push(ch);
                continue;
            }
            lexeme.push(ch);
            text.push(ch);
            self.advance();
        }

        Ok(Token::with_literal(
            TokenKind::String,
            lexeme,
            Value::from(text),
            line,
            col,
        ))
    }

    fn lex_number(&mut self) -> Result<Token, LexError> {
        let line = self.line;
        let col = self.col;
        let mut lexeme = String::new();
        let mut is_float = false;

        while self.peek().is_ascii_digit() {
            lexeme.push(self.peek());
            self.advance();
        }
        if self.peek() == '.' && self.peek_at(1).is_ascii_digit() {
            is_float = true;
            lexeme.push('.');
            self.advance();
            while self.peek().is_ascii_digit() {
                lexeme.push(self.peek());
                self.advance();
            }
        }
        if self.peek() == 'e' || self.peek() == 'E' {
            is_float = true;
            lexeme.push(self.peek());
            self.advance();
            if self.peek() == '+' || self.peek() == '-' {
                lexeme.push(self.peek());
                self.advance();
            }
            if !self.peek().is_ascii_digit() {
                return Err(LexError::new(line, col, format!("malformed number '{lexeme}'")));
            }
            while self.peek().is_ascii_digit() {
                lexeme.push(self.peek());
                self.advance();
            }
        }

        let literal = if is_float {
            let parsed: f64 = lexeme
                .parse()
                .map_err(|_| LexError::new(line, col, format!("malformed number '{lexeme}'")))?;
            Value::Float(parsed)
        } else {
            // Digits-only literals narrow to Integer when they fit.
            match lexeme.parse::<i64>() {
                Ok(i) => Value::Int(i),
                Err(_) => {
                    let parsed: f64 = lexeme.parse().map_err(|_| {
                        LexError::new(line, col, format!("malformed number '{lexeme}'"))
                    })?;
                    Value::Float(parsed)
                }
            }
        };

        Ok(Token::with_literal(
            TokenKind::Number,
            lexeme,
            literal,
            line,
            col,
        ))
    }

    fn lex_identifier(&mut self) -> Token {
        let line = self.line;
        let col = self.col;
        let mut lexeme = String::new();

        while !self.is_at_end() {
            let ch = self.peek();
            if ch.is_alphanumeric() || ch == '_' || ch == '$' {
                lexeme.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        match lexeme.as_str() {
            "true" => Token::with_literal(TokenKind::Boolean, lexeme, Value::Bool(true), line, col),
            "false" => {
                Token::with_literal(TokenKind::Boolean, lexeme, Value::Bool(false), line, col)
            }
            "null" => Token::new(TokenKind::Null, lexeme, line, col),
            "and" => Token::new(TokenKind::And, lexeme, line, col),
            "or" => Token::new(TokenKind::Or, lexeme, line, col),
            "not" => Token::new(TokenKind::Not, lexeme, line, col),
            _ => Token::new(TokenKind::Identifier, lexeme, line, col),
        }
    }

    fn single(&mut self, kind: TokenKind, lexeme: &str) -> Token {
        let tok = Token::new(kind, lexeme, self.line, self.col);
        self.advance();
        tok
    }

    fn double(&mut self, kind: TokenKind, lexeme: &str) -> Token {
        let tok = Token::new(kind, lexeme, self.line, self.col);
        self.advance();
        self.advance();
        tok
    }

    fn error(&self, message: impl Into<String>) -> LexError {
        LexError::new(self.line, self.col, message)
    }

    fn peek(&self) -> char {
        self.source.get(self.pos).copied().unwrap_or('\0')
    }

    fn peek_at(&self, offset: usize) -> char {
        self.source.get(self.pos + offset).copied().unwrap_or('\0')
    }

    fn advance(&mut self) {
        self.pos += 1;
        self.col += 1;
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.source.len()
    }
}

/// Convenience wrapper over [`Lexer::tokenize`].
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .expect("tokenize")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn stream_ends_with_eof() {
        assert_eq!(kinds(""), vec![TokenKind::Eof]);
        assert_eq!(kinds("1"), vec![TokenKind::Number, TokenKind::Eof]);
    }

    #[test]
    fn maximal_munch_two_char_operators() {
        assert_eq!(
            kinds("** ?. || && != == => <= >= ${"),
            vec![
                TokenKind::Power,
                TokenKind::QuestionDot,
                TokenKind::Or,
                TokenKind::And,
                TokenKind::NotEqual,
                TokenKind::Equal,
                TokenKind::Arrow,
                TokenKind::Le,
                TokenKind::Ge,
                TokenKind::DollarBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn single_pipe_is_pipe_not_or() {
        assert_eq!(
            kinds("a | b"),
            vec![
                TokenKind::Identifier,
                TokenKind::Pipe,
                TokenKind::Identifier,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn bare_ampersand_is_rejected() {
        let err = tokenize("a & b").expect_err("bare '&' must fail");
        assert_eq!(err.column, 3);
        assert!(err.message.contains('&'));
    }

    #[test]
    fn bare_equal_is_rejected() {
        let err = tokenize("a = b").expect_err("bare '=' must fail");
        assert!(err.to_string().starts_with("LexerException at 1:3:"));
    }

    #[test]
    fn number_literals_narrow_to_int_when_lossless() {
        let tokens = tokenize("42 3.5 1e3 2E-2").expect("tokenize");
        assert_eq!(tokens[0].literal, Some(Value::Int(42)));
        assert_eq!(tokens[1].literal, Some(Value::Float(3.5)));
        assert_eq!(tokens[2].literal, Some(Value::Float(1000.0)));
        assert_eq!(tokens[3].literal, Some(Value::Float(0.02)));
    }

    #[test]
    fn dot_after_number_without_digits_is_member_access() {
        assert_eq!(
            kinds("1.foo"),
            vec![
                TokenKind::Number,
                TokenKind::Dot,
                TokenKind::Identifier,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn exponent_without_digits_is_malformed() {
        let err = tokenize("1e").expect_err("dangling exponent must fail");
        assert!(err.message.contains("malformed number"));
    }

    #[test]
    fn strings_accept_both_quotes_and_escapes() {
        let tokens = tokenize(r#""a\n\"b" 'c\'d' "pass\qthrough""#).expect("tokenize");
        assert_eq!(tokens[0].literal, Some(Value::from("a\n\"b")));
        assert_eq!(tokens[1].literal, Some(Value::from("c'd")));
        assert_eq!(tokens[2].literal, Some(Value::from("passqthrough")));
    }

    #[test]
    fn newline_inside_string_advances_line_counter() {
        let tokens = tokenize("\"a\nb\" x").expect("tokenize");
        assert_eq!(tokens[0].literal, Some(Value::from("a\nb")));
        assert_eq!(tokens[1].line, 2);
    }

    #[test]
    fn unterminated_string_reports_opening_position() {
        let err = tokenize("  \"abc").expect_err("unterminated string must fail");
        assert_eq!((err.line, err.column), (1, 3));
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn keywords_shadow_identifier_form() {
        let tokens = tokenize("true false null and or not trueish").expect("tokenize");
        assert_eq!(tokens[0].kind, TokenKind::Boolean);
        assert_eq!(tokens[0].literal, Some(Value::Bool(true)));
        assert_eq!(tokens[1].literal, Some(Value::Bool(false)));
        assert_eq!(tokens[2].kind, TokenKind::Null);
        assert_eq!(tokens[3].kind, TokenKind::And);
        assert_eq!(tokens[4].kind, TokenKind::Or);
        assert_eq!(tokens[5].kind, TokenKind::Not);
        assert_eq!(tokens[6].kind, TokenKind::Identifier);
    }

    #[test]
    fn dollar_identifiers_and_interpolation_open() {
        let tokens = tokenize("$x ${y}").expect("tokenize");
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[0].lexeme, "$x");
        assert_eq!(tokens[1].kind, TokenKind::DollarBrace);
    }

    #[test]
    fn positions_track_lines_and_columns() {
        let tokens = tokenize("a\n  b").expect("tokenize");
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (2, 3));
    }
}
