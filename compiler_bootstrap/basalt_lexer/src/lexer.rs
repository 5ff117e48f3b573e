//! Lexer implementation

use crate::{Token, TokenKind};
use basalt_common::{BasaltError, BasaltResult, Diagnostics, Position, Span};
use unicode_xid::UnicodeXID;

/// Lexer for the Basalt language.
///
/// Operates over the raw bytes of the input and tracks a 1-based
/// line/column position alongside the byte offset. Diagnostics go into the
/// explicitly threaded context shared by the whole pipeline.
pub struct Lexer<'a, 'd> {
    input: &'a str,
    file: String,
    offset: usize,
    pos: Position,
    diagnostics: &'d mut Diagnostics,
}

impl<'a, 'd> Lexer<'a, 'd> {
    pub fn new(input: &'a str, file: impl Into<String>, diagnostics: &'d mut Diagnostics) -> Self {
        Self {
            input,
            file: file.into(),
            offset: 0,
            pos: Position::start(),
            diagnostics,
        }
    }

    pub fn is_eof(&self) -> bool {
        self.offset >= self.input.len()
    }

    fn peek(&self) -> Option<char> {
        self.input[self.offset..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.input[self.offset..].chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.offset += c.len_utf8();

        if c == '\n' {
            self.pos.line += 1;
            self.pos.column = 1;
        } else {
            self.pos.column += 1;
        }

        Some(c)
    }

    fn fatal(&mut self, message: impl Into<String>, at: Position) -> BasaltError {
        self.diagnostics
            .fatal(BasaltError::lex(message.into()), &self.file, Span::single(at))
    }

    /// Skip whitespace and comments. Returns an error for an unterminated
    /// block comment.
    fn skip_trivia(&mut self) -> BasaltResult<()> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }

                Some('/') if self.peek_second() == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }

                        self.bump();
                    }
                }

                Some('/') if self.peek_second() == Some('*') => {
                    let start = self.pos;
                    self.bump();
                    self.bump();

                    loop {
                        match self.peek() {
                            Some('*') if self.peek_second() == Some('/') => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            Some(_) => {
                                self.bump();
                            }
                            None => return Err(self.fatal("unterminated block comment", start)),
                        }
                    }
                }

                _ => return Ok(()),
            }
        }
    }

    fn lex_identifier(&mut self, start: Position) -> Token {
        let begin = self.offset;
        while let Some(c) = self.peek() {
            if c.is_xid_continue() || c == '_' {
                self.bump();
            } else {
                break;
            }
        }

        Token::new(TokenKind::Identifier, &self.input[begin..self.offset], start)
    }

    fn lex_number(&mut self, start: Position) -> Token {
        let begin = self.offset;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }

        // A '.' followed by a digit turns the literal into a float; a lone
        // '.' is left for member access.
        let mut kind = TokenKind::Integer;
        if self.peek() == Some('.') && matches!(self.peek_second(), Some(c) if c.is_ascii_digit()) {
            kind = TokenKind::Float;
            self.bump();

            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.bump();
            }
        }

        Token::new(kind, &self.input[begin..self.offset], start)
    }

    fn lex_escape(&mut self, start: Position) -> BasaltResult<char> {
        match self.bump() {
            Some('n') => Ok('\n'),
            Some('t') => Ok('\t'),
            Some('r') => Ok('\r'),
            Some('0') => Ok('\0'),
            Some('\\') => Ok('\\'),
            Some('\'') => Ok('\''),
            Some('"') => Ok('"'),
            Some(c) => Err(self.fatal(format!("unknown escape sequence '\\{}'", c), start)),
            None => Err(self.fatal("unterminated escape sequence", start)),
        }
    }

    fn lex_string(&mut self, start: Position) -> BasaltResult<Token> {
        self.bump(); // opening '"'

        let mut value = String::new();
        loop {
            match self.peek() {
                Some('"') => {
                    self.bump();
                    return Ok(Token::new(TokenKind::String, value, start));
                }
                Some('\\') => {
                    self.bump();
                    value.push(self.lex_escape(start)?);
                }
                Some('\n') | None => {
                    return Err(self.fatal("unterminated string literal", start));
                }
                Some(c) => {
                    value.push(c);
                    self.bump();
                }
            }
        }
    }

    fn lex_char(&mut self, start: Position) -> BasaltResult<Token> {
        self.bump(); // opening '\''

        let value = match self.peek() {
            Some('\\') => {
                self.bump();
                self.lex_escape(start)?
            }
            Some('\'') | Some('\n') | None => {
                return Err(self.fatal("empty or unterminated character literal", start));
            }
            Some(c) => {
                self.bump();
                c
            }
        };

        if self.peek() != Some('\'') {
            return Err(self.fatal("unterminated character literal", start));
        }

        self.bump(); // closing '\''
        Ok(Token::new(TokenKind::Char, value.to_string(), start))
    }

    fn lex_rune(&mut self, start: Position) -> BasaltResult<Token> {
        self.bump(); // '$'

        match self.peek() {
            Some(c) if c.is_xid_start() || c == '_' => {}
            _ => return Err(self.fatal("expected rune name after '$'", start)),
        }

        let ident = self.lex_identifier(start);
        Ok(Token::new(TokenKind::Rune, ident.value, start))
    }

    /// Consume one character and, if the following character is `next`,
    /// consume it too and produce `paired` instead of `single`.
    fn lex_pair(&mut self, next: char, paired: TokenKind, single: TokenKind, start: Position) -> Token {
        self.bump();
        if self.peek() == Some(next) {
            self.bump();
            Token::new(paired, paired.spelling(), start)
        } else {
            Token::new(single, single.spelling(), start)
        }
    }

    /// Lex the next token from the input.
    pub fn lex(&mut self) -> BasaltResult<Token> {
        self.skip_trivia()?;

        let start = self.pos;
        let c = match self.peek() {
            Some(c) => c,
            None => return Ok(Token::eof(start)),
        };

        if c.is_xid_start() || c == '_' {
            return Ok(self.lex_identifier(start));
        }

        if c.is_ascii_digit() {
            return Ok(self.lex_number(start));
        }

        let simple = |kind: TokenKind| Token::new(kind, kind.spelling(), start);

        match c {
            '"' => self.lex_string(start),
            '\'' => self.lex_char(start),
            '$' => self.lex_rune(start),

            '(' => { self.bump(); Ok(simple(TokenKind::OpenParen)) }
            ')' => { self.bump(); Ok(simple(TokenKind::CloseParen)) }
            '{' => { self.bump(); Ok(simple(TokenKind::OpenBrace)) }
            '}' => { self.bump(); Ok(simple(TokenKind::CloseBrace)) }
            '[' => { self.bump(); Ok(simple(TokenKind::OpenBrack)) }
            ']' => { self.bump(); Ok(simple(TokenKind::CloseBrack)) }
            ',' => { self.bump(); Ok(simple(TokenKind::Comma)) }
            ';' => { self.bump(); Ok(simple(TokenKind::Semicolon)) }
            '.' => { self.bump(); Ok(simple(TokenKind::Dot)) }
            '+' => { self.bump(); Ok(simple(TokenKind::Plus)) }
            '*' => { self.bump(); Ok(simple(TokenKind::Star)) }
            '/' => { self.bump(); Ok(simple(TokenKind::Slash)) }
            '%' => { self.bump(); Ok(simple(TokenKind::Percent)) }
            '^' => { self.bump(); Ok(simple(TokenKind::Caret)) }
            '~' => { self.bump(); Ok(simple(TokenKind::Tilde)) }

            ':' => Ok(self.lex_pair(':', TokenKind::Path, TokenKind::Colon, start)),
            '=' => Ok(self.lex_pair('=', TokenKind::EqEq, TokenKind::Eq, start)),
            '!' => Ok(self.lex_pair('=', TokenKind::BangEq, TokenKind::Bang, start)),
            '<' => {
                self.bump();
                match self.peek() {
                    Some('=') => { self.bump(); Ok(simple(TokenKind::LtEq)) }
                    Some('<') => { self.bump(); Ok(simple(TokenKind::LtLt)) }
                    _ => Ok(simple(TokenKind::Lt)),
                }
            }
            '>' => {
                self.bump();
                match self.peek() {
                    Some('=') => { self.bump(); Ok(simple(TokenKind::GtEq)) }
                    Some('>') => { self.bump(); Ok(simple(TokenKind::GtGt)) }
                    _ => Ok(simple(TokenKind::Gt)),
                }
            }
            '&' => Ok(self.lex_pair('&', TokenKind::AmpAmp, TokenKind::Amp, start)),
            '|' => Ok(self.lex_pair('|', TokenKind::PipePipe, TokenKind::Pipe, start)),
            '-' => {
                self.bump();
                if self.peek() == Some('>') {
                    self.bump();
                    Ok(simple(TokenKind::Arrow))
                } else {
                    Ok(simple(TokenKind::Minus))
                }
            }

            _ => Err(self.fatal(format!("invalid character '{}'", c), start)),
        }
    }

    /// Lex the whole input into a token list, ending with an Eof token.
    pub fn tokenize(mut self) -> BasaltResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.lex()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);

            if done {
                break;
            }
        }

        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lex_all(source: &str) -> Vec<Token> {
        let mut diagnostics = Diagnostics::new();
        Lexer::new(source, "test.bas", &mut diagnostics)
            .tokenize()
            .expect("lex failed")
    }

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex_all(source).into_iter().map(|t| t.kind).collect()
    }

    fn lex_err(source: &str) -> bool {
        let mut diagnostics = Diagnostics::new();
        let failed = Lexer::new(source, "test.bas", &mut diagnostics).tokenize().is_err();
        failed && diagnostics.has_errors()
    }

    #[test]
    fn lexes_binding_definition() {
        use TokenKind::*;

        assert_eq!(
            kinds("main :: () -> s64 { ret 0; }"),
            vec![
                Identifier, Path, OpenParen, CloseParen, Arrow, Identifier, OpenBrace,
                Identifier, Integer, Semicolon, CloseBrace, Eof,
            ]
        );
    }

    #[test]
    fn lexes_operators_greedily() {
        use TokenKind::*;

        assert_eq!(
            kinds("a <= b << c && d != e"),
            vec![Identifier, LtEq, Identifier, LtLt, Identifier, AmpAmp, Identifier, BangEq, Identifier, Eof]
        );
    }

    #[test]
    fn distinguishes_float_from_member_access() {
        let tokens = lex_all("3.5 x.y");
        assert_eq!(tokens[0].kind, TokenKind::Float);
        assert_eq!(tokens[0].value, "3.5");
        assert_eq!(tokens[2].kind, TokenKind::Dot);
    }

    #[test]
    fn lexes_rune_decorator() {
        let tokens = lex_all("$public main");
        assert_eq!(tokens[0].kind, TokenKind::Rune);
        assert_eq!(tokens[0].value, "public");
    }

    #[test]
    fn string_escapes() {
        let tokens = lex_all(r#""a\n\t\"b""#);
        assert_eq!(tokens[0].value, "a\n\t\"b");
    }

    #[test]
    fn tracks_positions_across_lines() {
        let tokens = lex_all("a\n  b");
        assert_eq!(tokens[0].loc, basalt_common::Position::new(1, 1));
        assert_eq!(tokens[1].loc, basalt_common::Position::new(2, 3));
    }

    #[test]
    fn unterminated_string_is_fatal() {
        assert!(lex_err("\"abc"));
    }

    #[test]
    fn invalid_character_is_fatal() {
        assert!(lex_err("let x = @;"));
    }

    #[test]
    fn comments_are_trivia() {
        use TokenKind::*;

        assert_eq!(
            kinds("a // line\n /* block\n comment */ b"),
            vec![Identifier, Identifier, Eof]
        );
    }
}
