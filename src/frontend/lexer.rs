use crate::frontend::token::{Span, Token, TokenKind, lookup_ident};

/// Pull-based tokenizer.
///
/// The lexer never fails: characters it does not understand and
/// unterminated strings come out as `TokenKind::Illegal` tokens and are
/// reported by the parser. Once input is exhausted every call to
/// `next_token` returns an `Eof` token.
pub struct Lexer {
    source: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
    finished: bool,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            source: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
            finished: false,
        }
    }

    fn current(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.current();
        if ch == Some('\n') {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        self.pos += 1;
        ch
    }

    fn span(&self) -> Span {
        Span {
            line: self.line,
            col: self.col,
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(ch) = self.current() {
            if ch.is_ascii_whitespace() {
                self.advance();
            } else if ch == '/' && self.peek() == Some('/') {
                while let Some(ch) = self.current() {
                    if ch == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else {
                break;
            }
        }
    }

    fn read_string(&mut self, span: Span) -> Token {
        self.advance(); // opening quote

        let mut string = String::new();
        loop {
            match self.current() {
                Some('"') => {
                    self.advance();
                    return Token::new(TokenKind::String, string, span);
                }
                Some('\\') => {
                    self.advance();
                    match self.current() {
                        Some('n') => string.push('\n'),
                        Some('t') => string.push('\t'),
                        Some('r') => string.push('\r'),
                        Some('\\') => string.push('\\'),
                        Some('"') => string.push('"'),
                        // anything else keeps its backslash
                        Some(ch) => {
                            string.push('\\');
                            string.push(ch);
                        }
                        None => {
                            return Token::new(TokenKind::Illegal, format!("\"{}\\", string), span);
                        }
                    }
                    self.advance();
                }
                Some(ch) => {
                    string.push(ch);
                    self.advance();
                }
                None => {
                    return Token::new(TokenKind::Illegal, format!("\"{}", string), span);
                }
            }
        }
    }

    fn read_while(&mut self, accept: impl Fn(char) -> bool) -> String {
        let mut text = String::new();
        while let Some(ch) = self.current() {
            if !accept(ch) {
                break;
            }
            text.push(ch);
            self.advance();
        }
        text
    }

    /// Scans and returns the next token.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();
        let span = self.span();

        let Some(ch) = self.current() else {
            return Token::new(TokenKind::Eof, "", span);
        };

        if ch == '"' {
            return self.read_string(span);
        }
        if is_letter(ch) {
            let ident = self.read_while(|c| is_letter(c) || c.is_ascii_digit());
            return Token::new(lookup_ident(&ident), ident, span);
        }
        if ch.is_ascii_digit() {
            let digits = self.read_while(|c| c.is_ascii_digit());
            return Token::new(TokenKind::Int, digits, span);
        }

        let two_char = match (ch, self.peek()) {
            ('=', Some('=')) => Some(TokenKind::Eq),
            ('!', Some('=')) => Some(TokenKind::NotEq),
            _ => None,
        };
        if let Some(kind) = two_char {
            self.advance();
            self.advance();
            return Token::new(kind, format!("{}=", ch), span);
        }

        let kind = match ch {
            '=' => TokenKind::Assign,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '!' => TokenKind::Bang,
            '*' => TokenKind::Asterisk,
            '/' => TokenKind::Slash,
            '<' => TokenKind::Lt,
            '>' => TokenKind::Gt,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            ':' => TokenKind::Colon,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            _ => TokenKind::Illegal,
        };
        self.advance();
        Token::new(kind, ch.to_string(), span)
    }

    /// Collects every token up to and including `Eof`.
    pub fn tokenize(&mut self) -> Vec<Token> {
        self.by_ref().collect()
    }
}

impl Iterator for Lexer {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.finished {
            return None;
        }
        let token = self.next_token();
        if token.kind == TokenKind::Eof {
            self.finished = true;
        }
        Some(token)
    }
}

fn is_letter(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source).tokenize().into_iter().map(|t| t.kind).collect()
    }

    fn tokens(source: &str) -> Vec<(TokenKind, String)> {
        Lexer::new(source)
            .tokenize()
            .into_iter()
            .map(|t| (t.kind, t.literal))
            .collect()
    }

    #[test]
    fn test_let_and_function() {
        let t = tokens("let add = fn(x, y) { x + y; };");
        let expected = vec![
            (TokenKind::Let, "let"),
            (TokenKind::Ident, "add"),
            (TokenKind::Assign, "="),
            (TokenKind::Function, "fn"),
            (TokenKind::LParen, "("),
            (TokenKind::Ident, "x"),
            (TokenKind::Comma, ","),
            (TokenKind::Ident, "y"),
            (TokenKind::RParen, ")"),
            (TokenKind::LBrace, "{"),
            (TokenKind::Ident, "x"),
            (TokenKind::Plus, "+"),
            (TokenKind::Ident, "y"),
            (TokenKind::Semicolon, ";"),
            (TokenKind::RBrace, "}"),
            (TokenKind::Semicolon, ";"),
            (TokenKind::Eof, ""),
        ];
        let expected: Vec<(TokenKind, String)> = expected
            .into_iter()
            .map(|(k, l)| (k, l.to_string()))
            .collect();
        assert_eq!(t, expected);
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("!-/*5; 5 < 10 > 5; 10 == 10; 10 != 9;"),
            vec![
                TokenKind::Bang,
                TokenKind::Minus,
                TokenKind::Slash,
                TokenKind::Asterisk,
                TokenKind::Int,
                TokenKind::Semicolon,
                TokenKind::Int,
                TokenKind::Lt,
                TokenKind::Int,
                TokenKind::Gt,
                TokenKind::Int,
                TokenKind::Semicolon,
                TokenKind::Int,
                TokenKind::Eq,
                TokenKind::Int,
                TokenKind::Semicolon,
                TokenKind::Int,
                TokenKind::NotEq,
                TokenKind::Int,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_collections() {
        assert_eq!(
            kinds(r#"[1, 2]; {"foo": "bar"}"#),
            vec![
                TokenKind::LBracket,
                TokenKind::Int,
                TokenKind::Comma,
                TokenKind::Int,
                TokenKind::RBracket,
                TokenKind::Semicolon,
                TokenKind::LBrace,
                TokenKind::String,
                TokenKind::Colon,
                TokenKind::String,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_strings_and_escapes() {
        let t = tokens(r#""foo bar" "a\n\"b\"""#);
        assert_eq!(t[0], (TokenKind::String, "foo bar".to_string()));
        assert_eq!(t[1], (TokenKind::String, "a\n\"b\"".to_string()));
    }

    #[test]
    fn test_unknown_escape_kept_literally() {
        let t = tokens(r#""C:\path" "a\qb\\""#);
        assert_eq!(t[0], (TokenKind::String, "C:\\path".to_string()));
        assert_eq!(t[1], (TokenKind::String, "a\\qb\\".to_string()));
    }

    #[test]
    fn test_unterminated_string_is_illegal() {
        let t = tokens(r#""open"#);
        assert_eq!(t[0].0, TokenKind::Illegal);
        assert_eq!(t[1].0, TokenKind::Eof);
    }

    #[test]
    fn test_unknown_character_is_illegal() {
        let t = tokens("1 @ 2");
        assert_eq!(t[1], (TokenKind::Illegal, "@".to_string()));
        assert_eq!(t[2], (TokenKind::Int, "2".to_string()));
    }

    #[test]
    fn test_comments_skipped() {
        assert_eq!(
            kinds("1 // one\n// nothing here\n2"),
            vec![TokenKind::Int, TokenKind::Int, TokenKind::Eof]
        );
    }

    #[test]
    fn test_spans() {
        let tokens = Lexer::new("let x\n  = 5").tokenize();
        assert_eq!(tokens[0].span, Span { line: 1, col: 1 });
        assert_eq!(tokens[1].span, Span { line: 1, col: 5 });
        assert_eq!(tokens[2].span, Span { line: 2, col: 3 });
    }

    #[test]
    fn test_eof_repeats() {
        let mut lexer = Lexer::new("");
        assert_eq!(lexer.next_token().kind, TokenKind::Eof);
        assert_eq!(lexer.next_token().kind, TokenKind::Eof);
    }
}
