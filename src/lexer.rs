//! Total, single-pass lexer: SQL source string -> flat token sequence.
//!
//! No regex-based recognition happens here or above: keyword recognition is
//! an exact, case-insensitive comparison against the closed MariaDB reserved
//! word set. The lexer never fails outright — malformed input becomes a
//! single `TokenKind::Error` token that the parser turns into a `SyntaxError`.

use std::collections::HashSet;
use std::sync::OnceLock;

use crate::token::{Span, Token, TokenKind};

/// The closed, case-insensitive MariaDB reserved word set recognised by the
/// `mariadb` dialect. `reserved_word_policy.dialect` in `TranslateOptions`
/// selects between this and the (identical, for our purposes) Oracle-mode
/// set; MariaDB's Oracle mode adds a handful of PL/SQL words we do not lower
/// differently, so both policies currently share this table.
static RESERVED_WORDS: OnceLock<HashSet<&'static str>> = OnceLock::new();

fn reserved_words() -> &'static HashSet<&'static str> {
    RESERVED_WORDS.get_or_init(|| {
        [
            "SELECT", "FROM", "WHERE", "AND", "OR", "NOT", "IN", "IS", "NULL", "LIKE", "RLIKE",
            "REGEXP", "BETWEEN", "EXISTS", "JOIN", "INNER", "LEFT", "RIGHT", "FULL", "OUTER",
            "CROSS", "ON", "USING", "GROUP", "BY", "HAVING", "ORDER", "ASC", "DESC", "LIMIT",
            "OFFSET", "DISTINCT", "ALL", "AS", "CASE", "WHEN", "THEN", "ELSE", "END", "WITH",
            "RECURSIVE", "INSERT", "INTO", "VALUES", "UPDATE", "SET", "DELETE", "CREATE", "TABLE",
            "DROP", "ALTER", "INDEX", "VIEW", "UNION", "INTERSECT", "EXCEPT", "EXTRACT", "CAST",
            "INTERVAL", "YEAR", "QUARTER", "MONTH", "WEEK", "DAY", "HOUR", "MINUTE", "SECOND",
            "MICROSECOND", "TRUE", "FALSE", "DEFAULT", "PRIMARY", "KEY", "FOREIGN", "REFERENCES",
            "UNIQUE", "CONSTRAINT", "CHECK", "DATABASE", "SCHEMA", "SEPARATOR", "OVER",
            "PARTITION", "ROWS", "RANGE", "UNBOUNDED", "PRECEDING", "FOLLOWING", "CURRENT", "ROW",
            "FIRST", "LAST", "BINARY", "COLLATE", "ESCAPE", "FOR",
        ]
        .into_iter()
        .collect()
    })
}

pub fn is_reserved_word(word: &str) -> bool {
    reserved_words().contains(word.to_ascii_uppercase().as_str())
}

pub struct Lexer<'a> {
    src: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            chars: src.char_indices().collect(),
            pos: 0,
        }
    }

    /// Lex the entire source into a flat token stream. Whitespace and
    /// comments are recognised and then discarded; they never reach the
    /// returned vector. Always terminated with a single `Eof` token.
    pub fn lex(src: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(src);
        let mut tokens = Vec::new();
        while let Some(tok) = lexer.next_token() {
            tokens.push(tok);
        }
        let end = src.len();
        tokens.push(Token::new(TokenKind::Eof, Span::new(end, end)));
        tokens
    }

    fn peek_char(&self) -> Option<char> {
        self.chars.get(self.pos).map(|&(_, c)| c)
    }

    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).map(|&(_, c)| c)
    }

    fn byte_offset(&self, idx: usize) -> usize {
        self.chars
            .get(idx)
            .map(|&(b, _)| b)
            .unwrap_or(self.src.len())
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek_char();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    /// Returns the next significant token, skipping whitespace and comments,
    /// or `None` at end of input.
    fn next_token(&mut self) -> Option<Token> {
        loop {
            let c = self.peek_char()?;
            if c.is_whitespace() {
                self.skip_whitespace();
                continue;
            }
            if c == '-' && self.peek_char_at(1) == Some('-') {
                self.skip_line_comment();
                continue;
            }
            if c == '/' && self.peek_char_at(1) == Some('*') {
                self.skip_block_comment();
                continue;
            }
            break;
        }
        let start_idx = self.pos;
        let start = self.byte_offset(start_idx);
        let c = self.peek_char()?;

        let kind = if c == '`' {
            self.lex_backtick()
        } else if c == '\'' || c == '"' {
            self.lex_string(c)
        } else if c.is_ascii_digit() {
            self.lex_number()
        } else if c.is_alphabetic() || c == '_' {
            self.lex_word()
        } else {
            self.lex_operator_or_punct()
        };

        let end = self.byte_offset(self.pos);
        Some(Token::new(kind, Span::new(start, end)))
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek_char() {
            self.advance();
            if c == '\n' {
                break;
            }
        }
    }

    fn skip_block_comment(&mut self) {
        self.advance(); // '/'
        self.advance(); // '*'
        loop {
            match self.peek_char() {
                None => break,
                Some('*') if self.peek_char_at(1) == Some('/') => {
                    self.advance();
                    self.advance();
                    break;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn lex_backtick(&mut self) -> TokenKind {
        self.advance(); // opening backtick
        let mut content = String::new();
        loop {
            match self.advance() {
                None => return TokenKind::Error("unterminated backtick identifier".into()),
                Some('`') => break,
                Some(c) => content.push(c),
            }
        }
        TokenKind::Backtick(content)
    }

    fn lex_string(&mut self, quote: char) -> TokenKind {
        self.advance(); // opening quote
        let mut content = String::new();
        loop {
            match self.advance() {
                None => return TokenKind::Error("unterminated string literal".into()),
                Some(c) if c == quote => {
                    // doubled quote is an escaped literal quote
                    if self.peek_char() == Some(quote) {
                        self.advance();
                        content.push(quote);
                    } else {
                        break;
                    }
                }
                Some('\\') => match self.advance() {
                    Some('n') => content.push('\n'),
                    Some('t') => content.push('\t'),
                    Some('r') => content.push('\r'),
                    Some(other) => content.push(other),
                    None => return TokenKind::Error("unterminated string literal".into()),
                },
                Some(c) => content.push(c),
            }
        }
        TokenKind::Str(content)
    }

    fn lex_number(&mut self) -> TokenKind {
        let start = self.pos;
        let mut is_float = false;
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                self.advance();
            } else if c == '.' && !is_float {
                is_float = true;
                self.advance();
            } else if (c == 'e' || c == 'E')
                && matches!(self.peek_char_at(1), Some(c2) if c2.is_ascii_digit() || c2 == '+' || c2 == '-')
            {
                is_float = true;
                self.advance();
                self.advance();
            } else {
                break;
            }
        }
        let text: String = self.chars[start..self.pos].iter().map(|&(_, c)| c).collect();
        if is_float {
            match text.parse::<f64>() {
                Ok(v) => TokenKind::Float(v),
                Err(_) => TokenKind::Error(format!("invalid numeric literal `{text}`")),
            }
        } else {
            match text.parse::<i64>() {
                Ok(v) => TokenKind::Integer(v),
                Err(_) => match text.parse::<f64>() {
                    Ok(v) => TokenKind::Float(v),
                    Err(_) => TokenKind::Error(format!("invalid numeric literal `{text}`")),
                },
            }
        }
    }

    fn lex_word(&mut self) -> TokenKind {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if c.is_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
        let text: String = self.chars[start..self.pos].iter().map(|&(_, c)| c).collect();
        let upper = text.to_ascii_uppercase();
        if is_reserved_word(&upper) {
            TokenKind::Keyword(upper)
        } else {
            TokenKind::Name(text)
        }
    }

    fn lex_operator_or_punct(&mut self) -> TokenKind {
        let c = self.advance().expect("checked by caller");
        let two = |this: &mut Self, second: char, op: &str| -> Option<TokenKind> {
            if this.peek_char() == Some(second) {
                this.advance();
                Some(TokenKind::Operator(op.to_string()))
            } else {
                None
            }
        };

        match c {
            '<' => two(self, '=', "<=")
                .or_else(|| two(self, '>', "<>"))
                .unwrap_or(TokenKind::Operator("<".into())),
            '>' => two(self, '=', ">=").unwrap_or(TokenKind::Operator(">".into())),
            '!' => two(self, '=', "!=").unwrap_or(TokenKind::Error("unexpected `!`".into())),
            '|' => two(self, '|', "||").unwrap_or(TokenKind::Operator("|".into())),
            ':' => two(self, '=', ":=").unwrap_or(TokenKind::Error("unexpected `:`".into())),
            '&' => TokenKind::Operator("&".into()),
            '~' => TokenKind::Operator("~".into()),
            '=' | '+' | '-' | '/' | '%' | '?' => TokenKind::Operator(c.to_string()),
            ',' | '(' | ')' | '.' | ';' | '*' => TokenKind::Punct(c),
            other => TokenKind::Error(format!("unexpected character `{other}`")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::lex(src).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_simple_select() {
        let k = kinds("SELECT a FROM t");
        assert_eq!(
            k,
            vec![
                TokenKind::Keyword("SELECT".into()),
                TokenKind::Name("a".into()),
                TokenKind::Keyword("FROM".into()),
                TokenKind::Name("t".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn keyword_recognition_is_case_insensitive() {
        let k = kinds("select * from t");
        assert_eq!(k[0], TokenKind::Keyword("SELECT".into()));
        assert_eq!(k[3], TokenKind::Keyword("FROM".into()));
    }

    #[test]
    fn discards_comments_and_whitespace() {
        let k = kinds("SELECT 1 -- trailing comment\n /* block */ FROM t");
        assert_eq!(
            k,
            vec![
                TokenKind::Keyword("SELECT".into()),
                TokenKind::Integer(1),
                TokenKind::Keyword("FROM".into()),
                TokenKind::Name("t".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn backtick_identifier_is_verbatim() {
        let k = kinds("SELECT `select` FROM t");
        assert_eq!(k[1], TokenKind::Backtick("select".into()));
    }

    #[test]
    fn string_literal_handles_doubled_quote_escape() {
        let k = kinds("'it''s'");
        assert_eq!(k[0], TokenKind::Str("it's".into()));
    }

    #[test]
    fn multi_char_operators_are_greedy() {
        let k = kinds("a <= b <> c");
        assert_eq!(k[1], TokenKind::Operator("<=".into()));
        assert_eq!(k[3], TokenKind::Operator("<>".into()));
    }

    #[test]
    fn malformed_input_becomes_error_token_not_panic() {
        let k = kinds("'unterminated");
        assert!(matches!(k[0], TokenKind::Error(_)));
    }

    #[test]
    fn float_and_exponential_literals() {
        let k = kinds("1.5 2e10 3.2e-3");
        assert_eq!(k[0], TokenKind::Float(1.5));
        assert_eq!(k[1], TokenKind::Float(2e10));
        assert_eq!(k[2], TokenKind::Float(3.2e-3));
    }
}
