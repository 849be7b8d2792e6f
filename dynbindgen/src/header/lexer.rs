//! Tokenizer for the supported C header subset.
//!
//! Comments, preprocessor lines (with `\` continuations) and whitespace are
//! dropped. Keywords are returned as identifiers; the parser tells them apart.

use crate::header::ParseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Ident(String),
    Int(i64),
    Str(String),
    /// `<<`
    Shl,
    /// `...`
    Ellipsis,
    Punct(char),
    Eof,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Ident(name) => write!(f, "`{name}`"),
            TokenKind::Int(value) => write!(f, "`{value}`"),
            TokenKind::Str(text) => write!(f, "\"{text}\""),
            TokenKind::Shl => write!(f, "`<<`"),
            TokenKind::Ellipsis => write!(f, "`...`"),
            TokenKind::Punct(c) => write!(f, "`{c}`"),
            TokenKind::Eof => write!(f, "end of input"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

struct Cursor<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
    /// Only whitespace seen since the last newline
    line_start: bool,
}

impl Cursor<'_> {
    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
            self.line_start = true;
        } else {
            self.column += 1;
            if !c.is_whitespace() {
                self.line_start = false;
            }
        }
        Some(c)
    }

    fn skip_line(&mut self) {
        while let Some(c) = self.bump() {
            match c {
                '\\' if self.peek() == Some('\n') => {
                    self.bump();
                }
                '\n' => break,
                _ => {}
            }
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), ParseError> {
        let (line, column) = (self.line, self.column);
        let mut star = false;
        while let Some(c) = self.bump() {
            if star && c == '/' {
                return Ok(());
            }
            star = c == '*';
        }
        Err(ParseError::new(line, column, "unterminated comment"))
    }

    fn number(&mut self, first: char) -> Result<i64, ParseError> {
        let (line, column) = (self.line, self.column - 1);
        let mut text = String::from(first);
        while let Some(c) = self.peek().filter(|c| c.is_ascii_alphanumeric()) {
            text.push(c);
            self.bump();
        }
        let digits = text.trim_end_matches(['u', 'U', 'l', 'L']);
        let parsed = if let Some(hex) = digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
        {
            u64::from_str_radix(hex, 16)
        } else if digits.len() > 1 && digits.starts_with('0') {
            u64::from_str_radix(&digits[1..], 8)
        } else {
            digits.parse::<u64>()
        };
        parsed
            .map(|value| value as i64)
            .map_err(|_| ParseError::new(line, column, format!("invalid integer literal `{text}`")))
    }

    fn char_literal(&mut self) -> Result<i64, ParseError> {
        let (line, column) = (self.line, self.column - 1);
        let value = match self.bump() {
            Some('\\') => match self.bump() {
                Some('n') => '\n' as i64,
                Some('t') => '\t' as i64,
                Some('r') => '\r' as i64,
                Some('0') => 0,
                Some(c) => c as i64,
                None => return Err(ParseError::new(line, column, "unterminated character literal")),
            },
            Some(c) if c != '\'' => c as i64,
            _ => return Err(ParseError::new(line, column, "empty character literal")),
        };
        match self.bump() {
            Some('\'') => Ok(value),
            _ => Err(ParseError::new(line, column, "unterminated character literal")),
        }
    }

    fn string_literal(&mut self) -> Result<String, ParseError> {
        let (line, column) = (self.line, self.column - 1);
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(text),
                Some('\\') => {
                    if let Some(c) = self.bump() {
                        text.push(c);
                    }
                }
                Some('\n') | None => {
                    return Err(ParseError::new(line, column, "unterminated string literal"))
                }
                Some(c) => text.push(c),
            }
        }
    }
}

/// Split header text into tokens. The last token is always [`TokenKind::Eof`].
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    let mut cursor = Cursor {
        chars: source.chars().peekable(),
        line: 1,
        column: 1,
        line_start: true,
    };
    let mut tokens = Vec::new();

    while let Some(c) = cursor.peek() {
        if c.is_whitespace() {
            cursor.bump();
            continue;
        }
        if c == '#' && cursor.line_start {
            cursor.skip_line();
            continue;
        }
        let (line, column) = (cursor.line, cursor.column);
        cursor.bump();
        let kind = match c {
            '/' if cursor.peek() == Some('/') => {
                cursor.skip_line();
                continue;
            }
            '/' if cursor.peek() == Some('*') => {
                cursor.bump();
                cursor.skip_block_comment()?;
                continue;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = String::from(c);
                while let Some(c) = cursor.peek().filter(|c| c.is_ascii_alphanumeric() || *c == '_') {
                    name.push(c);
                    cursor.bump();
                }
                TokenKind::Ident(name)
            }
            c if c.is_ascii_digit() => TokenKind::Int(cursor.number(c)?),
            '\'' => TokenKind::Int(cursor.char_literal()?),
            '"' => TokenKind::Str(cursor.string_literal()?),
            '<' if cursor.peek() == Some('<') => {
                cursor.bump();
                TokenKind::Shl
            }
            '.' if cursor.peek() == Some('.') => {
                cursor.bump();
                if cursor.bump() != Some('.') {
                    return Err(ParseError::new(line, column, "expected `...`"));
                }
                TokenKind::Ellipsis
            }
            '{' | '}' | '(' | ')' | '[' | ']' | ';' | ',' | '*' | '=' | ':' | '-' | '+' | '|'
            | '~' | '&' => TokenKind::Punct(c),
            other => {
                return Err(ParseError::new(
                    line,
                    column,
                    format!("unexpected character `{other}`"),
                ))
            }
        };
        tokens.push(Token { kind, line, column });
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        line: cursor.line,
        column: cursor.column,
    });
    Ok(tokens)
}
