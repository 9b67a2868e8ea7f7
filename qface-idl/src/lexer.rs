//! Tokenizer for QFace documents.

/// Kind of a lexed token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Int(i64),
    /// Reals keep their source text so versions like `1.0` survive untouched.
    Real(String),
    Str(String),
    /// Content of a `/** ... */` comment with the comment markers stripped.
    DocComment(String),
    Punct(char),
    Eof,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(s) => format!("'{}'", s),
            TokenKind::Int(n) => format!("'{}'", n),
            TokenKind::Real(s) => format!("'{}'", s),
            TokenKind::Str(s) => format!("\"{}\"", s),
            TokenKind::DocComment(_) => "documentation comment".to_string(),
            TokenKind::Punct(c) => format!("'{}'", c),
            TokenKind::Eof => "end of file".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

/// Lexing failure with a 1-based position.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

const PUNCTUATION: &[char] = &[
    '{', '}', '(', ')', '<', '>', '[', ']', ';', ',', '=', '@', ':', '.', '#', '-',
];

pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    /// Tokenize the whole input. The returned stream always ends with [`TokenKind::Eof`].
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>, line: usize, column: usize) -> LexError {
        LexError {
            message: message.into(),
            line,
            column,
        }
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        loop {
            let line = self.line;
            let column = self.column;
            let Some(&c) = self.chars.peek() else {
                return Ok(Token {
                    kind: TokenKind::Eof,
                    line,
                    column,
                });
            };

            let kind = if c.is_whitespace() {
                self.bump();
                continue;
            } else if c == '/' {
                self.bump();
                match self.chars.peek() {
                    Some('/') => {
                        while let Some(&c) = self.chars.peek() {
                            if c == '\n' {
                                break;
                            }
                            self.bump();
                        }
                        continue;
                    }
                    Some('*') => {
                        self.bump();
                        let is_doc = self.chars.peek() == Some(&'*');
                        let body = self.block_comment(line, column)?;
                        if is_doc && !body.is_empty() {
                            TokenKind::DocComment(clean_doc_comment(&body))
                        } else {
                            continue;
                        }
                    }
                    _ => return Err(self.error("unexpected character '/'", line, column)),
                }
            } else if c == '"' {
                self.bump();
                TokenKind::Str(self.string(line, column)?)
            } else if c.is_ascii_digit() {
                self.number(line, column)?
            } else if c.is_alphabetic() || c == '_' {
                let mut ident = String::new();
                while let Some(&c) = self.chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        ident.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
                TokenKind::Ident(ident)
            } else if PUNCTUATION.contains(&c) {
                self.bump();
                TokenKind::Punct(c)
            } else {
                return Err(self.error(format!("unexpected character '{}'", c), line, column));
            };

            return Ok(Token { kind, line, column });
        }
    }

    /// Consume a `/* ... */` body (opening marker already consumed).
    fn block_comment(&mut self, line: usize, column: usize) -> Result<String, LexError> {
        let mut body = String::new();
        while let Some(c) = self.bump() {
            if c == '*' && self.chars.peek() == Some(&'/') {
                self.bump();
                return Ok(body);
            }
            body.push(c);
        }
        Err(self.error("unterminated comment", line, column))
    }

    fn string(&mut self, line: usize, column: usize) -> Result<String, LexError> {
        let mut value = String::new();
        while let Some(c) = self.bump() {
            match c {
                '"' => return Ok(value),
                '\\' => match self.bump() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some(other) => value.push(other),
                    None => break,
                },
                '\n' => break,
                other => value.push(other),
            }
        }
        Err(self.error("unterminated string literal", line, column))
    }

    fn number(&mut self, line: usize, column: usize) -> Result<TokenKind, LexError> {
        let mut text = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_alphanumeric() {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }

        if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            return i64::from_str_radix(hex, 16)
                .map(TokenKind::Int)
                .map_err(|_| self.error(format!("invalid hex literal '{}'", text), line, column));
        }

        if self.chars.peek() == Some(&'.') {
            let mut lookahead = self.chars.clone();
            lookahead.next();
            if lookahead.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
                text.push('.');
                while let Some(&c) = self.chars.peek() {
                    if c.is_ascii_digit() {
                        text.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
                return Ok(TokenKind::Real(text));
            }
        }

        text.parse::<i64>()
            .map(TokenKind::Int)
            .map_err(|_| self.error(format!("invalid number '{}'", text), line, column))
    }
}

/// Strip the leading `*` gutter of a doc comment and trim surrounding blank lines.
fn clean_doc_comment(body: &str) -> String {
    let body = body.strip_prefix('*').unwrap_or(body);
    body.lines()
        .map(|line| {
            let trimmed = line.trim();
            trimmed
                .strip_prefix("* ")
                .or_else(|| trimmed.strip_prefix('*'))
                .unwrap_or(trimmed)
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_module_header() {
        assert_eq!(
            kinds("module a.b 1.0;"),
            vec![
                TokenKind::Ident("module".into()),
                TokenKind::Ident("a".into()),
                TokenKind::Punct('.'),
                TokenKind::Ident("b".into()),
                TokenKind::Real("1.0".into()),
                TokenKind::Punct(';'),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments() {
        assert_eq!(
            kinds("// line\n/* block */ /** Doc\n * more */ x"),
            vec![
                TokenKind::DocComment("Doc\nmore".into()),
                TokenKind::Ident("x".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("0x10 42"),
            vec![TokenKind::Int(16), TokenKind::Int(42), TokenKind::Eof]
        );
    }

    #[test]
    fn test_positions() {
        let tokens = Lexer::new("a\n  b").tokenize().unwrap();
        assert_eq!((tokens[1].line, tokens[1].column), (2, 3));
    }

    #[test]
    fn test_unterminated_string() {
        let err = Lexer::new("\"abc").tokenize().unwrap_err();
        assert_eq!(err.message, "unterminated string literal");
        assert_eq!((err.line, err.column), (1, 1));
    }
}
