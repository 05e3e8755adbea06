//! Tokenizer for sandbox scripts.

use super::SyntaxError;

/// Punctuators, longest first so that greedy matching works.
const PUNCTUATORS: &[&str] = &[
    "===", "!==", "...", "=>", "==", "!=", "<=", ">=", "&&", "||", "??", "+=", "-=", "*=", "/=",
    "?.", "++", "--", "{", "}", "(", ")", "[", "]", ";", ",", ".", ":", "?", "+", "-", "*", "/",
    "%", "!", "<", ">", "=",
];

/// Words that end an expression when they precede a `/`.
const EXPRESSION_KEYWORDS: &[&str] = &["this", "true", "false", "null", "undefined"];

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Text(String),
    /// Source of a `${...}` substitution
    Expr(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Str(String),
    Template(Vec<TemplatePart>),
    Regex { pattern: String, flags: String },
    Ident(String),
    Punct(&'static str),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

impl Token {
    pub fn is_punct(&self, punct: &str) -> bool {
        matches!(&self.kind, TokenKind::Punct(p) if *p == punct)
    }

    pub fn is_ident(&self, word: &str) -> bool {
        matches!(&self.kind, TokenKind::Ident(w) if w == word)
    }
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    tokens: Vec<Token>,
}

/// Splits `source` into tokens, ending with [`TokenKind::Eof`].
pub fn tokenize(source: &str) -> Result<Vec<Token>, SyntaxError> {
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
        tokens: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

impl Lexer {
    fn run(&mut self) -> Result<(), SyntaxError> {
        while let Some(c) = self.peek(0) {
            match c {
                '\n' => {
                    self.line += 1;
                    self.pos += 1;
                }
                c if c.is_whitespace() => self.pos += 1,
                '/' if self.peek(1) == Some('/') => self.skip_line_comment(),
                '/' if self.peek(1) == Some('*') => self.skip_block_comment()?,
                '/' if self.regex_allowed() => self.read_regex()?,
                '"' | '\'' => self.read_string(c)?,
                '`' => self.read_template()?,
                c if c.is_ascii_digit() => self.read_number()?,
                '.' if self.peek(1).map_or(false, |n| n.is_ascii_digit()) => self.read_number()?,
                c if is_ident_start(c) => self.read_ident(),
                _ => self.read_punct()?,
            }
        }
        self.push(TokenKind::Eof);
        Ok(())
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn push(&mut self, kind: TokenKind) {
        self.tokens.push(Token {
            kind,
            line: self.line,
        });
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError {
            message: message.into(),
            line: self.line,
        }
    }

    /// A `/` starts a regex unless the previous token ends an expression.
    fn regex_allowed(&self) -> bool {
        match self.tokens.last().map(|t| &t.kind) {
            None => true,
            Some(TokenKind::Number(_))
            | Some(TokenKind::Str(_))
            | Some(TokenKind::Template(_))
            | Some(TokenKind::Regex { .. }) => false,
            Some(TokenKind::Ident(word)) => {
                is_keyword(word) && !EXPRESSION_KEYWORDS.contains(&word.as_str())
            }
            Some(TokenKind::Punct(p)) => !matches!(*p, ")" | "]" | "}" | "++" | "--"),
            Some(TokenKind::Eof) => false,
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek(0) {
            if c == '\n' {
                break;
            }
            self.pos += 1;
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), SyntaxError> {
        self.pos += 2;
        loop {
            match self.peek(0) {
                None => return Err(self.error("Unterminated comment")),
                Some('*') if self.peek(1) == Some('/') => {
                    self.pos += 2;
                    return Ok(());
                }
                Some(c) => {
                    if c == '\n' {
                        self.line += 1;
                    }
                    self.pos += 1;
                }
            }
        }
    }

    fn read_escape(&mut self) -> Result<char, SyntaxError> {
        let c = self
            .peek(0)
            .ok_or_else(|| self.error("Unterminated escape sequence"))?;
        self.pos += 1;
        Ok(match c {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            'b' => '\u{8}',
            'f' => '\u{c}',
            'v' => '\u{b}',
            '0' => '\0',
            'u' => {
                let hex: String = (0..4).filter_map(|i| self.peek(i)).collect();
                let code = u32::from_str_radix(&hex, 16)
                    .ok()
                    .filter(|_| hex.len() == 4)
                    .ok_or_else(|| self.error("Invalid Unicode escape sequence"))?;
                self.pos += 4;
                char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER)
            }
            other => other,
        })
    }

    fn read_string(&mut self, quote: char) -> Result<(), SyntaxError> {
        self.pos += 1;
        let mut value = String::new();
        loop {
            match self.peek(0) {
                None | Some('\n') => return Err(self.error("Unterminated string literal")),
                Some(c) if c == quote => {
                    self.pos += 1;
                    break;
                }
                Some('\\') => {
                    self.pos += 1;
                    value.push(self.read_escape()?);
                }
                Some(c) => {
                    value.push(c);
                    self.pos += 1;
                }
            }
        }
        self.push(TokenKind::Str(value));
        Ok(())
    }

    fn read_template(&mut self) -> Result<(), SyntaxError> {
        let start_line = self.line;
        self.pos += 1;
        let mut parts = Vec::new();
        let mut text = String::new();
        loop {
            match self.peek(0) {
                None => return Err(self.error("Unterminated template literal")),
                Some('`') => {
                    self.pos += 1;
                    break;
                }
                Some('\\') => {
                    self.pos += 1;
                    text.push(self.read_escape()?);
                }
                Some('$') if self.peek(1) == Some('{') => {
                    self.pos += 2;
                    if !text.is_empty() {
                        parts.push(TemplatePart::Text(std::mem::take(&mut text)));
                    }
                    parts.push(TemplatePart::Expr(self.read_substitution()?));
                }
                Some(c) => {
                    if c == '\n' {
                        self.line += 1;
                    }
                    text.push(c);
                    self.pos += 1;
                }
            }
        }
        if !text.is_empty() {
            parts.push(TemplatePart::Text(text));
        }
        self.tokens.push(Token {
            kind: TokenKind::Template(parts),
            line: start_line,
        });
        Ok(())
    }

    /// Reads the source of a `${...}` substitution up to its closing brace.
    fn read_substitution(&mut self) -> Result<String, SyntaxError> {
        let mut depth = 0usize;
        let mut source = String::new();
        let mut quote: Option<char> = None;
        loop {
            let c = self
                .peek(0)
                .ok_or_else(|| self.error("Unterminated template substitution"))?;
            self.pos += 1;
            match quote {
                Some(q) => {
                    if c == '\\' {
                        source.push(c);
                        if let Some(next) = self.peek(0) {
                            source.push(next);
                            self.pos += 1;
                        }
                        continue;
                    }
                    if c == q {
                        quote = None;
                    }
                }
                None => match c {
                    '"' | '\'' | '`' => quote = Some(c),
                    '{' => depth += 1,
                    '}' if depth == 0 => return Ok(source),
                    '}' => depth -= 1,
                    '\n' => self.line += 1,
                    _ => {}
                },
            }
            source.push(c);
        }
    }

    fn read_number(&mut self) -> Result<(), SyntaxError> {
        let start = self.pos;
        if self.peek(0) == Some('0') && matches!(self.peek(1), Some('x') | Some('X')) {
            self.pos += 2;
            while self.peek(0).map_or(false, |c| c.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            let digits: String = self.chars[start + 2..self.pos].iter().collect();
            let value = i64::from_str_radix(&digits, 16)
                .map_err(|_| self.error("Invalid hexadecimal literal"))?;
            self.push(TokenKind::Number(value as f64));
            return Ok(());
        }

        while self.peek(0).map_or(false, |c| c.is_ascii_digit() || c == '_') {
            self.pos += 1;
        }
        if self.peek(0) == Some('.') && self.peek(1).map_or(true, |c| !is_ident_start(c)) {
            self.pos += 1;
            while self.peek(0).map_or(false, |c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(0), Some('e') | Some('E')) {
            let sign = usize::from(matches!(self.peek(1), Some('+') | Some('-')));
            if self.peek(1 + sign).map_or(false, |c| c.is_ascii_digit()) {
                self.pos += 1 + sign;
                while self.peek(0).map_or(false, |c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
        }

        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        let value: f64 = text
            .parse()
            .map_err(|_| self.error(format!("Invalid number literal: {}", text)))?;
        self.push(TokenKind::Number(value));
        Ok(())
    }

    fn read_ident(&mut self) {
        let start = self.pos;
        while self.peek(0).map_or(false, is_ident_part) {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        self.push(TokenKind::Ident(word));
    }

    fn read_regex(&mut self) -> Result<(), SyntaxError> {
        self.pos += 1;
        let mut pattern = String::new();
        let mut in_class = false;
        loop {
            match self.peek(0) {
                None | Some('\n') => return Err(self.error("Unterminated regular expression")),
                Some('\\') => {
                    pattern.push('\\');
                    self.pos += 1;
                    if let Some(c) = self.peek(0) {
                        pattern.push(c);
                        self.pos += 1;
                    }
                }
                Some('/') if !in_class => {
                    self.pos += 1;
                    break;
                }
                Some(c) => {
                    if c == '[' {
                        in_class = true;
                    } else if c == ']' {
                        in_class = false;
                    }
                    pattern.push(c);
                    self.pos += 1;
                }
            }
        }
        let mut flags = String::new();
        while let Some(c) = self.peek(0).filter(|c| c.is_ascii_alphabetic()) {
            flags.push(c);
            self.pos += 1;
        }
        self.push(TokenKind::Regex { pattern, flags });
        Ok(())
    }

    fn read_punct(&mut self) -> Result<(), SyntaxError> {
        let rest: String = self.chars[self.pos..].iter().take(3).collect();
        let punct = PUNCTUATORS
            .iter()
            .find(|p| rest.starts_with(**p))
            .ok_or_else(|| {
                self.error(format!(
                    "Unexpected character '{}'",
                    rest.chars().next().unwrap_or(' ')
                ))
            })?;
        self.pos += punct.chars().count();
        self.push(TokenKind::Punct(*punct));
        Ok(())
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Reserved words the parser treats specially.
pub fn is_keyword(word: &str) -> bool {
    matches!(
        word,
        "const"
            | "let"
            | "var"
            | "function"
            | "return"
            | "if"
            | "else"
            | "throw"
            | "typeof"
            | "new"
            | "true"
            | "false"
            | "null"
            | "undefined"
            | "this"
            | "in"
            | "of"
            | "instanceof"
            | "void"
            | "delete"
            | "case"
            | "do"
    )
}
