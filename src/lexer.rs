use crate::diagnostic::Diagnostic;
use crate::lexeme::Lexeme;
use crate::span::{Span, Spanned};

const MAX_STRING_LEN: usize = 1024;

/// Scans a single source file into a token stream.
///
/// Mirrors the original line-oriented recognizer's error surface (§4.1,
/// §7) without its line-queue implementation detail: we operate over the
/// whole byte buffer but preserve every documented error message and the
/// rule that the stream keeps flowing — one bad literal never desyncs the
/// rest of the file.
pub struct Lexer<'src> {
    source: &'src [u8],
    file_id: u16,
    pos: usize,
    line: u32,
    diagnostics: Vec<Diagnostic>,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str, file_id: u16) -> Self {
        Self {
            source: source.as_bytes(),
            file_id,
            pos: 0,
            line: 1,
            diagnostics: Vec::new(),
        }
    }

    pub fn tokenize(mut self) -> (Vec<Spanned<Lexeme>>, Vec<Diagnostic>) {
        let mut tokens = Vec::new();
        loop {
            match self.next_token() {
                Some(tok) => {
                    let is_eof = matches!(tok.node, Lexeme::Eof);
                    tokens.push(tok);
                    if is_eof {
                        break;
                    }
                }
                None => continue,
            }
        }
        (tokens, self.diagnostics)
    }

    fn peek(&self) -> u8 {
        *self.source.get(self.pos).unwrap_or(&0)
    }

    fn peek_at(&self, offset: usize) -> u8 {
        *self.source.get(self.pos + offset).unwrap_or(&0)
    }

    fn bump(&mut self) -> u8 {
        let c = self.peek();
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
        }
        c
    }

    fn at_eof(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn make_span(&self, start: usize) -> Span {
        Span::new(self.file_id, start as u32, self.pos as u32)
    }

    fn error(&mut self, msg: impl Into<String>, start: usize) {
        self.diagnostics
            .push(Diagnostic::error(msg.into(), self.make_span(start)));
    }

    /// Produces the next token, skipping whitespace and comments. Returns
    /// `Some(Eof)` exactly once, at the end of input.
    fn next_token(&mut self) -> Option<Spanned<Lexeme>> {
        loop {
            self.skip_whitespace();

            if self.at_eof() {
                let span = self.make_span(self.pos);
                return Some(Spanned::new(Lexeme::Eof, span));
            }

            let start = self.pos;

            if self.peek() == b'-' && self.peek_at(1) == b'-' {
                while !self.at_eof() && self.peek() != b'\n' {
                    self.bump();
                }
                continue;
            }

            if self.peek() == b'(' && self.peek_at(1) == b'*' {
                self.bump();
                self.bump();
                self.skip_block_comment(start);
                continue;
            }

            if self.peek() == b'*' && self.peek_at(1) == b')' {
                self.bump();
                self.bump();
                self.error("unmatched '*)'", start);
                continue;
            }

            if self.peek() == b'"' {
                return Some(self.scan_string(start));
            }

            if self.peek().is_ascii_digit() {
                return Some(self.scan_integer(start));
            }

            if self.peek().is_ascii_alphabetic() || self.peek() == b'_' {
                return Some(self.scan_ident(start));
            }

            return self.scan_symbol(start);
        }
    }

    fn skip_whitespace(&mut self) {
        while !self.at_eof() && self.peek().is_ascii_whitespace() {
            self.bump();
        }
    }

    fn skip_block_comment(&mut self, start: usize) {
        let mut depth = 1u32;
        while depth > 0 {
            if self.at_eof() {
                self.error("EOF in comment", start);
                return;
            }
            if self.peek() == b'(' && self.peek_at(1) == b'*' {
                self.bump();
                self.bump();
                depth += 1;
            } else if self.peek() == b'*' && self.peek_at(1) == b')' {
                self.bump();
                self.bump();
                depth -= 1;
            } else {
                self.bump();
            }
        }
    }

    fn scan_string(&mut self, start: usize) -> Spanned<Lexeme> {
        self.bump(); // opening quote
        let mut value = String::new();
        let mut errored = false;

        loop {
            if self.at_eof() {
                if !errored {
                    self.error("EOF in string constant", start);
                    errored = true;
                }
                break;
            }

            let c = self.peek();

            if c == b'"' {
                self.bump();
                break;
            }

            if c == b'\n' {
                if !errored {
                    self.error("unterminated string constant", start);
                    errored = true;
                }
                break;
            }

            if c == 0 {
                if !errored {
                    self.error("string contains null character", start);
                    errored = true;
                }
                self.bump();
                continue;
            }

            if c == b'\\' {
                self.bump();
                if self.at_eof() {
                    if !errored {
                        self.error("EOF in string constant", start);
                        errored = true;
                    }
                    break;
                }
                let esc = self.bump();
                match esc {
                    0 => {
                        if !errored {
                            self.error("string contains escaped null character", start);
                            errored = true;
                        }
                    }
                    b'n' => value.push('\n'),
                    b'b' => value.push('\u{8}'),
                    b't' => value.push('\t'),
                    b'f' => value.push('\u{c}'),
                    b'\\' => value.push('\\'),
                    b'\n' => value.push('\n'),
                    other => value.push(other as char),
                }
            } else {
                value.push(self.bump() as char);
            }

            if value.len() >= MAX_STRING_LEN && !errored {
                self.error("string constant too long", start);
                errored = true;
            }
        }

        let span = self.make_span(start);
        Spanned::new(Lexeme::StringLit(value), span)
    }

    fn scan_integer(&mut self, start: usize) -> Spanned<Lexeme> {
        while !self.at_eof() && self.peek().is_ascii_digit() {
            self.bump();
        }
        let text = std::str::from_utf8(&self.source[start..self.pos]).unwrap_or("0");
        let span = self.make_span(start);
        match text.parse::<u64>() {
            Ok(n) => Spanned::new(Lexeme::Integer(n), span),
            Err(_) => {
                self.error("integer literal too large", start);
                Spanned::new(Lexeme::Integer(0), span)
            }
        }
    }

    fn scan_ident(&mut self, start: usize) -> Spanned<Lexeme> {
        while !self.at_eof() && (self.peek().is_ascii_alphanumeric() || self.peek() == b'_') {
            self.bump();
        }
        let text = std::str::from_utf8(&self.source[start..self.pos])
            .unwrap_or("")
            .to_string();
        let span = self.make_span(start);

        if let Some(kw) = Lexeme::from_keyword(&text) {
            return Spanned::new(kw, span);
        }
        if text == "true" {
            return Spanned::new(Lexeme::BoolLit(true), span);
        }
        if text == "false" {
            return Spanned::new(Lexeme::BoolLit(false), span);
        }

        let first = text.as_bytes()[0];
        if first.is_ascii_uppercase() {
            Spanned::new(Lexeme::TypeId(text), span)
        } else {
            Spanned::new(Lexeme::ObjectId(text), span)
        }
    }

    fn scan_symbol(&mut self, start: usize) -> Option<Spanned<Lexeme>> {
        let c = self.bump();
        let lex = match c {
            b':' => Lexeme::Colon,
            b';' => Lexeme::Semi,
            b',' => Lexeme::Comma,
            b'.' => Lexeme::Dot,
            b'@' => Lexeme::At,
            b'(' => Lexeme::LParen,
            b')' => Lexeme::RParen,
            b'{' => Lexeme::LBrace,
            b'}' => Lexeme::RBrace,
            b'+' => Lexeme::Plus,
            b'-' => Lexeme::Minus,
            b'*' => Lexeme::Star,
            b'/' => Lexeme::Slash,
            b'~' => Lexeme::Tilde,
            b'=' => {
                if self.peek() == b'>' {
                    self.bump();
                    Lexeme::Arrow
                } else {
                    Lexeme::Eq
                }
            }
            b'<' => {
                if self.peek() == b'-' {
                    self.bump();
                    Lexeme::Assign
                } else if self.peek() == b'=' {
                    self.bump();
                    Lexeme::Le
                } else {
                    Lexeme::Lt
                }
            }
            other => {
                self.error(format!("unexpected character '{}'", other as char), start);
                return None;
            }
        };
        let span = self.make_span(start);
        Some(Spanned::new(lex, span))
    }
}
