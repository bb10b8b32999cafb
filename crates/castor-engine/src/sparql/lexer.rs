//! SPARQL lexer.

/// Kind of a lexed token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// `<iri>`
    Iri(String),
    /// `prefix:local` (either part may be empty)
    PrefixedName(String, String),
    /// `?name` or `$name`
    Var(String),
    /// `_:label`
    BlankNode(String),
    /// Anonymous blank node `[]`
    Anon,
    /// Quoted string with escapes resolved
    StringLit(String),
    /// `@tag`
    LangTag(String),
    /// Integer literal
    Integer(String),
    /// Decimal literal (`1.5`)
    Decimal(String),
    /// Double literal (`1e3`, `1.5e-3`)
    Double(String),
    /// Bare keyword, uppercased
    Keyword(String),
    /// `a` (rdf:type shorthand)
    A,
    LBrace,
    RBrace,
    LParen,
    RParen,
    Dot,
    Semicolon,
    Comma,
    /// `^^`
    DatatypeMark,
    OrOr,
    AndAnd,
    Eq,
    Neq,
    Lt,
    Gt,
    Le,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Bang,
    Eof,
}

/// A token with its byte position in the query string.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: usize,
}

/// Hand-rolled lexer over the query bytes.
pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// A lexer over `input`.
    pub fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<u8> {
        self.input.get(self.pos + 1).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(b) if b.is_ascii_whitespace() => {
                    self.pos += 1;
                }
                Some(b'#') => {
                    while let Some(b) = self.peek() {
                        self.pos += 1;
                        if b == b'\n' {
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    /// Produce the next token. Lexing errors surface as `Eof` at the
    /// offending position and are reported by the parser.
    pub fn next_token(&mut self) -> Token {
        self.skip_trivia();
        let pos = self.pos;
        let kind = self.scan();
        Token { kind, pos }
    }

    fn scan(&mut self) -> TokenKind {
        let Some(b) = self.peek() else {
            return TokenKind::Eof;
        };
        match b {
            b'{' => self.single(TokenKind::LBrace),
            b'}' => self.single(TokenKind::RBrace),
            b'(' => {
                // `()` would be NIL; not in the supported subset
                self.single(TokenKind::LParen)
            }
            b')' => self.single(TokenKind::RParen),
            b'.' => {
                if self.peek2().is_some_and(|c| c.is_ascii_digit()) {
                    self.scan_number()
                } else {
                    self.single(TokenKind::Dot)
                }
            }
            b';' => self.single(TokenKind::Semicolon),
            b',' => self.single(TokenKind::Comma),
            b'+' => self.single(TokenKind::Plus),
            b'-' => self.single(TokenKind::Minus),
            b'*' => self.single(TokenKind::Star),
            b'/' => self.single(TokenKind::Slash),
            b'<' => self.scan_lt(),
            b'>' => {
                self.pos += 1;
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    TokenKind::Ge
                } else {
                    TokenKind::Gt
                }
            }
            b'=' => self.single(TokenKind::Eq),
            b'!' => {
                self.pos += 1;
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    TokenKind::Neq
                } else {
                    TokenKind::Bang
                }
            }
            b'|' if self.peek2() == Some(b'|') => {
                self.pos += 2;
                TokenKind::OrOr
            }
            b'&' if self.peek2() == Some(b'&') => {
                self.pos += 2;
                TokenKind::AndAnd
            }
            b'^' if self.peek2() == Some(b'^') => {
                self.pos += 2;
                TokenKind::DatatypeMark
            }
            b'?' | b'$' => {
                self.pos += 1;
                TokenKind::Var(self.scan_name())
            }
            b'@' => {
                self.pos += 1;
                let mut tag = String::new();
                while let Some(c) = self.peek() {
                    if c.is_ascii_alphanumeric() || c == b'-' {
                        tag.push(c as char);
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
                TokenKind::LangTag(tag)
            }
            b'"' | b'\'' => self.scan_string(b),
            b'[' => {
                self.pos += 1;
                self.skip_trivia();
                if self.peek() == Some(b']') {
                    self.pos += 1;
                }
                TokenKind::Anon
            }
            b'_' if self.peek2() == Some(b':') => {
                self.pos += 2;
                TokenKind::BlankNode(self.scan_name())
            }
            b':' => {
                self.pos += 1;
                TokenKind::PrefixedName(String::new(), self.scan_local())
            }
            b'0'..=b'9' => self.scan_number(),
            _ => self.scan_word(),
        }
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.pos += 1;
        kind
    }

    fn scan_lt(&mut self) -> TokenKind {
        // `<` starts an IRI when followed by IRI characters up to `>`,
        // otherwise it is the less-than operator
        let start = self.pos + 1;
        let mut i = start;
        while let Some(&c) = self.input.get(i) {
            match c {
                b'>' => {
                    let iri = String::from_utf8_lossy(&self.input[start..i]).into_owned();
                    self.pos = i + 1;
                    return TokenKind::Iri(iri);
                }
                b' ' | b'\t' | b'\n' | b'\r' | b'<' | b'"' | b'{' | b'}' | b'|' | b'^' | b'`' => {
                    break;
                }
                _ => i += 1,
            }
        }
        self.pos += 1;
        if self.peek() == Some(b'=') {
            self.pos += 1;
            TokenKind::Le
        } else {
            TokenKind::Lt
        }
    }

    fn scan_name(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == b'_' || c >= 0x80 {
                self.pos += 1;
            } else {
                break;
            }
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }

    fn scan_string(&mut self, quote: u8) -> TokenKind {
        self.pos += 1;
        let mut out = String::new();
        while let Some(c) = self.bump() {
            match c {
                c if c == quote => return TokenKind::StringLit(out),
                b'\\' => match self.bump() {
                    Some(b'n') => out.push('\n'),
                    Some(b't') => out.push('\t'),
                    Some(b'r') => out.push('\r'),
                    Some(b'\\') => out.push('\\'),
                    Some(b'"') => out.push('"'),
                    Some(b'\'') => out.push('\''),
                    Some(other) => out.push(other as char),
                    None => break,
                },
                _ => {
                    // re-read multi-byte UTF-8 sequences wholesale
                    let start = self.pos - 1;
                    let mut end = self.pos;
                    while end < self.input.len() && self.input[end] & 0xc0 == 0x80 {
                        end += 1;
                    }
                    out.push_str(&String::from_utf8_lossy(&self.input[start..end]));
                    self.pos = end;
                }
            }
        }
        TokenKind::StringLit(out)
    }

    fn scan_number(&mut self) -> TokenKind {
        let start = self.pos;
        let mut has_dot = false;
        let mut has_exp = false;
        while let Some(c) = self.peek() {
            match c {
                b'0'..=b'9' => self.pos += 1,
                b'.' if !has_dot && !has_exp
                    && self.peek2().is_some_and(|d| d.is_ascii_digit()) =>
                {
                    has_dot = true;
                    self.pos += 1;
                }
                b'e' | b'E' if !has_exp => {
                    has_exp = true;
                    self.pos += 1;
                    if matches!(self.peek(), Some(b'+' | b'-')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
        let text = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
        if has_exp {
            TokenKind::Double(text)
        } else if has_dot {
            TokenKind::Decimal(text)
        } else {
            TokenKind::Integer(text)
        }
    }

    fn scan_word(&mut self) -> TokenKind {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == b'_' || c == b'-' || c >= 0x80 {
                self.pos += 1;
            } else {
                break;
            }
        }
        if self.pos == start {
            // unknown character; skip it so the parser reports position
            self.pos += 1;
            return TokenKind::Eof;
        }
        let word = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
        if self.peek() == Some(b':') {
            // prefixed name
            self.pos += 1;
            let local = self.scan_local();
            return TokenKind::PrefixedName(word, local);
        }
        if word == "a" {
            return TokenKind::A;
        }
        TokenKind::Keyword(word.to_ascii_uppercase())
    }

    fn scan_local(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == b'_' || c == b'-' || c == b'.' || c >= 0x80 {
                // a trailing dot terminates the local part
                if c == b'.' && !self.peek2().is_some_and(|d| d.is_ascii_alphanumeric()) {
                    break;
                }
                self.pos += 1;
            } else {
                break;
            }
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }
}

/// Lex the whole input; the parser indexes into this.
pub fn tokenize(input: &str) -> Vec<Token> {
    let mut lexer = Lexer::new(input);
    let mut out = Vec::new();
    loop {
        let token = lexer.next_token();
        let done = token.kind == TokenKind::Eof;
        out.push(token);
        if done {
            return out;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            kinds("SELECT ?x WHERE { ?x <http://p> 5 . }"),
            vec![
                TokenKind::Keyword("SELECT".into()),
                TokenKind::Var("x".into()),
                TokenKind::Keyword("WHERE".into()),
                TokenKind::LBrace,
                TokenKind::Var("x".into()),
                TokenKind::Iri("http://p".into()),
                TokenKind::Integer("5".into()),
                TokenKind::Dot,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            kinds("\"chat\"@fr \"x\"^^<http://dt> 1.5 2e3"),
            vec![
                TokenKind::StringLit("chat".into()),
                TokenKind::LangTag("fr".into()),
                TokenKind::StringLit("x".into()),
                TokenKind::DatatypeMark,
                TokenKind::Iri("http://dt".into()),
                TokenKind::Decimal("1.5".into()),
                TokenKind::Double("2e3".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_lt_vs_iri() {
        assert_eq!(
            kinds("?x < 3 && ?y <= ?z"),
            vec![
                TokenKind::Var("x".into()),
                TokenKind::Lt,
                TokenKind::Integer("3".into()),
                TokenKind::AndAnd,
                TokenKind::Var("y".into()),
                TokenKind::Le,
                TokenKind::Var("z".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_prefixed_names_and_a() {
        assert_eq!(
            kinds("?s a foaf:Person ; foaf:name _:b"),
            vec![
                TokenKind::Var("s".into()),
                TokenKind::A,
                TokenKind::PrefixedName("foaf".into(), "Person".into()),
                TokenKind::Semicolon,
                TokenKind::PrefixedName("foaf".into(), "name".into()),
                TokenKind::BlankNode("b".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            kinds("?x # comment\n?y"),
            vec![
                TokenKind::Var("x".into()),
                TokenKind::Var("y".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_default_prefix() {
        assert_eq!(
            kinds(":p"),
            vec![
                TokenKind::PrefixedName(String::new(), "p".into()),
                TokenKind::Eof,
            ]
        );
    }
}
