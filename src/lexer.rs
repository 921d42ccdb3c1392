//! Lexer for upper-stropped Algol 68 source.
//!
//! Bold words are runs of capital letters; tags (identifiers and labels) are
//! lower-case letter-digit runs. Comments come in three brackets (`# … #`,
//! `CO … CO`, `COMMENT … COMMENT`) and pragmats (`PR … PR`) are skipped
//! wholesale.

use crate::diag::Diagnostics;
use crate::intern::Interner;
use crate::token::{reserved_bold, Span, Token, TokenType};

pub struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
        }
    }

    /// Tokenize the whole source. Lexical mishaps are reported as syntax
    /// errors and the offending character is skipped, so the parser always
    /// receives a terminated stream.
    pub fn tokenize(mut self, interner: &mut Interner, diags: &mut Diagnostics) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            if self.pos >= self.bytes.len() {
                break;
            }
            let start = self.pos;
            let c = self.bytes[self.pos];
            match c {
                b'#' => self.skip_hash_comment(diags),
                b'A'..=b'Z' => {
                    let word = self.read_while(|b| b.is_ascii_uppercase() || b.is_ascii_digit());
                    match word {
                        "CO" | "COMMENT" => self.skip_bold_comment(word, start, diags),
                        "PR" | "PRAGMAT" => self.skip_bold_comment(word, start, diags),
                        _ => {
                            let ty = reserved_bold(word)
                                .unwrap_or_else(|| TokenType::Bold(interner.intern(word)));
                            tokens.push(Token::new(ty, Span::new(start, self.pos)));
                        }
                    }
                }
                b'a'..=b'z' => {
                    let word = self.read_while(|b| b.is_ascii_lowercase() || b.is_ascii_digit());
                    let sym = interner.intern(word);
                    tokens.push(Token::new(
                        TokenType::Identifier(sym),
                        Span::new(start, self.pos),
                    ));
                }
                b'0'..=b'9' => {
                    let token = self.read_number(start, diags);
                    tokens.push(token);
                }
                b'.' if self.peek(1).is_some_and(|b| b.is_ascii_digit()) => {
                    let token = self.read_number(start, diags);
                    tokens.push(token);
                }
                b'"' => {
                    if let Some(token) = self.read_string(start, interner, diags) {
                        tokens.push(token);
                    }
                }
                _ => {
                    if let Some(token) = self.read_mark(start, interner, diags) {
                        tokens.push(token);
                    }
                }
            }
        }
        tokens.push(Token::new(
            TokenType::EndOfFile,
            Span::new(self.source.len(), self.source.len()),
        ));
        tokens
    }

    fn peek(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn read_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a str {
        let start = self.pos;
        while self.pos < self.bytes.len() && pred(self.bytes[self.pos]) {
            self.pos += 1;
        }
        &self.source[start..self.pos]
    }

    /// `# … #` comment.
    fn skip_hash_comment(&mut self, diags: &mut Diagnostics) {
        let open = self.pos;
        self.pos += 1;
        while self.pos < self.bytes.len() {
            if self.bytes[self.pos] == b'#' {
                self.pos += 1;
                return;
            }
            self.pos += 1;
        }
        diags.syntax_error(Span::new(open, open + 1), "unterminated comment");
    }

    /// `CO … CO`, `COMMENT … COMMENT`, `PR … PR`: skip until the matching
    /// bold word recurs.
    fn skip_bold_comment(&mut self, opener: &str, open_at: usize, diags: &mut Diagnostics) {
        loop {
            while self.pos < self.bytes.len() && !self.bytes[self.pos].is_ascii_uppercase() {
                self.pos += 1;
            }
            if self.pos >= self.bytes.len() {
                diags.syntax_error(
                    Span::new(open_at, open_at + opener.len()),
                    format!("unterminated {} comment", opener),
                );
                return;
            }
            let word = self.read_while(|b| b.is_ascii_uppercase());
            if word == opener {
                return;
            }
        }
    }

    fn read_number(&mut self, start: usize, diags: &mut Diagnostics) -> Token {
        let _ = self.read_while(|b| b.is_ascii_digit());
        // Bits denotation: radix then `r` then digits.
        if self.peek(0) == Some(b'r') {
            return self.read_bits(start, diags);
        }
        let mut is_real = false;
        if self.peek(0) == Some(b'.') && self.peek(1).is_some_and(|b| b.is_ascii_digit()) {
            is_real = true;
            self.pos += 1;
            let _ = self.read_while(|b| b.is_ascii_digit());
        }
        if matches!(self.peek(0), Some(b'e') | Some(b'E')) {
            let mut ahead = 1;
            if matches!(self.peek(1), Some(b'+') | Some(b'-')) {
                ahead = 2;
            }
            if self.peek(ahead).is_some_and(|b| b.is_ascii_digit()) {
                is_real = true;
                self.pos += ahead;
                let _ = self.read_while(|b| b.is_ascii_digit());
            }
        }
        let text = &self.source[start..self.pos];
        let span = Span::new(start, self.pos);
        if is_real {
            match text.parse::<f64>() {
                Ok(v) => Token::new(TokenType::RealDenotation(v), span),
                Err(_) => {
                    diags.syntax_error(span, format!("malformed real denotation '{}'", text));
                    Token::new(TokenType::RealDenotation(0.0), span)
                }
            }
        } else {
            match text.parse::<i64>() {
                Ok(v) => Token::new(TokenType::IntDenotation(v), span),
                Err(_) => {
                    diags.syntax_error(span, format!("integer denotation '{}' out of range", text));
                    Token::new(TokenType::IntDenotation(0), span)
                }
            }
        }
    }

    fn read_bits(&mut self, start: usize, diags: &mut Diagnostics) -> Token {
        let radix_text = &self.source[start..self.pos];
        self.pos += 1; // the `r`
        let digits_start = self.pos;
        let digits = self.read_while(|b| b.is_ascii_alphanumeric());
        let span = Span::new(start, self.pos);
        let radix: u32 = match radix_text.parse() {
            Ok(r) if (2..=16).contains(&r) => r,
            _ => {
                diags.syntax_error(span, format!("bad radix '{}' in bits denotation", radix_text));
                return Token::new(TokenType::BitsDenotation { radix: 2, value: 0 }, span);
            }
        };
        match u64::from_str_radix(digits, radix) {
            Ok(value) => Token::new(TokenType::BitsDenotation { radix, value }, span),
            Err(_) => {
                diags.syntax_error(
                    Span::new(digits_start, self.pos),
                    format!("bad digits for radix {} bits denotation", radix),
                );
                Token::new(TokenType::BitsDenotation { radix, value: 0 }, span)
            }
        }
    }

    fn read_string(
        &mut self,
        start: usize,
        interner: &mut Interner,
        diags: &mut Diagnostics,
    ) -> Option<Token> {
        self.pos += 1;
        let mut text = String::new();
        while self.pos < self.bytes.len() {
            match self.bytes[self.pos] {
                b'"' if self.peek(1) == Some(b'"') => {
                    // Doubled quote is the quote image.
                    text.push('"');
                    self.pos += 2;
                }
                b'"' => {
                    self.pos += 1;
                    let sym = interner.intern(&text);
                    return Some(Token::new(
                        TokenType::StringDenotation(sym),
                        Span::new(start, self.pos),
                    ));
                }
                _ => {
                    let ch = self.source[self.pos..].chars().next()?;
                    text.push(ch);
                    self.pos += ch.len_utf8();
                }
            }
        }
        diags.syntax_error(Span::new(start, start + 1), "unterminated string denotation");
        None
    }

    /// Structural marks and worthy-character operators.
    fn read_mark(
        &mut self,
        start: usize,
        interner: &mut Interner,
        diags: &mut Diagnostics,
    ) -> Option<Token> {
        let rest = &self.source[self.pos..];
        let (ty, len) = if rest.starts_with(":/=:") {
            (TokenType::NotIdentityRelation, 4)
        } else if rest.starts_with(":=:") {
            (TokenType::IdentityRelation, 3)
        } else if rest.starts_with(":=") {
            (TokenType::Assign, 2)
        } else if rest.starts_with("|:") {
            (TokenType::BarColon, 2)
        } else {
            match self.bytes[self.pos] {
                b'(' => (TokenType::OpenParen, 1),
                b')' => (TokenType::CloseParen, 1),
                b'[' => (TokenType::OpenBracket, 1),
                b']' => (TokenType::CloseBracket, 1),
                b',' => (TokenType::Comma, 1),
                b';' => (TokenType::Semicolon, 1),
                b':' => (TokenType::Colon, 1),
                b'|' => (TokenType::Bar, 1),
                b'@' => (TokenType::At, 1),
                b'=' => (TokenType::Equals, 1),
                b'+' | b'-' | b'*' | b'/' | b'%' | b'<' | b'>' | b'~' | b'&' => {
                    return Some(self.read_operator(start, interner));
                }
                other => {
                    diags.syntax_error(
                        Span::new(start, start + 1),
                        format!("stray character '{}'", other as char),
                    );
                    self.pos += 1;
                    return None;
                }
            }
        };
        self.pos += len;
        Some(Token::new(ty, Span::new(start, self.pos)))
    }

    fn read_operator(&mut self, start: usize, interner: &mut Interner) -> Token {
        let rest = &self.source[self.pos..];
        let base = if rest.starts_with("%*") {
            "%*"
        } else if rest.starts_with("**") {
            "**"
        } else if rest.starts_with("<=") {
            "<="
        } else if rest.starts_with(">=") {
            ">="
        } else if rest.starts_with("/=") {
            "/="
        } else {
            &rest[..1]
        };
        self.pos += base.len();
        // Assigning form, e.g. `+:=`, `%*:=`.
        let after = &self.source[self.pos..];
        let text = if after.starts_with(":=") && !after.starts_with(":=:") {
            self.pos += 2;
            format!("{}:=", base)
        } else {
            base.to_string()
        };
        Token::new(
            TokenType::Operator(interner.intern(&text)),
            Span::new(start, self.pos),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> (Vec<Token>, Interner, Diagnostics) {
        let mut interner = Interner::new();
        let mut diags = Diagnostics::new();
        let tokens = Lexer::new(src).tokenize(&mut interner, &mut diags);
        (tokens, interner, diags)
    }

    fn types(src: &str) -> Vec<TokenType> {
        let (tokens, _, diags) = lex(src);
        assert!(!diags.has_errors(), "unexpected lex errors");
        tokens.into_iter().map(|t| t.ty).collect()
    }

    #[test]
    fn lexes_variable_declaration() {
        let ts = types("INT n := 7");
        assert_eq!(ts[0], TokenType::Int);
        assert!(matches!(ts[1], TokenType::Identifier(_)));
        assert_eq!(ts[2], TokenType::Assign);
        assert_eq!(ts[3], TokenType::IntDenotation(7));
        assert_eq!(ts[4], TokenType::EndOfFile);
    }

    #[test]
    fn distinguishes_identity_relations_from_assign() {
        let ts = types("a :=: b; a :/=: b; a := b");
        assert_eq!(ts[1], TokenType::IdentityRelation);
        assert_eq!(ts[5], TokenType::NotIdentityRelation);
        assert_eq!(ts[9], TokenType::Assign);
    }

    #[test]
    fn real_denotations_with_exponent() {
        let ts = types("3.14 2e10 1.5e-3");
        assert_eq!(ts[0], TokenType::RealDenotation(3.14));
        assert_eq!(ts[1], TokenType::RealDenotation(2e10));
        assert_eq!(ts[2], TokenType::RealDenotation(1.5e-3));
    }

    #[test]
    fn bits_denotations_carry_radix() {
        let ts = types("2r1010 16rff");
        assert_eq!(
            ts[0],
            TokenType::BitsDenotation {
                radix: 2,
                value: 10
            }
        );
        assert_eq!(
            ts[1],
            TokenType::BitsDenotation {
                radix: 16,
                value: 255
            }
        );
    }

    #[test]
    fn string_denotation_with_quote_image() {
        let (tokens, interner, diags) = lex(r#""he said ""hi""""#);
        assert!(!diags.has_errors());
        match tokens[0].ty {
            TokenType::StringDenotation(sym) => {
                assert_eq!(interner.resolve(sym), "he said \"hi\"");
            }
            ref other => panic!("expected string denotation, got {:?}", other),
        }
    }

    #[test]
    fn unreserved_bold_word_is_bold_token() {
        let (tokens, interner, _) = lex("ABS x");
        match tokens[0].ty {
            TokenType::Bold(sym) => assert_eq!(interner.resolve(sym), "ABS"),
            ref other => panic!("expected bold word, got {:?}", other),
        }
    }

    #[test]
    fn comments_are_skipped() {
        let ts = types("CO setup CO 1 # mid # 2 COMMENT tail COMMENT");
        assert_eq!(ts[0], TokenType::IntDenotation(1));
        assert_eq!(ts[1], TokenType::IntDenotation(2));
        assert_eq!(ts[2], TokenType::EndOfFile);
    }

    #[test]
    fn unterminated_comment_is_reported() {
        let (_, _, diags) = lex("CO never closed");
        assert!(diags.has_syntax_errors());
    }

    #[test]
    fn assigning_operators_fuse() {
        let (tokens, interner, _) = lex("x +:= 1; y %*:= 2");
        match tokens[1].ty {
            TokenType::Operator(sym) => assert_eq!(interner.resolve(sym), "+:="),
            ref other => panic!("expected operator, got {:?}", other),
        }
        match tokens[5].ty {
            TokenType::Operator(sym) => assert_eq!(interner.resolve(sym), "%*:="),
            ref other => panic!("expected operator, got {:?}", other),
        }
    }

    #[test]
    fn brief_bars_and_case_marks() {
        let ts = types("( a | b |: c | d )");
        assert!(ts.contains(&TokenType::Bar));
        assert!(ts.contains(&TokenType::BarColon));
    }
}
