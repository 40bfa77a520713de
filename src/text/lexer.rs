//! The tokenizer: a regular-language lexer over UTF-8 source with a
//! two-token lookahead buffer on top.
//!
//! Whitespace and comments (line `;;`, nested block `(; ;)`) are skipped
//! between tokens; callers only ever see significant tokens plus `Eof`.

use std::collections::VecDeque;

use crate::error::{ErrorKind, Errors};
use crate::span::Location;

use super::keywords;
use super::tokens::{Base, LiteralInfo, Sign, Token, TokenImmediate, TokenType};

fn is_idchar(byte: u8) -> bool {
    matches!(byte,
        b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z'
        | b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'/'
        | b':' | b'<' | b'=' | b'>' | b'?' | b'@' | b'\\' | b'^' | b'_' | b'`' | b'|' | b'~')
}

fn is_digit(byte: u8) -> bool {
    byte.is_ascii_digit()
}

fn is_hexdigit(byte: u8) -> bool {
    byte.is_ascii_hexdigit()
}

pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn bytes(&self) -> &'a [u8] {
        self.src.as_bytes()
    }

    fn peek_byte(&self, offset: usize) -> Option<u8> {
        self.bytes().get(self.pos + offset).copied()
    }

    fn loc_from(&self, start: usize) -> Location {
        Location::new(start as u32, self.pos as u32)
    }

    fn skip_trivia(&mut self, errors: &mut Errors) {
        loop {
            match self.peek_byte(0) {
                Some(b' ' | b'\t' | b'\r' | b'\n') => self.pos += 1,
                Some(b';') if self.peek_byte(1) == Some(b';') => {
                    while let Some(byte) = self.peek_byte(0) {
                        self.pos += 1;
                        if byte == b'\n' {
                            break;
                        }
                    }
                }
                Some(b'(') if self.peek_byte(1) == Some(b';') => {
                    let start = self.pos;
                    self.pos += 2;
                    let mut depth = 1usize;
                    while depth > 0 {
                        match (self.peek_byte(0), self.peek_byte(1)) {
                            (Some(b'('), Some(b';')) => {
                                depth += 1;
                                self.pos += 2;
                            }
                            (Some(b';'), Some(b')')) => {
                                depth -= 1;
                                self.pos += 2;
                            }
                            (Some(_), _) => self.pos += 1,
                            (None, _) => {
                                errors.report(
                                    Some(self.loc_from(start)),
                                    ErrorKind::Lexical,
                                    "unterminated block comment",
                                );
                                return;
                            }
                        }
                    }
                }
                _ => return,
            }
        }
    }

    pub fn next_token(&mut self, errors: &mut Errors) -> Token<'a> {
        self.skip_trivia(errors);
        let start = self.pos;
        let Some(byte) = self.peek_byte(0) else {
            return Token::new(self.loc_from(start), "", TokenType::Eof);
        };
        match byte {
            b'(' => {
                self.pos += 1;
                Token::new(self.loc_from(start), "(", TokenType::Lpar)
            }
            b')' => {
                self.pos += 1;
                Token::new(self.loc_from(start), ")", TokenType::Rpar)
            }
            b'"' => self.lex_string(start, errors),
            _ if is_idchar(byte) => self.lex_word(start),
            _ => {
                // Skip the full UTF-8 scalar, not just one byte.
                let ch_len = self.src[self.pos..]
                    .chars()
                    .next()
                    .map_or(1, |c| c.len_utf8());
                self.pos += ch_len;
                errors.report(
                    Some(self.loc_from(start)),
                    ErrorKind::Lexical,
                    format!("invalid character: {:?}", &self.src[start..self.pos]),
                );
                Token::new(self.loc_from(start), &self.src[start..self.pos], TokenType::Reserved)
            }
        }
    }

    fn lex_string(&mut self, start: usize, errors: &mut Errors) -> Token<'a> {
        self.pos += 1;
        let mut byte_size: u32 = 0;
        loop {
            match self.peek_byte(0) {
                None | Some(b'\n') => {
                    errors.report(
                        Some(self.loc_from(start)),
                        ErrorKind::Lexical,
                        "unterminated string literal",
                    );
                    break;
                }
                Some(b'"') => {
                    self.pos += 1;
                    break;
                }
                Some(b'\\') => {
                    self.pos += 1;
                    match self.peek_byte(0) {
                        Some(b't' | b'n' | b'r' | b'"' | b'\'' | b'\\') => {
                            self.pos += 1;
                            byte_size += 1;
                        }
                        Some(hi) if is_hexdigit(hi) => {
                            self.pos += 1;
                            match self.peek_byte(0) {
                                Some(lo) if is_hexdigit(lo) => {
                                    self.pos += 1;
                                    byte_size += 1;
                                }
                                _ => {
                                    errors.report(
                                        Some(self.loc_from(start)),
                                        ErrorKind::Lexical,
                                        "bad escape sequence",
                                    );
                                }
                            }
                        }
                        _ => {
                            errors.report(
                                Some(self.loc_from(start)),
                                ErrorKind::Lexical,
                                "bad escape sequence",
                            );
                            self.pos += 1;
                        }
                    }
                }
                Some(_) => {
                    self.pos += 1;
                    byte_size += 1;
                }
            }
        }
        Token::with_imm(
            self.loc_from(start),
            &self.src[start..self.pos],
            TokenType::Text,
            TokenImmediate::TextByteSize(byte_size),
        )
    }

    fn lex_word(&mut self, start: usize) -> Token<'a> {
        while let Some(byte) = self.peek_byte(0) {
            if !is_idchar(byte) {
                break;
            }
            self.pos += 1;
        }
        let span = &self.src[start..self.pos];
        let loc = self.loc_from(start);

        if let Some(rest) = span.strip_prefix('$') {
            if rest.is_empty() {
                return Token::new(loc, span, TokenType::Reserved);
            }
            return Token::new(loc, span, TokenType::Id);
        }

        if let Some((ty, imm)) = keywords::classify(span) {
            return Token::with_imm(loc, span, ty, imm);
        }

        if let Some((ty, info)) = scan_number(span) {
            return Token::with_imm(loc, span, ty, TokenImmediate::Literal(info));
        }

        for (prefix, ty) in [
            ("align=", TokenType::AlignEqNat),
            ("offset=", TokenType::OffsetEqNat),
        ] {
            if let Some(rest) = span.strip_prefix(prefix) {
                if let Some((TokenType::Nat, info)) = scan_number(rest) {
                    return Token::with_imm(loc, span, ty, TokenImmediate::Literal(info));
                }
            }
        }

        Token::new(loc, span, TokenType::Reserved)
    }
}

/// Scans `digit (('_'? digit)*`, returning the index one past the last
/// digit and whether any underscore was seen. A single underscore is only
/// permitted between two digits.
fn scan_digits(bytes: &[u8], mut i: usize, hex: bool) -> Option<(usize, bool)> {
    let digit = if hex { is_hexdigit } else { is_digit };
    if i >= bytes.len() || !digit(bytes[i]) {
        return None;
    }
    i += 1;
    let mut underscores = false;
    loop {
        match bytes.get(i) {
            Some(&b) if digit(b) => i += 1,
            Some(b'_') => match bytes.get(i + 1) {
                Some(&b) if digit(b) => {
                    underscores = true;
                    i += 2;
                }
                _ => return None,
            },
            _ => return Some((i, underscores)),
        }
    }
}

/// Full-word numeric literal match; `None` means "not a number" and the
/// word falls through to `Reserved`.
fn scan_number(word: &str) -> Option<(TokenType, LiteralInfo)> {
    let bytes = word.as_bytes();
    let (sign, offset) = match bytes.first()? {
        b'+' => (Sign::Plus, 1),
        b'-' => (Sign::Minus, 1),
        _ => (Sign::None, 0),
    };
    let rest = &bytes[offset..];

    if rest == b"inf" {
        return Some((TokenType::Float, LiteralInfo::infinity(sign)));
    }
    if rest == b"nan" {
        return Some((TokenType::Float, LiteralInfo::nan(sign)));
    }
    if let Some(payload) = rest.strip_prefix(b"nan:0x") {
        let (end, underscores) = scan_digits(payload, 0, true)?;
        if end != payload.len() {
            return None;
        }
        return Some((TokenType::Float, LiteralInfo::nan_payload(sign, underscores)));
    }

    let (base, digits_start) = if rest.starts_with(b"0x") || rest.starts_with(b"0X") {
        (Base::Hex, 2)
    } else {
        (Base::Decimal, 0)
    };
    let hex = base == Base::Hex;
    let (mut i, mut underscores) = scan_digits(rest, digits_start, hex)?;
    let mut is_float = false;

    if rest.get(i) == Some(&b'.') {
        is_float = true;
        i += 1;
        if let Some((end, more)) = scan_digits(rest, i, hex) {
            i = end;
            underscores |= more;
        }
    }

    let exp_char: &[u8] = if hex { b"pP" } else { b"eE" };
    if rest.get(i).is_some_and(|b| exp_char.contains(b)) {
        is_float = true;
        i += 1;
        if matches!(rest.get(i), Some(b'+' | b'-')) {
            i += 1;
        }
        // Exponents are always decimal, even for hex floats.
        let (end, more) = scan_digits(rest, i, false)?;
        i = end;
        underscores |= more;
    }

    if i != rest.len() {
        return None;
    }

    let ty = if is_float {
        TokenType::Float
    } else if sign == Sign::None {
        TokenType::Nat
    } else {
        TokenType::Int
    };
    let info = if sign == Sign::None && !is_float {
        LiteralInfo::nat(base, underscores)
    } else {
        LiteralInfo::number(sign, base, underscores)
    };
    Some((ty, info))
}

/// Two-token-lookahead stream over the lexer.
pub struct Tokenizer<'a> {
    lexer: Lexer<'a>,
    lookahead: VecDeque<Token<'a>>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            lexer: Lexer::new(src),
            lookahead: VecDeque::with_capacity(2),
        }
    }

    pub fn peek(&mut self, n: usize, errors: &mut Errors) -> Token<'a> {
        debug_assert!(n < 2);
        while self.lookahead.len() <= n {
            let token = self.lexer.next_token(errors);
            self.lookahead.push_back(token);
        }
        self.lookahead[n]
    }

    pub fn read(&mut self, errors: &mut Errors) -> Token<'a> {
        if let Some(token) = self.lookahead.pop_front() {
            token
        } else {
            self.lexer.next_token(errors)
        }
    }

    /// Consumes the next token if it has the given type.
    pub fn match_type(&mut self, ty: TokenType, errors: &mut Errors) -> Option<Token<'a>> {
        if self.peek(0, errors).ty == ty {
            Some(self.read(errors))
        } else {
            None
        }
    }

    /// Consumes `(` `ty` if the next two tokens match.
    pub fn match_lpar(&mut self, ty: TokenType, errors: &mut Errors) -> Option<Token<'a>> {
        if self.peek(0, errors).ty == TokenType::Lpar && self.peek(1, errors).ty == ty {
            let _ = self.read(errors);
            Some(self.read(errors))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::Opcode;
    use rstest::rstest;

    fn lex_all(src: &str) -> (Vec<Token<'_>>, Errors) {
        let mut errors = Errors::new();
        let mut lexer = Lexer::new(src);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token(&mut errors);
            let done = token.ty == TokenType::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }
        (tokens, errors)
    }

    fn types(src: &str) -> Vec<TokenType> {
        lex_all(src).0.iter().map(|t| t.ty).collect()
    }

    #[test]
    fn basic_structure() {
        assert_eq!(
            types("(module (func))"),
            vec![
                TokenType::Lpar,
                TokenType::Module,
                TokenType::Lpar,
                TokenType::Func,
                TokenType::Rpar,
                TokenType::Rpar,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn comments_are_skipped_and_nest() {
        assert_eq!(
            types("(; outer (; inner ;) still outer ;) module ;; eol\nfunc"),
            vec![TokenType::Module, TokenType::Func, TokenType::Eof]
        );
    }

    #[test]
    fn unterminated_block_comment_reports() {
        let (_, errors) = lex_all("(; no end");
        assert!(errors.has_kind(ErrorKind::Lexical));
    }

    #[test]
    fn string_literal_boundaries() {
        // A ';' inside a string must not start a comment.
        let (tokens, errors) = lex_all(r#""a;;b" "c(;d""#);
        assert!(errors.is_empty());
        assert_eq!(tokens[0].ty, TokenType::Text);
        assert_eq!(tokens[1].ty, TokenType::Text);
        assert_eq!(tokens[0].span, r#""a;;b""#);
    }

    #[test]
    fn string_escapes_and_byte_size() {
        let (tokens, errors) = lex_all(r#""a\tb\00""#);
        assert!(errors.is_empty());
        assert_eq!(tokens[0].imm, TokenImmediate::TextByteSize(4));
    }

    #[test]
    fn bad_escape_reports() {
        let (_, errors) = lex_all(r#""\q""#);
        assert!(errors.has_kind(ErrorKind::Lexical));
    }

    #[test]
    fn unterminated_string_reports() {
        let (_, errors) = lex_all("\"abc");
        assert!(errors.has_kind(ErrorKind::Lexical));
    }

    #[test]
    fn identifiers() {
        let (tokens, _) = lex_all("$foo $foo.bar $1");
        assert!(tokens[..3].iter().all(|t| t.ty == TokenType::Id));
        assert_eq!(tokens[0].span, "$foo");
    }

    #[rstest]
    #[case("0", TokenType::Nat)]
    #[case("12_34", TokenType::Nat)]
    #[case("0xbeef", TokenType::Nat)]
    #[case("+42", TokenType::Int)]
    #[case("-0x1f", TokenType::Int)]
    #[case("1.5", TokenType::Float)]
    #[case("1e10", TokenType::Float)]
    #[case("-1.5e-3", TokenType::Float)]
    #[case("0x1.8p2", TokenType::Float)]
    #[case("inf", TokenType::Float)]
    #[case("-inf", TokenType::Float)]
    #[case("nan", TokenType::Float)]
    #[case("nan:0x400000", TokenType::Float)]
    fn numeric_literals(#[case] src: &str, #[case] expected: TokenType) {
        let (tokens, errors) = lex_all(src);
        assert!(errors.is_empty());
        assert_eq!(tokens[0].ty, expected, "{src}");
    }

    #[rstest]
    #[case("1__2")]
    #[case("1_")]
    #[case("_1")]
    #[case("0x")]
    #[case("1.2.3")]
    #[case("nan:0xzz")]
    fn malformed_numbers_are_reserved(#[case] src: &str) {
        let (tokens, _) = lex_all(src);
        assert_eq!(tokens[0].ty, TokenType::Reserved, "{src}");
    }

    #[test]
    fn literal_info_records_base_and_underscores() {
        let (tokens, _) = lex_all("0x1_2");
        let info = tokens[0].literal_info().unwrap();
        assert_eq!(info.base, Base::Hex);
        assert!(info.has_underscores);

        let (tokens, _) = lex_all("-3");
        let info = tokens[0].literal_info().unwrap();
        assert_eq!(info.sign, Sign::Minus);
        assert_eq!(info.base, Base::Decimal);
    }

    #[test]
    fn align_and_offset_sugar() {
        assert_eq!(
            types("align=8 offset=0x10"),
            vec![TokenType::AlignEqNat, TokenType::OffsetEqNat, TokenType::Eof]
        );
    }

    #[test]
    fn instruction_tokens() {
        let (tokens, _) = lex_all("local.get i32.add block end");
        assert_eq!(tokens[0].ty, TokenType::PlainInstr);
        assert_eq!(tokens[0].opcode_info().unwrap().opcode, Opcode::LocalGet);
        assert_eq!(tokens[1].opcode_info().unwrap().opcode, Opcode::I32Add);
        assert_eq!(tokens[2].ty, TokenType::BlockInstr);
        assert_eq!(tokens[3].ty, TokenType::End);
    }

    #[test]
    fn two_token_lookahead() {
        let mut errors = Errors::new();
        let mut tokenizer = Tokenizer::new("(func $f)");
        assert_eq!(tokenizer.peek(0, &mut errors).ty, TokenType::Lpar);
        assert_eq!(tokenizer.peek(1, &mut errors).ty, TokenType::Func);
        assert_eq!(tokenizer.read(&mut errors).ty, TokenType::Lpar);
        assert_eq!(tokenizer.peek(1, &mut errors).ty, TokenType::Id);
        assert!(tokenizer.match_type(TokenType::Func, &mut errors).is_some());
        assert!(tokenizer.match_type(TokenType::Rpar, &mut errors).is_none());
    }

    #[test]
    fn match_lpar_consumes_both() {
        let mut errors = Errors::new();
        let mut tokenizer = Tokenizer::new("(param i32)");
        assert!(tokenizer.match_lpar(TokenType::Param, &mut errors).is_some());
        assert_eq!(tokenizer.peek(0, &mut errors).ty, TokenType::NumericType);
    }
}
