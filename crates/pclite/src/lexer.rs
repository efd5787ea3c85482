//! UTF-8 aware tokenizer.
//!
//! Processes the source one physical line at a time, tracking a "greedy"
//! stack of unmatched opening brackets to decide whether an end-of-line (or
//! a literal `;`) should become a `LINEBREAK` token, and to report
//! structural bracket errors. There is no error recovery: the first
//! malformed token aborts tokenization.

use std::str::FromStr;

use crate::ast::Segment;
use crate::error::{Category, CompileError, Note};
use crate::source::{GreedyBracket, Source};
use crate::token::{IntRadix, Keyword, Punct, Token, TokenKind};
use crate::unicode::{decode_escape, is_identifier_continue, is_identifier_start};

pub struct Lexer<'s> {
    source: &'s mut Source,
}

impl<'s> Lexer<'s> {
    #[must_use]
    pub fn new(source: &'s mut Source) -> Self {
        Self { source }
    }

    pub fn tokenize(mut self) -> Result<(), CompileError> {
        let line_count = self.source.line_count() as u32;
        for line_no in 0..line_count {
            self.tokenize_line(line_no)?;
        }
        if !self.source.greedy.is_empty() {
            return Err(self.unmatched_at_eof());
        }
        Ok(())
    }

    fn can_emit_linebreak(&self) -> bool {
        match self.source.greedy.last() {
            None => true,
            Some(b) => b.ch == '{',
        }
    }

    fn last_is_linebreak(&self) -> bool {
        matches!(self.source.tokens.last().map(|t| &t.kind), Some(TokenKind::Linebreak))
    }

    fn tokenize_line(&mut self, line_no: u32) -> Result<(), CompileError> {
        let chars: Vec<char> = self.source.line(line_no).chars().collect();
        let mut col: usize = 0;
        let mut suppress_break = false;

        while col < chars.len() {
            let c = chars[col];
            if c == ' ' || c == '\t' || c == '\u{b}' || c == '\u{c}' {
                col += 1;
                continue;
            }
            if c == '\\' && col + 1 == chars.len() {
                suppress_break = true;
                col += 1;
                continue;
            }
            if c == '\\' {
                return Err(CompileError::new(
                    Category::Tokenization,
                    Segment::single(line_no, col as u32, 1),
                    "stray '\\' is only valid as the final character of a line",
                ));
            }
            if c == '#' {
                // Line comment: the rest of the physical line is skipped.
                break;
            }
            let (token, consumed) = self.lex_token(line_no, &chars, col)?;
            if matches!(token.kind, TokenKind::Linebreak) && !self.can_emit_linebreak() {
                return Err(CompileError::new(
                    Category::Structural,
                    token_span(&token),
                    "';' is not allowed inside an open '(' or '['",
                ));
            }
            self.source.tokens.push(token);
            col += consumed.max(1);
        }

        if !suppress_break && self.can_emit_linebreak() && !self.last_is_linebreak() && !self.source.tokens.is_empty() {
            self.source
                .tokens
                .push(Token::new(line_no, chars.len() as u32, 0, TokenKind::Linebreak));
        }
        Ok(())
    }

    fn lex_token(&mut self, line: u32, chars: &[char], col: usize) -> Result<(Token, usize), CompileError> {
        let c = chars[col];

        if c == ';' {
            return Ok((Token::new(line, col as u32, 1, TokenKind::Linebreak), 1));
        }
        if is_identifier_start(c) {
            return Ok(self.lex_identifier(line, chars, col));
        }
        if c.is_ascii_digit() {
            return self.lex_number(line, chars, col);
        }
        if c == '\'' {
            return self.lex_char(line, chars, col);
        }
        if c == '"' {
            return self.lex_string(line, chars, col);
        }
        if let Some(bracket) = opening_bracket(c) {
            self.source.greedy.push(GreedyBracket { ch: bracket, line, column: col as u32 });
            return Ok((Token::new(line, col as u32, 1, TokenKind::Punct(punct_for_bracket(bracket))), 1));
        }
        if let Some(closer) = closing_for(c) {
            self.close_bracket(line, col as u32, closer)?;
            return Ok((Token::new(line, col as u32, 1, TokenKind::Punct(punct_for_bracket_close(c))), 1));
        }
        if let Some((text, punct)) = match_punct(chars, col) {
            return Ok((Token::new(line, col as u32, text.chars().count() as u32, TokenKind::Punct(punct)), text.chars().count()));
        }

        Err(CompileError::new(
            Category::Tokenization,
            Segment::single(line, col as u32, 1),
            format!("unexpected character '{c}'"),
        ))
    }

    fn close_bracket(&mut self, line: u32, col: u32, expected_opener: char) -> Result<(), CompileError> {
        match self.source.greedy.pop() {
            None => Err(CompileError::new(
                Category::Structural,
                Segment::single(line, col, 1),
                format!("unmatched closing '{}': no bracket is open", closer_for(expected_opener)),
            )),
            Some(top) if top.ch == expected_opener => Ok(()),
            Some(top) => {
                let hint = self
                    .source
                    .greedy
                    .iter()
                    .rev()
                    .find(|b| b.ch == expected_opener)
                    .copied();
                let mut err = CompileError::new(
                    Category::Structural,
                    Segment::single(line, col, 1),
                    format!(
                        "mismatched closing '{}': nearest open bracket is '{}'",
                        closer_for(expected_opener),
                        top.ch
                    ),
                )
                .with_note(Note::new("opened here", Segment::single(top.line, top.column, 1)));
                if let Some(hint) = hint {
                    err = err.with_note(Note::new(
                        format!("nearest matching '{}' is here", expected_opener),
                        Segment::single(hint.line, hint.column, 1),
                    ));
                }
                // Put the mismatched bracket back; nothing will consume it
                // since this error is fatal, but it keeps `greedy` honest.
                self.source.greedy.push(top);
                Err(err)
            }
        }
    }

    fn unmatched_at_eof(&self) -> CompileError {
        let last = self.source.greedy.last().copied().expect("checked non-empty");
        let mut err = CompileError::new(
            Category::Structural,
            Segment::single(last.line, last.column, 1),
            format!("unexpected end of file: {} unclosed bracket(s)", self.source.greedy.len()),
        );
        for b in &self.source.greedy {
            err = err.with_note(Note::new(format!("'{}' opened here", b.ch), Segment::single(b.line, b.column, 1)));
        }
        err
    }

    fn lex_identifier(&self, line: u32, chars: &[char], col: usize) -> (Token, usize) {
        let mut end = col + 1;
        while end < chars.len() && is_identifier_continue(chars[end]) {
            end += 1;
        }
        let text: String = chars[col..end].iter().collect();
        let width = (end - col) as u32;
        let kind = if text == "__LINE__" {
            TokenKind::Keyword(Keyword::Line)
        } else if let Ok(kw) = Keyword::from_str(&text) {
            TokenKind::Keyword(kw)
        } else {
            TokenKind::Identifier(text)
        };
        (Token::new(line, col as u32, width, kind), end - col)
    }

    fn lex_number(&self, line: u32, chars: &[char], col: usize) -> Result<(Token, usize), CompileError> {
        let start = col;
        if chars[col] == '0' && col + 1 < chars.len() {
            match chars[col + 1] {
                'b' | 'B' => return self.lex_radix_int(line, chars, col, 2, IntRadix::Binary),
                'o' | 'O' => return self.lex_radix_int(line, chars, col, 8, IntRadix::Octal),
                'x' | 'X' => return self.lex_hex(line, chars, col),
                d if d.is_ascii_digit() => {
                    return Err(CompileError::new(
                        Category::Tokenization,
                        Segment::single(line, start as u32, 2),
                        "a decimal literal may not have a leading zero before another digit",
                    ));
                }
                _ => {}
            }
        }
        self.lex_decimal(line, chars, col)
    }

    fn lex_radix_int(
        &self,
        line: u32,
        chars: &[char],
        col: usize,
        radix: u32,
        kind: IntRadix,
    ) -> Result<(Token, usize), CompileError> {
        let start = col;
        let mut end = col + 2; // skip "0b"/"0o"
        let digits_start = end;
        let mut last_was_digit = false;
        while end < chars.len() {
            let c = chars[end];
            if c.is_digit(radix) {
                last_was_digit = true;
                end += 1;
            } else if c == '_' {
                if !last_was_digit {
                    return Err(underscore_error(line, end as u32));
                }
                last_was_digit = false;
                end += 1;
            } else {
                break;
            }
        }
        if end == digits_start {
            return Err(CompileError::new(
                Category::Tokenization,
                Segment::single(line, start as u32, (end - start) as u32),
                "expected at least one digit in numeric literal",
            ));
        }
        if !last_was_digit {
            return Err(underscore_error(line, (end - 1) as u32));
        }
        let digits: String = chars[digits_start..end].iter().filter(|&&c| c != '_').collect();
        let value = u64::from_str_radix(&digits, radix).map_err(|_| {
            CompileError::new(
                Category::Tokenization,
                Segment::single(line, start as u32, (end - start) as u32),
                "integer literal out of range",
            )
        })?;
        Ok((
            Token::new(line, start as u32, (end - start) as u32, TokenKind::Int { value: value as i64, radix: kind }),
            end - start,
        ))
    }

    fn lex_hex(&self, line: u32, chars: &[char], col: usize) -> Result<(Token, usize), CompileError> {
        let start = col;
        let mut end = col + 2; // skip "0x"
        let (int_digits, new_end) = scan_digit_run(line, chars, end, 16)?;
        end = new_end;
        let mut frac_digits = String::new();
        if end < chars.len() && chars[end] == '.' {
            end += 1;
            let (d, new_end) = scan_digit_run(line, chars, end, 16)?;
            frac_digits = d;
            end = new_end;
        }
        if int_digits.is_empty() && frac_digits.is_empty() {
            return Err(CompileError::new(
                Category::Tokenization,
                Segment::single(line, start as u32, (end - start) as u32),
                "expected at least one hex digit in numeric literal",
            ));
        }
        let mut exponent: i32 = 0;
        let mut is_float = !frac_digits.is_empty();
        if end < chars.len() && (chars[end] == 'p' || chars[end] == 'P') {
            is_float = true;
            end += 1;
            let mut sign = 1i32;
            if end < chars.len() && (chars[end] == '+' || chars[end] == '-') {
                if chars[end] == '-' {
                    sign = -1;
                }
                end += 1;
            }
            let exp_start = end;
            while end < chars.len() && chars[end].is_ascii_digit() {
                end += 1;
            }
            if end == exp_start {
                return Err(CompileError::new(
                    Category::Tokenization,
                    Segment::single(line, end as u32, 1),
                    "expected digits in hex float exponent",
                ));
            }
            let digits: String = chars[exp_start..end].iter().collect();
            exponent = sign * digits.parse::<i32>().unwrap_or(0);
        }

        let width = (end - start) as u32;
        if is_float {
            let value = hex_float_value(&int_digits, &frac_digits, exponent);
            Ok((Token::new(line, start as u32, width, TokenKind::Float(value)), end - start))
        } else {
            let value = u64::from_str_radix(&int_digits, 16).map_err(|_| {
                CompileError::new(Category::Tokenization, Segment::single(line, start as u32, width), "integer literal out of range")
            })?;
            Ok((
                Token::new(line, start as u32, width, TokenKind::Int { value: value as i64, radix: IntRadix::Hex }),
                end - start,
            ))
        }
    }

    fn lex_decimal(&self, line: u32, chars: &[char], col: usize) -> Result<(Token, usize), CompileError> {
        let start = col;
        let (int_digits, mut end) = scan_digit_run(line, chars, col, 10)?;
        let mut frac_digits = String::new();
        if end < chars.len() && chars[end] == '.' && end + 1 < chars.len() && chars[end + 1].is_ascii_digit() {
            end += 1;
            let (d, new_end) = scan_digit_run(line, chars, end, 10)?;
            frac_digits = d;
            end = new_end;
        }
        let mut is_float = !frac_digits.is_empty();
        let mut exponent: i32 = 0;
        if end < chars.len() && (chars[end] == 'e' || chars[end] == 'E') {
            is_float = true;
            let mut e = end + 1;
            let mut sign = 1i32;
            if e < chars.len() && (chars[e] == '+' || chars[e] == '-') {
                if chars[e] == '-' {
                    sign = -1;
                }
                e += 1;
            }
            let exp_start = e;
            while e < chars.len() && chars[e].is_ascii_digit() {
                e += 1;
            }
            if e == exp_start {
                return Err(CompileError::new(
                    Category::Tokenization,
                    Segment::single(line, e as u32, 1),
                    "expected digits in float exponent",
                ));
            }
            let digits: String = chars[exp_start..e].iter().collect();
            exponent = sign * digits.parse::<i32>().unwrap_or(0);
            end = e;
        }
        let width = (end - start) as u32;
        if is_float {
            let mantissa: String = format!("{int_digits}.{}", if frac_digits.is_empty() { "0" } else { &frac_digits });
            let value: f64 = mantissa.parse().unwrap_or(0.0);
            let value = value * 10f64.powi(exponent);
            Ok((Token::new(line, start as u32, width, TokenKind::Float(value)), end - start))
        } else {
            let value: u64 = int_digits.parse().map_err(|_| {
                CompileError::new(Category::Tokenization, Segment::single(line, start as u32, width), "integer literal out of range")
            })?;
            Ok((
                Token::new(line, start as u32, width, TokenKind::Int { value: value as i64, radix: IntRadix::Decimal }),
                end - start,
            ))
        }
    }

    fn lex_char(&self, line: u32, chars: &[char], col: usize) -> Result<(Token, usize), CompileError> {
        let start = col;
        let mut i = col + 1;
        let mut scalars: Vec<char> = Vec::new();
        while i < chars.len() && chars[i] != '\'' {
            if chars[i] == '\\' {
                let rest: String = chars[i + 1..].iter().collect();
                let mut it = rest.chars().peekable();
                let c = decode_escape(&mut it).map_err(|e| {
                    CompileError::new(Category::Tokenization, Segment::single(line, i as u32, 1), e.to_string())
                })?;
                let consumed = rest.chars().count() - it.count();
                scalars.push(c);
                i += 1 + consumed;
            } else {
                scalars.push(chars[i]);
                i += 1;
            }
        }
        if i >= chars.len() {
            return Err(CompileError::new(
                Category::Tokenization,
                Segment::single(line, start as u32, (i - start) as u32),
                "unterminated character literal",
            ));
        }
        let end = i + 1; // past closing '
        let width = (end - start) as u32;
        match scalars.len() {
            1 => Ok((Token::new(line, start as u32, width, TokenKind::Char(scalars[0])), end - start)),
            0 => Err(CompileError::new(Category::Tokenization, Segment::single(line, start as u32, width), "empty character literal")),
            _ => Err(CompileError::new(
                Category::Tokenization,
                Segment::single(line, start as u32, width),
                "character literal must hold exactly one scalar value",
            )),
        }
    }

    fn lex_string(&self, line: u32, chars: &[char], col: usize) -> Result<(Token, usize), CompileError> {
        let start = col;
        let mut i = col + 1;
        let mut out = String::new();
        loop {
            if i >= chars.len() {
                return Err(CompileError::new(
                    Category::Tokenization,
                    Segment::single(line, start as u32, (i - start) as u32),
                    "unterminated string literal",
                ));
            }
            if chars[i] == '"' {
                break;
            }
            if chars[i] == '\\' {
                let rest: String = chars[i + 1..].iter().collect();
                let mut it = rest.chars().peekable();
                let c = decode_escape(&mut it).map_err(|e| {
                    CompileError::new(Category::Tokenization, Segment::single(line, i as u32, 1), e.to_string())
                })?;
                let consumed = rest.chars().count() - it.count();
                out.push(c);
                i += 1 + consumed;
            } else {
                out.push(chars[i]);
                i += 1;
            }
        }
        let end = i + 1;
        let width = (end - start) as u32;
        Ok((Token::new(line, start as u32, width, TokenKind::Str(out)), end - start))
    }
}

fn underscore_error(line: u32, col: u32) -> CompileError {
    CompileError::new(
        Category::Tokenization,
        Segment::single(line, col, 1),
        "an underscore in a numeric literal must be between two digits",
    )
}

/// Scans a run of digits (radix `radix`) allowing internal (not leading or
/// trailing) underscores. Returns the digit text with underscores removed
/// and the index just past the run.
fn scan_digit_run(line: u32, chars: &[char], start: usize, radix: u32) -> Result<(String, usize), CompileError> {
    let mut end = start;
    let mut out = String::new();
    let mut last_was_digit = false;
    while end < chars.len() {
        let c = chars[end];
        if c.is_digit(radix) {
            out.push(c);
            last_was_digit = true;
            end += 1;
        } else if c == '_' {
            if !last_was_digit {
                return Err(underscore_error(line, end as u32));
            }
            last_was_digit = false;
            end += 1;
        } else {
            break;
        }
    }
    if end > start && !last_was_digit {
        return Err(underscore_error(line, (end - 1) as u32));
    }
    Ok((out, end))
}

fn hex_float_value(int_digits: &str, frac_digits: &str, exponent: i32) -> f64 {
    let mut value = 0f64;
    for c in int_digits.chars() {
        value = value * 16.0 + f64::from(c.to_digit(16).unwrap_or(0));
    }
    let mut scale = 1.0 / 16.0;
    for c in frac_digits.chars() {
        value += f64::from(c.to_digit(16).unwrap_or(0)) * scale;
        scale /= 16.0;
    }
    value * 2f64.powi(exponent)
}

fn opening_bracket(c: char) -> Option<char> {
    matches!(c, '(' | '[' | '{').then_some(c)
}

fn closing_for(c: char) -> Option<char> {
    match c {
        ')' => Some('('),
        ']' => Some('['),
        '}' => Some('{'),
        _ => None,
    }
}

fn closer_for(opener: char) -> char {
    match opener {
        '(' => ')',
        '[' => ']',
        '{' => '}',
        other => other,
    }
}

fn punct_for_bracket(opener: char) -> Punct {
    match opener {
        '(' => Punct::LParen,
        '[' => Punct::LBracket,
        '{' => Punct::LBrace,
        _ => unreachable!(),
    }
}

fn punct_for_bracket_close(closer: char) -> Punct {
    match closer {
        ')' => Punct::RParen,
        ']' => Punct::RBracket,
        '}' => Punct::RBrace,
        _ => unreachable!(),
    }
}

fn match_punct(chars: &[char], col: usize) -> Option<(String, Punct)> {
    let remaining: String = chars[col..].iter().take(4).collect();
    for (text, punct) in Punct::TABLE {
        if remaining.starts_with(text) {
            return Some(((*text).to_owned(), *punct));
        }
    }
    None
}

fn token_span(token: &Token) -> Segment {
    Segment::single(token.line, token.column, token.width)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenize(src: &str) -> Result<Vec<TokenKind>, CompileError> {
        let mut source = Source::new("t.pc", src);
        Lexer::new(&mut source).tokenize()?;
        Ok(source.tokens.into_iter().map(|t| t.kind).collect())
    }

    #[test]
    fn simple_let_statement() {
        let kinds = tokenize("let x = 1").unwrap();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Keyword(Keyword::Let),
                TokenKind::Identifier("x".into()),
                TokenKind::Punct(Punct::Assign),
                TokenKind::Int { value: 1, radix: IntRadix::Decimal },
                TokenKind::Linebreak,
            ]
        );
    }

    #[test]
    fn radix_prefixes() {
        let kinds = tokenize("0b101 0o17 0xFF").unwrap();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Int { value: 5, radix: IntRadix::Binary },
                TokenKind::Int { value: 15, radix: IntRadix::Octal },
                TokenKind::Int { value: 255, radix: IntRadix::Hex },
                TokenKind::Linebreak,
            ]
        );
    }

    #[test]
    fn hex_max_value() {
        let kinds = tokenize("0xFFFFFFFFFFFFFFFF").unwrap();
        assert_eq!(kinds[0], TokenKind::Int { value: -1, radix: IntRadix::Hex });
    }

    #[test]
    fn trailing_underscore_rejected() {
        assert!(tokenize("1_000_").is_err());
    }

    #[test]
    fn leading_zero_decimal_rejected() {
        assert!(tokenize("0123").is_err());
        assert!(tokenize("0.5").is_ok());
        assert!(tokenize("0").is_ok());
    }

    #[test]
    fn hex_float_with_p_exponent() {
        let kinds = tokenize("0x1.8p3").unwrap();
        match kinds[0] {
            TokenKind::Float(v) => assert!((v - 12.0).abs() < 1e-9),
            _ => panic!("expected float"),
        }
    }

    #[test]
    fn semicolon_lowers_to_linebreak() {
        let kinds = tokenize("let x = 1; let y = 2").unwrap();
        assert_eq!(kinds.iter().filter(|k| matches!(k, TokenKind::Linebreak)).count(), 2);
    }

    #[test]
    fn semicolon_inside_parens_is_rejected() {
        assert!(tokenize("f(1; 2)").is_err());
    }

    #[test]
    fn semicolon_inside_braces_is_allowed() {
        assert!(tokenize("{ let x = 1; x }").is_ok());
    }

    #[test]
    fn backslash_suppresses_linebreak() {
        let kinds = tokenize("1 + \\\n2").unwrap();
        assert_eq!(kinds.iter().filter(|k| matches!(k, TokenKind::Linebreak)).count(), 1);
    }

    #[test]
    fn unmatched_open_bracket_reports_all_leftovers() {
        let err = tokenize("f(g[1)").unwrap_err();
        assert_eq!(err.category, Category::Structural);
    }

    #[test]
    fn mismatched_closer_is_rejected() {
        let err = tokenize("(1]").unwrap_err();
        assert_eq!(err.category, Category::Structural);
    }

    #[test]
    fn char_literal_edge_cases() {
        assert!(tokenize("'a'").is_ok());
        assert!(tokenize("''").is_err());
        assert!(tokenize("'ab'").is_err());
        assert!(tokenize("'\\u10FFFF'").is_ok());
        assert!(tokenize("'\\uD800'").is_err());
    }

    #[test]
    fn identifiers_allow_unicode() {
        let kinds = tokenize("let café = 1").unwrap();
        assert_eq!(kinds[1], TokenKind::Identifier("café".into()));
    }
}
