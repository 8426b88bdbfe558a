//! Indentation-aware tokenizer.
//!
//! Logical-line structure is synthesized into the token stream: INDENT and
//! DEDENT tokens are produced from a stack of column widths, blank and
//! comment-only lines are invisible, and the stack is drained before EOF.
//! Lexical errors land in the shared diagnostics sink and the lexer
//! resynchronizes at the next physical newline, so one pass can surface
//! several errors.

use thiserror::Error;

use crate::diagnostics::{DiagnosticKind, Diagnostics, Phase};
use crate::token::{Span, Token, TokenKind};

#[derive(Debug, Error, PartialEq)]
pub enum LexError {
    #[error("unexpected character '{character}'")]
    UnexpectedCharacter {
        character: char,
        line: usize,
        column: usize,
    },
    #[error("unterminated string literal")]
    UnterminatedString { line: usize, column: usize },
    #[error("tabs are not supported in indentation")]
    MixedTabsAndSpaces { line: usize, column: usize },
    #[error("dedent to {found} spaces matches no enclosing indentation level")]
    InconsistentIndentation {
        found: usize,
        line: usize,
        column: usize,
    },
    #[error("invalid numeric literal '{literal}'")]
    InvalidNumber {
        literal: String,
        line: usize,
        column: usize,
    },
}

impl LexError {
    fn kind(&self) -> DiagnosticKind {
        match self {
            LexError::UnexpectedCharacter { .. } => DiagnosticKind::UnexpectedCharacter,
            LexError::UnterminatedString { .. } => DiagnosticKind::UnterminatedString,
            LexError::MixedTabsAndSpaces { .. } => DiagnosticKind::MixedTabsAndSpaces,
            LexError::InconsistentIndentation { .. } => DiagnosticKind::InconsistentIndentation,
            LexError::InvalidNumber { .. } => DiagnosticKind::InvalidNumber,
        }
    }

    fn position(&self) -> (usize, usize) {
        match *self {
            LexError::UnexpectedCharacter { line, column, .. }
            | LexError::UnterminatedString { line, column }
            | LexError::MixedTabsAndSpaces { line, column }
            | LexError::InconsistentIndentation { line, column, .. }
            | LexError::InvalidNumber { line, column, .. } => (line, column),
        }
    }
}

type LexResult<T> = Result<T, LexError>;

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    indent_stack: Vec<usize>,
    tokens: Vec<Token<'a>>,
    at_line_start: bool,
}

/// Tokenizes `input`, recording lexical errors in `diagnostics`.
///
/// The returned stream always ends with EOF; INDENT/DEDENT counts are
/// balanced even when errors were recorded.
pub fn tokenize<'a>(input: &'a str, diagnostics: &mut Diagnostics) -> Vec<Token<'a>> {
    Lexer::new(input).run(diagnostics)
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            line: 1,
            column: 1,
            indent_stack: vec![0],
            tokens: Vec::new(),
            at_line_start: true,
        }
    }

    fn run(mut self, diagnostics: &mut Diagnostics) -> Vec<Token<'a>> {
        while self.peek_char().is_some() {
            let step = if self.at_line_start {
                self.begin_line(diagnostics)
            } else {
                self.next_content_token()
            };
            if let Err(error) = step {
                let (line, column) = error.position();
                diagnostics.error(Phase::Lex, error.kind(), line, column, error.to_string());
                self.skip_to_line_end();
            }
        }
        self.finish();
        self.tokens
    }

    /// Handles indentation at the start of a logical line. Blank and
    /// comment-only lines emit nothing and leave the indent stack alone.
    fn begin_line(&mut self, diagnostics: &mut Diagnostics) -> LexResult<()> {
        let indent = self.consume_while(|c| c == ' ');
        match self.peek_char() {
            Some('\t') => {
                return Err(LexError::MixedTabsAndSpaces {
                    line: self.line,
                    column: self.column,
                });
            }
            Some('\n') | Some('\r') => {
                self.skip_past_newline();
                return Ok(());
            }
            Some('#') => {
                self.consume_while(|c| c != '\n');
                self.skip_past_newline();
                return Ok(());
            }
            None => return Ok(()),
            _ => {}
        }

        self.at_line_start = false;
        self.adjust_indentation(indent, diagnostics);
        Ok(())
    }

    fn adjust_indentation(&mut self, indent: usize, diagnostics: &mut Diagnostics) {
        let span = Span::at(self.pos, self.pos, self.line, self.column);
        let current = self.current_indent();

        if indent > current {
            self.indent_stack.push(indent);
            self.tokens.push(Token::new(TokenKind::Indent, span));
            return;
        }

        while self.current_indent() > indent && self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.tokens.push(Token::new(TokenKind::Dedent, span));
        }
        if self.current_indent() != indent {
            // Snap to the nearest enclosing level and keep lexing the line
            // so later errors on it are still reported.
            let error = LexError::InconsistentIndentation {
                found: indent,
                line: self.line,
                column: self.column,
            };
            diagnostics.error(
                Phase::Lex,
                error.kind(),
                self.line,
                self.column,
                error.to_string(),
            );
        }
    }

    fn next_content_token(&mut self) -> LexResult<()> {
        let ch = match self.peek_char() {
            Some(ch) => ch,
            None => return Ok(()),
        };

        match ch {
            '\n' => {
                let span = Span::at(self.pos, self.pos + 1, self.line, self.column);
                self.consume_char();
                self.tokens.push(Token::new(TokenKind::Newline, span));
                self.at_line_start = true;
            }
            ' ' | '\t' | '\r' => {
                self.consume_while(|c| c == ' ' || c == '\t' || c == '\r');
            }
            '#' => {
                self.consume_while(|c| c != '\n');
            }
            '"' | '\'' => {
                let token = self.read_string(ch)?;
                self.tokens.push(token);
            }
            c if c.is_ascii_digit() => {
                let token = self.read_number()?;
                self.tokens.push(token);
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let token = self.read_identifier();
                self.tokens.push(token);
            }
            _ => {
                let token = self.read_operator()?;
                self.tokens.push(token);
            }
        }
        Ok(())
    }

    fn read_identifier(&mut self) -> Token<'a> {
        let start = self.pos;
        let (line, column) = (self.line, self.column);
        self.consume_while(|c| c.is_ascii_alphanumeric() || c == '_');
        let lexeme = &self.input[start..self.pos];

        let kind = match lexeme {
            "if" => TokenKind::If,
            "elif" => TokenKind::Elif,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "for" => TokenKind::For,
            "in" => TokenKind::In,
            "def" => TokenKind::Def,
            "return" => TokenKind::Return,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "True" => TokenKind::Boolean(true),
            "False" => TokenKind::Boolean(false),
            "None" => TokenKind::None,
            "break" | "continue" | "pass" | "import" | "from" | "as" | "class" => {
                TokenKind::Reserved(lexeme)
            }
            _ => TokenKind::Identifier(lexeme),
        };
        Token::new(kind, Span::at(start, self.pos, line, column))
    }

    fn read_number(&mut self) -> LexResult<Token<'a>> {
        let start = self.pos;
        let (line, column) = (self.line, self.column);
        self.consume_while(|c| c.is_ascii_digit());

        let is_float = if self.peek_char() == Some('.') {
            self.consume_char();
            let fraction = self.consume_while(|c| c.is_ascii_digit());
            if fraction == 0 {
                return Err(LexError::InvalidNumber {
                    literal: self.input[start..self.pos].to_string(),
                    line,
                    column,
                });
            }
            true
        } else {
            false
        };

        let lexeme = &self.input[start..self.pos];
        let span = Span::at(start, self.pos, line, column);
        if is_float {
            let value: f64 = lexeme.parse().map_err(|_| LexError::InvalidNumber {
                literal: lexeme.to_string(),
                line,
                column,
            })?;
            Ok(Token::new(TokenKind::Float(value), span))
        } else {
            let value: i64 = lexeme.parse().map_err(|_| LexError::InvalidNumber {
                literal: lexeme.to_string(),
                line,
                column,
            })?;
            Ok(Token::new(TokenKind::Integer(value), span))
        }
    }

    fn read_string(&mut self, quote: char) -> LexResult<Token<'a>> {
        let start = self.pos;
        let (line, column) = (self.line, self.column);
        self.consume_char();

        let mut value = String::new();
        loop {
            match self.peek_char() {
                None | Some('\n') => {
                    return Err(LexError::UnterminatedString { line, column });
                }
                Some(c) if c == quote => {
                    self.consume_char();
                    break;
                }
                Some('\\') => {
                    self.consume_char();
                    match self.peek_char() {
                        None | Some('\n') => {
                            return Err(LexError::UnterminatedString { line, column });
                        }
                        Some(escaped) => {
                            self.consume_char();
                            value.push(match escaped {
                                'n' => '\n',
                                't' => '\t',
                                'r' => '\r',
                                '\\' => '\\',
                                '\'' => '\'',
                                '"' => '"',
                                // Unknown escapes keep the character verbatim.
                                other => other,
                            });
                        }
                    }
                }
                Some(c) => {
                    self.consume_char();
                    value.push(c);
                }
            }
        }

        Ok(Token::new(
            TokenKind::Str(value),
            Span::at(start, self.pos, line, column),
        ))
    }

    fn read_operator(&mut self) -> LexResult<Token<'a>> {
        let start = self.pos;
        let (line, column) = (self.line, self.column);
        let ch = match self.peek_char() {
            Some(ch) => ch,
            None => {
                return Err(LexError::UnexpectedCharacter {
                    character: '\0',
                    line,
                    column,
                });
            }
        };

        // Two-character operators take priority over their prefixes.
        let two = {
            let rest = &self.input[self.pos..];
            let mut chars = rest.chars();
            let first = chars.next();
            let second = chars.next();
            match (first, second) {
                (Some(a), Some(b)) => Some((a, b)),
                _ => None,
            }
        };
        if let Some(pair) = two {
            let kind = match pair {
                ('*', '*') => Some(TokenKind::Power),
                ('=', '=') => Some(TokenKind::Equal),
                ('!', '=') => Some(TokenKind::NotEqual),
                ('<', '=') => Some(TokenKind::LessEqual),
                ('>', '=') => Some(TokenKind::GreaterEqual),
                ('-', '>') => Some(TokenKind::Arrow),
                _ => None,
            };
            if let Some(kind) = kind {
                self.consume_char();
                self.consume_char();
                return Ok(Token::new(kind, Span::at(start, self.pos, line, column)));
            }
        }

        let kind = match ch {
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '=' => TokenKind::Assign,
            '<' => TokenKind::Less,
            '>' => TokenKind::Greater,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            ';' => TokenKind::Semicolon,
            '.' => TokenKind::Dot,
            '@' => TokenKind::At,
            _ => {
                return Err(LexError::UnexpectedCharacter {
                    character: ch,
                    line,
                    column,
                });
            }
        };
        self.consume_char();
        Ok(Token::new(kind, Span::at(start, self.pos, line, column)))
    }

    /// Error recovery: drop the rest of the physical line, closing it with
    /// a NEWLINE token when it already produced content.
    fn skip_to_line_end(&mut self) {
        self.consume_while(|c| c != '\n');
        if self.line_has_content() {
            let span = Span::at(self.pos, self.pos, self.line, self.column);
            self.tokens.push(Token::new(TokenKind::Newline, span));
        }
        self.skip_past_newline();
    }

    fn skip_past_newline(&mut self) {
        self.consume_while(|c| c == '\r');
        if self.peek_char() == Some('\n') {
            self.consume_char();
        }
        self.at_line_start = true;
    }

    fn line_has_content(&self) -> bool {
        matches!(
            self.tokens.last().map(|token| &token.kind),
            Some(kind) if !matches!(
                kind,
                TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent
            )
        )
    }

    /// Closes the stream: a synthetic NEWLINE for an unterminated final
    /// line, one DEDENT per open indentation level, then EOF.
    fn finish(&mut self) {
        let span = Span::at(self.pos, self.pos, self.line, self.column);
        if !self.at_line_start {
            self.tokens.push(Token::new(TokenKind::Newline, span));
        }
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.tokens.push(Token::new(TokenKind::Dedent, span));
        }
        self.tokens.push(Token::new(TokenKind::EOF, span));
    }

    fn current_indent(&self) -> usize {
        self.indent_stack.last().copied().unwrap_or(0)
    }

    fn consume_while<P>(&mut self, keep: P) -> usize
    where
        P: Fn(char) -> bool,
    {
        let mut count = 0;
        while let Some(c) = self.peek_char() {
            if !keep(c) {
                break;
            }
            self.consume_char();
            count += 1;
        }
        count
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn consume_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn kinds(input: &str) -> Vec<TokenKind<'_>> {
        let mut diagnostics = Diagnostics::new();
        let tokens = tokenize(input, &mut diagnostics);
        assert!(
            !diagnostics.has_errors(),
            "unexpected lex errors: {:?}",
            diagnostics.iter().collect::<Vec<_>>()
        );
        tokens.into_iter().map(|token| token.kind).collect()
    }

    #[test]
    fn tokenizes_function_with_indented_body() {
        let input = indoc! {"
            def double(n):
                m = n * 2
                return m
            double(4)
        "};
        let expected = vec![
            TokenKind::Def,
            TokenKind::Identifier("double"),
            TokenKind::LParen,
            TokenKind::Identifier("n"),
            TokenKind::RParen,
            TokenKind::Colon,
            TokenKind::Newline,
            TokenKind::Indent,
            TokenKind::Identifier("m"),
            TokenKind::Assign,
            TokenKind::Identifier("n"),
            TokenKind::Star,
            TokenKind::Integer(2),
            TokenKind::Newline,
            TokenKind::Return,
            TokenKind::Identifier("m"),
            TokenKind::Newline,
            TokenKind::Dedent,
            TokenKind::Identifier("double"),
            TokenKind::LParen,
            TokenKind::Integer(4),
            TokenKind::RParen,
            TokenKind::Newline,
            TokenKind::EOF,
        ];
        assert_eq!(kinds(input), expected);
    }

    #[test]
    fn two_character_operators_win_over_prefixes() {
        let observed = kinds("a ** b == c <= d >= e != f -> g\n");
        assert!(observed.contains(&TokenKind::Power));
        assert!(observed.contains(&TokenKind::Equal));
        assert!(observed.contains(&TokenKind::LessEqual));
        assert!(observed.contains(&TokenKind::GreaterEqual));
        assert!(observed.contains(&TokenKind::NotEqual));
        assert!(observed.contains(&TokenKind::Arrow));
        assert!(!observed.contains(&TokenKind::Star));
        assert!(!observed.contains(&TokenKind::Assign));
    }

    #[test]
    fn blank_and_comment_lines_do_not_affect_indentation() {
        let input = indoc! {"
            if True:
                x = 1

                # interior comment
                y = 2
        "};
        let observed = kinds(input);
        let indents = observed
            .iter()
            .filter(|kind| matches!(kind, TokenKind::Indent))
            .count();
        let dedents = observed
            .iter()
            .filter(|kind| matches!(kind, TokenKind::Dedent))
            .count();
        assert_eq!(indents, 1);
        assert_eq!(dedents, 1);
        // No NEWLINE tokens for the blank or comment-only lines.
        let newlines = observed
            .iter()
            .filter(|kind| matches!(kind, TokenKind::Newline))
            .count();
        assert_eq!(newlines, 3);
    }

    #[test]
    fn drains_dedents_before_eof_without_trailing_newline() {
        let observed = kinds("if True:\n    if True:\n        x = 1");
        let tail: Vec<_> = observed[observed.len() - 4..].to_vec();
        assert_eq!(
            tail,
            vec![
                TokenKind::Newline,
                TokenKind::Dedent,
                TokenKind::Dedent,
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    fn decodes_string_escapes() {
        let observed = kinds("s = 'a\\tb\\n\\'c\\\\'\n");
        assert_eq!(observed[2], TokenKind::Str("a\tb\n'c\\".to_string()));
    }

    #[test]
    fn double_quoted_strings_accept_embedded_single_quotes() {
        let observed = kinds("s = \"it's\"\n");
        assert_eq!(observed[2], TokenKind::Str("it's".to_string()));
    }

    #[test]
    fn reads_float_literals() {
        let observed = kinds("pi = 3.25\n");
        assert_eq!(observed[2], TokenKind::Float(3.25));
    }

    #[test]
    fn trailing_dot_is_an_invalid_number() {
        let mut diagnostics = Diagnostics::new();
        tokenize("x = 12.\n", &mut diagnostics);
        let entry = diagnostics.iter().next().expect("one diagnostic");
        assert_eq!(entry.kind, DiagnosticKind::InvalidNumber);
        assert_eq!(entry.line, 1);
        assert_eq!(entry.column, 5);
    }

    #[test]
    fn integer_overflow_is_an_invalid_number() {
        let mut diagnostics = Diagnostics::new();
        tokenize("n = 99999999999999999999999999\n", &mut diagnostics);
        assert_eq!(
            diagnostics.iter().next().map(|entry| entry.kind),
            Some(DiagnosticKind::InvalidNumber)
        );
    }

    #[test]
    fn rejects_tab_indentation() {
        let mut diagnostics = Diagnostics::new();
        tokenize("if True:\n\tx = 1\n", &mut diagnostics);
        assert_eq!(
            diagnostics.iter().next().map(|entry| entry.kind),
            Some(DiagnosticKind::MixedTabsAndSpaces)
        );
    }

    #[test]
    fn reports_inconsistent_dedent_and_continues() {
        let input = indoc! {"
            if True:
                x = 1
              y = 2
        "};
        let mut diagnostics = Diagnostics::new();
        let tokens = tokenize(input, &mut diagnostics);
        assert_eq!(
            diagnostics.iter().next().map(|entry| entry.kind),
            Some(DiagnosticKind::InconsistentIndentation)
        );
        // The offending line is still tokenized after the stack snaps back.
        assert!(tokens
            .iter()
            .any(|token| token.kind == TokenKind::Identifier("y")));
    }

    #[test]
    fn unterminated_string_reports_and_resynchronizes() {
        let input = indoc! {"
            a = 'abc
            b = 2
        "};
        let mut diagnostics = Diagnostics::new();
        let tokens = tokenize(input, &mut diagnostics);
        let entry = diagnostics.iter().next().expect("one diagnostic");
        assert_eq!(entry.kind, DiagnosticKind::UnterminatedString);
        assert_eq!((entry.line, entry.column), (1, 5));
        assert!(tokens
            .iter()
            .any(|token| token.kind == TokenKind::Identifier("b")));
    }

    #[test]
    fn collects_multiple_errors_in_one_pass() {
        let input = indoc! {"
            a = $
            b = 'open
            c = 3
        "};
        let mut diagnostics = Diagnostics::new();
        let tokens = tokenize(input, &mut diagnostics);
        let observed: Vec<_> = diagnostics.iter().map(|entry| entry.kind).collect();
        assert_eq!(
            observed,
            vec![
                DiagnosticKind::UnexpectedCharacter,
                DiagnosticKind::UnterminatedString,
            ]
        );
        assert!(tokens
            .iter()
            .any(|token| token.kind == TokenKind::Identifier("c")));
    }

    #[test]
    fn reserved_keywords_produce_reserved_tokens() {
        let observed = kinds("class\n");
        assert_eq!(observed[0], TokenKind::Reserved("class"));
    }

    #[test]
    fn comment_after_content_still_ends_the_line() {
        let observed = kinds("x = 1  # trailing note\ny = 2\n");
        let newlines = observed
            .iter()
            .filter(|kind| matches!(kind, TokenKind::Newline))
            .count();
        assert_eq!(newlines, 2);
    }

    #[test]
    fn empty_input_produces_only_eof() {
        assert_eq!(kinds(""), vec![TokenKind::EOF]);
        assert_eq!(kinds("\n"), vec![TokenKind::EOF]);
        assert_eq!(kinds("   \n  # just a comment\n"), vec![TokenKind::EOF]);
    }

    #[test]
    fn tracks_line_and_column_positions() {
        let mut diagnostics = Diagnostics::new();
        let tokens = tokenize("x = 5\ny = x\n", &mut diagnostics);
        let y = tokens
            .iter()
            .find(|token| token.kind == TokenKind::Identifier("y"))
            .expect("y token");
        assert_eq!((y.span.line, y.span.column), (2, 1));
        let x_ref = tokens
            .iter()
            .filter(|token| token.kind == TokenKind::Identifier("x"))
            .nth(1)
            .expect("second x token");
        assert_eq!((x_ref.span.line, x_ref.span.column), (2, 5));
    }
}
