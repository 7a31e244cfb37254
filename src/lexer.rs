use crate::config::Options;
use crate::error::LexingError;
use crate::source::SourceText;
use crate::token::{Kind, SourcePosition, Token};

/// Turns script text into a lazy stream of tokens.
///
/// Lexical problems never stop the stream. They are recorded, handed to the
/// `on_error` callback if one is set, and lexing resumes after the bad input.
/// The stream ends with exactly one `EndOfFile` token.
pub struct Lexer<'a> {
    source: SourceText,
    line: usize,
    column: usize,
    var_decl_sym: char,
    string_begin_sym: char,
    string_end_sym: char,
    line_comment_sym: char,
    string_length_limit: usize,
    errors: Vec<LexingError>,
    on_error: Option<Box<dyn FnMut(&LexingError) + 'a>>,
    finished: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: SourceText, options: &Options) -> Self {
        Self {
            source,
            line: 1,
            column: 1,
            var_decl_sym: options.variable_declaration_symbol,
            string_begin_sym: options.string_begin_symbol,
            string_end_sym: options.string_end_symbol,
            line_comment_sym: options.line_comment_symbol,
            string_length_limit: options.string_length_limit,
            errors: Vec::new(),
            on_error: None,
            finished: false,
        }
    }

    pub fn from_text(input: &str, options: &Options) -> Self {
        Self::new(SourceText::new(input), options)
    }

    pub fn on_error(mut self, handler: impl FnMut(&LexingError) + 'a) -> Self {
        self.on_error = Some(Box::new(handler));
        self
    }

    pub fn source(&self) -> &SourceText {
        &self.source
    }

    pub fn errors(&self) -> &[LexingError] {
        &self.errors
    }

    /// Seeks back to the start so the token stream can be read again.
    pub fn reset(&mut self) {
        self.source.seek(0);
        self.line = 1;
        self.column = 1;
        self.errors.clear();
        self.finished = false;
    }

    /// Text a token covers, with number separators stripped.
    pub fn text(&self, token: &Token) -> String {
        match token.kind {
            Kind::Number => self.source.read_skipping(token.start, token.length, ','),
            _ => self.source.read(token.start, token.length),
        }
    }

    pub fn current_position(&self) -> SourcePosition {
        SourcePosition::new(self.line, self.column, self.source.position())
    }

    fn peek(&self, steps: usize) -> Option<char> {
        self.source.peek(steps)
    }

    fn peek_is_digit(&self, steps: usize) -> bool {
        self.peek(steps).is_some_and(|c| c.is_ascii_digit())
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.source.next_char()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn report(&mut self, message: String, position: SourcePosition) {
        let error = LexingError::new(message, position);
        tracing::debug!("{}", error);
        if let Some(handler) = self.on_error.as_mut() {
            handler(&error);
        }
        self.errors.push(error);
    }

    fn report_unexpected(&mut self, expected: &str) {
        let found = describe(self.peek(0));
        let position = self.current_position();
        self.report(format!("Expected {} but got '{}'", expected, found), position);
    }

    fn create_token(&mut self, kind: Kind) -> Token {
        let position = self.current_position();
        let start = self.source.position();
        self.advance();
        Token::new(kind, start, 1, position)
    }

    fn next_token(&mut self) -> Option<Token> {
        loop {
            let Some(c) = self.peek(0) else {
                self.finished = true;
                let position = self.current_position();
                return Some(Token::new(Kind::EndOfFile, self.source.position(), 0, position));
            };

            let token = if c == self.line_comment_sym {
                self.skip_line_comment();
                None
            } else if c == self.string_begin_sym {
                self.match_string()
            } else if c == self.var_decl_sym {
                self.match_variable()
            } else {
                match c {
                    '\r' | '\n' | '.' | ',' => {
                        self.advance();
                        None
                    }
                    '-' => {
                        if self.peek_is_digit(1) {
                            self.match_number()
                        } else {
                            Some(self.create_token(Kind::Minus))
                        }
                    }
                    '%' => Some(self.create_token(Kind::Mod)),
                    '0' if matches!(self.peek(1), Some('x' | 'X')) => self.match_number(),
                    '0'..='9' => self.match_trigger(),
                    _ => {
                        self.advance();
                        None
                    }
                }
            };

            if token.is_some() {
                return token;
            }
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.advance() {
            if c == '\n' {
                break;
            }
        }
    }

    fn match_string(&mut self) -> Option<Token> {
        let position = self.current_position();
        self.advance(); // begin symbol
        let start = self.source.position();
        let mut length = 0;
        loop {
            match self.peek(0) {
                None => {
                    self.report(
                        format!(
                            "Unexpected end of file, string was not terminated with a '{}'",
                            self.string_end_sym
                        ),
                        position,
                    );
                    return None;
                }
                Some(c) if c == self.string_end_sym => {
                    self.advance();
                    break;
                }
                Some(_) => {
                    if length >= self.string_length_limit {
                        self.report(
                            format!(
                                "String exceeded limit of {} characters or was not terminated with a '{}'",
                                self.string_length_limit, self.string_end_sym
                            ),
                            position,
                        );
                        self.skip_past(self.string_end_sym);
                        return None;
                    }
                    self.advance();
                    length += 1;
                }
            }
        }
        Some(Token::new(Kind::StringLiteral, start, length, position))
    }

    fn match_variable(&mut self) -> Option<Token> {
        let position = self.current_position();
        let start = self.source.position();
        self.advance(); // declaration symbol
        let mut length = 1;
        while self.peek(0).is_some_and(is_name_char) {
            self.advance();
            length += 1;
        }
        if length == 1 {
            self.report_unexpected("variable name");
            return None;
        }

        match self.peek(0) {
            Some('[') => {
                self.advance();
                length += 1;
                while self.peek(0).is_some_and(is_name_char) {
                    self.advance();
                    length += 1;
                }
                if self.peek(0) != Some(']') {
                    self.report_unexpected("']'");
                    return None;
                }
                self.advance();
                length += 1;
                Some(Token::new(Kind::Table, start, length, position))
            }
            Some('.') if self.peek(1).is_some_and(is_name_char) => {
                self.advance();
                length += 1;
                while self.peek(0).is_some_and(is_name_char) {
                    self.advance();
                    length += 1;
                }
                Some(Token::new(Kind::ObjectVariable, start, length, position))
            }
            _ => Some(Token::new(Kind::Variable, start, length, position)),
        }
    }

    fn match_number(&mut self) -> Option<Token> {
        let position = self.current_position();
        let start = self.source.position();
        let mut length = 0;

        if self.peek(0) == Some('-') {
            self.advance();
            length += 1;
        }

        if self.peek(0) == Some('0') && matches!(self.peek(1), Some('x' | 'X')) {
            self.advance();
            self.advance();
            length += 2;
            let digits = length;
            while self.peek(0).is_some_and(|c| c.is_ascii_hexdigit()) {
                self.advance();
                length += 1;
            }
            if length == digits {
                self.report_unexpected("hexadecimal digit");
                self.skip_malformed_number();
                return None;
            }
            match self.peek(0) {
                Some(c @ '.') if self.peek_is_digit(1) => {
                    self.report_in_hex(c);
                    return None;
                }
                Some(c @ ('x' | 'X')) => {
                    self.report_in_hex(c);
                    return None;
                }
                _ => {}
            }
            return Some(Token::new(Kind::Number, start, length, position));
        }

        let mut decimal = false;
        let mut exponent = false;
        loop {
            match self.peek(0) {
                Some(c) if c.is_ascii_digit() => {
                    self.advance();
                    length += 1;
                }
                // thousands separator, skipped and not counted
                Some(',') if self.peek_is_digit(1) => {
                    self.advance();
                }
                Some('.') if !decimal && !exponent && self.peek_is_digit(1) => {
                    decimal = true;
                    self.advance();
                    length += 1;
                }
                Some('e' | 'E') if !exponent => {
                    let signed = matches!(self.peek(1), Some('+' | '-'));
                    let digit_at = if signed { 2 } else { 1 };
                    if !self.peek_is_digit(digit_at) {
                        break;
                    }
                    exponent = true;
                    self.advance();
                    length += 1;
                    if signed {
                        self.advance();
                        length += 1;
                    }
                }
                _ => break,
            }
        }
        Some(Token::new(Kind::Number, start, length, position))
    }

    fn report_in_hex(&mut self, c: char) {
        let position = self.current_position();
        self.report(
            format!("Unexpected '{}' in hexadecimal number", c.escape_default()),
            position,
        );
        self.skip_malformed_number();
    }

    fn skip_malformed_number(&mut self) {
        while self
            .peek(0)
            .is_some_and(|c| c.is_ascii_alphanumeric() || (c == '.' && self.peek_is_digit(1)))
        {
            self.advance();
        }
    }

    fn skip_past(&mut self, end: char) {
        while let Some(c) = self.advance() {
            if c == end {
                break;
            }
        }
    }

    fn match_trigger(&mut self) -> Option<Token> {
        if self.peek(1) != Some(':') {
            return self.match_number();
        }
        let position = self.current_position();
        let start = self.source.position();
        self.advance(); // category
        self.advance(); // separator
        let mut length = 2;
        if !self.peek_is_digit(0) {
            self.report_unexpected("number");
            return None;
        }
        while self.peek_is_digit(0) {
            self.advance();
            length += 1;
        }
        Some(Token::new(Kind::Trigger, start, length, position))
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.finished {
            return None;
        }
        let token = self.next_token();
        if let Some(token) = &token {
            tracing::trace!("{}", token);
        }
        token
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '@' | '$' | '&')
}

fn describe(c: Option<char>) -> String {
    match c {
        Some(c) => c.escape_default().to_string(),
        None => "END_OF_FILE".to_string(),
    }
}
