use std::io::Read;

/// Seekable, peekable character source the lexer pulls from.
///
/// The whole script is decoded up front so peeking and seeking never fail;
/// the only fatal failure is the initial read.
#[derive(Debug, Clone)]
pub struct SourceText {
    chars: Vec<char>,
    position: usize,
}

impl SourceText {
    pub fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            position: 0,
        }
    }

    pub fn from_reader<R: Read>(mut reader: R) -> std::io::Result<Self> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Ok(Self::new(&text))
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn seek(&mut self, position: usize) {
        self.position = position.min(self.chars.len());
    }

    pub fn is_eof(&self) -> bool {
        self.position >= self.chars.len()
    }

    /// Character `steps` ahead of the cursor; `peek(0)` is the next character to be read.
    pub fn peek(&self, steps: usize) -> Option<char> {
        self.chars.get(self.position + steps).copied()
    }

    pub fn next_char(&mut self) -> Option<char> {
        let c = self.chars.get(self.position).copied();
        if c.is_some() {
            self.position += 1;
        }
        c
    }

    /// Reads `length` characters starting at `start` without moving the cursor.
    pub fn read(&self, start: usize, length: usize) -> String {
        let end = (start + length).min(self.chars.len());
        let start = start.min(end);
        self.chars[start..end].iter().collect()
    }

    /// Reads `length` characters starting at `start`, stepping over `skip`
    /// without counting it.
    pub fn read_skipping(&self, start: usize, length: usize, skip: char) -> String {
        self.chars
            .iter()
            .skip(start)
            .filter(|&&c| c != skip)
            .take(length)
            .collect()
    }
}
