use std::fmt;

/// Where a token or expression started in the script text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourcePosition {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl SourcePosition {
    pub const fn new(line: usize, column: usize, offset: usize) -> Self {
        Self { line, column, offset }
    }
}

impl Default for SourcePosition {
    fn default() -> Self {
        Self::new(1, 1, 0)
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}:{}]", self.line, self.column)
    }
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub struct Token {
    pub(crate) kind: Kind,
    pub(crate) start: usize,
    pub(crate) length: usize,
    pub(crate) position: SourcePosition,
}

impl Token {
    pub fn new(kind: Kind, start: usize, length: usize, position: SourcePosition) -> Self {
        Self {
            kind,
            start,
            length,
            position,
        }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Offset of the first value character in the source.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Number of value characters. Thousands separators inside numbers are not counted.
    pub fn length(&self) -> usize {
        self.length
    }

    pub fn position(&self) -> SourcePosition {
        self.position
    }

    pub fn set_kind(&mut self, kind: Kind) {
        self.kind = kind;
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:?} {} start={} len={}",
            self.kind, self.position, self.start, self.length
        )
    }
}

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Kind {
    None,
    EndOfFile,

    // (0:1)
    Trigger,

    // Operands
    StringLiteral,  // {text}
    Number,         // 12, -1.5, 1,000, 0x1F, 5E+3
    Variable,       // %name
    Table,          // %name[key]
    ObjectVariable, // %name.member

    // Punctuation with no operand meaning
    Mod,
    Minus,

    Comment,
}
