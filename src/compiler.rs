use std::io::{self, Read, Write};

use crate::config::Version;
use crate::error::{Error, Result};
use crate::expression::{ExprArena, ExprValue, Expression};
use crate::token::SourcePosition;
use crate::trigger::{Script, Trigger, TriggerBlock, TriggerCategory};

/// Content tag written before each operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContentTag {
    String = 1,
    Number = 2,
    Variable = 3,
    VariableTable = 4,
}

impl ContentTag {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(ContentTag::String),
            2 => Some(ContentTag::Number),
            3 => Some(ContentTag::Variable),
            4 => Some(ContentTag::VariableTable),
            _ => None,
        }
    }
}

/// Reads and writes the binary form of a script.
///
/// All integers are little-endian and strings carry a 7-bit encoded byte
/// length, so the files are interchangeable with the .NET `BinaryWriter`
/// layout used by older hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct Compiler {
    version: Version,
}

impl Compiler {
    pub fn new(version: Version) -> Self {
        Self { version }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn compile_to<W: Write>(&self, script: &Script, writer: &mut W) -> Result<()> {
        let mut out = Encoder { writer };
        out.write_i32(self.version.major)?;
        out.write_i32(self.version.minor)?;
        out.write_len(script.blocks().len())?;
        for block in script.blocks() {
            out.write_len(block.len())?;
            for trigger in block.iter() {
                out.write_i32(trigger.category() as i32)?;
                out.write_i32(trigger.id())?;
                let contents = script.contents(trigger);
                out.write_len(contents.len())?;
                for expr in contents {
                    out.write_expression(expr)?;
                }
            }
        }
        out.writer.flush()?;
        Ok(())
    }

    pub fn decompile_from<R: Read>(&self, reader: &mut R) -> Result<Script> {
        let mut input = Decoder { reader };
        let major = input.read_i32()?;
        let minor = input.read_i32()?;
        tracing::debug!("decompiling script version {}.{}", major, minor);
        match major {
            1 => Err(Error::IncompatibleVersion { major, minor }),
            // 6 and 7 share a layout; newer majors are read the same way
            _ => input.read_version_7(),
        }
    }
}

/// Counts are stored as `i32`.
pub(crate) fn checked_count(len: usize) -> Result<i32> {
    i32::try_from(len).map_err(|_| Error::Encode(format!("count {} does not fit in 32 bits", len)))
}

struct Encoder<'w, W: Write> {
    writer: &'w mut W,
}

impl<W: Write> Encoder<'_, W> {
    fn write_i32(&mut self, value: i32) -> io::Result<()> {
        self.writer.write_all(&value.to_le_bytes())
    }

    fn write_len(&mut self, len: usize) -> Result<()> {
        Ok(self.write_i32(checked_count(len)?)?)
    }

    fn write_string(&mut self, value: &str) -> io::Result<()> {
        let mut len = value.len();
        while len >= 0x80 {
            self.writer.write_all(&[(len as u8 & 0x7F) | 0x80])?;
            len >>= 7;
        }
        self.writer.write_all(&[len as u8])?;
        self.writer.write_all(value.as_bytes())
    }

    fn write_expression(&mut self, expr: &Expression) -> io::Result<()> {
        match expr.value() {
            ExprValue::String(s) => {
                self.writer.write_all(&[ContentTag::String as u8])?;
                self.write_string(s)
            }
            ExprValue::Number(n) => {
                self.writer.write_all(&[ContentTag::Number as u8])?;
                self.writer.write_all(&n.to_le_bytes())
            }
            ExprValue::Variable(name) => {
                self.writer.write_all(&[ContentTag::Variable as u8])?;
                self.write_string(name)
            }
            ExprValue::VariableTable { name, indexer } => {
                self.writer.write_all(&[ContentTag::VariableTable as u8])?;
                self.write_string(name)?;
                self.write_string(indexer.as_deref().unwrap_or(""))
            }
        }
    }
}

struct Decoder<'r, R: Read> {
    reader: &'r mut R,
}

impl<R: Read> Decoder<'_, R> {
    fn read_exact<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.reader.read_exact(&mut buf).map_err(|err| match err.kind() {
            io::ErrorKind::UnexpectedEof => Error::Decode("unexpected end of data".to_string()),
            _ => Error::Io(err),
        })?;
        Ok(buf)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_exact::<1>()?[0])
    }

    fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_exact()?))
    }

    fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.read_exact()?))
    }

    fn read_count(&mut self, what: &str) -> Result<usize> {
        let count = self.read_i32()?;
        usize::try_from(count).map_err(|_| Error::Decode(format!("negative {} count {}", what, count)))
    }

    fn read_string(&mut self) -> Result<String> {
        let mut len = 0usize;
        let mut shift = 0;
        loop {
            let byte = self.read_u8()?;
            if shift >= 35 {
                return Err(Error::Decode("string length is not a valid 7-bit integer".to_string()));
            }
            len |= ((byte & 0x7F) as usize) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                break;
            }
        }
        let mut bytes = Vec::new();
        let read = self.reader.by_ref().take(len as u64).read_to_end(&mut bytes)?;
        if read < len {
            return Err(Error::Decode("unexpected end of data".to_string()));
        }
        String::from_utf8(bytes).map_err(|err| Error::Decode(format!("invalid UTF-8 string: {}", err)))
    }

    fn read_version_7(&mut self) -> Result<Script> {
        let mut arena = ExprArena::new();
        // positions are not stored; advance one column per operand
        let mut position = SourcePosition::default();

        let block_count = self.read_count("block")?;
        let mut blocks = Vec::with_capacity(block_count.min(1024));
        for _ in 0..block_count {
            let trigger_count = self.read_count("trigger")?;
            let mut block = TriggerBlock::with_capacity(trigger_count.min(1024));
            for _ in 0..trigger_count {
                let category = self.read_i32()?;
                let category = TriggerCategory::try_from(category)
                    .map_err(|c| Error::Decode(format!("invalid trigger category {}", c)))?;
                let id = self.read_i32()?;
                let mut trigger = Trigger::new(category, id, position);
                *trigger.contents_mut() = arena.open_range();

                let content_count = self.read_count("content")?;
                for _ in 0..content_count {
                    let tag = self.read_u8()?;
                    let expr = match ContentTag::from_byte(tag) {
                        Some(ContentTag::String) => Some(Expression::string(self.read_string()?, position)),
                        Some(ContentTag::Number) => Some(Expression::number(self.read_f64()?, position)),
                        Some(ContentTag::Variable) => Some(Expression::variable(self.read_string()?, position)),
                        Some(ContentTag::VariableTable) => {
                            let name = self.read_string()?;
                            let indexer = self.read_string()?;
                            let indexer = (!indexer.is_empty()).then_some(indexer);
                            Some(Expression::table(name, indexer, position))
                        }
                        None => {
                            tracing::trace!("skipping reserved content tag {}", tag);
                            None
                        }
                    };
                    if let Some(expr) = expr {
                        arena.push(trigger.contents_mut(), expr);
                    }
                    position.column += 1;
                }
                block.push(trigger);
            }
            blocks.push(block);
        }
        Ok(Script::new(arena, blocks))
    }
}
