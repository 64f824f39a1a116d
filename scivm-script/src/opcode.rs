//! Operand formats of the bytecode instruction set.
//!
//! Only the instruction *shape* lives here: how many operands follow an
//! opcode and how wide they are. The table depends on the game and is built
//! once from [`VmConfig`] when the VM is constructed.

use byteorder::{ByteOrder, LittleEndian};

use crate::config::VmConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandFormat {
    Byte,
    SByte,
    Word,
    SWord,
    /// Unsigned; byte or word depending on the opcode's low bit.
    Variable,
    /// Signed; byte or word depending on the opcode's low bit.
    SVariable,
    /// Signed relative jump target.
    SRelative,
    Property,
    Global,
    Local,
    Temp,
    Param,
    /// Absolute offset into the segment.
    Offset,
}

impl OperandFormat {
    fn is_signed(self) -> bool {
        matches!(
            self,
            OperandFormat::SByte
                | OperandFormat::SWord
                | OperandFormat::SVariable
                | OperandFormat::SRelative
        )
    }

    fn width(self, byte_mode: bool) -> usize {
        match self {
            OperandFormat::Byte | OperandFormat::SByte => 1,
            OperandFormat::Word | OperandFormat::SWord => 2,
            _ if byte_mode => 1,
            _ => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpcodeShape {
    Operands(Vec<OperandFormat>),
    /// `ret`: ends the instruction stream of a method.
    End,
    Invalid,
}

pub const OP_CALL: u8 = 0x20;
pub const OP_CALLK: u8 = 0x21;
pub const OP_CALLB: u8 = 0x22;
pub const OP_CALLE: u8 = 0x23;
pub const OP_RET: u8 = 0x24;
pub const OP_SEND: u8 = 0x25;
pub const OP_SELF: u8 = 0x2a;
pub const OP_SUPER: u8 = 0x2b;
pub const OP_LOFSA: u8 = 0x39;
pub const OP_LOFSS: u8 = 0x3a;

fn base_shape(op: u8) -> OpcodeShape {
    use OperandFormat::*;

    let ops = |f: &[OperandFormat]| OpcodeShape::Operands(f.to_vec());
    match op {
        0x00..=0x16 => ops(&[]),
        0x17..=0x19 => ops(&[SRelative]),
        0x1a => ops(&[SVariable]),
        0x1b => ops(&[]),
        0x1c => ops(&[SVariable]),
        0x1d | 0x1e => ops(&[]),
        0x1f => ops(&[Variable]),
        OP_CALL => ops(&[SRelative, Byte]),
        OP_CALLK | OP_CALLB => ops(&[Variable, Byte]),
        OP_CALLE => ops(&[Variable, SVariable, Byte]),
        OP_RET => OpcodeShape::End,
        OP_SEND => ops(&[Byte]),
        0x26 | 0x27 => OpcodeShape::Invalid,
        0x28 => ops(&[Variable]),
        0x29 => OpcodeShape::Invalid,
        OP_SELF => ops(&[Byte]),
        OP_SUPER => ops(&[Variable, Byte]),
        0x2c => ops(&[SVariable]),
        0x2d => ops(&[SVariable, Variable]),
        0x2e => ops(&[]),
        0x2f => OpcodeShape::Invalid,
        0x30 => ops(&[]),
        0x31..=0x38 => ops(&[Property]),
        OP_LOFSA | OP_LOFSS => ops(&[SRelative]),
        0x3b..=0x3e => ops(&[]),
        0x3f => ops(&[Word]),
        0x40..=0x7f => match op & 3 {
            0 => ops(&[Global]),
            1 => ops(&[Local]),
            2 => ops(&[Temp]),
            _ => ops(&[Param]),
        },
        _ => OpcodeShape::Invalid,
    }
}

/// Operand formats for all 128 opcodes.
#[derive(Debug, Clone)]
pub struct OpcodeFormats {
    shapes: Vec<OpcodeShape>,
}

impl OpcodeFormats {
    pub fn new(config: &VmConfig) -> Self {
        let mut shapes: Vec<OpcodeShape> = (0u8..128).map(base_shape).collect();

        if config.lofs_absolute {
            for op in [OP_LOFSA, OP_LOFSS] {
                shapes[op as usize] = OpcodeShape::Operands(vec![OperandFormat::Offset]);
            }
        }

        if config.wide_call_operands {
            let widen = [
                (OP_CALLE, 2),
                (OP_CALLK, 1),
                (OP_SUPER, 1),
                (OP_SEND, 0),
                (OP_SELF, 0),
                (OP_CALL, 1),
                (OP_CALLB, 1),
            ];
            for (op, index) in widen {
                if let OpcodeShape::Operands(formats) = &mut shapes[op as usize] {
                    formats[index] = OperandFormat::Word;
                }
            }
        }

        Self { shapes }
    }

    pub fn shape(&self, opcode: u8) -> &OpcodeShape {
        &self.shapes[(opcode & 0x7f) as usize]
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("instruction at 0x{pc:X} runs past the end of code (len=0x{len:X})")]
    PastEnd { pc: usize, len: usize },

    #[error("invalid opcode 0x{opcode:02X} at 0x{pc:X}")]
    InvalidOpcode { opcode: u8, pc: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Opcode number (the encoded byte shifted right by one).
    pub opcode: u8,
    /// Variable-width operands were encoded as bytes.
    pub byte_mode: bool,
    pub operands: Vec<i32>,
    /// Encoded length, opcode byte included.
    pub len: usize,
}

/// Decodes the instruction starting at `pc`.
pub fn decode(code: &[u8], pc: usize, formats: &OpcodeFormats) -> Result<Instruction, DecodeError> {
    let past_end = || DecodeError::PastEnd {
        pc,
        len: code.len(),
    };

    let encoded = *code.get(pc).ok_or_else(past_end)?;
    let opcode = encoded >> 1;
    let byte_mode = encoded & 1 != 0;

    let formats = match formats.shape(opcode) {
        OpcodeShape::Operands(formats) => formats.as_slice(),
        OpcodeShape::End => &[],
        OpcodeShape::Invalid => return Err(DecodeError::InvalidOpcode { opcode, pc }),
    };

    let mut cursor = pc + 1;
    let mut operands = Vec::with_capacity(formats.len());
    for format in formats {
        let width = format.width(byte_mode);
        let raw = code.get(cursor..cursor + width).ok_or_else(past_end)?;
        let value = match (width, format.is_signed()) {
            (1, false) => raw[0] as i32,
            (1, true) => raw[0] as i8 as i32,
            (_, false) => LittleEndian::read_u16(raw) as i32,
            (_, true) => LittleEndian::read_i16(raw) as i32,
        };
        operands.push(value);
        cursor += width;
    }

    Ok(Instruction {
        opcode,
        byte_mode,
        operands,
        len: cursor - pc,
    })
}
