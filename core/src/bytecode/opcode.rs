//! Instruction set targeted by the emitter.
//!
//! # Instruction Format
//!
//! Every instruction is a 1-byte opcode, optionally followed by a 4-byte
//! little-endian operand:
//! ```text
//! ┌────────────┬──────────────────────────┐
//! │   Opcode   │  Operand (u32, optional) │
//! │  (8 bits)  │        (32 bits)         │
//! └────────────┴──────────────────────────┘
//! ```
//!
//! Whether an operand follows is fixed per opcode (see [`Opcode::operand_width`]),
//! so the stream can be walked without decoding any operand values.
//!
//! # Stack Discipline
//!
//! Stack effect notation: `[..., operand1, operand2] -> [..., result]`

use core::fmt;

/// Width in bytes of the operand carried by operand-taking opcodes.
pub const OPERAND_WIDTH: usize = 4;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ========================================================================
    // Stack (0x01 - 0x0F)
    // ========================================================================
    /// Push constant from pool.
    /// Operand: constant index | Stack: [...] -> [..., value]
    Push = 0x01,

    /// Discard top of stack.
    /// Stack: [..., value] -> [...]
    Pop = 0x02,

    // ========================================================================
    // Arithmetic (0x10 - 0x1F)
    // ========================================================================
    /// Stack: [..., a, b] -> [..., a + b]
    Add = 0x10,
    Sub = 0x11,
    Mul = 0x12,
    Div = 0x13,
    /// Not produced by the emitter; part of the VM contract.
    Mod = 0x14,

    // ========================================================================
    // Comparison & Logic (0x20 - 0x2F)
    // ========================================================================
    /// Stack: [..., a, b] -> [..., a == b]
    Eq = 0x20,
    Ne = 0x21,
    Lt = 0x22,
    Gt = 0x23,
    Ge = 0x24,
    Le = 0x25,
    And = 0x26,
    Or = 0x27,
    /// Stack: [..., a] -> [..., !a]
    Not = 0x28,
    /// Stack: [..., a] -> [..., -a]
    Neg = 0x29,

    // ========================================================================
    // Variables (0x40 - 0x4F)
    // ========================================================================
    /// Operand: variable slot | Stack: [...] -> [..., value]
    LoadVar = 0x40,
    /// Operand: variable slot | Stack: [..., value] -> [...]
    StoreVar = 0x41,

    // ========================================================================
    // Control Flow & Iteration (0x50 - 0x5F)
    // ========================================================================
    /// Operand: absolute byte offset into the buffer.
    Jump = 0x50,
    /// Operand: absolute byte offset | Stack: [..., cond] -> [...]
    JumpIfFalse = 0x51,
    /// Operand: absolute byte offset | Stack: [..., cond] -> [...]
    JumpIfTrue = 0x52,
    /// Stack: [..., iterable] -> [..., iterator]
    GetIter = 0x53,
    /// Operand: 1 to also push the key, 0 for the value only.
    /// Stack: [..., iterator] -> [..., value] or [..., key, value]
    IterNext = 0x54,
    /// Stack: [..., iterator] -> [..., bool]
    IterHasNext = 0x55,
    /// Stack: [..., array, index] -> [..., element]
    GetIndex = 0x56,

    // ========================================================================
    // Calls (0x60 - 0x6F)
    // ========================================================================
    /// Stack: [..., value] -> (unit ends with value)
    Return = 0x61,
    /// Operand: argument count | Stack: [..., name, arg1, ..., argN] -> [..., result]
    Call = 0x62,

    // ========================================================================
    // Objects & Arrays (0x70 - 0x8F)
    // ========================================================================
    /// Operand: field count | Stack: [..., k1, v1, ..., kN, vN] -> [..., object]
    BuildObject = 0x70,
    /// Stack: [..., object, key] -> [..., value]
    GetField = 0x71,
    /// Operand: element count | Stack: [..., e1, ..., eN] -> [..., array]
    BuildArray = 0x80,

    // ========================================================================
    // Async (0xB0 - 0xBF)
    // ========================================================================
    /// Operand: byte length of the inline body that follows.
    /// Stack: [...] -> [..., future]
    Async = 0xB0,
    /// Stack: [..., future] -> [..., value]
    Await = 0xB1,

    /// Stop execution.
    Halt = 0xFF,
}

impl Opcode {
    pub fn from_byte(byte: u8) -> Option<Opcode> {
        use Opcode::*;
        Some(match byte {
            0x01 => Push,
            0x02 => Pop,
            0x10 => Add,
            0x11 => Sub,
            0x12 => Mul,
            0x13 => Div,
            0x14 => Mod,
            0x20 => Eq,
            0x21 => Ne,
            0x22 => Lt,
            0x23 => Gt,
            0x24 => Ge,
            0x25 => Le,
            0x26 => And,
            0x27 => Or,
            0x28 => Not,
            0x29 => Neg,
            0x40 => LoadVar,
            0x41 => StoreVar,
            0x50 => Jump,
            0x51 => JumpIfFalse,
            0x52 => JumpIfTrue,
            0x53 => GetIter,
            0x54 => IterNext,
            0x55 => IterHasNext,
            0x56 => GetIndex,
            0x61 => Return,
            0x62 => Call,
            0x70 => BuildObject,
            0x71 => GetField,
            0x80 => BuildArray,
            0xB0 => Async,
            0xB1 => Await,
            0xFF => Halt,
            _ => return None,
        })
    }

    pub fn byte(self) -> u8 {
        self as u8
    }

    /// Number of operand bytes following the opcode.
    pub fn operand_width(self) -> usize {
        use Opcode::*;
        match self {
            Push | LoadVar | StoreVar | Jump | JumpIfFalse | JumpIfTrue | IterNext | Call
            | BuildObject | BuildArray | Async => OPERAND_WIDTH,
            _ => 0,
        }
    }

    /// Total encoded size of the instruction.
    pub fn size(self) -> usize {
        1 + self.operand_width()
    }

    /// Jump-family opcodes carry a target offset that is rebased onto the
    /// final buffer during assembly.
    pub fn is_jump(self) -> bool {
        matches!(self, Opcode::Jump | Opcode::JumpIfFalse | Opcode::JumpIfTrue)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
