//! Final buffer layout, assembly and decoding.
//!
//! ```text
//! offset 0  : magic (4 bytes)
//! offset 4  : version (u32)
//! offset 8  : constant count N (u32)
//! offset 12 : N serialized constants
//! offset ?  : instruction byte count M (u32)
//! offset ?  : M instruction bytes
//! ```
//!
//! During emission jump operands are offsets into the instruction section.
//! [`assemble`] rebases them by the header length so that every jump in the
//! finished buffer carries an absolute offset.

use core::fmt;

use hashbrown::{HashMap, HashSet};

use super::constant::{read_constant, write_constant};
use super::reader::Reader;
use super::{DecodeError, OPERAND_WIDTH, Opcode};
use crate::ast::Literal;
use crate::compiler::CompileError;

pub const MAGIC: [u8; 4] = *b"GLYP";
pub const VERSION: u32 = 1;

/// Build the final buffer from a constant pool and an instruction section
/// whose jump targets are still relative to the start of that section.
pub fn assemble(constants: &[Literal], mut code: Vec<u8>) -> Result<Vec<u8>, CompileError> {
    let mut out = Vec::with_capacity(16 + code.len());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&len_u32(constants.len(), "constant count")?.to_le_bytes());
    for constant in constants {
        write_constant(constant, &mut out)?;
    }
    out.extend_from_slice(&len_u32(code.len(), "instruction section")?.to_le_bytes());

    let header_len = len_u32(out.len(), "header")?;
    rebase_jumps(&mut code, header_len)?;
    out.extend_from_slice(&code);
    Ok(out)
}

fn len_u32(len: usize, what: &'static str) -> Result<u32, CompileError> {
    u32::try_from(len).map_err(|_| CompileError::OperandOverflow { what })
}

/// Add `header_len` to the operand of every jump-family instruction.
fn rebase_jumps(code: &mut [u8], header_len: u32) -> Result<(), CompileError> {
    let mut pc = 0;
    while pc < code.len() {
        // The section only ever holds opcodes written by the emitter.
        let Some(opcode) = Opcode::from_byte(code[pc]) else {
            pc += 1;
            continue;
        };
        if opcode.is_jump() {
            let at = pc + 1;
            if at + OPERAND_WIDTH > code.len() {
                break;
            }
            let operand = &mut code[at..at + OPERAND_WIDTH];
            let mut raw = [0u8; OPERAND_WIDTH];
            raw.copy_from_slice(operand);
            let target = u32::from_le_bytes(raw)
                .checked_add(header_len)
                .ok_or(CompileError::OperandOverflow {
                    what: "jump target",
                })?;
            operand.copy_from_slice(&target.to_le_bytes());
        }
        pc += opcode.size();
    }
    Ok(())
}

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// Absolute byte offset within the buffer.
    pub offset: usize,
    pub opcode: Opcode,
    pub operand: Option<u32>,
}

impl Instruction {
    pub fn size(&self) -> usize {
        self.opcode.size()
    }

    /// Absolute target, for jump-family instructions.
    pub fn jump_target(&self) -> Option<usize> {
        if self.opcode.is_jump() {
            self.operand.map(|target| target as usize)
        } else {
            None
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operand {
            Some(operand) => write!(f, "{}({})", self.opcode, operand),
            None => write!(f, "{}", self.opcode),
        }
    }
}

/// A bytecode buffer read back into its parts.
#[derive(Clone, PartialEq)]
pub struct Program {
    pub version: u32,
    pub constants: Vec<Literal>,
    /// Absolute offset of the first instruction byte.
    pub code_start: usize,
    pub instructions: Vec<Instruction>,
}

impl Program {
    /// Decode a buffer produced by [`assemble`].
    ///
    /// Validates the magic tag, version, every length prefix, constant tags,
    /// opcodes and operand widths, and rejects trailing bytes.
    pub fn decode(bytes: &[u8]) -> Result<Program, DecodeError> {
        let mut reader = Reader::new(bytes);

        let magic: [u8; 4] = reader.array("magic")?;
        if magic != MAGIC {
            return Err(DecodeError::BadMagic { found: magic });
        }
        let version = reader.u32("version")?;
        if version != VERSION {
            return Err(DecodeError::UnsupportedVersion { found: version });
        }

        let count = reader.u32("constant count")? as usize;
        let mut constants = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            constants.push(read_constant(&mut reader)?);
        }

        let code_len = reader.u32("instruction byte count")? as usize;
        let code_start = reader.offset();
        let code = reader.bytes(code_len, "instruction section")?;
        if reader.remaining() > 0 {
            return Err(DecodeError::TrailingBytes {
                extra: reader.remaining(),
            });
        }

        let mut instructions = Vec::new();
        let mut code_reader = Reader::new(code);
        while code_reader.remaining() > 0 {
            let offset = code_start + code_reader.offset();
            let byte = code_reader.u8("opcode")?;
            let opcode =
                Opcode::from_byte(byte).ok_or(DecodeError::UnknownOpcode { byte, offset })?;
            let operand = if opcode.operand_width() > 0 {
                Some(code_reader.u32("operand")?)
            } else {
                None
            };
            instructions.push(Instruction {
                offset,
                opcode,
                operand,
            });
        }

        Ok(Program {
            version,
            constants,
            code_start,
            instructions,
        })
    }

    /// Offset one past the last instruction byte (the buffer length).
    pub fn code_end(&self) -> usize {
        self.instructions
            .last()
            .map_or(self.code_start, |last| last.offset + last.size())
    }

    /// The instruction starting exactly at `offset`, if any.
    pub fn instruction_at(&self, offset: usize) -> Option<&Instruction> {
        self.instructions
            .binary_search_by_key(&offset, |instr| instr.offset)
            .ok()
            .map(|index| &self.instructions[index])
    }

    /// Index into `instructions` of the instruction starting at `offset`.
    pub fn index_of(&self, offset: usize) -> Option<usize> {
        self.instructions
            .binary_search_by_key(&offset, |instr| instr.offset)
            .ok()
    }

    pub fn opcodes(&self) -> Vec<Opcode> {
        self.instructions.iter().map(|instr| instr.opcode).collect()
    }

    fn constant_comment(&self, instr: &Instruction) -> Option<String> {
        let index = instr.operand? as usize;
        match instr.opcode {
            Opcode::Push => self.constants.get(index).map(|c| format!("{:?}", c)),
            Opcode::LoadVar | Opcode::StoreVar => match self.constants.get(index) {
                Some(Literal::Str(name)) => Some(name.to_string()),
                _ => None,
            },
            _ => None,
        }
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Program {{")?;
        writeln!(f, "  version: {}", self.version)?;

        if !self.constants.is_empty() {
            writeln!(f, "  constants: [")?;
            for (i, constant) in self.constants.iter().enumerate() {
                writeln!(f, "    [{}] = {:?}", i, constant)?;
            }
            writeln!(f, "  ]")?;
        } else {
            writeln!(f, "  constants: []")?;
        }

        // Label every jump target, in address order.
        let jump_targets: HashSet<usize> = self
            .instructions
            .iter()
            .filter_map(Instruction::jump_target)
            .collect();
        let mut sorted_targets: Vec<_> = jump_targets.into_iter().collect();
        sorted_targets.sort();
        let label_map: HashMap<usize, usize> = sorted_targets
            .into_iter()
            .enumerate()
            .map(|(i, addr)| (addr, i))
            .collect();

        writeln!(f, "  instructions:")?;
        for instr in &self.instructions {
            let label_prefix = label_map
                .get(&instr.offset)
                .map(|n| format!("L{}:", n))
                .unwrap_or_default();

            if let Some(target) = instr.jump_target() {
                let target_label = label_map
                    .get(&target)
                    .map(|l| format!("L{}", l))
                    .unwrap_or_else(|| format!("@{}", target));
                writeln!(
                    f,
                    "    {:4} {:>4}  {} (to {})",
                    instr.offset, label_prefix, instr, target_label
                )?;
            } else if let Some(comment) = self.constant_comment(instr) {
                writeln!(
                    f,
                    "    {:4} {:>4}  {} ; {}",
                    instr.offset, label_prefix, instr, comment
                )?;
            } else {
                writeln!(f, "    {:4} {:>4}  {}", instr.offset, label_prefix, instr)?;
            }
        }

        write!(f, "}}")
    }
}
