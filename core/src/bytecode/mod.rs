//! Bytecode container: instruction set, constant serialization and the
//! final buffer layout consumed by the stack machine.

mod constant;
mod error;
mod opcode;
mod program;
mod reader;


pub use constant::{TAG_BOOL, TAG_FLOAT, TAG_INT, TAG_NULL, TAG_STRING, write_constant};
pub use error::DecodeError;
pub use opcode::{OPERAND_WIDTH, Opcode};
pub use program::{Instruction, MAGIC, Program, VERSION, assemble};
