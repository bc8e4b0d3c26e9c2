//! Constant pool serialization.
//!
//! Each constant is a 1-byte kind tag followed by a kind-dependent payload:
//!
//! | tag | kind   | payload                               |
//! |-----|--------|---------------------------------------|
//! | 0   | null   | none                                  |
//! | 1   | int    | 8 bytes, two's complement             |
//! | 2   | float  | 8 bytes, IEEE-754 bits                |
//! | 3   | bool   | 1 byte, 0 or 1                        |
//! | 4   | string | 4-byte length, then UTF-8 bytes       |
//!
//! All integers are little-endian.

use super::DecodeError;
use super::reader::Reader;
use crate::ast::Literal;
use crate::compiler::CompileError;

pub const TAG_NULL: u8 = 0;
pub const TAG_INT: u8 = 1;
pub const TAG_FLOAT: u8 = 2;
pub const TAG_BOOL: u8 = 3;
pub const TAG_STRING: u8 = 4;

/// Append the serialized form of `constant` to `out`.
pub fn write_constant(constant: &Literal, out: &mut Vec<u8>) -> Result<(), CompileError> {
    match constant {
        Literal::Null => out.push(TAG_NULL),
        Literal::Int(v) => {
            out.push(TAG_INT);
            out.extend_from_slice(&v.to_le_bytes());
        }
        Literal::Float(v) => {
            out.push(TAG_FLOAT);
            out.extend_from_slice(&v.to_bits().to_le_bytes());
        }
        Literal::Bool(v) => {
            out.push(TAG_BOOL);
            out.push(u8::from(*v));
        }
        Literal::Str(s) => {
            let len = u32::try_from(s.len())
                .map_err(|_| CompileError::UnsupportedConstant { kind: "string" })?;
            out.push(TAG_STRING);
            out.extend_from_slice(&len.to_le_bytes());
            out.extend_from_slice(s.as_bytes());
        }
    }
    Ok(())
}

pub(super) fn read_constant(reader: &mut Reader<'_>) -> Result<Literal, DecodeError> {
    let offset = reader.offset();
    let tag = reader.u8("constant tag")?;
    Ok(match tag {
        TAG_NULL => Literal::Null,
        TAG_INT => Literal::Int(i64::from_le_bytes(reader.array("int constant")?)),
        TAG_FLOAT => Literal::Float(f64::from_bits(u64::from_le_bytes(
            reader.array("float constant")?,
        ))),
        TAG_BOOL => Literal::Bool(reader.u8("bool constant")? != 0),
        TAG_STRING => {
            let len = reader.u32("string length")? as usize;
            let start = reader.offset();
            let bytes = reader.bytes(len, "string constant")?;
            let s = core::str::from_utf8(bytes)
                .map_err(|_| DecodeError::InvalidString { offset: start })?;
            Literal::Str(s.into())
        }
        tag => return Err(DecodeError::UnknownConstantTag { tag, offset }),
    })
}
