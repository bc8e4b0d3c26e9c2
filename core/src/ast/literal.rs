use core::fmt;

use ecow::EcoString;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(EcoString),
    Bool(bool),
    Null,
}

impl Literal {
    /// Language-level literal equality.
    ///
    /// Same-kind literals compare by value, `null` equals only `null`, and
    /// literals of different kinds are never equal (`1` is not `1.0`, `0` is
    /// not `false`).
    pub fn same_value(&self, other: &Literal) -> bool {
        match (self, other) {
            (Literal::Int(a), Literal::Int(b)) => a == b,
            (Literal::Float(a), Literal::Float(b)) => a == b,
            (Literal::Str(a), Literal::Str(b)) => a == b,
            (Literal::Bool(a), Literal::Bool(b)) => a == b,
            (Literal::Null, Literal::Null) => true,
            _ => false,
        }
    }

    /// Identity used to deduplicate constant pool entries.
    ///
    /// Floats are compared bit-for-bit so that `NaN` and `-0.0` keep their
    /// own pool slots.
    pub fn same_constant(&self, other: &Literal) -> bool {
        match (self, other) {
            (Literal::Float(a), Literal::Float(b)) => a.to_bits() == b.to_bits(),
            _ => self.same_value(other),
        }
    }

    /// Hashable identity, consistent with [`Literal::same_constant`].
    pub fn key(&self) -> LiteralKey {
        match self {
            Literal::Int(v) => LiteralKey::Int(*v),
            Literal::Float(v) => LiteralKey::Float(v.to_bits()),
            Literal::Str(s) => LiteralKey::Str(s.clone()),
            Literal::Bool(v) => LiteralKey::Bool(*v),
            Literal::Null => LiteralKey::Null,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Literal::Int(_) => "int",
            Literal::Float(_) => "float",
            Literal::Str(_) => "string",
            Literal::Bool(_) => "bool",
            Literal::Null => "null",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Literal::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Literal::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

/// See [`Literal::key`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LiteralKey {
    Int(i64),
    Float(u64),
    Str(EcoString),
    Bool(bool),
    Null,
}

/// Printed form, as spliced into interpolated strings.
impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "{}", v),
            Literal::Float(v) => write!(f, "{}", v),
            Literal::Str(s) => f.write_str(s),
            Literal::Bool(v) => write!(f, "{}", v),
            Literal::Null => f.write_str("null"),
        }
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::Int(value)
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Literal::Float(value)
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::Bool(value)
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::Str(value.into())
    }
}
