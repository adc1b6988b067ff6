//! Value kinds understood by the page codec.

use serde::{Deserialize, Serialize};

/// Identifier for every key/value kind a page can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ValueKind {
    Boolean = 1,

    Int32 = 12,
    Int64 = 13,

    UInt32 = 22,
    UInt64 = 23,

    Float32 = 30,
    Float64 = 31,

    /// Length-prefixed UTF-8 string.
    Varchar = 51,
}

impl ValueKind {
    /// Width of the string length prefix in bytes.
    pub const LENGTH_PREFIX_SIZE: usize = 8;

    /// Returns the fixed byte size for this kind, or None for variable-length kinds.
    pub const fn fixed_size(&self) -> Option<usize> {
        match self {
            ValueKind::Boolean => Some(1),
            ValueKind::Int32 | ValueKind::UInt32 | ValueKind::Float32 => Some(4),
            ValueKind::Int64 | ValueKind::UInt64 | ValueKind::Float64 => Some(8),
            ValueKind::Varchar => None,
        }
    }

    /// Returns true if this kind has a fixed byte size.
    pub const fn is_fixed_size(&self) -> bool {
        self.fixed_size().is_some()
    }

    /// Returns true for numeric kinds.
    pub const fn is_numeric(&self) -> bool {
        matches!(
            self,
            ValueKind::Int32
                | ValueKind::Int64
                | ValueKind::UInt32
                | ValueKind::UInt64
                | ValueKind::Float32
                | ValueKind::Float64
        )
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ValueKind::Boolean => "BOOLEAN",
            ValueKind::Int32 => "INT32",
            ValueKind::Int64 => "INT64",
            ValueKind::UInt32 => "UINT32",
            ValueKind::UInt64 => "UINT64",
            ValueKind::Float32 => "FLOAT32",
            ValueKind::Float64 => "FLOAT64",
            ValueKind::Varchar => "VARCHAR",
        };
        f.write_str(name)
    }
}
