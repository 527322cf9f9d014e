//! IR Type System
//!
//! Types arrive already resolved from the front end; the IR only carries
//! them as tags and compares them for equality.

use serde::{Deserialize, Serialize};
use std::fmt;

/// IR Type tags
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IrType {
    /// Void type (stores, terminators, calls without a result)
    Void,

    /// Boolean
    Bool,

    /// Signed integers
    I8, I16, I32, I64,

    /// Unsigned integers
    U8, U16, U32, U64,

    /// Floating point
    F32, F64,

    /// Untyped integer/float literal evaluated at compile time
    ComptimeInt,
    ComptimeFloat,

    /// Pointer type
    Ptr(Box<IrType>),

    /// Array type [size x element_type]
    Array { size: u64, element_type: Box<IrType> },

    /// Struct type
    Struct {
        name: Option<String>,
        fields: Vec<IrType>,
    },
}

impl IrType {
    /// Pointer to this type
    pub fn ptr_to(self) -> IrType {
        IrType::Ptr(Box::new(self))
    }

    /// Check if this is an integer type
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            IrType::I8 | IrType::I16 | IrType::I32 | IrType::I64
                | IrType::U8 | IrType::U16 | IrType::U32 | IrType::U64
                | IrType::ComptimeInt
        )
    }

    /// Check if this is a floating point type
    pub fn is_float(&self) -> bool {
        matches!(self, IrType::F32 | IrType::F64 | IrType::ComptimeFloat)
    }

    /// Check if this is a pointer type
    pub fn is_pointer(&self) -> bool {
        matches!(self, IrType::Ptr(_))
    }

    /// Get the pointee type for pointers
    pub fn pointee(&self) -> Option<&IrType> {
        match self {
            IrType::Ptr(elem) => Some(elem),
            _ => None,
        }
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Void => write!(f, "void"),
            IrType::Bool => write!(f, "bool"),
            IrType::I8 => write!(f, "i8"),
            IrType::I16 => write!(f, "i16"),
            IrType::I32 => write!(f, "i32"),
            IrType::I64 => write!(f, "i64"),
            IrType::U8 => write!(f, "u8"),
            IrType::U16 => write!(f, "u16"),
            IrType::U32 => write!(f, "u32"),
            IrType::U64 => write!(f, "u64"),
            IrType::F32 => write!(f, "f32"),
            IrType::F64 => write!(f, "f64"),
            IrType::ComptimeInt => write!(f, "comptime_int"),
            IrType::ComptimeFloat => write!(f, "comptime_float"),
            IrType::Ptr(target) => write!(f, "*{target}"),
            IrType::Array { size, element_type } => write!(f, "[{size} x {element_type}]"),
            IrType::Struct { name: Some(name), .. } => write!(f, "%{name}"),
            IrType::Struct { name: None, fields } => {
                write!(f, "{{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{field}")?;
                }
                write!(f, "}}")
            }
        }
    }
}
