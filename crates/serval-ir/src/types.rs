use serde::{Deserialize, Serialize};
use std::fmt;

/// Width of a pointer value when flattened to bits.
pub const POINTER_WIDTH: u32 = 64;

/// Type of a goto-program expression.
///
/// Widths are bit-precise; the default flattening back end consumes them
/// directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Bool,
    /// Two's-complement signed bit-vector.
    Signed(u32),
    /// Unsigned bit-vector.
    Unsigned(u32),
    /// Fixed-size array.
    Array { element: Box<Type>, size: u64 },
    /// Struct with named, ordered fields.
    Struct { fields: Vec<(String, Type)> },
    Pointer(Box<Type>),
    /// The empty type (no value).
    Unit,
}

impl Type {
    pub fn signed(width: u32) -> Self {
        Type::Signed(width)
    }

    pub fn unsigned(width: u32) -> Self {
        Type::Unsigned(width)
    }

    pub fn array(element: Type, size: u64) -> Self {
        Type::Array {
            element: Box::new(element),
            size,
        }
    }

    pub fn pointer(target: Type) -> Self {
        Type::Pointer(Box::new(target))
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Type::Bool)
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, Type::Signed(_))
    }

    pub fn is_bitvector(&self) -> bool {
        matches!(self, Type::Signed(_) | Type::Unsigned(_))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer(_))
    }

    /// Width of a scalar type in bits, if it has one.
    pub fn width(&self) -> Option<u32> {
        match self {
            Type::Bool => Some(1),
            Type::Signed(w) | Type::Unsigned(w) => Some(*w),
            Type::Pointer(_) => Some(POINTER_WIDTH),
            _ => None,
        }
    }

    /// Total number of bits a value of this type occupies when flattened.
    pub fn flattened_width(&self) -> u64 {
        match self {
            Type::Bool => 1,
            Type::Signed(w) | Type::Unsigned(w) => u64::from(*w),
            Type::Pointer(_) => u64::from(POINTER_WIDTH),
            Type::Array { element, size } => element.flattened_width() * size,
            Type::Struct { fields } => fields.iter().map(|(_, t)| t.flattened_width()).sum(),
            Type::Unit => 0,
        }
    }

    /// Bit offset and width of a struct field within the flattened value.
    pub fn field_range(&self, name: &str) -> Option<(u64, u64)> {
        let Type::Struct { fields } = self else {
            return None;
        };
        let mut offset = 0;
        for (field_name, field_type) in fields {
            let width = field_type.flattened_width();
            if field_name == name {
                return Some((offset, width));
            }
            offset += width;
        }
        None
    }

    /// Type of a named struct field.
    pub fn field_type(&self, name: &str) -> Option<&Type> {
        let Type::Struct { fields } = self else {
            return None;
        };
        fields.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => write!(f, "bool"),
            Type::Signed(w) => write!(f, "signedbv[{w}]"),
            Type::Unsigned(w) => write!(f, "unsignedbv[{w}]"),
            Type::Array { element, size } => write!(f, "{element}[{size}]"),
            Type::Struct { fields } => {
                write!(f, "struct {{")?;
                for (i, (name, typ)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {typ}")?;
                }
                write!(f, "}}")
            }
            Type::Pointer(target) => write!(f, "*{target}"),
            Type::Unit => write!(f, "unit"),
        }
    }
}
