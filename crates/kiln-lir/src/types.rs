// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! LIR type system - machine-level shapes with typed pointers.

/// LIR type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LirType {
    Void,
    /// Integer of the given bit width (1, 8, 16, 32, 64).
    Int(u32),
    F32,
    F64,
    /// Pointer to a value of the inner type.
    Ptr(Box<LirType>),
    Struct(Vec<LirType>),
    Array {
        elem: Box<LirType>,
        len: u64,
    },
    /// Register-sized vector, e.g. two f32 halves of one eightbyte.
    Vector {
        elem: Box<LirType>,
        lanes: u32,
    },
}

impl LirType {
    pub const I1: LirType = LirType::Int(1);
    pub const I8: LirType = LirType::Int(8);
    pub const I16: LirType = LirType::Int(16);
    pub const I32: LirType = LirType::Int(32);
    pub const I64: LirType = LirType::Int(64);

    /// Pointer to this type.
    pub fn ptr_to(&self) -> LirType {
        LirType::Ptr(Box::new(self.clone()))
    }

    /// `i8*`, used for label addresses and exception objects.
    pub fn byte_ptr() -> LirType {
        LirType::I8.ptr_to()
    }

    /// The `{ i8*, i32 }` pair a landing pad produces.
    pub fn exception_token() -> LirType {
        LirType::Struct(vec![LirType::byte_ptr(), LirType::I32])
    }

    pub fn pointee(&self) -> Option<&LirType> {
        match self {
            LirType::Ptr(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, LirType::Void)
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, LirType::Struct(_) | LirType::Array { .. })
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, LirType::Vector { .. })
    }

    pub fn is_float(&self) -> bool {
        matches!(self, LirType::F32 | LirType::F64)
    }

    /// Byte size, padded to alignment for aggregates.
    pub fn size(&self) -> u64 {
        match self {
            LirType::Void => 0,
            LirType::Int(bits) => ((*bits as u64) + 7) / 8,
            LirType::F32 => 4,
            LirType::F64 | LirType::Ptr(_) => 8,
            LirType::Struct(fields) => {
                let mut offset = 0u64;
                for f in fields {
                    offset = align_up(offset, f.align());
                    offset += f.size();
                }
                align_up(offset, self.align())
            }
            LirType::Array { elem, len } => elem.size() * len,
            LirType::Vector { elem, lanes } => elem.size() * (*lanes as u64),
        }
    }

    pub fn align(&self) -> u64 {
        match self {
            LirType::Void => 1,
            LirType::Int(_) | LirType::F32 | LirType::F64 | LirType::Ptr(_) => self.size().max(1),
            LirType::Struct(fields) => fields.iter().map(|f| f.align()).max().unwrap_or(1),
            LirType::Array { elem, .. } => elem.align(),
            LirType::Vector { .. } => self.size().max(1),
        }
    }

    /// Byte offset of field `index` within a struct or array.
    pub fn field_offset(&self, index: u32) -> Option<u64> {
        match self {
            LirType::Struct(fields) => {
                let mut offset = 0u64;
                for (i, f) in fields.iter().enumerate() {
                    offset = align_up(offset, f.align());
                    if i as u32 == index {
                        return Some(offset);
                    }
                    offset += f.size();
                }
                None
            }
            LirType::Array { elem, len } if (index as u64) < *len => {
                Some(elem.size() * index as u64)
            }
            _ => None,
        }
    }

    /// Type of field `index` within a struct or array.
    pub fn field_type(&self, index: u32) -> Option<&LirType> {
        match self {
            LirType::Struct(fields) => fields.get(index as usize),
            LirType::Array { elem, len } if (index as u64) < *len => Some(elem),
            _ => None,
        }
    }
}

fn align_up(offset: u64, align: u64) -> u64 {
    let align = align.max(1);
    (offset + align - 1) / align * align
}
