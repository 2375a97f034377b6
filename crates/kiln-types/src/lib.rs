// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Source-level types as seen by function lowering.
//!
//! Everything here is concrete: sizes and alignments are known, and every
//! type has a fixed LIR shape. The calling-convention classifier works from
//! `registerized_shape`, which splits a type into word-sized register chunks.

use std::fmt;

use kiln_lir::LirType;

/// Concrete source type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    /// Pointer; `Ptr(Void)` is an untyped byte pointer.
    Ptr(Box<Type>),
    Struct(Vec<Type>),
    /// Positional fields, laid out like a struct. Multi-value results use this.
    Tuple(Vec<Type>),
    Array {
        elem: Box<Type>,
        len: u64,
    },
}

/// Scalar leaf of a flattened type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leaf {
    pub ty: LirType,
    pub offset: u64,
}

/// Register class of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegClass {
    Integer,
    Sse,
}

/// One word-sized piece of a value as it travels in a register.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegChunk {
    pub ty: LirType,
    pub class: RegClass,
}

impl Type {
    pub fn ptr_to(&self) -> Type {
        Type::Ptr(Box::new(self.clone()))
    }

    pub fn size(&self) -> u64 {
        self.to_lir().size()
    }

    pub fn align(&self) -> u64 {
        self.to_lir().align()
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn is_zero_sized(&self) -> bool {
        self.size() == 0
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, Type::Struct(_) | Type::Tuple(_) | Type::Array { .. })
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::F32 | Type::F64)
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, Type::I8 | Type::I16 | Type::I32 | Type::I64)
    }

    /// Unsigned integers and `Bool`.
    pub fn is_unsigned(&self) -> bool {
        matches!(self, Type::Bool | Type::U8 | Type::U16 | Type::U32 | Type::U64)
    }

    pub fn is_integer(&self) -> bool {
        self.is_signed() || self.is_unsigned()
    }

    /// In-memory LIR representation. `Bool` is a byte.
    pub fn to_lir(&self) -> LirType {
        match self {
            Type::Void => LirType::Void,
            Type::Bool | Type::I8 | Type::U8 => LirType::I8,
            Type::I16 | Type::U16 => LirType::I16,
            Type::I32 | Type::U32 => LirType::I32,
            Type::I64 | Type::U64 => LirType::I64,
            Type::F32 => LirType::F32,
            Type::F64 => LirType::F64,
            Type::Ptr(inner) if inner.is_void() => LirType::byte_ptr(),
            Type::Ptr(inner) => inner.to_lir().ptr_to(),
            Type::Struct(fields) | Type::Tuple(fields) => {
                LirType::Struct(fields.iter().map(Type::to_lir).collect())
            }
            Type::Array { elem, len } => LirType::Array {
                elem: Box::new(elem.to_lir()),
                len: *len,
            },
        }
    }

    /// Field types of a struct or tuple.
    pub fn fields(&self) -> &[Type] {
        match self {
            Type::Struct(fields) | Type::Tuple(fields) => fields,
            _ => &[],
        }
    }

    /// Scalar leaves in memory order with their byte offsets.
    pub fn flatten(&self) -> Vec<Leaf> {
        let mut leaves = Vec::new();
        flatten_into(&self.to_lir(), 0, &mut leaves);
        leaves
    }

    /// Split the value into word-sized register chunks.
    ///
    /// A word holding a single scalar that fits inside it keeps that scalar's
    /// type. A word holding exactly two `f32` becomes `<2 x float>`. Anything
    /// else, including part of a scalar wider than the word, becomes an
    /// integer covering the bytes the word spans. Zero-sized types produce no
    /// chunks.
    pub fn registerized_shape(&self, word_size: u64) -> Vec<RegChunk> {
        let size = self.size();
        if size == 0 || word_size == 0 {
            return Vec::new();
        }
        let words = size.div_ceil(word_size) as usize;
        let mut per_word: Vec<Vec<Leaf>> = vec![Vec::new(); words];
        for leaf in self.flatten() {
            let first = (leaf.offset / word_size) as usize;
            let last = ((leaf.offset + leaf.ty.size().max(1) - 1) / word_size) as usize;
            for word in per_word.iter_mut().take(last + 1).skip(first) {
                word.push(leaf.clone());
            }
        }

        per_word
            .iter()
            .enumerate()
            .map(|(w, in_word)| {
                let start = w as u64 * word_size;
                let end = start + word_size;
                let fits = |l: &Leaf| l.offset >= start && l.offset + l.ty.size() <= end;

                let class = if !in_word.is_empty()
                    && in_word.iter().all(|l| l.ty.is_float() && fits(l))
                {
                    RegClass::Sse
                } else {
                    RegClass::Integer
                };

                let ty = match in_word.as_slice() {
                    [single] if fits(single) => single.ty.clone(),
                    [a, b] if a.ty == LirType::F32 && b.ty == LirType::F32 => LirType::Vector {
                        elem: Box::new(LirType::F32),
                        lanes: 2,
                    },
                    _ => {
                        let bytes = (size - start).min(word_size);
                        LirType::Int((bytes * 8) as u32)
                    }
                };
                RegChunk { ty, class }
            })
            .collect()
    }
}

fn flatten_into(ty: &LirType, base: u64, out: &mut Vec<Leaf>) {
    match ty {
        LirType::Void => {}
        LirType::Struct(fields) => {
            for (i, field) in fields.iter().enumerate() {
                let offset = ty.field_offset(i as u32).unwrap_or(0);
                flatten_into(field, base + offset, out);
            }
        }
        LirType::Array { elem, len } => {
            for i in 0..*len {
                flatten_into(elem, base + i * elem.size(), out);
            }
        }
        _ => out.push(Leaf { ty: ty.clone(), offset: base }),
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Bool => write!(f, "bool"),
            Type::I8 => write!(f, "i8"),
            Type::I16 => write!(f, "i16"),
            Type::I32 => write!(f, "i32"),
            Type::I64 => write!(f, "i64"),
            Type::U8 => write!(f, "u8"),
            Type::U16 => write!(f, "u16"),
            Type::U32 => write!(f, "u32"),
            Type::U64 => write!(f, "u64"),
            Type::F32 => write!(f, "f32"),
            Type::F64 => write!(f, "f64"),
            Type::Ptr(inner) => write!(f, "*{}", inner),
            Type::Struct(fields) | Type::Tuple(fields) => {
                let open = if matches!(self, Type::Struct(_)) { "struct {" } else { "(" };
                let close = if matches!(self, Type::Struct(_)) { "}" } else { ")" };
                write!(f, "{}", open)?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", field)?;
                }
                write!(f, "{}", close)
            }
            Type::Array { elem, len } => write!(f, "[{}; {}]", elem, len),
        }
    }
}
