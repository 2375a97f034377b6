// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! LIR values and constants.

use crate::{BlockId, InstId, LirType};

/// LIR value - anything an instruction can use as an operand
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// Physical function argument by position.
    Arg(u32),
    /// Result of an instruction.
    Inst(InstId),
    Const(Constant),
    /// Address of a laid-out block, the target of an indirect branch.
    BlockAddress(BlockId),
    /// Stand-in for the address of a label whose block does not exist yet.
    Placeholder(PlaceholderId),
}

impl Value {
    pub fn int(ty: LirType, value: i64) -> Value {
        Value::Const(Constant::Int { ty, value })
    }

    pub fn i1(b: bool) -> Value {
        Value::int(LirType::I1, b as i64)
    }

    pub fn i8(value: i64) -> Value {
        Value::int(LirType::I8, value)
    }

    pub fn as_inst(&self) -> Option<InstId> {
        match self {
            Value::Inst(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Value::Placeholder(_))
    }
}

/// LIR constant
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    Int { ty: LirType, value: i64 },
    /// Float stored as raw bits so constants stay hashable.
    Float { ty: LirType, bits: u64 },
    Null(LirType),
    Zero(LirType),
    Undef(LirType),
}

impl Constant {
    pub fn float(ty: LirType, value: f64) -> Constant {
        Constant::Float { ty, bits: value.to_bits() }
    }

    pub fn ty(&self) -> LirType {
        match self {
            Constant::Int { ty, .. }
            | Constant::Float { ty, .. }
            | Constant::Null(ty)
            | Constant::Zero(ty)
            | Constant::Undef(ty) => ty.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaceholderId(pub u32);
