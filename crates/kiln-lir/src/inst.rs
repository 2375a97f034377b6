// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! LIR instructions. Terminators are ordinary instructions that must come
//! last in their block.

use crate::{BlockId, LirType, Value};

/// An instruction together with its result type and optional name.
#[derive(Debug, Clone)]
pub struct InstData {
    pub name: Option<String>,
    pub kind: InstKind,
    /// Result type; `Void` for instructions that produce nothing.
    pub ty: LirType,
}

#[derive(Debug, Clone)]
pub enum InstKind {
    /// Stack slot for one value of `ty`. Result is `ty*`.
    Alloca {
        ty: LirType,
    },
    Load {
        ptr: Value,
    },
    Store {
        value: Value,
        ptr: Value,
    },
    Cast {
        op: CastOp,
        value: Value,
        to: LirType,
    },
    /// Address of field `index` of the aggregate `base` points to.
    FieldAddr {
        base: Value,
        index: u32,
    },
    /// Block copy of `size` bytes.
    MemCpy {
        dst: Value,
        src: Value,
        size: u64,
        align: u64,
    },
    Binary {
        op: BinOp,
        lhs: Value,
        rhs: Value,
    },
    Cmp {
        pred: CmpPred,
        lhs: Value,
        rhs: Value,
    },
    Call {
        callee: String,
        args: Vec<Value>,
    },
    LandingPad {
        kind: PadKind,
    },

    // ── terminators ────────────────────────────────────────────
    Br {
        target: BlockId,
    },
    CondBr {
        cond: Value,
        then_block: BlockId,
        else_block: BlockId,
    },
    Switch {
        value: Value,
        default: BlockId,
        cases: Vec<(i64, BlockId)>,
    },
    IndirectBr {
        addr: Value,
        dests: Vec<BlockId>,
    },
    /// Call with an unwind edge.
    Invoke {
        callee: String,
        args: Vec<Value>,
        normal: BlockId,
        unwind: BlockId,
    },
    Ret {
        value: Option<Value>,
    },
    Resume {
        value: Value,
    },
    Unreachable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOp {
    BitCast,
    ZExt,
    SExt,
    Trunc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    SDiv,
    UDiv,
    SRem,
    URem,
    And,
    Or,
    Xor,
    FAdd,
    FSub,
    FMul,
    FDiv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpPred {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
    Ult,
    Ule,
    Ugt,
    Uge,
    Oeq,
    One,
    Olt,
    Ole,
    Ogt,
    Oge,
}

impl CmpPred {
    pub fn is_float(self) -> bool {
        matches!(
            self,
            CmpPred::Oeq | CmpPred::One | CmpPred::Olt | CmpPred::Ole | CmpPred::Ogt | CmpPred::Oge
        )
    }
}

/// What a landing pad does with the in-flight exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadKind {
    /// Catches everything (`catch i8* null`).
    CatchAll,
    /// Runs cleanup code and is expected to resume unwinding.
    Cleanup,
}

impl InstKind {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstKind::Br { .. }
                | InstKind::CondBr { .. }
                | InstKind::Switch { .. }
                | InstKind::IndirectBr { .. }
                | InstKind::Invoke { .. }
                | InstKind::Ret { .. }
                | InstKind::Resume { .. }
                | InstKind::Unreachable
        )
    }

    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            InstKind::Br { target } => vec![*target],
            InstKind::CondBr { then_block, else_block, .. } => vec![*then_block, *else_block],
            InstKind::Switch { default, cases, .. } => {
                let mut succs = vec![*default];
                for (_, b) in cases {
                    if !succs.contains(b) {
                        succs.push(*b);
                    }
                }
                succs
            }
            InstKind::IndirectBr { dests, .. } => dests.clone(),
            InstKind::Invoke { normal, unwind, .. } => vec![*normal, *unwind],
            _ => Vec::new(),
        }
    }

    pub fn operands(&self) -> Vec<&Value> {
        match self {
            InstKind::Alloca { .. } | InstKind::LandingPad { .. } | InstKind::Br { .. } => vec![],
            InstKind::Unreachable => vec![],
            InstKind::Load { ptr } => vec![ptr],
            InstKind::Store { value, ptr } => vec![value, ptr],
            InstKind::Cast { value, .. } => vec![value],
            InstKind::FieldAddr { base, .. } => vec![base],
            InstKind::MemCpy { dst, src, .. } => vec![dst, src],
            InstKind::Binary { lhs, rhs, .. } | InstKind::Cmp { lhs, rhs, .. } => vec![lhs, rhs],
            InstKind::Call { args, .. } | InstKind::Invoke { args, .. } => args.iter().collect(),
            InstKind::CondBr { cond, .. } => vec![cond],
            InstKind::Switch { value, .. } => vec![value],
            InstKind::IndirectBr { addr, .. } => vec![addr],
            InstKind::Ret { value } => value.iter().collect(),
            InstKind::Resume { value } => vec![value],
        }
    }

    pub fn operands_mut(&mut self) -> Vec<&mut Value> {
        match self {
            InstKind::Alloca { .. } | InstKind::LandingPad { .. } | InstKind::Br { .. } => vec![],
            InstKind::Unreachable => vec![],
            InstKind::Load { ptr } => vec![ptr],
            InstKind::Store { value, ptr } => vec![value, ptr],
            InstKind::Cast { value, .. } => vec![value],
            InstKind::FieldAddr { base, .. } => vec![base],
            InstKind::MemCpy { dst, src, .. } => vec![dst, src],
            InstKind::Binary { lhs, rhs, .. } | InstKind::Cmp { lhs, rhs, .. } => vec![lhs, rhs],
            InstKind::Call { args, .. } | InstKind::Invoke { args, .. } => args.iter_mut().collect(),
            InstKind::CondBr { cond, .. } => vec![cond],
            InstKind::Switch { value, .. } => vec![value],
            InstKind::IndirectBr { addr, .. } => vec![addr],
            InstKind::Ret { value } => value.iter_mut().collect(),
            InstKind::Resume { value } => vec![value],
        }
    }
}
