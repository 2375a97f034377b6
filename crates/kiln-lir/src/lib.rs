// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! LIR (Low-level Intermediate Representation) - typed instructions in basic blocks.
//!
//! LIR is what function lowering produces and what the code generator consumes.
//! Pointers are typed, every instruction carries its result type, and control
//! flow is explicit through block terminators.

mod display;
mod function;
mod inst;
mod namegen;
mod types;
mod value;
mod verify;

pub use function::{ArgAttr, Argument, BlockId, InstId, LirBlock, LirFunction};
pub use inst::{BinOp, CastOp, CmpPred, InstData, InstKind, PadKind};
pub use namegen::NameGen;
pub use types::LirType;
pub use value::{Constant, PlaceholderId, Value};
pub use verify::VerifyError;
