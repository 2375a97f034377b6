// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Source-agnostic statement and expression trees for function lowering.
//!
//! Front ends build these trees after type checking. Every expression carries
//! its concrete type; variables and labels are handles handed out by the
//! function builder that owns them.

pub mod span;
pub mod expr;
pub mod stmt;

pub use span::Span;
pub use expr::{BinOp, Expr, ExprKind};
pub use stmt::{Stmt, StmtKind, SwitchCase};

/// Handle to a parameter, local, or closure-environment variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

/// Handle to a label within one function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(pub u32);
