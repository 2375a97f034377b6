// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Variables owned by a function builder.

use kiln_ast::{Span, VarId};
use kiln_lir::{InstId, Value};
use kiln_types::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Param,
    Local,
    /// The closure environment, once given a name.
    ClosureEnv,
}

/// A source variable and the storage backing it.
#[derive(Debug, Clone)]
pub struct Variable {
    pub id: VarId,
    pub name: String,
    pub ty: Type,
    pub kind: VarKind,
    /// Address of the variable's storage. For indirect parameters this is the
    /// incoming pointer itself.
    pub slot: Value,
    /// First instruction at which the variable holds its value.
    pub initializer: Option<InstId>,
    pub address_taken: bool,
    pub span: Span,
    /// Shares the slot of an earlier declaration instead of owning one.
    pub is_decl_alias: bool,
}

impl Variable {
    pub fn is_param(&self) -> bool {
        self.kind == VarKind::Param
    }
}
