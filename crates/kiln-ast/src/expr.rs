// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Expression nodes.

use kiln_types::Type;

use crate::{LabelId, Span, VarId};

/// A typed expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
    pub span: Span,
}

/// The kind of expression.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Integer literal
    Int(i64),
    /// Float literal
    Float(f64),
    /// Boolean literal
    Bool(bool),
    /// Null pointer
    Nil,
    /// All-zero value of the expression's type
    Zero,
    /// Read of a variable
    Var(VarId),
    /// Address of a variable's storage
    AddressOf(VarId),
    /// Load through a pointer
    Deref(Box<Expr>),
    /// Field of a struct or tuple value
    Field { base: Box<Expr>, index: u32 },
    /// Binary operation
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Call of a named function
    Call { callee: String, args: Vec<Expr> },
    /// `cond ? then_value : else_value`
    Conditional {
        cond: Box<Expr>,
        then_value: Box<Expr>,
        else_value: Box<Expr>,
    },
    /// Struct or tuple built from its fields in order
    Composite(Vec<Expr>),
    /// Address of a label, usable by an indirect goto
    LabelAddress(LabelId),
    /// An expression the front end already reported as erroneous
    Error,
}

/// Binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Xor,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }
}

impl Expr {
    pub fn new(kind: ExprKind, ty: Type) -> Self {
        Self { kind, ty, span: Span::default() }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn int(ty: Type, value: i64) -> Self {
        Self::new(ExprKind::Int(value), ty)
    }

    pub fn float(ty: Type, value: f64) -> Self {
        Self::new(ExprKind::Float(value), ty)
    }

    pub fn bool(value: bool) -> Self {
        Self::new(ExprKind::Bool(value), Type::Bool)
    }

    pub fn nil(ty: Type) -> Self {
        Self::new(ExprKind::Nil, ty)
    }

    pub fn zero(ty: Type) -> Self {
        Self::new(ExprKind::Zero, ty)
    }

    pub fn var(var: VarId, ty: Type) -> Self {
        Self::new(ExprKind::Var(var), ty)
    }

    pub fn address_of(var: VarId, var_ty: &Type) -> Self {
        Self::new(ExprKind::AddressOf(var), var_ty.ptr_to())
    }

    /// `*ptr`. The result type is the pointee, or `Void` for byte pointers.
    pub fn deref(ptr: Expr) -> Self {
        let ty = match &ptr.ty {
            Type::Ptr(inner) => (**inner).clone(),
            _ => Type::Void,
        };
        Self::new(ExprKind::Deref(Box::new(ptr)), ty)
    }

    pub fn field(base: Expr, index: u32) -> Self {
        let ty = base.ty.fields().get(index as usize).cloned().unwrap_or(Type::Void);
        Self::new(ExprKind::Field { base: Box::new(base), index }, ty)
    }

    /// Binary operation. Comparisons produce `Bool`, everything else the
    /// left operand's type.
    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        let ty = if op.is_comparison() { Type::Bool } else { lhs.ty.clone() };
        Self::new(
            ExprKind::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) },
            ty,
        )
    }

    pub fn call(callee: impl Into<String>, args: Vec<Expr>, ret: Type) -> Self {
        Self::new(ExprKind::Call { callee: callee.into(), args }, ret)
    }

    pub fn conditional(cond: Expr, then_value: Expr, else_value: Expr) -> Self {
        let ty = then_value.ty.clone();
        Self::new(
            ExprKind::Conditional {
                cond: Box::new(cond),
                then_value: Box::new(then_value),
                else_value: Box::new(else_value),
            },
            ty,
        )
    }

    pub fn composite(ty: Type, fields: Vec<Expr>) -> Self {
        Self::new(ExprKind::Composite(fields), ty)
    }

    pub fn label_address(label: LabelId) -> Self {
        Self::new(ExprKind::LabelAddress(label), Type::Void.ptr_to())
    }

    pub fn error(ty: Type) -> Self {
        Self::new(ExprKind::Error, ty)
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind, ExprKind::Error)
    }

    /// Integer value of a literal, if this is one.
    pub fn as_int_literal(&self) -> Option<i64> {
        match self.kind {
            ExprKind::Int(v) => Some(v),
            ExprKind::Bool(b) => Some(b as i64),
            _ => None,
        }
    }
}
