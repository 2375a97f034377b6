// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Statement nodes.

use crate::{Expr, LabelId, Span, VarId};

/// A statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

/// The kind of statement.
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Expression evaluated for its effects
    Expr(Expr),
    /// Initialization of a declared variable; `None` zero-fills it
    Init { var: VarId, value: Option<Expr> },
    /// Store into an lvalue (variable, deref, or field)
    Assign { target: Expr, value: Expr },
    /// Return of zero or more values
    Return(Vec<Expr>),
    /// Statement sequence
    Block(Vec<Stmt>),
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    /// Multi-way branch with C-style fallthrough between cases
    Switch { value: Expr, cases: Vec<SwitchCase> },
    /// Leave the innermost switch
    Break,
    Goto(LabelId),
    /// Definition point of a label
    Label(LabelId),
    /// Jump to an address produced by `ExprKind::LabelAddress`
    IndirectGoto(Expr),
    /// Exception region. At least one of `catch` and `finally` is present.
    Try {
        body: Box<Stmt>,
        catch: Option<Box<Stmt>>,
        finally: Option<Box<Stmt>>,
    },
    /// Deferred-call epilogue: run `undefer`, and when it raises run `check`
    /// and try again.
    Defer { undefer: Expr, check: Box<Stmt> },
    /// A statement the front end already reported as erroneous
    Error,
}

/// One arm of a switch. Empty `values` marks the default arm.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub values: Vec<Expr>,
    pub body: Option<Stmt>,
}

impl SwitchCase {
    pub fn new(values: Vec<Expr>, body: Option<Stmt>) -> Self {
        Self { values, body }
    }

    pub fn default_case(body: Option<Stmt>) -> Self {
        Self { values: Vec::new(), body }
    }

    pub fn is_default(&self) -> bool {
        self.values.is_empty()
    }
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Self { kind, span: Span::default() }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn expr(expr: Expr) -> Self {
        Self::new(StmtKind::Expr(expr))
    }

    pub fn init(var: VarId, value: Option<Expr>) -> Self {
        Self::new(StmtKind::Init { var, value })
    }

    pub fn assign(target: Expr, value: Expr) -> Self {
        Self::new(StmtKind::Assign { target, value })
    }

    pub fn ret(values: Vec<Expr>) -> Self {
        Self::new(StmtKind::Return(values))
    }

    pub fn block(stmts: Vec<Stmt>) -> Self {
        Self::new(StmtKind::Block(stmts))
    }

    pub fn if_(cond: Expr, then_branch: Stmt, else_branch: Option<Stmt>) -> Self {
        Self::new(StmtKind::If {
            cond,
            then_branch: Box::new(then_branch),
            else_branch: else_branch.map(Box::new),
        })
    }

    pub fn switch(value: Expr, cases: Vec<SwitchCase>) -> Self {
        Self::new(StmtKind::Switch { value, cases })
    }

    pub fn break_() -> Self {
        Self::new(StmtKind::Break)
    }

    pub fn goto(label: LabelId) -> Self {
        Self::new(StmtKind::Goto(label))
    }

    pub fn label(label: LabelId) -> Self {
        Self::new(StmtKind::Label(label))
    }

    pub fn indirect_goto(addr: Expr) -> Self {
        Self::new(StmtKind::IndirectGoto(addr))
    }

    pub fn try_(body: Stmt, catch: Option<Stmt>, finally: Option<Stmt>) -> Self {
        Self::new(StmtKind::Try {
            body: Box::new(body),
            catch: catch.map(Box::new),
            finally: finally.map(Box::new),
        })
    }

    pub fn defer(undefer: Expr, check: Stmt) -> Self {
        Self::new(StmtKind::Defer { undefer, check: Box::new(check) })
    }

    pub fn error() -> Self {
        Self::new(StmtKind::Error)
    }
}
