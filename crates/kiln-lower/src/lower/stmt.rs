// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Statement lowering: sequencing, if, gotos and labels, returns.

use kiln_ast::{Expr, Span, Stmt, StmtKind};
use kiln_lir::{InstKind, LirType, Value};
use kiln_types::Type;

use super::BodyLowerer;
use crate::{LowerError, LowerErrorKind};

impl<'f, 'u> BodyLowerer<'f, 'u> {
    pub fn lower_stmt(&mut self, stmt: &Stmt) -> Result<(), LowerError> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.lower_expr(expr)?;
            }
            StmtKind::Init { var, value } => self.lower_init(*var, value.as_ref(), stmt.span)?,
            StmtKind::Assign { target, value } => {
                let Some(dst) = self.lower_addr(target)? else {
                    return Ok(());
                };
                if let Some(v) = self.lower_expr(value)? {
                    self.store_value(dst, v, &target.ty);
                }
            }
            StmtKind::Return(values) => self.lower_return(values, stmt.span)?,
            StmtKind::Block(stmts) => {
                for s in stmts {
                    self.lower_stmt(s)?;
                }
            }
            StmtKind::If { cond, then_branch, else_branch } => {
                self.lower_if(cond, then_branch, else_branch.as_deref())?;
            }
            StmtKind::Switch { value, cases } => self.lower_switch(value, cases, stmt.span)?,
            StmtKind::Break => {
                let Some(exit) = self.break_targets.last().copied() else {
                    return Err(self.fb.err(stmt.span, LowerErrorKind::BreakOutsideSwitch));
                };
                self.terminate(InstKind::Br { target: exit });
            }
            StmtKind::Goto(label) => {
                let target = self.fb.label_block(*label, stmt.span)?;
                self.terminate(InstKind::Br { target });
            }
            StmtKind::Label(label) => {
                let block = self.fb.define_label(*label, stmt.span)?;
                self.branch_to(block);
                self.current = block;
            }
            StmtKind::IndirectGoto(addr) => {
                let Some(addr) = self.lower_expr(addr)? else {
                    return Ok(());
                };
                let id = self.terminate(InstKind::IndirectBr { addr, dests: Vec::new() });
                self.fb.record_indirect_branch(id);
            }
            StmtKind::Try { body, catch, finally } => {
                self.lower_exception_region(body, catch.as_deref(), finally.as_deref())?;
            }
            StmtKind::Defer { undefer, check } => self.lower_defer(undefer, check, stmt.span)?,
            StmtKind::Error => self.fb.mark_error(),
        }
        Ok(())
    }

    fn lower_init(
        &mut self,
        var: kiln_ast::VarId,
        value: Option<&Expr>,
        span: Span,
    ) -> Result<(), LowerError> {
        let Some((slot, ty)) = self.fb.variable(var).map(|v| (v.slot.clone(), v.ty.clone())) else {
            return Err(self.fb.err(span, LowerErrorKind::UnknownVariable(var)));
        };
        let store = match value {
            Some(expr) => match self.lower_expr(expr)? {
                Some(v) => self.store_value(slot, v, &ty),
                None => return Ok(()),
            },
            None => {
                let zero = Value::Const(kiln_lir::Constant::Zero(ty.to_lir()));
                self.push_inst(InstKind::Store { value: zero, ptr: slot }, LirType::Void, None)
            }
        };
        if let Some(v) = self.fb.variable_mut(var) {
            v.initializer = Some(store);
        }
        Ok(())
    }

    /// Both arms and the continuation always get blocks, even when an arm
    /// never falls through.
    fn lower_if(
        &mut self,
        cond: &Expr,
        then_branch: &Stmt,
        else_branch: Option<&Stmt>,
    ) -> Result<(), LowerError> {
        let Some(c) = self.lower_cond(cond)? else {
            return Ok(());
        };
        let then_block = self.new_block("then");
        let else_block = self.new_block("else");
        let join = self.new_block("fallthrough");
        self.terminate(InstKind::CondBr { cond: c, then_block, else_block });

        self.start_block(then_block);
        self.lower_stmt(then_branch)?;
        self.branch_to(join);

        self.start_block(else_block);
        if let Some(else_branch) = else_branch {
            self.lower_stmt(else_branch)?;
        }
        self.branch_to(join);

        self.start_block(join);
        Ok(())
    }

    // ── returns ────────────────────────────────────────────────

    /// Evaluate the returned values into one operand: a scalar, the address
    /// of an aggregate, or a packed `tmp` tuple for several values.
    fn lower_return_operand(
        &mut self,
        values: &[Expr],
        span: Span,
    ) -> Result<Option<Option<Value>>, LowerError> {
        let result = self.fb.signature().result.clone();
        let expected = match &result {
            Type::Void => 0,
            Type::Tuple(fields) if values.len() != 1 => fields.len(),
            _ => 1,
        };
        if values.len() != expected {
            return Err(self.fb.err(
                span,
                LowerErrorKind::ReturnArity { expected, found: values.len() },
            ));
        }

        if values.len() > 1 {
            let tmp = self.fb.create_temporary(&result, "tmp");
            self.store_fields(tmp.clone(), values)?;
            return Ok(Some(Some(tmp)));
        }
        match values.first() {
            Some(expr) => match self.lower_expr(expr)? {
                Some(v) => Ok(Some(Some(v))),
                None if result.is_zero_sized() => Ok(Some(None)),
                // Error sentinel: nothing sensible to return.
                None => Ok(None),
            },
            None => Ok(Some(None)),
        }
    }

    fn lower_return(&mut self, values: &[Expr], span: Span) -> Result<(), LowerError> {
        let Some(operand) = self.lower_return_operand(values, span)? else {
            return Ok(());
        };
        if !self.finally_frames.is_empty() {
            let result = self.fb.signature().result.clone();
            if let Some(v) = operand {
                if !result.is_zero_sized() {
                    let slot = self.fb.return_slot();
                    self.store_value(slot, v, &result);
                }
            }
            self.route_return_through_finally();
            return Ok(());
        }
        self.emit_return(operand, span)
    }

    /// Set the innermost region's flag to `Return` and enter its finally.
    pub(super) fn route_return_through_finally(&mut self) {
        let Some(frame) = self.finally_frames.last_mut() else {
            return;
        };
        frame.returns = true;
        let (flag, finally) = (frame.flag.clone(), frame.finally);
        self.emit(
            InstKind::Store { value: super::exception::Dispatch::Return.value(), ptr: flag },
            LirType::Void,
        );
        self.terminate(InstKind::Br { target: finally });
    }

    /// Return whatever the shared result slot holds, passing through any
    /// finally blocks still enclosing this point.
    pub(super) fn return_from_slot(&mut self, span: Span) -> Result<(), LowerError> {
        if !self.finally_frames.is_empty() {
            self.route_return_through_finally();
            return Ok(());
        }
        let result = self.fb.signature().result.clone();
        let operand = if result.is_zero_sized() {
            None
        } else {
            let slot = self.fb.return_slot();
            Some(self.load_value(slot, &result, "retval.ld"))
        };
        self.emit_return(operand, span)
    }

    fn emit_return(&mut self, operand: Option<Value>, span: Span) -> Result<(), LowerError> {
        self.ensure_open();
        let ret = self.fb.generate_return_sequence(self.current, operand, span)?;
        self.terminate(InstKind::Ret { value: ret });
        Ok(())
    }
}
