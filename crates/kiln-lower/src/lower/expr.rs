// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Expression lowering.
//!
//! Scalars lower to values. Aggregates lower to the address of memory
//! holding them: a variable's slot, a field address, or a fresh temporary.
//! `None` means the expression produced nothing: it was void, or an error
//! sentinel the front end already reported.

use kiln_ast::{BinOp, Expr, ExprKind, VarId};
use kiln_lir::{self as lir, CastOp, CmpPred, Constant, InstKind, LirType, Value};
use kiln_types::Type;

use super::BodyLowerer;
use crate::{LowerError, LowerErrorKind};

type Lowered = Result<Option<Value>, LowerError>;

impl<'f, 'u> BodyLowerer<'f, 'u> {
    pub fn lower_expr(&mut self, expr: &Expr) -> Lowered {
        match &expr.kind {
            ExprKind::Int(v) => Ok(Some(Value::int(expr.ty.to_lir(), *v))),
            ExprKind::Float(v) => Ok(Some(Value::Const(Constant::float(expr.ty.to_lir(), *v)))),
            ExprKind::Bool(b) => Ok(Some(Value::i8(*b as i64))),
            ExprKind::Nil => Ok(Some(Value::Const(Constant::Null(expr.ty.to_lir())))),
            ExprKind::Zero => {
                let zero = Value::Const(Constant::Zero(expr.ty.to_lir()));
                if expr.ty.is_aggregate() {
                    let tmp = self.fb.create_temporary(&expr.ty, "tmp");
                    self.emit(InstKind::Store { value: zero, ptr: tmp.clone() }, LirType::Void);
                    Ok(Some(tmp))
                } else {
                    Ok(Some(zero))
                }
            }
            ExprKind::Var(var) => {
                let (slot, name) = self.var_slot(*var, expr)?;
                Ok(Some(self.load_value(slot, &expr.ty, &format!("{}.ld", name))))
            }
            ExprKind::AddressOf(var) => {
                let (slot, _) = self.var_slot(*var, expr)?;
                if let Some(v) = self.fb.variable_mut(*var) {
                    v.address_taken = true;
                }
                Ok(Some(slot))
            }
            ExprKind::Deref(_) | ExprKind::Field { .. } => {
                let Some(addr) = self.lower_addr(expr)? else {
                    return Ok(None);
                };
                let tag = match expr.kind {
                    ExprKind::Deref(_) => "deref.ld",
                    _ => "field.ld",
                };
                Ok(Some(self.load_value(addr, &expr.ty, tag)))
            }
            ExprKind::Binary { op, lhs, rhs } => self.lower_binary(*op, lhs, rhs),
            ExprKind::Call { callee, args } => self.lower_call(callee, args, &expr.ty),
            ExprKind::Conditional { cond, then_value, else_value } => {
                self.lower_conditional(cond, then_value, else_value, &expr.ty)
            }
            ExprKind::Composite(fields) => self.lower_composite(fields, expr),
            ExprKind::LabelAddress(label) => {
                Ok(Some(self.fb.address_of_label(*label, expr.span)?))
            }
            ExprKind::Error => {
                self.fb.mark_error();
                Ok(None)
            }
        }
    }

    fn var_slot(&self, var: VarId, expr: &Expr) -> Result<(Value, String), LowerError> {
        match self.fb.variable(var) {
            Some(v) => Ok((v.slot.clone(), v.name.clone())),
            None => Err(self.fb.err(expr.span, LowerErrorKind::UnknownVariable(var))),
        }
    }

    /// Address of an lvalue: a variable, a dereferenced pointer, or a field.
    pub(crate) fn lower_addr(&mut self, expr: &Expr) -> Lowered {
        match &expr.kind {
            ExprKind::Var(var) => Ok(Some(self.var_slot(*var, expr)?.0)),
            ExprKind::Deref(ptr) => {
                let Some(p) = self.lower_expr(ptr)? else {
                    return Ok(None);
                };
                let want = expr.ty.to_lir().ptr_to();
                if self.fb.func().value_type(&p) == want {
                    Ok(Some(p))
                } else {
                    Ok(Some(self.emit_named(
                        "cast",
                        InstKind::Cast { op: CastOp::BitCast, value: p, to: want.clone() },
                        want,
                    )))
                }
            }
            ExprKind::Field { base, index } => {
                // Aggregates lower to addresses, so an rvalue base works too.
                let base_addr = match base.kind {
                    ExprKind::Var(_) | ExprKind::Deref(_) | ExprKind::Field { .. } => {
                        self.lower_addr(base)?
                    }
                    _ => self.lower_expr(base)?,
                };
                let Some(base_addr) = base_addr else {
                    return Ok(None);
                };
                if !base.ty.is_aggregate() {
                    return Err(self.fb.err(expr.span, LowerErrorKind::NotAnLvalue));
                }
                Ok(Some(self.field_addr(base_addr, *index, &expr.ty)))
            }
            ExprKind::Error => {
                self.fb.mark_error();
                Ok(None)
            }
            _ => Err(self.fb.err(expr.span, LowerErrorKind::NotAnLvalue)),
        }
    }

    fn field_addr(&mut self, base: Value, index: u32, field_ty: &Type) -> Value {
        self.emit_named(
            "field",
            InstKind::FieldAddr { base, index },
            field_ty.to_lir().ptr_to(),
        )
    }

    /// Scalar loads from `addr`; aggregates stay in memory.
    pub(crate) fn load_value(&mut self, addr: Value, ty: &Type, tag: &str) -> Value {
        if ty.is_aggregate() {
            addr
        } else {
            self.emit_named(tag, InstKind::Load { ptr: addr }, ty.to_lir())
        }
    }

    /// Store a lowered value of `ty` into `dst`. Aggregates are block-copied.
    pub(crate) fn store_value(&mut self, dst: Value, value: Value, ty: &Type) -> lir::InstId {
        let kind = if ty.is_aggregate() {
            InstKind::MemCpy { dst, src: value, size: ty.size(), align: ty.align() }
        } else {
            InstKind::Store { value, ptr: dst }
        };
        self.push_inst(kind, LirType::Void, None)
    }

    /// Branch condition as an `i1`.
    pub(crate) fn lower_cond(&mut self, cond: &Expr) -> Lowered {
        if let ExprKind::Bool(b) = cond.kind {
            return Ok(Some(Value::i1(b)));
        }
        let Some(v) = self.lower_expr(cond)? else {
            return Ok(None);
        };
        Ok(Some(self.emit_named(
            "trunc",
            InstKind::Cast { op: CastOp::Trunc, value: v, to: LirType::I1 },
            LirType::I1,
        )))
    }

    fn lower_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) -> Lowered {
        let Some(l) = self.lower_expr(lhs)? else {
            return Ok(None);
        };
        let Some(r) = self.lower_expr(rhs)? else {
            return Ok(None);
        };
        let ty = &lhs.ty;
        if op.is_comparison() {
            let pred = cmp_pred(op, ty);
            let tag = if pred.is_float() { "fcmp" } else { "icmp" };
            let c = self.emit_named(tag, InstKind::Cmp { pred, lhs: l, rhs: r }, LirType::I1);
            return Ok(Some(self.emit_named(
                "zext",
                InstKind::Cast { op: CastOp::ZExt, value: c, to: LirType::I8 },
                LirType::I8,
            )));
        }
        let Some(bop) = arith_op(op, ty) else {
            return Err(self.fb.err(
                lhs.span,
                LowerErrorKind::InvalidExpression("operator does not apply to type"),
            ));
        };
        let tag = bop.to_string();
        let kind = InstKind::Binary { op: bop, lhs: l, rhs: r };
        Ok(Some(self.emit_named(&tag, kind, ty.to_lir())))
    }

    /// Calls inside a protected region become invokes unwinding to its pad.
    fn lower_call(&mut self, callee: &str, args: &[Expr], ret: &Type) -> Lowered {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            let Some(v) = self.lower_expr(arg)? else {
                return Ok(None);
            };
            // Aggregates travel by value.
            let v = if arg.ty.is_aggregate() {
                self.emit_named("ld", InstKind::Load { ptr: v }, arg.ty.to_lir())
            } else {
                v
            };
            values.push(v);
        }

        let ret_lir = if ret.is_zero_sized() { LirType::Void } else { ret.to_lir() };
        let name = if ret_lir.is_void() { None } else { Some(self.fb.fresh_name("call")) };
        let callee = callee.to_string();
        let result = match self.unwind.last().copied() {
            Some(pad) => {
                let cont = self.new_block("cont");
                let id = self.push_inst(
                    InstKind::Invoke { callee, args: values, normal: cont, unwind: pad },
                    ret_lir.clone(),
                    name,
                );
                self.start_block(cont);
                Value::Inst(id)
            }
            None => {
                let call = InstKind::Call { callee, args: values };
                Value::Inst(self.push_inst(call, ret_lir.clone(), name))
            }
        };

        if ret_lir.is_void() {
            return Ok(None);
        }
        if ret.is_aggregate() {
            let tmp = self.fb.create_temporary(ret, "tmp");
            self.emit(InstKind::Store { value: result, ptr: tmp.clone() }, LirType::Void);
            return Ok(Some(tmp));
        }
        Ok(Some(result))
    }

    /// `cond ? a : b` through a `tmpv` slot written on both arms.
    fn lower_conditional(
        &mut self,
        cond: &Expr,
        then_value: &Expr,
        else_value: &Expr,
        ty: &Type,
    ) -> Lowered {
        let Some(c) = self.lower_cond(cond)? else {
            return Ok(None);
        };
        let tmp = self.fb.create_temporary(ty, "tmpv");
        let then_block = self.new_block("then");
        let else_block = self.new_block("else");
        let join = self.new_block("fallthrough");
        self.terminate(InstKind::CondBr { cond: c, then_block, else_block });

        for (block, value) in [(then_block, then_value), (else_block, else_value)] {
            self.start_block(block);
            if let Some(v) = self.lower_expr(value)? {
                self.store_value(tmp.clone(), v, ty);
            }
            self.branch_to(join);
        }

        self.start_block(join);
        Ok(Some(self.load_value(tmp, ty, "tmpv.ld")))
    }

    fn lower_composite(&mut self, fields: &[Expr], expr: &Expr) -> Lowered {
        if !expr.ty.is_aggregate() {
            return Err(self.fb.err(
                expr.span,
                LowerErrorKind::InvalidExpression("composite of scalar type"),
            ));
        }
        let tmp = self.fb.create_temporary(&expr.ty, "tmp");
        self.store_fields(tmp.clone(), fields)?;
        Ok(Some(tmp))
    }

    /// Store each value into the matching field of the aggregate at `base`.
    pub(crate) fn store_fields(&mut self, base: Value, fields: &[Expr]) -> Result<(), LowerError> {
        for (i, field) in fields.iter().enumerate() {
            let Some(v) = self.lower_expr(field)? else {
                continue;
            };
            let addr = self.field_addr(base.clone(), i as u32, &field.ty);
            self.store_value(addr, v, &field.ty);
        }
        Ok(())
    }
}

fn cmp_pred(op: BinOp, ty: &Type) -> CmpPred {
    if ty.is_float() {
        return match op {
            BinOp::Eq => CmpPred::Oeq,
            BinOp::Ne => CmpPred::One,
            BinOp::Lt => CmpPred::Olt,
            BinOp::Le => CmpPred::Ole,
            BinOp::Gt => CmpPred::Ogt,
            _ => CmpPred::Oge,
        };
    }
    let signed = ty.is_signed();
    match op {
        BinOp::Eq => CmpPred::Eq,
        BinOp::Ne => CmpPred::Ne,
        BinOp::Lt if signed => CmpPred::Slt,
        BinOp::Lt => CmpPred::Ult,
        BinOp::Le if signed => CmpPred::Sle,
        BinOp::Le => CmpPred::Ule,
        BinOp::Gt if signed => CmpPred::Sgt,
        BinOp::Gt => CmpPred::Ugt,
        _ if signed => CmpPred::Sge,
        _ => CmpPred::Uge,
    }
}

fn arith_op(op: BinOp, ty: &Type) -> Option<lir::BinOp> {
    if ty.is_float() {
        return match op {
            BinOp::Add => Some(lir::BinOp::FAdd),
            BinOp::Sub => Some(lir::BinOp::FSub),
            BinOp::Mul => Some(lir::BinOp::FMul),
            BinOp::Div => Some(lir::BinOp::FDiv),
            _ => None,
        };
    }
    if ty.is_aggregate() || ty.is_void() {
        return None;
    }
    let signed = ty.is_signed();
    Some(match op {
        BinOp::Add => lir::BinOp::Add,
        BinOp::Sub => lir::BinOp::Sub,
        BinOp::Mul => lir::BinOp::Mul,
        BinOp::Div if signed => lir::BinOp::SDiv,
        BinOp::Div => lir::BinOp::UDiv,
        BinOp::Rem if signed => lir::BinOp::SRem,
        BinOp::Rem => lir::BinOp::URem,
        BinOp::And => lir::BinOp::And,
        BinOp::Or => lir::BinOp::Or,
        BinOp::Xor => lir::BinOp::Xor,
        _ => return None,
    })
}
