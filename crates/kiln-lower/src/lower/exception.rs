// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Exception regions and deferred calls.
//!
//! A region with a finally clause gets one byte-sized dispatch flag. Every
//! path into the finally block first records why it came:
//!
//! - `Reraise`: an exception is buffered in `ehtmp` and must continue
//!   unwinding once finally is done.
//! - `Continue`: the body or catch completed normally.
//! - `Return`: a `return` stored its value in the shared result slot.
//!
//! The foot of the finally block is a single `switch` on the flag.
//!
//! ```text
//!   body ──normal──▶ finok ──flag=1──▶ finally ──switch──▶ cont    (1)
//!     │unwind                             ▲      ├──────▶ finres  (0)
//!     ▼                                   │      ├──────▶ finret  (2)
//!    pad ──▶ catch ──normal──▶ finok      │      └──────▶ finbad
//!              │unwind                    │
//!              ▼                          │
//!           catchpad ──flag=0─────────────┘
//! ```

use kiln_ast::{Expr, ExprKind, Span, Stmt};
use kiln_lir::{BlockId, InstKind, LirType, PadKind, Value};
use kiln_types::Type;

use super::{BodyLowerer, FinallyFrame};
use crate::{LowerError, LowerErrorKind};

/// Why control entered a finally block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dispatch {
    Reraise = 0,
    Continue = 1,
    Return = 2,
}

impl Dispatch {
    pub(crate) fn code(self) -> i64 {
        self as i64
    }

    pub(crate) fn value(self) -> Value {
        Value::i8(self.code())
    }
}

/// In-memory type of the landing pad's `{ i8*, i32 }` token.
fn token_type() -> Type {
    Type::Struct(vec![Type::Void.ptr_to(), Type::I32])
}

impl<'f, 'u> BodyLowerer<'f, 'u> {
    /// Lower `try body catch finally`. With neither clause this is just the
    /// body.
    pub fn lower_exception_region(
        &mut self,
        body: &Stmt,
        catch: Option<&Stmt>,
        finally: Option<&Stmt>,
    ) -> Result<(), LowerError> {
        let Some(finally) = finally else {
            return self.lower_try_catch(body, catch);
        };

        let flag = self.fb.create_temporary(&Type::I8, "finvar");
        let ehtmp = self.fb.create_temporary(&token_type(), "ehtmp");
        let pad = self.new_block("pad");
        let catch_blocks = match catch {
            Some(_) => Some((self.new_block("catch"), self.new_block("catchpad"))),
            None => None,
        };
        let finok = self.new_block("finok");
        let fin = self.new_block("finally");
        let cont = self.new_block("cont");

        self.finally_frames.push(FinallyFrame {
            finally: fin,
            flag: flag.clone(),
            returns: false,
        });

        self.unwind.push(pad);
        self.lower_stmt(body)?;
        self.unwind.pop();
        self.branch_to(finok);

        self.start_block(pad);
        match (catch, catch_blocks) {
            (Some(catch), Some((catch_block, catchpad))) => {
                self.landing_pad(PadKind::CatchAll);
                self.terminate(InstKind::Br { target: catch_block });

                // Exceptions escaping the handler must not re-enter it.
                self.start_block(catch_block);
                self.unwind.push(catchpad);
                self.lower_stmt(catch)?;
                self.unwind.pop();
                self.branch_to(finok);

                self.start_block(catchpad);
                self.enter_finally_raised(ehtmp.clone(), flag.clone(), fin);
            }
            _ => self.enter_finally_raised(ehtmp.clone(), flag.clone(), fin),
        }

        let returns = self.finally_frames.pop().is_some_and(|f| f.returns);

        self.start_block(finok);
        let proceed = InstKind::Store { value: Dispatch::Continue.value(), ptr: flag.clone() };
        self.emit(proceed, LirType::Void);
        self.terminate(InstKind::Br { target: fin });

        self.start_block(fin);
        self.lower_stmt(finally)?;
        if !self.is_terminated() {
            self.dispatch_after_finally(flag, ehtmp, cont, returns, body.span)?;
        }

        self.start_block(cont);
        Ok(())
    }

    fn landing_pad(&mut self, kind: PadKind) -> Value {
        self.emit_named("ex", InstKind::LandingPad { kind }, LirType::exception_token())
    }

    /// Cleanup pad: buffer the exception, flag a re-raise, run finally.
    fn enter_finally_raised(&mut self, ehtmp: Value, flag: Value, fin: BlockId) {
        let token = self.landing_pad(PadKind::Cleanup);
        self.emit(InstKind::Store { value: token, ptr: ehtmp }, LirType::Void);
        let reraise = InstKind::Store { value: Dispatch::Reraise.value(), ptr: flag };
        self.emit(reraise, LirType::Void);
        self.terminate(InstKind::Br { target: fin });
    }

    fn dispatch_after_finally(
        &mut self,
        flag: Value,
        ehtmp: Value,
        cont: BlockId,
        returns: bool,
        span: Span,
    ) -> Result<(), LowerError> {
        let state = self.emit_named("finvar.ld", InstKind::Load { ptr: flag }, LirType::I8);
        let finres = self.new_block("finres");
        let finret = if returns { Some(self.new_block("finret")) } else { None };
        let finbad = self.new_block("finbad");

        let mut cases = vec![
            (Dispatch::Reraise.code(), finres),
            (Dispatch::Continue.code(), cont),
        ];
        if let Some(finret) = finret {
            cases.push((Dispatch::Return.code(), finret));
        }
        self.terminate(InstKind::Switch { value: state, default: finbad, cases });

        self.start_block(finres);
        self.reraise(ehtmp);

        if let Some(finret) = finret {
            self.start_block(finret);
            self.return_from_slot(span)?;
        }

        self.start_block(finbad);
        self.terminate(InstKind::Unreachable);
        Ok(())
    }

    /// Continue unwinding with the buffered exception: `resume` when nothing
    /// encloses this point, otherwise rethrow into the enclosing pad.
    fn reraise(&mut self, ehtmp: Value) {
        match self.unwind.last().copied() {
            None => {
                let token = self.emit_named(
                    "exn",
                    InstKind::Load { ptr: ehtmp },
                    LirType::exception_token(),
                );
                self.terminate(InstKind::Resume { value: token });
            }
            Some(outer) => {
                let ptr = self.emit_named(
                    "field",
                    InstKind::FieldAddr { base: ehtmp, index: 0 },
                    LirType::byte_ptr().ptr_to(),
                );
                let exn = self.emit_named("exn", InstKind::Load { ptr }, LirType::byte_ptr());
                let dead = self.new_block("cont");
                let callee = self.fb.options().rethrow.clone();
                self.terminate(InstKind::Invoke {
                    callee,
                    args: vec![exn],
                    normal: dead,
                    unwind: outer,
                });
                self.start_block(dead);
                self.terminate(InstKind::Unreachable);
            }
        }
    }

    fn lower_try_catch(&mut self, body: &Stmt, catch: Option<&Stmt>) -> Result<(), LowerError> {
        let Some(catch) = catch else {
            return self.lower_stmt(body);
        };
        let pad = self.new_block("pad");
        let catch_block = self.new_block("catch");
        let cont = self.new_block("cont");

        self.unwind.push(pad);
        self.lower_stmt(body)?;
        self.unwind.pop();
        self.branch_to(cont);

        self.start_block(pad);
        self.landing_pad(PadKind::CatchAll);
        self.terminate(InstKind::Br { target: catch_block });

        self.start_block(catch_block);
        self.lower_stmt(catch)?;
        self.branch_to(cont);

        self.start_block(cont);
        Ok(())
    }

    /// Deferred-call epilogue. `undefer` runs under a catch-all pad; when it
    /// raises, `check` runs and `undefer` is attempted again.
    pub(super) fn lower_defer(
        &mut self,
        undefer: &Expr,
        check: &Stmt,
        span: Span,
    ) -> Result<(), LowerError> {
        if undefer.is_error() {
            self.fb.mark_error();
            return Ok(());
        }
        if !matches!(undefer.kind, ExprKind::Call { .. }) {
            return Err(self.fb.err(
                span,
                LowerErrorKind::InvalidExpression("deferred epilogue must be a call"),
            ));
        }
        let pad = self.new_block("pad");
        let catch_block = self.new_block("catch");
        let finish = self.new_block("finish");
        self.branch_to(finish);

        self.start_block(pad);
        self.landing_pad(PadKind::CatchAll);
        self.terminate(InstKind::Br { target: catch_block });

        self.start_block(catch_block);
        self.lower_stmt(check)?;
        self.branch_to(finish);

        self.start_block(finish);
        self.unwind.push(pad);
        self.lower_expr(undefer)?;
        self.unwind.pop();
        Ok(())
    }
}
