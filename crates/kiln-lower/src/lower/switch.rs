// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Switch lowering with C-style fallthrough.
//!
//! The scrutinee is evaluated once into a `switch` terminator. Every case
//! gets a block; a case that does not end in a terminator branches into the
//! next case's block, and the last one into the exit block. An erroneous
//! case value is dropped from the table; its body stays reachable through
//! fallthrough.

use std::collections::HashSet;

use kiln_ast::{Expr, Span, SwitchCase};
use kiln_lir::{BlockId, InstKind};

use super::BodyLowerer;
use crate::{LowerError, LowerErrorKind};

impl<'f, 'u> BodyLowerer<'f, 'u> {
    pub(super) fn lower_switch(
        &mut self,
        value: &Expr,
        cases: &[SwitchCase],
        span: Span,
    ) -> Result<(), LowerError> {
        let Some(scrutinee) = self.lower_expr(value)? else {
            return Ok(());
        };

        let mut blocks: Vec<BlockId> = Vec::with_capacity(cases.len());
        let mut table: Vec<(i64, BlockId)> = Vec::new();
        let mut seen = HashSet::new();
        let mut default = None;
        for case in cases {
            let block = self.new_block(if case.is_default() { "default" } else { "case" });
            if case.is_default() {
                if default.is_some() {
                    return Err(self.fb.err(span, LowerErrorKind::DuplicateDefault));
                }
                default = Some(block);
            }
            for v in &case.values {
                if v.is_error() {
                    self.fb.mark_error();
                    continue;
                }
                let Some(constant) = v.as_int_literal() else {
                    return Err(self.fb.err(v.span, LowerErrorKind::NonConstantCase));
                };
                if !seen.insert(constant) {
                    return Err(self.fb.err(v.span, LowerErrorKind::DuplicateCase(constant)));
                }
                table.push((constant, block));
            }
            blocks.push(block);
        }
        let exit = self.new_block("swexit");

        self.terminate(InstKind::Switch {
            value: scrutinee,
            default: default.unwrap_or(exit),
            cases: table,
        });

        self.break_targets.push(exit);
        for (i, case) in cases.iter().enumerate() {
            self.start_block(blocks[i]);
            if let Some(body) = &case.body {
                self.lower_stmt(body)?;
            }
            let next = blocks.get(i + 1).copied().unwrap_or(exit);
            self.branch_to(next);
        }
        self.break_targets.pop();

        self.start_block(exit);
        Ok(())
    }
}
