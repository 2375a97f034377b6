// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Statement and expression lowering into basic blocks.

mod exception;
mod expr;
mod stmt;
mod switch;

use kiln_lir::{BlockId, InstId, InstKind, LirType, Value};

use crate::FunctionBuilder;

/// A finally block that `return` must pass through.
struct FinallyFrame {
    finally: BlockId,
    /// Dispatch flag of the region.
    flag: Value,
    /// Set once some return was routed into this region.
    returns: bool,
}

/// Walks a function body and emits blocks through the builder.
pub struct BodyLowerer<'f, 'u> {
    fb: &'f mut FunctionBuilder<'u>,
    current: BlockId,
    /// Landing pads of enclosing protected regions, innermost last.
    unwind: Vec<BlockId>,
    finally_frames: Vec<FinallyFrame>,
    /// Exit blocks of enclosing switches, innermost last.
    break_targets: Vec<BlockId>,
}

impl<'f, 'u> BodyLowerer<'f, 'u> {
    /// Start lowering at the end of the entry block.
    pub fn new(fb: &'f mut FunctionBuilder<'u>) -> Self {
        let current = fb.entry_block();
        Self {
            fb,
            current,
            unwind: Vec::new(),
            finally_frames: Vec::new(),
            break_targets: Vec::new(),
        }
    }

    pub fn current_block(&self) -> BlockId {
        self.current
    }

    pub fn builder(&mut self) -> &mut FunctionBuilder<'u> {
        self.fb
    }

    /// Named, detached block.
    fn new_block(&mut self, tag: &str) -> BlockId {
        let name = self.fb.fresh_name(tag);
        self.fb.func_mut().create_detached_block(name)
    }

    /// Lay out `block` and continue emitting into it.
    fn start_block(&mut self, block: BlockId) {
        self.fb.func_mut().attach_block(block);
        log::trace!("start block {}", self.fb.func().block(block).name);
        self.current = block;
    }

    fn is_terminated(&self) -> bool {
        self.fb.func().is_terminated(self.current)
    }

    /// Code after a terminator goes into a fresh block nothing branches to.
    fn ensure_open(&mut self) {
        if self.is_terminated() {
            let dead = self.new_block("dead");
            self.start_block(dead);
        }
    }

    fn push_inst(&mut self, kind: InstKind, ty: LirType, name: Option<String>) -> InstId {
        self.ensure_open();
        let id = self.fb.create_inst(kind, ty, name);
        self.fb.func_mut().append_inst(self.current, id);
        id
    }

    fn emit(&mut self, kind: InstKind, ty: LirType) -> Value {
        Value::Inst(self.push_inst(kind, ty, None))
    }

    /// Emit with a fresh `tag.N` name.
    fn emit_named(&mut self, tag: &str, kind: InstKind, ty: LirType) -> Value {
        let name = self.fb.fresh_name(tag);
        Value::Inst(self.push_inst(kind, ty, Some(name)))
    }

    fn terminate(&mut self, kind: InstKind) -> InstId {
        self.push_inst(kind, LirType::Void, None)
    }

    /// Fall through to `target` unless the current block already ended.
    fn branch_to(&mut self, target: BlockId) {
        if !self.is_terminated() {
            self.terminate(InstKind::Br { target });
        }
    }
}
