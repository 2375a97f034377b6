// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! LIR function representation - arenas of blocks and instructions plus a
//! block layout order.
//!
//! Blocks and instructions are allocated in arenas and referenced by id.
//! A block only becomes part of the function body once it is attached to the
//! layout; an instruction only executes once it is placed in a block. This
//! lets lowering create storage slots and label blocks before it knows where
//! they go.

use std::collections::HashSet;

use crate::{InstData, InstKind, LirType, Value};

/// LIR function
#[derive(Debug, Clone)]
pub struct LirFunction {
    pub name: String,
    pub args: Vec<Argument>,
    pub ret_ty: LirType,
    /// Personality routine, set once the function contains a landing pad.
    pub personality: Option<String>,
    blocks: Vec<LirBlock>,
    layout: Vec<BlockId>,
    insts: Vec<InstData>,
}

/// Physical function argument
#[derive(Debug, Clone)]
pub struct Argument {
    pub name: Option<String>,
    pub ty: LirType,
    pub attrs: Vec<ArgAttr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgAttr {
    /// Hidden pointer to the caller's result storage.
    Sret,
    /// Closure environment.
    Nest,
    /// Aggregate passed by pointer to a caller-owned copy.
    ByVal,
    SignExt,
    ZeroExt,
}

/// Basic block
#[derive(Debug, Clone)]
pub struct LirBlock {
    pub id: BlockId,
    pub name: String,
    pub insts: Vec<InstId>,
    /// Set when the block's address escapes; such blocks stay distinct and
    /// count as roots for reachability.
    pub address_taken: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstId(pub u32);

impl LirFunction {
    pub fn new(name: impl Into<String>, arg_types: Vec<LirType>, ret_ty: LirType) -> Self {
        let args = arg_types
            .into_iter()
            .map(|ty| Argument { name: None, ty, attrs: Vec::new() })
            .collect();
        Self {
            name: name.into(),
            args,
            ret_ty,
            personality: None,
            blocks: Vec::new(),
            layout: Vec::new(),
            insts: Vec::new(),
        }
    }

    // ── blocks ─────────────────────────────────────────────────

    /// Create a block and append it to the layout.
    pub fn create_block(&mut self, name: impl Into<String>) -> BlockId {
        let id = self.create_detached_block(name);
        self.layout.push(id);
        id
    }

    /// Create a block that is not yet part of the layout.
    pub fn create_detached_block(&mut self, name: impl Into<String>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(LirBlock {
            id,
            name: name.into(),
            insts: Vec::new(),
            address_taken: false,
        });
        id
    }

    /// Append a detached block to the layout. No-op if already attached.
    pub fn attach_block(&mut self, id: BlockId) {
        if !self.is_attached(id) {
            self.layout.push(id);
        }
    }

    pub fn is_attached(&self, id: BlockId) -> bool {
        self.layout.contains(&id)
    }

    pub fn entry(&self) -> Option<BlockId> {
        self.layout.first().copied()
    }

    pub fn block(&self, id: BlockId) -> &LirBlock {
        &self.blocks[id.0 as usize]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut LirBlock {
        &mut self.blocks[id.0 as usize]
    }

    /// Block ids in layout order.
    pub fn layout(&self) -> &[BlockId] {
        &self.layout
    }

    /// Laid-out blocks in order.
    pub fn blocks(&self) -> impl Iterator<Item = &LirBlock> + '_ {
        self.layout.iter().map(move |id| self.block(*id))
    }

    pub fn block_by_name(&self, name: &str) -> Option<BlockId> {
        self.blocks().find(|b| b.name == name).map(|b| b.id)
    }

    // ── instructions ───────────────────────────────────────────

    /// Allocate an instruction without placing it in a block.
    pub fn create_inst(&mut self, kind: InstKind, ty: LirType, name: Option<String>) -> InstId {
        let id = InstId(self.insts.len() as u32);
        self.insts.push(InstData { name, kind, ty });
        id
    }

    pub fn inst(&self, id: InstId) -> &InstData {
        &self.insts[id.0 as usize]
    }

    pub fn inst_mut(&mut self, id: InstId) -> &mut InstData {
        &mut self.insts[id.0 as usize]
    }

    pub fn append_inst(&mut self, block: BlockId, inst: InstId) {
        self.block_mut(block).insts.push(inst);
    }

    /// Insert `insts` at the front of `block`, keeping their relative order.
    pub fn insert_front(&mut self, block: BlockId, insts: &[InstId]) {
        let b = self.block_mut(block);
        b.insts.splice(0..0, insts.iter().copied());
    }

    /// Create an instruction at the end of `block` and return its value.
    pub fn push(
        &mut self,
        block: BlockId,
        kind: InstKind,
        ty: LirType,
        name: Option<String>,
    ) -> Value {
        let id = self.create_inst(kind, ty, name);
        self.append_inst(block, id);
        Value::Inst(id)
    }

    pub fn terminator(&self, block: BlockId) -> Option<InstId> {
        let last = *self.block(block).insts.last()?;
        if self.inst(last).kind.is_terminator() {
            Some(last)
        } else {
            None
        }
    }

    pub fn is_terminated(&self, block: BlockId) -> bool {
        self.terminator(block).is_some()
    }

    /// Type of a value in the context of this function.
    pub fn value_type(&self, value: &Value) -> LirType {
        match value {
            Value::Arg(i) => self.args[*i as usize].ty.clone(),
            Value::Inst(id) => self.inst(*id).ty.clone(),
            Value::Const(c) => c.ty(),
            Value::BlockAddress(_) | Value::Placeholder(_) => LirType::byte_ptr(),
        }
    }

    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        match self.terminator(block) {
            Some(term) => self.inst(term).kind.successors(),
            None => Vec::new(),
        }
    }

    // ── reachability ───────────────────────────────────────────

    /// Blocks reachable from the entry block or from any address-taken block.
    pub fn reachable_blocks(&self) -> HashSet<BlockId> {
        let mut seen = HashSet::new();
        let mut stack: Vec<BlockId> = self.entry().into_iter().collect();
        stack.extend(self.blocks().filter(|b| b.address_taken).map(|b| b.id));
        while let Some(b) = stack.pop() {
            if !seen.insert(b) {
                continue;
            }
            for succ in self.successors(b) {
                if !seen.contains(&succ) {
                    stack.push(succ);
                }
            }
        }
        seen
    }

    /// Drop unreachable blocks from the layout. Returns how many were removed.
    pub fn prune_unreachable(&mut self) -> usize {
        let reachable = self.reachable_blocks();
        let before = self.layout.len();
        self.layout.retain(|b| reachable.contains(b));
        before - self.layout.len()
    }

    // ── arguments ──────────────────────────────────────────────

    pub fn set_arg_name(&mut self, index: u32, name: impl Into<String>) {
        self.args[index as usize].name = Some(name.into());
    }

    pub fn add_arg_attr(&mut self, index: u32, attr: ArgAttr) {
        let attrs = &mut self.args[index as usize].attrs;
        if !attrs.contains(&attr) {
            attrs.push(attr);
        }
    }
}
