// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! FunctionBuilder - ABI materialization, storage, prolog and labels for one
//! function.
//!
//! Stack slots are created detached. Until the prolog is generated they
//! collect in `pending_allocas`; the prolog places them, followed by the
//! parameter spills, at the front of the entry block. Slots requested after
//! that are late temporaries and get inserted at the very front when the
//! function is finished.

use std::collections::HashMap;

use kiln_abi::{classify, Extension, FunctionAbi, ParamDisposition, ParamInfo, Signature};
use kiln_ast::{LabelId, Span, VarId};
use kiln_lir::{
    ArgAttr, BlockId, CastOp, InstId, InstKind, LirFunction, LirType, PlaceholderId, Value,
};
use kiln_types::Type;

use crate::label::{Label, LabelTable};
use crate::{LowerError, LowerErrorKind, UnitContext, VarKind, Variable};

pub struct FunctionBuilder<'u> {
    unit: &'u mut UnitContext,
    func: LirFunction,
    sig: Signature,
    abi: FunctionAbi,
    entry: BlockId,
    abi_setup_complete: bool,
    /// Storage per parameter, by declaration index.
    param_slots: Vec<Value>,
    params_registered: usize,
    chain_var: Option<VarId>,
    pending_allocas: Vec<InstId>,
    late_temps: Vec<InstId>,
    prolog_generated: bool,
    vars: Vec<Variable>,
    param_vars: Vec<VarId>,
    local_vars: Vec<VarId>,
    /// Slot value to owning variable. Aliases are not entered here.
    value_vars: HashMap<Value, VarId>,
    labels: LabelTable,
    /// Shared result slot for returns routed through finally blocks.
    retval_slot: Option<Value>,
    error_seen: bool,
}

impl<'u> FunctionBuilder<'u> {
    pub fn new(unit: &'u mut UnitContext, name: impl Into<String>, sig: Signature) -> Self {
        let abi = classify(&sig, &unit.target);
        let mut func = LirFunction::new(name, abi.arg_types.clone(), abi.ret_ty.clone());
        let entry = func.create_block("entry");
        Self {
            unit,
            func,
            sig,
            abi,
            entry,
            abi_setup_complete: false,
            param_slots: Vec::new(),
            params_registered: 0,
            chain_var: None,
            pending_allocas: Vec::new(),
            late_temps: Vec::new(),
            prolog_generated: false,
            vars: Vec::new(),
            param_vars: Vec::new(),
            local_vars: Vec::new(),
            value_vars: HashMap::new(),
            labels: LabelTable::default(),
            retval_slot: None,
            error_seen: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.func.name
    }

    pub fn func(&self) -> &LirFunction {
        &self.func
    }

    pub(crate) fn func_mut(&mut self) -> &mut LirFunction {
        &mut self.func
    }

    pub fn abi(&self) -> &FunctionAbi {
        &self.abi
    }

    pub fn signature(&self) -> &Signature {
        &self.sig
    }

    pub fn entry_block(&self) -> BlockId {
        self.entry
    }

    pub(crate) fn options(&self) -> &crate::LowerOptions {
        &self.unit.options
    }

    pub fn fresh_name(&mut self, tag: &str) -> String {
        self.unit.fresh_name(tag)
    }

    pub(crate) fn err(&self, span: Span, kind: LowerErrorKind) -> LowerError {
        LowerError { function: self.func.name.clone(), span, kind }
    }

    /// Note that an error sentinel was seen. Later consistency checks that
    /// an erroneous front end could trip are relaxed.
    pub fn mark_error(&mut self) {
        self.error_seen = true;
    }

    pub fn error_seen(&self) -> bool {
        self.error_seen
    }

    // ── ABI setup ──────────────────────────────────────────────

    /// One-time setup of hidden arguments and parameter storage.
    fn ensure_abi_setup(&mut self) -> Result<(), LowerError> {
        if self.abi_setup_complete {
            return Ok(());
        }
        self.abi_setup_complete = true;

        if let Some(index) = self.abi.sret_index() {
            let name = self.fresh_name("sret.formal");
            self.func.set_arg_name(index, name);
            self.func.add_arg_attr(index, ArgAttr::Sret);
        }

        match &self.abi.chain.disposition {
            ParamDisposition::Direct { chunks, .. } if chunks.len() == 1 => {}
            _ => return Err(self.err(Span::default(), LowerErrorKind::ChainNotDirect)),
        }
        let chain = self.abi.chain_index();
        let nest = self.fresh_name("nest");
        self.func.set_arg_name(chain, nest);
        self.func.add_arg_attr(chain, ArgAttr::Nest);

        let params = self.abi.params.clone();
        for info in &params {
            let slot = match &info.disposition {
                ParamDisposition::Ignore => self.create_alloca(info.ty.to_lir(), None),
                ParamDisposition::Indirect => {
                    self.func.add_arg_attr(info.sig_offset, ArgAttr::ByVal);
                    Value::Arg(info.sig_offset)
                }
                ParamDisposition::Direct { chunks, ext } => {
                    if chunks.is_empty() || chunks.len() > 2 {
                        return Err(self.err(
                            Span::default(),
                            LowerErrorKind::InconsistentChunks { count: chunks.len() },
                        ));
                    }
                    let attr = match ext {
                        Extension::Sign => Some(ArgAttr::SignExt),
                        Extension::Zero => Some(ArgAttr::ZeroExt),
                        Extension::None => None,
                    };
                    if let Some(attr) = attr {
                        for i in 0..chunks.len() as u32 {
                            self.func.add_arg_attr(info.sig_offset + i, attr);
                        }
                    }
                    self.create_alloca(info.ty.to_lir(), None)
                }
            };
            self.param_slots.push(slot);
        }

        log::debug!(
            "abi setup for `{}`: {} params, {} physical args",
            self.func.name,
            params.len(),
            self.func.args.len()
        );
        Ok(())
    }

    // ── storage ────────────────────────────────────────────────

    /// Stack slot for one `ty`. Pending until the prolog, late afterwards.
    fn create_alloca(&mut self, ty: LirType, name: Option<String>) -> Value {
        let ptr_ty = ty.ptr_to();
        let id = self.func.create_inst(InstKind::Alloca { ty }, ptr_ty, name);
        if self.prolog_generated {
            self.late_temps.push(id);
        } else {
            self.pending_allocas.push(id);
        }
        Value::Inst(id)
    }

    fn set_value_name(&mut self, value: &Value, name: String) {
        match value {
            Value::Inst(id) => self.func.inst_mut(*id).name = Some(name),
            Value::Arg(index) => self.func.set_arg_name(*index, name),
            _ => {}
        }
    }

    /// Fresh `tag.N` slot of the given type.
    pub fn create_temporary(&mut self, ty: &Type, tag: &str) -> Value {
        let name = self.fresh_name(tag);
        self.create_alloca(ty.to_lir(), Some(name))
    }

    fn push_var(&mut self, mut var: Variable) -> VarId {
        let id = VarId(self.vars.len() as u32);
        var.id = id;
        self.vars.push(var);
        id
    }

    /// Register the next declared parameter. Must follow declaration order.
    pub fn register_parameter(
        &mut self,
        name: &str,
        ty: Type,
        address_taken: bool,
        span: Span,
    ) -> Result<VarId, LowerError> {
        self.ensure_abi_setup()?;
        let index = self.params_registered;
        let Some(info) = self.abi.params.get(index).cloned() else {
            return Err(self.err(
                span,
                LowerErrorKind::TooManyParameters { declared: self.abi.params.len() },
            ));
        };
        if info.ty != ty {
            return Err(self.err(span, LowerErrorKind::ParameterTypeMismatch { index }));
        }
        let slot = self.param_slots[index].clone();
        if self.value_vars.contains_key(&slot) {
            return Err(self.err(
                span,
                LowerErrorKind::DuplicateParameter { name: name.to_string() },
            ));
        }

        match &info.disposition {
            ParamDisposition::Ignore => self.set_value_name(&slot, name.to_string()),
            ParamDisposition::Indirect => self.func.set_arg_name(info.sig_offset, name),
            ParamDisposition::Direct { chunks, .. } => {
                if chunks.len() == 1 {
                    self.func.set_arg_name(info.sig_offset, name);
                } else {
                    for i in 0..chunks.len() as u32 {
                        self.func
                            .set_arg_name(info.sig_offset + i, format!("{}.chunk{}", name, i));
                    }
                }
                self.set_value_name(&slot, format!("{}.addr", name));
            }
        }

        let id = self.push_var(Variable {
            id: VarId(0),
            name: name.to_string(),
            ty,
            kind: VarKind::Param,
            slot: slot.clone(),
            initializer: None,
            address_taken,
            span,
            is_decl_alias: false,
        });
        self.value_vars.insert(slot, id);
        self.param_vars.push(id);
        self.params_registered += 1;
        Ok(id)
    }

    /// Give the closure environment a name and an addressable slot.
    pub fn register_closure_env(
        &mut self,
        name: &str,
        ty: Type,
        span: Span,
    ) -> Result<VarId, LowerError> {
        self.ensure_abi_setup()?;
        if self.chain_var.is_some() {
            return Err(self.err(span, LowerErrorKind::ChainAlreadyRegistered));
        }
        let slot = self.create_alloca(ty.to_lir(), Some(format!("{}.addr", name)));
        let id = self.push_var(Variable {
            id: VarId(0),
            name: name.to_string(),
            ty,
            kind: VarKind::ClosureEnv,
            slot: slot.clone(),
            initializer: None,
            address_taken: true,
            span,
            is_decl_alias: false,
        });
        self.value_vars.insert(slot, id);
        self.chain_var = Some(id);
        if self.prolog_generated {
            let spill = self.gen_chain_spill(id);
            self.late_temps.extend(spill);
        }
        Ok(id)
    }

    /// Register a local. With `alias_of`, the new variable shares that
    /// variable's slot.
    pub fn register_local(
        &mut self,
        name: &str,
        ty: Type,
        alias_of: Option<VarId>,
        address_taken: bool,
        span: Span,
    ) -> Result<VarId, LowerError> {
        let (slot, is_decl_alias) = match alias_of {
            Some(target) => match self.vars.get(target.0 as usize) {
                Some(var) => (var.slot.clone(), true),
                None => return Err(self.err(span, LowerErrorKind::BadAlias(target))),
            },
            None => (self.create_alloca(ty.to_lir(), Some(name.to_string())), false),
        };
        let id = self.push_var(Variable {
            id: VarId(0),
            name: name.to_string(),
            ty,
            kind: VarKind::Local,
            slot: slot.clone(),
            initializer: None,
            address_taken,
            span,
            is_decl_alias,
        });
        if !is_decl_alias {
            self.value_vars.insert(slot, id);
        }
        self.local_vars.push(id);
        Ok(id)
    }

    // ── prolog ─────────────────────────────────────────────────

    /// Copy a direct parameter's incoming chunks into its slot.
    fn gen_arg_spill(&mut self, info: &ParamInfo, slot: Value) -> Result<Vec<InstId>, LowerError> {
        let ParamDisposition::Direct { chunks, .. } = &info.disposition else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        match chunks.len() {
            1 => {
                let mut ptr = slot;
                if chunks[0] != info.ty.to_lir() {
                    let cast = self.cast_inst(ptr, chunks[0].ptr_to());
                    out.push(cast);
                    ptr = Value::Inst(cast);
                }
                let store = self.func.create_inst(
                    InstKind::Store { value: Value::Arg(info.sig_offset), ptr },
                    LirType::Void,
                    None,
                );
                out.push(store);
            }
            2 => {
                // Reassemble through the registerized struct.
                let agg = info.abi_struct_type();
                let cast = self.cast_inst(slot, agg.ptr_to());
                out.push(cast);
                for (i, chunk) in chunks.iter().enumerate() {
                    let name = self.fresh_name("field");
                    let field = self.func.create_inst(
                        InstKind::FieldAddr { base: Value::Inst(cast), index: i as u32 },
                        chunk.ptr_to(),
                        Some(name),
                    );
                    let store = self.func.create_inst(
                        InstKind::Store {
                            value: Value::Arg(info.sig_offset + i as u32),
                            ptr: Value::Inst(field),
                        },
                        LirType::Void,
                        None,
                    );
                    out.push(field);
                    out.push(store);
                }
            }
            count => {
                return Err(self.err(Span::default(), LowerErrorKind::InconsistentChunks { count }))
            }
        }
        Ok(out)
    }

    fn cast_inst(&mut self, value: Value, to: LirType) -> InstId {
        let name = self.fresh_name("cast");
        self.func.create_inst(
            InstKind::Cast { op: CastOp::BitCast, value, to: to.clone() },
            to,
            Some(name),
        )
    }

    fn gen_chain_spill(&mut self, chain: VarId) -> Vec<InstId> {
        let var = &self.vars[chain.0 as usize];
        let mut ptr = var.slot.clone();
        let needs_cast = var.ty.to_lir() != LirType::byte_ptr();
        let mut out = Vec::new();
        if needs_cast {
            let cast = self.cast_inst(ptr, LirType::byte_ptr().ptr_to());
            out.push(cast);
            ptr = Value::Inst(cast);
        }
        let store = self.func.create_inst(
            InstKind::Store { value: Value::Arg(self.abi.chain_index()), ptr },
            LirType::Void,
            None,
        );
        out.push(store);
        self.vars[chain.0 as usize].initializer = Some(store);
        out
    }

    /// Place pending slots and parameter spills at the front of the entry
    /// block. Later calls do nothing.
    pub fn generate_prolog(&mut self) -> Result<(), LowerError> {
        if self.prolog_generated {
            return Ok(());
        }
        self.ensure_abi_setup()?;
        let declared = self.abi.params.len();
        if self.params_registered != declared && !self.error_seen {
            return Err(self.err(
                Span::default(),
                LowerErrorKind::UnregisteredParameters {
                    registered: self.params_registered,
                    declared,
                },
            ));
        }

        let mut spills = Vec::new();
        if let Some(chain) = self.chain_var {
            spills.extend(self.gen_chain_spill(chain));
        }
        let params = self.abi.params.clone();
        for (index, info) in params.iter().enumerate() {
            if !info.is_direct() {
                continue;
            }
            let insts = self.gen_arg_spill(info, self.param_slots[index].clone())?;
            if let (Some(last), Some(var)) = (insts.last(), self.param_vars.get(index)) {
                self.vars[var.0 as usize].initializer = Some(*last);
            }
            spills.extend(insts);
        }

        let mut prolog = std::mem::take(&mut self.pending_allocas);
        prolog.extend(spills);
        self.func.insert_front(self.entry, &prolog);
        self.prolog_generated = true;

        if let Some(last) = prolog.last() {
            for var in &self.param_vars {
                let var = &mut self.vars[var.0 as usize];
                if var.initializer.is_none() {
                    var.initializer = Some(*last);
                }
            }
        }
        log::debug!(
            "prolog for `{}`: {} instructions",
            self.func.name,
            prolog.len()
        );
        Ok(())
    }

    /// Insert slots created after the prolog at the very front of the entry
    /// block, keeping their creation order.
    pub fn fixup_prolog(&mut self) {
        if self.late_temps.is_empty() {
            return;
        }
        let temps = std::mem::take(&mut self.late_temps);
        log::trace!("fixup prolog of `{}`: {} late temporaries", self.func.name, temps.len());
        self.func.insert_front(self.entry, &temps);
    }

    pub fn prolog_generated(&self) -> bool {
        self.prolog_generated
    }

    // ── instructions ───────────────────────────────────────────

    /// Create a detached instruction, tracking any label placeholders it uses.
    pub(crate) fn create_inst(
        &mut self,
        kind: InstKind,
        ty: LirType,
        name: Option<String>,
    ) -> InstId {
        let uses: Vec<PlaceholderId> = kind
            .operands()
            .into_iter()
            .filter_map(|v| match v {
                Value::Placeholder(p) => Some(*p),
                _ => None,
            })
            .collect();
        let id = self.func.create_inst(kind, ty, name);
        for p in uses {
            self.labels.record_use(p, id);
        }
        id
    }

    // ── returns ────────────────────────────────────────────────

    /// Emit what must precede `ret` in `block` and return its operand.
    ///
    /// `value` is the returned scalar, or the address of the returned
    /// aggregate.
    pub fn generate_return_sequence(
        &mut self,
        block: BlockId,
        value: Option<Value>,
        span: Span,
    ) -> Result<Option<Value>, LowerError> {
        let result = self.abi.result.clone();
        match &result.disposition {
            ParamDisposition::Ignore => Ok(None),
            ParamDisposition::Indirect => {
                let Some(src) = value else {
                    return Err(self.err(span, LowerErrorKind::ReturnArity { expected: 1, found: 0 }));
                };
                let dst = Value::Arg(0);
                let copy = self.create_inst(
                    InstKind::MemCpy {
                        dst,
                        src,
                        size: result.ty.size(),
                        align: result.ty.align(),
                    },
                    LirType::Void,
                    None,
                );
                self.func.append_inst(block, copy);
                Ok(None)
            }
            ParamDisposition::Direct { .. } => {
                let Some(value) = value else {
                    return Err(self.err(span, LowerErrorKind::ReturnArity { expected: 1, found: 0 }));
                };
                let abi_ty = result.abi_struct_type();
                if !abi_ty.is_aggregate() && !result.ty.is_aggregate() {
                    return Ok(Some(value));
                }
                let cast = self.cast_inst(value, abi_ty.ptr_to());
                self.func.append_inst(block, cast);
                let name = self.fresh_name("ld");
                let load = self.create_inst(
                    InstKind::Load { ptr: Value::Inst(cast) },
                    abi_ty,
                    Some(name),
                );
                self.func.append_inst(block, load);
                Ok(Some(Value::Inst(load)))
            }
        }
    }

    /// Function-wide slot holding a return value while finally blocks run.
    pub(crate) fn return_slot(&mut self) -> Value {
        if let Some(slot) = &self.retval_slot {
            return slot.clone();
        }
        let ty = self.sig.result.clone();
        let slot = self.create_temporary(&ty, "retval");
        self.retval_slot = Some(slot.clone());
        slot
    }

    // ── labels ─────────────────────────────────────────────────

    pub fn new_label(&mut self, span: Span) -> LabelId {
        self.labels.new_label(span)
    }

    pub fn label(&self, label: LabelId) -> Option<&Label> {
        self.labels.get(label)
    }

    /// The block a label starts, created detached on first reference.
    pub fn label_block(&mut self, label: LabelId, span: Span) -> Result<BlockId, LowerError> {
        let existing = match self.labels.get(label) {
            Some(l) => l.block,
            None => return Err(self.err(span, LowerErrorKind::UnknownLabel(label))),
        };
        if let Some(block) = existing {
            return Ok(block);
        }
        let name = self.fresh_name("label");
        let block = self.func.create_detached_block(name);
        if let Some(l) = self.labels.get_mut(label) {
            l.block = Some(block);
        }
        Ok(block)
    }

    /// Bind a label to its block, lay the block out and patch any pending
    /// address placeholders. A label can be defined only once.
    pub fn define_label(&mut self, label: LabelId, span: Span) -> Result<BlockId, LowerError> {
        let block = self.label_block(label, span)?;
        let Some(l) = self.labels.get_mut(label) else {
            return Err(self.err(span, LowerErrorKind::UnknownLabel(label)));
        };
        if l.defined {
            return Err(self.err(span, LowerErrorKind::LabelRedefined(label)));
        }
        l.defined = true;
        self.func.attach_block(block);
        self.materialize_label(label, block);
        Ok(block)
    }

    fn materialize_label(&mut self, label: LabelId, block: BlockId) {
        if self.labels.get(label).is_some_and(|l| l.address_taken) {
            self.func.block_mut(block).address_taken = true;
        }
        let Some((placeholder, uses)) = self.labels.take_placeholder(label) else {
            return;
        };
        log::trace!(
            "label {:?} -> {}: patching {} uses",
            label,
            self.func.block(block).name,
            uses.len()
        );
        for inst in uses {
            for op in self.func.inst_mut(inst).kind.operands_mut() {
                if *op == Value::Placeholder(placeholder) {
                    *op = Value::BlockAddress(block);
                }
            }
        }
    }

    /// Address of a label's block, or a placeholder if it is not defined yet.
    pub fn address_of_label(&mut self, label: LabelId, span: Span) -> Result<Value, LowerError> {
        let Some(l) = self.labels.get_mut(label) else {
            return Err(self.err(span, LowerErrorKind::UnknownLabel(label)));
        };
        l.address_taken = true;
        match (l.defined, l.block) {
            (true, Some(block)) => {
                self.func.block_mut(block).address_taken = true;
                Ok(Value::BlockAddress(block))
            }
            _ => Ok(Value::Placeholder(self.labels.placeholder_for(label))),
        }
    }

    pub fn pending_placeholders(&self) -> usize {
        self.labels.pending_placeholders()
    }

    pub(crate) fn record_indirect_branch(&mut self, inst: InstId) {
        self.labels.record_indirect_branch(inst);
    }

    // ── lookup ─────────────────────────────────────────────────

    pub fn parameter_vars(&self) -> &[VarId] {
        &self.param_vars
    }

    pub fn nth_param_var(&self, index: usize) -> Option<&Variable> {
        let id = self.param_vars.get(index)?;
        self.vars.get(id.0 as usize)
    }

    pub fn local_vars(&self) -> &[VarId] {
        &self.local_vars
    }

    pub fn closure_env_var(&self) -> Option<VarId> {
        self.chain_var
    }

    pub fn var_for_value(&self, value: &Value) -> Option<VarId> {
        self.value_vars.get(value).copied()
    }

    pub fn variable(&self, id: VarId) -> Option<&Variable> {
        self.vars.get(id.0 as usize)
    }

    pub(crate) fn variable_mut(&mut self, id: VarId) -> Option<&mut Variable> {
        self.vars.get_mut(id.0 as usize)
    }

    // ── finish ─────────────────────────────────────────────────

    /// Close out the function and hand over the finished LIR.
    pub fn finish(mut self) -> Result<LirFunction, LowerError> {
        self.generate_prolog()?;

        let fallback = if self.abi.result.is_ignore() {
            InstKind::Ret { value: None }
        } else {
            InstKind::Unreachable
        };
        for block in self.func.layout().to_vec() {
            if !self.func.is_terminated(block) {
                let term = self.func.create_inst(fallback.clone(), LirType::Void, None);
                self.func.append_inst(block, term);
            }
        }

        let undefined: Vec<(LabelId, Span, Option<BlockId>)> = self
            .labels
            .iter()
            .filter(|l| !l.defined && (l.block.is_some() || l.address_taken))
            .map(|l| (l.id, l.span, l.block))
            .collect();
        for (label, span, block) in undefined {
            if !self.error_seen {
                return Err(self.err(span, LowerErrorKind::UndefinedLabel(label)));
            }
            // After an upstream error the label resolves to a trap block so
            // its gotos and address uses stay well formed.
            let block = match block {
                Some(block) => block,
                None => self.label_block(label, span)?,
            };
            self.func.attach_block(block);
            let term = self.func.create_inst(InstKind::Unreachable, LirType::Void, None);
            self.func.append_inst(block, term);
            self.materialize_label(label, block);
        }
        let pending = self.labels.pending_placeholders();
        if pending > 0 {
            return Err(self.err(
                Span::default(),
                LowerErrorKind::DanglingLabelAddress { count: pending },
            ));
        }

        let targets: Vec<BlockId> =
            self.func.blocks().filter(|b| b.address_taken).map(|b| b.id).collect();
        for inst in self.labels.indirect_branches().to_vec() {
            if let InstKind::IndirectBr { dests, .. } = &mut self.func.inst_mut(inst).kind {
                *dests = targets.clone();
            }
        }

        self.fixup_prolog();

        if self.unit.options.prune_unreachable {
            let removed = self.func.prune_unreachable();
            log::trace!("pruned {} unreachable blocks from `{}`", removed, self.func.name);
        }
        let has_pad = self.func.blocks().any(|b| {
            b.insts
                .iter()
                .any(|i| matches!(self.func.inst(*i).kind, InstKind::LandingPad { .. }))
        });
        if has_pad {
            self.func.personality = Some(self.unit.options.personality.clone());
        }

        let name = self.func.name.clone();
        self.func.verify().map_err(|e| LowerError {
            function: name,
            span: Span::default(),
            kind: e.into(),
        })?;
        log::debug!(
            "finished `{}`: {} blocks",
            self.func.name,
            self.func.layout().len()
        );
        Ok(self.func)
    }
}
