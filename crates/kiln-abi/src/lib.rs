// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Calling-convention classification.
//!
//! `classify` maps a signature to the physical argument list a function
//! receives and decides, for the result and every parameter, whether the
//! value is ignored, travels in one or two registers, or travels behind a
//! hidden pointer. It is a pure function of the signature and target.
//!
//! Physical argument order is fixed: the struct-return pointer (only when
//! the result is indirect), then the closure environment, then parameters.

use kiln_lir::LirType;
use kiln_types::{RegClass, Type};

/// Target parameters the classifier depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetConfig {
    /// Bytes per register chunk.
    pub word_size: u64,
    /// Most chunks a direct value may occupy.
    pub max_chunks: usize,
    /// Integer argument registers.
    pub int_regs: u32,
    /// Vector/float argument registers.
    pub sse_regs: u32,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            word_size: 8,
            max_chunks: 2,
            int_regs: 6,
            sse_regs: 8,
        }
    }
}

/// Function signature as seen by the classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub params: Vec<Type>,
    /// Result type; a tuple for multi-value returns.
    pub result: Type,
    /// When false, values pass in their natural LIR shape without splitting.
    pub follows_c_abi: bool,
}

impl Signature {
    pub fn new(params: Vec<Type>, result: Type) -> Self {
        Self { params, result, follows_c_abi: true }
    }

    /// Signature exempt from C ABI classification.
    pub fn internal(params: Vec<Type>, result: Type) -> Self {
        Self { params, result, follows_c_abi: false }
    }

    /// Build the result type of a multi-value return.
    pub fn with_results(params: Vec<Type>, results: Vec<Type>) -> Self {
        let result = match results.len() {
            0 => Type::Void,
            1 => results.into_iter().next().unwrap_or(Type::Void),
            _ => Type::Tuple(results),
        };
        Self::new(params, result)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Extension {
    None,
    Sign,
    Zero,
}

/// How one value crosses the call boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamDisposition {
    /// Zero-sized; occupies no physical argument.
    Ignore,
    /// One or two register chunks.
    Direct { chunks: Vec<LirType>, ext: Extension },
    /// Behind a pointer to caller-owned memory.
    Indirect,
}

/// Disposition plus where the value lands in the physical argument list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamInfo {
    pub disposition: ParamDisposition,
    pub ty: Type,
    /// Index of the first physical argument this value occupies.
    pub sig_offset: u32,
}

impl ParamInfo {
    pub fn is_ignore(&self) -> bool {
        matches!(self.disposition, ParamDisposition::Ignore)
    }

    pub fn is_indirect(&self) -> bool {
        matches!(self.disposition, ParamDisposition::Indirect)
    }

    pub fn is_direct(&self) -> bool {
        matches!(self.disposition, ParamDisposition::Direct { .. })
    }

    pub fn extension(&self) -> Extension {
        match &self.disposition {
            ParamDisposition::Direct { ext, .. } => *ext,
            _ => Extension::None,
        }
    }

    pub fn num_arg_slots(&self) -> u32 {
        match &self.disposition {
            ParamDisposition::Ignore => 0,
            ParamDisposition::Direct { chunks, .. } => chunks.len() as u32,
            ParamDisposition::Indirect => 1,
        }
    }

    /// Physical argument types this value occupies.
    pub fn abi_types(&self) -> Vec<LirType> {
        match &self.disposition {
            ParamDisposition::Ignore => Vec::new(),
            ParamDisposition::Direct { chunks, .. } => chunks.clone(),
            ParamDisposition::Indirect => vec![self.ty.to_lir().ptr_to()],
        }
    }

    /// Registerized shape: the lone chunk, or a struct of the chunks.
    /// `Void` for ignored or indirect values.
    pub fn abi_struct_type(&self) -> LirType {
        match &self.disposition {
            ParamDisposition::Direct { chunks, .. } if chunks.len() == 1 => chunks[0].clone(),
            ParamDisposition::Direct { chunks, .. } => LirType::Struct(chunks.clone()),
            _ => LirType::Void,
        }
    }
}

/// Classified signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionAbi {
    pub params: Vec<ParamInfo>,
    pub result: ParamInfo,
    /// Closure environment; always one `i8*` chunk.
    pub chain: ParamInfo,
    /// Full physical argument list.
    pub arg_types: Vec<LirType>,
    /// Physical return type.
    pub ret_ty: LirType,
}

impl FunctionAbi {
    /// Physical index of the struct-return pointer, if any.
    pub fn sret_index(&self) -> Option<u32> {
        self.result.is_indirect().then_some(0)
    }

    pub fn chain_index(&self) -> u32 {
        self.chain.sig_offset
    }
}

/// Register budget left while walking one signature.
struct RegBudget {
    int: u32,
    sse: u32,
}

impl RegBudget {
    fn take(&mut self, int: u32, sse: u32) {
        self.int = self.int.saturating_sub(int);
        self.sse = self.sse.saturating_sub(sse);
    }
}

pub fn classify(sig: &Signature, target: &TargetConfig) -> FunctionAbi {
    let mut budget = RegBudget { int: target.int_regs, sse: target.sse_regs };
    let mut arg_types = Vec::new();

    let result_disp = classify_result(sig, target);
    let mut offset = 0u32;
    if result_disp == ParamDisposition::Indirect {
        arg_types.push(sig.result.to_lir().ptr_to());
        budget.take(1, 0);
        offset += 1;
    }
    let result = ParamInfo {
        disposition: result_disp,
        ty: sig.result.clone(),
        sig_offset: 0,
    };
    let ret_ty = match &result.disposition {
        ParamDisposition::Direct { .. } => result.abi_struct_type(),
        _ => LirType::Void,
    };

    let chain = ParamInfo {
        disposition: ParamDisposition::Direct {
            chunks: vec![LirType::byte_ptr()],
            ext: Extension::None,
        },
        ty: Type::Void.ptr_to(),
        sig_offset: offset,
    };
    arg_types.extend(chain.abi_types());
    offset += 1;

    let mut params = Vec::with_capacity(sig.params.len());
    for ty in &sig.params {
        let disposition = classify_param(ty, sig.follows_c_abi, target, &mut budget);
        let info = ParamInfo { disposition, ty: ty.clone(), sig_offset: offset };
        offset += info.num_arg_slots();
        arg_types.extend(info.abi_types());
        params.push(info);
    }

    FunctionAbi { params, result, chain, arg_types, ret_ty }
}

fn classify_result(sig: &Signature, target: &TargetConfig) -> ParamDisposition {
    let ty = &sig.result;
    if ty.is_zero_sized() {
        return ParamDisposition::Ignore;
    }
    if !sig.follows_c_abi {
        return natural(ty);
    }
    if exceeds_registers(ty, target) {
        return ParamDisposition::Indirect;
    }
    let shape = ty.registerized_shape(target.word_size);
    ParamDisposition::Direct {
        chunks: shape.into_iter().map(|c| c.ty).collect(),
        ext: extension_for(ty),
    }
}

fn classify_param(
    ty: &Type,
    follows_c_abi: bool,
    target: &TargetConfig,
    budget: &mut RegBudget,
) -> ParamDisposition {
    if ty.is_zero_sized() {
        return ParamDisposition::Ignore;
    }
    if !follows_c_abi {
        return natural(ty);
    }
    if exceeds_registers(ty, target) {
        budget.take(1, 0);
        return ParamDisposition::Indirect;
    }
    let shape = ty.registerized_shape(target.word_size);
    let int_needed = shape.iter().filter(|c| c.class == RegClass::Integer).count() as u32;
    let sse_needed = shape.len() as u32 - int_needed;

    let out_of_regs =
        ty.is_aggregate() && (int_needed > budget.int || sse_needed > budget.sse);
    if out_of_regs {
        budget.take(1, 0);
        return ParamDisposition::Indirect;
    }

    budget.take(int_needed, sse_needed);
    ParamDisposition::Direct {
        chunks: shape.into_iter().map(|c| c.ty).collect(),
        ext: extension_for(ty),
    }
}

/// More bytes than `max_chunks` words can carry.
fn exceeds_registers(ty: &Type, target: &TargetConfig) -> bool {
    ty.size() > target.max_chunks as u64 * target.word_size
}

/// Direct in the value's own LIR shape.
fn natural(ty: &Type) -> ParamDisposition {
    ParamDisposition::Direct {
        chunks: vec![ty.to_lir()],
        ext: extension_for(ty),
    }
}

/// Sub-word integers are widened by the caller.
fn extension_for(ty: &Type) -> Extension {
    if !ty.is_integer() || ty.size() >= 4 {
        Extension::None
    } else if ty.is_signed() {
        Extension::Sign
    } else {
        Extension::Zero
    }
}
