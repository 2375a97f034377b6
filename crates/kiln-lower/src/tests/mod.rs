// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Lowering tests. Most build a small body with the AST helpers, lower it and
//! then either inspect the printed LIR or execute it with [`interp`].

mod exception;
mod interp;

use kiln_abi::{Signature, TargetConfig};
use kiln_ast::{Span, Stmt, VarId};
use kiln_lir::{ArgAttr, LirFunction};
use kiln_types::Type;

use self::interp::{to_bytes, Interp, Outcome, World};
use crate::{lower_function, FunctionBuilder, LowerError, LowerOptions, UnitContext};

/// Lower a function `f` whose parameters and locals `setup` registers before
/// returning the body.
fn lower_with(
    options: LowerOptions,
    sig: Signature,
    setup: impl FnOnce(&mut FunctionBuilder<'_>) -> Stmt,
) -> Result<LirFunction, LowerError> {
    let mut unit = UnitContext::new(TargetConfig::default(), options);
    let mut fb = FunctionBuilder::new(&mut unit, "f", sig);
    let body = setup(&mut fb);
    lower_function(fb, &body)
}

fn lower(sig: Signature, setup: impl FnOnce(&mut FunctionBuilder<'_>) -> Stmt) -> LirFunction {
    match lower_with(LowerOptions::default(), sig, setup) {
        Ok(func) => func,
        Err(e) => panic!("lowering failed: {}", e),
    }
}

fn lower_err(sig: Signature, setup: impl FnOnce(&mut FunctionBuilder<'_>) -> Stmt) -> LowerError {
    match lower_with(LowerOptions::default(), sig, setup) {
        Ok(func) => panic!("expected an error, got:\n{}", func),
        Err(e) => e,
    }
}

fn param(fb: &mut FunctionBuilder<'_>, name: &str, ty: Type) -> VarId {
    fb.register_parameter(name, ty, false, Span::default()).unwrap()
}

fn local(fb: &mut FunctionBuilder<'_>, name: &str, ty: Type) -> VarId {
    fb.register_local(name, ty, None, false, Span::default()).unwrap()
}

fn int(v: i64) -> Vec<u8> {
    to_bytes(v as u64, 8)
}

fn int32(v: i32) -> Vec<u8> {
    to_bytes(v as u32 as u64, 4)
}

/// Result of running a lowered function once.
struct Run {
    outcome: Outcome,
    /// Contents of the struct-return slot, for functions that have one.
    sret: Option<Vec<u8>>,
    world: World,
}

/// Run `func` with a null closure environment and the given parameter
/// arguments, allocating the struct-return slot if there is one.
fn run_with(func: &LirFunction, params: &[Vec<u8>], mut world: World) -> Run {
    let mut interp = Interp::new(func);
    let mut args = Vec::new();
    let sret = match func.args.first() {
        Some(arg) if arg.attrs.contains(&ArgAttr::Sret) => {
            let size = arg.ty.pointee().map(|t| t.size()).unwrap_or(0);
            let ptr = interp.alloc(size);
            args.push(to_bytes(ptr, 8));
            Some((ptr, size))
        }
        _ => None,
    };
    args.push(to_bytes(0, 8));
    args.extend(params.iter().cloned());
    let outcome = interp.run(&args, &mut world);
    let sret = sret.map(|(ptr, size)| interp.read(ptr, size));
    Run { outcome, sret, world }
}

fn run(func: &LirFunction, params: &[Vec<u8>]) -> Outcome {
    run_with(func, params, World::new()).outcome
}

fn block_names(func: &LirFunction) -> Vec<String> {
    func.blocks().map(|b| b.name.clone()).collect()
}

fn has_block(func: &LirFunction, prefix: &str) -> bool {
    func.blocks().any(|b| b.name.starts_with(prefix))
}
