// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Small LIR interpreter for checking what lowered code does.
//!
//! Values are little-endian byte strings of their type's size. Pointers
//! encode `(allocation + 1) << 32 | offset`; block addresses set the top bit.
//! External calls are answered by a scripted [`World`] that also records a
//! trace of every call.

use std::collections::HashMap;

use kiln_lir::{
    BinOp, BlockId, CastOp, CmpPred, Constant, InstId, InstKind, LirFunction, LirType, Value,
};

const BLOCK_TAG: u64 = 1 << 63;
const STEP_LIMIT: usize = 100_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Returned(Option<Vec<u8>>),
    /// Unwound out of the function with this exception id.
    Raised(u64),
    Trap(String),
}

impl Outcome {
    pub fn int(&self) -> i64 {
        match self {
            Outcome::Returned(Some(bytes)) => int_of(bytes) as i64,
            other => panic!("expected an integer return, got {:?}", other),
        }
    }
}

/// Scripted external functions.
#[derive(Debug, Default)]
pub struct World {
    /// Calls so far, as `name(arg, ...)` with integer arguments.
    pub trace: Vec<String>,
    /// Remaining number of times each function raises when called.
    raises: HashMap<String, u32>,
    returns: HashMap<String, i64>,
    /// Exception objects handed out so far.
    next_exception: u64,
}

impl World {
    pub fn new() -> Self {
        Self { next_exception: 100, ..Self::default() }
    }

    pub fn raising(mut self, name: &str) -> Self {
        self.raises.insert(name.to_string(), u32::MAX);
        self
    }

    pub fn raising_once(mut self, name: &str) -> Self {
        self.raises.insert(name.to_string(), 1);
        self
    }

    pub fn returning(mut self, name: &str, value: i64) -> Self {
        self.returns.insert(name.to_string(), value);
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.trace.iter().map(|t| t.split('(').next().unwrap_or("")).collect()
    }

    fn call(&mut self, name: &str, args: &[Vec<u8>], ret: &LirType) -> Result<Vec<u8>, u64> {
        let rendered: Vec<String> = args.iter().map(|a| (int_of(a) as i64).to_string()).collect();
        self.trace.push(format!("{}({})", name, rendered.join(",")));
        if name == "__kiln_rethrow" {
            return Err(int_of(&args[0]));
        }
        if let Some(left) = self.raises.get_mut(name) {
            if *left > 0 {
                *left -= 1;
                self.next_exception += 1;
                return Err(self.next_exception);
            }
        }
        let value = self.returns.get(name).copied().unwrap_or(0);
        Ok(to_bytes(value as u64, ret.size()))
    }
}

pub struct Interp<'a> {
    func: &'a LirFunction,
    allocs: Vec<Vec<u8>>,
    values: HashMap<InstId, Vec<u8>>,
    in_flight: Option<u64>,
}

impl<'a> Interp<'a> {
    pub fn new(func: &'a LirFunction) -> Self {
        Self { func, allocs: Vec::new(), values: HashMap::new(), in_flight: None }
    }

    /// Caller-side memory, e.g. for a struct-return slot.
    pub fn alloc(&mut self, size: u64) -> u64 {
        self.allocs.push(vec![0; size.max(1) as usize]);
        (self.allocs.len() as u64) << 32
    }

    pub fn read(&self, ptr: u64, size: u64) -> Vec<u8> {
        let (alloc, offset) = split(ptr);
        self.allocs[alloc][offset..offset + size as usize].to_vec()
    }

    pub fn write(&mut self, ptr: u64, bytes: &[u8]) {
        let (alloc, offset) = split(ptr);
        self.allocs[alloc][offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn run(&mut self, args: &[Vec<u8>], world: &mut World) -> Outcome {
        let Some(mut block) = self.func.entry() else {
            return Outcome::Trap("no entry block".into());
        };
        let mut steps = 0;
        loop {
            let mut next: Option<BlockId> = None;
            for inst in self.func.block(block).insts.clone() {
                steps += 1;
                if steps > STEP_LIMIT {
                    return Outcome::Trap("step limit".into());
                }
                match self.step(inst, args, world) {
                    Step::Next => {}
                    Step::Jump(b) => {
                        next = Some(b);
                        break;
                    }
                    Step::Done(outcome) => return outcome,
                }
            }
            match next {
                Some(b) => block = b,
                None => {
                    let name = &self.func.block(block).name;
                    return Outcome::Trap(format!("fell off block {}", name));
                }
            }
        }
    }

    fn eval(&self, value: &Value, args: &[Vec<u8>]) -> Vec<u8> {
        match value {
            Value::Arg(i) => args[*i as usize].clone(),
            Value::Inst(id) => self.values[id].clone(),
            Value::Const(c) => match c {
                Constant::Int { ty, value } => to_bytes(*value as u64, ty.size()),
                Constant::Float { ty, bits } => match ty {
                    LirType::F32 => (f64::from_bits(*bits) as f32).to_le_bytes().to_vec(),
                    _ => bits.to_le_bytes().to_vec(),
                },
                Constant::Null(ty) | Constant::Zero(ty) | Constant::Undef(ty) => {
                    vec![0; ty.size() as usize]
                }
            },
            Value::BlockAddress(b) => to_bytes(BLOCK_TAG | b.0 as u64, 8),
            Value::Placeholder(p) => panic!("unresolved placeholder {:?}", p),
        }
    }

    fn step(&mut self, id: InstId, args: &[Vec<u8>], world: &mut World) -> Step {
        let func = self.func;
        let data = func.inst(id);
        let ty = data.ty.clone();
        let result = match &data.kind {
            InstKind::Alloca { ty } => to_bytes(self.alloc(ty.size()), 8),
            InstKind::Load { ptr } => {
                let p = int_of(&self.eval(ptr, args));
                self.read(p, ty.size())
            }
            InstKind::Store { value, ptr } => {
                let v = self.eval(value, args);
                let p = int_of(&self.eval(ptr, args));
                self.write(p, &v);
                return Step::Next;
            }
            InstKind::Cast { op, value, to } => {
                let v = self.eval(value, args);
                let from_bits = self.func.value_type(value).size() * 8;
                match op {
                    CastOp::BitCast => v,
                    CastOp::ZExt => to_bytes(int_of(&v), to.size()),
                    CastOp::SExt => to_bytes(sext(int_of(&v), from_bits) as u64, to.size()),
                    CastOp::Trunc if *to == LirType::I1 => vec![(int_of(&v) & 1) as u8],
                    CastOp::Trunc => v[..to.size() as usize].to_vec(),
                }
            }
            InstKind::FieldAddr { base, index } => {
                let p = int_of(&self.eval(base, args));
                let base_ty = self.func.value_type(base);
                let offset = base_ty
                    .pointee()
                    .and_then(|t| t.field_offset(*index))
                    .unwrap_or_else(|| panic!("bad field address in {}", func.name));
                to_bytes(p + offset, 8)
            }
            InstKind::MemCpy { dst, src, size, .. } => {
                let d = int_of(&self.eval(dst, args));
                let s = int_of(&self.eval(src, args));
                let bytes = self.read(s, *size);
                self.write(d, &bytes);
                return Step::Next;
            }
            InstKind::Binary { op, lhs, rhs } => {
                let operand_ty = self.func.value_type(lhs);
                let l = self.eval(lhs, args);
                let r = self.eval(rhs, args);
                binary(*op, &operand_ty, &l, &r)
            }
            InstKind::Cmp { pred, lhs, rhs } => {
                let operand_ty = self.func.value_type(lhs);
                let l = self.eval(lhs, args);
                let r = self.eval(rhs, args);
                vec![compare(*pred, &operand_ty, &l, &r) as u8]
            }
            InstKind::Call { callee, args: call_args } => {
                let values: Vec<Vec<u8>> = call_args.iter().map(|a| self.eval(a, args)).collect();
                match world.call(callee, &values, &ty) {
                    Ok(v) => v,
                    Err(exn) => return Step::Done(Outcome::Raised(exn)),
                }
            }
            InstKind::LandingPad { .. } => {
                let Some(exn) = self.in_flight.take() else {
                    return Step::Done(Outcome::Trap("landing pad without exception".into()));
                };
                let mut token = to_bytes(exn, 8);
                token.extend(to_bytes(1, 8));
                token
            }
            InstKind::Br { target } => return Step::Jump(*target),
            InstKind::CondBr { cond, then_block, else_block } => {
                let c = int_of(&self.eval(cond, args)) & 1;
                return Step::Jump(if c == 1 { *then_block } else { *else_block });
            }
            InstKind::Switch { value, default, cases } => {
                let bits = self.func.value_type(value).size() * 8;
                let v = sext(int_of(&self.eval(value, args)), bits);
                let target = cases.iter().find(|(c, _)| *c == v).map(|(_, b)| *b);
                return Step::Jump(target.unwrap_or(*default));
            }
            InstKind::IndirectBr { addr, dests } => {
                let a = int_of(&self.eval(addr, args));
                if a & BLOCK_TAG == 0 {
                    return Step::Done(Outcome::Trap("indirect branch to non-block".into()));
                }
                let target = BlockId((a & !BLOCK_TAG) as u32);
                if !dests.contains(&target) {
                    return Step::Done(Outcome::Trap("indirect branch to unlisted block".into()));
                }
                return Step::Jump(target);
            }
            InstKind::Invoke { callee, args: call_args, normal, unwind } => {
                let values: Vec<Vec<u8>> = call_args.iter().map(|a| self.eval(a, args)).collect();
                match world.call(callee, &values, &ty) {
                    Ok(v) => {
                        self.values.insert(id, v);
                        return Step::Jump(*normal);
                    }
                    Err(exn) => {
                        self.in_flight = Some(exn);
                        return Step::Jump(*unwind);
                    }
                }
            }
            InstKind::Ret { value } => {
                let v = value.as_ref().map(|v| self.eval(v, args));
                return Step::Done(Outcome::Returned(v));
            }
            InstKind::Resume { value } => {
                let token = self.eval(value, args);
                return Step::Done(Outcome::Raised(int_of(&token[..8])));
            }
            InstKind::Unreachable => {
                return Step::Done(Outcome::Trap("reached unreachable".into()));
            }
        };
        self.values.insert(id, result);
        Step::Next
    }
}

enum Step {
    Next,
    Jump(BlockId),
    Done(Outcome),
}

fn split(ptr: u64) -> (usize, usize) {
    let alloc = (ptr >> 32) as usize;
    assert!(alloc > 0, "null or invalid pointer {:#x}", ptr);
    (alloc - 1, (ptr & 0xffff_ffff) as usize)
}

pub fn int_of(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    let n = bytes.len().min(8);
    buf[..n].copy_from_slice(&bytes[..n]);
    u64::from_le_bytes(buf)
}

pub fn to_bytes(value: u64, size: u64) -> Vec<u8> {
    let mut out = value.to_le_bytes().to_vec();
    out.resize(size as usize, 0);
    out
}

fn sext(value: u64, bits: u64) -> i64 {
    if bits == 0 || bits >= 64 {
        return value as i64;
    }
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}

fn float_of(ty: &LirType, bytes: &[u8]) -> f64 {
    match ty {
        LirType::F32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64,
        _ => f64::from_bits(int_of(bytes)),
    }
}

fn float_bytes(ty: &LirType, v: f64) -> Vec<u8> {
    match ty {
        LirType::F32 => (v as f32).to_le_bytes().to_vec(),
        _ => v.to_bits().to_le_bytes().to_vec(),
    }
}

fn binary(op: BinOp, ty: &LirType, l: &[u8], r: &[u8]) -> Vec<u8> {
    let size = ty.size();
    let bits = size * 8;
    if ty.is_float() {
        let (a, b) = (float_of(ty, l), float_of(ty, r));
        let v = match op {
            BinOp::FAdd => a + b,
            BinOp::FSub => a - b,
            BinOp::FMul => a * b,
            BinOp::FDiv => a / b,
            _ => panic!("integer op {:?} on float", op),
        };
        return float_bytes(ty, v);
    }
    let (a, b) = (int_of(l), int_of(r));
    let (sa, sb) = (sext(a, bits), sext(b, bits));
    let v = match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::SDiv => sa.wrapping_div(sb) as u64,
        BinOp::UDiv => a / b,
        BinOp::SRem => sa.wrapping_rem(sb) as u64,
        BinOp::URem => a % b,
        BinOp::And => a & b,
        BinOp::Or => a | b,
        BinOp::Xor => a ^ b,
        _ => panic!("float op {:?} on integer", op),
    };
    to_bytes(v, size)
}

fn compare(pred: CmpPred, ty: &LirType, l: &[u8], r: &[u8]) -> bool {
    if pred.is_float() {
        let (a, b) = (float_of(ty, l), float_of(ty, r));
        return match pred {
            CmpPred::Oeq => a == b,
            CmpPred::One => a != b,
            CmpPred::Olt => a < b,
            CmpPred::Ole => a <= b,
            CmpPred::Ogt => a > b,
            _ => a >= b,
        };
    }
    let bits = ty.size() * 8;
    let (a, b) = (int_of(l), int_of(r));
    let (sa, sb) = (sext(a, bits), sext(b, bits));
    match pred {
        CmpPred::Eq => a == b,
        CmpPred::Ne => a != b,
        CmpPred::Slt => sa < sb,
        CmpPred::Sle => sa <= sb,
        CmpPred::Sgt => sa > sb,
        CmpPred::Sge => sa >= sb,
        CmpPred::Ult => a < b,
        CmpPred::Ule => a <= b,
        CmpPred::Ugt => a > b,
        _ => a >= b,
    }
}
