// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Textual form of LIR, close to LLVM assembly so dumps read familiarly.

use std::fmt;

use crate::*;

impl fmt::Display for LirType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LirType::Void => write!(f, "void"),
            LirType::Int(bits) => write!(f, "i{}", bits),
            LirType::F32 => write!(f, "float"),
            LirType::F64 => write!(f, "double"),
            LirType::Ptr(inner) => write!(f, "{}*", inner),
            LirType::Struct(fields) => {
                if fields.is_empty() {
                    return write!(f, "{{}}");
                }
                write!(f, "{{ ")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", field)?;
                }
                write!(f, " }}")
            }
            LirType::Array { elem, len } => write!(f, "[{} x {}]", len, elem),
            LirType::Vector { elem, lanes } => write!(f, "<{} x {}>", lanes, elem),
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int { value, .. } => write!(f, "{}", value),
            Constant::Float { bits, .. } => write!(f, "{:?}", f64::from_bits(*bits)),
            Constant::Null(_) => write!(f, "null"),
            Constant::Zero(_) => write!(f, "zeroinitializer"),
            Constant::Undef(_) => write!(f, "undef"),
        }
    }
}

impl fmt::Display for ArgAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArgAttr::Sret => "sret",
            ArgAttr::Nest => "nest",
            ArgAttr::ByVal => "byval",
            ArgAttr::SignExt => "signext",
            ArgAttr::ZeroExt => "zeroext",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::SDiv => "sdiv",
            BinOp::UDiv => "udiv",
            BinOp::SRem => "srem",
            BinOp::URem => "urem",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::FAdd => "fadd",
            BinOp::FSub => "fsub",
            BinOp::FMul => "fmul",
            BinOp::FDiv => "fdiv",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for CmpPred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CmpPred::Eq => "icmp eq",
            CmpPred::Ne => "icmp ne",
            CmpPred::Slt => "icmp slt",
            CmpPred::Sle => "icmp sle",
            CmpPred::Sgt => "icmp sgt",
            CmpPred::Sge => "icmp sge",
            CmpPred::Ult => "icmp ult",
            CmpPred::Ule => "icmp ule",
            CmpPred::Ugt => "icmp ugt",
            CmpPred::Uge => "icmp uge",
            CmpPred::Oeq => "fcmp oeq",
            CmpPred::One => "fcmp one",
            CmpPred::Olt => "fcmp olt",
            CmpPred::Ole => "fcmp ole",
            CmpPred::Ogt => "fcmp ogt",
            CmpPred::Oge => "fcmp oge",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for CastOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CastOp::BitCast => "bitcast",
            CastOp::ZExt => "zext",
            CastOp::SExt => "sext",
            CastOp::Trunc => "trunc",
        };
        write!(f, "{}", s)
    }
}

impl LirFunction {
    /// Operand as it appears in text, without its type.
    pub fn value_name(&self, value: &Value) -> String {
        match value {
            Value::Arg(i) => match &self.args[*i as usize].name {
                Some(name) => format!("%{}", name),
                None => format!("%arg{}", i),
            },
            Value::Inst(id) => match &self.inst(*id).name {
                Some(name) => format!("%{}", name),
                None => format!("%t{}", id.0),
            },
            Value::Const(c) => c.to_string(),
            Value::BlockAddress(b) => {
                format!("blockaddress(@{}, %{})", self.name, self.block(*b).name)
            }
            Value::Placeholder(p) => format!("placeholder#{}", p.0),
        }
    }

    fn typed(&self, value: &Value) -> String {
        format!("{} {}", self.value_type(value), self.value_name(value))
    }

    fn label(&self, block: BlockId) -> String {
        format!("label %{}", self.block(block).name)
    }

    fn call_args(&self, args: &[Value]) -> String {
        args.iter().map(|a| self.typed(a)).collect::<Vec<_>>().join(", ")
    }

    /// One instruction in text form.
    pub fn display_inst(&self, id: InstId) -> String {
        let data = self.inst(id);
        let body = match &data.kind {
            InstKind::Alloca { ty } => format!("alloca {}", ty),
            InstKind::Load { ptr } => format!("load {}, {}", data.ty, self.typed(ptr)),
            InstKind::Store { value, ptr } => {
                format!("store {}, {}", self.typed(value), self.typed(ptr))
            }
            InstKind::Cast { op, value, to } => {
                format!("{} {} to {}", op, self.typed(value), to)
            }
            InstKind::FieldAddr { base, index } => {
                let base_ty = self.value_type(base);
                let pointee = base_ty.pointee().cloned().unwrap_or(LirType::Void);
                format!(
                    "getelementptr inbounds {}, {}, i32 0, i32 {}",
                    pointee,
                    self.typed(base),
                    index
                )
            }
            InstKind::MemCpy { dst, src, size, align } => format!(
                "memcpy {}, {}, i64 {}, align {}",
                self.typed(dst),
                self.typed(src),
                size,
                align
            ),
            InstKind::Binary { op, lhs, rhs } => format!(
                "{} {} {}, {}",
                op,
                self.value_type(lhs),
                self.value_name(lhs),
                self.value_name(rhs)
            ),
            InstKind::Cmp { pred, lhs, rhs } => format!(
                "{} {} {}, {}",
                pred,
                self.value_type(lhs),
                self.value_name(lhs),
                self.value_name(rhs)
            ),
            InstKind::Call { callee, args } => {
                format!("call {} @{}({})", data.ty, callee, self.call_args(args))
            }
            InstKind::LandingPad { kind } => match kind {
                PadKind::CatchAll => format!("landingpad {} catch i8* null", data.ty),
                PadKind::Cleanup => format!("landingpad {} cleanup", data.ty),
            },
            InstKind::Br { target } => format!("br {}", self.label(*target)),
            InstKind::CondBr { cond, then_block, else_block } => format!(
                "br {}, {}, {}",
                self.typed(cond),
                self.label(*then_block),
                self.label(*else_block)
            ),
            InstKind::Switch { value, default, cases } => {
                let ty = self.value_type(value);
                let arms = cases
                    .iter()
                    .map(|(v, b)| format!("{} {}, {}", ty, v, self.label(*b)))
                    .collect::<Vec<_>>()
                    .join(" ");
                format!(
                    "switch {}, {} [ {} ]",
                    self.typed(value),
                    self.label(*default),
                    arms
                )
            }
            InstKind::IndirectBr { addr, dests } => {
                let dests = dests
                    .iter()
                    .map(|b| self.label(*b))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("indirectbr {}, [{}]", self.typed(addr), dests)
            }
            InstKind::Invoke { callee, args, normal, unwind } => format!(
                "invoke {} @{}({}) to {} unwind {}",
                data.ty,
                callee,
                self.call_args(args),
                self.label(*normal),
                self.label(*unwind)
            ),
            InstKind::Ret { value: Some(v) } => format!("ret {}", self.typed(v)),
            InstKind::Ret { value: None } => "ret void".to_string(),
            InstKind::Resume { value } => format!("resume {}", self.typed(value)),
            InstKind::Unreachable => "unreachable".to_string(),
        };
        if data.ty.is_void() || matches!(data.kind, InstKind::Store { .. }) {
            body
        } else {
            format!("{} = {}", self.value_name(&Value::Inst(id)), body)
        }
    }

    /// One block with its label line.
    pub fn display_block(&self, id: BlockId) -> String {
        let block = self.block(id);
        let mut out = format!("{}:\n", block.name);
        for inst in &block.insts {
            out.push_str("  ");
            out.push_str(&self.display_inst(*inst));
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for LirFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "define {} @{}(", self.ret_ty, self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", arg.ty)?;
            for attr in &arg.attrs {
                write!(f, " {}", attr)?;
            }
            write!(f, " {}", self.value_name(&Value::Arg(i as u32)))?;
        }
        write!(f, ")")?;
        if let Some(p) = &self.personality {
            write!(f, " personality @{}", p)?;
        }
        writeln!(f, " {{")?;
        for (i, id) in self.layout().iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", self.display_block(*id))?;
        }
        writeln!(f, "}}")
    }
}
