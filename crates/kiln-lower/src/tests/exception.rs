// SPDX-License-Identifier: (MIT OR Apache-2.0)

use kiln_abi::Signature;
use kiln_ast::{BinOp, Expr, Stmt};
use kiln_lir::{InstKind, PadKind};
use kiln_types::Type;

use super::*;
use crate::LowerErrorKind;

fn call(name: &str) -> Stmt {
    Stmt::expr(Expr::call(name, vec![], Type::Void))
}

fn lit(v: i64) -> Expr {
    Expr::int(Type::I64, v)
}

fn void_fn() -> Signature {
    Signature::new(vec![], Type::Void)
}

fn pads(func: &LirFunction) -> Vec<PadKind> {
    func.blocks()
        .flat_map(|b| b.insts.iter())
        .filter_map(|i| match func.inst(*i).kind {
            InstKind::LandingPad { kind } => Some(kind),
            _ => None,
        })
        .collect()
}

// ── try / catch ────────────────────────────────────────────────

fn try_catch() -> LirFunction {
    lower(void_fn(), |_| Stmt::try_(call("work"), Some(call("handle")), None))
}

#[test]
fn try_catch_runs_the_handler_only_on_raise() {
    let func = try_catch();
    let text = func.to_string();
    assert!(text.contains("invoke void @work() to label %cont.1 unwind label %pad.0"), "{}", text);
    assert!(text.contains("landingpad { i8*, i32 } catch i8* null"));
    assert_eq!(func.personality.as_deref(), Some("__kiln_personality_v0"));
    // The handler itself is not protected.
    assert!(text.contains("call void @handle()"));

    let calm = run_with(&func, &[], World::new());
    assert_eq!(calm.outcome, Outcome::Returned(None));
    assert_eq!(calm.world.names(), vec!["work"]);

    let stormy = run_with(&func, &[], World::new().raising("work"));
    assert_eq!(stormy.outcome, Outcome::Returned(None));
    assert_eq!(stormy.world.names(), vec!["work", "handle"]);
}

#[test]
fn try_without_handlers_is_just_the_body() {
    let func = lower(void_fn(), |_| Stmt::try_(call("work"), None, None));
    assert!(func.personality.is_none());
    assert!(func.to_string().contains("call void @work()"));
    let out = run_with(&func, &[], World::new().raising("work"));
    assert_eq!(out.outcome, Outcome::Raised(101));
}

#[test]
fn functions_without_pads_have_no_personality() {
    let func = lower(void_fn(), |_| call("work"));
    assert!(func.personality.is_none());
    assert!(pads(&func).is_empty());
}

// ── finally ────────────────────────────────────────────────────

#[test]
fn finally_runs_on_normal_completion() {
    let func = lower(void_fn(), |_| Stmt::try_(call("work"), None, Some(call("cleanup"))));
    let out = run_with(&func, &[], World::new());
    assert_eq!(out.outcome, Outcome::Returned(None));
    assert_eq!(out.world.names(), vec!["work", "cleanup"]);
}

#[test]
fn finally_runs_then_reraises() {
    let func = lower(void_fn(), |_| Stmt::try_(call("work"), None, Some(call("cleanup"))));
    let text = func.to_string();
    assert!(text.contains("%finvar.0 = alloca i8"), "{}", text);
    assert!(text.contains("%ehtmp.0 = alloca { i8*, i32 }"));
    assert!(text.contains("landingpad { i8*, i32 } cleanup"));
    assert!(text.contains("i8 0, label %finres.0 i8 1, label %cont."));
    assert!(text.contains("resume { i8*, i32 } %exn.0"));
    // No return was routed through this region.
    assert!(!has_block(&func, "finret."));

    let out = run_with(&func, &[], World::new().raising("work"));
    assert_eq!(out.outcome, Outcome::Raised(101));
    assert_eq!(out.world.names(), vec!["work", "cleanup"]);
}

#[test]
fn catch_then_finally() {
    let func = lower(void_fn(), |_| {
        Stmt::try_(call("work"), Some(call("handle")), Some(call("cleanup")))
    });
    assert_eq!(pads(&func), vec![PadKind::CatchAll, PadKind::Cleanup]);

    let calm = run_with(&func, &[], World::new());
    assert_eq!(calm.outcome, Outcome::Returned(None));
    assert_eq!(calm.world.names(), vec!["work", "cleanup"]);

    let caught = run_with(&func, &[], World::new().raising("work"));
    assert_eq!(caught.outcome, Outcome::Returned(None));
    assert_eq!(caught.world.names(), vec!["work", "handle", "cleanup"]);
}

#[test]
fn exception_from_the_handler_still_runs_finally() {
    let func = lower(void_fn(), |_| {
        Stmt::try_(call("work"), Some(call("handle")), Some(call("cleanup")))
    });
    let text = func.to_string();
    assert!(text.contains("unwind label %catchpad.0"), "{}", text);

    let out = run_with(&func, &[], World::new().raising("work").raising("handle"));
    assert_eq!(out.outcome, Outcome::Raised(102));
    assert_eq!(out.world.names(), vec!["work", "handle", "cleanup"]);
}

#[test]
fn return_inside_try_passes_through_finally() {
    let sig = Signature::new(vec![], Type::I64);
    let func = lower(sig, |_| {
        Stmt::block(vec![
            Stmt::try_(Stmt::ret(vec![lit(7)]), None, Some(call("cleanup"))),
            Stmt::ret(vec![lit(0)]),
        ])
    });
    let text = func.to_string();
    assert!(has_block(&func, "finret."), "{}", text);
    assert!(text.contains("%retval.0 = alloca i64"));
    assert!(text.contains("store i8 2, i8* %finvar.0"));
    assert!(text.contains("i8 2, label %finret.0"));

    let out = run_with(&func, &[], World::new());
    assert_eq!(out.outcome.int(), 7);
    assert_eq!(out.world.names(), vec!["cleanup"]);
}

#[test]
fn falling_out_of_try_continues_after_the_region() {
    let sig = Signature::new(vec![], Type::I64);
    let func = lower(sig, |_| {
        Stmt::block(vec![
            Stmt::try_(call("work"), None, Some(call("cleanup"))),
            Stmt::expr(Expr::call("after", vec![], Type::Void)),
            Stmt::ret(vec![lit(3)]),
        ])
    });
    let out = run_with(&func, &[], World::new());
    assert_eq!(out.outcome.int(), 3);
    assert_eq!(out.world.names(), vec!["work", "cleanup", "after"]);
}

#[test]
fn return_inside_finally_overrides_the_dispatch() {
    let sig = Signature::new(vec![], Type::I64);
    let func = lower(sig, |_| {
        Stmt::block(vec![
            Stmt::try_(call("work"), None, Some(Stmt::ret(vec![lit(5)]))),
            Stmt::ret(vec![lit(0)]),
        ])
    });
    // The finally block never falls through, so there is nothing to dispatch.
    assert!(!has_block(&func, "finres."));
    let out = run_with(&func, &[], World::new().raising("work"));
    assert_eq!(out.outcome.int(), 5);
}

#[test]
fn several_returns_share_one_region() {
    let sig = Signature::new(vec![Type::I64], Type::I64);
    let func = lower(sig, |fb| {
        let p = param(fb, "p", Type::I64);
        let positive = Expr::binary(BinOp::Gt, Expr::var(p, Type::I64), lit(0));
        Stmt::block(vec![
            Stmt::try_(
                Stmt::block(vec![
                    Stmt::if_(positive, Stmt::ret(vec![lit(11)]), None),
                    call("work"),
                    Stmt::ret(vec![lit(22)]),
                ]),
                Some(call("handle")),
                Some(call("cleanup")),
            ),
            Stmt::ret(vec![lit(33)]),
        ])
    });
    let text = func.to_string();
    assert_eq!(text.matches("%retval.0 = alloca i64").count(), 1, "{}", text);
    assert!(text.matches("store i8 2, i8* %finvar.0").count() >= 2, "{}", text);

    let early = run_with(&func, &[int(1)], World::new());
    assert_eq!(early.outcome.int(), 11);
    assert_eq!(early.world.names(), vec!["cleanup"]);

    let late = run_with(&func, &[int(0)], World::new());
    assert_eq!(late.outcome.int(), 22);
    assert_eq!(late.world.names(), vec!["work", "cleanup"]);

    let caught = run_with(&func, &[int(0)], World::new().raising("work"));
    assert_eq!(caught.outcome.int(), 33);
    assert_eq!(caught.world.names(), vec!["work", "handle", "cleanup"]);
}

// ── nesting ────────────────────────────────────────────────────

#[test]
fn nested_finally_rethrows_into_the_outer_region() {
    let func = lower(void_fn(), |_| {
        Stmt::try_(
            Stmt::try_(call("work"), None, Some(call("inner"))),
            None,
            Some(call("outer")),
        )
    });
    let text = func.to_string();
    assert!(text.contains("invoke void @__kiln_rethrow(i8* %exn."), "{}", text);

    let out = run_with(&func, &[], World::new().raising("work"));
    assert_eq!(out.outcome, Outcome::Raised(101));
    assert_eq!(out.world.names(), vec!["work", "inner", "__kiln_rethrow", "outer"]);
    assert_eq!(out.world.trace[2], "__kiln_rethrow(101)");
}

#[test]
fn nested_catch_handles_what_the_inner_finally_reraises() {
    let func = lower(void_fn(), |_| {
        Stmt::try_(
            Stmt::try_(call("work"), None, Some(call("inner"))),
            Some(call("handle")),
            None,
        )
    });
    let out = run_with(&func, &[], World::new().raising("work"));
    assert_eq!(out.outcome, Outcome::Returned(None));
    assert_eq!(out.world.names(), vec!["work", "inner", "__kiln_rethrow", "handle"]);
}

#[test]
fn return_passes_through_every_enclosing_finally() {
    let sig = Signature::new(vec![], Type::I64);
    let func = lower(sig, |_| {
        Stmt::block(vec![
            Stmt::try_(
                Stmt::try_(Stmt::ret(vec![lit(3)]), None, Some(call("a"))),
                None,
                Some(call("b")),
            ),
            Stmt::ret(vec![lit(0)]),
        ])
    });
    // One result slot serves every region.
    assert_eq!(func.to_string().matches("= alloca i64").count(), 1);

    let out = run_with(&func, &[], World::new());
    assert_eq!(out.outcome.int(), 3);
    assert_eq!(out.world.names(), vec!["a", "b"]);
}

#[test]
fn struct_result_returned_through_finally() {
    let triple = Type::Struct(vec![Type::I64, Type::I64, Type::I64]);
    let sig = Signature::new(vec![], triple.clone());
    let func = lower(sig, |_| {
        Stmt::try_(
            Stmt::ret(vec![Expr::composite(triple.clone(), vec![lit(1), lit(2), lit(3)])]),
            None,
            Some(call("cleanup")),
        )
    });
    let out = run_with(&func, &[], World::new());
    assert_eq!(out.outcome, Outcome::Returned(None));
    let mem = out.sret.unwrap();
    assert_eq!(super::interp::int_of(&mem[16..24]), 3);
    assert_eq!(out.world.names(), vec!["cleanup"]);
}

// ── defer ──────────────────────────────────────────────────────

fn deferred() -> LirFunction {
    lower(void_fn(), |_| {
        Stmt::block(vec![
            call("work"),
            Stmt::defer(Expr::call("unlock", vec![], Type::Void), call("check")),
        ])
    })
}

#[test]
fn defer_runs_the_epilogue_once_when_it_succeeds() {
    let func = deferred();
    let text = func.to_string();
    assert!(text.contains("invoke void @unlock() to label %cont."), "{}", text);
    assert!(has_block(&func, "finish."));

    let out = run_with(&func, &[], World::new());
    assert_eq!(out.outcome, Outcome::Returned(None));
    assert_eq!(out.world.names(), vec!["work", "unlock"]);
}

#[test]
fn defer_checks_and_retries_after_a_raise() {
    let func = deferred();
    let out = run_with(&func, &[], World::new().raising_once("unlock"));
    assert_eq!(out.outcome, Outcome::Returned(None));
    assert_eq!(out.world.names(), vec!["work", "unlock", "check", "unlock"]);
}

#[test]
fn defer_epilogue_must_be_a_call() {
    let err = lower_err(void_fn(), |_| Stmt::defer(lit(1), call("check")));
    assert!(matches!(err.kind, LowerErrorKind::InvalidExpression(_)));
}

#[test]
fn erroneous_defer_epilogue_is_skipped() {
    let func = lower(void_fn(), |_| {
        Stmt::block(vec![call("work"), Stmt::defer(Expr::error(Type::Void), call("check"))])
    });
    assert!(pads(&func).is_empty());
    assert!(!func.to_string().contains("@check"));
    let out = run_with(&func, &[], World::new());
    assert_eq!(out.outcome, Outcome::Returned(None));
    assert_eq!(out.world.names(), vec!["work"]);
}

#[test]
fn defer_inside_try_unwinds_through_the_outer_pad() {
    let func = lower(void_fn(), |_| {
        Stmt::try_(
            Stmt::defer(Expr::call("unlock", vec![], Type::Void), call("check")),
            Some(call("handle")),
            None,
        )
    });
    let out = run_with(&func, &[], World::new().raising("check").raising_once("unlock"));
    assert_eq!(out.outcome, Outcome::Returned(None));
    assert_eq!(out.world.names(), vec!["unlock", "check", "handle"]);
}
