// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Internal lowering errors.
//!
//! These are compiler bugs, not user mistakes: a front end that already
//! reported a problem feeds error sentinels instead, which lowering skips.
//! Any `LowerError` aborts compilation of the unit.

use kiln_ast::{LabelId, Span, VarId};
use kiln_lir::VerifyError;
use thiserror::Error;

/// An internal error, tagged with where it happened.
#[derive(Debug, Clone, Error)]
#[error("internal error lowering `{function}` at {span}: {kind}")]
pub struct LowerError {
    pub function: String,
    pub span: Span,
    pub kind: LowerErrorKind,
}

/// The kind of internal error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LowerErrorKind {
    #[error("parameter `{name}` registered twice")]
    DuplicateParameter { name: String },

    #[error("more parameters registered than the signature declares ({declared})")]
    TooManyParameters { declared: usize },

    #[error("parameter {index} registered with a type that differs from the signature")]
    ParameterTypeMismatch { index: usize },

    #[error("only {registered} of {declared} parameters were registered")]
    UnregisteredParameters { registered: usize, declared: usize },

    #[error("closure environment is not a single direct chunk")]
    ChainNotDirect,

    #[error("closure environment registered twice")]
    ChainAlreadyRegistered,

    #[error("alias target {0:?} is not a variable of this function")]
    BadAlias(VarId),

    #[error("variable {0:?} is not known to this function")]
    UnknownVariable(VarId),

    #[error("label {0:?} is not known to this function")]
    UnknownLabel(LabelId),

    #[error("direct value classified with {count} chunks")]
    InconsistentChunks { count: usize },

    #[error("label {0:?} defined twice")]
    LabelRedefined(LabelId),

    #[error("label {0:?} used but never defined")]
    UndefinedLabel(LabelId),

    #[error("{count} label-address placeholders left unresolved")]
    DanglingLabelAddress { count: usize },

    #[error("expression is not addressable")]
    NotAnLvalue,

    #[error("switch case value is not a constant")]
    NonConstantCase,

    #[error("switch case value {0} appears twice")]
    DuplicateCase(i64),

    #[error("switch has more than one default case")]
    DuplicateDefault,

    #[error("break outside of a switch")]
    BreakOutsideSwitch,

    #[error("return expects {expected} values, found {found}")]
    ReturnArity { expected: usize, found: usize },

    #[error("malformed expression: {0}")]
    InvalidExpression(&'static str),

    #[error("verification failed: {0}")]
    Verify(#[from] VerifyError),
}
